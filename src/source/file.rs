use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::Source;

/// A body read from a file on disk.
///
/// The content type is inferred from the file extension, defaulting to
/// `text/plain` when the extension says nothing.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: u64,
    pos: u64,
    content_type: String,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("text/plain")
            .to_string();
        Ok(FileSource {
            file,
            size,
            pos: 0,
            content_type,
        })
    }
}

impl Source for FileSource {
    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.pos = 0;
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        if self.pos >= self.size {
            return Ok((0, false));
        }
        let want = ((self.size - self.pos).min(buf.len() as u64)) as usize;
        let n = self.file.read(&mut buf[..want])?;
        if n == 0 {
            // File shrank under us; treat as complete rather than spin.
            self.pos = self.size;
            return Ok((0, false));
        }
        self.pos += n as u64;
        Ok((n, self.pos != self.size))
    }

    fn default_content_type(&self) -> &str {
        &self.content_type
    }
}
