use std::io;

use super::Source;

/// `application/x-www-form-urlencoded` body built from key/value pairs.
#[derive(Debug)]
pub struct FormSource {
    encoded: Vec<u8>,
    pos: usize,
}

impl FormSource {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k.as_ref(), v.as_ref());
        }
        FormSource {
            encoded: serializer.finish().into_bytes(),
            pos: 0,
        }
    }
}

impl Source for FormSource {
    fn size(&self) -> Option<u64> {
        Some(self.encoded.len() as u64)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        Ok(super::copy_some(&self.encoded, &mut self.pos, buf))
    }

    fn default_content_type(&self) -> &str {
        "application/x-www-form-urlencoded"
    }
}

/// One field of a multipart form.
#[cfg(feature = "multipart")]
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: String,
    source: Box<dyn Source>,
}

#[cfg(feature = "multipart")]
impl Part {
    /// A part whose content type comes from its source.
    pub fn new(name: impl Into<String>, source: impl super::IntoSource) -> Self {
        let source = source.into_source();
        let content_type = {
            let ct = source.default_content_type();
            if ct.is_empty() {
                "application/octet-stream".to_string()
            } else {
                ct.to_string()
            }
        };
        Part {
            name: name.into(),
            filename: None,
            content_type,
            source,
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn header_bytes(&self, boundary: &str) -> Vec<u8> {
        let mut head = format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"", boundary, self.name);
        if let Some(filename) = &self.filename {
            head.push_str(&format!("; filename=\"{}\"", filename));
        }
        head.push_str(&format!("\r\nContent-Type: {}\r\n\r\n", self.content_type));
        head.into_bytes()
    }
}

#[cfg(feature = "multipart")]
#[derive(PartialEq)]
enum Phase {
    Header,
    Body,
    Done,
}

/// `multipart/form-data` body: parts laid out between boundary lines,
/// closed with `--BOUNDARY--`.
///
/// `size()` is known only when every part's size is; otherwise the request
/// goes out chunked.
#[cfg(feature = "multipart")]
pub struct MultipartSource {
    boundary: String,
    content_type: String,
    parts: Vec<Part>,
    current: usize,
    // How many parts have produced bytes; reset() rewinds these, last first.
    touched: usize,
    phase: Phase,
    staging: Vec<u8>,
    staging_pos: usize,
}

#[cfg(feature = "multipart")]
impl MultipartSource {
    pub fn new(parts: Vec<Part>) -> Self {
        Self::with_boundary(parts, make_boundary())
    }

    pub(crate) fn with_boundary(parts: Vec<Part>, boundary: String) -> Self {
        let content_type = format!("multipart/form-data; boundary={}", boundary);
        MultipartSource {
            boundary,
            content_type,
            parts,
            current: 0,
            touched: 0,
            phase: Phase::Header,
            staging: Vec::new(),
            staging_pos: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn final_boundary(&self) -> Vec<u8> {
        format!("--{}--", self.boundary).into_bytes()
    }

    fn emitted_everything(&self) -> bool {
        self.phase == Phase::Done && self.staging_pos == self.staging.len()
    }
}

#[cfg(feature = "multipart")]
impl Source for MultipartSource {
    fn size(&self) -> Option<u64> {
        let mut total = 0u64;
        for part in &self.parts {
            total += part.header_bytes(&self.boundary).len() as u64;
            total += part.source.size()?;
            total += 2; // closing CRLF after the part bytes
        }
        Some(total + self.final_boundary().len() as u64)
    }

    fn reset(&mut self) -> io::Result<()> {
        for part in self.parts[..self.touched].iter_mut().rev() {
            part.source.reset()?;
        }
        self.current = 0;
        self.touched = 0;
        self.phase = Phase::Header;
        self.staging.clear();
        self.staging_pos = 0;
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        let mut n = 0;
        while n < buf.len() {
            if self.staging_pos < self.staging.len() {
                let (m, _) = super::copy_some(&self.staging, &mut self.staging_pos, &mut buf[n..]);
                n += m;
                continue;
            }
            match self.phase {
                Phase::Header => {
                    if self.current < self.parts.len() {
                        self.staging = self.parts[self.current].header_bytes(&self.boundary);
                        self.touched = self.current + 1;
                        self.phase = Phase::Body;
                    } else {
                        self.staging = self.final_boundary();
                        self.phase = Phase::Done;
                    }
                    self.staging_pos = 0;
                }
                Phase::Body => {
                    let (m, more) = self.parts[self.current].source.read_some(&mut buf[n..])?;
                    n += m;
                    if !more {
                        self.staging = b"\r\n".to_vec();
                        self.staging_pos = 0;
                        self.current += 1;
                        self.phase = Phase::Header;
                    } else if m == 0 {
                        // Source produced nothing despite claiming more;
                        // hand control back rather than spin.
                        break;
                    }
                }
                Phase::Done => break,
            }
        }
        Ok((n, !self.emitted_everything()))
    }

    fn default_content_type(&self) -> &str {
        &self.content_type
    }
}

#[cfg(feature = "multipart")]
fn make_boundary() -> String {
    const CHARS: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut raw = [0u8; 32];
    if getrandom::getrandom(&mut raw).is_err() {
        // No system entropy; derive something unique enough from the
        // hasher's per-process randomness.
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};
        for chunk in raw.chunks_mut(8) {
            let v = RandomState::new().build_hasher().finish().to_ne_bytes();
            let len = chunk.len();
            chunk.copy_from_slice(&v[..len]);
        }
    }
    raw.iter().map(|b| CHARS[(b % 62) as usize] as char).collect()
}
