//! Chunked transfer-coding, both directions.
//!
//! The decoder is resumable: it holds the position inside the current
//! chunk between calls, so callers may read with any buffer size (down to
//! one byte) and the reconstructed body is identical to the framed data.
//! Bytes past the terminating 0-chunk are left unread in the source, which
//! is what keeps the connection reusable.

use std::io::{self, Read, Write};

// An absurd chunk size is a framing error, not a huge allocation.
const MAX_CHUNK_SIZE: u64 = 1 << 32;

#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    // Bytes left of the chunk currently being read. None between chunks.
    remaining: Option<u64>,
    done: bool,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            remaining: None,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode up to `buf.len()` body bytes out of `src`.
    ///
    /// `Ok(0)` means the terminating chunk (and any trailer) has been
    /// consumed and the body is complete.
    pub fn read_some<R: Read>(&mut self, src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.remaining {
                None => {
                    let size = read_chunk_size(src)?;
                    if size == 0 {
                        read_trailer(src)?;
                        self.done = true;
                        return Ok(0);
                    }
                    self.remaining = Some(size);
                }
                Some(0) => {
                    expect_crlf(src)?;
                    self.remaining = None;
                }
                Some(left) => {
                    let want = (left.min(buf.len() as u64)) as usize;
                    let n = src.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "eof inside chunk",
                        ));
                    }
                    self.remaining = Some(left - n as u64);
                    return Ok(n);
                }
            }
        }
    }
}

fn read_byte<R: Read>(src: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    let n = src.read(&mut b)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "eof in chunk framing",
        ));
    }
    Ok(b[0])
}

fn bad(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

// `chunk-size [;extensions] CRLF`. Extensions are skipped.
fn read_chunk_size<R: Read>(src: &mut R) -> io::Result<u64> {
    let mut size: u64 = 0;
    let mut digits = 0;
    loop {
        let b = read_byte(src)?;
        match b {
            b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' => {
                let digit = (b as char).to_digit(16).unwrap() as u64;
                size = size * 16 + digit;
                digits += 1;
                if size > MAX_CHUNK_SIZE {
                    return Err(bad("chunk size too large"));
                }
            }
            b';' => {
                skip_until_cr(src)?;
                break;
            }
            b'\r' => break,
            _ => return Err(bad("bad chunk size character")),
        }
    }
    if digits == 0 {
        return Err(bad("missing chunk size"));
    }
    if read_byte(src)? != b'\n' {
        return Err(bad("chunk size not CRLF terminated"));
    }
    Ok(size)
}

fn skip_until_cr<R: Read>(src: &mut R) -> io::Result<()> {
    loop {
        if read_byte(src)? == b'\r' {
            return Ok(());
        }
    }
}

fn expect_crlf<R: Read>(src: &mut R) -> io::Result<()> {
    if read_byte(src)? != b'\r' || read_byte(src)? != b'\n' {
        return Err(bad("chunk data not CRLF terminated"));
    }
    Ok(())
}

// After the 0-chunk: optional trailer header lines, then an empty line.
fn read_trailer<R: Read>(src: &mut R) -> io::Result<()> {
    loop {
        let mut len = 0usize;
        loop {
            let b = read_byte(src)?;
            if b == b'\r' {
                if read_byte(src)? != b'\n' {
                    return Err(bad("bare CR in trailer"));
                }
                break;
            }
            len += 1;
            if len > 8192 {
                return Err(bad("trailer line too long"));
            }
        }
        if len == 0 {
            return Ok(());
        }
    }
}

/// Write one data chunk. Empty input writes nothing (an empty chunk would
/// terminate the body).
pub(crate) fn write_chunk<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    write!(w, "{:x}\r\n", data.len())?;
    w.write_all(data)?;
    w.write_all(b"\r\n")
}

/// Terminate a chunked body.
pub(crate) fn write_final_chunk<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(b"0\r\n\r\n")
}
