//! Request body sources.
//!
//! A [`Source`] produces the bytes of a request body incrementally, so
//! bodies larger than memory can be sent. When [`Source::size`] is known
//! the request gets a `Content-Length`; otherwise the connection prefetches
//! one chunk and falls back to `Transfer-Encoding: chunked` if that chunk
//! was not the whole body.

use std::io;

mod file;
mod form;
#[cfg(feature = "json")]
mod json;

pub use file::FileSource;
pub use form::FormSource;
#[cfg(feature = "multipart")]
pub use form::{MultipartSource, Part};
#[cfg(feature = "json")]
pub use json::JsonSource;

/// A resettable, possibly-sized producer of request body bytes.
pub trait Source: Send {
    /// Total length if knowable and stable, `None` for streaming sources.
    fn size(&self) -> Option<u64>;

    /// Restart iteration from the beginning.
    ///
    /// Required when a redirect preserves method and body. A source that
    /// cannot restart returns an error, which fails the redirect.
    fn reset(&mut self) -> io::Result<()>;

    /// Write some bytes into `buf`. Returns `(n, more)`; `more == false`
    /// signals that the body is complete (including this call's bytes).
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)>;

    /// `Content-Type` used when the caller did not set one. Empty means
    /// no header is added.
    fn default_content_type(&self) -> &str {
        ""
    }
}

// Shared "copy out of a flat buffer" step for the in-memory sources.
fn copy_some(data: &[u8], pos: &mut usize, buf: &mut [u8]) -> (usize, bool) {
    let left = data.len() - *pos;
    let n = left.min(buf.len());
    buf[..n].copy_from_slice(&data[*pos..*pos + n]);
    *pos += n;
    (n, *pos != data.len())
}

/// The empty body.
#[derive(Debug, Default)]
pub struct Empty;

impl Source for Empty {
    fn size(&self) -> Option<u64> {
        Some(0)
    }

    fn reset(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_some(&mut self, _buf: &mut [u8]) -> io::Result<(usize, bool)> {
        Ok((0, false))
    }
}

/// An in-memory byte buffer body.
#[derive(Debug)]
pub struct BufferSource {
    data: Vec<u8>,
    pos: usize,
}

impl BufferSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        BufferSource {
            data: data.into(),
            pos: 0,
        }
    }
}

impl Source for BufferSource {
    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        Ok(copy_some(&self.data, &mut self.pos, buf))
    }

    fn default_content_type(&self) -> &str {
        "application/octet-stream"
    }
}

/// A UTF-8 text body.
#[derive(Debug)]
pub struct StringSource {
    data: Vec<u8>,
    pos: usize,
}

impl StringSource {
    pub fn new(text: impl Into<String>) -> Self {
        StringSource {
            data: text.into().into_bytes(),
            pos: 0,
        }
    }
}

impl Source for StringSource {
    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        Ok(copy_some(&self.data, &mut self.pos, buf))
    }

    fn default_content_type(&self) -> &str {
        "text/plain; charset=utf-8"
    }
}

macro_rules! wide_string_source {
    ($name:ident, $unit:ty, $charset:literal) => {
        /// Text body in a wide encoding, serialized in native byte order.
        #[derive(Debug)]
        pub struct $name {
            data: Vec<u8>,
            pos: usize,
        }

        impl $name {
            pub fn new(units: &[$unit]) -> Self {
                let mut data = Vec::with_capacity(units.len() * std::mem::size_of::<$unit>());
                for u in units {
                    data.extend_from_slice(&u.to_ne_bytes());
                }
                $name { data, pos: 0 }
            }
        }

        impl Source for $name {
            fn size(&self) -> Option<u64> {
                Some(self.data.len() as u64)
            }

            fn reset(&mut self) -> io::Result<()> {
                self.pos = 0;
                Ok(())
            }

            fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
                Ok(copy_some(&self.data, &mut self.pos, buf))
            }

            fn default_content_type(&self) -> &str {
                $charset
            }
        }
    };
}

wide_string_source!(Utf16Source, u16, "text/plain; charset=utf-16");
wide_string_source!(Utf32Source, u32, "text/plain; charset=utf-32");

/// Conversion into a boxed [`Source`], used by the request entry points.
///
/// Implemented for the built-in sources, for plain data (`&str`, `String`,
/// byte slices, `()` for no body, JSON values) and for `Box<dyn Source>`,
/// which is the route for custom `Source` implementations.
pub trait IntoSource {
    fn into_source(self) -> Box<dyn Source>;
}

impl IntoSource for Box<dyn Source> {
    fn into_source(self) -> Box<dyn Source> {
        self
    }
}

macro_rules! impl_into_source_self {
    ($($t:ty),+ $(,)?) => {
        $(impl IntoSource for $t {
            fn into_source(self) -> Box<dyn Source> {
                Box::new(self)
            }
        })+
    };
}

impl_into_source_self!(
    Empty,
    BufferSource,
    StringSource,
    Utf16Source,
    Utf32Source,
    FileSource,
    FormSource,
);

#[cfg(feature = "multipart")]
impl_into_source_self!(MultipartSource);

#[cfg(feature = "json")]
impl_into_source_self!(JsonSource);

impl IntoSource for () {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(Empty)
    }
}

impl IntoSource for &str {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(StringSource::new(self))
    }
}

impl IntoSource for String {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(StringSource::new(self))
    }
}

impl IntoSource for &String {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(StringSource::new(self.clone()))
    }
}

impl IntoSource for &[u8] {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(BufferSource::new(self.to_vec()))
    }
}

impl IntoSource for Vec<u8> {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(BufferSource::new(self))
    }
}

#[cfg(feature = "json")]
impl IntoSource for &serde_json::Value {
    fn into_source(self) -> Box<dyn Source> {
        Box::new(JsonSource::new(self))
    }
}
