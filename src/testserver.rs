//! Minimal HTTP server for unit tests: canned handlers on a loopback
//! listener, one thread per connection, multiple requests per connection
//! so keep-alive behavior can be exercised.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::chunked::ChunkedDecoder;

pub type Handler = fn(Request, &mut TcpStream) -> io::Result<()>;

pub struct TestServer {
    pub port: u16,
    done: Arc<AtomicBool>,
}

/// A request as seen by a test handler.
pub struct Request {
    pub line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn method(&self) -> &str {
        self.line.split(' ').next().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.line.split(' ').nth(1).unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl TestServer {
    pub fn new(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                if done.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { break };
                thread::spawn(move || serve_connection(stream, handler));
            }
        });

        // Make sure the listener accepts before tests connect.
        while let Err(e) = TcpStream::connect(("127.0.0.1", port)) {
            if e.kind() == io::ErrorKind::ConnectionRefused {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
            break;
        }

        TestServer {
            port,
            done: done_clone,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        // One extra connect to unblock the accept loop.
        TcpStream::connect(("127.0.0.1", self.port)).ok();
    }
}

fn serve_connection(stream: TcpStream, handler: Handler) {
    let mut write_half = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);
    loop {
        match read_request(&mut reader) {
            Ok(Some(request)) => {
                if handler(request, &mut write_half).is_err() {
                    break;
                }
            }
            _ => break,
        }
    }
}

fn read_request(reader: &mut BufReader<TcpStream>) -> io::Result<Option<Request>> {
    let Some(line) = read_line(reader)? else {
        return Ok(None);
    };
    if line.is_empty() {
        return Ok(None);
    }

    let mut headers = Vec::new();
    loop {
        let Some(header_line) = read_line(reader)? else {
            return Ok(None);
        };
        if header_line.is_empty() {
            break;
        }
        if let Some((name, value)) = header_line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut request = Request {
        line,
        headers,
        body: Vec::new(),
    };

    let content_length: Option<usize> = request
        .header("content-length")
        .and_then(|v| v.parse().ok());
    let chunked = request
        .header("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    if chunked {
        let mut decoder = ChunkedDecoder::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = decoder.read_some(reader, &mut buf)?;
            if n == 0 {
                break;
            }
            request.body.extend_from_slice(&buf[..n]);
        }
    } else if let Some(total) = content_length {
        let mut body = vec![0u8; total];
        let mut read = 0;
        while read < total {
            let n = reader.read(&mut body[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        body.truncate(read);
        request.body = body;
    }

    Ok(Some(request))
}

fn read_line(reader: &mut BufReader<TcpStream>) -> io::Result<Option<String>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Write a response with the given status, headers and body.
pub fn respond(
    w: &mut TcpStream,
    status: u16,
    headers: &[(&str, &str)],
    body: &[u8],
) -> io::Result<()> {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    write!(w, "HTTP/1.1 {} {}\r\n", status, reason)?;
    for (name, value) in headers {
        write!(w, "{}: {}\r\n", name, value)?;
    }
    write!(w, "\r\n")?;
    w.write_all(body)?;
    w.flush()
}

/// Write exact bytes, for responses that need unusual framing.
pub fn respond_raw(w: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    w.write_all(bytes)?;
    w.flush()
}
