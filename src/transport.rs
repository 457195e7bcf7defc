//! The socket layer: plain TCP, TLS-over-TCP and unix sockets behind one
//! enum, so the connection logic above it stays transport-agnostic.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

#[cfg(feature = "rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "rustls")]
use rustls::{ClientConnection, StreamOwned};

use crate::endpoint::Endpoint;
use crate::sync::Deadline;
use crate::Error;

pub(crate) enum Transport {
    Tcp(TcpStream),
    #[cfg(feature = "rustls")]
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Transport::Tcp(_) => "tcp",
            #[cfg(feature = "rustls")]
            Transport::Tls(_) => "tls",
            #[cfg(unix)]
            Transport::Unix(_) => "unix",
        };
        write!(f, "Transport[{}]", name)
    }
}

impl Transport {
    /// Open a transport to `endpoint`. For TLS endpoints the handshake is
    /// completed here, verifying the certificate against `host`.
    pub fn connect(endpoint: &Endpoint, host: &str, deadline: &Deadline) -> Result<Self, Error> {
        match endpoint {
            Endpoint::Tcp { addr, tls } => {
                let socket = match deadline.write_timeout()? {
                    Some(timeout) => TcpStream::connect_timeout(addr, timeout)?,
                    None => TcpStream::connect(addr)?,
                };
                socket.set_nodelay(true).ok();

                if !tls {
                    return Ok(Transport::Tcp(socket));
                }

                #[cfg(feature = "rustls")]
                {
                    Self::wrap_tls(socket, host, deadline)
                }
                #[cfg(not(feature = "rustls"))]
                {
                    let _ = host;
                    Err(Error::Tls("tls support not compiled in".into()))
                }
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                deadline.check()?;
                let socket = UnixStream::connect(path)?;
                Ok(Transport::Unix(socket))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(Error::UnknownScheme("unix".to_string())),
        }
    }

    #[cfg(feature = "rustls")]
    fn wrap_tls(socket: TcpStream, host: &str, deadline: &Deadline) -> Result<Self, Error> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::Tls(format!("invalid server name: {}", host)))?;
        let conn = ClientConnection::new(crate::tls::default_tls_config(), name)
            .map_err(|e| Error::Tls(e.to_string()))?;
        let mut stream = StreamOwned::new(conn, socket);

        // Drive the handshake to completion now, so certificate problems
        // surface as a connect error rather than on first write.
        while stream.conn.is_handshaking() {
            stream.sock.set_read_timeout(deadline.poll_timeout()?).ok();
            stream
                .sock
                .set_write_timeout(deadline.write_timeout()?)
                .ok();
            match stream.conn.complete_io(&mut stream.sock) {
                Ok(_) => {}
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    // Poll interval elapsed; the deadline check at the top
                    // of the loop decides whether we keep going.
                    deadline.check()?;
                }
                Err(e) => return Err(Error::Tls(e.to_string())),
            }
        }
        stream.sock.set_read_timeout(None).ok();
        stream.sock.set_write_timeout(None).ok();

        trace!("tls handshake complete for {}", host);
        Ok(Transport::Tls(Box::new(stream)))
    }

    pub fn is_tls(&self) -> bool {
        match self {
            #[cfg(feature = "rustls")]
            Transport::Tls(_) => true,
            _ => false,
        }
    }

    /// Apply the deadline as socket timeouts for the next I/O: reads get
    /// the (retryable) poll timeout, writes the hard limit only.
    pub fn apply_deadline(&self, deadline: &Deadline) -> Result<(), Error> {
        self.set_timeouts(deadline.poll_timeout()?, deadline.write_timeout()?)
    }

    pub fn clear_deadline(&self) {
        self.set_timeouts(None, None).ok();
    }

    fn set_timeouts(
        &self,
        read: Option<Duration>,
        write: Option<Duration>,
    ) -> Result<(), Error> {
        match self {
            Transport::Tcp(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)?;
            }
            #[cfg(feature = "rustls")]
            Transport::Tls(s) => {
                s.sock.set_read_timeout(read)?;
                s.sock.set_write_timeout(write)?;
            }
            #[cfg(unix)]
            Transport::Unix(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)?;
            }
        }
        Ok(())
    }

    /// Graceful shutdown: close_notify for TLS (ignored otherwise), then
    /// socket shutdown. Errors are ignored, the transport is going away.
    pub fn shutdown(&mut self) {
        match self {
            Transport::Tcp(s) => {
                s.shutdown(Shutdown::Both).ok();
            }
            #[cfg(feature = "rustls")]
            Transport::Tls(s) => {
                s.conn.send_close_notify();
                let _ = s.conn.complete_io(&mut s.sock);
                s.sock.shutdown(Shutdown::Both).ok();
            }
            #[cfg(unix)]
            Transport::Unix(s) => {
                s.shutdown(Shutdown::Both).ok();
            }
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            #[cfg(feature = "rustls")]
            Transport::Tls(s) => match s.read(buf) {
                // rustls surfaces a clean close-notify-less EOF as an error;
                // for body reads we treat it as EOF like plain TCP.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
                other => other,
            },
            #[cfg(unix)]
            Transport::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            #[cfg(feature = "rustls")]
            Transport::Tls(s) => s.write(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            #[cfg(feature = "rustls")]
            Transport::Tls(s) => s.flush(),
            #[cfg(unix)]
            Transport::Unix(s) => s.flush(),
        }
    }
}
