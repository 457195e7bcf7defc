//! The connection pool: at most `limit` live connections per resolved
//! endpoint, handed out in FIFO order.
//!
//! A pool serves one origin. The slot semaphore bounds
//! `idle + in-use <= limit`; [`PooledConn`] is the checked-out handle and
//! gives both the slot and (when reusable) the connection back on drop.

use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use http::{HeaderMap, Method};
use url::Url;

use crate::conn::Connection;
use crate::cookie::CookieJar;
use crate::endpoint::{check_endpoint, scheme_is_tls, Endpoint};
use crate::redirect::effective_port;
use crate::resolver::ArcResolver;
use crate::source::Source;
use crate::stream::Stream;
use crate::sync::{Deadline, FifoSemaphore};
use crate::Error;

pub(crate) const DEFAULT_POOL_LIMIT: usize = 6;

pub struct ConnectionPool {
    // Back-pointer handed to PooledConn so the lease can find its way home
    // without a strong cycle.
    weak_self: Weak<ConnectionPool>,
    host: String,
    use_tls: bool,
    resolver: ArcResolver,
    // Resolved endpoint plus the origin port the pool serves; cached by
    // the first successful lookup.
    endpoint: Mutex<Option<(Endpoint, u16)>>,
    idle: Mutex<Vec<Connection>>,
    slots: FifoSemaphore,
}

impl ConnectionPool {
    pub(crate) fn new(
        host: &str,
        use_tls: bool,
        limit: usize,
        resolver: ArcResolver,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| ConnectionPool {
            weak_self: weak_self.clone(),
            host: host.to_ascii_lowercase(),
            use_tls,
            resolver,
            endpoint: Mutex::new(None),
            idle: Mutex::new(Vec::new()),
            slots: FifoSemaphore::new(limit.max(1)),
        })
    }

    /// Resolve the pool's endpoint from `url` and cache the first success.
    pub(crate) fn lookup(&self, url: &Url, deadline: &Deadline) -> Result<(), Error> {
        let mut cached = self.endpoint.lock().unwrap();
        if cached.is_some() {
            return Ok(());
        }

        let port = effective_port(url);
        let endpoint = match url.scheme() {
            "unix" => Endpoint::Unix(url.path().into()),
            "http" | "https" | "ws" | "wss" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| Error::BadUrl(url.to_string()))?;
                let addr = self.resolver.lookup(host, port, deadline)?;
                Endpoint::Tcp {
                    addr,
                    tls: self.use_tls,
                }
            }
            other => return Err(Error::UnknownScheme(other.to_string())),
        };

        debug!("pool {} resolved to {}", self.host, endpoint);
        *cached = Some((endpoint, port));
        Ok(())
    }

    /// Verify a URL belongs on this pool's endpoint (host, port, TLS).
    pub(crate) fn check_url(&self, url: &Url) -> Result<(), Error> {
        let cached = self.endpoint.lock().unwrap();
        match cached.as_ref() {
            Some((endpoint, port)) => {
                check_endpoint(url, endpoint, &self.host, self.use_tls, Some(*port))
            }
            None => {
                if scheme_is_tls(url.scheme()) != self.use_tls {
                    return Err(Error::Insecure);
                }
                let url_host = url.host_str().unwrap_or("");
                if !url_host.eq_ignore_ascii_case(&self.host) {
                    return Err(Error::WrongHost {
                        expected: self.host.clone(),
                        got: url_host.to_ascii_lowercase(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Take a connection, waiting FIFO for a free slot. Idle connections
    /// are reused when their keep-alive budget allows, stale ones are
    /// discarded, and a fresh connection is opened otherwise.
    pub fn get_connection(&self, deadline: &Deadline) -> Result<PooledConn, Error> {
        self.slots.acquire(deadline)?;
        match self.checkout(deadline) {
            Ok(conn) => Ok(PooledConn {
                conn: Some(conn),
                pool: self.weak_self.clone(),
            }),
            Err(e) => {
                self.slots.release();
                Err(e)
            }
        }
    }

    fn checkout(&self, deadline: &Deadline) -> Result<Connection, Error> {
        let now = SystemTime::now();
        loop {
            let candidate = self.idle.lock().unwrap().pop();
            match candidate {
                None => break,
                Some(conn) if conn.is_reusable(now) => {
                    trace!("reuse idle connection to {}", self.host);
                    return Ok(conn);
                }
                Some(mut stale) => {
                    trace!("drop stale idle connection to {}", self.host);
                    stale.close();
                }
            }
        }

        let (endpoint, _) = self
            .endpoint
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::DnsFailed(format!("{} not resolved", self.host)))?;
        let mut conn = Connection::new(endpoint, &self.host)?;
        conn.connect(deadline)?;
        Ok(conn)
    }

    /// One request/response exchange on a pooled connection.
    pub fn ropen(
        &self,
        method: Method,
        target: &str,
        headers: &HeaderMap,
        source: &mut dyn Source,
        jar: Option<&CookieJar>,
        deadline: &Deadline,
    ) -> Result<Stream, Error> {
        let mut handle = self.get_connection(deadline)?;
        let head = handle
            .conn_mut()
            .ropen(&method, target, headers, source, jar, deadline)?;
        Ok(Stream::new(handle, head))
    }

    /// Upgrade handshake on a pooled connection. On success the
    /// connection leaves the pool for good with the returned handle.
    pub fn upgrade(
        &self,
        target: &str,
        headers: &HeaderMap,
        jar: Option<&CookieJar>,
        deadline: &Deadline,
    ) -> Result<crate::Upgraded, Error> {
        let handle = self.get_connection(deadline)?;
        crate::websocket::perform_upgrade(handle, target, headers, jar, deadline)
    }

    // Called from PooledConn::drop.
    fn give_back(&self, mut conn: Connection) {
        let now = SystemTime::now();
        if conn.must_close() || !conn.is_reusable(now) {
            conn.close();
        } else {
            self.idle.lock().unwrap().push(conn);
        }
        self.slots.release();
    }

    // Slot release for a connection that leaves the pool for good.
    fn forget(&self) {
        self.slots.release();
    }

    /// Close idle connections and abort pending waiters.
    pub fn shutdown(&self) {
        self.slots.shutdown();
        let mut idle = self.idle.lock().unwrap();
        for conn in idle.iter_mut() {
            conn.close();
        }
        idle.clear();
    }

    #[cfg(test)]
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A checked-out connection plus its pool slot.
///
/// Dropping returns the connection (or closes it when it must not be
/// reused) and frees the slot. [`PooledConn::detach`] instead moves the
/// connection out for good, e.g. after a protocol upgrade.
pub struct PooledConn {
    conn: Option<Connection>,
    pool: Weak<ConnectionPool>,
}

impl PooledConn {
    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }

    pub(crate) fn detach(mut self) -> Connection {
        let conn = self.conn.take().expect("connection present until drop");
        if let Some(pool) = self.pool.upgrade() {
            pool.forget();
        }
        conn
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.give_back(conn),
                // Pool is gone; nothing to return to.
                None => conn.close(),
            }
        }
    }
}
