//! Deadlines, cancellation and the FIFO slot semaphore.
//!
//! Every blocking point in the crate (socket I/O, TLS handshake, DNS,
//! pool slot acquisition) takes a [`Deadline`]. A deadline is an optional
//! absolute instant combined with an optional [`CancelToken`]; timeouts are
//! nothing more than cancellations driven by a timer, so both surface as
//! [`Error::OperationAborted`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::Error;

/// Signal that aborts blocking operations observing it.
///
/// Cloning shares the flag. Typically armed from another thread or a timer.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Arm the token. Every [`Deadline`] carrying it aborts at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limit for a blocking operation: an absolute instant, a cancel token,
/// both, or neither (wait forever).
#[derive(Clone, Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Deadline {
    /// A deadline that never triggers.
    pub fn none() -> Self {
        Deadline::default()
    }

    /// Deadline `timeout` from now.
    pub fn from_now(timeout: Duration) -> Self {
        Deadline {
            at: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    /// Deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Deadline {
            at: Some(instant),
            cancel: None,
        }
    }

    /// Attach a cancel token, keeping any time limit.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Error out if cancelled or past due.
    pub fn check(&self) -> Result<(), Error> {
        self.remaining().map(|_| ())
    }

    /// Time left until the deadline. `Ok(None)` means unbounded.
    pub fn remaining(&self) -> Result<Option<Duration>, Error> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(Error::OperationAborted);
            }
        }
        match self.at {
            None => Ok(None),
            Some(at) => match at.checked_duration_since(Instant::now()) {
                None => Err(Error::OperationAborted),
                Some(left) => Ok(Some(left)),
            },
        }
    }

    /// Timeout for blocking waits that can be retried (socket reads,
    /// condvar waits). When a cancel token is attached but no instant, a
    /// short poll interval is returned so the token gets observed; the
    /// waiter re-checks the deadline and retries on timeout.
    pub(crate) fn poll_timeout(&self) -> Result<Option<Duration>, Error> {
        const CANCEL_POLL: Duration = Duration::from_millis(250);
        let left = self.remaining()?;
        Ok(match (left, &self.cancel) {
            (Some(d), Some(_)) => Some(d.min(CANCEL_POLL).max(Duration::from_millis(1))),
            (Some(d), None) => Some(d.max(Duration::from_millis(1))),
            (None, Some(_)) => Some(CANCEL_POLL),
            (None, None) => None,
        })
    }

    /// Timeout for waits that cannot be retried midway (socket writes,
    /// connects): the hard time limit only.
    pub(crate) fn write_timeout(&self) -> Result<Option<Duration>, Error> {
        Ok(self
            .remaining()?
            .map(|d| d.max(Duration::from_millis(1))))
    }
}

struct SemState {
    available: usize,
    queue: VecDeque<u64>,
    next_ticket: u64,
    shutdown: bool,
}

/// Bounded semaphore with strictly FIFO waiters.
///
/// Waiters take a ticket and are served in ticket order. A waiter that is
/// cancelled (deadline) removes its ticket so later waiters are not
/// blocked behind it. [`FifoSemaphore::shutdown`] aborts all waiters.
pub(crate) struct FifoSemaphore {
    state: Mutex<SemState>,
    cond: Condvar,
}

impl FifoSemaphore {
    pub fn new(slots: usize) -> Self {
        FifoSemaphore {
            state: Mutex::new(SemState {
                available: slots,
                queue: VecDeque::new(),
                next_ticket: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Take a slot, waiting FIFO behind earlier callers.
    pub fn acquire(&self, deadline: &Deadline) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        loop {
            if state.shutdown {
                state.queue.retain(|t| *t != ticket);
                return Err(Error::OperationAborted);
            }
            if state.queue.front() == Some(&ticket) && state.available > 0 {
                state.available -= 1;
                state.queue.pop_front();
                // The next ticket may also be servable if slots remain.
                self.cond.notify_all();
                return Ok(());
            }
            let wait = match deadline.poll_timeout() {
                Ok(v) => v,
                Err(e) => {
                    // Surrender our place so the queue keeps moving.
                    state.queue.retain(|t| *t != ticket);
                    self.cond.notify_all();
                    return Err(e);
                }
            };
            state = match wait {
                None => self.cond.wait(state).unwrap(),
                Some(left) => self.cond.wait_timeout(state, left).unwrap().0,
            };
        }
    }

    /// Give a slot back and wake the next waiter.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.available += 1;
        self.cond.notify_all();
    }

    /// Abort all pending waiters with `OperationAborted`.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.cond.notify_all();
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.state.lock().unwrap().available
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn deadline_none_never_fires() {
        let d = Deadline::none();
        assert!(d.check().is_ok());
        assert_eq!(d.remaining().unwrap(), None);
    }

    #[test]
    fn deadline_past_aborts() {
        let d = Deadline::at(Instant::now() - Duration::from_secs(1));
        assert!(matches!(d.check(), Err(Error::OperationAborted)));
    }

    #[test]
    fn cancel_token_aborts() {
        let token = CancelToken::new();
        let d = Deadline::none().with_cancel(token.clone());
        assert!(d.check().is_ok());
        token.cancel();
        assert!(matches!(d.check(), Err(Error::OperationAborted)));
    }

    #[test]
    fn semaphore_limits() {
        let sem = FifoSemaphore::new(2);
        sem.acquire(&Deadline::none()).unwrap();
        sem.acquire(&Deadline::none()).unwrap();
        let short = Deadline::from_now(Duration::from_millis(20));
        assert!(matches!(sem.acquire(&short), Err(Error::OperationAborted)));
        sem.release();
        sem.acquire(&Deadline::none()).unwrap();
    }

    #[test]
    fn semaphore_fifo_order() {
        let sem = Arc::new(FifoSemaphore::new(1));
        sem.acquire(&Deadline::none()).unwrap();

        let (tx, rx) = mpsc::channel();
        let mut handles = vec![];
        for i in 0..3 {
            let sem = sem.clone();
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                sem.acquire(&Deadline::none()).unwrap();
                tx.send(i).unwrap();
                sem.release();
            }));
            // Give the thread time to enqueue so ticket order is 0, 1, 2.
            thread::sleep(Duration::from_millis(50));
        }

        sem.release();
        let order: Vec<i32> = (0..3).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn cancelled_waiter_does_not_block_queue() {
        let sem = Arc::new(FifoSemaphore::new(1));
        sem.acquire(&Deadline::none()).unwrap();

        // This waiter gives up quickly.
        let short = Deadline::from_now(Duration::from_millis(20));
        assert!(sem.acquire(&short).is_err());

        // A later waiter still gets the slot once released.
        let sem2 = sem.clone();
        let h = thread::spawn(move || sem2.acquire(&Deadline::from_now(Duration::from_secs(5))));
        thread::sleep(Duration::from_millis(50));
        sem.release();
        assert!(h.join().unwrap().is_ok());
    }

    #[test]
    fn shutdown_aborts_waiters() {
        let sem = Arc::new(FifoSemaphore::new(1));
        sem.acquire(&Deadline::none()).unwrap();
        let sem2 = sem.clone();
        let h = thread::spawn(move || sem2.acquire(&Deadline::none()));
        thread::sleep(Duration::from_millis(50));
        sem.shutdown();
        assert!(matches!(h.join().unwrap(), Err(Error::OperationAborted)));
    }
}
