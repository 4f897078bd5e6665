//! Bounded lease/return of [`Stream`]s, capped by a counting semaphore.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;
use crate::stream::Stream;

/// `(free_streams, semaphore, host, port)` as described in the data model:
/// at any instant `leased + free_streams.len() <= max_connections`.
pub struct Pool {
    free_streams: Mutex<Vec<Stream>>,
    semaphore: Arc<Semaphore>,
    host: String,
    port: u16,
    timeout: Option<Duration>,
}

impl Pool {
    pub fn new(host: String, port: u16, max_connections: usize, timeout: Option<Duration>) -> Self {
        Pool {
            free_streams: Mutex::new(Vec::with_capacity(max_connections)),
            semaphore: Arc::new(Semaphore::new(max_connections)),
            host,
            port,
            timeout,
        }
    }

    /// Number of streams currently sitting idle in the free list. Exposed
    /// for tests that assert the pool never opens more sockets than
    /// `max_connections` allows.
    pub fn free_count(&self) -> usize {
        self.free_streams.lock().len()
    }

    /// Suspend until a semaphore permit is acquired, then hand back a lease
    /// wrapping either a reused idle stream or a freshly opened one. The
    /// permit is held by the lease and released exactly once when the lease
    /// is dropped, regardless of how the caller's operation completes.
    pub async fn lease(self: &Arc<Self>) -> Result<Lease> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.expect(
            "pool semaphore is never closed while the pool is alive",
        );

        let existing = self.free_streams.lock().pop();
        let stream = match existing {
            Some(stream) => stream,
            None => {
                debug!("opening new connection to {}:{}", self.host, self.port);
                Stream::connect(&self.host, self.port, self.timeout).await?
            }
        };

        Ok(Lease {
            pool: Arc::clone(self),
            stream: Some(stream),
            _permit: permit,
            healthy: false,
        })
    }
}

/// An owned stream leased from the [`Pool`]. Callers must call
/// [`Lease::release`] on the happy path; if a `Lease` is dropped without
/// being released (error, panic, or task cancellation) its stream is
/// discarded and the semaphore permit is still returned, since the permit's
/// `Drop` impl runs unconditionally.
pub struct Lease {
    pool: Arc<Pool>,
    stream: Option<Stream>,
    _permit: OwnedSemaphorePermit,
    healthy: bool,
}

impl Lease {
    pub fn stream(&mut self) -> &mut Stream {
        self.stream.as_mut().expect("stream taken from an active lease")
    }

    /// Mark this lease as having completed without a protocol or I/O error,
    /// so the stream is returned to the free list when the lease is dropped.
    pub fn mark_healthy(&mut self) {
        self.healthy = true;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.healthy {
            if let Some(stream) = self.stream.take() {
                let mut free = self.pool.free_streams.lock();
                free.push(stream);
            }
        } else {
            warn!("discarding stream after a failed operation");
        }
        // _permit drops here, releasing exactly one semaphore permit.
    }
}
