//! Background reclamation of expired runs.
//!
//! The reaper thread wakes every `sweep_interval`, independent of client
//! calls, and abandons dispatched runs older than `run_timeout` in every job
//! of the registry. It is stopped and joined when dropped.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::Registry;
use crate::sync::lock;

#[derive(Debug, Default)]
struct Shutdown {
    stop: Mutex<bool>,
    signal: Condvar,
}

/// Handle to the reaper thread.
#[derive(Debug)]
pub(crate) struct Reaper {
    shutdown: Arc<Shutdown>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn the sweep thread. Holds only a weak reference to the registry.
    pub(crate) fn spawn(registry: Weak<Registry>, interval: Duration) -> std::io::Result<Self> {
        let shutdown = Arc::new(Shutdown::default());
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("valicy-reaper".into())
            .spawn(move || sweep_loop(&registry, &thread_shutdown, interval))?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        *lock(&self.shutdown.stop) = true;
        self.shutdown.signal.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("reaper thread panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep_loop(registry: &Weak<Registry>, shutdown: &Shutdown, interval: Duration) {
    tracing::debug!(?interval, "reaper started");
    let mut stop = lock(&shutdown.stop);
    loop {
        let (guard, _) = shutdown
            .signal
            .wait_timeout(stop, interval)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        stop = guard;
        if *stop {
            break;
        }
        let Some(registry) = registry.upgrade() else {
            break;
        };
        drop(stop);
        let reclaimed = registry.sweep();
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "reaper sweep");
        }
        drop(registry);
        stop = lock(&shutdown.stop);
    }
    tracing::debug!("reaper stopped");
}
