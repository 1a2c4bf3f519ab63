use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::cancel::CancellationToken;

/// Source of the delay between post-load and delay-load
pub trait DelayTimer: Send + Sync {
    /// Block for `duration` unless `token` is cancelled first.
    ///
    /// Returns `true` if the full duration elapsed.
    fn wait(&self, duration: Duration, token: &CancellationToken) -> bool;
}

/// Wall-clock timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimer;

impl DelayTimer for SystemTimer {
    fn wait(&self, duration: Duration, token: &CancellationToken) -> bool {
        !token.wait(duration)
    }
}

/// A callback pending on its own thread, cancellable until it starts
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn a named worker that waits `delay` on `timer`, then runs `task`
    /// unless cancelled in the meantime.
    pub fn spawn<F>(
        name: &str,
        timer: Arc<dyn DelayTimer>,
        delay: Duration,
        task: F,
    ) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let worker_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if timer.wait(delay, &worker_token) && !worker_token.is_cancelled() {
                    task();
                } else {
                    debug!("{} cancelled before running", worker_name);
                }
            })?;

        Ok(Self { token, handle })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to exit. Returns `false` if it panicked.
    pub fn join(self) -> bool {
        self.handle.join().is_ok()
    }
}

#[cfg(test)]
pub(crate) use manual::ManualTimer;
