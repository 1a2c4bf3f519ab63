//! Plugin lifecycle sequencing.
//!
//! Three phases run in a fixed order, each at most once:
//!
//! 1. **Preload**: synchronously inside [`Lifecycle::attach`], before the
//!    host's static initialization.
//! 2. **PostLoad**: synchronously on the loader's dispatch thread when the
//!    loader broadcasts its `postload` message.
//! 3. **DelayLoad**: on a dedicated worker, a fixed delay after PostLoad.
//!    The delay is a heuristic for "the host finished its own asynchronous
//!    startup"; nothing checks that it actually did.
//!
//! If the listener cannot be registered, only Preload ever runs.

mod cancel;
mod timer;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use strum::Display;
use tracing::{debug, error, info, warn};

use crate::abi;
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};

pub use cancel::CancellationToken;
#[cfg(test)]
pub(crate) use timer::ManualTimer;
pub use timer::{DelayTimer, ScheduledTask, SystemTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[repr(u8)]
pub enum Phase {
    #[strum(serialize = "preload")]
    Preload = 0,
    #[strum(serialize = "postload")]
    PostLoad = 1,
    #[strum(serialize = "delayload")]
    DelayLoad = 2,
}

/// Code run at each phase.
///
/// Handlers take no arguments and should return quickly: Preload and
/// PostLoad block the loader while they run.
pub trait LifecycleHandlers: Send + Sync + 'static {
    fn on_preload(&self) {}

    fn on_post_load(&self) {}

    fn on_delay_load(&self) {}
}

/// The loader's listener registry
pub trait MessageBus {
    /// Register this plugin's message callback for messages from `sender`
    fn register_listener(&self, sender: &str) -> bool;
}

/// What [`Lifecycle::handle_message`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not a postload message
    Ignored,
    /// Postload arrived before Preload finished
    NotReady,
    /// PostLoad already ran
    Duplicate,
    /// PostLoad ran and DelayLoad is scheduled
    PostLoadRan,
}

// Internal states; "-ING" states mark a handler in progress.
const DETACHED: u8 = 0;
const PRELOADING: u8 = 1;
const PRELOADED: u8 = 2;
const POSTLOADING: u8 = 3;
const POSTLOADED: u8 = 4;
const DELAYLOADING: u8 = 5;
const DELAYLOADED: u8 = 6;
// DelayLoad will never run: cancelled, or its worker could not be spawned
const CANCELLED: u8 = 7;

const DELAY_WORKER_NAME: &str = "sfpatch-delayload";

/// Drives [`LifecycleHandlers`] through Preload → PostLoad → DelayLoad
pub struct Lifecycle<H> {
    handlers: Arc<H>,
    config: LifecycleConfig,
    timer: Arc<dyn DelayTimer>,
    state: Arc<AtomicU8>,
    pending: Mutex<Option<ScheduledTask>>,
}

impl<H: LifecycleHandlers> Lifecycle<H> {
    pub fn new(handlers: H, config: LifecycleConfig) -> Self {
        Self::with_timer(handlers, config, Arc::new(SystemTimer))
    }

    pub fn with_timer(handlers: H, config: LifecycleConfig, timer: Arc<dyn DelayTimer>) -> Self {
        Self {
            handlers: Arc::new(handlers),
            config,
            timer,
            state: Arc::new(AtomicU8::new(DETACHED)),
            pending: Mutex::new(None),
        }
    }

    pub fn handlers(&self) -> &H {
        &self.handlers
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Last phase whose handler has completed
    pub fn phase(&self) -> Option<Phase> {
        match self.state.load(Ordering::SeqCst) {
            PRELOADED | POSTLOADING => Some(Phase::Preload),
            POSTLOADED | DELAYLOADING | CANCELLED => Some(Phase::PostLoad),
            DELAYLOADED => Some(Phase::DelayLoad),
            _ => None,
        }
    }

    /// Run Preload, then register for the loader's postload message.
    ///
    /// Preload runs even when registration fails. Registration errors take
    /// precedence over a Preload panic in the returned result.
    pub fn attach(&self, bus: Option<&dyn MessageBus>) -> Result<()> {
        if self
            .state
            .compare_exchange(DETACHED, PRELOADING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyAttached);
        }

        info!("Running {} handler", Phase::Preload);
        let preload = run_handler(Phase::Preload, || self.handlers.on_preload());
        self.state.store(PRELOADED, Ordering::SeqCst);

        let sender = self.config.listen_to.as_str();
        let Some(bus) = bus else {
            warn!("Messaging interface unavailable; only preload will run");
            return Err(Error::MessagingUnavailable);
        };

        if !bus.register_listener(sender) {
            warn!("Listener registration for {:?} rejected; only preload will run", sender);
            return Err(Error::RegistrationRejected {
                sender: sender.to_string(),
            });
        }

        info!("Registered postload listener for {:?}", sender);
        preload
    }

    /// React to a message from the loader.
    ///
    /// Only [`abi::MESSAGE_POST_LOAD`] does anything: the first one runs
    /// PostLoad on the calling thread and then schedules DelayLoad.
    pub fn handle_message(&self, kind: u32) -> Result<MessageOutcome> {
        if kind != abi::MESSAGE_POST_LOAD {
            debug!("Ignoring loader message type {}", kind);
            return Ok(MessageOutcome::Ignored);
        }

        match self.state.compare_exchange(
            PRELOADED,
            POSTLOADING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(DETACHED | PRELOADING) => {
                warn!("Postload message arrived before preload completed");
                return Ok(MessageOutcome::NotReady);
            }
            Err(_) => {
                debug!("Ignoring repeated postload message");
                return Ok(MessageOutcome::Duplicate);
            }
        }

        info!("Running {} handler", Phase::PostLoad);
        let post_load = run_handler(Phase::PostLoad, || self.handlers.on_post_load());
        self.state.store(POSTLOADED, Ordering::SeqCst);

        let scheduled = self.schedule_delay_load();
        if scheduled.is_err() {
            self.state.store(CANCELLED, Ordering::SeqCst);
        }
        post_load_outcome(post_load, scheduled)
    }

    fn schedule_delay_load(&self) -> Result<()> {
        let handlers = Arc::clone(&self.handlers);
        let state = Arc::clone(&self.state);
        let delay = self.config.delay_load_after;

        let task = ScheduledTask::spawn(DELAY_WORKER_NAME, Arc::clone(&self.timer), delay, move || {
            if state
                .compare_exchange(POSTLOADED, DELAYLOADING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            info!("Running {} handler", Phase::DelayLoad);
            // Panics are logged inside run_handler; nobody is waiting on the result
            let _ = run_handler(Phase::DelayLoad, || handlers.on_delay_load());
            state.store(DELAYLOADED, Ordering::SeqCst);
        })
        .map_err(|e| {
            error!("Failed to spawn {}: {}", DELAY_WORKER_NAME, e);
            Error::SpawnFailed(e)
        })?;

        debug!("Scheduled {} in {:?}", Phase::DelayLoad, delay);
        let mut pending = self.lock_pending();
        // cancel_pending may have won before the task was stored
        if self.state.load(Ordering::SeqCst) == CANCELLED {
            task.cancel();
        }
        *pending = Some(task);
        Ok(())
    }

    /// Cancel a scheduled DelayLoad that has not started yet.
    ///
    /// Returns `true` only if this call stopped the handler from running.
    /// A DelayLoad already in progress is left to finish and yields `false`.
    pub fn cancel_pending(&self) -> bool {
        if self
            .state
            .compare_exchange(POSTLOADED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        info!("Cancelling pending {}", Phase::DelayLoad);
        if let Some(task) = self.lock_pending().as_ref() {
            task.cancel();
        }
        true
    }

    /// Block until the DelayLoad worker exits.
    ///
    /// Returns `false` if no worker was scheduled.
    pub fn wait_pending(&self) -> bool {
        let task = self.lock_pending().take();
        match task {
            Some(task) => task.join(),
            None => false,
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<ScheduledTask>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Result of a postload message once DelayLoad scheduling is known.
///
/// A spawn failure is returned in preference to a PostLoad panic, which is
/// logged so it is not lost.
fn post_load_outcome(post_load: Result<()>, scheduled: Result<()>) -> Result<MessageOutcome> {
    match (post_load, scheduled) {
        (post_load, Ok(())) => post_load.map(|()| MessageOutcome::PostLoadRan),
        (Err(post_load), Err(spawn)) => {
            error!("{} failed before scheduling also failed: {}", Phase::PostLoad, post_load);
            Err(spawn)
        }
        (Ok(()), Err(spawn)) => Err(spawn),
    }
}

fn run_handler(phase: Phase, handler: impl FnOnce()) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(handler)).map_err(|_| {
        error!("{} handler panicked", phase);
        Error::HandlerPanicked { phase }
    })
}
