//! Abort injection
//!
//! An abort request may arrive from an asynchronous signal handler while the
//! driver is in the middle of a run. The handler only touches atomics; the
//! engine picks the request up at its next checkpoint, installs the monitor
//! hook on whichever context is executing, and the hook turns the request
//! into a `Fatal(Exit)` outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::runtime::diagnostics;
use crate::vm::context::MonitorHook;

/// Process-wide abort state targeted by the SIGINT handler.
static GLOBAL: Lazy<Arc<AbortState>> = Lazy::new(|| Arc::new(AbortState::new()));

/// Thread-safe abort request storage.
///
/// Once set, the request stays set for the rest of the run.
#[derive(Debug)]
pub struct AbortState {
    aborted: AtomicBool,
    hook_requested: AtomicBool,
    hook: MonitorHook,
}

impl Default for AbortState {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortState {
    /// New state whose checkpoint hook is the diagnostics monitor.
    pub fn new() -> Self {
        Self::with_hook(diagnostics::monitor)
    }

    /// New state installing `hook` when an abort is requested.
    pub fn with_hook(hook: MonitorHook) -> Self {
        Self {
            aborted: AtomicBool::new(false),
            hook_requested: AtomicBool::new(false),
            hook,
        }
    }

    /// The process-wide instance
    pub fn global() -> Arc<AbortState> {
        Arc::clone(&GLOBAL)
    }

    /// Request an abort. Safe to call from a signal handler.
    #[inline]
    pub fn request(&self) {
        self.hook_requested.store(true, Ordering::SeqCst);
        self.aborted.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_hook_requested(&self) -> bool {
        self.hook_requested.load(Ordering::SeqCst)
    }

    /// Hook to install on the active context once requested
    #[inline]
    pub fn hook(&self) -> MonitorHook {
        self.hook
    }
}

/// Request an abort of the program running under the global state.
pub fn request_abort() {
    GLOBAL.request();
}

#[cfg(unix)]
extern "C" fn on_sigint(sig: libc::c_int) {
    request_abort();
    // one-shot delivery on some platforms: re-register
    unsafe {
        libc::signal(sig, on_sigint as libc::sighandler_t);
    }
}

/// Route SIGINT to [`request_abort`].
#[cfg(unix)]
pub fn install_signal_handler() {
    // Force the global into existence outside signal context.
    Lazy::force(&GLOBAL);
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
    debug!("SIGINT routed to abort request");
}

#[cfg(not(unix))]
pub fn install_signal_handler() {
    Lazy::force(&GLOBAL);
    debug!("signal-driven abort unavailable on this platform");
}
