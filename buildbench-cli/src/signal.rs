//! Cancellation on SIGINT / SIGTERM
//!
//! The first signal sets a flag that pipelines check before expanding the next
//! size; the current build finishes (or times out) and the partial series is
//! still written. A second signal exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the signal handler once cancellation was requested.
static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Flag shared with every running pipeline
pub fn cancel_flag() -> &'static AtomicBool {
    &CANCEL_REQUESTED
}

/// Whether a SIGINT or SIGTERM was received
pub fn cancel_requested() -> bool {
    CANCEL_REQUESTED.load(Ordering::Relaxed)
}

/// Install the SIGINT and SIGTERM handlers.
/// The handler is async-signal-safe (atomic store or `_exit`).
pub fn install_cancel_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = cancel_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

extern "C" fn cancel_handler(sig: libc::c_int) {
    if CANCEL_REQUESTED.swap(true, Ordering::Relaxed) {
        unsafe { libc::_exit(128 + sig) };
    }
}
