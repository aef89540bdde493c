// SPDX-License-Identifier: GPL-3.0-only
//! Worker thread for per-frame processing
//!
//! The worker owns its state outright. Between iterations it checks a
//! cooperative cancel flag; once the loop ends, either because it was
//! cancelled or because an iteration returned [`LoopAction::Stop`], the state
//! is handed to a teardown closure on the same thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the worker should do after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    /// End the loop and run teardown
    Stop,
}

/// Handle to a running worker thread
///
/// ```ignore
/// let mut worker = FrameLoopController::start(
///     "vidmask-stream",
///     session,
///     StreamSession::step,
///     |session| session.teardown(),
/// )?;
/// worker.stop();
/// ```
pub struct FrameLoopController {
    handle: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    name: String,
}

impl FrameLoopController {
    /// Spawn the worker
    ///
    /// `step` runs until it returns [`LoopAction::Stop`] or the loop is
    /// cancelled. `teardown` runs exactly once afterwards, on the worker.
    pub fn start<S, F, D>(
        name: &str,
        mut state: S,
        mut step: F,
        teardown: D,
    ) -> std::io::Result<Self>
    where
        S: Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        D: FnOnce(S) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let worker_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!(name = %worker_name, "Worker started");
            let mut iterations: u64 = 0;

            while !worker_cancel.load(Ordering::SeqCst) {
                iterations += 1;
                if step(&mut state) == LoopAction::Stop {
                    debug!(name = %worker_name, iterations, "Worker ended itself");
                    break;
                }
            }

            teardown(state);
            info!(name = %worker_name, iterations, "Worker exited");
        })?;

        info!(name, "Worker spawned");
        Ok(Self {
            handle: Some(handle),
            cancel,
            name: name.to_string(),
        })
    }

    /// Whether the worker thread has not yet exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the worker to exit after its current iteration
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Cancelling worker");
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Cancel and wait for teardown
    ///
    /// Returns `false` if the worker panicked.
    pub fn stop(&mut self) -> bool {
        self.request_stop();
        self.join()
    }

    /// Wait for the worker to exit on its own
    ///
    /// Returns `false` if the worker panicked. Joining twice is a no-op.
    pub fn join(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        match handle.join() {
            Ok(()) => true,
            Err(e) => {
                warn!(name = %self.name, "Worker panicked: {:?}", e);
                false
            }
        }
    }
}

impl Drop for FrameLoopController {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}
