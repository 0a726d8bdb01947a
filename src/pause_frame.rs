//! Cooperative frame pausing
//!
//! A panel that needs to finish asynchronous work before the next frame is
//! delivered calls [`FramePauseController::pause_frame`] while rendering and
//! keeps the returned [`ResumeFrame`] guard until the work is done. The
//! provider drains the pending waits after each render and awaits them with
//! [`pause_frame_for_promises`] before acknowledging the frame to the Player.
//!
//! All waits are awaited concurrently under one deadline, so a stuck panel
//! delays the pipeline by at most the timeout. A failed wait is reported to
//! the user and does not hold up the others.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::notify::{Notification, Notifier};

/// Default ceiling for a single frame pause
pub const MAX_PROMISE_TIMEOUT: Duration = Duration::from_millis(5000);

type WaitResult = std::result::Result<(), String>;

/// A named wait recorded by `pause_frame`
pub struct FramePromise {
    pub name: String,
    wait: BoxFuture<'static, WaitResult>,
}

impl FramePromise {
    /// Wrap an arbitrary future; an `Err` counts as a panel-side failure
    pub fn new<F>(name: impl Into<String>, wait: F) -> Self
    where
        F: Future<Output = WaitResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            wait: wait.boxed(),
        }
    }
}

impl std::fmt::Debug for FramePromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePromise").field("name", &self.name).finish()
    }
}

/// Guard returned by `pause_frame`
///
/// Dropping the guard resumes the frame. Resuming after the provider has
/// already given up on the wait is a no-op.
#[derive(Debug)]
pub struct ResumeFrame {
    name: String,
    tx: Option<oneshot::Sender<WaitResult>>,
}

impl ResumeFrame {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resume(mut self) {
        self.settle(Ok(()));
    }

    /// Resume, reporting a failure in the panel's async work
    pub fn fail(mut self, reason: impl Into<String>) {
        self.settle(Err(reason.into()));
    }

    fn settle(&mut self, result: WaitResult) {
        if let Some(tx) = self.tx.take() {
            // The receiver is gone once the provider timed out
            let _ = tx.send(result);
        }
    }
}

impl Drop for ResumeFrame {
    fn drop(&mut self) {
        self.settle(Ok(()));
    }
}

/// Shared list of pending frame waits
#[derive(Debug, Clone, Default)]
pub struct FramePauseController {
    pending: Arc<Mutex<Vec<FramePromise>>>,
}

impl FramePauseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the next frame until the returned guard is resumed or dropped
    pub fn pause_frame(&self, name: impl Into<String>) -> ResumeFrame {
        let name = name.into();
        let (tx, rx) = oneshot::channel();
        let wait = rx.map(|r| r.unwrap_or(Ok(())));

        tracing::trace!("Frame paused by {}", name);
        self.push(FramePromise::new(name.clone(), wait));

        ResumeFrame { name, tx: Some(tx) }
    }

    /// Record an externally created wait
    pub fn push(&self, promise: FramePromise) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(promise);
    }

    /// Take every pending wait, leaving the list empty
    pub fn drain(&self) -> Vec<FramePromise> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// What happened to each wait of one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePauseOutcome {
    pub completed: Vec<String>,
    /// Name and reason of each failed wait
    pub failed: Vec<(String, String)>,
    pub timed_out: Vec<String>,
}

impl FramePauseOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }
}

/// Await every wait concurrently, giving up after `timeout`
///
/// Never fails: failures are sent to `notifier`, timeouts are logged.
pub async fn pause_frame_for_promises(
    promises: Vec<FramePromise>,
    timeout: Duration,
    notifier: &dyn Notifier,
) -> FramePauseOutcome {
    let mut outcome = FramePauseOutcome::default();
    if promises.is_empty() {
        return outcome;
    }

    let mut pending: Vec<Option<String>> = promises.iter().map(|p| Some(p.name.clone())).collect();
    let mut waits: FuturesUnordered<_> = promises
        .into_iter()
        .enumerate()
        .map(|(index, p)| p.wait.map(move |result| (index, result)))
        .collect();

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, waits.next()).await {
            Ok(Some((index, result))) => {
                let Some(name) = pending[index].take() else {
                    continue;
                };
                match result {
                    Ok(()) => outcome.completed.push(name),
                    Err(reason) => {
                        notifier.notify(Notification::error(
                            format!("Panel \"{}\" failed while the frame was paused", name),
                            reason.clone(),
                        ));
                        outcome.failed.push((name, reason));
                    }
                }
            }
            Ok(None) => break,
            Err(_elapsed) => {
                // Indexed, so two panels sharing a name are reported separately
                outcome.timed_out = std::mem::take(&mut pending).into_iter().flatten().collect();
                tracing::error!(
                    "pauseFrame timed out after {}ms: {}",
                    timeout.as_millis(),
                    outcome.timed_out.join(", ")
                );
                break;
            }
        }
    }

    outcome
}
