//! One-shot deferred work run by the server loop between polls.
//!
//! Enqueueing never blocks and never touches a transport. The loop drains
//! the queue after it has written the responses for everything it read in
//! that iteration, which is what keeps an injected fault behind the reply
//! to the call that requested it.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tracing::{debug, warn};

use crate::error::{ScheduleError, TaskError};
use crate::registry::TransportRegistry;

/// A unit of deferred work. Runs exactly once against the live registry.
pub type DeferredTask = Box<dyn FnOnce(&mut TransportRegistry) -> Result<(), TaskError> + Send>;

struct Scheduled {
    label: &'static str,
    task: DeferredTask,
}

/// Create a connected scheduler/queue pair.
pub fn deferred_queue() -> (DeferredScheduler, DeferredQueue) {
    let (tx, rx) = mpsc::channel();
    (DeferredScheduler { tx }, DeferredQueue { rx })
}

/// Enqueue side. Cheap to clone and safe to hand to method handlers.
#[derive(Clone)]
pub struct DeferredScheduler {
    tx: Sender<Scheduled>,
}

impl DeferredScheduler {
    /// Queue `task` for the next drain.
    ///
    /// Fails only when the [`DeferredQueue`] has been dropped.
    pub fn schedule<F>(&self, label: &'static str, task: F) -> Result<(), ScheduleError>
    where
        F: FnOnce(&mut TransportRegistry) -> Result<(), TaskError> + Send + 'static,
    {
        self.tx
            .send(Scheduled {
                label,
                task: Box::new(task),
            })
            .map_err(|_| ScheduleError(label))?;
        debug!(task = label, "deferred task scheduled");
        Ok(())
    }
}

impl std::fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredScheduler").finish_non_exhaustive()
    }
}

/// Single-consumer side, owned by the server loop.
pub struct DeferredQueue {
    rx: Receiver<Scheduled>,
}

impl DeferredQueue {
    /// Run every task queued before this call, in submission order.
    ///
    /// Tasks scheduled while draining wait for the next call. Task failures
    /// are logged and do not stop the drain. Returns the number of tasks run.
    pub fn run_ready(&mut self, registry: &mut TransportRegistry) -> usize {
        let mut ready = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(scheduled) => ready.push(scheduled),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let count = ready.len();
        for Scheduled { label, task } in ready {
            match task(registry) {
                Ok(()) => debug!(task = label, "deferred task finished"),
                Err(err) => warn!(task = label, error = %err, "deferred task failed"),
            }
        }
        count
    }
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue").finish_non_exhaustive()
    }
}
