//! Render scheduler - one task per slot, stale-result discard, single retry
//!
//! Every render request goes through here. Starting a task in a slot cancels
//! whatever that slot was doing, and only the slot's newest task may deliver
//! a result. Completed pages are stored into the page buffer from
//! `handle_response` and nowhere else.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use flume::Sender;
use log::{debug, warn};

use super::cache::PageBuffer;
use super::cancel::CancelToken;
use super::error::ViewerError;
use super::request::{RenderRequest, RenderResponse, RequestId, Slot};
use super::types::SharedEntry;

/// Completion state of a render task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Cancelled,
    Failed,
}

/// A render request the scheduler is tracking
#[derive(Debug)]
struct RenderTask {
    id: RequestId,
    page: usize,
    scale: f32,
    state: TaskState,
    /// 0 for the first try, 1 for the automatic retry
    attempt: u8,
    cancel: CancelToken,
}

/// What `request_render` did
#[derive(Debug)]
pub enum Dispatch {
    /// Served from the page buffer; nothing was queued
    Cached(SharedEntry),
    /// Sent to the render worker
    Queued(RequestId),
}

/// A finished render, ready to be applied to its slot's target
#[derive(Debug)]
pub enum Completion {
    Rendered {
        slot: Slot,
        entry: SharedEntry,
    },
    /// Terminal failure after the automatic retry
    Failed {
        slot: Slot,
        page: usize,
        scale: f32,
        error: ViewerError,
    },
}

/// Scheduler statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Requests sent to the worker, retries included
    pub submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
    /// Results that arrived after their slot moved on
    pub discarded: u64,
    pub retried: u64,
    pub failed: u64,
}

#[derive(Debug)]
struct PendingRetry {
    slot: Slot,
    page: usize,
    scale: f32,
    due: Instant,
}

/// Per-slot render task scheduler
pub struct RenderScheduler {
    requests: Sender<RenderRequest>,
    tasks: HashMap<Slot, RenderTask>,
    retries: Vec<PendingRetry>,
    next_request_id: u64,
    generation: u64,
    retry_delay: Duration,
    stats: SchedulerStats,
}

impl RenderScheduler {
    #[must_use]
    pub fn new(requests: Sender<RenderRequest>, retry_delay: Duration) -> Self {
        Self {
            requests,
            tasks: HashMap::new(),
            retries: Vec::new(),
            next_request_id: 1,
            generation: 0,
            retry_delay,
            stats: SchedulerStats::default(),
        }
    }

    /// Document generation stamped onto new requests
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Render `page` at `scale` into `slot`.
    ///
    /// Cancels the slot's previous task first, then serves from `buffer` when
    /// possible and queues a worker request otherwise.
    pub fn request_render(
        &mut self,
        page: usize,
        scale: f32,
        slot: Slot,
        buffer: &mut PageBuffer,
    ) -> Dispatch {
        self.cancel(slot);

        if let Some(entry) = buffer.get(page, scale) {
            return Dispatch::Cached(entry);
        }

        Dispatch::Queued(self.submit(slot, page, scale, 0))
    }

    fn submit(&mut self, slot: Slot, page: usize, scale: f32, attempt: u8) -> RequestId {
        let id = self.next_id();
        let cancel = CancelToken::new();

        let sent = self.requests.send(RenderRequest::Page {
            id,
            generation: self.generation,
            page,
            scale,
            cancel: cancel.clone(),
        });
        if sent.is_err() {
            warn!("Render worker unavailable; page {page} will not render");
        }

        self.tasks.insert(
            slot,
            RenderTask {
                id,
                page,
                scale,
                state: TaskState::Pending,
                attempt,
                cancel,
            },
        );
        self.stats.submitted += 1;
        id
    }

    /// Cancel the slot's task and any retry waiting for it.
    ///
    /// Returns true if something was cancelled.
    pub fn cancel(&mut self, slot: Slot) -> bool {
        let before = self.retries.len();
        self.retries.retain(|retry| retry.slot != slot);
        let dropped_retry = self.retries.len() != before;

        let Some(mut task) = self.tasks.remove(&slot) else {
            return dropped_retry;
        };
        task.cancel.cancel();
        task.state = TaskState::Cancelled;
        self.stats.cancelled += 1;
        debug!("Cancelled {:?} render of page {} ({:?})", slot, task.page, task.id);
        true
    }

    /// Cancel every task and pending retry
    pub fn cancel_all(&mut self) {
        let slots: Vec<Slot> = self.tasks.keys().copied().collect();
        for slot in slots {
            self.cancel(slot);
        }
        self.retries.clear();
    }

    /// Tasks that may still write into `slot`; never more than one
    #[must_use]
    pub fn in_flight(&self, slot: Slot) -> usize {
        self.tasks
            .get(&slot)
            .filter(|task| task.state == TaskState::Pending)
            .map_or(0, |_| 1)
    }

    #[cfg(test)]
    fn task(&self, slot: Slot) -> Option<&RenderTask> {
        self.tasks.get(&slot)
    }

    /// True while `slot` has a queued task or a retry waiting
    #[must_use]
    pub fn is_busy(&self, slot: Slot) -> bool {
        self.tasks.contains_key(&slot) || self.retries.iter().any(|r| r.slot == slot)
    }

    /// True when nothing is queued or waiting to retry
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.retries.is_empty()
    }

    /// Earliest pending retry deadline
    #[must_use]
    pub fn next_retry_due(&self) -> Option<Instant> {
        self.retries.iter().map(|retry| retry.due).min()
    }

    #[must_use]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Apply a worker response.
    ///
    /// Results for ids that are no longer their slot's current task are
    /// dropped. Successful pages go into `buffer`.
    pub fn handle_response(
        &mut self,
        response: RenderResponse,
        buffer: &mut PageBuffer,
        now: Instant,
    ) -> Option<Completion> {
        match response {
            RenderResponse::Page { id, entry } => {
                let Some(slot) = self.slot_of(id) else {
                    self.stats.discarded += 1;
                    debug!("Discarding stale render of page {} ({id:?})", entry.page);
                    return None;
                };
                let task = self.tasks.remove(&slot)?;
                if !entry.matches(task.page, task.scale) {
                    warn!(
                        "Worker returned page {} @ {} for page {} @ {}",
                        entry.page, entry.scale, task.page, task.scale
                    );
                    self.stats.discarded += 1;
                    return None;
                }

                let entry = buffer.put(entry);
                self.stats.completed += 1;
                Some(Completion::Rendered { slot, entry })
            }

            RenderResponse::Cancelled(id) => {
                // Tokens of current tasks are never cancelled; the worker or
                // engine gave up on its own
                let slot = self.slot_of(id)?;
                let page = self.tasks.get(&slot)?.page;
                self.fail(slot, ViewerError::render(page, "render dropped by worker"), now)
            }

            RenderResponse::Error { id, error } => {
                let slot = self.slot_of(id)?;
                let error = match error {
                    ViewerError::Cancelled => {
                        let page = self.tasks.get(&slot)?.page;
                        ViewerError::render(page, "cancelled by engine")
                    }
                    error => error,
                };
                self.fail(slot, error, now)
            }

            RenderResponse::DocumentInfo { .. } | RenderResponse::LoadFailed { .. } => None,
        }
    }

    /// Schedule the single retry for `slot`, or give up if it already had one
    fn fail(&mut self, slot: Slot, error: ViewerError, now: Instant) -> Option<Completion> {
        let mut task = self.tasks.remove(&slot)?;
        task.state = TaskState::Failed;

        if task.attempt == 0 {
            debug!(
                "Render of page {} failed ({error}); retrying in {:?}",
                task.page, self.retry_delay
            );
            self.retries.push(PendingRetry {
                slot,
                page: task.page,
                scale: task.scale,
                due: now + self.retry_delay,
            });
            self.stats.retried += 1;
            return None;
        }

        warn!("Render of page {} failed after retry: {error}", task.page);
        self.stats.failed += 1;
        Some(Completion::Failed {
            slot,
            page: task.page,
            scale: task.scale,
            error,
        })
    }

    /// Dispatch retries that are due. Retries already satisfied by the
    /// buffer complete immediately.
    pub fn tick(&mut self, now: Instant, buffer: &mut PageBuffer) -> Vec<Completion> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.retries.drain(..).partition(|retry| retry.due <= now);
        self.retries = waiting;

        let mut completions = vec![];
        for retry in due {
            if let Some(entry) = buffer.get(retry.page, retry.scale) {
                completions.push(Completion::Rendered {
                    slot: retry.slot,
                    entry,
                });
                continue;
            }
            self.submit(retry.slot, retry.page, retry.scale, 1);
        }
        completions
    }

    fn slot_of(&self, id: RequestId) -> Option<Slot> {
        self.tasks
            .iter()
            .find(|(_, task)| task.id == id)
            .map(|(slot, _)| *slot)
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}
