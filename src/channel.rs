use std::sync::Arc;

use crate::handle::{Handle, SlotId};
use crate::item::FetchState;
use crate::metrics;
use crate::pool::RequestPool;
use crate::response::Response;
use crate::ring::SlotRing;
use crate::worker::{WorkerShared, WorkerThread};

/// One fetch channel: a backlog of sent requests, a fixed set of lanes, and
/// the caller-side halves of the hand-off queues.
///
/// Lanes are the channel's admission tokens. A request takes one when it
/// leaves the backlog and keeps it until its final response has been
/// delivered, so at most `num_lanes` requests per channel are ever past
/// admission. That bound is what lets callers pre-size buffers: one per lane
/// is always enough.
pub(crate) struct Channel {
    /// Held for its drop side effect: the worker is stopped and joined
    /// before the queues go away. `None` on cooperative engines.
    #[allow(dead_code)]
    pub(crate) worker: Option<WorkerThread>,
    pub(crate) shared: Option<Arc<WorkerShared>>,
    pub(crate) sent: SlotRing,
    pub(crate) free_lanes: SlotRing,
    pub(crate) user_incoming: SlotRing,
    pub(crate) user_outgoing: SlotRing,
}

impl Channel {
    pub(crate) fn new(max_requests: u32, num_lanes: u32) -> Channel {
        let mut free_lanes = SlotRing::new(num_lanes);
        for lane in 0..num_lanes {
            free_lanes.enqueue(lane);
        }
        Channel {
            worker: None,
            shared: None,
            sent: SlotRing::new(max_requests),
            free_lanes,
            user_incoming: SlotRing::new(num_lanes),
            user_outgoing: SlotRing::new(num_lanes),
        }
    }

    /// Accept a freshly allocated request into the backlog. Returns `false`
    /// when the backlog is full; the caller then rolls back the allocation.
    pub(crate) fn push_sent(&mut self, slot_id: SlotId) -> bool {
        if self.sent.is_full() {
            return false;
        }
        self.sent.enqueue(slot_id);
        true
    }

    /// Move backlogged requests onto free lanes. Admitted items keep their
    /// `Allocated` state; the lane stays with the request until its slot is
    /// freed.
    pub(crate) fn admit<R>(&mut self, pool: &RequestPool<R>) {
        let num_move = self.sent.count().min(self.free_lanes.count());
        for _ in 0..num_move {
            let slot_id = self.sent.dequeue();
            let lane = self.free_lanes.dequeue();
            match pool.lookup(slot_id) {
                Some(item) => item.lane = lane,
                None => debug_assert!(false, "backlogged id went stale"),
            }
            self.user_incoming.enqueue(slot_id);
        }
    }

    /// Apply the caller-side control flags and advance each pending item's
    /// state for dispatch. Flag order matters: pause wins over an earlier
    /// resume, cancel wins over both.
    pub(crate) fn apply_control_flags<R>(&mut self, pool: &RequestPool<R>) {
        let num_incoming = self.user_incoming.count();
        for i in 0..num_incoming {
            let slot_id = self.user_incoming.peek(i);
            let Some(item) = pool.lookup(slot_id) else {
                debug_assert!(false, "pending id went stale");
                continue;
            };
            debug_assert!(!matches!(
                item.state,
                FetchState::Initial | FetchState::Opening | FetchState::Fetching
            ));
            if item.user.pause {
                item.state = FetchState::Paused;
                item.user.pause = false;
            }
            if item.user.resume {
                if item.state == FetchState::Paused {
                    item.state = FetchState::Fetched;
                }
                item.user.resume = false;
            }
            if item.user.cancel {
                item.state = FetchState::Failed;
                item.user.finished = true;
            }
            item.state = match item.state {
                FetchState::Allocated => FetchState::Opening,
                FetchState::Opened | FetchState::Fetched => FetchState::Fetching,
                other => other,
            };
        }
    }

    /// Threaded hand-off: push pending items into the worker's inbox and
    /// pull serviced ones out of its outbox.
    pub(crate) fn exchange_with_worker(&mut self) {
        if let Some(shared) = &self.shared {
            shared.enqueue_incoming(&mut self.user_incoming);
            shared.dequeue_outgoing(&mut self.user_outgoing);
        }
    }

    /// Drain serviced items: mirror the io-side results into the caller
    /// side, derive the next state, deliver the response callback, and
    /// either retire the request (returning its lane and slot) or requeue it
    /// for the next pass.
    pub(crate) fn drain<R>(&mut self, pool: &mut RequestPool<R>) {
        while !self.user_outgoing.is_empty() {
            let slot_id = self.user_outgoing.dequeue();
            let Some(handle) = Handle::from_slot(slot_id) else {
                debug_assert!(false, "invalid id in outgoing queue");
                continue;
            };
            let (lane, finished, failed, cancelled) = {
                let Some(item) = pool.lookup(slot_id) else {
                    debug_assert!(false, "serviced id went stale");
                    continue;
                };
                debug_assert!(!matches!(
                    item.state,
                    FetchState::Initial
                        | FetchState::Allocated
                        | FetchState::Opened
                        | FetchState::Fetched
                ));

                item.user.content_size = item.io.content_size;
                item.user.content_offset = item.io.content_offset;
                item.user.fetched_size = item.io.fetched_size;
                if item.io.finished {
                    item.user.finished = true;
                }

                if item.io.failed {
                    item.state = FetchState::Failed;
                } else {
                    item.state = match item.state {
                        // A request that had its buffer bound up front never
                        // surfaces as `Opened`; its first chunk is already in
                        // the buffer, so it reports `Fetched` right away.
                        FetchState::Opening => {
                            if item.user.content_offset > 0 {
                                FetchState::Fetched
                            } else {
                                FetchState::Opened
                            }
                        }
                        FetchState::Fetching => FetchState::Fetched,
                        other => other,
                    };
                }

                if item.state == FetchState::Fetched {
                    metrics::BYTES_FETCHED.add(item.user.fetched_size);
                }

                let mut callback = item.callback.take();
                let mut response = Response {
                    handle,
                    channel: item.channel,
                    lane: item.lane,
                    opened: item.state == FetchState::Opened,
                    fetched: item.state == FetchState::Fetched,
                    paused: item.state == FetchState::Paused,
                    failed: item.state == FetchState::Failed,
                    finished: item.user.finished,
                    cancelled: item.user.cancel,
                    content_size: item.user.content_size,
                    // Report where the delivered chunk starts, not where the
                    // next one will.
                    content_offset: item.user.content_offset - item.user.fetched_size,
                    fetched_size: item.user.fetched_size,
                    path: item.path.as_str(),
                    buffer: &mut item.buffer,
                    user: &mut item.user,
                };
                if let Some(cb) = callback.as_mut() {
                    cb(&mut response);
                }
                item.callback = callback;
                (
                    item.lane,
                    item.user.finished,
                    item.state == FetchState::Failed,
                    item.user.cancel,
                )
            };

            if finished {
                if cancelled {
                    metrics::REQUESTS_CANCELLED.increment();
                } else if failed {
                    metrics::REQUESTS_FAILED.increment();
                } else {
                    metrics::REQUESTS_COMPLETED.increment();
                }
                metrics::REQUESTS_ACTIVE.decrement();
                self.free_lanes.enqueue(lane);
                pool.free(slot_id);
            } else {
                self.user_incoming.enqueue(slot_id);
            }
        }
    }
}
