use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::handle::SlotId;
use crate::item::FetchState;
use crate::pool::ItemTable;
use crate::provider::IoProvider;
use crate::ring::SlotRing;

/// Queues and signals shared between a channel's caller side and its worker
/// thread.
///
/// The inbox and outbox rings are only ever touched under their mutexes;
/// those locks are also what publishes item state across the thread
/// boundary at every hand-off.
pub(crate) struct WorkerShared {
    inbox: Mutex<SlotRing>,
    inbox_ready: Condvar,
    outbox: Mutex<SlotRing>,
    stop: AtomicBool,
}

impl WorkerShared {
    pub(crate) fn new(num_lanes: u32) -> WorkerShared {
        WorkerShared {
            inbox: Mutex::new(SlotRing::new(num_lanes)),
            inbox_ready: Condvar::new(),
            outbox: Mutex::new(SlotRing::new(num_lanes)),
            stop: AtomicBool::new(false),
        }
    }

    /// Caller side: move as many ids as fit from `src` into the inbox and
    /// wake the worker. Ids that do not fit stay in `src` for the next pass.
    pub(crate) fn enqueue_incoming(&self, src: &mut SlotRing) {
        if src.is_empty() {
            return;
        }
        let mut inbox = self.inbox.lock().unwrap();
        while !inbox.is_full() && !src.is_empty() {
            inbox.enqueue(src.dequeue());
        }
        self.inbox_ready.notify_one();
    }

    /// Worker side: block until an id arrives or stop is requested.
    /// Returns `None` on stop.
    pub(crate) fn dequeue_incoming(&self) -> Option<SlotId> {
        let mut inbox = self.inbox.lock().unwrap();
        while inbox.is_empty() && !self.stop.load(Ordering::Acquire) {
            inbox = self.inbox_ready.wait(inbox).unwrap();
        }
        if self.stop.load(Ordering::Acquire) {
            None
        } else {
            Some(inbox.dequeue())
        }
    }

    /// Worker side: hand a serviced id back. The outbox holds `num_lanes`
    /// ids and at most `num_lanes` requests are in flight, so it has room.
    pub(crate) fn enqueue_outgoing(&self, id: SlotId) {
        let mut outbox = self.outbox.lock().unwrap();
        debug_assert!(!outbox.is_full());
        outbox.enqueue(id);
    }

    /// Caller side: drain serviced ids into `dst`.
    pub(crate) fn dequeue_outgoing(&self, dst: &mut SlotRing) {
        let mut outbox = self.outbox.lock().unwrap();
        while !dst.is_full() && !outbox.is_empty() {
            dst.enqueue(outbox.dequeue());
        }
    }

    /// Ask the worker to exit. Taking the inbox lock before notifying
    /// guarantees the wake-up is not lost between the worker's empty check
    /// and its wait.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _inbox = self.inbox.lock().unwrap();
        self.inbox_ready.notify_all();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// A channel's I/O worker thread. Joined on drop, which happens before the
/// owning channel tears down its queues.
pub(crate) struct WorkerThread {
    shared: Arc<WorkerShared>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawn the worker for `channel_index`. The worker services one request
    /// at a time: blocking-dequeue from the inbox, run the I/O half of the
    /// state machine, push to the outbox.
    pub(crate) fn spawn<P: IoProvider>(
        channel_index: u32,
        shared: Arc<WorkerShared>,
        table: Arc<ItemTable<P::Resource>>,
        provider: Arc<P>,
    ) -> std::io::Result<WorkerThread> {
        let worker_shared = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name(format!("fetchline-io-{channel_index}"))
            .spawn(move || {
                while !worker_shared.stop_requested() {
                    let Some(slot_id) = worker_shared.dequeue_incoming() else {
                        break;
                    };
                    service_request(&table, provider.as_ref(), slot_id);
                    worker_shared.enqueue_outgoing(slot_id);
                }
            })?;
        Ok(WorkerThread {
            shared,
            join: Some(join),
        })
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.shared.request_stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// The I/O half of the request state machine, run on the worker thread for
/// one slot id pulled from the inbox.
///
/// `Opening` opens and sizes the resource; when a buffer is already bound it
/// falls straight through to `Fetching` so the first chunk lands in the same
/// pass. `Fetching` reads the next chunk into the bound buffer and closes
/// the resource once the content is exhausted or the read failed. `Paused`
/// and `Failed` items pass through untouched, as do items whose id went
/// stale or that already failed.
pub(crate) fn service_request<P: IoProvider>(
    table: &ItemTable<P::Resource>,
    provider: &P,
    slot_id: SlotId,
) {
    // Safety: the id came through the inbox, so the caller side has handed
    // this item over; the worker stays within the io-side fields.
    let Some(item) = (unsafe { table.lookup(slot_id) }) else {
        return;
    };
    debug_assert!(matches!(
        item.state,
        FetchState::Opening | FetchState::Fetching | FetchState::Paused | FetchState::Failed
    ));
    if item.io.failed {
        return;
    }

    let mut state = item.state;
    if state == FetchState::Opening {
        debug_assert!(item.io.resource.is_none());
        debug_assert_eq!(item.io.content_offset, 0);
        match provider.open_and_size(item.path.as_str()) {
            Ok((resource, size)) => {
                item.io.resource = Some(resource);
                item.io.content_size = size;
                // With a buffer already bound there is nothing to report yet;
                // fetch the first chunk in the same pass.
                if item.buffer.is_some() {
                    state = FetchState::Fetching;
                }
            }
            Err(_) => {
                item.io.failed = true;
                item.io.finished = true;
            }
        }
    }
    if state == FetchState::Fetching {
        match item.buffer.as_deref_mut() {
            None | Some([]) => item.io.failed = true,
            Some(buf) => {
                let remaining = item.io.content_size - item.io.content_offset;
                let chunk = remaining.min(buf.len() as u64);
                match item.io.resource.as_mut() {
                    Some(resource) => match provider.read_range(
                        resource,
                        item.io.content_offset,
                        &mut buf[..chunk as usize],
                    ) {
                        Ok(()) => {
                            item.io.fetched_size = chunk;
                            item.io.content_offset += chunk;
                        }
                        Err(_) => item.io.failed = true,
                    },
                    None => item.io.failed = true,
                }
            }
        }
        if item.io.failed || item.io.content_offset >= item.io.content_size {
            if let Some(resource) = item.io.resource.take() {
                provider.close(resource);
            }
            item.io.finished = true;
        }
    }
}
