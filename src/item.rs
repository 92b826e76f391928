use crate::config::{MAX_PATH, MAX_USER_DATA};
use crate::handle::SlotId;
use crate::response::Response;

/// Lane value of an item that has not been admitted to a channel yet.
pub(crate) const INVALID_LANE: u32 = u32::MAX;

/// Response callback. Boxed per request; invoked only from `pump()` on the
/// engine's owning thread.
pub(crate) type Callback = Box<dyn FnMut(&mut Response<'_>)>;

/// Lifecycle states of a request. A request ping-pongs between the caller
/// side and the I/O side; which states each side may observe is fixed by the
/// channel protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchState {
    /// Zero-init state of an unused pool slot.
    Initial,
    /// Allocated from the pool, waiting in the channel backlog.
    Allocated,
    /// I/O side: resource is being opened and sized.
    Opening,
    /// Caller side: size known, no buffer was provided up front.
    Opened,
    /// I/O side: a chunk is being read into the bound buffer.
    Fetching,
    /// Caller side: fetched data is available in the buffer.
    Fetched,
    /// Caller side: parked until resumed.
    Paused,
    /// Terminal: open/read failure or cancellation.
    Failed,
}

/// Path/URL storage inlined into the pool item, bounded by [`MAX_PATH`].
pub(crate) struct InlinePath {
    buf: [u8; MAX_PATH],
    len: usize,
}

impl InlinePath {
    pub(crate) const fn empty() -> InlinePath {
        InlinePath {
            buf: [0; MAX_PATH],
            len: 0,
        }
    }

    /// Store `path`. The caller has already validated the length bound.
    pub(crate) fn set(&mut self, path: &str) {
        debug_assert!(path.len() < MAX_PATH);
        self.buf[..path.len()].copy_from_slice(path.as_bytes());
        self.len = path.len();
    }

    pub(crate) fn as_str(&self) -> &str {
        // Safety: the bytes were copied verbatim from a &str in set() and
        // len marks exactly that prefix.
        unsafe { std::str::from_utf8_unchecked(&self.buf[..self.len]) }
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

/// Inline user-data block, 8-byte aligned so callers can move small
/// plain-old-data structs in and out of it.
#[repr(align(8))]
pub(crate) struct UserBlock {
    bytes: [u8; MAX_USER_DATA],
    len: usize,
}

impl UserBlock {
    pub(crate) const fn empty() -> UserBlock {
        UserBlock {
            bytes: [0; MAX_USER_DATA],
            len: 0,
        }
    }

    pub(crate) fn set(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= MAX_USER_DATA);
        self.bytes[..data.len()].copy_from_slice(data);
        self.len = data.len();
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }
}

/// Caller-side per-request state. Off limits to the worker.
pub(crate) struct UserState {
    /// Park the request at the next caller-side pass.
    pub(crate) pause: bool,
    /// Un-park the request at the next caller-side pass.
    pub(crate) resume: bool,
    /// Fail the request at the next caller-side pass. Stays set so the final
    /// response can report the cancellation.
    pub(crate) cancel: bool,
    /// Mirrors of the I/O side, refreshed on every drain.
    pub(crate) content_size: u64,
    pub(crate) content_offset: u64,
    pub(crate) fetched_size: u64,
    pub(crate) finished: bool,
    pub(crate) data: UserBlock,
}

impl UserState {
    pub(crate) const fn new() -> UserState {
        UserState {
            pause: false,
            resume: false,
            cancel: false,
            content_size: 0,
            content_offset: 0,
            fetched_size: 0,
            finished: false,
            data: UserBlock::empty(),
        }
    }

    pub(crate) fn request_pause(&mut self) {
        self.pause = true;
        self.resume = false;
    }

    pub(crate) fn request_resume(&mut self) {
        self.resume = true;
        self.pause = false;
    }

    pub(crate) fn request_cancel(&mut self) {
        self.cancel = true;
        self.pause = false;
        self.resume = false;
    }
}

/// I/O-side per-request state. Off limits to the caller side while the slot
/// id is anywhere the worker can see it.
pub(crate) struct IoState<R> {
    pub(crate) content_size: u64,
    pub(crate) content_offset: u64,
    pub(crate) fetched_size: u64,
    pub(crate) failed: bool,
    pub(crate) finished: bool,
    pub(crate) resource: Option<R>,
}

impl<R> IoState<R> {
    pub(crate) const fn new() -> IoState<R> {
        IoState {
            content_size: 0,
            content_offset: 0,
            fetched_size: 0,
            failed: false,
            finished: false,
            resource: None,
        }
    }
}

/// One pool slot. `slot == 0` means the slot is free.
///
/// The `user` and `io` sub-records are the synchronization shape of the
/// engine: whichever side of the queue protocol currently holds the slot id
/// owns `state`, `buffer`, and its own sub-record. `path`, `channel`, and
/// `lane` are written before the first hand-off and only read afterwards;
/// `callback` and `user` are touched exclusively on the engine thread.
pub(crate) struct Item<R> {
    pub(crate) slot: SlotId,
    pub(crate) state: FetchState,
    pub(crate) channel: u32,
    pub(crate) lane: u32,
    pub(crate) callback: Option<Callback>,
    pub(crate) buffer: Option<Vec<u8>>,
    pub(crate) path: InlinePath,
    pub(crate) user: UserState,
    pub(crate) io: IoState<R>,
}

impl<R> Item<R> {
    pub(crate) fn unused() -> Item<R> {
        Item {
            slot: 0,
            state: FetchState::Initial,
            channel: 0,
            lane: INVALID_LANE,
            callback: None,
            buffer: None,
            path: InlinePath::empty(),
            user: UserState::new(),
            io: IoState::new(),
        }
    }

    /// Initialize a freshly allocated slot from the request descriptor
    /// fields. The pool sets `slot` and the `Allocated` state afterwards.
    pub(crate) fn init(
        &mut self,
        channel: u32,
        path: &str,
        callback: Callback,
        buffer: Option<Vec<u8>>,
        user_data: &[u8],
    ) {
        debug_assert_eq!(self.slot, 0);
        self.state = FetchState::Initial;
        self.channel = channel;
        self.lane = INVALID_LANE;
        self.callback = Some(callback);
        self.buffer = buffer;
        self.path.set(path);
        self.user.data.set(user_data);
    }

    /// Return the slot to its zero state so it can be reused.
    pub(crate) fn reset(&mut self) {
        debug_assert_ne!(self.slot, 0);
        self.slot = 0;
        self.state = FetchState::Initial;
        self.channel = 0;
        self.lane = INVALID_LANE;
        self.callback = None;
        self.buffer = None;
        self.path.clear();
        self.user = UserState::new();
        self.io = IoState::new();
    }
}
