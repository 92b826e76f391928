use crate::handle::Handle;
use crate::item::UserState;

/// Snapshot passed to the response callback, valid for the duration of one
/// invocation.
///
/// At most one of `opened` / `fetched` / `paused` / `failed` is set;
/// `finished` and `cancelled` combine with `failed`. A `finished` response
/// is the last one the request will ever produce; afterwards its handle goes
/// stale and its lane and pool slot are recycled.
///
/// The snapshot is also the only place buffer binding is allowed, which is
/// what makes it safe: while a callback runs, the request is owned by the
/// engine thread and no worker can touch its buffer.
pub struct Response<'a> {
    /// Handle of the request this response belongs to.
    pub handle: Handle,
    /// Channel processing the request.
    pub channel: u32,
    /// Lane the request occupies on its channel.
    pub lane: u32,
    /// Content size is known; no buffer was bound up front. Bind one now to
    /// start fetching.
    pub opened: bool,
    /// A chunk of data is available via [`data`](Self::data).
    pub fetched: bool,
    /// The request is parked; it reports this every pump until resumed.
    pub paused: bool,
    /// The request failed (open error, read error, missing buffer, or
    /// cancellation).
    pub failed: bool,
    /// This is the final response for the request.
    pub finished: bool,
    /// The failure was caused by [`cancel`](crate::Engine::cancel).
    pub cancelled: bool,
    /// Total content size in bytes, 0 until opened.
    pub content_size: u64,
    /// Offset of the currently delivered chunk within the content.
    pub content_offset: u64,
    /// Length of the currently delivered chunk in bytes.
    pub fetched_size: u64,
    pub(crate) path: &'a str,
    pub(crate) buffer: &'a mut Option<Vec<u8>>,
    pub(crate) user: &'a mut UserState,
}

impl Response<'_> {
    /// The path/URL the request was sent with.
    pub fn path(&self) -> &str {
        self.path
    }

    /// The fetched chunk: the first `fetched_size` bytes of the bound
    /// buffer. Empty unless `fetched` is set.
    pub fn data(&self) -> &[u8] {
        match self.buffer.as_deref() {
            // The clamp matters when a callback swapped in a smaller buffer
            // after the chunk this response reports was read.
            Some(buf) => &buf[..(self.fetched_size as usize).min(buf.len())],
            None => &[],
        }
    }

    /// The entire bound buffer, if any.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Bind a buffer for subsequent chunks. The first fetch happens on the
    /// next pump pass.
    ///
    /// # Panics
    ///
    /// Panics if a buffer is already bound; unbind it first.
    pub fn bind_buffer(&mut self, buffer: Vec<u8>) {
        assert!(
            self.buffer.is_none(),
            "a buffer is already bound to this request"
        );
        *self.buffer = Some(buffer);
    }

    /// Remove and return the bound buffer. Typically called on the final
    /// response to reclaim the storage, or mid-stream to swap buffers.
    pub fn unbind_buffer(&mut self) -> Option<Vec<u8>> {
        self.buffer.take()
    }

    /// Park the request starting with the next pump pass.
    pub fn pause(&mut self) {
        self.user.request_pause();
    }

    /// Un-park the request; fetching continues from the current offset.
    pub fn resume(&mut self) {
        self.user.request_resume();
    }

    /// Fail the request. The next response (the final one) reports
    /// `failed`, `cancelled`, and `finished`.
    pub fn cancel(&mut self) {
        self.user.request_cancel();
    }

    /// Read-only view of the request's inline user-data block.
    pub fn user_data(&self) -> &[u8] {
        self.user.data.as_slice()
    }

    /// Mutable view of the request's inline user-data block. Writes persist
    /// across callbacks for the lifetime of the request.
    pub fn user_data_mut(&mut self) -> &mut [u8] {
        self.user.data.as_mut_slice()
    }
}
