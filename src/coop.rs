//! Cooperative (single-threaded) variant of the engine.
//!
//! On hosts that cannot spawn I/O threads, typically a browser-style event
//! loop, the engine runs without workers: [`CoopEngine::pump`] hands pending
//! requests directly to a [`CoopProvider`], which begins asynchronous
//! operations and later reports their outcomes through the three completion
//! entry points. The request lifecycle, queues, lanes, and callback
//! semantics are identical to the threaded [`Engine`](crate::Engine); only
//! the transport between the caller side and the I/O side differs.

use std::marker::PhantomData;

use crate::channel::Channel;
use crate::config::Config;
use crate::engine::{submit, Request};
use crate::error::{Error, SendError};
use crate::handle::Handle;
use crate::item::FetchState;
use crate::pool::RequestPool;

/// Asynchronous I/O backend driven by the host event loop.
///
/// `start_open` and `start_read` must only *begin* an operation. Outcomes
/// are delivered later, from the same thread the engine lives on, by calling
/// [`CoopEngine::head_response`], [`CoopEngine::read_response`], or
/// [`CoopEngine::request_failed`] with the handle the operation was started
/// with. Never deliver an outcome from inside `start_*` itself.
pub trait CoopProvider: 'static {
    /// Begin resolving `path`'s total content size (e.g. an HTTP HEAD).
    fn start_open(&mut self, handle: Handle, path: &str);

    /// Begin reading `len` bytes at `offset` (e.g. an HTTP range GET).
    fn start_read(&mut self, handle: Handle, path: &str, offset: u64, len: u64);
}

/// Fetch engine for single-threaded cooperative hosts.
///
/// Same public surface as the threaded engine, plus the completion entry
/// points the provider's finished operations feed back into.
pub struct CoopEngine<P: CoopProvider> {
    config: Config,
    channels: Vec<Channel>,
    pool: RequestPool<()>,
    provider: P,
    _single_thread: PhantomData<*const ()>,
}

impl<P: CoopProvider> CoopEngine<P> {
    /// Build an engine. Zero-valued config fields fall back to their
    /// defaults, as in [`Engine::new`](crate::Engine::new).
    pub fn new(config: Config, provider: P) -> Result<CoopEngine<P>, Error> {
        let config = config.resolved();
        config.validate()?;
        let pool = RequestPool::new(config.max_requests);
        let channels = (0..config.num_channels)
            .map(|_| Channel::new(config.max_requests, config.num_lanes))
            .collect();
        Ok(CoopEngine {
            config,
            channels,
            pool,
            provider,
            _single_thread: PhantomData,
        })
    }

    /// The resolved configuration this engine runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit a request. Identical contract to
    /// [`Engine::send`](crate::Engine::send).
    pub fn send(&mut self, request: Request<'_>) -> Result<Handle, SendError> {
        submit(&self.config, &mut self.pool, &mut self.channels, request)
    }

    /// Run the engine for one frame: admit backlogged requests, hand
    /// pending ones to the provider, and deliver response callbacks for
    /// completed ones. Two passes per call, like the threaded engine.
    pub fn pump(&mut self) {
        let CoopEngine {
            channels,
            pool,
            provider,
            ..
        } = self;
        for _pass in 0..2 {
            for channel in channels.iter_mut() {
                channel.admit(pool);
                channel.apply_control_flags(pool);
                dispatch(channel, pool, provider);
                channel.drain(pool);
            }
        }
    }

    /// Whether `handle` refers to a live request.
    pub fn is_active(&self, handle: Handle) -> bool {
        self.pool.lookup(handle.slot()).is_some()
    }

    /// Park a live request. No-op on stale handles.
    pub fn pause(&mut self, handle: Handle) {
        if let Some(item) = self.pool.lookup(handle.slot()) {
            item.user.request_pause();
        }
    }

    /// Un-park a paused request. No-op on stale handles.
    pub fn resume(&mut self, handle: Handle) {
        if let Some(item) = self.pool.lookup(handle.slot()) {
            item.user.request_resume();
        }
    }

    /// Cancel a live request. No-op on stale handles.
    pub fn cancel(&mut self, handle: Handle) {
        if let Some(item) = self.pool.lookup(handle.slot()) {
            item.user.request_cancel();
        }
    }

    // ── Completion entry points ──────────────────────────────────────

    /// The provider resolved the content size for `handle`.
    ///
    /// With a buffer already bound the first read starts immediately;
    /// otherwise the next pump reports an `opened` response so the caller
    /// can bind one. Stale handles are ignored.
    pub fn head_response(&mut self, handle: Handle, content_size: u64) {
        let slot_id = handle.slot();
        let Some(item) = self.pool.lookup(slot_id) else {
            return;
        };
        item.io.content_size = content_size;
        match item.buffer.as_deref() {
            Some(buf) if !buf.is_empty() => {
                let remaining = content_size.saturating_sub(item.io.content_offset);
                if remaining == 0 {
                    item.io.finished = true;
                    self.channels[item.channel as usize]
                        .user_outgoing
                        .enqueue(slot_id);
                } else {
                    let len = remaining.min(buf.len() as u64);
                    self.provider
                        .start_read(handle, item.path.as_str(), item.io.content_offset, len);
                }
            }
            _ => {
                self.channels[item.channel as usize]
                    .user_outgoing
                    .enqueue(slot_id);
            }
        }
    }

    /// The provider finished a read for `handle`; `data` is the fetched
    /// chunk, copied into the bound buffer here. Stale handles are ignored.
    pub fn read_response(&mut self, handle: Handle, data: &[u8]) {
        let slot_id = handle.slot();
        let Some(item) = self.pool.lookup(slot_id) else {
            return;
        };
        match item.buffer.as_deref_mut() {
            Some(buf) if !buf.is_empty() => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                item.io.fetched_size = len as u64;
                item.io.content_offset += len as u64;
                if item.io.content_offset >= item.io.content_size {
                    item.io.finished = true;
                }
            }
            _ => {
                // The buffer went away between start_read and completion.
                item.io.failed = true;
                item.io.finished = true;
            }
        }
        self.channels[item.channel as usize]
            .user_outgoing
            .enqueue(slot_id);
    }

    /// The provider's operation for `handle` failed. The next pump delivers
    /// the final `failed` response. Stale handles are ignored.
    pub fn request_failed(&mut self, handle: Handle) {
        let slot_id = handle.slot();
        let Some(item) = self.pool.lookup(slot_id) else {
            return;
        };
        item.io.failed = true;
        item.io.finished = true;
        self.channels[item.channel as usize]
            .user_outgoing
            .enqueue(slot_id);
    }
}

/// Hand each pending item to the provider, or straight back to the outgoing
/// queue for states the provider has no part in.
fn dispatch<P: CoopProvider>(channel: &mut Channel, pool: &RequestPool<()>, provider: &mut P) {
    while !channel.user_incoming.is_empty() {
        let slot_id = channel.user_incoming.dequeue();
        let Some(handle) = Handle::from_slot(slot_id) else {
            continue;
        };
        let Some(item) = pool.lookup(slot_id) else {
            debug_assert!(false, "pending id went stale");
            continue;
        };
        match item.state {
            FetchState::Opening => provider.start_open(handle, item.path.as_str()),
            FetchState::Fetching => match item.buffer.as_deref() {
                Some(buf) if !buf.is_empty() => {
                    let remaining = item.io.content_size - item.io.content_offset;
                    let len = remaining.min(buf.len() as u64);
                    provider.start_read(handle, item.path.as_str(), item.io.content_offset, len);
                }
                _ => {
                    item.io.failed = true;
                    item.io.finished = true;
                    channel.user_outgoing.enqueue(slot_id);
                }
            },
            // Paused and failed items cycle through the outgoing queue so
            // they are not lost.
            _ => channel.user_outgoing.enqueue(slot_id),
        }
    }
}
