use std::marker::PhantomData;
use std::sync::Arc;

use crate::channel::Channel;
use crate::config::{Config, MAX_PATH, MAX_USER_DATA};
use crate::error::{Error, SendError};
use crate::handle::{Handle, INVALID_SLOT};
use crate::item::Callback;
use crate::metrics;
use crate::pool::RequestPool;
use crate::provider::IoProvider;
use crate::response::Response;
use crate::worker::{WorkerShared, WorkerThread};

/// Parameters for one fetch request.
///
/// # Example
///
/// ```rust,no_run
/// use fetchline::{Config, Engine, FsProvider, Request};
///
/// let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
/// let handle = engine
///     .send(Request::new("assets/level1.bin", |response| {
///         if response.fetched {
///             println!("chunk of {} bytes", response.fetched_size);
///         }
///     })
///     .buffer(vec![0; 64 * 1024]))
///     .unwrap();
/// loop {
///     engine.pump();
///     # let _ = handle; break;
/// }
/// ```
pub struct Request<'a> {
    channel: u32,
    path: &'a str,
    callback: Callback,
    buffer: Option<Vec<u8>>,
    user_data: &'a [u8],
}

impl<'a> Request<'a> {
    /// Create a request for `path` with a response callback. The callback
    /// runs only on the engine's owning thread, from inside
    /// [`Engine::pump`].
    pub fn new(path: &'a str, callback: impl FnMut(&mut Response<'_>) + 'static) -> Request<'a> {
        Request {
            channel: 0,
            path,
            callback: Box::new(callback),
            buffer: None,
            user_data: &[],
        }
    }

    /// Route the request through the given channel. Default: 0.
    pub fn channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    /// Bind a buffer up front. The request then skips the `opened` response
    /// and delivers its first chunk immediately.
    pub fn buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Attach up to [`MAX_USER_DATA`] bytes of user data, copied into the
    /// request and accessible (read/write) from every response.
    pub fn user_data(mut self, data: &'a [u8]) -> Self {
        self.user_data = data;
        self
    }
}

/// Asynchronous fetch engine over a blocking [`IoProvider`].
///
/// One worker thread per channel performs the provider I/O; everything else,
/// including every response callback, happens on the thread that created the
/// engine, inside [`pump`](Self::pump). The engine is deliberately not
/// `Send`: create one per thread that needs to fetch.
///
/// All pool and queue memory is allocated in [`new`](Self::new); the
/// steady-state request path allocates nothing.
///
/// Dropping the engine stops and joins every worker. Requests still in
/// flight are discarded without a callback.
pub struct Engine<P: IoProvider> {
    config: Config,
    // Channels before the pool: workers are joined before item storage that
    // they can see goes away.
    channels: Vec<Channel>,
    pool: RequestPool<P::Resource>,
    provider: Arc<P>,
    _single_thread: PhantomData<*const ()>,
}

impl<P: IoProvider> Engine<P> {
    /// Build an engine. Zero-valued config fields fall back to their
    /// defaults and `num_channels` is clamped to
    /// [`MAX_CHANNELS`](crate::MAX_CHANNELS).
    pub fn new(config: Config, provider: P) -> Result<Engine<P>, Error> {
        let config = config.resolved();
        config.validate()?;
        let provider = Arc::new(provider);
        let pool = RequestPool::new(config.max_requests);
        let mut channels = Vec::with_capacity(config.num_channels as usize);
        for index in 0..config.num_channels {
            let mut channel = Channel::new(config.max_requests, config.num_lanes);
            let shared = Arc::new(WorkerShared::new(config.num_lanes));
            let worker = WorkerThread::spawn::<P>(
                index,
                Arc::clone(&shared),
                pool.table(),
                Arc::clone(&provider),
            )?;
            channel.shared = Some(shared);
            channel.worker = Some(worker);
            channels.push(channel);
        }
        Ok(Engine {
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

    /// The provider backing this engine's workers.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Submit a request. On success the request is live: it will produce
    /// response callbacks from subsequent [`pump`](Self::pump) calls until
    /// one arrives with `finished` set. On error nothing is retained.
    pub fn send(&mut self, request: Request<'_>) -> Result<Handle, SendError> {
        submit(&self.config, &mut self.pool, &mut self.channels, request)
    }

    /// Run the engine for one frame: admit backlogged requests, exchange
    /// items with the workers, and deliver response callbacks.
    ///
    /// Each call makes two passes over every channel, so a streaming request
    /// whose chunk just came back re-enters its worker within the same call
    /// instead of waiting a frame.
    pub fn pump(&mut self) {
        for _pass in 0..2 {
            for channel in &mut self.channels {
                channel.admit(&self.pool);
                channel.apply_control_flags(&self.pool);
                channel.exchange_with_worker();
                channel.drain(&mut self.pool);
            }
        }
    }

    /// Whether `handle` refers to a live request. Finished, cancelled, and
    /// never-accepted handles report `false`.
    pub fn is_active(&self, handle: Handle) -> bool {
        self.pool.lookup(handle.slot()).is_some()
    }

    /// Park a live request. It keeps its lane and reports a `paused`
    /// response every pump until resumed. No-op on stale handles.
    pub fn pause(&mut self, handle: Handle) {
        if let Some(item) = self.pool.lookup(handle.slot()) {
            item.user.request_pause();
        }
    }

    /// Un-park a paused request; fetching continues from where it stopped.
    /// No-op on stale handles.
    pub fn resume(&mut self, handle: Handle) {
        if let Some(item) = self.pool.lookup(handle.slot()) {
            item.user.request_resume();
        }
    }

    /// Cancel a live request. Its next response is the final one, with
    /// `failed`, `cancelled`, and `finished` set. An in-flight read races
    /// to completion first and its result is discarded. No-op on stale
    /// handles.
    pub fn cancel(&mut self, handle: Handle) {
        if let Some(item) = self.pool.lookup(handle.slot()) {
            item.user.request_cancel();
        }
    }
}

/// Validate a request, allocate its pool slot, and place it in its
/// channel's backlog. Shared by the threaded and cooperative engines.
pub(crate) fn submit<R>(
    config: &Config,
    pool: &mut RequestPool<R>,
    channels: &mut [Channel],
    request: Request<'_>,
) -> Result<Handle, SendError> {
    if request.path.is_empty() {
        return Err(SendError::EmptyPath);
    }
    if request.path.len() >= MAX_PATH {
        return Err(SendError::PathTooLong);
    }
    if request.channel >= config.num_channels {
        return Err(SendError::ChannelOutOfRange(request.channel));
    }
    if request.user_data.len() > MAX_USER_DATA {
        return Err(SendError::UserDataTooLarge);
    }

    let slot_id = pool.alloc(
        request.channel,
        request.path,
        request.callback,
        request.buffer,
        request.user_data,
    );
    if slot_id == INVALID_SLOT {
        metrics::POOL_EXHAUSTED.increment();
        return Err(SendError::PoolExhausted);
    }
    if !channels[request.channel as usize].push_sent(slot_id) {
        pool.free(slot_id);
        metrics::BACKLOG_FULL.increment();
        return Err(SendError::BacklogFull);
    }
    metrics::REQUESTS_SENT.increment();
    metrics::REQUESTS_ACTIVE.increment();
    let Some(handle) = Handle::from_slot(slot_id) else {
        unreachable!("pool returned the invalid slot id");
    };
    Ok(handle)
}
