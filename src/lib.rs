//! fetchline — asynchronous file fetching with bounded, predictable memory.
//!
//! fetchline moves fetch requests through a small per-request state machine,
//! hands the blocking I/O to one worker thread per channel, and delivers
//! every result through a response callback on the thread that owns the
//! engine. Admission is bounded: each channel has a fixed number of *lanes*,
//! and a request holds one lane from admission to its final response, so the
//! number of simultaneously in-flight requests is known up front and all
//! buffers can be pre-allocated.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fetchline::{Config, Engine, FsProvider, Request};
//!
//! let mut engine = Engine::new(Config::default(), FsProvider)?;
//!
//! engine.send(Request::new("assets/hello.txt", |response| {
//!     if response.fetched && response.finished {
//!         println!("{} bytes loaded", response.content_size);
//!     }
//!     if response.failed {
//!         eprintln!("load failed: {}", response.path());
//!     }
//! })
//! .buffer(vec![0; 64 * 1024]))?;
//!
//! loop {
//!     engine.pump(); // call once per frame
//!     # break;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Streaming works by binding a buffer smaller than the content: each pump
//! delivers the next chunk through the same callback until `finished` is
//! set. Requests can be paused, resumed, and cancelled at any time via their
//! [`Handle`].
//!
//! # Hosts without threads
//!
//! The [`coop`] module provides [`CoopEngine`](coop::CoopEngine), the same
//! state machine driven by a host event loop instead of worker threads, for
//! single-threaded targets.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod channel;
pub(crate) mod handle;
pub(crate) mod item;
pub(crate) mod metrics;
pub(crate) mod pool;
pub(crate) mod ring;
pub(crate) mod worker;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod coop;
pub mod engine;
pub mod error;
pub mod provider;
pub mod response;

// ── Re-exports ──────────────────────────────────────────────────────────

/// Engine configuration (request pool size, channels, lanes).
pub use config::Config;
/// Builder for [`Config`] with discoverable methods and `build()` validation.
pub use config::ConfigBuilder;
/// Upper bound on the number of channels.
pub use config::MAX_CHANNELS;
/// Maximum request path length in bytes.
pub use config::MAX_PATH;
/// Maximum per-request user-data size in bytes.
pub use config::MAX_USER_DATA;
/// Cooperative engine for single-threaded hosts.
pub use coop::CoopEngine;
/// Asynchronous I/O backend driven by the host event loop.
pub use coop::CoopProvider;
/// The threaded fetch engine.
pub use engine::Engine;
/// Parameters for one fetch request.
pub use engine::Request;
/// Engine setup errors.
pub use error::Error;
/// Reasons a request can be rejected at send time.
pub use error::SendError;
/// Opaque handle identifying an in-flight request.
pub use handle::Handle;
/// Local-filesystem I/O backend.
pub use provider::FsProvider;
/// Blocking I/O backend consumed by the channel workers.
pub use provider::IoProvider;
/// Snapshot passed to response callbacks.
pub use response::Response;
