use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Blocking I/O backend consumed by the channel workers.
///
/// Implementations are shared by reference across all workers of an engine,
/// so the methods take `&self`; per-request state lives in the
/// [`Resource`](Self::Resource) value returned by `open_and_size`.
///
/// The engine calls these from its worker threads, one request at a time per
/// channel: `open_and_size` once, `read_range` once per chunk, `close` when
/// the request finishes or fails after a successful open.
pub trait IoProvider: Send + Sync + 'static {
    /// Per-request handle: an open file, a connection, etc.
    type Resource: Send + 'static;

    /// Open `path` and report the total content size in bytes.
    fn open_and_size(&self, path: &str) -> io::Result<(Self::Resource, u64)>;

    /// Read exactly `dst.len()` bytes starting at `offset`. A short read is
    /// an error; the engine never asks for bytes past the reported size.
    fn read_range(&self, res: &mut Self::Resource, offset: u64, dst: &mut [u8])
        -> io::Result<()>;

    /// Release a resource. The default just drops it.
    fn close(&self, res: Self::Resource) {
        drop(res);
    }
}

/// Local-filesystem backend over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProvider;

impl IoProvider for FsProvider {
    type Resource = File;

    fn open_and_size(&self, path: &str) -> io::Result<(File, u64)> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn read_range(&self, file: &mut File, offset: u64, dst: &mut [u8]) -> io::Result<()> {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)
    }
}
