use std::sync::atomic::{AtomicU32, Ordering};

/// Source of change versions.
///
/// Every time a component column or enable bit of a chunk is written, the chunk records the
/// value returned here for that component. Consumers compare versions to detect changes.
pub trait VersionCounter: Send + Sync {
    /// Returns a version strictly greater than every previously returned version.
    fn next_version(&self) -> u32;

    /// The most recently returned version, or 0 if none was handed out yet.
    fn current_version(&self) -> u32;
}

/// Default counter. Starts at 0 and increments by one per call.
#[derive(Debug, Default)]
pub struct MonotonicVersion(AtomicU32);

impl VersionCounter for MonotonicVersion {
    #[inline]
    fn next_version(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    fn current_version(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}
