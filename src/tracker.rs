//! Aggregates per-part completion into per-asset completion.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::interval::DisjointRanges;
use crate::types::multipart::TransferPart;

#[derive(Default)]
struct AssetProgress {
    finished: DisjointRanges,
    bytes: u64,
    started: bool,
}

/// Tracks which byte ranges of each asset have finished transferring.
///
/// Keyed by asset identity (source and target URL pair). Recording is
/// idempotent for overlapping ranges because the underlying
/// [`DisjointRanges`] coalesces, and completion is monotonic.
#[derive(Default)]
pub struct TransferTracker {
    assets: Mutex<HashMap<String, AssetProgress>>,
}

impl TransferTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per asset, on its first part.
    pub fn is_first(&self, part: &TransferPart) -> bool {
        let mut assets = self.assets.lock().expect("tracker lock poisoned");
        let progress = assets.entry(part.asset().identity()).or_default();
        let first = !progress.started;
        progress.started = true;
        first
    }

    /// Record a finished part; true when the asset is now fully covered.
    pub fn record(&self, part: &TransferPart) -> bool {
        let mut assets = self.assets.lock().expect("tracker lock poisoned");
        let progress = assets.entry(part.asset().identity()).or_default();
        progress.finished.add(part.range());
        match part.asset().content_length() {
            Some(length) => progress.finished.covers(length),
            None => false,
        }
    }

    /// Add a part's bytes to the asset's running total and return it.
    pub fn add_bytes(&self, part: &TransferPart) -> u64 {
        let mut assets = self.assets.lock().expect("tracker lock poisoned");
        let progress = assets.entry(part.asset().identity()).or_default();
        progress.bytes += part.range().len();
        progress.bytes
    }

    /// Bytes transferred so far for the part's asset.
    pub fn transferred(&self, part: &TransferPart) -> u64 {
        let assets = self.assets.lock().expect("tracker lock poisoned");
        assets
            .get(&part.asset().identity())
            .map(|progress| progress.bytes)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for TransferTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let assets = self.assets.lock().expect("tracker lock poisoned");
        f.debug_struct("TransferTracker")
            .field("assets", &assets.len())
            .finish()
    }
}
