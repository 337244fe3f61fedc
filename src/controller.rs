//! Event bus carrying per-stage notifications and errors across the pipeline.

use std::sync::{Arc, Mutex, RwLock};

use crate::error::TransferError;
use crate::interval::Interval;
use crate::types::asset::TransferAsset;

/// The kinds of events a transfer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Metadata acquisition is starting for an asset.
    GetAssetMetadata,
    /// Metadata acquisition finished for an asset.
    AfterGetAssetMetadata,
    /// The initiate-upload call is starting for an asset.
    AemInitiateUpload,
    /// The initiate-upload call finished for an asset.
    AfterAemInitiateUpload,
    /// The first part of an asset is about to transfer.
    TransferStart,
    /// A part finished transferring.
    TransferProgress,
    /// All parts of an asset finished transferring.
    TransferComplete,
    /// The complete-upload call is starting for an asset.
    AemCompleteUpload,
    /// The complete-upload call finished for an asset.
    AfterAemCompleteUpload,
    /// An asset failed and was withdrawn from the pipeline.
    Error,
}

/// A single event emitted by a pipeline stage.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    /// What happened.
    pub kind: EventKind,
    /// The stage that emitted the event.
    pub stage: String,
    /// Snapshot of the affected asset.
    pub asset: TransferAsset,
    /// The part range, for part-scoped events.
    pub range: Option<Interval>,
    /// Cumulative bytes transferred for the asset, when known.
    pub transferred: Option<u64>,
    /// Error text, for [`EventKind::Error`] events.
    pub error: Option<String>,
}

/// Receives transfer events.
///
/// Implement this to surface progress, collect summaries, or log. Closures
/// taking `&TransferEvent` implement it automatically.
pub trait TransferObserver: Send + Sync {
    /// Called for every event the observer is subscribed to.
    fn on_event(&self, event: &TransferEvent);
}

impl<F> TransferObserver for F
where
    F: Fn(&TransferEvent) + Send + Sync,
{
    fn on_event(&self, event: &TransferEvent) {
        self(event);
    }
}

#[derive(Debug, Clone)]
struct FirstError {
    not_supported: bool,
    message: String,
}

struct ControllerInner {
    observers: RwLock<Vec<(Option<EventKind>, Arc<dyn TransferObserver>)>>,
    first_error: Mutex<Option<FirstError>>,
}

/// The event bus shared by all stages of one pipeline run.
///
/// Observers subscribe to a single event kind or to all kinds. The
/// controller also records the earliest surfaced error, which backs the
/// capability probe: direct binary upload is reported as unsupported
/// exactly when the first error was NOT_SUPPORTED.
#[derive(Clone)]
pub struct TransferController {
    inner: Arc<ControllerInner>,
}

impl Default for TransferController {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferController {
    /// Create a controller with no observers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                observers: RwLock::new(Vec::new()),
                first_error: Mutex::new(None),
            }),
        }
    }

    /// Subscribe an observer to one event kind.
    pub fn subscribe(&self, kind: EventKind, observer: Arc<dyn TransferObserver>) {
        self.inner
            .observers
            .write()
            .expect("observer lock poisoned")
            .push((Some(kind), observer));
    }

    /// Subscribe an observer to every event kind.
    pub fn subscribe_all(&self, observer: Arc<dyn TransferObserver>) {
        self.inner
            .observers
            .write()
            .expect("observer lock poisoned")
            .push((None, observer));
    }

    /// Emit an event.
    pub fn notify(
        &self,
        kind: EventKind,
        stage: &str,
        asset: &TransferAsset,
        range: Option<Interval>,
        transferred: Option<u64>,
    ) {
        let event = TransferEvent {
            kind,
            stage: stage.to_string(),
            asset: asset.clone(),
            range,
            transferred,
            error: None,
        };
        self.dispatch(&event);
    }

    /// Emit an error event, withdrawing the asset from the pipeline.
    pub fn notify_error(&self, stage: &str, error: &TransferError, asset: &TransferAsset) {
        tracing::warn!(stage, asset = %asset.identity(), error = %error, "asset failed");
        {
            let mut first = self.inner.first_error.lock().expect("error lock poisoned");
            if first.is_none() {
                *first = Some(FirstError {
                    not_supported: matches!(error, TransferError::NotSupported),
                    message: error.to_string(),
                });
            }
        }
        let event = TransferEvent {
            kind: EventKind::Error,
            stage: stage.to_string(),
            asset: asset.clone(),
            range: None,
            transferred: None,
            error: Some(error.to_string()),
        };
        self.dispatch(&event);
    }

    fn dispatch(&self, event: &TransferEvent) {
        let observers = self.inner.observers.read().expect("observer lock poisoned");
        for (kind, observer) in observers.iter() {
            if kind.is_none() || *kind == Some(event.kind) {
                observer.on_event(event);
            }
        }
    }

    /// The earliest surfaced error message, if any asset failed.
    pub fn first_error(&self) -> Option<String> {
        self.inner
            .first_error
            .lock()
            .expect("error lock poisoned")
            .as_ref()
            .map(|first| first.message.clone())
    }

    /// Capability probe for the direct binary upload protocol.
    ///
    /// `false` exactly when the first surfaced error was NOT_SUPPORTED;
    /// any other error (or no error) reports `true` so downstream layers
    /// can attempt the transfer and report real failures.
    pub fn direct_binary_enabled(&self) -> bool {
        !self
            .inner
            .first_error
            .lock()
            .expect("error lock poisoned")
            .as_ref()
            .map(|first| first.not_supported)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for TransferController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observers = self.inner.observers.read().expect("observer lock poisoned");
        f.debug_struct("TransferController")
            .field("observers", &observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use url::Url;

    use super::*;
    use crate::types::asset::Asset;

    fn sample_asset() -> TransferAsset {
        TransferAsset::new(
            Asset::new(Url::parse("http://host/src/a.jpg").unwrap()),
            Asset::new(Url::parse("http://host/dst/a.jpg").unwrap()),
        )
    }

    #[test]
    fn subscribed_kind_receives_only_that_kind() {
        let controller = TransferController::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        controller.subscribe(
            EventKind::TransferProgress,
            Arc::new(move |_: &TransferEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let asset = sample_asset();
        controller.notify(EventKind::TransferStart, "transfer", &asset, None, None);
        controller.notify(EventKind::TransferProgress, "transfer", &asset, None, Some(10));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_all_receives_everything() {
        let controller = TransferController::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        controller.subscribe_all(Arc::new(move |_: &TransferEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let asset = sample_asset();
        controller.notify(EventKind::TransferStart, "transfer", &asset, None, None);
        controller.notify_error(
            "initiate",
            &TransferError::Response {
                status: 400,
                message: "bad".to_string(),
            },
            &asset,
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn error_event_carries_message() {
        let controller = TransferController::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        controller.subscribe(
            EventKind::Error,
            Arc::new(move |event: &TransferEvent| {
                sink.lock().unwrap().push(event.error.clone());
            }),
        );

        controller.notify_error(
            "transfer",
            &TransferError::Stream("reset".to_string()),
            &sample_asset(),
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].as_deref().unwrap().contains("reset"));
    }

    #[test]
    fn first_error_is_sticky() {
        let controller = TransferController::new();
        let asset = sample_asset();
        assert!(controller.first_error().is_none());

        controller.notify_error("a", &TransferError::NotSupported, &asset);
        controller.notify_error(
            "b",
            &TransferError::Response {
                status: 500,
                message: "later".to_string(),
            },
            &asset,
        );
        let first = controller.first_error().unwrap();
        assert!(first.contains("not supported"));
    }

    #[test]
    fn capability_probe_tracks_first_error_only() {
        let controller = TransferController::new();
        assert!(controller.direct_binary_enabled());

        let asset = sample_asset();
        controller.notify_error(
            "initiate",
            &TransferError::Response {
                status: 500,
                message: "boom".to_string(),
            },
            &asset,
        );
        // Non-NOT_SUPPORTED errors leave the probe enabled.
        assert!(controller.direct_binary_enabled());

        let controller = TransferController::new();
        controller.notify_error("initiate", &TransferError::NotSupported, &asset);
        assert!(!controller.direct_binary_enabled());
    }
}
