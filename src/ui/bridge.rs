// EventLoopBridge - Coordinates between tokio async runtime and Slint event loop
//
// Two event loops run side by side:
// 1. Slint's single-threaded GUI event loop (main thread)
// 2. Tokio's multi-threaded runtime for the generation and parse flows
//
// The bridge spawns flows from Slint callbacks and marshals UI updates back
// onto the event loop thread.

use crate::metrics::Metrics;
use slint::{ComponentHandle, Weak};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Bounded so a stalled UI cannot grow the queue without limit
const UI_UPDATE_CAPACITY: usize = 256;

/// Coordinates between tokio async runtime and Slint event loop
///
/// Owns the handler thread; callbacks work through the [`EventLoopBridgeHandle`] from
/// [`clone_handle()`](Self::clone_handle):
/// - `update_ui()` schedules a closure on the Slint thread from any thread
/// - `spawn_async()` runs a future on the tokio runtime from a Slint callback
///
/// # Example
/// ```ignore
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone(), state.shared_metrics());
/// let handle = bridge.clone_handle();
///
/// ui.on_parse_clicked(move || {
///     let handle = handle.clone();
///     handle.clone().spawn_async(move || async move {
///         let text = run_parse().await;
///         handle.update_ui(move |ui| ui.set_parse_result(text.into()));
///     });
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create a new EventLoopBridge
    ///
    /// Starts a handler thread that forwards queued updates to the Slint event loop with
    /// `upgrade_in_event_loop`. The thread exits when the window is gone or every
    /// sender has been dropped.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        let ui_weak: Weak<T> = ui.as_weak();
        let (ui_update_tx, mut ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_UPDATE_CAPACITY);

        std::thread::spawn(move || {
            tracing::debug!("EventLoopBridge handler thread started");

            while let Some(update_fn) = ui_update_rx.blocking_recv() {
                let result = ui_weak.upgrade_in_event_loop(move |ui| {
                    update_fn(&ui);
                });

                if let Err(e) = result {
                    // The event loop has stopped
                    tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                    break;
                }
            }

            tracing::debug!("EventLoopBridge handler thread terminated");
        });

        Self {
            handle: EventLoopBridgeHandle {
                tokio_handle,
                ui_update_tx,
                metrics,
            },
        }
    }

    /// Cloneable handle for capturing in Slint callbacks and worker threads
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update from any thread
    ///
    /// Never blocks: when the queue is full the update is dropped and counted.
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.ui_update_tx.try_send(Box::new(update)) {
            Ok(_) => self.metrics.record_ui_update(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_ui_channel_full();
                tracing::warn!("UI update channel full - skipping update to prevent backpressure");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Failed to send UI update - handler thread has stopped");
            }
        }
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }
}
