//! QRLens - Generate self-verified QR codes and decode QR images
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary crate provides the Slint GUI frontend for QRLens. It initializes:
//! - Configuration loading ([`ConfigManager`]): `QRLens Data/QRLens Config.yaml` plus
//!   `QRLENS_*` environment overrides
//! - Logging infrastructure (daily rotating file + optional console output)
//! - Tokio async runtime (image loading, file reads, the generation and parse flows)
//! - Session state ([`StateManager`]) and the startup banner in the session log
//! - GUI controller ([`GuiController`] - bridges Slint UI with the flows)
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: Run the async flows
//! - **State listener**: Background std::thread mirroring state changes into the UI
//!
//! # Execution Flow
//!
//! 1. Load configuration from `QRLens Data/`
//! 2. Initialize logging → `<log_directory>/qrlens.<date>`
//! 3. Create the tokio runtime
//! 4. Create StateManager and write the startup banner
//! 5. Create GuiController and run the Slint event loop (blocks until window closed)
//! 6. Log the metrics summary and shut the runtime down with a 5s timeout

use anyhow::Result;
use camino::Utf8Path;
use qrlens::services::GenerationSettings;
use qrlens::ui::GuiController;
use qrlens::{ConfigManager, SessionInfo, StateManager, APP_NAME, VERSION};
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    let started = Instant::now();

    // Configuration comes first: it decides the log directory and level
    let config_manager = ConfigManager::new("QRLens Data")?;
    let user_config = config_manager.load_user_config()?;
    let settings = &user_config.settings;

    // Keep the guard alive for the whole run, or buffered log lines are lost
    let _log_guard = qrlens::logging::setup_logging(
        Utf8Path::new(&settings.log_directory),
        "qrlens",
        settings.debug_mode,
        settings.console_log,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("qrlens-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized");

    let state_manager = StateManager::new();
    let generation_settings = GenerationSettings::from(settings);
    tracing::info!(
        "Generation settings: max_attempts={}, module_scale={}",
        generation_settings.max_attempts,
        generation_settings.module_scale
    );

    let gui_controller = GuiController::new(
        state_manager.clone(),
        generation_settings,
        runtime.handle().clone(),
    )?;

    state_manager.begin_session(&SessionInfo::current(started));
    tracing::info!("GUI controller initialized, launching window");

    // Blocks until the window is closed
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");
    state_manager.metrics().log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
