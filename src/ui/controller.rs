// GUI Controller - Bridges Slint UI with the QRLens flows
//
// GuiController coordinates between:
// - Slint UI (MainWindow)
// - StateManager (session state and log)
// - GenerationService / ParseService (async flows on tokio)
// - ClipboardChain (async, on tokio) and the export helpers (synchronous, on the UI thread)
// - EventLoopBridge (async/GUI coordination)

use crate::models::Tab;
use crate::services::{
    export_log, save_artifact, ClipboardChain, CopyOutcome, GenerationError, GenerationService,
    GenerationSettings, ParseError, ParseService, QrCodeEncoder, RqrrDecoder, IMAGE_EXTENSIONS,
    LOG_EXPORT_FILENAME, QRCODE_FILENAME,
};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::{ComponentHandle, Image, Rgba8Pixel, SharedPixelBuffer};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

// Include the generated Slint code
slint::include_modules!();

const PNG_EXTENSIONS: &[&str] = &["png"];
const LOG_EXTENSIONS: &[&str] = &["log"];

type Generator = GenerationService<QrCodeEncoder, RqrrDecoder>;
type Parser = ParseService<RqrrDecoder>;

/// Everything the window displays, captured off the UI thread.
///
/// `slint::Image` is not `Send`, so the artifact travels as raw RGBA and becomes an
/// image inside [`apply`](Self::apply).
#[derive(Debug, Clone, Default)]
struct UiSnapshot {
    active_tab: &'static str,
    generating: bool,
    generation_status: String,
    generation_error: String,
    artifact: Option<(Vec<u8>, u32, u32)>,
    selected_file: String,
    parsing: bool,
    parse_result: String,
    debug_visible: bool,
    log_text: String,
}

impl UiSnapshot {
    fn capture(state_manager: &StateManager) -> Self {
        let log_text = state_manager.export_log();
        state_manager.read(|state| Self {
            active_tab: state.active_tab.as_str(),
            generating: state.generation_phase.is_busy(),
            generation_status: state.generation_phase.status_text(state.generation_attempt),
            generation_error: state.generation_error.clone().unwrap_or_default(),
            artifact: state
                .artifact
                .as_ref()
                .map(|a| (a.to_rgba(), a.width, a.height)),
            selected_file: state
                .selected_file
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            parsing: state.is_parsing,
            parse_result: state.parse_result.clone(),
            debug_visible: state.debug_modal_visible,
            log_text,
        })
    }

    fn apply(self, ui: &MainWindow) {
        ui.set_active_tab(self.active_tab.into());
        ui.set_generating(self.generating);
        ui.set_generation_status(self.generation_status.into());
        ui.set_generation_error(self.generation_error.into());
        GuiController::set_artifact_image(ui, self.artifact);
        ui.set_selected_file(self.selected_file.into());
        ui.set_parsing(self.parsing);
        ui.set_parse_result(self.parse_result.into());
        ui.set_debug_visible(self.debug_visible);
        GuiController::set_log_text(ui, self.log_text);
    }
}

/// GUI Controller that wires up the Slint UI with session state and the flows
///
/// - Creates the EventLoopBridge for tokio/Slint coordination
/// - Sets up Slint callbacks that log, update state and spawn flows
/// - Subscribes to StateManager events and mirrors them into the UI
/// - Shows native open/save dialogs using the `rfd` crate
///
/// # Example
/// ```ignore
/// let state_manager = StateManager::new();
/// let runtime = tokio::runtime::Runtime::new()?;
///
/// let controller = GuiController::new(
///     state_manager,
///     GenerationSettings::default(),
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    ui: MainWindow,
    _bridge: EventLoopBridge<MainWindow>,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// # Arguments
    /// * `state_manager` - Shared session state
    /// * `settings` - Retry cap and module scale for the generation flow
    /// * `tokio_handle` - Handle to the tokio runtime for spawning the flows
    pub fn new(
        state_manager: StateManager,
        settings: GenerationSettings,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let bridge = EventLoopBridge::new(&ui, tokio_handle, state_manager.shared_metrics());

        let decoder = Arc::new(RqrrDecoder::new());
        let generator = Arc::new(GenerationService::new(
            QrCodeEncoder::new(settings.module_scale),
            Arc::clone(&decoder),
            settings,
        ));
        let parser = Arc::new(ParseService::new(decoder));

        UiSnapshot::capture(&state_manager).apply(&ui);

        Self::setup_callbacks(&ui, &bridge, &state_manager, generator, parser);
        Self::setup_state_subscription(&bridge, &state_manager);

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &StateManager,
        generator: Arc<Generator>,
        parser: Arc<Parser>,
    ) {
        let state = state_manager.clone();

        // Tab buttons
        ui.on_switch_tab(move |id| match Tab::from_str(id.as_str()) {
            Ok(tab) => {
                state.show_tab(tab);
            }
            Err(e) => tracing::warn!("Ignoring tab switch: {}", e),
        });

        let state = state_manager.clone();
        let bridge_handle = bridge.clone_handle();
        let ui_weak = ui.as_weak();

        // Generate: the flow runs on tokio, the input text is read here on the UI thread
        ui.on_generate_clicked(move || {
            let Some(ui) = ui_weak.upgrade() else {
                return;
            };
            let input = ui.get_input_text().to_string();

            let state = state.clone();
            let generator = Arc::clone(&generator);
            let bridge = bridge_handle.clone();

            bridge_handle.spawn_async(move || async move {
                match generator.generate(&input, &state).await {
                    Ok(outcome) => tracing::debug!("Generation finished: {:?}", outcome),
                    Err(GenerationError::EmptyInput) => {
                        bridge.update_ui(|ui| Self::show_message_dialog(ui, "提示", "请输入文本"));
                    }
                    Err(GenerationError::AlreadyRunning) => {
                        tracing::debug!("Generate clicked while a generation is running");
                    }
                }
            });
        });

        let state = state_manager.clone();
        let ui_weak = ui.as_weak();

        // Download the verified QR image
        ui.on_download_qr_clicked(move || {
            let result = save_artifact(&state, || {
                Self::show_save_picker("保存二维码图片", QRCODE_FILENAME, ("PNG 图片", PNG_EXTENSIONS))
            });

            if let Some(ui) = ui_weak.upgrade() {
                match result {
                    Ok(_) if !state.read(|s| s.download_visible()) => {
                        Self::show_message_dialog(&ui, "下载失败", "未找到二维码图片");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("QR image download failed: {:?}", e);
                        Self::show_message_dialog(&ui, "下载失败", format!("{:#}", e));
                    }
                }
            }
        });

        let state = state_manager.clone();

        // Pick an image to parse
        ui.on_browse_image(move || {
            tracing::debug!("Browse image clicked");

            if let Some(path) = Self::show_file_picker("选择二维码图片", ("图片", IMAGE_EXTENSIONS)) {
                tracing::info!("Image selected: {}", path);
                state.select_file(Some(path));
            }
        });

        let state = state_manager.clone();
        let bridge_handle = bridge.clone_handle();

        // Parse the selected image
        ui.on_parse_clicked(move || {
            let file = state.read(|s| s.selected_file.clone());

            let state = state.clone();
            let parser = Arc::clone(&parser);
            let bridge = bridge_handle.clone();

            bridge_handle.spawn_async(move || async move {
                match parser.parse(file.as_deref(), &state).await {
                    Ok(outcome) => tracing::debug!("Parse finished: {:?}", outcome),
                    Err(ParseError::NoFileSelected) => {
                        bridge.update_ui(|ui| {
                            Self::show_message_dialog(ui, "提示", "请选择图片文件")
                        });
                    }
                }
            });
        });

        let state = state_manager.clone();
        ui.on_open_debug(move || {
            state.open_debug_modal();
        });

        let state = state_manager.clone();
        ui.on_close_debug(move || {
            state.close_debug_modal();
        });

        let state = state_manager.clone();
        let ui_weak = ui.as_weak();

        // Save the session log
        ui.on_download_log_clicked(move || {
            let result = export_log(&state, || {
                Self::show_save_picker("保存调试日志", LOG_EXPORT_FILENAME, ("日志文件", LOG_EXTENSIONS))
            });

            if let Err(e) = result {
                tracing::error!("Log export failed: {:?}", e);
                if let Some(ui) = ui_weak.upgrade() {
                    Self::show_message_dialog(&ui, "下载失败", format!("{:#}", e));
                }
            }
        });

        let state = state_manager.clone();
        let bridge_handle = bridge.clone_handle();
        let clipboard = Arc::new(tokio::sync::Mutex::new(ClipboardChain::system()));

        // Copy the session log: the chain runs on tokio, the prompt comes back through the bridge
        ui.on_copy_log_clicked(move || {
            let state = state.clone();
            let clipboard = Arc::clone(&clipboard);
            let bridge = bridge_handle.clone();

            bridge_handle.spawn_async(move || async move {
                let outcome = clipboard.lock().await.copy_session_log(&state).await;

                match outcome {
                    CopyOutcome::Copied { method } => {
                        tracing::info!("Session log copied with method {}", method);
                        bridge.update_ui(|ui| Self::show_message_dialog(ui, "复制日志", "复制成功！"));
                    }
                    CopyOutcome::ManualSelection => {
                        tracing::warn!("Automatic copy failed, falling back to manual selection");
                        let text = state.export_log();
                        bridge.update_ui(move |ui| {
                            // The panel may be behind the log; bring it up to date before selecting
                            Self::set_log_text(ui, text);
                            ui.invoke_select_log_text();
                            Self::show_message_dialog(ui, "复制日志", "请手动按 Ctrl+C 复制选中内容");
                        });
                    }
                }
            });
        });

        let ui_weak = ui.as_weak();

        // Message dialog dismissed
        ui.on_message_dialog_dismissed(move || {
            tracing::debug!("Message dialog dismissed");

            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_message_dialog(false);
            }
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Subscribe to state changes and update UI accordingly
    ///
    /// A background thread receives [`StateChange`] events and forwards each one to the
    /// UI through the bridge. If it falls behind, the whole window is resynced from a
    /// fresh snapshot.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &StateManager,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state_manager = state_manager.clone();
        let mut rx = state_manager.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                        Self::apply_change(&bridge_handle, &state_manager, change);
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!(
                            "State broadcast channel closed - shutting down subscription thread"
                        );
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "State subscription lagged - {} events were skipped, resyncing",
                            skipped
                        );
                        let snapshot = UiSnapshot::capture(&state_manager);
                        bridge_handle.update_ui(move |ui| snapshot.apply(ui));
                    }
                }
            }

            tracing::debug!("State subscription thread terminated gracefully");
        });
    }

    fn apply_change(
        bridge: &EventLoopBridgeHandle<MainWindow>,
        state_manager: &StateManager,
        change: StateChange,
    ) {
        match change {
            StateChange::LogAppended(_) => {
                // Always the full export so a dropped update heals on the next entry
                let text = state_manager.export_log();
                bridge.update_ui(move |ui| Self::set_log_text(ui, text));
            }

            StateChange::TabChanged { tab } => {
                bridge.update_ui(move |ui| ui.set_active_tab(tab.as_str().into()));
            }

            StateChange::DebugModalToggled { visible } => {
                let text = state_manager.export_log();
                bridge.update_ui(move |ui| {
                    if visible {
                        Self::set_log_text(ui, text);
                    }
                    ui.set_debug_visible(visible);
                });
            }

            StateChange::GenerationPhaseChanged { phase, attempt } => {
                bridge.update_ui(move |ui| {
                    ui.set_generating(phase.is_busy());
                    ui.set_generation_status(phase.status_text(attempt).into());
                });
            }

            StateChange::ArtifactChanged { present } => {
                let artifact = if present {
                    state_manager.read(|s| {
                        s.artifact
                            .as_ref()
                            .map(|a| (a.to_rgba(), a.width, a.height))
                    })
                } else {
                    None
                };
                bridge.update_ui(move |ui| Self::set_artifact_image(ui, artifact));
            }

            StateChange::GenerationErrorChanged { message } => {
                bridge.update_ui(move |ui| {
                    ui.set_generation_error(message.unwrap_or_default().into());
                });
            }

            StateChange::SelectedFileChanged { path } => {
                bridge.update_ui(move |ui| ui.set_selected_file(path.unwrap_or_default().into()));
            }

            StateChange::ParseStatusChanged { is_parsing } => {
                bridge.update_ui(move |ui| ui.set_parsing(is_parsing));
            }

            StateChange::ParseResultChanged { text } => {
                bridge.update_ui(move |ui| ui.set_parse_result(text.into()));
            }
        }
    }

    fn set_log_text(ui: &MainWindow, text: String) {
        let end = i32::try_from(text.len()).unwrap_or(i32::MAX);
        ui.set_log_text(text.into());
        ui.invoke_scroll_log_to_end(end);
    }

    fn set_artifact_image(ui: &MainWindow, artifact: Option<(Vec<u8>, u32, u32)>) {
        match artifact {
            Some((rgba, width, height)) => {
                let buffer = SharedPixelBuffer::<Rgba8Pixel>::clone_from_slice(&rgba, width, height);
                ui.set_qr_image(Image::from_rgba8(buffer));
                ui.set_has_artifact(true);
            }
            None => {
                ui.set_has_artifact(false);
                ui.set_qr_image(Image::default());
            }
        }
    }

    /// Show an informational message dialog
    fn show_message_dialog(
        ui: &MainWindow,
        title: impl Into<slint::SharedString>,
        message: impl Into<slint::SharedString>,
    ) {
        ui.set_message_title(title.into());
        ui.set_message_text(message.into());
        ui.set_show_message_dialog(true);
    }

    /// Show a native open dialog filtered to `filter` (name, extensions)
    ///
    /// # Returns
    /// The selected file path, or None if cancelled or not valid UTF-8
    fn show_file_picker(title: &str, filter: (&str, &[&str])) -> Option<Utf8PathBuf> {
        rfd::FileDialog::new()
            .set_title(title)
            .add_filter(filter.0, filter.1)
            .pick_file()
            .and_then(Self::to_utf8)
    }

    /// Show a native save dialog suggesting `file_name`
    fn show_save_picker(title: &str, file_name: &str, filter: (&str, &[&str])) -> Option<Utf8PathBuf> {
        rfd::FileDialog::new()
            .set_title(title)
            .set_file_name(file_name)
            .add_filter(filter.0, filter.1)
            .save_file()
            .and_then(Self::to_utf8)
    }

    fn to_utf8(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
        Utf8PathBuf::try_from(path)
            .map_err(|e| {
                tracing::error!("Failed to convert path to UTF-8: {}", e);
                e
            })
            .ok()
    }
}
