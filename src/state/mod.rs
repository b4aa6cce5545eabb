// State management module
//
// StateManager owns the session: AppState behind an RwLock, the append-only session log,
// the session metrics, and a broadcast channel of change events for the GUI.

use crate::metrics::Metrics;
use crate::models::{AppState, GenerationPhase, QrArtifact, Tab};
use crate::services::debug_log::{DebugLog, LogEntry};
use camino::Utf8PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Change events emitted when session state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A new line was appended to the session log
    LogAppended(LogEntry),

    TabChanged {
        tab: Tab,
    },

    DebugModalToggled {
        visible: bool,
    },

    GenerationPhaseChanged {
        phase: GenerationPhase,
        attempt: u32,
    },

    /// The verified artifact appeared or was cleared (drives the download control)
    ArtifactChanged {
        present: bool,
    },

    GenerationErrorChanged {
        message: Option<String>,
    },

    SelectedFileChanged {
        path: Option<String>,
    },

    ParseStatusChanged {
        is_parsing: bool,
    },

    ParseResultChanged {
        text: String,
    },
}

/// Environment details written to the session log at startup
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub app_version: String,
    pub os: String,
    pub arch: String,
    pub parallelism: usize,
    pub startup: Duration,
}

impl SessionInfo {
    /// Describe the current process; `started` is the instant `main` began.
    pub fn current(started: Instant) -> Self {
        Self {
            app_version: crate::VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            startup: started.elapsed(),
        }
    }
}

/// Thread-safe session state with event emission
///
/// - [`read()`](Self::read) / [`snapshot()`](Self::snapshot) for reading [`AppState`]
/// - [`update()`](Self::update) for mutations; changed fields are broadcast as [`StateChange`]
/// - [`log()`](Self::log) to append to the session log
/// - [`subscribe()`](Self::subscribe) for listening (the GUI mirrors everything it receives)
///
/// Every component gets the same `StateManager` (or a clone, which shares everything).
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    debug_log: Arc<DebugLog>,
    metrics: Arc<Metrics>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast buffer holds 256 events; slow subscribers see `Lagged` and resync.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            debug_log: Arc::new(DebugLog::new()),
            metrics: Arc::new(Metrics::new()),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> AppState {
        self.state.read().expect("state lock poisoned").clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let downloadable = state_manager.read(|state| state.download_visible());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().expect("state lock poisoned");
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().expect("state lock poisoned");
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            self.emit(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Append a line to the session log and broadcast it.
    pub fn log(&self, message: impl Into<String>) -> LogEntry {
        self.debug_log
            .record_with(message, |entry| self.emit(StateChange::LogAppended(entry.clone())))
    }

    /// The session log (read access; appends go through [`log()`](Self::log))
    pub fn debug_log(&self) -> &DebugLog {
        &self.debug_log
    }

    /// Full session log, newline-joined
    pub fn export_log(&self) -> String {
        self.debug_log.export()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Owned handle to the metrics, for components that outlive a borrow (the UI bridge)
    pub fn shared_metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    fn emit(&self, change: StateChange) {
        // No subscribers is fine (tests, startup)
        if self.state_tx.send(change).is_ok() {
            self.metrics.record_state_broadcast();
        }
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.active_tab != new.active_tab {
            changes.push(StateChange::TabChanged {
                tab: new.active_tab,
            });
        }

        if old.debug_modal_visible != new.debug_modal_visible {
            changes.push(StateChange::DebugModalToggled {
                visible: new.debug_modal_visible,
            });
        }

        if old.generation_phase != new.generation_phase
            || old.generation_attempt != new.generation_attempt
        {
            changes.push(StateChange::GenerationPhaseChanged {
                phase: new.generation_phase,
                attempt: new.generation_attempt,
            });
        }

        if old.artifact != new.artifact {
            changes.push(StateChange::ArtifactChanged {
                present: new.artifact.is_some(),
            });
        }

        if old.generation_error != new.generation_error {
            changes.push(StateChange::GenerationErrorChanged {
                message: new.generation_error.clone(),
            });
        }

        if old.selected_file != new.selected_file {
            changes.push(StateChange::SelectedFileChanged {
                path: new.selected_file.as_ref().map(|p| p.to_string()),
            });
        }

        if old.is_parsing != new.is_parsing {
            changes.push(StateChange::ParseStatusChanged {
                is_parsing: new.is_parsing,
            });
        }

        if old.parse_result != new.parse_result {
            changes.push(StateChange::ParseResultChanged {
                text: new.parse_result.clone(),
            });
        }

        changes
    }

    // Session lifecycle

    /// Write the startup banner to the session log.
    pub fn begin_session(&self, info: &SessionInfo) {
        self.log("用户打开了应用");
        self.log("正在初始化...");
        self.log(format!("应用版本：{}", info.app_version));
        self.log(format!("操作系统：{} ({})", info.os, info.arch));
        self.log(format!("可用并行度：{}", info.parallelism));
        self.log("初始化完成");
        self.log("UI界面加载完成");
        self.log("默认版块已成功切换到生成二维码");
        self.log(format!(
            "页面加载完成，耗时：{:.3}ms",
            info.startup.as_secs_f64() * 1000.0
        ));
        self.log(" ");
        self.log("------------------------------");
        self.log(" ");
    }

    // Tab controller

    /// Make `tab` the only visible view. Always logs, even if it is already active.
    pub fn show_tab(&self, tab: Tab) -> Vec<StateChange> {
        let changes = self.update(|state| {
            state.active_tab = tab;
        });
        self.log(format!("用户切换了板块：{}", tab));
        changes
    }

    // Debug modal

    pub fn open_debug_modal(&self) -> Vec<StateChange> {
        self.log("用户点击了查看调试按钮");
        self.log("正在打开调试...");
        let changes = self.update(|state| {
            state.debug_modal_visible = true;
        });
        self.log("调试框打开成功");
        changes
    }

    pub fn close_debug_modal(&self) -> Vec<StateChange> {
        self.log("用户点击了关闭按钮");
        self.log("正在关闭调试...");
        let changes = self.update(|state| {
            state.debug_modal_visible = false;
        });
        self.log("调试框关闭成功");
        changes
    }

    // Generation

    /// Claim the artifact slot for a new generation.
    ///
    /// Clears the previous artifact and error and enters `Encoding`. Returns `false`
    /// without touching anything if a generation is already in flight.
    pub fn try_begin_generation(&self) -> bool {
        let mut started = false;
        self.update(|state| {
            if !state.generation_phase.is_busy() {
                state.reset_generation();
                state.generation_phase = GenerationPhase::Encoding;
                started = true;
            }
        });
        started
    }

    pub fn set_generation_phase(&self, phase: GenerationPhase, attempt: u32) -> Vec<StateChange> {
        self.update(|state| {
            state.generation_phase = phase;
            state.generation_attempt = attempt;
        })
    }

    /// Store the verified artifact; this is the only path that reveals the download control.
    pub fn finish_generation_success(&self, artifact: QrArtifact) -> Vec<StateChange> {
        self.update(|state| {
            state.generation_phase = GenerationPhase::Success;
            state.generation_error = None;
            state.artifact = Some(artifact);
        })
    }

    /// Leave the flow in `Failed` with an inline message and no artifact.
    pub fn finish_generation_failure(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| {
            state.generation_phase = GenerationPhase::Failed;
            state.artifact = None;
            state.generation_error = Some(message);
        })
    }

    // Parsing

    /// Remember the file chosen in the open dialog.
    pub fn select_file(&self, path: Option<Utf8PathBuf>) -> Vec<StateChange> {
        if let Some(ref path) = path {
            self.log(format!(
                "已选择文件：{}",
                path.file_name().unwrap_or(path.as_str())
            ));
        }
        self.update(|state| {
            state.selected_file = path;
        })
    }

    pub fn set_parsing(&self, is_parsing: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.is_parsing = is_parsing;
        })
    }

    pub fn set_parse_result(&self, text: impl Into<String>) -> Vec<StateChange> {
        let text = text.into();
        self.update(|state| {
            state.parse_result = text;
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same session
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            debug_log: Arc::clone(&self.debug_log),
            metrics: Arc::clone(&self.metrics),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<StateChange>) -> Vec<StateChange> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.active_tab, Tab::Generate);
        assert!(!state.debug_modal_visible);
        assert!(manager.debug_log().is_empty());
    }

    #[test]
    fn test_update_with_change_detection() {
        let manager = StateManager::new();

        let changes = manager.update(|state| {
            state.active_tab = Tab::Parse;
            state.debug_modal_visible = true;
        });

        assert_eq!(
            changes,
            vec![
                StateChange::TabChanged { tab: Tab::Parse },
                StateChange::DebugModalToggled { visible: true },
            ]
        );
    }

    #[test]
    fn test_no_change_no_event() {
        let manager = StateManager::new();
        let changes = manager.update(|state| {
            state.active_tab = Tab::Generate;
        });
        assert!(changes.is_empty());
    }

    #[test]
    fn test_log_is_broadcast_in_order() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.log("first");
        manager.log("second");

        let messages: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                StateChange::LogAppended(entry) => Some(entry.message),
                _ => None,
            })
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_show_tab_same_tab_still_logs() {
        let manager = StateManager::new();

        let first = manager.show_tab(Tab::Parse);
        let second = manager.show_tab(Tab::Parse);

        assert_eq!(first, vec![StateChange::TabChanged { tab: Tab::Parse }]);
        assert!(second.is_empty());
        assert_eq!(manager.debug_log().len(), 2);
        assert!(manager.read(|s| s.is_tab_visible(Tab::Parse)));
        assert!(!manager.read(|s| s.is_tab_visible(Tab::Generate)));
    }

    #[test]
    fn test_modal_open_close() {
        let manager = StateManager::new();

        manager.open_debug_modal();
        assert!(manager.read(|s| s.debug_modal_visible));
        assert!(manager.debug_log().contains("调试框打开成功"));

        manager.close_debug_modal();
        assert!(!manager.read(|s| s.debug_modal_visible));
        assert!(manager.debug_log().contains("调试框关闭成功"));
        assert_eq!(manager.debug_log().len(), 6);
    }

    #[test]
    fn test_begin_generation_guard() {
        let manager = StateManager::new();

        assert!(manager.try_begin_generation());
        assert_eq!(manager.read(|s| s.generation_phase), GenerationPhase::Encoding);
        assert!(!manager.try_begin_generation());

        manager.finish_generation_failure("boom");
        assert!(manager.try_begin_generation());
        assert!(manager.read(|s| s.generation_error.is_none()));
    }

    #[test]
    fn test_generation_success_reveals_download() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();
        manager.try_begin_generation();

        manager.finish_generation_success(QrArtifact {
            text: "hello".to_string(),
            png: Arc::from(vec![0u8; 4]),
            width: 1,
            height: 1,
            luma: Arc::from(vec![0u8]),
        });

        assert!(manager.read(|s| s.download_visible()));
        let events = drain(&mut rx);
        assert!(events.contains(&StateChange::ArtifactChanged { present: true }));
    }

    #[test]
    fn test_select_file_logs_name() {
        let manager = StateManager::new();
        let changes = manager.select_file(Some(Utf8PathBuf::from("/tmp/codes/sample.png")));

        assert_eq!(
            changes,
            vec![StateChange::SelectedFileChanged {
                path: Some("/tmp/codes/sample.png".to_string())
            }]
        );
        assert!(manager.debug_log().contains("已选择文件：sample.png"));
    }

    #[test]
    fn test_begin_session_banner() {
        let manager = StateManager::new();
        manager.begin_session(&SessionInfo::current(Instant::now()));

        let entries = manager.debug_log().entries();
        assert_eq!(entries.first().unwrap().message, "用户打开了应用");
        assert_eq!(entries[entries.len() - 2].message, "------------------------------");
        assert!(manager.debug_log().contains("默认版块已成功切换到生成二维码"));
    }

    #[test]
    fn test_clone_shares_session() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.show_tab(Tab::Parse);

        assert_eq!(manager2.read(|s| s.active_tab), Tab::Parse);
        assert_eq!(manager2.debug_log().len(), 1);
    }

    #[test]
    fn test_broadcasts_are_counted() {
        use std::sync::atomic::Ordering;

        let manager = StateManager::new();
        manager.log("nobody listening");
        assert_eq!(manager.metrics().state_broadcasts.load(Ordering::Relaxed), 0);

        let _rx = manager.subscribe();
        manager.log("someone listening");
        assert_eq!(manager.metrics().state_broadcasts.load(Ordering::Relaxed), 1);
    }
}
