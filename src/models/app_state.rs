use camino::Utf8PathBuf;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The two views of the main window. Exactly one is visible at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Generate,
    Parse,
}

impl Tab {
    /// Identifier used by the UI layer and in the session log
    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Generate => "generate",
            Tab::Parse => "parse",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(Tab::Generate),
            "parse" => Ok(Tab::Parse),
            other => Err(format!("unknown tab: {other}")),
        }
    }
}

/// Phases of the verify-and-retry generation state machine.
///
/// ```text
/// Idle -> Encoding -> Verifying -> Success
///                               -> Retrying -> Encoding ...
///                               -> Failed
/// ```
///
/// Encoder or decoder errors jump from `Encoding`/`Verifying` straight to `Failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GenerationPhase {
    #[default]
    Idle,
    Encoding,
    Verifying,
    Retrying,
    Success,
    Failed,
}

impl GenerationPhase {
    /// True while a generation owns the artifact slot.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            GenerationPhase::Encoding | GenerationPhase::Verifying | GenerationPhase::Retrying
        )
    }

    /// Short status line for the generate view
    pub fn status_text(&self, attempt: u32) -> String {
        match self {
            GenerationPhase::Idle | GenerationPhase::Success | GenerationPhase::Failed => {
                String::new()
            }
            GenerationPhase::Encoding if attempt == 0 => "正在生成二维码...".to_string(),
            GenerationPhase::Encoding => format!("正在重新生成（第 {attempt} 次重试）..."),
            GenerationPhase::Verifying => "正在自动验证...".to_string(),
            GenerationPhase::Retrying => "验证失败，准备重试...".to_string(),
        }
    }
}

/// A rendered QR image that passed round-trip verification.
///
/// Buffers are reference counted so cloning [`AppState`] for change detection stays cheap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrArtifact {
    /// The text the symbol encodes (already trimmed)
    pub text: String,
    /// PNG bytes as written by the download action
    pub png: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// 8-bit greyscale pixels, row-major, `width * height` long
    pub luma: Arc<[u8]>,
}

impl QrArtifact {
    /// Expand the greyscale pixels to RGBA for display.
    pub fn to_rgba(&self) -> Vec<u8> {
        self.luma.iter().flat_map(|&l| [l, l, l, 0xff]).collect()
    }
}

/// Session state for one run of the application.
///
/// Lives inside [`crate::state::StateManager`], which owns the lock, the session log and
/// the change broadcast. Nothing here is persisted.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Presentation
    pub active_tab: Tab,
    pub debug_modal_visible: bool,

    // Generation
    pub generation_phase: GenerationPhase,
    pub generation_attempt: u32,
    pub generation_error: Option<String>,
    pub artifact: Option<QrArtifact>,

    // Parsing
    pub selected_file: Option<Utf8PathBuf>,
    pub is_parsing: bool,
    pub parse_result: String,
}

impl AppState {
    /// The download control is shown only for a verified artifact.
    pub fn download_visible(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn is_tab_visible(&self, tab: Tab) -> bool {
        self.active_tab == tab
    }

    /// Drop the previous artifact and error before a new generation starts.
    pub fn reset_generation(&mut self) {
        self.artifact = None;
        self.generation_error = None;
        self.generation_attempt = 0;
    }
}
