use crate::services::debug_log::LOG_EXPORT_FILENAME;
use crate::state::StateManager;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;

/// Write the session log to a user-chosen file.
///
/// `choose_path` is asked for a destination (the GUI shows a save dialog suggesting
/// `debug-log.log`); returning `None` cancels without writing. Returns the written path.
pub fn export_log<F>(state: &StateManager, choose_path: F) -> Result<Option<Utf8PathBuf>>
where
    F: FnOnce() -> Option<Utf8PathBuf>,
{
    state.log("用户点击了下载日志文件按钮");

    let Some(path) = choose_path() else {
        tracing::debug!("Log export cancelled");
        return Ok(None);
    };

    let contents = state.export_log();
    fs::write(&path, contents).with_context(|| format!("Failed to write session log: {}", path))?;

    state.log(format!("日志文件下载成功，文件名：{}", LOG_EXPORT_FILENAME));
    tracing::info!("Session log exported to {}", path);
    Ok(Some(path))
}

/// Write the verified QR image to a user-chosen file.
///
/// Without an artifact nothing is written and the dialog is never shown.
pub fn save_artifact<F>(state: &StateManager, choose_path: F) -> Result<Option<Utf8PathBuf>>
where
    F: FnOnce() -> Option<Utf8PathBuf>,
{
    let Some(png) = state.read(|s| s.artifact.as_ref().map(|a| a.png.clone())) else {
        state.log("下载失败：未找到二维码图片");
        return Ok(None);
    };
    state.log("用户点击了下载二维码图片按钮");

    let Some(path) = choose_path() else {
        tracing::debug!("QR image download cancelled");
        return Ok(None);
    };

    fs::write(&path, &png[..]).with_context(|| format!("Failed to write QR image: {}", path))?;

    state.log("下载二维码图片，成功");
    tracing::info!("QR image saved to {}", path);
    Ok(Some(path))
}
