//! Clipboard copy with an ordered fallback chain.
//!
//! Three automatic mechanisms are tried in a fixed order, each at most once, and the chain
//! stops at the first one that works. When all three fail the caller falls back to manual
//! selection (the GUI selects the log text and asks the user to press Ctrl+C).
//!
//! The chain is async and runs on the tokio runtime. `arboard` handles live on their own
//! thread ([`SystemClipboard`]); copy commands run through `tokio::process` with a timeout.

use crate::state::StateManager;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Upper bound for a single mechanism before the chain moves on
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

const CLIPBOARD_QUEUE: usize = 8;

/// Why a single clipboard mechanism failed
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("{0}")]
    Clipboard(#[from] arboard::Error),

    #[error("命令返回失败")]
    CommandFailed,

    #[error("无可用的复制命令")]
    NoCommand,

    #[error("复制超时")]
    TimedOut,

    #[error("剪贴板线程已停止")]
    Unavailable,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// One way of putting text on the system clipboard
#[async_trait]
pub trait CopyStrategy: Send {
    /// Short label used in the session log, e.g. `现代API`
    fn name(&self) -> &'static str;

    async fn attempt(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Lazily opened `arboard` handle; opening can fail on headless systems.
#[derive(Default)]
struct LazyClipboard {
    inner: Option<arboard::Clipboard>,
}

impl LazyClipboard {
    fn ensure(&mut self) -> Result<&mut arboard::Clipboard, ClipboardError> {
        let clipboard = match self.inner.take() {
            Some(clipboard) => clipboard,
            None => arboard::Clipboard::new()?,
        };
        Ok(self.inner.insert(clipboard))
    }

    fn write(&mut self, write: ClipboardWrite) -> Result<(), ClipboardError> {
        let clipboard = self.ensure()?;
        match write {
            ClipboardWrite::Text(text) => clipboard.set_text(text)?,
            ClipboardWrite::Html { html, alt_text } => clipboard.set_html(html, Some(alt_text))?,
        }
        Ok(())
    }
}

enum ClipboardWrite {
    Text(String),
    Html { html: String, alt_text: String },
}

struct ClipboardJob {
    write: ClipboardWrite,
    reply: oneshot::Sender<Result<(), ClipboardError>>,
}

/// Handle to the thread that owns the platform clipboard.
///
/// The `arboard` handle is opened lazily on that thread and kept for the rest of the
/// session, so X11 selections stay owned after a copy. The thread exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct SystemClipboard {
    jobs: mpsc::Sender<ClipboardJob>,
}

impl SystemClipboard {
    pub fn spawn() -> Self {
        let (jobs, mut job_rx) = mpsc::channel::<ClipboardJob>(CLIPBOARD_QUEUE);

        std::thread::spawn(move || {
            tracing::debug!("Clipboard thread started");
            let mut clipboard = LazyClipboard::default();

            while let Some(job) = job_rx.blocking_recv() {
                let result = clipboard.write(job.write);
                // The requester may have timed out already
                let _ = job.reply.send(result);
            }

            tracing::debug!("Clipboard thread terminated");
        });

        Self { jobs }
    }

    async fn write(&self, write: ClipboardWrite) -> Result<(), ClipboardError> {
        let (reply, result) = oneshot::channel();
        self.jobs
            .send(ClipboardJob { write, reply })
            .await
            .map_err(|_| ClipboardError::Unavailable)?;
        result.await.map_err(|_| ClipboardError::Unavailable)?
    }
}

/// Plain text write through the platform clipboard API
pub struct DirectTextWrite {
    clipboard: SystemClipboard,
}

impl DirectTextWrite {
    pub fn new(clipboard: SystemClipboard) -> Self {
        Self { clipboard }
    }
}

#[async_trait]
impl CopyStrategy for DirectTextWrite {
    fn name(&self) -> &'static str {
        "现代API"
    }

    async fn attempt(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.clipboard
            .write(ClipboardWrite::Text(text.to_string()))
            .await
    }
}

/// Byte encoding a copy command expects on stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinEncoding {
    Utf8,
    /// `clip.exe` reads the ANSI code page unless the input starts with a UTF-16LE BOM
    Utf16LeBom,
}

impl StdinEncoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16LeBom => {
                let mut bytes = Vec::with_capacity(2 + text.len() * 2);
                bytes.extend_from_slice(&[0xFF, 0xFE]);
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes
            }
        }
    }
}

/// A copy command and how it wants its input
#[derive(Debug, Clone, Copy)]
struct CopyCommand {
    program: &'static str,
    args: &'static [&'static str],
    encoding: StdinEncoding,
}

impl CopyCommand {
    const fn utf8(program: &'static str, args: &'static [&'static str]) -> Self {
        Self {
            program,
            args,
            encoding: StdinEncoding::Utf8,
        }
    }
}

const NO_ARGS: &[&str] = &[];
const XCLIP_ARGS: &[&str] = &["-selection", "clipboard"];
const XSEL_ARGS: &[&str] = &["--clipboard", "--input"];

/// Pipe the text into the platform's copy command
#[derive(Debug, Clone)]
pub struct SelectionCommand {
    candidates: Vec<CopyCommand>,
}

impl SelectionCommand {
    /// Commands for the current platform, in preference order
    pub fn for_platform() -> Self {
        let mut candidates = Vec::new();
        if cfg!(windows) {
            candidates.push(CopyCommand {
                program: "clip",
                args: NO_ARGS,
                encoding: StdinEncoding::Utf16LeBom,
            });
        } else if cfg!(target_os = "macos") {
            candidates.push(CopyCommand::utf8("pbcopy", NO_ARGS));
        } else {
            if std::env::var_os("WAYLAND_DISPLAY").is_some() {
                candidates.push(CopyCommand::utf8("wl-copy", NO_ARGS));
            }
            candidates.push(CopyCommand::utf8("xclip", XCLIP_ARGS));
            candidates.push(CopyCommand::utf8("xsel", XSEL_ARGS));
        }
        Self { candidates }
    }

    async fn run(command: CopyCommand, text: &str) -> Result<(), ClipboardError> {
        let mut child = Command::new(command.program)
            .args(command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping stdin closes the pipe so the command sees end of input
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&command.encoding.encode(text)).await?;
        }

        if child.wait().await?.success() {
            Ok(())
        } else {
            Err(ClipboardError::CommandFailed)
        }
    }
}

#[async_trait]
impl CopyStrategy for SelectionCommand {
    fn name(&self) -> &'static str {
        "命令行"
    }

    async fn attempt(&mut self, text: &str) -> Result<(), ClipboardError> {
        for command in &self.candidates {
            match Self::run(*command, text).await {
                Err(ClipboardError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Copy command {} not installed", command.program);
                }
                result => return result,
            }
        }
        Err(ClipboardError::NoCommand)
    }
}

/// Multi-format write: HTML with a plain-text alternative
pub struct DataWrite {
    clipboard: SystemClipboard,
}

impl DataWrite {
    pub fn new(clipboard: SystemClipboard) -> Self {
        Self { clipboard }
    }
}

#[async_trait]
impl CopyStrategy for DataWrite {
    fn name(&self) -> &'static str {
        "数据写入"
    }

    async fn attempt(&mut self, text: &str) -> Result<(), ClipboardError> {
        let html = format!("<pre>{}</pre>", escape_html(text));
        self.clipboard
            .write(ClipboardWrite::Html {
                html,
                alt_text: text.to_string(),
            })
            .await
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// How a copy request ended. Both variants count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Copied by mechanism `method` (1-based)
    Copied { method: usize },

    /// Every automatic mechanism failed; the user must copy the selection by hand
    ManualSelection,
}

/// Ordered clipboard strategies
pub struct ClipboardChain {
    strategies: Vec<Box<dyn CopyStrategy>>,
    attempt_timeout: Duration,
}

impl ClipboardChain {
    pub fn new(strategies: Vec<Box<dyn CopyStrategy>>) -> Self {
        Self {
            strategies,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Direct write, copy command, then multi-format write
    pub fn system() -> Self {
        let clipboard = SystemClipboard::spawn();
        Self::new(vec![
            Box::new(DirectTextWrite::new(clipboard.clone())),
            Box::new(SelectionCommand::for_platform()),
            Box::new(DataWrite::new(clipboard)),
        ])
    }

    /// Try each strategy once, in order, logging every attempt.
    pub async fn copy(&mut self, text: &str, state: &StateManager) -> CopyOutcome {
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            let method = index + 1;
            state.metrics().record_clipboard_attempt();

            let result = timeout(self.attempt_timeout, strategy.attempt(text))
                .await
                .unwrap_or_else(|_| Err(ClipboardError::TimedOut));

            match result {
                Ok(()) => {
                    state.log(format!("方法{}：{}复制成功", method, strategy.name()));
                    return CopyOutcome::Copied { method };
                }
                Err(e) => {
                    tracing::debug!("Clipboard strategy {} failed: {:?}", method, e);
                    state.log(format!("方法{}失败：{}", method, e));
                }
            }
        }

        state.log("所有自动方法失败，启用回退方案");
        state.metrics().record_clipboard_fallback();
        CopyOutcome::ManualSelection
    }

    /// Copy the whole session log, including the entry for this click.
    pub async fn copy_session_log(&mut self, state: &StateManager) -> CopyOutcome {
        state.log("用户点击了复制日志按钮");
        let text = state.export_log();
        let outcome = self.copy(&text, state).await;
        state.log("用户收到成功提示");
        outcome
    }
}
