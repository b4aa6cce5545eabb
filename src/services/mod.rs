//! Services module - QR generation, parsing, clipboard and export logic.
//!
//! Nothing in here knows about Slint. Every flow takes the shared
//! [`StateManager`](crate::state::StateManager) and reports through it: session log entries,
//! phase changes and results all end up as [`StateChange`](crate::state::StateChange) events
//! that the GUI mirrors.
//!
//! # Components
//!
//! - [`codec`]: the [`QrEncoder`] / [`QrDecoder`] seams with `qrcode` and `rqrr` backends,
//!   plus the one-shot [`load_image`] used to turn PNG/JPEG/... bytes into pixels.
//! - [`generation`]: [`GenerationService`], the verify-and-retry state machine. An artifact
//!   only becomes downloadable after decoding the rendered image gives back the input.
//! - [`parse`]: [`ParseService`], single-shot decoding of a user-selected image.
//! - [`clipboard`]: [`ClipboardChain`], three copy mechanisms tried in order with a manual
//!   selection fallback.
//! - [`export`]: save the session log or the verified PNG to a chosen path.
//! - [`debug_log`]: the append-only, timestamped session log.
//!
//! # Usage Example
//!
//! ```ignore
//! use qrlens::services::{GenerationService, GenerationSettings, QrCodeEncoder, RqrrDecoder};
//! use std::sync::Arc;
//!
//! let settings = GenerationSettings::default();
//! let service = GenerationService::new(
//!     QrCodeEncoder::new(settings.module_scale),
//!     Arc::new(RqrrDecoder::new()),
//!     settings,
//! );
//!
//! let outcome = service.generate("hello", &state_manager).await?;
//! ```

pub mod clipboard;
pub mod codec;
pub mod debug_log;
pub mod export;
pub mod generation;
pub mod parse;

pub use clipboard::{ClipboardChain, ClipboardError, CopyOutcome, CopyStrategy};
pub use codec::{load_image, CodecError, EcLevel, LoadedImage, QrCodeEncoder, QrDecoder, QrEncoder, RqrrDecoder};
pub use debug_log::{DebugLog, LogEntry, LOG_EXPORT_FILENAME};
pub use export::{export_log, save_artifact};
pub use generation::{
    GenerationError, GenerationOutcome, GenerationService, GenerationSettings, QRCODE_FILENAME,
};
pub use parse::{ParseError, ParseOutcome, ParseService, IMAGE_EXTENSIONS};
