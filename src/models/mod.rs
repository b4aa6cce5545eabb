//! Data models for the QRLens application.
//!
//! - [`AppState`]: session state (active tab, modal, generation phase, artifact, parse result)
//! - [`QrArtifact`]: the verified output of the most recent successful generation
//! - [`UserConfig`]: user preferences loaded from `QRLens Config.yaml`
//!
//! The session log is not part of [`AppState`]; it is owned by
//! [`StateManager`](crate::state::StateManager) next to it so that appends never need the
//! state write lock.

pub mod app_state;
pub mod config;

pub use app_state::{AppState, GenerationPhase, QrArtifact, Tab};
pub use config::{Settings, UserConfig};
