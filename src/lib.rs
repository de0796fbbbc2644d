//! AI art companion
//!
//! Generate an image from a text prompt or upload one, then refine it
//! through chat. Image understanding, generation and editing are delegated
//! to a remote generative-AI service behind the [`Gateway`] trait; this
//! crate owns the session state machine around it.

pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod media;
pub mod session;

pub use config::CompanionConfig;
pub use controller::Controller;
pub use error::{ConfigError, Rejection, RemoteFailure};
pub use gateway::{Gateway, GeminiGateway};
pub use session::{ChatEntry, ImageRef, Mode, Session, SessionStore, Snapshot};
