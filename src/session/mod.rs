// Session data model - the complete in-memory state of one interaction

mod store;

pub use store::{Flight, GENERATION_INVITE, SessionStore, Snapshot, UPLOAD_GREETING};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;

/// How the session was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Initial,
    TextToImage,
    ImageToImage,
}

impl Mode {
    pub fn as_str(&self) -> &str {
        match self {
            Mode::Initial => "initial",
            Mode::TextToImage => "text-to-image",
            Mode::ImageToImage => "image-to-image",
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, Mode::Initial)
    }
}

/// Immutable image payload plus its MIME type.
///
/// Cloning is cheap; the bytes are shared and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl ImageRef {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            mime_type: mime_type.into(),
        }
    }

    /// Decode a base64 payload received at the remote boundary
    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> Result<Self, base64::DecodeError> {
        let bytes = BASE64.decode(data.trim().as_bytes())?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntry {
    UserPrompt(String),
    AiText(String),
    AiImage(ImageRef),
}

/// Current state of the interaction.
///
/// `Session::default()` is the zero value that `reset` returns to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub mode: Mode,
    pub current_image: Option<ImageRef>,
    pub transcript: Vec<ChatEntry>,
    pub is_busy: bool,
    pub last_error: Option<String>,
    /// Prompt of an in-flight text-to-image request, committed to the
    /// transcript only once an image arrives.
    pub pending_prompt: Option<String>,
}

impl Session {
    /// Check the structural invariants between mode, image and transcript
    pub fn is_consistent(&self) -> bool {
        match self.mode {
            Mode::Initial => self.current_image.is_none() && self.transcript.is_empty(),
            Mode::TextToImage | Mode::ImageToImage => self.current_image.is_some(),
        }
    }
}
