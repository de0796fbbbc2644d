// Interaction Controller - validates user intents, calls the gateway, applies transitions

use crate::error::{Rejection, RemoteFailure};
use crate::gateway::Gateway;
use crate::media;
use crate::session::{ImageRef, Session, SessionStore, Snapshot};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DESCRIBE_FAILED: &str = "Failed to generate image description. Please try again.";
pub const GENERATE_FAILED: &str = "Failed to generate image from text. Please try again.";
pub const EDIT_FAILED: &str = "Failed to edit the image. Please check your prompt or try again.";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Entry points the presentation layer calls.
///
/// Remote failures never escape: they end up in the session as
/// `last_error` (and, for edits, a transcript entry). The `Err` side of each
/// entry point only reports input refused before anything changed.
#[derive(Clone)]
pub struct Controller {
    gateway: Arc<dyn Gateway>,
    store: SessionStore,
    request_timeout: Duration,
}

impl Controller {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            store: SessionStore::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.store.subscribe()
    }

    /// Upload an image: show it immediately, then ask for a description
    pub async fn on_image_selected(&self, bytes: Vec<u8>, mime_type: &str) -> Result<(), Rejection> {
        if bytes.is_empty() {
            return Err(Rejection::EmptyImage);
        }
        if !media::is_accepted(mime_type) {
            return Err(Rejection::UnsupportedMimeType(mime_type.to_string()));
        }

        let image = ImageRef::new(bytes, mime_type);
        let flight = self.store.start_upload(image.clone())?;
        tracing::info!(
            generation = flight.generation(),
            size = image.len(),
            mime_type,
            "Describing uploaded image via {}",
            self.gateway.name()
        );

        match self.call(self.gateway.describe_image(&image)).await {
            Ok(description) => {
                flight.finish_upload(description);
            }
            Err(failure) => {
                tracing::warn!(cause = failure.cause(), "Image description failed");
                flight.set_error(DESCRIBE_FAILED);
            }
        }
        Ok(())
    }

    /// Generate the first image of a text-to-image session
    pub async fn on_text_prompt_submitted(&self, text: &str) -> Result<(), Rejection> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(Rejection::EmptyPrompt);
        }

        let flight = self.store.start_text_generation(prompt.to_string())?;
        tracing::info!(generation = flight.generation(), "Generating image from prompt");

        match self.call(self.gateway.generate_image(prompt)).await {
            Ok(image) => {
                flight.finish_text_generation(image);
            }
            Err(failure) => {
                tracing::warn!(cause = failure.cause(), "Image generation failed");
                flight.set_error(GENERATE_FAILED);
            }
        }
        Ok(())
    }

    /// Apply a chat instruction to the current image
    pub async fn on_chat_message_sent(&self, text: &str) -> Result<(), Rejection> {
        let instruction = text.trim();
        if instruction.is_empty() {
            return Err(Rejection::EmptyPrompt);
        }

        let (flight, image) = self.store.start_edit()?;
        flight.append_user_message(instruction.to_string());
        tracing::info!(generation = flight.generation(), "Editing current image");

        match self.call(self.gateway.edit_image(&image, instruction)).await {
            Ok(edited) => {
                flight.append_ai_image(edited);
            }
            Err(failure) => {
                tracing::warn!(cause = failure.cause(), "Image edit failed");
                flight.append_ai_text(format!("Error: {}", EDIT_FAILED));
                flight.set_error(EDIT_FAILED);
            }
        }
        Ok(())
    }

    /// Start over; any response still in flight is discarded when it lands
    pub fn on_reset_requested(&self) {
        tracing::info!("Session reset");
        self.store.reset();
    }

    pub fn on_error_dismissed(&self) {
        self.store.clear_error();
    }

    /// Surface a presentation-side failure (e.g. an unreadable file)
    pub fn report_error(&self, message: impl Into<String>) {
        self.store.set_error(message);
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, RemoteFailure>>,
    ) -> Result<T, RemoteFailure> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteFailure::new(format!(
                "request timed out after {}s",
                self.request_timeout.as_secs()
            ))),
        }
    }
}
