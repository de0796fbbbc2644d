// Remote Generation Gateway - the boundary to the generative-AI service

mod gemini;

pub use gemini::GeminiGateway;

use crate::error::RemoteFailure;
use crate::session::ImageRef;
use async_trait::async_trait;

/// The three remote capabilities the application relies on.
///
/// No call retries internally. Each either yields a decoded result or a
/// single [`RemoteFailure`].
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Natural-language description of `image`
    async fn describe_image(&self, image: &ImageRef) -> Result<String, RemoteFailure>;

    /// A new image with `instruction` applied to `image`
    async fn edit_image(&self, image: &ImageRef, instruction: &str) -> Result<ImageRef, RemoteFailure>;

    /// One square image generated from `prompt`
    async fn generate_image(&self, prompt: &str) -> Result<ImageRef, RemoteFailure>;

    /// Short identifier for logs
    fn name(&self) -> &str;
}
