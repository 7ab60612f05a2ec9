use async_trait::async_trait;

use crate::Result;

/// Name of the command starting a generation.
pub const GENERATE: &str = "generate";
/// Name of the command cancelling the in-flight generation.
pub const STOP: &str = "stop";
/// Name of the command copying a picked image into app storage.
pub const COPY_IMAGE: &str = "copy_image";

/// Request/response commands offered by the native backend.
///
/// Generated text is not returned from [`generate`](Backend::generate); it
/// arrives asynchronously on the generation event channel.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start generating an answer to `prompt` about the image at `image`.
    /// Resolves once generation has started.
    async fn generate(&self, prompt: &str, image: &str) -> Result<()>;

    /// Request cancellation of any in-flight generation.
    async fn stop(&self) -> Result<()>;

    /// Copy the file at `src` into application storage and return the new path.
    async fn copy_image(&self, src: &str) -> Result<String>;
}
