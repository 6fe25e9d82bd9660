//! Collaborator traits consumed by the scheduler.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ItemKind, Priority, RenderRequest, SendOutcome};

/// Delivers one rendered message to one destination.
///
/// `Ok(SendOutcome { ok: false, .. })` means the destination rejected the
/// message. `Err(..)` means the transport itself blew up; the dispatcher
/// treats that as a failure of the whole item.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Short name used in logs ("whatsapp", "telegram", ...).
    fn name(&self) -> &str;

    async fn send_text(&self, destination: &str, message: &str) -> Result<SendOutcome>;
}

/// Infers metadata from free text and renders final message bodies.
pub trait Classifier: Send + Sync {
    fn classify_kind(&self, text: &str) -> ItemKind;

    fn classify_priority(&self, text: &str) -> Priority;

    /// Candidate tags; callers normalize them.
    fn classify_tags(&self, text: &str) -> Vec<String>;

    fn render_message(&self, request: &RenderRequest<'_>) -> String;
}
