use async_trait::async_trait;

use crate::{
    codec::OutgoingFile,
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Outbound side of the chat transport.
///
/// Delivery is best-effort; retrying transient transport failures is the
/// adapter's job, not the caller's.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    /// Send one delivery batch. `files.len()` never exceeds
    /// `capabilities().max_files_per_batch`.
    async fn send_documents(&self, chat_id: ChatId, files: Vec<OutgoingFile>) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
