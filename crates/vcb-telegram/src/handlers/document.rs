use teloxide::{net::Download, prelude::*, types::Document, types::User};
use tracing::{debug, info, warn};

use vcb_core::{
    access::Role,
    domain::ChatId,
    events::EventKind,
    formatting::code,
};

use crate::router::AppState;

const DOWNLOAD_FAILED: &str = "❌ Could not download that file. Please send it again.";

/// Download an uploaded document into memory.
///
/// Returns `None` when the user was already answered here (oversized file or a
/// failed download). Unauthorized senders are passed on without a download so
/// the engine can deny them.
pub async fn receive(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    user: &User,
    doc: &Document,
) -> Option<EventKind> {
    let file_name = doc
        .file_name
        .clone()
        .unwrap_or_else(|| "upload".to_string());

    let authorized = state
        .engine
        .gate()
        .role_of(super::user_id_of(user))
        .map(Role::is_authorized)
        .unwrap_or(false);
    if !authorized {
        return Some(EventKind::Document {
            file_name,
            bytes: Vec::new(),
        });
    }

    let size = u64::from(doc.file.size);
    if size > state.cfg.max_upload_bytes {
        let msg = format!(
            "⚠️ {} is too large ({} bytes, limit {}).",
            code(&file_name),
            size,
            state.cfg.max_upload_bytes
        );
        if let Err(e) = state.messenger.send_html(chat, &msg).await {
            debug!(chat = %chat, "failed to send size notice: {e}");
        }
        return None;
    }

    match download(bot, doc, state.cfg.max_upload_bytes).await {
        Ok(bytes) => {
            info!(chat = %chat, file = %file_name, bytes = bytes.len(), "document received");
            Some(EventKind::Document { file_name, bytes })
        }
        Err(e) => {
            warn!(chat = %chat, file = %file_name, "document download failed: {e}");
            if let Err(e) = state.messenger.send_html(chat, DOWNLOAD_FAILED).await {
                debug!(chat = %chat, "failed to send download notice: {e}");
            }
            None
        }
    }
}

async fn download(bot: &Bot, doc: &Document, limit: u64) -> anyhow::Result<Vec<u8>> {
    let file = bot.get_file(doc.file.id.clone()).await?;
    if u64::from(file.size) > limit {
        anyhow::bail!("file grew past the upload limit ({} bytes)", file.size);
    }
    let mut dst: Vec<u8> = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut dst).await?;
    Ok(dst)
}
