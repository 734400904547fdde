use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use vcb_core::{domain::ChatId, events::EventKind};

use crate::router::AppState;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Always answer so the client stops its spinner.
    if let Err(e) = state.messenger.answer_callback_query(&q.id, None).await {
        debug!("failed to answer callback query: {e}");
    }

    let Some(chat) = q.message.as_ref().map(|m| ChatId(m.chat.id.0)) else {
        return Ok(());
    };
    let data = match q.data.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => return Ok(()),
    };

    super::dispatch(&state, chat, &q.from, EventKind::Selection(data)).await;
    Ok(())
}
