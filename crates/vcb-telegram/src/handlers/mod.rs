//! Telegram update handlers.
//!
//! Each handler turns a teloxide update into a core `Inbound` event and hands
//! it to the session engine. Access checks, sequencing and replies all live in
//! the engine.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};
use tracing::{debug, warn};

use vcb_core::{
    domain::{ChatId, UserId},
    events::{EventKind, Inbound},
};

use crate::router::AppState;

mod callback;
mod document;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat = ChatId(msg.chat.id.0);

    let kind = if let Some(text) = msg.text() {
        text::classify(text)
    } else if let Some(doc) = msg.document() {
        match document::receive(&bot, &state, chat, user, doc).await {
            Some(kind) => kind,
            None => return Ok(()),
        }
    } else {
        debug!(chat = %chat, "ignoring unsupported message type");
        return Ok(());
    };

    dispatch(&state, chat, user, kind).await;
    Ok(())
}

pub(crate) fn username_of(user: &User) -> String {
    user.username
        .clone()
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn user_id_of(user: &User) -> UserId {
    UserId(user.id.0 as i64)
}

/// Hand one event to the engine. Errors were already reported to the user.
pub(crate) async fn dispatch(state: &AppState, chat: ChatId, user: &User, kind: EventKind) {
    let event = Inbound {
        chat,
        user: user_id_of(user),
        username: username_of(user),
        kind,
    };
    if let Err(e) = state.engine.handle(event).await {
        warn!(chat = %chat, "event handling failed: {e}");
    }
}
