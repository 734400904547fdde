//! Outbound pacing for the messaging port.
//!
//! Telegram answers bursts with 429s. A finished conversion can emit several
//! document batches back to back, so batches hold the chat longer than a plain
//! reply does.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::{
    codec::OutgoingFile,
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Spacing between any two API calls of the bot.
    pub global_gap: Duration,
    /// Spacing after a text reply, keyboard or chat action in one chat.
    pub chat_gap: Duration,
    /// Spacing after a document batch in one chat.
    pub batch_gap: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_gap: Duration::from_millis(40),
            chat_gap: Duration::from_millis(1050),
            batch_gap: Duration::from_secs(3),
        }
    }
}

/// Next free send slot, globally and per chat.
///
/// A chat whose slot already passed needs no state; such entries are dropped
/// whenever a new chat is added.
#[derive(Debug)]
struct Slots {
    global: Instant,
    chats: HashMap<ChatId, Instant>,
}

impl Slots {
    fn new(now: Instant) -> Self {
        Self {
            global: now,
            chats: HashMap::new(),
        }
    }

    /// Claim the next slot and return how long the caller has to wait for it.
    fn reserve(
        &mut self,
        now: Instant,
        global_gap: Duration,
        chat: Option<(ChatId, Duration)>,
    ) -> Duration {
        let global_slot = self.global.max(now);
        self.global = global_slot + global_gap;

        let chat_slot = match chat {
            Some((chat, gap)) => {
                if !self.chats.contains_key(&chat) {
                    self.chats.retain(|_, next| *next > now);
                }
                let slot = self.chats.get(&chat).copied().unwrap_or(now).max(now);
                self.chats.insert(chat, slot + gap);
                slot
            }
            None => now,
        };

        global_slot.max(chat_slot).saturating_duration_since(now)
    }
}

/// MessagingPort decorator that paces outbound calls.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    slots: Mutex<Slots>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            slots: Mutex::new(Slots::new(Instant::now())),
        }
    }

    async fn pace(&self, chat: Option<(ChatId, Duration)>) {
        let wait = {
            let mut slots = self.slots.lock().await;
            slots.reserve(Instant::now(), self.cfg.global_gap, chat)
        };
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Pacing outbound call");
            sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn tracked_chats(&self) -> usize {
        self.slots.lock().await.chats.len()
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(Some((chat_id, self.cfg.chat_gap))).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.pace(Some((chat_id, self.cfg.chat_gap))).await;
        self.inner.send_inline_keyboard(chat_id, html, keyboard).await
    }

    async fn send_documents(&self, chat_id: ChatId, files: Vec<OutgoingFile>) -> Result<()> {
        self.pace(Some((chat_id, self.cfg.batch_gap))).await;
        self.inner.send_documents(chat_id, files).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.pace(Some((chat_id, self.cfg.chat_gap))).await;
        self.inner.send_chat_action(chat_id, action).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // Callback answers are not chat messages.
        self.pace(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}
