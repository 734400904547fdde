use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use vcb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use vcb_core::{
    access::AccessGate,
    config::Config,
    files::FileStore,
    messaging::port::MessagingPort,
    session::{SessionEngine, SessionStore},
    utils::AuditLogger,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<SessionEngine>,
    pub messenger: Arc<dyn MessagingPort>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        gate: Arc<AccessGate>,
        files: Arc<dyn FileStore>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let engine = SessionEngine::new(
            gate,
            SessionStore::new(cfg.session_defaults.clone()),
            files,
            messenger.clone(),
            cfg.delivery_batch_size,
        )
        .with_audit(audit);

        Self {
            cfg,
            engine: Arc::new(engine),
            messenger,
        }
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    gate: Arc<AccessGate>,
    files: Arc<dyn FileStore>,
    audit: Arc<AuditLogger>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!("vcb started: @{}", me.username()),
        Err(e) => warn!("get_me failed: {e}"),
    }
    info!(
        owner = %cfg.owner_id,
        allowed_users = cfg.telegram_allowed_users.len(),
        temp_dir = %cfg.temp_dir.display(),
        "access configured"
    );

    // Bursty file deliveries hit 429s quickly; RetryAfter is still retried in the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let state = Arc::new(AppState::new(cfg, messenger, gate, files, audit));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
