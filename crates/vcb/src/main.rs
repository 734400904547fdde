use std::sync::Arc;

use vcb_core::{
    access::{AccessGate, AccessStore, JsonFileAccessStore},
    config::Config,
    files::{FileStore, TempDirFileStore},
    utils::AuditLogger,
};

#[tokio::main]
async fn main() -> Result<(), vcb_core::Error> {
    vcb_core::logging::init("vcb")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn AccessStore> = Arc::new(JsonFileAccessStore::open(&cfg.access_file)?);
    let gate = Arc::new(AccessGate::new(
        cfg.owner_id,
        cfg.telegram_allowed_users.clone(),
        cfg.access_secret.as_deref(),
        store,
    ));
    let files: Arc<dyn FileStore> = Arc::new(TempDirFileStore::new(&cfg.temp_dir));
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));

    vcb_telegram::router::run_polling(cfg, gate, files, audit)
        .await
        .map_err(|e| vcb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
