//! Per-session conversation engine.
//!
//! `SessionEngine::handle` is the single entry point for inbound events:
//! access gate first, then the per-session lock, then the state machine on a
//! draft copy, then delivery, then commit.

pub mod machine;
pub mod state;
pub mod store;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    access::{AccessGate, Role},
    batch::plan_delivery_batches,
    domain::{ChatId, UserId},
    errors::Error,
    events::{Command, EventKind, Inbound},
    files::{FileHandle, FileStore},
    formatting::{code, escape_html},
    messaging::{port::MessagingPort, types::ChatAction},
    utils::{AuditEvent, AuditLogger},
    Result,
};

pub use machine::{Input, Outbound, Transition};
pub use state::{Flavor, Mode, Phase, Session, SessionConfig, SettingKey, Step};
pub use store::{SessionKey, SessionStore};

const GENERIC_FAILURE: &str = "❌ Something went wrong on our side. Please try again.";
const DENIED: &str = "⛔ You don't have permission to do that.";
const OWNER_PROTECTED: &str = "⛔ The owner's access cannot be changed.";

pub struct SessionEngine {
    gate: Arc<AccessGate>,
    sessions: SessionStore,
    files: Arc<dyn FileStore>,
    messenger: Arc<dyn MessagingPort>,
    audit: Option<Arc<AuditLogger>>,
    delivery_batch_size: usize,
}

/// Who sent the event being handled.
#[derive(Clone, Copy)]
struct Actor<'a> {
    chat: ChatId,
    user: UserId,
    username: &'a str,
}

impl SessionEngine {
    pub fn new(
        gate: Arc<AccessGate>,
        sessions: SessionStore,
        files: Arc<dyn FileStore>,
        messenger: Arc<dyn MessagingPort>,
        delivery_batch_size: usize,
    ) -> Self {
        Self {
            gate,
            sessions,
            files,
            messenger,
            audit: None,
            delivery_batch_size,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Handle one classified event to completion.
    ///
    /// Domain errors are turned into user-visible replies here; the returned
    /// error only reports that even the failure notice could not be sent.
    pub async fn handle(&self, event: Inbound) -> Result<()> {
        let actor = Actor {
            chat: event.chat,
            user: event.user,
            username: &event.username,
        };
        self.audit(AuditEvent::message(
            actor.user,
            actor.username,
            event.kind.label(),
            &event.kind.summary(),
        ));

        // Enrolment is an access-gate operation, so it runs before the gate.
        if let EventKind::Command(Command::Auth(secret)) = &event.kind {
            return self.redeem_secret(actor, secret).await;
        }

        let role = match self.gate.role_of(actor.user) {
            Ok(role) => role,
            Err(e) => return self.report_failure(actor, &e, "role lookup").await,
        };
        if !role.is_authorized() {
            info!(user = %actor.user, "Unauthorized event rejected");
            self.audit(AuditEvent::auth(actor.user, actor.username, false));
            let html = format!(
                "⛔ You are not authorized to use this bot.\nYour id: {}\n\nAsk the owner for access, or send {} if you have the access secret.",
                code(&actor.user.to_string()),
                code("/auth <secret>")
            );
            self.messenger.send_html(actor.chat, &html).await?;
            return Ok(());
        }

        let key = SessionKey {
            chat: actor.chat,
            user: actor.user,
        };
        match &event.kind {
            EventKind::Command(cmd) => self.run_command(actor, role, key, cmd).await,
            EventKind::Text(text) => self.transition(actor, key, Input::Text(text)).await,
            EventKind::Document { file_name, bytes } => {
                let input = Input::Document {
                    file_name: file_name.as_str(),
                    bytes: bytes.as_slice(),
                };
                self.transition(actor, key, input).await
            }
            EventKind::Selection(token) => {
                self.transition(actor, key, Input::Selection(token)).await
            }
        }
    }

    /// Run the state machine on a draft and commit it once delivery succeeded.
    async fn transition(&self, actor: Actor<'_>, key: SessionKey, input: Input<'_>) -> Result<()> {
        let mut guard = self.sessions.lock(key).await;
        let mut draft = guard.clone();

        if let Input::Document { .. } = input {
            if let Err(e) = self
                .messenger
                .send_chat_action(actor.chat, ChatAction::Typing)
                .await
            {
                debug!(error = %e, "Chat action failed");
            }
        }

        let outcome = machine::apply(self.files.as_ref(), &mut draft, input).await;
        let t = match outcome {
            Ok(t) => t,
            Err(e) => return self.recover(actor, &mut guard, e).await,
        };

        if let Err(e) = self.deliver(actor, &t.replies).await {
            drop(guard);
            self.discard(&t.created).await;
            return self.report_failure(actor, &e, "delivery").await;
        }

        debug!(user = %actor.user, from = ?guard.phase, to = ?draft.phase, "Session committed");
        *guard = draft;
        drop(guard);
        self.discard(&t.released).await;
        Ok(())
    }

    /// Map a state-machine error onto the committed session and the user.
    async fn recover(&self, actor: Actor<'_>, session: &mut Session, e: Error) -> Result<()> {
        if e.is_recoverable_input() {
            debug!(user = %actor.user, error = %e, "Input rejected");
            let replies = vec![
                Outbound::Html(format!("⚠️ {}", escape_html(&e.to_string()))),
                machine::prompt(session),
            ];
            return self.deliver(actor, &replies).await;
        }

        match e {
            Error::EmptySource => {
                let mut draft = session.clone();
                let released = match draft.mode().and_then(|m| m.first_step().map(|s| (m, s))) {
                    Some((mode, step)) => draft.switch_to(mode, step),
                    None => draft.finish(),
                };
                let replies = vec![
                    Outbound::Html(
                        "⚠️ No phone numbers were found in that source. Please send another one."
                            .to_string(),
                    ),
                    machine::prompt(&draft),
                ];
                match self.deliver(actor, &replies).await {
                    Ok(()) => {
                        *session = draft;
                        self.discard(&released).await;
                        Ok(())
                    }
                    Err(e) => self.report_failure(actor, &e, "delivery").await,
                }
            }
            Error::PermissionDenied => self.messenger.send_html(actor.chat, DENIED).await.map(drop),
            Error::OwnerProtected => self
                .messenger
                .send_html(actor.chat, OWNER_PROTECTED)
                .await
                .map(drop),
            other => self.report_failure(actor, &other, "transition").await,
        }
    }

    fn batch_limit(&self) -> usize {
        self.delivery_batch_size
            .min(self.messenger.capabilities().max_files_per_batch)
            .max(1)
    }

    async fn deliver(&self, actor: Actor<'_>, replies: &[Outbound]) -> Result<()> {
        for out in replies {
            match out {
                Outbound::Html(html) => {
                    self.messenger.send_html(actor.chat, html).await?;
                }
                Outbound::Keyboard { html, keyboard } => {
                    self.messenger
                        .send_inline_keyboard(actor.chat, html, keyboard.clone())
                        .await?;
                }
                Outbound::Files(files) => {
                    let names: Vec<String> = files.iter().map(|f| f.file_name.clone()).collect();
                    let batches = plan_delivery_batches(files.clone(), self.batch_limit());
                    let batch_count = batches.len();

                    if let Err(e) = self
                        .messenger
                        .send_chat_action(actor.chat, ChatAction::UploadDocument)
                        .await
                    {
                        debug!(error = %e, "Chat action failed");
                    }
                    for batch in batches {
                        self.messenger.send_documents(actor.chat, batch).await?;
                    }

                    info!(user = %actor.user, files = names.len(), batches = batch_count, "Delivered files");
                    self.audit(AuditEvent::delivery(
                        actor.user,
                        actor.username,
                        names,
                        batch_count,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Best-effort removal of stored uploads.
    async fn discard(&self, handles: &[FileHandle]) {
        for h in handles {
            if let Err(e) = self.files.delete(h).await {
                warn!(handle = %h.0, error = %e, "Failed to delete stored upload");
            }
        }
    }

    async fn report_failure(&self, actor: Actor<'_>, e: &Error, context: &str) -> Result<()> {
        warn!(user = %actor.user, error = %e, context, "Request failed");
        self.audit(AuditEvent::error(
            actor.user,
            actor.username,
            &e.to_string(),
            Some(context),
        ));
        self.messenger.send_html(actor.chat, GENERIC_FAILURE).await?;
        Ok(())
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }

    // ============== Commands ==============

    async fn run_command(
        &self,
        actor: Actor<'_>,
        role: Role,
        key: SessionKey,
        cmd: &Command,
    ) -> Result<()> {
        match cmd {
            Command::Start => {
                self.reset(key).await;
                self.send_menu(
                    actor,
                    "👋 Welcome! I convert phone lists, spreadsheets and vCard files.\nChoose an option:",
                )
                .await
            }
            Command::Reset => {
                self.reset(key).await;
                self.send_menu(actor, "🔄 Session reset. Settings are back to defaults.")
                    .await
            }
            Command::Menu => self.send_menu(actor, "Choose an option:").await,
            Command::Help => {
                self.messenger
                    .send_html(actor.chat, &help_text(role))
                    .await?;
                Ok(())
            }
            Command::WhoAmI => {
                let html = format!(
                    "🪪 Your id: {}\nRole: <b>{}</b>",
                    code(&actor.user.to_string()),
                    role.label()
                );
                self.messenger.send_html(actor.chat, &html).await?;
                Ok(())
            }
            Command::Users => self.list_users(actor, role).await,
            Command::Grant { target, role } => {
                let outcome = self.gate.grant(*target, *role, actor.user).await;
                self.audit(AuditEvent::access(
                    actor.user,
                    actor.username,
                    "grant",
                    Some(*target),
                    &outcome_label(&outcome, role.label()),
                ));
                match outcome {
                    Ok(()) => {
                        let html = format!(
                            "✅ {} is now <b>{}</b>.",
                            code(&target.to_string()),
                            role.label()
                        );
                        self.messenger.send_html(actor.chat, &html).await?;
                        Ok(())
                    }
                    Err(e) => self.access_failure(actor, e).await,
                }
            }
            Command::Revoke { target } => {
                let outcome = self.gate.revoke(*target, actor.user).await;
                self.audit(AuditEvent::access(
                    actor.user,
                    actor.username,
                    "revoke",
                    Some(*target),
                    &outcome_label(&outcome, "revoked"),
                ));
                match outcome {
                    Ok(true) => {
                        let html = format!("✅ Access revoked for {}.", code(&target.to_string()));
                        self.messenger.send_html(actor.chat, &html).await?;
                        Ok(())
                    }
                    Ok(false) => {
                        let html = format!(
                            "ℹ️ {} has no granted access. Users from TELEGRAM_ALLOWED_USERS can only be removed from the config.",
                            code(&target.to_string())
                        );
                        self.messenger.send_html(actor.chat, &html).await?;
                        Ok(())
                    }
                    Err(e) => self.access_failure(actor, e).await,
                }
            }
            // Handled before the gate; unreachable for authorized users too.
            Command::Auth(secret) => self.redeem_secret(actor, secret).await,
            Command::Invalid { usage } => {
                let html = format!("Usage: {}", code(usage));
                self.messenger.send_html(actor.chat, &html).await?;
                Ok(())
            }
            Command::Unknown(name) => {
                let html = format!("Unknown command {}. Try /help.", code(&format!("/{name}")));
                self.messenger.send_html(actor.chat, &html).await?;
                Ok(())
            }
        }
    }

    async fn reset(&self, key: SessionKey) {
        if let Some(old) = self.sessions.remove(key).await {
            self.discard(&old.uploaded_file_refs).await;
        }
    }

    async fn send_menu(&self, actor: Actor<'_>, html: &str) -> Result<()> {
        self.deliver(actor, &[machine::main_menu(html)]).await
    }

    async fn list_users(&self, actor: Actor<'_>, role: Role) -> Result<()> {
        if !matches!(role, Role::Owner | Role::Admin) {
            return self.access_failure(actor, Error::PermissionDenied).await;
        }
        let records = match self.gate.list() {
            Ok(r) => r,
            Err(e) => return self.report_failure(actor, &e, "list users").await,
        };
        let mut html = format!("👥 <b>Authorized users</b> ({})\n", records.len());
        for r in records {
            html.push_str(&format!(
                "\n• {} ({})",
                code(&r.identity.to_string()),
                r.role.label()
            ));
        }
        self.messenger.send_html(actor.chat, &html).await?;
        Ok(())
    }

    async fn redeem_secret(&self, actor: Actor<'_>, secret: &str) -> Result<()> {
        let outcome = self.gate.redeem_secret(actor.user, secret).await;
        self.audit(AuditEvent::auth(actor.user, actor.username, outcome.is_ok()));
        match outcome {
            Ok(role) => {
                self.send_menu(
                    actor,
                    &format!("✅ Access granted as <b>{}</b>. Choose an option:", role.label()),
                )
                .await
            }
            Err(Error::PermissionDenied) => {
                self.messenger
                    .send_html(actor.chat, "⛔ That secret is not valid.")
                    .await?;
                Ok(())
            }
            Err(e) => self.report_failure(actor, &e, "auth").await,
        }
    }

    async fn access_failure(&self, actor: Actor<'_>, e: Error) -> Result<()> {
        match e {
            Error::PermissionDenied => {
                self.messenger.send_html(actor.chat, DENIED).await?;
                Ok(())
            }
            Error::OwnerProtected => {
                self.messenger.send_html(actor.chat, OWNER_PROTECTED).await?;
                Ok(())
            }
            other => self.report_failure(actor, &other, "access").await,
        }
    }
}

fn outcome_label<T>(outcome: &Result<T>, ok: &str) -> String {
    match outcome {
        Ok(_) => ok.to_string(),
        Err(e) => format!("failed: {e}"),
    }
}

fn help_text(role: Role) -> String {
    let mut html = String::from(
        "<b>Contact converter</b>\n\n\
         Pick a conversion from /menu and follow the prompts.\n\n\
         /menu - show the main menu\n\
         /reset - cancel the current flow and restore default settings\n\
         /whoami - show your id and role",
    );
    if matches!(role, Role::Owner | Role::Admin) {
        html.push_str(
            "\n\n<b>Access</b>\n\
             /users - list authorized users\n\
             /grant &lt;id&gt; [admin|user] - grant access\n\
             /revoke &lt;id&gt; - revoke access",
        );
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::{
        access::MemoryAccessStore,
        codec::{decode_vcard_stream, encode_vcards, OutgoingFile},
        contact::Contact,
        domain::{MessageId, MessageRef},
        files::MemoryFileStore,
        messaging::types::{InlineKeyboard, MessagingCapabilities},
    };

    const OWNER: UserId = UserId(1);
    const MEMBER: UserId = UserId(2);
    const STRANGER: UserId = UserId(3);
    const CHAT: ChatId = ChatId(100);

    #[derive(Default)]
    struct RecordingMessenger {
        html: StdMutex<Vec<String>>,
        keyboards: StdMutex<Vec<(String, InlineKeyboard)>>,
        batches: StdMutex<Vec<Vec<OutgoingFile>>>,
        actions: StdMutex<Vec<ChatAction>>,
        fail_documents: StdMutex<bool>,
    }

    impl RecordingMessenger {
        fn texts(&self) -> Vec<String> {
            let mut out = self.html.lock().unwrap().clone();
            out.extend(self.keyboards.lock().unwrap().iter().map(|(h, _)| h.clone()));
            out
        }

        fn last_text(&self) -> String {
            self.html.lock().unwrap().last().cloned().unwrap_or_default()
        }

        fn batches(&self) -> Vec<Vec<OutgoingFile>> {
            self.batches.lock().unwrap().clone()
        }

        fn files(&self) -> Vec<OutgoingFile> {
            self.batches().into_iter().flatten().collect()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_files_per_batch: 10,
            }
        }

        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.html.lock().unwrap().push(html.to_string());
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            html: &str,
            keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.keyboards
                .lock()
                .unwrap()
                .push((html.to_string(), keyboard));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(2),
            })
        }

        async fn send_documents(&self, _chat_id: ChatId, files: Vec<OutgoingFile>) -> Result<()> {
            if *self.fail_documents.lock().unwrap() {
                return Err(Error::External("upload refused".to_string()));
            }
            self.batches.lock().unwrap().push(files);
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, action: ChatAction) -> Result<()> {
            self.actions.lock().unwrap().push(action);
            Ok(())
        }

        async fn answer_callback_query(&self, _id: &str, _text: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        engine: SessionEngine,
        messenger: Arc<RecordingMessenger>,
        files: Arc<MemoryFileStore>,
    }

    fn harness() -> Harness {
        let gate = Arc::new(AccessGate::new(
            OWNER,
            vec![MEMBER],
            Some("letmein"),
            Arc::new(MemoryAccessStore::default()),
        ));
        let messenger = Arc::new(RecordingMessenger::default());
        let files = Arc::new(MemoryFileStore::default());
        let sessions = SessionStore::new(SessionConfig {
            contacts_per_output: 100,
            naming_template: "contacts1".to_string(),
            contact_label_prefix: "Contact".to_string(),
            contact_label_start: 1,
            bundle_zip: false,
        });
        let engine = SessionEngine::new(gate, sessions, files.clone(), messenger.clone(), 10);
        Harness {
            engine,
            messenger,
            files,
        }
    }

    fn event(user: UserId, kind: EventKind) -> Inbound {
        Inbound {
            chat: CHAT,
            user,
            username: format!("u{}", user.0),
            kind,
        }
    }

    impl Harness {
        async fn text(&self, user: UserId, text: &str) {
            self.engine
                .handle(event(user, EventKind::Text(text.to_string())))
                .await
                .unwrap();
        }

        async fn select(&self, user: UserId, token: &str) {
            self.engine
                .handle(event(user, EventKind::Selection(token.to_string())))
                .await
                .unwrap();
        }

        async fn upload(&self, user: UserId, name: &str, bytes: &[u8]) {
            self.engine
                .handle(event(
                    user,
                    EventKind::Document {
                        file_name: name.to_string(),
                        bytes: bytes.to_vec(),
                    },
                ))
                .await
                .unwrap();
        }

        async fn command(&self, user: UserId, text: &str) {
            let cmd = Command::from_text(text).unwrap();
            self.engine
                .handle(event(user, EventKind::Command(cmd)))
                .await
                .unwrap();
        }

        async fn session(&self, user: UserId) -> Session {
            self.engine
                .sessions()
                .lock(SessionKey { chat: CHAT, user })
                .await
                .clone()
        }
    }

    fn cards(file: &OutgoingFile) -> Vec<(String, String)> {
        decode_vcard_stream(&String::from_utf8_lossy(&file.bytes))
            .into_iter()
            .map(|c| (c.display_name().to_string(), c.phone().to_string()))
            .collect()
    }

    fn pair(name: &str, phone: &str) -> (String, String) {
        (name.to_string(), phone.to_string())
    }

    #[tokio::test]
    async fn text_to_card_end_to_end() {
        let h = harness();
        h.select(MEMBER, "mode:text").await;
        h.text(MEMBER, "123\n+44 55\nabc999").await;
        h.text(MEMBER, "2").await;
        h.text(MEMBER, "A1").await;
        h.text(MEMBER, "P").await;
        h.text(MEMBER, "1").await;

        let batches = h.messenger.batches();
        assert_eq!(batches.len(), 1);
        let files = &batches[0];
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "A1.vcf");
        assert_eq!(files[1].file_name, "A2.vcf");
        assert_eq!(
            cards(&files[0]),
            vec![pair("P1", "+123"), pair("P2", "+4455")]
        );
        assert_eq!(cards(&files[1]), vec![pair("P3", "+999")]);

        let s = h.session(MEMBER).await;
        assert_eq!(s.phase, Phase::Idle);
        assert!(s.pending_contacts.is_empty());
        // Values typed during the flow become the user's defaults.
        assert_eq!(s.config.contacts_per_output, 2);
        assert_eq!(s.config.naming_template, "A1");
    }

    #[tokio::test]
    async fn invalid_input_leaves_session_unchanged_and_reprompts() {
        let h = harness();
        h.select(MEMBER, "mode:text").await;
        h.text(MEMBER, "555").await;
        let before = h.session(MEMBER).await;
        assert_eq!(before.step(), Some(Step::AwaitChunkSize));

        for bad in ["abc", "0", "-3"] {
            h.text(MEMBER, bad).await;
            assert_eq!(h.session(MEMBER).await, before);
        }
        h.upload(MEMBER, "x.txt", b"777").await;
        assert_eq!(h.session(MEMBER).await, before);

        let keyboards = h.messenger.keyboards.lock().unwrap().clone();
        let (last_prompt, _) = keyboards.last().unwrap();
        assert!(last_prompt.contains("How many contacts per file?"));
        assert!(h.messenger.last_text().starts_with("⚠️"));
    }

    #[tokio::test]
    async fn latin1_sheet_upload_loads_instead_of_failing() {
        let h = harness();
        h.select(MEMBER, "mode:sheet").await;
        h.upload(MEMBER, "export.csv", b"name,phone\n\xe9ric,123\n").await;

        let s = h.session(MEMBER).await;
        assert_eq!(s.step(), Some(Step::AwaitChunkSize));
        assert_eq!(s.pending_contacts.len(), 1);
        assert!(h.messenger.texts().iter().any(|t| t.contains("1 numbers loaded")));
        assert!(!h.messenger.texts().iter().any(|t| t == GENERIC_FAILURE));
        assert_eq!(*h.messenger.actions.lock().unwrap(), vec![ChatAction::Typing]);
    }

    #[tokio::test]
    async fn unauthorized_users_are_denied_without_a_session() {
        let h = harness();
        h.select(STRANGER, "mode:text").await;
        h.text(STRANGER, "123").await;
        assert!(h.engine.sessions().is_empty().await);
        assert!(h.messenger.last_text().contains("not authorized"));
        assert!(h.messenger.last_text().contains("<code>3</code>"));
    }

    #[tokio::test]
    async fn auth_secret_enrolls_a_stranger() {
        let h = harness();
        h.command(STRANGER, "/auth wrong").await;
        assert_eq!(
            h.engine.gate().role_of(STRANGER).unwrap(),
            Role::Unauthorized
        );
        h.command(STRANGER, "/auth letmein").await;
        assert_eq!(h.engine.gate().role_of(STRANGER).unwrap(), Role::PlainUser);
        h.select(STRANGER, "mode:text").await;
        assert_eq!(
            h.session(STRANGER).await.step(),
            Some(Step::AwaitSource)
        );
    }

    #[tokio::test]
    async fn mode_switch_clears_uploads_but_keeps_config() {
        let h = harness();
        h.select(MEMBER, "setting:chunk").await;
        h.text(MEMBER, "7").await;
        h.select(MEMBER, "mode:merge").await;
        h.upload(MEMBER, "a.vcf", encode_vcards(&[Contact::new("a", "1").unwrap()]).as_bytes())
            .await;
        assert_eq!(h.files.len().await, 1);

        h.select(MEMBER, "mode:text").await;
        let s = h.session(MEMBER).await;
        assert_eq!(s.step(), Some(Step::AwaitSource));
        assert!(s.uploaded_file_refs.is_empty());
        assert_eq!(s.config.contacts_per_output, 7);
        assert!(h.files.is_empty().await);
    }

    #[tokio::test]
    async fn merge_and_extract_flows() {
        let h = harness();
        let a = encode_vcards(&[Contact::new("Ann", "111").unwrap()]);
        let b = encode_vcards(&[
            Contact::new("Ben", "222").unwrap(),
            Contact::new("Cy", "333").unwrap(),
        ]);

        h.select(MEMBER, "mode:merge").await;
        h.select(MEMBER, "done").await;
        assert_eq!(h.session(MEMBER).await.step(), Some(Step::AwaitFiles));
        h.upload(MEMBER, "notes.txt", b"123").await;
        assert!(h.session(MEMBER).await.uploaded_file_refs.is_empty());

        h.upload(MEMBER, "a.vcf", a.as_bytes()).await;
        h.upload(MEMBER, "b.VCF", b.as_bytes()).await;
        h.text(MEMBER, "Done").await;
        assert_eq!(h.session(MEMBER).await.step(), Some(Step::AwaitOutputName));
        h.text(MEMBER, "everyone.vcf").await;

        let files = h.messenger.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "everyone.vcf");
        assert_eq!(
            cards(&files[0]),
            vec![pair("Ann", "+111"), pair("Ben", "+222"), pair("Cy", "+333")]
        );
        assert!(h.files.is_empty().await);

        h.select(MEMBER, "mode:extract").await;
        h.upload(MEMBER, "b.vcf", b.as_bytes()).await;
        h.select(MEMBER, "done").await;
        h.select(MEMBER, "keep").await;
        let files = h.messenger.files();
        assert_eq!(files[1].file_name, "numbers.txt");
        assert_eq!(files[1].bytes, b"+222\n+333");
        assert_eq!(h.session(MEMBER).await.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn empty_sources_return_to_the_source_step() {
        let h = harness();
        h.select(MEMBER, "mode:text").await;
        h.upload(MEMBER, "blank.txt", b"nothing here\n").await;
        let s = h.session(MEMBER).await;
        assert_eq!(s.step(), Some(Step::AwaitSource));
        assert!(s.pending_contacts.is_empty());
        assert!(h
            .messenger
            .last_text()
            .contains("No phone numbers were found"));

        h.select(MEMBER, "mode:extract").await;
        h.upload(MEMBER, "empty.vcf", b"BEGIN:VCARD\nFN:x\nEND:VCARD\n")
            .await;
        h.select(MEMBER, "done").await;
        h.text(MEMBER, "out").await;
        let s = h.session(MEMBER).await;
        assert_eq!(s.step(), Some(Step::AwaitFiles));
        assert!(s.uploaded_file_refs.is_empty());
        assert!(h.files.is_empty().await);
    }

    #[tokio::test]
    async fn failed_delivery_does_not_commit() {
        let h = harness();
        h.select(MEMBER, "mode:text").await;
        h.text(MEMBER, "1\n2\n3").await;
        h.select(MEMBER, "keep").await;
        h.select(MEMBER, "keep").await;
        h.select(MEMBER, "keep").await;
        let before = h.session(MEMBER).await;
        assert_eq!(before.step(), Some(Step::AwaitLabelStart));

        *h.messenger.fail_documents.lock().unwrap() = true;
        h.select(MEMBER, "keep").await;
        assert_eq!(h.session(MEMBER).await, before);
        assert_eq!(h.messenger.last_text(), GENERIC_FAILURE);

        *h.messenger.fail_documents.lock().unwrap() = false;
        h.select(MEMBER, "keep").await;
        let files = h.messenger.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "contacts1.vcf");
        assert_eq!(h.session(MEMBER).await.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn many_files_are_split_into_batches_of_ten() {
        let h = harness();
        h.select(MEMBER, "mode:text").await;
        let numbers: Vec<String> = (1..=23).map(|i| format!("55{i}")).collect();
        h.text(MEMBER, &numbers.join("\n")).await;
        h.text(MEMBER, "1").await;
        h.text(MEMBER, "f1").await;
        h.text(MEMBER, "-").await;

        let sizes: Vec<usize> = h.messenger.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        let files = h.messenger.files();
        assert_eq!(files[22].file_name, "f23.vcf");
        assert_eq!(cards(&files[22]), vec![pair("5523", "+5523")]);
    }

    #[tokio::test]
    async fn single_entry_flow_uses_flavor_suggestions() {
        let h = harness();
        h.select(OWNER, "mode:neavy").await;
        h.text(OWNER, "111\n222").await;
        assert_eq!(
            h.session(OWNER).await.step(),
            Some(Step::AwaitNamingTemplate)
        );
        h.select(OWNER, "suggest").await;
        h.select(OWNER, "suggest").await;
        h.text(OWNER, "1").await;

        let names: Vec<String> = h
            .messenger
            .files()
            .iter()
            .map(|f| f.file_name.clone())
            .collect();
        assert_eq!(names, vec!["Neavy.txt", "Neavy1.vcf", "Neavy2.vcf"]);
        assert_eq!(
            cards(&h.messenger.files()[2]),
            vec![pair("Neavy-2", "+222")]
        );
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let h = harness();
        h.select(MEMBER, "setting:prefix").await;
        h.text(MEMBER, "Friend").await;
        h.select(MEMBER, "mode:text").await;
        h.text(MEMBER, "1").await;
        h.select(OWNER, "mode:merge").await;
        h.upload(OWNER, "a.vcf", b"BEGIN:VCARD\nTEL:1\nEND:VCARD\n").await;
        assert_eq!(h.files.len().await, 1);
        h.command(MEMBER, "/reset").await;
        h.command(OWNER, "/reset").await;

        // Reset drops the entries; the next event starts a fresh session.
        assert!(h.engine.sessions().is_empty().await);
        assert!(h.files.is_empty().await);
        let s = h.session(MEMBER).await;
        assert_eq!(s.phase, Phase::Idle);
        assert!(s.pending_contacts.is_empty());
        assert_eq!(s.config.contact_label_prefix, "Contact");
    }

    #[tokio::test]
    async fn access_commands_follow_role_rules() {
        let h = harness();
        h.command(MEMBER, "/grant 9 user").await;
        assert_eq!(h.messenger.last_text(), DENIED);
        h.command(OWNER, "/revoke 1").await;
        assert_eq!(h.messenger.last_text(), OWNER_PROTECTED);

        h.command(OWNER, "/grant 9 admin").await;
        assert_eq!(h.engine.gate().role_of(UserId(9)).unwrap(), Role::Admin);
        h.command(UserId(9), "/users").await;
        let listing = h.messenger.last_text();
        assert!(listing.contains("<code>1</code> (owner)"));
        assert!(listing.contains("<code>9</code> (admin)"));

        h.command(OWNER, "/revoke 9").await;
        assert_eq!(
            h.engine.gate().role_of(UserId(9)).unwrap(),
            Role::Unauthorized
        );
        h.command(MEMBER, "/users").await;
        assert_eq!(h.messenger.last_text(), DENIED);

        let texts = h.messenger.texts();
        assert!(texts.iter().any(|t| t.contains("is now <b>admin</b>")));
    }
}
