//! Transitions, prompts and the terminal actions of every flow.
//!
//! Everything here mutates the `Session` it is handed. The engine hands in a
//! draft clone and only commits it once the replies were delivered, so an
//! `Err` (or a failed delivery) never leaves a half-applied session behind.

use crate::{
    batch::chunk_contacts,
    codec::{
        bundle_zip, decode_source, decode_text_lines, decode_vcard_stream, encode_text_lines,
        encode_vcards, file_extension, OutgoingFile, SourceFormat,
    },
    contact::Contact,
    errors::Error,
    files::{FileHandle, FileStore},
    formatting::{code, escape_html, number_preview, truncate_chars, vcard_preview},
    messaging::types::{InlineButton, InlineKeyboard},
    naming::{LabelSequence, NamingTemplate},
    session::state::{Flavor, Mode, Phase, Session, SessionConfig, SettingKey, Step},
    Result,
};

/// Numbers listed after a source is loaded.
pub const SOURCE_PREVIEW_NUMBERS: usize = 50;
/// vCards rendered by the Preview button.
pub const CARD_PREVIEW_COUNT: usize = 10;

/// Callback tokens carried by inline buttons.
pub mod tokens {
    pub const MENU: &str = "menu";
    pub const SETTINGS: &str = "settings";
    pub const TOGGLE_ZIP: &str = "toggle:zip";
    pub const KEEP: &str = "keep";
    pub const SUGGEST: &str = "suggest";
    pub const DONE: &str = "done";
    pub const PREVIEW: &str = "preview";
    pub const MODE_PREFIX: &str = "mode:";
    pub const SETTING_PREFIX: &str = "setting:";
}

/// One outbound action of a transition, in delivery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Html(String),
    Keyboard {
        html: String,
        keyboard: InlineKeyboard,
    },
    /// Generated files; split into delivery batches by the engine.
    Files(Vec<OutgoingFile>),
}

#[derive(Debug, Default)]
pub struct Transition {
    pub replies: Vec<Outbound>,
    /// Uploads stored by this transition; deleted again if it is not committed.
    pub created: Vec<FileHandle>,
    /// Uploads the committed session no longer references.
    pub released: Vec<FileHandle>,
}

impl Transition {
    fn reply(out: Outbound) -> Self {
        Self {
            replies: vec![out],
            ..Self::default()
        }
    }

    fn push(mut self, out: Outbound) -> Self {
        self.replies.push(out);
        self
    }
}

/// Session-relevant part of an inbound event.
#[derive(Clone, Copy, Debug)]
pub enum Input<'a> {
    Text(&'a str),
    Document { file_name: &'a str, bytes: &'a [u8] },
    Selection(&'a str),
}

/// Apply one input to `session`.
pub async fn apply(files: &dyn FileStore, session: &mut Session, input: Input<'_>) -> Result<Transition> {
    if let Input::Selection(token) = input {
        if let Some(t) = apply_global_selection(session, token)? {
            return Ok(t);
        }
    }

    let phase = session.phase;
    match phase {
        Phase::Idle => Ok(Transition::reply(main_menu(match input {
            Input::Document { .. } => "Pick a conversion first, then send the file.",
            _ => "Choose an option:",
        }))),
        Phase::Active { mode, step } => match step {
            Step::AwaitSource => load_source(session, mode, input),
            Step::AwaitFiles => collect_file(files, session, mode, input).await,
            Step::AwaitOutputName => finalize_collection(files, session, mode, input).await,
            Step::AwaitSetting(key) => apply_setting(session, key, input),
            Step::AwaitChunkSize
            | Step::AwaitNamingTemplate
            | Step::AwaitLabelPrefix
            | Step::AwaitLabelStart => apply_flow_setting(session, mode, step, input),
        },
    }
}

/// Buttons that work regardless of the current step.
fn apply_global_selection(session: &mut Session, token: &str) -> Result<Option<Transition>> {
    if token == tokens::MENU {
        return Ok(Some(Transition::reply(main_menu("Choose an option:"))));
    }
    if token == tokens::SETTINGS {
        return Ok(Some(Transition::reply(settings_view(&session.config))));
    }
    if token == tokens::TOGGLE_ZIP {
        session.config.bundle_zip = !session.config.bundle_zip;
        return Ok(Some(Transition::reply(settings_view(&session.config))));
    }
    if token == tokens::PREVIEW {
        return preview(session).map(Some);
    }
    if let Some(mode) = token
        .strip_prefix(tokens::MODE_PREFIX)
        .and_then(Mode::from_token)
    {
        let Some(step) = mode.first_step() else {
            return Ok(None);
        };
        let released = session.switch_to(mode, step);
        return Ok(Some(Transition {
            replies: vec![prompt(session)],
            released,
            ..Transition::default()
        }));
    }
    if let Some(key) = token
        .strip_prefix(tokens::SETTING_PREFIX)
        .and_then(SettingKey::from_token)
    {
        let released = session.switch_to(Mode::Settings, Step::AwaitSetting(key));
        return Ok(Some(Transition {
            replies: vec![prompt(session)],
            released,
            ..Transition::default()
        }));
    }
    Ok(None)
}

fn load_source(session: &mut Session, mode: Mode, input: Input<'_>) -> Result<Transition> {
    let contacts = match input {
        Input::Text(text) if mode.accepts_pasted_text() => decode_text_lines(text),
        Input::Document { file_name, bytes } => {
            let format = source_format(mode, file_name)?;
            decode_source(format, bytes)?
        }
        _ => {
            return Err(Error::Validation(format!(
                "Send a {} file{}.",
                mode.expected_upload(),
                if mode.accepts_pasted_text() {
                    " or paste the numbers"
                } else {
                    ""
                }
            )))
        }
    };
    if contacts.is_empty() {
        return Err(Error::EmptySource);
    }

    let loaded = format!(
        "✅ {} numbers loaded.\n\n{}",
        contacts.len(),
        number_preview(&contacts, SOURCE_PREVIEW_NUMBERS)
    );
    session.pending_contacts = contacts;
    let next = mode.next_step(Step::AwaitSource).unwrap_or(Step::AwaitSource);
    session.advance_to(next);

    Ok(Transition::reply(Outbound::Html(loaded)).push(prompt(session)))
}

/// Map an upload to a decoder, or reject it for this mode.
fn source_format(mode: Mode, file_name: &str) -> Result<SourceFormat> {
    file_extension(file_name)
        .and_then(|ext| SourceFormat::from_extension(&ext))
        .filter(|f| mode.accepts(*f))
        .ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "{} is not accepted here, send a {} file",
                file_name,
                mode.expected_upload()
            ))
        })
}

/// Chunk size / template / label steps of the conversion flows.
fn apply_flow_setting(
    session: &mut Session,
    mode: Mode,
    step: Step,
    input: Input<'_>,
) -> Result<Transition> {
    let Some(key) = step.setting_key() else {
        return Err(Error::Validation("Unexpected input.".to_string()));
    };

    match input {
        Input::Text(text) => session.config.apply(key, text)?,
        Input::Selection(tokens::KEEP) => {}
        Input::Selection(tokens::SUGGEST) => {
            let Some(suggestion) = suggestion_for(mode, key) else {
                return Err(Error::Validation("There is no suggestion here.".to_string()));
            };
            session.config.apply(key, &suggestion)?;
        }
        Input::Selection(_) => {
            return Err(Error::Validation("That button is no longer active.".to_string()))
        }
        Input::Document { .. } => {
            return Err(Error::Validation("Send the value as a text message.".to_string()))
        }
    }

    let confirmed = Outbound::Html(format!(
        "✅ {}: {}",
        key.label(),
        code(&session.config.value_of(key))
    ));

    let next = match step {
        Step::AwaitLabelPrefix if session.config.keeps_source_names() => None,
        _ => mode.next_step(step),
    };
    match next {
        Some(next) => {
            session.advance_to(next);
            Ok(Transition::reply(confirmed).push(prompt(session)))
        }
        None => {
            let mut t = generate(session, mode)?;
            t.replies.insert(0, confirmed);
            Ok(t)
        }
    }
}

fn suggestion_for(mode: Mode, key: SettingKey) -> Option<String> {
    let Mode::SingleEntry(flavor) = mode else {
        return None;
    };
    match key {
        SettingKey::NamingTemplate => Some(flavor.suggested_template()),
        SettingKey::LabelPrefix => Some(flavor.suggested_label_prefix()),
        SettingKey::ContactsPerOutput | SettingKey::LabelStart => None,
    }
}

/// Settings menu edits; always return to idle.
fn apply_setting(session: &mut Session, key: SettingKey, input: Input<'_>) -> Result<Transition> {
    match input {
        Input::Text(text) => session.config.apply(key, text)?,
        Input::Selection(tokens::KEEP) => {}
        _ => {
            return Err(Error::Validation(format!(
                "Send the new {} as a text message.",
                key.label().to_lowercase()
            )))
        }
    }
    let released = session.finish();
    Ok(Transition {
        replies: vec![
            Outbound::Html(format!(
                "✅ {} set to {}",
                key.label(),
                code(&session.config.value_of(key))
            )),
            settings_view(&session.config),
        ],
        released,
        ..Transition::default()
    })
}

/// Generating: chunk, label, encode, name, then hand the files to delivery.
fn generate(session: &mut Session, mode: Mode) -> Result<Transition> {
    let files = build_card_files(&session.pending_contacts, &session.config, mode)?;
    let contacts = session.pending_contacts.len();
    let vcf_count = files
        .iter()
        .filter(|f| f.file_name.ends_with(".vcf"))
        .count();
    let released = session.finish();

    let summary = if session.config.bundle_zip {
        format!("✅ {contacts} contacts packed into one ZIP archive.")
    } else {
        format!("✅ {contacts} contacts in {vcf_count} file(s).")
    };

    Ok(Transition {
        replies: vec![Outbound::Files(files), main_menu(&summary)],
        released,
        ..Transition::default()
    })
}

/// Contacts as they will be written: relabelled unless source names are kept.
pub fn labeled_contacts(contacts: &[Contact], config: &SessionConfig) -> Vec<Contact> {
    if config.keeps_source_names() {
        return contacts.to_vec();
    }
    let labels = LabelSequence {
        prefix: config.contact_label_prefix.clone(),
        start: config.contact_label_start,
    };
    contacts
        .iter()
        .enumerate()
        .map(|(i, c)| c.relabeled(labels.label(i as u64)))
        .collect()
}

/// Output files of a card-generating mode, in delivery order.
pub fn build_card_files(
    contacts: &[Contact],
    config: &SessionConfig,
    mode: Mode,
) -> Result<Vec<OutgoingFile>> {
    let labeled = labeled_contacts(contacts, config);
    let per_file = match mode {
        Mode::SingleEntry(_) => 1,
        _ => config.contacts_per_output,
    };
    let template = NamingTemplate::parse(&config.naming_template)?;

    let mut files: Vec<OutgoingFile> = chunk_contacts(&labeled, per_file)?
        .iter()
        .enumerate()
        .map(|(i, chunk)| OutgoingFile::new(template.file_name(i as u64), encode_vcards(chunk)))
        .collect();

    if config.bundle_zip {
        files = vec![bundle_zip(&files, &format!("{}_all.zip", template.stem()))?];
    }
    if let Mode::SingleEntry(_) = mode {
        files.insert(
            0,
            OutgoingFile::new(
                format!("{}.txt", template.stem()),
                encode_text_lines(&labeled),
            ),
        );
    }
    Ok(files)
}

fn preview(session: &Session) -> Result<Transition> {
    let generating = session.mode().map(Mode::generates_cards).unwrap_or(false);
    if !generating || session.pending_contacts.is_empty() {
        return Err(Error::Validation(
            "Nothing to preview yet, load some numbers first.".to_string(),
        ));
    }
    let sample: Vec<Contact> = session
        .pending_contacts
        .iter()
        .take(CARD_PREVIEW_COUNT)
        .cloned()
        .collect();
    let rendered = labeled_contacts(&sample, &session.config);
    Ok(Transition::reply(Outbound::Html(format!(
        "👁 Preview ({} of {}):\n{}",
        rendered.len(),
        session.pending_contacts.len(),
        vcard_preview(&rendered)
    )))
    .push(prompt(session)))
}

async fn collect_file(
    files: &dyn FileStore,
    session: &mut Session,
    mode: Mode,
    input: Input<'_>,
) -> Result<Transition> {
    match input {
        Input::Document { file_name, bytes } => {
            source_format(mode, file_name)?;
            let handle = files.save(bytes.to_vec()).await?;
            session.uploaded_file_refs.push(handle.clone());
            Ok(Transition {
                replies: vec![Outbound::Keyboard {
                    html: format!(
                        "📥 Received {} ({} so far). Send more or press Done.",
                        code(file_name),
                        session.uploaded_file_refs.len()
                    ),
                    keyboard: done_keyboard(),
                }],
                created: vec![handle],
                ..Transition::default()
            })
        }
        Input::Selection(tokens::DONE) => finish_collecting(session, mode),
        Input::Text(text) if text.trim().eq_ignore_ascii_case("done") => {
            finish_collecting(session, mode)
        }
        _ => Err(Error::Validation(
            "Send .vcf files, then press Done.".to_string(),
        )),
    }
}

fn finish_collecting(session: &mut Session, mode: Mode) -> Result<Transition> {
    if session.uploaded_file_refs.is_empty() {
        return Err(Error::Validation(
            "Send at least one .vcf file first.".to_string(),
        ));
    }
    let next = mode
        .next_step(Step::AwaitFiles)
        .unwrap_or(Step::AwaitOutputName);
    session.advance_to(next);
    Ok(Transition::reply(prompt(session)))
}

/// Finalizing: read every upload, merge, emit one file.
async fn finalize_collection(
    files: &dyn FileStore,
    session: &mut Session,
    mode: Mode,
    input: Input<'_>,
) -> Result<Transition> {
    let stem = match input {
        Input::Text(text) => output_stem(text)?,
        Input::Selection(tokens::KEEP) => mode.default_output_name().to_string(),
        _ => {
            return Err(Error::Validation(
                "Send the output file name as a text message.".to_string(),
            ))
        }
    };

    let mut contacts = Vec::new();
    for handle in &session.uploaded_file_refs {
        let bytes = files.read(handle).await?;
        contacts.extend(decode_vcard_stream(&String::from_utf8_lossy(&bytes)));
    }
    if contacts.is_empty() {
        return Err(Error::EmptySource);
    }

    let sources = session.uploaded_file_refs.len();
    let file = match mode {
        Mode::MergeCards => OutgoingFile::new(format!("{stem}.vcf"), encode_vcards(&contacts)),
        _ => OutgoingFile::new(format!("{stem}.txt"), encode_text_lines(&contacts)),
    };
    let released = session.finish();

    Ok(Transition {
        replies: vec![
            Outbound::Files(vec![file]),
            main_menu(&format!(
                "✅ {} contacts from {} file(s).",
                contacts.len(),
                sources
            )),
        ],
        released,
        ..Transition::default()
    })
}

/// User-typed output name without extension or path components.
fn output_stem(raw: &str) -> Result<String> {
    let name = raw.trim();
    let lower = name.to_ascii_lowercase();
    let name = [".txt", ".vcf"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &name[..name.len() - ext.len()])
        .unwrap_or(name)
        .trim();
    if name.is_empty() {
        return Err(Error::Validation("File name cannot be empty.".to_string()));
    }
    if name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(Error::Validation(
            "File name cannot contain path separators or start with a dot.".to_string(),
        ));
    }
    Ok(name.to_string())
}

// ============== Prompts ==============

fn button(label: impl Into<String>, token: impl Into<String>) -> InlineButton {
    InlineButton::new(label, token)
}

fn menu_row() -> Vec<InlineButton> {
    vec![button("⬅️ Menu", tokens::MENU)]
}

fn done_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![button("✅ Done", tokens::DONE)], menu_row()])
}

fn mode_button(mode: Mode) -> InlineButton {
    button(mode.title(), format!("{}{}", tokens::MODE_PREFIX, mode.token()))
}

pub fn main_menu_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![mode_button(Mode::TextToCard)],
        vec![mode_button(Mode::SheetToCard), mode_button(Mode::CardToCard)],
        vec![
            mode_button(Mode::SingleEntry(Flavor::Admin)),
            mode_button(Mode::SingleEntry(Flavor::Neavy)),
        ],
        vec![mode_button(Mode::CardToText), mode_button(Mode::MergeCards)],
        vec![button(Mode::Settings.title(), tokens::SETTINGS)],
    ])
}

pub fn main_menu(html: &str) -> Outbound {
    Outbound::Keyboard {
        html: html.to_string(),
        keyboard: main_menu_keyboard(),
    }
}

pub fn settings_view(config: &SessionConfig) -> Outbound {
    let mut html = String::from("⚙️ <b>Current settings</b>\n");
    for key in SettingKey::ALL {
        html.push_str(&format!(
            "\n• {}: {}",
            key.label(),
            code(&config.value_of(key))
        ));
    }
    html.push_str(&format!(
        "\n• ZIP bundle: {}\n\nTap a button to change a value.",
        if config.bundle_zip { "on" } else { "off" }
    ));

    let mut rows: Vec<Vec<InlineButton>> = SettingKey::ALL
        .iter()
        .map(|k| {
            vec![button(
                k.label(),
                format!("{}{}", tokens::SETTING_PREFIX, k.token()),
            )]
        })
        .collect();
    rows.push(vec![button(
        if config.bundle_zip {
            "🗜 ZIP bundle: on"
        } else {
            "🗜 ZIP bundle: off"
        },
        tokens::TOGGLE_ZIP,
    )]);
    rows.push(menu_row());

    Outbound::Keyboard {
        html,
        keyboard: InlineKeyboard::new(rows),
    }
}

fn keep_button(value: &str) -> InlineButton {
    button(format!("Keep {}", truncate_chars(value, 24)), tokens::KEEP)
}

/// The prompt for the session's current step (or the main menu when idle).
pub fn prompt(session: &Session) -> Outbound {
    let Phase::Active { mode, step } = session.phase else {
        return main_menu("Choose an option:");
    };
    let config = &session.config;
    let header = format!("<b>{}</b>\n\n", escape_html(&mode.title()));

    let (body, mut rows): (String, Vec<Vec<InlineButton>>) = match step {
        Step::AwaitSource => {
            let body = match mode {
                Mode::SingleEntry(flavor) => format!(
                    "Paste numbers (one per line) for {} VCF, or send a .txt file.",
                    flavor.label()
                ),
                Mode::TextToCard => "Paste numbers (one per line) or send a .txt file.".to_string(),
                Mode::SheetToCard => {
                    "Send a .csv or .tsv file with a phone column.".to_string()
                }
                _ => format!("Send a {} file to split or relabel.", mode.expected_upload()),
            };
            (body, Vec::new())
        }
        Step::AwaitFiles => (
            format!(
                "Send one or more .vcf files, then press Done.\nReceived so far: {}",
                session.uploaded_file_refs.len()
            ),
            vec![vec![button("✅ Done", tokens::DONE)]],
        ),
        Step::AwaitOutputName => {
            let default = mode.default_output_name();
            (
                "Name for the output file (without extension).".to_string(),
                vec![vec![keep_button(default)]],
            )
        }
        step => {
            let Some(key) = step.setting_key() else {
                return main_menu("Choose an option:");
            };
            let current = config.value_of(key);
            let body = match key {
                SettingKey::ContactsPerOutput => "How many contacts per file?".to_string(),
                SettingKey::NamingTemplate => format!(
                    "File name template. The first number counts up: {} gives H1OK.vcf, H2OK.vcf, …",
                    code("H1OK")
                ),
                SettingKey::LabelPrefix => format!(
                    "Contact name prefix. Send {} to keep the names from the source.",
                    code("-")
                ),
                SettingKey::LabelStart => "Number of the first contact.".to_string(),
            };
            let mut first_row = vec![keep_button(&current)];
            if let Some(s) = suggestion_for(mode, key) {
                if s != current {
                    first_row.push(button(format!("Use {}", truncate_chars(&s, 24)), tokens::SUGGEST));
                }
            }
            let mut rows = vec![first_row];
            if mode.generates_cards() && !session.pending_contacts.is_empty() {
                rows.push(vec![button("👁 Preview", tokens::PREVIEW)]);
            }
            (
                format!("{body}\nCurrent: {}", code(&current)),
                rows,
            )
        }
    };

    rows.push(if mode == Mode::Settings {
        vec![button("⬅️ Settings", tokens::SETTINGS)]
    } else {
        menu_row()
    });

    Outbound::Keyboard {
        html: format!("{header}{body}"),
        keyboard: InlineKeyboard::new(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemoryFileStore;

    fn defaults() -> SessionConfig {
        SessionConfig {
            contacts_per_output: 100,
            naming_template: "contacts1".to_string(),
            contact_label_prefix: "Contact".to_string(),
            contact_label_start: 1,
            bundle_zip: false,
        }
    }

    fn active(mode: Mode, step: Step) -> Session {
        let mut s = Session::new(defaults());
        s.phase = Phase::Active { mode, step };
        s
    }

    fn contacts(phones: &[&str]) -> Vec<Contact> {
        phones.iter().map(|p| Contact::new("", p).unwrap()).collect()
    }

    fn files_of(t: &Transition) -> Vec<OutgoingFile> {
        t.replies
            .iter()
            .filter_map(|o| match o {
                Outbound::Files(f) => Some(f.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn pasted_text_loads_and_advances() {
        let store = MemoryFileStore::default();
        let mut s = active(Mode::TextToCard, Step::AwaitSource);
        let t = apply(&store, &mut s, Input::Text("123\n\nfoo\n+44 55"))
            .await
            .unwrap();
        assert_eq!(s.step(), Some(Step::AwaitChunkSize));
        assert_eq!(s.pending_contacts.len(), 2);
        assert!(matches!(&t.replies[0], Outbound::Html(h) if h.contains("2 numbers loaded")));
    }

    #[tokio::test]
    async fn sheet_mode_rejects_other_uploads_and_pasted_text() {
        let store = MemoryFileStore::default();
        let mut s = active(Mode::SheetToCard, Step::AwaitSource);
        let err = apply(
            &store,
            &mut s,
            Input::Document {
                file_name: "book.xlsx",
                bytes: b"PK",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        let err = apply(&store, &mut s, Input::Text("123")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(s, active(Mode::SheetToCard, Step::AwaitSource));
    }

    #[tokio::test]
    async fn source_without_numbers_is_empty_source() {
        let store = MemoryFileStore::default();
        let mut s = active(Mode::TextToCard, Step::AwaitSource);
        let err = apply(
            &store,
            &mut s,
            Input::Document {
                file_name: "x.txt",
                bytes: b"no numbers\nat all",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::EmptySource));
    }

    #[tokio::test]
    async fn label_prefix_dash_keeps_names_and_generates() {
        let store = MemoryFileStore::default();
        let mut s = active(Mode::CardToCard, Step::AwaitLabelPrefix);
        s.pending_contacts = vec![Contact::new("Ann", "1").unwrap()];
        let t = apply(&store, &mut s, Input::Text("-")).await.unwrap();

        assert_eq!(s.phase, Phase::Idle);
        assert!(s.pending_contacts.is_empty());
        let out = files_of(&t);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].file_name, "contacts1.vcf");
        assert!(String::from_utf8_lossy(&out[0].bytes).contains("FN:Ann"));
    }

    #[test]
    fn single_entry_writes_one_card_per_file_plus_companion() {
        let mut cfg = defaults();
        cfg.naming_template = Flavor::Admin.suggested_template();
        cfg.contact_label_prefix = Flavor::Admin.suggested_label_prefix();
        let files = build_card_files(
            &contacts(&["111", "222"]),
            &cfg,
            Mode::SingleEntry(Flavor::Admin),
        )
        .unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["Admin.txt", "Admin1.vcf", "Admin2.vcf"]);
        assert_eq!(files[0].bytes, b"+111\n+222");
        assert!(String::from_utf8_lossy(&files[2].bytes).contains("FN:Admin-2"));
    }

    #[test]
    fn bundle_zip_replaces_individual_cards() {
        let mut cfg = defaults();
        cfg.contacts_per_output = 1;
        cfg.bundle_zip = true;
        let files = build_card_files(&contacts(&["1", "2", "3"]), &cfg, Mode::TextToCard).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "contacts_all.zip");
    }

    #[tokio::test]
    async fn preview_renders_without_mutation() {
        let store = MemoryFileStore::default();
        let mut s = active(Mode::TextToCard, Step::AwaitChunkSize);
        s.pending_contacts = contacts(&["1", "2"]);
        let before = s.clone();
        let t = apply(&store, &mut s, Input::Selection(tokens::PREVIEW))
            .await
            .unwrap();
        assert_eq!(s, before);
        assert!(matches!(&t.replies[0], Outbound::Html(h) if h.contains("FN:Contact2")));

        let mut idle = Session::new(defaults());
        assert!(apply(&store, &mut idle, Input::Selection(tokens::PREVIEW))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn settings_edit_returns_to_idle() {
        let store = MemoryFileStore::default();
        let mut s = Session::new(defaults());
        apply(&store, &mut s, Input::Selection("setting:start"))
            .await
            .unwrap();
        assert_eq!(
            s.phase,
            Phase::Active {
                mode: Mode::Settings,
                step: Step::AwaitSetting(SettingKey::LabelStart)
            }
        );
        apply(&store, &mut s, Input::Text("50")).await.unwrap();
        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.config.contact_label_start, 50);

        apply(&store, &mut s, Input::Selection(tokens::TOGGLE_ZIP))
            .await
            .unwrap();
        assert!(s.config.bundle_zip);
    }

    #[test]
    fn output_stem_strips_extension_and_rejects_paths() {
        assert_eq!(output_stem(" all.TXT ").unwrap(), "all");
        assert_eq!(output_stem("merged.vcf").unwrap(), "merged");
        assert!(output_stem(".vcf").is_err());
        assert!(output_stem("../x").is_err());
        assert!(output_stem(".hidden").is_err());
    }

    #[test]
    fn prompts_offer_keep_and_suggestion_buttons() {
        let s = active(Mode::SingleEntry(Flavor::Neavy), Step::AwaitNamingTemplate);
        let Outbound::Keyboard { keyboard, .. } = prompt(&s) else {
            panic!("expected keyboard");
        };
        let data: Vec<&str> = keyboard.callback_data().collect();
        assert_eq!(data, vec![tokens::KEEP, tokens::SUGGEST, tokens::MENU]);
    }
}
