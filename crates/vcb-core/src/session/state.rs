//! Session data and the (mode, step) transition table.

use crate::{
    codec::SourceFormat, contact::Contact, errors::Error, files::FileHandle,
    naming::NamingTemplate, Result,
};

/// Label set of the one-contact-per-file flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flavor {
    Admin,
    Neavy,
}

impl Flavor {
    pub fn label(self) -> &'static str {
        match self {
            Flavor::Admin => "Admin",
            Flavor::Neavy => "Neavy",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Flavor::Admin => "🛡️",
            Flavor::Neavy => "⚓",
        }
    }

    pub fn suggested_template(self) -> String {
        format!("{}1", self.label())
    }

    pub fn suggested_label_prefix(self) -> String {
        format!("{}-", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Pasted text or a TXT upload to VCF.
    TextToCard,
    /// CSV/TSV upload to VCF.
    SheetToCard,
    /// Split / relabel an existing VCF.
    CardToCard,
    SingleEntry(Flavor),
    /// Several VCFs to one TXT of numbers.
    CardToText,
    /// Several VCFs to one VCF.
    MergeCards,
    Settings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ContactsPerOutput,
    NamingTemplate,
    LabelPrefix,
    LabelStart,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::ContactsPerOutput,
        SettingKey::NamingTemplate,
        SettingKey::LabelPrefix,
        SettingKey::LabelStart,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SettingKey::ContactsPerOutput => "Contacts per file",
            SettingKey::NamingTemplate => "File name template",
            SettingKey::LabelPrefix => "Contact name prefix",
            SettingKey::LabelStart => "First contact number",
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            SettingKey::ContactsPerOutput => "chunk",
            SettingKey::NamingTemplate => "template",
            SettingKey::LabelPrefix => "prefix",
            SettingKey::LabelStart => "start",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.token() == token)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    AwaitSource,
    AwaitChunkSize,
    AwaitNamingTemplate,
    AwaitLabelPrefix,
    AwaitLabelStart,
    AwaitFiles,
    AwaitOutputName,
    AwaitSetting(SettingKey),
}

impl Step {
    /// The config value a step edits, if any.
    pub fn setting_key(self) -> Option<SettingKey> {
        match self {
            Step::AwaitChunkSize => Some(SettingKey::ContactsPerOutput),
            Step::AwaitNamingTemplate => Some(SettingKey::NamingTemplate),
            Step::AwaitLabelPrefix => Some(SettingKey::LabelPrefix),
            Step::AwaitLabelStart => Some(SettingKey::LabelStart),
            Step::AwaitSetting(key) => Some(key),
            Step::AwaitSource | Step::AwaitFiles | Step::AwaitOutputName => None,
        }
    }
}

const CONVERSION_STEPS: &[Step] = &[
    Step::AwaitSource,
    Step::AwaitChunkSize,
    Step::AwaitNamingTemplate,
    Step::AwaitLabelPrefix,
    Step::AwaitLabelStart,
];

const SINGLE_ENTRY_STEPS: &[Step] = &[
    Step::AwaitSource,
    Step::AwaitNamingTemplate,
    Step::AwaitLabelPrefix,
    Step::AwaitLabelStart,
];

const COLLECT_STEPS: &[Step] = &[Step::AwaitFiles, Step::AwaitOutputName];

impl Mode {
    fn steps(self) -> &'static [Step] {
        match self {
            Mode::TextToCard | Mode::SheetToCard | Mode::CardToCard => CONVERSION_STEPS,
            Mode::SingleEntry(_) => SINGLE_ENTRY_STEPS,
            Mode::CardToText | Mode::MergeCards => COLLECT_STEPS,
            Mode::Settings => &[],
        }
    }

    /// Entry step when the mode is picked from the menu.
    ///
    /// Settings has no fixed entry: it is entered through a specific key.
    pub fn first_step(self) -> Option<Step> {
        self.steps().first().copied()
    }

    pub fn is_valid(self, step: Step) -> bool {
        match (self, step) {
            (Mode::Settings, Step::AwaitSetting(_)) => true,
            (mode, step) => mode.steps().contains(&step),
        }
    }

    /// Step after `step`, or `None` when the terminal action runs next.
    pub fn next_step(self, step: Step) -> Option<Step> {
        let steps = self.steps();
        let pos = steps.iter().position(|s| *s == step)?;
        steps.get(pos + 1).copied()
    }

    /// Whether the terminal action produces VCFs from `pending_contacts`.
    pub fn generates_cards(self) -> bool {
        matches!(
            self,
            Mode::TextToCard | Mode::SheetToCard | Mode::CardToCard | Mode::SingleEntry(_)
        )
    }

    /// Source formats accepted by `AwaitSource` / `AwaitFiles`.
    pub fn accepts(self, format: SourceFormat) -> bool {
        match self {
            Mode::TextToCard | Mode::SingleEntry(_) => format == SourceFormat::Text,
            Mode::SheetToCard => matches!(format, SourceFormat::Sheet { .. }),
            Mode::CardToCard | Mode::CardToText | Mode::MergeCards => format == SourceFormat::Card,
            Mode::Settings => false,
        }
    }

    pub fn accepts_pasted_text(self) -> bool {
        matches!(self, Mode::TextToCard | Mode::SingleEntry(_))
    }

    pub fn expected_upload(self) -> &'static str {
        match self {
            Mode::TextToCard | Mode::SingleEntry(_) => ".txt",
            Mode::SheetToCard => ".csv or .tsv",
            Mode::CardToCard | Mode::CardToText | Mode::MergeCards => ".vcf",
            Mode::Settings => "no",
        }
    }

    pub fn title(self) -> String {
        match self {
            Mode::TextToCard => "📂 TXT → VCF".to_string(),
            Mode::SheetToCard => "📊 CSV → VCF".to_string(),
            Mode::CardToCard => "✂️ Split VCF".to_string(),
            Mode::SingleEntry(f) => format!("{} {} VCF", f.icon(), f.label()),
            Mode::CardToText => "📄 VCF → TXT".to_string(),
            Mode::MergeCards => "🧩 Merge VCF".to_string(),
            Mode::Settings => "⚙️ Settings".to_string(),
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Mode::TextToCard => "text",
            Mode::SheetToCard => "sheet",
            Mode::CardToCard => "card",
            Mode::SingleEntry(Flavor::Admin) => "admin",
            Mode::SingleEntry(Flavor::Neavy) => "neavy",
            Mode::CardToText => "extract",
            Mode::MergeCards => "merge",
            Mode::Settings => "settings",
        }
    }

    /// Modes reachable from the main menu.
    pub const MENU: [Mode; 7] = [
        Mode::TextToCard,
        Mode::SheetToCard,
        Mode::CardToCard,
        Mode::SingleEntry(Flavor::Admin),
        Mode::SingleEntry(Flavor::Neavy),
        Mode::CardToText,
        Mode::MergeCards,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        Self::MENU.into_iter().find(|m| m.token() == token)
    }

    /// Output name used by the Keep button of `AwaitOutputName`.
    pub fn default_output_name(self) -> &'static str {
        match self {
            Mode::MergeCards => "merged",
            _ => "numbers",
        }
    }
}

/// Per-session user defaults. Survives mode switches; reset restores the process defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub contacts_per_output: usize,
    pub naming_template: String,
    pub contact_label_prefix: String,
    pub contact_label_start: u64,
    pub bundle_zip: bool,
}

/// Label prefix meaning "keep the names from the source".
pub const KEEP_SOURCE_NAMES: &str = "-";

impl SessionConfig {
    pub fn keeps_source_names(&self) -> bool {
        self.contact_label_prefix == KEEP_SOURCE_NAMES
    }

    pub fn value_of(&self, key: SettingKey) -> String {
        match key {
            SettingKey::ContactsPerOutput => self.contacts_per_output.to_string(),
            SettingKey::NamingTemplate => self.naming_template.clone(),
            SettingKey::LabelPrefix => self.contact_label_prefix.clone(),
            SettingKey::LabelStart => self.contact_label_start.to_string(),
        }
    }

    /// Validate `raw` for `key` and store it. On error nothing changes.
    pub fn apply(&mut self, key: SettingKey, raw: &str) -> Result<()> {
        let value = raw.trim();
        match key {
            SettingKey::ContactsPerOutput => {
                self.contacts_per_output = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| {
                        Error::Validation("Send a whole number of 1 or more.".to_string())
                    })?;
            }
            SettingKey::NamingTemplate => {
                self.naming_template = NamingTemplate::parse(value)?.display();
            }
            SettingKey::LabelPrefix => {
                if value.is_empty() {
                    return Err(Error::Validation(
                        "Contact name prefix cannot be empty.".to_string(),
                    ));
                }
                self.contact_label_prefix = value.to_string();
            }
            SettingKey::LabelStart => {
                self.contact_label_start = value.parse::<u64>().map_err(|_| {
                    Error::Validation("Send a whole number of 0 or more.".to_string())
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active { mode: Mode, step: Step },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub phase: Phase,
    pub pending_contacts: Vec<Contact>,
    pub uploaded_file_refs: Vec<FileHandle>,
    pub config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            phase: Phase::Idle,
            pending_contacts: Vec::new(),
            uploaded_file_refs: Vec::new(),
            config,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        match self.phase {
            Phase::Idle => None,
            Phase::Active { mode, .. } => Some(mode),
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self.phase {
            Phase::Idle => None,
            Phase::Active { step, .. } => Some(step),
        }
    }

    /// `(mode, step)` is a pair of the transition table, or the session is idle.
    pub fn is_consistent(&self) -> bool {
        match self.phase {
            Phase::Idle => true,
            Phase::Active { mode, step } => mode.is_valid(step),
        }
    }

    /// Enter `mode` at `step`, dropping per-flow data. Returns the uploads to delete.
    pub fn switch_to(&mut self, mode: Mode, step: Step) -> Vec<FileHandle> {
        self.phase = Phase::Active { mode, step };
        self.pending_contacts.clear();
        std::mem::take(&mut self.uploaded_file_refs)
    }

    /// Back to idle, dropping per-flow data but keeping config.
    pub fn finish(&mut self) -> Vec<FileHandle> {
        self.phase = Phase::Idle;
        self.pending_contacts.clear();
        std::mem::take(&mut self.uploaded_file_refs)
    }

    pub fn advance_to(&mut self, step: Step) {
        if let Phase::Active { mode, .. } = self.phase {
            self.phase = Phase::Active { mode, step };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SessionConfig {
        SessionConfig {
            contacts_per_output: 100,
            naming_template: "contacts1".to_string(),
            contact_label_prefix: "Contact".to_string(),
            contact_label_start: 1,
            bundle_zip: false,
        }
    }

    #[test]
    fn conversion_modes_walk_every_config_step() {
        let mut step = Mode::TextToCard.first_step().unwrap();
        let mut seen = vec![step];
        while let Some(next) = Mode::TextToCard.next_step(step) {
            seen.push(next);
            step = next;
        }
        assert_eq!(seen, CONVERSION_STEPS.to_vec());
        assert_eq!(Mode::SheetToCard.next_step(Step::AwaitSource), Some(Step::AwaitChunkSize));
    }

    #[test]
    fn single_entry_skips_chunk_size() {
        let mode = Mode::SingleEntry(Flavor::Neavy);
        assert_eq!(mode.next_step(Step::AwaitSource), Some(Step::AwaitNamingTemplate));
        assert!(!mode.is_valid(Step::AwaitChunkSize));
        assert_eq!(mode.next_step(Step::AwaitLabelStart), None);
    }

    #[test]
    fn collect_modes_and_settings() {
        assert_eq!(Mode::MergeCards.first_step(), Some(Step::AwaitFiles));
        assert_eq!(Mode::CardToText.next_step(Step::AwaitFiles), Some(Step::AwaitOutputName));
        assert_eq!(Mode::CardToText.next_step(Step::AwaitOutputName), None);
        assert_eq!(Mode::Settings.first_step(), None);
        assert!(Mode::Settings.is_valid(Step::AwaitSetting(SettingKey::LabelStart)));
        assert!(!Mode::TextToCard.is_valid(Step::AwaitSetting(SettingKey::LabelStart)));
        assert!(!Mode::CardToText.is_valid(Step::AwaitSource));
    }

    #[test]
    fn menu_tokens_round_trip() {
        for mode in Mode::MENU {
            assert_eq!(Mode::from_token(mode.token()), Some(mode));
        }
        assert_eq!(Mode::from_token("settings"), None);
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::from_token(key.token()), Some(key));
        }
    }

    #[test]
    fn config_apply_validates_without_partial_writes() {
        let mut cfg = defaults();
        for (key, bad) in [
            (SettingKey::ContactsPerOutput, "0"),
            (SettingKey::ContactsPerOutput, "ten"),
            (SettingKey::NamingTemplate, " "),
            (SettingKey::LabelPrefix, "  "),
            (SettingKey::LabelStart, "-1"),
        ] {
            assert!(matches!(cfg.apply(key, bad), Err(Error::Validation(_))));
            assert_eq!(cfg, defaults());
        }

        cfg.apply(SettingKey::ContactsPerOutput, " 25 ").unwrap();
        cfg.apply(SettingKey::NamingTemplate, "H1OK.vcf").unwrap();
        cfg.apply(SettingKey::LabelPrefix, "-").unwrap();
        assert_eq!(cfg.contacts_per_output, 25);
        assert_eq!(cfg.naming_template, "H1OK");
        assert!(cfg.keeps_source_names());
    }

    #[test]
    fn switching_modes_clears_flow_data_but_keeps_config() {
        let mut s = Session::new(defaults());
        s.config.contacts_per_output = 7;
        s.pending_contacts.push(Contact::new("a", "1").unwrap());
        s.uploaded_file_refs.push(FileHandle("h1".to_string()));

        let released = s.switch_to(Mode::MergeCards, Step::AwaitFiles);
        assert_eq!(released, vec![FileHandle("h1".to_string())]);
        assert!(s.pending_contacts.is_empty());
        assert!(s.uploaded_file_refs.is_empty());
        assert_eq!(s.config.contacts_per_output, 7);
        assert!(s.is_consistent());
    }
}
