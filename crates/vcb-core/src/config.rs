use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{
    batch::DEFAULT_MAX_PER_BATCH, domain::UserId, errors::Error, naming::NamingTemplate,
    session::SessionConfig, Result,
};

/// Typed process configuration.
///
/// Read once at startup; everything downstream takes an `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub owner_id: UserId,
    pub telegram_allowed_users: Vec<UserId>,

    // Access
    pub access_secret: Option<String>,
    pub access_file: PathBuf,

    // Files
    pub temp_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub delivery_batch_size: usize,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,

    // Per-session defaults, restored by /reset.
    pub session_defaults: SessionConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let owner_id = get("OWNER_ID")
            .ok_or_else(|| Error::Config("OWNER_ID environment variable is required".to_string()))
            .and_then(|s| {
                s.trim()
                    .parse::<i64>()
                    .map(UserId)
                    .map_err(|_| Error::Config(format!("OWNER_ID is not a numeric id: {s}")))
            })?;
        let telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"))
            .into_iter()
            .map(UserId)
            .collect();

        // Access
        let access_secret = get("ACCESS_SECRET");
        let access_file = PathBuf::from(
            get("ACCESS_FILE").unwrap_or_else(|| "/tmp/vcb-access.json".to_string()),
        );

        // Files
        let temp_dir = PathBuf::from(get("TEMP_DIR").unwrap_or_else(|| "/tmp/vcb".to_string()));
        let max_upload_bytes = parse_num::<u64>(&get, "MAX_UPLOAD_BYTES")?.unwrap_or(20 * 1024 * 1024);
        let delivery_batch_size = parse_num::<usize>(&get, "DELIVERY_BATCH_SIZE")?
            .unwrap_or(DEFAULT_MAX_PER_BATCH)
            .clamp(1, DEFAULT_MAX_PER_BATCH);

        // Audit logging
        let audit_log_path = PathBuf::from(
            get("AUDIT_LOG_PATH").unwrap_or_else(|| "/tmp/vcb-audit.log".to_string()),
        );
        let audit_log_json = get("AUDIT_LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(false);

        // Session defaults
        let contacts_per_output =
            parse_num::<usize>(&get, "DEFAULT_CONTACTS_PER_FILE")?.unwrap_or(100);
        if contacts_per_output == 0 {
            return Err(Error::Config(
                "DEFAULT_CONTACTS_PER_FILE must be at least 1".to_string(),
            ));
        }
        let naming_template =
            get("DEFAULT_NAMING_TEMPLATE").unwrap_or_else(|| "contacts1".to_string());
        NamingTemplate::parse(&naming_template)
            .map_err(|e| Error::Config(format!("DEFAULT_NAMING_TEMPLATE: {e}")))?;
        let contact_label_prefix =
            get("DEFAULT_CONTACT_PREFIX").unwrap_or_else(|| "Contact".to_string());
        let contact_label_start = parse_num::<u64>(&get, "DEFAULT_CONTACT_START")?.unwrap_or(1);

        Ok(Self {
            telegram_bot_token,
            owner_id,
            telegram_allowed_users,
            access_secret,
            access_file,
            temp_dir,
            max_upload_bytes,
            delivery_batch_size,
            audit_log_path,
            audit_log_json,
            session_defaults: SessionConfig {
                contacts_per_output,
                naming_template,
                contact_label_prefix,
                contact_label_start,
                bundle_zip: false,
            },
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} is not a valid number: {s}"))),
    }
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let cfg = cfg_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("OWNER_ID", "42")]).unwrap();
        assert_eq!(cfg.owner_id, UserId(42));
        assert!(cfg.telegram_allowed_users.is_empty());
        assert_eq!(cfg.delivery_batch_size, 10);
        assert_eq!(cfg.session_defaults.contacts_per_output, 100);
        assert_eq!(cfg.session_defaults.naming_template, "contacts1");
        assert_eq!(cfg.session_defaults.contact_label_prefix, "Contact");
        assert_eq!(cfg.session_defaults.contact_label_start, 1);
        assert!(!cfg.session_defaults.bundle_zip);
        assert!(cfg.access_secret.is_none());
    }

    #[test]
    fn required_vars_are_enforced() {
        assert!(matches!(cfg_from(&[("OWNER_ID", "1")]), Err(Error::Config(_))));
        assert!(matches!(
            cfg_from(&[("TELEGRAM_BOT_TOKEN", "t")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            cfg_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("OWNER_ID", "me")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn overrides_are_parsed_and_validated() {
        let cfg = cfg_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("OWNER_ID", "1"),
            ("TELEGRAM_ALLOWED_USERS", "5, 6,x,,7"),
            ("DELIVERY_BATCH_SIZE", "50"),
            ("DEFAULT_CONTACTS_PER_FILE", "25"),
            ("AUDIT_LOG_JSON", "yes"),
        ])
        .unwrap();
        assert_eq!(
            cfg.telegram_allowed_users,
            vec![UserId(5), UserId(6), UserId(7)]
        );
        assert_eq!(cfg.delivery_batch_size, 10);
        assert_eq!(cfg.session_defaults.contacts_per_output, 25);
        assert!(cfg.audit_log_json);

        assert!(matches!(
            cfg_from(&[
                ("TELEGRAM_BOT_TOKEN", "t"),
                ("OWNER_ID", "1"),
                ("DEFAULT_CONTACTS_PER_FILE", "0"),
            ]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            cfg_from(&[
                ("TELEGRAM_BOT_TOKEN", "t"),
                ("OWNER_ID", "1"),
                ("DEFAULT_NAMING_TEMPLATE", "a/b"),
            ]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn dotenv_lines_are_parsed() {
        let parsed = parse_dotenv("# comment\nA=1\n B = \"two words\" \nnoeq\n='x'\nC='3'\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "3".to_string()),
            ]
        );
    }
}
