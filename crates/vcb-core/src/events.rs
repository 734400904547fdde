//! Inbound events, already classified by the transport adapter.

use crate::{
    access::Role,
    domain::{ChatId, UserId},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub chat: ChatId,
    pub user: UserId,
    pub username: String,
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Text(String),
    Document { file_name: String, bytes: Vec<u8> },
    /// Opaque callback token from an inline button.
    Selection(String),
    Command(Command),
}

impl EventKind {
    /// Short label for audit records.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Text(_) => "text",
            EventKind::Document { .. } => "document",
            EventKind::Selection(_) => "selection",
            EventKind::Command(_) => "command",
        }
    }

    /// Audit-safe summary; secrets are never echoed.
    pub fn summary(&self) -> String {
        match self {
            EventKind::Text(t) => t.clone(),
            EventKind::Document { file_name, bytes } => {
                format!("{file_name} ({} bytes)", bytes.len())
            }
            EventKind::Selection(token) => token.clone(),
            EventKind::Command(Command::Auth(_)) => "/auth ***".to_string(),
            EventKind::Command(c) => format!("{c:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Menu,
    Reset,
    WhoAmI,
    Users,
    Grant { target: UserId, role: Role },
    Revoke { target: UserId },
    Auth(String),
    /// Known command with unusable arguments; carries the usage line.
    Invalid { usage: &'static str },
    Unknown(String),
}

const GRANT_USAGE: &str = "/grant <user id> [admin|user]";
const REVOKE_USAGE: &str = "/revoke <user id>";
const AUTH_USAGE: &str = "/auth <secret>";

impl Command {
    /// Parse `name` (without the leading slash or `@botname`) and its argument string.
    pub fn parse(name: &str, args: &str) -> Self {
        let name = name.split('@').next().unwrap_or_default().to_lowercase();
        let mut parts = args.split_whitespace();

        match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "menu" => Command::Menu,
            "reset" | "cancel" => Command::Reset,
            "whoami" | "id" => Command::WhoAmI,
            "users" => Command::Users,
            "grant" => {
                let target = parts.next().and_then(parse_user_id);
                let role = Role::parse_grantable(parts.next().unwrap_or_default());
                match (target, role, parts.next()) {
                    (Some(target), Some(role), None) => Command::Grant { target, role },
                    _ => Command::Invalid { usage: GRANT_USAGE },
                }
            }
            "revoke" => match (parts.next().and_then(parse_user_id), parts.next()) {
                (Some(target), None) => Command::Revoke { target },
                _ => Command::Invalid {
                    usage: REVOKE_USAGE,
                },
            },
            "auth" => match args.trim() {
                "" => Command::Invalid { usage: AUTH_USAGE },
                secret => Command::Auth(secret.to_string()),
            },
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Split a raw `/name args` message. Returns `None` for non-command text.
    pub fn from_text(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if name.is_empty() {
            return None;
        }
        Some(Self::parse(name, args))
    }
}

fn parse_user_id(s: &str) -> Option<UserId> {
    s.trim().parse::<i64>().ok().map(UserId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(Command::from_text("/start"), Some(Command::Start));
        assert_eq!(Command::from_text("/Reset@vcf_bot"), Some(Command::Reset));
        assert_eq!(Command::from_text("  /menu  "), Some(Command::Menu));
        assert_eq!(Command::from_text("hello"), None);
        assert_eq!(Command::from_text("/"), None);
        assert_eq!(
            Command::from_text("/frobnicate x"),
            Some(Command::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn parses_grant_and_revoke_arguments() {
        assert_eq!(
            Command::from_text("/grant 42 admin"),
            Some(Command::Grant {
                target: UserId(42),
                role: Role::Admin
            })
        );
        assert_eq!(
            Command::from_text("/grant 42"),
            Some(Command::Grant {
                target: UserId(42),
                role: Role::PlainUser
            })
        );
        assert_eq!(
            Command::from_text("/grant bob admin"),
            Some(Command::Invalid { usage: GRANT_USAGE })
        );
        assert_eq!(
            Command::from_text("/grant 1 owner"),
            Some(Command::Invalid { usage: GRANT_USAGE })
        );
        assert_eq!(
            Command::from_text("/revoke -100"),
            Some(Command::Revoke {
                target: UserId(-100)
            })
        );
        assert_eq!(
            Command::from_text("/revoke"),
            Some(Command::Invalid {
                usage: REVOKE_USAGE
            })
        );
    }

    #[test]
    fn auth_secret_is_kept_verbatim_but_not_summarized() {
        let cmd = Command::from_text("/auth open sesame").unwrap();
        assert_eq!(cmd, Command::Auth("open sesame".to_string()));
        assert_eq!(EventKind::Command(cmd).summary(), "/auth ***");
    }
}
