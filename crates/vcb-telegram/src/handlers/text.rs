use vcb_core::events::{Command, EventKind};

/// Slash-prefixed text is a command; everything else is step input.
pub fn classify(text: &str) -> EventKind {
    match Command::from_text(text) {
        Some(cmd) => EventKind::Command(cmd),
        None => EventKind::Text(text.to_string()),
    }
}
