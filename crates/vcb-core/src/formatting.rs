//! Telegram HTML helpers for prompts and previews.

use crate::{codec::encode_vcard, contact::Contact};

/// Telegram rejects messages longer than this (UTF-16 units; chars is close enough).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

pub fn pre(text: &str) -> String {
    format!("<pre>{}</pre>", escape_html(text))
}

/// Numbered list of the first `max` phones plus an "and N more" tail.
pub fn number_preview(contacts: &[Contact], max: usize) -> String {
    let mut out = contacts
        .iter()
        .take(max)
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, escape_html(c.phone())))
        .collect::<Vec<_>>()
        .join("\n");
    if contacts.len() > max {
        out.push_str(&format!("\n… and {} more", contacts.len() - max));
    }
    out
}

/// Rendered vCards in a `<pre>` block, cut to fit one Telegram message.
pub fn vcard_preview(contacts: &[Contact]) -> String {
    let body: String = contacts.iter().map(encode_vcard).collect();
    // Leave room for the surrounding markup and the escaping overhead.
    pre(&truncate_chars(&body, TELEGRAM_MESSAGE_LIMIT / 2))
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(phone: &str) -> Contact {
        Contact::new("", phone).unwrap()
    }

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
        assert_eq!(code("a<b"), "<code>a&lt;b</code>");
    }

    #[test]
    fn number_preview_caps_and_counts_the_rest() {
        let cs: Vec<Contact> = (1..=4).map(|i| c(&i.to_string())).collect();
        assert_eq!(number_preview(&cs, 10), "1. +1\n2. +2\n3. +3\n4. +4");
        assert_eq!(number_preview(&cs, 2), "1. +1\n2. +2\n… and 2 more");
    }

    #[test]
    fn vcard_preview_is_escaped_and_bounded() {
        let cs: Vec<Contact> = (0..500).map(|i| c(&format!("555{i:04}"))).collect();
        let html = vcard_preview(&cs);
        assert!(html.starts_with("<pre>BEGIN:VCARD"));
        assert!(html.chars().count() < TELEGRAM_MESSAGE_LIMIT);
    }
}
