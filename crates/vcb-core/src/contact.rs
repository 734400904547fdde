//! Phone/contact normalization.
//!
//! Every input source (pasted text, TXT lines, vCard blocks, spreadsheet rows)
//! ends up as a [`Contact`] with a canonical `+<digits>` phone.

use std::sync::OnceLock;

use regex::Regex;

/// Canonical contact record, independent of wire format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    display_name: String,
    phone: String,
}

impl Contact {
    /// Build a contact from a raw phone. Returns `None` when `raw_phone` has no digit.
    pub fn new(display_name: impl Into<String>, raw_phone: &str) -> Option<Self> {
        let phone = normalize_phone(raw_phone);
        if phone.is_empty() {
            return None;
        }
        let display_name = single_line(&display_name.into());
        let display_name = if display_name.is_empty() {
            phone.clone()
        } else {
            display_name
        };
        Some(Self {
            display_name,
            phone,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// Same phone under a different display name.
    pub fn relabeled(&self, display_name: impl Into<String>) -> Self {
        let display_name = single_line(&display_name.into());
        Self {
            display_name: if display_name.is_empty() {
                self.phone.clone()
            } else {
                display_name
            },
            phone: self.phone.clone(),
        }
    }
}

/// Collapse line breaks, control characters and whitespace runs into single spaces.
///
/// A display name becomes one `FN:` line, so it must never span lines.
fn single_line(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip everything but digits and prefix the result with `+`.
///
/// Returns an empty string when the input holds no digit at all; call sites
/// that need a phone treat that as "no phone".
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }
    format!("+{digits}")
}

fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

fn line_delimiters() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,\t|:]").expect("static delimiter regex"))
}

/// Parse one line of a TXT source or pasted message.
///
/// `Name, +1 555 0100`, `+15550100|Name` and bare numbers are all accepted.
/// Lines without any digit are dropped.
pub fn parse_text_line(line: &str) -> Option<Contact> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = line_delimiters()
        .split(line)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    match tokens.as_slice() {
        [] => None,
        [only] => Contact::new(*only, only),
        many => {
            let (phone_idx, phone_raw) = many
                .iter()
                .enumerate()
                .rev()
                .find(|(_, t)| has_digit(t))?;
            let name = many
                .iter()
                .enumerate()
                .find(|(i, _)| *i != phone_idx)
                .map(|(_, t)| t.to_string())
                .unwrap_or_default();
            Contact::new(name, phone_raw)
        }
    }
}

/// Split a content line into `(property name, value)`.
///
/// `item1.TEL;TYPE=CELL:+1555` yields `("TEL", "+1555")`.
fn split_property(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.split(';').next().unwrap_or_default();
    let key = key.rsplit('.').next().unwrap_or_default();
    Some((key.trim().to_ascii_uppercase(), value.trim()))
}

/// Extract a contact from a single `BEGIN:VCARD ... END:VCARD` fragment.
pub fn parse_vcard_block(block: &str) -> Option<Contact> {
    let mut name: Option<&str> = None;
    let mut phone: Option<&str> = None;

    for line in block.lines() {
        let Some((key, value)) = split_property(line.trim()) else {
            continue;
        };
        match key.as_str() {
            "FN" if name.is_none() => name = Some(value),
            "TEL" if phone.is_none() && has_digit(value) => phone = Some(value),
            _ => {}
        }
    }

    let phone = phone?;
    Contact::new(name.unwrap_or_default(), phone)
}

const PHONE_HEADER_KEYWORDS: &[&str] = &["phone", "tel", "mobile", "number", "contact"];
const NAME_HEADER_KEYWORDS: &[&str] = &["name"];

/// Column layout detected for a spreadsheet.
///
/// Detection is heuristic: ambiguous headers may pick the wrong column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SheetLayout {
    pub phone_col: usize,
    pub name_col: Option<usize>,
    /// Whether the first row is a header (and must be skipped).
    pub has_header: bool,
}

impl SheetLayout {
    /// Inspect the first row as a header and the rest as data.
    pub fn detect(rows: &[Vec<String>]) -> Option<Self> {
        let header = rows.first()?;
        let data = &rows[1..];
        let header_lower: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();

        let by_keyword = header_lower.iter().position(|h| {
            !NAME_HEADER_KEYWORDS.iter().any(|k| h.contains(k))
                && PHONE_HEADER_KEYWORDS.iter().any(|k| h.contains(k))
        });

        let (phone_col, has_header) = match by_keyword {
            Some(col) => (col, true),
            None => {
                let col = first_digit_column(data).or_else(|| first_digit_column(rows))?;
                let header_is_data = header.get(col).map(|c| has_digit(c)).unwrap_or(false);
                (col, !header_is_data)
            }
        };

        let name_col = if has_header {
            header_lower
                .iter()
                .enumerate()
                .find(|(i, h)| *i != phone_col && NAME_HEADER_KEYWORDS.iter().any(|k| h.contains(k)))
                .map(|(i, _)| i)
        } else {
            None
        };

        Some(Self {
            phone_col,
            name_col,
            has_header,
        })
    }

    /// Turn one data row into a contact; falls back to phone-as-name.
    pub fn parse_row(&self, row: &[String]) -> Option<Contact> {
        let phone = row.get(self.phone_col)?;
        let name = self
            .name_col
            .and_then(|c| row.get(c))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(phone.as_str());
        Contact::new(name, phone)
    }

    /// Rows that hold data under this layout.
    pub fn data_rows<'a>(&self, rows: &'a [Vec<String>]) -> &'a [Vec<String>] {
        if self.has_header && !rows.is_empty() {
            &rows[1..]
        } else {
            rows
        }
    }
}

fn first_digit_column(rows: &[Vec<String>]) -> Option<usize> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width).find(|&col| {
        rows.iter()
            .any(|r| r.get(col).map(|c| has_digit(c)).unwrap_or(false))
    })
}
