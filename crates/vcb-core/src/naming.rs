//! File-name and contact-label sequences.
//!
//! A naming template such as `H1OK` is decomposed once into
//! `("H", 1, "OK")`; the i-th output is `H{1+i}OK.vcf`. Everything here is a
//! pure function of the index so previews and retries reproduce the same names.

use crate::{errors::Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamingTemplate {
    prefix: String,
    counter: Option<u64>,
    suffix: String,
}

impl NamingTemplate {
    /// Parse a user-supplied template.
    ///
    /// Only the first maximal digit run is the counter; later runs are literal
    /// text. A trailing `.vcf` is ignored.
    pub fn parse(template: &str) -> Result<Self> {
        let template = template.trim();
        let template = strip_suffix_ignore_case(template, ".vcf").unwrap_or(template);
        if template.is_empty() {
            return Err(Error::Validation("File name cannot be empty.".to_string()));
        }
        if template.contains(['/', '\\']) {
            return Err(Error::Validation(
                "File name cannot contain path separators.".to_string(),
            ));
        }

        let Some(start) = template.find(|c: char| c.is_ascii_digit()) else {
            return Ok(Self {
                prefix: template.to_string(),
                counter: None,
                suffix: String::new(),
            });
        };
        let end = template[start..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|off| start + off)
            .unwrap_or(template.len());

        let counter = template[start..end].parse::<u64>().map_err(|_| {
            Error::Validation("The number in the file name is too large.".to_string())
        })?;

        Ok(Self {
            prefix: template[..start].to_string(),
            counter: Some(counter),
            suffix: template[end..].to_string(),
        })
    }

    /// Name for the i-th output (0-based) with the given extension.
    pub fn name_with_extension(&self, index: u64, extension: &str) -> String {
        match self.counter {
            Some(start) => format!(
                "{}{}{}.{extension}",
                self.prefix,
                start.saturating_add(index),
                self.suffix
            ),
            None => format!("{}{index}.{extension}", self.prefix),
        }
    }

    pub fn file_name(&self, index: u64) -> String {
        self.name_with_extension(index, "vcf")
    }

    /// Single-file name for whole-run artifacts (`<prefix>_all.zip`, `<prefix>.txt`).
    pub fn stem(&self) -> &str {
        let stem = self.prefix.trim_end_matches(['_', '-', ' ']);
        if stem.is_empty() {
            "contacts"
        } else {
            stem
        }
    }

    /// The template as the user would type it back.
    pub fn display(&self) -> String {
        match self.counter {
            Some(n) => format!("{}{n}{}", self.prefix, self.suffix),
            None => self.prefix.clone(),
        }
    }
}

/// Build a restartable generator `i -> file name` for a template.
pub fn build_generator(template: &str) -> Result<impl Fn(u64) -> String> {
    let parsed = NamingTemplate::parse(template)?;
    Ok(move |i| parsed.file_name(i))
}

/// Contact display labels `prefix + (start + i)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSequence {
    pub prefix: String,
    pub start: u64,
}

impl LabelSequence {
    pub fn label(&self, index: u64) -> String {
        format!("{}{}", self.prefix, self.start.saturating_add(index))
    }
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() < suffix.len() || !s.is_char_boundary(s.len() - suffix.len()) {
        return None;
    }
    let (head, tail) = s.split_at(s.len() - suffix.len());
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}
