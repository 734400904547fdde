//! Contact-file codec: vCard streams, line-oriented text, spreadsheets, ZIP bundles.

use std::io::{Cursor, Write};

use crate::{
    contact::{parse_text_line, parse_vcard_block, Contact, SheetLayout},
    errors::Error,
    Result,
};

/// A generated (or uploaded) file held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Source formats the decoders understand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Text,
    Sheet { delimiter: u8 },
    Card,
}

impl SourceFormat {
    /// Map a declared file extension (with or without the dot) to a decoder.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Self::Text),
            "csv" => Some(Self::Sheet { delimiter: b',' }),
            "tsv" => Some(Self::Sheet { delimiter: b'\t' }),
            "vcf" | "vcard" => Some(Self::Card),
            _ => None,
        }
    }
}

/// Extension of a file name, lowercased and without the dot.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn encode_vcard(contact: &Contact) -> String {
    format!(
        "BEGIN:VCARD\nVERSION:3.0\nFN:{}\nTEL;TYPE=CELL:{}\nEND:VCARD\n",
        contact.display_name(),
        contact.phone()
    )
}

pub fn encode_vcards(contacts: &[Contact]) -> String {
    contacts.iter().map(encode_vcard).collect()
}

/// Split a vCard stream on `END:VCARD` and parse every fragment in order.
///
/// Fragments without a TEL line are skipped. A trailing fragment missing its
/// `END:VCARD` is still parsed.
pub fn decode_vcard_stream(text: &str) -> Vec<Contact> {
    let mut out = Vec::new();
    let mut fragment = String::new();

    for line in text.lines() {
        if line.trim().eq_ignore_ascii_case("END:VCARD") {
            if let Some(c) = parse_vcard_block(&fragment) {
                out.push(c);
            }
            fragment.clear();
            continue;
        }
        fragment.push_str(line);
        fragment.push('\n');
    }

    if !fragment.trim().is_empty() {
        if let Some(c) = parse_vcard_block(&fragment) {
            out.push(c);
        }
    }

    out
}

pub fn encode_text_lines(contacts: &[Contact]) -> String {
    contacts
        .iter()
        .map(Contact::phone)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn decode_text_lines(text: &str) -> Vec<Contact> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_text_line)
        .collect()
}

/// Decode CSV/TSV bytes using column auto-detection.
///
/// Cells are decoded lossily, so legacy-encoded exports still load. A sheet
/// the reader cannot parse at all is `UnsupportedFormat`.
pub fn decode_spreadsheet(bytes: &[u8], delimiter: u8) -> Result<Vec<Contact>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(unreadable_sheet)?;
        if record.iter().all(<[u8]>::is_empty) {
            continue;
        }
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }

    let Some(layout) = SheetLayout::detect(&rows) else {
        return Ok(Vec::new());
    };

    Ok(layout
        .data_rows(&rows)
        .iter()
        .filter_map(|r| layout.parse_row(r))
        .collect())
}

fn unreadable_sheet(e: csv::Error) -> Error {
    Error::UnsupportedFormat(format!("the spreadsheet could not be read ({e})"))
}

/// Decode raw upload bytes in the given format. Text is decoded lossily.
pub fn decode_source(format: SourceFormat, bytes: &[u8]) -> Result<Vec<Contact>> {
    match format {
        SourceFormat::Text => Ok(decode_text_lines(&String::from_utf8_lossy(bytes))),
        SourceFormat::Card => Ok(decode_vcard_stream(&String::from_utf8_lossy(bytes))),
        SourceFormat::Sheet { delimiter } => decode_spreadsheet(bytes, delimiter),
    }
}

/// Pack files into a single deflated ZIP archive.
pub fn bundle_zip(files: &[OutgoingFile], archive_name: &str) -> Result<OutgoingFile> {
    if files.is_empty() {
        return Err(Error::Validation("nothing to bundle".to_string()));
    }

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for f in files {
        zip.start_file(f.file_name.as_str(), options)?;
        zip.write_all(&f.bytes)?;
    }

    let cursor = zip.finish()?;
    Ok(OutgoingFile::new(archive_name, cursor.into_inner()))
}
