use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::domain::ResourcePair;
use crate::error::PreseeaError;
use crate::store::Store;

pub const HEADER: [&str; 2] = ["file_name", "transcription"];
const SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub file_name: Utf8PathBuf,
    pub transcription: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestReport {
    pub rows: usize,
    pub copied: usize,
    pub incomplete: usize,
}

/// Flattens complete pairs into the data directory and writes the manifest.
/// Pairs missing either file, or whose audio fails the integrity probe, are
/// left out and only counted.
pub fn build(
    store: &Store,
    pairs: &[ResourcePair],
) -> Result<(Vec<ManifestRow>, ManifestReport), PreseeaError> {
    let mut report = ManifestReport::default();
    let mut rows = Vec::with_capacity(pairs.len());
    Store::ensure_dir(&store.data_root())?;

    for pair in pairs {
        if !pair.is_complete() {
            report.incomplete += 1;
            continue;
        }
        let file_name = pair.audio_path.file_name().ok_or_else(|| {
            PreseeaError::Filesystem(format!("audio path has no file name: {}", pair.audio_path))
        })?;
        let flat = store.data_path(file_name);
        if needs_copy(pair, &flat) {
            Store::copy_file_atomic(&pair.audio_path, &flat)?;
            report.copied += 1;
        }
        rows.push(ManifestRow {
            file_name: store.data_entry(file_name),
            transcription: read_transcript(pair)?,
        });
    }

    Store::write_bytes_atomic(&store.manifest_path(), render(&rows).as_bytes())?;
    report.rows = rows.len();
    Ok((rows, report))
}

/// A flat copy is refreshed when it is missing, differs from the raw
/// download in size, or is older than it.
fn needs_copy(pair: &ResourcePair, flat: &Utf8Path) -> bool {
    match (Store::file_len(flat), Store::file_len(&pair.audio_path)) {
        (Some(existing), Some(source)) if existing == source => {
            match (Store::file_modified(flat), Store::file_modified(&pair.audio_path)) {
                (Some(copied), Some(downloaded)) => downloaded > copied,
                _ => true,
            }
        }
        _ => true,
    }
}

fn read_transcript(pair: &ResourcePair) -> Result<String, PreseeaError> {
    let bytes = fs::read(pair.transcript_path.as_std_path()).map_err(|err| {
        PreseeaError::TranscriptRead {
            path: pair.transcript_path.to_string(),
            message: err.to_string(),
        }
    })?;
    Ok(flatten_text(&decode_transcript(bytes)))
}

/// UTF-8 first; the corpus also serves Latin-1 transcripts, and Latin-1
/// maps every byte to the code point of the same value.
pub fn decode_transcript(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!("transcript is not UTF-8, decoding as Latin-1");
            err.into_bytes().into_iter().map(char::from).collect()
        }
    }
}

/// Joins lines with single spaces and trims the result.
pub fn flatten_text(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn render(rows: &[ManifestRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, &HEADER);
    for row in rows {
        push_record(&mut out, &[row.file_name.as_str(), row.transcription.as_str()]);
    }
    out
}

fn push_record(out: &mut String, fields: &[&str]) {
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(SEPARATOR);
        }
        if needs_quotes(field) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

fn needs_quotes(field: &str) -> bool {
    field.contains(SEPARATOR) || field.contains('"') || field.contains('\n') || field.contains('\r')
}
