use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PreseeaError;
use crate::integrity::{self, Integrity};

pub const AUDIO_EXTENSION: &str = "mp3";
pub const TRANSCRIPT_EXTENSION: &str = "txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Audio,
    Transcript,
}

impl ResourceKind {
    pub fn extension(self) -> &'static str {
        match self {
            ResourceKind::Audio => AUDIO_EXTENSION,
            ResourceKind::Transcript => TRANSCRIPT_EXTENSION,
        }
    }

    /// Remote path of the resource relative to the corpus base URL.
    pub fn remote_path(self, id: &UtteranceId) -> String {
        let ext = self.extension();
        format!("{ext}/{id}.{ext}")
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Audio => write!(f, "audio"),
            ResourceKind::Transcript => write!(f, "transcript"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UtteranceId(String);

impl UtteranceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UtteranceId {
    type Err = PreseeaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_path_segment(trimmed) {
            return Err(PreseeaError::InvalidUtterance(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Country(String);

impl Country {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Country {
    type Err = PreseeaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_path_segment(trimmed) {
            return Err(PreseeaError::InvalidCountry(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Both labels end up as single directory or file name components.
fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch.is_control())
}

/// Country pattern for the search endpoint. `.*` matches every country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryFilter(String);

impl CountryFilter {
    pub const MATCH_ALL: &'static str = ".*";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_match_all(&self) -> bool {
        self.0 == Self::MATCH_ALL
    }
}

impl Default for CountryFilter {
    fn default() -> Self {
        Self(Self::MATCH_ALL.to_string())
    }
}

impl fmt::Display for CountryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub utterance: UtteranceId,
    pub country: Country,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePair {
    pub utterance: UtteranceId,
    pub country: Country,
    pub save_dir: Utf8PathBuf,
    pub audio_path: Utf8PathBuf,
    pub transcript_path: Utf8PathBuf,
    pub audio_remote: String,
    pub transcript_remote: String,
}

impl ResourcePair {
    pub fn new(row: ResultRow, save_dir: Utf8PathBuf) -> Self {
        let audio_remote = ResourceKind::Audio.remote_path(&row.utterance);
        let transcript_remote = ResourceKind::Transcript.remote_path(&row.utterance);
        let audio_path = save_dir.join(remote_file_name(&audio_remote));
        let transcript_path = save_dir.join(remote_file_name(&transcript_remote));
        Self {
            utterance: row.utterance,
            country: row.country,
            save_dir,
            audio_path,
            transcript_path,
            audio_remote,
            transcript_remote,
        }
    }

    pub fn local_path(&self, kind: ResourceKind) -> &Utf8Path {
        match kind {
            ResourceKind::Audio => &self.audio_path,
            ResourceKind::Transcript => &self.transcript_path,
        }
    }

    pub fn remote(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Audio => &self.audio_remote,
            ResourceKind::Transcript => &self.transcript_remote,
        }
    }

    pub fn task(&self, kind: ResourceKind) -> DownloadTask {
        DownloadTask {
            kind,
            remote: self.remote(kind).to_string(),
            save_dir: self.save_dir.clone(),
            destination: self.local_path(kind).to_path_buf(),
        }
    }

    /// Present on disk and, for audio, passing the integrity probe. A
    /// corrupted file counts as missing.
    pub fn is_usable(&self, kind: ResourceKind) -> bool {
        integrity::check(self.local_path(kind)) == Integrity::Valid
    }

    pub fn is_complete(&self) -> bool {
        self.is_usable(ResourceKind::Audio) && self.is_usable(ResourceKind::Transcript)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub kind: ResourceKind,
    pub remote: String,
    pub save_dir: Utf8PathBuf,
    pub destination: Utf8PathBuf,
}

/// Last path segment of a remote reference, ignoring any query or fragment.
pub fn remote_file_name(remote: &str) -> &str {
    let path = remote
        .split(['?', '#'])
        .next()
        .unwrap_or(remote);
    path.rsplit('/').next().unwrap_or(path)
}
