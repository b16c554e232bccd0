use std::fs;
use std::io::{self, Read};
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::config::ResolvedConfig;
use crate::domain::{Country, ResourcePair, ResultRow};
use crate::error::PreseeaError;

/// On-disk layout of one crawl: raw per-country downloads, the flat
/// dataset directory and the manifest, all under a single root.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
    raw_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
    manifest: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf, config: &ResolvedConfig) -> Self {
        Self {
            root,
            raw_dir: config.raw_dir.clone(),
            data_dir: config.data_dir.clone(),
            manifest: config.manifest.clone(),
        }
    }

    pub fn current_dir(config: &ResolvedConfig) -> Result<Self, PreseeaError> {
        let cwd = std::env::current_dir().map_err(|err| PreseeaError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| PreseeaError::Filesystem("invalid working directory".to_string()))?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn country_dir(&self, country: &Country) -> Utf8PathBuf {
        self.root.join(&self.raw_dir).join(country.as_str())
    }

    pub fn data_root(&self) -> Utf8PathBuf {
        self.root.join(&self.data_dir)
    }

    /// Manifest-facing name of a flat copy, relative to the root.
    pub fn data_entry(&self, file_name: &str) -> Utf8PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn data_path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(self.data_entry(file_name))
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(&self.manifest)
    }

    pub fn pair_for(&self, row: ResultRow) -> ResourcePair {
        let save_dir = self.country_dir(&row.country);
        ResourcePair::new(row, save_dir)
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), PreseeaError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| PreseeaError::Filesystem(format!("create {path}: {err}")))
    }

    /// Streams `reader` into a temporary sibling of `path` and renames it into
    /// place, so an interrupted transfer never leaves a truncated file behind.
    pub fn write_stream_atomic<R: Read>(path: &Utf8Path, reader: &mut R) -> Result<u64, PreseeaError> {
        let parent = path
            .parent()
            .ok_or_else(|| PreseeaError::Filesystem(format!("invalid destination path {path}")))?;
        Self::ensure_dir(parent)?;
        let mut temp = Builder::new()
            .prefix(".preseea-part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PreseeaError::Filesystem(err.to_string()))?;
        let written = io::copy(reader, temp.as_file_mut())
            .map_err(|err| PreseeaError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PreseeaError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(written)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PreseeaError> {
        let mut reader = content;
        Self::write_stream_atomic(path, &mut reader).map(|_| ())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<u64, PreseeaError> {
        let mut file = fs::File::open(source.as_std_path())
            .map_err(|err| PreseeaError::Filesystem(format!("open {source}: {err}")))?;
        Self::write_stream_atomic(dest, &mut file)
    }

    pub fn file_len(path: &Utf8Path) -> Option<u64> {
        fs::metadata(path.as_std_path())
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
    }

    pub fn file_modified(path: &Utf8Path) -> Option<SystemTime> {
        fs::metadata(path.as_std_path())
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }
}
