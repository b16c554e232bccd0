use std::fs::File;

use camino::Utf8Path;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::domain::AUDIO_EXTENSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    Missing,
    Valid,
    Corrupted,
}

/// Classifies a local file. Only audio files are inspected; anything else is
/// valid as soon as it exists. A probe that reads the container header and
/// finds an audio track is taken as evidence of a usable file.
pub fn check(path: &Utf8Path) -> Integrity {
    if !path.as_std_path().is_file() {
        return Integrity::Missing;
    }
    if !is_audio(path) {
        return Integrity::Valid;
    }
    match probe_audio(path) {
        Ok(()) => Integrity::Valid,
        Err(reason) => {
            debug!(%path, %reason, "audio probe failed");
            Integrity::Corrupted
        }
    }
}

pub fn is_audio(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(AUDIO_EXTENSION))
}

fn probe_audio(path: &Utf8Path) -> Result<(), String> {
    let file = File::open(path.as_std_path()).map_err(|err| err.to_string())?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(AUDIO_EXTENSION);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| err.to_string())?;

    probed
        .format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .map(|_| ())
        .ok_or_else(|| "no audio track".to_string())
}
