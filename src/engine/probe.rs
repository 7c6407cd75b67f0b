use std::{fs::File, io::Cursor, path::Path};

use symphonia::core::{
    codecs::CODEC_TYPE_NULL,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::debug;

use super::Source;
use crate::common::{EngineError, HttpClient};

/// Duration reported for sources whose length cannot be determined, such as
/// live streams.
pub const UNKNOWN_DURATION: i64 = -1;

/// Reads just enough of a source to learn its duration.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    max_bytes: usize,
}

impl Prober {
    pub fn new(timeout_ms: u64, max_bytes: usize) -> Result<Self, EngineError> {
        Ok(Self {
            client: HttpClient::new(timeout_ms)?,
            max_bytes,
        })
    }

    /// Duration of `source` in milliseconds, or [`UNKNOWN_DURATION`].
    pub async fn duration_ms(&self, source: &Source) -> Result<i64, EngineError> {
        let source_ref = source.url();
        let hint = source.extension();
        match source {
            Source::Local(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || probe_file(&path))
                    .await
                    .map_err(|e| probe_error(&source_ref, e))?
            }
            Source::Remote(url) => {
                let bytes = self.fetch_head(url).await?;
                tokio::task::spawn_blocking(move || {
                    probe_stream(Box::new(Cursor::new(bytes)), hint.as_deref(), &source_ref)
                })
                .await
                .map_err(|e| probe_error(url, e))?
            }
        }
    }

    /// Downloads at most `max_bytes` of a remote source.
    async fn fetch_head(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;
        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buf.extend_from_slice(&chunk);
            if buf.len() >= self.max_bytes {
                debug!("probe of {} truncated at {} bytes", url, buf.len());
                break;
            }
        }
        Ok(buf)
    }
}

pub fn probe_file(path: &Path) -> Result<i64, EngineError> {
    let file = File::open(path)?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    probe_stream(
        Box::new(file),
        hint.as_deref(),
        &path.display().to_string(),
    )
}

fn probe_stream(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
    source_ref: &str,
) -> Result<i64, EngineError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| probe_error(source_ref, e))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| probe_error(source_ref, "no audio track found"))?;

    let params = &track.codec_params;
    let duration = match (params.n_frames, params.sample_rate) {
        (Some(n_frames), Some(rate)) if rate > 0 => {
            (n_frames as f64 / rate as f64 * 1000.0).round() as i64
        }
        _ => UNKNOWN_DURATION,
    };
    Ok(duration)
}

fn probe_error(source_ref: &str, reason: impl std::fmt::Display) -> EngineError {
    EngineError::Probe {
        source_ref: source_ref.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit mono PCM WAV of `samples` zero samples.
    pub(crate) fn wav_bytes(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(44 + data_len as usize, 0);
        out
    }

    pub(crate) fn write_wav(sample_rate: u32, samples: u32) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("audiohost-{}.wav", uuid::Uuid::new_v4()));
        std::fs::write(&path, wav_bytes(sample_rate, samples)).unwrap();
        path
    }

    #[test]
    fn probes_wav_file_duration() {
        let path = write_wav(8000, 12_000);
        let duration = probe_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(duration, 1500);
    }

    #[test]
    fn probes_in_memory_stream() {
        let bytes = wav_bytes(16_000, 4_000);
        let duration = probe_stream(Box::new(Cursor::new(bytes)), Some("wav"), "mem").unwrap();
        assert_eq!(duration, 250);
    }

    #[test]
    fn garbage_is_a_probe_error() {
        let err = probe_stream(
            Box::new(Cursor::new(vec![7u8; 512])),
            None,
            "noise.bin",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Probe { .. }));
        assert!(err.to_string().starts_with("failed to probe noise.bin"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = probe_file(Path::new("/definitely/not/here.mp3")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
