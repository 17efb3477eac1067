//! Duration collaborator: returns an audio file's exact real duration,
//! used by the orchestrator for the global timeline offset.

use async_trait::async_trait;
use std::path::Path;
use symphonia::core::formats::FormatReader;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;

use crate::error::AlignError;

/// Probes an audio file for its exact duration in seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Return the audio duration in seconds.
    async fn duration_sec(&self, path: &Path) -> crate::Result<f64>;
}

/// `symphonia`-backed duration probe with a `hound` WAV-header fallback
/// for files symphonia's container probe cannot open.
pub struct SymphoniaDurationProbe;

impl SymphoniaDurationProbe {
    /// Build a new probe. Stateless; exists for trait-object uniformity.
    pub fn new() -> Self {
        Self
    }

    fn probe_symphonia(path: &Path) -> crate::Result<f64> {
        let file = std::fs::File::open(path)
            .map_err(|e| AlignError::audio_probe(format!("failed to open {path:?}: {e}")))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &Default::default(),
                &Default::default(),
            )
            .map_err(|e| AlignError::audio_probe(format!("failed to probe {path:?}: {e}")))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| AlignError::audio_probe(format!("no default track in {path:?}")))?;

        let time_base = track
            .codec_params
            .time_base
            .ok_or_else(|| AlignError::audio_probe(format!("missing time base for {path:?}")))?;
        let n_frames = track
            .codec_params
            .n_frames
            .ok_or_else(|| AlignError::audio_probe(format!("missing frame count for {path:?}")))?;

        let time = time_base.calc_time(n_frames);
        Ok(time.seconds as f64 + time.frac)
    }

    fn probe_wav_fallback(path: &Path) -> crate::Result<f64> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| AlignError::audio_probe(format!("hound failed on {path:?}: {e}")))?;
        let spec = reader.spec();
        let frames = reader.duration();
        Ok(frames as f64 / spec.sample_rate as f64)
    }
}

impl Default for SymphoniaDurationProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurationProbe for SymphoniaDurationProbe {
    async fn duration_sec(&self, path: &Path) -> crate::Result<f64> {
        let path = path.to_path_buf();
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        let symphonia_result = tokio::task::spawn_blocking({
            let path = path.clone();
            move || Self::probe_symphonia(&path)
        })
        .await
        .map_err(|e| AlignError::audio_probe(format!("duration probe task panicked: {e}")))?;

        match symphonia_result {
            Ok(seconds) => Ok(seconds),
            Err(e) if is_wav => {
                log::warn!("symphonia probe failed for {path:?} ({e}); falling back to hound");
                tokio::task::spawn_blocking(move || Self::probe_wav_fallback(&path))
                    .await
                    .map_err(|e| AlignError::audio_probe(format!("duration probe task panicked: {e}")))?
            }
            Err(e) => Err(e),
        }
    }
}

/// Deterministic test adapter returning a fixed duration regardless of path.
pub struct TestDurationProbe {
    fixed_sec: f64,
}

impl TestDurationProbe {
    /// Build a probe that always reports `fixed_sec`.
    pub fn new(fixed_sec: f64) -> Self {
        Self { fixed_sec }
    }
}

#[async_trait]
impl DurationProbe for TestDurationProbe {
    async fn duration_sec(&self, _path: &Path) -> crate::Result<f64> {
        Ok(self.fixed_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_returns_fixed_duration() {
        let probe = TestDurationProbe::new(12.5);
        let duration = probe.duration_sec(Path::new("anything.wav")).await.unwrap();
        assert_eq!(duration, 12.5);
    }
}
