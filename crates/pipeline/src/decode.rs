//! Audio decode boundary
//!
//! ffmpeg handles every container and codec we care about; this module
//! pipes raw upload bytes through it and reads back mono f32 PCM at the
//! target sample rate. Decode failures surface the tail of ffmpeg's
//! stderr as a short diagnostic hint.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use policy_voice_core::{AudioDecoder, DecodedAudio, Error, Result, TARGET_SAMPLE_RATE};

/// Decoder shelling out to ffmpeg
pub struct FfmpegDecoder {
    bin: String,
}

impl FfmpegDecoder {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn decode(&self, raw: &[u8]) -> Result<DecodedAudio> {
        let mut child = Command::new(&self.bin)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "-ac",
                "1",
                "-ar",
                &TARGET_SAMPLE_RATE.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Audio(format!("failed to spawn {}: {}", self.bin, e)))?;

        // Feed stdin from a separate task; writing and reading from the
        // same task can deadlock once the pipe buffers fill up.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Audio("ffmpeg stdin unavailable".to_string()))?;
        let input = raw.to_vec();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Audio(format!("ffmpeg did not run to completion: {}", e)))?;
        let _ = writer.await;

        if !output.status.success() {
            return Err(Error::Audio(format!(
                "decode failed. Hint: {}",
                stderr_hint(&output.stderr)
            )));
        }

        if output.stdout.is_empty() {
            return Err(Error::Audio(format!(
                "decode produced empty output. Hint: {}",
                stderr_hint(&output.stderr)
            )));
        }

        let samples: Vec<f32> = output
            .stdout
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let audio = DecodedAudio::new(samples, TARGET_SAMPLE_RATE);
        tracing::debug!(
            input_bytes = raw.len(),
            samples = audio.samples.len(),
            seconds = audio.seconds(),
            "Decoded audio"
        );
        Ok(audio)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Last few non-empty stderr lines, joined for a one-line diagnostic
fn stderr_hint(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let tail: Vec<&str> = lines.iter().rev().take(5).rev().copied().collect();
    if tail.is_empty() {
        "no further detail from decoder".to_string()
    } else {
        tail.join(" | ")
    }
}
