use anyhow::{anyhow, Result};

/// Output format of a synthesis provider. `Pcm16` chunks are bare sample
/// data that byte-concatenate exactly and get a single WAV container header
/// at assembly time; `Mp3` chunks are already-framed compressed audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Pcm16 { sample_rate: u32, channels: u16 },
    Mp3,
}

impl AudioEncoding {
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Pcm16 { .. } => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Joins per-segment synthesis output into one playable buffer.
///
/// Raw PCM is concatenated and wrapped with one container header. Compressed
/// chunks are concatenated byte-for-byte with no re-encode; whether the
/// result is a strictly valid file for every compressed format is a known
/// product-level caveat, kept as-is on purpose.
pub fn assemble(chunks: &[Vec<u8>], encoding: &AudioEncoding) -> Vec<u8> {
    let mut data = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
    for chunk in chunks {
        data.extend_from_slice(chunk);
    }

    match encoding {
        AudioEncoding::Pcm16 {
            sample_rate,
            channels,
        } => wrap_pcm(
            &data,
            &WavSpec {
                sample_rate: *sample_rate,
                channels: *channels,
                bits_per_sample: 16,
            },
        ),
        AudioEncoding::Mp3 => data,
    }
}

/// Wraps bare PCM samples in a canonical 44-byte RIFF/WAVE header.
pub fn wrap_pcm(data: &[u8], spec: &WavSpec) -> Vec<u8> {
    let block_align = spec.channels * spec.bits_per_sample / 8;
    let byte_rate = spec.sample_rate * block_align as u32;
    let data_len = data.len() as u32;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&spec.channels.to_le_bytes());
    out.extend_from_slice(&spec.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Walks the RIFF chunks of an in-memory WAV buffer and returns the format
/// description plus the bare sample data, so provider responses can be
/// reduced to concatenation-safe PCM.
pub fn extract_pcm(bytes: &[u8]) -> Result<(WavSpec, Vec<u8>)> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(anyhow!("Not a RIFF/WAVE buffer"));
    }

    let mut spec: Option<WavSpec> = None;
    let mut data: Option<Vec<u8>> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let body_start = pos + 8;
        let body_end = body_start
            .checked_add(chunk_size)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| anyhow!("Truncated WAV chunk"))?;

        if chunk_id == b"fmt " {
            if chunk_size < 16 {
                return Err(anyhow!("fmt chunk too short"));
            }
            let body = &bytes[body_start..body_end];
            let audio_format = u16::from_le_bytes([body[0], body[1]]);
            if audio_format != 1 {
                return Err(anyhow!("Unsupported WAV audio format: {}", audio_format));
            }
            spec = Some(WavSpec {
                channels: u16::from_le_bytes([body[2], body[3]]),
                sample_rate: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                bits_per_sample: u16::from_le_bytes([body[14], body[15]]),
            });
        } else if chunk_id == b"data" {
            data = Some(bytes[body_start..body_end].to_vec());
            break;
        }

        // Chunks are word-aligned.
        pos = body_end + (chunk_size & 1);
    }

    let spec = spec.ok_or_else(|| anyhow!("Missing fmt chunk"))?;
    let data = data.ok_or_else(|| anyhow!("Missing data chunk"))?;
    Ok((spec, data))
}
