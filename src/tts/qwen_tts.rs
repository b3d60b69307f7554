use crate::audio::{extract_pcm, AudioEncoding};
use crate::config::QwenTtsConfig;
use crate::tts::{TtsClient, TtsProviderId, VoiceRole};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;

/// Self-hosted Qwen-TTS server. Responds with a complete WAV file; the
/// container is stripped on receipt so segment outputs byte-concatenate and
/// the assembler wraps the result exactly once.
pub struct QwenTtsClient {
    config: QwenTtsConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
    format: &'a str,
}

impl QwenTtsClient {
    pub fn new(config: QwenTtsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TtsClient for QwenTtsClient {
    fn provider_id(&self) -> TtsProviderId {
        TtsProviderId::QwenTts
    }

    fn encoding(&self) -> AudioEncoding {
        AudioEncoding::Pcm16 {
            sample_rate: self.config.sample_rate,
            channels: 1,
        }
    }

    fn voice_for(&self, role: VoiceRole) -> String {
        match role {
            VoiceRole::Primary => self.config.primary_voice.clone(),
            VoiceRole::Secondary => self.config.secondary_voice.clone(),
        }
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/api/tts", self.config.base_url.trim_end_matches('/'));
        let body = SynthesisRequest {
            text,
            voice: voice_id,
            format: "wav",
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach qwen-tts server")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("qwen-tts error {}: {}", status, error_text));
        }

        let wav = resp.bytes().await?.to_vec();
        let (spec, pcm) = extract_pcm(&wav).context("qwen-tts returned a malformed WAV")?;
        if spec.sample_rate != self.config.sample_rate {
            return Err(anyhow!(
                "qwen-tts sample rate mismatch: got {}, expected {}",
                spec.sample_rate,
                self.config.sample_rate
            ));
        }
        debug!("qwen-tts returned {} PCM bytes", pcm.len());
        Ok(pcm)
    }
}
