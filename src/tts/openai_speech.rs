use crate::audio::AudioEncoding;
use crate::config::OpenaiSpeechConfig;
use crate::tts::{TtsClient, TtsProviderId, VoiceRole};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;

/// OpenAI-compatible `/v1/audio/speech` endpoint. Returns MP3 frames
/// directly in the response body.
pub struct OpenaiSpeechClient {
    config: OpenaiSpeechConfig,
    client: reqwest::Client,
}

impl OpenaiSpeechClient {
    pub fn new(config: OpenaiSpeechConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
    }
}

#[async_trait]
impl TtsClient for OpenaiSpeechClient {
    fn provider_id(&self) -> TtsProviderId {
        TtsProviderId::OpenaiSpeech
    }

    fn encoding(&self) -> AudioEncoding {
        AudioEncoding::Mp3
    }

    fn voice_for(&self, role: VoiceRole) -> String {
        match role {
            VoiceRole::Primary => self.config.primary_voice.clone(),
            VoiceRole::Secondary => self.config.secondary_voice.clone(),
        }
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url());
        let payload = json!({
            "model": self.config.model,
            "input": text,
            "voice": voice_id,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await
            .context("Failed to reach speech endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("speech endpoint error {}: {}", status, error_text));
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
