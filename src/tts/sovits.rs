use crate::audio::AudioEncoding;
use crate::config::GptSovitsConfig;
use crate::tts::{TtsClient, TtsProviderId, VoiceRole};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::json;

/// Hosted GPT-SoVITS-style API: an inference POST answers with the URL of
/// the rendered clip, downloaded in a second request. Output is MP3.
pub struct GptSovitsClient {
    config: GptSovitsConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct InferResponse {
    msg: String,
    audio_url: String,
}

impl GptSovitsClient {
    pub fn new(config: GptSovitsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TtsClient for GptSovitsClient {
    fn provider_id(&self) -> TtsProviderId {
        TtsProviderId::GptSovits
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
        let url = format!("{}/infer", self.config.base_url.trim_end_matches('/'));
        let payload = json!({
            "voice": voice_id,
            "text": text,
            "format": "mp3",
            "top_k": self.config.top_k,
            "temperature": self.config.temperature,
            "speed_factor": self.config.speed_factor,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .await
            .context("Failed to reach gpt-sovits server")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("gpt-sovits error {}: {}", status, error_text));
        }

        let infer: InferResponse = resp
            .json()
            .await
            .context("Failed to parse gpt-sovits inference response")?;
        debug!("gpt-sovits: {}", infer.msg);

        let audio = self
            .client
            .get(&infer.audio_url)
            .send()
            .await
            .context("Failed to download gpt-sovits audio")?;
        if !audio.status().is_success() {
            return Err(anyhow!("gpt-sovits audio download failed: {}", audio.status()));
        }

        Ok(audio.bytes().await?.to_vec())
    }
}
