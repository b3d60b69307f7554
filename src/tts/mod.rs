use crate::audio::AudioEncoding;
use crate::config::Config;
use crate::error::PipelineError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod openai_speech;
pub mod qwen_tts;
pub mod sovits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsProviderId {
    #[default]
    QwenTts,
    GptSovits,
    OpenaiSpeech,
}

impl TtsProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QwenTts => "qwen-tts",
            Self::GptSovits => "gpt-sovits",
            Self::OpenaiSpeech => "openai-speech",
        }
    }

    /// Fixed priority table: for each possible preference, every known
    /// provider appears in a deterministic position.
    pub fn fallback_chain(preferred: Self) -> [Self; 3] {
        match preferred {
            Self::QwenTts => [Self::QwenTts, Self::GptSovits, Self::OpenaiSpeech],
            Self::GptSovits => [Self::GptSovits, Self::OpenaiSpeech, Self::QwenTts],
            Self::OpenaiSpeech => [Self::OpenaiSpeech, Self::GptSovits, Self::QwenTts],
        }
    }
}

impl std::fmt::Display for TtsProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two configured voices a segment speaks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRole {
    Primary,
    Secondary,
}

/// Tokens that push an unmatched speaker label onto the secondary voice.
/// A heuristic, not an identity lookup; unrecognized labels land on the
/// primary voice and an occasional misassignment is accepted.
const SECONDARY_HINTS: &[&str] = &["expert", "guest", "dr", "prof", "mr", "male", "cohost"];

pub fn assign_voice_role(speaker: &str, hosts: &[String]) -> VoiceRole {
    if let Some(first) = hosts.first() {
        if speaker.eq_ignore_ascii_case(first) {
            return VoiceRole::Primary;
        }
    }
    if let Some(second) = hosts.get(1) {
        if speaker.eq_ignore_ascii_case(second) {
            return VoiceRole::Secondary;
        }
    }

    let lower = speaker.to_lowercase();
    let hinted = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| SECONDARY_HINTS.contains(&token));
    if hinted {
        VoiceRole::Secondary
    } else {
        VoiceRole::Primary
    }
}

/// Speech-synthesis capability. One implementation per vendor; at least the
/// preferred provider must be configured, and any others join the fallback
/// chain in table order.
#[async_trait]
pub trait TtsClient: Send + Sync {
    fn provider_id(&self) -> TtsProviderId;

    /// Output format of this provider's bytes. Drives the assembly branch.
    fn encoding(&self) -> AudioEncoding;

    /// Provider-specific voice identifier for a role.
    fn voice_for(&self, role: VoiceRole) -> String;

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

/// Configured providers, ordered for fallback.
pub struct TtsRegistry {
    clients: Vec<Arc<dyn TtsClient>>,
    preferred: TtsProviderId,
}

impl std::fmt::Debug for TtsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsRegistry")
            .field("provider_count", &self.clients.len())
            .field("preferred", &self.preferred)
            .finish()
    }
}

impl TtsRegistry {
    pub fn new(clients: Vec<Arc<dyn TtsClient>>, preferred: TtsProviderId) -> Result<Self> {
        if !clients.iter().any(|c| c.provider_id() == preferred) {
            return Err(PipelineError::Configuration(format!(
                "preferred tts provider '{}'",
                preferred
            ))
            .into());
        }
        Ok(Self { clients, preferred })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut clients: Vec<Arc<dyn TtsClient>> = Vec::new();

        if let Some(cfg) = &config.audio.qwen_tts {
            clients.push(Arc::new(qwen_tts::QwenTtsClient::new(cfg.clone())));
        }
        if let Some(cfg) = &config.audio.gpt_sovits {
            clients.push(Arc::new(sovits::GptSovitsClient::new(cfg.clone())));
        }
        if let Some(cfg) = &config.audio.openai_speech {
            clients.push(Arc::new(openai_speech::OpenaiSpeechClient::new(cfg.clone())));
        }

        Self::new(clients, config.audio.provider)
    }

    fn client(&self, id: TtsProviderId) -> Option<Arc<dyn TtsClient>> {
        self.clients
            .iter()
            .find(|c| c.provider_id() == id)
            .cloned()
    }

    /// Providers in attempt order: the fixed table keyed on the preference,
    /// filtered to what is configured. The preferred provider is always
    /// first.
    pub fn chain(&self) -> Vec<Arc<dyn TtsClient>> {
        TtsProviderId::fallback_chain(self.preferred)
            .into_iter()
            .filter_map(|id| self.client(id))
            .collect()
    }
}
