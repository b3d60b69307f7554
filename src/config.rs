use crate::script::OverviewMode;
use crate::tts::TtsProviderId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_input")]
    pub input_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_data")]
    pub data_folder: String,

    #[serde(default)]
    pub generation: GenerationConfig,

    pub llm: LlmConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_mode")]
    pub mode: OverviewMode,

    #[serde(default)]
    pub topic: Option<String>,

    /// Host display names for dialogue mode. The first maps to the primary
    /// voice, the second to the secondary voice.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_script_timeout")]
    pub script_timeout_seconds: u64,

    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_seconds: u64,

    #[serde(default = "default_synthesis_cycles")]
    pub synthesis_cycles: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            topic: None,
            hosts: default_hosts(),
            script_timeout_seconds: default_script_timeout(),
            synthesis_timeout_seconds: default_synthesis_timeout(),
            synthesis_cycles: default_synthesis_cycles(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "gemini", "ollama" or "openai"
    pub gemini: Option<GeminiConfig>,
    pub ollama: Option<OllamaConfig>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AudioConfig {
    /// Preferred synthesis provider. The other configured providers form the
    /// fallback chain in a fixed order keyed on this value.
    #[serde(default = "default_tts_provider")]
    pub provider: TtsProviderId,

    pub qwen_tts: Option<QwenTtsConfig>,
    pub gpt_sovits: Option<GptSovitsConfig>,
    pub openai_speech: Option<OpenaiSpeechConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QwenTtsConfig {
    #[serde(default = "default_qwen_base_url")]
    pub base_url: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_qwen_primary_voice")]
    pub primary_voice: String,

    #[serde(default = "default_qwen_secondary_voice")]
    pub secondary_voice: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GptSovitsConfig {
    pub token: String,

    #[serde(default = "default_sovits_base_url")]
    pub base_url: String,

    #[serde(default = "default_sovits_top_k")]
    pub top_k: i32,

    #[serde(default = "default_sovits_temperature")]
    pub temperature: f64,

    #[serde(default = "default_sovits_speed_factor")]
    pub speed_factor: f64,

    pub primary_voice: String,
    pub secondary_voice: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenaiSpeechConfig {
    pub api_key: String,

    #[serde(default = "default_speech_model")]
    pub model: String,

    pub base_url: Option<String>,

    #[serde(default = "default_speech_primary_voice")]
    pub primary_voice: String,

    #[serde(default = "default_speech_secondary_voice")]
    pub secondary_voice: String,
}

fn default_input() -> String {
    "sources".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_data() -> String {
    "data".to_string()
}
fn default_mode() -> OverviewMode {
    OverviewMode::Dialogue
}
fn default_hosts() -> Vec<String> {
    vec!["Alex".to_string(), "Jamie".to_string()]
}
fn default_script_timeout() -> u64 {
    180
}
fn default_synthesis_timeout() -> u64 {
    45
}
fn default_synthesis_cycles() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2
}
fn default_tts_provider() -> TtsProviderId {
    TtsProviderId::QwenTts
}
fn default_qwen_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_sample_rate() -> u32 {
    24_000
}
fn default_qwen_primary_voice() -> String {
    "ethan".to_string()
}
fn default_qwen_secondary_voice() -> String {
    "chelsie".to_string()
}
fn default_sovits_base_url() -> String {
    "https://gsv2p.acgnai.top".to_string()
}
fn default_sovits_top_k() -> i32 {
    10
}
fn default_sovits_temperature() -> f64 {
    1.0
}
fn default_sovits_speed_factor() -> f64 {
    1.0
}
fn default_speech_model() -> String {
    "tts-1".to_string()
}
fn default_speech_primary_voice() -> String {
    "nova".to_string()
}
fn default_speech_secondary_voice() -> String {
    "onyx".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        let config: Config =
            serde_yaml_ng::from_str(&content).context("Failed to parse config.yml")?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.input_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.data_folder)?;
        Ok(())
    }
}
