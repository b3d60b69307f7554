use crate::audio;
use crate::config::Config;
use crate::device::{ProgressNotifier, WakeLock};
use crate::error::{is_cancellation, PipelineError};
use crate::llm::LlmClient;
use crate::retry::{invoke_with_fallbacks, Attempt, RetryPolicy};
use crate::script::{self, GenerationRequest, OverviewMode, ScriptSegment};
use crate::state::{GenerationState, GenerationStatus, StateHandle};
use crate::store::{ArtifactStore, AudioOverview, JobRecord, KvStore};
use crate::tts::{assign_voice_role, TtsRegistry};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

// Phase boundaries on the 0-100 progress scale. Synthesis interpolates
// between its bounds by segment index.
const SCRIPT_PROGRESS: u8 = 5;
const SYNTH_LOWER: u8 = 20;
const SYNTH_UPPER: u8 = 85;
const ASSEMBLE_PROGRESS: u8 = 88;
const SAVE_PROGRESS: u8 = 94;

/// Assumed speaking rate for the duration estimate. Estimated from the
/// script's word count, never measured from decoded audio.
const WORDS_PER_SECOND: f64 = 2.5;

/// How long terminal status and notification stay visible before clearing.
const RESET_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_folder: String,
    pub script_timeout: Duration,
    pub synthesis_timeout: Duration,
    pub synthesis_cycles: u32,
    pub retry_base_delay: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let gen = &config.generation;
        Self {
            output_folder: config.output_folder.clone(),
            script_timeout: Duration::from_secs(gen.script_timeout_seconds),
            synthesis_timeout: Duration::from_secs(gen.synthesis_timeout_seconds),
            synthesis_cycles: gen.synthesis_cycles,
            retry_base_delay: Duration::from_secs(gen.retry_delay_seconds),
        }
    }
}

/// Runs one generation job at a time: write the script, parse it into
/// segments, synthesize each segment through the provider fallback chain,
/// assemble the audio, persist the overview. Collaborators observe progress
/// through the state watch channel; cancellation is cooperative and checked
/// at the loop boundaries.
pub struct GenerationPipeline {
    settings: PipelineSettings,
    llm: Arc<dyn LlmClient>,
    tts: TtsRegistry,
    artifacts: Arc<dyn ArtifactStore>,
    jobs: Arc<dyn KvStore>,
    wake_lock: Arc<dyn WakeLock>,
    notifier: Arc<dyn ProgressNotifier>,
    state: StateHandle,
}

fn new_job_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(12)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn sanitize_title(title: &str) -> String {
    let mut out = String::new();
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
        if out.len() >= 40 {
            break;
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "deep-dive".to_string()
    } else {
        out
    }
}

fn estimate_duration_seconds(words: usize) -> u64 {
    (words as f64 / WORDS_PER_SECOND).round() as u64
}

impl GenerationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: PipelineSettings,
        llm: Arc<dyn LlmClient>,
        tts: TtsRegistry,
        artifacts: Arc<dyn ArtifactStore>,
        jobs: Arc<dyn KvStore>,
        wake_lock: Arc<dyn WakeLock>,
        notifier: Arc<dyn ProgressNotifier>,
        state: StateHandle,
    ) -> Self {
        Self {
            settings,
            llm,
            tts,
            artifacts,
            jobs,
            wake_lock,
            notifier,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    /// Sets the cooperative cancellation flag. In-flight provider calls are
    /// not aborted; the job stops at its next checkpoint.
    pub fn cancel(&self) {
        self.state.request_cancel();
    }

    /// Runs one job to a terminal state. Callers must not start a second
    /// job while one is active.
    pub async fn run(&self, request: GenerationRequest) -> Result<AudioOverview> {
        let job_id = new_job_id();
        let cancel = self.state.begin_job();
        self.wake_lock.acquire();

        let result = self.execute(&request, &job_id, &cancel).await;

        // Device resources go first, then the terminal transition.
        self.wake_lock.release();
        if let Err(e) = self.jobs.delete(&JobRecord::key(&job_id)).await {
            warn!("failed to remove job record: {:#}", e);
        }

        let terminal = match &result {
            Ok(overview) => {
                let message = format!("\"{}\" is ready", overview.title);
                self.state
                    .publish(GenerationStatus::Completed, 100, message.as_str());
                self.notifier.notify(&message, 100);
                info!("{}", message);
                GenerationStatus::Completed
            }
            Err(e) if is_cancellation(e) => {
                let progress = self.state.snapshot().progress;
                self.state
                    .publish(GenerationStatus::Cancelled, progress, "Generation cancelled");
                info!("generation cancelled");
                GenerationStatus::Cancelled
            }
            Err(e) => {
                let message = format!("Generation failed: {:#}", e);
                let progress = self.state.snapshot().progress;
                self.state
                    .publish(GenerationStatus::Failed, progress, message.as_str());
                warn!("{}", message);
                GenerationStatus::Failed
            }
        };

        // Keep the terminal status visible briefly, then dismiss and clear.
        let state = self.state.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESET_DELAY).await;
            notifier.hide();
            state.reset_if(terminal);
        });

        result
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AudioOverview> {
        self.update_phase(
            job_id,
            &request.title,
            GenerationStatus::WritingScript,
            SCRIPT_PROGRESS,
            "Writing the script",
        )
        .await;

        let script_policy = RetryPolicy::single_attempt(self.settings.script_timeout);
        let raw = script::write_script(self.llm.clone(), request, &script_policy, cancel).await?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }

        let segments = match request.mode {
            OverviewMode::Dialogue => script::parse_dialogue_script(&raw)
                .context("script generation produced no usable script")?,
            OverviewMode::Monologue => vec![ScriptSegment {
                speaker: request
                    .hosts
                    .first()
                    .cloned()
                    .unwrap_or_else(|| script::DEFAULT_SPEAKER.to_string()),
                text: raw.trim().to_string(),
            }],
        };

        let total = segments.len();
        self.update_phase(
            job_id,
            &request.title,
            GenerationStatus::Synthesizing,
            SYNTH_LOWER,
            &format!("Synthesizing {} segments", total),
        )
        .await;

        let chain = self.tts.chain();
        let encoding = chain
            .first()
            .map(|c| c.encoding())
            .ok_or_else(|| PipelineError::Configuration("tts provider".to_string()))?;
        let policy = RetryPolicy {
            max_cycles: self.settings.synthesis_cycles,
            attempt_timeout: self.settings.synthesis_timeout,
            base_delay: self.settings.retry_base_delay,
        };

        let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(total);
        let mut succeeded = 0usize;

        for (i, segment) in segments.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled.into());
            }

            let span = (SYNTH_UPPER - SYNTH_LOWER) as usize;
            let progress = SYNTH_LOWER + (span * i / total) as u8;
            let message = format!("Synthesizing segment {}/{}", i + 1, total);
            self.state
                .publish(GenerationStatus::Synthesizing, progress, message.as_str());
            self.notifier.notify(&message, progress);

            let role = assign_voice_role(&segment.speaker, &request.hosts);
            let attempts: Vec<Attempt<Vec<u8>>> = chain
                .iter()
                .map(|client| {
                    let client = client.clone();
                    let text = segment.text.clone();
                    let attempt: Attempt<Vec<u8>> = Box::new(move || {
                        let client = client.clone();
                        let text = text.clone();
                        Box::pin(async move {
                            let voice = client.voice_for(role);
                            client.synthesize(&text, &voice).await
                        })
                    });
                    attempt
                })
                .collect();

            match invoke_with_fallbacks("speech synthesis", &policy, cancel, &attempts).await {
                Ok(bytes) => {
                    chunks.push(bytes);
                    succeeded += 1;
                }
                Err(e) if is_cancellation(&e) => return Err(e),
                // Soft failure: skip the segment, keep the job alive.
                Err(e) => warn!("segment {}/{} failed, continuing: {:#}", i + 1, total, e),
            }
        }

        if succeeded == 0 {
            return Err(PipelineError::AllSegmentsFailed.into());
        }
        info!("synthesized {}/{} segments", succeeded, total);

        self.update_phase(
            job_id,
            &request.title,
            GenerationStatus::Assembling,
            ASSEMBLE_PROGRESS,
            "Assembling audio",
        )
        .await;
        let data = audio::assemble(&chunks, &encoding);

        self.update_phase(
            job_id,
            &request.title,
            GenerationStatus::Saving,
            SAVE_PROGRESS,
            "Saving deep dive",
        )
        .await;

        tokio::fs::create_dir_all(&self.settings.output_folder).await?;
        let file_name = format!(
            "{}_{}.{}",
            sanitize_title(&request.title),
            job_id,
            encoding.file_extension()
        );
        let file_path = Path::new(&self.settings.output_folder).join(file_name);
        tokio::fs::write(&file_path, &data)
            .await
            .context("Failed to write audio file")?;

        let overview = AudioOverview {
            id: job_id.to_string(),
            title: request.title.clone(),
            file_path: file_path.to_string_lossy().into_owned(),
            duration_seconds: estimate_duration_seconds(script::total_words(&segments)),
            created_at: Utc::now(),
            offline: true,
        };
        self.artifacts
            .persist(&overview)
            .await
            .context("Failed to persist audio overview")?;

        Ok(overview)
    }

    /// Publishes a phase transition and mirrors it into the job record.
    /// Record writes are metadata only; failures are logged, never fatal.
    async fn update_phase(
        &self,
        job_id: &str,
        title: &str,
        status: GenerationStatus,
        progress: u8,
        message: &str,
    ) {
        self.state.publish(status, progress, message);
        self.notifier.notify(message, progress);

        let record = JobRecord {
            job_id: job_id.to_string(),
            title: title.to_string(),
            status,
            updated_at: Utc::now(),
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.jobs.write(&JobRecord::key(job_id), &bytes).await {
                    warn!("failed to record job state: {:#}", e);
                }
            }
            Err(e) => warn!("failed to encode job record: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioEncoding;
    use crate::script::SourceDocument;
    use crate::tts::{TtsClient, TtsProviderId, VoiceRole};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct MockLlm {
        script: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn chat(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.script.clone())
        }
    }

    struct MockTts {
        id: TtsProviderId,
        encoding: AudioEncoding,
        payload: Option<Vec<u8>>, // None = always fail
        fail_first: usize,        // fail this many own calls before succeeding
        calls: Arc<Mutex<Vec<TtsProviderId>>>,
        cancel_after: Option<(usize, StateHandle)>,
    }

    #[async_trait]
    impl TtsClient for MockTts {
        fn provider_id(&self) -> TtsProviderId {
            self.id
        }
        fn encoding(&self) -> AudioEncoding {
            self.encoding
        }
        fn voice_for(&self, _role: VoiceRole) -> String {
            "mock-voice".to_string()
        }
        async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>> {
            let (call_count, own_calls) = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(self.id);
                let own = calls.iter().filter(|id| **id == self.id).count();
                (calls.len(), own)
            };
            match &self.payload {
                Some(bytes) if own_calls > self.fail_first => {
                    if let Some((after, state)) = &self.cancel_after {
                        if call_count >= *after {
                            state.request_cancel();
                        }
                    }
                    Ok(bytes.clone())
                }
                Some(_) => Err(anyhow!("mock provider warming up")),
                None => Err(anyhow!("mock provider down")),
            }
        }
    }

    struct MemoryArtifacts {
        overviews: Mutex<Vec<AudioOverview>>,
    }

    #[async_trait]
    impl ArtifactStore for MemoryArtifacts {
        async fn persist(&self, overview: &AudioOverview) -> Result<()> {
            self.overviews.lock().unwrap().push(overview.clone());
            Ok(())
        }
        async fn list(&self) -> Result<Vec<AudioOverview>> {
            Ok(self.overviews.lock().unwrap().clone())
        }
        async fn delete(&self, id: &str) -> Result<()> {
            self.overviews.lock().unwrap().retain(|o| o.id != id);
            Ok(())
        }
    }

    struct MemoryKv {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }
        async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct RecordingWakeLock {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl WakeLock for RecordingWakeLock {
        fn acquire(&self) {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }
        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SilentNotifier;

    impl ProgressNotifier for SilentNotifier {
        fn notify(&self, _message: &str, _percent: u8) {}
        fn hide(&self) {}
    }

    // Four alternating segments, five words each: 20 words total.
    const DIALOGUE_SCRIPT: &str = r#"[
        {"speaker": "Alex", "text": "one two three four five"},
        {"speaker": "Jamie", "text": "one two three four five"},
        {"speaker": "Alex", "text": "one two three four five"},
        {"speaker": "Jamie", "text": "one two three four five"}
    ]"#;

    fn request(mode: OverviewMode) -> GenerationRequest {
        GenerationRequest {
            title: "Test Deep Dive".to_string(),
            mode,
            topic: None,
            hosts: vec!["Alex".to_string(), "Jamie".to_string()],
            sources: vec![SourceDocument {
                name: "notes.txt".to_string(),
                content: "Some source material worth discussing.".to_string(),
            }],
        }
    }

    struct Harness {
        pipeline: GenerationPipeline,
        state: StateHandle,
        artifacts: Arc<MemoryArtifacts>,
        jobs: Arc<MemoryKv>,
        wake_lock: Arc<RecordingWakeLock>,
        llm_calls: Arc<AtomicUsize>,
        _output: tempfile::TempDir,
        output_path: std::path::PathBuf,
    }

    fn harness(script: &str, clients: Vec<Arc<dyn TtsClient>>, preferred: TtsProviderId) -> Harness {
        let output = tempfile::tempdir().unwrap();
        let output_path = output.path().to_path_buf();
        let settings = PipelineSettings {
            output_folder: output_path.to_string_lossy().into_owned(),
            script_timeout: Duration::from_secs(5),
            synthesis_timeout: Duration::from_secs(5),
            synthesis_cycles: 1,
            retry_base_delay: Duration::from_millis(1),
        };

        let llm_calls = Arc::new(AtomicUsize::new(0));
        let llm = Arc::new(MockLlm {
            script: script.to_string(),
            calls: llm_calls.clone(),
        });
        let state = StateHandle::new();
        let artifacts = Arc::new(MemoryArtifacts {
            overviews: Mutex::new(Vec::new()),
        });
        let jobs = Arc::new(MemoryKv {
            entries: Mutex::new(HashMap::new()),
        });
        let wake_lock = Arc::new(RecordingWakeLock {
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        });

        let pipeline = GenerationPipeline::new(
            settings,
            llm,
            TtsRegistry::new(clients, preferred).unwrap(),
            artifacts.clone(),
            jobs.clone(),
            wake_lock.clone(),
            Arc::new(SilentNotifier),
            state.clone(),
        );

        Harness {
            pipeline,
            state,
            artifacts,
            jobs,
            wake_lock,
            llm_calls,
            _output: output,
            output_path,
        }
    }

    fn mp3_mock(
        id: TtsProviderId,
        payload: Option<&[u8]>,
        calls: Arc<Mutex<Vec<TtsProviderId>>>,
    ) -> Arc<dyn TtsClient> {
        Arc::new(MockTts {
            id,
            encoding: AudioEncoding::Mp3,
            payload: payload.map(|p| p.to_vec()),
            fail_first: 0,
            calls,
            cancel_after: None,
        })
    }

    #[tokio::test]
    async fn test_successful_dialogue_job_end_to_end() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let h = harness(
            DIALOGUE_SCRIPT,
            vec![mp3_mock(TtsProviderId::GptSovits, Some(b"AUDIO"), calls.clone())],
            TtsProviderId::GptSovits,
        );

        let overview = h.pipeline.run(request(OverviewMode::Dialogue)).await.unwrap();

        // 20 words at 2.5 words/second.
        assert_eq!(overview.duration_seconds, 8);
        assert!(overview.offline);

        let written = std::fs::read(&overview.file_path).unwrap();
        assert_eq!(written.len(), 4 * b"AUDIO".len());

        let snapshot = h.state.snapshot();
        assert_eq!(snapshot.status, GenerationStatus::Completed);
        assert_eq!(snapshot.progress, 100);

        assert_eq!(h.llm_calls.load(Ordering::SeqCst), 1);
        assert_eq!(calls.lock().unwrap().len(), 4);
        assert_eq!(h.artifacts.list().await.unwrap().len(), 1);
        // Job record removed at the end of the job.
        assert!(h.jobs.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_output_and_attempt_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let h = harness(
            DIALOGUE_SCRIPT,
            vec![
                mp3_mock(TtsProviderId::GptSovits, None, calls.clone()),
                mp3_mock(TtsProviderId::OpenaiSpeech, Some(b"FB!"), calls.clone()),
            ],
            TtsProviderId::GptSovits,
        );

        let overview = h.pipeline.run(request(OverviewMode::Dialogue)).await.unwrap();

        // Assembled bytes are exactly the fallback outputs, concatenated.
        let written = std::fs::read(&overview.file_path).unwrap();
        assert_eq!(written, b"FB!FB!FB!FB!".to_vec());

        // For every segment the primary was attempted before the fallback.
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 8);
        for pair in calls.chunks(2) {
            assert_eq!(pair[0], TtsProviderId::GptSovits);
            assert_eq!(pair[1], TtsProviderId::OpenaiSpeech);
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_segments() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = StateHandle::new();

        let output = tempfile::tempdir().unwrap();
        let settings = PipelineSettings {
            output_folder: output.path().to_string_lossy().into_owned(),
            script_timeout: Duration::from_secs(5),
            synthesis_timeout: Duration::from_secs(5),
            synthesis_cycles: 3,
            retry_base_delay: Duration::from_millis(1),
        };
        let wake_lock = Arc::new(RecordingWakeLock {
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        });
        let artifacts = Arc::new(MemoryArtifacts {
            overviews: Mutex::new(Vec::new()),
        });

        // Cancel is requested while the second segment's call is in flight.
        let tts: Arc<dyn TtsClient> = Arc::new(MockTts {
            id: TtsProviderId::QwenTts,
            encoding: AudioEncoding::Mp3,
            payload: Some(b"OK".to_vec()),
            fail_first: 0,
            calls: calls.clone(),
            cancel_after: Some((2, state.clone())),
        });

        let pipeline = GenerationPipeline::new(
            settings,
            Arc::new(MockLlm {
                script: DIALOGUE_SCRIPT.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            TtsRegistry::new(vec![tts], TtsProviderId::QwenTts).unwrap(),
            artifacts.clone(),
            Arc::new(MemoryKv {
                entries: Mutex::new(HashMap::new()),
            }),
            wake_lock.clone(),
            Arc::new(SilentNotifier),
            state.clone(),
        );

        let err = pipeline.run(request(OverviewMode::Dialogue)).await.unwrap_err();
        assert!(is_cancellation(&err));

        // Segments 3 and 4 never reached a provider.
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(state.snapshot().status, GenerationStatus::Cancelled);
        assert_eq!(wake_lock.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(wake_lock.released.load(Ordering::SeqCst), 1);
        assert!(artifacts.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_segments_failing_fails_the_job() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let h = harness(
            DIALOGUE_SCRIPT,
            vec![mp3_mock(TtsProviderId::GptSovits, None, calls.clone())],
            TtsProviderId::GptSovits,
        );

        let err = h.pipeline.run(request(OverviewMode::Dialogue)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::AllSegmentsFailed)
        ));

        assert_eq!(h.state.snapshot().status, GenerationStatus::Failed);
        assert!(h.artifacts.list().await.unwrap().is_empty());
        // Every segment was still attempted before giving up.
        assert_eq!(calls.lock().unwrap().len(), 4);
        // No audio file was written.
        assert_eq!(std::fs::read_dir(&h.output_path).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_partial_segment_failure_is_soft() {
        // The only provider fails for the first segment and recovers; the
        // job must skip that segment and still complete with the rest.
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tts: Arc<dyn TtsClient> = Arc::new(MockTts {
            id: TtsProviderId::GptSovits,
            encoding: AudioEncoding::Mp3,
            payload: Some(b"X".to_vec()),
            fail_first: 1,
            calls: calls.clone(),
            cancel_after: None,
        });
        let h = harness(DIALOGUE_SCRIPT, vec![tts], TtsProviderId::GptSovits);

        let overview = h.pipeline.run(request(OverviewMode::Dialogue)).await.unwrap();
        let written = std::fs::read(&overview.file_path).unwrap();
        assert_eq!(written, b"XXX".to_vec());
        assert_eq!(h.state.snapshot().status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn test_raw_path_wraps_pcm_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pcm_payload = vec![1u8, 2, 3, 4];
        let tts: Arc<dyn TtsClient> = Arc::new(MockTts {
            id: TtsProviderId::QwenTts,
            encoding: AudioEncoding::Pcm16 {
                sample_rate: 8_000,
                channels: 1,
            },
            payload: Some(pcm_payload.clone()),
            fail_first: 0,
            calls: calls.clone(),
            cancel_after: None,
        });
        let h = harness(DIALOGUE_SCRIPT, vec![tts], TtsProviderId::QwenTts);

        let overview = h.pipeline.run(request(OverviewMode::Dialogue)).await.unwrap();
        assert!(overview.file_path.ends_with(".wav"));

        let written = std::fs::read(&overview.file_path).unwrap();
        let (spec, data) = crate::audio::extract_pcm(&written).unwrap();
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(data.len(), 4 * pcm_payload.len());
    }

    #[tokio::test]
    async fn test_monologue_synthesizes_single_segment() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let h = harness(
            "A single narrated passage about the sources.",
            vec![mp3_mock(TtsProviderId::OpenaiSpeech, Some(b"MONO"), calls.clone())],
            TtsProviderId::OpenaiSpeech,
        );

        let overview = h.pipeline.run(request(OverviewMode::Monologue)).await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
        let written = std::fs::read(&overview.file_path).unwrap();
        assert_eq!(written, b"MONO".to_vec());
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("My Deep Dive!"), "my-deep-dive");
        assert_eq!(sanitize_title("   "), "deep-dive");
        assert_eq!(sanitize_title("Rust & Audio: Part 2"), "rust-audio-part-2");
    }

    #[test]
    fn test_duration_estimate_rounds() {
        assert_eq!(estimate_duration_seconds(20), 8);
        assert_eq!(estimate_duration_seconds(0), 0);
        // 11 words / 2.5 = 4.4 -> 4; 12 / 2.5 = 4.8 -> 5.
        assert_eq!(estimate_duration_seconds(11), 4);
        assert_eq!(estimate_duration_seconds(12), 5);
    }
}
