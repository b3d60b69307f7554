mod audio;
mod config;
mod device;
mod error;
mod llm;
mod pipeline;
mod retry;
mod script;
mod state;
mod store;
mod tts;

use anyhow::Result;
use config::Config;
use device::{LogNotifier, NoopWakeLock};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{GenerationPipeline, PipelineSettings};
use script::{GenerationRequest, SourceDocument};
use state::StateHandle;
use std::sync::Arc;
use store::{ArtifactStore, DirKvStore, JsonArtifactStore};
use tts::TtsRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid LLM and TTS settings.");
            return Err(e);
        }
    };
    config.ensure_directories()?;

    let title = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Deep Dive".to_string());

    let sources = load_sources(&config.input_folder).await?;
    if sources.is_empty() {
        anyhow::bail!(
            "No .txt or .md sources found in '{}'. Add some documents first.",
            config.input_folder
        );
    }
    println!("Loaded {} source document(s).", sources.len());

    let request = GenerationRequest {
        title,
        mode: config.generation.mode,
        topic: config.generation.topic.clone(),
        hosts: config.generation.hosts.clone(),
        sources,
    };

    let llm = llm::create_llm(&config)?;
    let registry = TtsRegistry::from_config(&config)?;
    let kv = Arc::new(DirKvStore::new(&config.data_folder));
    let artifacts = Arc::new(JsonArtifactStore::new(kv.clone()));

    let state = StateHandle::new();
    let pipeline = Arc::new(GenerationPipeline::new(
        PipelineSettings::from_config(&config),
        llm,
        registry,
        artifacts.clone(),
        kv,
        Arc::new(NoopWakeLock),
        Arc::new(LogNotifier),
        state,
    ));

    // Render job state as a progress bar until the job goes terminal.
    let mut rx = pipeline.subscribe();
    let bar_task = tokio::spawn(async move {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}") {
            bar.set_style(style);
        }
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            bar.set_position(snapshot.progress as u64);
            bar.set_message(snapshot.message.clone());
            if snapshot.status.is_terminal() {
                break;
            }
        }
        bar.finish_and_clear();
    });

    {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancellation requested; letting the current call finish...");
                pipeline.cancel();
            }
        });
    }

    let overview = match pipeline.run(request).await {
        Ok(overview) => overview,
        Err(e) if error::is_cancellation(&e) => {
            let _ = bar_task.await;
            println!("Generation cancelled.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let _ = bar_task.await;

    println!(
        "Deep dive ready: {} (~{}s estimated)",
        overview.file_path, overview.duration_seconds
    );
    println!(
        "{} audio overview(s) in the library.",
        artifacts.list().await?.len()
    );
    Ok(())
}

async fn load_sources(folder: &str) -> Result<Vec<SourceDocument>> {
    let mut paths = Vec::new();
    let mut dir = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path
            .extension()
            .map_or(false, |ext| ext == "txt" || ext == "md")
        {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sources = Vec::new();
    for path in paths {
        let content = tokio::fs::read_to_string(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        sources.push(SourceDocument { name, content });
    }
    Ok(sources)
}
