use crate::llm::LlmClient;
use crate::retry::{invoke_with_fallbacks, Attempt, RetryPolicy};
use anyhow::{bail, Result};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Hard cap on concatenated source text. Content past the cap is dropped,
/// not summarized.
pub const MAX_SOURCE_CHARS: usize = 30_000;

/// Speaker label used when a record omits one and for the whole-text
/// fallback segment.
pub const DEFAULT_SPEAKER: &str = "Host";

/// Source blocks whose content matches one of these markers carry no real
/// text (extraction placeholders) and are excluded before concatenation.
const PLACEHOLDER_MARKERS: &[&str] = &["[content unavailable]", "[unsupported file]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewMode {
    Monologue,
    Dialogue,
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub title: String,
    pub mode: OverviewMode,
    pub topic: Option<String>,
    pub hosts: Vec<String>,
    pub sources: Vec<SourceDocument>,
}

/// One attributed unit of script text, synthesized as a single audio chunk.
/// Order is playback order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptSegment {
    pub speaker: String,
    pub text: String,
}

fn is_placeholder(content: &str) -> bool {
    let trimmed = content.trim();
    let lower = trimmed.to_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|m| lower.starts_with(m))
}

/// Concatenates usable source blocks, blank-line separated, capped at
/// `MAX_SOURCE_CHARS` characters.
pub fn combined_source_text(sources: &[SourceDocument]) -> String {
    let combined = sources
        .iter()
        .filter(|s| !s.content.trim().is_empty() && !is_placeholder(&s.content))
        .map(|s| s.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    combined.chars().take(MAX_SOURCE_CHARS).collect()
}

/// Builds the (system, user) prompt pair for the requested mode.
pub fn build_script_prompt(request: &GenerationRequest, source_text: &str) -> (String, String) {
    let topic_line = request
        .topic
        .as_deref()
        .map(|t| format!("Focus the discussion on: {}.\n", t))
        .unwrap_or_default();

    match request.mode {
        OverviewMode::Dialogue => {
            let host_a = request.hosts.first().map(String::as_str).unwrap_or("Alex");
            let host_b = request.hosts.get(1).map(String::as_str).unwrap_or("Jamie");
            let system =
                "You are a scriptwriter for a two-host audio show. Respond with valid JSON only."
                    .to_string();
            let user = format!(
                "Write a lively \"deep dive\" conversation between two hosts, {host_a} and \
                {host_b}, discussing the source material below. Title: \"{title}\".\n{topic}\
                Rules:\n\
                1. Return ONLY a JSON array of objects of the form \
                {{\"speaker\": \"...\", \"text\": \"...\"}}.\n\
                2. The \"speaker\" field must be exactly \"{host_a}\" or \"{host_b}\".\n\
                3. Alternate speakers naturally; keep each turn to a few sentences.\n\
                4. No markdown, no commentary, nothing before or after the array.\n\n\
                Source material:\n{source}",
                host_a = host_a,
                host_b = host_b,
                title = request.title,
                topic = topic_line,
                source = source_text,
            );
            (system, user)
        }
        OverviewMode::Monologue => {
            let system = "You are a narrator producing audio essays.".to_string();
            let user = format!(
                "Write a single continuous narrated passage summarizing and exploring the \
                source material below, titled \"{title}\".\n{topic}\
                Plain spoken prose only: no headings, no lists, no stage directions.\n\n\
                Source material:\n{source}",
                title = request.title,
                topic = topic_line,
                source = source_text,
            );
            (system, user)
        }
    }
}

/// Invokes the language model once, under a single long deadline, through
/// the shared retry invoker. An empty result is a failure, never a valid
/// empty script.
pub async fn write_script(
    llm: Arc<dyn LlmClient>,
    request: &GenerationRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    let source_text = combined_source_text(&request.sources);
    if source_text.is_empty() {
        bail!("no readable source content to write a script from");
    }

    let (system, user) = build_script_prompt(request, &source_text);
    debug!("script prompt: {} chars", user.chars().count());

    let attempt: Attempt<String> = Box::new(move || {
        let llm = llm.clone();
        let system = system.clone();
        let user = user.clone();
        Box::pin(async move { llm.chat(&system, &user).await })
    });

    let raw = invoke_with_fallbacks("script generation", policy, cancel, &[attempt]).await?;
    if raw.trim().is_empty() {
        bail!("language model returned an empty script");
    }
    Ok(raw)
}

pub fn strip_code_fences(s: &str) -> String {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Opening fence may carry a language tag on the same line.
        let rest = match rest.split_once('\n') {
            Some((_tag, body)) => body,
            None => rest,
        };
        rest.trim_end_matches('`').trim().to_string()
    } else {
        s.to_string()
    }
}

fn repair_json(s: &str) -> Result<String> {
    // The single defect worth repairing: a trailing comma right before a
    // closing bracket or brace.
    let re = Regex::new(r",\s*([\]\}])")?;
    Ok(re.replace_all(s, "$1").into_owned())
}

#[derive(Deserialize)]
struct RawSegment {
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    text: String,
}

/// Layer 1: structured extraction of a JSON array of records.
fn parse_structured(raw: &str) -> Option<Vec<ScriptSegment>> {
    let text = strip_code_fences(raw);

    let start = text.find('[')?;
    // A long prose preamble means the bracket is probably not ours.
    if text[..start].trim().chars().count() >= 100 {
        return None;
    }
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }

    let candidate = repair_json(&text[start..=end]).ok()?;
    let records: Vec<RawSegment> = serde_json::from_str(&candidate).ok()?;

    let segments: Vec<ScriptSegment> = records
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .map(|r| ScriptSegment {
            speaker: r
                .speaker
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
            text: r.text.trim().to_string(),
        })
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Layer 2: line-wise "label: text" extraction, tolerating markdown markup
/// around the label.
fn parse_labeled_lines(raw: &str) -> Option<Vec<ScriptSegment>> {
    let line_re = Regex::new(r"^[\s*_\[#>-]*([^:*_\[\]]{1,48}?)[\s*_\]]*:\s*(.+)$").ok()?;

    let mut segments = Vec::new();
    for line in raw.lines() {
        if let Some(caps) = line_re.captures(line) {
            let label = caps[1].trim();
            let rest = caps[2].trim_start_matches(['*', '_', ' ']).trim();
            // Guard against URLs ("http://...") and empty captures.
            if label.is_empty()
                || rest.is_empty()
                || rest.starts_with("//")
                || !label.chars().any(|c| c.is_alphabetic())
            {
                continue;
            }
            segments.push(ScriptSegment {
                speaker: label.to_string(),
                text: rest.to_string(),
            });
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Layer 3: the whole text as one segment, skipping an obvious one-line
/// format-name preamble ("json", "Here is the script:") when present.
fn fallback_single_segment(raw: &str) -> ScriptSegment {
    let trimmed = raw.trim();
    let text = match trimmed.split_once('\n') {
        Some((first, rest)) => {
            let first = first.trim();
            let looks_like_preamble = first.chars().count() <= 30
                && (first.eq_ignore_ascii_case("json") || first.ends_with(':'))
                && !rest.trim().is_empty();
            if looks_like_preamble {
                rest.trim()
            } else {
                trimmed
            }
        }
        None => trimmed,
    };

    ScriptSegment {
        speaker: DEFAULT_SPEAKER.to_string(),
        text: text.to_string(),
    }
}

/// Converts raw model output into ordered segments: structured extraction,
/// then pattern extraction, then the single-segment fallback. Always yields
/// at least one non-empty segment; only genuinely empty input is an error,
/// and it must surface as a script-generation failure.
pub fn parse_dialogue_script(raw: &str) -> Result<Vec<ScriptSegment>> {
    if raw.trim().is_empty() {
        bail!("script text is empty");
    }

    if let Some(segments) = parse_structured(raw) {
        debug!("structured extraction yielded {} segments", segments.len());
        return Ok(segments);
    }
    if let Some(segments) = parse_labeled_lines(raw) {
        debug!("pattern extraction yielded {} segments", segments.len());
        return Ok(segments);
    }

    Ok(vec![fallback_single_segment(raw)])
}

/// Counts words across the whole script, for the spoken-duration estimate.
pub fn total_words(segments: &[ScriptSegment]) -> usize {
    segments
        .iter()
        .map(|s| s.text.split_whitespace().count())
        .sum()
}
