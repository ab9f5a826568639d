//! Answer synthesis: one LLM call over the rendered ContextBundle, with a
//! groundedness pass on the returned citations.
//!
//! This is the only pipeline stage whose failure is request-fatal, and only
//! after a single bounded retry.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::PipelineError;
use crate::llm::{ChatModel, GenerationOptions};
use crate::pipeline::aggregate::render_context;
use crate::types::{Answer, ContextBundle};

/// Inline references shaped like bill numbers ("H.R. 2468", "S. 99",
/// "H.J.Res. 7"). Used to recover citations when the model omits the
/// SOURCES line.
static BILL_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:H\.?\s?R\.?|S\.?|H\.?\s?J\.?\s?Res\.?|S\.?\s?J\.?\s?Res\.?)\s?\d+\b")
        .expect("bill reference regex is valid")
});

const INSUFFICIENT_MARKER: &str = "INSUFFICIENT_DATA";

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are a non-partisan political analyst. Answer the user's question using ONLY the evidence provided.

RULES:
- Every factual claim must be traceable to a specific item in the evidence.
- Copy bill numbers, dollar amounts, and vote counts verbatim from the evidence. Never round, re-compute, or paraphrase numbers.
- Cite evidence inline by its reference id (the bracketed bill number or the donor name).
- If the evidence cannot answer the question, reply with the single word INSUFFICIENT_DATA on the first line, followed by one sentence naming what is missing.
- A source listed under DEGRADED SOURCES was unavailable for this request; if it would have been needed, say so instead of guessing.
- Maintain a neutral, analytical tone.
- End your reply with one final line of the form:
  SOURCES: <reference id>; <reference id>; ...
  listing only reference ids that appear in the evidence. If you cited nothing, end with "SOURCES:" alone."#;

pub struct SynthesisEngine {
    chat: Arc<dyn ChatModel>,
    options: GenerationOptions,
    timeout: Duration,
    summary_snippet_chars: usize,
}

impl SynthesisEngine {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        model: String,
        timeout: Duration,
        summary_snippet_chars: usize,
    ) -> Self {
        Self {
            chat,
            options: GenerationOptions {
                model,
                max_tokens: 1500,
                temperature: 0.5,
            },
            timeout,
            summary_snippet_chars,
        }
    }

    /// Produce a grounded answer from the bundle.
    ///
    /// An empty bundle resolves to the terminal insufficient-data answer
    /// without an LLM call. A transient failure gets one retry; a second
    /// failure surfaces as `SynthesisFailed`.
    pub async fn synthesize(&self, bundle: &ContextBundle) -> Result<Answer, PipelineError> {
        if bundle.is_empty() {
            tracing::debug!("Empty context bundle, returning insufficient-data answer");
            return Ok(Answer::insufficient());
        }

        let user = self.build_prompt(bundle);
        let raw = self.call_with_retry(&user).await?;
        Ok(ground_answer(&raw, bundle))
    }

    fn build_prompt(&self, bundle: &ContextBundle) -> String {
        format!(
            "User question: \"{}\"\n\n{}\nAnswer the question from this evidence.",
            bundle.original_question,
            render_context(bundle, self.summary_snippet_chars)
        )
    }

    async fn call_with_retry(&self, user: &str) -> Result<String, PipelineError> {
        let first = tokio::time::timeout(
            self.timeout,
            self.chat.complete(SYNTHESIS_SYSTEM_PROMPT, user, &self.options),
        )
        .await;

        let first_error = match first {
            Ok(Ok(raw)) => return Ok(raw),
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => "synthesis call timed out".to_string(),
        };
        tracing::warn!(error = %first_error, "Synthesis call failed, retrying once");

        let second = tokio::time::timeout(
            self.timeout,
            self.chat.complete(SYNTHESIS_SYSTEM_PROMPT, user, &self.options),
        )
        .await;

        match second {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(PipelineError::SynthesisFailed(format!("{:#}", e))),
            Err(_) => Err(PipelineError::SynthesisFailed(
                "synthesis call timed out after retry".to_string(),
            )),
        }
    }
}

/// Split the model output into answer text and citations, keeping only
/// citations that resolve against the bundle's source registry.
fn ground_answer(raw: &str, bundle: &ContextBundle) -> Answer {
    let (body, cited) = split_sources_line(raw);

    let insufficient = body
        .trim_start()
        .to_uppercase()
        .starts_with(INSUFFICIENT_MARKER);

    let candidates = if cited.is_empty() {
        // No SOURCES line: fall back to scanning the body for inline
        // bill-number references.
        BILL_REFERENCE_RE
            .find_iter(&body)
            .map(|m| m.as_str().to_string())
            .collect()
    } else {
        cited
    };

    let mut citations: Vec<String> = Vec::new();
    for candidate in candidates {
        match bundle.find_source(&candidate) {
            Some(source) => {
                if !citations.contains(&source.id) {
                    citations.push(source.id.clone());
                }
            }
            None => {
                tracing::warn!(
                    citation = %candidate,
                    "Dropping citation not present in the context bundle"
                );
            }
        }
    }

    Answer {
        text: body.trim().to_string(),
        citations,
        insufficient_data: insufficient,
    }
}

/// Separate the terminal "SOURCES: a; b; c" line from the answer body.
fn split_sources_line(raw: &str) -> (String, Vec<String>) {
    let mut body_lines: Vec<&str> = Vec::new();
    let mut cited: Vec<String> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("SOURCES:") {
            cited.extend(
                rest.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        } else {
            body_lines.push(line);
        }
    }

    (body_lines.join("\n"), cited)
}
