use thiserror::Error;

/// Failures that cross the pipeline's public boundary.
///
/// Everything else degrades in place: extraction failures fall back to a
/// question-only query, semantic failures become an empty document list, and
/// per-category analytical failures are flagged in `partial_failures`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The embedding call or vector index is unreachable. Callers treat this
    /// as "zero documents", never as a fatal error.
    #[error("retrieval backend unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The synthesis call failed after its single bounded retry. This is the
    /// only request-fatal pipeline failure.
    #[error("answer synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Service handles could not be constructed. Latched until an explicit
    /// re-initialization.
    #[error("service connections unavailable: {0}")]
    ServiceUnavailable(String),
}
