//! Token cost estimation for admission control
//!
//! Every unit of work claims an estimated token cost against the global
//! budget before it may call the model provider. Estimators come in two
//! tiers:
//! - **Exact**: the provider's own BPE via tiktoken (OpenAI encodings)
//! - **Heuristic**: conservative character-based estimation for models
//!   without a bundled encoding
//!
//! Estimation must never fail a batch: the [`Estimator`] facade falls back
//! to a fixed conservative estimate when the underlying encoder errors.

use globset::{Glob, GlobMatcher};
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;

/// Fixed conservative estimate used when the encoder is unavailable.
pub const FALLBACK_ESTIMATE_TOKENS: u32 = 1000;

/// Errors that can occur during token estimation
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// Failed to encode text
    #[error("Token estimation failed: {0}")]
    Encoding(String),

    /// Failed to compile glob pattern
    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] globset::Error),
}

/// Trait for token estimation implementations.
///
/// Estimators are shared across concurrent admission checks and must be
/// thread-safe. Estimation is pure and performs no I/O.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the token cost of the provided text
    fn estimate(&self, text: &str) -> Result<u32, EstimatorError>;

    /// Human-readable name for logging and debugging
    fn name(&self) -> &str;
}

/// Exact estimator backed by a tiktoken encoding
pub struct TiktokenEstimator {
    encoding: CoreBPE,
    name: &'static str,
}

impl TiktokenEstimator {
    /// Create estimator for GPT-4o / GPT-4.1 family models using o200k_base
    pub fn o200k_base() -> Result<Self, EstimatorError> {
        Ok(Self {
            encoding: tiktoken_rs::o200k_base()
                .map_err(|e| EstimatorError::Encoding(format!("o200k_base: {}", e)))?,
            name: "tiktoken_o200k_base",
        })
    }

    /// Create estimator for GPT-3.5 / GPT-4 base models using cl100k_base
    pub fn cl100k_base() -> Result<Self, EstimatorError> {
        Ok(Self {
            encoding: tiktoken_rs::cl100k_base()
                .map_err(|e| EstimatorError::Encoding(format!("cl100k_base: {}", e)))?,
            name: "tiktoken_cl100k_base",
        })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> Result<u32, EstimatorError> {
        self.encoding
            .encode_with_special_tokens(text)
            .len()
            .try_into()
            .map_err(|e| EstimatorError::Encoding(format!("Token count overflow: {}", e)))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Heuristic estimator using character-based estimation.
///
/// ~4 chars per token (English average) with a 1.15x conservative
/// multiplier. Used for models with no bundled encoding.
pub struct HeuristicEstimator {
    multiplier: f64,
}

impl HeuristicEstimator {
    pub fn new() -> Self {
        Self { multiplier: 1.15 }
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> Result<u32, EstimatorError> {
        let base_estimate = (text.len() / 4).max(1);
        Ok((base_estimate as f64 * self.multiplier) as u32)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Estimator facade configured once per model identifier.
///
/// Selection happens at construction (glob patterns over the model name),
/// never per call. [`Estimator::estimate`] is infallible: an encoding error
/// degrades to [`FALLBACK_ESTIMATE_TOKENS`] instead of failing the batch.
#[derive(Clone)]
pub struct Estimator {
    inner: Arc<dyn TokenEstimator>,
    model: String,
}

impl Estimator {
    /// Select the estimator for a model identifier.
    pub fn for_model(model: &str) -> Result<Self, EstimatorError> {
        let inner = Self::select(model)?;
        tracing::debug!(model = %model, estimator = inner.name(), "Selected token estimator");
        Ok(Self {
            inner,
            model: model.to_string(),
        })
    }

    /// Build an estimator around an explicit implementation (tests, custom
    /// encodings).
    pub fn from_parts(inner: Arc<dyn TokenEstimator>, model: &str) -> Self {
        Self {
            inner,
            model: model.to_string(),
        }
    }

    fn select(model: &str) -> Result<Arc<dyn TokenEstimator>, EstimatorError> {
        let o200k_patterns = ["gpt-4.1*", "gpt-4o*", "gpt-4-turbo*", "o1*"];
        for pattern in o200k_patterns {
            if Self::matcher(pattern)?.is_match(model) {
                return Ok(Arc::new(TiktokenEstimator::o200k_base()?));
            }
        }

        let cl100k_patterns = ["gpt-3.5*", "gpt-4", "gpt-4-*", "claude-*"];
        for pattern in cl100k_patterns {
            if Self::matcher(pattern)?.is_match(model) {
                return Ok(Arc::new(TiktokenEstimator::cl100k_base()?));
            }
        }

        Ok(Arc::new(HeuristicEstimator::new()))
    }

    fn matcher(pattern: &str) -> Result<GlobMatcher, EstimatorError> {
        Ok(Glob::new(pattern)?.compile_matcher())
    }

    /// Model identifier this estimator was configured for
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Estimate the token cost of a text.
    ///
    /// Never fails: encoding errors fall back to a fixed conservative
    /// estimate so a broken encoder cannot fail the whole batch.
    pub fn estimate(&self, text: &str) -> u32 {
        match self.inner.estimate(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    model = %self.model,
                    estimator = self.inner.name(),
                    error = %e,
                    "Token estimation failed, using fixed fallback estimate"
                );
                FALLBACK_ESTIMATE_TOKENS
            }
        }
    }
}
