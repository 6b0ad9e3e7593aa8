//! Pipeline-level errors.

use thiserror::Error;

use crate::data::ProviderError;
use crate::scoring::ScoringError;
use crate::selection::SelectionError;

/// Reasons a pipeline run aborts.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Too few tickers survived sanitizing in production mode
    #[error("quality gate failed: {eligible} eligible tickers, {minimum} required")]
    QualityGate { eligible: usize, minimum: usize },

    /// Too few candidates to form a shortlist
    #[error(transparent)]
    UnderSupply(#[from] SelectionError),

    /// A numeric integrity check failed
    #[error("integrity violation: {0}")]
    Integrity(#[from] ScoringError),

    /// The market snapshot could not be fetched
    #[error("market data unavailable: {0}")]
    Provider(#[from] ProviderError),

    /// Report or tracker persistence failed
    #[error(transparent)]
    Store(#[from] alpha_common::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether the run stopped before any options request was spent.
    pub fn aborted_before_enrichment(&self) -> bool {
        matches!(self, Self::QualityGate { .. } | Self::Provider(_))
    }
}
