//! Options analytics attached to a ticker.
//!
//! Numeric metrics exist only when the status is `OK`. The fields are
//! private and every constructor other than [`OptionsAnalytics::ok`] leaves
//! them empty, so a pending or failed enrichment can never carry numbers.

mod chain;

pub use chain::{analytics_from_chain, truncation_note, ChainError, TRUNCATED_AFTER_PAGES};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// Enrichment status of a ticker's options data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionsStatus {
    /// Chain fetched and analysed
    Ok,
    /// Not fetched yet, or retry pending
    Pending,
    /// Last attempt failed and the run ended
    Failed,
    /// The underlying has no listed options
    NoOptions,
}

impl fmt::Display for OptionsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Pending => write!(f, "PENDING"),
            Self::Failed => write!(f, "FAILED"),
            Self::NoOptions => write!(f, "NO_OPTIONS"),
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Open-interest derived chain metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsMetrics {
    /// Strike minimizing total option holder payout at expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pain: Option<f64>,
    /// Net gamma exposure (calls positive, puts negative), dollars per 1% move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_gex: Option<f64>,
    /// Put open interest over call open interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_call_oi_ratio: Option<f64>,
    /// Strike with the largest call open interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_wall: Option<f64>,
    /// Strike with the largest put open interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_floor: Option<f64>,
}

// ============================================================================
// Analytics
// ============================================================================

/// Options analytics for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OptionsAnalyticsRepr")]
pub struct OptionsAnalytics {
    status: OptionsStatus,
    #[serde(flatten)]
    metrics: Option<OptionsMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl OptionsAnalytics {
    /// Successful enrichment.
    pub fn ok(metrics: OptionsMetrics) -> Self {
        Self {
            status: OptionsStatus::Ok,
            metrics: Some(metrics),
            detail: None,
        }
    }

    /// Attach a note to an otherwise unchanged result.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Not fetched yet or awaiting retry.
    pub fn pending() -> Self {
        Self {
            status: OptionsStatus::Pending,
            metrics: None,
            detail: None,
        }
    }

    /// Pending with the reason of the last failed attempt.
    pub fn pending_after(reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::pending()
        }
    }

    /// Terminal failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: OptionsStatus::Failed,
            metrics: None,
            detail: Some(reason.into()),
        }
    }

    /// The underlying has no listed options.
    pub fn no_options() -> Self {
        Self {
            status: OptionsStatus::NoOptions,
            metrics: None,
            detail: None,
        }
    }

    pub fn status(&self) -> OptionsStatus {
        self.status
    }

    /// Metrics, present only when the status is `OK`.
    pub fn metrics(&self) -> Option<&OptionsMetrics> {
        self.metrics.as_ref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == OptionsStatus::Ok
    }
}

impl Default for OptionsAnalytics {
    fn default() -> Self {
        Self::pending()
    }
}

/// Wire shape. Metrics are dropped on read unless the status is `OK`.
#[derive(Deserialize)]
struct OptionsAnalyticsRepr {
    status: OptionsStatus,
    #[serde(flatten)]
    metrics: OptionsMetrics,
    #[serde(default)]
    detail: Option<String>,
}

impl From<OptionsAnalyticsRepr> for OptionsAnalytics {
    fn from(repr: OptionsAnalyticsRepr) -> Self {
        let metrics = (repr.status == OptionsStatus::Ok).then_some(repr.metrics);
        Self {
            status: repr.status,
            metrics,
            detail: repr.detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metrics() -> OptionsMetrics {
        OptionsMetrics {
            max_pain: Some(100.0),
            net_gex: Some(1.5e9),
            put_call_oi_ratio: Some(0.8),
            call_wall: Some(110.0),
            put_floor: Some(95.0),
        }
    }

    #[test]
    fn test_non_ok_statuses_have_no_metrics() {
        for analytics in [
            OptionsAnalytics::pending(),
            OptionsAnalytics::pending_after("timeout"),
            OptionsAnalytics::failed("malformed"),
            OptionsAnalytics::no_options(),
        ] {
            assert!(analytics.metrics().is_none());
            let value = serde_json::to_value(&analytics).unwrap();
            assert!(value.get("maxPain").is_none());
            assert!(value.get("putCallOiRatio").is_none());
        }
    }

    #[test]
    fn test_ok_serializes_flat() {
        let value = serde_json::to_value(OptionsAnalytics::ok(sample_metrics())).unwrap();
        assert_eq!(value["status"], "OK");
        assert_eq!(value["maxPain"], 100.0);
        assert_eq!(value["callWall"], 110.0);
    }

    #[test]
    fn test_deserialize_drops_metrics_unless_ok() {
        let doc = json!({"status": "PENDING", "maxPain": 42.0, "netGex": 1.0});
        let analytics: OptionsAnalytics = serde_json::from_value(doc).unwrap();
        assert_eq!(analytics.status(), OptionsStatus::Pending);
        assert!(analytics.metrics().is_none());

        let doc = json!({"status": "OK", "maxPain": 42.0});
        let analytics: OptionsAnalytics = serde_json::from_value(doc).unwrap();
        assert_eq!(analytics.metrics().and_then(|m| m.max_pain), Some(42.0));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&OptionsStatus::NoOptions).unwrap(), "\"NO_OPTIONS\"");
        assert_eq!(OptionsStatus::Failed.to_string(), "FAILED");
    }
}
