//! Wire shapes for the recommendation webhooks and the response envelope
//! handed back to callers.
//!
//! Upstream JSON is loosely typed; every tolerated layout alternative is an
//! explicit untagged variant with a trailing catch-all, so an unexpected
//! shape degrades into `Unknown` instead of a decode failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw upstream payload. `output` is free text that may wrap a JSON block.
///
/// Only constructed from a successful HTTP response body.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamEnvelope {
    pub output: String,
}

/// The single envelope returned to external callers for every operation.
///
/// The `success` field is fixed per variant; it exists so the serialized
/// envelope matches the `{ data, success, message } | { success, error }`
/// wire contract.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OperationResult<T> {
    Success {
        data: T,
        success: bool,
        message: String,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl<T> OperationResult<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self::Success {
            data,
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            success: false,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { message, .. } => Some(message),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }
}

/// Request body accepted by all three AI webhooks.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RequestMessage {
    Text(String),
    Structured(Value),
}

/// One recommended customer segment.
///
/// The upstream agent spells the labels key `lables`; the rename is part of
/// the wire contract, not a typo to fix here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecommendation {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub customer_cnt: Option<u64>,
    #[serde(rename = "lables", default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<SegmentCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCondition {
    #[serde(default)]
    pub or_conditions: Vec<ConditionClause>,
    #[serde(default)]
    pub join_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionClause {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Averages for one metric scope, in either of the two upstream layouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricScope {
    Direct { avg: f64 },
    Nested { data: MetricAverage },
    Unknown(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAverage {
    pub avg: f64,
}

impl MetricScope {
    pub fn avg(&self) -> Option<f64> {
        match self {
            Self::Direct { avg } => Some(*avg),
            Self::Nested { data } => Some(data.avg),
            Self::Unknown(_) => None,
        }
    }
}

/// Target-segment vs all-customers comparison for one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricComparison {
    pub target: MetricScope,
    pub all: MetricScope,
}

/// Validated performance analytics, keyed by configured metric field name.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub metrics: BTreeMap<String, MetricComparison>,
}

/// One recommended channel with its budget share.
///
/// Every field defaults so a partially-described channel still decodes; the
/// lenient validator reports the gaps as warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPlan {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Budget share in `0.0..=1.0`.
    #[serde(default)]
    pub ratio: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<SegmentCondition>,
}

/// Body POSTed to the segment-creation endpoint, one per channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCreateRequest {
    pub title: String,
    pub description: String,
    pub sharing_scope: String,
    pub created_by: CreatedBy,
    pub conditions: Vec<SegmentCondition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBy {
    pub email: String,
}

/// Outcome of the best-effort channel-to-segment batch.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentBatchReport {
    /// Channel names whose segments were created.
    pub created: Vec<String>,
    pub failed: Vec<SegmentFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentFailure {
    pub channel: String,
    pub error: String,
}
