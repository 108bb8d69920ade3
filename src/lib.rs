//! campaign-advisor: resilient client for AI campaign-recommendation
//! webhooks.
//!
//! The upstream agent is slow, occasionally flaky, and answers in free text
//! wrapping a JSON block. This crate wraps it in a retrying, validating
//! pipeline: [`extract`] locates the embedded JSON, [`validate`] checks it
//! against a per-operation schema, [`request`] runs the timeout-bounded
//! attempt loop, and [`service`] binds the three webhook operations plus the
//! channel-to-segment batch into one envelope-returning API.

pub mod config;
pub mod extract;
pub mod models;
pub mod request;
pub mod service;
pub mod validate;

pub use config::Config;
pub use models::{
    AnalyticsReport, ChannelPlan, OperationResult, RequestMessage, SegmentBatchReport,
    SegmentRecommendation, UpstreamEnvelope,
};
pub use request::{
    AttemptObserver, AttemptRecord, CallOptions, NoopObserver, OperationDiagnostics, OutcomeKind,
    PayloadShape, Requester,
};
pub use service::CampaignAdvisor;
pub use validate::{FieldSchema, FieldShape, FieldSpec, ValidationReport};
