//! The campaign recommendation service: thin bindings of the retrying
//! requester to the three AI webhooks, plus the best-effort channel-to-
//! segment batch. Every operation returns the `OperationResult` envelope;
//! internal errors never escape as panics or bare `Err`s.

use crate::config::Config;
use crate::models::{
    AnalyticsReport, ChannelPlan, CreatedBy, MetricComparison, OperationResult, RequestMessage,
    SegmentBatchReport, SegmentCreateRequest, SegmentFailure, SegmentRecommendation,
};
use crate::request::{AttemptObserver, CallOptions, PayloadShape, Requester};
use crate::validate::FieldSchema;
use anyhow::Context;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

pub struct CampaignAdvisor {
    config: Config,
    requester: Requester,
}

impl CampaignAdvisor {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        for (label, endpoint) in [
            ("recommendation_url", &config.recommendation_url),
            ("analytics_url", &config.analytics_url),
            ("channel_url", &config.channel_url),
            ("segment_url", &config.segment_url),
        ] {
            Url::parse(endpoint).with_context(|| format!("invalid {label}: {endpoint}"))?;
        }
        let requester = Requester::new(CallOptions::from_config(&config))?;
        Ok(Self { config, requester })
    }

    /// Attach a diagnostics sink; attempt records for every operation flow
    /// through it.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.requester = self.requester.with_observer(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ask the agent for customer segments matching a campaign objective.
    pub async fn recommend_segments(
        &self,
        objective: &str,
    ) -> OperationResult<Vec<SegmentRecommendation>> {
        let schema = FieldSchema::root_record_list(&["name", "description"]);
        let body = json!({ "message": objective });

        let success = match self
            .requester
            .call(
                "segment recommendation",
                &self.config.recommendation_url,
                &body,
                Some(&schema),
                PayloadShape::NestedList,
            )
            .await
        {
            Ok(success) => success,
            Err(err) => return OperationResult::failure(err.to_string()),
        };

        match serde_json::from_value::<Vec<SegmentRecommendation>>(success.value) {
            Ok(recommendations) => {
                let message = format!(
                    "AI recommended {} campaign segments.",
                    recommendations.len()
                );
                OperationResult::success(recommendations, message)
            }
            Err(err) => OperationResult::failure(format!(
                "recommendation payload had an unexpected shape: {err}"
            )),
        }
    }

    /// Fetch target-vs-all performance metrics for the given conditions.
    pub async fn analyze_performance(
        &self,
        conditions: &RequestMessage,
    ) -> OperationResult<AnalyticsReport> {
        let schema = FieldSchema::target_all_avg(&self.config.metric_fields);
        let body = json!({ "message": conditions });

        let success = match self
            .requester
            .call(
                "performance analytics",
                &self.config.analytics_url,
                &body,
                Some(&schema),
                PayloadShape::Passthrough,
            )
            .await
        {
            Ok(success) => success,
            Err(err) => return OperationResult::failure(err.to_string()),
        };

        let mut metrics = BTreeMap::new();
        for field in &self.config.metric_fields {
            // Validation already proved presence and shape of each field.
            let raw = match success.value.get(field) {
                Some(raw) => raw.clone(),
                None => {
                    return OperationResult::failure(format!(
                        "validated analytics payload is missing {field}"
                    ))
                }
            };
            match serde_json::from_value::<MetricComparison>(raw) {
                Ok(comparison) => {
                    metrics.insert(field.clone(), comparison);
                }
                Err(err) => {
                    return OperationResult::failure(format!(
                        "analytics field {field} had an unexpected shape: {err}"
                    ))
                }
            }
        }

        OperationResult::success(
            AnalyticsReport { metrics },
            "Performance analysis complete.",
        )
    }

    /// Ask the agent for a channel budget split for the given conditions.
    pub async fn optimize_channels(
        &self,
        conditions: &RequestMessage,
    ) -> OperationResult<Vec<ChannelPlan>> {
        let schema = FieldSchema::channel_array(&self.config.channel_field);
        let body = json!({ "message": conditions });

        let success = match self
            .requester
            .call(
                "channel optimization",
                &self.config.channel_url,
                &body,
                Some(&schema),
                PayloadShape::UnwrapSingleton,
            )
            .await
        {
            Ok(success) => success,
            Err(err) => return OperationResult::failure(err.to_string()),
        };

        // Channel validation is lenient; the field can still be absent.
        let raw = success
            .value
            .get(&self.config.channel_field)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        match serde_json::from_value::<Vec<ChannelPlan>>(raw) {
            Ok(channels) => {
                let message = format!("Channel optimization returned {} channels.", channels.len());
                OperationResult::success(channels, message)
            }
            Err(err) => OperationResult::failure(format!(
                "channel payload had an unexpected shape: {err}"
            )),
        }
    }

    /// Create one audience segment per recommended channel, sequentially with
    /// a fixed pause between calls. Per-channel failures are collected, never
    /// fatal to the batch; the batch succeeds if any segment was created.
    pub async fn create_channel_segments(
        &self,
        channels: &[ChannelPlan],
    ) -> OperationResult<SegmentBatchReport> {
        let mut report = SegmentBatchReport {
            created: Vec::new(),
            failed: Vec::new(),
        };
        let pause = Duration::from_millis(self.config.segment_batch_delay_ms);

        for (idx, channel) in channels.iter().enumerate() {
            if idx > 0 {
                sleep(pause).await;
            }
            let request = self.segment_request(channel, idx);
            let body = match serde_json::to_value(&request) {
                Ok(body) => body,
                Err(err) => {
                    report.failed.push(SegmentFailure {
                        channel: request.title.clone(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            match self.requester.post_json(&self.config.segment_url, &body).await {
                Ok(_created) => report.created.push(request.title),
                Err(err) => report.failed.push(SegmentFailure {
                    channel: request.title,
                    error: err.to_string(),
                }),
            }
        }

        if report.created.is_empty() {
            let failed = report.failed.len();
            OperationResult::failure(format!(
                "no channel segments could be created ({failed} failed)"
            ))
        } else {
            let message = format!(
                "Created {} of {} channel segments.",
                report.created.len(),
                channels.len()
            );
            OperationResult::success(report, message)
        }
    }

    fn segment_request(&self, channel: &ChannelPlan, idx: usize) -> SegmentCreateRequest {
        let title = if channel.name.trim().is_empty() {
            format!("channel-{}", idx + 1)
        } else {
            channel.name.clone()
        };
        let description = channel
            .description
            .clone()
            .unwrap_or_else(|| format!("Audience segment for the {title} channel"));
        SegmentCreateRequest {
            title,
            description,
            sharing_scope: self.config.sharing_scope.clone(),
            created_by: CreatedBy {
                email: self.config.created_by_email.clone(),
            },
            conditions: channel.conditions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisor() -> CampaignAdvisor {
        CampaignAdvisor::new(Config::default()).unwrap()
    }

    #[test]
    fn invalid_endpoint_is_rejected_at_construction() {
        let config = Config {
            analytics_url: "not a url".to_string(),
            ..Config::default()
        };
        let err = match CampaignAdvisor::new(config) {
            Ok(_) => panic!("invalid analytics_url was accepted"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("analytics_url"));
    }

    #[test]
    fn segment_request_falls_back_to_positional_title() {
        let advisor = advisor();
        let channel = ChannelPlan {
            id: None,
            name: "   ".to_string(),
            description: None,
            ratio: Some(0.2),
            conditions: Vec::new(),
        };
        let request = advisor.segment_request(&channel, 2);
        assert_eq!(request.title, "channel-3");
        assert!(request.description.contains("channel-3"));
        assert_eq!(request.created_by.email, advisor.config.created_by_email);
    }

    #[test]
    fn segment_request_uses_channel_name_and_description() {
        let advisor = advisor();
        let channel = ChannelPlan {
            id: Some("email".to_string()),
            name: "Email".to_string(),
            description: Some("Weekly newsletter audience".to_string()),
            ratio: Some(0.4),
            conditions: Vec::new(),
        };
        let request = advisor.segment_request(&channel, 0);
        assert_eq!(request.title, "Email");
        assert_eq!(request.description, "Weekly newsletter audience");
        assert_eq!(request.sharing_scope, advisor.config.sharing_scope);
    }
}
