//! Retrying requester for the recommendation webhooks.
//!
//! One parameterized attempt loop replaces the per-endpoint copies the
//! operations would otherwise each carry: POST the body, race the response
//! against the per-attempt timeout, decode the `{ output }` envelope, extract
//! and parse the embedded JSON, validate it against the operation's schema,
//! and classify whatever went wrong. Any failure retries after a fixed delay
//! until the attempt bound is reached; every failed attempt is recorded
//! before the next begins.

use crate::config::Config;
use crate::extract;
use crate::models::UpstreamEnvelope;
use crate::validate::{self, FieldSchema, ValidationReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

/// Maximum length of the error tail kept on an attempt record.
const MAX_ERROR_TAIL: usize = 240;

/// Maximum length of a captured non-2xx response body.
const MAX_HTTP_BODY: usize = 200;

/// Clip a string to at most `max_chars` characters on a char boundary.
fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::MAX_ATTEMPTS,
            per_attempt_timeout: Duration::from_secs(crate::config::AI_CALL_TIMEOUT_SECS),
            retry_delay: Duration::from_millis(crate::config::RETRY_DELAY_MS),
        }
    }
}

impl CallOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            per_attempt_timeout: Duration::from_secs(config.per_attempt_timeout_secs),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// How the decoded payload is reshaped before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Passthrough,
    /// Single-element array wrapping an object that holds the real list:
    /// unwrap exactly one level, never deeper. A singleton that is itself a
    /// named record stays as-is; its `conditions`/`lables` arrays are part of
    /// the record, not a nested list.
    NestedList,
    /// Bare object and single-element-array envelopes are both accepted;
    /// normalize the latter to the former.
    UnwrapSingleton,
}

pub fn normalize_payload(shape: PayloadShape, value: Value) -> Value {
    match shape {
        PayloadShape::Passthrough => value,
        PayloadShape::NestedList => {
            if let Value::Array(items) = &value {
                if items.len() == 1 {
                    if let Value::Object(map) = &items[0] {
                        // A record carries its own `name`; only a nameless
                        // wrapper object gets unwrapped, and only into an
                        // array of record objects.
                        let is_record = map.get("name").and_then(Value::as_str).is_some();
                        if !is_record {
                            let inner = map.values().find(|v| {
                                v.as_array()
                                    .is_some_and(|records| records.iter().all(Value::is_object))
                            });
                            if let Some(inner) = inner {
                                return inner.clone();
                            }
                        }
                    }
                }
            }
            value
        }
        PayloadShape::UnwrapSingleton => {
            if let Value::Array(items) = &value {
                if items.len() == 1 {
                    return items[0].clone();
                }
            }
            value
        }
    }
}

/// Attempt outcome classification, as serialized into diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    NetworkError,
    HttpError,
    EmptyBody,
    ParseError,
    ValidationError,
    Success,
}

/// One request/response/validate cycle, recorded whether it succeeded or not.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: OutcomeKind,
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Injected sink for attempt records. The default sink drops them; callers
/// that want structured diagnostics supply their own.
pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, operation: &str, record: &AttemptRecord);
}

pub struct NoopObserver;

impl AttemptObserver for NoopObserver {
    fn on_attempt(&self, _operation: &str, _record: &AttemptRecord) {}
}

/// Everything that happened during one operation call.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDiagnostics {
    pub operation: String,
    pub call_id: Uuid,
    pub attempts: Vec<AttemptRecord>,
}

/// A winning attempt: the normalized payload plus its validation report.
#[derive(Debug)]
pub struct CallSuccess {
    pub value: Value,
    pub report: Option<ValidationReport>,
    pub diagnostics: OperationDiagnostics,
}

/// Terminal error after retry exhaustion, carrying the full attempt history.
#[derive(Debug)]
pub struct RequestError {
    pub diagnostics: OperationDiagnostics,
    pub message: String,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RequestError {}

enum ParseStage {
    Envelope,
    Payload,
}

enum AttemptFailure {
    Timeout { after: Duration },
    Network { message: String },
    Http { status: u16, body: String },
    EmptyBody,
    Parse { stage: ParseStage, message: String },
    Validation { report: ValidationReport },
}

impl AttemptFailure {
    fn kind(&self) -> OutcomeKind {
        match self {
            // Timeout is the distinguished sub-kind of network-error.
            Self::Timeout { .. } | Self::Network { .. } => OutcomeKind::NetworkError,
            Self::Http { .. } => OutcomeKind::HttpError,
            Self::EmptyBody => OutcomeKind::EmptyBody,
            Self::Parse { .. } => OutcomeKind::ParseError,
            Self::Validation { .. } => OutcomeKind::ValidationError,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Timeout { after } => format!("timed out after {}s", after.as_secs()),
            Self::Network { message } => message.clone(),
            Self::Http { status, body } => format!("HTTP {status}: {body}"),
            Self::EmptyBody => "empty or too-short payload".to_string(),
            Self::Parse { stage, message } => match stage {
                ParseStage::Envelope => format!("response body is not valid JSON: {message}"),
                ParseStage::Payload => format!("extracted block is not valid JSON: {message}"),
            },
            Self::Validation { report } => {
                format!("required fields failed validation:\n{}", report.render())
            }
        }
    }
}

fn describe_network_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out ({err})")
    } else if err.is_connect() {
        format!("could not connect to the service ({err})")
    } else {
        err.to_string()
    }
}

pub struct Requester {
    client: reqwest::Client,
    options: CallOptions,
    observer: Arc<dyn AttemptObserver>,
}

impl Requester {
    pub fn new(options: CallOptions) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            options,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Run the full attempt loop for one operation.
    ///
    /// Attempts are strictly sequential; each one completes (including its
    /// timeout window) before the next begins. The timer owns the attempt's
    /// cancellation: when it fires, dropping the in-flight future aborts that
    /// attempt's HTTP call only, and the loop continues into its retry
    /// bookkeeping.
    pub async fn call(
        &self,
        operation: &str,
        endpoint: &str,
        body: &Value,
        schema: Option<&FieldSchema>,
        shape: PayloadShape,
    ) -> anyhow::Result<CallSuccess> {
        let mut diagnostics = OperationDiagnostics {
            operation: operation.to_string(),
            call_id: Uuid::new_v4(),
            attempts: Vec::new(),
        };
        let mut last_failure = None;

        for attempt in 1..=self.options.max_attempts {
            let started = Instant::now();
            let raced = timeout(
                self.options.per_attempt_timeout,
                self.attempt(endpoint, body, schema, shape),
            )
            .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let failure = match raced {
                Err(_) => AttemptFailure::Timeout {
                    after: self.options.per_attempt_timeout,
                },
                Ok(Ok((value, report))) => {
                    let record = AttemptRecord {
                        attempt,
                        outcome: OutcomeKind::Success,
                        elapsed_ms,
                        at: Utc::now(),
                        error: None,
                    };
                    self.observer.on_attempt(operation, &record);
                    diagnostics.attempts.push(record);
                    return Ok(CallSuccess {
                        value,
                        report,
                        diagnostics,
                    });
                }
                Ok(Err(failure)) => failure,
            };

            let record = AttemptRecord {
                attempt,
                outcome: failure.kind(),
                elapsed_ms,
                at: Utc::now(),
                error: Some(clip(&failure.describe(), MAX_ERROR_TAIL).to_string()),
            };
            self.observer.on_attempt(operation, &record);
            diagnostics.attempts.push(record);
            last_failure = Some(failure);

            if attempt < self.options.max_attempts {
                sleep(self.options.retry_delay).await;
            }
        }

        let message = self.terminal_message(operation, last_failure.as_ref());
        Err(anyhow::Error::new(RequestError {
            diagnostics,
            message,
        }))
    }

    async fn attempt(
        &self,
        endpoint: &str,
        body: &Value,
        schema: Option<&FieldSchema>,
        shape: PayloadShape,
    ) -> Result<(Value, Option<ValidationReport>), AttemptFailure> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptFailure::Network {
                message: describe_network_error(&e),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AttemptFailure::Network {
            message: describe_network_error(&e),
        })?;

        if !status.is_success() {
            return Err(AttemptFailure::Http {
                status: status.as_u16(),
                body: clip(&text, MAX_HTTP_BODY).to_string(),
            });
        }

        let envelope: UpstreamEnvelope =
            serde_json::from_str(&text).map_err(|e| AttemptFailure::Parse {
                stage: ParseStage::Envelope,
                message: e.to_string(),
            })?;

        let extraction =
            extract::extract(&envelope.output).map_err(|_| AttemptFailure::EmptyBody)?;

        let value: Value =
            serde_json::from_str(&extraction.candidate).map_err(|e| AttemptFailure::Parse {
                stage: ParseStage::Payload,
                message: e.to_string(),
            })?;

        let value = normalize_payload(shape, value);
        let report = schema.map(|s| validate::validate(&value, s));
        if let Some(r) = &report {
            if !r.passed {
                return Err(AttemptFailure::Validation { report: r.clone() });
            }
        }

        Ok((value, report))
    }

    /// Build the single human-readable message surfaced after exhaustion.
    ///
    /// A final-attempt timeout takes precedence and is surfaced on its own;
    /// other network failures get a connectivity-specific message; validation
    /// failures carry the serialized field report.
    fn terminal_message(&self, operation: &str, failure: Option<&AttemptFailure>) -> String {
        let attempts = self.options.max_attempts;
        match failure {
            Some(AttemptFailure::Timeout { after }) => format!(
                "AI analysis for {operation} timed out after {}s. Please try again.",
                after.as_secs()
            ),
            Some(AttemptFailure::Network { message }) => format!(
                "Could not reach the {operation} service: {message}. Check your network connection."
            ),
            Some(AttemptFailure::Validation { report }) => format!(
                "{operation} failed after {attempts} attempts: the AI response did not match the expected shape:\n{}",
                report.render()
            ),
            Some(failure) => format!(
                "{operation} failed after {attempts} attempts: {}",
                failure.describe()
            ),
            None => format!("{operation} failed after {attempts} attempts"),
        }
    }

    /// One-shot JSON POST for the segment-creation batch. Still bounded by
    /// the per-attempt timeout, but never retried; the batch treats each
    /// item as best-effort.
    pub async fn post_json(&self, endpoint: &str, body: &Value) -> anyhow::Result<Value> {
        let raced = timeout(self.options.per_attempt_timeout, async {
            let response = self
                .client
                .post(endpoint)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("{}", describe_network_error(&e)))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| anyhow::anyhow!("{}", describe_network_error(&e)))?;
            if !status.is_success() {
                return Err(anyhow::anyhow!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    clip(&text, MAX_HTTP_BODY)
                ));
            }
            // The created-resource representation is opaque; keep whatever
            // came back, JSON or not.
            Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        })
        .await;

        match raced {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "timed out after {}s",
                self.options.per_attempt_timeout.as_secs()
            )),
        }
    }
}
