//! Structural validation of extracted webhook payloads.
//!
//! Each operation supplies a small schema describing the fields it needs and
//! the shape each field must take. Validation produces a per-field report
//! rather than a bare boolean so retry exhaustion can surface exactly which
//! field failed and why.
//!
//! Strictness is deliberately uneven: analytics target/all metrics are strict
//! (the wizard cannot render without them), while channel arrays are lenient
//! and only collect warnings for malformed records. Lenient fields never
//! block `passed`.

use serde::Serialize;
use serde_json::Value;

/// Field-spec name that targets the decoded root value instead of a member.
pub const ROOT_FIELD: &str = "$";

/// Shape a schema field must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    /// Strict: object holding `target` and `all`, each exposing a finite
    /// `avg > 0` either directly or under a nested `data` object.
    TargetAllAvg,
    /// Lenient: non-empty array of records; per-record `name`/`ratio`
    /// problems are warnings only.
    ArrayOfRecords,
    /// Strict: non-empty array whose every record carries each listed
    /// non-empty string field.
    RecordList { required: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub shape: FieldShape,
}

impl FieldSpec {
    fn is_strict(&self) -> bool {
        !matches!(self.shape, FieldShape::ArrayOfRecords)
    }
}

/// Ordered, per-operation required-field schema.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Strict target/all metric checks over the given field names.
    pub fn target_all_avg(names: &[String]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| FieldSpec {
                    name: name.clone(),
                    shape: FieldShape::TargetAllAvg,
                })
                .collect(),
        )
    }

    /// Lenient channel-array check on a single field.
    pub fn channel_array(field: &str) -> Self {
        Self::new(vec![FieldSpec {
            name: field.to_string(),
            shape: FieldShape::ArrayOfRecords,
        }])
    }

    /// Strict record list applied to the root value.
    pub fn root_record_list(required: &[&str]) -> Self {
        Self::new(vec![FieldSpec {
            name: ROOT_FIELD.to_string(),
            shape: FieldShape::RecordList {
                required: required.iter().map(|s| s.to_string()).collect(),
            },
        }])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    pub name: String,
    pub valid: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub fields: Vec<FieldReport>,
    pub passed: bool,
}

impl ValidationReport {
    pub fn field(&self, name: &str) -> Option<&FieldReport> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field-by-field lines for inclusion in a terminal error message.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "  {}: {} ({})",
                    f.name,
                    if f.valid { "ok" } else { "failed" },
                    f.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Validate a decoded payload against a schema. Pure; fresh report per call.
pub fn validate(value: &Value, schema: &FieldSchema) -> ValidationReport {
    let mut fields = Vec::with_capacity(schema.fields.len());
    let mut passed = true;

    for spec in &schema.fields {
        let target = if spec.name == ROOT_FIELD {
            Some(value)
        } else {
            value.get(&spec.name)
        };

        let (valid, detail) = match &spec.shape {
            FieldShape::TargetAllAvg => check_target_all(target),
            FieldShape::ArrayOfRecords => check_record_array(target),
            FieldShape::RecordList { required } => check_record_list(target, required),
        };

        if spec.is_strict() && !valid {
            passed = false;
        }
        fields.push(FieldReport {
            name: spec.name.clone(),
            valid,
            detail,
        });
    }

    ValidationReport { fields, passed }
}

/// Accepts both `{ "avg": n }` and `{ "data": { "avg": n } }` layouts.
fn scope_avg(scope: Option<&Value>) -> Option<f64> {
    let obj = scope?.as_object()?;
    if let Some(avg) = obj.get("avg").and_then(Value::as_f64) {
        return Some(avg);
    }
    obj.get("data")?.as_object()?.get("avg").and_then(Value::as_f64)
}

fn check_target_all(value: Option<&Value>) -> (bool, String) {
    let Some(obj) = value.and_then(Value::as_object) else {
        return (false, "missing or not an object".to_string());
    };
    for side in ["target", "all"] {
        match scope_avg(obj.get(side)) {
            Some(avg) if avg.is_finite() && avg > 0.0 => {}
            Some(avg) => {
                return (false, format!("{side}.avg must be a positive number, got {avg}"));
            }
            None => {
                return (false, format!("{side}.avg missing or not numeric"));
            }
        }
    }
    (true, "target/all averages present and positive".to_string())
}

fn check_record_array(value: Option<&Value>) -> (bool, String) {
    let Some(records) = value.and_then(Value::as_array) else {
        return (false, "missing or not an array".to_string());
    };
    if records.is_empty() {
        return (false, "array is empty".to_string());
    }

    let mut warnings = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let Some(obj) = record.as_object() else {
            warnings.push(format!("record {}: not an object", idx + 1));
            continue;
        };
        match obj.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => {}
            _ => warnings.push(format!("record {}: missing name", idx + 1)),
        }
        match obj.get("ratio") {
            Some(ratio) => match ratio.as_f64() {
                Some(r) if r >= 0.0 => {}
                _ => warnings.push(format!("record {}: ratio is not a number >= 0", idx + 1)),
            },
            None => warnings.push(format!("record {}: missing ratio", idx + 1)),
        }
    }

    if warnings.is_empty() {
        (true, format!("{} records", records.len()))
    } else {
        // Warnings only; a partially-described channel is still usable.
        (true, format!("{} records; warnings: {}", records.len(), warnings.join("; ")))
    }
}

fn check_record_list(value: Option<&Value>, required: &[String]) -> (bool, String) {
    let Some(records) = value.and_then(Value::as_array) else {
        return (false, "missing or not an array".to_string());
    };
    if records.is_empty() {
        return (false, "array is empty".to_string());
    }

    for (idx, record) in records.iter().enumerate() {
        let Some(obj) = record.as_object() else {
            return (false, format!("record {}: not an object", idx + 1));
        };
        for field in required {
            match obj.get(field).and_then(Value::as_str) {
                Some(text) if !text.trim().is_empty() => {}
                _ => {
                    return (
                        false,
                        format!("record {}: missing or empty {}", idx + 1, field),
                    );
                }
            }
        }
    }
    (true, format!("{} records", records.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric_schema() -> FieldSchema {
        FieldSchema::target_all_avg(&[
            "conversion_rate".to_string(),
            "revisit_rate".to_string(),
            "profit_rate".to_string(),
        ])
    }

    fn full_metrics() -> Value {
        json!({
            "conversion_rate": {"target": {"avg": 0.5}, "all": {"avg": 0.3}},
            "revisit_rate": {"target": {"avg": 0.2}, "all": {"avg": 0.1}},
            "profit_rate": {"target": {"data": {"avg": 1.7}}, "all": {"data": {"avg": 1.1}}},
        })
    }

    #[test]
    fn all_positive_metrics_pass() {
        let report = validate(&full_metrics(), &metric_schema());
        assert!(report.passed);
        assert!(report.fields.iter().all(|f| f.valid));
    }

    #[test]
    fn zero_avg_fails_exactly_that_field() {
        let mut value = full_metrics();
        value["revisit_rate"]["target"]["avg"] = json!(0);
        let report = validate(&value, &metric_schema());
        assert!(!report.passed);
        assert!(report.field("conversion_rate").unwrap().valid);
        assert!(!report.field("revisit_rate").unwrap().valid);
        assert!(report.field("profit_rate").unwrap().valid);
    }

    #[test]
    fn negative_and_non_numeric_avgs_fail() {
        for bad in [json!(-0.2), json!("0.4"), json!(null)] {
            let mut value = full_metrics();
            value["conversion_rate"]["all"]["avg"] = bad;
            let report = validate(&value, &metric_schema());
            assert!(!report.passed);
            assert!(!report.field("conversion_rate").unwrap().valid);
        }
    }

    #[test]
    fn missing_metric_field_fails() {
        let mut value = full_metrics();
        value.as_object_mut().unwrap().remove("profit_rate");
        let report = validate(&value, &metric_schema());
        assert!(!report.passed);
        assert!(report
            .field("profit_rate")
            .unwrap()
            .detail
            .contains("missing"));
    }

    #[test]
    fn nested_data_layout_is_accepted() {
        let value = json!({
            "conversion_rate": {"target": {"data": {"avg": 0.9}}, "all": {"avg": 0.4}},
        });
        let schema = FieldSchema::target_all_avg(&["conversion_rate".to_string()]);
        assert!(validate(&value, &schema).passed);
    }

    #[test]
    fn channel_record_warnings_do_not_block_passed() {
        let value = json!({
            "channels": [
                {"name": "email", "ratio": 0.4},
                {"ratio": -1},
                {"name": "push"}
            ]
        });
        let report = validate(&value, &FieldSchema::channel_array("channels"));
        assert!(report.passed);
        let field = report.field("channels").unwrap();
        assert!(field.valid);
        assert!(field.detail.contains("warnings"));
        assert!(field.detail.contains("record 2"));
        assert!(field.detail.contains("record 3"));
    }

    #[test]
    fn missing_channel_array_still_passes_overall() {
        // Lenient fields are advisory even when the field is absent.
        let report = validate(&json!({}), &FieldSchema::channel_array("channels"));
        assert!(report.passed);
        assert!(!report.field("channels").unwrap().valid);
    }

    #[test]
    fn record_list_requires_every_string_field() {
        let schema = FieldSchema::root_record_list(&["name", "description"]);
        let good = json!([{"name": "vip", "description": "repeat buyers"}]);
        assert!(validate(&good, &schema).passed);

        let bad = json!([
            {"name": "vip", "description": "repeat buyers"},
            {"name": "", "description": "whoops"}
        ]);
        let report = validate(&bad, &schema);
        assert!(!report.passed);
        assert!(report.fields[0].detail.contains("record 2"));
    }

    #[test]
    fn record_list_rejects_empty_array() {
        let schema = FieldSchema::root_record_list(&["name"]);
        assert!(!validate(&json!([]), &schema).passed);
    }
}
