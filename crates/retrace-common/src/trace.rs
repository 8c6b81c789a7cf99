//! Recorded workflow input: steps and the selector candidates captured for them.
//!
//! These types mirror the JSON emitted by the recorder, so field names are camelCase
//! on the wire and every optional field tolerates being absent or `null`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Custom deserializer for HashMap<String, String> that filters out null values.
/// The recorder emits `null` for attributes it looked for but did not find.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: Option<HashMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(map
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

/// Accepts any JSON for `selectors`. Anything other than an array becomes `None`,
/// and array entries that are neither strings nor objects are dropped.
fn deserialize_selector_list<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<SelectorCandidate>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::Array(items)) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

/// The kind of interaction a step replays.
///
/// Unrecognized action names are preserved in `Unknown` so the engine can
/// report them instead of silently skipping the step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepAction {
    Click,
    Input,
    Scroll,
    Navigate,
    Wait,
    Unknown(String),
}

impl StepAction {
    pub fn as_str(&self) -> &str {
        match self {
            StepAction::Click => "click",
            StepAction::Input => "input",
            StepAction::Scroll => "scroll",
            StepAction::Navigate => "navigate",
            StepAction::Wait => "wait",
            StepAction::Unknown(name) => name,
        }
    }
}

impl From<String> for StepAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "click" => StepAction::Click,
            "input" => StepAction::Input,
            "scroll" => StepAction::Scroll,
            "navigate" => StepAction::Navigate,
            "wait" => StepAction::Wait,
            _ => StepAction::Unknown(value),
        }
    }
}

impl From<StepAction> for String {
    fn from(value: StepAction) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded strategy for relocating an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorCandidate {
    /// A bare selector string with no structure around it.
    Raw(String),
    Structured(SelectorSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Accessible name captured alongside `role`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_nullable_string_map",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub attributes: HashMap<String, String>,
    /// Recorder confidence, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl SelectorSpec {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollPosition {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Delay before each retry, in milliseconds.
    #[serde(default)]
    pub delay: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub critical: Option<bool>,
    #[serde(default)]
    pub retry_config: Option<RetryConfig>,
}

/// A single recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub id: String,
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_selector_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub selectors: Option<Vec<SelectorCandidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<InputData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_position: Option<ScrollPosition>,
    /// Milliseconds to pause for `wait` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StepMetadata>,
}

impl TraceStep {
    /// Build a bare step; mostly useful for tests and programmatic workflows.
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            action,
            url: None,
            selectors: None,
            input_value: None,
            input_data: None,
            scroll_position: None,
            wait_time: None,
            metadata: None,
        }
    }

    /// A step is critical unless its metadata explicitly says `critical: false`.
    pub fn is_critical(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.critical)
            .unwrap_or(true)
    }

    /// Text to type for `input` steps. `inputValue` wins over `inputData.value`.
    pub fn input_text(&self) -> Option<&str> {
        self.input_value
            .as_deref()
            .or_else(|| self.input_data.as_ref().and_then(|d| d.value.as_deref()))
    }

    pub fn is_sensitive(&self) -> bool {
        self.input_data.as_ref().is_some_and(|d| d.sensitive)
    }

    pub fn retry_config(&self) -> Option<&RetryConfig> {
        self.metadata.as_ref().and_then(|m| m.retry_config.as_ref())
    }

    pub fn description(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| format!("{} step {}", self.action, self.id))
    }

    /// Problems that make the step unlikely to replay, without rejecting it.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match &self.action {
            StepAction::Navigate if self.url.as_deref().is_none_or(str::is_empty) => {
                problems.push(format!("navigate step {} has no url", self.id));
            }
            StepAction::Input if self.input_text().is_none() => {
                problems.push(format!("input step {} has no value", self.id));
            }
            StepAction::Scroll if self.scroll_position.is_none() => {
                problems.push(format!("scroll step {} has no scroll position", self.id));
            }
            StepAction::Unknown(name) => {
                problems.push(format!("step {} has unknown action '{}'", self.id, name));
            }
            _ => {}
        }
        problems
    }
}

/// An ordered list of steps to replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub steps: Vec<TraceStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, steps: Vec<TraceStep>) -> Self {
        Self {
            id: id.into(),
            name: None,
            steps,
            tags: Vec::new(),
            source_session_id: None,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.steps.iter().flat_map(TraceStep::validate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_deserializes_from_recorder_json() {
        let step: TraceStep = serde_json::from_value(json!({
            "id": "s1",
            "action": "input",
            "url": "https://example.com/login",
            "selectors": [
                {"css": "#email", "attributes": {"id": "email", "name": null}, "confidence": 90},
                "input.email",
                42
            ],
            "inputData": {"value": "a@b.c", "sensitive": true},
            "metadata": {"critical": false, "retryConfig": {"maxAttempts": 1, "delay": 10}}
        }))
        .unwrap();

        assert_eq!(step.action, StepAction::Input);
        let selectors = step.selectors.as_ref().unwrap();
        assert_eq!(selectors.len(), 2);
        match &selectors[0] {
            SelectorCandidate::Structured(spec) => {
                assert_eq!(spec.attribute("id"), Some("email"));
                assert!(!spec.attributes.contains_key("name"));
            }
            other => panic!("expected structured candidate, got {:?}", other),
        }
        assert_eq!(selectors[1], SelectorCandidate::Raw("input.email".into()));
        assert_eq!(step.input_text(), Some("a@b.c"));
        assert!(step.is_sensitive());
        assert!(!step.is_critical());
        assert_eq!(step.retry_config().unwrap().max_attempts, Some(1));
    }

    #[test]
    fn test_non_list_selectors_become_none() {
        let step: TraceStep = serde_json::from_value(json!({
            "id": "s2",
            "action": "click",
            "selectors": "#not-a-list"
        }))
        .unwrap();
        assert!(step.selectors.is_none());
    }

    #[test]
    fn test_unknown_action_is_preserved() {
        let step: TraceStep =
            serde_json::from_value(json!({"id": "s3", "action": "hover"})).unwrap();
        assert_eq!(step.action, StepAction::Unknown("hover".into()));
        assert_eq!(serde_json::to_value(&step.action).unwrap(), json!("hover"));
        assert_eq!(step.validate().len(), 1);
    }

    #[test]
    fn test_steps_are_critical_by_default() {
        let step = TraceStep::new("s4", StepAction::Wait);
        assert!(step.is_critical());
    }

    #[test]
    fn test_workflow_validation_reports_missing_fields() {
        let workflow = Workflow::new(
            "wf",
            vec![
                TraceStep::new("nav", StepAction::Navigate),
                TraceStep::new("type", StepAction::Input),
                TraceStep::new("pause", StepAction::Wait),
            ],
        );
        let problems = workflow.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("no url"));
        assert!(problems[1].contains("no value"));
    }
}
