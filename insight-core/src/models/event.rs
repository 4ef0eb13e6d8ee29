use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One captured step of a training session, as returned by
/// `scenarioSessionEvents.nodes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    /// Either a JSON-encoded string or an already structured object.
    #[serde(default)]
    pub event_data: Value,
    #[serde(default)]
    pub photo: Option<Photo>,
    #[serde(default, rename = "scenarioSessionStep")]
    pub step: Option<SessionStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStep {
    #[serde(default)]
    pub scenario_step: Option<ScenarioStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Normalized view of an event's `eventData` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Structured(Map<String, Value>),
    /// Null, or a payload that decoded to something other than an object.
    Empty,
    /// A string payload that is not valid JSON.
    Malformed(String),
}

impl EventData {
    pub fn from_raw(raw: &Value) -> Self {
        match raw {
            Value::Object(map) => EventData::Structured(map.clone()),
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => EventData::Structured(map),
                Ok(_) => EventData::Empty,
                Err(e) => EventData::Malformed(e.to_string()),
            },
            _ => EventData::Empty,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, EventData::Malformed(_))
    }

    /// Non-empty `user_name` string, if present.
    pub fn user_name(&self) -> Option<&str> {
        match self {
            EventData::Structured(map) => map
                .get("user_name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty()),
            _ => None,
        }
    }
}

impl SessionEvent {
    pub fn data(&self) -> EventData {
        EventData::from_raw(&self.event_data)
    }

    pub fn photo_url(&self) -> Option<&str> {
        self.photo.as_ref().and_then(|p| p.file_url.as_deref())
    }

    /// Human-readable id for log lines.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("<no id>")
    }

    pub fn step_name(&self) -> Option<&str> {
        self.step
            .as_ref()
            .and_then(|s| s.scenario_step.as_ref())
            .and_then(|s| s.name.as_deref())
    }
}
