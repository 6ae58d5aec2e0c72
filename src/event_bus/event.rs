use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured observation emitted by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    Pipeline(PipelineEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// A pipeline event with no session attribution.
    pub fn pipeline_message(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Pipeline(PipelineEvent::new(None, None, scope.into(), message.into()))
    }

    /// A pipeline event attributed to a session but not to any stage,
    /// such as ingest progress.
    pub fn pipeline_for_session(
        session_id: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Pipeline(PipelineEvent::new(
            Some(session_id.into()),
            None,
            scope.into(),
            message.into(),
        ))
    }

    /// A pipeline event tied to a session and the stage it happened in.
    pub fn pipeline_message_with_meta(
        session_id: impl Into<String>,
        stage: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Pipeline(PipelineEvent::new(
            Some(session_id.into()),
            Some(stage.into()),
            scope.into(),
            message.into(),
        ))
    }

    /// One state-machine transition for a question.
    pub fn stage_transition(
        session_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        let to = to.into();
        let message = format!("{} -> {to}", from.into());
        Event::Pipeline(PipelineEvent::new(
            Some(session_id.into()),
            Some(to),
            "stage".into(),
            message,
        ))
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Event::Pipeline(pipeline) => Some(pipeline.scope()),
            Event::Diagnostic(diag) => Some(diag.scope()),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Pipeline(pipeline) => pipeline.message(),
            Event::Diagnostic(diag) => diag.message(),
        }
    }

    /// Convert the event to a structured JSON value with a normalized schema.
    ///
    /// ```
    /// use ragloom::event_bus::Event;
    ///
    /// let event = Event::pipeline_message_with_meta("s1", "Retrieve", "retrieval", "4 chunks");
    /// let json = event.to_json_value();
    ///
    /// assert_eq!(json["type"], "pipeline");
    /// assert_eq!(json["scope"], "retrieval");
    /// assert_eq!(json["metadata"]["session_id"], "s1");
    /// assert_eq!(json["metadata"]["stage"], "Retrieve");
    /// ```
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::json;

        let (event_type, metadata) = match self {
            Event::Pipeline(pipeline) => {
                let mut meta = serde_json::Map::new();
                if let Some(session_id) = pipeline.session_id() {
                    meta.insert("session_id".to_string(), json!(session_id));
                }
                if let Some(stage) = pipeline.stage() {
                    meta.insert("stage".to_string(), json!(stage));
                }
                ("pipeline", Value::Object(meta))
            }
            Event::Diagnostic(_) => ("diagnostic", Value::Object(serde_json::Map::new())),
        };

        json!({
            "type": event_type,
            "scope": self.scope_label(),
            "message": self.message(),
            "timestamp": Utc::now().to_rfc3339(),
            "metadata": metadata,
        })
    }

    /// Compact JSON string form of [`to_json_value`](Self::to_json_value).
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Pipeline(pipeline) => match (pipeline.session_id(), pipeline.stage()) {
                (Some(session), Some(stage)) => {
                    write!(f, "[{session}@{stage}] {}", pipeline.message())
                }
                (Some(session), None) => write!(f, "[{session}] {}", pipeline.message()),
                (None, _) => write!(f, "{}", pipeline.message()),
            },
            Event::Diagnostic(diag) => write!(f, "{}", diag.message()),
        }
    }
}

/// Event produced while a question or ingest moves through the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineEvent {
    session_id: Option<String>,
    stage: Option<String>,
    scope: String,
    message: String,
}

impl PipelineEvent {
    pub fn new(
        session_id: Option<String>,
        stage: Option<String>,
        scope: String,
        message: String,
    ) -> Self {
        Self {
            session_id,
            stage,
            scope,
            message,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Encoded stage name, when the event happened inside one.
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Out-of-band warning that did not stop the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    scope: String,
    message: String,
}

impl DiagnosticEvent {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_session_and_stage_when_present() {
        let event = Event::stage_transition("s1", "Assess", "WebSearch");
        assert_eq!(event.to_string(), "[s1@WebSearch] Assess -> WebSearch");

        let bare = Event::pipeline_message("ingest", "2 chunks indexed");
        assert_eq!(bare.to_string(), "2 chunks indexed");

        let diag = Event::diagnostic("store", "turn not persisted");
        assert_eq!(diag.to_string(), "turn not persisted");
    }

    #[test]
    fn json_form_carries_metadata() {
        let event = Event::stage_transition("s1", "Start", "Retrieve");
        let json = event.to_json_value();
        assert_eq!(json["type"], "pipeline");
        assert_eq!(json["scope"], "stage");
        assert_eq!(json["metadata"]["session_id"], "s1");
        assert_eq!(json["metadata"]["stage"], "Retrieve");

        let diag = Event::diagnostic("retry", "attempt 1 failed").to_json_value();
        assert_eq!(diag["type"], "diagnostic");
        assert!(diag["metadata"].as_object().unwrap().is_empty());
    }
}
