//! The per-question state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// States a single question moves through.
///
/// ```text
/// Start -> Retrieve -> Assess -+-> SynthesizeFromDocs -+-> Record -> Done
///                              |                       |
///                              +-> WebSearch -> SynthesizeFromWeb
/// ```
///
/// Exactly one synthesis branch runs per question, chosen by the
/// sufficiency gate in `Assess`. `Failed` is the terminal state for any
/// unrecoverable error; a failed question records nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Start,
    Retrieve,
    Assess,
    SynthesizeFromDocs,
    WebSearch,
    SynthesizeFromWeb,
    Record,
    Done,
    Failed,
}

impl Stage {
    /// Stable string form used in events and storage.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            Stage::Start => "Start",
            Stage::Retrieve => "Retrieve",
            Stage::Assess => "Assess",
            Stage::SynthesizeFromDocs => "SynthesizeFromDocs",
            Stage::WebSearch => "WebSearch",
            Stage::SynthesizeFromWeb => "SynthesizeFromWeb",
            Stage::Record => "Record",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }

    /// Parse the encoded form back into a stage.
    #[must_use]
    pub fn decode(s: &str) -> Option<Stage> {
        match s {
            "Start" => Some(Stage::Start),
            "Retrieve" => Some(Stage::Retrieve),
            "Assess" => Some(Stage::Assess),
            "SynthesizeFromDocs" => Some(Stage::SynthesizeFromDocs),
            "WebSearch" => Some(Stage::WebSearch),
            "SynthesizeFromWeb" => Some(Stage::SynthesizeFromWeb),
            "Record" => Some(Stage::Record),
            "Done" => Some(Stage::Done),
            "Failed" => Some(Stage::Failed),
            _ => None,
        }
    }

    /// Whether the machine stops here.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}
