use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tile::Tile;

/// Opaque token pairing an asynchronous outcome with the intent that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveKind {
    Idle,
    Moving,
    Repeating,
    Charging,
}

/// Kind-specific outcome fields, serialized flat into the `data` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeData {
    Movement {
        arrived: bool,
        x: i32,
        y: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempts: Option<u32>,
    },
    ToolRepeat {
        swings: u32,
        tool: String,
    },
    ToolHold {
        ticks: u32,
        tool: String,
    },
    ToolOnce {
        tool: String,
    },
    Stopped {
        was_moving: bool,
    },
    PathPlan {
        reachable: bool,
        waypoints: Vec<Tile>,
    },
    Status {
        x: i32,
        y: i32,
        area: String,
        can_act: bool,
        tool: String,
        active: ActiveKind,
        tick: u64,
    },
    Empty {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: CorrelationId,
    pub success: bool,
    pub message: String,
    pub data: OutcomeData,
}

pub type OutcomeCallback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// The one callback owed to an accepted intent.
///
/// Resolving consumes the completion, so the callback runs at most once. A completion that
/// is dropped unresolved has been abandoned on purpose (superseded or stopped movement);
/// no outcome is ever delivered for it.
pub struct Completion {
    id: CorrelationId,
    callback: OutcomeCallback,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("id", &self.id).finish()
    }
}

impl Completion {
    pub fn new<F>(id: CorrelationId, callback: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Self {
            id,
            callback: Box::new(callback),
        }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn succeed(self, message: impl Into<String>, data: OutcomeData) {
        self.resolve(true, message, data);
    }

    pub fn fail(self, message: impl Into<String>, data: OutcomeData) {
        self.resolve(false, message, data);
    }

    fn resolve(self, success: bool, message: impl Into<String>, data: OutcomeData) {
        let Self { id, callback } = self;
        callback(Outcome {
            id,
            success,
            message: message.into(),
            data,
        });
    }

    /// Drops the callback without invoking it.
    pub fn abandon(self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    #[test]
    fn resolve_delivers_exactly_one_outcome_with_its_id() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let completion = Completion::new(CorrelationId::new("req-1"), move |outcome| {
            sink.lock().expect("sink").push(outcome);
        });
        completion.succeed("done", OutcomeData::ToolOnce { tool: "axe".into() });

        let received = received.lock().expect("received");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id.as_str(), "req-1");
        assert!(received[0].success);
    }

    #[test]
    fn fail_marks_outcome_unsuccessful() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let completion = Completion::new(CorrelationId::new("req-2"), move |outcome| {
            sink.lock().expect("sink").push(outcome);
        });
        completion.fail("no path", OutcomeData::Empty {});

        let received = received.lock().expect("received");
        assert_eq!(received.len(), 1);
        assert!(!received[0].success);
        assert_eq!(received[0].message, "no path");
    }

    #[test]
    fn abandon_never_invokes_callback() {
        let fired = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&fired);
        let completion = Completion::new(CorrelationId::new("gone"), move |_| {
            *flag.lock().expect("flag") = true;
        });
        completion.abandon();
        assert!(!*fired.lock().expect("fired"));
    }

    #[test]
    fn movement_data_serializes_flat() {
        let outcome = Outcome {
            id: CorrelationId::new("m"),
            success: false,
            message: "stuck".into(),
            data: OutcomeData::Movement {
                arrived: false,
                x: 3,
                y: 4,
                area: None,
                attempts: Some(5),
            },
        };
        assert_eq!(
            serde_json::to_value(&outcome).expect("json"),
            json!({
                "id": "m",
                "success": false,
                "message": "stuck",
                "data": {"arrived": false, "x": 3, "y": 4, "attempts": 5}
            })
        );
    }
}
