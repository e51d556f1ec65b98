use thiserror::Error;

use crate::config::SchedulerConfig;
use crate::ledger::{Completion, CorrelationId};
use crate::tile::Tile;

/// What the controller asked for. Durations are in ticks, counts are requested values
/// before clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    MoveTo { goal: Tile },
    Stop,
    UseToolOnce { slot: Option<u8> },
    UseToolRepeat { count: u32, slot: Option<u8> },
    HoldTool { ticks: u32, slot: Option<u8> },
    FindPath { goal: Tile },
    Status,
}

impl IntentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveTo { .. } => "move_to",
            Self::Stop => "stop",
            Self::UseToolOnce { .. } => "use_tool_once",
            Self::UseToolRepeat { .. } => "use_tool_repeat",
            Self::HoldTool { .. } => "hold_tool",
            Self::FindPath { .. } => "find_path",
            Self::Status => "status",
        }
    }

    fn slot(&self) -> Option<u8> {
        match self {
            Self::UseToolOnce { slot }
            | Self::UseToolRepeat { slot, .. }
            | Self::HoldTool { slot, .. } => *slot,
            _ => None,
        }
    }

    /// Checks that need nothing but the intent itself. Failing intents are resolved
    /// before any follower or timer exists.
    pub fn validate(&self, config: &SchedulerConfig) -> Result<(), IntentRejection> {
        if let Some(slot) = self.slot() {
            if slot >= config.toolbar_slots {
                return Err(IntentRejection::SlotOutOfRange {
                    slot,
                    slots: config.toolbar_slots,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentRejection {
    #[error("unknown intent kind '{0}'")]
    UnknownKind(String),
    #[error("missing required parameter '{0}'")]
    MissingParam(&'static str),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("toolbar slot {slot} out of range (expected 0..{slots})")]
    SlotOutOfRange { slot: u8, slots: u8 },
}

/// An intent waiting in the queue together with the completion it owes.
#[derive(Debug)]
pub struct PendingIntent {
    pub kind: IntentKind,
    pub completion: Completion,
}

impl PendingIntent {
    pub fn new(kind: IntentKind, completion: Completion) -> Self {
        Self { kind, completion }
    }

    pub fn id(&self) -> &CorrelationId {
        self.completion.id()
    }
}
