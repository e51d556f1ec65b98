//! Action-execution engine: turns controller intents into per-tick avatar input.
//!
//! Producers submit through an [`IntentSender`]; the tick thread owns the
//! [`ActionScheduler`] and calls [`ActionScheduler::tick`] once per fixed step.

pub mod config;
pub mod grid;
pub mod intent;
pub mod ledger;
pub mod pathfinder;
pub mod protocol;
pub mod queue;
mod scheduler;
pub mod tile;

pub use config::{SchedulerConfig, DEFAULT_TICKS_PER_SECOND};
pub use grid::{GridQuery, Primitive, PrimitiveRecorder, PrimitiveSink};
pub use intent::{IntentKind, IntentRejection, PendingIntent};
pub use ledger::{ActiveKind, Completion, CorrelationId, Outcome, OutcomeCallback, OutcomeData};
pub use pathfinder::{PathSearch, Pathfinder, Unreachable};
pub use protocol::{
    decode_request, parse_wire_line, rejection_outcome, Frame, LineChannel, ParsedLine,
    ProtocolError, Request, ServerMessage, PROTOCOL_VERSION,
};
pub use queue::{Ack, AckStatus, IntentQueue, IntentSender, SubmitError};
pub use scheduler::{ActionScheduler, SchedulerStats};
pub use tile::{Direction, Path, Tile};
