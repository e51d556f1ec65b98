mod movement;
mod tools;

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::grid::{GridQuery, PrimitiveSink};
use crate::intent::{IntentKind, PendingIntent};
use crate::ledger::{ActiveKind, Completion, OutcomeData};
use crate::pathfinder::Pathfinder;
use crate::queue::IntentQueue;
use crate::tile::Tile;

use movement::{MoveStep, MovementFollower};
use tools::{TimerStep, ToolChargeTimer, ToolRepeatTimer};

/// The one timed action the mover is busy with.
///
/// Installing a new action always displaces the previous one (see
/// [`ActionScheduler::install`]). Only a movement displacing a movement is silent; every
/// other displacement resolves the displaced completion as a failure.
#[derive(Debug, Default)]
pub(crate) enum ActiveAction {
    #[default]
    Idle,
    Moving(MovementFollower),
    Repeating(ToolRepeatTimer),
    Charging(ToolChargeTimer),
}

impl ActiveAction {
    pub(crate) fn kind(&self) -> ActiveKind {
        match self {
            Self::Idle => ActiveKind::Idle,
            Self::Moving(_) => ActiveKind::Moving,
            Self::Repeating(_) => ActiveKind::Repeating,
            Self::Charging(_) => ActiveKind::Charging,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub resolved: u64,
    pub rejected: u64,
}

/// Tick-driven executor for controller intents.
///
/// Owned by the tick thread. Producers only ever reach it through the [`IntentQueue`].
#[derive(Debug)]
pub struct ActionScheduler {
    config: SchedulerConfig,
    pathfinder: Pathfinder,
    queue: IntentQueue,
    active: ActiveAction,
    stats: SchedulerStats,
}

impl ActionScheduler {
    pub fn new(config: SchedulerConfig, queue: IntentQueue) -> Self {
        let pathfinder = Pathfinder::new(config.max_path_expansions);
        Self {
            config,
            pathfinder,
            queue,
            active: ActiveAction::Idle,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn active_kind(&self) -> ActiveKind {
        self.active.kind()
    }

    pub fn queued_intents(&self) -> usize {
        self.queue.len()
    }

    /// Next waypoint of the active follower, if moving.
    pub fn next_waypoint(&self) -> Option<Tile> {
        match &self.active {
            ActiveAction::Moving(follower) => follower.current_waypoint(),
            _ => None,
        }
    }

    /// One fixed simulation step. Never blocks; waiting means returning having done nothing.
    ///
    /// Order: dequeue (unless a repeat timer holds the gate), then advance movement,
    /// then the repeat timer, then the charge timer.
    pub fn tick(&mut self, grid: &dyn GridQuery, input: &mut dyn PrimitiveSink) {
        self.stats.ticks = self.stats.ticks.saturating_add(1);

        if !matches!(self.active, ActiveAction::Repeating(_)) {
            if let Some(intent) = self.queue.try_pop() {
                self.dispatch(intent, grid, input);
            }
        }

        self.advance_movement(grid, input);
        self.advance_repeat(grid, input);
        self.advance_charge(input);
    }

    fn dispatch(
        &mut self,
        intent: PendingIntent,
        grid: &dyn GridQuery,
        input: &mut dyn PrimitiveSink,
    ) {
        self.stats.dispatched = self.stats.dispatched.saturating_add(1);
        let PendingIntent { kind, completion } = intent;
        let kind_name = kind.name();
        debug!(id = %completion.id(), kind = kind_name, "intent_dispatched");

        if let Err(rejection) = kind.validate(&self.config) {
            warn!(
                id = %completion.id(),
                kind = kind.name(),
                reason = %rejection,
                "intent_rejected"
            );
            self.stats.rejected = self.stats.rejected.saturating_add(1);
            self.finish(completion, false, rejection.to_string(), OutcomeData::Empty {});
            return;
        }

        match kind {
            IntentKind::MoveTo { goal } => self.dispatch_move(goal, completion, grid),
            IntentKind::Stop => self.dispatch_stop(completion),
            IntentKind::UseToolOnce { slot } => {
                let tool = grid.tool_label(slot);
                if !grid.can_act() {
                    self.finish(
                        completion,
                        false,
                        "cannot act right now",
                        OutcomeData::ToolOnce { tool },
                    );
                    return;
                }
                if let Some(slot) = slot {
                    input.select_tool_slot(slot);
                }
                input.press_use_tool();
                self.finish(
                    completion,
                    true,
                    format!("used {tool}"),
                    OutcomeData::ToolOnce { tool },
                );
            }
            IntentKind::UseToolRepeat { count, slot } => {
                let swings = self.config.clamp_swings(count);
                let tool = grid.tool_label(slot);
                if let Some(slot) = slot {
                    input.select_tool_slot(slot);
                }
                info!(
                    id = %completion.id(),
                    requested = count,
                    swings,
                    tool = %tool,
                    "tool_repeat_accepted"
                );
                self.install(
                    ActiveAction::Repeating(ToolRepeatTimer::new(swings, tool, completion)),
                    kind_name,
                    grid,
                );
            }
            IntentKind::HoldTool { ticks, slot } => {
                let ticks_clamped = self.config.clamp_hold_ticks(ticks);
                let tool = grid.tool_label(slot);
                if let Some(slot) = slot {
                    input.select_tool_slot(slot);
                }
                info!(
                    id = %completion.id(),
                    requested = ticks,
                    ticks = ticks_clamped,
                    tool = %tool,
                    "tool_hold_accepted"
                );
                self.install(
                    ActiveAction::Charging(ToolChargeTimer::new(ticks_clamped, tool, completion)),
                    kind_name,
                    grid,
                );
            }
            IntentKind::FindPath { goal } => {
                let start = grid.current_tile();
                match self.pathfinder.find_path(grid, start, goal) {
                    Ok(path) => self.finish(
                        completion,
                        true,
                        format!("{} steps to {goal}", path.len()),
                        OutcomeData::PathPlan {
                            reachable: true,
                            waypoints: path.tiles().to_vec(),
                        },
                    ),
                    Err(unreachable) => self.finish(
                        completion,
                        false,
                        format!("{unreachable} {goal}"),
                        OutcomeData::PathPlan {
                            reachable: false,
                            waypoints: Vec::new(),
                        },
                    ),
                }
            }
            IntentKind::Status => {
                let at = grid.current_tile();
                let data = OutcomeData::Status {
                    x: at.x,
                    y: at.y,
                    area: grid.area_name(),
                    can_act: grid.can_act(),
                    tool: grid.tool_label(None),
                    active: self.active.kind(),
                    tick: self.stats.ticks,
                };
                self.finish(completion, true, "status", data);
            }
        }
    }

    fn dispatch_move(&mut self, goal: Tile, completion: Completion, grid: &dyn GridQuery) {
        let start = grid.current_tile();
        let search = self.pathfinder.search(grid, start, goal);
        match search.outcome {
            Ok(path) => {
                info!(
                    id = %completion.id(),
                    from = %start,
                    goal = %goal,
                    waypoints = path.len(),
                    expansions = search.expansions,
                    "move_accepted"
                );
                self.install(
                    ActiveAction::Moving(MovementFollower::new(path, goal, completion)),
                    "move_to",
                    grid,
                );
            }
            Err(unreachable) => {
                info!(
                    id = %completion.id(),
                    from = %start,
                    goal = %goal,
                    expansions = search.expansions,
                    "move_unreachable"
                );
                self.finish(
                    completion,
                    false,
                    format!("{unreachable} {goal}"),
                    OutcomeData::Movement {
                        arrived: false,
                        x: start.x,
                        y: start.y,
                        area: None,
                        attempts: None,
                    },
                );
            }
        }
    }

    /// Installs `next`, displacing whatever was active.
    ///
    /// A movement replacing a movement abandons the old follower's completion unresolved.
    /// Any other displaced action is resolved as a failure naming the intent that took over.
    fn install(&mut self, next: ActiveAction, by: &'static str, grid: &dyn GridQuery) {
        let next_is_move = matches!(next, ActiveAction::Moving(_));
        match std::mem::replace(&mut self.active, next) {
            ActiveAction::Idle => {}
            ActiveAction::Moving(follower) if next_is_move => {
                info!(superseded = %follower.completion.id(), "move_superseded");
                follower.completion.abandon();
            }
            displaced => self.resolve_displaced(displaced, by, grid),
        }
    }

    fn resolve_displaced(
        &mut self,
        displaced: ActiveAction,
        by: &'static str,
        grid: &dyn GridQuery,
    ) {
        let kind = displaced.kind();
        let message = format!("superseded by {by}");
        let (completion, data) = match displaced {
            ActiveAction::Idle => return,
            ActiveAction::Moving(follower) => {
                let at = grid.current_tile();
                let data = OutcomeData::Movement {
                    arrived: false,
                    x: at.x,
                    y: at.y,
                    area: None,
                    attempts: None,
                };
                (follower.completion, data)
            }
            ActiveAction::Repeating(timer) => {
                let data = OutcomeData::ToolRepeat {
                    swings: timer.swings_done(),
                    tool: timer.tool_label,
                };
                (timer.completion, data)
            }
            ActiveAction::Charging(timer) => {
                let data = OutcomeData::ToolHold {
                    ticks: timer.ticks_charged(),
                    tool: timer.tool_label,
                };
                (timer.completion, data)
            }
        };
        warn!(id = %completion.id(), kind = ?kind, by, "action_superseded");
        self.finish(completion, false, message, data);
    }

    /// Clears movement without resolving its completion; tool timers keep running.
    fn dispatch_stop(&mut self, completion: Completion) {
        let was_moving = matches!(self.active, ActiveAction::Moving(_));
        if was_moving {
            if let ActiveAction::Moving(follower) = std::mem::take(&mut self.active) {
                info!(cancelled = %follower.completion.id(), "move_stopped");
                follower.completion.abandon();
            }
        }
        self.finish(
            completion,
            true,
            if was_moving { "stopped" } else { "not moving" },
            OutcomeData::Stopped { was_moving },
        );
    }

    fn advance_movement(&mut self, grid: &dyn GridQuery, input: &mut dyn PrimitiveSink) {
        let ActiveAction::Moving(follower) = &mut self.active else {
            return;
        };
        let step = follower.advance(grid, input, &self.pathfinder, &self.config);
        if step == MoveStep::Following {
            return;
        }
        let ActiveAction::Moving(follower) = std::mem::take(&mut self.active) else {
            return;
        };

        match step {
            MoveStep::Following => {}
            MoveStep::Arrived { at } => {
                let area = grid.area_name();
                info!(id = %follower.completion.id(), at = %at, area = %area, "move_arrived");
                self.finish(
                    follower.completion,
                    true,
                    format!("arrived at {at}"),
                    OutcomeData::Movement {
                        arrived: true,
                        x: at.x,
                        y: at.y,
                        area: Some(area),
                        attempts: None,
                    },
                );
            }
            MoveStep::StuckExhausted { at, attempts } => {
                warn!(
                    id = %follower.completion.id(),
                    at = %at,
                    goal = %follower.goal,
                    attempts,
                    "move_stuck_gave_up"
                );
                self.finish(
                    follower.completion,
                    false,
                    format!("stuck at {at} after {attempts} attempts"),
                    OutcomeData::Movement {
                        arrived: false,
                        x: at.x,
                        y: at.y,
                        area: None,
                        attempts: Some(attempts),
                    },
                );
            }
            MoveStep::ReplanFailed { at, attempts } => {
                warn!(
                    id = %follower.completion.id(),
                    at = %at,
                    goal = %follower.goal,
                    attempts,
                    "move_replan_failed"
                );
                self.finish(
                    follower.completion,
                    false,
                    format!("no path from {at} to {} after getting stuck", follower.goal),
                    OutcomeData::Movement {
                        arrived: false,
                        x: at.x,
                        y: at.y,
                        area: None,
                        attempts: Some(attempts),
                    },
                );
            }
        }
    }

    fn advance_repeat(&mut self, grid: &dyn GridQuery, input: &mut dyn PrimitiveSink) {
        let ActiveAction::Repeating(timer) = &mut self.active else {
            return;
        };
        if timer.advance(grid, input, &self.config) != TimerStep::Done {
            return;
        }
        let ActiveAction::Repeating(timer) = std::mem::take(&mut self.active) else {
            return;
        };
        let swings = timer.swings_done();
        info!(id = %timer.completion.id(), swings, tool = %timer.tool_label, "tool_repeat_done");
        self.finish(
            timer.completion,
            true,
            format!("{swings} swings with {}", timer.tool_label),
            OutcomeData::ToolRepeat {
                swings,
                tool: timer.tool_label,
            },
        );
    }

    fn advance_charge(&mut self, input: &mut dyn PrimitiveSink) {
        let ActiveAction::Charging(timer) = &mut self.active else {
            return;
        };
        if timer.advance(input) != TimerStep::Done {
            return;
        }
        let ActiveAction::Charging(timer) = std::mem::take(&mut self.active) else {
            return;
        };
        info!(
            id = %timer.completion.id(),
            ticks = timer.total_ticks,
            tool = %timer.tool_label,
            "tool_hold_released"
        );
        self.finish(
            timer.completion,
            true,
            format!("charged {} for {} ticks", timer.tool_label, timer.total_ticks),
            OutcomeData::ToolHold {
                ticks: timer.total_ticks,
                tool: timer.tool_label,
            },
        );
    }

    fn finish(
        &mut self,
        completion: Completion,
        success: bool,
        message: impl Into<String>,
        data: OutcomeData,
    ) {
        self.stats.resolved = self.stats.resolved.saturating_add(1);
        if success {
            completion.succeed(message, data);
        } else {
            completion.fail(message, data);
        }
    }
}
