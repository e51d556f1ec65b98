use tracing::debug;

use crate::config::SchedulerConfig;
use crate::grid::{GridQuery, PrimitiveSink};
use crate::ledger::Completion;

/// Discrete swings separated by a cooldown. There is no timeout: the timer only moves
/// when the mover can act, so an animation lock pauses it instead of failing it.
#[derive(Debug)]
pub(crate) struct ToolRepeatTimer {
    pub(crate) total_swings: u32,
    pub(crate) remaining_swings: u32,
    pub(crate) cooldown_ticks_left: u32,
    pub(crate) tool_label: String,
    pub(crate) completion: Completion,
}

/// Continuous press for a fixed number of ticks. Ceasing to press is the release.
#[derive(Debug)]
pub(crate) struct ToolChargeTimer {
    pub(crate) total_ticks: u32,
    pub(crate) remaining_ticks: u32,
    pub(crate) released: bool,
    pub(crate) tool_label: String,
    pub(crate) completion: Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerStep {
    Cooldown,
    Waiting,
    Pressed,
    Done,
}

impl ToolRepeatTimer {
    pub(crate) fn new(swings: u32, tool_label: String, completion: Completion) -> Self {
        Self {
            total_swings: swings,
            remaining_swings: swings,
            cooldown_ticks_left: 0,
            tool_label,
            completion,
        }
    }

    pub(crate) fn swings_done(&self) -> u32 {
        self.total_swings.saturating_sub(self.remaining_swings)
    }

    pub(crate) fn advance(
        &mut self,
        grid: &dyn GridQuery,
        input: &mut dyn PrimitiveSink,
        config: &SchedulerConfig,
    ) -> TimerStep {
        if self.cooldown_ticks_left > 0 {
            self.cooldown_ticks_left -= 1;
            return TimerStep::Cooldown;
        }
        if !grid.can_act() {
            return TimerStep::Waiting;
        }

        input.press_use_tool();
        self.remaining_swings = self.remaining_swings.saturating_sub(1);
        self.cooldown_ticks_left = config.swing_cooldown_ticks;
        debug!(
            id = %self.completion.id(),
            swing = self.swings_done(),
            total = self.total_swings,
            "tool_repeat_swing"
        );

        if self.remaining_swings == 0 {
            TimerStep::Done
        } else {
            TimerStep::Pressed
        }
    }
}

impl ToolChargeTimer {
    pub(crate) fn new(ticks: u32, tool_label: String, completion: Completion) -> Self {
        Self {
            total_ticks: ticks,
            remaining_ticks: ticks,
            released: false,
            tool_label,
            completion,
        }
    }

    pub(crate) fn ticks_charged(&self) -> u32 {
        self.total_ticks.saturating_sub(self.remaining_ticks)
    }

    pub(crate) fn advance(&mut self, input: &mut dyn PrimitiveSink) -> TimerStep {
        if self.released {
            return TimerStep::Done;
        }
        input.press_use_tool();
        self.remaining_ticks = self.remaining_ticks.saturating_sub(1);
        if self.remaining_ticks == 0 {
            self.released = true;
            TimerStep::Done
        } else {
            TimerStep::Pressed
        }
    }
}
