use tracing::{debug, info, trace};

use crate::config::SchedulerConfig;
use crate::grid::{GridQuery, PrimitiveSink};
use crate::ledger::Completion;
use crate::pathfinder::Pathfinder;
use crate::tile::{Direction, Path, Tile};

/// Advances the mover along one path. At most one exists; see [`super::ActiveAction`].
#[derive(Debug)]
pub(crate) struct MovementFollower {
    pub(crate) path: Path,
    pub(crate) cursor: usize,
    pub(crate) goal: Tile,
    pub(crate) stuck_ticks: u32,
    pub(crate) replan_attempts: u32,
    pub(crate) completion: Completion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MoveStep {
    Following,
    Arrived { at: Tile },
    StuckExhausted { at: Tile, attempts: u32 },
    ReplanFailed { at: Tile, attempts: u32 },
}

impl MovementFollower {
    pub(crate) fn new(path: Path, goal: Tile, completion: Completion) -> Self {
        Self {
            path,
            cursor: 0,
            goal,
            stuck_ticks: 0,
            replan_attempts: 0,
            completion,
        }
    }

    pub(crate) fn current_waypoint(&self) -> Option<Tile> {
        self.path.get(self.cursor)
    }

    fn is_complete(&self) -> bool {
        self.cursor >= self.path.len()
    }

    /// One Following tick: compare the real tile with the waypoint under the cursor,
    /// press toward it, and re-plan once the stuck window has elapsed.
    pub(crate) fn advance(
        &mut self,
        grid: &dyn GridQuery,
        input: &mut dyn PrimitiveSink,
        pathfinder: &Pathfinder,
        config: &SchedulerConfig,
    ) -> MoveStep {
        let current = grid.current_tile();
        let mut progressed = false;
        if self.current_waypoint() == Some(current) {
            self.cursor = self.cursor.saturating_add(1);
            self.stuck_ticks = 0;
            progressed = true;
        }

        if self.is_complete() {
            return MoveStep::Arrived { at: current };
        }

        if let Some(direction) = self
            .current_waypoint()
            .and_then(|waypoint| Direction::toward(current, waypoint))
        {
            trace!(id = %self.completion.id(), direction = direction.as_token(), "move_press");
            input.press_direction(direction);
        }

        if progressed {
            return MoveStep::Following;
        }

        self.stuck_ticks = self.stuck_ticks.saturating_add(1);
        if self.stuck_ticks <= config.stuck_threshold_ticks {
            return MoveStep::Following;
        }

        self.replan_attempts = self.replan_attempts.saturating_add(1);
        if self.replan_attempts >= config.max_replan_attempts {
            return MoveStep::StuckExhausted {
                at: current,
                attempts: self.replan_attempts,
            };
        }

        match pathfinder.find_path(grid, current, self.goal) {
            Ok(path) => {
                info!(
                    id = %self.completion.id(),
                    at = %current,
                    goal = %self.goal,
                    attempt = self.replan_attempts,
                    waypoints = path.len(),
                    "move_stuck_replanned"
                );
                self.path = path;
                self.cursor = 0;
                self.stuck_ticks = 0;
                MoveStep::Following
            }
            Err(_) => {
                debug!(
                    id = %self.completion.id(),
                    at = %current,
                    goal = %self.goal,
                    "move_replan_unreachable"
                );
                MoveStep::ReplanFailed {
                    at: current,
                    attempts: self.replan_attempts,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::grid::{Primitive, PrimitiveRecorder};
    use crate::ledger::CorrelationId;

    struct StillGrid {
        at: Cell<Tile>,
    }

    impl GridQuery for StillGrid {
        fn is_walkable(&self, _tile: Tile) -> bool {
            true
        }

        fn current_tile(&self) -> Tile {
            self.at.get()
        }

        fn can_act(&self) -> bool {
            true
        }

        fn area_name(&self) -> String {
            "field".to_string()
        }

        fn tool_label(&self, _slot: Option<u8>) -> String {
            "hoe".to_string()
        }
    }

    fn follower_to(goal: Tile, path: Vec<Tile>) -> MovementFollower {
        MovementFollower::new(
            Path::new(path),
            goal,
            Completion::new(CorrelationId::new("f"), |_| {}),
        )
    }

    #[test]
    fn reaching_a_waypoint_resets_stuck_counter_and_presses_toward_next() {
        let grid = StillGrid {
            at: Cell::new(Tile::new(0, 0)),
        };
        let config = SchedulerConfig::default();
        let pathfinder = Pathfinder::default();
        let mut follower = follower_to(Tile::new(1, 1), vec![Tile::new(1, 0), Tile::new(1, 1)]);
        let mut input = PrimitiveRecorder::new();

        assert_eq!(
            follower.advance(&grid, &mut input, &pathfinder, &config),
            MoveStep::Following
        );
        assert_eq!(follower.stuck_ticks, 1);

        grid.at.set(Tile::new(1, 0));
        assert_eq!(
            follower.advance(&grid, &mut input, &pathfinder, &config),
            MoveStep::Following
        );
        assert_eq!(follower.cursor, 1);
        assert_eq!(follower.stuck_ticks, 0);
        assert_eq!(
            input.drain(),
            vec![
                Primitive::Direction(Direction::Right),
                Primitive::Direction(Direction::Down)
            ]
        );

        grid.at.set(Tile::new(1, 1));
        assert_eq!(
            follower.advance(&grid, &mut input, &pathfinder, &config),
            MoveStep::Arrived {
                at: Tile::new(1, 1)
            }
        );
        assert!(input.primitives().is_empty());
    }

    #[test]
    fn empty_path_arrives_on_first_advance() {
        let grid = StillGrid {
            at: Cell::new(Tile::new(2, 2)),
        };
        let mut follower = follower_to(Tile::new(2, 2), Vec::new());
        let mut input = PrimitiveRecorder::new();
        let step = follower.advance(
            &grid,
            &mut input,
            &Pathfinder::default(),
            &SchedulerConfig::default(),
        );
        assert_eq!(step, MoveStep::Arrived { at: Tile::new(2, 2) });
        assert!(input.primitives().is_empty());
    }

    #[test]
    fn exceeding_stuck_window_replans_from_current_tile() {
        let grid = StillGrid {
            at: Cell::new(Tile::new(0, 0)),
        };
        let config = SchedulerConfig {
            stuck_threshold_ticks: 3,
            ..SchedulerConfig::default()
        };
        let pathfinder = Pathfinder::default();
        let mut follower = follower_to(Tile::new(0, 2), vec![Tile::new(0, 1), Tile::new(0, 2)]);
        follower.cursor = 1;
        let mut input = PrimitiveRecorder::new();

        for _ in 0..3 {
            follower.advance(&grid, &mut input, &pathfinder, &config);
        }
        assert_eq!(follower.replan_attempts, 0);
        follower.advance(&grid, &mut input, &pathfinder, &config);
        assert_eq!(follower.replan_attempts, 1);
        assert_eq!(follower.cursor, 0);
        assert_eq!(follower.stuck_ticks, 0);
        assert_eq!(
            follower.path.tiles(),
            &[Tile::new(0, 1), Tile::new(0, 2)][..]
        );
    }
}
