use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::grid::GridQuery;
use crate::tile::{Path, Tile};

pub const DEFAULT_MAX_EXPANSIONS: usize = 10_000;

/// Goal not walkable, goal enclosed, or search budget exhausted. Callers react the same
/// way to all three, so they are not told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no walkable path to goal")]
pub struct Unreachable;

/// Result of one search plus the number of nodes it closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSearch {
    pub outcome: Result<Path, Unreachable>,
    pub expansions: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Pathfinder {
    max_expansions: usize,
}

impl Default for Pathfinder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXPANSIONS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenKey {
    f_cost: u32,
    h_cost: u32,
    insertion_order: u64,
}

impl Pathfinder {
    pub fn new(max_expansions: usize) -> Self {
        Self {
            max_expansions: max_expansions.max(1),
        }
    }

    pub fn max_expansions(&self) -> usize {
        self.max_expansions
    }

    pub fn find_path(
        &self,
        grid: &dyn GridQuery,
        start: Tile,
        goal: Tile,
    ) -> Result<Path, Unreachable> {
        self.search(grid, start, goal).outcome
    }

    /// A* over the 4-connected grid with unit edge cost and a Manhattan heuristic.
    pub fn search(&self, grid: &dyn GridQuery, start: Tile, goal: Tile) -> PathSearch {
        if !grid.is_walkable(goal) {
            return PathSearch {
                outcome: Err(Unreachable),
                expansions: 0,
            };
        }
        if start == goal {
            return PathSearch {
                outcome: Ok(Path::empty()),
                expansions: 0,
            };
        }

        let mut open = BinaryHeap::new();
        let mut closed = HashSet::new();
        let mut best_g = HashMap::new();
        let mut parent = HashMap::new();
        let mut next_insertion = 0u64;
        let mut expansions = 0usize;

        let start_h = start.manhattan(goal);
        open.push(Reverse((
            OpenKey {
                f_cost: start_h,
                h_cost: start_h,
                insertion_order: next_insertion,
            },
            start,
        )));
        next_insertion = next_insertion.saturating_add(1);
        best_g.insert(start, 0u32);

        while let Some(Reverse((_, current))) = open.pop() {
            if !closed.insert(current) {
                continue;
            }
            if current == goal {
                let path = reconstruct_path(&parent, start, goal);
                return PathSearch {
                    outcome: Ok(path),
                    expansions,
                };
            }

            expansions += 1;
            if expansions > self.max_expansions {
                debug!(
                    start = %start,
                    goal = %goal,
                    budget = self.max_expansions,
                    "path_search_budget_exhausted"
                );
                return PathSearch {
                    outcome: Err(Unreachable),
                    expansions: self.max_expansions,
                };
            }

            let current_g = best_g.get(&current).copied().unwrap_or(u32::MAX);
            for neighbor in current.neighbors() {
                if closed.contains(&neighbor) || !grid.is_walkable(neighbor) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(1);
                match best_g.entry(neighbor) {
                    Entry::Occupied(mut existing) => {
                        if tentative_g >= *existing.get() {
                            continue;
                        }
                        existing.insert(tentative_g);
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(tentative_g);
                    }
                }
                parent.insert(neighbor, current);

                let h_cost = neighbor.manhattan(goal);
                open.push(Reverse((
                    OpenKey {
                        f_cost: tentative_g.saturating_add(h_cost),
                        h_cost,
                        insertion_order: next_insertion,
                    },
                    neighbor,
                )));
                next_insertion = next_insertion.saturating_add(1);
            }
        }

        PathSearch {
            outcome: Err(Unreachable),
            expansions,
        }
    }
}

fn reconstruct_path(parent: &HashMap<Tile, Tile>, start: Tile, goal: Tile) -> Path {
    let mut waypoints = vec![goal];
    let mut cursor = goal;
    while let Some(previous) = parent.get(&cursor).copied() {
        if previous == start {
            break;
        }
        waypoints.push(previous);
        cursor = previous;
    }
    waypoints.reverse();
    Path::new(waypoints)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct BoxGrid {
        width: i32,
        height: i32,
        blocked: HashSet<Tile>,
        queries: Cell<usize>,
    }

    impl BoxGrid {
        fn open(width: i32, height: i32) -> Self {
            Self {
                width,
                height,
                blocked: HashSet::new(),
                queries: Cell::new(0),
            }
        }

        fn with_blocked(mut self, tiles: impl IntoIterator<Item = Tile>) -> Self {
            self.blocked.extend(tiles);
            self
        }
    }

    impl GridQuery for BoxGrid {
        fn is_walkable(&self, tile: Tile) -> bool {
            self.queries.set(self.queries.get() + 1);
            tile.x >= 0
                && tile.y >= 0
                && tile.x < self.width
                && tile.y < self.height
                && !self.blocked.contains(&tile)
        }

        fn current_tile(&self) -> Tile {
            Tile::new(0, 0)
        }

        fn can_act(&self) -> bool {
            true
        }

        fn area_name(&self) -> String {
            "box".to_string()
        }

        fn tool_label(&self, _slot: Option<u8>) -> String {
            "hoe".to_string()
        }
    }

    fn walk(start: Tile, path: &Path) -> Tile {
        path.tiles().iter().fold(start, |position, next| {
            assert_eq!(position.manhattan(*next), 1, "path must be contiguous");
            *next
        })
    }

    #[test]
    fn open_grid_path_matches_manhattan_distance() {
        let grid = BoxGrid::open(10, 10);
        let pathfinder = Pathfinder::default();
        let start = Tile::new(0, 0);
        for goal in [
            Tile::new(9, 9),
            Tile::new(3, 7),
            Tile::new(0, 5),
            Tile::new(8, 0),
        ] {
            let path = pathfinder.find_path(&grid, start, goal).expect("reachable");
            assert_eq!(path.len() as u32, start.manhattan(goal));
            assert_eq!(path.last(), Some(goal));
            assert_eq!(walk(start, &path), goal);
        }
    }

    #[test]
    fn corner_to_corner_path_has_eighteen_steps_and_ends_on_goal() {
        let grid = BoxGrid::open(10, 10);
        let path = Pathfinder::default()
            .find_path(&grid, Tile::new(0, 0), Tile::new(9, 9))
            .expect("reachable");
        assert_eq!(path.len(), 18);
        assert_eq!(path.last(), Some(Tile::new(9, 9)));
        assert!(!path.tiles().contains(&Tile::new(0, 0)));
    }

    #[test]
    fn start_equal_to_goal_yields_empty_path() {
        let grid = BoxGrid::open(4, 4);
        let search = Pathfinder::default().search(&grid, Tile::new(2, 2), Tile::new(2, 2));
        assert_eq!(search.outcome, Ok(Path::empty()));
        assert_eq!(search.expansions, 0);
    }

    #[test]
    fn unwalkable_goal_is_rejected_without_expanding() {
        let grid = BoxGrid::open(10, 10).with_blocked([Tile::new(5, 5)]);
        let search = Pathfinder::default().search(&grid, Tile::new(0, 0), Tile::new(5, 5));
        assert_eq!(search.outcome, Err(Unreachable));
        assert_eq!(search.expansions, 0);
        assert_eq!(grid.queries.get(), 1);
    }

    #[test]
    fn path_detours_around_wall_and_never_steps_on_blocked_tile() {
        let wall = (0..4).map(|y| Tile::new(3, y));
        let grid = BoxGrid::open(7, 5).with_blocked(wall);
        let start = Tile::new(1, 2);
        let goal = Tile::new(5, 2);
        let path = Pathfinder::default()
            .find_path(&grid, start, goal)
            .expect("reachable around the wall");
        for tile in path.tiles() {
            assert!(grid.is_walkable(*tile), "stepped onto blocked tile {tile}");
        }
        assert!(path.is_contiguous_from(start));
        // Down two rows to the gap at y=4, across, and back up.
        assert_eq!(path.len(), 8);
    }

    #[test]
    fn enclosed_goal_is_unreachable() {
        let goal = Tile::new(5, 5);
        let ring = goal.neighbors();
        let grid = BoxGrid::open(10, 10).with_blocked(ring);
        let result = Pathfinder::default().find_path(&grid, Tile::new(0, 0), goal);
        assert_eq!(result, Err(Unreachable));
    }

    #[test]
    fn exhausted_budget_is_reported_as_unreachable() {
        let grid = BoxGrid::open(50, 50);
        let search = Pathfinder::new(5).search(&grid, Tile::new(0, 0), Tile::new(40, 40));
        assert_eq!(search.outcome, Err(Unreachable));
        assert_eq!(search.expansions, 5);
    }

    #[test]
    fn repeated_searches_return_equal_cost() {
        let grid = BoxGrid::open(8, 8).with_blocked([Tile::new(2, 2), Tile::new(4, 3)]);
        let pathfinder = Pathfinder::default();
        let first = pathfinder
            .find_path(&grid, Tile::new(0, 0), Tile::new(7, 6))
            .expect("first");
        let second = pathfinder
            .find_path(&grid, Tile::new(0, 0), Tile::new(7, 6))
            .expect("second");
        assert_eq!(first.len(), second.len());
    }
}
