//! Headless demo world the host simulates: a walled farm tilemap and one avatar.
//!
//! Input arrives as primitives collected during a scheduler tick and is applied in
//! [`DemoWorld::apply`] afterwards, so the scheduler always observes the previous tick.

use engine::{Direction, GridQuery, PrimitiveSink, Tile};
use thiserror::Error;

pub(crate) const TICKS_PER_TILE: u32 = 4;
pub(crate) const SWING_RECOVERY_TICKS: u32 = 18;

const GRASS: u16 = 0;
const SOIL: u16 = 1;
const FENCE: u16 = 2;
const WATER: u16 = 3;
const BLOCKED_TILE_IDS: [u16; 2] = [FENCE, WATER];

const TOOLBAR: [&str; 12] = [
    "Hoe",
    "Pickaxe",
    "Axe",
    "Watering Can",
    "Scythe",
    "Parsnip Seeds",
    "Fishing Rod",
    "Copper Pan",
    "",
    "",
    "",
    "",
];

const FARM_ROWS: [&str; 12] = [
    "################",
    "#..............#",
    "#..,,,,,.......#",
    "#..,,,,,...~~~.#",
    "#..,,,,,...~~~.#",
    "#..........~~~.#",
    "#####.######...#",
    "#..............#",
    "#..#######.....#",
    "#..#.....#.....#",
    "#........#.....#",
    "################",
];
const FARM_SPAWN: Tile = Tile { x: 2, y: 2 };

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum WorldError {
    #[error("tilemap has no rows")]
    EmptyMap,
    #[error("tilemap row {row} has {actual} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("unknown tile glyph '{glyph}' at ({column}, {row})")]
    UnknownGlyph {
        glyph: char,
        column: usize,
        row: usize,
    },
    #[error("spawn tile {0} is not walkable")]
    BlockedSpawn(Tile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tilemap {
    width: i32,
    height: i32,
    tiles: Vec<u16>,
}

impl Tilemap {
    /// `.` grass, `,` tilled soil, `#` fence, `~` water.
    pub(crate) fn from_rows(rows: &[&str]) -> Result<Self, WorldError> {
        let expected = rows.first().ok_or(WorldError::EmptyMap)?.chars().count();
        let mut tiles = Vec::with_capacity(expected * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let actual = line.chars().count();
            if actual != expected {
                return Err(WorldError::RaggedRow {
                    row,
                    expected,
                    actual,
                });
            }
            for (column, glyph) in line.chars().enumerate() {
                let id = match glyph {
                    '.' => GRASS,
                    ',' => SOIL,
                    '#' => FENCE,
                    '~' => WATER,
                    _ => {
                        return Err(WorldError::UnknownGlyph {
                            glyph,
                            column,
                            row,
                        })
                    }
                };
                tiles.push(id);
            }
        }
        Ok(Self {
            width: expected as i32,
            height: rows.len() as i32,
            tiles,
        })
    }

    fn tile_id(&self, tile: Tile) -> Option<u16> {
        if tile.x < 0 || tile.y < 0 || tile.x >= self.width || tile.y >= self.height {
            return None;
        }
        let index = tile.y as usize * self.width as usize + tile.x as usize;
        self.tiles.get(index).copied()
    }

    pub(crate) fn is_walkable(&self, tile: Tile) -> bool {
        self.tile_id(tile)
            .is_some_and(|id| !BLOCKED_TILE_IDS.contains(&id))
    }
}

/// Primitives pressed during one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct WorldInput {
    pub(crate) direction: Option<Direction>,
    pub(crate) use_tool: bool,
    pub(crate) select_slot: Option<u8>,
}

impl PrimitiveSink for WorldInput {
    fn press_direction(&mut self, direction: Direction) {
        self.direction = Some(direction);
    }

    fn press_use_tool(&mut self) {
        self.use_tool = true;
    }

    fn select_tool_slot(&mut self, slot: u8) {
        self.select_slot = Some(slot);
    }
}

#[derive(Debug, Clone)]
struct Avatar {
    tile: Tile,
    walk_direction: Option<Direction>,
    walk_progress: u32,
    tool_held: bool,
    recovery_ticks: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct DemoWorld {
    area: String,
    map: Tilemap,
    avatar: Avatar,
    selected_slot: u8,
    tool_uses: u64,
}

impl DemoWorld {
    pub(crate) fn new(area: &str, map: Tilemap, spawn: Tile) -> Result<Self, WorldError> {
        if !map.is_walkable(spawn) {
            return Err(WorldError::BlockedSpawn(spawn));
        }
        Ok(Self {
            area: area.to_string(),
            map,
            avatar: Avatar {
                tile: spawn,
                walk_direction: None,
                walk_progress: 0,
                tool_held: false,
                recovery_ticks: 0,
            },
            selected_slot: 0,
            tool_uses: 0,
        })
    }

    pub(crate) fn demo_farm() -> Result<Self, WorldError> {
        Self::new("Farm", Tilemap::from_rows(&FARM_ROWS)?, FARM_SPAWN)
    }

    pub(crate) fn tool_uses(&self) -> u64 {
        self.tool_uses
    }

    /// Applies one tick of input. A held tool blocks walking; releasing it starts the
    /// swing recovery during which the avatar cannot act.
    pub(crate) fn apply(&mut self, input: &WorldInput) {
        if let Some(slot) = input.select_slot {
            if usize::from(slot) < TOOLBAR.len() {
                self.selected_slot = slot;
            }
        }

        let avatar = &mut self.avatar;
        avatar.recovery_ticks = avatar.recovery_ticks.saturating_sub(1);

        if input.use_tool {
            if !avatar.tool_held && avatar.recovery_ticks == 0 {
                avatar.tool_held = true;
                self.tool_uses = self.tool_uses.saturating_add(1);
            }
        } else if avatar.tool_held {
            avatar.tool_held = false;
            avatar.recovery_ticks = SWING_RECOVERY_TICKS;
        }

        let can_walk = !avatar.tool_held && avatar.recovery_ticks == 0;
        match input.direction {
            Some(direction) if can_walk => {
                if avatar.walk_direction == Some(direction) {
                    avatar.walk_progress = avatar.walk_progress.saturating_add(1);
                } else {
                    avatar.walk_direction = Some(direction);
                    avatar.walk_progress = 1;
                }
                if avatar.walk_progress >= TICKS_PER_TILE {
                    avatar.walk_progress = 0;
                    let next = avatar.tile.offset(direction);
                    if self.map.is_walkable(next) {
                        avatar.tile = next;
                    }
                }
            }
            _ => {
                avatar.walk_direction = None;
                avatar.walk_progress = 0;
            }
        }
    }
}

impl GridQuery for DemoWorld {
    fn is_walkable(&self, tile: Tile) -> bool {
        self.map.is_walkable(tile)
    }

    fn current_tile(&self) -> Tile {
        self.avatar.tile
    }

    fn can_act(&self) -> bool {
        !self.avatar.tool_held && self.avatar.recovery_ticks == 0
    }

    fn area_name(&self) -> String {
        self.area.clone()
    }

    fn tool_label(&self, slot: Option<u8>) -> String {
        let slot = slot.unwrap_or(self.selected_slot);
        match TOOLBAR.get(usize::from(slot)) {
            Some(label) if !label.is_empty() => (*label).to_string(),
            _ => "nothing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use engine::{
        ActionScheduler, CorrelationId, IntentKind, IntentQueue, Outcome, OutcomeData,
        SchedulerConfig,
    };

    use super::*;

    fn press(direction: Direction) -> WorldInput {
        WorldInput {
            direction: Some(direction),
            ..WorldInput::default()
        }
    }

    fn tool() -> WorldInput {
        WorldInput {
            use_tool: true,
            ..WorldInput::default()
        }
    }

    #[test]
    fn walking_one_tile_takes_ticks_per_tile_presses() {
        let mut world = DemoWorld::demo_farm().expect("farm");
        for _ in 0..TICKS_PER_TILE - 1 {
            world.apply(&press(Direction::Right));
        }
        assert_eq!(world.current_tile(), FARM_SPAWN);
        world.apply(&press(Direction::Right));
        assert_eq!(world.current_tile(), Tile::new(3, 2));
    }

    #[test]
    fn fences_block_movement() {
        let mut world = DemoWorld::demo_farm().expect("farm");
        for _ in 0..TICKS_PER_TILE * 3 {
            world.apply(&press(Direction::Up));
        }
        assert_eq!(world.current_tile(), Tile::new(2, 1));
    }

    #[test]
    fn releasing_a_tool_locks_actions_for_the_recovery_window() {
        let mut world = DemoWorld::demo_farm().expect("farm");
        world.apply(&tool());
        assert!(!world.can_act());
        world.apply(&WorldInput::default());
        assert!(!world.can_act());
        for _ in 0..SWING_RECOVERY_TICKS - 1 {
            world.apply(&WorldInput::default());
        }
        assert!(!world.can_act());
        world.apply(&WorldInput::default());
        assert!(world.can_act());
        assert_eq!(world.tool_uses(), 1);
    }

    #[test]
    fn selecting_a_slot_changes_the_tool_label() {
        let mut world = DemoWorld::demo_farm().expect("farm");
        assert_eq!(world.tool_label(None), "Hoe");
        assert_eq!(world.tool_label(Some(3)), "Watering Can");
        world.apply(&WorldInput {
            select_slot: Some(2),
            ..WorldInput::default()
        });
        assert_eq!(world.tool_label(None), "Axe");
        assert_eq!(world.tool_label(Some(10)), "nothing");
    }

    #[test]
    fn tilemap_rejects_ragged_rows_and_unknown_glyphs() {
        assert_eq!(
            Tilemap::from_rows(&["...", ".."]),
            Err(WorldError::RaggedRow {
                row: 1,
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            Tilemap::from_rows(&[".x."]),
            Err(WorldError::UnknownGlyph {
                glyph: 'x',
                column: 1,
                row: 0
            })
        );
        assert_eq!(Tilemap::from_rows(&[]), Err(WorldError::EmptyMap));
    }

    #[test]
    fn scheduler_walks_the_avatar_through_the_fence_gap() {
        let mut world = DemoWorld::demo_farm().expect("farm");
        let (sender, queue) = IntentQueue::new();
        let mut scheduler = ActionScheduler::new(SchedulerConfig::default(), queue);
        let inbox: Arc<Mutex<Vec<Outcome>>> = Arc::default();
        let sink = Arc::clone(&inbox);
        sender
            .submit(
                CorrelationId::new("walk"),
                IntentKind::MoveTo {
                    goal: Tile::new(6, 9),
                },
                move |outcome| sink.lock().expect("inbox").push(outcome),
            )
            .expect("submit");

        for _ in 0..2_000 {
            let mut input = WorldInput::default();
            scheduler.tick(&world, &mut input);
            world.apply(&input);
            if !inbox.lock().expect("inbox").is_empty() {
                break;
            }
        }

        let outcomes = inbox.lock().expect("inbox");
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert!(matches!(
            outcomes[0].data,
            OutcomeData::Movement { arrived: true, x: 6, y: 9, .. }
        ));
        assert_eq!(world.current_tile(), Tile::new(6, 9));
    }
}
