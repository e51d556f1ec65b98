use crate::tile::{Direction, Tile};

/// Read-only view of the world the scheduler acts in.
///
/// The engine never owns world state. Answers may change between ticks (debris spawns,
/// another occupant steps in the way); the movement follower re-plans when that happens.
pub trait GridQuery {
    /// Terrain passability, object occupancy and transient occupants folded into one answer.
    fn is_walkable(&self, tile: Tile) -> bool;

    /// Tile the mover currently occupies.
    fn current_tile(&self) -> Tile;

    /// False while the mover is mid-animation or otherwise unable to take a new action.
    fn can_act(&self) -> bool;

    /// Identity of the area the mover is in, reported on arrival.
    fn area_name(&self) -> String;

    /// Label of the tool in `slot`, or of the held tool when `slot` is `None`.
    fn tool_label(&self, slot: Option<u8>) -> String;
}

/// Fire-and-forget per-tick input injection. Nothing is confirmed; the scheduler only
/// observes the effect through [`GridQuery`] on a later tick.
pub trait PrimitiveSink {
    fn press_direction(&mut self, direction: Direction);

    fn press_use_tool(&mut self);

    fn select_tool_slot(&mut self, slot: u8);
}

/// One emitted primitive, used by recorders and by the host to replay a tick's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Direction(Direction),
    UseTool,
    SelectSlot(u8),
}

/// Sink that keeps every primitive for later inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimitiveRecorder {
    primitives: Vec<Primitive>,
}

impl PrimitiveRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn drain(&mut self) -> Vec<Primitive> {
        std::mem::take(&mut self.primitives)
    }

    pub fn use_tool_count(&self) -> usize {
        self.primitives
            .iter()
            .filter(|primitive| matches!(primitive, Primitive::UseTool))
            .count()
    }
}

impl PrimitiveSink for PrimitiveRecorder {
    fn press_direction(&mut self, direction: Direction) {
        self.primitives.push(Primitive::Direction(direction));
    }

    fn press_use_tool(&mut self) {
        self.primitives.push(Primitive::UseTool);
    }

    fn select_tool_slot(&mut self, slot: u8) {
        self.primitives.push(Primitive::SelectSlot(slot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_keeps_emission_order_and_drains() {
        let mut recorder = PrimitiveRecorder::new();
        recorder.select_tool_slot(3);
        recorder.press_use_tool();
        recorder.press_direction(Direction::Left);
        recorder.press_use_tool();

        assert_eq!(recorder.use_tool_count(), 2);
        assert_eq!(
            recorder.drain(),
            vec![
                Primitive::SelectSlot(3),
                Primitive::UseTool,
                Primitive::Direction(Direction::Left),
                Primitive::UseTool,
            ]
        );
        assert!(recorder.primitives().is_empty());
    }
}
