//! Keyboard input mapped to paddle directions

use macroquad::prelude::*;
use shared::Direction;

/// Up wins over nothing, down wins over nothing, both cancel out
pub fn direction_from_keys(up: bool, down: bool) -> Direction {
    match (up, down) {
        (true, false) => Direction::Up,
        (false, true) => Direction::Down,
        _ => Direction::Stop,
    }
}

/// Tracks the held direction and reports only changes
pub struct InputManager {
    current: Direction,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            current: Direction::Stop,
        }
    }

    /// Samples the keyboard. Returns the new direction if it changed this frame.
    pub fn update(&mut self) -> Option<Direction> {
        let up = is_key_down(KeyCode::Up) || is_key_down(KeyCode::W);
        let down = is_key_down(KeyCode::Down) || is_key_down(KeyCode::S);
        self.apply(direction_from_keys(up, down))
    }

    fn apply(&mut self, direction: Direction) -> Option<Direction> {
        if direction == self.current {
            return None;
        }
        self.current = direction;
        Some(direction)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
