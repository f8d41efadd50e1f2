use crate::game::{ClientGameState, ClientStatus};
use macroquad::prelude::*;
use shared::{Bounds, PlayerId};

const BACKGROUND: Color = Color::new(0.1, 0.1, 0.1, 1.0);
const COURT_LINE: Color = Color::new(0.27, 0.27, 0.27, 1.0);
const OPPONENT: Color = Color::new(1.0, 0.27, 0.27, 1.0);

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, state: &ClientGameState) {
        self.width = screen_width();
        self.height = screen_height();

        clear_background(BACKGROUND);
        self.draw_court();

        let local = state.assignment().map(|assignment| assignment.player);
        if let Some(snapshot) = state.latest() {
            for identifier in PlayerId::ALL {
                let player = snapshot.player(identifier);
                let color = if Some(identifier) == local {
                    GREEN
                } else {
                    OPPONENT
                };
                self.draw_box(&player.get_bounds(), color);
            }

            self.draw_box(&snapshot.ball.get_bounds(), WHITE);
            self.draw_score(snapshot.player_1.score, snapshot.player_2.score);
        }

        self.draw_status(state.status(), local);
    }

    fn draw_court(&self) {
        let segments = 20;
        let segment_height = self.height / (segments * 2) as f32;
        let x = self.width / 2.0 - 1.0;

        for i in 0..segments {
            let y = (i * 2) as f32 * segment_height + segment_height / 2.0;
            draw_rectangle(x, y, 2.0, segment_height, COURT_LINE);
        }
    }

    /// Scales normalized court bounds to the window
    fn draw_box(&self, bounds: &Bounds, color: Color) {
        draw_rectangle(
            bounds.left * self.width,
            bounds.top * self.height,
            (bounds.right - bounds.left) * self.width,
            (bounds.bottom - bounds.top) * self.height,
            color,
        );
    }

    fn draw_score(&self, left: u32, right: u32) {
        let size = 48.0;
        let left_text = left.to_string();
        let right_text = right.to_string();

        let left_width = measure_text(&left_text, None, size as u16, 1.0).width;
        draw_text(
            &left_text,
            self.width / 2.0 - 40.0 - left_width,
            size + 10.0,
            size,
            WHITE,
        );
        draw_text(&right_text, self.width / 2.0 + 40.0, size + 10.0, size, WHITE);
    }

    fn draw_status(&self, status: &ClientStatus, local: Option<PlayerId>) {
        let text = match status {
            ClientStatus::Searching => "Searching for an opponent...".to_string(),
            ClientStatus::Joining => "Match found, joining server...".to_string(),
            ClientStatus::Playing => match local {
                Some(player) => format!("Player {} - arrow keys to move", player.number()),
                None => String::new(),
            },
            ClientStatus::Finished => "Match over".to_string(),
            ClientStatus::Disconnected(reason) => format!("Disconnected: {}", reason),
        };

        let size = 20.0;
        let width = measure_text(&text, None, size as u16, 1.0).width;
        draw_text(
            &text,
            (self.width - width) / 2.0,
            self.height - 16.0,
            size,
            Color::new(0.7, 0.7, 0.7, 1.0),
        );
    }
}
