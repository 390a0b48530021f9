use std::collections::HashSet;

use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Tracks keyboard and scroll state across window events.
pub struct InputState {
    keys: HashSet<KeyCode>,
    pressed: HashSet<KeyCode>,
    pub scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys: HashSet::new(),
            pressed: HashSet::new(),
            scroll_delta: 0.0,
        }
    }

    /// Feed one window event into the tracker.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if !event.repeat && self.keys.insert(code) {
                                self.pressed.insert(code);
                            }
                        }
                        ElementState::Released => {
                            self.keys.remove(&code);
                        }
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
            }
            _ => {}
        }
    }

    /// Whether the key is currently held.
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    /// Whether the key went down since the last frame.
    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Drop the per-frame deltas; held-key state persists.
    pub fn clear_frame_state(&mut self) {
        self.pressed.clear();
        self.scroll_delta = 0.0;
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
