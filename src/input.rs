use std::collections::{HashMap, HashSet};

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Edge-triggered keyboard state, advanced once per tick.
///
/// Window events only write the raw state and mark the key dirty. [`Input::update`]
/// then re-evaluates the dirty keys: the previous state is saved, the current
/// state copied from the raw one, and a key whose state changed stays dirty for one
/// more tick so its press/release edge is cleared on the next update.
#[derive(Debug, Default)]
pub struct Input {
    raw: HashMap<KeyCode, bool>,
    current: HashSet<KeyCode>,
    previous: HashSet<KeyCode>,
    dirty: Vec<KeyCode>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key going down. Takes effect on the next [`Input::update`].
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        self.raw.insert(key, true);
        self.mark_dirty(key);
    }

    /// Records a key going up. Takes effect on the next [`Input::update`].
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.raw.insert(key, false);
        self.mark_dirty(key);
    }

    /// Feeds a window event; everything but keyboard input is ignored.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if let PhysicalKey::Code(key) = event.physical_key {
                match event.state {
                    ElementState::Pressed => self.on_key_pressed(key),
                    ElementState::Released => self.on_key_released(key),
                }
            }
        }
    }

    /// Advances one tick, re-evaluating only the dirty keys.
    pub fn update(&mut self) {
        let dirty = std::mem::take(&mut self.dirty);
        for key in dirty {
            let was_down = self.current.contains(&key);
            let is_down = self.raw.get(&key).copied().unwrap_or(false);

            set_member(&mut self.previous, key, was_down);
            set_member(&mut self.current, key, is_down);

            if was_down != is_down {
                self.mark_dirty(key);
            }
        }
    }

    /// The key is held as of the last update.
    pub fn is_down(&self, key: KeyCode) -> bool {
        self.current.contains(&key)
    }

    /// The key went down during the last update.
    pub fn was_just_pressed(&self, key: KeyCode) -> bool {
        self.current.contains(&key) && !self.previous.contains(&key)
    }

    /// The key went up during the last update.
    pub fn was_just_released(&self, key: KeyCode) -> bool {
        !self.current.contains(&key) && self.previous.contains(&key)
    }

    fn mark_dirty(&mut self, key: KeyCode) {
        if !self.dirty.contains(&key) {
            self.dirty.push(key);
        }
    }
}

fn set_member(set: &mut HashSet<KeyCode>, key: KeyCode, present: bool) {
    if present {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_visible_only_after_update() {
        let mut input = Input::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(!input.is_down(KeyCode::KeyW));

        input.update();
        assert!(input.is_down(KeyCode::KeyW));
        assert!(input.was_just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn press_edge_lasts_one_tick() {
        let mut input = Input::new();
        input.on_key_pressed(KeyCode::KeyC);
        input.update();
        assert!(input.was_just_pressed(KeyCode::KeyC));

        input.update();
        assert!(input.is_down(KeyCode::KeyC));
        assert!(!input.was_just_pressed(KeyCode::KeyC));
    }

    #[test]
    fn release_edge_lasts_one_tick() {
        let mut input = Input::new();
        input.on_key_pressed(KeyCode::ArrowUp);
        input.update();
        input.update();

        input.on_key_released(KeyCode::ArrowUp);
        input.update();
        assert!(!input.is_down(KeyCode::ArrowUp));
        assert!(input.was_just_released(KeyCode::ArrowUp));

        input.update();
        assert!(!input.was_just_released(KeyCode::ArrowUp));
    }

    #[test]
    fn tap_within_one_tick_is_not_seen() {
        let mut input = Input::new();
        input.on_key_pressed(KeyCode::Space);
        input.on_key_released(KeyCode::Space);
        input.update();
        assert!(!input.is_down(KeyCode::Space));
        assert!(!input.was_just_pressed(KeyCode::Space));
        assert!(!input.was_just_released(KeyCode::Space));
    }

    #[test]
    fn keys_are_tracked_independently() {
        let mut input = Input::new();
        input.on_key_pressed(KeyCode::KeyA);
        input.update();
        input.on_key_pressed(KeyCode::KeyD);
        input.update();

        assert!(input.is_down(KeyCode::KeyA));
        assert!(!input.was_just_pressed(KeyCode::KeyA));
        assert!(input.was_just_pressed(KeyCode::KeyD));
    }

    #[test]
    fn clean_keys_are_not_reevaluated() {
        let mut input = Input::new();
        input.on_key_pressed(KeyCode::KeyS);
        input.update();
        input.update();
        assert!(input.dirty.is_empty());
    }
}
