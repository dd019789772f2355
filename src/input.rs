//! Input routing: binding tables, the keyboard shader texture, and mouse
//! mode latching.
//!
//! Keys, mouse buttons and wheel ticks resolve through hash-map binding
//! tables to a closed [`Action`] set; the engine executes the actions. Two
//! special behaviours live here rather than in the engine:
//!
//! * Keyboard shader input. While enabled, key events are routed into the
//!   256x3 state table backing the keyboard texture instead of triggering
//!   actions. Only quit and the toggle itself stay live, so the mode can
//!   always be left again.
//! * Mouse mode latching. The mode (send to shader, pan, zoom) is chosen
//!   from the modifiers held at press time and kept until release, so
//!   releasing a modifier mid-drag doesn't change what the drag does.

use std::collections::HashMap;

use winit::event::MouseButton;
use winit::keyboard::{KeyCode, ModifiersState};

use crate::pool::{KEYBOARD_KEYS, KEYBOARD_ROWS};

/// Seek step sizes, in milliseconds.
pub const SMALL_STEP_MS: f64 = 100.0;
pub const MEDIUM_STEP_MS: f64 = 1000.0;
pub const LARGE_STEP_MS: f64 = 10000.0;

/// Everything a key or wheel binding can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    ToggleHud,
    ToggleInputs,
    ToggleOutputs,
    TogglePlayback,
    RestartPlayback,
    FastForwardSmall,
    FastForwardMedium,
    FastForwardLarge,
    RewindSmall,
    RewindMedium,
    RewindLarge,
    ToggleKeyboardInput,
    CenterImage,
    ZoomInCoarse,
    ZoomInFine,
    ZoomOutCoarse,
    ZoomOutFine,
}

impl Action {
    /// The playback-time shift for seek actions, in milliseconds.
    pub fn seek_ms(self) -> Option<f64> {
        match self {
            Action::FastForwardSmall => Some(SMALL_STEP_MS),
            Action::FastForwardMedium => Some(MEDIUM_STEP_MS),
            Action::FastForwardLarge => Some(LARGE_STEP_MS),
            Action::RewindSmall => Some(-SMALL_STEP_MS),
            Action::RewindMedium => Some(-MEDIUM_STEP_MS),
            Action::RewindLarge => Some(-LARGE_STEP_MS),
            _ => None,
        }
    }
}

/// What a mouse drag does, latched at button-press time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseMode {
    /// Feed the drag position into `iMouse`.
    SendToShader,
    PanImage,
    ZoomImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub key: KeyCode,
    pub mods: ModifiersState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseBinding {
    /// The mode already in progress when the button went down, if any.
    pub active: Option<MouseMode>,
    pub button: MouseButton,
    pub mods: ModifiersState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WheelBinding {
    pub direction: WheelDirection,
    pub mods: ModifiersState,
}

/// The 256x3 table behind the keyboard texture: key down, pressed this
/// frame, and a per-key toggle.
pub struct KeyboardState {
    rows: [[u8; KEYBOARD_KEYS]; KEYBOARD_ROWS],
}

impl KeyboardState {
    pub fn new() -> Self {
        Self {
            rows: [[0; KEYBOARD_KEYS]; KEYBOARD_ROWS],
        }
    }

    fn key_down(&mut self, code: u8) {
        let code = code as usize;
        self.rows[0][code] = 255;
        self.rows[1][code] = 255;
        self.rows[2][code] ^= 255;
    }

    fn key_up(&mut self, code: u8) {
        self.rows[0][code as usize] = 0;
    }

    /// Clears the pressed-this-frame row. Called once per rendered frame.
    pub fn clear_pressed(&mut self) {
        self.rows[1] = [0; KEYBOARD_KEYS];
    }

    pub fn clear(&mut self) {
        self.rows = [[0; KEYBOARD_KEYS]; KEYBOARD_ROWS];
    }

    pub fn rows(&self) -> &[[u8; KEYBOARD_KEYS]; KEYBOARD_ROWS] {
        &self.rows
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves raw window events into actions and keyboard-texture updates.
pub struct InputRouter {
    key_press: HashMap<KeyBinding, Action>,
    key_release: HashMap<KeyBinding, Action>,
    mouse_press: HashMap<MouseBinding, MouseMode>,
    wheel: HashMap<WheelBinding, Action>,
    keyboard_shader_input: bool,
    keyboard: KeyboardState,
    mouse_mode: Option<MouseMode>,
}

impl InputRouter {
    /// A router with the stock bindings.
    pub fn new() -> Self {
        let none = ModifiersState::empty();
        let mut key_press = HashMap::new();
        key_press.insert(binding(KeyCode::Escape, none), Action::Quit);
        key_press.insert(binding(KeyCode::Tab, none), Action::ToggleHud);
        key_press.insert(binding(KeyCode::Space, none), Action::TogglePlayback);
        key_press.insert(binding(KeyCode::Enter, none), Action::RestartPlayback);
        key_press.insert(binding(KeyCode::NumpadEnter, none), Action::RestartPlayback);
        key_press.insert(
            binding(KeyCode::ArrowRight, ModifiersState::SHIFT),
            Action::FastForwardSmall,
        );
        key_press.insert(binding(KeyCode::ArrowRight, none), Action::FastForwardMedium);
        key_press.insert(
            binding(KeyCode::ArrowRight, ModifiersState::CONTROL),
            Action::FastForwardLarge,
        );
        key_press.insert(
            binding(KeyCode::ArrowLeft, ModifiersState::SHIFT),
            Action::RewindSmall,
        );
        key_press.insert(binding(KeyCode::ArrowLeft, none), Action::RewindMedium);
        key_press.insert(
            binding(KeyCode::ArrowLeft, ModifiersState::CONTROL),
            Action::RewindLarge,
        );

        let mut key_release = HashMap::new();
        key_release.insert(binding(KeyCode::F2, none), Action::ToggleKeyboardInput);

        let mut mouse_press = HashMap::new();
        mouse_press.insert(
            MouseBinding {
                active: None,
                button: MouseButton::Left,
                mods: none,
            },
            MouseMode::SendToShader,
        );
        mouse_press.insert(
            MouseBinding {
                active: None,
                button: MouseButton::Left,
                mods: ModifiersState::ALT,
            },
            MouseMode::PanImage,
        );
        mouse_press.insert(
            MouseBinding {
                active: None,
                button: MouseButton::Left,
                mods: ModifiersState::CONTROL,
            },
            MouseMode::ZoomImage,
        );

        let mut wheel = HashMap::new();
        wheel.insert(
            WheelBinding {
                direction: WheelDirection::Up,
                mods: none,
            },
            Action::ZoomInCoarse,
        );
        wheel.insert(
            WheelBinding {
                direction: WheelDirection::Up,
                mods: ModifiersState::SHIFT,
            },
            Action::ZoomInFine,
        );
        wheel.insert(
            WheelBinding {
                direction: WheelDirection::Down,
                mods: none,
            },
            Action::ZoomOutCoarse,
        );
        wheel.insert(
            WheelBinding {
                direction: WheelDirection::Down,
                mods: ModifiersState::SHIFT,
            },
            Action::ZoomOutFine,
        );

        Self {
            key_press,
            key_release,
            mouse_press,
            wheel,
            keyboard_shader_input: false,
            keyboard: KeyboardState::new(),
            mouse_mode: None,
        }
    }

    pub fn bind_key_press(&mut self, key: KeyCode, mods: ModifiersState, action: Action) {
        self.key_press.insert(binding(key, mods), action);
    }

    pub fn keyboard_shader_input(&self) -> bool {
        self.keyboard_shader_input
    }

    /// Switches keyboard shader input on or off. Leaving the mode clears the
    /// state table so no key stays stuck down.
    pub fn set_keyboard_shader_input(&mut self, enabled: bool) {
        if self.keyboard_shader_input && !enabled {
            self.keyboard.clear();
        }
        self.keyboard_shader_input = enabled;
        log::debug!("keyboard shader input {}", if enabled { "on" } else { "off" });
    }

    pub fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut KeyboardState {
        &mut self.keyboard
    }

    pub fn mouse_mode(&self) -> Option<MouseMode> {
        self.mouse_mode
    }

    /// Resolves a key press. In keyboard-shader-input mode the key lands in
    /// the state table instead, with quit as the only press action that
    /// still fires.
    pub fn key_pressed(&mut self, key: KeyCode, mods: ModifiersState) -> Option<Action> {
        let action = self.key_press.get(&binding(key, mods)).copied();
        if self.keyboard_shader_input {
            match action {
                Some(Action::Quit) | Some(Action::ToggleKeyboardInput) => action,
                _ => {
                    if let Some(code) = shadertoy_keycode(key) {
                        self.keyboard.key_down(code);
                    }
                    None
                }
            }
        } else {
            action
        }
    }

    /// Resolves a key release; the toggle out of keyboard-shader-input mode
    /// lives on release so the press doesn't also land in the state table
    /// of the mode being entered.
    pub fn key_released(&mut self, key: KeyCode, mods: ModifiersState) -> Option<Action> {
        let action = self.key_release.get(&binding(key, mods)).copied();
        if self.keyboard_shader_input {
            match action {
                Some(Action::Quit) | Some(Action::ToggleKeyboardInput) => action,
                _ => {
                    if let Some(code) = shadertoy_keycode(key) {
                        self.keyboard.key_up(code);
                    }
                    None
                }
            }
        } else {
            action
        }
    }

    /// Latches the mouse mode for a button press.
    pub fn mouse_pressed(&mut self, button: MouseButton, mods: ModifiersState) -> Option<MouseMode> {
        let mode = self
            .mouse_press
            .get(&MouseBinding {
                active: self.mouse_mode,
                button,
                mods,
            })
            .copied();
        if mode.is_some() {
            self.mouse_mode = mode;
        }
        mode
    }

    /// Ends the current mouse mode, returning what it was.
    pub fn mouse_released(&mut self) -> Option<MouseMode> {
        self.mouse_mode.take()
    }

    /// Resolves a wheel tick. Ignored while a mouse drag is in progress.
    pub fn wheel(&mut self, direction: WheelDirection, mods: ModifiersState) -> Option<Action> {
        if self.mouse_mode.is_some() {
            return None;
        }
        self.wheel
            .get(&WheelBinding { direction, mods })
            .copied()
    }
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn binding(key: KeyCode, mods: ModifiersState) -> KeyBinding {
    KeyBinding { key, mods }
}

/// Maps a physical key to the JavaScript keycode ShaderToy shaders index
/// the keyboard texture with.
pub fn shadertoy_keycode(key: KeyCode) -> Option<u8> {
    use KeyCode::*;
    let code = match key {
        KeyA => 65,
        KeyB => 66,
        KeyC => 67,
        KeyD => 68,
        KeyE => 69,
        KeyF => 70,
        KeyG => 71,
        KeyH => 72,
        KeyI => 73,
        KeyJ => 74,
        KeyK => 75,
        KeyL => 76,
        KeyM => 77,
        KeyN => 78,
        KeyO => 79,
        KeyP => 80,
        KeyQ => 81,
        KeyR => 82,
        KeyS => 83,
        KeyT => 84,
        KeyU => 85,
        KeyV => 86,
        KeyW => 87,
        KeyX => 88,
        KeyY => 89,
        KeyZ => 90,
        Digit0 => 48,
        Digit1 => 49,
        Digit2 => 50,
        Digit3 => 51,
        Digit4 => 52,
        Digit5 => 53,
        Digit6 => 54,
        Digit7 => 55,
        Digit8 => 56,
        Digit9 => 57,
        ArrowLeft => 37,
        ArrowUp => 38,
        ArrowRight => 39,
        ArrowDown => 40,
        Space => 32,
        Enter => 13,
        ShiftLeft | ShiftRight => 16,
        ControlLeft | ControlRight => 17,
        AltLeft | AltRight => 18,
        Escape => 27,
        Tab => 9,
        Backspace => 8,
        PageUp => 33,
        PageDown => 34,
        End => 35,
        Home => 36,
        Insert => 45,
        Delete => 46,
        Comma => 188,
        Period => 190,
        Slash => 191,
        Semicolon => 186,
        Quote => 222,
        BracketLeft => 219,
        BracketRight => 221,
        Backslash => 220,
        Minus => 189,
        Equal => 187,
        Backquote => 192,
        F1 => 112,
        F2 => 113,
        F3 => 114,
        F4 => 115,
        F5 => 116,
        F6 => 117,
        F7 => 118,
        F8 => 119,
        F9 => 120,
        F10 => 121,
        F11 => 122,
        F12 => 123,
        Numpad0 => 96,
        Numpad1 => 97,
        Numpad2 => 98,
        Numpad3 => 99,
        Numpad4 => 100,
        Numpad5 => 101,
        Numpad6 => 102,
        Numpad7 => 103,
        Numpad8 => 104,
        Numpad9 => 105,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_key_bindings_resolve() {
        let mut router = InputRouter::new();
        assert_eq!(
            router.key_pressed(KeyCode::Escape, ModifiersState::empty()),
            Some(Action::Quit)
        );
        assert_eq!(
            router.key_pressed(KeyCode::ArrowRight, ModifiersState::SHIFT),
            Some(Action::FastForwardSmall)
        );
        assert_eq!(
            router.key_released(KeyCode::F2, ModifiersState::empty()),
            Some(Action::ToggleKeyboardInput)
        );
        assert_eq!(
            router.key_pressed(KeyCode::KeyQ, ModifiersState::empty()),
            None
        );
    }

    #[test]
    fn seek_steps_are_signed() {
        assert_eq!(Action::FastForwardMedium.seek_ms(), Some(1000.0));
        assert_eq!(Action::RewindLarge.seek_ms(), Some(-10000.0));
        assert_eq!(Action::Quit.seek_ms(), None);
    }

    #[test]
    fn keyboard_state_tracks_down_pressed_and_toggle() {
        let mut state = KeyboardState::new();
        state.key_down(65);
        assert_eq!(state.rows()[0][65], 255);
        assert_eq!(state.rows()[1][65], 255);
        assert_eq!(state.rows()[2][65], 255);

        state.clear_pressed();
        assert_eq!(state.rows()[0][65], 255);
        assert_eq!(state.rows()[1][65], 0);
        assert_eq!(state.rows()[2][65], 255);

        state.key_up(65);
        assert_eq!(state.rows()[0][65], 0);

        // A second press flips the toggle back.
        state.key_down(65);
        assert_eq!(state.rows()[2][65], 0);
    }

    #[test]
    fn shader_input_mode_suppresses_ordinary_actions() {
        let mut router = InputRouter::new();
        router.set_keyboard_shader_input(true);

        // Space normally toggles playback; here it must land in the table.
        assert_eq!(
            router.key_pressed(KeyCode::Space, ModifiersState::empty()),
            None
        );
        assert_eq!(router.keyboard().rows()[0][32], 255);

        // Quit and the mode toggle stay live.
        assert_eq!(
            router.key_pressed(KeyCode::Escape, ModifiersState::empty()),
            Some(Action::Quit)
        );
        assert_eq!(
            router.key_released(KeyCode::F2, ModifiersState::empty()),
            Some(Action::ToggleKeyboardInput)
        );
    }

    #[test]
    fn leaving_shader_input_mode_clears_the_table() {
        let mut router = InputRouter::new();
        router.set_keyboard_shader_input(true);
        router.key_pressed(KeyCode::KeyA, ModifiersState::empty());
        assert_eq!(router.keyboard().rows()[0][65], 255);
        router.set_keyboard_shader_input(false);
        assert_eq!(router.keyboard().rows()[0][65], 0);
    }

    #[test]
    fn mouse_mode_is_latched_from_press_modifiers() {
        let mut router = InputRouter::new();
        assert_eq!(
            router.mouse_pressed(MouseButton::Left, ModifiersState::ALT),
            Some(MouseMode::PanImage)
        );
        assert_eq!(router.mouse_mode(), Some(MouseMode::PanImage));

        // Wheel ticks are ignored while a drag is active.
        assert_eq!(
            router.wheel(WheelDirection::Up, ModifiersState::empty()),
            None
        );

        assert_eq!(router.mouse_released(), Some(MouseMode::PanImage));
        assert_eq!(
            router.wheel(WheelDirection::Up, ModifiersState::empty()),
            Some(Action::ZoomInCoarse)
        );
    }

    #[test]
    fn keycodes_match_the_javascript_table() {
        assert_eq!(shadertoy_keycode(KeyCode::KeyA), Some(65));
        assert_eq!(shadertoy_keycode(KeyCode::Space), Some(32));
        assert_eq!(shadertoy_keycode(KeyCode::ArrowLeft), Some(37));
        assert_eq!(shadertoy_keycode(KeyCode::F24), None);
    }
}
