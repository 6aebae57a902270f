use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        "LeftCtrl" | "LControl" => LeftCtrl,
        "RightCtrl" | "RControl" => RightCtrl,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for the non-character keys the demo can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
}

/// Logical actions a key can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    LookUp,
    LookDown,
    LookLeft,
    LookRight,
    ToggleClouds,
    ToggleDebugLines,
    ToggleRenderMode,
    Quit,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::MoveForward,
        Action::MoveBackward,
        Action::MoveLeft,
        Action::MoveRight,
        Action::LookUp,
        Action::LookDown,
        Action::LookLeft,
        Action::LookRight,
        Action::ToggleClouds,
        Action::ToggleDebugLines,
        Action::ToggleRenderMode,
        Action::Quit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::MoveForward => "move-forward",
            Action::MoveBackward => "move-backward",
            Action::MoveLeft => "move-left",
            Action::MoveRight => "move-right",
            Action::LookUp => "look-up",
            Action::LookDown => "look-down",
            Action::LookLeft => "look-left",
            Action::LookRight => "look-right",
            Action::ToggleClouds => "toggle-clouds",
            Action::ToggleDebugLines => "toggle-debug-lines",
            Action::ToggleRenderMode => "toggle-render-mode",
            Action::Quit => "quit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.name().eq_ignore_ascii_case(name))
    }

    /// Held actions are sampled every frame; the rest fire once per press.
    pub fn is_held(self) -> bool {
        matches!(
            self,
            Action::MoveForward
                | Action::MoveBackward
                | Action::MoveLeft
                | Action::MoveRight
                | Action::LookUp
                | Action::LookDown
                | Action::LookLeft
                | Action::LookRight
        )
    }
}

/// Maps keys to actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    map: HashMap<KeyCode, Action>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        use KeyCode::{Character, Named};
        let map = [
            (Character('W'), Action::MoveForward),
            (Character('S'), Action::MoveBackward),
            (Character('A'), Action::MoveLeft),
            (Character('D'), Action::MoveRight),
            (Named(NamedKey::Up), Action::LookUp),
            (Named(NamedKey::Down), Action::LookDown),
            (Named(NamedKey::Left), Action::LookLeft),
            (Named(NamedKey::Right), Action::LookRight),
            (Character('C'), Action::ToggleClouds),
            (Character('L'), Action::ToggleDebugLines),
            (Character('M'), Action::ToggleRenderMode),
            (Named(NamedKey::Escape), Action::Quit),
        ]
        .into_iter()
        .collect();
        Self { map }
    }
}

impl KeyBindings {
    pub fn action_for(&self, key: KeyCode) -> Option<Action> {
        self.map.get(&key).copied()
    }

    /// Binds `key` to `action`, replacing whatever the key did before.
    pub fn bind(&mut self, key: KeyCode, action: Action) {
        self.map.insert(key, action);
    }

    /// Applies `KEY=action` overrides such as `Q=quit`.
    pub fn with_overrides<S: AsRef<str>>(mut self, overrides: &[S]) -> Result<Self> {
        for spec in overrides {
            let (key, action) = parse_binding(spec.as_ref())?;
            self.bind(key, action);
        }
        Ok(self)
    }
}

fn parse_binding(spec: &str) -> Result<(KeyCode, Action)> {
    let (key, action) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("binding `{spec}` must look like KEY=action"))?;
    let key = KeyCode::from_name(key.trim()).ok_or_else(|| anyhow!("unknown key `{key}`"))?;
    let action =
        Action::from_name(action.trim()).ok_or_else(|| anyhow!("unknown action `{action}`"))?;
    Ok((key, action))
}

/// Held-action flags, written by key events and read once per frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputState {
    held: HashSet<Action>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_held(&mut self, action: Action, held: bool) {
        if held {
            self.held.insert(action);
        } else {
            self.held.remove(&action);
        }
    }

    pub fn is_held(&self, action: Action) -> bool {
        self.held.contains(&action)
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode::Character('A')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("F13"), None);
    }

    #[test]
    fn default_bindings_cover_every_action() {
        let bindings = KeyBindings::default();
        for action in Action::ALL {
            assert!(
                bindings.map.values().any(|bound| *bound == action),
                "{action:?} is unbound"
            );
        }
        assert_eq!(
            bindings.action_for(KeyCode::Character('C')),
            Some(Action::ToggleClouds)
        );
    }

    #[test]
    fn overrides_replace_bindings() {
        let bindings = KeyBindings::default()
            .with_overrides(&["Q=quit", "space = toggle-clouds"])
            .unwrap();
        assert_eq!(bindings.action_for(KeyCode::Character('Q')), Some(Action::Quit));
        assert_eq!(
            bindings.action_for(KeyCode::Named(NamedKey::Space)),
            Some(Action::ToggleClouds)
        );
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(KeyBindings::default().with_overrides(&["Q"]).is_err());
        assert!(KeyBindings::default().with_overrides(&["Q=fly"]).is_err());
        assert!(KeyBindings::default().with_overrides(&["Hyper=quit"]).is_err());
    }

    #[test]
    fn input_state_tracks_held_actions() {
        let mut state = InputState::new();
        state.set_held(Action::MoveForward, true);
        assert!(state.is_held(Action::MoveForward));
        state.set_held(Action::MoveForward, false);
        assert!(!state.is_held(Action::MoveForward));
    }
}
