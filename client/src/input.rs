//! Console input with held-key tracking and edge detection

use shared::{ActionState, ActionType, InputState};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Action(ActionType, ActionState),
    /// Print the local mirror, refreshed from a world state request
    Look,
    /// Admin command forwarded to the server
    Command(String),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown input '{0}', try w/a/s/d, stop, attack, look, /<command> or quit")]
    Unknown(String),
    #[error("empty command")]
    EmptyCommand,
}

/// Turns console lines into actions. Movement words toggle a held key, so
/// `w` once starts moving forward and `w` again stops.
#[derive(Debug, Default)]
pub struct InputManager {
    held: InputState,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> InputState {
        self.held
    }

    pub fn handle_line(&mut self, line: &str) -> Result<Vec<ConsoleInput>, InputError> {
        let line = line.trim();
        if let Some(command) = line.strip_prefix('/') {
            let command = command.trim();
            if command.is_empty() {
                return Err(InputError::EmptyCommand);
            }
            return Ok(vec![ConsoleInput::Command(command.to_string())]);
        }

        let mut inputs = Vec::new();
        for word in line.split_whitespace() {
            match word.to_ascii_lowercase().as_str() {
                "w" | "up" => inputs.push(self.toggle(ActionType::MoveForward)),
                "s" | "down" => inputs.push(self.toggle(ActionType::MoveBackward)),
                "a" | "left" => inputs.push(self.toggle(ActionType::MoveLeft)),
                "d" | "right" => inputs.push(self.toggle(ActionType::MoveRight)),
                "stop" => inputs.extend(self.release_all()),
                "attack" | "f" => {
                    inputs.push(ConsoleInput::Action(ActionType::Attack, ActionState::Begin));
                    inputs.push(ConsoleInput::Action(ActionType::Attack, ActionState::End));
                }
                "look" | "l" => inputs.push(ConsoleInput::Look),
                "quit" | "q" | "exit" => inputs.push(ConsoleInput::Quit),
                other => return Err(InputError::Unknown(other.to_string())),
            }
        }
        Ok(inputs)
    }

    fn toggle(&mut self, action: ActionType) -> ConsoleInput {
        let key = match self.key(action) {
            Some(key) => key,
            None => return ConsoleInput::Action(action, ActionState::Begin),
        };
        *key = !*key;
        let state = if *key {
            ActionState::Begin
        } else {
            ActionState::End
        };
        ConsoleInput::Action(action, state)
    }

    fn release_all(&mut self) -> Vec<ConsoleInput> {
        let mut released = Vec::new();
        for action in [
            ActionType::MoveForward,
            ActionType::MoveBackward,
            ActionType::MoveLeft,
            ActionType::MoveRight,
        ] {
            if let Some(key) = self.key(action) {
                if *key {
                    *key = false;
                    released.push(ConsoleInput::Action(action, ActionState::End));
                }
            }
        }
        released
    }

    fn key(&mut self, action: ActionType) -> Option<&mut bool> {
        match action {
            ActionType::MoveForward => Some(&mut self.held.forward),
            ActionType::MoveBackward => Some(&mut self.held.backward),
            ActionType::MoveLeft => Some(&mut self.held.left),
            ActionType::MoveRight => Some(&mut self.held.right),
            ActionType::Attack => None,
        }
    }
}
