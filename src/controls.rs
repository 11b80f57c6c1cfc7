//! Keyboard controls for the scan loop.
//!
//! A reader thread forwards terminal input one character at a time; the loop
//! drains it without blocking once per iteration. Ctrl-C sets the same quit
//! flag as the `q` key.

use anyhow::{anyhow, Result};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use crate::enhance::{Enhancement, MIN_CONTRAST};

const BRIGHTNESS_STEP: f32 = 5.0;
const CONTRAST_STEP: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    BrightnessUp,
    BrightnessDown,
    ContrastUp,
    ContrastDown,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'q' | 'Q' => Some(Command::Quit),
            '+' | '=' => Some(Command::BrightnessUp),
            '-' => Some(Command::BrightnessDown),
            ']' => Some(Command::ContrastUp),
            '[' => Some(Command::ContrastDown),
            _ => None,
        }
    }

    /// Apply a gain/offset adjustment. `Quit` leaves the enhancement unchanged.
    pub fn adjust(self, enhancement: &mut Enhancement) {
        match self {
            Command::Quit => {}
            Command::BrightnessUp => enhancement.brightness += BRIGHTNESS_STEP,
            Command::BrightnessDown => enhancement.brightness -= BRIGHTNESS_STEP,
            Command::ContrastUp => enhancement.contrast += CONTRAST_STEP,
            Command::ContrastDown => {
                enhancement.contrast = (enhancement.contrast - CONTRAST_STEP).max(MIN_CONTRAST)
            }
        }
    }
}

/// Source of interactive commands polled by the loop.
pub struct Controls {
    keys: Option<Receiver<char>>,
    quit: Arc<AtomicBool>,
}

impl Controls {
    /// No terminal input; only an external quit flag.
    pub fn headless() -> Self {
        Self {
            keys: None,
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read keys from stdin on a background thread and hook Ctrl-C.
    pub fn interactive() -> Result<Self> {
        let mut controls = Self::headless().with_ctrlc()?;
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("key-reader".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for byte in stdin.lock().bytes() {
                    let Ok(byte) = byte else { break };
                    if tx.send(byte as char).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| anyhow!("spawn key reader: {}", e))?;
        controls.keys = Some(rx);
        Ok(controls)
    }

    /// Commands from an existing channel (used by tests and embedders).
    pub fn from_channel(keys: Receiver<char>) -> Self {
        Self {
            keys: Some(keys),
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_ctrlc(self) -> Result<Self> {
        let quit = self.quit.clone();
        ctrlc::set_handler(move || {
            quit.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
        Ok(self)
    }

    /// Handle that requests shutdown when set.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        self.quit.clone()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Drain pending keys without blocking.
    pub fn poll(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        let Some(keys) = &self.keys else {
            return commands;
        };
        loop {
            match keys.try_recv() {
                Ok(key) => {
                    if let Some(command) = Command::from_key(key) {
                        commands.push(command);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.keys = None;
                    break;
                }
            }
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('+'), Some(Command::BrightnessUp));
        assert_eq!(Command::from_key('-'), Some(Command::BrightnessDown));
        assert_eq!(Command::from_key(']'), Some(Command::ContrastUp));
        assert_eq!(Command::from_key('['), Some(Command::ContrastDown));
        assert_eq!(Command::from_key('x'), None);
        assert_eq!(Command::from_key('\n'), None);
    }

    #[test]
    fn contrast_has_a_floor() {
        let mut e = Enhancement {
            contrast: 0.55,
            brightness: 10.0,
        };
        Command::ContrastDown.adjust(&mut e);
        assert_eq!(e.contrast, MIN_CONTRAST);
        Command::ContrastDown.adjust(&mut e);
        assert_eq!(e.contrast, MIN_CONTRAST);

        Command::BrightnessDown.adjust(&mut e);
        Command::BrightnessDown.adjust(&mut e);
        Command::BrightnessDown.adjust(&mut e);
        assert_eq!(e.brightness, -5.0);
    }

    #[test]
    fn poll_drains_without_blocking() {
        let (tx, rx) = mpsc::channel();
        let mut controls = Controls::from_channel(rx);
        assert!(controls.poll().is_empty());

        for key in ['+', 'z', ']', 'q'] {
            tx.send(key).unwrap();
        }
        assert_eq!(
            controls.poll(),
            vec![Command::BrightnessUp, Command::ContrastUp, Command::Quit]
        );

        drop(tx);
        assert!(controls.poll().is_empty());
        assert!(!controls.quit_requested());
    }
}
