//! Operator commands and their wire format.
//!
//! | Command | Wire text |
//! |---|---|
//! | LED on | `led:on` |
//! | LED off | `led:off` |
//! | Ping | `ping` |
//! | Motor move | `motor:<steps>:<dir>` with dir `1` = clockwise, `0` = counter-clockwise |

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejected operator input. Never reaches the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid Steps '{0}' (must be non-negative integer)")]
    InvalidSteps(String),

    #[error("Invalid Direction '{0}' (must be 1 for CW or 0 for CCW)")]
    InvalidDirection(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    pub fn token(self) -> &'static str {
        match self {
            Direction::Clockwise => "1",
            Direction::CounterClockwise => "0",
        }
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Direction::Clockwise),
            "0" => Ok(Direction::CounterClockwise),
            other => Err(ValidationError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LedOn,
    LedOff,
    Ping,
    MotorMove { steps: u32, direction: Direction },
}

impl Command {
    /// Builds a motor move from raw form input.
    pub fn motor(steps: &str, direction: &str) -> Result<Self, ValidationError> {
        let steps = parse_steps(steps)?;
        let direction = direction.parse()?;
        Ok(Command::MotorMove { steps, direction })
    }
}

/// Digits only: no sign, no whitespace inside, must fit a u32
fn parse_steps(raw: &str) -> Result<u32, ValidationError> {
    let trimmed = raw.trim();
    let invalid = || ValidationError::InvalidSteps(trimmed.to_string());

    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    trimmed.parse().map_err(|_| invalid())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::LedOn => write!(f, "led:on"),
            Command::LedOff => write!(f, "led:off"),
            Command::Ping => write!(f, "ping"),
            Command::MotorMove { steps, direction } => {
                write!(f, "motor:{}:{}", steps, direction.token())
            }
        }
    }
}

impl FromStr for Command {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        match text {
            "led:on" => return Ok(Command::LedOn),
            "led:off" => return Ok(Command::LedOff),
            "ping" => return Ok(Command::Ping),
            _ => {}
        }

        let mut parts = text.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("motor"), Some(steps), Some(direction)) => Command::motor(steps, direction),
            _ => Err(ValidationError::UnknownCommand(text.to_string())),
        }
    }
}
