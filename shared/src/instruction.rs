//! Operator Instruction Grammar
//!
//! Turns one line of operator text into a typed, range-checked [`Instruction`].
//!
//! Grammar (one command per line):
//! ```text
//! takeoff | land
//! (forward | back | left | right) <cm>        20..=500
//! (rotateclock | rotatecounter) <degrees>     1..=360
//! help | exit                                 (session-level, see parse_input)
//! ```

use std::fmt;

use thiserror::Error;

use crate::limits;

/// Help table shown for the `help` command
pub const HELP: &str = "\
Available Commands:
  takeoff               - Drone takes off
  land                  - Drone lands
  forward <cm>          - Move forward (20-500 cm)
  back <cm>             - Move backward (20-500 cm)
  left <cm>             - Move left (20-500 cm)
  right <cm>            - Move right (20-500 cm)
  rotateclock <deg>     - Rotate clockwise (1-360 deg)
  rotatecounter <deg>   - Rotate counter-clockwise (1-360 deg)
  help                  - Show this help message
  exit                  - Land and exit";

/// Horizontal translation direction, relative to the vehicle body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    Forward,
    Back,
    Left,
    Right,
}

impl MoveDirection {
    /// Operator keyword for this direction
    pub fn keyword(self) -> &'static str {
        match self {
            MoveDirection::Forward => "forward",
            MoveDirection::Back => "back",
            MoveDirection::Left => "left",
            MoveDirection::Right => "right",
        }
    }
}

/// Yaw rotation direction, seen from above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotateDirection {
    Clockwise,
    CounterClockwise,
}

impl RotateDirection {
    /// Operator keyword for this direction
    pub fn keyword(self) -> &'static str {
        match self {
            RotateDirection::Clockwise => "rotateclock",
            RotateDirection::CounterClockwise => "rotatecounter",
        }
    }
}

/// A validated command, ready for dispatch
///
/// Only [`validate`] builds these, so a `Move` always carries a distance in
/// `MIN_DISTANCE_CM..=MAX_DISTANCE_CM` and a `Rotate` an angle in
/// `MIN_ANGLE_DEG..=MAX_ANGLE_DEG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Takeoff,
    Land,
    Move {
        direction: MoveDirection,
        distance_cm: u32,
    },
    Rotate {
        direction: RotateDirection,
        degrees: u32,
    },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Takeoff => write!(f, "takeoff"),
            Instruction::Land => write!(f, "land"),
            Instruction::Move {
                direction,
                distance_cm,
            } => write!(f, "{} {}", direction.keyword(), distance_cm),
            Instruction::Rotate { direction, degrees } => {
                write!(f, "{} {}", direction.keyword(), degrees)
            }
        }
    }
}

/// What a range check was applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Distance,
    Angle,
}

impl Quantity {
    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Distance => "cm",
            Quantity::Angle => "degrees",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Distance => write!(f, "Distance"),
            Quantity::Angle => write!(f, "Angle"),
        }
    }
}

/// Why a line of operator text was not turned into an [`Instruction`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Invalid command format: {0}")]
    InvalidFormat(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{quantity} must be between {min} and {max} {} (got {value})", .quantity.unit())]
    OutOfRange {
        quantity: Quantity,
        value: u64,
        min: u32,
        max: u32,
    },
}

/// A parsed line of operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Blank line, nothing to do
    Empty,
    Help,
    Exit,
    Instruction(Instruction),
}

/// Parse one line of operator input
///
/// Trims and lower-cases the line, handles the session-level verbs `help` and
/// `exit`, and hands everything else to [`validate`].
pub fn parse_input(line: &str) -> Result<Input, Rejection> {
    let line = line.trim().to_lowercase();

    match line.as_str() {
        "" => Ok(Input::Empty),
        "help" => Ok(Input::Help),
        "exit" => Ok(Input::Exit),
        other => Ok(validate(other)?.map_or(Input::Empty, Input::Instruction)),
    }
}

/// Validate a raw command into an [`Instruction`]
///
/// Keywords are case-insensitive. Returns `Ok(None)` for blank input. Pure:
/// the result depends only on the text, never on vehicle state.
pub fn validate(raw: &str) -> Result<Option<Instruction>, Rejection> {
    let raw = raw.to_lowercase();
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    match tokens.as_slice() {
        [] => Ok(None),
        [verb] => validate_verb(verb).map(Some),
        [verb, argument] => validate_motion(verb, argument).map(Some),
        _ => Err(Rejection::InvalidFormat(format!(
            "expected `<command>` or `<command> <value>`, got {} words",
            tokens.len()
        ))),
    }
}

/// Movement keywords, the only verbs that take an argument
#[derive(Debug, Clone, Copy)]
enum Motion {
    Translate(MoveDirection),
    Turn(RotateDirection),
}

fn motion_keyword(verb: &str) -> Option<Motion> {
    match verb {
        "forward" => Some(Motion::Translate(MoveDirection::Forward)),
        "back" => Some(Motion::Translate(MoveDirection::Back)),
        "left" => Some(Motion::Translate(MoveDirection::Left)),
        "right" => Some(Motion::Translate(MoveDirection::Right)),
        "rotateclock" => Some(Motion::Turn(RotateDirection::Clockwise)),
        "rotatecounter" => Some(Motion::Turn(RotateDirection::CounterClockwise)),
        _ => None,
    }
}

fn validate_verb(verb: &str) -> Result<Instruction, Rejection> {
    match verb {
        "takeoff" => Ok(Instruction::Takeoff),
        "land" => Ok(Instruction::Land),
        _ if motion_keyword(verb).is_some() => Err(Rejection::InvalidFormat(format!(
            "`{}` needs a value",
            verb
        ))),
        _ => Err(Rejection::UnknownCommand(verb.to_string())),
    }
}

fn validate_motion(verb: &str, argument: &str) -> Result<Instruction, Rejection> {
    let motion =
        motion_keyword(verb).ok_or_else(|| Rejection::UnknownCommand(verb.to_string()))?;
    let value = parse_magnitude(argument)?;

    match motion {
        Motion::Translate(direction) => {
            let distance_cm = check_range(
                Quantity::Distance,
                value,
                limits::MIN_DISTANCE_CM,
                limits::MAX_DISTANCE_CM,
            )?;
            Ok(Instruction::Move {
                direction,
                distance_cm,
            })
        }
        Motion::Turn(direction) => {
            let degrees = check_range(
                Quantity::Angle,
                value,
                limits::MIN_ANGLE_DEG,
                limits::MAX_ANGLE_DEG,
            )?;
            Ok(Instruction::Rotate { direction, degrees })
        }
    }
}

/// Parse a non-negative integer made of ASCII digits only
///
/// Values too large for `u64` saturate so the range check reports them.
fn parse_magnitude(argument: &str) -> Result<u64, Rejection> {
    if argument.is_empty() || !argument.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejection::InvalidFormat(format!(
            "`{}` is not a non-negative integer",
            argument
        )));
    }

    Ok(argument.parse::<u64>().unwrap_or(u64::MAX))
}

fn check_range(quantity: Quantity, value: u64, min: u32, max: u32) -> Result<u32, Rejection> {
    if value < u64::from(min) || value > u64::from(max) {
        return Err(Rejection::OutOfRange {
            quantity,
            value,
            min,
            max,
        });
    }
    Ok(value as u32)
}
