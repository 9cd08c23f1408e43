// src/ops.rs
//
// All the transformations the engine can apply to the play head.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseOpError;

/// Serial number assigned by the engine when an operation is queued.
pub type OpId = u32;

/// Tag of an operation, without its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Empty slot marker, never scheduled
    None = 0,
    Reverse = 1,
    AbsoluteJump = 2,
    RelativeJump = 3,
    LoopInLoop = 4,
    SpeedRamp = 5,
}

impl OpKind {
    /// Number of tags, including `None`.
    pub const COUNT: usize = 6;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Kind-specific payload. Positions and sizes are in samples.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum Transform {
    #[default]
    None,

    Reverse,

    AbsoluteJump { position: u32 },

    RelativeJump { offset: i32 },

    LoopInLoop { loop_size: u32 },

    /// Speed coefficients, 1.0 is normal playback
    SpeedRamp { start_speed: f32, end_speed: f32 },
}

impl Transform {
    #[inline]
    pub fn kind(&self) -> OpKind {
        match self {
            Transform::None => OpKind::None,
            Transform::Reverse => OpKind::Reverse,
            Transform::AbsoluteJump { .. } => OpKind::AbsoluteJump,
            Transform::RelativeJump { .. } => OpKind::RelativeJump,
            Transform::LoopInLoop { .. } => OpKind::LoopInLoop,
            Transform::SpeedRamp { .. } => OpKind::SpeedRamp,
        }
    }
}

/// One timed transformation of the play head.
///
/// `start` is a sample index in the clock epoch the operation was queued
/// in, `duration` is in samples.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Operation {
    pub id: OpId,
    pub start: u32,
    pub duration: u32,
    pub transform: Transform,
}

impl Operation {
    pub fn new(transform: Transform, start: u32, duration: u32) -> Self {
        Self {
            id: 0,
            start,
            duration,
            transform,
        }
    }

    pub fn reverse(start: u32, duration: u32) -> Self {
        Self::new(Transform::Reverse, start, duration)
    }

    pub fn absolute_jump(start: u32, duration: u32, position: u32) -> Self {
        Self::new(Transform::AbsoluteJump { position }, start, duration)
    }

    pub fn relative_jump(start: u32, duration: u32, offset: i32) -> Self {
        Self::new(Transform::RelativeJump { offset }, start, duration)
    }

    pub fn loop_in_loop(start: u32, duration: u32, loop_size: u32) -> Self {
        Self::new(Transform::LoopInLoop { loop_size }, start, duration)
    }

    pub fn speed_ramp(start: u32, duration: u32, start_speed: f32, end_speed: f32) -> Self {
        Self::new(
            Transform::SpeedRamp {
                start_speed,
                end_speed,
            },
            start,
            duration,
        )
    }

    #[inline]
    pub fn kind(&self) -> OpKind {
        self.transform.kind()
    }

    #[inline]
    pub fn matches_type(&self, kind: OpKind) -> bool {
        self.kind() == kind
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.matches_type(OpKind::None)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Text form
// ═══════════════════════════════════════════════════════════════════

fn field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str, ParseOpError> {
    parts.next().ok_or(ParseOpError::MissingField(name))
}

/// Parses `<name> <start> <duration> [payload...]`, e.g. `jump 0 4410 -2205`.
impl FromStr for Operation {
    type Err = ParseOpError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_ascii_whitespace();
        let name = parts.next().ok_or(ParseOpError::Empty)?;

        let start = field(&mut parts, "start")?.parse::<u32>()?;
        let duration = field(&mut parts, "duration")?.parse::<u32>()?;

        let transform = match name {
            "reverse" => Transform::Reverse,
            "abs-jump" => Transform::AbsoluteJump {
                position: field(&mut parts, "position")?.parse()?,
            },
            "jump" => Transform::RelativeJump {
                offset: field(&mut parts, "offset")?.parse()?,
            },
            "repeat" => Transform::LoopInLoop {
                loop_size: field(&mut parts, "loop_size")?.parse()?,
            },
            "speed-ramp" => Transform::SpeedRamp {
                start_speed: field(&mut parts, "start_speed")?.parse()?,
                end_speed: field(&mut parts, "end_speed")?.parse()?,
            },
            other => return Err(ParseOpError::UnknownOperation(other.to_string())),
        };

        Ok(Operation::new(transform, start, duration))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transform {
            Transform::None => write!(f, "none {} {}", self.start, self.duration),
            Transform::Reverse => write!(f, "reverse {} {}", self.start, self.duration),
            Transform::AbsoluteJump { position } => {
                write!(f, "abs-jump {} {} {}", self.start, self.duration, position)
            }
            Transform::RelativeJump { offset } => {
                write!(f, "jump {} {} {}", self.start, self.duration, offset)
            }
            Transform::LoopInLoop { loop_size } => {
                write!(f, "repeat {} {} {}", self.start, self.duration, loop_size)
            }
            Transform::SpeedRamp {
                start_speed,
                end_speed,
            } => write!(
                f,
                "speed-ramp {} {} {} {}",
                self.start, self.duration, start_speed, end_speed
            ),
        }
    }
}
