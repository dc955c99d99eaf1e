//! Diagnostics emitted while modeling heap primitives.
//!
//! Alarms do not stop the analysis: the engine keeps processing the valid
//! part of the argument and carries the alarms in the builtin result, so
//! the host can report them once per call site.

use std::fmt;

/// The kind of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    /// `free` of something that is not a freeable allocated base.
    WrongFree,
    /// A `realloc` argument that cannot be resolved or copied.
    InvalidRealloc,
    /// An allocated base no longer reachable from the rest of the state.
    Leak,
}

/// A diagnostic attached to the current call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub kind: AlarmKind,
    pub message: String,
}

impl Alarm {
    pub fn wrong_free(message: impl Into<String>) -> Self {
        Alarm {
            kind: AlarmKind::WrongFree,
            message: message.into(),
        }
    }

    pub fn invalid_realloc(message: impl Into<String>) -> Self {
        Alarm {
            kind: AlarmKind::InvalidRealloc,
            message: message.into(),
        }
    }

    pub fn leak(message: impl Into<String>) -> Self {
        Alarm {
            kind: AlarmKind::Leak,
            message: message.into(),
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            AlarmKind::WrongFree => "wrong free",
            AlarmKind::InvalidRealloc => "invalid realloc",
            AlarmKind::Leak => "memory leak",
        };
        write!(f, "{label}: {}", self.message)
    }
}
