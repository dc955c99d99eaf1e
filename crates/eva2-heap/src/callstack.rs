//! Callstacks and wrapper-frame truncation.
//!
//! The engine keys its per-site memoization on the chain of callsites the
//! analyzer is currently in. Frames belonging to configured malloc
//! wrappers are trimmed from the top so that a wrapper does not split one
//! logical allocation site into many.

use std::fmt;

use crate::HeapConfig;

/// One frame: a function, currently executing a call at `line`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub function: String,
    pub line: u64,
}

/// The current chain of callsites, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callstack {
    frames: Vec<Frame>,
}

impl Callstack {
    /// Build a stack from frames, outermost first. Must be non-empty.
    pub fn new(frames: Vec<Frame>) -> Self {
        debug_assert!(!frames.is_empty(), "callstacks are never empty");
        Callstack { frames }
    }

    /// Convenience constructor from `(function, line)` pairs.
    pub fn from_pairs(pairs: &[(&str, u64)]) -> Self {
        Callstack::new(
            pairs
                .iter()
                .map(|(function, line)| Frame {
                    function: (*function).to_string(),
                    line: *line,
                })
                .collect(),
        )
    }

    /// The innermost frame.
    pub fn top(&self) -> &Frame {
        self.frames.last().expect("callstacks are never empty")
    }

    /// The frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Strip wrapper frames from the top: while the stack has at least two
    /// frames and both the top function and its caller are configured as
    /// wrappers, drop the top frame. The stack is never emptied.
    pub fn truncated(&self, config: &HeapConfig) -> Callstack {
        let mut frames = self.frames.clone();
        while frames.len() >= 2
            && config.is_wrapper(&frames[frames.len() - 1].function)
            && config.is_wrapper(&frames[frames.len() - 2].function)
        {
            frames.pop();
        }
        Callstack { frames }
    }
}

impl fmt::Display for Callstack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}:{}", frame.function, frame.line)?;
        }
        Ok(())
    }
}
