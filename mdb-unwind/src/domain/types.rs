//! Domain types shared across the capture pipeline

use std::fmt;

/// Lifecycle of the process-wide unwind context
///
/// Moves from `Uninitialized` to exactly one of the other two states, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Ready,
    Disabled,
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitState::Uninitialized => "uninitialized",
            InitState::Ready => "ready",
            InitState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_state_display() {
        assert_eq!(InitState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(InitState::Ready.to_string(), "ready");
        assert_eq!(InitState::Disabled.to_string(), "disabled");
    }
}
