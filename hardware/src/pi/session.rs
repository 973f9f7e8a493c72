//! Session progress shared by the controller layer and its errors.

use strum::Display;

/// Progress of [`TipTilt2Axis::set_up`](super::TipTilt2Axis::set_up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum SessionState {
    Uninitialized,
    Connected,
    Configured,
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered_by_progress() {
        assert!(SessionState::Uninitialized < SessionState::Connected);
        assert!(SessionState::Connected < SessionState::Configured);
        assert!(SessionState::Configured < SessionState::Ready);
        assert_eq!(SessionState::Ready.to_string(), "Ready");
    }
}
