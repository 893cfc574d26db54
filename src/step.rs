//! Step-through debugger gate (§4.11).
//!
//! Two independent atomics rather than a single lock: written by command
//! handlers (on the input task), read by the dispatcher on every pipeline
//! pass, with the lock-free discipline §5 asks for on the step-through
//! state.

use std::sync::atomic::{AtomicBool, Ordering};

/// The state change a handler can request for the step-through gate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum StepChange {
    #[default]
    None,
    Enable,
    Disable,
    Advance,
    Resume,
}

#[derive(Debug, Default)]
pub struct StepState {
    enabled: AtomicBool,
    pending_advance: AtomicBool,
}

impl StepState {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        self.pending_advance.store(false, Ordering::Release);
    }

    /// Disables the gate entirely — equivalent to `step off`/`step resume`,
    /// returning the dispatcher to unconditional streaming.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.pending_advance.store(false, Ordering::Release);
    }

    /// Arms a single advance: the dispatcher renders exactly the next held
    /// message, then the gate re-closes on its own (`take_advance`).
    pub fn advance(&self) {
        self.pending_advance.store(true, Ordering::Release);
    }

    /// Consulted by the dispatcher before rendering a message while
    /// stepping is enabled. Consumes the pending advance so only one
    /// message is released per `next` command.
    pub fn take_advance(&self) -> bool {
        self.pending_advance.swap(false, Ordering::AcqRel)
    }

    pub fn apply(&self, change: StepChange) {
        match change {
            StepChange::None => {}
            StepChange::Enable => self.enable(),
            StepChange::Disable | StepChange::Resume => self.disable(),
            StepChange::Advance => self.advance(),
        }
    }

    /// Whether the dispatcher may render the next message right now: either
    /// stepping is off (unconditional streaming), or it's on and an advance
    /// is pending (consumed by this call).
    pub fn may_render(&self) -> bool {
        if !self.enabled() {
            return true;
        }
        self.take_advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_always_allows_rendering() {
        let state = StepState::default();
        assert!(state.may_render());
        assert!(state.may_render());
    }

    #[test]
    fn enabled_gate_blocks_until_advance() {
        let state = StepState::default();
        state.enable();
        assert!(!state.may_render());
        state.advance();
        assert!(state.may_render());
        // advance is consumed: the next call blocks again.
        assert!(!state.may_render());
    }

    #[test]
    fn resume_reopens_unconditional_streaming() {
        let state = StepState::default();
        state.enable();
        state.apply(StepChange::Resume);
        assert!(state.may_render());
    }
}
