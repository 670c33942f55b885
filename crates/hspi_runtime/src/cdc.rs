//! Clock-domain crossing for single-bit control signals.
//!
//! Only level signals (resets, status flags) cross through these; the data
//! bus never does.

/// Chain of `STAGES` flip-flops clocked in the destination domain.
#[derive(Debug, Clone)]
pub struct Synchronizer<const STAGES: usize = 2> {
    stages: [bool; STAGES],
}

impl<const STAGES: usize> Synchronizer<STAGES> {
    pub fn new(reset_value: bool) -> Self {
        const { assert!(STAGES >= 2, "a synchronizer needs at least two stages") };
        Self {
            stages: [reset_value; STAGES],
        }
    }

    pub fn output(&self) -> bool {
        self.stages[STAGES - 1]
    }

    pub fn clock(&mut self, input: bool) {
        self.stages.rotate_right(1);
        self.stages[0] = input;
    }
}

impl<const STAGES: usize> Default for Synchronizer<STAGES> {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Reset that asserts immediately and releases in step with the local clock.
#[derive(Debug, Clone)]
pub struct ResetSynchronizer<const STAGES: usize = 2> {
    stages: [bool; STAGES],
}

impl<const STAGES: usize> ResetSynchronizer<STAGES> {
    /// Starts in reset.
    pub fn new() -> Self {
        const { assert!(STAGES >= 2, "a synchronizer needs at least two stages") };
        Self {
            stages: [true; STAGES],
        }
    }

    pub fn in_reset(&self) -> bool {
        self.stages[STAGES - 1]
    }

    /// Asynchronous path: takes effect without waiting for a clock edge.
    pub fn assert_reset(&mut self) {
        self.stages = [true; STAGES];
    }

    pub fn clock(&mut self, reset_in: bool) {
        if reset_in {
            self.assert_reset();
        } else {
            self.stages.rotate_right(1);
            self.stages[0] = false;
        }
    }
}

impl<const STAGES: usize> Default for ResetSynchronizer<STAGES> {
    fn default() -> Self {
        Self::new()
    }
}
