use hspi_hal::traits::HalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),
    #[error("condition not reached within {limit} cycles")]
    CycleLimit { limit: u64 },
}

/// A system advanced in two phases per cycle.
///
/// `drive` publishes every registered output; `clock` then samples inputs
/// and updates registers. No part of a system may sample the bus in `drive`.
pub trait Clocked {
    fn drive(&mut self) -> Result<(), HalError>;
    fn clock(&mut self) -> Result<(), HalError>;
}

pub struct CycleEngine<S: Clocked> {
    pub system: S,
    pub cycle_count: u64,
}

impl<S: Clocked> CycleEngine<S> {
    pub fn new(system: S) -> Self {
        Self {
            system,
            cycle_count: 0,
        }
    }

    pub fn step(&mut self) -> Result<(), RuntimeError> {
        self.system.drive()?;
        self.system.clock()?;
        self.cycle_count += 1;
        Ok(())
    }

    pub fn run_cycles(&mut self, count: u64) -> Result<(), RuntimeError> {
        for _ in 0..count {
            self.step()?;
        }
        Ok(())
    }

    /// Steps until `done` holds, checked before every cycle. Returns the
    /// number of cycles taken by this call.
    pub fn run_until(
        &mut self,
        max_cycles: u64,
        mut done: impl FnMut(&S) -> bool,
    ) -> Result<u64, RuntimeError> {
        let start = self.cycle_count;
        while !done(&self.system) {
            if self.cycle_count - start >= max_cycles {
                log::warn!("gave up after {max_cycles} cycles");
                return Err(RuntimeError::CycleLimit { limit: max_cycles });
            }
            self.step()?;
        }
        Ok(self.cycle_count - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two registers that copy each other's published value.
    #[derive(Default)]
    struct Swap {
        regs: [u32; 2],
        published: [u32; 2],
        fail_at: Option<u32>,
    }

    impl Clocked for Swap {
        fn drive(&mut self) -> Result<(), HalError> {
            self.published = self.regs;
            Ok(())
        }

        fn clock(&mut self) -> Result<(), HalError> {
            self.regs = [self.published[1] + 1, self.published[0] + 1];
            if Some(self.regs[0]) == self.fail_at {
                return Err(HalError::CommError("boom".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn phases_do_not_race() {
        let mut engine = CycleEngine::new(Swap {
            regs: [0, 100],
            ..Swap::default()
        });
        engine.step().unwrap();
        assert_eq!(engine.system.regs, [101, 1]);
        assert_eq!(engine.cycle_count, 1);
    }

    #[test]
    fn run_until_counts_cycles() {
        let mut engine = CycleEngine::new(Swap::default());
        let taken = engine.run_until(100, |s| s.regs[0] >= 5).unwrap();
        assert_eq!(taken, 5);
        assert_eq!(engine.run_until(100, |_| true).unwrap(), 0);
    }

    #[test]
    fn run_until_gives_up() {
        let mut engine = CycleEngine::new(Swap::default());
        let err = engine.run_until(10, |_| false).unwrap_err();
        assert!(matches!(err, RuntimeError::CycleLimit { limit: 10 }));
        assert_eq!(engine.cycle_count, 10);
    }

    #[test]
    fn hal_errors_propagate() {
        let mut engine = CycleEngine::new(Swap {
            fail_at: Some(3),
            ..Swap::default()
        });
        let err = engine.run_cycles(10).unwrap_err();
        assert!(matches!(err, RuntimeError::Hal(HalError::CommError(_))));
        assert_eq!(engine.cycle_count, 2);
    }
}
