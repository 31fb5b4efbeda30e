//! Adaptive pseudo-time load stepping.
//!
//! The controller holds the last converged (committed) load factor and the
//! size of the increment currently being attempted. A converged attempt
//! advances the committed factor and may grow the next increment; a failed
//! attempt leaves the committed factor untouched and cuts the increment back.
//!
//! ```text
//!              converged: factor += increment, increment *= growth
//!           ┌──────────────────────────────────────┐
//!           │                                      ▼
//!   not fully applied ──── factor >= target ───► fully applied
//!           ▲   │
//!           └───┘ failed: increment *= cutback (fatal below minimum)
//! ```

use thiserror::Error;

use crate::config::IncrementConfig;

/// Relative tolerance for deciding the target load has been reached
const LOAD_TOLERANCE: f64 = 1.0e-10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("invalid increment configuration: {0}")]
    InvalidConfiguration(String),

    #[error("increment {increment:.3e} is smaller than the minimum {minimum:.3e}")]
    IncrementBelowMinimum { increment: f64, minimum: f64 },

    #[error("{attempts} consecutive attempts failed to converge")]
    TooManyCutbacks { attempts: usize },

    #[error("target load factor {target} is behind the converged load factor {progress}")]
    TargetBehindProgress { target: f64, progress: f64 },
}

/// Load factor controller for incremental (pseudo-time) loading
#[derive(Debug, Clone)]
pub struct AdaptiveLoad {
    config: IncrementConfig,
    /// Last converged cumulative load factor
    converged_factor: f64,
    /// Size of the increment being attempted
    increment: f64,
    /// Number of converged steps
    step: usize,
    consecutive_failures: usize,
    total_failures: usize,
}

impl AdaptiveLoad {
    pub fn new(config: IncrementConfig) -> Result<Self, LoadError> {
        config.validate().map_err(LoadError::InvalidConfiguration)?;

        Ok(Self {
            increment: config.initial.min(config.final_factor),
            config,
            converged_factor: 0.0,
            step: 0,
            consecutive_failures: 0,
            total_failures: 0,
        })
    }

    /// True once the converged factor has reached the target
    pub fn is_fully_applied(&self) -> bool {
        self.remaining() <= LOAD_TOLERANCE * self.config.final_factor.max(1.0)
    }

    /// Last converged cumulative load factor
    pub fn factor(&self) -> f64 {
        self.converged_factor
    }

    /// Trial cumulative load factor for the current attempt
    pub fn load_factor(&self) -> f64 {
        (self.converged_factor + self.increment).min(self.config.final_factor)
    }

    /// Trial increment, never overshooting the target
    pub fn increment(&self) -> f64 {
        self.load_factor() - self.converged_factor
    }

    /// Number of converged steps so far
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of rejected attempts over the whole run
    pub fn failed_attempts(&self) -> usize {
        self.total_failures
    }

    pub fn final_factor(&self) -> f64 {
        self.config.final_factor
    }

    pub fn config(&self) -> &IncrementConfig {
        &self.config
    }

    /// Advance on convergence, cut back otherwise.
    ///
    /// Returns an error when the cut-back increment falls below the configured
    /// minimum or too many attempts in a row have failed. The converged factor
    /// is unchanged in both error cases.
    pub fn update_convergence_state(&mut self, is_converged: bool) -> Result<(), LoadError> {
        if is_converged {
            self.converged_factor = self.load_factor();
            self.step += 1;
            self.consecutive_failures = 0;
            self.increment = (self.increment * self.config.growth_factor).min(self.config.maximum);
            return Ok(());
        }

        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.increment = self.increment() * self.config.cutback_factor;

        if self.increment < self.config.minimum {
            return Err(LoadError::IncrementBelowMinimum {
                increment: self.increment,
                minimum: self.config.minimum,
            });
        }
        if let Some(limit) = self.config.max_consecutive_cutbacks
            && self.consecutive_failures > limit
        {
            return Err(LoadError::TooManyCutbacks {
                attempts: self.consecutive_failures,
            });
        }
        Ok(())
    }

    /// Re-parameterise for a continuation run, keeping converged progress.
    pub fn reset(&mut self, config: IncrementConfig) -> Result<(), LoadError> {
        config.validate().map_err(LoadError::InvalidConfiguration)?;

        if config.final_factor < self.converged_factor {
            return Err(LoadError::TargetBehindProgress {
                target: config.final_factor,
                progress: self.converged_factor,
            });
        }

        self.increment = config.initial;
        self.consecutive_failures = 0;
        self.config = config;
        Ok(())
    }

    fn remaining(&self) -> f64 {
        self.config.final_factor - self.converged_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial: f64, minimum: f64, maximum: f64) -> IncrementConfig {
        IncrementConfig {
            initial,
            minimum,
            maximum,
            ..IncrementConfig::default()
        }
    }

    #[test]
    fn starts_unloaded() {
        let load = AdaptiveLoad::new(config(0.25, 0.01, 0.5)).unwrap();
        assert!(!load.is_fully_applied());
        assert_eq!(load.factor(), 0.0);
        assert_eq!(load.load_factor(), 0.25);
        assert_eq!(load.increment(), 0.25);
        assert_eq!(load.step(), 0);
    }

    #[test]
    fn converged_steps_advance_and_grow() {
        let mut load = AdaptiveLoad::new(config(0.125, 0.01, 0.5)).unwrap();

        load.update_convergence_state(true).unwrap();
        assert_eq!(load.factor(), 0.125);
        assert_eq!(load.increment(), 0.25);

        load.update_convergence_state(true).unwrap();
        assert_eq!(load.factor(), 0.375);
        // Growth is capped by the maximum increment
        assert_eq!(load.increment(), 0.5);
        assert_eq!(load.load_factor(), 0.875);

        load.update_convergence_state(true).unwrap();
        assert_eq!(load.increment(), 0.125);
        load.update_convergence_state(true).unwrap();
        assert!(load.is_fully_applied());
        assert_eq!(load.step(), 4);
    }

    #[test]
    fn failed_steps_do_not_advance() {
        let mut load = AdaptiveLoad::new(config(0.5, 0.01, 1.0)).unwrap();
        load.update_convergence_state(false).unwrap();

        assert_eq!(load.factor(), 0.0);
        assert_eq!(load.increment(), 0.25);
        assert_eq!(load.step(), 0);
        assert_eq!(load.failed_attempts(), 1);
    }

    #[test]
    fn increment_underflow_is_reported() {
        let mut load = AdaptiveLoad::new(config(0.1, 0.03, 0.5)).unwrap();
        load.update_convergence_state(false).unwrap(); // 0.05
        let err = load.update_convergence_state(false).unwrap_err(); // 0.025
        assert!(matches!(err, LoadError::IncrementBelowMinimum { .. }));
        assert_eq!(load.factor(), 0.0);
    }

    #[test]
    fn consecutive_cutback_limit() {
        let mut load = AdaptiveLoad::new(IncrementConfig {
            max_consecutive_cutbacks: Some(1),
            ..config(1.0, 1e-6, 1.0)
        })
        .unwrap();
        load.update_convergence_state(false).unwrap();
        let err = load.update_convergence_state(false).unwrap_err();
        assert_eq!(err, LoadError::TooManyCutbacks { attempts: 2 });
    }

    #[test]
    fn factor_is_monotonic() {
        let mut load = AdaptiveLoad::new(config(0.3, 1e-3, 0.6)).unwrap();
        let pattern = [true, false, false, true, true, false, true, true, true];
        let mut previous = load.factor();
        for converged in pattern {
            if load.is_fully_applied() {
                break;
            }
            load.update_convergence_state(converged).unwrap();
            assert!(load.factor() >= previous);
            if !converged {
                assert_eq!(load.factor(), previous);
            }
            previous = load.factor();
        }
    }

    #[test]
    fn reset_keeps_progress() {
        let mut load = AdaptiveLoad::new(config(0.5, 0.01, 0.5)).unwrap();
        load.update_convergence_state(true).unwrap();
        load.update_convergence_state(true).unwrap();
        assert!(load.is_fully_applied());

        load.reset(IncrementConfig {
            final_factor: 2.0,
            ..config(0.25, 0.01, 1.0)
        })
        .unwrap();
        assert!(!load.is_fully_applied());
        assert_eq!(load.factor(), 1.0);
        assert_eq!(load.load_factor(), 1.25);
        assert_eq!(load.step(), 2);
    }

    #[test]
    fn reset_rejects_target_behind_progress() {
        let mut load = AdaptiveLoad::new(config(0.5, 0.01, 0.5)).unwrap();
        load.update_convergence_state(true).unwrap();

        let err = load
            .reset(IncrementConfig {
                final_factor: 0.25,
                ..config(0.1, 0.01, 0.5)
            })
            .unwrap_err();
        assert!(matches!(err, LoadError::TargetBehindProgress { .. }));
        assert_eq!(load.final_factor(), 1.0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let err = AdaptiveLoad::new(config(0.5, 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, LoadError::InvalidConfiguration(_)));
    }
}
