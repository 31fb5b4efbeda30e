//! JSON configuration for load increments, Newton-Raphson options and the
//! linear solver.
//!
//! ```json
//! {
//!   "increments": { "initial": 0.25, "minimum": 1e-4, "maximum": 0.5 },
//!   "nonlinear": { "max_iterations": 10, "residual_tolerance": 1e-6 },
//!   "linear_solver": { "type": "conjugate_gradient", "tolerance": 1e-10 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::assembly::AssemblyMode;
use crate::error::Result;

/// Adaptive load increment parameters.
///
/// All quantities are in units of the cumulative load factor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IncrementConfig {
    /// First trial increment
    pub initial: f64,
    /// Smallest increment before the run is abandoned
    pub minimum: f64,
    /// Largest increment the controller may grow to
    pub maximum: f64,
    /// Target cumulative load factor
    #[serde(default = "default_final_factor")]
    pub final_factor: f64,
    /// Multiplier applied to the increment after a converged step
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    /// Multiplier applied to the increment after a failed step
    #[serde(default = "default_cutback_factor")]
    pub cutback_factor: f64,
    /// Optional cap on back-to-back failed attempts
    #[serde(default)]
    pub max_consecutive_cutbacks: Option<usize>,
}

fn default_final_factor() -> f64 {
    1.0
}

fn default_growth_factor() -> f64 {
    2.0
}

fn default_cutback_factor() -> f64 {
    0.5
}

impl Default for IncrementConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            minimum: 1e-4,
            maximum: 1.0,
            final_factor: default_final_factor(),
            growth_factor: default_growth_factor(),
            cutback_factor: default_cutback_factor(),
            max_consecutive_cutbacks: None,
        }
    }
}

impl IncrementConfig {
    /// Fixed-size stepping: `count` equal increments to a full load
    pub fn uniform(count: usize) -> Self {
        let step = 1.0 / count.max(1) as f64;
        Self {
            initial: step,
            minimum: step * 1e-3,
            maximum: step,
            growth_factor: 1.0,
            ..Self::default()
        }
    }

    /// Check the parameters are internally consistent
    pub fn validate(&self) -> std::result::Result<(), String> {
        let finite = [
            self.initial,
            self.minimum,
            self.maximum,
            self.final_factor,
            self.growth_factor,
            self.cutback_factor,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err("increment parameters must be finite".to_string());
        }
        if self.minimum <= 0.0 {
            return Err(format!("minimum increment {} must be positive", self.minimum));
        }
        if self.minimum > self.maximum {
            return Err(format!(
                "minimum increment {} exceeds maximum {}",
                self.minimum, self.maximum
            ));
        }
        if self.initial < self.minimum || self.initial > self.maximum {
            return Err(format!(
                "initial increment {} outside [{}, {}]",
                self.initial, self.minimum, self.maximum
            ));
        }
        if self.final_factor <= 0.0 {
            return Err(format!(
                "final load factor {} must be positive",
                self.final_factor
            ));
        }
        if self.growth_factor < 1.0 {
            return Err(format!(
                "growth factor {} must be at least 1",
                self.growth_factor
            ));
        }
        if self.cutback_factor <= 0.0 || self.cutback_factor >= 1.0 {
            return Err(format!(
                "cutback factor {} must lie in (0, 1)",
                self.cutback_factor
            ));
        }
        Ok(())
    }
}

/// Newton-Raphson options
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NonlinearOptions {
    /// Iteration cap per load step
    pub max_iterations: usize,
    /// Bound on the norm of the displacement correction
    pub displacement_tolerance: f64,
    /// Bound on the norm of the constrained residual
    pub residual_tolerance: f64,
    pub assembly: AssemblyMode,
}

impl Default for NonlinearOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            displacement_tolerance: 1.0e-5,
            residual_tolerance: 1.0e-3,
            assembly: AssemblyMode::Parallel,
        }
    }
}

/// Linear solver selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinearSolverConfig {
    /// Dense LU factorisation
    #[default]
    DirectLu,
    /// Jacobi preconditioned conjugate gradient
    ConjugateGradient {
        #[serde(default = "default_cg_tolerance")]
        tolerance: f64,
        #[serde(default = "default_cg_iterations")]
        max_iterations: usize,
    },
}

fn default_cg_tolerance() -> f64 {
    1.0e-10
}

fn default_cg_iterations() -> usize {
    2000
}

/// Parse a configuration block from a JSON string
pub fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Parse a configuration block from a JSON file
pub fn from_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    from_json_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_defaults_fill_optional_fields() {
        let config: IncrementConfig =
            from_json_str(r#"{ "initial": 0.1, "minimum": 0.001, "maximum": 0.5 }"#).unwrap();
        assert_eq!(config.final_factor, 1.0);
        assert_eq!(config.growth_factor, 2.0);
        assert_eq!(config.cutback_factor, 0.5);
        assert_eq!(config.max_consecutive_cutbacks, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn increment_rejects_unknown_fields() {
        let result: Result<IncrementConfig> =
            from_json_str(r#"{ "initial": 0.1, "minimum": 0.001, "maximum": 0.5, "period": 1 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn increment_validation_catches_inverted_bounds() {
        let config = IncrementConfig {
            initial: 0.1,
            minimum: 0.5,
            maximum: 0.2,
            ..IncrementConfig::default()
        };
        let message = config.validate().unwrap_err();
        assert!(message.contains("exceeds maximum"));
    }

    #[test]
    fn increment_validation_catches_bad_cutback() {
        let config = IncrementConfig {
            cutback_factor: 1.0,
            ..IncrementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn uniform_increments_do_not_grow() {
        let config = IncrementConfig::uniform(4);
        assert_eq!(config.initial, 0.25);
        assert_eq!(config.maximum, 0.25);
        assert_eq!(config.growth_factor, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nonlinear_options_partial_json() {
        let options: NonlinearOptions =
            from_json_str(r#"{ "max_iterations": 25, "assembly": "sequential" }"#).unwrap();
        assert_eq!(options.max_iterations, 25);
        assert_eq!(options.assembly, AssemblyMode::Sequential);
        assert_eq!(options.residual_tolerance, 1.0e-3);
    }

    #[test]
    fn linear_solver_tagged_json() {
        let direct: LinearSolverConfig = from_json_str(r#"{ "type": "direct_lu" }"#).unwrap();
        assert_eq!(direct, LinearSolverConfig::DirectLu);
        assert_eq!(LinearSolverConfig::default(), LinearSolverConfig::DirectLu);

        let cg: LinearSolverConfig =
            from_json_str(r#"{ "type": "conjugate_gradient", "tolerance": 1e-8 }"#).unwrap();
        assert_eq!(
            cg,
            LinearSolverConfig::ConjugateGradient {
                tolerance: 1e-8,
                max_iterations: 2000
            }
        );
    }

    #[test]
    fn reads_configuration_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("increments.json");
        fs::write(&path, r#"{ "initial": 0.5, "minimum": 0.01, "maximum": 1.0 }"#).unwrap();

        let config: IncrementConfig = from_json_file(&path).unwrap();
        assert_eq!(config.initial, 0.5);
    }
}
