//! Centralized configuration for xdcmesh.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use serde::{Deserialize, Serialize};

use crate::{MeshError, Result};

/// Central configuration for all xdcmesh components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub colors: ColorConfig,
    pub instances: InstanceConfig,
    pub simulation: SimulationConfig,
}

/// Display colour assignment for instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Colours handed out in order, one per instance
    pub palette: Vec<String>,
    /// Colour shared by every instance once the palette runs out
    pub fallback: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            palette: [
                "#2965CC", "#29A634", "#D99E0B", "#D13913", "#8F398F", "#00B3A4", "#DB2C6F",
                "#9BBF30", "#96622D", "#7157D9",
            ]
            .iter()
            .map(|color| color.to_string())
            .collect(),
            fallback: "#8A9BA8".to_string(),
        }
    }
}

/// Simulated instance registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Port-like id given to the first allocated instance
    pub base_port: u16,
    /// Maximum number of simultaneously registered instances
    pub max_instances: usize,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            base_port: 3001,
            max_instances: 64,
        }
    }
}

/// Simulation harness parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for generated scenarios
    pub seed: u64,
    /// Simulated time that passes between two event timestamps
    pub step_interval_ms: u64,
    /// Maximum number of events kept by an event recorder (0 = unbounded)
    pub event_history_limit: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            step_interval_ms: 10,
            event_history_limit: 10_000,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            seed: 42,
            step_interval_ms: 1,
            event_history_limit: 0, // Keep every event for assertions
        }
    }
}

impl MeshConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("XDCMESH_BASE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.instances.base_port = port;
            }
        }

        if let Ok(max) = std::env::var("XDCMESH_MAX_INSTANCES") {
            if let Ok(max) = max.parse::<usize>() {
                config.instances.max_instances = max;
            }
        }

        if let Ok(seed) = std::env::var("XDCMESH_SEED") {
            if let Ok(seed) = seed.parse::<u64>() {
                config.simulation.seed = seed;
            }
        }

        if let Ok(limit) = std::env::var("XDCMESH_EVENT_HISTORY") {
            if let Ok(limit) = limit.parse::<usize>() {
                config.simulation.event_history_limit = limit;
            }
        }

        config
    }

    /// Creates a configuration for deterministic tests.
    pub fn for_testing() -> Self {
        Self {
            simulation: SimulationConfig::deterministic_testing(),
            ..Self::default()
        }
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// - `MeshError::Configuration` - If the palette is empty or no instances are allowed
    pub fn validate(&self) -> Result<()> {
        if self.colors.palette.is_empty() {
            return Err(MeshError::Configuration {
                reason: "colour palette must not be empty".to_string(),
            });
        }

        if self.instances.max_instances == 0 {
            return Err(MeshError::Configuration {
                reason: "max_instances must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MeshConfig::default();
        config.validate().unwrap();
        assert_eq!(config.instances.base_port, 3001);
        assert_eq!(config.colors.palette.len(), 10);
    }

    #[test]
    fn test_validate_rejects_empty_palette() {
        let mut config = MeshConfig::default();
        config.colors.palette.clear();

        assert!(matches!(
            config.validate(),
            Err(MeshError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_instances() {
        let mut config = MeshConfig::for_testing();
        config.instances.max_instances = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MeshConfig =
            serde_json::from_str(r#"{"instances": {"base_port": 4000}}"#).unwrap();

        assert_eq!(config.instances.base_port, 4000);
        assert_eq!(config.instances.max_instances, 64);
        assert_eq!(config.simulation, SimulationConfig::default());
    }
}
