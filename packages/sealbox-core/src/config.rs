//! # Engine Configuration
//!
//! Parameters shared by every pipeline an engine runs.
//!
//! | Field | Default | Range |
//! |-------|---------|-------|
//! | `rsa_bits` | 2048 | 2048-8192, multiple of 8 |
//! | `symmetric_bits` | 256 | 256 only |
//! | `run_timeout` | none | > 0 when set |
//! | `max_parallel` | available parallelism | >= 1 |

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::crypto::{DEFAULT_RSA_BITS, MAX_RSA_BITS, MIN_RSA_BITS, SYMMETRIC_KEY_SIZE};
use crate::error::{Error, Result};
use crate::pipeline::RunControl;

/// Fallback worker count when the platform cannot report its parallelism
const FALLBACK_PARALLELISM: usize = 4;

/// Configuration for sealing and opening packages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Modulus size for generated RSA key pairs
    pub rsa_bits: u32,
    /// Session key size
    pub symmetric_bits: u32,
    /// Deadline for a whole pipeline run, checked between stages
    pub run_timeout: Option<Duration>,
    /// Maximum number of pipelines a batch runs at once
    pub max_parallel: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rsa_bits: DEFAULT_RSA_BITS,
            symmetric_bits: (SYMMETRIC_KEY_SIZE * 8) as u32,
            run_timeout: None,
            max_parallel: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_PARALLELISM),
        }
    }
}

impl EngineConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&self.rsa_bits) || self.rsa_bits % 8 != 0 {
            return Err(Error::InvalidConfig(format!(
                "rsa_bits must be a multiple of 8 in {}-{}, got {}",
                MIN_RSA_BITS, MAX_RSA_BITS, self.rsa_bits
            )));
        }
        if self.symmetric_bits as usize != SYMMETRIC_KEY_SIZE * 8 {
            return Err(Error::InvalidConfig(format!(
                "symmetric_bits must be {}, got {}",
                SYMMETRIC_KEY_SIZE * 8,
                self.symmetric_bits
            )));
        }
        if self.run_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig("run_timeout must be positive".into()));
        }
        if self.max_parallel == 0 {
            return Err(Error::InvalidConfig("max_parallel must be at least 1".into()));
        }
        Ok(())
    }

    /// A fresh run control whose deadline starts now
    pub fn run_control(&self) -> RunControl {
        match self.run_timeout {
            Some(timeout) => RunControl::with_deadline(Instant::now() + timeout),
            None => RunControl::new(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.rsa_bits, 2048);
        assert_eq!(config.symmetric_bits, 256);
        assert!(config.max_parallel >= 1);
        assert!(config.run_control().deadline().is_none());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let cases = [
            EngineConfig {
                rsa_bits: 1024,
                ..Default::default()
            },
            EngineConfig {
                rsa_bits: 2049,
                ..Default::default()
            },
            EngineConfig {
                symmetric_bits: 128,
                ..Default::default()
            },
            EngineConfig {
                run_timeout: Some(Duration::ZERO),
                ..Default::default()
            },
            EngineConfig {
                max_parallel: 0,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"rsa_bits": 3072}"#).unwrap();

        assert_eq!(config.rsa_bits, 3072);
        assert_eq!(config.symmetric_bits, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_control_carries_deadline() {
        let config = EngineConfig {
            run_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let before = Instant::now();
        let deadline = config.run_control().deadline().unwrap();

        assert!(deadline >= before + Duration::from_secs(30));
        assert!(deadline <= Instant::now() + Duration::from_secs(30));
    }
}
