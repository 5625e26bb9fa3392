//! Domain primitive types used across the nsrun workspace.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{NsrunError, Result};

/// CPU bandwidth limit: `quota_us` of CPU time per `period_us` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuLimit {
    /// Allowed CPU time per period, in microseconds.
    pub quota_us: u64,
    /// Length of the accounting period, in microseconds.
    pub period_us: u64,
}

impl CpuLimit {
    /// Builds a limit from a fraction of one CPU over the fixed period.
    ///
    /// `0.5` yields a quota of 50000 µs per 100000 µs. A fraction of zero
    /// means no limit and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fraction is negative or not finite.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_fraction(fraction: f64) -> Result<Option<Self>> {
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(NsrunError::invalid(format!(
                "CPU fraction must be a non-negative number, got {fraction}"
            )));
        }
        let quota_us = (fraction * constants::CPU_PERIOD_US as f64) as u64;
        if quota_us == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            quota_us,
            period_us: constants::CPU_PERIOD_US,
        }))
    }
}

/// Resource limits for a container. `None` means no limit is imposed.
/// A zero value, as a config file may carry, also means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    pub memory_bytes: Option<u64>,
    /// CPU bandwidth limit.
    pub cpu: Option<CpuLimit>,
    /// Maximum number of processes in the group.
    pub pids_max: Option<u64>,
}

impl ResourceLimits {
    /// Returns these limits with every zero value treated as unset.
    #[must_use]
    pub fn effective(self) -> Self {
        Self {
            memory_bytes: self.memory_bytes.filter(|&b| b > 0),
            cpu: self.cpu.filter(|c| c.quota_us > 0 && c.period_us > 0),
            pids_max: self.pids_max.filter(|&p| p > 0),
        }
    }

    /// Returns whether no effective limit is configured.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        let limits = self.effective();
        limits.memory_bytes.is_none() && limits.cpu.is_none() && limits.pids_max.is_none()
    }
}

/// Host and container sides of the container's network link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host bridge the veth host side is attached to.
    pub bridge: String,
    /// Name of the veth end that stays on the host.
    pub host_if: String,
    /// Name of the veth end moved into the container.
    pub container_if: String,
    /// Container address in CIDR form, e.g. `10.0.0.2/24`.
    pub address: String,
    /// Default gateway. Empty or `None` installs no default route.
    pub gateway: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge: constants::DEFAULT_BRIDGE.into(),
            host_if: constants::DEFAULT_HOST_IF.into(),
            container_if: constants::DEFAULT_CONTAINER_IF.into(),
            address: constants::DEFAULT_ADDRESS.into(),
            gateway: Some(constants::DEFAULT_GATEWAY.into()),
        }
    }
}

/// Parses a memory size such as `"268435456"`, `"256M"`, or `"1G"`.
///
/// `M`/`m` multiply by 2^20 and `G`/`g` by 2^30. Zero means no limit
/// and yields `None`.
///
/// # Errors
///
/// Returns an error if the numeric part is not a decimal integer or the
/// result overflows `u64`.
pub fn parse_memory(input: &str) -> Result<Option<u64>> {
    let s = input.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((idx, 'M' | 'm')) => (&s[..idx], 1024 * 1024),
        Some((idx, 'G' | 'g')) => (&s[..idx], 1024 * 1024 * 1024),
        _ => (s, 1_u64),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| NsrunError::invalid(format!("invalid memory size: {input:?}")))?;
    let bytes = value
        .checked_mul(multiplier)
        .ok_or_else(|| NsrunError::invalid(format!("memory size overflows: {input:?}")))?;
    Ok((bytes > 0).then_some(bytes))
}

/// Parses a CPU fraction such as `"0.5"` into a bandwidth limit.
///
/// # Errors
///
/// Returns an error if the input is not a non-negative number.
pub fn parse_cpu(input: &str) -> Result<Option<CpuLimit>> {
    let fraction: f64 = input
        .trim()
        .parse()
        .map_err(|_| NsrunError::invalid(format!("invalid CPU fraction: {input:?}")))?;
    CpuLimit::from_fraction(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limits_are_not_effective() {
        let limits = ResourceLimits {
            memory_bytes: Some(0),
            cpu: Some(CpuLimit {
                quota_us: 0,
                period_us: 100_000,
            }),
            pids_max: Some(0),
        };
        assert_eq!(limits.effective(), ResourceLimits::default());
        assert!(limits.is_unlimited());
    }

    #[test]
    fn nonzero_limits_survive_normalisation() {
        let limits = ResourceLimits {
            memory_bytes: Some(1),
            pids_max: Some(0),
            ..ResourceLimits::default()
        };
        assert_eq!(limits.effective().memory_bytes, Some(1));
        assert_eq!(limits.effective().pids_max, None);
        assert!(!limits.is_unlimited());
    }

    #[test]
    fn parse_memory_megabytes() {
        assert_eq!(parse_memory("256M").unwrap(), Some(256 * 1024 * 1024));
    }

    #[test]
    fn parse_memory_gigabytes_lowercase() {
        assert_eq!(parse_memory("2g").unwrap(), Some(2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn parse_memory_plain_bytes() {
        assert_eq!(parse_memory("1048576").unwrap(), Some(1_048_576));
    }

    #[test]
    fn parse_memory_zero_is_unset() {
        assert_eq!(parse_memory("0").unwrap(), None);
        assert_eq!(parse_memory("0M").unwrap(), None);
    }

    #[test]
    fn parse_memory_rejects_garbage() {
        assert!(parse_memory("lots").is_err());
        assert!(parse_memory("").is_err());
        assert!(parse_memory("12K").is_err());
    }

    #[test]
    fn parse_memory_rejects_overflow() {
        assert!(parse_memory("18446744073709551615G").is_err());
    }

    #[test]
    fn cpu_half_yields_half_period() {
        let cpu = parse_cpu("0.5").unwrap().unwrap();
        assert_eq!(cpu.period_us, 100_000);
        assert_eq!(cpu.quota_us, 50_000);
    }

    #[test]
    fn cpu_above_one_allows_multiple_cores() {
        let cpu = parse_cpu("2").unwrap().unwrap();
        assert_eq!(cpu.quota_us, 200_000);
    }

    #[test]
    fn cpu_zero_is_unset() {
        assert_eq!(parse_cpu("0").unwrap(), None);
    }

    #[test]
    fn cpu_negative_is_rejected() {
        assert!(parse_cpu("-0.5").is_err());
        assert!(parse_cpu("NaN").is_err());
    }

    #[test]
    fn default_limits_are_unlimited() {
        assert!(ResourceLimits::default().is_unlimited());
        let limits = ResourceLimits {
            pids_max: Some(64),
            ..ResourceLimits::default()
        };
        assert!(!limits.is_unlimited());
    }
}
