use loam_tuning::PrecisionPolicy;
use serde::{Deserialize, Serialize};

/// Environment override naming an accelerator (e.g. `LOAM_ACCELERATOR=cuda`).
pub const ACCELERATOR_ENV: &str = "LOAM_ACCELERATOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Accelerator,
}

/// Numeric precision for stored checkpoint weights. Arithmetic is always
/// f32; half mode narrows what lands on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Full,
    Half,
}

/// The single device a job occupies for its whole duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub kind: DeviceKind,
    /// Budget the runner checks its working-set estimate against.
    pub memory_budget_bytes: u64,
    /// Free-form name for logs ("cpu", "cuda", ...).
    pub name: String,
}

impl Device {
    /// Probe the environment at call time. An accelerator is only reported
    /// when the `LOAM_ACCELERATOR` override names one; everything else is CPU
    /// with a conservative budget.
    #[must_use]
    pub fn detect() -> Self {
        match std::env::var(ACCELERATOR_ENV) {
            Ok(name) if !name.trim().is_empty() => Self {
                kind: DeviceKind::Accelerator,
                memory_budget_bytes: 8 * 1024 * 1024 * 1024,
                name: name.trim().to_lowercase(),
            },
            _ => Self::cpu(),
        }
    }

    #[must_use]
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            memory_budget_bytes: 512 * 1024 * 1024,
            name: "cpu".to_string(),
        }
    }

    /// Resolve the job's precision policy against this device's capability.
    #[must_use]
    pub fn resolve_precision(&self, policy: PrecisionPolicy) -> Precision {
        match policy {
            PrecisionPolicy::ForceFull => Precision::Full,
            PrecisionPolicy::ForceHalf => Precision::Half,
            PrecisionPolicy::Auto => match self.kind {
                DeviceKind::Accelerator => Precision::Half,
                DeviceKind::Cpu => Precision::Full,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_resolves_full_under_auto() {
        let dev = Device::cpu();
        assert_eq!(dev.resolve_precision(PrecisionPolicy::Auto), Precision::Full);
    }

    #[test]
    fn test_force_half_overrides_capability() {
        let dev = Device::cpu();
        assert_eq!(dev.resolve_precision(PrecisionPolicy::ForceHalf), Precision::Half);
    }
}
