//! Synthesis targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A platform a module can be emitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// The programmable-switch pipeline.
    Switch,
    /// The switch's companion CPU, handling traffic the pipeline punts.
    SwitchCpu,
    /// A software controller.
    Controller,
}

impl TargetType {
    pub const ALL: [TargetType; 3] =
        [TargetType::Switch, TargetType::SwitchCpu, TargetType::Controller];

    /// Returns `true` for targets that run general-purpose software.
    pub fn is_software(self) -> bool {
        !matches!(self, TargetType::Switch)
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetType::Switch => "switch",
            TargetType::SwitchCpu => "switch_cpu",
            TargetType::Controller => "controller",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "switch" => Ok(TargetType::Switch),
            "switch_cpu" | "cpu" => Ok(TargetType::SwitchCpu),
            "controller" => Ok(TargetType::Controller),
            other => Err(format!(
                "unknown target '{}'. Expected: switch, switch_cpu, controller",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        for target in TargetType::ALL {
            assert_eq!(target.to_string().parse::<TargetType>().unwrap(), target);
        }
        assert_eq!("CPU".parse::<TargetType>().unwrap(), TargetType::SwitchCpu);
        assert!("fpga".parse::<TargetType>().is_err());
    }

    #[test]
    fn software_targets() {
        assert!(!TargetType::Switch.is_software());
        assert!(TargetType::Controller.is_software());
    }
}
