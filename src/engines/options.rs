use crate::dtype::DType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use strum::VariantNames;

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("Unknown engine option `{0}`")]
    UnknownOption(String),
    #[error("Invalid value `{value}` for `{option}`, expected one of {expected:?}")]
    UnknownValue {
        option: &'static str,
        value: String,
        expected: &'static [&'static str],
    },
    #[error("Value {value} is out of range for `{option}`")]
    OutOfRange { option: &'static str, value: u32 },
    #[error("Invalid engine options: {0}")]
    Invalid(String),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Buffer-reuse policy of the memory planner.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
    strum_macros::FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum MemoryPolicy {
    #[default]
    Compact,
    Mru,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
    strum_macros::FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum ForwardPrecision {
    /// Leave output types to the operators.
    #[default]
    Auto,
    Fp32,
    Fp16,
    Int8,
}

impl ForwardPrecision {
    /// The type requested from type inference, `None` for UNKNOWN.
    pub fn requested_dtype(&self) -> Option<DType> {
        match self {
            ForwardPrecision::Auto => None,
            ForwardPrecision::Fp32 => Some(DType::F32),
            ForwardPrecision::Fp16 => Some(DType::F16),
            ForwardPrecision::Int8 => Some(DType::I8),
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
    strum_macros::FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum OptimizationLevel {
    DisableAll,
    Basic,
    #[default]
    Extended,
    All,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
    strum_macros::FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum WinogradLevel {
    #[default]
    Off,
    On,
    OnBlock2,
    OnBlock4,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::VariantNames,
    strum_macros::FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum DynamicTuningLevel {
    #[default]
    Off,
    SelectAlgo,
    SelectBlockSize,
}

macro_rules! option_conversions {
    ($ty:ident, $option:literal) => {
        impl TryFrom<u32> for $ty {
            type Error = OptionsError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                $ty::from_repr(value).ok_or(OptionsError::OutOfRange { option: $option, value })
            }
        }

        impl $ty {
            pub fn parse(value: &str) -> Result<Self, OptionsError> {
                $ty::from_str(value).map_err(|_| OptionsError::UnknownValue {
                    option: $option,
                    value: value.to_string(),
                    expected: $ty::VARIANTS,
                })
            }
        }
    };
}

option_conversions!(MemoryPolicy, "mm_policy");
option_conversions!(ForwardPrecision, "forward_precision");
option_conversions!(OptimizationLevel, "graph_optimization_level");
option_conversions!(WinogradLevel, "winograd_level");
option_conversions!(DynamicTuningLevel, "dynamic_tuning_level");

/// Configuration of one engine. Built once, then shared read-only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    pub mm_policy: MemoryPolicy,
    pub forward_precision: ForwardPrecision,
    pub graph_optimization_level: OptimizationLevel,
    pub winograd_level: WinogradLevel,
    pub dynamic_tuning_level: DynamicTuningLevel,
    /// Preferred NUMA node. Recorded and reported, the host runtime does not pin.
    pub numa_node_id: Option<u32>,
    /// Upper bound for planned tensor storage.
    pub max_memory_bytes: Option<usize>,
}

impl EngineOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_memory_bytes == Some(0) {
            return Err(OptionsError::Invalid("max_memory_bytes must be positive".to_string()));
        }
        Ok(())
    }

    pub fn from_json(s: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        log::debug!("loading engine options from {}", path.display());
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Sets one option from its textual form, e.g. `("mm_policy", "mru")`.
    pub fn set(&mut self, option: &str, value: &str) -> Result<(), OptionsError> {
        match option {
            "mm_policy" => self.mm_policy = MemoryPolicy::parse(value)?,
            "forward_precision" => self.forward_precision = ForwardPrecision::parse(value)?,
            "graph_optimization_level" => self.graph_optimization_level = OptimizationLevel::parse(value)?,
            "winograd_level" => self.winograd_level = WinogradLevel::parse(value)?,
            "dynamic_tuning_level" => self.dynamic_tuning_level = DynamicTuningLevel::parse(value)?,
            "numa_node_id" => {
                self.numa_node_id = Some(value.parse().map_err(|_| OptionsError::UnknownValue {
                    option: "numa_node_id",
                    value: value.to_string(),
                    expected: &["<unsigned integer>"],
                })?)
            }
            "max_memory_bytes" => {
                self.max_memory_bytes = Some(value.parse().map_err(|_| OptionsError::UnknownValue {
                    option: "max_memory_bytes",
                    value: value.to_string(),
                    expected: &["<unsigned integer>"],
                })?)
            }
            other => return Err(OptionsError::UnknownOption(other.to_string())),
        }
        self.validate()
    }
}
