use half::{bf16, f16};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DTypeError {
    #[error("Unknown dtype name \"{0}\"")]
    UnknownDTypeName(String),
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum DType {
    F64,
    F32,
    BF16,
    F16,
    U64,
    I64,
    U32,
    I32,
    U16,
    I16,
    U8,
    I8,
    BOOL,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            DType::F64 => 8,
            DType::F32 => 4,
            DType::BF16 => 2,
            DType::F16 => 2,
            DType::U64 => 8,
            DType::I64 => 8,
            DType::U32 => 4,
            DType::I32 => 4,
            DType::U16 => 2,
            DType::I16 => 2,
            DType::U8 => 1,
            DType::I8 => 1,
            DType::BOOL => 1,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F64 | DType::F32 | DType::BF16 | DType::F16)
    }

    pub fn is_half(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }

    /// Integer kinds whose values are interpreted through per-tensor scale/zero-point metadata.
    pub fn is_quantized(&self) -> bool {
        matches!(self, DType::I8 | DType::U8)
    }
}

impl std::str::FromStr for DType {
    type Err = DTypeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "float64" | "f64" => DType::F64,
            "float32" | "f32" => DType::F32,
            "bfloat16" | "bf16" => DType::BF16,
            "float16" | "f16" => DType::F16,
            "uint64" | "u64" => DType::U64,
            "int64" | "i64" => DType::I64,
            "uint32" | "u32" => DType::U32,
            "int32" | "i32" => DType::I32,
            "uint16" | "u16" => DType::U16,
            "int16" | "i16" => DType::I16,
            "uint8" | "u8" => DType::U8,
            "int8" | "i8" => DType::I8,
            "bool" => DType::BOOL,
            _ => Err(DTypeError::UnknownDTypeName(s.to_string()))?,
        })
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::F64 => write!(f, "Float64"),
            DType::F32 => write!(f, "Float32"),
            DType::BF16 => write!(f, "BFloat16"),
            DType::F16 => write!(f, "Float16"),
            DType::I64 => write!(f, "Int64"),
            DType::I32 => write!(f, "Int32"),
            DType::U64 => write!(f, "UInt64"),
            DType::U32 => write!(f, "UInt32"),
            DType::I16 => write!(f, "Int16"),
            DType::U16 => write!(f, "UInt16"),
            DType::U8 => write!(f, "UInt8"),
            DType::I8 => write!(f, "Int8"),
            DType::BOOL => write!(f, "Bool"),
        }
    }
}

pub trait DTypeOfPrimitive {
    const DTYPE: DType;
}

impl DTypeOfPrimitive for f64 { const DTYPE: DType = DType::F64; }
impl DTypeOfPrimitive for f32 { const DTYPE: DType = DType::F32; }
impl DTypeOfPrimitive for bf16 { const DTYPE: DType = DType::BF16; }
impl DTypeOfPrimitive for f16 { const DTYPE: DType = DType::F16; }
impl DTypeOfPrimitive for i64 { const DTYPE: DType = DType::I64; }
impl DTypeOfPrimitive for u64 { const DTYPE: DType = DType::U64; }
impl DTypeOfPrimitive for i32 { const DTYPE: DType = DType::I32; }
impl DTypeOfPrimitive for u32 { const DTYPE: DType = DType::U32; }
impl DTypeOfPrimitive for i16 { const DTYPE: DType = DType::I16; }
impl DTypeOfPrimitive for u16 { const DTYPE: DType = DType::U16; }
impl DTypeOfPrimitive for i8 { const DTYPE: DType = DType::I8; }
impl DTypeOfPrimitive for u8 { const DTYPE: DType = DType::U8; }
impl DTypeOfPrimitive for bool { const DTYPE: DType = DType::BOOL; }
