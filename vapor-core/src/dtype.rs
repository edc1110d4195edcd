use candle_core::{DType, Device};
use serde::Deserialize;

/// Weight precision for the loaded checkpoint. The CLI spelling
/// (`float16` | `bfloat16` | `float32`) is the serialized form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelDType {
    Float16,
    #[default]
    Bfloat16,
    Float32,
}

serde_plain::derive_fromstr_from_deserialize!(ModelDType);

impl ModelDType {
    /// Resolves to a candle dtype the device can actually run; devices
    /// without bf16 support fall back to f32.
    pub fn to_dtype(self, device: &Device) -> DType {
        match self {
            Self::Float16 => DType::F16,
            Self::Bfloat16 => match device {
                Device::Cpu => DType::F32,
                _ => DType::BF16,
            },
            Self::Float32 => DType::F32,
        }
    }
}
