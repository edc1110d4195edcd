use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Ordinal(usize),
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::Ordinal(0)
    }
}

/// Placement strategy for the text encoders relative to the accelerator.
/// `TextEncoders` keeps T5/CLIP on the CPU so low-memory devices only hold
/// the transformer and the autoencoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Offloading {
    #[default]
    None,
    TextEncoders,
}

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(_) => {
            tracing::warn!("no accelerator available, falling back to CPU");
            Ok(Device::Cpu)
        }
    }
}

/// Operator-facing label for the device `select_best_device` resolves to,
/// without constructing a second device handle.
pub fn resolved_device_label(device_map: DeviceMap) -> &'static str {
    match device_map {
        DeviceMap::ForceCpu => "cpu",
        DeviceMap::Ordinal(_) if cuda_is_available() => "cuda",
        DeviceMap::Ordinal(_) if metal_is_available() => "metal",
        DeviceMap::Ordinal(_) => "cpu",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_accelerator_ordinal() {
        assert_eq!(DeviceMap::default(), DeviceMap::Ordinal(0));
    }

    #[test]
    fn force_cpu_selects_cpu() {
        let device = select_best_device(DeviceMap::ForceCpu).unwrap();
        assert!(matches!(device, Device::Cpu));
        assert_eq!(resolved_device_label(DeviceMap::ForceCpu), "cpu");
    }

    #[test]
    fn offloading_defaults_to_none() {
        assert_eq!(Offloading::default(), Offloading::None);
    }
}
