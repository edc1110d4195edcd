use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, ModelDType, Offloading, TextToImage};

/// Everything the one-time load phase needs. Resolution of device, dtype,
/// and placement happens here, before the first request is accepted.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Hugging Face model id of a turbo-class checkpoint.
    pub model_id: String,
    pub device_map: DeviceMap,
    pub dtype: ModelDType,
    pub offloading: Offloading,
}

impl LoadOptions {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            device_map: DeviceMap::default(),
            dtype: ModelDType::default(),
            offloading: Offloading::default(),
        }
    }
}

pub trait Loader {
    type Model: TextToImage;

    fn load(options: &LoadOptions, api: Api) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
