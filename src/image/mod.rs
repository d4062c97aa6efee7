//! Image generation module.

mod provider;
pub mod providers;
mod types;

#[cfg(test)]
pub(crate) use provider::stub;
#[cfg(test)]
pub(crate) use types::fixtures;

pub use provider::ImageService;
pub use types::{
    AspectRatio, GenerationConfig, GenerationRequest, GenerationResponse, ImageData, ImageFormat,
    Model, Resolution, Role, Turn,
};
