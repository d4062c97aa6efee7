//! One-shot operations: generate, edit and compose.
//!
//! Each call validates its inputs, sends a single request to the
//! [`ImageService`] and writes the returned image (if any) to the output
//! path, replacing whatever was there.

use crate::error::{ImagegenError, Result};
use crate::image::{GenerationConfig, GenerationRequest, ImageData, ImageFormat, ImageService};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Fewest reference images `compose` accepts.
pub const MIN_COMPOSE_IMAGES: usize = 1;

/// Most reference images `compose` accepts.
pub const MAX_COMPOSE_IMAGES: usize = 14;

/// Result of a one-shot operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    /// Where the image was written; `None` if the service returned no image.
    pub saved: Option<PathBuf>,
    /// Text the model sent along with (or instead of) the image.
    pub text: Option<String>,
    /// Format of the written image.
    pub format: Option<ImageFormat>,
    /// Size of the written image in bytes.
    pub size_bytes: usize,
}

/// Generates an image from a text prompt.
pub async fn generate(
    service: &dyn ImageService,
    prompt: &str,
    output: impl AsRef<Path>,
    config: GenerationConfig,
) -> Result<OperationOutcome> {
    require_instruction(prompt, "prompt")?;
    config.validate()?;

    let request = GenerationRequest::new(prompt, config);
    execute(service, &request, output.as_ref()).await
}

/// Edits an existing image according to an instruction.
pub async fn edit(
    service: &dyn ImageService,
    input: impl AsRef<Path>,
    instruction: &str,
    output: impl AsRef<Path>,
    config: GenerationConfig,
) -> Result<OperationOutcome> {
    require_instruction(instruction, "instruction")?;
    config.validate()?;
    let image = ImageData::load(input)?;

    let request = GenerationRequest::new(instruction, config).with_image(image);
    execute(service, &request, output.as_ref()).await
}

/// Composes a new image from several reference images.
pub async fn compose(
    service: &dyn ImageService,
    instruction: &str,
    output: impl AsRef<Path>,
    images: &[PathBuf],
    config: GenerationConfig,
) -> Result<OperationOutcome> {
    require_instruction(instruction, "instruction")?;
    if !(MIN_COMPOSE_IMAGES..=MAX_COMPOSE_IMAGES).contains(&images.len()) {
        return Err(ImagegenError::Validation(format!(
            "compose takes {MIN_COMPOSE_IMAGES} to {MAX_COMPOSE_IMAGES} images, got {}",
            images.len()
        )));
    }
    config.validate()?;

    let images = images
        .iter()
        .map(ImageData::load)
        .collect::<Result<Vec<_>>>()?;

    let request = GenerationRequest::new(instruction, config).with_images(images);
    execute(service, &request, output.as_ref()).await
}

fn require_instruction(text: &str, what: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ImagegenError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

async fn execute(
    service: &dyn ImageService,
    request: &GenerationRequest,
    output: &Path,
) -> Result<OperationOutcome> {
    let response = service.generate(request).await?;

    let mut outcome = OperationOutcome {
        text: response.text,
        ..OperationOutcome::default()
    };

    match response.image {
        Some(image) => {
            image.save(output)?;
            tracing::info!(
                path = %output.display(),
                size_bytes = image.size(),
                "saved generated image"
            );
            outcome.saved = Some(output.to_path_buf());
            outcome.format = Some(image.format());
            outcome.size_bytes = image.size();
        }
        None => {
            tracing::warn!(service = service.name(), "service returned no image");
        }
    }

    Ok(outcome)
}
