//! Core types for image generation.

use crate::error::{ImagegenError, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Parses a MIME type as sent by the API.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    fn codec(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::WebP => image::ImageFormat::WebP,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Gemini 2.5 Flash Image (fast, economical).
    #[default]
    Fast,
    /// Gemini 3 Pro Image (highest quality, up to 4K, up to 14 references).
    Pro,
}

impl Model {
    /// All model variants, fastest first.
    pub const ALL: [Model; 2] = [Model::Fast, Model::Pro];

    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "gemini-2.5-flash-image",
            Self::Pro => "gemini-3-pro-image-preview",
        }
    }

    /// Returns true if the model can render at `resolution`.
    pub fn supports(&self, resolution: Resolution) -> bool {
        !matches!((self, resolution), (Self::Fast, Resolution::FourK))
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aspect ratios accepted by the Gemini image models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square.
    #[serde(rename = "1:1")]
    Square,
    /// 2:3 portrait.
    #[serde(rename = "2:3")]
    Portrait2x3,
    /// 3:2 landscape.
    #[serde(rename = "3:2")]
    Landscape3x2,
    /// 3:4 portrait.
    #[serde(rename = "3:4")]
    Portrait3x4,
    /// 4:3 landscape.
    #[serde(rename = "4:3")]
    Landscape4x3,
    /// 4:5 portrait.
    #[serde(rename = "4:5")]
    Portrait4x5,
    /// 5:4 landscape.
    #[serde(rename = "5:4")]
    Landscape5x4,
    /// 9:16 tall portrait.
    #[serde(rename = "9:16")]
    Portrait9x16,
    /// 16:9 widescreen.
    #[serde(rename = "16:9")]
    Landscape16x9,
    /// 21:9 ultrawide.
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    /// All supported aspect ratios.
    pub const ALL: [AspectRatio; 10] = [
        Self::Square,
        Self::Portrait2x3,
        Self::Landscape3x2,
        Self::Portrait3x4,
        Self::Landscape4x3,
        Self::Portrait4x5,
        Self::Landscape5x4,
        Self::Portrait9x16,
        Self::Landscape16x9,
        Self::Ultrawide,
    ];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait2x3 => "2:3",
            Self::Landscape3x2 => "3:2",
            Self::Portrait3x4 => "3:4",
            Self::Landscape4x3 => "4:3",
            Self::Portrait4x5 => "4:5",
            Self::Landscape5x4 => "5:4",
            Self::Portrait9x16 => "9:16",
            Self::Landscape16x9 => "16:9",
            Self::Ultrawide => "21:9",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// ~1024px on the long edge.
    #[serde(rename = "1K")]
    OneK,
    /// ~2048px on the long edge.
    #[serde(rename = "2K")]
    TwoK,
    /// ~4096px on the long edge. Pro model only.
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    /// Returns the resolution as sent to the API (e.g., "2K").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model variant.
    pub model: Model,
    /// Output aspect ratio; the model picks one when unset.
    pub aspect_ratio: Option<AspectRatio>,
    /// Output resolution; the model default when unset.
    pub resolution: Option<Resolution>,
}

impl GenerationConfig {
    /// Creates a config for the given model.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    /// Sets the output resolution.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Rejects model/resolution pairings the service would refuse.
    pub fn validate(&self) -> Result<()> {
        if let Some(resolution) = self.resolution {
            if !self.model.supports(resolution) {
                return Err(ImagegenError::Validation(format!(
                    "{resolution} resolution requires the pro model ({})",
                    Model::Pro.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Encoded image bytes whose format has been recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    data: Vec<u8>,
    format: ImageFormat,
}

impl ImageData {
    /// Wraps raw bytes, detecting the format from magic bytes.
    ///
    /// The image header is parsed as well, so a recognised signature
    /// followed by garbage is rejected.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| ImagegenError::Decode("unknown image format".into()))?;
        let (width, height) = image::ImageReader::with_format(Cursor::new(&data), format.codec())
            .into_dimensions()
            .map_err(|e| {
                ImagegenError::Decode(format!("invalid {} data: {e}", format.extension()))
            })?;
        tracing::trace!(format = format.extension(), width, height, "decoded image header");
        Ok(Self { data, format })
    }

    /// Reads and validates an image file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).map_err(|e| ImagegenError::file_access(path, e.to_string()))?;
        Self::from_bytes(data).map_err(|e| match e {
            ImagegenError::Decode(reason) => ImagegenError::file_access(path, reason),
            other => other,
        })
    }

    /// Writes the bytes to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Raw encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Detected format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard.
    User,
    /// The image model.
    Model,
}

impl Role {
    /// Role name as used in API `contents`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One exchange unit of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Author of the turn.
    pub role: Role,
    /// Text, if any.
    pub text: Option<String>,
    /// Image, if any.
    pub image: Option<ImageData>,
}

impl Turn {
    /// A user turn.
    pub fn user(text: impl Into<String>, image: Option<ImageData>) -> Self {
        Self {
            role: Role::User,
            text: Some(text.into()),
            image,
        }
    }

    /// A model turn.
    pub fn model(text: Option<String>, image: Option<ImageData>) -> Self {
        Self {
            role: Role::Model,
            text,
            image,
        }
    }
}

/// A request to the image service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prompt or edit instruction.
    pub instruction: String,
    /// Reference images sent ahead of the instruction.
    pub images: Vec<ImageData>,
    /// Generation settings.
    pub config: GenerationConfig,
    /// Earlier turns of the conversation, oldest first.
    pub history: Vec<Turn>,
}

impl GenerationRequest {
    /// Creates a new request with the given instruction.
    pub fn new(instruction: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            instruction: instruction.into(),
            images: Vec::new(),
            config,
            history: Vec::new(),
        }
    }

    /// Adds a reference image.
    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }

    /// Adds several reference images.
    pub fn with_images(mut self, images: impl IntoIterator<Item = ImageData>) -> Self {
        self.images.extend(images);
        self
    }

    /// Sets the prior conversation.
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }
}

/// What the service sent back: at most one image and optional text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "a generated image should be saved or processed"]
pub struct GenerationResponse {
    /// Generated image, if the model produced one.
    pub image: Option<ImageData>,
    /// Accompanying text, if any.
    pub text: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small, fully encoded images for tests.

    use super::ImageData;
    use std::io::Cursor;

    fn encode(format: image::ImageFormat) -> Vec<u8> {
        let pixels = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        pixels.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    pub fn png_bytes() -> Vec<u8> {
        encode(image::ImageFormat::Png)
    }

    pub fn jpeg_bytes() -> Vec<u8> {
        encode(image::ImageFormat::Jpeg)
    }

    pub fn png() -> ImageData {
        ImageData::from_bytes(png_bytes()).unwrap()
    }

    pub fn jpeg() -> ImageData {
        ImageData::from_bytes(jpeg_bytes()).unwrap()
    }
}
