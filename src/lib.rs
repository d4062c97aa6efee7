#![warn(missing_docs)]
//! imagegen - generate, edit and compose images with Gemini.
//!
//! The crate provides one-shot operations ([`generate`], [`edit`],
//! [`compose`]) and a conversational [`Session`] that keeps track of the
//! current image across turns, all on top of the [`ImageService`] trait.
//!
//! # Quick Start
//!
//! ```no_run
//! use imagegen::{generate, GeminiProvider, GenerationConfig, Model};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> imagegen::Result<()> {
//!     let provider = GeminiProvider::builder().build()?;
//!     let outcome = generate(
//!         &provider,
//!         "A golden retriever puppy",
//!         "puppy.png",
//!         GenerationConfig::new(Model::Fast),
//!     )
//!     .await?;
//!     println!("saved: {:?}", outcome.saved);
//!     Ok(())
//! }
//! ```
//!
//! # Conversations
//!
//! ```no_run
//! use imagegen::{GeminiProvider, GenerationConfig, Session};
//!
//! # async fn run() -> imagegen::Result<()> {
//! let provider = GeminiProvider::builder().build()?;
//! let mut session = Session::new(GenerationConfig::default());
//! session.load("photo.png")?;
//! session.send(&provider, "Add a rainbow in the sky", None).await?;
//! session.send(&provider, "Make the rainbow brighter", None).await?;
//! session.save("rainbow.png")?;
//! # Ok(())
//! # }
//! ```

pub mod chat;
mod error;
pub mod image;
mod operations;
mod session;

pub use error::{ErrorKind, ImagegenError, Result};

pub use image::providers::{GeminiProvider, GeminiProviderBuilder};
pub use image::{
    AspectRatio, GenerationConfig, GenerationRequest, GenerationResponse, ImageData, ImageFormat,
    ImageService, Model, Resolution, Role, Turn,
};
pub use operations::{
    compose, edit, generate, OperationOutcome, MAX_COMPOSE_IMAGES, MIN_COMPOSE_IMAGES,
};
pub use session::{AttachPolicy, Reply, Session};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{ImagegenError, Result};
    pub use crate::image::providers::GeminiProvider;
    pub use crate::image::{GenerationConfig, ImageData, ImageService, Model};
    pub use crate::operations::{compose, edit, generate};
    pub use crate::session::Session;
}
