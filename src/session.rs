//! Conversation state for interactive image refinement.

use crate::error::{ImagegenError, Result};
use crate::image::{GenerationConfig, GenerationRequest, ImageData, ImageService, Turn};
use std::path::Path;

/// When the session's current image rides along with a message the caller
/// did not attach an image to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttachPolicy {
    /// Only before the first turn, e.g. right after loading an image into
    /// a fresh conversation. Later turns rely on the history instead.
    #[default]
    FirstTurn,
    /// On every turn.
    EveryTurn,
}

/// What the model sent back for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// New image, if one was generated.
    pub image: Option<ImageData>,
    /// Model text, if any.
    pub text: Option<String>,
}

/// A single conversation: ordered turns plus the image currently being worked on.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: GenerationConfig,
    attach_policy: AttachPolicy,
    turns: Vec<Turn>,
    current_image: Option<ImageData>,
}

impl Session {
    /// Creates an empty session.
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the attach policy.
    pub fn with_attach_policy(mut self, policy: AttachPolicy) -> Self {
        self.attach_policy = policy;
        self
    }

    /// Generation settings used for every turn.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Attach policy in effect.
    pub fn attach_policy(&self) -> AttachPolicy {
        self.attach_policy
    }

    /// Turns so far, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent image in the conversation.
    pub fn current_image(&self) -> Option<&ImageData> {
        self.current_image.as_ref()
    }

    /// Returns true if no turn has happened and no image is loaded.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.current_image.is_none()
    }

    /// Sends a message, optionally with an image, and records the exchange.
    ///
    /// An explicit `image` always wins. Without one, the current image is
    /// attached according to the [`AttachPolicy`]. At most one image is
    /// attached per call. A blank message or a resolution the model cannot
    /// render is rejected before the service is called. On failure the
    /// session is left as it was.
    pub async fn send(
        &mut self,
        service: &dyn ImageService,
        message: &str,
        image: Option<ImageData>,
    ) -> Result<Reply> {
        if message.trim().is_empty() {
            return Err(ImagegenError::Validation("message must not be empty".into()));
        }
        self.config.validate()?;

        let explicit = image.is_some();
        let attached = image.or_else(|| self.implicit_attachment());

        let mut request =
            GenerationRequest::new(message, self.config).with_history(self.turns.clone());
        if let Some(ref image) = attached {
            request = request.with_image(image.clone());
        }

        tracing::debug!(
            turn = self.turns.len() / 2 + 1,
            attached = attached.is_some(),
            explicit,
            "sending session turn"
        );

        let response = service.generate(&request).await?;

        if explicit {
            self.current_image.clone_from(&attached);
        }
        self.turns.push(Turn::user(message, attached));
        self.turns
            .push(Turn::model(response.text.clone(), response.image.clone()));
        if let Some(ref image) = response.image {
            self.current_image = Some(image.clone());
        }

        Ok(Reply {
            image: response.image,
            text: response.text,
        })
    }

    fn implicit_attachment(&self) -> Option<ImageData> {
        let image = self.current_image.as_ref()?;
        match self.attach_policy {
            AttachPolicy::FirstTurn if !self.turns.is_empty() => None,
            _ => Some(image.clone()),
        }
    }

    /// Writes the current image to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = self.current_image.as_ref().ok_or(ImagegenError::NoImage)?;
        image.save(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "saved current image");
        Ok(())
    }

    /// Makes the image at `path` the current image. History is untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&ImageData> {
        let image = ImageData::load(path)?;
        Ok(&*self.current_image.insert(image))
    }

    /// Forgets all turns and the current image.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.current_image = None;
    }
}
