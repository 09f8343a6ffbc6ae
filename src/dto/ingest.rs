use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dto::validation::validate_username;

/// Longest raw chat line accepted on ingest.
const MAX_TEXT_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
/// Which chat transport a message arrived from.
pub enum ChatSource {
    /// IRC-style stream chat; moderators here may issue commands.
    Twitch,
    /// Live-chat widget observation; never privileged.
    Youtube,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
/// One chat message delivered by a transport through the ingest route.
pub struct ChatEventRequest {
    /// Transport the message arrived from.
    pub source: ChatSource,
    /// Username as reported by the transport.
    pub user: String,
    /// Raw message text.
    pub text: String,
    /// Whether the transport marked this user as moderator/owner.
    #[serde(default)]
    pub privileged: bool,
}

impl Validate for ChatEventRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_username(&self.user) {
            errors.add("user", e);
        }

        if self.text.is_empty() || self.text.len() > MAX_TEXT_LEN {
            let mut err = ValidationError::new("text_length");
            err.message = Some(format!("text must be 1..={MAX_TEXT_LEN} bytes").into());
            errors.add("text", err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
