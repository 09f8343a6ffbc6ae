//! Data shapes exchanged with the external collaborators.

/// Story context handed to the merge engine when building prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryContext {
    /// Ordered story sections as exposed by the story service.
    pub sections: Vec<StorySection>,
    /// The most recent action known to the story service, when any.
    pub most_recent_action: Option<String>,
}

/// One section of the story context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorySection {
    /// What role the section plays in the story document.
    pub kind: SectionKind,
    /// Raw section text.
    pub text: String,
}

/// Role of a story section. Instructions and author's notes are meta
/// material and are filtered out of merge prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Narrative prose that belongs in the prompt.
    Story,
    /// Steering instructions meant for the story service itself.
    Instructions,
    /// Author's note attached to the story document.
    AuthorsNote,
}

/// One request against the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System prompt establishing the merge task.
    pub system_prompt: String,
    /// User prompt carrying context and the enumerated submissions.
    pub user_prompt: String,
    /// Model identifier to run the call against.
    pub model: String,
    /// Upper bound on response tokens.
    pub max_tokens: u32,
}

/// Response from the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// The synthesized text.
    pub text: String,
    /// Model that actually served the call.
    pub model: String,
}
