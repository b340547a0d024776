use thiserror::Error;

use crate::models::Category;

/// Domain failures that callers may want to match on.
///
/// Everything else travels as a plain `anyhow::Error`; these are wrapped in
/// one too and recovered with `downcast_ref` at the CLI / HTTP edge.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("'{name}' is not in {category}")]
    UnresolvedMealReference { category: Category, name: String },

    #[error("suggestion service failed: {0}")]
    SuggestionServiceFailure(String),

    #[error("{category} already contains '{name}'")]
    DuplicateMealName { category: Category, name: String },

    #[error("stored '{key}' could not be read: {reason}")]
    MalformedPersistedState { key: String, reason: String },

    #[error("{0}")]
    NotFound(String),

    #[error("a sync for {0} is already running")]
    SyncInProgress(String),
}

impl PlannerError {
    /// Wrap any collaborator error, keeping only its display text.
    pub fn suggestion(err: &anyhow::Error) -> Self {
        Self::SuggestionServiceFailure(format!("{err:#}"))
    }

    /// Message safe to show to a user: no upstream detail for service failures.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::SuggestionServiceFailure(_) => {
                "Sync failed, check your connection and try again".to_string()
            }
            other => other.to_string(),
        }
    }
}
