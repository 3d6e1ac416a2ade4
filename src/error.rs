pub type DeckResult<T> = Result<T, DeckError>;

#[derive(thiserror::Error, Debug)]
pub enum DeckError {
    #[error("validation error: {0}")]
    Validation(String),

    /// An individual element's image or chart resource failed to load or
    /// decode. Recovered locally by the compositor; never fatal for a render.
    #[error("resource error: {0}")]
    Resource(String),

    /// The rendering surface could not be acquired, or the render failed
    /// before any element was painted. Fatal for that single render call.
    #[error("render error: {0}")]
    Render(String),

    /// The external persistence/undo collaborator rejected a commit or
    /// snapshot request.
    #[error("commit error: {0}")]
    Commit(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeckError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    /// Whether this error is recoverable at element granularity.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            DeckError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            DeckError::resource("x")
                .to_string()
                .contains("resource error:")
        );
        assert!(DeckError::render("x").to_string().contains("render error:"));
        assert!(DeckError::commit("x").to_string().contains("commit error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = DeckError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn resource_class_is_detected() {
        assert!(DeckError::resource("x").is_resource());
        assert!(!DeckError::render("x").is_resource());
    }
}
