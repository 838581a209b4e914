pub type PlayheadResult<T> = Result<T, PlayheadError>;

#[derive(thiserror::Error, Debug)]
pub enum PlayheadError {
    #[error("script error: {0}")]
    Script(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("timeline error: {0}")]
    Timeline(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlayheadError {
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            PlayheadError::script("x")
                .to_string()
                .contains("script error:")
        );
        assert!(
            PlayheadError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            PlayheadError::timeline("x")
                .to_string()
                .contains("timeline error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = PlayheadError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
