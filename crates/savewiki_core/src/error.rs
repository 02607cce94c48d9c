use thiserror::Error;

/// Node-local failures raised while turning one template into a path entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("unsupported OS: {0}")]
    UnsupportedOs(String),

    #[error("unsupported path: {0}")]
    UnsupportedPath(String),

    #[error("malformed template: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnsupportedOs,
    UnsupportedPath,
    Other,
}

impl ExtractError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedOs(_) => FailureKind::UnsupportedOs,
            Self::UnsupportedPath(_) => FailureKind::UnsupportedPath,
            Self::Malformed(_) => FailureKind::Other,
        }
    }
}
