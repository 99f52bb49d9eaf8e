use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error classes callers map onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Unhandled,
    Transport,
    Persistence,
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device already exists: {0}")]
    DeviceAlreadyExists(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid payload for action {0}: {1}")]
    InvalidActionPayload(String, String),

    #[error("Unhandled action: {0}")]
    UnhandledAction(String),

    #[error("Transport error: {0}")]
    TransportError(anyhow::Error),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::DeviceNotFound(_) | DomainError::GroupNotFound(_) => ErrorKind::NotFound,
            DomainError::DeviceAlreadyExists(_) | DomainError::GroupAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }
            DomainError::ValidationError(_) | DomainError::InvalidActionPayload(_, _) => {
                ErrorKind::InvalidArgument
            }
            DomainError::UnhandledAction(_) => ErrorKind::Unhandled,
            DomainError::TransportError(_) => ErrorKind::Transport,
            DomainError::RepositoryError(_) => ErrorKind::Persistence,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DomainError::DeviceNotFound("a111".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DomainError::GroupAlreadyExists("workshop".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            DomainError::InvalidActionPayload("list".into(), "eof".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            DomainError::UnhandledAction("ack".into()).kind(),
            ErrorKind::Unhandled
        );
        assert_eq!(
            DomainError::TransportError(anyhow::anyhow!("broker down")).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            DomainError::from(anyhow::anyhow!("pool exhausted")).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(DomainError::GroupNotFound("x".into()).is_not_found());
        assert!(!DomainError::ValidationError("x".into()).is_not_found());
    }
}
