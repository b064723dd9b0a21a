use thiserror::Error;

/// Reason a wrapped interaction was refused before it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionVeto {
    Hidden(String),
    Disabled(String),
    Invalid(String),
}

impl std::fmt::Display for InteractionVeto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionVeto::Hidden(member) => write!(f, "'{}' is hidden", member),
            InteractionVeto::Disabled(reason) => write!(f, "disabled: {}", reason),
            InteractionVeto::Invalid(reason) => write!(f, "invalid: {}", reason),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Concurrency conflict for user '{user}' on {oid}: current version {current}, incoming version {incoming}")]
    ConcurrencyConflict {
        user: String,
        oid: String,
        current: String,
        incoming: String,
    },

    #[error("Domain model error: {0}")]
    DomainModel(String),

    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Aggregate misuse: {0}")]
    AggregateMisuse(String),

    #[error("Object '{0}' not found")]
    ObjectNotFound(String),

    #[error("Interaction refused: {0}")]
    Interaction(InteractionVeto),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl StoreError {
    /// Conflicts and refused interactions can be retried or reported to the end user.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::Interaction(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Mapping mistakes in the domain model, including misuse of aggregates.
    pub fn is_domain_model_error(&self) -> bool {
        matches!(
            self,
            StoreError::DomainModel(_) | StoreError::AggregateMisuse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let conflict = StoreError::ConcurrencyConflict {
            user: "alice".into(),
            oid: "Customer:1".into(),
            current: "5".into(),
            incoming: "4".into(),
        };
        assert!(conflict.is_recoverable());
        assert!(!conflict.is_fatal());

        assert!(StoreError::DomainModel("bad mapping".into()).is_fatal());
        assert!(StoreError::InternalConsistency("cursor".into()).is_fatal());
        assert!(StoreError::Interaction(InteractionVeto::Hidden("name".into())).is_recoverable());
        assert!(StoreError::AggregateMisuse("destroy".into()).is_domain_model_error());
        assert!(!StoreError::Storage("disk".into()).is_domain_model_error());
    }

    #[test]
    fn test_conflict_message_names_user_and_versions() {
        let conflict = StoreError::ConcurrencyConflict {
            user: "alice".into(),
            oid: "Customer:1".into(),
            current: "5".into(),
            incoming: "4".into(),
        };
        let message = conflict.to_string();
        assert!(message.contains("alice"));
        assert!(message.contains("Customer:1"));
        assert!(message.contains("current version 5"));
        assert!(message.contains("incoming version 4"));
    }
}
