pub mod identity;
pub mod memory;
pub mod repository;
pub mod unit_of_work;

pub use identity::IdentityService;
pub use memory::MemoryStore;
pub use repository::{RowLock, StoreTransaction, TransactionalStore};
pub use unit_of_work::{Transaction, TxScope};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A concurrent claim won the row, or the row lock could not be taken in time.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The store failed; the transaction has been rolled back.
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
