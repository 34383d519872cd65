use crate::types::DbId;

/// Domain error taxonomy shared by every layer of the engine.
///
/// Messages carry the contract id and the violated precondition so the API
/// layer can surface them verbatim.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Malformed or missing required input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation is not legal in the contract's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Upstream data (e.g. a proposal) is internally inconsistent.
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// A collaborator (workspace service, proposal service) failed or timed out.
    #[error("Dependency failure: {0}")]
    Dependency(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The authenticated party is not entitled to act on this contract.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
