//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool`, or `&mut PgConnection` when they must run inside a
//! caller-owned transaction.

pub mod contract_event_repo;
pub mod contract_repo;
pub mod phase_repo;

pub use contract_event_repo::ContractEventRepo;
pub use contract_repo::ContractRepo;
pub use phase_repo::PhaseRepo;
