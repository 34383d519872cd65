//! Domain core of the contract engine.
//!
//! Pure lifecycle, ledger, and signature rules plus the async seams
//! ([`store::ContractStore`], [`store::ProposalSource`],
//! [`provisioning::WorkspaceService`]) that the outer crates implement.

pub mod contract;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod proposal_intake;
pub mod provisioning;
pub mod roles;
pub mod signature;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
