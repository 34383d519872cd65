//! HTTP clients for the external collaborators of the contract engine.
//!
//! - [`HttpProposalSource`]: reads proposals from the proposal service and
//!   marks them accepted.
//! - [`HttpWorkspaceService`]: creates collaboration workspaces.
//!
//! Both wrap a shared [`reqwest::Client`]; timeouts are configured on the
//! client by the caller.

pub mod http;
pub mod proposal;
pub mod workspace;

pub use http::ServiceApiError;
pub use proposal::HttpProposalSource;
pub use workspace::HttpWorkspaceService;

#[cfg(test)]
pub(crate) mod test_support;
