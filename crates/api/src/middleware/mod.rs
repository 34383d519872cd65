//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the caller from a JWT Bearer token.
//! - [`rbac::RequirePaymentService`] -- Requires the `payment_service` role.

pub mod auth;
pub mod rbac;
