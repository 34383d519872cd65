//! Role names carried in the `role` claim of an access token.

/// A marketplace user acting as client or freelancer on a contract.
pub const ROLE_USER: &str = "user";

/// The payment processor that reports confirmed phase payments.
pub const ROLE_PAYMENT_SERVICE: &str = "payment_service";
