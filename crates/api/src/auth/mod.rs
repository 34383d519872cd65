//! Access-token handling. Tokens are issued by the marketplace's identity
//! service; this server only validates them.

pub mod jwt;
