pub mod contracts;
pub mod payments;
pub mod proposals;
