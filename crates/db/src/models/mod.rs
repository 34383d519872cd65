//! Row structs for the contract tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! the conversion into the domain aggregate.

pub mod contract;
pub mod event;
pub mod phase;
