//! # RowanDB Configuration Module
//!
//! Centralizes every layout and sizing constant for the database. The file
//! format is defined entirely by the values in [`constants`]; interdependent
//! values are co-located and enforced through compile-time assertions so a
//! local edit cannot silently desynchronize the on-disk geometry.

pub mod constants;
pub use constants::*;
