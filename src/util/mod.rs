//! Shared utilities

pub mod bitvec;
pub mod hash;

pub use bitvec::BitVec;
pub use hash::{mix64, murmur_hash2_64};
