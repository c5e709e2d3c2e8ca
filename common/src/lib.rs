//! RateMesh Common Types
//!
//! Shared types used across the RateMesh crates: currency codes, provider
//! identifiers, the clock abstraction and time constants.

pub mod currency;
pub mod identifiers;
pub mod error;
pub mod time;

pub use currency::*;
pub use identifiers::*;
pub use error::*;
pub use time::*;
