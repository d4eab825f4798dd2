//! Shared types of the Tessera synchronization core: content identifiers,
//! peer classification and sync results.

pub mod content;
pub mod hash;
pub mod peer;
pub mod sync;
