//! Test collaborators for stevedore launch workers.

pub mod fixtures;
pub mod fs;
pub mod mock;

pub use fixtures::*;
pub use fs::*;
pub use mock::*;
