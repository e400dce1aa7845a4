pub mod branch;
pub mod names;
pub mod shared;

pub use branch::BranchStack;
pub use names::BranchNames;
pub use shared::{SharedRefs, SharedStack};
