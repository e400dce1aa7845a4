pub mod app;
pub mod config;
pub mod context;
pub mod lookup;
pub mod stack;
pub mod template;

pub use app::App;
pub use config::InfraConfig;
pub use context::{BranchContext, Composition, InvocationContext};
pub use lookup::{LookupKey, LookupStore, MemoryLookupStore};
pub use template::Template;
