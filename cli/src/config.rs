pub(crate) mod build;
pub(crate) mod file;
pub(crate) use build::*;
pub(crate) use file::*;
