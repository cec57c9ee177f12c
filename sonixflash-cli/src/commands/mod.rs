//! Command implementations.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod list;
