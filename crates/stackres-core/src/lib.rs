pub mod config;
pub mod dependency;
pub mod error;
pub mod event;
pub mod identity;
pub mod io;
pub mod lifecycle;
pub mod paths;
pub mod query;
pub mod registry;
pub mod resource;
pub mod signal;
pub mod stack;
pub mod template;
pub mod types;

pub use error::{Result, StackError};
