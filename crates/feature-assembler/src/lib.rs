pub mod archive;
pub mod assembly;
pub mod config;
pub mod driver;
pub mod elements;
pub mod error;
pub mod planner;
pub mod platform;
pub mod properties;
pub mod rootfiles;
pub mod script;
pub mod shape;
pub mod tree;
pub mod workspace;

pub use error::{Error, Result};
