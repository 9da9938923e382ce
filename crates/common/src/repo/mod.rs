// Repository identity: validated names and declarations.

pub mod name;

pub use name::{RepoName, RepoNameError};
