// glacier-common: shared types for the git-glacier workspace

pub mod repo;
pub mod types;
