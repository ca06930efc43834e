pub mod categorize;
pub mod download;
pub mod organize;
pub mod source;
