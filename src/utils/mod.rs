pub mod file;
pub mod lock;
pub mod selection;
