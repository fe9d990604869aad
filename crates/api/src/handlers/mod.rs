pub mod stream;
pub mod tasks;
