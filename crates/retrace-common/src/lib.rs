pub mod error;
pub mod execution;
pub mod trace;

pub use error::BackendError;
