pub mod client;
pub mod error;

pub use client::{ComposeClient, PsEntry};
pub use error::ComposeError;
