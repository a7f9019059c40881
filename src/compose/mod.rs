pub mod discover;
pub mod parser;

pub use discover::{Discoverer, COMPOSE_FILENAMES, DEFAULT_DENYLIST};
pub use parser::parse_services;
