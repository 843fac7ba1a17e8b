//! sprig-backlog - the sprint document store
//!
//! All parsing of semi-structured text lives here: the sprint document
//! grammar (`parser`) and fenced code extraction (`extract`). Other crates
//! consume the typed results and never pattern-match raw markdown.

pub mod extract;
pub mod parser;
mod queue;
mod store;

pub use extract::{FencedBlock, PathSource};
pub use parser::{parse_document, TITLE_PREFIX};
pub use store::BacklogStore;
