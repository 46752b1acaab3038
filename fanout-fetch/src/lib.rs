//! Page acquisition and intro-text extraction.
//!
//! - [`extract`]: pull the first N paragraphs out of an HTML document
//! - [`fetcher`]: one network round trip per URL, blocking or awaitable,
//!   followed by extraction
//!
//! Nothing is cached; every call hits the network.

pub mod extract;
pub mod fetcher;

pub use fetcher::{FetchError, FetchSettings, Fetcher};
