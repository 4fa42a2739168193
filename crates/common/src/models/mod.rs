//! Domain models shared across RefNet crates

mod identifier;
mod paper;
mod search;

pub use identifier::{PaperId, DOI_PREFIX, DOI_URL_PREFIX, NATIVE_URL_PREFIX};
pub use paper::{Paper, MAX_ABSTRACT_CHARS, MAX_TOPICS};
pub use search::{PageRequest, PaperPage, SearchQuery, SearchResults, SearchSort, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
