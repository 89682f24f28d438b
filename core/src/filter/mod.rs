//! Filter state and the free-text query language's tokenizer.

mod state;
pub mod tokenizer;
mod url;

pub use state::{FilterState, StructuredFilters};
pub use tokenizer::{Fragment, fragment, parse_fragment, tokenize};
pub use url::UrlState;
