//! Query composition and the query mini-language.
//!
//! - `composer` turns filter state into query strings and descriptors
//! - `expr` parses query strings back into terms for in-process evaluation

mod composer;
pub mod expr;

pub use composer::{EventRestriction, compose, compose_with, describe_top, structured_terms};
pub use expr::{QueryExpr, Term};
