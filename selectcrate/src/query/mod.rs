//! # Request Parsing
//!
//! Turns untrusted query-string parameters into a [`QueryRequest`]. Nothing in
//! here fails: bad numbers are normalized and bad filter specs are remembered
//! as [`DependentFilter::Malformed`] so the pipeline can return an empty page.
//!
//! | key         | meaning                                   | default |
//! |-------------|-------------------------------------------|---------|
//! | `q`         | search term                               | `""`    |
//! | `p`         | page number                               | `1`     |
//! | `page_size` | page size                                 | 20      |
//! | `f`         | filter `dependentField__lookupPath=value` | none    |
//! | `e`         | exclude, same shape                       | none    |
//! | `ordering`  | comma-separated ordering override         | none    |

pub mod ordering;
pub mod request;

pub use ordering::{OrderField, parse_ordering, parse_ordering_param, with_tiebreaker};
pub use request::{AutocompleteParams, DependentFilter, FilterSpec, QueryRequest};
