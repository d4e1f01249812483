//! Command implementations.
//!
//! Each command returns data; rendering lives in [`crate::output`].

mod batch;
mod lookup;

pub use batch::{batch, collect_codes, parse_code_list};
pub use lookup::lookup;
