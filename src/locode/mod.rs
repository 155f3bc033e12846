//! UN/LOCODE record handling.
//!
//! - **`parser`**: splits one code-list line into a [`RawRecord`]
//! - **`normalize`**: turns a [`RawRecord`] into a geocoded [`NormalizedRecord`]

pub mod normalize;
pub mod parser;

pub use normalize::{FunctionFlags, NormalizedRecord, normalize, normalize_with_coordinate_check};
pub use parser::{DecodeError, RawRecord};
