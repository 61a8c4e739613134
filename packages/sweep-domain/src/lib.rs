pub mod compiler;
pub mod estimate;
pub mod geo;
pub mod plan;
pub mod terms;

mod error;

pub use error::{Error, Result};

use std::collections::HashMap;

/// Opaque identifier of a place category, e.g. `cafe`.
pub type CategoryTerm = String;

/// Per-city category density scores in `[0, 1]`.
pub type PopularityModel = HashMap<CategoryTerm, f32>;
