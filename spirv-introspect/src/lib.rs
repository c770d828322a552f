//! Reflection of compiled SPIR-V shaders: the resources, push constants, specialization constants
//! and interface variables an entry point declares, merged across the stages of a pipeline into
//! the layout the pipeline needs.

pub use error::*;
pub use types::*;

pub use cache::*;
pub use introspector::*;
pub use pipeline::*;
pub use stage::*;

pub mod decoder;

mod cache;
mod error;
mod introspector;
mod pipeline;
mod stage;
mod types;

#[cfg(test)]
mod test_fixtures;
