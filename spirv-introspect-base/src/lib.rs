//! Lowest level crate of `spirv-introspect`. Includes the relocatable byte arena that backs all
//! variable-length introspection data, and some basic memory helpers

pub mod memory;

mod based;
pub use based::BasedOffset;
pub use based::BasedSpan;

mod arena;
pub use arena::ByteArena;
pub use arena::FrozenByteArena;
