//! Strand: a small workflow engine over named tools and a shared state map.
//!
//! The library target only carries what the binary and the integration
//! tests share; the engine itself lives in the `strand-*` crates.

pub mod sample;
