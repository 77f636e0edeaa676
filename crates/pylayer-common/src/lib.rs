//! Engine-facing value types shared by the pylayer data source.
//!
//! This crate models the slice of a vector rendering engine that a data
//! source adapter sees: shapes and their geometry, the layer definition, the
//! layer's metadata table, and the `VectorSource` seam through which the
//! engine drives a source.

pub mod error;
pub mod geometry;
pub mod layer;
pub mod metadata;
pub mod source;
