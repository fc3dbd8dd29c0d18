//! Request middleware.

pub mod boundary;

pub use boundary::{boundary, BoundaryState};
