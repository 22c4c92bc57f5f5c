//! Filter module.
//!
//! Contains the functor adapters, the filter registry and built-in filter
//! implementations.

pub mod builtin;
pub mod functor;
pub mod registry;

pub use functor::{
    BinaryFunctor, BinaryFunctorFilter, BoundaryPolicy, Neighborhood, NeighborhoodFilter,
    NeighborhoodFunctor, UnaryFunctor, UnaryFunctorFilter,
};
pub use registry::{FilterFactory, FilterRegistry};
