//! Foundation types for basinio.
//!
//! Every other basinio crate depends on `basinio-types`. It carries the pure
//! value objects of the container format and the single error type that the
//! storage core surfaces to its callers.
//!
//! # Key Types
//!
//! - [`Geometry2D`] / [`Geometry3D`] -- regular grid descriptors (extents, spacing, k-range)
//! - [`Property`] -- immutable property descriptor, compared by name
//! - [`Layout`] -- element ordering of a float payload (IJ, IJK, KIJ)
//! - [`Compression`] -- on-disk payload encoding (none, gzip)
//! - [`BasinError`] -- the one error kind of the core

pub mod error;
pub mod geometry;
pub mod ids;
pub mod kinds;
pub mod property;

pub use error::{BasinError, BasinResult};
pub use geometry::{Geometry2D, Geometry3D};
pub use ids::{FormationId, GeometryId, ReservoirId};
pub use kinds::{
    Compression, Layout, ModellingMode, PropertyAttribute, PropertyType, SnapShotKind,
    SubsurfaceKind,
};
pub use property::Property;

/// Reserved "no data" value used when a grid does not specify its own.
pub const DEFAULT_UNDEFINED_VALUE: f32 = 99999.0;

/// Major version of the XML index format written by this library.
pub const XML_VERSION_MAJOR: u32 = 2;

/// Minor version of the XML index format written by this library.
pub const XML_VERSION_MINOR: u32 = 1;
