//! Lazy data units for basinio.
//!
//! A data unit is one property's float values over one map or volume. It is
//! created with a shared geometry and is either filled at once, marked
//! constant, or deferred to a blob range / dataset slab that is only read on
//! [`DataUnit::retrieve`]. Reference units point at bytes written by another
//! export and can never be retrieved.
//!
//! # Architecture
//!
//! - [`MapData`] -- 2D grid, row-major with I fastest
//! - [`VolumeData`] -- 3D grid in IJK and/or KIJ ordering
//! - [`DataUnit`] -- the scheduler-facing trait: raw requests, prefetched
//!   part delivery, retrieve and release
//! - [`DatasetSource`] -- pluggable reader for simulator dataset files
//! - [`interp`] -- point location and shape-function interpolation

pub mod dataset;
pub mod interp;
pub mod map;
pub mod unit;
pub mod volume;

pub use dataset::{DatasetFile, DatasetRef, DatasetSource, InMemoryDatasets};
pub use interp::{find_plane_location, PlaneLocation, VolumeLocation};
pub use map::MapData;
pub use unit::{Backing, DataUnit, RawPart, RawRequest, RawSource, Residency, UnitKind};
pub use volume::{ijk_to_kij, kij_to_ijk, VolumeData};
