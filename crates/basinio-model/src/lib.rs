//! Domain graph for basinio.
//!
//! A [`Project`] owns snapshots, properties, formations, reservoirs, the
//! geometry table, the stratigraphy table and the auxiliary record tables.
//! Each [`SnapShot`] owns its surfaces, its continuous volume, its
//! formation volumes and its trappers, and is the unit of retrieve and
//! release for the data units they hold.
//!
//! # Architecture
//!
//! - [`Project`] / [`SnapShot`] -- owners; back-references between nodes
//!   are index handles ([`basinio_types::FormationId`]) or names resolved
//!   through them
//! - [`Surface`] / [`Volume`] -- ordered `(Property, data unit)` lists
//! - [`GeometryTable`] -- structural deduplication of grid geometries
//! - [`records`] -- fixed-size auxiliary tables
//! - [`transform`] -- cell-centering, formation volume merge, baseline
//!   reference substitution
//!
//! # Design Rules
//!
//! 1. Adding the same snapshot, formation, reservoir, surface, trapper or
//!    property pair twice fails; properties and geometries deduplicate.
//! 2. Replacing or removing a data unit releases it first.
//! 3. The graph is not synchronized; one import or export pass at a time.

pub mod formation;
pub mod geometry_table;
pub mod project;
pub mod records;
pub mod snapshot;
pub mod stratigraphy;
pub mod surface;
pub mod transform;
pub mod trapper;
pub mod volume;

pub use formation::{Formation, FormationFlags, FormationMaps, PropertyMap, Reservoir, LITHO_MAP_NAMES};
pub use geometry_table::GeometryTable;
pub use project::{Project, ProjectInfo, ProjectParts};
pub use records::{EncodedTable, RecordTables};
pub use snapshot::SnapShot;
pub use stratigraphy::{StratigraphyEntry, StratigraphyTable};
pub use surface::{Surface, DEPTH_PROPERTY};
pub use transform::{
    cell_center_map, cell_center_surfaces, cell_center_volume, cell_center_volume_data,
    merge_formation_volumes, replace_existing_properties, CellFilter,
};
pub use trapper::{link_trappers, Trapper};
pub use volume::{PropertyVolume, Volume, VolumeRef};
