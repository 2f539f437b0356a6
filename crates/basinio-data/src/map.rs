use std::sync::Arc;

use basinio_store::BlobDescriptor;
use basinio_types::{
    BasinError, BasinResult, FormationId, Geometry2D, Layout, ReservoirId, DEFAULT_UNDEFINED_VALUE,
};

use crate::dataset::DatasetRef;
use crate::interp::{find_plane_location, quad_shape, PlaneLocation, QUAD_CORNERS};
use crate::unit::{
    filled, owned_copy, scan_min_max, Backing, DataUnit, DecodedPart, RawPart, RawRequest,
    Residency, UnitCore, UnitKind,
};

#[derive(Debug)]
enum MapValues {
    Empty,
    /// Uniform map; `expanded` is an on-demand explicit buffer for row and
    /// column access.
    Constant { value: f32, expanded: Option<Vec<f32>> },
    Buffer(Vec<f32>),
}

/// A 2D float grid over one [`Geometry2D`], row-major with I fastest.
///
/// The unit is lazily backed: it may hold a resident buffer, a constant, or
/// only a deferred blob/dataset reference until [`DataUnit::retrieve`] is
/// called.
#[derive(Debug)]
pub struct MapData {
    geometry: Arc<Geometry2D>,
    undefined: f32,
    values: MapValues,
    core: UnitCore,
    stats: Option<(f32, f32)>,
    stats_hint: Option<(f32, f32)>,
    formation: Option<FormationId>,
    reservoir: Option<ReservoirId>,
}

impl MapData {
    /// An empty, unbacked map.
    pub fn new(geometry: Arc<Geometry2D>) -> Self {
        Self {
            geometry,
            undefined: DEFAULT_UNDEFINED_VALUE,
            values: MapValues::Empty,
            core: UnitCore::native(),
            stats: None,
            stats_hint: None,
            formation: None,
            reservoir: None,
        }
    }

    /// A resident map holding a copy of `values`.
    pub fn from_values(geometry: Arc<Geometry2D>, values: &[f32]) -> BasinResult<Self> {
        let mut map = Self::new(geometry);
        map.set_data_ij(values)?;
        Ok(map)
    }

    /// A map that is uniformly `value`.
    pub fn constant(geometry: Arc<Geometry2D>, value: f32) -> Self {
        let mut map = Self::new(geometry);
        map.set_constant_value(value);
        map
    }

    /// A map deferred to one blob range.
    pub fn from_blob(geometry: Arc<Geometry2D>, descriptor: BlobDescriptor) -> Self {
        let mut map = Self::new(geometry);
        map.core.backing = Backing::Blob(vec![descriptor]);
        map
    }

    /// A map deferred to one dataset.
    pub fn from_dataset(geometry: Arc<Geometry2D>, dataset: DatasetRef) -> Self {
        let mut map = Self::new(geometry);
        map.core.backing = Backing::Datasets(vec![dataset]);
        map
    }

    /// A reference unit pointing at bytes written by another export.
    pub fn reference(geometry: Arc<Geometry2D>, descriptor: BlobDescriptor) -> Self {
        Self {
            core: UnitCore::reference(vec![descriptor]),
            ..Self::new(geometry)
        }
    }

    pub fn with_undefined_value(mut self, undefined: f32) -> Self {
        self.undefined = undefined;
        self
    }

    pub fn geometry(&self) -> &Arc<Geometry2D> {
        &self.geometry
    }

    pub fn undefined_value(&self) -> f32 {
        self.undefined
    }

    pub fn formation(&self) -> Option<FormationId> {
        self.formation
    }

    pub fn set_formation(&mut self, formation: Option<FormationId>) {
        self.formation = formation;
    }

    pub fn reservoir(&self) -> Option<ReservoirId> {
        self.reservoir
    }

    pub fn set_reservoir(&mut self, reservoir: Option<ReservoirId>) {
        self.reservoir = reservoir;
    }

    /// Number of raw reads consumed so far.
    pub fn loads(&self) -> usize {
        self.core.loads()
    }

    /// Blob ranges backing this map, if any.
    pub fn blob_descriptors(&self) -> &[BlobDescriptor] {
        match &self.core.backing {
            Backing::Blob(d) => d,
            _ => &[],
        }
    }

    /// Defer this map to a blob range.
    pub fn set_blob_source(&mut self, descriptor: BlobDescriptor) -> BasinResult<()> {
        self.core.set_backing(Backing::Blob(vec![descriptor]))
    }

    /// Defer this map to a dataset.
    pub fn set_dataset_source(&mut self, dataset: DatasetRef) -> BasinResult<()> {
        self.core.set_backing(Backing::Datasets(vec![dataset]))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.values, MapValues::Constant { .. })
    }

    pub fn constant_value(&self) -> Option<f32> {
        match self.values {
            MapValues::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Mark the map uniformly `value`; no buffer is allocated.
    pub fn set_constant_value(&mut self, value: f32) {
        self.values = MapValues::Constant {
            value,
            expanded: None,
        };
        self.stats = Some((value, value));
        self.core.state = Residency::Resident;
    }

    /// Copy `data` (row-major, I fastest) into a fresh owned buffer.
    pub fn set_data_ij(&mut self, data: &[f32]) -> BasinResult<()> {
        let size = self.geometry.size();
        if data.len() != size {
            return Err(BasinError::InvalidArgument(format!(
                "map data holds {} values, geometry needs {size}",
                data.len()
            )));
        }
        self.install(owned_copy(data)?);
        Ok(())
    }

    /// Fill a fresh owned buffer with `value`.
    pub fn set_uniform_data(&mut self, value: f32) -> BasinResult<()> {
        self.install(filled(self.geometry.size(), value)?);
        Ok(())
    }

    fn install(&mut self, buffer: Vec<f32>) {
        self.values = MapValues::Buffer(buffer);
        self.stats = None;
        self.core.state = Residency::Resident;
    }

    /// The resident buffer, if one is loaded.
    pub fn buffer(&self) -> Option<&[f32]> {
        match &self.values {
            MapValues::Buffer(b) => Some(b),
            _ => None,
        }
    }

    fn not_retrieved(accessor: &'static str) -> BasinError {
        BasinError::NotRetrieved {
            accessor,
            unit: "map",
        }
    }

    fn explicit(&mut self, accessor: &'static str) -> BasinResult<&[f32]> {
        let size = self.geometry.size();
        match &mut self.values {
            MapValues::Buffer(b) => Ok(b),
            MapValues::Constant { value, expanded } => {
                if expanded.is_none() {
                    *expanded = Some(filled(size, *value)?);
                }
                Ok(expanded.as_deref().unwrap_or_default())
            }
            MapValues::Empty => Err(Self::not_retrieved(accessor)),
        }
    }

    /// Value at node `(i, j)`. Panics when out of bounds.
    pub fn value(&self, i: usize, j: usize) -> BasinResult<f32> {
        assert!(
            i < self.geometry.num_i() && j < self.geometry.num_j(),
            "map index ({i}, {j}) outside {}x{}",
            self.geometry.num_i(),
            self.geometry.num_j()
        );
        match &self.values {
            MapValues::Buffer(b) => Ok(b[self.geometry.index_ij(i, j)]),
            MapValues::Constant { value, .. } => Ok(*value),
            MapValues::Empty => Err(Self::not_retrieved("value")),
        }
    }

    pub fn is_undefined(&self, i: usize, j: usize) -> BasinResult<bool> {
        Ok(self.value(i, j)? == self.undefined)
    }

    /// All values, row-major.
    pub fn surface_values(&mut self) -> BasinResult<&[f32]> {
        self.explicit("surface_values")
    }

    /// Values of row `j` (all I at fixed J).
    pub fn row_values(&mut self, j: usize) -> BasinResult<&[f32]> {
        assert!(j < self.geometry.num_j(), "row {j} outside {} rows", self.geometry.num_j());
        let num_i = self.geometry.num_i();
        let all = self.explicit("row_values")?;
        Ok(&all[j * num_i..(j + 1) * num_i])
    }

    /// Values of column `i` (all J at fixed I).
    pub fn column_values(&mut self, i: usize) -> BasinResult<Vec<f32>> {
        assert!(i < self.geometry.num_i(), "column {i} outside {} columns", self.geometry.num_i());
        let num_i = self.geometry.num_i();
        let all = self.explicit("column_values")?;
        Ok(all.iter().skip(i).step_by(num_i).copied().collect())
    }

    /// Cached min/max, computing them on first access.
    ///
    /// The scan rewrites NaN to the undefined value and collapses a uniform
    /// buffer into a constant.
    pub fn min_max(&mut self) -> BasinResult<(f32, f32)> {
        if let (Some(stats), Residency::Resident) = (self.stats, self.core.state) {
            return Ok(stats);
        }
        let (min, max, collapse) = match &mut self.values {
            MapValues::Constant { value, .. } => (*value, *value, None),
            MapValues::Buffer(b) => {
                let (min, max, uniform) = scan_min_max(b, self.undefined);
                (min, max, (uniform && !b.is_empty()).then(|| b[0]))
            }
            MapValues::Empty => return Err(Self::not_retrieved("min_max")),
        };
        if let Some(value) = collapse {
            self.set_constant_value(value);
        }
        self.stats = Some((min, max));
        Ok((min, max))
    }

    pub fn min_value(&mut self) -> BasinResult<f32> {
        self.min_max().map(|(min, _)| min)
    }

    pub fn max_value(&mut self) -> BasinResult<f32> {
        self.min_max().map(|(_, max)| max)
    }

    /// Statistics recorded in the index at import time, available before
    /// retrieval.
    pub fn stats_hint(&self) -> Option<(f32, f32)> {
        self.stats.or(self.stats_hint)
    }

    pub fn set_stats_hint(&mut self, min: f32, max: f32) {
        self.stats_hint = Some((min, max));
    }

    /// Locate physical `(x, y)` on this map's grid.
    pub fn find_plane_location(&self, x: f64, y: f64) -> Option<PlaneLocation> {
        find_plane_location(&self.geometry, x, y)
    }

    /// Bilinear interpolation inside the cell at `location`.
    ///
    /// Returns the undefined value when a local coordinate or any of the
    /// four corner samples is undefined.
    pub fn interpolate(&self, location: &PlaneLocation) -> BasinResult<f32> {
        let undefined = f64::from(self.undefined);
        if location.xi == undefined || location.eta == undefined {
            return Ok(self.undefined);
        }
        let mut result = 0.0;
        for (di, dj, ci, cj) in QUAD_CORNERS {
            let v = self.value(location.i + di, location.j + dj)?;
            if v == self.undefined {
                return Ok(self.undefined);
            }
            result += quad_shape(ci, cj, location.xi, location.eta) * f64::from(v);
        }
        Ok(result as f32)
    }
}

impl DataUnit for MapData {
    fn label(&self) -> &'static str {
        "map"
    }

    fn residency(&self) -> Residency {
        self.core.state
    }

    fn kind(&self) -> UnitKind {
        self.core.kind
    }

    fn raw_requests(&self) -> Vec<RawRequest> {
        self.core.requests(Layout::IJ)
    }

    fn accept_raw(&mut self, part: usize, raw: RawPart) -> BasinResult<bool> {
        self.core.accept(part, raw, Layout::IJ)
    }

    fn retrieve(&mut self) -> BasinResult<()> {
        if self.core.kind == UnitKind::Reference {
            return Err(BasinError::InvalidArgument("cannot retrieve a reference map".into()));
        }
        if self.core.state == Residency::Resident {
            return Ok(());
        }
        let size = self.geometry.size();
        let parts = self.core.take_decoded(Layout::IJ, size, size, "map")?;
        let values = match parts.into_iter().next() {
            Some(DecodedPart::Blob { values, .. }) | Some(DecodedPart::Slab { values, .. }) => values,
            None => return Err(BasinError::Format("map retrieved no data".into())),
        };
        self.install(values);
        Ok(())
    }

    fn release(&mut self) {
        if let MapValues::Constant { expanded, .. } = &mut self.values {
            *expanded = None;
            return;
        }
        self.values = MapValues::Empty;
        self.core.mark_released();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basinio_store::BlobWriter;

    use crate::dataset::InMemoryDatasets;

    fn geometry() -> Arc<Geometry2D> {
        Arc::new(Geometry2D::new(3, 2, 10.0, 10.0, 0.0, 0.0))
    }

    #[test]
    fn unretrieved_access_fails() {
        let map = MapData::new(geometry());
        assert!(matches!(map.value(0, 0), Err(BasinError::NotRetrieved { accessor: "value", .. })));
        assert!(!map.is_retrieved());
    }

    #[test]
    fn row_and_column_access() {
        let mut map = MapData::from_values(geometry(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]).unwrap();
        assert_eq!(map.value(2, 1).unwrap(), 12.0);
        assert_eq!(map.row_values(1).unwrap(), &[10.0, 11.0, 12.0]);
        assert_eq!(map.column_values(1).unwrap(), vec![1.0, 11.0]);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_asserts() {
        let map = MapData::constant(geometry(), 1.0);
        let _ = map.value(3, 0);
    }

    #[test]
    fn wrong_length_rejected() {
        let mut map = MapData::new(geometry());
        assert!(map.set_data_ij(&[1.0; 5]).is_err());
    }

    #[test]
    fn uniform_buffer_collapses() {
        let mut map = MapData::from_values(geometry(), &[7.0; 6]).unwrap();
        assert!(!map.is_constant());
        assert_eq!(map.min_max().unwrap(), (7.0, 7.0));
        assert!(map.is_constant());
        assert_eq!(map.value(1, 1).unwrap(), 7.0);
        assert_eq!(map.row_values(0).unwrap(), &[7.0, 7.0, 7.0]);
    }

    #[test]
    fn nan_becomes_undefined() {
        let mut map = MapData::from_values(geometry(), &[1.0, f32::NAN, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(map.min_max().unwrap(), (1.0, 6.0));
        assert!(map.is_undefined(1, 0).unwrap());
    }

    #[test]
    fn blob_backed_retrieve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.bin");
        let mut writer = BlobWriter::open(&path, false).unwrap();
        let d = writer
            .add_data(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Some(Layout::IJ), true)
            .unwrap();
        writer.close().unwrap();

        let mut map = MapData::from_blob(geometry(), d);
        assert_eq!(map.residency(), Residency::Unretrieved);
        map.retrieve().unwrap();
        map.retrieve().unwrap();
        assert_eq!(map.loads(), 1);
        assert_eq!(map.value(1, 1).unwrap(), 5.0);

        map.release();
        assert_eq!(map.residency(), Residency::Released);
        assert!(map.value(0, 0).is_err());
        map.retrieve().unwrap();
        assert_eq!(map.value(0, 0).unwrap(), 1.0);
        assert_eq!(map.loads(), 2);
    }

    #[test]
    fn prefetched_part_is_used() {
        let source = Arc::new(InMemoryDatasets::new());
        source.insert("f.h5", "/Depth", vec![1.0; 6]);
        let mut map = MapData::from_dataset(geometry(), DatasetRef::map(source.clone(), "f.h5", "/Depth"));
        let requests = map.raw_requests();
        assert_eq!(requests.len(), 1);
        let raw = requests[0].source.fetch().unwrap();
        assert!(map.accept_raw(0, raw).unwrap());
        assert_eq!(map.residency(), Residency::Retrieving);
        map.retrieve().unwrap();
        assert_eq!(source.opens(), 1);
        assert!(map.raw_requests().is_empty());
    }

    #[test]
    fn reference_cannot_retrieve() {
        let d = BlobDescriptor::new("/elsewhere/s.bin", 0, 24, basinio_types::Compression::None);
        let mut map = MapData::reference(geometry(), d);
        assert!(map.is_reference());
        assert!(map.retrieve().is_err());
        assert!(map.raw_requests().is_empty());
        assert_eq!(map.blob_descriptors().len(), 1);
    }

    #[test]
    fn release_keeps_constant() {
        let mut map = MapData::constant(geometry(), 3.0);
        map.surface_values().unwrap();
        map.release();
        assert!(map.is_retrieved());
        assert_eq!(map.constant_value(), Some(3.0));
    }

    #[test]
    fn bilinear_interpolation() {
        let map = MapData::from_values(geometry(), &[0.0, 10.0, 20.0, 0.0, 10.0, 20.0]).unwrap();
        let loc = map.find_plane_location(15.0, 5.0).unwrap();
        assert!((map.interpolate(&loc).unwrap() - 15.0).abs() < 1e-5);
    }

    #[test]
    fn interpolation_with_undefined_corner() {
        let u = DEFAULT_UNDEFINED_VALUE;
        let map = MapData::from_values(geometry(), &[0.0, u, 20.0, 0.0, 10.0, 20.0]).unwrap();
        let loc = map.find_plane_location(5.0, 5.0).unwrap();
        assert_eq!(map.interpolate(&loc).unwrap(), u);
    }
}
