use std::sync::Arc;

use basinio_store::BlobDescriptor;
use basinio_types::{BasinError, BasinResult, Geometry3D, Layout, DEFAULT_UNDEFINED_VALUE};
use tracing::debug;

use crate::dataset::DatasetRef;
use crate::interp::{hex_shape, VolumeLocation, QUAD_CORNERS};
use crate::unit::{
    filled, owned_copy, scan_min_max, Backing, DataUnit, DecodedPart, RawPart, RawRequest,
    Residency, UnitCore, UnitKind,
};

#[derive(Debug)]
enum VolumeValues {
    Empty,
    /// Uniform volume; the explicit buffer is valid in either ordering.
    Constant { value: f32, expanded: Option<Vec<f32>> },
    /// At least one ordering is present.
    Buffers { ijk: Option<Vec<f32>>, kij: Option<Vec<f32>> },
}

/// A 3D float grid over one [`Geometry3D`].
///
/// Two linearizations are supported: IJK (I fastest, then J, then K) and
/// KIJ (K fastest, then I, then J). Either may be resident; asking for the
/// other converts on demand.
#[derive(Debug)]
pub struct VolumeData {
    geometry: Arc<Geometry3D>,
    undefined: f32,
    values: VolumeValues,
    core: UnitCore,
    stats: Option<(f32, f32)>,
    stats_hint: Option<(f32, f32)>,
}

/// Convert IJK-ordered values to KIJ.
pub fn ijk_to_kij(geometry: &Geometry3D, ijk: &[f32]) -> BasinResult<Vec<f32>> {
    let mut kij = filled(geometry.size(), 0.0)?;
    for k in geometry.first_k()..=geometry.last_k() {
        for j in 0..geometry.num_j() {
            for i in 0..geometry.num_i() {
                kij[geometry.index_kij(i, j, k)] = ijk[geometry.index_ijk(i, j, k)];
            }
        }
    }
    Ok(kij)
}

/// Convert KIJ-ordered values to IJK.
pub fn kij_to_ijk(geometry: &Geometry3D, kij: &[f32]) -> BasinResult<Vec<f32>> {
    let mut ijk = filled(geometry.size(), 0.0)?;
    for k in geometry.first_k()..=geometry.last_k() {
        for j in 0..geometry.num_j() {
            for i in 0..geometry.num_i() {
                ijk[geometry.index_ijk(i, j, k)] = kij[geometry.index_kij(i, j, k)];
            }
        }
    }
    Ok(ijk)
}

impl VolumeData {
    /// An empty, unbacked volume.
    pub fn new(geometry: Arc<Geometry3D>) -> Self {
        Self {
            geometry,
            undefined: DEFAULT_UNDEFINED_VALUE,
            values: VolumeValues::Empty,
            core: UnitCore::native(),
            stats: None,
            stats_hint: None,
        }
    }

    /// A resident volume holding a copy of IJK-ordered `values`.
    pub fn from_ijk(geometry: Arc<Geometry3D>, values: &[f32]) -> BasinResult<Self> {
        let mut volume = Self::new(geometry);
        volume.set_data_ijk(values)?;
        Ok(volume)
    }

    /// A resident volume holding a copy of KIJ-ordered `values`.
    pub fn from_kij(geometry: Arc<Geometry3D>, values: &[f32]) -> BasinResult<Self> {
        let mut volume = Self::new(geometry);
        volume.set_data_kij(values)?;
        Ok(volume)
    }

    pub fn constant(geometry: Arc<Geometry3D>, value: f32) -> Self {
        let mut volume = Self::new(geometry);
        volume.set_constant_value(value);
        volume
    }

    /// A volume deferred to blob ranges, one per stored ordering.
    pub fn from_blobs(geometry: Arc<Geometry3D>, descriptors: Vec<BlobDescriptor>) -> Self {
        let mut volume = Self::new(geometry);
        volume.core.backing = Backing::Blob(descriptors);
        volume
    }

    /// A volume deferred to dataset slabs, typically one per formation.
    pub fn from_datasets(geometry: Arc<Geometry3D>, slabs: Vec<DatasetRef>) -> Self {
        let mut volume = Self::new(geometry);
        volume.core.backing = Backing::Datasets(slabs);
        volume
    }

    /// A reference unit pointing at bytes written by another export.
    pub fn reference(geometry: Arc<Geometry3D>, descriptors: Vec<BlobDescriptor>) -> Self {
        Self {
            core: UnitCore::reference(descriptors),
            ..Self::new(geometry)
        }
    }

    pub fn with_undefined_value(mut self, undefined: f32) -> Self {
        self.undefined = undefined;
        self
    }

    pub fn geometry(&self) -> &Arc<Geometry3D> {
        &self.geometry
    }

    pub fn undefined_value(&self) -> f32 {
        self.undefined
    }

    pub fn loads(&self) -> usize {
        self.core.loads()
    }

    pub fn blob_descriptors(&self) -> &[BlobDescriptor] {
        match &self.core.backing {
            Backing::Blob(d) => d,
            _ => &[],
        }
    }

    pub fn set_blob_sources(&mut self, descriptors: Vec<BlobDescriptor>) -> BasinResult<()> {
        self.core.set_backing(Backing::Blob(descriptors))
    }

    pub fn set_dataset_sources(&mut self, slabs: Vec<DatasetRef>) -> BasinResult<()> {
        self.core.set_backing(Backing::Datasets(slabs))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.values, VolumeValues::Constant { .. })
    }

    pub fn constant_value(&self) -> Option<f32> {
        match self.values {
            VolumeValues::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn set_constant_value(&mut self, value: f32) {
        self.values = VolumeValues::Constant {
            value,
            expanded: None,
        };
        self.stats = Some((value, value));
        self.core.state = Residency::Resident;
    }

    pub fn has_data_ijk(&self) -> bool {
        matches!(self.values, VolumeValues::Buffers { ijk: Some(_), .. })
    }

    pub fn has_data_kij(&self) -> bool {
        matches!(self.values, VolumeValues::Buffers { kij: Some(_), .. })
    }

    fn check_len(&self, len: usize) -> BasinResult<()> {
        let size = self.geometry.size();
        if len != size {
            return Err(BasinError::InvalidArgument(format!(
                "volume data holds {len} values, geometry needs {size}"
            )));
        }
        Ok(())
    }

    /// Copy IJK-ordered `data` into a fresh buffer, dropping any KIJ copy.
    pub fn set_data_ijk(&mut self, data: &[f32]) -> BasinResult<()> {
        self.check_len(data.len())?;
        self.install(Layout::IJK, owned_copy(data)?);
        Ok(())
    }

    /// Copy KIJ-ordered `data` into a fresh buffer, dropping any IJK copy.
    pub fn set_data_kij(&mut self, data: &[f32]) -> BasinResult<()> {
        self.check_len(data.len())?;
        self.install(Layout::KIJ, owned_copy(data)?);
        Ok(())
    }

    /// Fill a fresh buffer in `layout` with `value`.
    pub fn set_uniform_data(&mut self, layout: Layout, value: f32) -> BasinResult<()> {
        self.install(layout, filled(self.geometry.size(), value)?);
        Ok(())
    }

    fn install(&mut self, layout: Layout, buffer: Vec<f32>) {
        self.values = match layout {
            Layout::KIJ => VolumeValues::Buffers {
                ijk: None,
                kij: Some(buffer),
            },
            _ => VolumeValues::Buffers {
                ijk: Some(buffer),
                kij: None,
            },
        };
        self.stats = None;
        self.core.state = Residency::Resident;
    }

    /// Resident buffer in the given ordering, without conversion.
    pub fn buffer(&self, layout: Layout) -> Option<&[f32]> {
        match (&self.values, layout) {
            (VolumeValues::Buffers { ijk: Some(b), .. }, Layout::IJK) => Some(b),
            (VolumeValues::Buffers { kij: Some(b), .. }, Layout::KIJ) => Some(b),
            _ => None,
        }
    }

    fn not_retrieved(accessor: &'static str) -> BasinError {
        BasinError::NotRetrieved {
            accessor,
            unit: "volume",
        }
    }

    fn explicit(&mut self, layout: Layout, accessor: &'static str) -> BasinResult<&[f32]> {
        let geometry = Arc::clone(&self.geometry);
        match &mut self.values {
            VolumeValues::Empty => Err(Self::not_retrieved(accessor)),
            VolumeValues::Constant { value, expanded } => {
                if expanded.is_none() {
                    *expanded = Some(filled(geometry.size(), *value)?);
                }
                Ok(expanded.as_deref().unwrap_or_default())
            }
            VolumeValues::Buffers { ijk, kij } => {
                let (wanted, other) = match layout {
                    Layout::KIJ => (kij, ijk.as_deref()),
                    _ => (ijk, kij.as_deref()),
                };
                if wanted.is_none() {
                    let source = other.ok_or_else(|| Self::not_retrieved(accessor))?;
                    *wanted = Some(match layout {
                        Layout::KIJ => ijk_to_kij(&geometry, source)?,
                        _ => kij_to_ijk(&geometry, source)?,
                    });
                }
                Ok(wanted.as_deref().unwrap_or_default())
            }
        }
    }

    /// All values with I fastest, converting from KIJ if needed.
    pub fn values_ijk(&mut self) -> BasinResult<&[f32]> {
        self.explicit(Layout::IJK, "values_ijk")
    }

    /// All values with K fastest, converting from IJK if needed.
    pub fn values_kij(&mut self) -> BasinResult<&[f32]> {
        self.explicit(Layout::KIJ, "values_kij")
    }

    fn assert_bounds(&self, i: usize, j: usize, k: usize) {
        let g = &self.geometry;
        assert!(
            i < g.num_i() && j < g.num_j() && g.contains_k(k),
            "volume index ({i}, {j}, {k}) outside {}x{}x[{}..={}]",
            g.num_i(),
            g.num_j(),
            g.first_k(),
            g.last_k()
        );
    }

    /// Value at node `(i, j, k)`; `k` is absolute. Panics when out of bounds.
    pub fn value(&self, i: usize, j: usize, k: usize) -> BasinResult<f32> {
        self.assert_bounds(i, j, k);
        match &self.values {
            VolumeValues::Constant { value, .. } => Ok(*value),
            VolumeValues::Buffers { ijk: Some(b), .. } => Ok(b[self.geometry.index_ijk(i, j, k)]),
            VolumeValues::Buffers { kij: Some(b), .. } => Ok(b[self.geometry.index_kij(i, j, k)]),
            _ => Err(Self::not_retrieved("value")),
        }
    }

    pub fn is_undefined(&self, i: usize, j: usize, k: usize) -> BasinResult<bool> {
        Ok(self.value(i, j, k)? == self.undefined)
    }

    /// One IJ layer at absolute index `k`.
    pub fn surface_ij(&mut self, k: usize) -> BasinResult<&[f32]> {
        self.assert_bounds(0, 0, k);
        let plane = self.geometry.plane().size();
        let start = (k - self.geometry.first_k()) * plane;
        let all = self.values_ijk()?;
        Ok(&all[start..start + plane])
    }

    /// All K values at node `(i, j)`.
    pub fn needle(&mut self, i: usize, j: usize) -> BasinResult<&[f32]> {
        self.assert_bounds(i, j, self.geometry.first_k());
        let start = self.geometry.index_kij(i, j, self.geometry.first_k());
        let len = self.geometry.num_k();
        let all = self.values_kij()?;
        Ok(&all[start..start + len])
    }

    /// Values along I at fixed `(j, k)`.
    pub fn row(&mut self, j: usize, k: usize) -> BasinResult<&[f32]> {
        self.assert_bounds(0, j, k);
        let start = self.geometry.index_ijk(0, j, k);
        let len = self.geometry.num_i();
        let all = self.values_ijk()?;
        Ok(&all[start..start + len])
    }

    /// Values along J at fixed `(i, k)`.
    pub fn column(&mut self, i: usize, k: usize) -> BasinResult<Vec<f32>> {
        self.assert_bounds(i, 0, k);
        let start = self.geometry.index_ijk(i, 0, k);
        let (num_i, num_j) = (self.geometry.num_i(), self.geometry.num_j());
        let all = self.values_ijk()?;
        Ok(all[start..].iter().step_by(num_i).take(num_j).copied().collect())
    }

    /// Cached min/max over the resident data; see [`crate::MapData::min_max`].
    pub fn min_max(&mut self) -> BasinResult<(f32, f32)> {
        if let (Some(stats), Residency::Resident) = (self.stats, self.core.state) {
            return Ok(stats);
        }
        let undefined = self.undefined;
        let (min, max, collapse) = match &mut self.values {
            VolumeValues::Empty => return Err(Self::not_retrieved("min_max")),
            VolumeValues::Constant { value, .. } => (*value, *value, None),
            VolumeValues::Buffers { ijk, kij } => {
                let mut result = None;
                for buffer in [ijk.as_mut(), kij.as_mut()].into_iter().flatten() {
                    let scanned = scan_min_max(buffer, undefined);
                    result.get_or_insert((scanned, buffer.first().copied()));
                }
                match result {
                    Some(((min, max, uniform), first)) => (min, max, first.filter(|_| uniform)),
                    None => return Err(Self::not_retrieved("min_max")),
                }
            }
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

    pub fn stats_hint(&self) -> Option<(f32, f32)> {
        self.stats.or(self.stats_hint)
    }

    pub fn set_stats_hint(&mut self, min: f32, max: f32) {
        self.stats_hint = Some((min, max));
    }

    /// Trilinear interpolation inside the cell at `location`.
    ///
    /// Returns the undefined value when a local coordinate or any of the
    /// eight corner samples is undefined.
    pub fn interpolate(&self, location: &VolumeLocation) -> BasinResult<f32> {
        let undefined = f64::from(self.undefined);
        let plane = &location.plane;
        if plane.xi == undefined || plane.eta == undefined || location.zeta == undefined {
            return Ok(self.undefined);
        }
        let mut result = 0.0;
        for (dk, ck) in [(0, -1.0), (1, 1.0)] {
            for (di, dj, ci, cj) in QUAD_CORNERS {
                let v = self.value(plane.i + di, plane.j + dj, location.k + dk)?;
                if v == self.undefined {
                    return Ok(self.undefined);
                }
                result += hex_shape(ci, cj, ck, plane.xi, plane.eta, location.zeta) * f64::from(v);
            }
        }
        Ok(result as f32)
    }

    fn stitch(&self, parts: Vec<DecodedPart>) -> BasinResult<(Layout, Vec<f32>)> {
        let geometry = &self.geometry;
        let mut parts = parts.into_iter().peekable();
        if let Some(DecodedPart::Blob { .. }) = parts.peek() {
            if let Some(DecodedPart::Blob { layout, values }) = parts.next() {
                return Ok((layout, values));
            }
        }

        let plane = geometry.plane().size();
        let mut ijk = filled(geometry.size(), self.undefined)?;
        for part in parts {
            let DecodedPart::Slab { first_k, num_k, values } = part else {
                return Err(BasinError::Format("volume mixes blob and dataset parts".into()));
            };
            if first_k < geometry.first_k() || first_k + num_k > geometry.first_k() + geometry.num_k() {
                return Err(BasinError::Format(format!(
                    "slab k={first_k}..{} outside volume k-range {}..={}",
                    first_k + num_k,
                    geometry.first_k(),
                    geometry.last_k()
                )));
            }
            let start = (first_k - geometry.first_k()) * plane;
            ijk[start..start + values.len()].copy_from_slice(&values);
        }
        Ok((Layout::IJK, ijk))
    }
}

impl DataUnit for VolumeData {
    fn label(&self) -> &'static str {
        "volume"
    }

    fn residency(&self) -> Residency {
        self.core.state
    }

    fn kind(&self) -> UnitKind {
        self.core.kind
    }

    fn raw_requests(&self) -> Vec<RawRequest> {
        self.core.requests(Layout::IJK)
    }

    fn accept_raw(&mut self, part: usize, raw: RawPart) -> BasinResult<bool> {
        self.core.accept(part, raw, Layout::IJK)
    }

    fn retrieve(&mut self) -> BasinResult<()> {
        if self.core.kind == UnitKind::Reference {
            return Err(BasinError::InvalidArgument("cannot retrieve a reference volume".into()));
        }
        if self.core.state == Residency::Resident {
            return Ok(());
        }
        let size = self.geometry.size();
        let plane = self.geometry.plane().size();
        let parts = self.core.take_decoded(Layout::IJK, size, plane, "volume")?;
        let (layout, values) = self.stitch(parts)?;
        debug!(values = values.len(), ?layout, loads = self.core.loads(), "volume retrieved");
        self.install(layout, values);
        Ok(())
    }

    fn release(&mut self) {
        if let VolumeValues::Constant { expanded, .. } = &mut self.values {
            *expanded = None;
            return;
        }
        self.values = VolumeValues::Empty;
        self.core.mark_released();
    }
}
