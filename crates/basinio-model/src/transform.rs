//! Graph transforms applied before export.
//!
//! Cell-centering turns node grids into cell grids by filtering the corner
//! samples of every cell. Merging stitches formation volumes into one
//! continuous, cell-centered volume. Reference substitution points data at
//! ranges a baseline export already wrote.

use std::sync::Arc;

use basinio_data::{DataUnit, MapData, VolumeData};
use basinio_sched::for_each_parallel;
use basinio_types::{BasinError, BasinResult, Geometry2D, Geometry3D, Property, SubsurfaceKind};
use tracing::debug;

use crate::formation::{Formation, PropertyMap};
use crate::geometry_table::GeometryTable;
use crate::project::Project;
use crate::snapshot::SnapShot;
use crate::surface::DEPTH_PROPERTY;
use crate::volume::{PropertyVolume, Volume};

/// How the corner samples of one cell reduce to the cell value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellFilter {
    Average,
    Median,
    /// The first corner, for properties that are codes rather than
    /// quantities.
    First,
}

impl CellFilter {
    pub fn for_property(name: &str) -> Self {
        match name {
            "Permeability" => Self::Median,
            "FlowDirectionIJK" => Self::First,
            _ => Self::Average,
        }
    }

    /// Reduce `samples`; undefined samples are ignored and a cell with no
    /// defined corner is undefined.
    pub fn apply(self, samples: &mut [f32], undefined: f32) -> f32 {
        if samples.is_empty() {
            return undefined;
        }
        if self == Self::First {
            return samples[0];
        }
        let defined = if samples.contains(&undefined) {
            let mut kept = 0;
            for n in 0..samples.len() {
                if samples[n] != undefined {
                    samples[kept] = samples[n];
                    kept += 1;
                }
            }
            &mut samples[..kept]
        } else {
            samples
        };
        if defined.is_empty() {
            return undefined;
        }
        match self {
            Self::Average => {
                let sum: f64 = defined.iter().map(|v| f64::from(*v)).sum();
                (sum / defined.len() as f64) as f32
            }
            Self::Median => {
                defined.sort_by(f32::total_cmp);
                defined[defined.len() / 2]
            }
            Self::First => defined[0],
        }
    }
}

fn alloc(len: usize) -> BasinResult<Vec<f32>> {
    let mut out = Vec::new();
    out.try_reserve_exact(len).map_err(|_| BasinError::Allocation(len))?;
    Ok(out)
}

fn centerable_plane(geometry: &Geometry2D) -> bool {
    !geometry.is_cell_centered() && geometry.num_i() >= 2 && geometry.num_j() >= 2
}

fn centerable_volume(geometry: &Geometry3D) -> bool {
    centerable_plane(geometry.plane()) && geometry.num_k() >= 2
}

/// Cell-centered copy of `map`, or `None` when it is a depth map or cannot
/// be centered.
pub fn cell_center_map(
    property: &Property,
    map: &MapData,
    geometries: &mut GeometryTable,
) -> BasinResult<Option<MapData>> {
    if property.name() == DEPTH_PROPERTY || !centerable_plane(map.geometry()) {
        return Ok(None);
    }
    let (_, geometry) = geometries.share(map.geometry().cell_centered_counterpart()?);
    let undefined = map.undefined_value();
    let mut centered = if let Some(value) = map.constant_value() {
        MapData::constant(geometry, value)
    } else {
        let filter = CellFilter::for_property(property.name());
        let mut values = alloc(geometry.size())?;
        for j in 0..geometry.num_j() {
            for i in 0..geometry.num_i() {
                let mut corners = [map.value(i, j)?, map.value(i + 1, j)?, map.value(i, j + 1)?, map.value(i + 1, j + 1)?];
                values.push(filter.apply(&mut corners, undefined));
            }
        }
        MapData::from_values(geometry, &values)?
    };
    centered = centered.with_undefined_value(undefined);
    centered.set_formation(map.formation());
    centered.set_reservoir(map.reservoir());
    Ok(Some(centered))
}

/// Cell values of `source` over `target`, the centered geometry of its
/// node grid, in IJK order.
fn center_volume_values(source: &VolumeData, target: &Geometry3D, filter: CellFilter) -> BasinResult<Vec<f32>> {
    let undefined = source.undefined_value();
    let mut values = alloc(target.size())?;
    let mut corners = [0.0f32; 8];
    for k in target.first_k()..=target.last_k() {
        for j in 0..target.num_j() {
            for i in 0..target.num_i() {
                let mut n = 0;
                for dk in 0..2 {
                    for (di, dj) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                        corners[n] = source.value(i + di, j + dj, k + dk)?;
                        n += 1;
                    }
                }
                values.push(filter.apply(&mut corners, undefined));
            }
        }
    }
    Ok(values)
}

/// Cell-centered copy of `data`, or `None` when it is depth data or cannot
/// be centered.
pub fn cell_center_volume_data(
    property: &Property,
    data: &VolumeData,
    geometries: &mut GeometryTable,
) -> BasinResult<Option<VolumeData>> {
    if property.name() == DEPTH_PROPERTY || !centerable_volume(data.geometry()) {
        return Ok(None);
    }
    let (_, geometry) = geometries.share_volume(data.geometry().cell_centered_counterpart()?);
    let centered = match data.constant_value() {
        Some(value) => VolumeData::constant(geometry, value),
        None => {
            let values = center_volume_values(data, &geometry, CellFilter::for_property(property.name()))?;
            VolumeData::from_ijk(geometry, &values)?
        }
    };
    Ok(Some(centered.with_undefined_value(data.undefined_value())))
}

/// Replace every centerable map of the snapshot's surfaces with its
/// cell-centered version. Returns the number of maps replaced.
pub fn cell_center_surfaces(snapshot: &mut SnapShot, geometries: &mut GeometryTable) -> BasinResult<usize> {
    let mut replaced = 0;
    for surface in snapshot.surfaces_mut() {
        for index in 0..surface.property_data().len() {
            let (property, map) = &surface.property_data()[index];
            if let Some(centered) = cell_center_map(property, map, geometries)? {
                let pair: PropertyMap = (Arc::clone(property), centered);
                surface.replace_at(index, pair)?;
                replaced += 1;
            }
        }
    }
    Ok(replaced)
}

struct CenterJob<'a> {
    index: usize,
    source: &'a VolumeData,
    geometry: Arc<Geometry3D>,
    filter: CellFilter,
    out: Option<Vec<f32>>,
}

/// Replace every centerable entry of `volume` with its cell-centered
/// version, computing cell values on up to `threads` threads.
pub fn cell_center_volume(volume: &mut Volume, geometries: &mut GeometryTable, threads: usize) -> BasinResult<usize> {
    let mut constants: Vec<(usize, VolumeData)> = Vec::new();
    let mut jobs: Vec<CenterJob<'_>> = Vec::new();
    for (index, (property, data)) in volume.property_data().iter().enumerate() {
        if property.name() == DEPTH_PROPERTY || !centerable_volume(data.geometry()) {
            continue;
        }
        let (_, geometry) = geometries.share_volume(data.geometry().cell_centered_counterpart()?);
        if let Some(value) = data.constant_value() {
            constants.push((index, VolumeData::constant(geometry, value).with_undefined_value(data.undefined_value())));
            continue;
        }
        jobs.push(CenterJob {
            index,
            source: data,
            geometry,
            filter: CellFilter::for_property(property.name()),
            out: None,
        });
    }

    for_each_parallel(&mut jobs, threads, |job| {
        job.out = Some(center_volume_values(job.source, &job.geometry, job.filter)?);
        Ok(())
    })?;

    let mut centered = constants;
    for job in jobs {
        let values = job.out.unwrap_or_default();
        let data = VolumeData::from_ijk(job.geometry, &values)?.with_undefined_value(job.source.undefined_value());
        centered.push((job.index, data));
    }

    let count = centered.len();
    for (index, data) in centered {
        let property = Arc::clone(&volume.property_data()[index].0);
        volume.replace_at(index, (property, data))?;
    }
    Ok(count)
}

struct MergeJob<'a> {
    property: Arc<Property>,
    sources: Vec<&'a VolumeData>,
    geometry: Arc<Geometry3D>,
    out: Option<VolumeData>,
}

/// Order `parts` so each starts where the previous one ends.
///
/// Node volumes of adjacent formations share their boundary layer, so the
/// next volume's first k equals the previous volume's last k.
fn chain_k_ranges<'a>(property: &str, parts: &[&'a VolumeData]) -> BasinResult<Vec<&'a VolumeData>> {
    let mut remaining: Vec<&VolumeData> = parts.to_vec();
    remaining.sort_by_key(|v| v.geometry().first_k());
    let mut chain = Vec::with_capacity(remaining.len());
    let first = remaining.remove(0);
    let mut end = first.geometry().last_k();
    chain.push(first);
    while !remaining.is_empty() {
        let Some(next) = remaining.iter().position(|v| v.geometry().first_k() == end) else {
            return Err(BasinError::NonContinuous(format!(
                "property {property}: no formation volume starts at k={end}"
            )));
        };
        let volume = remaining.remove(next);
        end = volume.geometry().last_k();
        chain.push(volume);
    }
    Ok(chain)
}

fn merge_chain(job: &MergeJob<'_>) -> BasinResult<VolumeData> {
    let target = &job.geometry;
    let plane = target.plane().size();
    let undefined = job.sources.first().map_or(basinio_types::DEFAULT_UNDEFINED_VALUE, |v| v.undefined_value());
    let filter = CellFilter::for_property(job.property.name());

    let mut merged = alloc(target.size())?;
    merged.resize(target.size(), undefined);
    for source in &job.sources {
        let g = source.geometry();
        let layers = g.num_k() - 1;
        if layers == 0 {
            continue;
        }
        let offset = (g.first_k() - target.first_k()) * plane;
        let range = offset..offset + layers * plane;
        match source.constant_value() {
            Some(value) => merged[range].fill(value),
            None => {
                let cells = g.cell_centered_counterpart()?;
                let values = center_volume_values(source, &cells, filter)?;
                merged[range].copy_from_slice(&values);
            }
        }
    }
    Ok(VolumeData::from_ijk(Arc::clone(target), &merged)?.with_undefined_value(undefined))
}

/// Merge the formation volumes of `snapshot` into its continuous volume,
/// one cell-centered field per property.
///
/// Formation volumes must be resident and their k-ranges must join without
/// gaps. Merged properties are removed from the formation volumes; a
/// property already present in the continuous volume is left alone.
pub fn merge_formation_volumes(
    snapshot: &mut SnapShot,
    geometries: &mut GeometryTable,
    properties: &[Arc<Property>],
    threads: usize,
) -> BasinResult<usize> {
    let age = snapshot.age();
    let (continuous, formation_volumes) = snapshot.volumes_split_mut();

    let mut jobs: Vec<MergeJob<'_>> = Vec::new();
    for property in properties {
        if property.name() == DEPTH_PROPERTY {
            continue;
        }
        if continuous.as_ref().is_some_and(|v| v.find(property.name()).is_some()) {
            continue;
        }
        let sources: Vec<&VolumeData> = formation_volumes
            .iter()
            .filter_map(|(_, volume)| volume.find(property.name()))
            .collect();
        if sources.is_empty() {
            continue;
        }
        if let Some(bad) = sources.iter().find(|v| !centerable_plane(v.geometry().plane())) {
            return Err(BasinError::InvalidArgument(format!(
                "property {}: cannot merge a {}x{} volume",
                property.name(),
                bad.geometry().num_i(),
                bad.geometry().num_j()
            )));
        }
        let chain = chain_k_ranges(property.name(), &sources)?;
        let start_k = chain[0].geometry().first_k();
        let end_k = chain[chain.len() - 1].geometry().last_k();
        if end_k == start_k {
            continue;
        }
        let plane = chain[0].geometry().plane().cell_centered_counterpart()?;
        let (_, geometry) = geometries.share_volume(Geometry3D::new(plane, end_k - start_k, start_k)?);
        jobs.push(MergeJob {
            property: Arc::clone(property),
            sources: chain,
            geometry,
            out: None,
        });
    }

    for_each_parallel(&mut jobs, threads, |job| {
        job.out = Some(merge_chain(job)?);
        Ok(())
    })?;

    let merged: Vec<PropertyVolume> = jobs
        .into_iter()
        .filter_map(|job| job.out.map(|data| (job.property, data)))
        .collect();
    let count = merged.len();

    for (property, _) in &merged {
        for (_, volume) in formation_volumes.iter_mut() {
            if volume.find(property.name()).is_some() {
                volume.remove_volume_data(property)?;
            }
        }
    }
    let target = continuous.get_or_insert_with(|| Volume::new(SubsurfaceKind::None));
    for (property, data) in merged {
        target.add_property_data(property, data)?;
    }
    debug!(age, properties = count, "formation volumes merged");
    Ok(count)
}

/// Stand-in for `data` that points at what `baseline` already stored.
fn baseline_volume(data: &VolumeData, baseline: &VolumeData) -> Option<VolumeData> {
    let replacement = match baseline.constant_value() {
        Some(value) => VolumeData::constant(Arc::clone(data.geometry()), value),
        None if baseline.blob_descriptors().is_empty() => return None,
        None => {
            let mut unit = VolumeData::reference(Arc::clone(baseline.geometry()), baseline.blob_descriptors().to_vec());
            if let Some((min, max)) = baseline.stats_hint() {
                unit.set_stats_hint(min, max);
            }
            unit
        }
    };
    Some(replacement.with_undefined_value(baseline.undefined_value()))
}

fn baseline_map(map: &MapData, baseline: &MapData) -> Option<MapData> {
    let mut replacement = match baseline.constant_value() {
        Some(value) => MapData::constant(Arc::clone(map.geometry()), value),
        None => {
            let descriptor = baseline.blob_descriptors().first()?.clone();
            let mut unit = MapData::reference(Arc::clone(baseline.geometry()), descriptor);
            if let Some((min, max)) = baseline.stats_hint() {
                unit.set_stats_hint(min, max);
            }
            unit
        }
    }
    .with_undefined_value(baseline.undefined_value());
    replacement.set_formation(map.formation());
    replacement.set_reservoir(map.reservoir());
    Some(replacement)
}

fn replace_in_volume(volume: &mut Volume, baseline: &Volume, skip_centered: bool) -> BasinResult<usize> {
    let mut replacements = Vec::new();
    for (index, (property, data)) in volume.property_data().iter().enumerate() {
        if data.is_reference() || (skip_centered && data.geometry().is_cell_centered()) {
            continue;
        }
        let found = baseline.property_data().iter().find(|(p, d)| {
            p.name() == property.name() && d.geometry().plane() == data.geometry().plane()
        });
        if let Some(unit) = found.and_then(|(_, d)| baseline_volume(data, d)) {
            replacements.push((index, (Arc::clone(property), unit)));
        }
    }
    let count = replacements.len();
    for (index, pair) in replacements {
        volume.replace_at(index, pair)?;
    }
    Ok(count)
}

/// Point data of `snapshot` at ranges already written for the snapshot of
/// the same age in `baseline`, so an export does not store them again.
///
/// Returns the number of units replaced. Must run before retrieval.
pub fn replace_existing_properties(
    snapshot: &mut SnapShot,
    formations: &[Formation],
    baseline: &Project,
) -> BasinResult<usize> {
    let Some(previous) = baseline.find_snapshot(snapshot.age()) else {
        return Ok(0);
    };
    let mut count = 0;

    if let (Some(volume), Some(old)) = (snapshot.volume_mut(), previous.volume()) {
        count += replace_in_volume(volume, old, true)?;
    }

    for (formation, volume) in snapshot.formation_volumes_mut() {
        let Some(name) = formations.get(formation.index()).map(Formation::name) else {
            continue;
        };
        let old = previous
            .formation_volumes()
            .iter()
            .find(|(f, _)| baseline.formation(*f).is_some_and(|b| b.name() == name));
        if let Some((_, old)) = old {
            count += replace_in_volume(volume, old, false)?;
        }
    }

    let formation_name = |id: Option<basinio_types::FormationId>, table: &[Formation]| -> Option<String> {
        id.and_then(|f| table.get(f.index())).map(|f| f.name().to_string())
    };
    for surface in snapshot.surfaces_mut() {
        let Some(old) = previous.find_surface(surface.name()) else {
            continue;
        };
        let mut replacements = Vec::new();
        for (index, (property, map)) in surface.property_data().iter().enumerate() {
            if map.is_reference() {
                continue;
            }
            let own_formation = formation_name(map.formation(), formations);
            let found = old.property_data().iter().find(|(p, m)| {
                p.name() == property.name()
                    && **m.geometry() == **map.geometry()
                    && formation_name(m.formation(), baseline.formations()) == own_formation
            });
            if let Some(unit) = found.and_then(|(_, m)| baseline_map(map, m)) {
                replacements.push((index, (Arc::clone(property), unit)));
            }
        }
        count += replacements.len();
        for (index, pair) in replacements {
            surface.replace_at(index, pair)?;
        }
    }

    debug!(age = snapshot.age(), replaced = count, "baseline references substituted");
    Ok(count)
}
