//! Writing a project as an XML index plus blob files.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use basinio_data::{DataUnit, MapData, VolumeData};
use basinio_model::{
    cell_center_surfaces, cell_center_volume, merge_formation_volumes, replace_existing_properties, GeometryTable,
    Project, RecordTables, SnapShot, StratigraphyEntry, Volume,
};
use basinio_sched::{for_each_parallel, retrieve_all};
use basinio_store::{BlobDescriptor, BlobWriter, PayloadTicket, PendingPayload};
use basinio_types::{
    BasinError, BasinResult, FormationId, Layout, Property, ReservoirId, DEFAULT_UNDEFINED_VALUE, XML_VERSION_MAJOR,
    XML_VERSION_MINOR,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::element::Element;
use crate::flags::write_flags;

pub const FORMATION_MAPS_FILE: &str = "formation_maps.bin";
pub const TABLES_FILE: &str = "tables.bin";

/// Temporary attribute linking a `<datastore>` to a queued payload.
const TICKET_ATTR: &str = "ticket";

const SURFACES: usize = 0;
const VOLUMES: usize = 1;

pub fn snapshot_surfaces_file(age: f64) -> String {
    format!("Snapshot_{age:.6}_surfaces.bin")
}

pub fn snapshot_volumes_file(age: f64) -> String {
    format!("Snapshot_{age:.6}_volumes.bin")
}

/// Counters reported by [`export_project`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub snapshots: usize,
    /// Payloads written to blob files.
    pub payloads: usize,
    /// Units written as a `constantvalue` attribute.
    pub constants: usize,
    /// Units written as references to a baseline export.
    pub references: usize,
    pub bytes_written: u64,
}

/// Export `project` to `xml_path`.
///
/// Blob files go to `<xml dir>/<stem><output_suffix>`. With a `baseline`,
/// data the baseline already holds is written as references into the
/// baseline's blob files instead of being copied. Every snapshot is
/// released after it is written.
pub fn export_project(
    project: &mut Project,
    xml_path: &Path,
    config: &ExportConfig,
    baseline: Option<&Project>,
) -> BasinResult<ExportStats> {
    let parent = match xml_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let output_path = config.output_dir_name(xml_path);
    let out_dir = parent.join(&output_path);
    fs::create_dir_all(&out_dir)?;
    info!(path = %xml_path.display(), snapshots = project.snapshots().len(), "exporting project");

    let mut exporter = Exporter {
        config,
        out_dir,
        formation_names: project.formations().iter().map(|f| f.name().to_owned()).collect(),
        reservoir_names: project.reservoirs().iter().map(|r| r.name().to_owned()).collect(),
        stats: ExportStats::default(),
    };

    let mut root = Element::new("project");
    {
        let info = project.info();
        root.push(Element::with_text("name", &info.name));
        root.push(Element::with_text("description", &info.description));
        root.push(Element::with_text("modelingmode", info.mode.code().to_string()));
        root.push(Element::with_text("team", &info.team));
        root.push(Element::with_text("programversion", &info.program_version));
    }
    root.push(Element::with_text("outputpath", output_path.to_string_lossy()));
    root.push(
        Element::new("xml-version")
            .attr("major", XML_VERSION_MAJOR)
            .attr("minor", XML_VERSION_MINOR),
    );

    root.push(exporter.formations(project)?);
    root.push(properties_element(project.properties()));
    if !project.reservoirs().is_empty() {
        let list = root.push(Element::new("reservoirs"));
        for reservoir in project.reservoirs() {
            list.push(
                Element::new("reservoir")
                    .attr("name", reservoir.name())
                    .attr("formation", exporter.formation_name(reservoir.formation())?),
            );
        }
    }
    if !project.stratigraphy().is_empty() {
        root.push(exporter.stratigraphy(project)?);
    }
    exporter.record_tables(&project.records, &mut root)?;

    let snapshots = root.push(Element::new("snapshots"));
    for index in 0..project.snapshots().len() {
        snapshots.push(exporter.snapshot(project, index, baseline)?);
    }

    let geometries = root.push(Element::new("geometries"));
    for plane in project.geometries().iter() {
        let node = geometries.push(
            Element::new("geometry")
                .attr("numI", plane.num_i())
                .attr("numJ", plane.num_j())
                .attr("minI", plane.min_i())
                .attr("minJ", plane.min_j())
                .attr("deltaI", plane.delta_i())
                .attr("deltaJ", plane.delta_j()),
        );
        if plane.is_cell_centered() {
            node.set("cell-centered", true);
        }
    }

    fs::write(xml_path, root.to_document()?)?;
    let stats = exporter.stats;
    info!(
        snapshots = stats.snapshots,
        payloads = stats.payloads,
        references = stats.references,
        bytes = stats.bytes_written,
        "export complete"
    );
    Ok(stats)
}

fn properties_element(properties: &[std::sync::Arc<Property>]) -> Element {
    let mut list = Element::new("properties");
    for property in properties {
        list.push(
            Element::new("property")
                .attr("name", property.name())
                .attr("cauldronname", property.native_name())
                .attr("username", property.user_name())
                .attr("unit", property.unit())
                .attr("attribute", property.attribute().code())
                .attr("type", property.property_type().code()),
        );
    }
    list
}

struct Exporter<'a> {
    config: &'a ExportConfig,
    out_dir: PathBuf,
    formation_names: Vec<String>,
    reservoir_names: Vec<String>,
    stats: ExportStats,
}

impl Exporter<'_> {
    fn formation_name(&self, id: FormationId) -> BasinResult<&str> {
        self.formation_names
            .get(id.index())
            .map(String::as_str)
            .ok_or_else(|| BasinError::not_found("formation", format!("#{}", id.index())))
    }

    fn reservoir_name(&self, id: ReservoirId) -> BasinResult<&str> {
        self.reservoir_names
            .get(id.index())
            .map(String::as_str)
            .ok_or_else(|| BasinError::not_found("reservoir", format!("#{}", id.index())))
    }

    fn open_writer(&self, name: &str, referenced: &HashSet<PathBuf>) -> BasinResult<BlobWriter> {
        let path = self.out_dir.join(name);
        let append = referenced.contains(&absolute(&path)?);
        if append {
            debug!(path = %path.display(), "appending to blob file holding referenced data");
        }
        Ok(BlobWriter::open(&path, append)?.with_min_bytes_to_compress(self.config.min_bytes_to_compress))
    }

    /// Compress and write every queued payload, then point each pending
    /// `<datastore>` under `node` at the range written for it.
    fn finish_writers(&mut self, writers: Vec<BlobWriter>, node: &mut Element) -> BasinResult<()> {
        let mut written: HashMap<String, BlobDescriptor> = HashMap::new();
        for (slot, mut writer) in writers.into_iter().enumerate() {
            for_each_parallel(writer.pending_mut(), self.config.num_threads, PendingPayload::compress)?;
            for (ticket, descriptor) in writer.flush()? {
                self.stats.bytes_written += descriptor.size;
                written.insert(ticket_key(slot, ticket), descriptor);
            }
            writer.close()?;
        }

        node.walk_mut(&mut |element| {
            if element.name != "datastore" {
                return Ok(());
            }
            let Some(key) = element.remove(TICKET_ATTR) else {
                return Ok(());
            };
            let descriptor = written
                .get(&key)
                .ok_or_else(|| BasinError::Format(format!("no payload written for datastore {key}")))?;
            fill_local_datastore(element, descriptor)
        })
    }

    fn formations(&mut self, project: &mut Project) -> BasinResult<Element> {
        retrieve_all(project.formation_units_mut(), self.config.num_threads)?;
        let parts = project.parts_mut();

        let referenced: HashSet<PathBuf> = parts
            .formations
            .iter()
            .flat_map(|f| f.maps.named())
            .filter(|(_, (_, map))| map.is_reference())
            .flat_map(|(_, (_, map))| map.blob_descriptors().iter().map(|d| d.path.clone()))
            .map(|path| absolute(&path))
            .collect::<BasinResult<_>>()?;
        let mut writer = self.open_writer(FORMATION_MAPS_FILE, &referenced)?;

        let mut list = Element::new("formations");
        for formation in parts.formations.iter_mut() {
            let (k_start, k_end) = formation.k_range();
            let node = list.push(
                Element::new("formation")
                    .attr("name", formation.name())
                    .attr("kstart", k_start)
                    .attr("kend", k_end),
            );
            write_flags(&formation.flags, node);
            if let Some(top) = formation.top_surface() {
                node.set("topsurface", top);
            }
            if let Some(bottom) = formation.bottom_surface() {
                node.set("bottomsurface", bottom);
            }
            for (tag, (property, map)) in formation.maps.named_mut() {
                let child = self.map_element(parts.geometries, property, map, &mut writer, 0)?;
                node.push(Element::new(tag)).push(child);
            }
        }

        self.finish_writers(vec![writer], &mut list)?;
        for formation in parts.formations.iter_mut() {
            formation.release();
        }
        Ok(list)
    }

    fn stratigraphy(&self, project: &Project) -> BasinResult<Element> {
        let mut table = Element::new("stratigraphytable");
        for entry in project.stratigraphy().entries() {
            match entry {
                StratigraphyEntry::Surface { name, age } => {
                    let node = table.push(Element::new("surface").attr("name", name));
                    if let Some(age) = age {
                        node.set("age", age);
                    }
                }
                StratigraphyEntry::Formation(id) => {
                    table.push(Element::new("formation").attr("name", self.formation_name(*id)?));
                }
            }
        }
        Ok(table)
    }

    fn record_tables(&mut self, records: &RecordTables, root: &mut Element) -> BasinResult<()> {
        let tables = records.encode();
        if tables.is_empty() {
            return Ok(());
        }
        let mut writer = self.open_writer(TABLES_FILE, &HashSet::new())?;
        for table in tables {
            let descriptor = writer.add_bytes(table.bytes, None, self.config.compress)?;
            self.stats.bytes_written += descriptor.size;
            let mut store = Element::new("datastore");
            fill_local_datastore(&mut store, &descriptor)?;
            root.push(
                Element::new(table.name)
                    .attr("number", table.count)
                    .attr("record_size", table.record_size),
            )
            .push(store);
        }
        writer.close()
    }

    fn snapshot(&mut self, project: &mut Project, index: usize, baseline: Option<&Project>) -> BasinResult<Element> {
        let threads = self.config.num_threads;
        let parts = project.parts_mut();
        let snapshot = &mut parts.snapshots[index];
        let age = snapshot.age();
        info!(age, "writing snapshot");

        if let Some(baseline) = baseline {
            let replaced = replace_existing_properties(snapshot, parts.formations, baseline)?;
            debug!(age, replaced, "baseline references substituted");
        }
        snapshot.retrieve_with(threads)?;
        if self.config.center {
            cell_center_surfaces(snapshot, parts.geometries)?;
            if let Some(volume) = snapshot.volume_mut() {
                cell_center_volume(volume, parts.geometries, threads)?;
            }
            merge_formation_volumes(snapshot, parts.geometries, parts.properties, threads)?;
        }

        let referenced = referenced_files(snapshot)?;
        let mut surface_writer = self.open_writer(&snapshot_surfaces_file(age), &referenced)?;
        let mut volume_writer = self.open_writer(&snapshot_volumes_file(age), &referenced)?;

        let mut node = Element::new("snapshot")
            .attr("age", age)
            .attr("kind", snapshot.kind().code())
            .attr("isminor", snapshot.is_minor());

        if !snapshot.surfaces().is_empty() {
            let list = node.push(Element::new("surfaces"));
            for surface in snapshot.surfaces_mut() {
                let mut surface_node = Element::new("surface")
                    .attr("name", surface.name())
                    .attr("subsurfacekind", surface.kind().code());
                if let Some(age) = surface.age() {
                    surface_node.set("age", age);
                }
                if let Some(top) = surface.top_formation() {
                    surface_node.set("top-formation", self.formation_name(top)?);
                }
                if let Some(bottom) = surface.bottom_formation() {
                    surface_node.set("bottom-formation", self.formation_name(bottom)?);
                }
                let maps = surface_node.push(Element::new("propertymaps"));
                for (property, map) in surface.property_data_mut() {
                    maps.push(self.map_element(parts.geometries, property, map, &mut surface_writer, SURFACES)?);
                }
                list.push(surface_node);
            }
        }

        if let Some(volume) = snapshot.volume_mut() {
            node.push(self.volume_element(parts.geometries, volume, &mut volume_writer)?);
        }

        if snapshot.formation_volumes().iter().any(|(_, v)| !v.is_empty()) {
            let list = node.push(Element::new("formvols"));
            for (formation, volume) in snapshot.formation_volumes_mut() {
                if volume.is_empty() {
                    continue;
                }
                let child = self.volume_element(parts.geometries, volume, &mut volume_writer)?;
                list.push(Element::new("formvol").attr("formation", self.formation_name(*formation)?))
                    .push(child);
            }
        }

        if !snapshot.trappers().is_empty() || snapshot.max_persistent_trapper_id().is_some() {
            node.push(trappers_element(snapshot));
        }

        self.finish_writers(vec![surface_writer, volume_writer], &mut node)?;
        snapshot.release();
        self.stats.snapshots += 1;
        Ok(node)
    }

    fn volume_element(
        &mut self,
        geometries: &mut GeometryTable,
        volume: &mut Volume,
        writer: &mut BlobWriter,
    ) -> BasinResult<Element> {
        let mut node = Element::new("volume").attr("subsurfacekind", volume.kind().code());
        if !volume.is_empty() {
            let list = node.push(Element::new("propertyvols"));
            for (property, data) in volume.property_data_mut() {
                list.push(self.volume_data_element(geometries, property, data, writer)?);
            }
        }
        Ok(node)
    }

    fn volume_data_element(
        &mut self,
        geometries: &mut GeometryTable,
        property: &Property,
        data: &mut VolumeData,
        writer: &mut BlobWriter,
    ) -> BasinResult<Element> {
        let geometry = data.geometry().clone();
        let mut node = Element::new("propertyvol")
            .attr("property", property.name())
            .attr("firstK", geometry.first_k())
            .attr("numK", geometry.num_k())
            .attr("geom-index", geometries.add(geometry.plane().clone()).index());
        write_undefined(&mut node, data.undefined_value());

        if data.is_reference() {
            if let Some((min, max)) = data.stats_hint() {
                node.set("min", min).set("max", max);
            }
            for descriptor in data.blob_descriptors() {
                node.push(reference_datastore(descriptor)?);
            }
            self.stats.references += 1;
            return Ok(node);
        }

        let (min, max) = data.min_max()?;
        node.set("min", min).set("max", max);
        if let Some(value) = data.constant_value() {
            node.set("constantvalue", value);
            self.stats.constants += 1;
            return Ok(node);
        }

        let ijk = data.has_data_ijk() || !data.has_data_kij();
        let ticket = if ijk {
            writer.queue_floats(data.values_ijk()?, Some(Layout::IJK), self.config.compress)
        } else {
            writer.queue_floats(data.values_kij()?, Some(Layout::KIJ), self.config.compress)
        };
        node.push(pending_datastore(VOLUMES, ticket)).set("dataIJK", ijk);
        self.stats.payloads += 1;
        Ok(node)
    }

    fn map_element(
        &mut self,
        geometries: &mut GeometryTable,
        property: &Property,
        map: &mut MapData,
        writer: &mut BlobWriter,
        slot: usize,
    ) -> BasinResult<Element> {
        let mut node = Element::new("propertymap").attr("property", property.name());
        if let Some(formation) = map.formation() {
            node.set("formation", self.formation_name(formation)?);
        }
        if let Some(reservoir) = map.reservoir() {
            node.set("reservoir", self.reservoir_name(reservoir)?);
        }
        node.set("geom-index", geometries.add((**map.geometry()).clone()).index());
        write_undefined(&mut node, map.undefined_value());

        if map.is_reference() {
            if let Some((min, max)) = map.stats_hint() {
                node.set("min", min).set("max", max);
            }
            for descriptor in map.blob_descriptors() {
                node.push(reference_datastore(descriptor)?);
            }
            self.stats.references += 1;
            return Ok(node);
        }

        let (min, max) = map.min_max()?;
        node.set("min", min).set("max", max);
        if let Some(value) = map.constant_value() {
            node.set("constantvalue", value);
            self.stats.constants += 1;
            return Ok(node);
        }

        let ticket = writer.queue_floats(map.surface_values()?, Some(Layout::IJ), self.config.compress);
        node.push(pending_datastore(slot, ticket));
        self.stats.payloads += 1;
        Ok(node)
    }
}

fn trappers_element(snapshot: &SnapShot) -> Element {
    let mut list = Element::new("trappers");
    for trapper in snapshot.trappers() {
        list.push(
            Element::new("trapper")
                .attr("id", trapper.id)
                .attr("persistentID", trapper.persistent_id)
                .attr("reservoirname", &trapper.reservoir_name)
                .attr("depth", trapper.depth)
                .attr("spillDepth", trapper.spill_depth)
                .attr("posX", trapper.position.0)
                .attr("posY", trapper.position.1)
                .attr("spillPosX", trapper.spill_position.0)
                .attr("spillPosY", trapper.spill_position.1)
                .attr("goc", trapper.goc)
                .attr("owc", trapper.owc)
                .attr("downstreamtrapper", trapper.downstream_code()),
        );
    }
    if let Some(max) = snapshot.max_persistent_trapper_id() {
        list.push(Element::with_text("maxPersistentTrapperID", max.to_string()));
    }
    list
}

/// Blob files that reference units of `snapshot` point into.
fn referenced_files(snapshot: &SnapShot) -> BasinResult<HashSet<PathBuf>> {
    let mut paths = Vec::new();
    for surface in snapshot.surfaces() {
        for (_, map) in surface.property_data() {
            if map.is_reference() {
                paths.extend(map.blob_descriptors().iter().map(|d| d.path.clone()));
            }
        }
    }
    let volumes = snapshot.volume().into_iter().chain(snapshot.formation_volumes().iter().map(|(_, v)| v));
    for volume in volumes {
        for (_, data) in volume.property_data() {
            if data.is_reference() {
                paths.extend(data.blob_descriptors().iter().map(|d| d.path.clone()));
            }
        }
    }
    paths.iter().map(|p| absolute(p)).collect()
}

fn absolute(path: &Path) -> BasinResult<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn write_undefined(node: &mut Element, undefined: f32) {
    if undefined != DEFAULT_UNDEFINED_VALUE {
        node.set("undefinedvalue", undefined);
    }
}

fn ticket_key(slot: usize, ticket: PayloadTicket) -> String {
    format!("{slot}:{}", ticket.id())
}

fn pending_datastore(slot: usize, ticket: PayloadTicket) -> Element {
    Element::new("datastore").attr(TICKET_ATTR, ticket_key(slot, ticket))
}

/// Point `node` at a range written by this export; the file is named
/// relative to the output directory.
fn fill_local_datastore(node: &mut Element, descriptor: &BlobDescriptor) -> BasinResult<()> {
    let file = descriptor
        .path
        .file_name()
        .ok_or_else(|| BasinError::Format(format!("blob path {} has no file name", descriptor.path.display())))?;
    node.set("file", file.to_string_lossy())
        .set("compression", descriptor.compression)
        .set("offset", descriptor.offset)
        .set("size", descriptor.size);
    if let Some(checksum) = descriptor.checksum {
        node.set("checksum", checksum);
    }
    Ok(())
}

/// A `<datastore>` for a range owned by another export, with an absolute
/// file path.
fn reference_datastore(descriptor: &BlobDescriptor) -> BasinResult<Element> {
    let mut node = Element::new("datastore")
        .attr("file", absolute(&descriptor.path)?.to_string_lossy())
        .attr("partialpath", false)
        .attr("compression", descriptor.compression)
        .attr("offset", descriptor.offset)
        .attr("size", descriptor.size);
    match descriptor.layout {
        Some(Layout::IJK) => {
            node.set("dataIJK", true);
        }
        Some(Layout::KIJ) => {
            node.set("dataIJK", false);
        }
        _ => {}
    }
    if let Some(checksum) = descriptor.checksum {
        node.set("checksum", checksum);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basinio_model::{Formation, ProjectInfo, Surface};
    use basinio_types::{Geometry2D, ModellingMode, PropertyAttribute, PropertyType, SnapShotKind, SubsurfaceKind};

    use super::*;

    fn plane() -> Geometry2D {
        Geometry2D::new(3, 2, 100.0, 100.0, 0.0, 0.0)
    }

    fn small_project() -> Project {
        let mut project = Project::new(ProjectInfo::new("Demo", ModellingMode::ThreeD)).unwrap();
        let geometry = project.geometries_mut().share(plane()).1;
        let depth = project.add_property(
            Property::new("Depth", "Depth", "Depth", "m", PropertyType::Formation, PropertyAttribute::Continuous3D)
                .unwrap(),
        );
        let mut snapshot = SnapShot::new(10.0, SnapShotKind::System, false).unwrap();
        let mut surface = Surface::new("Top", SubsurfaceKind::Sediment).unwrap();
        surface
            .add_property_data(depth, MapData::from_values(geometry, &[1., 2., 3., 4., 5., 6.]).unwrap())
            .unwrap();
        snapshot.add_surface(surface).unwrap();
        project.add_snapshot(snapshot).unwrap();
        project
    }

    #[test]
    fn blob_file_names() {
        assert_eq!(snapshot_surfaces_file(0.0), "Snapshot_0.000000_surfaces.bin");
        assert_eq!(snapshot_volumes_file(12.5), "Snapshot_12.500000_volumes.bin");
    }

    #[test]
    fn datastores_point_at_written_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("demo.xml");
        let mut project = small_project();

        let stats = export_project(&mut project, &xml, &ExportConfig::default(), None).unwrap();
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.payloads, 1);
        assert!(stats.bytes_written > 0);

        let root = Element::parse_document(&fs::read_to_string(&xml).unwrap()).unwrap();
        assert_eq!(root.child_text("outputpath"), "demo_output");
        let store = root
            .child("snapshots")
            .and_then(|s| s.child("snapshot"))
            .and_then(|s| s.child("surfaces"))
            .and_then(|s| s.child("surface"))
            .and_then(|s| s.child("propertymaps"))
            .and_then(|m| m.child("propertymap"))
            .and_then(|m| m.child("datastore"))
            .unwrap();
        assert_eq!(store.get(TICKET_ATTR), None);
        assert_eq!(store.get("file"), Some("Snapshot_10.000000_surfaces.bin"));
        assert_eq!(store.parse::<u64>("offset").unwrap(), 0);
        assert!(store.get("checksum").is_some());
        assert!(dir.path().join("demo_output").join("Snapshot_10.000000_surfaces.bin").exists());
        assert!(!dir.path().join("demo_output").join("Snapshot_10.000000_volumes.bin").exists());
    }

    #[test]
    fn snapshot_released_after_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = small_project();
        export_project(&mut project, &dir.path().join("p.xml"), &ExportConfig::default(), None).unwrap();
        let surface = &project.snapshots()[0].surfaces()[0];
        assert!(!surface.is_retrieved());
    }

    #[test]
    fn formation_maps_and_flags_exported() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("f.xml");
        let mut project = Project::new(ProjectInfo::new("F", ModellingMode::ThreeD)).unwrap();
        let geometry = project.geometries_mut().share(plane()).1;
        let thickness = project.add_property(
            Property::new("Thickness", "Thickness", "Thickness", "m", PropertyType::Formation, PropertyAttribute::Formation2D)
                .unwrap(),
        );
        let mut formation = Formation::new("Sand", 0, 4).unwrap();
        formation.flags.is_source_rock = true;
        formation.maps.thickness = Some((thickness, MapData::constant(geometry, 250.0)));
        let id = project.add_formation(formation).unwrap();
        project.stratigraphy_mut().push(StratigraphyEntry::Formation(id));

        let stats = export_project(&mut project, &xml, &ExportConfig::default(), None).unwrap();
        assert_eq!(stats.constants, 1);
        let root = Element::parse_document(&fs::read_to_string(&xml).unwrap()).unwrap();
        let node = root.child("formations").and_then(|f| f.child("formation")).unwrap();
        assert_eq!(node.get("isSR"), Some("true"));
        let map = node.child("thicknessmap").and_then(|t| t.child("propertymap")).unwrap();
        assert_eq!(map.parse::<f32>("constantvalue").unwrap(), 250.0);
        assert!(!dir.path().join("f_output").join(FORMATION_MAPS_FILE).exists());
        let entry = root.child("stratigraphytable").and_then(|t| t.child("formation")).unwrap();
        assert_eq!(entry.get("name"), Some("Sand"));
    }

    #[test]
    fn formation_maps_released_after_export() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("m.xml");
        let mut project = Project::new(ProjectInfo::new("M", ModellingMode::ThreeD)).unwrap();
        let geometry = project.geometries_mut().share(plane()).1;
        let thickness = project.add_property(
            Property::new("Thickness", "Thickness", "Thickness", "m", PropertyType::Formation, PropertyAttribute::Formation2D)
                .unwrap(),
        );
        let mut formation = Formation::new("Shale", 0, 2).unwrap();
        let values: Vec<f32> = (0..plane().size()).map(|v| v as f32).collect();
        formation.maps.thickness = Some((thickness, MapData::from_values(geometry, &values).unwrap()));
        project.add_formation(formation).unwrap();

        export_project(&mut project, &xml, &ExportConfig::default(), None).unwrap();
        let (_, map) = project.formations()[0].maps.thickness.as_ref().unwrap();
        assert!(!map.is_retrieved());

        let mut imported = crate::import_project(&xml).unwrap();
        let parts = imported.parts_mut();
        let (_, map) = parts.formations[0].maps.thickness.as_mut().unwrap();
        map.retrieve().unwrap();
        assert_eq!(map.value(1, 0).unwrap(), 1.0);
    }
}
