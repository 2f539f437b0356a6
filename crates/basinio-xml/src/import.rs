//! Reading a project from an XML index.
//!
//! Import builds the whole graph but never reads float payloads: every
//! map and volume comes back backed by its blob range (or holding its
//! constant) and becomes resident only through `retrieve` or the
//! retrieval scheduler. Record tables are small and are decoded eagerly.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use basinio_data::{MapData, VolumeData};
use basinio_model::{
    link_trappers, Formation, PropertyMap, Project, ProjectInfo, RecordTables, Reservoir, SnapShot,
    StratigraphyEntry, Surface, Trapper, Volume,
};
use basinio_store::{BlobDescriptor, BlobReader};
use basinio_types::{
    BasinError, BasinResult, Compression, FormationId, Geometry2D, GeometryId, Layout, ModellingMode, Property,
    PropertyAttribute, PropertyType, SnapShotKind, SubsurfaceKind, XML_VERSION_MAJOR, XML_VERSION_MINOR,
};
use tracing::{debug, info};

use crate::element::Element;
use crate::flags::read_flags;

/// Read the project indexed by `xml_path`.
pub fn import_project(xml_path: &Path) -> BasinResult<Project> {
    if !xml_path.exists() {
        return Err(BasinError::MissingFile(xml_path.to_path_buf()));
    }
    let root = Element::parse_document(&fs::read_to_string(xml_path)?)?;
    if root.name != "project" {
        return Err(BasinError::Xml(format!("root element is <{}>, expected <project>", root.name)));
    }
    let (major, minor) = check_version(&root)?;

    let xml_dir = xml_path.parent().unwrap_or_else(|| Path::new(""));
    let mut info = ProjectInfo::new(
        root.child_text("name"),
        ModellingMode::from_code(text_value(&root, "modelingmode")?)?,
    );
    info.description = root.child_text("description").to_owned();
    info.team = root.child_text("team").to_owned();
    info.program_version = root.child_text("programversion").to_owned();

    let mut project = Project::new(info)?;
    project.set_xml_version(major, minor);

    let mut importer = Importer {
        base_dir: xml_dir.join(root.child_text("outputpath")),
        geometry_ids: Vec::new(),
    };
    importer.geometries(&root, &mut project)?;
    importer.properties(&root, &mut project)?;
    importer.formations(&root, &mut project)?;
    importer.reservoirs(&root, &mut project)?;
    importer.formation_maps(&root, &mut project)?;
    importer.stratigraphy(&root, &mut project)?;
    importer.record_tables(&root, &mut project)?;

    if let Some(list) = root.child("snapshots") {
        for node in list.children_named("snapshot") {
            let snapshot = importer.snapshot(node, &mut project)?;
            project.add_snapshot(snapshot)?;
        }
    }

    info!(
        path = %xml_path.display(),
        snapshots = project.snapshots().len(),
        formations = project.formations().len(),
        geometries = project.geometries().len(),
        "project imported"
    );
    Ok(project)
}

/// Reject any version other than the one this codec writes.
fn check_version(root: &Element) -> BasinResult<(u32, u32)> {
    let node = root
        .child("xml-version")
        .ok_or_else(|| BasinError::Xml("missing <xml-version>".into()))?;
    let found = (node.parse::<u32>("major")?, node.parse::<u32>("minor")?);
    let supported = (XML_VERSION_MAJOR, XML_VERSION_MINOR);
    let direction = match found.cmp(&supported) {
        Ordering::Equal => {
            debug!(major = found.0, minor = found.1, "xml version accepted");
            return Ok(found);
        }
        Ordering::Greater => "forward",
        Ordering::Less => "backward",
    };
    Err(BasinError::IncompatibleVersion {
        direction,
        found: format!("{}.{}", found.0, found.1),
        supported: format!("{}.{}", supported.0, supported.1),
    })
}

fn text_value<T: FromStr>(node: &Element, child: &str) -> BasinResult<T> {
    let raw = node.child_text(child);
    raw.trim()
        .parse()
        .map_err(|_| BasinError::Xml(format!("<{child}>: '{raw}' is not a valid value")))
}

struct Importer {
    /// Directory relative datastore files are resolved against.
    base_dir: PathBuf,
    /// Table id for each `<geometry>` position in the document.
    geometry_ids: Vec<GeometryId>,
}

impl Importer {
    fn geometries(&mut self, root: &Element, project: &mut Project) -> BasinResult<()> {
        let Some(list) = root.child("geometries") else {
            return Ok(());
        };
        for node in list.children_named("geometry") {
            self.geometry_ids.push(project.add_geometry(read_geometry(node)?));
        }
        Ok(())
    }

    fn plane(&self, project: &Project, index: usize) -> BasinResult<(GeometryId, Arc<Geometry2D>)> {
        let id = *self
            .geometry_ids
            .get(index)
            .ok_or_else(|| BasinError::Format(format!("geom-index {index} out of range")))?;
        let plane = project
            .geometries()
            .get(id)
            .ok_or_else(|| BasinError::Format(format!("geom-index {index} out of range")))?;
        Ok((id, Arc::clone(plane)))
    }

    fn properties(&self, root: &Element, project: &mut Project) -> BasinResult<()> {
        let Some(list) = root.child("properties") else {
            return Ok(());
        };
        for node in list.children_named("property") {
            project.add_property(Property::new(
                node.parse::<String>("name")?,
                node.parse::<String>("username")?,
                node.parse::<String>("cauldronname")?,
                node.get("unit").unwrap_or_default(),
                PropertyType::from_code(node.parse("type")?)?,
                PropertyAttribute::from_code(node.parse("attribute")?)?,
            )?);
        }
        Ok(())
    }

    fn formations(&self, root: &Element, project: &mut Project) -> BasinResult<()> {
        for node in formation_nodes(root) {
            let mut formation = Formation::new(node.parse::<String>("name")?, node.parse("kstart")?, node.parse("kend")?)?
                .with_flags(read_flags(node)?);
            formation.set_top_surface(node.get("topsurface").map(str::to_owned));
            formation.set_bottom_surface(node.get("bottomsurface").map(str::to_owned));
            project.add_formation(formation)?;
        }
        Ok(())
    }

    /// Formation input maps; read once every formation and reservoir they
    /// may name exists.
    fn formation_maps(&self, root: &Element, project: &mut Project) -> BasinResult<()> {
        for (index, node) in formation_nodes(root).enumerate() {
            for slot_node in &node.children {
                let Some(map_node) = slot_node.child("propertymap") else {
                    continue;
                };
                let map = self.map(map_node, project)?;
                let slot = project.formations_mut()[index]
                    .maps
                    .slot_mut(&slot_node.name)
                    .ok_or_else(|| BasinError::Xml(format!("unknown formation map <{}>", slot_node.name)))?;
                *slot = Some(map);
            }
        }
        Ok(())
    }

    fn reservoirs(&self, root: &Element, project: &mut Project) -> BasinResult<()> {
        let Some(list) = root.child("reservoirs") else {
            return Ok(());
        };
        for node in list.children_named("reservoir") {
            let formation = find_formation(project, node.parse::<String>("formation")?.as_str())?;
            project.add_reservoir(Reservoir::new(node.parse::<String>("name")?, formation)?)?;
        }
        Ok(())
    }

    fn stratigraphy(&self, root: &Element, project: &mut Project) -> BasinResult<()> {
        let Some(table) = root.child("stratigraphytable") else {
            return Ok(());
        };
        for node in &table.children {
            let entry = match node.name.as_str() {
                "surface" => StratigraphyEntry::Surface {
                    name: node.parse("name")?,
                    age: node.parse_opt("age")?,
                },
                "formation" => StratigraphyEntry::Formation(find_formation(project, node.parse::<String>("name")?.as_str())?),
                other => return Err(BasinError::Xml(format!("unexpected <{other}> in stratigraphy table"))),
            };
            project.stratigraphy_mut().push(entry);
        }
        Ok(())
    }

    fn record_tables(&self, root: &Element, project: &mut Project) -> BasinResult<()> {
        for &name in RecordTables::NAMES {
            let Some(node) = root.child(name) else {
                continue;
            };
            let count: usize = node.parse("number")?;
            let record_size: usize = node.parse("record_size")?;
            let store = node
                .child("datastore")
                .ok_or_else(|| BasinError::Xml(format!("<{name}> has no datastore")))?;
            let descriptor = self.descriptor(store, None)?;
            let bytes = BlobReader::open(&descriptor.path)?.get_bytes(&descriptor)?;
            project.records.decode(name, &bytes, count, record_size)?;
            debug!(table = name, count, "record table imported");
        }
        Ok(())
    }

    fn snapshot(&self, node: &Element, project: &mut Project) -> BasinResult<SnapShot> {
        let mut snapshot = SnapShot::new(
            node.parse("age")?,
            SnapShotKind::from_code(node.parse("kind")?)?,
            node.flag("isminor")?,
        )?;

        if let Some(list) = node.child("surfaces") {
            for surface_node in list.children_named("surface") {
                snapshot.add_surface(self.surface(surface_node, project)?)?;
            }
        }
        if let Some(volume_node) = node.child("volume") {
            snapshot.set_volume(Some(self.volume(volume_node, project)?));
        }
        if let Some(list) = node.child("formvols") {
            for formvol in list.children_named("formvol") {
                let formation = find_formation(project, formvol.parse::<String>("formation")?.as_str())?;
                let volume_node = formvol
                    .child("volume")
                    .ok_or_else(|| BasinError::Xml("<formvol> has no <volume>".into()))?;
                snapshot.add_formation_volume(formation, self.volume(volume_node, project)?)?;
            }
        }
        if let Some(list) = node.child("trappers") {
            for trapper_node in list.children_named("trapper") {
                snapshot.add_trapper(read_trapper(trapper_node)?)?;
            }
            let max = list.child_text("maxPersistentTrapperID").trim();
            if !max.is_empty() {
                snapshot.set_max_persistent_trapper_id(Some(text_value(list, "maxPersistentTrapperID")?));
            }
            link_trappers(snapshot.trappers())?;
        }

        debug!(age = snapshot.age(), surfaces = snapshot.surfaces().len(), "snapshot imported");
        Ok(snapshot)
    }

    fn surface(&self, node: &Element, project: &Project) -> BasinResult<Surface> {
        let mut surface = Surface::new(
            node.parse::<String>("name")?,
            SubsurfaceKind::from_code(node.parse("subsurfacekind")?)?,
        )?;
        if let Some(age) = node.parse_opt("age")? {
            surface = surface.with_age(age);
        }
        let top = optional_formation(project, node.get("top-formation"))?;
        let bottom = optional_formation(project, node.get("bottom-formation"))?;
        surface.set_formations(top, bottom);

        if let Some(maps) = node.child("propertymaps") {
            for map_node in maps.children_named("propertymap") {
                let (property, map) = self.map(map_node, project)?;
                surface.add_property_data(property, map)?;
            }
        }
        Ok(surface)
    }

    fn map(&self, node: &Element, project: &Project) -> BasinResult<PropertyMap> {
        let property = find_property(project, node)?;
        let (_, geometry) = self.plane(project, node.parse("geom-index")?)?;

        let mut map = match node.parse_opt::<f32>("constantvalue")? {
            Some(value) => MapData::constant(geometry, value),
            None => {
                let store = node
                    .child("datastore")
                    .ok_or_else(|| BasinError::Xml(format!("propertymap {} has no data", property.name())))?;
                MapData::from_blob(geometry, self.descriptor(store, Some(Layout::IJ))?)
            }
        };
        if let Some(undefined) = node.parse_opt("undefinedvalue")? {
            map = map.with_undefined_value(undefined);
        }
        if let (Some(min), Some(max)) = (node.parse_opt("min")?, node.parse_opt("max")?) {
            map.set_stats_hint(min, max);
        }
        map.set_formation(optional_formation(project, node.get("formation"))?);
        if let Some(name) = node.get("reservoir") {
            let id = project
                .find_reservoir(name)
                .ok_or_else(|| BasinError::not_found("reservoir", name))?;
            map.set_reservoir(Some(id));
        }
        Ok((property, map))
    }

    fn volume(&self, node: &Element, project: &mut Project) -> BasinResult<Volume> {
        let mut volume = Volume::new(SubsurfaceKind::from_code(node.parse("subsurfacekind")?)?);
        let Some(list) = node.child("propertyvols") else {
            return Ok(volume);
        };
        for data_node in list.children_named("propertyvol") {
            let property = find_property(project, data_node)?;
            let (plane, _) = self.plane(project, data_node.parse("geom-index")?)?;
            let geometry = project
                .geometries_mut()
                .volume(plane, data_node.parse("numK")?, data_node.parse("firstK")?)?
                .ok_or_else(|| BasinError::Format("volume geometry has no plane".into()))?;

            let mut data = match data_node.parse_opt::<f32>("constantvalue")? {
                Some(value) => VolumeData::constant(geometry, value),
                None => {
                    let descriptors = data_node
                        .children_named("datastore")
                        .map(|store| {
                            let ijk = store.get("dataIJK").is_none() || store.flag("dataIJK")?;
                            self.descriptor(store, Some(if ijk { Layout::IJK } else { Layout::KIJ }))
                        })
                        .collect::<BasinResult<Vec<_>>>()?;
                    if descriptors.is_empty() {
                        return Err(BasinError::Xml(format!("propertyvol {} has no data", property.name())));
                    }
                    VolumeData::from_blobs(geometry, descriptors)
                }
            };
            if let Some(undefined) = data_node.parse_opt("undefinedvalue")? {
                data = data.with_undefined_value(undefined);
            }
            if let (Some(min), Some(max)) = (data_node.parse_opt("min")?, data_node.parse_opt("max")?) {
                data.set_stats_hint(min, max);
            }
            volume.add_property_data(property, data)?;
        }
        Ok(volume)
    }

    /// Blob range named by a `<datastore>`. Relative files resolve against
    /// the output directory; `partialpath="false"` marks an absolute one.
    fn descriptor(&self, store: &Element, layout: Option<Layout>) -> BasinResult<BlobDescriptor> {
        let file: String = store.parse("file")?;
        let path = if store.get("partialpath") == Some("false") {
            PathBuf::from(file)
        } else {
            self.base_dir.join(file)
        };
        let mut descriptor = BlobDescriptor::new(
            path,
            store.parse("offset")?,
            store.parse("size")?,
            store.parse_opt::<Compression>("compression")?.unwrap_or_default(),
        );
        descriptor.layout = layout;
        descriptor.checksum = store.parse_opt("checksum")?;
        Ok(descriptor)
    }
}

fn formation_nodes(root: &Element) -> impl Iterator<Item = &Element> {
    root.child("formations")
        .into_iter()
        .flat_map(|list| list.children_named("formation"))
}

fn read_geometry(node: &Element) -> BasinResult<Geometry2D> {
    Ok(Geometry2D::new(
        node.parse("numI")?,
        node.parse("numJ")?,
        node.parse("deltaI")?,
        node.parse("deltaJ")?,
        node.parse("minI")?,
        node.parse("minJ")?,
    )
    .with_cell_centered(node.flag("cell-centered")?))
}

fn read_trapper(node: &Element) -> BasinResult<Trapper> {
    let mut trapper = Trapper::new(node.parse("id")?, node.parse("persistentID")?)?;
    trapper.reservoir_name = node.get("reservoirname").unwrap_or_default().to_owned();
    trapper.depth = node.parse("depth")?;
    trapper.spill_depth = node.parse("spillDepth")?;
    trapper.position = (node.parse("posX")?, node.parse("posY")?);
    trapper.spill_position = (node.parse("spillPosX")?, node.parse("spillPosY")?);
    trapper.goc = node.parse("goc")?;
    trapper.owc = node.parse("owc")?;
    trapper.set_downstream_code(node.parse_opt("downstreamtrapper")?.unwrap_or(-1));
    Ok(trapper)
}

fn find_property(project: &Project, node: &Element) -> BasinResult<Arc<Property>> {
    let name: String = node.parse("property")?;
    project
        .find_property(&name)
        .cloned()
        .ok_or_else(|| BasinError::not_found("property", name))
}

fn find_formation(project: &Project, name: &str) -> BasinResult<FormationId> {
    project
        .find_formation(name)
        .ok_or_else(|| BasinError::not_found("formation", name))
}

fn optional_formation(project: &Project, name: Option<&str>) -> BasinResult<Option<FormationId>> {
    name.map(|n| find_formation(project, n)).transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use basinio_data::DataUnit;
    use basinio_model::records::{MigrationEvent, TrapperRecord};
    use basinio_sched::retrieve_all;
    use basinio_store::BlobWriter;
    use basinio_types::Geometry3D;

    use super::*;
    use crate::config::ExportConfig;
    use crate::export::{export_project, snapshot_volumes_file};

    fn depth_property() -> Property {
        Property::new("Depth", "Depth", "Depth", "m", PropertyType::Formation, PropertyAttribute::Continuous3D).unwrap()
    }

    fn temperature_property() -> Property {
        Property::new("Temperature", "Temperature", "Temperature", "C", PropertyType::Formation, PropertyAttribute::Continuous3D)
            .unwrap()
    }

    fn plane() -> Geometry2D {
        Geometry2D::new(2, 2, 50.0, 50.0, 1000.0, 2000.0)
    }

    /// Project with two snapshots, formation volumes, surfaces, trappers
    /// and record tables.
    fn sample_project() -> Project {
        let mut project = Project::new(ProjectInfo::new("Basin", ModellingMode::ThreeD)).unwrap();
        project.info_mut().description = "round trip".into();
        project.info_mut().team = "modelling".into();
        let depth = project.add_property(depth_property());
        let temperature = project.add_property(temperature_property());
        let (_, geometry) = project.geometries_mut().share(plane());

        let upper = project.add_formation(Formation::new("Upper", 0, 2).unwrap()).unwrap();
        let lower = project.add_formation(Formation::new("Lower", 2, 4).unwrap()).unwrap();
        project.add_reservoir(Reservoir::new("Res1", lower).unwrap()).unwrap();
        project.stratigraphy_mut().push(StratigraphyEntry::Surface { name: "Top".into(), age: Some(0.0) });
        project.stratigraphy_mut().push(StratigraphyEntry::Formation(upper));

        project.records.migration_events.push(MigrationEvent {
            source_age: 10.0,
            destination_reservoir_name: "Res1".into(),
            mass_c1: 1.5,
            ..MigrationEvent::default()
        });
        project.records.trappers.push(TrapperRecord {
            id: 4,
            persistent_id: 7,
            ..TrapperRecord::default()
        });

        for (age, offset) in [(0.0, 0.0f32), (5.5, 100.0)] {
            let mut snapshot = SnapShot::new(age, SnapShotKind::System, age > 0.0).unwrap();
            let mut surface = Surface::new("Top", SubsurfaceKind::Sediment).unwrap().with_age(0.0);
            surface.set_formations(None, Some(upper));
            surface
                .add_property_data(
                    Arc::clone(&depth),
                    MapData::from_values(Arc::clone(&geometry), &[offset, offset + 1.0, offset + 2.0, offset + 3.0])
                        .unwrap(),
                )
                .unwrap();
            let mut constant = MapData::constant(Arc::clone(&geometry), 42.0);
            constant.set_formation(Some(upper));
            surface.add_property_data(Arc::clone(&temperature), constant).unwrap();
            snapshot.add_surface(surface).unwrap();

            for (formation, first_k) in [(upper, 0), (lower, 2)] {
                let geometry = project
                    .geometries_mut()
                    .share_volume(Geometry3D::new(plane(), 3, first_k).unwrap())
                    .1;
                let values: Vec<f32> = (0..12).map(|v| offset + v as f32).collect();
                let mut volume = Volume::new(SubsurfaceKind::Sediment);
                volume
                    .add_property_data(Arc::clone(&temperature), VolumeData::from_ijk(geometry, &values).unwrap())
                    .unwrap();
                snapshot.add_formation_volume(formation, volume).unwrap();
            }

            let mut first = Trapper::new(1, 10).unwrap();
            first.reservoir_name = "Res1".into();
            first.depth = 1500.0;
            first.set_downstream_code(11);
            snapshot.add_trapper(first).unwrap();
            snapshot.add_trapper(Trapper::new(2, 11).unwrap()).unwrap();
            snapshot.set_max_persistent_trapper_id(Some(11));
            project.add_snapshot(snapshot).unwrap();
        }
        project
    }

    fn export_to(dir: &Path, project: &mut Project, config: &ExportConfig) -> PathBuf {
        let xml = dir.join("basin.xml");
        export_project(project, &xml, config, None).unwrap();
        xml
    }

    #[test]
    fn round_trip_preserves_metadata_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut original = sample_project();
        let xml = export_to(dir.path(), &mut original, &ExportConfig::default());

        let mut imported = import_project(&xml).unwrap();
        assert_eq!(imported.info().name, "Basin");
        assert_eq!(imported.info().description, "round trip");
        assert_eq!(imported.info().team, "modelling");
        assert_eq!(imported.properties().len(), 2);
        assert_eq!(imported.formations()[1].k_range(), (2, 4));
        assert_eq!(imported.reservoirs()[0].name(), "Res1");
        assert_eq!(imported.stratigraphy().entries().len(), 2);
        assert_eq!(imported.records.migration_events, original.records.migration_events);
        assert_eq!(imported.records.trappers[0].persistent_id, 7);
        assert_eq!(imported.snapshots().len(), 2);

        let snapshot = imported.find_snapshot_mut(5.5).unwrap();
        assert!(snapshot.is_minor());
        assert!(!snapshot.is_retrieved());
        snapshot.retrieve().unwrap();

        let surface = snapshot.find_surface_mut("Top").unwrap();
        assert_eq!(surface.age(), Some(0.0));
        assert!(surface.top_formation().is_none());
        let depth = surface.find_mut("Depth").unwrap();
        assert_eq!(depth.surface_values().unwrap(), &[100.0, 101.0, 102.0, 103.0]);
        assert_eq!(depth.geometry().min_i(), 1000.0);
        let temperature = surface.find("Temperature").unwrap();
        assert_eq!(temperature.constant_value(), Some(42.0));
        assert_eq!(temperature.formation(), Some(FormationId::new(0)));

        let lower = snapshot.formation_volume_mut(FormationId::new(1)).unwrap();
        let data = lower.find_mut("Temperature").unwrap();
        assert_eq!(data.geometry().first_k(), 2);
        assert_eq!(data.value(1, 1, 4).unwrap(), 111.0);
        assert_eq!(data.min_max().unwrap(), (100.0, 111.0));

        assert_eq!(snapshot.trappers().len(), 2);
        let first = &snapshot.trappers()[0];
        assert_eq!(first.depth, 1500.0);
        assert_eq!(snapshot.downstream_trapper(first).map(|t| t.id), Some(2));
        assert_eq!(snapshot.max_persistent_trapper_id(), Some(11));
    }

    #[test]
    fn import_defers_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let xml = export_to(dir.path(), &mut sample_project(), &ExportConfig::default());
        let mut project = import_project(&xml).unwrap();

        let snapshot = &mut project.snapshots_mut()[0];
        let surface = snapshot.find_surface_mut("Top").unwrap();
        let depth = surface.find_mut("Depth").unwrap();
        assert!(!depth.is_retrieved());
        assert_eq!(depth.stats_hint(), Some((0.0, 3.0)));
        assert!(matches!(depth.value(0, 0), Err(BasinError::NotRetrieved { .. })));
    }

    #[test]
    fn empty_project_writes_no_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new(ProjectInfo::new("Empty", ModellingMode::OneD)).unwrap();
        let xml = export_to(dir.path(), &mut project, &ExportConfig::default());

        let root = Element::parse_document(&fs::read_to_string(&xml).unwrap()).unwrap();
        let snapshots = root.child("snapshots").unwrap();
        assert!(snapshots.children.is_empty());
        let blobs = fs::read_dir(dir.path().join("basin_output")).unwrap().count();
        assert_eq!(blobs, 0);

        let imported = import_project(&xml).unwrap();
        assert!(imported.snapshots().is_empty());
        assert_eq!(imported.info().mode, ModellingMode::OneD);
    }

    #[test]
    fn version_mismatch_rejected_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new(ProjectInfo::new("V", ModellingMode::ThreeD)).unwrap();
        let xml = export_to(dir.path(), &mut project, &ExportConfig::default());
        let text = fs::read_to_string(&xml).unwrap();
        let current = format!(r#"major="{XML_VERSION_MAJOR}" minor="{XML_VERSION_MINOR}""#);
        assert!(text.contains(&current));

        for (found, direction) in [(XML_VERSION_MINOR + 1, "forward"), (0, "backward")] {
            let patched = text.replace(&current, &format!(r#"major="{XML_VERSION_MAJOR}" minor="{found}""#));
            fs::write(&xml, patched).unwrap();
            match import_project(&xml) {
                Err(BasinError::IncompatibleVersion { direction: d, .. }) => assert_eq!(d, direction),
                other => panic!("expected version error, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_index_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = import_project(&dir.path().join("absent.xml")).unwrap_err();
        assert!(matches!(err, BasinError::MissingFile(_)));
    }

    #[test]
    fn export_is_identical_across_thread_counts() {
        let mut reference = None;
        for threads in [1, 2, 8] {
            let dir = tempfile::tempdir().unwrap();
            let config = ExportConfig {
                num_threads: threads,
                ..ExportConfig::default()
            };
            let xml = export_to(dir.path(), &mut sample_project(), &config);
            let mut project = import_project(&xml).unwrap();
            let snapshot = &mut project.snapshots_mut()[1];
            snapshot.retrieve_with(threads).unwrap();
            let volume = snapshot.formation_volume_mut(FormationId::new(0)).unwrap();
            let values = volume.find_mut("Temperature").unwrap().values_ijk().unwrap().to_vec();
            match &reference {
                None => reference = Some(values),
                Some(expected) => assert_eq!(&values, expected),
            }
        }
    }

    #[test]
    fn scheduler_loads_many_units_with_any_thread_count() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = Arc::new(plane());
        let mut descriptors = Vec::new();
        for file in 0..3 {
            let mut writer = BlobWriter::open(&dir.path().join(format!("part{file}.bin")), false).unwrap();
            for unit in 0..40 {
                let base = (file * 100 + unit) as f32;
                descriptors.push(writer.add_data(&[base, base + 0.25, base + 0.5, base + 0.75], Some(Layout::IJ), true).unwrap());
            }
            writer.close().unwrap();
        }

        let mut results = Vec::new();
        for threads in [1, 2, 8] {
            let mut maps: Vec<MapData> = descriptors
                .iter()
                .map(|d| MapData::from_blob(Arc::clone(&geometry), d.clone()))
                .collect();
            let units = maps.iter_mut().map(|m| m as &mut dyn DataUnit).collect();
            let stats = retrieve_all(units, threads).unwrap();
            assert_eq!(stats.units, 120);
            assert!(maps.iter().all(MapData::is_retrieved));
            assert!(maps.iter().all(|m| m.loads() == 1));
            let firsts: HashSet<u32> = maps.iter().map(|m| m.value(0, 0).unwrap() as u32).collect();
            assert_eq!(firsts.len(), 120);
            results.push(maps.iter().map(|m| m.value(1, 1).unwrap()).collect::<Vec<_>>());
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], results[2]);
    }

    #[test]
    fn in_place_reexport_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let xml = export_to(dir.path(), &mut sample_project(), &ExportConfig::default());

        let mut project = import_project(&xml).unwrap();
        export_project(&mut project, &xml, &ExportConfig::default(), None).unwrap();
        drop(project);

        let mut again = import_project(&xml).unwrap();
        let snapshot = again.find_snapshot_mut(0.0).unwrap();
        snapshot.retrieve().unwrap();
        let depth = snapshot.find_surface_mut("Top").and_then(|s| s.find_mut("Depth")).unwrap();
        assert_eq!(depth.surface_values().unwrap(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn centered_export_merges_formation_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            center: true,
            num_threads: 2,
            ..ExportConfig::default()
        };
        let xml = export_to(dir.path(), &mut sample_project(), &config);
        let mut project = import_project(&xml).unwrap();

        let snapshot = &mut project.snapshots_mut()[0];
        assert!(snapshot.formation_volumes().is_empty());
        snapshot.retrieve().unwrap();
        let merged = snapshot.volume_mut().and_then(|v| v.find_mut("Temperature")).unwrap();
        assert!(merged.geometry().is_cell_centered());
        assert_eq!((merged.geometry().first_k(), merged.geometry().num_k()), (0, 4));

        let depth = snapshot.find_surface_mut("Top").and_then(|s| s.find_mut("Depth")).unwrap();
        assert!(!depth.geometry().is_cell_centered());
    }

    #[test]
    fn baseline_export_writes_references() {
        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("base");
        let next_dir = dir.path().join("next");
        fs::create_dir_all(&base_dir).unwrap();
        fs::create_dir_all(&next_dir).unwrap();
        let base_xml = export_to(&base_dir, &mut sample_project(), &ExportConfig::default());
        let baseline = import_project(&base_xml).unwrap();

        let next_xml = next_dir.join("basin.xml");
        let stats = export_project(&mut sample_project(), &next_xml, &ExportConfig::default(), Some(&baseline)).unwrap();
        assert!(stats.references > 0);
        assert_eq!(stats.payloads, 0);
        assert!(!next_dir.join("basin_output").join(snapshot_volumes_file(0.0)).exists());

        let text = fs::read_to_string(&next_xml).unwrap();
        assert!(text.contains(r#"partialpath="false""#));

        let mut next = import_project(&next_xml).unwrap();
        let snapshot = next.find_snapshot_mut(5.5).unwrap();
        snapshot.retrieve().unwrap();
        let volume = snapshot.formation_volume_mut(FormationId::new(1)).unwrap();
        assert_eq!(volume.find_mut("Temperature").unwrap().value(0, 0, 2).unwrap(), 100.0);
    }
}
