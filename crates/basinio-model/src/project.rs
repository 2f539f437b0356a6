use std::sync::Arc;

use basinio_data::DataUnit;
use basinio_types::{
    BasinError, BasinResult, FormationId, Geometry2D, GeometryId, ModellingMode, Property, ReservoirId,
    XML_VERSION_MAJOR, XML_VERSION_MINOR,
};
use tracing::debug;

use crate::formation::{Formation, Reservoir};
use crate::geometry_table::GeometryTable;
use crate::records::RecordTables;
use crate::snapshot::SnapShot;
use crate::stratigraphy::StratigraphyTable;

/// Descriptive header of a project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub description: String,
    pub team: String,
    pub program_version: String,
    pub mode: ModellingMode,
}

impl ProjectInfo {
    pub fn new(name: impl Into<String>, mode: ModellingMode) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            team: String::new(),
            program_version: String::new(),
            mode,
        }
    }
}

/// Disjoint mutable views into a project, for transforms that rewrite a
/// snapshot while registering new geometries.
pub struct ProjectParts<'a> {
    pub snapshots: &'a mut [SnapShot],
    pub geometries: &'a mut GeometryTable,
    pub formations: &'a mut [Formation],
    pub properties: &'a [Arc<Property>],
}

/// Root of the domain graph.
///
/// Snapshots, formations and reservoirs are unique by identity (age or
/// name); properties and geometries are deduplicated by equality and the
/// existing entry is handed back on a repeated insert.
#[derive(Debug)]
pub struct Project {
    info: ProjectInfo,
    xml_version: (u32, u32),
    snapshots: Vec<SnapShot>,
    properties: Vec<Arc<Property>>,
    formations: Vec<Formation>,
    reservoirs: Vec<Reservoir>,
    geometries: GeometryTable,
    stratigraphy: StratigraphyTable,
    /// Auxiliary fixed-size record tables.
    pub records: RecordTables,
}

impl Project {
    pub fn new(info: ProjectInfo) -> BasinResult<Self> {
        if info.name.is_empty() {
            return Err(BasinError::InvalidArgument("project name cannot be empty".into()));
        }
        Ok(Self {
            info,
            xml_version: (XML_VERSION_MAJOR, XML_VERSION_MINOR),
            snapshots: Vec::new(),
            properties: Vec::new(),
            formations: Vec::new(),
            reservoirs: Vec::new(),
            geometries: GeometryTable::new(),
            stratigraphy: StratigraphyTable::new(),
            records: RecordTables::default(),
        })
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut ProjectInfo {
        &mut self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Version of the XML index this project was read from.
    pub fn xml_version(&self) -> (u32, u32) {
        self.xml_version
    }

    pub fn set_xml_version(&mut self, major: u32, minor: u32) {
        self.xml_version = (major, minor);
    }

    pub fn add_snapshot(&mut self, snapshot: SnapShot) -> BasinResult<()> {
        if self.find_snapshot(snapshot.age()).is_some() {
            return Err(BasinError::Duplicate(format!("snapshot at age {}", snapshot.age())));
        }
        debug!(age = snapshot.age(), "snapshot added");
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn snapshots(&self) -> &[SnapShot] {
        &self.snapshots
    }

    pub fn snapshots_mut(&mut self) -> &mut [SnapShot] {
        &mut self.snapshots
    }

    pub fn find_snapshot(&self, age: f64) -> Option<&SnapShot> {
        self.snapshots.iter().find(|s| s.age() == age)
    }

    pub fn find_snapshot_mut(&mut self, age: f64) -> Option<&mut SnapShot> {
        self.snapshots.iter_mut().find(|s| s.age() == age)
    }

    /// Register `property`, returning the stored handle. A property equal
    /// by name to one already present yields the existing handle.
    pub fn add_property(&mut self, property: Property) -> Arc<Property> {
        if let Some(existing) = self.properties.iter().find(|p| ***p == property) {
            return Arc::clone(existing);
        }
        let shared = Arc::new(property);
        self.properties.push(Arc::clone(&shared));
        shared
    }

    pub fn properties(&self) -> &[Arc<Property>] {
        &self.properties
    }

    pub fn find_property(&self, name: &str) -> Option<&Arc<Property>> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn add_formation(&mut self, formation: Formation) -> BasinResult<FormationId> {
        if self.find_formation(formation.name()).is_some() {
            return Err(BasinError::Duplicate(format!("formation {}", formation.name())));
        }
        self.formations.push(formation);
        Ok(FormationId::new(self.formations.len() - 1))
    }

    pub fn formations(&self) -> &[Formation] {
        &self.formations
    }

    pub fn formations_mut(&mut self) -> &mut [Formation] {
        &mut self.formations
    }

    pub fn formation(&self, id: FormationId) -> Option<&Formation> {
        self.formations.get(id.index())
    }

    pub fn find_formation(&self, name: &str) -> Option<FormationId> {
        self.formations.iter().position(|f| f.name() == name).map(FormationId::new)
    }

    /// Resolve a formation id to a name for messages and serialization.
    pub fn formation_name(&self, id: FormationId) -> BasinResult<&str> {
        self.formation(id)
            .map(Formation::name)
            .ok_or_else(|| BasinError::not_found("formation", format!("#{}", id.index())))
    }

    pub fn add_reservoir(&mut self, reservoir: Reservoir) -> BasinResult<ReservoirId> {
        if self.find_reservoir(reservoir.name()).is_some() {
            return Err(BasinError::Duplicate(format!("reservoir {}", reservoir.name())));
        }
        if self.formation(reservoir.formation()).is_none() {
            return Err(BasinError::not_found(
                "formation",
                format!("#{} of reservoir {}", reservoir.formation().index(), reservoir.name()),
            ));
        }
        self.reservoirs.push(reservoir);
        Ok(ReservoirId::new(self.reservoirs.len() - 1))
    }

    pub fn reservoirs(&self) -> &[Reservoir] {
        &self.reservoirs
    }

    pub fn reservoir(&self, id: ReservoirId) -> Option<&Reservoir> {
        self.reservoirs.get(id.index())
    }

    pub fn find_reservoir(&self, name: &str) -> Option<ReservoirId> {
        self.reservoirs.iter().position(|r| r.name() == name).map(ReservoirId::new)
    }

    /// Register a plane geometry; a structurally equal one returns the
    /// index handed out first.
    pub fn add_geometry(&mut self, geometry: Geometry2D) -> GeometryId {
        self.geometries.add(geometry)
    }

    pub fn geometries(&self) -> &GeometryTable {
        &self.geometries
    }

    pub fn geometries_mut(&mut self) -> &mut GeometryTable {
        &mut self.geometries
    }

    pub fn stratigraphy(&self) -> &StratigraphyTable {
        &self.stratigraphy
    }

    pub fn stratigraphy_mut(&mut self) -> &mut StratigraphyTable {
        &mut self.stratigraphy
    }

    pub fn parts_mut(&mut self) -> ProjectParts<'_> {
        ProjectParts {
            snapshots: &mut self.snapshots,
            geometries: &mut self.geometries,
            formations: &mut self.formations,
            properties: &self.properties,
        }
    }

    /// Formation input maps that still have to be read.
    pub fn formation_units_mut(&mut self) -> Vec<&mut dyn DataUnit> {
        self.formations
            .iter_mut()
            .flat_map(Formation::retrievable_units_mut)
            .collect()
    }

    /// Release every resident buffer of the graph.
    pub fn release(&mut self) {
        for snapshot in &mut self.snapshots {
            snapshot.release();
        }
        for formation in &mut self.formations {
            formation.release();
        }
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basinio_types::{PropertyAttribute, PropertyType, SnapShotKind};

    fn project() -> Project {
        Project::new(ProjectInfo::new("Acquifer", ModellingMode::ThreeD)).unwrap()
    }

    fn property(name: &str, unit: &str) -> Property {
        Property::new(name, name, name, unit, PropertyType::Formation, PropertyAttribute::Continuous3D).unwrap()
    }

    #[test]
    fn empty_name_rejected() {
        assert!(Project::new(ProjectInfo::new("", ModellingMode::OneD)).is_err());
    }

    #[test]
    fn geometry_dedup() {
        let mut project = project();
        let a = project.add_geometry(Geometry2D::new(10, 10, 100.0, 100.0, 0.0, 0.0));
        let b = project.add_geometry(Geometry2D::new(10, 10, 100.0, 100.0, 0.0, 0.0));
        let c = project.add_geometry(Geometry2D::new(11, 10, 100.0, 100.0, 0.0, 0.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(project.geometries().len(), 2);
    }

    #[test]
    fn property_dedup_returns_existing() {
        let mut project = project();
        let first = project.add_property(property("Temperature", "C"));
        let second = project.add_property(property("Temperature", "K"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.unit(), "C");
        assert_eq!(project.properties().len(), 1);
        assert!(project.find_property("Temperature").is_some());
        assert!(project.find_property("Pressure").is_none());
    }

    #[test]
    fn identity_duplicates_rejected() {
        let mut project = project();
        project.add_snapshot(SnapShot::new(0.0, SnapShotKind::System, false).unwrap()).unwrap();
        assert!(project.add_snapshot(SnapShot::new(0.0, SnapShotKind::UserDefined, true).unwrap()).is_err());

        let id = project.add_formation(Formation::new("Mantle", 0, 3).unwrap()).unwrap();
        assert!(project.add_formation(Formation::new("Mantle", 4, 5).unwrap()).is_err());
        assert_eq!(project.find_formation("Mantle"), Some(id));
        assert_eq!(project.formation_name(id).unwrap(), "Mantle");

        let res = project.add_reservoir(Reservoir::new("Res1", id).unwrap()).unwrap();
        assert!(project.add_reservoir(Reservoir::new("Res1", id).unwrap()).is_err());
        assert_eq!(project.find_reservoir("Res1"), Some(res));
        assert!(project
            .add_reservoir(Reservoir::new("Res2", FormationId::new(9)).unwrap())
            .is_err());
    }

    #[test]
    fn snapshots_keep_insertion_order() {
        let mut project = project();
        for age in [10.0, 0.0, 5.5] {
            project.add_snapshot(SnapShot::new(age, SnapShotKind::System, false).unwrap()).unwrap();
        }
        let ages: Vec<f64> = project.snapshots().iter().map(SnapShot::age).collect();
        assert_eq!(ages, vec![10.0, 0.0, 5.5]);
        assert!(project.find_snapshot(5.5).is_some());
    }
}
