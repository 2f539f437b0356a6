use basinio_data::DataUnit;
use basinio_sched::{retrieve_all, RetrieveStats};
use basinio_types::{BasinError, BasinResult, FormationId, SnapShotKind};
use tracing::debug;

use crate::surface::Surface;
use crate::trapper::Trapper;
use crate::volume::{Volume, VolumeRef};

/// One simulated time slice.
///
/// The snapshot owns every data unit reachable from it and is the unit of
/// retrieve and release.
#[derive(Debug)]
pub struct SnapShot {
    age: f64,
    kind: SnapShotKind,
    is_minor: bool,
    surfaces: Vec<Surface>,
    volume: Option<Volume>,
    formation_volumes: Vec<(FormationId, Volume)>,
    trappers: Vec<Trapper>,
    max_persistent_trapper_id: Option<i32>,
}

impl SnapShot {
    /// Create an empty snapshot; `age` must be finite and not negative.
    pub fn new(age: f64, kind: SnapShotKind, is_minor: bool) -> BasinResult<Self> {
        if !age.is_finite() || age < 0.0 {
            return Err(BasinError::InvalidArgument(format!("snapshot age {age} must be >= 0")));
        }
        Ok(Self {
            age,
            kind,
            is_minor,
            surfaces: Vec::new(),
            volume: None,
            formation_volumes: Vec::new(),
            trappers: Vec::new(),
            max_persistent_trapper_id: None,
        })
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn kind(&self) -> SnapShotKind {
        self.kind
    }

    pub fn is_minor(&self) -> bool {
        self.is_minor
    }

    pub fn add_surface(&mut self, surface: Surface) -> BasinResult<()> {
        if self.find_surface(surface.name()).is_some() {
            return Err(BasinError::Duplicate(format!("surface {}", surface.name())));
        }
        self.surfaces.push(surface);
        Ok(())
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut [Surface] {
        &mut self.surfaces
    }

    pub fn find_surface(&self, name: &str) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.name() == name)
    }

    pub fn find_surface_mut(&mut self, name: &str) -> Option<&mut Surface> {
        self.surfaces.iter_mut().find(|s| s.name() == name)
    }

    /// Set the continuous volume, returning the one it replaces.
    pub fn set_volume(&mut self, volume: Option<Volume>) -> Option<Volume> {
        std::mem::replace(&mut self.volume, volume)
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    pub fn volume_mut(&mut self) -> Option<&mut Volume> {
        self.volume.as_mut()
    }

    pub fn add_formation_volume(&mut self, formation: FormationId, volume: Volume) -> BasinResult<()> {
        if self.formation_volume(formation).is_some() {
            return Err(BasinError::Duplicate(format!("volume of formation #{}", formation.index())));
        }
        self.formation_volumes.push((formation, volume));
        Ok(())
    }

    pub fn formation_volumes(&self) -> &[(FormationId, Volume)] {
        &self.formation_volumes
    }

    pub fn formation_volumes_mut(&mut self) -> &mut [(FormationId, Volume)] {
        &mut self.formation_volumes
    }

    pub fn formation_volume(&self, formation: FormationId) -> Option<&Volume> {
        self.formation_volumes.iter().find(|(f, _)| *f == formation).map(|(_, v)| v)
    }

    pub fn formation_volume_mut(&mut self, formation: FormationId) -> Option<&mut Volume> {
        self.formation_volumes.iter_mut().find(|(f, _)| *f == formation).map(|(_, v)| v)
    }

    /// Resolve a volume link held by another volume.
    pub fn resolve_volume(&self, volume: VolumeRef) -> Option<&Volume> {
        match volume {
            VolumeRef::Continuous => self.volume(),
            VolumeRef::Formation(id) => self.formation_volume(id),
        }
    }

    /// Both the continuous volume slot and the formation volumes, borrowed
    /// separately.
    pub fn volumes_split_mut(&mut self) -> (&mut Option<Volume>, &mut Vec<(FormationId, Volume)>) {
        (&mut self.volume, &mut self.formation_volumes)
    }

    pub fn add_trapper(&mut self, trapper: Trapper) -> BasinResult<()> {
        if self.trappers.iter().any(|t| t.persistent_id == trapper.persistent_id) {
            return Err(BasinError::Duplicate(format!("trapper with persistent id {}", trapper.persistent_id)));
        }
        self.trappers.push(trapper);
        Ok(())
    }

    pub fn trappers(&self) -> &[Trapper] {
        &self.trappers
    }

    pub fn trappers_mut(&mut self) -> &mut [Trapper] {
        &mut self.trappers
    }

    /// Trapper that `trapper` spills into, resolved by persistent id.
    pub fn downstream_trapper(&self, trapper: &Trapper) -> Option<&Trapper> {
        let target = trapper.downstream?;
        self.trappers.iter().find(|t| t.persistent_id == target)
    }

    /// Highest persistent trapper id handed out so far, as recorded by the
    /// simulator. Falls back to the maximum over the stored trappers.
    pub fn max_persistent_trapper_id(&self) -> Option<i32> {
        self.max_persistent_trapper_id
            .or_else(|| self.trappers.iter().map(|t| t.persistent_id).max())
    }

    pub fn set_max_persistent_trapper_id(&mut self, id: Option<i32>) {
        self.max_persistent_trapper_id = id;
    }

    fn all_units_mut(&mut self) -> Vec<&mut dyn DataUnit> {
        let mut units: Vec<&mut dyn DataUnit> = Vec::new();
        for surface in &mut self.surfaces {
            surface.collect_units(&mut units);
        }
        if let Some(volume) = &mut self.volume {
            volume.collect_units(&mut units);
        }
        for (_, volume) in &mut self.formation_volumes {
            volume.collect_units(&mut units);
        }
        units
    }

    /// Every data unit that still has to be read: not resident and not a
    /// reference.
    pub fn retrievable_units_mut(&mut self) -> Vec<&mut dyn DataUnit> {
        self.all_units_mut()
            .into_iter()
            .filter(|u| !u.is_retrieved() && !u.is_reference())
            .collect()
    }

    /// Number of data units owned by this snapshot.
    pub fn unit_count(&mut self) -> usize {
        self.all_units_mut().len()
    }

    pub fn is_retrieved(&self) -> bool {
        self.surfaces.iter().all(Surface::is_retrieved)
            && self.volume.as_ref().map_or(true, Volume::is_retrieved)
            && self.formation_volumes.iter().all(|(_, v)| v.is_retrieved())
    }

    /// Make every unit resident on the calling thread.
    pub fn retrieve(&mut self) -> BasinResult<()> {
        for surface in &mut self.surfaces {
            surface.retrieve()?;
        }
        if let Some(volume) = &mut self.volume {
            volume.retrieve()?;
        }
        for (_, volume) in &mut self.formation_volumes {
            volume.retrieve()?;
        }
        Ok(())
    }

    /// Make every unit resident through the retrieval scheduler.
    pub fn retrieve_with(&mut self, threads: usize) -> BasinResult<RetrieveStats> {
        let age = self.age;
        let stats = retrieve_all(self.retrievable_units_mut(), threads)?;
        debug!(age, units = stats.units, files = stats.files, threads = stats.threads, "snapshot retrieved");
        Ok(stats)
    }

    pub fn release(&mut self) {
        for surface in &mut self.surfaces {
            surface.release();
        }
        if let Some(volume) = &mut self.volume {
            volume.release();
        }
        for (_, volume) in &mut self.formation_volumes {
            volume.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use basinio_data::{MapData, VolumeData};
    use basinio_store::BlobWriter;
    use basinio_types::{Geometry2D, Geometry3D, Layout, Property, PropertyAttribute, PropertyType, SubsurfaceKind};

    fn property(name: &str) -> Arc<Property> {
        Arc::new(Property::new(name, name, name, "m", PropertyType::Formation, PropertyAttribute::Surface2D).unwrap())
    }

    fn plane() -> Arc<Geometry2D> {
        Arc::new(Geometry2D::new(2, 2, 100.0, 100.0, 0.0, 0.0))
    }

    #[test]
    fn negative_age_rejected() {
        assert!(SnapShot::new(-1.0, SnapShotKind::System, false).is_err());
        assert!(SnapShot::new(f64::NAN, SnapShotKind::System, false).is_err());
        let snapshot = SnapShot::new(0.0, SnapShotKind::System, false).unwrap();
        assert_eq!(snapshot.age(), 0.0);
    }

    #[test]
    fn duplicates_rejected() {
        let mut snapshot = SnapShot::new(10.0, SnapShotKind::UserDefined, true).unwrap();
        snapshot.add_surface(Surface::new("Top", SubsurfaceKind::Sediment).unwrap()).unwrap();
        let err = snapshot.add_surface(Surface::new("Top", SubsurfaceKind::Sediment).unwrap()).unwrap_err();
        assert!(err.to_string().contains("twice"));

        snapshot.add_formation_volume(FormationId::new(0), Volume::new(SubsurfaceKind::Sediment)).unwrap();
        assert!(snapshot.add_formation_volume(FormationId::new(0), Volume::new(SubsurfaceKind::Sediment)).is_err());

        snapshot.add_trapper(Trapper::new(1, 7).unwrap()).unwrap();
        assert!(snapshot.add_trapper(Trapper::new(2, 7).unwrap()).is_err());
    }

    #[test]
    fn retrievable_units_skip_resident_and_references() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BlobWriter::open(&dir.path().join("s.bin"), false).unwrap();
        let desc = writer.add_data(&[1.0, 2.0, 3.0, 4.0], Some(Layout::IJ), false).unwrap();
        writer.close().unwrap();

        let mut surface = Surface::new("Top", SubsurfaceKind::Sediment).unwrap();
        surface.add_property_data(property("Depth"), MapData::from_blob(plane(), desc.clone())).unwrap();
        surface.add_property_data(property("Temperature"), MapData::constant(plane(), 20.0)).unwrap();
        surface.add_property_data(property("Pressure"), MapData::reference(plane(), desc)).unwrap();

        let mut snapshot = SnapShot::new(5.0, SnapShotKind::System, false).unwrap();
        snapshot.add_surface(surface).unwrap();
        assert_eq!(snapshot.unit_count(), 3);
        assert_eq!(snapshot.retrievable_units_mut().len(), 1);

        let stats = snapshot.retrieve_with(2).unwrap();
        assert_eq!(stats.units, 1);
        assert!(snapshot.retrievable_units_mut().is_empty());
        let depth = snapshot.find_surface("Top").unwrap().depth_map().unwrap();
        assert_eq!(depth.value(1, 1).unwrap(), 4.0);

        snapshot.release();
        assert_eq!(snapshot.retrievable_units_mut().len(), 1);
    }

    #[test]
    fn cascades_into_volumes() {
        let geometry = Arc::new(Geometry3D::new((*plane()).clone(), 2, 0).unwrap());
        let mut volume = Volume::new(SubsurfaceKind::Sediment);
        volume
            .add_property_data(property("Porosity"), VolumeData::from_ijk(geometry, &[0.1; 8]).unwrap())
            .unwrap();
        let mut snapshot = SnapShot::new(1.0, SnapShotKind::System, false).unwrap();
        snapshot.add_formation_volume(FormationId::new(3), volume).unwrap();
        assert!(snapshot.is_retrieved());

        snapshot.release();
        assert!(!snapshot.is_retrieved());
        assert!(snapshot.retrieve().is_err());
    }

    #[test]
    fn downstream_resolved_by_persistent_id() {
        let mut snapshot = SnapShot::new(1.0, SnapShotKind::System, false).unwrap();
        let mut upstream = Trapper::new(1, 10).unwrap();
        upstream.downstream = Some(11);
        snapshot.add_trapper(upstream.clone()).unwrap();
        snapshot.add_trapper(Trapper::new(2, 11).unwrap()).unwrap();

        assert_eq!(snapshot.downstream_trapper(&upstream).unwrap().id, 2);
        assert_eq!(snapshot.max_persistent_trapper_id(), Some(11));
        snapshot.set_max_persistent_trapper_id(Some(40));
        assert_eq!(snapshot.max_persistent_trapper_id(), Some(40));
    }
}
