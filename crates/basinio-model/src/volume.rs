use std::sync::Arc;

use basinio_data::{DataUnit, VolumeData};
use basinio_types::{BasinError, BasinResult, FormationId, Property, SubsurfaceKind};

use crate::surface::DEPTH_PROPERTY;

/// A property paired with the volume data holding its values.
pub type PropertyVolume = (Arc<Property>, VolumeData);

/// Which volume of a snapshot another volume refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeRef {
    /// The snapshot's continuous volume.
    Continuous,
    /// The volume of a formation.
    Formation(FormationId),
}

/// A set of 3D property fields.
#[derive(Debug)]
pub struct Volume {
    kind: SubsurfaceKind,
    data: Vec<PropertyVolume>,
    depth_volume: Option<VolumeRef>,
}

impl Volume {
    pub fn new(kind: SubsurfaceKind) -> Self {
        Self {
            kind,
            data: Vec::new(),
            depth_volume: None,
        }
    }

    pub fn kind(&self) -> SubsurfaceKind {
        self.kind
    }

    /// Volume holding the depth field for this one, when it lives elsewhere.
    pub fn depth_volume(&self) -> Option<VolumeRef> {
        self.depth_volume
    }

    pub fn set_depth_volume(&mut self, volume: Option<VolumeRef>) {
        self.depth_volume = volume;
    }

    pub fn add_property_data(&mut self, property: Arc<Property>, data: VolumeData) -> BasinResult<()> {
        if self.data.iter().any(|(p, _)| *p == property) {
            return Err(BasinError::Duplicate(format!("volume data for property {}", property.name())));
        }
        self.data.push((property, data));
        Ok(())
    }

    pub fn property_data(&self) -> &[PropertyVolume] {
        &self.data
    }

    pub fn property_data_mut(&mut self) -> &mut [PropertyVolume] {
        &mut self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Release the data at `index` and put `pair` in its place.
    pub fn replace_at(&mut self, index: usize, pair: PropertyVolume) -> BasinResult<()> {
        let len = self.data.len();
        let slot = self.data.get_mut(index).ok_or_else(|| {
            BasinError::InvalidArgument(format!("index {index} out of range for {len} volume entries"))
        })?;
        slot.1.release();
        *slot = pair;
        Ok(())
    }

    /// Release and remove the data of `property`; the last entry takes its
    /// slot.
    pub fn remove_volume_data(&mut self, property: &Property) -> BasinResult<PropertyVolume> {
        let index = self
            .data
            .iter()
            .position(|(p, _)| **p == *property)
            .ok_or_else(|| BasinError::not_found("volume data", property.name()))?;
        self.data[index].1.release();
        Ok(self.data.swap_remove(index))
    }

    pub fn find(&self, property: &str) -> Option<&VolumeData> {
        self.data.iter().find(|(p, _)| p.name() == property).map(|(_, v)| v)
    }

    pub fn find_mut(&mut self, property: &str) -> Option<&mut VolumeData> {
        self.data.iter_mut().find(|(p, _)| p.name() == property).map(|(_, v)| v)
    }

    pub fn depth_data(&self) -> Option<&VolumeData> {
        self.find(DEPTH_PROPERTY)
    }

    pub fn is_retrieved(&self) -> bool {
        self.data.iter().all(|(_, v)| v.is_retrieved())
    }

    pub fn retrieve(&mut self) -> BasinResult<()> {
        for (_, data) in &mut self.data {
            if !data.is_retrieved() && !data.is_reference() {
                data.retrieve()?;
            }
        }
        Ok(())
    }

    pub fn release(&mut self) {
        for (_, data) in &mut self.data {
            data.release();
        }
    }

    pub(crate) fn collect_units<'a>(&'a mut self, units: &mut Vec<&'a mut dyn DataUnit>) {
        for (_, data) in &mut self.data {
            units.push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basinio_types::{Geometry2D, Geometry3D, PropertyAttribute, PropertyType};

    fn property(name: &str) -> Arc<Property> {
        Arc::new(Property::new(name, name, name, "C", PropertyType::Formation, PropertyAttribute::Continuous3D).unwrap())
    }

    fn data(value: f32) -> VolumeData {
        let g = Geometry3D::new(Geometry2D::new(2, 2, 1.0, 1.0, 0.0, 0.0), 2, 0).unwrap();
        VolumeData::from_ijk(Arc::new(g), &[value; 8]).unwrap()
    }

    #[test]
    fn swap_remove_keeps_others() {
        let mut v = Volume::new(SubsurfaceKind::Sediment);
        for (n, name) in ["A", "B", "C"].into_iter().enumerate() {
            v.add_property_data(property(name), data(n as f32)).unwrap();
        }
        let (removed, mut released) = v.remove_volume_data(&property("A")).unwrap();
        assert_eq!(removed.name(), "A");
        assert!(released.values_ijk().is_err());
        let names: Vec<_> = v.property_data().iter().map(|(p, _)| p.name().to_string()).collect();
        assert_eq!(names, vec!["C", "B"]);
        assert!(matches!(
            v.remove_volume_data(&property("A")),
            Err(BasinError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_rejected_and_depth_lookup() {
        let mut v = Volume::new(SubsurfaceKind::None);
        v.add_property_data(property("Depth"), data(1.0)).unwrap();
        assert!(v.add_property_data(property("Depth"), data(2.0)).is_err());
        assert!(v.depth_data().is_some());
        assert!(v.find("Porosity").is_none());
    }

    #[test]
    fn replace_at_swaps_in_place() {
        let mut v = Volume::new(SubsurfaceKind::None);
        v.add_property_data(property("T"), data(1.0)).unwrap();
        v.replace_at(0, (property("T"), data(5.0))).unwrap();
        assert_eq!(v.find("T").unwrap().value(1, 1, 1).unwrap(), 5.0);
    }
}
