use std::sync::Arc;

use basinio_data::{DataUnit, MapData};
use basinio_types::{BasinError, BasinResult, FormationId, Property, SubsurfaceKind};

use crate::formation::PropertyMap;

/// Property name whose data holds depth.
pub const DEPTH_PROPERTY: &str = "Depth";

/// A named horizon carrying one map per property.
#[derive(Debug)]
pub struct Surface {
    name: String,
    kind: SubsurfaceKind,
    age: Option<f32>,
    data: Vec<PropertyMap>,
    top_formation: Option<FormationId>,
    bottom_formation: Option<FormationId>,
}

impl Surface {
    pub fn new(name: impl Into<String>, kind: SubsurfaceKind) -> BasinResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BasinError::InvalidArgument("surface name cannot be empty".into()));
        }
        Ok(Self {
            name,
            kind,
            age: None,
            data: Vec::new(),
            top_formation: None,
            bottom_formation: None,
        })
    }

    pub fn with_age(mut self, age: f32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SubsurfaceKind {
        self.kind
    }

    pub fn age(&self) -> Option<f32> {
        self.age
    }

    pub fn top_formation(&self) -> Option<FormationId> {
        self.top_formation
    }

    pub fn bottom_formation(&self) -> Option<FormationId> {
        self.bottom_formation
    }

    pub fn set_formations(&mut self, top: Option<FormationId>, bottom: Option<FormationId>) {
        self.top_formation = top;
        self.bottom_formation = bottom;
    }

    /// Append a property map; a property can appear once per surface.
    pub fn add_property_data(&mut self, property: Arc<Property>, map: MapData) -> BasinResult<()> {
        if self.data.iter().any(|(p, _)| *p == property) {
            return Err(BasinError::Duplicate(format!(
                "property {} on surface {}",
                property.name(),
                self.name
            )));
        }
        self.data.push((property, map));
        Ok(())
    }

    pub fn property_data(&self) -> &[PropertyMap] {
        &self.data
    }

    pub fn property_data_mut(&mut self) -> &mut [PropertyMap] {
        &mut self.data
    }

    /// Release the map at `index` and put `pair` in its place.
    pub fn replace_at(&mut self, index: usize, pair: PropertyMap) -> BasinResult<()> {
        let len = self.data.len();
        let slot = self.data.get_mut(index).ok_or_else(|| {
            BasinError::InvalidArgument(format!("index {index} out of range for {len} surface maps"))
        })?;
        slot.1.release();
        *slot = pair;
        Ok(())
    }

    pub fn find(&self, property: &str) -> Option<&MapData> {
        self.data.iter().find(|(p, _)| p.name() == property).map(|(_, m)| m)
    }

    pub fn find_mut(&mut self, property: &str) -> Option<&mut MapData> {
        self.data.iter_mut().find(|(p, _)| p.name() == property).map(|(_, m)| m)
    }

    /// The map of the `Depth` property, if present.
    pub fn depth_map(&self) -> Option<&MapData> {
        self.find(DEPTH_PROPERTY)
    }

    pub fn is_retrieved(&self) -> bool {
        self.data.iter().all(|(_, m)| m.is_retrieved())
    }

    pub fn retrieve(&mut self) -> BasinResult<()> {
        for (_, map) in &mut self.data {
            if !map.is_retrieved() && !map.is_reference() {
                map.retrieve()?;
            }
        }
        Ok(())
    }

    pub fn release(&mut self) {
        for (_, map) in &mut self.data {
            map.release();
        }
    }

    pub(crate) fn collect_units<'a>(&'a mut self, units: &mut Vec<&'a mut dyn DataUnit>) {
        for (_, map) in &mut self.data {
            units.push(map);
        }
    }
}
