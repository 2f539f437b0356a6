use std::sync::Arc;

use basinio_data::{DataUnit, MapData};
use basinio_types::{BasinError, BasinResult, FormationId, Property};
use serde::{Deserialize, Serialize};

/// A property paired with the map holding its values.
pub type PropertyMap = (Arc<Property>, MapData);

/// Scalar simulation settings of a formation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationFlags {
    pub is_source_rock: bool,
    pub is_mobile_layer: bool,
    pub is_igneous_intrusion: bool,
    pub igneous_intrusion_age: Option<f64>,
    pub allochthonous_lithology: bool,
    pub allochthonous_lithology_name: String,
    pub chemical_compaction: bool,
    pub constrained_overpressure: bool,
    pub enable_source_rock_mixing: bool,
    pub depo_sequence: Option<i32>,
    pub element_refinement: Option<i32>,
    pub source_rock_type: String,
    pub source_rock1_name: String,
    pub source_rock2_name: String,
    pub fluid_type: String,
    pub mixing_model: String,
    pub litho_type_names: [String; 3],
}

/// Optional per-formation input maps.
#[derive(Debug, Default)]
pub struct FormationMaps {
    pub thickness: Option<PropertyMap>,
    pub mixing_hi: Option<PropertyMap>,
    pub litho_percentage: [Option<PropertyMap>; 3],
}

impl FormationMaps {
    /// Every present map with its XML element name.
    pub fn named(&self) -> Vec<(&'static str, &PropertyMap)> {
        let mut out = Vec::new();
        if let Some(map) = &self.thickness {
            out.push(("thicknessmap", map));
        }
        if let Some(map) = &self.mixing_hi {
            out.push(("mixingHImap", map));
        }
        for (name, map) in LITHO_MAP_NAMES.iter().zip(&self.litho_percentage) {
            if let Some(map) = map {
                out.push((*name, map));
            }
        }
        out
    }

    /// Slot for the map stored under XML element `name`.
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Option<PropertyMap>> {
        match name {
            "thicknessmap" => Some(&mut self.thickness),
            "mixingHImap" => Some(&mut self.mixing_hi),
            "lithoType1map" => Some(&mut self.litho_percentage[0]),
            "lithoType2map" => Some(&mut self.litho_percentage[1]),
            "lithoType3map" => Some(&mut self.litho_percentage[2]),
            _ => None,
        }
    }

    /// Mutable counterpart of [`Self::named`].
    pub fn named_mut(&mut self) -> Vec<(&'static str, &mut PropertyMap)> {
        let mut out = Vec::new();
        if let Some(map) = &mut self.thickness {
            out.push(("thicknessmap", map));
        }
        if let Some(map) = &mut self.mixing_hi {
            out.push(("mixingHImap", map));
        }
        for (name, map) in LITHO_MAP_NAMES.iter().zip(&mut self.litho_percentage) {
            if let Some(map) = map {
                out.push((*name, map));
            }
        }
        out
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PropertyMap> {
        [&mut self.thickness, &mut self.mixing_hi]
            .into_iter()
            .chain(self.litho_percentage.iter_mut())
            .filter_map(Option::as_mut)
    }
}

pub const LITHO_MAP_NAMES: [&str; 3] = ["lithoType1map", "lithoType2map", "lithoType3map"];

/// A geological layer spanning an inclusive k-range of the merged grid.
///
/// Bounding surfaces are held by name and resolved through a snapshot.
#[derive(Debug)]
pub struct Formation {
    name: String,
    k_start: usize,
    k_end: usize,
    pub flags: FormationFlags,
    pub maps: FormationMaps,
    top_surface: Option<String>,
    bottom_surface: Option<String>,
}

impl Formation {
    pub fn new(name: impl Into<String>, k_start: usize, k_end: usize) -> BasinResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BasinError::InvalidArgument("formation name cannot be empty".into()));
        }
        if k_end < k_start {
            return Err(BasinError::InvalidArgument(format!(
                "formation {name}: k-range {k_start}..={k_end} is reversed"
            )));
        }
        Ok(Self {
            name,
            k_start,
            k_end,
            flags: FormationFlags::default(),
            maps: FormationMaps::default(),
            top_surface: None,
            bottom_surface: None,
        })
    }

    pub fn with_flags(mut self, flags: FormationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inclusive k-range.
    pub fn k_range(&self) -> (usize, usize) {
        (self.k_start, self.k_end)
    }

    pub fn is_source_rock(&self) -> bool {
        self.flags.is_source_rock
    }

    pub fn is_mobile_layer(&self) -> bool {
        self.flags.is_mobile_layer
    }

    pub fn top_surface(&self) -> Option<&str> {
        self.top_surface.as_deref()
    }

    pub fn bottom_surface(&self) -> Option<&str> {
        self.bottom_surface.as_deref()
    }

    pub fn set_top_surface(&mut self, surface: Option<String>) {
        self.top_surface = surface;
    }

    pub fn set_bottom_surface(&mut self, surface: Option<String>) {
        self.bottom_surface = surface;
    }

    /// Maps not yet resident.
    pub fn retrievable_units_mut(&mut self) -> Vec<&mut dyn DataUnit> {
        let mut units: Vec<&mut dyn DataUnit> = Vec::new();
        for (_, map) in self.maps.iter_mut() {
            if !map.is_retrieved() && !map.is_reference() {
                units.push(map);
            }
        }
        units
    }

    pub fn release(&mut self) {
        for (_, map) in self.maps.iter_mut() {
            map.release();
        }
    }
}

/// A named reservoir inside a formation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reservoir {
    name: String,
    formation: FormationId,
}

impl Reservoir {
    pub fn new(name: impl Into<String>, formation: FormationId) -> BasinResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BasinError::InvalidArgument("reservoir name cannot be empty".into()));
        }
        Ok(Self { name, formation })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formation(&self) -> FormationId {
        self.formation
    }
}
