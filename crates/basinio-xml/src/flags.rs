//! Formation simulation flags as `<formation>` attributes.
//!
//! `isSR` and `isML` are always written; every other flag only when it
//! differs from its default.

use basinio_model::FormationFlags;
use basinio_types::BasinResult;

use crate::element::Element;

const LITHO_TYPE_ATTRS: [&str; 3] = ["lithoType1", "lithoType2", "lithoType3"];

pub(crate) fn write_flags(flags: &FormationFlags, node: &mut Element) {
    node.set("isSR", flags.is_source_rock);
    node.set("isML", flags.is_mobile_layer);

    let switches = [
        ("isIgnInt", flags.is_igneous_intrusion),
        ("allochthonous", flags.allochthonous_lithology),
        ("chemCompaction", flags.chemical_compaction),
        ("constrainedOP", flags.constrained_overpressure),
        ("srMixing", flags.enable_source_rock_mixing),
    ];
    for (key, value) in switches {
        if value {
            node.set(key, true);
        }
    }

    if let Some(age) = flags.igneous_intrusion_age {
        node.set("ignIntAge", age);
    }
    if let Some(sequence) = flags.depo_sequence {
        node.set("depoSequence", sequence);
    }
    if let Some(refinement) = flags.element_refinement {
        node.set("elementRefinement", refinement);
    }

    let names = [
        ("allochthonousName", &flags.allochthonous_lithology_name),
        ("srType", &flags.source_rock_type),
        ("sr1Name", &flags.source_rock1_name),
        ("sr2Name", &flags.source_rock2_name),
        ("fluidType", &flags.fluid_type),
        ("mixingModel", &flags.mixing_model),
    ];
    for (key, value) in names.into_iter().chain(LITHO_TYPE_ATTRS.into_iter().zip(&flags.litho_type_names)) {
        if !value.is_empty() {
            node.set(key, value);
        }
    }
}

pub(crate) fn read_flags(node: &Element) -> BasinResult<FormationFlags> {
    let text = |key: &str| node.get(key).unwrap_or_default().to_owned();
    Ok(FormationFlags {
        is_source_rock: node.flag("isSR")?,
        is_mobile_layer: node.flag("isML")?,
        is_igneous_intrusion: node.flag("isIgnInt")?,
        igneous_intrusion_age: node.parse_opt("ignIntAge")?,
        allochthonous_lithology: node.flag("allochthonous")?,
        allochthonous_lithology_name: text("allochthonousName"),
        chemical_compaction: node.flag("chemCompaction")?,
        constrained_overpressure: node.flag("constrainedOP")?,
        enable_source_rock_mixing: node.flag("srMixing")?,
        depo_sequence: node.parse_opt("depoSequence")?,
        element_refinement: node.parse_opt("elementRefinement")?,
        source_rock_type: text("srType"),
        source_rock1_name: text("sr1Name"),
        source_rock2_name: text("sr2Name"),
        fluid_type: text("fluidType"),
        mixing_model: text("mixingModel"),
        litho_type_names: LITHO_TYPE_ATTRS.map(text),
    })
}
