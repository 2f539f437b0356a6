use basinio_types::FormationId;

/// One row of the stratigraphy table.
#[derive(Clone, Debug, PartialEq)]
pub enum StratigraphyEntry {
    /// A depositional surface, optionally dated.
    Surface { name: String, age: Option<f32> },
    Formation(FormationId),
}

/// Ordered alternation of surfaces and formations, top down.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StratigraphyTable {
    entries: Vec<StratigraphyEntry>,
}

impl StratigraphyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: StratigraphyEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[StratigraphyEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Formations in table order.
    pub fn formations(&self) -> impl Iterator<Item = FormationId> + '_ {
        self.entries.iter().filter_map(|e| match e {
            StratigraphyEntry::Formation(id) => Some(*id),
            StratigraphyEntry::Surface { .. } => None,
        })
    }
}
