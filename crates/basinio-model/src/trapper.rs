use basinio_types::{BasinError, BasinResult};
use serde::{Deserialize, Serialize};

/// A hydrocarbon trap element at one snapshot.
///
/// `persistent_id` identifies the same trap across snapshots; the
/// downstream link refers to another trapper's persistent id within the
/// same snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trapper {
    pub id: i32,
    pub persistent_id: i32,
    pub reservoir_name: String,
    pub depth: f32,
    pub spill_depth: f32,
    pub position: (f32, f32),
    pub spill_position: (f32, f32),
    pub goc: f32,
    pub owc: f32,
    pub downstream: Option<i32>,
}

impl Trapper {
    pub fn new(id: i32, persistent_id: i32) -> BasinResult<Self> {
        if persistent_id < 0 {
            return Err(BasinError::InvalidArgument(format!(
                "trapper {id}: persistent id {persistent_id} is negative"
            )));
        }
        Ok(Self {
            id,
            persistent_id,
            reservoir_name: String::new(),
            depth: 0.0,
            spill_depth: 0.0,
            position: (0.0, 0.0),
            spill_position: (0.0, 0.0),
            goc: 0.0,
            owc: 0.0,
            downstream: None,
        })
    }

    /// Downstream persistent id in its serialized form (-1 for none).
    pub fn downstream_code(&self) -> i32 {
        self.downstream.unwrap_or(-1)
    }

    pub fn set_downstream_code(&mut self, code: i32) {
        self.downstream = (code >= 0).then_some(code);
    }
}

/// Resolve downstream links within one snapshot.
///
/// Returns, for each trapper, the position of its downstream trapper in
/// `trappers`. Fails when a link names a persistent id that is absent.
pub fn link_trappers(trappers: &[Trapper]) -> BasinResult<Vec<Option<usize>>> {
    trappers
        .iter()
        .map(|t| match t.downstream {
            None => Ok(None),
            Some(target) => trappers
                .iter()
                .position(|o| o.persistent_id == target)
                .map(Some)
                .ok_or_else(|| BasinError::not_found("downstream trapper", target.to_string())),
        })
        .collect()
}
