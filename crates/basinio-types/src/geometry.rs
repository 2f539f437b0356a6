//! Regular grid descriptors.
//!
//! Geometries are immutable value objects. Data units share them through
//! `Arc`, and the project keeps a deduplicated table of every distinct shape.

use serde::{Deserialize, Serialize};

use crate::error::{BasinError, BasinResult};

/// A regular 2D grid: node counts, spacing, origin and centering.
///
/// Two geometries are equal when their counts, spacing, origin and centering
/// flag all match. The maximum coordinates are derived and never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Geometry2D {
    num_i: usize,
    num_j: usize,
    delta_i: f64,
    delta_j: f64,
    min_i: f64,
    min_j: f64,
    cell_centered: bool,
}

impl Geometry2D {
    /// Create a node-centered geometry.
    pub fn new(num_i: usize, num_j: usize, delta_i: f64, delta_j: f64, min_i: f64, min_j: f64) -> Self {
        Self {
            num_i,
            num_j,
            delta_i,
            delta_j,
            min_i,
            min_j,
            cell_centered: false,
        }
    }

    /// Same geometry with the centering flag replaced.
    pub fn with_cell_centered(mut self, cell_centered: bool) -> Self {
        self.cell_centered = cell_centered;
        self
    }

    pub fn num_i(&self) -> usize {
        self.num_i
    }

    pub fn num_j(&self) -> usize {
        self.num_j
    }

    pub fn delta_i(&self) -> f64 {
        self.delta_i
    }

    pub fn delta_j(&self) -> f64 {
        self.delta_j
    }

    pub fn min_i(&self) -> f64 {
        self.min_i
    }

    pub fn min_j(&self) -> f64 {
        self.min_j
    }

    /// Coordinate of the last node along I.
    pub fn max_i(&self) -> f64 {
        self.min_i + self.delta_i * self.num_i.saturating_sub(1) as f64
    }

    /// Coordinate of the last node along J.
    pub fn max_j(&self) -> f64 {
        self.min_j + self.delta_j * self.num_j.saturating_sub(1) as f64
    }

    pub fn is_cell_centered(&self) -> bool {
        self.cell_centered
    }

    /// Number of values in one IJ plane.
    pub fn size(&self) -> usize {
        self.num_i * self.num_j
    }

    /// Row-major index of node `(i, j)`: I varies fastest.
    pub fn index_ij(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.num_i && j < self.num_j, "({i}, {j}) outside {}x{}", self.num_i, self.num_j);
        self.num_i * j + i
    }

    /// The geometry of the cells spanned by this node grid.
    ///
    /// Each cell covers four neighbouring nodes, so both counts shrink by one.
    pub fn cell_centered_counterpart(&self) -> BasinResult<Self> {
        if self.cell_centered {
            return Err(BasinError::InvalidArgument("geometry is already cell-centered".into()));
        }
        if self.num_i < 2 || self.num_j < 2 {
            return Err(BasinError::InvalidArgument(format!(
                "cannot cell-center a {}x{} grid",
                self.num_i, self.num_j
            )));
        }
        Ok(Self {
            num_i: self.num_i - 1,
            num_j: self.num_j - 1,
            cell_centered: true,
            ..self.clone()
        })
    }
}

impl PartialEq for Geometry2D {
    fn eq(&self, other: &Self) -> bool {
        self.num_i == other.num_i
            && self.num_j == other.num_j
            && self.delta_i == other.delta_i
            && self.delta_j == other.delta_j
            && self.min_i == other.min_i
            && self.min_j == other.min_j
            && self.cell_centered == other.cell_centered
    }
}

/// A regular 3D grid: a 2D plane extended with a k-range.
///
/// `first_k` is the offset of this grid's first layer within a possibly
/// larger shared k-ordering; data arrays are always indexed from zero, so
/// every k passed to an index function is shifted by `first_k`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry3D {
    plane: Geometry2D,
    num_k: usize,
    first_k: usize,
}

impl Geometry3D {
    /// Create a 3D geometry; fails when `num_k` is zero.
    pub fn new(plane: Geometry2D, num_k: usize, first_k: usize) -> BasinResult<Self> {
        if num_k == 0 {
            return Err(BasinError::InvalidArgument("numK must be at least 1".into()));
        }
        Ok(Self {
            plane,
            num_k,
            first_k,
        })
    }

    /// The IJ plane of this grid.
    pub fn plane(&self) -> &Geometry2D {
        &self.plane
    }

    pub fn num_i(&self) -> usize {
        self.plane.num_i
    }

    pub fn num_j(&self) -> usize {
        self.plane.num_j
    }

    pub fn num_k(&self) -> usize {
        self.num_k
    }

    pub fn first_k(&self) -> usize {
        self.first_k
    }

    /// Inclusive last layer index: `first_k + num_k - 1`.
    pub fn last_k(&self) -> usize {
        self.first_k + self.num_k - 1
    }

    pub fn is_cell_centered(&self) -> bool {
        self.plane.cell_centered
    }

    /// Total number of values.
    pub fn size(&self) -> usize {
        self.plane.size() * self.num_k
    }

    /// Whether layer `k` falls inside `first_k..=last_k`.
    pub fn contains_k(&self, k: usize) -> bool {
        k >= self.first_k && k <= self.last_k()
    }

    /// Index with I fastest, then J, then K.
    pub fn index_ijk(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(self.contains_k(k), "k={k} outside {}..={}", self.first_k, self.last_k());
        i + j * self.plane.num_i + (k - self.first_k) * self.plane.size()
    }

    /// Index with K fastest, then I, then J.
    pub fn index_kij(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(self.contains_k(k), "k={k} outside {}..={}", self.first_k, self.last_k());
        (k - self.first_k) + i * self.num_k + j * self.plane.num_i * self.num_k
    }

    /// Same grid with a different k-range.
    pub fn with_k_range(&self, first_k: usize, num_k: usize) -> BasinResult<Self> {
        Self::new(self.plane.clone(), num_k, first_k)
    }

    /// Cell geometry of this node grid; every count shrinks by one and
    /// `first_k` is preserved.
    pub fn cell_centered_counterpart(&self) -> BasinResult<Self> {
        if self.num_k < 2 {
            return Err(BasinError::InvalidArgument(format!(
                "cannot cell-center a volume with {} layers",
                self.num_k
            )));
        }
        Ok(Self {
            plane: self.plane.cell_centered_counterpart()?,
            num_k: self.num_k - 1,
            first_k: self.first_k,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plane() -> Geometry2D {
        Geometry2D::new(4, 3, 100.0, 50.0, 1000.0, 2000.0)
    }

    #[test]
    fn derived_maxima() {
        let g = plane();
        assert_eq!(g.max_i(), 1300.0);
        assert_eq!(g.max_j(), 2100.0);
        assert_eq!(g.size(), 12);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(plane(), plane());
        assert_ne!(plane(), Geometry2D::new(5, 3, 100.0, 50.0, 1000.0, 2000.0));
        assert_ne!(plane(), plane().with_cell_centered(true));
    }

    #[test]
    fn map_index_is_row_major() {
        let g = plane();
        assert_eq!(g.index_ij(0, 0), 0);
        assert_eq!(g.index_ij(3, 0), 3);
        assert_eq!(g.index_ij(0, 1), 4);
        assert_eq!(g.index_ij(3, 2), 11);
    }

    #[test]
    fn zero_layers_rejected() {
        assert!(Geometry3D::new(plane(), 0, 0).is_err());
    }

    #[test]
    fn k_range_and_offsets() {
        let g = Geometry3D::new(plane(), 5, 10).unwrap();
        assert_eq!(g.last_k(), 14);
        assert!(g.contains_k(10));
        assert!(!g.contains_k(15));
        assert_eq!(g.index_ijk(0, 0, 10), 0);
        assert_eq!(g.index_ijk(1, 2, 11), 1 + 2 * 4 + 12);
        assert_eq!(g.index_kij(0, 0, 12), 2);
        assert_eq!(g.index_kij(1, 2, 10), 5 + 2 * 4 * 5);
    }

    #[test]
    fn orderings_cover_same_range() {
        let g = Geometry3D::new(Geometry2D::new(3, 2, 1.0, 1.0, 0.0, 0.0), 4, 2).unwrap();
        let mut seen_ijk = vec![false; g.size()];
        let mut seen_kij = vec![false; g.size()];
        for k in g.first_k()..=g.last_k() {
            for j in 0..g.num_j() {
                for i in 0..g.num_i() {
                    seen_ijk[g.index_ijk(i, j, k)] = true;
                    seen_kij[g.index_kij(i, j, k)] = true;
                }
            }
        }
        assert!(seen_ijk.iter().all(|s| *s));
        assert!(seen_kij.iter().all(|s| *s));
    }

    #[test]
    fn cell_centering_shrinks_counts() {
        let g = Geometry3D::new(plane(), 3, 7).unwrap();
        let c = g.cell_centered_counterpart().unwrap();
        assert_eq!((c.num_i(), c.num_j(), c.num_k(), c.first_k()), (3, 2, 2, 7));
        assert!(c.is_cell_centered());
        assert!(c.plane().cell_centered_counterpart().is_err());
        assert!(Geometry2D::new(1, 5, 1.0, 1.0, 0.0, 0.0).cell_centered_counterpart().is_err());
    }

    proptest! {
        #[test]
        fn orderings_are_bijective(num_i in 1usize..6, num_j in 1usize..6, num_k in 1usize..6, first_k in 0usize..20) {
            let g = Geometry3D::new(Geometry2D::new(num_i, num_j, 1.0, 1.0, 0.0, 0.0), num_k, first_k).unwrap();
            let mut hits_ijk = vec![0u8; g.size()];
            let mut hits_kij = vec![0u8; g.size()];
            for k in g.first_k()..=g.last_k() {
                for j in 0..num_j {
                    for i in 0..num_i {
                        hits_ijk[g.index_ijk(i, j, k)] += 1;
                        hits_kij[g.index_kij(i, j, k)] += 1;
                    }
                }
            }
            prop_assert!(hits_ijk.iter().all(|h| *h == 1));
            prop_assert!(hits_kij.iter().all(|h| *h == 1));
        }
    }
}
