//! Point location and shape-function interpolation on regular grids.

use basinio_types::Geometry2D;

/// A point inside a grid cell: the cell's lower-left node plus local
/// coordinates in `[-1, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneLocation {
    pub i: usize,
    pub j: usize,
    pub xi: f64,
    pub eta: f64,
}

/// A point inside a volume cell; `k` is an absolute layer index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeLocation {
    pub plane: PlaneLocation,
    pub k: usize,
    pub zeta: f64,
}

/// Natural coordinates of the four corners of a bilinear element, in the
/// order (i,j), (i+1,j), (i+1,j+1), (i,j+1).
pub(crate) const QUAD_CORNERS: [(usize, usize, f64, f64); 4] = [
    (0, 0, -1.0, -1.0),
    (1, 0, 1.0, -1.0),
    (1, 1, 1.0, 1.0),
    (0, 1, -1.0, 1.0),
];

/// Bilinear shape function of a corner at natural coordinates `(ci, cj)`.
pub(crate) fn quad_shape(ci: f64, cj: f64, xi: f64, eta: f64) -> f64 {
    0.25 * (1.0 + ci * xi) * (1.0 + cj * eta)
}

/// Trilinear shape function of a corner at natural coordinates `(ci, cj, ck)`.
pub(crate) fn hex_shape(ci: f64, cj: f64, ck: f64, xi: f64, eta: f64, zeta: f64) -> f64 {
    0.125 * (1.0 + ci * xi) * (1.0 + cj * eta) * (1.0 + ck * zeta)
}

/// Locate physical `(x, y)` on a grid.
///
/// Returns `None` outside the bounding box, on grids with fewer than two
/// nodes in either direction, or when the computed cell falls outside
/// `num_i x num_j`.
pub fn find_plane_location(geometry: &Geometry2D, x: f64, y: f64) -> Option<PlaneLocation> {
    if geometry.num_i() < 2 || geometry.num_j() < 2 {
        return None;
    }
    if x < geometry.min_i() || x > geometry.max_i() || y < geometry.min_j() || y > geometry.max_j() {
        return None;
    }

    let fi = (x - geometry.min_i()) / geometry.delta_i();
    let fj = (y - geometry.min_j()) / geometry.delta_j();
    if !fi.is_finite() || !fj.is_finite() {
        return None;
    }
    // A point on the last node line belongs to the last cell.
    let i = (fi.floor() as usize).min(geometry.num_i() - 2);
    let j = (fj.floor() as usize).min(geometry.num_j() - 2);
    if i + 1 >= geometry.num_i() || j + 1 >= geometry.num_j() {
        return None;
    }

    Some(PlaneLocation {
        i,
        j,
        xi: 2.0 * (fi - i as f64) - 1.0,
        eta: 2.0 * (fj - j as f64) - 1.0,
    })
}
