use std::sync::Arc;

use basinio_types::{BasinResult, Geometry2D, Geometry3D, GeometryId};

/// Deduplicating geometry registry.
///
/// Planes are stored once per distinct [`Geometry2D`]; the index returned
/// for a repeated insert is the one handed out the first time. Volume
/// geometries are cached the same way so every data unit over the same
/// k-range shares one allocation.
#[derive(Debug, Default)]
pub struct GeometryTable {
    planes: Vec<Arc<Geometry2D>>,
    volumes: Vec<Arc<Geometry3D>>,
}

impl GeometryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `geometry`, returning its index.
    pub fn add(&mut self, geometry: Geometry2D) -> GeometryId {
        self.share(geometry).0
    }

    /// Register `geometry` and return the shared handle kept by the table.
    pub fn share(&mut self, geometry: Geometry2D) -> (GeometryId, Arc<Geometry2D>) {
        if let Some(id) = self.index_of(&geometry) {
            return (id, Arc::clone(&self.planes[id.index()]));
        }
        let shared = Arc::new(geometry);
        self.planes.push(Arc::clone(&shared));
        (GeometryId::new(self.planes.len() - 1), shared)
    }

    /// Register the plane of `geometry` and return a shared volume handle.
    ///
    /// The returned index is the plane's.
    pub fn share_volume(&mut self, geometry: Geometry3D) -> (GeometryId, Arc<Geometry3D>) {
        let id = self.add(geometry.plane().clone());
        if let Some(existing) = self.volumes.iter().find(|v| ***v == geometry) {
            return (id, Arc::clone(existing));
        }
        let shared = Arc::new(geometry);
        self.volumes.push(Arc::clone(&shared));
        (id, shared)
    }

    /// Build and register a volume geometry over plane `id`.
    pub fn volume(&mut self, id: GeometryId, num_k: usize, first_k: usize) -> BasinResult<Option<Arc<Geometry3D>>> {
        let Some(plane) = self.get(id) else {
            return Ok(None);
        };
        let geometry = Geometry3D::new((**plane).clone(), num_k, first_k)?;
        Ok(Some(self.share_volume(geometry).1))
    }

    pub fn index_of(&self, geometry: &Geometry2D) -> Option<GeometryId> {
        self.planes.iter().position(|g| **g == *geometry).map(GeometryId::new)
    }

    pub fn get(&self, id: GeometryId) -> Option<&Arc<Geometry2D>> {
        self.planes.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Geometry2D>> {
        self.planes.iter()
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(num_i: usize) -> Geometry2D {
        Geometry2D::new(num_i, 4, 100.0, 100.0, 0.0, 0.0)
    }

    #[test]
    fn same_shape_same_index() {
        let mut table = GeometryTable::new();
        let a = table.add(plane(3));
        let b = table.add(plane(3));
        let c = table.add(plane(5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn shared_handles_are_reused() {
        let mut table = GeometryTable::new();
        let (_, first) = table.share(plane(3));
        let (_, second) = table.share(plane(3));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn volumes_share_plane_index() {
        let mut table = GeometryTable::new();
        let id = table.add(plane(3));
        let v1 = table.volume(id, 4, 0).unwrap().unwrap();
        let v2 = table.volume(id, 4, 0).unwrap().unwrap();
        let v3 = table.volume(id, 2, 3).unwrap().unwrap();
        assert!(Arc::ptr_eq(&v1, &v2));
        assert!(!Arc::ptr_eq(&v1, &v3));
        assert_eq!(table.len(), 1);
        assert!(table.volume(GeometryId::new(9), 1, 0).unwrap().is_none());
    }

    #[test]
    fn cell_centering_distinguishes() {
        let mut table = GeometryTable::new();
        let a = table.add(plane(3));
        let b = table.add(plane(3).with_cell_centered(true));
        assert_ne!(a, b);
    }
}
