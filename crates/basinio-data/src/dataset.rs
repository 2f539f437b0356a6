//! External float-dataset backing.
//!
//! Grids produced directly by the simulator live in hierarchical dataset
//! files rather than blob files. This crate does not link a dataset library;
//! callers provide a [`DatasetSource`] that opens a file and reads named
//! datasets as flat float arrays.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use basinio_types::{BasinError, BasinResult};
use parking_lot::RwLock;

/// Opens dataset files.
pub trait DatasetSource: Send + Sync + fmt::Debug {
    /// Open a file for reading. A missing file is an error.
    fn open(&self, file: &Path) -> BasinResult<Box<dyn DatasetFile>>;
}

/// An open dataset file.
pub trait DatasetFile {
    /// Read a whole dataset as floats.
    fn read(&mut self, dataset: &str) -> BasinResult<Vec<f32>>;
}

/// Pointer to one dataset covering a k-slab of a grid.
///
/// Map datasets use `first_k = 0` and `num_k = 1`. Volume slabs are stored
/// with I fastest, then J, then K.
#[derive(Clone)]
pub struct DatasetRef {
    pub source: Arc<dyn DatasetSource>,
    pub file: PathBuf,
    pub dataset: String,
    pub first_k: usize,
    pub num_k: usize,
}

impl DatasetRef {
    pub fn map(source: Arc<dyn DatasetSource>, file: impl Into<PathBuf>, dataset: impl Into<String>) -> Self {
        Self::slab(source, file, dataset, 0, 1)
    }

    pub fn slab(
        source: Arc<dyn DatasetSource>,
        file: impl Into<PathBuf>,
        dataset: impl Into<String>,
        first_k: usize,
        num_k: usize,
    ) -> Self {
        Self {
            source,
            file: file.into(),
            dataset: dataset.into(),
            first_k,
            num_k,
        }
    }
}

impl fmt::Debug for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetRef")
            .field("file", &self.file)
            .field("dataset", &self.dataset)
            .field("first_k", &self.first_k)
            .field("num_k", &self.num_k)
            .finish()
    }
}

/// In-memory dataset files, keyed by path and dataset name.
///
/// Intended for tests and for adapters that already hold simulator output in
/// memory. Counts how many times files are opened.
#[derive(Debug, Default)]
pub struct InMemoryDatasets {
    files: RwLock<HashMap<PathBuf, HashMap<String, Arc<Vec<f32>>>>>,
    opens: AtomicUsize,
}

impl InMemoryDatasets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a dataset.
    pub fn insert(&self, file: impl Into<PathBuf>, dataset: impl Into<String>, values: Vec<f32>) {
        self.files
            .write()
            .entry(file.into())
            .or_default()
            .insert(dataset.into(), Arc::new(values));
    }

    /// Number of `open` calls served.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct InMemoryFile {
    path: PathBuf,
    datasets: HashMap<String, Arc<Vec<f32>>>,
}

impl DatasetFile for InMemoryFile {
    fn read(&mut self, dataset: &str) -> BasinResult<Vec<f32>> {
        self.datasets
            .get(dataset)
            .map(|values| values.as_ref().clone())
            .ok_or_else(|| BasinError::not_found("dataset", format!("{}:{dataset}", self.path.display())))
    }
}

impl DatasetSource for InMemoryDatasets {
    fn open(&self, file: &Path) -> BasinResult<Box<dyn DatasetFile>> {
        let files = self.files.read();
        let datasets = files
            .get(file)
            .ok_or_else(|| BasinError::MissingFile(file.to_path_buf()))?
            .clone();
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryFile {
            path: file.to_path_buf(),
            datasets,
        }))
    }
}
