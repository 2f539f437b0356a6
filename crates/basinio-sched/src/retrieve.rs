use std::collections::BTreeMap;
use std::path::PathBuf;

use basinio_data::{DataUnit, DatasetFile, RawPart, RawRequest, RawSource};
use basinio_store::BlobReader;
use basinio_types::BasinResult;
use parking_lot::Mutex;
use tracing::debug;

use crate::parallel::FirstError;
use crate::queue::WorkQueue;
use crate::QUEUE_SLOTS_PER_WORKER;

/// Counters from one [`retrieve_all`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrieveStats {
    /// Units made resident.
    pub units: usize,
    /// Distinct backing files opened.
    pub files: usize,
    /// Raw parts read ahead of decoding.
    pub raw_reads: usize,
    /// Threads used, including the caller.
    pub threads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum FileKey {
    Blob(PathBuf),
    Dataset(PathBuf),
}

type Slot<'u, 'a> = Mutex<&'u mut (dyn DataUnit + 'a)>;

enum OpenFile {
    Blob(BlobReader),
    Dataset(Box<dyn DatasetFile>),
}

impl OpenFile {
    fn open(source: &RawSource) -> BasinResult<Self> {
        Ok(match source {
            RawSource::Blob(d) => Self::Blob(BlobReader::open(&d.path)?),
            RawSource::Dataset(d) => Self::Dataset(d.source.open(&d.file)?),
        })
    }

    fn read(&mut self, source: &RawSource) -> BasinResult<RawPart> {
        match (self, source) {
            (Self::Blob(reader), RawSource::Blob(d)) => Ok(RawPart::Stored(reader.read_raw(d)?)),
            (Self::Dataset(file), RawSource::Dataset(d)) => Ok(RawPart::Values(file.read(&d.dataset)?)),
            (_, other) => other.fetch(),
        }
    }
}

/// Make every unit in `units` resident.
///
/// Units that are already retrieved, and reference units, are skipped.
/// Raw reads are grouped by backing file and issued from the calling
/// thread, each file being opened once. A unit is queued for decoding as
/// soon as it reports that all of its parts have arrived; `threads - 1`
/// workers decode queued units while reads continue, and the calling thread
/// joins the final drain. With `threads <= 1` all decoding happens on the
/// calling thread after the reads.
///
/// The first error aborts the batch and is returned.
pub fn retrieve_all(units: Vec<&mut dyn DataUnit>, threads: usize) -> BasinResult<RetrieveStats> {
    let slots: Vec<Slot<'_, '_>> = units
        .into_iter()
        .filter(|unit| !unit.is_retrieved() && !unit.is_reference())
        .map(Mutex::new)
        .collect();
    if slots.is_empty() {
        return Ok(RetrieveStats::default());
    }

    let mut direct = Vec::new();
    let mut groups: BTreeMap<FileKey, Vec<(usize, RawRequest)>> = BTreeMap::new();
    for (index, slot) in slots.iter().enumerate() {
        let requests = slot.lock().raw_requests();
        if requests.is_empty() {
            direct.push(index);
        }
        for request in requests {
            let key = match &request.source {
                RawSource::Blob(d) => FileKey::Blob(d.path.clone()),
                RawSource::Dataset(d) => FileKey::Dataset(d.file.clone()),
            };
            groups.entry(key).or_default().push((index, request));
        }
    }

    let workers = threads.max(1).min(slots.len()).saturating_sub(1);
    let capacity = if workers == 0 {
        slots.len()
    } else {
        workers * QUEUE_SLOTS_PER_WORKER
    };
    debug!(
        units = slots.len(),
        files = groups.len(),
        threads = workers + 1,
        capacity,
        "retrieval batch"
    );

    let queue = WorkQueue::new(capacity);
    let failure = FirstError::default();
    let raw_reads = std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| drain(&queue, &slots, &failure));
        }
        let reads = match prefetch(&direct, &groups, &slots, &queue) {
            Ok(reads) => reads,
            Err(error) => {
                failure.record(error);
                queue.abort();
                0
            }
        };
        queue.close();
        drain(&queue, &slots, &failure);
        reads
    });
    failure.into_result()?;

    Ok(RetrieveStats {
        units: slots.len(),
        files: groups.len(),
        raw_reads,
        threads: workers + 1,
    })
}

/// Read every grouped part and queue units as they complete.
fn prefetch(
    direct: &[usize],
    groups: &BTreeMap<FileKey, Vec<(usize, RawRequest)>>,
    slots: &[Slot<'_, '_>],
    queue: &WorkQueue<usize>,
) -> BasinResult<usize> {
    for &index in direct {
        if queue.push(index).is_err() {
            return Ok(0);
        }
    }

    let mut reads = 0;
    for (key, requests) in groups {
        let Some((_, first)) = requests.first() else {
            continue;
        };
        let mut file = OpenFile::open(&first.source)?;
        for (index, request) in requests {
            let raw = file.read(&request.source)?;
            reads += 1;
            let complete = slots[*index].lock().accept_raw(request.part, raw)?;
            if complete && queue.push(*index).is_err() {
                return Ok(reads);
            }
        }
        debug!(file = ?key, parts = requests.len(), "prefetched file");
    }
    Ok(reads)
}

/// Decode queued units until the queue is closed and empty or aborted.
fn drain(queue: &WorkQueue<usize>, slots: &[Slot<'_, '_>], failure: &FirstError) {
    while let Some(index) = queue.pop() {
        let mut unit = slots[index].lock();
        if let Err(error) = unit.retrieve() {
            debug!(unit = unit.label(), index, %error, "retrieve failed, aborting batch");
            failure.record(error);
            queue.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use basinio_data::{DatasetRef, InMemoryDatasets, MapData, Residency, VolumeData};
    use basinio_store::BlobWriter;
    use basinio_types::{BasinError, Geometry2D, Geometry3D, Layout};

    fn plane() -> Arc<Geometry2D> {
        Arc::new(Geometry2D::new(3, 2, 10.0, 10.0, 0.0, 0.0))
    }

    fn payload(seed: usize) -> Vec<f32> {
        (0..6).map(|n| (seed * 10 + n) as f32).collect()
    }

    /// 120 maps spread over three blob files, every other one compressed.
    fn blob_maps(dir: &Path) -> Vec<MapData> {
        let mut writers: Vec<BlobWriter> = (0..3)
            .map(|f| BlobWriter::open(&dir.join(format!("maps_{f}.bin")), false).unwrap().with_min_bytes_to_compress(0))
            .collect();
        let maps = (0..120)
            .map(|n| {
                let desc = writers[n % 3].add_data(&payload(n), None, n % 2 == 0).unwrap();
                MapData::from_blob(plane(), desc)
            })
            .collect();
        for w in writers {
            w.close().unwrap();
        }
        maps
    }

    #[test]
    fn thread_counts_agree() {
        let dir = tempfile::tempdir().unwrap();
        for threads in [1, 2, 8] {
            let mut maps = blob_maps(dir.path());
            let stats = retrieve_all(maps.iter_mut().map(|m| m as &mut dyn DataUnit).collect(), threads).unwrap();
            assert_eq!(stats.units, 120);
            assert_eq!(stats.files, 3);
            assert_eq!(stats.raw_reads, 120);
            assert_eq!(stats.threads, threads);
            for (n, map) in maps.iter_mut().enumerate() {
                assert_eq!(map.residency(), Residency::Resident);
                assert_eq!(map.loads(), 1);
                assert_eq!(map.surface_values().unwrap(), payload(n).as_slice());
            }
        }
    }

    #[test]
    fn resident_and_reference_units_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut maps = blob_maps(dir.path());
        maps[0].retrieve().unwrap();
        let mut reference = MapData::reference(plane(), maps[1].blob_descriptors()[0].clone());
        let mut constant = MapData::constant(plane(), 1.0);

        let (head, tail) = maps.split_at_mut(2);
        let mut units: Vec<&mut dyn DataUnit> = vec![&mut head[0] as &mut dyn DataUnit, &mut reference, &mut constant];
        units.extend(tail[..3].iter_mut().map(|m| m as &mut dyn DataUnit));
        let stats = retrieve_all(units, 2).unwrap();
        assert_eq!(stats.units, 3);
        assert_eq!(maps[0].loads(), 1);
        assert_eq!(reference.residency(), Residency::Unretrieved);
    }

    #[test]
    fn multi_part_volumes_open_each_file_once() {
        let source = Arc::new(InMemoryDatasets::new());
        for f in 0..3 {
            for v in 0..40 {
                source.insert(format!("f{f}.h5"), format!("/v{v}"), vec![(f * 100 + v) as f32; 6]);
            }
        }
        let geometry = Arc::new(Geometry3D::new((*plane()).clone(), 3, 0).unwrap());
        for threads in [1, 2, 8] {
            let before = source.opens();
            let mut volumes: Vec<VolumeData> = (0..40)
                .map(|v| {
                    let slabs = (0..3)
                        .map(|f| DatasetRef::slab(source.clone(), format!("f{f}.h5"), format!("/v{v}"), f, 1))
                        .collect();
                    VolumeData::from_datasets(Arc::clone(&geometry), slabs)
                })
                .collect();
            let stats = retrieve_all(volumes.iter_mut().map(|v| v as &mut dyn DataUnit).collect(), threads).unwrap();
            assert_eq!(stats.raw_reads, 120);
            assert_eq!(source.opens() - before, 3);
            for (v, volume) in volumes.iter_mut().enumerate() {
                let needle = volume.needle(2, 1).unwrap();
                assert_eq!(needle, &[v as f32, (100 + v) as f32, (200 + v) as f32]);
            }
        }
    }

    #[test]
    fn missing_file_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut maps = blob_maps(dir.path());
        std::fs::remove_file(dir.path().join("maps_1.bin")).unwrap();
        for threads in [1, 4] {
            let err = retrieve_all(maps.iter_mut().map(|m| m as &mut dyn DataUnit).collect(), threads).unwrap_err();
            assert!(matches!(err, BasinError::MissingFile(_)));
        }
    }

    #[test]
    fn unbacked_unit_fails() {
        let mut empty = MapData::new(plane());
        let err = retrieve_all(vec![&mut empty as &mut dyn DataUnit], 1).unwrap_err();
        assert!(matches!(err, BasinError::InvalidArgument(_)));
    }

    #[test]
    fn empty_batch() {
        assert_eq!(retrieve_all(Vec::new(), 8).unwrap(), RetrieveStats::default());
    }

    #[test]
    fn blob_volumes_prefer_ijk() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = Arc::new(Geometry3D::new((*plane()).clone(), 2, 4).unwrap());
        let ijk: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let mut writer = BlobWriter::open(&dir.path().join("vol.bin"), false).unwrap();
        let kij = basinio_data::ijk_to_kij(&geometry, &ijk).unwrap();
        let dk = writer.add_data(&kij, Some(Layout::KIJ), true).unwrap();
        let di = writer.add_data(&ijk, Some(Layout::IJK), true).unwrap();
        writer.close().unwrap();

        let mut volume = VolumeData::from_blobs(geometry, vec![dk, di]);
        let stats = retrieve_all(vec![&mut volume as &mut dyn DataUnit], 1).unwrap();
        assert_eq!(stats.raw_reads, 1);
        assert!(volume.has_data_ijk());
        assert_eq!(volume.value(2, 1, 5).unwrap(), 11.0);
    }
}
