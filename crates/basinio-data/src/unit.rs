//! Lifecycle shared by every data unit.
//!
//! A unit moves through `Unretrieved -> Retrieving -> Resident -> Released`.
//! The backing (blob ranges or dataset slabs) survives release so the unit
//! can be retrieved again. Retrieval is split into a raw phase, where the
//! bytes of each backing part are read (possibly by a scheduler that batches
//! reads per file), and a CPU phase where the unit decodes and lays out its
//! buffer.

use std::path::Path;

use basinio_store::{BlobDescriptor, BlobReader};
use basinio_types::{BasinError, BasinResult, Layout};
use serde::Serialize;

use crate::dataset::DatasetRef;

/// Residency state of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Residency {
    /// Not loaded; may carry a deferred backing.
    Unretrieved,
    /// Some raw parts have been prefetched, decoding not done yet.
    Retrieving,
    /// Buffer or constant available.
    Resident,
    /// Buffer freed; backing kept for another retrieve.
    Released,
}

/// Whether a unit owns its data or only points at bytes of another export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum UnitKind {
    Native,
    Reference,
}

/// Deferred source of a unit's values.
#[derive(Clone, Debug, Default)]
pub enum Backing {
    #[default]
    None,
    /// Blob ranges; volumes may carry one per ordering.
    Blob(Vec<BlobDescriptor>),
    /// Dataset slabs stitched in k order.
    Datasets(Vec<DatasetRef>),
}

/// One raw input a unit needs before it can decode.
#[derive(Clone, Debug)]
pub struct RawRequest {
    /// Slot the bytes are delivered to via `accept_raw`.
    pub part: usize,
    pub source: RawSource,
}

/// Where a raw part comes from.
#[derive(Clone, Debug)]
pub enum RawSource {
    Blob(BlobDescriptor),
    Dataset(DatasetRef),
}

impl RawSource {
    /// File the part lives in; requests are grouped by it.
    pub fn file(&self) -> &Path {
        match self {
            Self::Blob(d) => &d.path,
            Self::Dataset(d) => &d.file,
        }
    }

    /// Read this part on the calling thread, opening its file.
    pub fn fetch(&self) -> BasinResult<RawPart> {
        match self {
            Self::Blob(d) => Ok(RawPart::Stored(BlobReader::open(&d.path)?.read_raw(d)?)),
            Self::Dataset(d) => {
                let mut file = d.source.open(&d.file)?;
                Ok(RawPart::Values(file.read(&d.dataset)?))
            }
        }
    }
}

/// Raw bytes of one part, before decoding.
#[derive(Debug)]
pub enum RawPart {
    /// Stored blob bytes, possibly compressed.
    Stored(Vec<u8>),
    /// Values read from a dataset.
    Values(Vec<f32>),
}

/// Common surface used by the retrieval scheduler.
pub trait DataUnit: Send {
    /// Short name of the unit kind, for messages.
    fn label(&self) -> &'static str;

    fn residency(&self) -> Residency;

    fn kind(&self) -> UnitKind;

    fn is_reference(&self) -> bool {
        self.kind() == UnitKind::Reference
    }

    /// Resident buffer or constant available.
    fn is_retrieved(&self) -> bool {
        self.residency() == Residency::Resident
    }

    /// Raw inputs still needed to become resident. Empty when resident,
    /// when the unit is a reference, or when it has no backing.
    fn raw_requests(&self) -> Vec<RawRequest>;

    /// Deliver a prefetched part. Returns `true` once every part is present.
    fn accept_raw(&mut self, part: usize, raw: RawPart) -> BasinResult<bool>;

    /// Become resident, using prefetched parts or reading the rest directly.
    fn retrieve(&mut self) -> BasinResult<()>;

    /// Free resident buffers.
    fn release(&mut self);
}

/// Decoded part handed to the unit's layout step.
#[derive(Debug)]
pub(crate) enum DecodedPart {
    Blob { layout: Layout, values: Vec<f32> },
    Slab { first_k: usize, num_k: usize, values: Vec<f32> },
}

/// Lifecycle bookkeeping embedded in every unit.
#[derive(Debug)]
pub(crate) struct UnitCore {
    pub(crate) kind: UnitKind,
    pub(crate) state: Residency,
    pub(crate) backing: Backing,
    parts: Vec<Option<RawPart>>,
    loads: usize,
}

impl UnitCore {
    pub(crate) fn native() -> Self {
        Self {
            kind: UnitKind::Native,
            state: Residency::Unretrieved,
            backing: Backing::None,
            parts: Vec::new(),
            loads: 0,
        }
    }

    pub(crate) fn reference(descriptors: Vec<BlobDescriptor>) -> Self {
        Self {
            kind: UnitKind::Reference,
            backing: Backing::Blob(descriptors),
            ..Self::native()
        }
    }

    /// Number of raw part reads this unit has consumed.
    pub(crate) fn loads(&self) -> usize {
        self.loads
    }

    pub(crate) fn set_backing(&mut self, backing: Backing) -> BasinResult<()> {
        if self.kind == UnitKind::Reference {
            return Err(BasinError::InvalidArgument("reference units cannot be re-backed".into()));
        }
        self.backing = backing;
        self.parts.clear();
        if self.state == Residency::Retrieving {
            self.state = Residency::Unretrieved;
        }
        Ok(())
    }

    pub(crate) fn has_backing(&self) -> bool {
        !matches!(self.backing, Backing::None)
    }

    /// Requests for the parts not yet delivered.
    ///
    /// Blob-backed volumes may list two orderings; only the preferred one is
    /// requested.
    pub(crate) fn requests(&self, preferred: Layout) -> Vec<RawRequest> {
        if self.kind == UnitKind::Reference || self.state == Residency::Resident {
            return Vec::new();
        }
        let all = self.all_sources(preferred);
        all.into_iter()
            .enumerate()
            .filter(|(i, _)| !matches!(self.parts.get(*i), Some(Some(_))))
            .map(|(part, source)| RawRequest { part, source })
            .collect()
    }

    fn all_sources(&self, preferred: Layout) -> Vec<RawSource> {
        match &self.backing {
            Backing::None => Vec::new(),
            Backing::Blob(descriptors) => descriptors
                .iter()
                .find(|d| d.layout == Some(preferred))
                .or_else(|| descriptors.first())
                .map(|d| vec![RawSource::Blob(d.clone())])
                .unwrap_or_default(),
            Backing::Datasets(refs) => refs.iter().cloned().map(RawSource::Dataset).collect(),
        }
    }

    pub(crate) fn accept(&mut self, part: usize, raw: RawPart, preferred: Layout) -> BasinResult<bool> {
        if self.kind == UnitKind::Reference {
            return Err(BasinError::InvalidArgument("reference units do not accept data".into()));
        }
        let needed = self.all_sources(preferred).len();
        if part >= needed {
            return Err(BasinError::InvalidArgument(format!(
                "part {part} out of range for unit with {needed} parts"
            )));
        }
        if self.parts.len() < needed {
            self.parts.resize_with(needed, || None);
        }
        self.parts[part] = Some(raw);
        self.loads += 1;
        if self.state != Residency::Resident {
            self.state = Residency::Retrieving;
        }
        Ok(self.parts.iter().all(Option::is_some))
    }

    /// Collect and decode every part, reading missing ones directly.
    ///
    /// `expected` is the number of values in the unit's full grid; `plane`
    /// is the size of one IJ layer, used to check dataset slabs.
    pub(crate) fn take_decoded(
        &mut self,
        preferred: Layout,
        expected: usize,
        plane: usize,
        label: &'static str,
    ) -> BasinResult<Vec<DecodedPart>> {
        if self.kind == UnitKind::Reference {
            return Err(BasinError::InvalidArgument(format!("cannot retrieve a reference {label}")));
        }
        let sources = self.all_sources(preferred);
        if sources.is_empty() {
            return Err(BasinError::InvalidArgument(format!("{label} has no data source to retrieve from")));
        }
        if self.parts.len() < sources.len() {
            self.parts.resize_with(sources.len(), || None);
        }

        let mut decoded = Vec::with_capacity(sources.len());
        for (slot, source) in self.parts.iter_mut().zip(&sources) {
            let raw = match slot.take() {
                Some(raw) => raw,
                None => {
                    self.loads += 1;
                    source.fetch()?
                }
            };
            decoded.push(decode_part(source, raw, expected, plane)?);
        }
        self.parts.clear();
        Ok(decoded)
    }

    pub(crate) fn mark_released(&mut self) {
        self.parts.clear();
        self.state = if self.has_backing() && self.kind == UnitKind::Native {
            Residency::Released
        } else {
            Residency::Unretrieved
        };
    }
}

fn decode_part(source: &RawSource, raw: RawPart, expected: usize, plane: usize) -> BasinResult<DecodedPart> {
    match (source, raw) {
        (RawSource::Blob(d), RawPart::Stored(bytes)) => {
            let values = BlobReader::decode(d, bytes, Some(expected))?;
            Ok(DecodedPart::Blob {
                layout: d.layout.unwrap_or(Layout::IJ),
                values,
            })
        }
        (RawSource::Dataset(d), RawPart::Values(values)) => {
            let want = plane * d.num_k;
            if values.len() != want {
                return Err(BasinError::Format(format!(
                    "dataset {} holds {} values, expected {want}",
                    d.dataset,
                    values.len()
                )));
            }
            Ok(DecodedPart::Slab {
                first_k: d.first_k,
                num_k: d.num_k,
                values,
            })
        }
        (RawSource::Blob(d), RawPart::Values(_)) => Err(BasinError::Format(format!(
            "blob part at offset {} delivered as values",
            d.offset
        ))),
        (RawSource::Dataset(d), RawPart::Stored(_)) => Err(BasinError::Format(format!(
            "dataset {} delivered as stored bytes",
            d.dataset
        ))),
    }
}

/// Allocate an owned copy of `values`, reporting allocation failure.
pub(crate) fn owned_copy(values: &[f32]) -> BasinResult<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(values.len())
        .map_err(|_| BasinError::Allocation(values.len()))?;
    buf.extend_from_slice(values);
    Ok(buf)
}

/// Allocate `len` copies of `value`, reporting allocation failure.
pub(crate) fn filled(len: usize, value: f32) -> BasinResult<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| BasinError::Allocation(len))?;
    buf.resize(len, value);
    Ok(buf)
}

/// Min/max over a buffer, rewriting NaN to `undefined` in place.
///
/// Undefined values are excluded; an all-undefined buffer reports
/// `(undefined, undefined)`. The flag is `true` when every element is equal.
pub(crate) fn scan_min_max(values: &mut [f32], undefined: f32) -> (f32, f32, bool) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let first = values.first().map(|v| if v.is_nan() { undefined } else { *v });
    let mut uniform = true;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = undefined;
        }
        if Some(*v) != first {
            uniform = false;
        }
        if *v != undefined {
            min = min.min(*v);
            max = max.max(*v);
        }
    }
    if min > max {
        (undefined, undefined, uniform)
    } else {
        (min, max, uniform)
    }
}
