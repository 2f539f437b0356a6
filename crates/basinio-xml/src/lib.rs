//! XML codec for basinio projects.
//!
//! A project on disk is one XML index file plus a directory of blob files
//! named `<stem>_output` next to it. The index carries every piece of
//! metadata; float payloads live in the blob files and are addressed by
//! `<datastore>` elements.
//!
//! # Architecture
//!
//! - [`export_project`] -- per snapshot: baseline substitution, retrieval,
//!   optional cell-centering and merge, payload queueing, parallel
//!   compression, flush, release
//! - [`import_project`] -- builds the graph with deferred data units
//! - [`Element`] -- small owned element tree over `quick-xml`
//! - [`ExportConfig`] -- thread count, compression and centering settings
//!
//! # Design Rules
//!
//! 1. Import never reads float payloads.
//! 2. Blob writers are opened only after the snapshot they serve has been
//!    retrieved, so re-exporting over the source never truncates unread data.
//! 3. An index written by any other format version is rejected.
//! 4. Constants are attributes; references keep their original file,
//!    offset and size.

pub mod config;
pub mod element;
pub mod export;
mod flags;
pub mod import;

pub use config::ExportConfig;
pub use element::Element;
pub use export::{export_project, ExportStats};
pub use import::import_project;
