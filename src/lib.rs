//! # printcrop
//!
//! Tag photos with the print size they are destined for, adjust their
//! crops, and batch-export print-ready files grouped by size.
//!
//! # Architecture: Tag → Resolve → Export
//!
//! A project is one directory of photos. Each photo carries a small record
//! (size tag, optional manual crop, exported flag) that is written through
//! to durable storage on every change:
//!
//! ```text
//! 1. Tag       photo  →  Album/4x6          (size group + print size)
//! 2. Resolve   record →  crop rectangle     (manual, or saliency on a downscaled copy)
//! 3. Export    crop   →  out/Album/4x6/photo.jpg
//! ```
//!
//! The pieces are independent:
//!
//! - **Geometry is typed by space.** Display, thumbnail, image, and analysis
//!   rectangles are distinct types; converting between them is explicit.
//! - **Tags are a sum type.** `Untagged | Partial(group) | Full(group, size)`
//!   makes a size without a group unrepresentable; status is derived.
//! - **Collaborators are traits.** Pixel work ([`imaging::ImageBackend`]),
//!   crop scoring ([`resolve::Saliency`]), and storage
//!   ([`store::RecordStore`]) are injected, so the core is tested with a
//!   mock backend, a stub scorer, and an in-memory store.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | Space-typed rectangles, ratio checks, clamping, ratio-constrained resize |
//! | [`transform`] | Conversions between display, thumbnail, image, and analysis space |
//! | [`catalog`] | Size groups → sizes → aspect ratios, built from configuration |
//! | [`tag`] | Per-photo tag and crop state with its invariants |
//! | [`resolve`] | Crop resolution engine and the saliency boundary |
//! | [`saliency`] | Default saliency strategy (gradient energy, sliding window) |
//! | [`store`] | Record persistence: trait, JSON file store |
//! | [`project`] | Scan, load and repair, write-through mutations, catalog reload |
//! | [`export`] | Parallel batch export with per-photo failure isolation |
//! | [`imaging`] | Pure-Rust decode, downscale, crop and JPEG encode |
//! | [`config`] | Layered `printcrop.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Write-Through State
//!
//! Every mutation is persisted before it is acknowledged, under a
//! per-project lock. There is no "save" step and no dirty state to lose.
//! Native dimensions are never stored: they are read from the file on
//! every load, and a content fingerprint catches out-of-band edits.
//!
//! ## Saliency Never Fails an Export
//!
//! If the scorer errors or returns nonsense, the engine falls back to the
//! largest centered rectangle of the target ratio. The photo is still
//! exported; the fallback is logged.
//!
//! ## Immutable Catalog
//!
//! The size catalog is built once from configuration and shared as
//! `Arc<SizeCatalog>`. Reloading builds a new catalog and hands it to
//! [`project::Project::replace_catalog`], which re-validates every record.

pub mod catalog;
pub mod config;
pub mod export;
pub mod geometry;
pub mod imaging;
pub mod output;
pub mod project;
pub mod resolve;
pub mod saliency;
pub mod store;
pub mod tag;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;
