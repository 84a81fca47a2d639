//! CLI output formatting.
//!
//! # Photo Display Contract
//!
//! Every photo is shown the same way in every command: a header line with
//! its positional index, its id, and its status, followed by indented
//! context lines (`Size:`, `Crop:`, `Output:`, ...). Paths and rectangles
//! are context, never the header.
//!
//! # Output Format
//!
//! ## Status
//!
//! ```text
//! 001 beach.jpg [tagged]
//!     Size: Album/4x6
//!     Crop: 3000x2000+120+400 (manual)
//! 002 dunes.jpg [partial]
//!     Size: Album/?
//! 003 pier.jpg [untagged]
//!
//! 3 photos: 1 untagged, 1 partial, 1 tagged, 0 exported
//! ```
//!
//! ## Export
//!
//! ```text
//! Exporting 2 photos
//!     beach.jpg → Album/4x6/beach.jpg
//!         Crop: 4000x2667+0+166 (automatic)
//!     pier.jpg FAILED: Encode failed: disk full
//!
//! Exported 1 photo, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::catalog::SizeCatalog;
use crate::export::{ExportEvent, ExportReport, ExportedImage};
use crate::project::{LoadReport, StatusCounts};
use crate::resolve::{CropSource, ResolvedCrop};
use crate::tag::{ImageId, ImageRecord};
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 photo`, `3 photos`.
fn photos(n: usize) -> String {
    if n == 1 {
        "1 photo".to_string()
    } else {
        format!("{n} photos")
    }
}

fn source_label(source: &CropSource) -> String {
    match source {
        CropSource::Manual => "manual".to_string(),
        CropSource::Saliency => "automatic".to_string(),
        CropSource::Fallback(reason) => format!("centered fallback: {reason}"),
    }
}

/// Show `path` relative to `root` when it lives under it.
fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Status
// ============================================================================

/// One photo: header line plus indented size and crop context.
fn record_lines(index: usize, record: &ImageRecord) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} [{}]",
        format_index(index),
        record.id(),
        record.status()
    )];
    if record.tag().group().is_some() {
        lines.push(format!("{}Size: {}", indent(1), record.tag()));
    }
    if let Some(crop) = record.crop_box() {
        lines.push(format!("{}Crop: {} (manual)", indent(1), crop));
    }
    lines
}

pub fn format_counts(counts: &StatusCounts) -> String {
    format!(
        "{}: {} untagged, {} partial, {} tagged, {} exported",
        photos(counts.total()),
        counts.untagged,
        counts.partial,
        counts.tagged,
        counts.exported
    )
}

/// Format the project status: every photo, then a summary line.
pub fn format_status(records: &[ImageRecord], counts: &StatusCounts) -> Vec<String> {
    let mut lines: Vec<String> = records
        .iter()
        .enumerate()
        .flat_map(|(i, r)| record_lines(i + 1, r))
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format_counts(counts));
    lines
}

pub fn print_status(records: &[ImageRecord], counts: &StatusCounts) {
    for line in format_status(records, counts) {
        println!("{}", line);
    }
}

/// Format one record after a mutation.
pub fn format_record(record: &ImageRecord) -> Vec<String> {
    let mut lines = record_lines(1, record);
    lines[0] = format!("{} [{}]", record.id(), record.status());
    lines
}

pub fn print_record(record: &ImageRecord) {
    for line in format_record(record) {
        println!("{}", line);
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Format what loading found. Empty when there is nothing to say.
pub fn format_load_report(report: &LoadReport) -> Vec<String> {
    let mut lines = Vec::new();
    if !report.added.is_empty() {
        lines.push(format!("New: {}", photos(report.added.len())));
    }
    for repair in &report.repaired {
        lines.push(format!("Repaired {}: {}", repair.id, repair.reason));
    }
    for (id, reason) in &report.unreadable {
        lines.push(format!("Unreadable {}: {}", id, reason));
    }
    for id in &report.removed {
        lines.push(format!("Removed {} (file is gone)", id));
    }
    lines
}

pub fn print_load_report(report: &LoadReport) {
    for line in format_load_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Sizes
// ============================================================================

/// Format the configured size groups and their sizes.
///
/// ```text
/// Album
///     4x6 (1.500)
///     5x7 (portrait, 1.400)
/// ```
pub fn format_sizes(catalog: &SizeCatalog) -> Vec<String> {
    if catalog.is_empty() {
        return vec!["No size groups configured".to_string()];
    }
    let mut lines = Vec::new();
    for group in catalog.groups() {
        lines.push(group.name.clone());
        for size in &group.sizes {
            lines.push(format!("{}{}", indent(1), size));
        }
    }
    lines
}

pub fn print_sizes(catalog: &SizeCatalog) {
    for line in format_sizes(catalog) {
        println!("{}", line);
    }
}

// ============================================================================
// Crop resolution
// ============================================================================

pub fn format_resolved(id: &ImageId, resolved: &ResolvedCrop) -> Vec<String> {
    vec![
        id.to_string(),
        format!(
            "{}Crop: {} ({})",
            indent(1),
            resolved.rect,
            source_label(&resolved.source)
        ),
    ]
}

pub fn print_resolved(id: &ImageId, resolved: &ResolvedCrop) {
    for line in format_resolved(id, resolved) {
        println!("{}", line);
    }
}

// ============================================================================
// Export
// ============================================================================

fn exported_lines(image: &ExportedImage, output_root: &Path) -> Vec<String> {
    vec![
        format!(
            "{}{} → {}",
            indent(1),
            image.id,
            relative_display(&image.output, output_root)
        ),
        format!(
            "{}Crop: {} ({})",
            indent(2),
            image.crop,
            source_label(&image.source)
        ),
    ]
}

/// Format a single export progress event as display lines.
pub fn format_export_event(event: &ExportEvent, output_root: &Path) -> Vec<String> {
    match event {
        ExportEvent::Started { total } => vec![format!("Exporting {}", photos(*total))],
        ExportEvent::Exported(image) => exported_lines(image, output_root),
        ExportEvent::Failed { id, error } => {
            vec![format!("{}{} FAILED: {}", indent(1), id, error)]
        }
    }
}

/// Format the end-of-run summary.
pub fn format_export_report(report: &ExportReport) -> Vec<String> {
    let mut parts = vec![format!("Exported {}", photos(report.exported.len()))];
    if !report.failed.is_empty() {
        parts.push(format!("{} failed", report.failed.len()));
    }
    if !report.cancelled.is_empty() {
        parts.push(format!("{} cancelled", report.cancelled.len()));
    }
    vec![String::new(), parts.join(", ")]
}

pub fn print_export_report(report: &ExportReport) {
    for line in format_export_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
