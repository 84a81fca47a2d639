//! Shared test utilities for the printcrop test suite.
//!
//! Provides a sample size catalog, a synthetic JPEG writer, and a project
//! fixture wired to the mock backend and in-memory store.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fixture = ProjectFixture::new(&["a.jpg", "b.jpg"]);
//! let project = fixture.open();
//! project.set_tags(&ImageId::new("a.jpg"), "Album", "4x6").unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::catalog::{SizeCatalog, SizeGroup, SizeSpec};
use crate::imaging::backend::tests::MockBackend;
use crate::project::{Project, ProjectOptions};
use crate::store::tests::MemoryStore;
use crate::tag::CropSettings;
use image::{ImageEncoder, RgbImage};

// =========================================================================
// Catalog
// =========================================================================

fn spec(name: &str, ratio: f64) -> SizeSpec {
    SizeSpec {
        name: name.into(),
        alias: None,
        ratio,
    }
}

/// Two groups:
/// - `Album`: `4x6` (1.5) and `5x7` (1.4), ratios given explicitly
/// - `Travel`: `9x6` (1.5) and `Square` (1.0)
pub fn sample_catalog() -> SizeCatalog {
    SizeCatalog::from_groups([
        SizeGroup {
            name: "Album".into(),
            sizes: vec![spec("4x6", 1.5), spec("5x7", 1.4)],
        },
        SizeGroup {
            name: "Travel".into(),
            sizes: vec![spec("9x6", 1.5), spec("Square", 1.0)],
        },
    ])
}

// =========================================================================
// Synthetic images
// =========================================================================

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// Project fixture
// =========================================================================

/// A temp input directory with placeholder photo files, a mock backend
/// (4000x3000 by default), and an in-memory store.
///
/// Files only need to exist for scanning and fingerprinting; the mock
/// backend never reads their bytes.
pub struct ProjectFixture {
    pub dir: TempDir,
    pub backend: MockBackend,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<SizeCatalog>,
}

impl ProjectFixture {
    pub fn new(files: &[&str]) -> Self {
        Self::with_backend(files, MockBackend::new())
    }

    pub fn with_backend(files: &[&str], backend: MockBackend) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("input")).unwrap();
        let fixture = Self {
            dir,
            backend,
            store: Arc::new(MemoryStore::new()),
            catalog: Arc::new(sample_catalog()),
        };
        for name in files {
            fixture.write_input(name, name.as_bytes());
        }
        fixture
    }

    pub fn input_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("input")
    }

    pub fn output_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("output")
    }

    /// Write (or overwrite) a file in the input directory.
    pub fn write_input(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.input_dir().join(name), contents).unwrap();
    }

    pub fn options(&self) -> ProjectOptions {
        ProjectOptions::new("test", self.input_dir())
    }

    pub fn open(&self) -> Project {
        self.try_open().unwrap()
    }

    pub fn try_open(&self) -> Result<Project, crate::project::ProjectError> {
        Project::open(
            self.options(),
            self.catalog.clone(),
            CropSettings::default(),
            self.store.clone(),
            &self.backend,
        )
        .map(|(project, _report)| project)
    }
}
