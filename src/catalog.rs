//! Frame/Scaffold Registry
//!
//! Static catalog of frames and scaffolds. Everything is validated when the
//! catalog is built, so lookups during execution never discover a dangling
//! reference.

pub mod document;
pub mod model;

pub use document::{CatalogDocument, CatalogFormat, ScaffoldRecord};
pub use model::{
    CapabilityKind, Frame, ResultMap, Scaffold, Stage, PARAM_PRIORITY, PARAM_RESOURCES,
    PARAM_TIMEOUT_SECS,
};

use crate::error::CatalogError;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Validated, immutable catalog of frames and scaffolds.
#[derive(Debug, Default)]
pub struct Catalog {
    frames: Vec<Arc<Frame>>,
    frame_index: HashMap<String, usize>,
    scaffolds: Vec<Arc<Scaffold>>,
    scaffold_index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from frames and scaffolds, failing fast on the first
    /// invalid entry.
    pub fn new(frames: Vec<Frame>, scaffolds: Vec<Scaffold>) -> Result<Self, CatalogError> {
        let mut catalog = Catalog::default();

        for mut frame in frames {
            frame.normalize();
            if catalog.frame_index.contains_key(&frame.id) {
                return Err(CatalogError::DuplicateFrame(frame.id));
            }
            if frame.depends_on(&frame.id) {
                return Err(CatalogError::SelfDependency(frame.id));
            }
            catalog
                .frame_index
                .insert(frame.id.clone(), catalog.frames.len());
            catalog.frames.push(Arc::new(frame));
        }

        for frame in &catalog.frames {
            if let Some(missing) = frame
                .dependencies
                .iter()
                .find(|dep| !catalog.frame_index.contains_key(*dep))
            {
                return Err(CatalogError::DependencyUnresolved {
                    frame: frame.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        for scaffold in scaffolds {
            if catalog.scaffold_index.contains_key(&scaffold.id) {
                return Err(CatalogError::DuplicateScaffold(scaffold.id));
            }
            for (stage, frame_ids) in &scaffold.stages {
                if Stage::from_number(*stage).is_none() {
                    return Err(CatalogError::InvalidStage {
                        scaffold: scaffold.id.clone(),
                        stage: *stage,
                    });
                }
                if let Some(unknown) = frame_ids
                    .iter()
                    .find(|id| !catalog.frame_index.contains_key(*id))
                {
                    return Err(CatalogError::UnknownStageReference {
                        scaffold: scaffold.id.clone(),
                        stage: *stage,
                        frame: unknown.clone(),
                    });
                }
            }
            catalog
                .scaffold_index
                .insert(scaffold.id.clone(), catalog.scaffolds.len());
            catalog.scaffolds.push(Arc::new(scaffold));
        }

        debug!(
            frames = catalog.frames.len(),
            scaffolds = catalog.scaffolds.len(),
            "Catalog validated"
        );
        Ok(catalog)
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let scaffolds = document
            .scaffolds
            .into_iter()
            .map(ScaffoldRecord::into_scaffold)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(document.frames, scaffolds)
    }

    /// Load and validate a catalog file (`.toml` or `.json`).
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let catalog = Self::from_document(CatalogDocument::read(path)?)?;
        info!(
            path = %path.display(),
            frames = catalog.frames.len(),
            scaffolds = catalog.scaffolds.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            frames: self.frames.iter().map(|f| f.as_ref().clone()).collect(),
            scaffolds: self
                .scaffolds
                .iter()
                .map(|s| ScaffoldRecord::from_scaffold(s))
                .collect(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        self.to_document().write(path)
    }

    pub fn get_frame(&self, id: &str) -> Result<Arc<Frame>, CatalogError> {
        self.frame_index
            .get(id)
            .map(|index| Arc::clone(&self.frames[*index]))
            .ok_or_else(|| CatalogError::FrameNotFound(id.to_string()))
    }

    pub fn get_scaffold(&self, id: &str) -> Result<Arc<Scaffold>, CatalogError> {
        self.scaffold_index
            .get(id)
            .map(|index| Arc::clone(&self.scaffolds[*index]))
            .ok_or_else(|| CatalogError::ScaffoldNotFound(id.to_string()))
    }

    /// Frames in load order.
    pub fn list_frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    /// Scaffolds in load order.
    pub fn list_scaffolds(&self) -> &[Arc<Scaffold>] {
        &self.scaffolds
    }

    /// Frames bound to one stage of a scaffold, in declaration order.
    pub fn frames_for_stage(
        &self,
        scaffold: &Scaffold,
        stage: Stage,
    ) -> Result<Vec<Arc<Frame>>, CatalogError> {
        scaffold
            .frame_ids(stage)
            .iter()
            .map(|id| self.get_frame(id))
            .collect()
    }

    pub fn frame_ids(&self) -> BTreeSet<String> {
        self.frames.iter().map(|f| f.id.clone()).collect()
    }

    /// Every `(frame, dependency)` edge in the catalog.
    pub fn dependency_edges(&self) -> BTreeSet<(String, String)> {
        self.frames
            .iter()
            .flat_map(|f| {
                f.dependencies
                    .iter()
                    .map(move |dep| (f.id.clone(), dep.clone()))
            })
            .collect()
    }

    /// Digest over the frame-id set and dependency-edge set.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for id in self.frame_ids() {
            hasher.update(b"frame\0");
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        for (frame, dep) in self.dependency_edges() {
            hasher.update(b"edge\0");
            hasher.update(frame.as_bytes());
            hasher.update(b"\0");
            hasher.update(dep.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}
