use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, OnceLock};

use crate::data::grid::{ReferenceGrid, SampleGrid};
use crate::error::{ForestError, Result};

/// Producer of a (sample grid, reference grid) pair.
///
/// Implemented by the collaborators that compute spectra and extract reference labels.
pub trait GridSource: Send + Sync {
    fn load(&self) -> Result<(SampleGrid, ReferenceGrid)>;

    fn name(&self) -> &str;
}

/// Grid source over grids that are already in memory.
#[derive(Clone, Debug)]
pub struct MemorySource {
    name: String,
    sample: SampleGrid,
    reference: ReferenceGrid,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, sample: SampleGrid, reference: ReferenceGrid) -> Self {
        Self {
            name: name.into(),
            sample,
            reference,
        }
    }
}

impl GridSource for MemorySource {
    fn load(&self) -> Result<(SampleGrid, ReferenceGrid)> {
        Ok((self.sample.clone(), self.reference.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Loaded pair of parallel grids.
#[derive(Debug)]
pub struct Grids {
    pub sample: SampleGrid,
    pub reference: ReferenceGrid,
}

impl Grids {
    /// Fails when the reference holds a class code outside `0..num_classes`.
    pub fn check_classes(&self, dataset: &str, num_classes: usize) -> Result<()> {
        match self
            .reference
            .as_matrix()
            .iter()
            .find(|&&class| class as usize >= num_classes)
        {
            Some(class) => Err(ForestError::InvalidParameter(format!(
                "dataset {dataset} holds class {class} but the tree has {num_classes} classes"
            ))),
            None => Ok(()),
        }
    }
}

/// Lazily loaded dataset with a frame-level bag membership mask.
///
/// Clones share the loaded grids; only the membership mask is copied.
#[derive(Clone)]
pub struct Dataset {
    source: Arc<dyn GridSource>,
    cache: Arc<OnceLock<Arc<Grids>>>,
    in_bag: Option<Vec<bool>>,
}

impl Debug for Dataset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.source.name())
            .field("loaded", &self.is_loaded())
            .field("in_bag", &self.in_bag_frames())
            .finish()
    }
}

impl Dataset {
    pub fn new(source: Arc<dyn GridSource>) -> Self {
        Self {
            source,
            cache: Arc::new(OnceLock::new()),
            in_bag: None,
        }
    }

    /// Dataset over in-memory grids, checked for matching shapes.
    pub fn from_grids(
        name: impl Into<String>,
        sample: SampleGrid,
        reference: ReferenceGrid,
    ) -> Result<Self> {
        sample.ensure_same_shape(&reference)?;
        Ok(Self::new(Arc::new(MemorySource::new(name, sample, reference))))
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Loads the grids on first access and returns the cached pair afterwards.
    pub fn load(&self) -> Result<Arc<Grids>> {
        if let Some(grids) = self.cache.get() {
            return Ok(grids.clone());
        }
        let (sample, reference) = self.source.load()?;
        sample.ensure_same_shape(&reference)?;
        if let Some(mask) = &self.in_bag {
            if mask.len() != sample.frames() {
                return Err(ForestError::DimensionMismatch {
                    expected: (sample.frames(), sample.bins()),
                    found: (mask.len(), sample.bins()),
                });
            }
        }
        let grids = Arc::new(Grids { sample, reference });
        Ok(self.cache.get_or_init(|| grids).clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Number of frames; loads the grids if needed.
    pub fn length(&self) -> Result<usize> {
        Ok(self.load()?.sample.frames())
    }

    pub fn is_in_bag(&self, frame: usize) -> bool {
        self.in_bag
            .as_ref()
            .map_or(true, |mask| mask.get(frame).copied().unwrap_or(false))
    }

    /// Frames currently in bag, or `None` when every frame is.
    pub fn in_bag_frames(&self) -> Option<usize> {
        self.in_bag
            .as_ref()
            .map(|mask| mask.iter().filter(|&&included| included).count())
    }

    pub fn membership(&self) -> Option<&[bool]> {
        self.in_bag.as_deref()
    }

    /// Replaces the membership mask; it must cover every frame.
    pub fn replace(&mut self, mask: Vec<bool>) -> Result<()> {
        let frames = self.length()?;
        if mask.len() != frames {
            return Err(ForestError::InvalidParameter(format!(
                "membership mask covers {} frames, dataset {} has {}",
                mask.len(),
                self.name(),
                frames
            )));
        }
        self.in_bag = Some(mask);
        Ok(())
    }

    pub fn include_all(&mut self) {
        self.in_bag = None;
    }

    /// Copy sharing the loaded grids, with its own membership mask.
    pub fn get_clone(&self) -> Self {
        self.clone()
    }
}
