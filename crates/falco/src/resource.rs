//! Sound resources and the loaders that resolve them.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{FalcoError, Result};

/// A loaded, still-encoded sound asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundResource {
    name: String,
    bytes: Arc<[u8]>,
}

impl SoundResource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Resolves a logical sound name to its encoded bytes.
pub trait ResourceLoader: Send + Sync {
    /// Load `name`; missing assets fail with `ResourceNotFound`.
    fn load(&self, name: &str) -> Result<SoundResource>;
}

/// Reject blank identifiers before touching any loader.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FalcoError::InvalidArgument(
            "sound can not be blank or null".to_string(),
        ));
    }
    Ok(())
}

/// Loads sounds from a base directory.
///
/// Names are relative to the base; a leading `/` is tolerated (`/sounds/x.wav`
/// style names) but `..` components are refused.
pub struct FileResourceLoader {
    base_path: PathBuf,
}

impl FileResourceLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(FalcoError::InvalidArgument(format!(
                "sound name '{}' escapes the sound directory",
                name
            )));
        }
        Ok(self.base_path.join(relative))
    }
}

impl ResourceLoader for FileResourceLoader {
    fn load(&self, name: &str) -> Result<SoundResource> {
        validate_name(name)?;
        let path = self.resolve(name)?;
        let bytes = std::fs::read(&path).map_err(|e| {
            tracing::debug!("read of {} failed: {}", path.display(), e);
            FalcoError::ResourceNotFound(name.to_string())
        })?;
        Ok(SoundResource::new(name, bytes))
    }
}

/// In-memory loader for testing
#[derive(Default)]
pub struct MemoryResourceLoader {
    content: HashMap<String, Arc<[u8]>>,
}

impl MemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.content.insert(name.into(), data.into());
    }

    pub fn with(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(name, data);
        self
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn load(&self, name: &str) -> Result<SoundResource> {
        validate_name(name)?;
        self.content
            .get(name)
            .map(|bytes| SoundResource::new(name, Arc::clone(bytes)))
            .ok_or_else(|| FalcoError::ResourceNotFound(name.to_string()))
    }
}
