//! Where license text comes from and where renewed text goes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

/// Storage for the license text a validator works on.
pub trait ContentSource: Send + Sync {
    /// Reads the current license text.
    fn read(&self) -> io::Result<String>;

    /// Replaces the license text (subscription renewal).
    fn write(&self, content: &str) -> io::Result<()>;

    /// Removes the license.
    fn remove(&self) -> io::Result<()>;

    /// Returns whether license content is present at all.
    fn exists(&self) -> bool;

    /// Human-readable description for errors and logs.
    fn describe(&self) -> String;
}

/// License text kept in memory.
#[derive(Debug, Default)]
pub struct StringSource {
    content: RwLock<String>,
}

impl StringSource {
    /// Creates a source holding `content`.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: RwLock::new(content.into()),
        }
    }
}

impl ContentSource for StringSource {
    fn read(&self) -> io::Result<String> {
        Ok(self.content.read().map_err(poisoned)?.clone())
    }

    fn write(&self, content: &str) -> io::Result<()> {
        *self.content.write().map_err(poisoned)? = content.to_string();
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        self.content.write().map_err(poisoned)?.clear();
        Ok(())
    }

    fn exists(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "in-memory license".to_string()
    }
}

/// License text stored in a file.
///
/// When the file cannot be written (read-only install directory, for
/// example), renewed content is kept in memory instead and preferred by
/// subsequent reads.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    in_memory: RwLock<Option<String>>,
}

impl FileSource {
    /// Creates a source backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            in_memory: RwLock::new(None),
        }
    }

    /// Creates a source at `<user config dir>/<app_name>/<file_name>`.
    ///
    /// Returns `None` if the platform has no per-user config directory.
    #[must_use]
    pub fn in_config_dir(app_name: &str, file_name: &str) -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(app_name).join(file_name)))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for FileSource {
    fn read(&self) -> io::Result<String> {
        if let Some(content) = self.in_memory.read().map_err(poisoned)?.as_ref() {
            return Ok(content.clone());
        }
        fs::read_to_string(&self.path)
    }

    fn write(&self, content: &str) -> io::Result<()> {
        match fs::write(&self.path, content) {
            Ok(()) => {
                *self.in_memory.write().map_err(poisoned)? = None;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not write new license, using in-memory copy instead"
                );
                *self.in_memory.write().map_err(poisoned)? = Some(content.to_string());
            }
        }
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        *self.in_memory.write().map_err(poisoned)? = None;
        fs::remove_file(&self.path)
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> io::Error {
    io::Error::other("license content lock poisoned")
}
