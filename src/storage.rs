//! Key-value storage for credentials and login state.
//!
//! Two lifetimes are needed:
//! * durable storage survives restarts and holds the credential record
//!   ([`FileStorage`])
//! * session storage lives as long as the process and holds the PKCE
//!   verifier of a pending login ([`MemoryStorage`])

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

pub trait Storage: Send {
    /// Returns the value under `key`, or `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written.
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Reads and removes a value.
    fn take(&mut self, key: &str) -> Result<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }
}

/// Storage that lives as long as the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(HashMap<String, String>);

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.0.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.0.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.0.remove(key);
        Ok(())
    }
}

/// Storage with one file per key below a directory.
///
/// Files are created readable by the owner only, since they hold secrets.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Stored values are small; larger files are refused unread.
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|chr| chr.is_ascii_alphanumeric() || chr == '_' || chr == '-');
        if !valid {
            return Err(Error::invalid_argument(format!(
                "invalid storage key \"{key}\""
            )));
        }

        Ok(self.dir.join(key))
    }

    #[cfg(unix)]
    fn create(path: &Path) -> io::Result<fs::File> {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
    }

    #[cfg(not(unix))]
    fn create(path: &Path) -> io::Result<fs::File> {
        fs::File::create(path)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key)?;
        let file_size = match fs::metadata(&path) {
            Ok(attributes) => attributes.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::data_loss(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        fs::read_to_string(&path).map(Some).map_err(Into::into)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.dir)?;

        // Write aside and rename so readers never see a partial value.
        let partial = path.with_extension("partial");
        let mut file = Self::create(&partial)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&partial, &path)?;

        trace!("stored {key} in {}", self.dir.display());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)?) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
