use std::path::{Path, PathBuf};

use async_trait::async_trait;
use empath_common::context::Context;
use serde::{Deserialize, Deserializer};

use crate::{SpoolError, ValidationError, r#trait::BackingStore, types::SpooledMessageId};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

#[cfg(unix)]
const SYSTEM_DIRECTORIES: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr", "/boot", "/sys", "/proc", "/dev",
];

#[cfg(windows)]
const SYSTEM_DIRECTORIES: &[&str] = &[
    "c:\\windows",
    "c:\\program files",
    "c:\\program files (x86)",
    "c:\\programdata",
];

#[cfg(windows)]
fn is_system_directory(path: &Path) -> bool {
    let lossy = path.to_string_lossy().to_lowercase();
    SYSTEM_DIRECTORIES.iter().any(|dir| lossy.starts_with(dir))
}

#[cfg(not(windows))]
fn is_system_directory(path: &Path) -> bool {
    SYSTEM_DIRECTORIES.iter().any(|dir| path.starts_with(dir))
}

/// Rejects spool paths that are relative, contain a `..` component, or resolve into a
/// well-known system directory. Purely lexical: doesn't touch the filesystem, so it's
/// cheap enough to run both at builder time and at config-deserialization time.
fn validate_path(path: &Path) -> crate::Result<()> {
    if !path.is_absolute() {
        return Err(ValidationError::InvalidConfiguration(format!(
            "Spool path must be absolute: {}",
            path.display()
        ))
        .into());
    }

    if path
        .components()
        .any(|c| c.as_os_str() == std::ffi::OsStr::new(".."))
    {
        return Err(ValidationError::InvalidConfiguration(format!(
            "Spool path cannot contain '..': {}",
            path.display()
        ))
        .into());
    }

    if is_system_directory(path) {
        return Err(ValidationError::InvalidConfiguration(format!(
            "Spool path resolves to a system directory: {}",
            path.display()
        ))
        .into());
    }

    Ok(())
}

/// File-backed store: one bincode-encoded `Context` per message, named `<ulid>.bin`.
///
/// ULIDs are lexicographically sortable, so `list()` can be produced by a directory read
/// plus a sort with no separate index file to keep consistent.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl FileBackingStore {
    /// Starts a builder for a file-backed store rooted at `path`.
    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn message_path(&self, id: &SpooledMessageId) -> PathBuf {
        self.path.join(format!("{id}.bin"))
    }
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/empath"),
        }
    }
}

/// Builder for [`FileBackingStore`], validating the spool path up front.
#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: Option<PathBuf>,
}

impl FileBackingStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Validates the configured path is a safe absolute path. Directory existence and
    /// writability are checked later, at [`BackingStore::init`] time.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the path is relative, traverses upward, or
    /// resolves into a well-known system directory.
    pub fn build(self) -> crate::Result<FileBackingStore> {
        let path = self
            .path
            .unwrap_or_else(|| PathBuf::from("/var/spool/empath"));

        validate_path(&path)?;

        Ok(FileBackingStore { path })
    }
}

impl<'de> Deserialize<'de> for FileBackingStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            path: PathBuf,
        }

        let raw = Raw::deserialize(deserializer)?;
        FileBackingStore::builder()
            .path(raw.path)
            .build()
            .map_err(serde::de::Error::custom)
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    /// Creates the spool directory if it doesn't exist and checks it's actually usable.
    async fn init(&self) -> crate::Result<()> {
        if !self.path.exists() {
            tokio::fs::create_dir_all(&self.path).await?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        Ok(())
    }

    async fn write(&self, context: &mut Context) -> crate::Result<SpooledMessageId> {
        let id = SpooledMessageId::generate();
        context.tracking_id = Some(id.to_string());

        let bytes = bincode::serde::encode_to_vec(&*context, BINCODE_CONFIG)
            .map_err(crate::error::SerializationError::Encode)?;

        tokio::fs::write(self.message_path(&id), bytes).await?;

        Ok(id)
    }

    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str()
                && let Some(id) = SpooledMessageId::from_filename(name)
            {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Context> {
        let bytes = tokio::fs::read(self.message_path(id))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SpoolError::NotFound(id.clone()),
                _ => e.into(),
            })?;

        let (context, _) = bincode::serde::decode_from_slice(&bytes, BINCODE_CONFIG)
            .map_err(crate::error::SerializationError::Decode)?;

        Ok(context)
    }

    async fn update(&self, id: &SpooledMessageId, context: &Context) -> crate::Result<()> {
        let path = self.message_path(id);
        if !path.exists() {
            return Err(SpoolError::NotFound(id.clone()));
        }

        let bytes = bincode::serde::encode_to_vec(context, BINCODE_CONFIG)
            .map_err(crate::error::SerializationError::Encode)?;
        tokio::fs::write(path, bytes).await?;

        Ok(())
    }

    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()> {
        tokio::fs::remove_file(self.message_path(id))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SpoolError::NotFound(id.clone()),
                _ => e.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accepts_plain_absolute_path() {
        let store = FileBackingStore::builder()
            .path(PathBuf::from("/var/spool/empath"))
            .build()
            .expect("valid path should build");
        assert_eq!(store.path(), Path::new("/var/spool/empath"));
    }

    #[test]
    fn builder_rejects_relative_path() {
        let err = FileBackingStore::builder()
            .path(PathBuf::from("relative/path"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn builder_rejects_parent_traversal() {
        let err = FileBackingStore::builder()
            .path(PathBuf::from("/var/spool/../etc/passwd"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cannot contain '..'"));
    }
}
