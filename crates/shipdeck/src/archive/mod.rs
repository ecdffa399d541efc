use sha2::{Digest, Sha256};
use shipdeck_common::{DeploymentSource, ShipdeckError};
use std::path::Path;
use tracing::debug;

/// Largest archive the server accepts
pub const MAX_ARCHIVE_BYTES: u64 = 600 * 1024 * 1024;

/// A zip archive read from disk, ready to upload
#[derive(Clone)]
pub struct Archive {
    pub filename: String,
    pub payload: Vec<u8>,
    /// Hex SHA-256 of the payload
    pub checksum: String,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("filename", &self.filename)
            .field("size", &self.payload.len())
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl Archive {
    pub fn into_source(self) -> DeploymentSource {
        DeploymentSource::LocalArchive {
            payload: self.payload,
            filename: self.filename,
        }
    }
}

/// Read and check a `.zip` archive before anything is uploaded
pub fn load_archive(path: &Path) -> Result<Archive, ShipdeckError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ShipdeckError::InvalidArchive(format!("{}: {}", path.display(), e)))?;

    if !metadata.is_file() {
        return Err(ShipdeckError::InvalidArchive(format!(
            "{} is not a file",
            path.display()
        )));
    }

    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(ShipdeckError::InvalidArchive(
            "only .zip archives are supported".to_string(),
        ));
    }

    if metadata.len() == 0 {
        return Err(ShipdeckError::InvalidArchive("archive is empty".to_string()));
    }
    if metadata.len() > MAX_ARCHIVE_BYTES {
        return Err(ShipdeckError::InvalidArchive(format!(
            "archive is {} MiB, the limit is {} MiB",
            metadata.len() / (1024 * 1024),
            MAX_ARCHIVE_BYTES / (1024 * 1024)
        )));
    }

    let payload = std::fs::read(path)?;
    let checksum = format!("{:x}", Sha256::digest(&payload));

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project.zip".to_string());

    debug!("Loaded {} ({} bytes, sha256 {})", filename, payload.len(), checksum);

    Ok(Archive {
        filename,
        payload,
        checksum,
    })
}

/// Project name suggested by an archive's file name
pub fn project_name_from(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}
