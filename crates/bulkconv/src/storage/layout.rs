use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Directory layout for uploads, converted outputs and archives.
///
/// Every job gets its own upload and output directory so concurrent jobs
/// never write to the same path.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    archive_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(config: &StorageConfig) -> Self {
        Self::from_dirs(&config.upload_dir, &config.output_dir, &config.archive_dir)
    }

    pub fn from_dirs<P: AsRef<Path>>(upload_dir: P, output_dir: P, archive_dir: P) -> Self {
        Self {
            upload_dir: upload_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            archive_dir: archive_dir.as_ref().to_path_buf(),
        }
    }

    /// Single root with `uploads/`, `outputs/` and `archives/` below it.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self::from_dirs(
            root.join("uploads"),
            root.join("outputs"),
            root.join("archives"),
        )
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn job_upload_dir(&self, job_id: &str) -> PathBuf {
        self.upload_dir.join(job_id)
    }

    pub fn job_output_dir(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(job_id)
    }

    /// Output directory for one file when files of a job convert in parallel.
    pub fn file_output_dir(&self, job_id: &str, file_id: &str) -> PathBuf {
        self.job_output_dir(job_id).join(file_id)
    }

    pub fn ensure_base_dirs(&self) -> Result<(), StorageError> {
        for dir in [&self.upload_dir, &self.output_dir, &self.archive_dir] {
            ensure_directory(dir)?;
        }
        Ok(())
    }

    /// Writes an uploaded document to `uploads/<job_id>/<filename>`.
    ///
    /// Creation is exclusive: an existing file is never overwritten.
    pub fn stage_upload(
        &self,
        job_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self.job_upload_dir(job_id);
        ensure_directory(&dir)?;

        let path = dir.join(filename);
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => {
                return Err(StorageError::WriteFile { path, source: e });
            }
        };
        file.write_all(content)
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?;

        Ok(path)
    }

    /// Best-effort removal of a job's staged uploads.
    pub fn discard_uploads(&self, job_id: &str) {
        let dir = self.job_upload_dir(job_id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove staged uploads {}: {}", dir.display(), e);
            }
        }
    }
}

pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
