use std::collections::HashSet;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;

/// Packages converted outputs of a job into a single ZIP file.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    archive_dir: PathBuf,
}

impl ArchiveBuilder {
    pub fn new<P: AsRef<Path>>(archive_dir: P) -> Self {
        Self {
            archive_dir: archive_dir.as_ref().to_path_buf(),
        }
    }

    pub fn archive_path(&self, job_id: &str) -> PathBuf {
        self.archive_dir
            .join(format!("converted_files_{}.zip", job_id))
    }

    /// Writes `converted_files_<job_id>.zip` with one flat entry per existing
    /// output, in the given order.
    ///
    /// The archive is assembled in a temporary file next to its destination
    /// and renamed into place, so a partial archive is never visible.
    pub fn build(&self, job_id: &str, outputs: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
        let _span = tracing::info_span!("archive.build", job_id = %job_id).entered();

        let present: Vec<&PathBuf> = outputs
            .iter()
            .filter(|path| {
                let exists = path.is_file();
                if !exists {
                    log::warn!(
                        "Skipping missing output {} for job {}",
                        crate::sanitize::redact_path(path),
                        job_id
                    );
                }
                exists
            })
            .collect();
        if present.is_empty() {
            return Err(ArchiveError::Empty);
        }

        std::fs::create_dir_all(&self.archive_dir).map_err(|e| {
            ArchiveError::CreateDirectory {
                path: self.archive_dir.clone(),
                source: e,
            }
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".converted_files_")
            .suffix(".zip.part")
            .tempfile_in(&self.archive_dir)
            .map_err(|e| ArchiveError::CreateDirectory {
                path: self.archive_dir.clone(),
                source: e,
            })?;

        {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            let mut names = EntryNames::default();

            for path in present {
                let mut source =
                    std::fs::File::open(path).map_err(|e| ArchiveError::ReadOutput {
                        path: path.clone(),
                        source: e,
                    })?;
                writer.start_file(names.claim(path), options)?;
                std::io::copy(&mut source, &mut writer).map_err(|e| {
                    ArchiveError::ReadOutput {
                        path: path.clone(),
                        source: e,
                    }
                })?;
            }
            writer.finish()?;
        }

        let final_path = self.archive_path(job_id);
        tmp.persist(&final_path)
            .map_err(|e| ArchiveError::Persist {
                path: final_path.clone(),
                source: e.error,
            })?;

        log::info!("Created archive {}", final_path.display());
        Ok(final_path)
    }
}

/// Hands out unique flat entry names, suffixing repeats with `_2`, `_3`, ...
#[derive(Default)]
struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        if self.taken.insert(name.clone()) {
            return name;
        }

        let (base, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => (&name[..dot], Some(&name[dot..])),
            _ => (name.as_str(), None),
        };
        let mut counter = 2;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{}_{}{}", base, counter, ext),
                None => format!("{}_{}", base, counter),
            };
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn entries(archive: &Path) -> Vec<(String, String)> {
        let file = std::fs::File::open(archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        (0..zip.len())
            .map(|i| {
                let mut entry = zip.by_index(i).unwrap();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (entry.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_entries_are_flat_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "out/job/a.pdf", "A");
        let b = write(tmp.path(), "out/job/b.pdf", "B");
        let builder = ArchiveBuilder::new(tmp.path().join("archives"));

        let path = builder.build("job", &[b, a]).unwrap();
        assert_eq!(
            path,
            tmp.path().join("archives/converted_files_job.zip")
        );
        assert_eq!(
            entries(&path),
            vec![
                ("b.pdf".to_string(), "B".to_string()),
                ("a.pdf".to_string(), "A".to_string())
            ]
        );
    }

    #[test]
    fn test_duplicate_base_names_get_suffixes() {
        let tmp = TempDir::new().unwrap();
        let first = write(tmp.path(), "out/job/f1/report.pdf", "1");
        let second = write(tmp.path(), "out/job/f2/report.pdf", "2");
        let third = write(tmp.path(), "out/job/f3/report.pdf", "3");
        let builder = ArchiveBuilder::new(tmp.path().join("archives"));

        let path = builder.build("job", &[first, second, third]).unwrap();
        let names: Vec<String> = entries(&path).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["report.pdf", "report_2.pdf", "report_3.pdf"]);
    }

    #[test]
    fn test_missing_outputs_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "out/a.pdf", "A");
        let builder = ArchiveBuilder::new(tmp.path().join("archives"));

        let path = builder
            .build("job", &[tmp.path().join("out/gone.pdf"), a])
            .unwrap();
        let names: Vec<String> = entries(&path).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.pdf"]);
    }

    #[test]
    fn test_nothing_to_archive() {
        let tmp = TempDir::new().unwrap();
        let builder = ArchiveBuilder::new(tmp.path().join("archives"));

        let err = builder
            .build("job", &[tmp.path().join("missing.pdf")])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Empty));
        assert!(!builder.archive_path("job").exists());
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "out/a.pdf", "A");
        let builder = ArchiveBuilder::new(tmp.path().join("archives"));
        builder.build("job", &[a]).unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("archives"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["converted_files_job.zip"]);
    }

    #[test]
    fn test_entry_names_without_extension() {
        let mut names = EntryNames::default();
        assert_eq!(names.claim(Path::new("/x/README")), "README");
        assert_eq!(names.claim(Path::new("/y/README")), "README_2");
    }
}
