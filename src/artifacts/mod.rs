use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::ConfigText;
use crate::utils::is_valid_hostname;

/// ArtifactStore keeps one configuration file per hostname in a directory.
///
/// Used for rendered (desired) configs, `<hostname>.cfg` under the build dir,
/// and for running-config side files, `<hostname>-running.cfg` under the
/// backup dir.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    suffix: &'static str,
}

impl ArtifactStore {
    pub fn desired(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: build_dir.into(),
            suffix: ".cfg",
        }
    }

    pub fn running(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: backup_dir.into(),
            suffix: "-running.cfg",
        }
    }

    pub fn path_for(&self, hostname: &str) -> Result<PathBuf> {
        if !is_valid_hostname(hostname) {
            return Err(Error::data_format(
                "artifact store",
                format!("hostname {:?} is not usable as a file name", hostname),
            ));
        }
        Ok(self.dir.join(format!("{}{}", hostname, self.suffix)))
    }

    /// Replace the artifact for `hostname`.
    ///
    /// The text goes to a temporary file first and is renamed into place, so
    /// readers never see a partially written artifact.
    pub fn write(&self, hostname: &str, config: &ConfigText) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;

        let path = self.path_for(hostname)?;
        let tmp_path = path.with_extension("cfg.tmp");

        if let Err(e) = write_file(&tmp_path, config.to_text().as_bytes()) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(Error::io(&tmp_path, e));
        }
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(Error::io(&path, e));
        }

        tracing::debug!("Wrote {} lines to {}", config.len(), path.display());
        Ok(path)
    }

    /// Read the artifact for `hostname`; a missing file is `NotFound`
    pub fn read(&self, hostname: &str) -> Result<ConfigText> {
        let path = self.path_for(hostname)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(ConfigText::from_text(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::not_found("artifact", &path.display().to_string()))
            }
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
