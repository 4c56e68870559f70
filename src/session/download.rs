//! Where exported route files end up.

use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::client::ExportFile;

/// Receives export payloads. One `save` per export request.
pub trait DownloadSink: Send {
    fn save(&mut self, file: &ExportFile) -> io::Result<PathBuf>;
}

/// Writes downloads into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectoryDownloads {
    fn save(&mut self, file: &ExportFile) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        // Server-suggested names never carry directories
        let name = Path::new(&file.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty download name"))?;
        let path = self.dir.join(name);
        fs::write(&path, &file.bytes)?;
        info!("Saved {} ({} bytes)", path.display(), file.bytes.len());
        Ok(path)
    }
}
