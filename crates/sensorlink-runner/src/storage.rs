//! File-backed NVM.

use crate::error::{RunnerError, RunnerResult};
use sensorlink_settings::{Storage, BLANK_BYTE};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// NVM image kept in memory and written through to a file on every write.
///
/// A missing file is created blank (all `0xFF`). A file shorter than the
/// NVM size is padded with blank bytes; a longer one is truncated.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>, size: usize) -> RunnerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let nvm_error = |source| RunnerError::Nvm {
            path: path.clone(),
            source,
        };

        let image = match fs::read(&path) {
            Ok(mut image) => {
                debug!("NVM: loaded {} bytes from {}", image.len(), path.display());
                image.resize(size, BLANK_BYTE);
                image
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!("NVM: creating blank image {}", path.display());
                let image = vec![BLANK_BYTE; size];
                fs::write(&path, &image).map_err(nvm_error)?;
                image
            }
            Err(error) => return Err(nvm_error(error)),
        };

        Ok(FileStorage { path, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.image
    }
}

impl Storage for FileStorage {
    fn read(&mut self, address: u32, destination: &mut [u8]) {
        let start = (address as usize).min(self.image.len());
        let available = &self.image[start..];
        let count = destination.len().min(available.len());
        destination[..count].copy_from_slice(&available[..count]);
        destination[count..].fill(BLANK_BYTE);
    }

    fn write(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        let end = start + data.len();
        if end > self.image.len() {
            warn!("NVM: write of {} bytes at {} is past the end of {}", data.len(), start, self.path.display());
            return;
        }
        self.image[start..end].copy_from_slice(data);
        if let Err(error) = fs::write(&self.path, &self.image) {
            warn!("NVM: failed to write {}: {}", self.path.display(), error);
        }
    }
}
