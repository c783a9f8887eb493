//! Textures decoded off the render thread.
//!
//! Image decoding can take a while for large files, so [`PendingTexture::spawn`]
//! hands it to a worker thread. The render loop calls [`PendingTexture::poll`] each
//! frame; once the pixels have arrived they are uploaded through the backend and
//! the handle is returned from then on.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::backend::{GpuBackend, TextureId};

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to decode texture '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture loader for '{}' exited without a result", path.display())]
    WorkerLost { path: PathBuf },
}

/// Decoded RGBA8 pixels, ready for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Decodes an image file.
    pub fn from_file(path: &Path) -> Result<Self, TextureError> {
        let img = image::open(path)
            .map_err(|source| TextureError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self {
            rgba: img.into_raw(),
            width,
            height,
        })
    }

    /// Decodes an image held in memory.
    pub fn from_bytes(bytes: &[u8], label: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes)
            .map_err(|source| TextureError::Decode {
                path: PathBuf::from(label),
                source,
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self {
            rgba: img.into_raw(),
            width,
            height,
        })
    }
}

enum State {
    Loading(Receiver<Result<TextureData, TextureError>>),
    Decoded(TextureData),
    Ready(TextureId),
    Failed,
}

/// A texture that becomes available some frames after it was requested.
pub struct PendingTexture {
    label: String,
    state: State,
}

impl PendingTexture {
    /// Starts decoding `path` on a worker thread.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // The receiver may already be gone if the level was dropped.
            let _ = tx.send(TextureData::from_file(&path));
        });
        tracing::debug!(texture = %label, "texture decode started");
        Self {
            label,
            state: State::Loading(rx),
        }
    }

    /// A texture that stays loading until a result arrives on `rx`.
    #[cfg(test)]
    pub(crate) fn loading(
        label: impl Into<String>,
        rx: Receiver<Result<TextureData, TextureError>>,
    ) -> Self {
        Self {
            label: label.into(),
            state: State::Loading(rx),
        }
    }

    /// Wraps pixels that are already decoded; they upload on the first poll.
    pub fn from_data(label: impl Into<String>, data: TextureData) -> Self {
        Self {
            label: label.into(),
            state: State::Decoded(data),
        }
    }

    /// Wraps an image held in memory.
    pub fn from_image(label: impl Into<String>, bytes: &[u8]) -> Result<Self, TextureError> {
        let label = label.into();
        let data = TextureData::from_bytes(bytes, &label)?;
        Ok(Self::from_data(label, data))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Uploads the texture once decoding has finished and returns its handle.
    ///
    /// Returns `None` while still loading and forever after a failure, which is
    /// logged once.
    pub fn poll(&mut self, backend: &mut dyn GpuBackend) -> Option<TextureId> {
        if let State::Loading(rx) = &self.state {
            self.state = match rx.try_recv() {
                Ok(Ok(data)) => State::Decoded(data),
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "texture unavailable, drawing untextured");
                    State::Failed
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    let err = TextureError::WorkerLost {
                        path: PathBuf::from(&self.label),
                    };
                    tracing::warn!(error = %err, "texture unavailable, drawing untextured");
                    State::Failed
                }
            };
        }

        if let State::Decoded(data) = &self.state {
            let id = backend.create_texture(&self.label, &data.rgba, data.width, data.height);
            tracing::info!(
                texture = %self.label,
                width = data.width,
                height = data.height,
                "texture uploaded"
            );
            self.state = State::Ready(id);
        }

        match self.state {
            State::Ready(id) => Some(id),
            _ => None,
        }
    }
}
