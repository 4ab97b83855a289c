//! Texture extraction from binary glTF (GLB) containers
//!
//! Images are taken from the container's own image table, in declared order,
//! and written next to the container as `<index>.<ext>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use gltf::Gltf;
use thiserror::Error;
use tracing::{debug, info};

use crate::fetcher::AssetContainerRef;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const GLB_HEADER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read container {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a GLB container (bad magic)")]
    NotGlb,

    #[error("unsupported GLB version {0}")]
    UnsupportedVersion(u32),

    #[error("container truncated: header declares {declared} bytes, file has {actual}")]
    Truncated { declared: usize, actual: usize },

    #[error("malformed glTF: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("image {image} points outside the binary chunk")]
    ViewOutOfBounds { image: usize },

    #[error("image {image} refers to a buffer that is not embedded in the container")]
    NotEmbedded { image: usize },

    #[error("image {image} has an invalid data uri: {reason}")]
    DataUri { image: usize, reason: String },

    #[error("failed to write texture {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction did not finish within {0:?}")]
    Timeout(Duration),

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// An image file materialized from a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTexture {
    pub local_path: PathBuf,
    pub filename: String,
    pub byte_size: u64,
    /// Position in the container's image table
    pub index: usize,
    pub mime_type: String,
}

impl ExtractedTexture {
    /// File extension including the leading dot
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }
}

/// Embedded image bytes pulled out of the container, not yet on disk
#[derive(Debug)]
struct EmbeddedImage {
    index: usize,
    mime_type: String,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureExtractor;

impl TextureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse the container and write every embedded image next to it.
    ///
    /// A valid container without images yields an empty list; anything that is
    /// not a well-formed GLB is a [`ParseError`].
    pub async fn extract(
        &self,
        container: &AssetContainerRef,
    ) -> Result<Vec<ExtractedTexture>, ParseError> {
        let path = container.local_path.clone();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| ParseError::Read {
                path: path.clone(),
                source,
            })?;

        let images = tokio::task::spawn_blocking(move || read_embedded_images(&bytes))
            .await
            .map_err(|e| ParseError::Task(e.to_string()))??;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut textures = Vec::with_capacity(images.len());

        for image in images {
            let filename = format!("{}.{}", image.index, extension_for(&image.mime_type));
            let local_path = dir.join(&filename);

            tokio::fs::write(&local_path, &image.data)
                .await
                .map_err(|source| ParseError::Write {
                    path: local_path.clone(),
                    source,
                })?;

            debug!(file = %filename, size = image.data.len(), "Texture written");

            textures.push(ExtractedTexture {
                local_path,
                filename,
                byte_size: image.data.len() as u64,
                index: image.index,
                mime_type: image.mime_type,
            });
        }

        info!(
            container = %container.declared_filename,
            textures = textures.len(),
            "Textures extracted"
        );

        Ok(textures)
    }
}

/// Check the 12-byte GLB header before handing the bytes to the glTF parser
fn check_header(bytes: &[u8]) -> Result<(), ParseError> {
    if bytes.len() < GLB_HEADER_LEN || &bytes[..4] != GLB_MAGIC {
        return Err(ParseError::NotGlb);
    }

    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    let version = word(4);
    if version != GLB_VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }

    let declared = word(8) as usize;
    if declared != bytes.len() {
        return Err(ParseError::Truncated {
            declared,
            actual: bytes.len(),
        });
    }

    Ok(())
}

fn read_embedded_images(bytes: &[u8]) -> Result<Vec<EmbeddedImage>, ParseError> {
    check_header(bytes)?;

    let gltf = Gltf::from_slice(bytes)?;
    let blob = gltf.blob.as_deref();

    gltf.images()
        .map(|image| {
            let index = image.index();
            match image.source() {
                gltf::image::Source::View { view, mime_type } => {
                    if !matches!(view.buffer().source(), gltf::buffer::Source::Bin) {
                        return Err(ParseError::NotEmbedded { image: index });
                    }
                    let blob = blob.ok_or(ParseError::NotEmbedded { image: index })?;
                    let start = view.offset();
                    let data = start
                        .checked_add(view.length())
                        .and_then(|end| blob.get(start..end))
                        .ok_or(ParseError::ViewOutOfBounds { image: index })?;

                    Ok(EmbeddedImage {
                        index,
                        mime_type: mime_type.to_string(),
                        data: data.to_vec(),
                    })
                }
                gltf::image::Source::Uri { uri, mime_type } => {
                    let (data_mime, data) = decode_data_uri(uri)
                        .map_err(|reason| ParseError::DataUri { image: index, reason })?
                        .ok_or(ParseError::NotEmbedded { image: index })?;

                    Ok(EmbeddedImage {
                        index,
                        mime_type: mime_type.map(str::to_string).unwrap_or(data_mime),
                        data,
                    })
                }
            }
        })
        .collect()
}

/// `Ok(None)` for URIs that are not `data:` URIs (external files)
fn decode_data_uri(uri: &str) -> Result<Option<(String, Vec<u8>)>, String> {
    let Some(rest) = uri.strip_prefix("data:") else {
        return Ok(None);
    };

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "missing ',' separator".to_string())?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| "only base64 data uris are supported".to_string())?;

    let data = BASE64.decode(payload).map_err(|e| e.to_string())?;
    Ok(Some((mime.to_string(), data)))
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/ktx2" => "ktx2",
        _ => "bin",
    }
}
