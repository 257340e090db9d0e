//! Content folder for product photos.
//!
//! Photos arrive as data URLs (`data:image/png;base64,...`) and are written as
//! `{product_id}_{slot}.{ext}`. Records store the relative path `uploads/{file}`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix of every stored image path; matches the static route that serves the folder.
pub const PUBLIC_PREFIX: &str = "uploads";

const STAGING_SUFFIX: &str = "staged";

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("payload is not a base64 data URL")]
    NotDataUrl,

    #[error("unsupported media type {0:?}")]
    UnsupportedType(String),

    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("empty image body")]
    Empty,

    #[error("failed to write image: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime).unwrap_or("png")
    }
}

fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

/// Decodes `data:image/<fmt>;base64,<body>`. A bare base64 body is read as PNG.
pub fn decode_data_url(payload: &str) -> Result<DecodedImage, ImageError> {
    let payload = payload.trim();
    let (mime, body) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest.split_once(',').ok_or(ImageError::NotDataUrl)?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or(ImageError::NotDataUrl)?
                .to_ascii_lowercase();
            if extension_for(&mime).is_none() {
                return Err(ImageError::UnsupportedType(mime));
            }
            (mime, body)
        }
        None => ("image/png".to_string(), payload),
    };

    let bytes = STANDARD.decode(body.trim())?;
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    Ok(DecodedImage { mime, bytes })
}

pub fn encode_data_url(image: &DecodedImage) -> String {
    format!("data:{};base64,{}", image.mime, STANDARD.encode(&image.bytes))
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ImageStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a stored relative path back to the file on disk. Only the file name
    /// is used, so `uploads/../../etc/passwd` resolves inside the content folder.
    pub fn resolve(&self, stored: &str) -> Option<PathBuf> {
        let name = Path::new(stored).file_name()?;
        Some(self.root.join(name))
    }

    fn public_path(file_name: &str) -> String {
        format!("{}/{}", PUBLIC_PREFIX, file_name)
    }

    /// Writes every payload that decodes; failures are logged and skipped.
    /// Slot numbers follow payload positions, so a skipped payload leaves a gap.
    pub fn store_images(&self, product_id: &str, payloads: &[String]) -> Vec<String> {
        let mut paths = Vec::with_capacity(payloads.len());
        for (slot, payload) in payloads.iter().enumerate() {
            match self.write_slot(product_id, slot, payload, None) {
                Ok((_, file_name)) => paths.push(Self::public_path(&file_name)),
                Err(e) => warn!(product_id, slot, error = %e, "skipping image"),
            }
        }
        paths
    }

    fn write_slot(
        &self,
        product_id: &str,
        slot: usize,
        payload: &str,
        suffix: Option<&str>,
    ) -> Result<(PathBuf, String), ImageError> {
        let image = decode_data_url(payload)?;
        let file_name = format!("{}_{}.{}", product_id, slot, image.extension());
        let disk_name = match suffix {
            Some(suffix) => format!("{}.{}", file_name, suffix),
            None => file_name.clone(),
        };
        let path = self.root.join(&disk_name);
        fs::write(&path, &image.bytes)?;
        debug!(path = %path.display(), bytes = image.bytes.len(), "wrote image");
        Ok((path, file_name))
    }

    /// First half of a replacement: writes the new set next to the live files
    /// without touching them. Nothing becomes visible until [`StagedImages::commit`].
    pub fn stage_images(&self, product_id: &str, payloads: &[String]) -> StagedImages {
        let mut files = Vec::with_capacity(payloads.len());
        for (slot, payload) in payloads.iter().enumerate() {
            match self.write_slot(product_id, slot, payload, Some(STAGING_SUFFIX)) {
                Ok((staged, file_name)) => files.push(StagedFile {
                    staged,
                    target: self.root.join(&file_name),
                    public: Self::public_path(&file_name),
                }),
                Err(e) => warn!(product_id, slot, error = %e, "skipping image"),
            }
        }
        StagedImages {
            store: self.clone(),
            files,
        }
    }

    /// Replaces `old_paths` with freshly written `new_payloads`.
    pub fn replace_images(&self, product_id: &str, old_paths: &[String], new_payloads: &[String]) -> Vec<String> {
        self.stage_images(product_id, new_payloads).commit(old_paths)
    }

    /// Best-effort removal. Missing files are not errors. Returns how many files were deleted.
    pub fn remove_images(&self, paths: &[String]) -> usize {
        let mut removed = 0;
        for stored in paths {
            let Some(path) = self.resolve(stored) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove image; leaving orphan"),
            }
        }
        removed
    }

    /// Empties the content folder. Subdirectories are left alone.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Debug)]
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
    public: String,
}

/// A written-but-unpublished image set.
#[derive(Debug)]
#[must_use = "staged images must be committed or discarded"]
pub struct StagedImages {
    store: ImageStore,
    files: Vec<StagedFile>,
}

impl StagedImages {
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.public.clone()).collect()
    }

    /// Removes old files that the new set does not overwrite, then moves the
    /// staged files into place.
    pub fn commit(self, old_paths: &[String]) -> Vec<String> {
        let keep: Vec<&String> = self.files.iter().map(|f| &f.public).collect();
        let stale: Vec<String> = old_paths
            .iter()
            .filter(|old| !keep.contains(old))
            .cloned()
            .collect();
        self.store.remove_images(&stale);

        let mut published = Vec::with_capacity(self.files.len());
        for file in self.files {
            match fs::rename(&file.staged, &file.target) {
                Ok(()) => published.push(file.public),
                Err(e) => warn!(path = %file.staged.display(), error = %e, "could not publish staged image"),
            }
        }
        published
    }

    pub fn discard(self) {
        for file in self.files {
            if let Err(e) = fs::remove_file(&file.staged) {
                warn!(path = %file.staged.display(), error = %e, "could not remove staged image");
            }
        }
    }
}
