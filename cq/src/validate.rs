//! Image file validation
//!
//! Checks a file's extension, size and leading bytes before it is handed to an
//! encoder. Used by `cq validate` as the unit of work the scheduler runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::scheduler::Work;

const MIB: u64 = 1024 * 1024;

/// Files smaller than this are treated as truncated
const MIN_FILE_BYTES: u64 = 10;

/// How far into an SVG file the root element must appear
const SVG_SNIFF_BYTES: usize = 1024;

const MAX_FILE_NAME_LEN: usize = 255;

const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "pif", "scr", "vbs", "js", "jar", "app", "deb", "pkg", "dmg", "rpm", "msi", "msp", "msu",
];

const DANGEROUS_NAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF87_SIGNATURE: &[u8] = b"GIF87a";
const GIF89_SIGNATURE: &[u8] = b"GIF89a";
const BMP_SIGNATURE: &[u8] = b"BM";

/// Image formats the validator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Svg,
}

impl ImageKind {
    /// Infer the kind from a file extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    /// Does `header` start with this kind's signature?
    pub fn matches_signature(&self, header: &[u8]) -> bool {
        match self {
            Self::Jpeg => header.starts_with(JPEG_SIGNATURE),
            Self::Png => header.starts_with(PNG_SIGNATURE),
            Self::Webp => header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP",
            Self::Gif => header.starts_with(GIF87_SIGNATURE) || header.starts_with(GIF89_SIGNATURE),
            Self::Bmp => header.starts_with(BMP_SIGNATURE),
            Self::Svg => contains_svg_root(header),
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Svg => "svg",
        };
        write!(f, "{}", name)
    }
}

/// Size limits per image kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Limit for jpeg, png, webp and bmp files
    #[serde(rename = "max-image-bytes", default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    #[serde(rename = "max-gif-bytes", default = "default_max_gif_bytes")]
    pub max_gif_bytes: u64,

    #[serde(rename = "max-svg-bytes", default = "default_max_svg_bytes")]
    pub max_svg_bytes: u64,
}

fn default_max_image_bytes() -> u64 {
    50 * MIB
}

fn default_max_gif_bytes() -> u64 {
    20 * MIB
}

fn default_max_svg_bytes() -> u64 {
    5 * MIB
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
            max_gif_bytes: default_max_gif_bytes(),
            max_svg_bytes: default_max_svg_bytes(),
        }
    }
}

impl ValidationConfig {
    pub fn max_bytes(&self, kind: ImageKind) -> u64 {
        match kind {
            ImageKind::Gif => self.max_gif_bytes,
            ImageKind::Svg => self.max_svg_bytes,
            ImageKind::Jpeg | ImageKind::Png | ImageKind::Webp | ImageKind::Bmp => self.max_image_bytes,
        }
    }
}

/// Result of validating one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: Option<ImageKind>,
    pub size: u64,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl FileReport {
    fn new(path: &Path, kind: Option<ImageKind>, size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            size,
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn reject(mut self, error: impl Into<String>) -> Self {
        self.valid = false;
        self.errors.push(error.into());
        self
    }
}

fn contains_svg_root(content: &[u8]) -> bool {
    let head = &content[..content.len().min(SVG_SNIFF_BYTES)];
    let text = String::from_utf8_lossy(head);
    text.trim_start_matches('\u{feff}').to_ascii_lowercase().contains("<svg")
}

/// Validate a file whose contents are already in memory
///
/// Only the leading bytes of `content` are inspected; `size` is the file's
/// full length.
pub fn validate_bytes(path: &Path, size: u64, content: &[u8], config: &ValidationConfig) -> FileReport {
    debug!(path = %path.display(), size, "validate_bytes: called");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let kind = ImageKind::from_extension(&ext);
    let report = FileReport::new(path, kind, size);

    if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
        return report.reject(format!("file type not allowed: .{}", ext));
    }

    let mut report = report;
    if kind.is_none() {
        report.warnings.push("unable to determine file type".to_string());
    }

    if let Some(kind) = kind {
        let limit = config.max_bytes(kind);
        if size > limit {
            return report.reject(format!("file too large: {} bytes exceeds the {} limit of {} bytes", size, kind, limit));
        }
    }

    if size < MIN_FILE_BYTES {
        return report.reject("file too small, it may be corrupt");
    }

    match kind {
        Some(ImageKind::Svg) if !ImageKind::Svg.matches_signature(content) => {
            return report.reject("no <svg> root element found");
        }
        Some(kind) if !kind.matches_signature(content) => {
            return report.reject(format!("content does not look like a {} file", kind));
        }
        _ => {}
    }

    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if name.len() > MAX_FILE_NAME_LEN {
        report.warnings.push("file name is very long".to_string());
    }
    if name.contains(DANGEROUS_NAME_CHARS) {
        report.warnings.push("file name contains special characters".to_string());
    }
    if kind == Some(ImageKind::Png) {
        if size < 100 {
            report.warnings.push("png file is very small".to_string());
        } else if size > 10 * MIB {
            report.warnings.push("png file is large, compression may be slow".to_string());
        }
    }

    report
}

/// Read the head of `path` and validate it
pub async fn validate_file(path: &Path, config: &ValidationConfig) -> Result<FileReport> {
    debug!(path = %path.display(), "validate_file: called");
    let metadata = tokio::fs::metadata(path)
        .await
        .context(format!("Failed to stat {}", path.display()))?;
    if !metadata.is_file() {
        eyre::bail!("{} is not a regular file", path.display());
    }

    let file = tokio::fs::File::open(path)
        .await
        .context(format!("Failed to open {}", path.display()))?;
    let mut head = Vec::with_capacity(SVG_SNIFF_BYTES);
    file.take(SVG_SNIFF_BYTES as u64)
        .read_to_end(&mut head)
        .await
        .context(format!("Failed to read {}", path.display()))?;

    Ok(validate_bytes(path, metadata.len(), &head, config))
}

/// Validation of one file as a schedulable unit of work
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub path: PathBuf,
    pub config: ValidationConfig,
}

impl FileValidation {
    pub fn new(path: impl Into<PathBuf>, config: ValidationConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

#[async_trait]
impl Work<FileReport> for FileValidation {
    async fn run(&self) -> Result<FileReport> {
        validate_file(&self.path, &self.config).await
    }
}
