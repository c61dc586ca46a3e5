//! Image decoding, bounded resizing and atomic artifact writes.
//!
//! Everything here is blocking; callers run it on the blocking pool.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use tempfile::NamedTempFile;

use crate::error::{ArtworkError, ArtworkResult};

/// Decodes candidate bytes in any format the `image` crate recognizes.
pub fn decode(bytes: &[u8]) -> ArtworkResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| ArtworkError::Decode(e.to_string()))
}

/// Computes the largest size that fits `max_width` x `max_height` while
/// keeping the aspect ratio. Images already inside the box are not enlarged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let (mw, mh) = (u64::from(max_width), u64::from(max_height));

    // Compare w/h against mw/mh without floating point
    if w * mh >= h * mw {
        let scaled = ((h * mw) + (w / 2)) / w;
        (max_width, scaled.max(1) as u32)
    } else {
        let scaled = ((w * mh) + (h / 2)) / h;
        (scaled.max(1) as u32, max_height)
    }
}

/// Shrinks `image` to fit the bounding box, or returns it untouched.
pub fn thumbnail(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (target_w, target_h) = fit_within(width, height, max_width, max_height);
    if (target_w, target_h) == (width, height) {
        return image;
    }
    image.resize_exact(target_w, target_h, FilterType::Lanczos3)
}

/// Creates a uniquely named temp file in `dest`'s directory.
///
/// Concurrent writers of the same destination never share a temp file.
fn sibling_temp(dest: &Path) -> std::io::Result<NamedTempFile> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = format!(
        ".{}.",
        dest.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artwork".to_string())
    );

    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".tmp");
    // Readable by a renderer running under another account
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    builder.tempfile_in(dir)
}

fn write_error(dest: &Path, reason: impl ToString) -> ArtworkError {
    ArtworkError::Write {
        path: dest.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Encodes `image` as PNG next to `dest` and renames it into place.
///
/// Readers of `dest` see either the previous file or the complete new one.
///
/// # Errors
///
/// Returns [`ArtworkError::Write`] if encoding or the rename fails; the
/// temporary file is removed in that case.
pub fn write_png_atomic(image: &DynamicImage, dest: &Path) -> ArtworkResult<()> {
    let mut temp = sibling_temp(dest).map_err(|e| write_error(dest, e))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|e| write_error(dest, e))?;
        writer.flush().map_err(|e| write_error(dest, e))?;
    }
    temp.persist(dest).map_err(|e| write_error(dest, e.error))?;
    Ok(())
}

/// Replaces `dest` with a copy of the placeholder, atomically.
///
/// # Errors
///
/// - [`ArtworkError::Placeholder`] if the placeholder cannot be read
/// - [`ArtworkError::Write`] if the copy cannot be installed at `dest`
pub fn install_placeholder(placeholder: &Path, dest: &Path) -> ArtworkResult<()> {
    let bytes = fs::read(placeholder).map_err(|e| ArtworkError::Placeholder {
        path: placeholder.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut temp = sibling_temp(dest).map_err(|e| write_error(dest, e))?;
    temp.write_all(&bytes).map_err(|e| write_error(dest, e))?;
    temp.persist(dest).map_err(|e| write_error(dest, e.error))?;
    Ok(())
}

/// Creates a solid-color placeholder PNG at `path` unless one already exists.
///
/// Returns true if a new file was written.
///
/// # Errors
///
/// Returns [`ArtworkError::Placeholder`] if the file or its parent directory
/// cannot be created.
pub fn ensure_placeholder(path: &Path, size: (u32, u32), color: [u8; 3]) -> ArtworkResult<bool> {
    if path.is_file() {
        return Ok(false);
    }

    let placeholder_error = |reason: String| ArtworkError::Placeholder {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| placeholder_error(e.to_string()))?;
    }

    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(size.0, size.1, Rgb(color)));
    write_png_atomic(&image, path).map_err(|e| placeholder_error(e.to_string()))?;
    Ok(true)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Encodes a solid image of the given size as PNG bytes.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let source =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba([200, 30, 60, 255])));
        let mut cursor = Cursor::new(Vec::<u8>::new());
        source
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("png encoding should succeed");
        cursor.into_inner()
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(2000, 1000, 500, 500), (500, 250));
        assert_eq!(fit_within(1000, 2000, 500, 500), (250, 500));
        assert_eq!(fit_within(1000, 1000, 500, 500), (500, 500));
        assert_eq!(fit_within(1200, 900, 500, 300), (400, 300));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(120, 80, 500, 500), (120, 80));
        assert_eq!(fit_within(500, 500, 500, 500), (500, 500));
    }

    #[test]
    fn fit_within_keeps_thin_images_visible() {
        assert_eq!(fit_within(10_000, 1, 500, 500), (500, 1));
    }

    #[test]
    fn thumbnail_shrinks_to_bounding_box() {
        let image = decode(&png_bytes(900, 600)).unwrap();
        assert_eq!(thumbnail(image, 500, 500).dimensions(), (500, 333));
    }

    #[test]
    fn decode_rejects_non_image_bytes() {
        assert!(matches!(
            decode(b"definitely-not-an-image"),
            Err(ArtworkError::Decode(_))
        ));
    }

    #[test]
    fn decode_rejects_truncated_image() {
        let mut bytes = png_bytes(64, 64);
        bytes.truncate(bytes.len() - 30);
        assert!(matches!(decode(&bytes), Err(ArtworkError::Decode(_))));
    }

    #[test]
    fn write_png_atomic_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("art.png");
        std::fs::write(&dest, b"stale").unwrap();

        let image = decode(&png_bytes(4, 3)).unwrap();
        write_png_atomic(&image, &dest).unwrap();

        let written = image::open(&dest).unwrap();
        assert_eq!(written.dimensions(), (4, 3));
        assert_eq!(file_names(dir.path()), vec!["art.png"]);
    }

    #[test]
    fn overlapping_writes_use_separate_temp_files() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("art.png");

        // A write that has not been persisted yet
        let mut pending = sibling_temp(&dest).unwrap();
        pending.write_all(b"half-written").unwrap();
        let other = sibling_temp(&dest).unwrap();
        assert_ne!(pending.path(), other.path());
        drop(other);

        let image = decode(&png_bytes(6, 2)).unwrap();
        write_png_atomic(&image, &dest).unwrap();

        assert_eq!(image::open(&dest).unwrap().dimensions(), (6, 2));
        assert_eq!(std::fs::read(pending.path()).unwrap(), b"half-written");
        let pending_name = pending.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(pending_name.starts_with(".art.png."));
        assert!(pending_name.ends_with(".tmp"));
    }

    #[test]
    fn write_png_atomic_reports_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing-dir").join("art.png");
        let image = decode(&png_bytes(4, 3)).unwrap();

        assert!(matches!(
            write_png_atomic(&image, &dest),
            Err(ArtworkError::Write { .. })
        ));
    }

    #[test]
    fn ensure_placeholder_creates_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("placeholder.png");

        assert!(ensure_placeholder(&path, (16, 16), [0, 0, 0]).unwrap());
        assert!(!ensure_placeholder(&path, (16, 16), [0, 0, 0]).unwrap());
        assert_eq!(image::open(&path).unwrap().dimensions(), (16, 16));
    }

    #[test]
    fn install_placeholder_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let placeholder = dir.path().join("placeholder.png");
        let dest = dir.path().join("art.png");
        ensure_placeholder(&placeholder, (8, 8), [10, 20, 30]).unwrap();
        std::fs::write(&dest, png_bytes(3, 3)).unwrap();

        install_placeholder(&placeholder, &dest).unwrap();

        assert_eq!(
            std::fs::read(&dest).unwrap(),
            std::fs::read(&placeholder).unwrap()
        );
        assert_eq!(file_names(dir.path()), vec!["art.png", "placeholder.png"]);
    }

    #[test]
    fn install_placeholder_requires_source() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            install_placeholder(&dir.path().join("nope.png"), &dir.path().join("art.png")),
            Err(ArtworkError::Placeholder { .. })
        ));
    }
}
