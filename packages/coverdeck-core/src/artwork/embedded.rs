//! Embedded cover extraction straight from the media file.
//!
//! The container is not trusted from the extension: each supported tag layout
//! is forced in turn (ID3v2 frames, FLAC metadata blocks, MP4 atoms) and the
//! first one that yields picture bytes wins.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::{FileType, TaggedFile, TaggedFileExt};
use lofty::probe::Probe;

use super::ArtSource;

/// Tag layouts in the order they are tried.
const LAYOUTS: [(FileType, ArtSource); 3] = [
    (FileType::Mpeg, ArtSource::EmbeddedId3),
    (FileType::Flac, ArtSource::EmbeddedFlac),
    (FileType::Mp4, ArtSource::EmbeddedMp4),
];

fn cover_parse_options() -> ParseOptions {
    ParseOptions::new()
        .read_properties(false)
        .read_cover_art(true)
        .parsing_mode(ParsingMode::BestAttempt)
        .max_junk_bytes(1024)
}

/// Returns the first embedded picture found in `path`, tagged with the
/// layout it came from.
pub fn extract_cover(path: &Path) -> Option<(ArtSource, Vec<u8>)> {
    LAYOUTS.iter().find_map(|(file_type, source)| {
        read_as(path, *file_type)
            .and_then(|tagged| first_picture(&tagged))
            .map(|bytes| (*source, bytes))
    })
}

fn read_as(path: &Path, file_type: FileType) -> Option<TaggedFile> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("[ArtResolver] Cannot open {}: {}", path.display(), e);
            return None;
        }
    };

    match Probe::new(BufReader::new(file))
        .options(cover_parse_options())
        .set_file_type(file_type)
        .read()
    {
        Ok(tagged) => Some(tagged),
        Err(e) => {
            log::debug!(
                "[ArtResolver] No {:?} tags in {}: {}",
                file_type,
                path.display(),
                e
            );
            None
        }
    }
}

fn first_picture(tagged: &TaggedFile) -> Option<Vec<u8>> {
    tagged
        .primary_tag()
        .into_iter()
        .chain(tagged.tags())
        .flat_map(|tag| tag.pictures())
        .map(|picture| picture.data())
        .find(|data| !data.is_empty())
        .map(<[u8]>::to_vec)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artwork::normalize::tests::png_bytes;
    use tempfile::TempDir;

    fn block(kind: u8, last: bool, body: &[u8]) -> Vec<u8> {
        let len = body.len() as u32;
        let mut out = vec![kind | if last { 0x80 } else { 0 }];
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.extend_from_slice(body);
        out
    }

    /// Builds a minimal FLAC stream: STREAMINFO, an empty VORBIS_COMMENT and
    /// a front-cover PICTURE block holding `image`. No audio frames.
    pub(crate) fn flac_with_picture(image: &[u8]) -> Vec<u8> {
        let mut stream_info = vec![0x10, 0x00, 0x10, 0x00];
        stream_info.extend_from_slice(&[0; 6]);
        // 44100 Hz, 2 channels, 16 bits per sample
        stream_info.extend_from_slice(&[0x0A, 0xC4, 0x42, 0xF0]);
        stream_info.extend_from_slice(&[0; 20]);

        let vendor = b"coverdeck";
        let mut comments = (vendor.len() as u32).to_le_bytes().to_vec();
        comments.extend_from_slice(vendor);
        comments.extend_from_slice(&0u32.to_le_bytes());

        let mime = b"image/png";
        let mut picture = 3u32.to_be_bytes().to_vec();
        picture.extend_from_slice(&(mime.len() as u32).to_be_bytes());
        picture.extend_from_slice(mime);
        picture.extend_from_slice(&0u32.to_be_bytes());
        for _ in 0..4 {
            picture.extend_from_slice(&0u32.to_be_bytes());
        }
        picture.extend_from_slice(&(image.len() as u32).to_be_bytes());
        picture.extend_from_slice(image);

        let mut out = b"fLaC".to_vec();
        out.extend(block(0, false, &stream_info));
        out.extend(block(4, false, &comments));
        out.extend(block(6, true, &picture));
        out
    }

    /// One ID3v2.3 frame: plain big-endian size, no flags.
    fn id3_frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(body);
        out
    }

    /// Front-cover APIC frame holding a PNG.
    fn apic_frame(image: &[u8]) -> Vec<u8> {
        let mut body = vec![0];
        body.extend_from_slice(b"image/png\0");
        body.push(3);
        body.push(0);
        body.extend_from_slice(image);
        id3_frame(b"APIC", &body)
    }

    fn title_frame(title: &str) -> Vec<u8> {
        let mut body = vec![0];
        body.extend_from_slice(title.as_bytes());
        id3_frame(b"TIT2", &body)
    }

    /// ID3v2.3 tag wrapping `frames`, with a syncsafe size.
    fn id3_tag(frames: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = frames.concat();
        let size = body.len() as u32;
        let mut out = b"ID3\x03\x00\x00".to_vec();
        for shift in [21, 14, 7, 0] {
            out.push(((size >> shift) & 0x7F) as u8);
        }
        out.extend(body);
        out
    }

    fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    /// Minimal MP4: `ftyp` plus `moov.udta.meta.ilst.covr` holding a PNG.
    fn mp4_with_cover(image: &[u8]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 14, 0, 0, 0, 0];
        data.extend_from_slice(image);
        let ilst = atom(b"ilst", &atom(b"covr", &atom(b"data", &data)));
        let mut meta = vec![0; 4];
        meta.extend(ilst);
        let moov = atom(b"moov", &atom(b"udta", &atom(b"meta", &meta)));

        let mut out = atom(b"ftyp", b"M4A \0\0\0\0M4A isom");
        out.extend(moov);
        out
    }

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn id3_picture_is_found_in_id3_layout() {
        let dir = TempDir::new().unwrap();
        let cover = png_bytes(10, 10);
        let mut mp3 = id3_tag(&[title_frame("Intro"), apic_frame(&cover)]);
        mp3.extend_from_slice(&[0; 256]);
        let path = write(&dir, "01.mp3", &mp3);

        let (source, bytes) = extract_cover(&path).expect("embedded picture");
        assert_eq!(source, ArtSource::EmbeddedId3);
        assert_eq!(bytes, cover);
    }

    #[test]
    fn mp4_cover_atom_is_found_in_mp4_layout() {
        let dir = TempDir::new().unwrap();
        let cover = png_bytes(9, 7);
        let path = write(&dir, "01.m4a", &mp4_with_cover(&cover));

        let (source, bytes) = extract_cover(&path).expect("embedded picture");
        assert_eq!(source, ArtSource::EmbeddedMp4);
        assert_eq!(bytes, cover);
    }

    #[test]
    fn id3_layout_is_tried_before_flac_layout() {
        let dir = TempDir::new().unwrap();
        let id3_cover = png_bytes(5, 5);
        let flac_cover = png_bytes(8, 4);
        // FLAC stream prefixed by an ID3v2 tag: both layouts carry a picture
        let mut both = id3_tag(&[apic_frame(&id3_cover)]);
        both.extend(flac_with_picture(&flac_cover));
        let path = write(&dir, "01.flac", &both);

        let (source, bytes) = extract_cover(&path).expect("embedded picture");
        assert_eq!(source, ArtSource::EmbeddedId3);
        assert_eq!(bytes, id3_cover);
    }

    #[test]
    fn id3_tag_without_picture_falls_through_to_flac() {
        let dir = TempDir::new().unwrap();
        let flac_cover = png_bytes(8, 4);
        let mut tagged = id3_tag(&[title_frame("Intro")]);
        tagged.extend(flac_with_picture(&flac_cover));
        let path = write(&dir, "01.flac", &tagged);

        let (source, bytes) = extract_cover(&path).expect("embedded picture");
        assert_eq!(source, ArtSource::EmbeddedFlac);
        assert_eq!(bytes, flac_cover);
    }

    #[test]
    fn flac_picture_is_found_in_flac_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("01.flac");
        let cover = png_bytes(12, 9);
        std::fs::write(&path, flac_with_picture(&cover)).unwrap();

        let (source, bytes) = extract_cover(&path).expect("embedded picture");
        assert_eq!(source, ArtSource::EmbeddedFlac);
        assert_eq!(bytes, cover);
    }

    #[test]
    fn file_without_tags_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, vec![0u8; 256]).unwrap();

        assert!(extract_cover(&path).is_none());
    }

    #[test]
    fn missing_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(extract_cover(&dir.path().join("absent.flac")).is_none());
    }
}
