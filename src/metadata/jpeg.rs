//! JPEG segment access via `img-parts`. Only APP1 payloads are touched; the
//! entropy-coded image data is carried over byte for byte.

use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::EyepairError;

const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;

pub(crate) const EXIF_HEADER: &[u8] = b"Exif\0\0";
pub(crate) const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Largest segment payload a 16-bit length field can describe.
pub(crate) const MAX_SEGMENT_PAYLOAD: usize = 65533;

const SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

pub(crate) struct JpegFile {
    path: PathBuf,
    jpeg: Jpeg,
}

impl JpegFile {
    pub(crate) fn load(path: &Path) -> Result<Self, EyepairError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(path, bytes)
    }

    pub(crate) fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, EyepairError> {
        if !bytes.starts_with(&SOI) {
            return Err(EyepairError::UnsupportedFormat(path.to_path_buf()));
        }
        let jpeg = Jpeg::from_bytes(Bytes::from(bytes))
            .map_err(|e| EyepairError::format("JPEG", e))?;
        Ok(Self {
            path: path.to_path_buf(),
            jpeg,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn find_app1(&self, header: &[u8]) -> Option<usize> {
        find_app1(self.jpeg.segments(), header)
    }

    /// Raw TIFF block of the EXIF segment, without the `Exif\0\0` header.
    pub(crate) fn exif(&self) -> Option<Vec<u8>> {
        let idx = self.find_app1(EXIF_HEADER)?;
        Some(self.jpeg.segments()[idx].contents()[EXIF_HEADER.len()..].to_vec())
    }

    /// XMP packet text of the first standard XMP segment.
    pub(crate) fn xmp(&self) -> Option<String> {
        let idx = self.find_app1(XMP_HEADER)?;
        let body = &self.jpeg.segments()[idx].contents()[XMP_HEADER.len()..];
        Some(String::from_utf8_lossy(body).into_owned())
    }

    pub(crate) fn set_exif(&mut self, tiff: &[u8]) -> Result<(), EyepairError> {
        let segment = app1(EXIF_HEADER, tiff)?;
        let segments = self.jpeg.segments_mut();
        match find_app1(segments, EXIF_HEADER) {
            Some(idx) => segments[idx] = segment,
            None => {
                let at = after_app0(segments);
                segments.insert(at, segment);
            }
        }
        Ok(())
    }

    pub(crate) fn set_xmp(&mut self, packet: &str) -> Result<(), EyepairError> {
        let segment = app1(XMP_HEADER, packet.as_bytes())?;
        let segments = self.jpeg.segments_mut();
        match find_app1(segments, XMP_HEADER) {
            Some(idx) => segments[idx] = segment,
            None => {
                let at = find_app1(segments, EXIF_HEADER)
                    .map(|i| i + 1)
                    .unwrap_or_else(|| after_app0(segments));
                segments.insert(at, segment);
            }
        }
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.jpeg.encoder().bytes().to_vec()
    }
}

fn find_app1(segments: &[JpegSegment], header: &[u8]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == MARKER_APP1 && s.contents().starts_with(header))
}

/// Index just past the leading APP0 (JFIF/JFXX) segments.
fn after_app0(segments: &[JpegSegment]) -> usize {
    segments
        .iter()
        .take_while(|s| s.marker() == MARKER_APP0)
        .count()
}

fn app1(header: &[u8], body: &[u8]) -> Result<JpegSegment, EyepairError> {
    let size = header.len() + body.len();
    if size > MAX_SEGMENT_PAYLOAD {
        return Err(EyepairError::SegmentTooLarge {
            size,
            limit: MAX_SEGMENT_PAYLOAD,
        });
    }
    let mut contents = Vec::with_capacity(size);
    contents.extend_from_slice(header);
    contents.extend_from_slice(body);
    Ok(JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(contents)))
}
