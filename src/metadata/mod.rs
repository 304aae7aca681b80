//! JPEG-embedded annotation metadata.
//!
//! Values live in two places inside the image: an XMP packet (custom `eye:`
//! namespace plus standard Dublin Core / EXIF / Microsoft region properties) and
//! the EXIF block. Reading merges them per field:
//! 1. custom XMP namespace
//! 2. EXIF tags (title, comment, subject only)
//! 3. standard XMP properties
//!
//! Writing goes through the storage executor's atomic rewrite, one commit for XMP
//! and (store option 2) a second one for EXIF. `None` fields are never cleared.

mod exif_fields;
mod jpeg;
mod tiff;
mod xmp;

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::EyepairError;
use crate::storage::StorageExecutor;
use crate::storage::rewrite::write_atomically;
use jpeg::JpegFile;
use xmp::{
    KEY_COMMENT, KEY_DESCRIPTION, KEY_OVERLAY_SCALE_FACTOR, KEY_PERSON, KEY_SUBJECT, KEY_TITLE,
    KEY_X_CENTER, KEY_Y_CENTER, NS_DC, NS_EXIF, NS_MPREG, XmpValues,
};

pub use xmp::NS_EYE;

/// Annotations of one eye photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub comment: Option<String>,
    pub person: Option<String>,
    pub x_center: Option<f32>,
    pub y_center: Option<f32>,
    pub overlay_scale_factor: Option<f32>,
}

impl Metadata {
    /// All three overlay values are known.
    pub fn has_coordinates(&self) -> bool {
        self.x_center.is_some() && self.y_center.is_some() && self.overlay_scale_factor.is_some()
    }

    pub fn x_center_string(&self) -> Option<String> {
        self.x_center.map(|v| v.to_string())
    }

    pub fn y_center_string(&self) -> Option<String> {
        self.y_center.map(|v| v.to_string())
    }

    pub fn overlay_scale_factor_string(&self) -> Option<String> {
        self.overlay_scale_factor.map(|v| v.to_string())
    }

    fn has_exif_fields(&self) -> bool {
        self.title.is_some() || self.comment.is_some() || self.subject.is_some()
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show(v: Option<&str>) -> &str {
            v.unwrap_or("-")
        }
        let x = self.x_center_string();
        let y = self.y_center_string();
        let s = self.overlay_scale_factor_string();
        writeln!(f, "Title: {}", show(self.title.as_deref()))?;
        writeln!(f, "Description: {}", show(self.description.as_deref()))?;
        writeln!(f, "Subject: {}", show(self.subject.as_deref()))?;
        writeln!(f, "Comment: {}", show(self.comment.as_deref()))?;
        writeln!(f, "Person: {}", show(self.person.as_deref()))?;
        writeln!(f, "X-Position: {}", show(x.as_deref()))?;
        writeln!(f, "Y-Position: {}", show(y.as_deref()))?;
        write!(f, "OverlayScaleFactor: {}", show(s.as_deref()))
    }
}

/// Where annotations are stored on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreOption {
    /// Images are never modified.
    Disabled,
    /// Custom XMP namespace only.
    XmpOnly,
    /// XMP (custom and standard properties) plus EXIF.
    #[default]
    XmpAndExif,
}

impl StoreOption {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(StoreOption::Disabled),
            1 => Some(StoreOption::XmpOnly),
            2 => Some(StoreOption::XmpAndExif),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            StoreOption::Disabled => 0,
            StoreOption::XmpOnly => 1,
            StoreOption::XmpAndExif => 2,
        }
    }

    fn writes_standard(self) -> bool {
        self == StoreOption::XmpAndExif
    }
}

impl fmt::Display for StoreOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl FromStr for StoreOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(StoreOption::from_u8)
            .ok_or_else(|| format!("invalid store option '{s}' (expected 0, 1 or 2)"))
    }
}

/// Decimal text to `f32`; unparsable text degrades to absent.
fn parse_coordinate(field: &'static str, raw: Option<String>) -> Option<f32> {
    let raw = raw?;
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            let e = EyepairError::ParseDegraded { field, value: raw };
            warn!(code = e.code(), kind = e.kind_label(), "{e}");
            None
        }
    }
}

/// Reads and writes annotations inside JPEG files.
#[derive(Debug, Clone)]
pub struct MetadataCodec {
    storage: Arc<StorageExecutor>,
    store_option: StoreOption,
}

impl MetadataCodec {
    pub fn new(storage: Arc<StorageExecutor>, store_option: StoreOption) -> Self {
        Self {
            storage,
            store_option,
        }
    }

    pub fn store_option(&self) -> StoreOption {
        self.store_option
    }

    fn xmp_values(jpeg: &JpegFile) -> XmpValues {
        let Some(packet) = jpeg.xmp() else {
            return XmpValues::default();
        };
        match xmp::parse(&packet) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %jpeg.path().display(), error = %e, "Ignoring unreadable XMP packet");
                XmpValues::default()
            }
        }
    }

    /// Merged annotations of `path`.
    pub fn read(&self, path: &Path) -> Result<Metadata, EyepairError> {
        let jpeg = JpegFile::load(path)?;
        let xmp = Self::xmp_values(&jpeg);
        let exif = jpeg
            .exif()
            .map(|tiff| exif_fields::read_fields(&tiff))
            .unwrap_or_default();

        let meta = Metadata {
            title: xmp
                .custom(KEY_TITLE)
                .or(exif.title)
                .or_else(|| xmp.get(NS_DC, "title")),
            description: xmp
                .custom(KEY_DESCRIPTION)
                .or_else(|| xmp.get(NS_DC, "description")),
            subject: xmp
                .custom(KEY_SUBJECT)
                .or(exif.subject)
                .or_else(|| xmp.get(NS_DC, "subject")),
            comment: xmp
                .custom(KEY_COMMENT)
                .or(exif.comment)
                .or_else(|| xmp.get(NS_EXIF, "UserComment")),
            person: xmp
                .custom(KEY_PERSON)
                .or_else(|| xmp.get(NS_MPREG, "PersonDisplayName")),
            x_center: parse_coordinate(KEY_X_CENTER, xmp.custom(KEY_X_CENTER)),
            y_center: parse_coordinate(KEY_Y_CENTER, xmp.custom(KEY_Y_CENTER)),
            overlay_scale_factor: parse_coordinate(
                KEY_OVERLAY_SCALE_FACTOR,
                xmp.custom(KEY_OVERLAY_SCALE_FACTOR),
            ),
        };
        debug!(path = %path.display(), coordinates = meta.has_coordinates(), "Metadata read");
        Ok(meta)
    }

    /// Store `meta` in `path` according to the store option.
    pub fn write(&self, path: &Path, meta: &Metadata) -> Result<(), EyepairError> {
        if self.store_option == StoreOption::Disabled {
            debug!(path = %path.display(), "Store option 0; image left unchanged");
            return Ok(());
        }

        let mut jpeg = JpegFile::load(path)?;
        let packet = xmp::merge(
            jpeg.xmp().as_deref(),
            meta,
            self.store_option.writes_standard(),
        )?;
        jpeg.set_xmp(&packet)?;
        let bytes = jpeg.into_bytes();
        let tier = write_atomically(&self.storage, path, |w| w.write_all(&bytes))?;
        info!(path = %path.display(), tier = %tier, "XMP metadata committed");

        if self.store_option != StoreOption::XmpAndExif {
            return Ok(());
        }
        if !meta.has_exif_fields() {
            debug!(path = %path.display(), "No EXIF fields assigned; skipping EXIF commit");
            return Ok(());
        }
        let mut jpeg = JpegFile::load(path)?;
        let tiff = exif_fields::apply(jpeg.exif().as_deref(), meta)?;
        jpeg.set_exif(&tiff)?;
        let bytes = jpeg.into_bytes();
        let tier = write_atomically(&self.storage, path, |w| w.write_all(&bytes))?;
        info!(path = %path.display(), tier = %tier, "EXIF metadata committed");
        Ok(())
    }

    /// Log and return every EXIF field of `path`.
    pub fn dump_exif(&self, path: &Path) -> Result<Vec<String>, EyepairError> {
        let jpeg = JpegFile::load(path)?;
        let lines = jpeg
            .exif()
            .map(|tiff| exif_fields::dump(&tiff))
            .unwrap_or_default();
        for line in &lines {
            info!(path = %path.display(), "{line}");
        }
        Ok(lines)
    }

    /// Log and return the raw XMP packet of `path`.
    pub fn dump_xmp(&self, path: &Path) -> Result<Option<String>, EyepairError> {
        let jpeg = JpegFile::load(path)?;
        let packet = jpeg.xmp();
        match &packet {
            Some(p) => info!(path = %path.display(), "{p}"),
            None => info!(path = %path.display(), "No XMP packet"),
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageContext;
    use std::fs;
    use tempfile::tempdir;

    fn codec(option: StoreOption) -> MetadataCodec {
        MetadataCodec::new(
            Arc::new(StorageExecutor::new(StorageContext::new())),
            option,
        )
    }

    fn eye_l() -> Metadata {
        Metadata {
            title: Some("Eye L".into()),
            comment: Some("follow-up".into()),
            x_center: Some(0.5),
            y_center: Some(0.4),
            overlay_scale_factor: Some(1.2),
            ..Default::default()
        }
    }

    #[test]
    fn store_option_parsing() {
        assert_eq!("0".parse::<StoreOption>().unwrap(), StoreOption::Disabled);
        assert_eq!(" 2 ".parse::<StoreOption>().unwrap(), StoreOption::XmpAndExif);
        assert!("3".parse::<StoreOption>().is_err());
        assert_eq!(StoreOption::default().as_u8(), 2);
        assert_eq!(StoreOption::XmpOnly.to_string(), "1");
    }

    #[test]
    fn display_lists_every_field() {
        let text = eye_l().to_string();
        assert!(text.contains("Title: Eye L"));
        assert!(text.contains("Person: -"));
        assert!(text.contains("OverlayScaleFactor: 1.2"));
    }

    #[test]
    fn coordinate_strings_are_absent_when_unset() {
        let m = Metadata::default();
        assert_eq!(m.x_center_string(), None);
        assert!(!m.has_coordinates());
        assert!(eye_l().has_coordinates());
    }

    #[test]
    fn unparsable_coordinate_degrades() {
        assert_eq!(parse_coordinate(KEY_X_CENTER, Some("abc".into())), None);
        assert_eq!(parse_coordinate(KEY_X_CENTER, Some(" 0.25 ".into())), Some(0.25));
        assert_eq!(parse_coordinate(KEY_X_CENTER, None), None);
    }

    #[test]
    fn round_trip_with_full_store_option() {
        let td = tempdir().unwrap();
        let p = td.path().join("eye.jpg");
        fs::write(&p, jpeg::tests::tiny_jpeg()).unwrap();
        let c = codec(StoreOption::XmpAndExif);
        c.write(&p, &eye_l()).unwrap();
        assert_eq!(c.read(&p).unwrap(), eye_l());
        assert!(!td.path().join("eye.jpg.temp").exists());
    }

    #[test]
    fn disabled_store_option_leaves_bytes_alone() {
        let td = tempdir().unwrap();
        let p = td.path().join("eye.jpg");
        let original = jpeg::tests::tiny_jpeg();
        fs::write(&p, &original).unwrap();
        codec(StoreOption::Disabled).write(&p, &eye_l()).unwrap();
        assert_eq!(fs::read(&p).unwrap(), original);
    }

    #[test]
    fn non_jpeg_is_rejected() {
        let td = tempdir().unwrap();
        let p = td.path().join("eye.png");
        fs::write(&p, b"\x89PNG\r\n\x1a\n").unwrap();
        let err = codec(StoreOption::XmpAndExif).read(&p).unwrap_err();
        assert!(matches!(err, EyepairError::UnsupportedFormat(_)));
    }
}
