//! EXIF fields the annotations map onto.
//!
//! Reading goes through `kamadak-exif` and is best-effort per field: a field that
//! fails to decode is simply absent. Writing edits the TIFF structure directly
//! (see `tiff`) so unrelated tags and the thumbnail are carried over.

use exif::{Context, Exif, In, Reader, Tag, Value};
use tracing::debug;

use super::Metadata;
use super::tiff::{ByteOrder, Entry, TAG_EXIF_IFD, Tiff};
use crate::errors::EyepairError;

const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
const TAG_USER_COMMENT: u16 = 0x9286;
const TAG_XP_TITLE: u16 = 0x9C9B;
const TAG_XP_COMMENT: u16 = 0x9C9C;
const TAG_XP_SUBJECT: u16 = 0x9C9F;

const PREFIX_ASCII: &[u8; 8] = b"ASCII\0\0\0";
const PREFIX_UNICODE: &[u8; 8] = b"UNICODE\0";

/// Annotation-relevant values found in an EXIF block.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ExifFields {
    pub title: Option<String>,
    pub comment: Option<String>,
    pub subject: Option<String>,
}

fn parse(tiff: &[u8]) -> Option<Exif> {
    match Reader::new().read_raw(tiff.to_vec()) {
        Ok(exif) => Some(exif),
        Err(e) => {
            debug!(error = %e, "EXIF block not readable");
            None
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!t.is_empty()).then(|| t.to_string())
}

/// UTF-16 code units to text, in the given byte order.
fn decode_utf16(bytes: &[u8], little_endian: bool) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| {
            if little_endian {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                u16::from_be_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut out: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    out.extend_from_slice(&[0, 0]);
    out
}

fn image_description(exif: &Exif) -> Option<String> {
    let field = exif.get_field(Tag::ImageDescription, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => {
            let joined: Vec<u8> = parts.iter().flatten().copied().collect();
            non_empty(String::from_utf8_lossy(&joined).into_owned())
        }
        other => {
            debug!(value = ?other, "Unexpected ImageDescription type");
            None
        }
    }
}

/// Decode an EXIF UserComment: 8-byte charset prefix followed by the text.
pub(crate) fn decode_user_comment(raw: &[u8], little_endian: bool) -> Option<String> {
    if raw.len() < 8 {
        return non_empty(String::from_utf8_lossy(raw).into_owned());
    }
    let (prefix, body) = raw.split_at(8);
    let text = if prefix == PREFIX_UNICODE {
        decode_utf16(body, little_endian)
    } else {
        // ASCII, undefined (all zero) and, lossily, JIS
        String::from_utf8_lossy(body).into_owned()
    };
    non_empty(text)
}

fn user_comment(exif: &Exif) -> Option<String> {
    let field = exif.get_field(Tag::UserComment, In::PRIMARY)?;
    match &field.value {
        Value::Undefined(raw, _) => decode_user_comment(raw, exif.little_endian()),
        other => {
            debug!(value = ?other, "Unexpected UserComment type");
            None
        }
    }
}

fn xp_subject(exif: &Exif) -> Option<String> {
    let field = exif.get_field(Tag(Context::Tiff, TAG_XP_SUBJECT), In::PRIMARY)?;
    match &field.value {
        // XP* tags are UTF-16LE regardless of the TIFF byte order.
        Value::Byte(raw) | Value::Undefined(raw, _) => non_empty(decode_utf16(raw, true)),
        other => {
            debug!(value = ?other, "Unexpected XPSubject type");
            None
        }
    }
}

/// Extract the annotation fields from a raw TIFF block.
pub(crate) fn read_fields(tiff: &[u8]) -> ExifFields {
    let Some(exif) = parse(tiff) else {
        return ExifFields::default();
    };
    ExifFields {
        title: image_description(&exif),
        comment: user_comment(&exif),
        subject: xp_subject(&exif),
    }
}

/// One line per EXIF field, for diagnostics.
pub(crate) fn dump(tiff: &[u8]) -> Vec<String> {
    let Some(exif) = parse(tiff) else {
        return Vec::new();
    };
    exif.fields()
        .map(|f| {
            format!(
                "[IFD{}] {} = {}",
                f.ifd_num.index(),
                f.tag,
                f.display_value().with_unit(&exif)
            )
        })
        .collect()
}

fn encode_user_comment(text: &str, order: ByteOrder) -> Vec<u8> {
    if text.is_ascii() {
        let mut out = PREFIX_ASCII.to_vec();
        out.extend_from_slice(text.as_bytes());
        return out;
    }
    let mut out = PREFIX_UNICODE.to_vec();
    for unit in text.encode_utf16() {
        match order {
            ByteOrder::Little => out.extend_from_slice(&unit.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&unit.to_be_bytes()),
        }
    }
    out
}

/// Apply title/comment/subject to an existing TIFF block (or a new one) and
/// serialize it. `None` fields are left as they are.
pub(crate) fn apply(existing: Option<&[u8]>, meta: &Metadata) -> Result<Vec<u8>, EyepairError> {
    let mut tiff = match existing {
        Some(bytes) if !bytes.is_empty() => Tiff::parse(bytes)?,
        _ => Tiff::new(ByteOrder::Little),
    };

    if let Some(title) = meta.title.as_deref() {
        tiff.ifd0.set(Entry::ascii(TAG_IMAGE_DESCRIPTION, title));
        tiff.ifd0.set(Entry::bytes(TAG_XP_TITLE, encode_utf16le(title)));
    }
    if let Some(comment) = meta.comment.as_deref() {
        tiff.ifd0.remove(TAG_XP_COMMENT);
        let order = tiff.order;
        tiff.ifd0
            .child_mut_or_insert(TAG_EXIF_IFD)
            .set(Entry::undefined(TAG_USER_COMMENT, encode_user_comment(comment, order)));
    }
    if let Some(subject) = meta.subject.as_deref() {
        tiff.ifd0.set(Entry::bytes(TAG_XP_SUBJECT, encode_utf16le(subject)));
    }
    tiff.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str, comment: &str, subject: &str) -> Metadata {
        Metadata {
            title: Some(title.into()),
            comment: Some(comment.into()),
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    #[test]
    fn written_fields_read_back() {
        let tiff = apply(None, &meta("Eye L", "follow-up", "iris")).unwrap();
        let f = read_fields(&tiff);
        assert_eq!(f.title.as_deref(), Some("Eye L"));
        assert_eq!(f.comment.as_deref(), Some("follow-up"));
        assert_eq!(f.subject.as_deref(), Some("iris"));
    }

    #[test]
    fn non_ascii_comment_uses_unicode_prefix() {
        let tiff = apply(None, &meta("t", "Kontrolle nächste Woche", "s")).unwrap();
        let parsed = Tiff::parse(&tiff).unwrap();
        let raw = &parsed
            .ifd0
            .child(TAG_EXIF_IFD)
            .unwrap()
            .get(TAG_USER_COMMENT)
            .unwrap()
            .data;
        assert!(raw.starts_with(PREFIX_UNICODE));
        assert_eq!(
            read_fields(&tiff).comment.as_deref(),
            Some("Kontrolle nächste Woche")
        );
    }

    #[test]
    fn comment_write_drops_xp_comment() {
        let mut base = Tiff::new(ByteOrder::Big);
        base.ifd0.set(Entry::bytes(TAG_XP_COMMENT, encode_utf16le("old")));
        base.ifd0.set(Entry::ascii(0x010F, "EyeCam"));
        let bytes = base.to_bytes().unwrap();

        let only_comment = Metadata {
            comment: Some("new".into()),
            ..Default::default()
        };
        let out = Tiff::parse(&apply(Some(&bytes), &only_comment).unwrap()).unwrap();
        assert_eq!(out.order, ByteOrder::Big);
        assert!(out.ifd0.get(TAG_XP_COMMENT).is_none());
        assert_eq!(out.ifd0.get(0x010F).unwrap().data, b"EyeCam\0");
        assert!(out.ifd0.get(TAG_IMAGE_DESCRIPTION).is_none());
    }

    #[test]
    fn unreadable_block_yields_nothing() {
        assert_eq!(read_fields(b"garbage"), ExifFields::default());
        assert!(dump(b"garbage").is_empty());
    }

    #[test]
    fn corrupt_existing_block_is_a_write_error() {
        assert!(apply(Some(b"not a tiff"), &meta("a", "b", "c")).is_err());
    }

    #[test]
    fn user_comment_prefixes() {
        assert_eq!(
            decode_user_comment(b"ASCII\0\0\0hi\0", true).as_deref(),
            Some("hi")
        );
        assert_eq!(
            decode_user_comment(b"UNICODE\0\0h\0i", false).as_deref(),
            Some("hi")
        );
        assert_eq!(decode_user_comment(b"\0\0\0\0\0\0\0\0", true), None);
    }
}
