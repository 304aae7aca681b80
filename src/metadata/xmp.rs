//! XMP packet reading and merge-writing with `quick-xml`.
//!
//! Reading flattens the RDF into (namespace, property, lang, value) records and
//! answers lookups from them:
//! - language alternatives (`rdf:Alt`) prefer `x-default`
//! - bags and sequences are joined with ", "
//! - anything else yields the first occurrence
//!
//! Writing streams the existing packet through unchanged, drops the top-level
//! properties about to be assigned and appends one `rdf:Description` holding the
//! new values just before `</rdf:RDF>`. Unknown content is preserved.

use quick_xml::Writer;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::io::Write;

use super::Metadata;
use crate::errors::EyepairError;

pub const NS_EYE: &str = "http://ns.eyepair.org/annotation/1.0/";
pub(crate) const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub(crate) const NS_EXIF: &str = "http://ns.adobe.com/exif/1.0/";
pub(crate) const NS_MPREG: &str = "http://schemas.microsoft.com/photo/1.2/wpg/region/";
const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

pub(crate) const KEY_TITLE: &str = "title";
pub(crate) const KEY_DESCRIPTION: &str = "description";
pub(crate) const KEY_SUBJECT: &str = "subject";
pub(crate) const KEY_COMMENT: &str = "comment";
pub(crate) const KEY_PERSON: &str = "person";
pub(crate) const KEY_X_CENTER: &str = "x-center";
pub(crate) const KEY_Y_CENTER: &str = "y-center";
pub(crate) const KEY_OVERLAY_SCALE_FACTOR: &str = "overlay-scale-factor";

const FRESH_PACKET: &str = concat!(
    "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n",
    "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n",
    " <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
    " </rdf:RDF>\n",
    "</x:xmpmeta>\n",
    "<?xpacket end=\"w\"?>"
);

fn xml_err(e: impl ToString) -> EyepairError {
    EyepairError::format("XMP", e)
}

fn owned_ns(r: ResolveResult<'_>) -> Option<String> {
    match r {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn lossy(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

#[derive(Debug, Clone, PartialEq)]
struct Record {
    ns: Option<String>,
    local: String,
    lang: Option<String>,
    in_list: bool,
    value: String,
}

/// Flattened property values of one packet.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct XmpValues {
    records: Vec<Record>,
}

impl XmpValues {
    pub(crate) fn get(&self, ns: &str, local: &str) -> Option<String> {
        let hits: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| r.ns.as_deref() == Some(ns) && r.local == local)
            .collect();
        let first = hits.first()?;
        if hits.iter().any(|r| r.in_list) {
            let joined: Vec<&str> = hits
                .iter()
                .filter(|r| r.in_list)
                .map(|r| r.value.as_str())
                .collect();
            return Some(joined.join(", "));
        }
        if let Some(r) = hits.iter().find(|r| r.lang.as_deref() == Some("x-default")) {
            return Some(r.value.clone());
        }
        Some(first.value.clone())
    }

    /// Value from the eyepair annotation namespace.
    pub(crate) fn custom(&self, key: &str) -> Option<String> {
        self.get(NS_EYE, key)
    }
}

struct Frame {
    ns: Option<String>,
    local: String,
    lang: Option<String>,
    text: String,
}

fn open_frame(
    reader: &NsReader<&[u8]>,
    ns: Option<String>,
    e: &BytesStart<'_>,
    parent_lang: Option<String>,
    records: &mut Vec<Record>,
) -> Result<Frame, EyepairError> {
    let local = lossy(e.local_name().as_ref());
    let mut lang = parent_lang;
    let is_description = ns.as_deref() == Some(NS_RDF) && local == "Description";
    let mut attr_props = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = attr.key.as_ref();
        if key == b"xml:lang" {
            lang = Some(attr.unescape_value().map_err(xml_err)?.into_owned());
            continue;
        }
        if !is_description || key.starts_with(b"xmlns") {
            continue;
        }
        let (attr_ns, attr_local) = reader.resolve_attribute(attr.key);
        let attr_ns = owned_ns(attr_ns);
        if attr_ns.is_none() || attr_ns.as_deref() == Some(NS_RDF) {
            continue;
        }
        attr_props.push(Record {
            ns: attr_ns,
            local: lossy(attr_local.as_ref()),
            lang: None,
            in_list: false,
            value: attr.unescape_value().map_err(xml_err)?.into_owned(),
        });
    }
    records.extend(attr_props.into_iter().filter(|r| !r.value.trim().is_empty()));
    Ok(Frame {
        ns,
        local,
        lang,
        text: String::new(),
    })
}

fn close_frame(stack: &mut Vec<Frame>, records: &mut Vec<Record>) {
    let Some(frame) = stack.pop() else {
        return;
    };
    let value = frame.text.trim();
    if value.is_empty() {
        return;
    }
    // Owner is the nearest non-RDF element, the text's own element included.
    let mut in_list = false;
    let mut owner = None;
    for f in std::iter::once(&frame).chain(stack.iter().rev()) {
        if f.ns.as_deref() == Some(NS_RDF) {
            if f.local == "Bag" || f.local == "Seq" {
                in_list = true;
            }
            continue;
        }
        owner = Some(f);
        break;
    }
    let Some(owner) = owner else {
        return;
    };
    records.push(Record {
        ns: owner.ns.clone(),
        local: owner.local.clone(),
        lang: frame.lang.clone(),
        in_list,
        value: value.to_string(),
    });
}

fn push_text(stack: &mut [Frame], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(text);
    }
}

/// Parse a packet into lookup records. Malformed XML is a `Format` error.
pub(crate) fn parse(packet: &str) -> Result<XmpValues, EyepairError> {
    let mut reader = NsReader::from_str(packet);
    let mut stack: Vec<Frame> = Vec::new();
    let mut records = Vec::new();
    loop {
        let (ns, event) = reader.read_resolved_event().map_err(xml_err)?;
        let ns = owned_ns(ns);
        match event {
            Event::Start(e) => {
                let parent_lang = stack.last().and_then(|f| f.lang.clone());
                let frame = open_frame(&reader, ns, &e, parent_lang, &mut records)?;
                stack.push(frame);
            }
            Event::Empty(e) => {
                let parent_lang = stack.last().and_then(|f| f.lang.clone());
                let frame = open_frame(&reader, ns, &e, parent_lang, &mut records)?;
                stack.push(frame);
                close_frame(&mut stack, &mut records);
            }
            Event::End(_) => close_frame(&mut stack, &mut records),
            Event::Text(t) => push_text(&mut stack, &String::from_utf8_lossy(&t)),
            Event::CData(t) => push_text(&mut stack, &String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) => {
                let entity = format!("&{};", String::from_utf8_lossy(&r));
                let resolved = unescape(&entity).map_err(xml_err)?;
                push_text(&mut stack, &resolved);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(xml_err("unexpected end of packet"));
    }
    Ok(XmpValues { records })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Simple,
    Alt,
    Bag,
}

#[derive(Debug, Clone)]
struct Assignment {
    ns: &'static str,
    prefix: &'static str,
    local: &'static str,
    shape: Shape,
    value: String,
}

fn assignments(meta: &Metadata, include_dc: bool) -> Vec<Assignment> {
    let custom = |local, value: Option<String>| {
        value.map(|value| Assignment {
            ns: NS_EYE,
            prefix: "eye",
            local,
            shape: Shape::Simple,
            value,
        })
    };
    let mut out: Vec<Assignment> = [
        custom(KEY_TITLE, meta.title.clone()),
        custom(KEY_DESCRIPTION, meta.description.clone()),
        custom(KEY_SUBJECT, meta.subject.clone()),
        custom(KEY_COMMENT, meta.comment.clone()),
        custom(KEY_PERSON, meta.person.clone()),
        custom(KEY_X_CENTER, meta.x_center_string()),
        custom(KEY_Y_CENTER, meta.y_center_string()),
        custom(KEY_OVERLAY_SCALE_FACTOR, meta.overlay_scale_factor_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    if include_dc {
        let standard = [
            (NS_DC, "dc", "title", Shape::Alt, &meta.title),
            (NS_DC, "dc", "description", Shape::Alt, &meta.description),
            (NS_DC, "dc", "subject", Shape::Bag, &meta.subject),
            (NS_EXIF, "exif", "UserComment", Shape::Alt, &meta.comment),
            (NS_MPREG, "MPReg", "PersonDisplayName", Shape::Simple, &meta.person),
        ];
        for (ns, prefix, local, shape, value) in standard {
            if let Some(value) = value {
                out.push(Assignment {
                    ns,
                    prefix,
                    local,
                    shape,
                    value: value.clone(),
                });
            }
        }
    }
    out
}

fn is_assigned(assigned: &[Assignment], ns: &Option<String>, local: &str) -> bool {
    assigned
        .iter()
        .any(|a| ns.as_deref() == Some(a.ns) && a.local == local)
}

type ElementPath = Vec<(Option<String>, String)>;

fn ends_with_rdf(path: &ElementPath, local: &str) -> bool {
    matches!(path.last(), Some((ns, l)) if ns.as_deref() == Some(NS_RDF) && l == local)
}

/// A direct child of a top-level `rdf:Description`.
fn is_top_level_property(path: &ElementPath) -> bool {
    let n = path.len();
    n >= 2
        && ends_with_rdf(path, "Description")
        && matches!(&path[n - 2], (ns, l) if ns.as_deref() == Some(NS_RDF) && l == "RDF")
}

fn emit<W: Write>(w: &mut Writer<W>, ev: Event<'_>) -> Result<(), EyepairError> {
    w.write_event(ev).map_err(xml_err)
}

/// Drop attribute-form properties of a top-level description that are about to
/// be reassigned.
fn strip_assigned_attributes<'a>(
    reader: &NsReader<&[u8]>,
    e: BytesStart<'a>,
    path: &ElementPath,
    assigned: &[Assignment],
) -> Result<BytesStart<'a>, EyepairError> {
    if !ends_with_rdf(path, "RDF") {
        return Ok(e);
    }
    let mut out = BytesStart::new(lossy(e.name().as_ref()));
    let mut dropped = false;
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let (ns, local) = reader.resolve_attribute(attr.key);
        if is_assigned(assigned, &owned_ns(ns), &lossy(local.as_ref())) {
            dropped = true;
        } else {
            out.push_attribute(attr);
        }
    }
    Ok(if dropped { out } else { e })
}

fn write_assignments<W: Write>(
    w: &mut Writer<W>,
    assigned: &[Assignment],
) -> Result<(), EyepairError> {
    if assigned.is_empty() {
        return Ok(());
    }
    let mut desc = BytesStart::new("rdf:Description");
    desc.push_attribute(("rdf:about", ""));
    desc.push_attribute(("xmlns:rdf", NS_RDF));
    desc.push_attribute(("xmlns:eye", NS_EYE));
    desc.push_attribute(("xmlns:dc", NS_DC));
    desc.push_attribute(("xmlns:exif", NS_EXIF));
    desc.push_attribute(("xmlns:MPReg", NS_MPREG));
    emit(w, Event::Start(desc))?;

    for a in assigned {
        let name = format!("{}:{}", a.prefix, a.local);
        emit(w, Event::Start(BytesStart::new(name.as_str())))?;
        match a.shape {
            Shape::Simple => emit(w, Event::Text(BytesText::new(&a.value)))?,
            Shape::Alt | Shape::Bag => {
                let container = if a.shape == Shape::Alt { "rdf:Alt" } else { "rdf:Bag" };
                emit(w, Event::Start(BytesStart::new(container)))?;
                let mut li = BytesStart::new("rdf:li");
                if a.shape == Shape::Alt {
                    li.push_attribute(("xml:lang", "x-default"));
                }
                emit(w, Event::Start(li))?;
                emit(w, Event::Text(BytesText::new(&a.value)))?;
                emit(w, Event::End(BytesEnd::new("rdf:li")))?;
                emit(w, Event::End(BytesEnd::new(container)))?;
            }
        }
        emit(w, Event::End(BytesEnd::new(name.as_str())))?;
    }
    emit(w, Event::End(BytesEnd::new("rdf:Description")))
}

/// Stream `packet` through with the assignments merged in. `Ok(None)` when the
/// packet has no `rdf:RDF` element to merge into.
fn merge_into(packet: &str, assigned: &[Assignment]) -> Result<Option<String>, EyepairError> {
    let mut reader = NsReader::from_str(packet);
    let mut writer = Writer::new(Vec::with_capacity(packet.len() + 512));
    let mut path: ElementPath = Vec::new();
    let mut skip = 0usize;
    let mut merged = false;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(xml_err)?;
        let ns = owned_ns(ns);
        if skip > 0 {
            match event {
                Event::Start(_) => skip += 1,
                Event::End(_) => skip -= 1,
                Event::Eof => return Err(xml_err("unexpected end of packet")),
                _ => {}
            }
            continue;
        }
        match event {
            Event::Start(e) => {
                let local = lossy(e.local_name().as_ref());
                if is_top_level_property(&path) && is_assigned(assigned, &ns, &local) {
                    skip = 1;
                    continue;
                }
                let e = strip_assigned_attributes(&reader, e, &path, assigned)?;
                path.push((ns, local));
                emit(&mut writer, Event::Start(e))?;
            }
            Event::Empty(e) => {
                let local = lossy(e.local_name().as_ref());
                if is_top_level_property(&path) && is_assigned(assigned, &ns, &local) {
                    continue;
                }
                if ns.as_deref() == Some(NS_RDF) && local == "RDF" && !merged {
                    let end = BytesEnd::new(lossy(e.name().as_ref()));
                    emit(&mut writer, Event::Start(e))?;
                    write_assignments(&mut writer, assigned)?;
                    emit(&mut writer, Event::End(end))?;
                    merged = true;
                    continue;
                }
                let e = strip_assigned_attributes(&reader, e, &path, assigned)?;
                emit(&mut writer, Event::Empty(e))?;
            }
            Event::End(e) => {
                path.pop();
                if ns.as_deref() == Some(NS_RDF) && e.local_name().as_ref() == b"RDF" && !merged {
                    write_assignments(&mut writer, assigned)?;
                    merged = true;
                }
                emit(&mut writer, Event::End(e))?;
            }
            Event::Eof => break,
            other => emit(&mut writer, other)?,
        }
    }
    if !merged {
        return Ok(None);
    }
    String::from_utf8(writer.into_inner())
        .map(Some)
        .map_err(xml_err)
}

/// Produce the packet to store: `existing` with `meta` merged in, or a fresh packet
/// when there is none or it cannot be used. Standard (Dublin Core and friends)
/// properties are written only when `include_dc` is set.
pub(crate) fn merge(
    existing: Option<&str>,
    meta: &Metadata,
    include_dc: bool,
) -> Result<String, EyepairError> {
    let assigned = assignments(meta, include_dc);
    if let Some(packet) = existing {
        match merge_into(packet, &assigned) {
            Ok(Some(out)) => return Ok(out),
            Ok(None) => tracing::warn!("XMP packet has no rdf:RDF element; starting a fresh packet"),
            Err(e) => tracing::warn!(error = %e, "Existing XMP packet is malformed; starting a fresh packet"),
        }
    }
    merge_into(FRESH_PACKET, &assigned)?.ok_or_else(|| xml_err("packet template lacks rdf:RDF"))
}
