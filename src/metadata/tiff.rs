//! Minimal TIFF container model for editing EXIF.
//!
//! Notes:
//! - IFD0, the Exif/GPS/Interop sub-IFDs and IFD1 (with its JPEG thumbnail) are kept.
//! - Entry payloads are stored as raw bytes in the file's byte order; nothing is
//!   decoded beyond what relocation needs.
//! - Offsets inside opaque blobs (MakerNote) are not rewritten, so vendor notes that
//!   use absolute offsets may not survive a rewrite.
//! - A pointer tag whose sub-IFD cannot be parsed (a GPS block pointing past the end,
//!   say) is dropped together with that sub-IFD, so a rewrite loses it. This is
//!   logged as a warning.

use tracing::{debug, warn};

use crate::errors::EyepairError;

pub(crate) const TAG_EXIF_IFD: u16 = 0x8769;
pub(crate) const TAG_GPS_IFD: u16 = 0x8825;
pub(crate) const TAG_INTEROP_IFD: u16 = 0xA005;
const POINTER_TAGS: [u16; 3] = [TAG_EXIF_IFD, TAG_GPS_IFD, TAG_INTEROP_IFD];

const TAG_THUMB_OFFSET: u16 = 0x0201;
const TAG_THUMB_LENGTH: u16 = 0x0202;
const TAG_STRIP_OFFSETS: u16 = 0x0111;

pub(crate) const TYPE_BYTE: u16 = 1;
pub(crate) const TYPE_ASCII: u16 = 2;
pub(crate) const TYPE_LONG: u16 = 4;
pub(crate) const TYPE_UNDEFINED: u16 = 7;

const MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16_at(self, data: &[u8], at: usize) -> Option<u16> {
        let b: [u8; 2] = data.get(at..at.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        })
    }

    fn u32_at(self, data: &[u8], at: usize) -> Option<u32> {
        let b: [u8; 4] = data.get(at..at.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        })
    }

    fn put_u16(self, buf: &mut Vec<u8>, v: u16) {
        match self {
            ByteOrder::Little => buf.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(self, buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&self.u32_bytes(v));
    }

    pub(crate) fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    fn patch_u32(self, buf: &mut [u8], at: usize, v: u32) {
        if let Some(slot) = buf.get_mut(at..at + 4) {
            slot.copy_from_slice(&self.u32_bytes(v));
        }
    }
}

fn type_size(dtype: u16) -> usize {
    match dtype {
        1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,         // SHORT, SSHORT
        4 | 9 | 11 | 13 => 4,
        5 | 10 | 12 => 8, // RATIONAL, SRATIONAL, DOUBLE
        _ => 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub tag: u16,
    pub dtype: u16,
    pub count: u32,
    pub data: Vec<u8>,
}

impl Entry {
    /// NUL-terminated ASCII.
    pub(crate) fn ascii(tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self::raw(tag, TYPE_ASCII, data)
    }

    pub(crate) fn bytes(tag: u16, data: Vec<u8>) -> Self {
        Self::raw(tag, TYPE_BYTE, data)
    }

    pub(crate) fn undefined(tag: u16, data: Vec<u8>) -> Self {
        Self::raw(tag, TYPE_UNDEFINED, data)
    }

    fn raw(tag: u16, dtype: u16, data: Vec<u8>) -> Self {
        Entry {
            tag,
            dtype,
            count: (data.len() / type_size(dtype)) as u32,
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Ifd {
    pub entries: Vec<Entry>,
    /// Sub-IFDs keyed by the pointer tag that references them.
    pub children: Vec<(u16, Ifd)>,
}

impl Ifd {
    pub(crate) fn get(&self, tag: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub(crate) fn set(&mut self, entry: Entry) {
        match self.entries.iter_mut().find(|e| e.tag == entry.tag) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    pub(crate) fn remove(&mut self, tag: u16) -> Option<Entry> {
        let idx = self.entries.iter().position(|e| e.tag == tag)?;
        Some(self.entries.remove(idx))
    }

    pub(crate) fn child(&self, pointer: u16) -> Option<&Ifd> {
        self.children
            .iter()
            .find(|(t, _)| *t == pointer)
            .map(|(_, ifd)| ifd)
    }

    pub(crate) fn child_mut_or_insert(&mut self, pointer: u16) -> &mut Ifd {
        let idx = match self.children.iter().position(|(t, _)| *t == pointer) {
            Some(i) => i,
            None => {
                self.children.push((pointer, Ifd::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[idx].1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tiff {
    pub order: ByteOrder,
    pub ifd0: Ifd,
    pub ifd1: Option<Ifd>,
    pub thumbnail: Option<Vec<u8>>,
}

fn corrupt(reason: impl ToString) -> EyepairError {
    EyepairError::format("TIFF", reason)
}

impl Tiff {
    pub(crate) fn new(order: ByteOrder) -> Self {
        Tiff {
            order,
            ifd0: Ifd::default(),
            ifd1: None,
            thumbnail: None,
        }
    }

    pub(crate) fn parse(data: &[u8]) -> Result<Self, EyepairError> {
        let order = match data.get(0..4) {
            Some([b'I', b'I', 0x2A, 0x00]) => ByteOrder::Little,
            Some([b'M', b'M', 0x00, 0x2A]) => ByteOrder::Big,
            _ => return Err(corrupt("bad header")),
        };
        let ifd0_off = order
            .u32_at(data, 4)
            .ok_or_else(|| corrupt("truncated header"))? as usize;
        let (ifd0, next) = parse_ifd(data, ifd0_off, order, 0)?;

        let mut tiff = Tiff::new(order);
        tiff.ifd0 = ifd0;
        if next != 0 {
            match parse_ifd(data, next as usize, order, 0) {
                Ok((mut ifd1, _)) => {
                    if ifd1.get(TAG_STRIP_OFFSETS).is_some() {
                        debug!("Dropping uncompressed thumbnail IFD");
                    } else {
                        tiff.thumbnail = take_thumbnail(&mut ifd1, data, order);
                        tiff.ifd1 = Some(ifd1);
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring unreadable IFD1"),
            }
        }
        Ok(tiff)
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, EyepairError> {
        let order = self.order;
        let mut out = Vec::with_capacity(1024);
        match order {
            ByteOrder::Little => out.extend_from_slice(b"II\x2A\x00"),
            ByteOrder::Big => out.extend_from_slice(b"MM\x00\x2A"),
        }
        order.put_u32(&mut out, 8);

        let layout = write_ifd(&mut out, &self.ifd0, order)?;
        if let Some(ifd1) = &self.ifd1 {
            let mut ifd1 = ifd1.clone();
            if let Some(thumb) = &self.thumbnail {
                ifd1.set(Entry::raw(TAG_THUMB_OFFSET, TYPE_LONG, vec![0; 4]));
                ifd1.set(Entry::raw(
                    TAG_THUMB_LENGTH,
                    TYPE_LONG,
                    order.u32_bytes(thumb.len() as u32).to_vec(),
                ));
            }
            pad_even(&mut out);
            let ifd1_at = offset_of(&out)?;
            order.patch_u32(&mut out, layout.next_pos, ifd1_at);
            let ifd1_layout = write_ifd(&mut out, &ifd1, order)?;
            if let Some(thumb) = &self.thumbnail {
                let at = offset_of(&out)?;
                out.extend_from_slice(thumb);
                if let Some(pos) = ifd1_layout.value_pos(TAG_THUMB_OFFSET) {
                    order.patch_u32(&mut out, pos, at);
                }
            }
        }
        Ok(out)
    }
}

fn take_thumbnail(ifd1: &mut Ifd, data: &[u8], order: ByteOrder) -> Option<Vec<u8>> {
    let off = ifd1.remove(TAG_THUMB_OFFSET)?;
    let len = ifd1.get(TAG_THUMB_LENGTH)?;
    let off = order.u32_at(&off.data, 0)? as usize;
    let len = order.u32_at(&len.data, 0)? as usize;
    data.get(off..off.checked_add(len)?).map(<[u8]>::to_vec)
}

fn parse_ifd(
    data: &[u8],
    at: usize,
    order: ByteOrder,
    depth: usize,
) -> Result<(Ifd, u32), EyepairError> {
    if depth > MAX_DEPTH {
        return Err(corrupt("IFD nesting too deep"));
    }
    let count = order
        .u16_at(data, at)
        .ok_or_else(|| corrupt(format!("IFD offset {at} out of range")))? as usize;
    let table_end = at + 2 + count * 12;
    if table_end + 4 > data.len() {
        return Err(corrupt(format!("IFD at {at} runs past the end")));
    }

    let mut ifd = Ifd::default();
    for i in 0..count {
        let e = at + 2 + i * 12;
        let (Some(tag), Some(dtype), Some(n)) = (
            order.u16_at(data, e),
            order.u16_at(data, e + 2),
            order.u32_at(data, e + 4),
        ) else {
            continue;
        };
        let size = type_size(dtype).saturating_mul(n as usize);
        let payload = if size <= 4 {
            data.get(e + 8..e + 8 + size)
        } else {
            order
                .u32_at(data, e + 8)
                .and_then(|off| data.get(off as usize..(off as usize).checked_add(size)?))
        };
        let Some(payload) = payload else {
            debug!(tag = format_args!("{tag:#06x}"), "Skipping entry with out-of-range data");
            continue;
        };

        if POINTER_TAGS.contains(&tag) {
            let Some(child_at) = order.u32_at(payload, 0) else {
                continue;
            };
            match parse_ifd(data, child_at as usize, order, depth + 1) {
                Ok((child, _)) => ifd.children.push((tag, child)),
                Err(e) => warn!(tag = format_args!("{tag:#06x}"), error = %e, "Dropping unreadable sub-IFD; it will be missing after a rewrite"),
            }
            continue;
        }
        ifd.entries.push(Entry {
            tag,
            dtype,
            count: n,
            data: payload.to_vec(),
        });
    }
    let next = order.u32_at(data, table_end).unwrap_or(0);
    Ok((ifd, next))
}

struct IfdLayout {
    next_pos: usize,
    /// Position of each entry's 4-byte value field.
    values: Vec<(u16, usize)>,
}

impl IfdLayout {
    fn value_pos(&self, tag: u16) -> Option<usize> {
        self.values.iter().find(|(t, _)| *t == tag).map(|(_, p)| *p)
    }
}

fn pad_even(out: &mut Vec<u8>) {
    if out.len() % 2 == 1 {
        out.push(0);
    }
}

fn offset_of(out: &[u8]) -> Result<u32, EyepairError> {
    u32::try_from(out.len()).map_err(|_| corrupt("TIFF larger than 4 GiB"))
}

/// Write `ifd` at the end of `out` followed by its overflow data and sub-IFDs.
/// The next-IFD pointer is left at zero.
fn write_ifd(out: &mut Vec<u8>, ifd: &Ifd, order: ByteOrder) -> Result<IfdLayout, EyepairError> {
    let mut rows: Vec<(u16, u16, u32, Option<&[u8]>)> = ifd
        .entries
        .iter()
        .filter(|e| !POINTER_TAGS.contains(&e.tag))
        .map(|e| (e.tag, e.dtype, e.count, Some(e.data.as_slice())))
        .collect();
    for (tag, _) in &ifd.children {
        rows.push((*tag, TYPE_LONG, 1, None));
    }
    rows.sort_by_key(|r| r.0);

    let count = u16::try_from(rows.len()).map_err(|_| corrupt("too many IFD entries"))?;
    order.put_u16(out, count);
    let mut values = Vec::with_capacity(rows.len());
    for (tag, dtype, n, data) in &rows {
        order.put_u16(out, *tag);
        order.put_u16(out, *dtype);
        order.put_u32(out, *n);
        values.push((*tag, out.len()));
        let mut inline = [0u8; 4];
        if let Some(d) = data.filter(|d| d.len() <= 4) {
            inline[..d.len()].copy_from_slice(d);
        }
        out.extend_from_slice(&inline);
    }
    let next_pos = out.len();
    order.put_u32(out, 0);

    for ((tag, _, _, data), (_, pos)) in rows.iter().zip(&values) {
        if let Some(d) = data.filter(|d| d.len() > 4) {
            pad_even(out);
            let at = offset_of(out)?;
            out.extend_from_slice(d);
            order.patch_u32(out, *pos, at);
        } else if data.is_none() {
            let Some(child) = ifd.child(*tag) else {
                continue;
            };
            pad_even(out);
            let at = offset_of(out)?;
            order.patch_u32(out, *pos, at);
            write_ifd(out, child, order)?;
        }
    }
    Ok(IfdLayout { next_pos, values })
}
