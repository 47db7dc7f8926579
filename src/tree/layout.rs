//! Node record encoding
//!
//! Byte-exact little-endian layouts for the eight node kinds, so any node
//! is reachable by offset arithmetic alone and the whole buffer can be
//! copied, grown, or memory-mapped with no pointer fix-up.
//!
//! All records start with a tag byte and three pad bytes. parent/prev
//! fields are backward self-relative deltas (`self - target`), next is a
//! forward delta (`target - self`). A stored `0` means "absent"; this
//! never collides with a real neighbor because the root record occupies
//! offset 0 and can never be any node's sibling or attribute owner. The
//! last child's next is never stored at all - it is derived from
//! `parent_addr + parent.size`.
//!
//! ```text
//! Root       8 B   tag pad3 | size u32
//! Element   40 B   tag pad3 | parent prev next size attr_count | ns name
//! Attribute 28 B   tag pad3 | ns name value
//! Leaf      20 B   tag pad3 | parent prev | value
//! ```

use crate::symbols::SymbolRef;

pub const TAG_ROOT: u8 = 1;
pub const TAG_ELEMENT: u8 = 2;
pub const TAG_TEXT: u8 = 3;
pub const TAG_CDATA: u8 = 4;
pub const TAG_COMMENT: u8 = 5;
pub const TAG_PI: u8 = 6;
pub const TAG_MARKER: u8 = 7;
pub const TAG_ATTRIBUTE: u8 = 8;

/// Discriminant for every record in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element,
    Text,
    CData,
    Comment,
    ProcessingInstruction,
    Marker,
    Attribute,
}

impl NodeKind {
    pub(crate) fn from_tag(tag: u8) -> Option<NodeKind> {
        match tag {
            TAG_ROOT => Some(NodeKind::Root),
            TAG_ELEMENT => Some(NodeKind::Element),
            TAG_TEXT => Some(NodeKind::Text),
            TAG_CDATA => Some(NodeKind::CData),
            TAG_COMMENT => Some(NodeKind::Comment),
            TAG_PI => Some(NodeKind::ProcessingInstruction),
            TAG_MARKER => Some(NodeKind::Marker),
            TAG_ATTRIBUTE => Some(NodeKind::Attribute),
            _ => None,
        }
    }
}

/// Root record fields.
pub mod root {
    pub const SIZE: usize = 4;
    pub const BYTES: usize = 8;
}

/// Element record fields. PARENT/PREV share offsets with leaf records so
/// sibling relinking can patch either kind uniformly.
pub mod element {
    pub const PARENT: usize = 4;
    pub const PREV: usize = 8;
    pub const NEXT: usize = 12;
    pub const SIZE: usize = 16;
    pub const ATTR_COUNT: usize = 20;
    pub const NS: usize = 24;
    pub const NAME: usize = 32;
    pub const BYTES: usize = 40;
}

/// Attribute record fields. Attributes sit directly after their owning
/// element's header and are not part of the sibling chain.
pub mod attribute {
    pub const NS: usize = 4;
    pub const NAME: usize = 12;
    pub const VALUE: usize = 20;
    pub const BYTES: usize = 28;
}

/// Leaf record fields (Text, CData, Comment, PI, Marker).
pub mod leaf {
    pub const PARENT: usize = 4;
    pub const PREV: usize = 8;
    pub const VALUE: usize = 12;
    pub const BYTES: usize = 20;
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

#[inline]
pub(crate) fn write_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// Header length of the record at `addr` (excluding any children).
pub(crate) fn header_len(tag: u8) -> usize {
    match tag {
        TAG_ROOT => root::BYTES,
        TAG_ELEMENT => element::BYTES,
        TAG_ATTRIBUTE => attribute::BYTES,
        _ => leaf::BYTES,
    }
}

/// Whole-record span: subtree size for root/element, fixed size otherwise.
pub(crate) fn record_span(buf: &[u8], addr: usize) -> usize {
    match buf[addr] {
        TAG_ROOT => read_u32(buf, addr + root::SIZE) as usize,
        TAG_ELEMENT => read_u32(buf, addr + element::SIZE) as usize,
        TAG_ATTRIBUTE => attribute::BYTES,
        _ => leaf::BYTES,
    }
}

/// Rewrite every SymbolRef in the record headers of `buf[from..]` through
/// `map`. Records are contiguous in pre-order, so stepping by header length
/// visits each one exactly once.
pub(crate) fn for_each_symbol_field(
    buf: &mut [u8],
    from: usize,
    mut rewrite: impl FnMut(SymbolRef, bool) -> Result<SymbolRef, crate::error::TreeError>,
) -> Result<(), crate::error::TreeError> {
    let mut pos = from;
    while pos < buf.len() {
        let tag = buf[pos];
        let fields: &[(usize, bool)] = match tag {
            TAG_ELEMENT => &[(element::NS, true), (element::NAME, true)],
            TAG_ATTRIBUTE => &[
                (attribute::NS, true),
                (attribute::NAME, true),
                (attribute::VALUE, false),
            ],
            TAG_ROOT => &[],
            _ => &[(leaf::VALUE, false)],
        };
        for &(off, is_label) in fields {
            let old = SymbolRef::read_from(buf, pos + off);
            let new = rewrite(old, is_label)?;
            new.write_to(buf, pos + off);
        }
        pos += header_len(tag);
    }
    Ok(())
}
