//! Node handles and navigation
//!
//! A `Node` is a (document, offset) pair; every navigation primitive is
//! O(1) offset arithmetic against the packed buffer. Presence of a
//! neighbor is tested through explicit predicates, since a stored delta of
//! 0 is reserved for "absent".

use std::borrow::Cow;

use super::document::Document;
use super::layout::{self, attribute, element, leaf, NodeKind};
use crate::escape;

/// Handle to one node record inside a document.
#[derive(Clone, Copy)]
pub struct Node<'d> {
    pub(crate) doc: &'d Document<'d>,
    pub(crate) addr: u32,
}

impl<'d> Node<'d> {
    #[inline]
    fn buf(&self) -> &'d [u8] {
        self.doc.tree()
    }

    #[inline]
    pub(crate) fn tag(&self) -> u8 {
        self.buf()[self.addr as usize]
    }

    #[inline]
    fn field(&self, off: usize) -> u32 {
        layout::read_u32(self.buf(), self.addr as usize + off)
    }

    fn symbol(&self, off: usize) -> Option<&'d str> {
        let r = crate::symbols::SymbolRef::read_from(self.buf(), self.addr as usize + off);
        self.doc.symbols().get(r)
    }

    #[inline]
    fn at(&self, addr: u32) -> Node<'d> {
        Node {
            doc: self.doc,
            addr,
        }
    }

    /// Byte offset of this node's record in its view.
    #[inline]
    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_tag(self.tag()).unwrap_or(NodeKind::Marker)
    }

    /// Whole-subtree byte size: header + attributes + all descendants.
    #[inline]
    pub(crate) fn size(&self) -> u32 {
        layout::record_span(self.buf(), self.addr as usize) as u32
    }

    /// `[addr, addr + size)` of this record and its descendants.
    pub(crate) fn span(&self) -> std::ops::Range<usize> {
        self.addr as usize..(self.addr + self.size()) as usize
    }

    #[inline]
    fn raw_ref(&self, off: usize) -> crate::symbols::SymbolRef {
        crate::symbols::SymbolRef::read_from(self.buf(), self.addr as usize + off)
    }

    /// Stored ref for the element namespace field (printer path; callers
    /// check the tag).
    pub(crate) fn ns_ref(&self) -> crate::symbols::SymbolRef {
        self.raw_ref(element::NS)
    }

    pub(crate) fn name_ref(&self) -> crate::symbols::SymbolRef {
        self.raw_ref(element::NAME)
    }

    pub(crate) fn value_ref(&self) -> crate::symbols::SymbolRef {
        self.raw_ref(leaf::VALUE)
    }

    /// Element name. None for non-elements or a corrupt symbol ref.
    pub fn name(&self) -> Option<&'d str> {
        if self.tag() != layout::TAG_ELEMENT {
            return None;
        }
        self.symbol(element::NAME)
    }

    /// Namespace prefix, if the element carries one.
    pub fn ns(&self) -> Option<&'d str> {
        if self.tag() != layout::TAG_ELEMENT {
            return None;
        }
        self.symbol(element::NS).filter(|s| !s.is_empty())
    }

    /// Stored leaf value, exactly as inserted.
    pub fn value(&self) -> Option<&'d str> {
        match self.kind() {
            NodeKind::Text
            | NodeKind::CData
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction
            | NodeKind::Marker => self.symbol(leaf::VALUE),
            _ => None,
        }
    }

    /// Text content with deferred unescaping applied when the document was
    /// built with raw (pre-escaped) strings.
    pub fn text(&self) -> Option<Cow<'d, str>> {
        let raw = self.value()?;
        if self.doc.config().raw_strings && self.tag() == layout::TAG_TEXT {
            Some(escape::unescape(raw))
        } else {
            Some(Cow::Borrowed(raw))
        }
    }

    #[inline]
    pub fn has_parent(&self) -> bool {
        self.parent().is_some()
    }

    #[inline]
    pub fn has_prev(&self) -> bool {
        self.prev().is_some()
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.next().is_some()
    }

    /// Parent node. None for the view's entry record: a slice entry keeps
    /// its stored deltas but they point outside the view.
    pub fn parent(&self) -> Option<Node<'d>> {
        if self.addr == 0 {
            return None;
        }
        let delta = match self.tag() {
            layout::TAG_ELEMENT => self.field(element::PARENT),
            layout::TAG_ROOT => return None,
            _ => self.field(leaf::PARENT),
        };
        Some(self.at(self.addr - delta))
    }

    /// Previous sibling in document order.
    pub fn prev(&self) -> Option<Node<'d>> {
        if self.addr == 0 {
            return None;
        }
        let delta = match self.tag() {
            layout::TAG_ELEMENT => self.field(element::PREV),
            layout::TAG_ROOT => return None,
            _ => self.field(leaf::PREV),
        };
        (delta != 0).then(|| self.at(self.addr - delta))
    }

    /// Next sibling in document order. Elements carry a stored forward
    /// delta; a leaf's next is derived from its fixed record size against
    /// the end of the parent's span.
    pub fn next(&self) -> Option<Node<'d>> {
        if self.addr == 0 {
            return None;
        }
        match self.tag() {
            layout::TAG_ROOT => None,
            layout::TAG_ELEMENT => {
                let delta = self.field(element::NEXT);
                (delta != 0).then(|| self.at(self.addr + delta))
            }
            _ => {
                let cand = self.addr + leaf::BYTES as u32;
                let parent = self.parent()?;
                (cand < parent.addr + parent.size()).then(|| self.at(cand))
            }
        }
    }

    /// Child nodes in document order (attributes are not children).
    pub fn children(&self) -> Children<'d> {
        let (cur, end) = match self.tag() {
            layout::TAG_ROOT => (self.addr + layout::root::BYTES as u32, self.addr + self.size()),
            layout::TAG_ELEMENT => {
                let attrs = self.field(element::ATTR_COUNT);
                (
                    self.addr + element::BYTES as u32 + attrs * attribute::BYTES as u32,
                    self.addr + self.size(),
                )
            }
            _ => (self.addr, self.addr),
        };
        Children {
            doc: self.doc,
            cur,
            end,
        }
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> Attrs<'d> {
        let (cur, remaining) = if self.tag() == layout::TAG_ELEMENT {
            (
                self.addr + element::BYTES as u32,
                self.field(element::ATTR_COUNT),
            )
        } else {
            (self.addr, 0)
        };
        Attrs {
            doc: self.doc,
            cur,
            remaining,
        }
    }

    /// Value of the attribute with the given name (any namespace).
    pub fn attr(&self, name: &str) -> Option<&'d str> {
        self.attributes()
            .find(|a| a.name() == Some(name))
            .and_then(|a| a.value())
    }

    /// Depth-first pre-order walk over this node and all descendants.
    pub fn walk(&self) -> Walk<'d> {
        Walk {
            doc: self.doc,
            root: self.addr,
            cur: Some(self.addr),
        }
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("addr", &self.addr)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Handle to one attribute record.
#[derive(Clone, Copy)]
pub struct Attr<'d> {
    pub(crate) doc: &'d Document<'d>,
    pub(crate) addr: u32,
}

impl<'d> Attr<'d> {
    #[inline]
    fn raw_ref(&self, off: usize) -> crate::symbols::SymbolRef {
        crate::symbols::SymbolRef::read_from(self.doc.tree(), self.addr as usize + off)
    }

    fn symbol(&self, off: usize) -> Option<&'d str> {
        self.doc.symbols().get(self.raw_ref(off))
    }

    #[inline]
    pub(crate) fn addr(&self) -> u32 {
        self.addr
    }

    pub(crate) fn ns_ref(&self) -> crate::symbols::SymbolRef {
        self.raw_ref(attribute::NS)
    }

    pub(crate) fn name_ref(&self) -> crate::symbols::SymbolRef {
        self.raw_ref(attribute::NAME)
    }

    pub(crate) fn value_ref(&self) -> crate::symbols::SymbolRef {
        self.raw_ref(attribute::VALUE)
    }

    pub fn ns(&self) -> Option<&'d str> {
        self.symbol(attribute::NS).filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&'d str> {
        self.symbol(attribute::NAME)
    }

    /// Stored value, exactly as inserted.
    pub fn value(&self) -> Option<&'d str> {
        self.symbol(attribute::VALUE)
    }

    /// Value with deferred unescaping applied when the document was built
    /// with raw (pre-escaped) strings. Mirrors [`Node::text`].
    pub fn text(&self) -> Option<Cow<'d, str>> {
        let raw = self.value()?;
        if self.doc.config().raw_strings {
            Some(escape::unescape(raw))
        } else {
            Some(Cow::Borrowed(raw))
        }
    }
}

/// Iterator over a node's children: steps the cursor by each child's whole
/// subtree span until the end of the parent's span.
pub struct Children<'d> {
    doc: &'d Document<'d>,
    cur: u32,
    end: u32,
}

impl<'d> Iterator for Children<'d> {
    type Item = Node<'d>;

    fn next(&mut self) -> Option<Node<'d>> {
        if self.cur >= self.end {
            return None;
        }
        let node = Node {
            doc: self.doc,
            addr: self.cur,
        };
        self.cur += node.size();
        Some(node)
    }
}

/// Iterator over an element's attribute records (fixed stride).
pub struct Attrs<'d> {
    doc: &'d Document<'d>,
    cur: u32,
    remaining: u32,
}

impl<'d> Iterator for Attrs<'d> {
    type Item = Attr<'d>;

    fn next(&mut self) -> Option<Attr<'d>> {
        if self.remaining == 0 {
            return None;
        }
        let attr = Attr {
            doc: self.doc,
            addr: self.cur,
        };
        self.cur += attribute::BYTES as u32;
        self.remaining -= 1;
        Some(attr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl ExactSizeIterator for Attrs<'_> {}

/// Depth-first pre-order traversal with explicit state: the current offset
/// plus parent links stand in for a call stack, so arbitrarily deep trees
/// walk in constant space.
pub struct Walk<'d> {
    doc: &'d Document<'d>,
    root: u32,
    cur: Option<u32>,
}

impl<'d> Iterator for Walk<'d> {
    type Item = Node<'d>;

    fn next(&mut self) -> Option<Node<'d>> {
        let addr = self.cur?;
        let node = Node {
            doc: self.doc,
            addr,
        };
        self.cur = self.after(node);
        Some(node)
    }
}

impl<'d> Walk<'d> {
    /// Position following `node` in pre-order: first child if any, else the
    /// next sibling of the nearest ancestor (children already visited) that
    /// has one, stopping at the walk root.
    fn after(&self, node: Node<'d>) -> Option<u32> {
        if let Some(child) = node.children().next() {
            return Some(child.addr);
        }
        let mut cur = node;
        loop {
            if cur.addr == self.root {
                return None;
            }
            if let Some(next) = cur.next() {
                return Some(next.addr);
            }
            cur = cur.parent()?;
        }
    }
}
