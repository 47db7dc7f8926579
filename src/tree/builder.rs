//! Tree builder
//!
//! Stateful incremental writer enforcing the begin/attr/end protocol over
//! one arena and one symbol store. The open-element stack holds offsets,
//! never addresses, so buffer growth during any append is harmless. An
//! element's size and attribute count are patched in place at its matching
//! `end()`; everything else is append-only.
//!
//! `close_frame` checkpoints the buffer span built so far as a named
//! archive section and reopens a fresh root, letting many documents share
//! one interned symbol table.

use std::mem;

use log::{debug, trace};

use super::arena::Arena;
use super::archive::{Archive, ArchiveSection};
use super::document::Document;
use super::layout::{self, element, leaf, root};
use crate::config::Config;
use crate::error::BuildError;
use crate::escape;
use crate::symbols::{SymbolRef, SymbolStore};

/// Bookkeeping for one open element.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Address of the open element (or root) record.
    element: u32,
    /// Address of the last child appended in this frame.
    last_child: Option<u32>,
}

/// Incremental writer for one packed tree (or a whole archive).
///
/// The surface consumed by a textual parser: `begin`, `attr`, `end`,
/// `text`, `comment`, `cdata`, `proc`, `marker`, then `close`. Unless the
/// raw-strings config flag is set, callers are expected to pass unescaped
/// string values.
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    arena: Arena,
    symbols: SymbolStore<'a>,
    config: Config,
    frames: Vec<Frame>,
    sections: Vec<ArchiveSection>,
    section_start: u32,
    attrs_open: bool,
    closed: bool,
}

impl TreeBuilder<'static> {
    /// Builder with owned symbol storage. External interning policies need
    /// [`TreeBuilder::with_base`].
    pub fn new(config: Config) -> Result<TreeBuilder<'static>, BuildError> {
        let symbols = SymbolStore::new(config.policy)?;
        Ok(Self::from_store(config, symbols))
    }
}

impl<'a> TreeBuilder<'a> {
    /// Builder whose symbol refs resolve against a caller-supplied base
    /// buffer (typically the original input text).
    pub fn with_base(config: Config, base: &'a [u8]) -> TreeBuilder<'a> {
        Self::from_store(config, SymbolStore::with_base(config.policy, base))
    }

    fn from_store(config: Config, symbols: SymbolStore<'a>) -> TreeBuilder<'a> {
        let mut arena = Arena::with_capacity(4096);
        let addr = arena.append_record(&root_record());
        TreeBuilder {
            arena,
            symbols,
            config,
            frames: vec![Frame {
                element: addr,
                last_child: None,
            }],
            sections: Vec::new(),
            section_start: addr,
            attrs_open: false,
            closed: false,
        }
    }

    #[inline]
    fn ensure_open(&self) -> Result<(), BuildError> {
        if self.closed {
            Err(BuildError::TreeClosed)
        } else {
            Ok(())
        }
    }

    #[inline]
    fn parent_addr(&self) -> u32 {
        self.frames.last().map_or(0, |f| f.element)
    }

    #[inline]
    fn last_child(&self) -> Option<u32> {
        self.frames.last().and_then(|f| f.last_child)
    }

    /// Append a linked child record: write happens first, then the previous
    /// sibling's stored next (elements only) is patched to point at it.
    fn append_child(&mut self, rec: &[u8]) -> u32 {
        let prev = self.last_child();
        let addr = self.arena.append_record(rec);
        if let Some(prev) = prev {
            if self.arena.tag(prev) == layout::TAG_ELEMENT {
                self.arena.patch_u32(prev, element::NEXT, addr - prev);
            }
        }
        if let Some(f) = self.frames.last_mut() {
            f.last_child = Some(addr);
        }
        addr
    }

    /// Open an element. Attributes may follow immediately; any other call
    /// closes the attribute section.
    pub fn begin(&mut self, name: &str, ns: Option<&str>) -> Result<(), BuildError> {
        self.ensure_open()?;
        let ns_ref = match ns {
            Some(prefix) => self.symbols.insert_label(prefix)?,
            None => SymbolRef::EMPTY,
        };
        let name_ref = self.symbols.insert_label(name)?;

        let addr = self.arena.cursor();
        let mut rec = [0u8; element::BYTES];
        rec[0] = layout::TAG_ELEMENT;
        layout::write_u32(&mut rec, element::PARENT, addr - self.parent_addr());
        if let Some(prev) = self.last_child() {
            layout::write_u32(&mut rec, element::PREV, addr - prev);
        }
        ns_ref.write_to(&mut rec, element::NS);
        name_ref.write_to(&mut rec, element::NAME);
        self.append_child(&rec);

        self.frames.push(Frame {
            element: addr,
            last_child: None,
        });
        self.attrs_open = true;
        Ok(())
    }

    /// Append an attribute to the element just opened by `begin`.
    pub fn attr(&mut self, name: &str, value: &str, ns: Option<&str>) -> Result<(), BuildError> {
        self.ensure_open()?;
        if !self.attrs_open || self.frames.len() < 2 {
            return Err(BuildError::TreeAttrClosed);
        }
        let ns_ref = match ns {
            Some(prefix) => self.symbols.insert_label(prefix)?,
            None => SymbolRef::EMPTY,
        };
        let name_ref = self.symbols.insert_label(name)?;
        let value_ref = self.symbols.insert_value(value)?;

        let mut rec = [0u8; super::layout::attribute::BYTES];
        rec[0] = layout::TAG_ATTRIBUTE;
        ns_ref.write_to(&mut rec, super::layout::attribute::NS);
        name_ref.write_to(&mut rec, super::layout::attribute::NAME);
        value_ref.write_to(&mut rec, super::layout::attribute::VALUE);
        self.arena.append_record(&rec);

        let owner = self.parent_addr();
        self.arena.add_u32(owner, element::ATTR_COUNT, 1);
        Ok(())
    }

    /// Close the innermost open element, patching its subtree size.
    pub fn end(&mut self) -> Result<(), BuildError> {
        self.ensure_open()?;
        if self.frames.len() <= 1 {
            return Err(BuildError::StackEmpty);
        }
        if let Some(frame) = self.frames.pop() {
            let size = self.arena.cursor() - frame.element;
            self.arena.patch_u32(frame.element, element::SIZE, size);
        }
        self.attrs_open = false;
        Ok(())
    }

    fn append_leaf(&mut self, tag: u8, value: &str) -> Result<(), BuildError> {
        let value_ref = self.symbols.insert_value(value)?;
        let addr = self.arena.cursor();
        let mut rec = [0u8; leaf::BYTES];
        rec[0] = tag;
        layout::write_u32(&mut rec, leaf::PARENT, addr - self.parent_addr());
        if let Some(prev) = self.last_child() {
            layout::write_u32(&mut rec, leaf::PREV, addr - prev);
        }
        value_ref.write_to(&mut rec, leaf::VALUE);
        self.append_child(&rec);
        self.attrs_open = false;
        Ok(())
    }

    /// Append a text leaf.
    pub fn text(&mut self, value: &str) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.append_leaf(layout::TAG_TEXT, value)
    }

    /// Append a CDATA leaf. The value can never contain `]]>`.
    pub fn cdata(&mut self, value: &str) -> Result<(), BuildError> {
        self.ensure_open()?;
        escape::escape_cdata(value)
            .map_err(|_| BuildError::ForbiddenSequence("]]>"))?;
        self.append_leaf(layout::TAG_CDATA, value)
    }

    /// Append a comment leaf; a silent no-op when comments are disabled.
    /// The value can never contain `--`.
    pub fn comment(&mut self, value: &str) -> Result<(), BuildError> {
        self.ensure_open()?;
        if !self.config.keep_comments {
            return Ok(());
        }
        escape::escape_comment(value).map_err(|_| BuildError::ForbiddenSequence("--"))?;
        self.append_leaf(layout::TAG_COMMENT, value)
    }

    /// Append a processing-instruction leaf; a silent no-op when PIs are
    /// disabled. The value can never contain `?>`.
    pub fn proc(&mut self, value: &str) -> Result<(), BuildError> {
        self.ensure_open()?;
        if !self.config.keep_pi {
            return Ok(());
        }
        escape::escape_pi(value).map_err(|_| BuildError::ForbiddenSequence("?>"))?;
        self.append_leaf(layout::TAG_PI, value)
    }

    /// Append a marker leaf: an internal bookmark that never prints.
    pub fn marker(&mut self, value: &str) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.append_leaf(layout::TAG_MARKER, value)
    }

    /// Finalize the tree and hand ownership of the buffers to a Document.
    ///
    /// Valid only with the root frame alone remaining and no archive
    /// sections pending. Every call on this builder afterwards returns
    /// `TreeClosed`.
    pub fn close(&mut self) -> Result<Document<'a>, BuildError> {
        self.ensure_open()?;
        if self.frames.len() != 1 || !self.sections.is_empty() {
            return Err(BuildError::Misformed);
        }
        let size = self.arena.cursor() - self.section_start;
        self.arena.patch_u32(self.section_start, root::SIZE, size);
        self.closed = true;
        let arena = mem::take(&mut self.arena);
        let symbols = mem::take(&mut self.symbols);
        debug!(
            "closed document: {} tree bytes, {} symbol bytes",
            size,
            symbols.bytes().len()
        );
        Ok(Document::from_parts(arena.into_vec(), symbols, self.config))
    }

    /// Snapshot everything built since the previous checkpoint as a named
    /// archive section and reopen a fresh root. The symbol store keeps
    /// growing across sections.
    pub fn close_frame(&mut self, name: &str) -> Result<(), BuildError> {
        self.ensure_open()?;
        if self.frames.len() != 1 {
            return Err(BuildError::Misformed);
        }
        let cursor = self.arena.cursor();
        self.arena
            .patch_u32(self.section_start, root::SIZE, cursor - self.section_start);
        self.sections.push(ArchiveSection::new(
            name.to_string(),
            self.section_start,
            cursor,
        ));
        trace!(
            "archive section {:?}: [{}, {})",
            name,
            self.section_start,
            cursor
        );
        let addr = self.arena.append_record(&root_record());
        self.section_start = addr;
        self.frames.clear();
        self.frames.push(Frame {
            element: addr,
            last_child: None,
        });
        self.attrs_open = false;
        Ok(())
    }

    /// Finalize a multi-document build. Requires every document to have
    /// been checkpointed via `close_frame`; the trailing empty root is
    /// discarded.
    pub fn into_archive(mut self) -> Result<Archive<'a>, BuildError> {
        self.ensure_open()?;
        if self.frames.len() != 1 {
            return Err(BuildError::Misformed);
        }
        if self.arena.cursor() != self.section_start + root::BYTES as u32 {
            // Unnamed trailing content; the caller forgot a close_frame.
            return Err(BuildError::Misformed);
        }
        self.arena.truncate(self.section_start);
        debug!(
            "closed archive: {} sections, {} tree bytes, {} symbol bytes",
            self.sections.len(),
            self.arena.cursor(),
            self.symbols.bytes().len()
        );
        Ok(Archive::from_parts(
            self.arena.into_vec(),
            self.symbols,
            self.config,
            self.sections,
        ))
    }
}

fn root_record() -> [u8; root::BYTES] {
    let mut rec = [0u8; root::BYTES];
    rec[0] = layout::TAG_ROOT;
    rec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InternPolicy;

    fn builder() -> TreeBuilder<'static> {
        TreeBuilder::new(Config::default()).unwrap()
    }

    #[test]
    fn test_empty_document() {
        let mut b = builder();
        let doc = b.close().unwrap();
        assert_eq!(doc.print_to_string().unwrap(), "");
    }

    #[test]
    fn test_attr_requires_fresh_begin() {
        let mut b = builder();
        assert_eq!(
            b.attr("a", "1", None),
            Err(BuildError::TreeAttrClosed),
            "no begin yet"
        );
        b.begin("root", None).unwrap();
        b.attr("a", "1", None).unwrap();
        b.text("x").unwrap();
        assert_eq!(b.attr("b", "2", None), Err(BuildError::TreeAttrClosed));
        b.end().unwrap();
        assert_eq!(b.attr("c", "3", None), Err(BuildError::TreeAttrClosed));
    }

    #[test]
    fn test_end_without_begin() {
        let mut b = builder();
        assert_eq!(b.end(), Err(BuildError::StackEmpty));
        b.begin("root", None).unwrap();
        b.end().unwrap();
        assert_eq!(b.end(), Err(BuildError::StackEmpty));
    }

    #[test]
    fn test_close_with_open_element() {
        let mut b = builder();
        b.begin("root", None).unwrap();
        assert_eq!(b.close().unwrap_err(), BuildError::Misformed);
    }

    #[test]
    fn test_calls_after_close() {
        let mut b = builder();
        b.begin("root", None).unwrap();
        b.end().unwrap();
        b.close().unwrap();
        assert_eq!(b.begin("x", None), Err(BuildError::TreeClosed));
        assert_eq!(b.text("x"), Err(BuildError::TreeClosed));
        assert_eq!(b.end(), Err(BuildError::TreeClosed));
        assert_eq!(b.close().unwrap_err(), BuildError::TreeClosed);
    }

    #[test]
    fn test_bad_name_leaves_builder_usable() {
        let mut b = builder();
        b.begin("root", None).unwrap();
        assert!(matches!(b.begin("9bad", None), Err(BuildError::BadName(_))));
        // Validation aborts only that operation
        b.begin("ok", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();
        assert_eq!(doc.print_to_string().unwrap(), "<root><ok/></root>");
    }

    #[test]
    fn test_forbidden_sequences_rejected_eagerly() {
        let mut b = builder();
        b.begin("root", None).unwrap();
        assert_eq!(
            b.comment("a--b"),
            Err(BuildError::ForbiddenSequence("--"))
        );
        assert_eq!(
            b.cdata("a]]>b"),
            Err(BuildError::ForbiddenSequence("]]>"))
        );
        assert_eq!(b.proc("a?>b"), Err(BuildError::ForbiddenSequence("?>")));
        b.end().unwrap();
        assert!(b.close().is_ok());
    }

    #[test]
    fn test_disabled_comments_dropped_silently() {
        let mut config = Config::new(InternPolicy::Uncompressed);
        config.keep_comments = false;
        config.keep_pi = false;
        let mut b = TreeBuilder::new(config).unwrap();
        b.begin("root", None).unwrap();
        // Dropped before validation: not an error even with forbidden bytes
        b.comment("a--b").unwrap();
        b.proc("a?>b").unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();
        assert_eq!(doc.print_to_string().unwrap(), "<root/>");
    }

    #[test]
    fn test_external_policy_requires_base() {
        assert!(matches!(
            TreeBuilder::new(Config::new(InternPolicy::ExternalRelative)),
            Err(BuildError::MissingBase)
        ));
    }
}
