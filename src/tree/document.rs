//! Document read view
//!
//! Immutable navigable wrapper over a finished `(buffer, symbols, config)`
//! triple. Storage is `Cow`-backed: a document either owns buffers moved
//! out of a closed builder or borrows them (a loaded file region, a slice
//! of another tree). The few whole-subtree mutating operations take
//! `&mut self` and keep every invariant of the packed encoding intact.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;

use super::layout::{self, attribute, element, leaf, root};
use super::node::{Attr, Node};
use crate::config::{Config, InternPolicy};
use crate::error::TreeError;
use crate::escape;
use crate::symbols::{SymbolRef, SymbolStore};

/// One packed document tree.
#[derive(Debug)]
pub struct Document<'a> {
    pub(crate) tree: Cow<'a, [u8]>,
    pub(crate) symbols: SymbolStore<'a>,
    pub(crate) config: Config,
}

impl<'a> Document<'a> {
    pub(crate) fn from_parts(
        tree: Vec<u8>,
        symbols: SymbolStore<'a>,
        config: Config,
    ) -> Document<'a> {
        Document {
            tree: Cow::Owned(tree),
            symbols,
            config,
        }
    }

    #[inline]
    pub(crate) fn tree(&self) -> &[u8] {
        &self.tree
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolStore<'a> {
        &self.symbols
    }

    #[inline]
    pub fn config(&self) -> Config {
        self.config
    }

    #[inline]
    fn node(&self, addr: u32) -> Node<'_> {
        Node { doc: self, addr }
    }

    /// Entry node of this view: the root record of a built or loaded
    /// document, or the entry element of a slice.
    pub fn root(&self) -> Node<'_> {
        self.node(0)
    }

    /// Re-derive a handle from an offset previously obtained via
    /// [`Node::addr`]. None when the offset does not start a record.
    pub fn node_at(&self, addr: u32) -> Option<Node<'_>> {
        let at = addr as usize;
        if at >= self.tree.len() || layout::NodeKind::from_tag(self.tree[at]).is_none() {
            return None;
        }
        Some(self.node(addr))
    }

    /// Zero-copy sub-view over one subtree, sharing backing bytes and the
    /// symbol storage. The node must belong to this document. The view
    /// must not outlive it.
    pub fn slice(&self, node: Node<'_>) -> Document<'_> {
        Document {
            tree: Cow::Borrowed(&self.tree[node.span()]),
            symbols: self.symbols.borrow_view(),
            config: self.config,
        }
    }

    /// Deep copy of one subtree into new owned buffers.
    ///
    /// With `reduce` the symbol table is recompacted to exactly the
    /// strings the subtree references (identical old refs stay shared);
    /// otherwise symbol storage is copied wholesale and refs are reused
    /// verbatim. Clones of externally-anchored documents always own their
    /// storage, so they are self-contained and serializable.
    pub fn clone_subtree(
        &self,
        node: Node<'_>,
        reduce: bool,
    ) -> Result<Document<'static>, TreeError> {
        let sub = &self.tree[node.span()];
        let mut buf;
        if node.tag() == layout::TAG_ROOT {
            buf = sub.to_vec();
        } else {
            buf = Vec::with_capacity(root::BYTES + sub.len());
            buf.extend_from_slice(&[layout::TAG_ROOT, 0, 0, 0, 0, 0, 0, 0]);
            buf.extend_from_slice(sub);
            let total = buf.len() as u32;
            layout::write_u32(&mut buf, root::SIZE, total);
            // Relink the entry record to the synthetic root (parent/prev
            // share offsets across element and leaf records).
            let at = root::BYTES;
            layout::write_u32(&mut buf, at + element::PARENT, at as u32);
            layout::write_u32(&mut buf, at + element::PREV, 0);
            if buf[at] == layout::TAG_ELEMENT {
                layout::write_u32(&mut buf, at + element::NEXT, 0);
            }
        }

        let symbols = if reduce {
            let policy = if self.config.policy.is_external() {
                InternPolicy::Uncompressed
            } else {
                self.config.policy
            };
            let mut dst = SymbolStore::new(policy)?;
            reintern(&mut buf, &self.symbols, &mut dst)?;
            dst
        } else {
            self.symbols.to_owned_copy()
        };

        let mut config = self.config;
        config.policy = symbols.policy();
        Ok(Document {
            tree: Cow::Owned(buf),
            symbols,
            config,
        })
    }

    /// Sort the children of an element (or of the root) in place. Whole
    /// child blocks move; attribute and descendant bytes are untouched.
    pub fn reorder_children<F>(&mut self, parent: u32, mut cmp: F) -> Result<(), TreeError>
    where
        F: FnMut(Node<'_>, Node<'_>) -> Ordering,
    {
        let parent_node = self.node_at(parent).ok_or(TreeError::NotAnElement)?;
        if !matches!(parent_node.tag(), layout::TAG_ROOT | layout::TAG_ELEMENT) {
            return Err(TreeError::NotAnElement);
        }
        let blocks: Vec<(u32, u32)> = parent_node.children().map(|c| (c.addr(), c.size())).collect();
        if blocks.len() < 2 {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..blocks.len()).collect();
        {
            let doc: &Document<'a> = &*self;
            order.sort_by(|&i, &j| {
                cmp(
                    Node {
                        doc,
                        addr: blocks[i].0,
                    },
                    Node {
                        doc,
                        addr: blocks[j].0,
                    },
                )
            });
        }

        let region_start = blocks[0].0;
        let (last_addr, last_size) = blocks[blocks.len() - 1];
        let region_end = last_addr + last_size;
        let mut tmp: Vec<u8> = Vec::with_capacity((region_end - region_start) as usize);
        // (new_addr, tag, offset of the block inside tmp)
        let mut placed: Vec<(u32, u8, usize)> = Vec::with_capacity(order.len());

        let tree = self.tree.to_mut();
        for &idx in &order {
            let (addr, size) = blocks[idx];
            let new_addr = region_start + tmp.len() as u32;
            let off = tmp.len();
            tmp.extend_from_slice(&tree[addr as usize..(addr + size) as usize]);
            layout::write_u32(&mut tmp, off + element::PARENT, new_addr - parent);
            placed.push((new_addr, tmp[off], off));
        }
        for k in 0..placed.len() {
            let (new_addr, tag, off) = placed[k];
            let prev_delta = if k == 0 { 0 } else { new_addr - placed[k - 1].0 };
            layout::write_u32(&mut tmp, off + element::PREV, prev_delta);
            if tag == layout::TAG_ELEMENT {
                let next_delta = if k + 1 < placed.len() {
                    placed[k + 1].0 - new_addr
                } else {
                    0
                };
                layout::write_u32(&mut tmp, off + element::NEXT, next_delta);
            }
        }
        tree[region_start as usize..region_end as usize].copy_from_slice(&tmp);
        Ok(())
    }

    /// Sort an element's attributes in place. Attribute order is a
    /// visible serialization detail.
    pub fn reorder_attrs<F>(&mut self, elem: u32, mut cmp: F) -> Result<(), TreeError>
    where
        F: FnMut(Attr<'_>, Attr<'_>) -> Ordering,
    {
        let node = self.node_at(elem).ok_or(TreeError::NotAnElement)?;
        if node.tag() != layout::TAG_ELEMENT {
            return Err(TreeError::NotAnElement);
        }
        let addrs: Vec<u32> = node.attributes().map(|a| a.addr()).collect();
        if addrs.len() < 2 {
            return Ok(());
        }
        let mut order: Vec<usize> = (0..addrs.len()).collect();
        {
            let doc: &Document<'a> = &*self;
            order.sort_by(|&i, &j| {
                cmp(
                    Attr {
                        doc,
                        addr: addrs[i],
                    },
                    Attr {
                        doc,
                        addr: addrs[j],
                    },
                )
            });
        }
        let start = addrs[0] as usize;
        let mut tmp: Vec<u8> = Vec::with_capacity(addrs.len() * attribute::BYTES);
        let tree = self.tree.to_mut();
        for &idx in &order {
            tmp.extend_from_slice(&tree[addrs[idx] as usize..][..attribute::BYTES]);
        }
        tree[start..start + tmp.len()].copy_from_slice(&tmp);
        Ok(())
    }

    /// Splice a foreign element subtree in as the target element's last
    /// child. The source's symbols are re-interned into this document
    /// under its own policy; the injected bytes keep their internal
    /// self-relative links, and every delta crossing the insertion point
    /// is patched.
    pub fn inject(
        &mut self,
        target: u32,
        source: &Document<'_>,
        subtree: u32,
    ) -> Result<(), TreeError> {
        let target_node = self.node_at(target).ok_or(TreeError::NotAnElement)?;
        if target_node.tag() != layout::TAG_ELEMENT {
            return Err(TreeError::NotAnElement);
        }
        let src = source.node_at(subtree).ok_or(TreeError::NotAnElement)?;
        if src.tag() != layout::TAG_ELEMENT {
            return Err(TreeError::NotAnElement);
        }

        let pos = target + target_node.size();
        let last_child = target_node.children().last().map(|c| (c.addr(), c.tag()));

        // Patches recorded against pre-splice addresses. Ancestors (all
        // below `pos`) grow by the block length; the only stored forward
        // deltas that cross `pos` belong to chain members, and the only
        // backward deltas that cross it belong to their following
        // siblings (siblings are contiguous, so any record straddling the
        // insertion point is on the ancestor chain).
        let mut size_patches: Vec<u32> = Vec::new();
        let mut next_patches: Vec<u32> = Vec::new();
        let mut moved_patches: Vec<(u32, usize)> = Vec::new();
        let mut cur = Some(target_node);
        while let Some(n) = cur {
            size_patches.push(n.addr());
            if n.tag() == layout::TAG_ELEMENT && n.addr() != 0 {
                if layout::read_u32(self.tree(), n.addr() as usize + element::NEXT) != 0 {
                    next_patches.push(n.addr());
                }
                let mut first = true;
                let mut sib = n.next();
                while let Some(s) = sib {
                    moved_patches.push((s.addr(), element::PARENT));
                    if first {
                        moved_patches.push((s.addr(), element::PREV));
                        first = false;
                    }
                    sib = s.next();
                }
            }
            cur = n.parent();
        }

        let mut block = source.tree()[src.span()].to_vec();
        layout::write_u32(&mut block, element::PARENT, pos - target);
        layout::write_u32(
            &mut block,
            element::PREV,
            last_child.map_or(0, |(lc, _)| pos - lc),
        );
        layout::write_u32(&mut block, element::NEXT, 0);
        reintern(&mut block, source.symbols(), &mut self.symbols)?;

        let len = block.len() as u32;
        let tree = self.tree.to_mut();
        tree.splice(pos as usize..pos as usize, block);
        for addr in size_patches {
            let field = if tree[addr as usize] == layout::TAG_ROOT {
                root::SIZE
            } else {
                element::SIZE
            };
            bump(tree, addr as usize + field, len);
        }
        for addr in next_patches {
            bump(tree, addr as usize + element::NEXT, len);
        }
        for (addr, field) in moved_patches {
            bump(tree, (addr + len) as usize + field, len);
        }
        if let Some((lc, tag)) = last_child {
            if tag == layout::TAG_ELEMENT {
                layout::write_u32(tree, lc as usize + element::NEXT, pos - lc);
            }
        }
        Ok(())
    }

    /// Render markup text. Iterative with an explicit enter/close stack,
    /// so arbitrarily deep documents never exhaust the call stack.
    pub fn print<W: io::Write>(&self, out: &mut W) -> Result<(), TreeError> {
        enum Step {
            Enter(u32),
            Close(u32),
        }
        let raw = self.config.raw_strings;
        let mut stack = vec![Step::Enter(0)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Close(addr) => {
                    out.write_all(b"</")?;
                    self.write_qname(out, self.node(addr))?;
                    out.write_all(b">")?;
                }
                Step::Enter(addr) => {
                    let node = self.node(addr);
                    match node.tag() {
                        layout::TAG_ROOT => {
                            let kids: Vec<u32> = node.children().map(|c| c.addr()).collect();
                            for &k in kids.iter().rev() {
                                stack.push(Step::Enter(k));
                            }
                        }
                        layout::TAG_ELEMENT => {
                            out.write_all(b"<")?;
                            self.write_qname(out, node)?;
                            for attr in node.attributes() {
                                out.write_all(b" ")?;
                                let ns = attr.ns_ref();
                                if !ns.is_empty() {
                                    out.write_all(self.resolve(ns)?.as_bytes())?;
                                    out.write_all(b":")?;
                                }
                                out.write_all(self.resolve(attr.name_ref())?.as_bytes())?;
                                out.write_all(b"=\"")?;
                                let value = self.resolve(attr.value_ref())?;
                                if raw {
                                    out.write_all(value.as_bytes())?;
                                } else {
                                    out.write_all(escape::escape_attr_double(value).as_bytes())?;
                                }
                                out.write_all(b"\"")?;
                            }
                            let kids: Vec<u32> = node.children().map(|c| c.addr()).collect();
                            if kids.is_empty() {
                                out.write_all(b"/>")?;
                            } else {
                                out.write_all(b">")?;
                                stack.push(Step::Close(addr));
                                for &k in kids.iter().rev() {
                                    stack.push(Step::Enter(k));
                                }
                            }
                        }
                        layout::TAG_TEXT => {
                            let value = self.resolve(node.value_ref())?;
                            if raw {
                                out.write_all(value.as_bytes())?;
                            } else {
                                out.write_all(escape::escape_text(value).as_bytes())?;
                            }
                        }
                        layout::TAG_CDATA => {
                            let value = self.resolve(node.value_ref())?;
                            out.write_all(b"<![CDATA[")?;
                            out.write_all(escape::escape_cdata(value)?.as_bytes())?;
                            out.write_all(b"]]>")?;
                        }
                        layout::TAG_COMMENT => {
                            let value = self.resolve(node.value_ref())?;
                            out.write_all(b"<!--")?;
                            out.write_all(escape::escape_comment(value)?.as_bytes())?;
                            out.write_all(b"-->")?;
                        }
                        layout::TAG_PI => {
                            let value = self.resolve(node.value_ref())?;
                            out.write_all(b"<?")?;
                            out.write_all(escape::escape_pi(value)?.as_bytes())?;
                            out.write_all(b"?>")?;
                        }
                        // Markers are internal bookmarks; attributes never
                        // appear in the child chain of a well-formed tree.
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// `print` into a fresh string.
    pub fn print_to_string(&self) -> Result<String, TreeError> {
        let mut buf = Vec::with_capacity(256);
        self.print(&mut buf)?;
        // The printer only emits &str pieces
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn resolve(&self, r: SymbolRef) -> Result<&str, TreeError> {
        self.symbols.get(r).ok_or(TreeError::DanglingRef)
    }

    fn write_qname<W: io::Write>(&self, out: &mut W, node: Node<'_>) -> Result<(), TreeError> {
        let ns = node.ns_ref();
        if !ns.is_empty() {
            out.write_all(self.resolve(ns)?.as_bytes())?;
            out.write_all(b":")?;
        }
        out.write_all(self.resolve(node.name_ref())?.as_bytes())?;
        Ok(())
    }
}

#[inline]
fn bump(buf: &mut [u8], at: usize, delta: u32) {
    let v = layout::read_u32(buf, at) + delta;
    layout::write_u32(buf, at, v);
}

/// Rewrite every SymbolRef in `buf`'s record headers, re-interning the
/// referenced strings into `dst`. Identical old refs map to one new ref.
fn reintern(
    buf: &mut [u8],
    src: &SymbolStore<'_>,
    dst: &mut SymbolStore<'_>,
) -> Result<(), TreeError> {
    let mut map: HashMap<SymbolRef, SymbolRef> = HashMap::new();
    layout::for_each_symbol_field(buf, 0, |old, is_label| {
        // Absent namespace / empty value: EMPTY under every policy.
        if old.is_empty() {
            return Ok(SymbolRef::EMPTY);
        }
        if let Some(&new) = map.get(&old) {
            return Ok(new);
        }
        let s = src.get(old).ok_or(TreeError::DanglingRef)?;
        let new = if is_label {
            dst.insert_label(s)?
        } else {
            dst.insert_value(s)?
        };
        map.insert(old, new);
        Ok(new)
    })
}

// Leaf record sanity: the derived-next rule in node.rs depends on it.
const _: () = assert!(leaf::BYTES == 20);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::builder::TreeBuilder;

    fn simple_doc() -> Document<'static> {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("root", None).unwrap();
        b.attr("a", "1", None).unwrap();
        b.begin("child", None).unwrap();
        b.text("text").unwrap();
        b.end().unwrap();
        b.end().unwrap();
        b.close().unwrap()
    }

    #[test]
    fn test_build_and_print() {
        let doc = simple_doc();
        assert_eq!(
            doc.print_to_string().unwrap(),
            "<root a=\"1\"><child>text</child></root>"
        );
    }

    #[test]
    fn test_print_escapes() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("e", Some("x")).unwrap();
        b.attr("n", "v\"q", Some("x")).unwrap();
        b.text("a<b&c").unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();
        assert_eq!(
            doc.print_to_string().unwrap(),
            "<x:e x:n=\"v&quot;q\">a&lt;b&amp;c</x:e>"
        );
    }

    #[test]
    fn test_raw_strings_print_verbatim() {
        let mut config = Config::default();
        config.raw_strings = true;
        let mut b = TreeBuilder::new(config).unwrap();
        b.begin("e", None).unwrap();
        b.attr("a", "v&quot;q", None).unwrap();
        b.text("a&lt;b").unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();
        assert_eq!(
            doc.print_to_string().unwrap(),
            "<e a=\"v&quot;q\">a&lt;b</e>"
        );
        // Read side undoes the stored escaping for text and attributes
        let e = doc.root().children().next().unwrap();
        let text = e.children().next().unwrap();
        assert_eq!(text.text().unwrap(), "a<b");
        let attr = e.attributes().next().unwrap();
        assert_eq!(attr.value(), Some("v&quot;q"));
        assert_eq!(attr.text().unwrap(), "v\"q");
    }

    #[test]
    fn test_navigation() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.begin("a", None).unwrap();
        b.end().unwrap();
        b.text("mid").unwrap();
        b.begin("b", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();

        let r = doc.root().children().next().unwrap();
        let kids: Vec<Node<'_>> = r.children().collect();
        assert_eq!(kids.len(), 3);
        let (a, mid, bb) = (kids[0], kids[1], kids[2]);
        assert_eq!(a.name(), Some("a"));
        assert_eq!(mid.value(), Some("mid"));
        assert_eq!(bb.name(), Some("b"));

        assert!(!a.has_prev() && a.has_next());
        assert_eq!(a.next().unwrap().addr(), mid.addr());
        assert_eq!(mid.next().unwrap().addr(), bb.addr());
        assert_eq!(bb.prev().unwrap().addr(), mid.addr());
        assert!(!bb.has_next());
        assert_eq!(mid.parent().unwrap().addr(), r.addr());
        assert!(doc.root().parent().is_none());
    }

    #[test]
    fn test_walk_preorder() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.begin("a", None).unwrap();
        b.begin("a1", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        b.begin("b", None).unwrap();
        b.text("t").unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();

        let r = doc.root().children().next().unwrap();
        let order: Vec<String> = r
            .walk()
            .map(|n| {
                n.name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{:?}", n.kind()))
            })
            .collect();
        assert_eq!(order, ["r", "a", "a1", "b", "#Text"]);

        // Walk of a mid-tree node stays inside its subtree
        let a = r.children().next().unwrap();
        assert_eq!(a.walk().count(), 2);
    }

    #[test]
    fn test_slice_is_a_self_contained_view() {
        let doc = simple_doc();
        let root = doc.root().children().next().unwrap();
        let child = root.children().next().unwrap();
        let view = doc.slice(child);
        assert_eq!(view.print_to_string().unwrap(), "<child>text</child>");
        // The entry keeps stored deltas pointing outside the view; they
        // must read as absent
        let entry = view.root();
        assert!(entry.parent().is_none());
        assert!(!entry.has_prev() && !entry.has_next());
        assert_eq!(entry.name(), Some("child"));
    }

    #[test]
    fn test_attr_lookup() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("e", None).unwrap();
        b.attr("one", "1", None).unwrap();
        b.attr("two", "2", Some("x")).unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();
        let e = doc.root().children().next().unwrap();
        assert_eq!(e.attributes().len(), 2);
        assert_eq!(e.attr("two"), Some("2"));
        assert_eq!(e.attr("three"), None);
        let second = e.attributes().nth(1).unwrap();
        assert_eq!(second.ns(), Some("x"));
    }

    #[test]
    fn test_clone_subtree_prints_identically() {
        let doc = simple_doc();
        let root = doc.root().children().next().unwrap();
        let child = root.children().next().unwrap();
        let clone = doc.clone_subtree(child, false).unwrap();
        assert_eq!(clone.print_to_string().unwrap(), "<child>text</child>");
        // Whole-tree clone keeps everything
        let full = doc.clone_subtree(doc.root(), false).unwrap();
        assert_eq!(full.print_to_string().unwrap(), doc.print_to_string().unwrap());
    }

    #[test]
    fn test_clone_reduce_compacts_symbols() {
        let mut b = TreeBuilder::new(Config::new(InternPolicy::Uncompressed)).unwrap();
        b.begin("outer", None).unwrap();
        b.text("unreferenced-by-the-clone").unwrap();
        b.begin("inner", None).unwrap();
        b.text("kept").unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();

        let outer = doc.root().children().next().unwrap();
        let inner = outer.children().nth(1).unwrap();
        let clone = doc.clone_subtree(inner, true).unwrap();
        assert_eq!(clone.print_to_string().unwrap(), "<inner>kept</inner>");
        assert!(clone.symbols().bytes().len() < doc.symbols().bytes().len());
    }

    #[test]
    fn test_clone_of_external_doc_owns_its_strings() {
        let input = String::from("name value");
        let config = Config::new(InternPolicy::ExternalRelative);
        let mut b = TreeBuilder::with_base(config, input.as_bytes());
        b.begin(&input[0..4], None).unwrap();
        b.text(&input[5..10]).unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();

        let clone = doc.clone_subtree(doc.root(), false).unwrap();
        drop(doc);
        assert_eq!(clone.config().policy, InternPolicy::Uncompressed);
        assert_eq!(clone.print_to_string().unwrap(), "<name>value</name>");
    }

    #[test]
    fn test_reorder_children_relinks_blocks() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.begin("b", None).unwrap();
        b.begin("x", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        b.begin("a", None).unwrap();
        b.end().unwrap();
        b.begin("c", None).unwrap();
        b.text("t").unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let mut doc = b.close().unwrap();

        let r_addr = doc.root().children().next().unwrap().addr();
        doc.reorder_children(r_addr, |a, b| a.name().cmp(&b.name()))
            .unwrap();
        assert_eq!(
            doc.print_to_string().unwrap(),
            "<r><a/><b><x/></b><c>t</c></r>"
        );
        // Sibling links survive the move
        let r = doc.node_at(r_addr).unwrap();
        let names: Vec<_> = r.children().map(|c| c.name().unwrap().to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        let a = r.children().next().unwrap();
        assert!(a.prev().is_none());
        assert_eq!(a.next().unwrap().name(), Some("b"));
        assert_eq!(a.parent().unwrap().addr(), r_addr);
    }

    #[test]
    fn test_reorder_attrs() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("e", None).unwrap();
        b.attr("c", "3", None).unwrap();
        b.attr("a", "1", None).unwrap();
        b.attr("b", "2", None).unwrap();
        b.end().unwrap();
        let mut doc = b.close().unwrap();

        let e_addr = doc.root().children().next().unwrap().addr();
        doc.reorder_attrs(e_addr, |x, y| x.name().cmp(&y.name())).unwrap();
        assert_eq!(
            doc.print_to_string().unwrap(),
            "<e a=\"1\" b=\"2\" c=\"3\"/>"
        );
    }

    #[test]
    fn test_reorder_rejects_leaves() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.text("t").unwrap();
        b.end().unwrap();
        let mut doc = b.close().unwrap();
        let text_addr = doc
            .root()
            .children()
            .next()
            .unwrap()
            .children()
            .next()
            .unwrap()
            .addr();
        assert!(matches!(
            doc.reorder_children(text_addr, |a, b| a.addr().cmp(&b.addr())),
            Err(TreeError::NotAnElement)
        ));
        assert!(matches!(
            doc.reorder_attrs(text_addr, |a, b| a.name().cmp(&b.name())),
            Err(TreeError::NotAnElement)
        ));
    }

    #[test]
    fn test_inject_deep_target_patches_ancestors() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("a", None).unwrap();
        b.begin("b", None).unwrap();
        b.begin("d", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        b.begin("c", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let mut doc = b.close().unwrap();

        let mut s = TreeBuilder::new(Config::default()).unwrap();
        s.begin("k", None).unwrap();
        s.attr("n", "v", None).unwrap();
        s.text("payload").unwrap();
        s.end().unwrap();
        let source = s.close().unwrap();
        let k = source.root().children().next().unwrap().addr();

        let a = doc.root().children().next().unwrap();
        let d = a.children().next().unwrap().children().next().unwrap();
        let d_addr = d.addr();
        doc.inject(d_addr, &source, k).unwrap();
        assert_eq!(
            doc.print_to_string().unwrap(),
            "<a><b><d><k n=\"v\">payload</k></d></b><c/></a>"
        );

        // The sibling after the grown subtree is still linked both ways
        let a = doc.root().children().next().unwrap();
        let b_node = a.children().next().unwrap();
        let c = b_node.next().unwrap();
        assert_eq!(c.name(), Some("c"));
        assert_eq!(c.prev().unwrap().addr(), b_node.addr());
        assert_eq!(c.parent().unwrap().addr(), a.addr());
    }

    #[test]
    fn test_inject_appends_after_existing_children() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.text("lead").unwrap();
        b.end().unwrap();
        let mut doc = b.close().unwrap();

        let mut s = TreeBuilder::new(Config::default()).unwrap();
        s.begin("tail", None).unwrap();
        s.end().unwrap();
        let source = s.close().unwrap();
        let tail = source.root().children().next().unwrap().addr();

        let r_addr = doc.root().children().next().unwrap().addr();
        doc.inject(r_addr, &source, tail).unwrap();
        assert_eq!(doc.print_to_string().unwrap(), "<r>lead<tail/></r>");
        let r = doc.node_at(r_addr).unwrap();
        let lead = r.children().next().unwrap();
        // The old last child (a leaf) derives its new next sibling
        assert_eq!(lead.next().unwrap().name(), Some("tail"));
        assert_eq!(lead.next().unwrap().prev().unwrap().addr(), lead.addr());
    }

    #[test]
    fn test_inject_requires_elements() {
        let mut doc = simple_doc();
        let source = simple_doc();
        let src_root = source.root().children().next().unwrap().addr();
        let text_addr = {
            let root = doc.root().children().next().unwrap();
            let child = root.children().next().unwrap();
            child.children().next().unwrap().addr()
        };
        assert!(matches!(
            doc.inject(text_addr, &source, src_root),
            Err(TreeError::NotAnElement)
        ));
        assert!(matches!(
            doc.inject(0, &source, src_root),
            Err(TreeError::NotAnElement)
        ));
    }

    #[test]
    fn test_marker_never_prints() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.marker("bookmark").unwrap();
        b.text("t").unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();
        assert_eq!(doc.print_to_string().unwrap(), "<r>t</r>");
        let r = doc.root().children().next().unwrap();
        let marker = r.children().next().unwrap();
        assert_eq!(marker.kind(), layout::NodeKind::Marker);
        assert_eq!(marker.value(), Some("bookmark"));
    }

    #[test]
    fn test_element_spans_contain_exactly_their_descendants() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("r", None).unwrap();
        b.begin("a", None).unwrap();
        b.attr("k", "v", None).unwrap();
        b.begin("a1", None).unwrap();
        b.end().unwrap();
        b.text("t").unwrap();
        b.end().unwrap();
        b.begin("b", None).unwrap();
        b.end().unwrap();
        b.end().unwrap();
        let doc = b.close().unwrap();

        let r = doc.root().children().next().unwrap();
        for e in r.walk().filter(|n| n.kind() == layout::NodeKind::Element) {
            let span = e.addr()..e.addr() + e.size();
            for d in e.walk() {
                assert!(span.contains(&d.addr()), "{d:?} outside {span:?}");
            }
            if let Some(sib) = e.next() {
                assert!(sib.addr() >= span.end, "sibling overlaps {span:?}");
            }
        }
    }

    #[test]
    fn test_node_at_validates() {
        let doc = simple_doc();
        assert!(doc.node_at(0).is_some());
        assert!(doc.node_at(1).is_none(), "pad byte, not a record");
        assert!(doc.node_at(u32::MAX).is_none());
    }
}
