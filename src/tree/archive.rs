//! Document archives
//!
//! A multi-document build: named sections over one contiguous tree buffer,
//! all sharing a single symbol store. Each section is a complete document
//! span (its own root record), so reading one out is a zero-copy borrow.

use std::borrow::Cow;

use crate::config::Config;
use crate::symbols::SymbolStore;

use super::document::Document;

/// One named document span inside an archive buffer.
#[derive(Debug, Clone)]
pub struct ArchiveSection {
    name: String,
    start: u32,
    end: u32,
}

impl ArchiveSection {
    pub(crate) fn new(name: String, start: u32, end: u32) -> ArchiveSection {
        ArchiveSection { name, start, end }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A set of named documents sharing one buffer and one symbol table.
///
/// Produced by [`TreeBuilder::into_archive`]; documents built together
/// this way intern common labels once. An archive is an in-memory
/// container only, its sections are saved individually.
///
/// [`TreeBuilder::into_archive`]: super::builder::TreeBuilder::into_archive
#[derive(Debug)]
pub struct Archive<'a> {
    tree: Vec<u8>,
    symbols: SymbolStore<'a>,
    config: Config,
    sections: Vec<ArchiveSection>,
}

impl<'a> Archive<'a> {
    pub(crate) fn from_parts(
        tree: Vec<u8>,
        symbols: SymbolStore<'a>,
        config: Config,
        sections: Vec<ArchiveSection>,
    ) -> Archive<'a> {
        Archive {
            tree,
            symbols,
            config,
            sections,
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Section names in build order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Borrow the first section with the given name as a document view.
    pub fn get(&self, name: &str) -> Option<Document<'_>> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| self.view(s))
    }

    /// All sections in build order as `(name, document)` views.
    pub fn documents(&self) -> impl Iterator<Item = (&str, Document<'_>)> {
        self.sections.iter().map(|s| (s.name.as_str(), self.view(s)))
    }

    fn view(&self, section: &ArchiveSection) -> Document<'_> {
        Document {
            tree: Cow::Borrowed(&self.tree[section.start as usize..section.end as usize]),
            symbols: self.symbols.borrow_view(),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, InternPolicy};
    use crate::error::BuildError;
    use crate::tree::builder::TreeBuilder;

    fn two_section_archive() -> super::Archive<'static> {
        let mut b = TreeBuilder::new(Config::new(InternPolicy::CompressAll)).unwrap();
        b.begin("alpha", None).unwrap();
        b.text("one").unwrap();
        b.end().unwrap();
        b.close_frame("first").unwrap();
        b.begin("alpha", None).unwrap();
        b.text("two").unwrap();
        b.end().unwrap();
        b.close_frame("second").unwrap();
        b.into_archive().unwrap()
    }

    #[test]
    fn test_sections_read_back_independently() {
        let archive = two_section_archive();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.names().collect::<Vec<_>>(), ["first", "second"]);
        let first = archive.get("first").unwrap();
        assert_eq!(first.print_to_string().unwrap(), "<alpha>one</alpha>");
        let second = archive.get("second").unwrap();
        assert_eq!(second.print_to_string().unwrap(), "<alpha>two</alpha>");
        assert!(archive.get("third").is_none());
    }

    #[test]
    fn test_sections_share_interned_labels() {
        let archive = two_section_archive();
        let (first, second) = (
            archive.get("first").unwrap(),
            archive.get("second").unwrap(),
        );
        let a = first.root().children().next().unwrap();
        let b = second.root().children().next().unwrap();
        // Same store, deduped: both "alpha" labels resolve to one slot
        assert_eq!(a.name_ref(), b.name_ref());
    }

    #[test]
    fn test_trailing_unclosed_frame_is_misformed() {
        let mut b = TreeBuilder::new(Config::default()).unwrap();
        b.begin("a", None).unwrap();
        b.end().unwrap();
        b.close_frame("first").unwrap();
        b.begin("b", None).unwrap();
        b.end().unwrap();
        // Content after the last checkpoint has no name
        assert_eq!(b.into_archive().unwrap_err(), BuildError::Misformed);
    }

    #[test]
    fn test_documents_iterates_in_build_order() {
        let archive = two_section_archive();
        let names: Vec<&str> = archive.documents().map(|(n, _)| n).collect();
        assert_eq!(names, ["first", "second"]);
    }
}
