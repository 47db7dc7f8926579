//! Binary file format
//!
//! One relocatable region: a fixed 20-byte header followed by the tree
//! buffer and the symbol section, verbatim. Nothing inside either section
//! is rewritten on save or load, so loading is validation plus two slice
//! borrows.
//!
//! ```text
//! 0   magic  b"PXML"
//! 4   major  u8        (breaking layout changes)
//! 5   minor  u8        (additions a reader this old must not guess at)
//! 6   config u8
//! 7   reserved
//! 8   offset_tree     u32 le
//! 12  offset_symbols  u32 le
//! 16  offset_end      u32 le
//! ```
//!
//! Offsets are absolute within the region and must satisfy
//! `HEADER <= tree <= symbols <= end <= region.len()`; trailing bytes
//! after `end` are ignored so regions can be carved out of larger files.

use std::borrow::Cow;
use std::io::Write;

use log::debug;

use crate::config::{Config, InternPolicy};
use crate::error::{LoadError, SaveError};
use crate::symbols::SymbolStore;
use crate::tree::layout::{self, root};
use crate::tree::Document;

pub const MAGIC: [u8; 4] = *b"PXML";
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const HEADER_BYTES: usize = 20;

impl<'a> Document<'a> {
    /// Write the document as one relocatable binary region.
    ///
    /// Fails with [`SaveError::NotSerializable`] under the
    /// external-absolute interning policy, whose refs are only meaningful
    /// inside the producing process.
    pub fn save<W: Write>(&self, out: &mut W) -> Result<(), SaveError> {
        if self.config().policy == InternPolicy::ExternalAbsolute {
            return Err(SaveError::NotSerializable);
        }
        let tree = self.tree();
        let symbols = self.symbols().bytes();
        let offset_tree = HEADER_BYTES as u32;
        let offset_symbols = offset_tree + tree.len() as u32;
        let offset_end = offset_symbols + symbols.len() as u32;

        let mut header = [0u8; HEADER_BYTES];
        header[0..4].copy_from_slice(&MAGIC);
        header[4] = VERSION_MAJOR;
        header[5] = VERSION_MINOR;
        header[6] = self.config().to_byte();
        layout::write_u32(&mut header, 8, offset_tree);
        layout::write_u32(&mut header, 12, offset_symbols);
        layout::write_u32(&mut header, 16, offset_end);

        out.write_all(&header)?;
        out.write_all(tree)?;
        out.write_all(symbols)?;
        debug!(
            "saved document: {} tree bytes, {} symbol bytes",
            tree.len(),
            symbols.len()
        );
        Ok(())
    }

    /// `save` into a fresh buffer.
    pub fn save_to_vec(&self) -> Result<Vec<u8>, SaveError> {
        let mut buf = Vec::with_capacity(HEADER_BYTES + self.tree().len());
        self.save(&mut buf)?;
        Ok(buf)
    }

    /// Open a saved region as a zero-copy document view.
    ///
    /// Validation is ordered and total: the first failing check is
    /// returned and no partial view ever escapes. Regions saved under the
    /// external-relative policy need [`Document::load_with_base`].
    pub fn load(region: &'a [u8]) -> Result<Document<'a>, LoadError> {
        Self::load_inner(region, None)
    }

    /// `load` for external-relative regions: `base` must be the same
    /// buffer the document was built against.
    pub fn load_with_base(region: &'a [u8], base: &'a [u8]) -> Result<Document<'a>, LoadError> {
        Self::load_inner(region, Some(base))
    }

    fn load_inner(region: &'a [u8], base: Option<&'a [u8]>) -> Result<Document<'a>, LoadError> {
        if region.len() < HEADER_BYTES {
            return Err(LoadError::TooShort);
        }
        if region[0..4] != MAGIC {
            return Err(LoadError::BadMagic);
        }
        if region[4] != VERSION_MAJOR {
            return Err(LoadError::MajorVersion(region[4]));
        }
        if region[5] > VERSION_MINOR {
            return Err(LoadError::MinorVersion(region[5]));
        }
        let config = Config::from_byte(region[6])?;
        if config.policy == InternPolicy::ExternalAbsolute {
            // Never written by save; a region claiming it is corrupt.
            return Err(LoadError::BadConfig(region[6]));
        }

        let offset_tree = layout::read_u32(region, 8) as usize;
        let offset_symbols = layout::read_u32(region, 12) as usize;
        let offset_end = layout::read_u32(region, 16) as usize;
        if offset_tree < HEADER_BYTES
            || offset_tree > offset_symbols
            || offset_symbols > offset_end
            || offset_end > region.len()
        {
            return Err(LoadError::BadSections);
        }

        let tree = &region[offset_tree..offset_symbols];
        if tree.len() < root::BYTES
            || layout::read_u32(tree, root::SIZE) as usize > tree.len()
        {
            return Err(LoadError::TruncatedTree);
        }

        // Only external-relative refs resolve against a base buffer; a
        // base handed in for an owned-policy region must be ignored or
        // symbols would resolve against the wrong bytes.
        let base = if config.policy.is_external() {
            base
        } else {
            None
        };
        if config.policy == InternPolicy::ExternalRelative && base.is_none() {
            return Err(LoadError::MissingBase);
        }

        Ok(Document {
            tree: Cow::Borrowed(tree),
            symbols: SymbolStore::from_section(
                config.policy,
                &region[offset_symbols..offset_end],
                base,
            ),
            config,
        })
    }
}
