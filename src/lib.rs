//! packedxml - Packed relocatable document trees
//!
//! A document is one contiguous byte buffer of fixed-layout node records
//! linked by relative offsets, plus a symbol store for string content.
//! No pointers anywhere: buffers can grow, be copied, sliced, written to
//! disk and read back without fix-up.
//!
//! Surfaces:
//! - `TreeBuilder`: incremental begin/attr/end construction, archives
//! - `Document` / `Node`: zero-copy navigation, slicing, cloning,
//!   reordering, cross-document injection, markup printing
//! - `Document::save` / `Document::load`: relocatable binary regions
//! - `escape`: markup escaping and entity decoding helpers

pub mod codec;
pub mod config;
pub mod error;
pub mod escape;
pub mod symbols;
pub mod tree;

pub use config::{Config, InternPolicy};
pub use error::{BuildError, EscapeError, LoadError, SaveError, TreeError};
pub use symbols::{SymbolRef, SymbolStore};
pub use tree::{Archive, ArchiveSection, Document, Node, NodeKind, TreeBuilder};
