//! Packed document trees: incremental building, navigation, archives.

pub(crate) mod arena;
pub mod archive;
pub mod builder;
pub mod document;
pub(crate) mod layout;
pub mod node;

pub use archive::{Archive, ArchiveSection};
pub use builder::TreeBuilder;
pub use document::Document;
pub use layout::NodeKind;
pub use node::{Attr, Attrs, Children, Node, Walk};
