//! Error types
//!
//! Every failure mode is a typed result: builder protocol misuse,
//! insert-time validation, binary-format rejection, and print-time
//! escaping. Corruption is never guessed around.

use thiserror::Error;

/// Errors raised by the builder state machine and insert-time validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// Any call after `close()` has finalized the tree.
    #[error("tree is closed")]
    TreeClosed,
    /// `attr()` called when the current element no longer accepts attributes.
    #[error("attribute section of the current element is closed")]
    TreeAttrClosed,
    /// `end()` with no matching `begin()`.
    #[error("no open element to end")]
    StackEmpty,
    /// `close()` or `close_frame()` with unbalanced `begin()`s.
    #[error("unbalanced begin/end at close")]
    Misformed,
    /// Label violates the markup name grammar.
    #[error("invalid name: {0:?}")]
    BadName(String),
    /// Comment/CDATA/PI value contains its forbidden raw sequence.
    #[error("value contains forbidden sequence {0:?}")]
    ForbiddenSequence(&'static str),
    /// External interning policy given a string outside the base buffer.
    #[error("string does not point into the external base buffer")]
    ForeignString,
    /// External interning policy constructed without a base buffer.
    #[error("interning policy requires an external base buffer")]
    MissingBase,
}

/// Errors raised while validating a binary region in `Document::load`.
///
/// Checks run in the order the variants are listed; the first failure is
/// terminal for the call and no partial tree is ever returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("region smaller than the fixed header")]
    TooShort,
    #[error("bad magic marker")]
    BadMagic,
    #[error("unsupported major format version {0}")]
    MajorVersion(u8),
    #[error("minor format version {0} is newer than this reader")]
    MinorVersion(u8),
    #[error("undecodable config byte {0:#04x}")]
    BadConfig(u8),
    #[error("section offsets out of order or outside the region")]
    BadSections,
    #[error("tree section too small for its root record")]
    TruncatedTree,
    #[error("external-relative symbols require the original base buffer")]
    MissingBase,
}

/// Errors raised by `Document::save`.
#[derive(Debug, Error)]
pub enum SaveError {
    /// ExternalAbsolute refs are not relocatable and can never be written.
    #[error("external-absolute symbol refs are not serializable")]
    NotSerializable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by read-side whole-tree operations: `print`,
/// `clone_subtree`, `reorder_*`, `inject`.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A SymbolRef resolved outside the symbol storage (corrupt file).
    #[error("dangling symbol reference")]
    DanglingRef,
    /// Operation requires an element node.
    #[error("node is not an element")]
    NotAnElement,
    #[error(transparent)]
    Escape(#[from] EscapeError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A raw sequence that can never appear in its output context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscapeError {
    #[error("comment contains \"--\"")]
    CommentDashes,
    #[error("CDATA section contains \"]]>\"")]
    CDataTerminator,
    #[error("processing instruction contains \"?>\"")]
    PiTerminator,
}
