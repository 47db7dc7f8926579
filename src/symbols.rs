//! Symbol store
//!
//! Append-only string storage with optional content-based interning.
//! Produces relative `SymbolRef` descriptors that stay valid across buffer
//! growth, copies, and reloads: a ref is an (offset, length) pair resolved
//! against the store's anchor at read time, never a pointer.
//!
//! Dedup lookup hashes string *content* and verifies candidates by
//! re-resolving them through the live buffer, so previously returned refs
//! are never invalidated by growth.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::config::InternPolicy;
use crate::error::BuildError;

/// Relative (offset, length) descriptor for a string in symbol storage.
///
/// 8 bytes on the wire, little-endian: base i32, len u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SymbolRef {
    /// Signed offset from the symbol-buffer anchor.
    pub base: i32,
    /// Length in bytes.
    pub len: u32,
}

impl SymbolRef {
    /// The absent/empty string.
    pub const EMPTY: SymbolRef = SymbolRef { base: 0, len: 0 };
    /// Encoded size in node records.
    pub const BYTES: usize = 8;

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Encode into a record buffer at the given field offset.
    #[inline]
    pub fn write_to(self, buf: &mut [u8], at: usize) {
        buf[at..at + 4].copy_from_slice(&self.base.to_le_bytes());
        buf[at + 4..at + 8].copy_from_slice(&self.len.to_le_bytes());
    }

    /// Decode from a record buffer at the given field offset.
    #[inline]
    pub fn read_from(buf: &[u8], at: usize) -> SymbolRef {
        let mut b = [0u8; 4];
        b.copy_from_slice(&buf[at..at + 4]);
        let base = i32::from_le_bytes(b);
        b.copy_from_slice(&buf[at + 4..at + 8]);
        SymbolRef {
            base,
            len: u32::from_le_bytes(b),
        }
    }
}

/// Markup name grammar: leading letter or underscore, then alphanumerics,
/// `_`, `.`, `-`, or any non-ASCII. Enforced for every label regardless of
/// interning policy.
pub(crate) fn validate_name(s: &str) -> Result<(), BuildError> {
    let mut chars = s.chars();
    let ok = match chars.next() {
        Some(c) => {
            (c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-') || !c.is_ascii())
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(BuildError::BadName(s.to_string()))
    }
}

#[inline]
fn content_hash(s: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// String storage behind every document's `SymbolRef`s.
///
/// Owned policies append into `data`; external policies resolve against a
/// caller-supplied `base` slice and store offsets computed by pointer
/// containment (machine-absolute pointers are not expressible here, so
/// ExternalAbsolute differs from ExternalRelative only in its serialization
/// contract).
#[derive(Debug)]
pub struct SymbolStore<'a> {
    policy: InternPolicy,
    /// Owned symbol bytes, or the loaded symbol section of a binary file.
    data: Cow<'a, [u8]>,
    /// External base buffer for the external policies.
    base: Option<&'a [u8]>,
    /// Content hash -> refs with that hash (handles rare collisions).
    dedup: HashMap<u64, Vec<SymbolRef>>,
}

impl Default for SymbolStore<'_> {
    fn default() -> Self {
        Self {
            policy: InternPolicy::Uncompressed,
            data: Cow::Owned(Vec::new()),
            base: None,
            dedup: HashMap::new(),
        }
    }
}

impl<'a> SymbolStore<'a> {
    /// Create an owned store. External policies need [`SymbolStore::with_base`].
    pub fn new(policy: InternPolicy) -> Result<SymbolStore<'static>, BuildError> {
        if policy.is_external() {
            return Err(BuildError::MissingBase);
        }
        Ok(SymbolStore {
            policy,
            data: Cow::Owned(Vec::with_capacity(256)),
            base: None,
            dedup: HashMap::new(),
        })
    }

    /// Create a store resolving against an external base buffer.
    pub fn with_base(policy: InternPolicy, base: &'a [u8]) -> SymbolStore<'a> {
        SymbolStore {
            policy,
            data: Cow::Owned(Vec::new()),
            base: policy.is_external().then_some(base),
            dedup: HashMap::new(),
        }
    }

    /// Reconstruct a read-only store over a loaded symbol section.
    pub(crate) fn from_section(
        policy: InternPolicy,
        data: &'a [u8],
        base: Option<&'a [u8]>,
    ) -> SymbolStore<'a> {
        SymbolStore {
            policy,
            data: Cow::Borrowed(data),
            base,
            dedup: HashMap::new(),
        }
    }

    #[inline]
    pub fn policy(&self) -> InternPolicy {
        self.policy
    }

    /// Raw owned symbol bytes, as written to the binary symbol section.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Intern an element/attribute name or namespace prefix.
    pub fn insert_label(&mut self, s: &str) -> Result<SymbolRef, BuildError> {
        validate_name(s)?;
        let dedup = matches!(
            self.policy,
            InternPolicy::CompressLabels | InternPolicy::CompressAll
        );
        self.insert(s, dedup)
    }

    /// Intern an attribute value or leaf content. No grammar applies.
    pub fn insert_value(&mut self, s: &str) -> Result<SymbolRef, BuildError> {
        self.insert(s, self.policy == InternPolicy::CompressAll)
    }

    fn insert(&mut self, s: &str, dedup: bool) -> Result<SymbolRef, BuildError> {
        if self.policy.is_external() {
            return self.external_ref(s);
        }
        if s.is_empty() {
            return Ok(SymbolRef::EMPTY);
        }
        let hash = dedup.then(|| content_hash(s.as_bytes()));
        if let Some(hash) = hash {
            if let Some(candidates) = self.dedup.get(&hash) {
                for &r in candidates {
                    if self.get(r) == Some(s) {
                        return Ok(r);
                    }
                }
            }
        }
        let at = self.data.len();
        debug_assert!(at <= i32::MAX as usize, "symbol buffer exceeds 2 GiB");
        self.data.to_mut().extend_from_slice(s.as_bytes());
        let r = SymbolRef {
            base: at as i32,
            len: s.len() as u32,
        };
        if let Some(hash) = hash {
            self.dedup.entry(hash).or_default().push(r);
        }
        Ok(r)
    }

    /// Offset of a string that must already live inside the external base.
    fn external_ref(&self, s: &str) -> Result<SymbolRef, BuildError> {
        if s.is_empty() {
            return Ok(SymbolRef::EMPTY);
        }
        let base = self.base.ok_or(BuildError::MissingBase)?;
        let start = base.as_ptr() as usize;
        let ptr = s.as_ptr() as usize;
        if ptr >= start && ptr + s.len() <= start + base.len() {
            Ok(SymbolRef {
                base: (ptr - start) as i32,
                len: s.len() as u32,
            })
        } else {
            Err(BuildError::ForeignString)
        }
    }

    /// Resolve a ref through the store's anchor. None when the ref falls
    /// outside storage or is not UTF-8 (a corrupt file, never a built tree).
    pub fn get(&self, r: SymbolRef) -> Option<&str> {
        if r.is_empty() {
            return Some("");
        }
        let storage: &[u8] = match self.base {
            Some(base) => base,
            None => &self.data,
        };
        let start = usize::try_from(r.base).ok()?;
        let end = start.checked_add(r.len as usize)?;
        let bytes = storage.get(start..end)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Zero-copy read view sharing this store's storage.
    pub fn borrow_view(&self) -> SymbolStore<'_> {
        SymbolStore {
            policy: self.policy,
            data: Cow::Borrowed(&self.data),
            base: self.base,
            dedup: HashMap::new(),
        }
    }

    /// Deep copy into owned storage with unchanged offsets. Used by
    /// non-reducing subtree clones; external bases are copied wholesale so
    /// the result is self-contained.
    pub fn to_owned_copy(&self) -> SymbolStore<'static> {
        let (policy, bytes) = match self.base {
            Some(base) => (InternPolicy::Uncompressed, base.to_vec()),
            None => (self.policy, self.data.to_vec()),
        };
        SymbolStore {
            policy,
            data: Cow::Owned(bytes),
            base: None,
            dedup: HashMap::new(),
        }
    }
}
