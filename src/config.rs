//! Document configuration
//!
//! One immutable options record, fixed at builder construction and carried
//! in the binary header's config byte.

use crate::error::LoadError;

/// How the symbol store maps string content to `SymbolRef`s.
///
/// External policies borrow a caller-supplied base buffer (typically the
/// original input text) and store offsets into it; owned policies copy
/// bytes into the store's own buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternPolicy {
    /// Refs into a caller buffer, valid only for this process lifetime.
    /// Never serializable.
    ExternalAbsolute,
    /// Offsets into a caller buffer; serializable only if the caller
    /// re-supplies the same base on load.
    ExternalRelative,
    /// Every value copied, no deduplication.
    Uncompressed,
    /// Names and namespaces deduplicated; values copied raw.
    CompressLabels,
    /// Every string deduplicated.
    CompressAll,
}

impl InternPolicy {
    /// True when refs produced under this policy borrow external memory.
    #[inline]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::ExternalAbsolute | Self::ExternalRelative)
    }

    const fn code(self) -> u8 {
        match self {
            Self::ExternalAbsolute => 0,
            Self::ExternalRelative => 1,
            Self::Uncompressed => 2,
            Self::CompressLabels => 3,
            Self::CompressAll => 4,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::ExternalAbsolute),
            1 => Some(Self::ExternalRelative),
            2 => Some(Self::Uncompressed),
            3 => Some(Self::CompressLabels),
            4 => Some(Self::CompressAll),
            _ => None,
        }
    }
}

/// Config byte flag bits (bits 0..=2 hold the policy code).
mod flags {
    pub const RAW_STRINGS: u8 = 0x08;
    pub const KEEP_COMMENTS: u8 = 0x10;
    pub const KEEP_PI: u8 = 0x20;
    pub const KNOWN: u8 = 0x07 | RAW_STRINGS | KEEP_COMMENTS | KEEP_PI;
}

/// Immutable document options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Symbol interning policy.
    pub policy: InternPolicy,
    /// Strings arrive pre-escaped; `print` emits them verbatim and
    /// unescaping is deferred to read time.
    pub raw_strings: bool,
    /// Retain comment nodes; when false `comment()` is a silent no-op.
    pub keep_comments: bool,
    /// Retain processing instructions; when false `proc()` is a silent no-op.
    pub keep_pi: bool,
}

impl Config {
    /// Config with the given policy and all retention flags on.
    pub fn new(policy: InternPolicy) -> Self {
        Self {
            policy,
            raw_strings: false,
            keep_comments: true,
            keep_pi: true,
        }
    }

    /// Pack into the header config byte.
    pub fn to_byte(self) -> u8 {
        let mut b = self.policy.code();
        if self.raw_strings {
            b |= flags::RAW_STRINGS;
        }
        if self.keep_comments {
            b |= flags::KEEP_COMMENTS;
        }
        if self.keep_pi {
            b |= flags::KEEP_PI;
        }
        b
    }

    /// Unpack from the header config byte.
    pub fn from_byte(b: u8) -> Result<Self, LoadError> {
        if b & !flags::KNOWN != 0 {
            return Err(LoadError::BadConfig(b));
        }
        let policy = InternPolicy::from_code(b & 0x07).ok_or(LoadError::BadConfig(b))?;
        Ok(Self {
            policy,
            raw_strings: b & flags::RAW_STRINGS != 0,
            keep_comments: b & flags::KEEP_COMMENTS != 0,
            keep_pi: b & flags::KEEP_PI != 0,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(InternPolicy::CompressLabels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_byte_round_trip() {
        for policy in [
            InternPolicy::ExternalAbsolute,
            InternPolicy::ExternalRelative,
            InternPolicy::Uncompressed,
            InternPolicy::CompressLabels,
            InternPolicy::CompressAll,
        ] {
            let mut config = Config::new(policy);
            config.raw_strings = true;
            config.keep_comments = false;
            assert_eq!(Config::from_byte(config.to_byte()).unwrap(), config);
        }
    }

    #[test]
    fn test_config_byte_rejects_unknown_bits() {
        assert!(matches!(
            Config::from_byte(0x80),
            Err(LoadError::BadConfig(0x80))
        ));
        // Policy codes 5..=7 are unassigned
        assert!(matches!(
            Config::from_byte(0x05),
            Err(LoadError::BadConfig(0x05))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.policy, InternPolicy::CompressLabels);
        assert!(config.keep_comments);
        assert!(config.keep_pi);
        assert!(!config.raw_strings);
    }
}
