//! Generic traits for parsing line-oriented procfs files into typed stat
//! structs.
//!
//! Most of the files this crate samples fall into one of two shapes:
//!
//! - [`KeyValueStat`]: multi-line files where each line carries one or more
//!   key-value pairs, such as `/proc/meminfo` or `/proc/<pid>/io`. The split
//!   character, line/value skip counts, duplicate-key policy and key
//!   normalization are all configurable per implementor, so the same parsing
//!   loop covers `key value`, `key=value` and `Key: value kB` layouts.
//! - [`SingleLineStat`]: files whose interesting content is a single line
//!   with positional fields, such as the aggregate cpu line of `/proc/stat`.
//!
//! Implementors of [`KeyValueStat`] register a handler per known field in a
//! static map; unknown keys are ignored by default and parsing stops early
//! once every known field has been seen.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use procwatch::procfs::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct Pressure {
//!     some: u64,
//!     full: u64,
//! }
//!
//! impl Pressure {
//!     fn set_some(&mut self, v: u64) {
//!         self.some = v;
//!     }
//!
//!     fn set_full(&mut self, v: u64) {
//!         self.full = v;
//!     }
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut Pressure, u64)>> =
//!     LazyLock::new(|| {
//!         let mut m: HashMap<&'static str, fn(&mut Pressure, u64)> = HashMap::new();
//!         m.insert("some", Pressure::set_some);
//!         m.insert("full", Pressure::set_full);
//!         m
//!     });
//!
//! impl KeyValueStat for Pressure {
//!     const SPLIT_CHAR: Option<char> = None;
//!     const SKIP_LINES: usize = 0;
//!     const SKIP_VALUES: usize = 0;
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!     const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let data = "some 12\nfull 3\n";
//! let stat = Pressure::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.some, 12);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A trait for parsing key-value style procfs files such as `/proc/meminfo`,
/// `/proc/<pid>/status` or `/proc/<pid>/io`.
///
/// Implementors define the set of known keys and how a parsed value is
/// applied; the provided `from_reader` drives the line loop with the
/// configured behavior.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// If `Some(char)`, each key-value pair is joined by that character
    /// (e.g. `rbytes=1024`). If `None`, key and value are consecutive
    /// whitespace-separated tokens.
    const SPLIT_CHAR: Option<char>;

    /// Number of lines to skip at the start of the file.
    const SKIP_LINES: usize;

    /// Number of whitespace-separated tokens to skip at the start of each line.
    const SKIP_VALUES: usize;

    /// Whether a key may legally appear more than once. When `false`, a
    /// repeated key is a parse error; when `true`, the handler is invoked
    /// once per occurrence (useful for accumulating per-device lines).
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Whether more than one key-value pair may be consumed from a single line.
    const ALLOW_MULTIPLE_KV_PER_LINE: bool;

    /// Map from known field name to the handler applying its parsed value.
    ///
    /// Handlers own the unit conversion for their field, so values reach the
    /// struct already normalized (e.g. `/proc/meminfo` handlers scale kB to
    /// bytes).
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Normalizes a raw key token before the handler lookup.
    ///
    /// The default is the identity. Files like `/proc/meminfo` override this
    /// to strip the trailing `:` of their `MemTotal:`-style keys.
    #[inline]
    fn normalize_key(key: &str) -> &str {
        key
    }

    /// Parses a key-value formatted buffer into `Self`.
    ///
    /// Skips `SKIP_LINES` lines, then processes each line according to the
    /// configured split behavior. Parsing stops early once every known field
    /// has been seen (unless duplicates are allowed).
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading fails, or a [`StatParseError`]
    /// wrapped in an `io::Error` if a known key carries an unparsable value
    /// or is illegally duplicated.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let field_count = handlers.len();
        let mut seen_keys = HashSet::with_capacity(field_count);

        let mut line = String::new();
        let mut lineno = 0;
        for _ in 0..Self::SKIP_LINES {
            buf.read_line(&mut line)?;
            line.clear();
        }

        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            Self::parse_line(&mut stat, &line, lineno, handlers, &mut seen_keys)?;
            if !Self::ALLOW_DUPLICATE_KEYS && seen_keys.len() == field_count {
                break;
            }

            line.clear();
        }

        Ok(stat)
    }

    /// Parses a single line into one or more key-value pairs.
    fn parse_line(
        stat: &mut Self,
        line: &str,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        let mut parts = line.split_whitespace().skip(Self::SKIP_VALUES);

        if let Some(split_char) = Self::SPLIT_CHAR {
            Self::parse_split_pairs(&mut parts, split_char, stat, lineno, handlers, seen_keys)
        } else {
            Self::parse_flat_pairs(&mut parts, stat, lineno, handlers, seen_keys)
        }
    }

    /// Parses alternating key/value tokens (e.g. `key1 123 key2 456`).
    fn parse_flat_pairs<'a>(
        parts: &mut impl Iterator<Item = &'a str>,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        while let (Some(key), Some(val)) = (parts.next(), parts.next()) {
            Self::parse_and_set(key, val, stat, lineno, handlers, seen_keys)?;
            if !Self::ALLOW_MULTIPLE_KV_PER_LINE {
                break;
            }
        }
        Ok(())
    }

    /// Parses `key<split_char>value` tokens (e.g. `rbytes=1024 wbytes=2048`).
    fn parse_split_pairs<'a>(
        parts: &mut impl Iterator<Item = &'a str>,
        split_char: char,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        for part in parts {
            if let Some((key, val)) = part.split_once(split_char) {
                Self::parse_and_set(key, val, stat, lineno, handlers, seen_keys)?;
            }
            if !Self::ALLOW_MULTIPLE_KV_PER_LINE {
                break;
            }
        }
        Ok(())
    }

    /// Applies a single key-value pair through the matching field handler.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::InvalidKeyValue`] if the value of a known
    /// key cannot be parsed as `u64`, or [`StatParseError::DuplicateField`]
    /// if the key repeats and duplicates are disallowed.
    fn parse_and_set(
        key: &str,
        val: &str,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        let key = Self::normalize_key(key);
        if let Some((k, handler)) = handlers.get_key_value(key) {
            let parsed = val
                .parse::<u64>()
                .map_err(|source| StatParseError::InvalidKeyValue {
                    key: key.to_string(),
                    value: val.to_string(),
                    line: lineno,
                    source,
                })?;
            if !Self::ALLOW_DUPLICATE_KEYS && !seen_keys.insert(k) {
                return Err(StatParseError::DuplicateField {
                    field: key.to_string(),
                    line: lineno,
                }
                .into());
            }
            handler(stat, parsed);
            return Ok(());
        }

        Self::on_unknown_key(key, val, lineno)
    }

    /// Called when a key is not found in the `field_handlers()` map.
    ///
    /// Unknown keys are silently ignored by default; procfs files grow new
    /// fields across kernel versions and samplers only care about their own.
    #[inline]
    fn on_unknown_key(_key: &str, _val: &str, _lineno: usize) -> std::io::Result<()> {
        Ok(())
    }
}

/// A trait for stats whose content is a single meaningful line with
/// positional fields, such as the aggregate `cpu` line of `/proc/stat` or a
/// `/proc/<pid>/stat` record.
pub trait SingleLineStat: Sized + Default {
    /// Parses the statistic from the provided buffered reader.
    ///
    /// # Errors
    ///
    /// Returns `Err(std::io::Error)` if reading fails or the line does not
    /// have the expected shape.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}
