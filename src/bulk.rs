//! Refcounted, immutable-after-fill byte string.
//!
//! `Bulk` is the unit of payload that crosses the protocol boundary and
//! enters the key table. It wraps [`bytes::Bytes`], which already gives us
//! everything the wire format needs: O(1) clone ("retain"), drop-counted
//! release, and a shared immutable backing buffer so a decoded frame can be
//! handed straight into the store without copying.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use bytes::{Bytes, BytesMut};

/// A length-carrying, reference-counted byte string.
///
/// Comparison and hashing are both defined purely over the byte content, so
/// `Bulk` can be used directly as a `HashMap` key or sorted by
/// `memcmp`-then-length order, matching the wire protocol's comparison
/// rule.
#[derive(Clone, Eq)]
pub struct Bulk(Bytes);

impl Bulk {
    /// Wrap an already-filled buffer. `Bytes` has no uninitialised state
    /// worth exposing in safe Rust, so allocation and fill collapse into
    /// one step.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }

    /// Wrap a frozen `BytesMut`, avoiding a copy when the caller already
    /// assembled the payload in a growable buffer (the common case when
    /// reading fixed-length bulks off the wire).
    pub fn from_bytes_mut(buf: BytesMut) -> Self {
        Self(buf.freeze())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `memcmp` of the common prefix, then length as tiebreak. `Bytes`'s
    /// own `Ord` impl already does exactly this; spelled out here so the
    /// comparison rule has a name callers can reach for directly.
    pub fn compare(&self, other: &Bulk) -> Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<&str> for Bulk {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Bytes> for Bulk {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl Deref for Bulk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Bulk {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for Bulk {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for Bulk {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Bulk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Bulk {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Debug for Bulk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Bulk({s:?})"),
            Err(_) => write!(f, "Bulk({:?})", self.0.as_ref()),
        }
    }
}
