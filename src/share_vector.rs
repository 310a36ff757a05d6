//! # Share Vectors
//!
//! A `ShareVec<T>` owns a contiguous buffer of shares of one element type.
//! It is the unit of data the interpreter manipulates indirectly through
//! handles; the handle heap owns every registered vector exclusively.
//!
//! `AnyShareVec` is the closed tagged variant the heap stores. Typed access
//! always goes through `ShareValue::downcast_ref`/`downcast_mut`, which match
//! the variant before handing out a `ShareVec<T>`.

use std::collections::TryReserveError;
use std::fmt;
use std::ops::{Index, IndexMut};

use crate::value_traits::{SfUint32, SfUint64, ShareValue, ShareWord, TypeTag};

/// Owned, contiguous vector of shares
pub struct ShareVec<T: ShareValue> {
    shares: Vec<T::Share>,
}

impl<T: ShareValue> ShareVec<T> {
    pub fn new() -> Self {
        ShareVec { shares: Vec::new() }
    }

    /// Allocate a zeroed vector of `len` shares
    ///
    /// Allocation failure is reported instead of aborting the process, so the
    /// dispatch layer can answer with an out-of-memory status.
    pub fn try_with_len(len: usize) -> Result<Self, TryReserveError> {
        let mut shares = Vec::new();
        shares.try_reserve_exact(len)?;
        shares.resize(len, T::Share::default());
        Ok(ShareVec { shares })
    }

    pub fn from_shares(shares: Vec<T::Share>) -> Self {
        ShareVec { shares }
    }

    /// Decode as many whole shares as `bytes` holds
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let shares = bytes
            .chunks_exact(T::SHARE_SIZE)
            .map(T::Share::read_ne)
            .collect();
        ShareVec { shares }
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Number of bytes the shares occupy on the wire, `None` on overflow
    pub fn byte_len(&self) -> Option<usize> {
        self.shares.len().checked_mul(T::SHARE_SIZE)
    }

    pub fn as_slice(&self) -> &[T::Share] {
        &self.shares
    }

    pub fn as_mut_slice(&mut self) -> &mut [T::Share] {
        &mut self.shares
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T::Share> {
        self.shares.iter()
    }

    pub fn fill(&mut self, value: T::Share) {
        self.shares.fill(value);
    }

    /// Elementwise copy from a vector of the same length
    ///
    /// # Panics
    /// Panics if the lengths differ; callers check this first.
    pub fn assign(&mut self, other: &ShareVec<T>) {
        self.shares.copy_from_slice(&other.shares);
    }

    /// Overwrite all shares from the first `byte_len()` bytes of `bytes`
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) {
        for (share, chunk) in self
            .shares
            .iter_mut()
            .zip(bytes.chunks_exact(T::SHARE_SIZE))
        {
            *share = T::Share::read_ne(chunk);
        }
    }

    /// Write all shares into the first `byte_len()` bytes of `out`
    pub fn copy_to_bytes(&self, out: &mut [u8]) {
        for (share, chunk) in self
            .shares
            .iter()
            .zip(out.chunks_exact_mut(T::SHARE_SIZE))
        {
            share.write_ne(chunk);
        }
    }
}

impl<T: ShareValue> Default for ShareVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ShareValue> Clone for ShareVec<T> {
    fn clone(&self) -> Self {
        ShareVec {
            shares: self.shares.clone(),
        }
    }
}

impl<T: ShareValue> PartialEq for ShareVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shares == other.shares
    }
}

impl<T: ShareValue> fmt::Debug for ShareVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareVec")
            .field("type", &T::TAG)
            .field("len", &self.shares.len())
            .finish()
    }
}

impl<T: ShareValue> Index<usize> for ShareVec<T> {
    type Output = T::Share;

    fn index(&self, index: usize) -> &T::Share {
        &self.shares[index]
    }
}

impl<T: ShareValue> IndexMut<usize> for ShareVec<T> {
    fn index_mut(&mut self, index: usize) -> &mut T::Share {
        &mut self.shares[index]
    }
}

/// Type-tagged share vector as stored in the handle heap
#[derive(Debug, Clone, PartialEq)]
pub enum AnyShareVec {
    Uint32(ShareVec<SfUint32>),
    Uint64(ShareVec<SfUint64>),
}

impl AnyShareVec {
    pub fn tag(&self) -> TypeTag {
        match self {
            AnyShareVec::Uint32(_) => TypeTag::Uint32,
            AnyShareVec::Uint64(_) => TypeTag::Uint64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnyShareVec::Uint32(v) => v.len(),
            AnyShareVec::Uint64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
