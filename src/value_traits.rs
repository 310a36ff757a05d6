//! # Value Traits for Shared Unsigned Integers
//!
//! This module defines the closed catalogue of element types a share vector
//! can hold. Every type carries a distinct heap type identifier which the
//! handle heap stores next to each registered vector, so that a handle can be
//! checked against the type an operation expects before it is dereferenced.
//!
//! Supported types:
//! - `SfUint32`: 32-bit unsigned shares (`heap_type_id = 0x1`)
//! - `SfUint64`: 64-bit unsigned shares (`heap_type_id = 0x2`)

use std::fmt;

use crate::module_api::CodeBlock;
use crate::share_vector::{AnyShareVec, ShareVec};

/// Runtime type discriminant stored alongside every heap entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Uint32 = 0x1,
    Uint64 = 0x2,
}

impl TypeTag {
    /// Numeric identifier used for runtime type checks
    pub const fn heap_type_id(self) -> u8 {
        self as u8
    }

    /// Wire size of one share element in bytes
    pub const fn share_size(self) -> usize {
        match self {
            TypeTag::Uint32 => std::mem::size_of::<u32>(),
            TypeTag::Uint64 => std::mem::size_of::<u64>(),
        }
    }

    /// Name fragment used in syscall signatures (`new_uint32_vec`, ...)
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::Uint32 => "uint32",
            TypeTag::Uint64 => "uint64",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Machine word a share is stored in
///
/// Shares cross the boundary as raw native-endian bytes, the same layout the
/// interpreter uses for its own memory.
pub trait ShareWord: Copy + Default + Eq + Ord + fmt::Debug + Send + Sync + 'static {
    /// Size of the word in bytes
    const BYTES: usize;

    /// Read a word from exactly `BYTES` native-endian bytes
    fn read_ne(bytes: &[u8]) -> Self;
    /// Write the word into exactly `BYTES` bytes
    fn write_ne(self, out: &mut [u8]);

    fn wrapping_add(self, other: Self) -> Self;
    fn wrapping_sub(self, other: Self) -> Self;
    fn wrapping_mul(self, other: Self) -> Self;

    /// Keep the low bits of `value` that fit into the word
    fn from_u64_truncating(value: u64) -> Self;
    /// Zero-extend the word to 64 bits
    fn to_u64(self) -> u64;
}

macro_rules! impl_share_word {
    ($t:ty) => {
        impl ShareWord for $t {
            const BYTES: usize = std::mem::size_of::<$t>();

            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_ne_bytes(buf)
            }

            fn write_ne(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            fn wrapping_add(self, other: Self) -> Self {
                <$t>::wrapping_add(self, other)
            }

            fn wrapping_sub(self, other: Self) -> Self {
                <$t>::wrapping_sub(self, other)
            }

            fn wrapping_mul(self, other: Self) -> Self {
                <$t>::wrapping_mul(self, other)
            }

            fn from_u64_truncating(value: u64) -> Self {
                value as $t
            }

            fn to_u64(self) -> u64 {
                self as u64
            }
        }
    };
}

impl_share_word!(u32);
impl_share_word!(u64);

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::SfUint32 {}
    impl Sealed for super::SfUint64 {}
}

/// A shared value type known to the heap
///
/// The trait is sealed: the set of element types is closed, and each one maps
/// to exactly one `AnyShareVec` variant. `downcast_ref`/`downcast_mut` match on
/// that variant, so a vector can only ever be viewed at the type it was
/// registered with.
pub trait ShareValue: sealed::Sealed + Send + Sync + Sized + 'static {
    /// Representation of one share
    type Share: ShareWord;
    /// Representation of one public (classified-from) value
    type Public: ShareWord;

    const TAG: TypeTag;
    const NUM_OF_BITS: usize;
    const LOG_OF_BITS: usize;
    const SHARE_SIZE: usize = <Self::Share as ShareWord>::BYTES;

    /// Read a public value from a scalar stack argument
    fn public_from_stack(arg: CodeBlock) -> Self::Public;

    /// Public values are stored verbatim as shares at this layer
    fn share_from_public(value: Self::Public) -> Self::Share;

    fn wrap(vec: ShareVec<Self>) -> AnyShareVec;
    fn downcast_ref(vec: &AnyShareVec) -> Option<&ShareVec<Self>>;
    fn downcast_mut(vec: &mut AnyShareVec) -> Option<&mut ShareVec<Self>>;
}

/// 32-bit unsigned shared integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfUint32;

/// 64-bit unsigned shared integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfUint64;

impl ShareValue for SfUint32 {
    type Share = u32;
    type Public = u32;

    const TAG: TypeTag = TypeTag::Uint32;
    const NUM_OF_BITS: usize = 32;
    const LOG_OF_BITS: usize = 5;

    fn public_from_stack(arg: CodeBlock) -> u32 {
        arg.uint32()
    }

    fn share_from_public(value: u32) -> u32 {
        value
    }

    fn wrap(vec: ShareVec<Self>) -> AnyShareVec {
        AnyShareVec::Uint32(vec)
    }

    fn downcast_ref(vec: &AnyShareVec) -> Option<&ShareVec<Self>> {
        match vec {
            AnyShareVec::Uint32(v) => Some(v),
            _ => None,
        }
    }

    fn downcast_mut(vec: &mut AnyShareVec) -> Option<&mut ShareVec<Self>> {
        match vec {
            AnyShareVec::Uint32(v) => Some(v),
            _ => None,
        }
    }
}

impl ShareValue for SfUint64 {
    type Share = u64;
    type Public = u64;

    const TAG: TypeTag = TypeTag::Uint64;
    const NUM_OF_BITS: usize = 64;
    const LOG_OF_BITS: usize = 6;

    fn public_from_stack(arg: CodeBlock) -> u64 {
        arg.uint64()
    }

    fn share_from_public(value: u64) -> u64 {
        value
    }

    fn wrap(vec: ShareVec<Self>) -> AnyShareVec {
        AnyShareVec::Uint64(vec)
    }

    fn downcast_ref(vec: &AnyShareVec) -> Option<&ShareVec<Self>> {
        match vec {
            AnyShareVec::Uint64(v) => Some(v),
            _ => None,
        }
    }

    fn downcast_mut(vec: &mut AnyShareVec) -> Option<&mut ShareVec<Self>> {
        match vec {
            AnyShareVec::Uint64(v) => Some(v),
            _ => None,
        }
    }
}
