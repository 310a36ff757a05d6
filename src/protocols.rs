//! # Protocol Capability
//!
//! The dispatch layer binds validated share vectors to a protocol and calls
//! its `invoke`. Protocols are constructed per call from the PDPI's shared
//! context and report failures as plain strings, which the dispatch layer
//! logs and maps to a failed-operation status.
//!
//! The protocols in this module emulate the computation on plaintext share
//! words: every party's share is treated as the value itself. They make every
//! registered syscall executable in-process.

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::protection_domain::PdpiContext;
use crate::share_vector::ShareVec;
use crate::value_traits::{ShareValue, ShareWord};

pub type ProtocolResult = Result<(), String>;

/// Construction from the owning PDPI's context
pub trait Protocol: Sized {
    fn new(context: &PdpiContext) -> Self;
}

pub trait NullaryProtocol<T: ShareValue>: Protocol {
    fn invoke(&mut self, out: &mut ShareVec<T>) -> ProtocolResult;
}

pub trait UnaryProtocol<I: ShareValue, O: ShareValue>: Protocol {
    fn invoke(&mut self, input: &ShareVec<I>, out: &mut ShareVec<O>) -> ProtocolResult;
}

pub trait BinaryProtocol<L: ShareValue, R: ShareValue, O: ShareValue>: Protocol {
    fn invoke(&mut self, lhs: &ShareVec<L>, rhs: &ShareVec<R>, out: &mut ShareVec<O>) -> ProtocolResult;
}

pub trait TernaryProtocol<A: ShareValue, B: ShareValue, C: ShareValue, O: ShareValue>: Protocol {
    fn invoke(
        &mut self,
        a: &ShareVec<A>,
        b: &ShareVec<B>,
        c: &ShareVec<C>,
        out: &mut ShareVec<O>,
    ) -> ProtocolResult;
}

fn check_lengths(out_len: usize, inputs: &[usize]) -> ProtocolResult {
    match inputs.iter().find(|len| **len != out_len) {
        Some(len) => Err(format!(
            "Vector length mismatch: input has {} elements, output has {}",
            len, out_len
        )),
        None => Ok(()),
    }
}

macro_rules! elementwise_binary_protocol {
    ($(#[$doc:meta])* $name:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name;

        impl Protocol for $name {
            fn new(_context: &PdpiContext) -> Self {
                $name
            }
        }

        impl<T: ShareValue> BinaryProtocol<T, T, T> for $name {
            fn invoke(&mut self, lhs: &ShareVec<T>, rhs: &ShareVec<T>, out: &mut ShareVec<T>) -> ProtocolResult {
                check_lengths(out.len(), &[lhs.len(), rhs.len()])?;
                for ((dest, $a), $b) in out.as_mut_slice().iter_mut().zip(lhs.iter()).zip(rhs.iter()) {
                    let ($a, $b): (T::Share, T::Share) = (*$a, *$b);
                    *dest = $body;
                }
                Ok(())
            }
        }
    };
}

fn indicator<W: ShareWord>(condition: bool) -> W {
    W::from_u64_truncating(condition as u64)
}

elementwise_binary_protocol!(
    /// Wrapping addition of shares
    AdditionProtocol, |a, b| a.wrapping_add(b));
elementwise_binary_protocol!(
    /// Wrapping subtraction of shares
    SubtractionProtocol, |a, b| a.wrapping_sub(b));
elementwise_binary_protocol!(
    /// Wrapping multiplication of shares
    MultiplicationProtocol, |a, b| a.wrapping_mul(b));
elementwise_binary_protocol!(EqualityProtocol, |a, b| indicator(a == b));
elementwise_binary_protocol!(GreaterThanProtocol, |a, b| indicator(a > b));
elementwise_binary_protocol!(GreaterThanOrEqualProtocol, |a, b| indicator(a >= b));
elementwise_binary_protocol!(LessThanProtocol, |a, b| indicator(a < b));
elementwise_binary_protocol!(LessThanOrEqualProtocol, |a, b| indicator(a <= b));

/// Width conversion: truncates when narrowing, zero-extends when widening
#[derive(Debug, Default)]
pub struct ConversionProtocol;

impl Protocol for ConversionProtocol {
    fn new(_context: &PdpiContext) -> Self {
        ConversionProtocol
    }
}

impl<I: ShareValue, O: ShareValue> UnaryProtocol<I, O> for ConversionProtocol {
    fn invoke(&mut self, input: &ShareVec<I>, out: &mut ShareVec<O>) -> ProtocolResult {
        check_lengths(out.len(), &[input.len()])?;
        for (dest, src) in out.as_mut_slice().iter_mut().zip(input.iter()) {
            *dest = O::Share::from_u64_truncating(src.to_u64());
        }
        Ok(())
    }
}

/// `out[i] = if cond[i] != 0 { a[i] } else { b[i] }`
#[derive(Debug, Default)]
pub struct ObliviousChoiceProtocol;

impl Protocol for ObliviousChoiceProtocol {
    fn new(_context: &PdpiContext) -> Self {
        ObliviousChoiceProtocol
    }
}

impl<T: ShareValue> TernaryProtocol<T, T, T, T> for ObliviousChoiceProtocol {
    fn invoke(
        &mut self,
        cond: &ShareVec<T>,
        a: &ShareVec<T>,
        b: &ShareVec<T>,
        out: &mut ShareVec<T>,
    ) -> ProtocolResult {
        check_lengths(out.len(), &[cond.len(), a.len(), b.len()])?;
        let zero = T::Share::default();
        for (i, dest) in out.as_mut_slice().iter_mut().enumerate() {
            *dest = if cond[i] != zero { a[i] } else { b[i] };
        }
        Ok(())
    }
}

/// Fills the output with uniformly random shares
pub struct RandomSharesProtocol {
    rng: ThreadRng,
}

impl Protocol for RandomSharesProtocol {
    fn new(_context: &PdpiContext) -> Self {
        RandomSharesProtocol { rng: rand::rng() }
    }
}

impl<T: ShareValue> NullaryProtocol<T> for RandomSharesProtocol {
    fn invoke(&mut self, out: &mut ShareVec<T>) -> ProtocolResult {
        for dest in out.as_mut_slice() {
            *dest = T::Share::from_u64_truncating(self.rng.random::<u64>());
        }
        Ok(())
    }
}
