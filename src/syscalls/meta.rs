//! Protocol-backed syscalls
//!
//! Each template validates its handles at the types the protocol expects,
//! leases the output vector out of the heap, runs the protocol against
//! borrowed inputs and puts the output back. An input that is also the output
//! is snapshotted first so the protocol sees its values from before the call.

use tracing::debug;

use crate::heap::{Handle, HandleHeap};
use crate::module_api::{ModuleError, ModuleResult, SyscallCall, SyscallContext};
use crate::protocols::{BinaryProtocol, NullaryProtocol, TernaryProtocol, UnaryProtocol};
use crate::share_vector::ShareVec;
use crate::syscalls::common::{invoke_protocol, run, ArgShape};
use crate::value_traits::ShareValue;

pub const NULLARY_VEC: ArgShape = ArgShape::exact(2, false, 0, 0);
pub const UNARY_VEC: ArgShape = ArgShape::exact(3, false, 0, 0);
pub const BINARY_VEC: ArgShape = ArgShape::exact(4, false, 0, 0);
pub const BINARY_PUBLIC_VEC: ArgShape = ArgShape::exact(3, false, 0, 1);
pub const TERNARY_VEC: ArgShape = ArgShape::exact(5, false, 0, 0);

fn require<T: ShareValue>(name: &str, heap: &HandleHeap, handle: Handle) -> ModuleResult {
    if heap.is_valid_handle::<T>(handle) {
        Ok(())
    } else {
        debug!("{}: invalid {} handle {:#x}", name, T::TAG, handle.raw());
        Err(ModuleError::OperationFailed)
    }
}

fn input_len<T: ShareValue>(heap: &HandleHeap, handle: Handle) -> u64 {
    heap.get::<T>(handle).map_or(0, |v| v.len() as u64)
}

/// Copy of `input` if it is also the output handle
fn snapshot_if_aliased<T: ShareValue>(heap: &HandleHeap, input: Handle, out: Handle) -> Option<ShareVec<T>> {
    if input == out {
        heap.get::<T>(input).cloned()
    } else {
        None
    }
}

fn input_view<'a, T: ShareValue>(
    heap: &'a HandleHeap,
    snapshot: &'a Option<ShareVec<T>>,
    handle: Handle,
) -> Option<&'a ShareVec<T>> {
    snapshot.as_ref().or_else(|| heap.get::<T>(handle))
}

/// `op(pd, out)`
pub fn nullary_vec<T, P>(name: &str, call: &mut SyscallCall<'_, '_>, ctx: &mut dyn SyscallContext) -> ModuleResult
where
    T: ShareValue,
    P: NullaryProtocol<T>,
{
    run(name, &NULLARY_VEC, call, ctx, |pdpi, call| {
        let out_handle = call.args[1].handle();
        let (context, heap) = pdpi.split_mut();
        require::<T>(name, heap, out_handle)?;

        let mut out = heap.lease::<T>(out_handle).ok_or(ModuleError::OperationFailed)?;
        let parameter = out.len() as u64;
        let result = invoke_protocol(name, || P::new(context).invoke(&mut out));
        heap.restore(out_handle, out);

        result.map(|()| parameter)
    })
}

/// `op(pd, input, out)`
pub fn unary_vec<I, O, P>(name: &str, call: &mut SyscallCall<'_, '_>, ctx: &mut dyn SyscallContext) -> ModuleResult
where
    I: ShareValue,
    O: ShareValue,
    P: UnaryProtocol<I, O>,
{
    run(name, &UNARY_VEC, call, ctx, |pdpi, call| {
        let in_handle = call.args[1].handle();
        let out_handle = call.args[2].handle();
        let (context, heap) = pdpi.split_mut();
        require::<I>(name, heap, in_handle)?;
        require::<O>(name, heap, out_handle)?;

        let parameter = input_len::<I>(heap, in_handle);
        let snapshot = snapshot_if_aliased::<I>(heap, in_handle, out_handle);
        let mut out = heap.lease::<O>(out_handle).ok_or(ModuleError::OperationFailed)?;

        let result = match input_view(heap, &snapshot, in_handle) {
            Some(input) => invoke_protocol(name, || P::new(context).invoke(input, &mut out)),
            None => Err(ModuleError::OperationFailed),
        };
        heap.restore(out_handle, out);

        result.map(|()| parameter)
    })
}

/// `op(pd, lhs, rhs, out)`
pub fn binary_vec<L, R, O, P>(name: &str, call: &mut SyscallCall<'_, '_>, ctx: &mut dyn SyscallContext) -> ModuleResult
where
    L: ShareValue,
    R: ShareValue,
    O: ShareValue,
    P: BinaryProtocol<L, R, O>,
{
    run(name, &BINARY_VEC, call, ctx, |pdpi, call| {
        let lhs_handle = call.args[1].handle();
        let rhs_handle = call.args[2].handle();
        let out_handle = call.args[3].handle();
        let (context, heap) = pdpi.split_mut();
        require::<L>(name, heap, lhs_handle)?;
        require::<R>(name, heap, rhs_handle)?;
        require::<O>(name, heap, out_handle)?;

        let parameter = input_len::<L>(heap, lhs_handle);
        let lhs_snapshot = snapshot_if_aliased::<L>(heap, lhs_handle, out_handle);
        let rhs_snapshot = snapshot_if_aliased::<R>(heap, rhs_handle, out_handle);
        let mut out = heap.lease::<O>(out_handle).ok_or(ModuleError::OperationFailed)?;

        let inputs = (
            input_view(heap, &lhs_snapshot, lhs_handle),
            input_view(heap, &rhs_snapshot, rhs_handle),
        );
        let result = match inputs {
            (Some(lhs), Some(rhs)) => invoke_protocol(name, || P::new(context).invoke(lhs, rhs, &mut out)),
            _ => Err(ModuleError::OperationFailed),
        };
        heap.restore(out_handle, out);

        result.map(|()| parameter)
    })
}

/// `op(pd, lhs, out)` with the right operand passed as a public byte buffer
pub fn binary_public_vec<L, R, O, P>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult
where
    L: ShareValue,
    R: ShareValue,
    O: ShareValue,
    P: BinaryProtocol<L, R, O>,
{
    run(name, &BINARY_PUBLIC_VEC, call, ctx, |pdpi, call| {
        let lhs_handle = call.args[1].handle();
        let out_handle = call.args[2].handle();
        let cref = call.first_cref().ok_or(ModuleError::InvalidCall)?;
        let Some(data_len) = cref.size().checked_sub(1) else {
            debug!("{}: zero-sized public operand", name);
            return Err(ModuleError::InvalidCall);
        };
        let (context, heap) = pdpi.split_mut();
        require::<L>(name, heap, lhs_handle)?;
        require::<O>(name, heap, out_handle)?;

        let rhs = ShareVec::<R>::from_bytes(&cref.data()[..data_len]);
        let parameter = input_len::<L>(heap, lhs_handle);
        let lhs_snapshot = snapshot_if_aliased::<L>(heap, lhs_handle, out_handle);
        let mut out = heap.lease::<O>(out_handle).ok_or(ModuleError::OperationFailed)?;

        let result = match input_view(heap, &lhs_snapshot, lhs_handle) {
            Some(lhs) => invoke_protocol(name, || P::new(context).invoke(lhs, &rhs, &mut out)),
            None => Err(ModuleError::OperationFailed),
        };
        heap.restore(out_handle, out);

        result.map(|()| parameter)
    })
}

/// `op(pd, a, b, c, out)`
pub fn ternary_vec<A, B, C, O, P>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult
where
    A: ShareValue,
    B: ShareValue,
    C: ShareValue,
    O: ShareValue,
    P: TernaryProtocol<A, B, C, O>,
{
    run(name, &TERNARY_VEC, call, ctx, |pdpi, call| {
        let a_handle = call.args[1].handle();
        let b_handle = call.args[2].handle();
        let c_handle = call.args[3].handle();
        let out_handle = call.args[4].handle();
        let (context, heap) = pdpi.split_mut();
        require::<A>(name, heap, a_handle)?;
        require::<B>(name, heap, b_handle)?;
        require::<C>(name, heap, c_handle)?;
        require::<O>(name, heap, out_handle)?;

        let parameter = input_len::<A>(heap, a_handle);
        let a_snapshot = snapshot_if_aliased::<A>(heap, a_handle, out_handle);
        let b_snapshot = snapshot_if_aliased::<B>(heap, b_handle, out_handle);
        let c_snapshot = snapshot_if_aliased::<C>(heap, c_handle, out_handle);
        let mut out = heap.lease::<O>(out_handle).ok_or(ModuleError::OperationFailed)?;

        let inputs = (
            input_view(heap, &a_snapshot, a_handle),
            input_view(heap, &b_snapshot, b_handle),
            input_view(heap, &c_snapshot, c_handle),
        );
        let result = match inputs {
            (Some(a), Some(b), Some(c)) => invoke_protocol(name, || P::new(context).invoke(a, b, c, &mut out)),
            _ => Err(ModuleError::OperationFailed),
        };
        heap.restore(out_handle, out);

        result.map(|()| parameter)
    })
}
