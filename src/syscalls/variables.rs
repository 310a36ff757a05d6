//! Direct vector operations: lifetime, bulk copies, element access and
//! type metadata. None of these involve a protocol.

use tracing::debug;

use crate::heap::Handle;
use crate::module_api::{ModuleError, ModuleResult, SyscallCall, SyscallContext};
use crate::share_vector::ShareVec;
use crate::syscalls::common::{guard, resolve_pdpi, run, ArgShape, ReturnSlot};
use crate::value_traits::ShareValue;

pub const NEW_VEC: ArgShape = ArgShape::exact(2, true, 0, 0);
pub const INIT_VEC: ArgShape = ArgShape::exact(3, false, 0, 0);
pub const SET_SHARES: ArgShape = ArgShape::exact(1, false, 0, 1)
    .with_args(1, 2)
    .with_return(ReturnSlot::Optional);
pub const GET_SHARES: ArgShape = ArgShape::exact(2, false, 0, 0)
    .with_refs(0, 1)
    .with_return(ReturnSlot::Optional);
pub const GET_TYPE_SIZE: ArgShape = ArgShape::exact(1, true, 0, 0);
pub const FILL_VEC: ArgShape = ArgShape::exact(3, false, 0, 0);
pub const ASSIGN_VEC: ArgShape = ArgShape::exact(3, false, 0, 0);
pub const DECLASSIFY_VEC: ArgShape = ArgShape::exact(2, false, 1, 0);
pub const CLASSIFY_VEC: ArgShape = ArgShape::exact(2, false, 0, 1);
pub const DELETE_VEC: ArgShape = ArgShape::exact(2, false, 0, 0);
pub const LOAD_VEC: ArgShape = ArgShape::exact(4, false, 0, 0);
pub const STORE_VEC: ArgShape = ArgShape::exact(4, false, 0, 0);
pub const GET_DOMAIN_NAME: ArgShape = ArgShape::exact(1, true, 0, 0);

fn invalid_handle(name: &str, handle: Handle) -> ModuleError {
    debug!("{}: invalid handle {:#x}", name, handle.raw());
    ModuleError::OperationFailed
}

/// Bytes occupied by `len` shares of `T`, `OperationFailed` on overflow
fn bytes_for<T: ShareValue>(len: usize) -> ModuleResult<usize> {
    len.checked_mul(T::SHARE_SIZE)
        .ok_or(ModuleError::OperationFailed)
}

/// Data length of a host buffer, excluding the trailing convention byte
fn payload_len(name: &str, size: usize) -> ModuleResult<usize> {
    match size.checked_sub(1) {
        Some(len) => Ok(len),
        None => {
            debug!("{}: zero-sized buffer", name);
            Err(ModuleError::InvalidCall)
        }
    }
}

/// `new_<type>_vec(pd, size) -> handle`
pub fn new_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &NEW_VEC, call, ctx, |pdpi, call| {
        call.set_return(Handle::NULL.raw());

        let size = call.args[1].uint64();
        let len = match usize::try_from(size) {
            Ok(len) if len <= usize::MAX / T::SHARE_SIZE => len,
            _ => {
                debug!("{}: size {} overflows", name, size);
                return Err(ModuleError::InvalidCall);
            }
        };

        let vector = ShareVec::<T>::try_with_len(len).map_err(|_| ModuleError::OutOfMemory)?;
        let handle = pdpi.register_vector(vector).map_err(|e| {
            debug!("{}: {}", name, e);
            ModuleError::OutOfMemory
        })?;

        call.set_return(handle.raw());
        Ok(size)
    })
}

/// `init_<type>_vec(pd, value, handle)`: set every share to a public constant
pub fn init_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &INIT_VEC, call, ctx, |pdpi, call| {
        let value = T::share_from_public(T::public_from_stack(call.args[1]));
        let handle = call.args[2].handle();
        let vector = pdpi
            .heap_mut()
            .get_mut::<T>(handle)
            .ok_or_else(|| invalid_handle(name, handle))?;
        vector.fill(value);
        Ok(vector.len() as u64)
    })
}

/// `set_shares_<type>_vec(pd[, handle]) -> elements`
///
/// Without a handle only the element count of the buffer is reported.
pub fn set_shares<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &SET_SHARES, call, ctx, |pdpi, call| {
        let cref = call.first_cref().ok_or(ModuleError::InvalidCall)?;
        let data_len = payload_len(name, cref.size())?;
        let elements = data_len / T::SHARE_SIZE;

        if let Some(arg) = call.args.get(1) {
            let handle = arg.handle();
            let vector = pdpi
                .heap_mut()
                .get_mut::<T>(handle)
                .ok_or_else(|| invalid_handle(name, handle))?;
            if bytes_for::<T>(vector.len())? != data_len {
                debug!(
                    "{}: buffer holds {} bytes, vector needs {}",
                    name,
                    data_len,
                    vector.len() * T::SHARE_SIZE
                );
                return Err(ModuleError::OperationFailed);
            }
            vector.copy_from_bytes(&cref.data()[..data_len]);
        }

        call.set_return(elements as u64);
        Ok(elements as u64)
    })
}

/// `get_shares_<type>_vec(pd, handle) -> bytes`, optionally copying the raw shares out
pub fn get_shares<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &GET_SHARES, call, ctx, |pdpi, call| {
        let handle = call.args[1].handle();
        let vector = pdpi
            .heap()
            .get::<T>(handle)
            .ok_or_else(|| invalid_handle(name, handle))?;
        let byte_len = bytes_for::<T>(vector.len())?;

        if let Some(reference) = call.first_ref() {
            let data_len = payload_len(name, reference.size())?;
            if data_len != byte_len {
                debug!("{}: buffer holds {} bytes, vector has {}", name, data_len, byte_len);
                return Err(ModuleError::OperationFailed);
            }
            vector.copy_to_bytes(&mut reference.data_mut()[..byte_len]);
        }

        let len = vector.len() as u64;
        call.set_return(byte_len as u64);
        Ok(len)
    })
}

/// `get_type_size_<type>(pd) -> bytes per share`
pub fn get_type_size<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &GET_TYPE_SIZE, call, ctx, |_, call| {
        call.set_return(T::SHARE_SIZE as u64);
        Ok(0)
    })
}

/// `fill_<type>_vec(pd, src, dest)`: broadcast `src[0]` over `dest`
pub fn fill_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &FILL_VEC, call, ctx, |pdpi, call| {
        let src = call.args[1].handle();
        let dest = call.args[2].handle();
        let heap = pdpi.heap_mut();

        let source = heap.get::<T>(src).ok_or_else(|| invalid_handle(name, src))?;
        if !heap.is_valid_handle::<T>(dest) {
            return Err(invalid_handle(name, dest));
        }
        let Some(value) = source.as_slice().first().copied() else {
            debug!("{}: empty source vector", name);
            return Err(ModuleError::OperationFailed);
        };

        let target = heap.get_mut::<T>(dest).ok_or_else(|| invalid_handle(name, dest))?;
        target.fill(value);
        Ok(target.len() as u64)
    })
}

/// `assign_<type>_vec(pd, src, dest)`: elementwise copy between equal-length vectors
pub fn assign_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &ASSIGN_VEC, call, ctx, |pdpi, call| {
        let src = call.args[1].handle();
        let dest = call.args[2].handle();
        let heap = pdpi.heap_mut();

        if !heap.is_valid_handle::<T>(src) {
            return Err(invalid_handle(name, src));
        }
        if !heap.is_valid_handle::<T>(dest) {
            return Err(invalid_handle(name, dest));
        }
        if src == dest {
            return Ok(heap.get::<T>(dest).map_or(0, |v| v.len() as u64));
        }

        let (source, target) = heap
            .get_pair_mut::<T>(src, dest)
            .ok_or(ModuleError::OperationFailed)?;
        if source.len() != target.len() {
            debug!(
                "{}: source has {} elements, destination {}",
                name,
                source.len(),
                target.len()
            );
            return Err(ModuleError::InvalidCall);
        }
        target.assign(source);
        Ok(target.len() as u64)
    })
}

/// `declassify_<type>_vec(pd, src)`: copy shares out into a host buffer
pub fn declassify_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &DECLASSIFY_VEC, call, ctx, |pdpi, call| {
        let src = call.args[1].handle();
        let vector = pdpi.heap().get::<T>(src).ok_or_else(|| invalid_handle(name, src))?;
        let byte_len = bytes_for::<T>(vector.len())?;

        let reference = call.first_ref().ok_or(ModuleError::InvalidCall)?;
        let data_len = payload_len(name, reference.size())?;
        if data_len < byte_len {
            debug!("{}: buffer of {} bytes too small for {}", name, data_len, byte_len);
            return Err(ModuleError::OperationFailed);
        }
        vector.copy_to_bytes(&mut reference.data_mut()[..byte_len]);
        Ok(vector.len() as u64)
    })
}

/// `classify_<type>_vec(pd, dest)`: copy a host buffer into the shares
pub fn classify_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &CLASSIFY_VEC, call, ctx, |pdpi, call| {
        let dest = call.args[1].handle();
        let cref = call.first_cref().ok_or(ModuleError::InvalidCall)?;
        let vector = pdpi
            .heap_mut()
            .get_mut::<T>(dest)
            .ok_or_else(|| invalid_handle(name, dest))?;
        let byte_len = bytes_for::<T>(vector.len())?;

        let data_len = payload_len(name, cref.size())?;
        if data_len < byte_len {
            debug!("{}: buffer of {} bytes too small for {}", name, data_len, byte_len);
            return Err(ModuleError::OperationFailed);
        }
        vector.copy_from_bytes(&cref.data()[..byte_len]);
        Ok(vector.len() as u64)
    })
}

/// `delete_<type>_vec(pd, handle)`
pub fn delete_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &DELETE_VEC, call, ctx, |pdpi, call| {
        let handle = call.args[1].handle();
        let len = pdpi
            .heap()
            .get::<T>(handle)
            .map(|v| v.len() as u64)
            .ok_or_else(|| invalid_handle(name, handle))?;
        if !pdpi.free_registered_vector(handle) {
            return Err(invalid_handle(name, handle));
        }
        Ok(len)
    })
}

/// `load_<type>_vec(pd, src, index, dest)`: `dest[0] = src[index]`
pub fn load_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &LOAD_VEC, call, ctx, |pdpi, call| {
        let src = call.args[1].handle();
        let index = call.args[2].uint64();
        let dest = call.args[3].handle();
        let heap = pdpi.heap_mut();

        let source = heap.get::<T>(src).ok_or_else(|| invalid_handle(name, src))?;
        let dest_len = heap
            .get::<T>(dest)
            .map(ShareVec::len)
            .ok_or_else(|| invalid_handle(name, dest))?;
        let value = match usize::try_from(index).ok().and_then(|i| source.as_slice().get(i)) {
            Some(value) if dest_len > 0 => *value,
            _ => {
                debug!(
                    "{}: index {} out of bounds for {} elements or empty destination",
                    name,
                    index,
                    source.len()
                );
                return Err(ModuleError::OperationFailed);
            }
        };

        let target = heap.get_mut::<T>(dest).ok_or_else(|| invalid_handle(name, dest))?;
        target[0] = value;
        Ok(1)
    })
}

/// `store_<type>_vec(pd, src, index, dest)`: `dest[index] = src[0]`
pub fn store_vec<T: ShareValue>(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    run(name, &STORE_VEC, call, ctx, |pdpi, call| {
        let src = call.args[1].handle();
        let index = call.args[2].uint64();
        let dest = call.args[3].handle();
        let heap = pdpi.heap_mut();

        let source = heap.get::<T>(src).ok_or_else(|| invalid_handle(name, src))?;
        let dest_len = heap
            .get::<T>(dest)
            .map(ShareVec::len)
            .ok_or_else(|| invalid_handle(name, dest))?;
        let (value, slot) = match (source.as_slice().first(), usize::try_from(index)) {
            (Some(value), Ok(slot)) if slot < dest_len => (*value, slot),
            _ => {
                debug!(
                    "{}: index {} out of bounds for {} elements or empty source",
                    name, index, dest_len
                );
                return Err(ModuleError::OperationFailed);
            }
        };

        let target = heap.get_mut::<T>(dest).ok_or_else(|| invalid_handle(name, dest))?;
        target[slot] = value;
        Ok(1)
    })
}

/// `get_domain_name(pd) -> public memory handle`
///
/// Writes the NUL-terminated name of the caller's protection domain into a
/// freshly allocated block of public interpreter memory.
pub fn get_domain_name(
    name: &str,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
) -> ModuleResult {
    if !GET_DOMAIN_NAME.check(call) {
        debug!("Syscall {} called with an invalid argument layout", name);
        return Err(ModuleError::InvalidCall);
    }
    let pd_name = match resolve_pdpi(ctx, call.args) {
        Some(pdpi) => pdpi.context().pd_name().to_string(),
        None => {
            debug!("Syscall {} could not resolve its PDPI", name);
            return Err(ModuleError::InvalidCall);
        }
    };

    guard(name, || {
        let size = pd_name.len() + 1;
        let Some(mem_handle) = ctx.public_alloc(size as u64) else {
            debug!("{}: public allocation of {} bytes failed", name, size);
            return Err(ModuleError::OutOfMemory);
        };
        let written = match ctx.public_mem_mut(mem_handle) {
            Some(memory) if memory.len() >= size => {
                memory[..pd_name.len()].copy_from_slice(pd_name.as_bytes());
                memory[pd_name.len()] = 0;
                true
            }
            _ => false,
        };
        if !written {
            debug!("{}: public block {} is not writable", name, mem_handle);
            ctx.public_free(mem_handle);
            return Err(ModuleError::OutOfMemory);
        }

        call.set_return(mem_handle);
        Ok(())
    })
}
