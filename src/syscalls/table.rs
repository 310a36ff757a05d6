//! # Syscall Registration Table
//!
//! Every externally callable operation is registered once, by fully
//! qualified name, together with its argument layout. Lookups are O(1) and a
//! duplicate name is rejected while the table is being built.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::module_api::{ModuleResult, SyscallCall, SyscallContext};
use crate::protocols::{
    AdditionProtocol, ConversionProtocol, EqualityProtocol, GreaterThanOrEqualProtocol, GreaterThanProtocol,
    LessThanOrEqualProtocol, LessThanProtocol, MultiplicationProtocol, ObliviousChoiceProtocol,
    RandomSharesProtocol, SubtractionProtocol,
};
use crate::syscalls::common::{ArgShape, MODULE_NAME};
use crate::syscalls::{meta, variables};
use crate::value_traits::{SfUint32, SfUint64, ShareValue};

/// Type-erased syscall entry point
pub type SyscallFn = dyn Fn(&mut SyscallCall<'_, '_>, &mut dyn SyscallContext) -> ModuleResult + Send + Sync;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("syscall {0} is registered twice")]
    Duplicate(String),
}

/// A registered syscall
#[derive(Clone)]
pub struct SyscallDefinition {
    name: Arc<str>,
    shape: ArgShape,
    func: Arc<SyscallFn>,
}

impl SyscallDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &ArgShape {
        &self.shape
    }

    pub fn invoke(&self, call: &mut SyscallCall<'_, '_>, ctx: &mut dyn SyscallContext) -> ModuleResult {
        (self.func)(call, ctx)
    }
}

impl fmt::Debug for SyscallDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyscallDefinition")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Immutable name-to-syscall map
#[derive(Debug, Default)]
pub struct SyscallTable {
    definitions: FxHashMap<Arc<str>, SyscallDefinition>,
    order: Vec<Arc<str>>,
}

impl SyscallTable {
    pub fn get(&self, name: &str) -> Option<&SyscallDefinition> {
        self.definitions.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|name| name.as_ref())
    }

    /// The full catalogue this module exports
    pub fn standard() -> Result<Self, TableError> {
        let mut builder = SyscallTableBuilder::new();

        register_variable_management::<SfUint32>(&mut builder)?;
        register_variable_management::<SfUint64>(&mut builder)?;
        register_arithmetic::<SfUint32>(&mut builder)?;
        register_arithmetic::<SfUint64>(&mut builder)?;
        register_comparisons::<SfUint32>(&mut builder)?;
        register_comparisons::<SfUint64>(&mut builder)?;
        register_special::<SfUint32>(&mut builder)?;
        register_special::<SfUint64>(&mut builder)?;

        builder.register(
            "conv_uint64_to_uint32_vec",
            meta::UNARY_VEC,
            meta::unary_vec::<SfUint64, SfUint32, ConversionProtocol>,
        )?;
        builder.register(
            "conv_uint32_to_uint64_vec",
            meta::UNARY_VEC,
            meta::unary_vec::<SfUint32, SfUint64, ConversionProtocol>,
        )?;
        builder.register("get_domain_name", variables::GET_DOMAIN_NAME, variables::get_domain_name)?;

        Ok(builder.build())
    }
}

/// Accumulates definitions and rejects duplicate names
#[derive(Debug, Default)]
pub struct SyscallTableBuilder {
    table: SyscallTable,
}

impl SyscallTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` as `stoffel_share::<op>`
    ///
    /// `func` receives the fully qualified name on every call.
    pub fn register<F>(&mut self, op: &str, shape: ArgShape, func: F) -> Result<&mut Self, TableError>
    where
        F: Fn(&str, &mut SyscallCall<'_, '_>, &mut dyn SyscallContext) -> ModuleResult + Send + Sync + 'static,
    {
        let name: Arc<str> = Arc::from(format!("{}::{}", MODULE_NAME, op));
        if self.table.definitions.contains_key(&name) {
            return Err(TableError::Duplicate(name.to_string()));
        }

        let bound = name.clone();
        let func: Arc<SyscallFn> = Arc::new(
            move |call: &mut SyscallCall<'_, '_>, ctx: &mut dyn SyscallContext| func(&*bound, call, ctx),
        );
        self.table.order.push(name.clone());
        self.table
            .definitions
            .insert(name.clone(), SyscallDefinition { name, shape, func });
        Ok(self)
    }

    pub fn build(self) -> SyscallTable {
        self.table
    }
}

fn register_variable_management<T: ShareValue>(builder: &mut SyscallTableBuilder) -> Result<(), TableError> {
    let ty = T::TAG;
    builder
        .register(&format!("new_{}_vec", ty), variables::NEW_VEC, variables::new_vec::<T>)?
        .register(&format!("init_{}_vec", ty), variables::INIT_VEC, variables::init_vec::<T>)?
        .register(&format!("set_shares_{}_vec", ty), variables::SET_SHARES, variables::set_shares::<T>)?
        .register(&format!("get_shares_{}_vec", ty), variables::GET_SHARES, variables::get_shares::<T>)?
        .register(&format!("fill_{}_vec", ty), variables::FILL_VEC, variables::fill_vec::<T>)?
        .register(&format!("assign_{}_vec", ty), variables::ASSIGN_VEC, variables::assign_vec::<T>)?
        .register(&format!("delete_{}_vec", ty), variables::DELETE_VEC, variables::delete_vec::<T>)?
        .register(&format!("load_{}_vec", ty), variables::LOAD_VEC, variables::load_vec::<T>)?
        .register(&format!("store_{}_vec", ty), variables::STORE_VEC, variables::store_vec::<T>)?
        .register(&format!("classify_{}_vec", ty), variables::CLASSIFY_VEC, variables::classify_vec::<T>)?
        .register(&format!("declassify_{}_vec", ty), variables::DECLASSIFY_VEC, variables::declassify_vec::<T>)?
        .register(&format!("get_type_size_{}", ty), variables::GET_TYPE_SIZE, variables::get_type_size::<T>)?;
    Ok(())
}

fn register_arithmetic<T: ShareValue>(builder: &mut SyscallTableBuilder) -> Result<(), TableError> {
    let ty = T::TAG;
    builder
        .register(&format!("add_{}_vec", ty), meta::BINARY_VEC, meta::binary_vec::<T, T, T, AdditionProtocol>)?
        .register(&format!("sub_{}_vec", ty), meta::BINARY_VEC, meta::binary_vec::<T, T, T, SubtractionProtocol>)?
        .register(
            &format!("mul_{}_vec", ty),
            meta::BINARY_VEC,
            meta::binary_vec::<T, T, T, MultiplicationProtocol>,
        )?
        .register(
            &format!("add_public_{}_vec", ty),
            meta::BINARY_PUBLIC_VEC,
            meta::binary_public_vec::<T, T, T, AdditionProtocol>,
        )?
        .register(
            &format!("sub_public_{}_vec", ty),
            meta::BINARY_PUBLIC_VEC,
            meta::binary_public_vec::<T, T, T, SubtractionProtocol>,
        )?
        .register(
            &format!("mul_public_{}_vec", ty),
            meta::BINARY_PUBLIC_VEC,
            meta::binary_public_vec::<T, T, T, MultiplicationProtocol>,
        )?;
    Ok(())
}

fn register_comparisons<T: ShareValue>(builder: &mut SyscallTableBuilder) -> Result<(), TableError> {
    let ty = T::TAG;
    builder
        .register(&format!("eq_{}_vec", ty), meta::BINARY_VEC, meta::binary_vec::<T, T, T, EqualityProtocol>)?
        .register(&format!("gt_{}_vec", ty), meta::BINARY_VEC, meta::binary_vec::<T, T, T, GreaterThanProtocol>)?
        .register(
            &format!("gte_{}_vec", ty),
            meta::BINARY_VEC,
            meta::binary_vec::<T, T, T, GreaterThanOrEqualProtocol>,
        )?
        .register(&format!("lt_{}_vec", ty), meta::BINARY_VEC, meta::binary_vec::<T, T, T, LessThanProtocol>)?
        .register(
            &format!("lte_{}_vec", ty),
            meta::BINARY_VEC,
            meta::binary_vec::<T, T, T, LessThanOrEqualProtocol>,
        )?;
    Ok(())
}

fn register_special<T: ShareValue>(builder: &mut SyscallTableBuilder) -> Result<(), TableError> {
    let ty = T::TAG;
    builder
        .register(
            &format!("choose_{}_vec", ty),
            meta::TERNARY_VEC,
            meta::ternary_vec::<T, T, T, T, ObliviousChoiceProtocol>,
        )?
        .register(&format!("rand_{}_vec", ty), meta::NULLARY_VEC, meta::nullary_vec::<T, RandomSharesProtocol>)?;
    Ok(())
}
