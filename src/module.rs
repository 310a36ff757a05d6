//! # Module Lifecycle
//!
//! `Module` is the loaded instance of the share module. The host drives it
//! through a fixed lifecycle:
//!
//! 1. `initialize` with the host's facilities (logger and profiler)
//! 2. `pd_startup` / `pd_shutdown` per protection domain
//! 3. `pdpi_startup` / `pdpi_shutdown` per execution context
//! 4. `deinitialize`, or dropping the module
//!
//! Lifecycle events are logged through the host-provided logger.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn, Dispatch};

use crate::module_api::{FacilityProvider, ModuleError, ModuleId, ModuleResult, LOGGER_FACILITY, PROFILER_FACILITY};
use crate::profiler::ExecutionProfiler;
use crate::protection_domain::{Pdpi, ProtectionDomain};
use crate::syscalls::{SyscallDefinition, SyscallTable};

/// Host logging facility: the subscriber module log records are routed to
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Logger { dispatch }
    }

    /// Logger writing to whatever subscriber is current on this thread
    pub fn from_current() -> Self {
        Logger {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Run `f` with this logger's subscriber as the default
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

pub struct Module {
    id: ModuleId,
    logger: Arc<Logger>,
    profiler: Arc<ExecutionProfiler>,
    syscalls: SyscallTable,
}

impl Module {
    /// Load the module against the host's facilities
    ///
    /// # Returns
    /// `MissingFacility` if the logger or the profiler is absent or of the
    /// wrong type.
    pub fn initialize(facilities: &dyn FacilityProvider) -> ModuleResult<Self> {
        let logger = facilities
            .module_facility(LOGGER_FACILITY)
            .and_then(|facility| facility.downcast::<Logger>().ok());
        let Some(logger) = logger else {
            warn!("Module facility {} is missing", LOGGER_FACILITY);
            return Err(ModuleError::MissingFacility);
        };

        let profiler = facilities
            .module_facility(PROFILER_FACILITY)
            .and_then(|facility| facility.downcast::<ExecutionProfiler>().ok());
        let Some(profiler) = profiler else {
            logger.in_scope(|| warn!("Module facility {} is missing", PROFILER_FACILITY));
            return Err(ModuleError::MissingFacility);
        };

        let syscalls = match SyscallTable::standard() {
            Ok(syscalls) => syscalls,
            Err(e) => {
                logger.in_scope(|| error!("Failed to build syscall table: {}", e));
                return Err(ModuleError::OperationFailed);
            }
        };

        let id = ModuleId::next();
        logger.in_scope(|| info!("Module {} initialized with {} syscalls", id.raw(), syscalls.len()));
        Ok(Module {
            id,
            logger,
            profiler,
            syscalls,
        })
    }

    /// Unload the module
    ///
    /// Dropping a module has the same effect, so a host that is torn down
    /// without an explicit call still deinitializes it.
    pub fn deinitialize(self) {
        drop(self);
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn profiler(&self) -> &Arc<ExecutionProfiler> {
        &self.profiler
    }

    pub fn syscall(&self, name: &str) -> Option<&SyscallDefinition> {
        self.syscalls.get(name)
    }

    pub fn syscalls(&self) -> &SyscallTable {
        &self.syscalls
    }

    /// Start a protection domain from its configuration file
    ///
    /// # Arguments
    /// * `name` - Protection domain name
    /// * `configuration_path` - Path of the domain's TOML configuration
    ///
    /// # Returns
    /// The shared domain, or `InvalidPdConfiguration` if the configuration or
    /// its cost models cannot be loaded.
    pub fn pd_startup(&self, name: &str, configuration_path: &Path) -> ModuleResult<Arc<ProtectionDomain>> {
        self.logger.in_scope(|| {
            match ProtectionDomain::new(name, configuration_path, self.profiler.clone()) {
                Ok(domain) => {
                    info!("Protection domain '{}' started", name);
                    Ok(Arc::new(domain))
                }
                Err(e) => {
                    error!("Error on protection domain '{}' startup: {}", name, e);
                    Err(ModuleError::InvalidPdConfiguration)
                }
            }
        })
    }

    pub fn pd_shutdown(&self, domain: Arc<ProtectionDomain>) {
        self.logger
            .in_scope(|| info!("Protection domain '{}' stopped", domain.name()));
    }

    /// Start an execution context in `domain`
    ///
    /// # Returns
    /// `OutOfMemory` if no heap id is free for the context's handle heap.
    pub fn pdpi_startup(&self, domain: &Arc<ProtectionDomain>) -> ModuleResult<Pdpi> {
        Pdpi::new(domain.clone()).map_err(|e| {
            self.logger
                .in_scope(|| error!("Error on PDPI startup in '{}': {}", domain.name(), e));
            ModuleError::OutOfMemory
        })
    }

    /// Stop an execution context, returning how many vectors were released
    pub fn pdpi_shutdown(&self, mut pdpi: Pdpi) -> usize {
        self.logger.in_scope(|| pdpi.shutdown())
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        self.logger
            .in_scope(|| info!("Module {} deinitialized", self.id.raw()));
    }
}
