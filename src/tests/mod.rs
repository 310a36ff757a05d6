mod meta_syscalls;

use std::path::PathBuf;

use smallvec::SmallVec;

use crate::heap::HandleHeap;
use crate::host::LocalHost;
use crate::module_api::{CReference, CodeBlock, ModuleResult, Reference, SyscallCall};
use crate::syscalls::MODULE_NAME;
use crate::value_traits::{ShareValue, ShareWord};

pub(crate) const TEST_PD: &str = "pd_test";

pub(crate) const TEST_MODELS: &str = r#"
[TimeModel]
"stoffel_share::new_uint32_vec" = [1.0]
"stoffel_share::add_uint32_vec" = [2.0, 0.5]
"#;

pub(crate) fn setup_test_tracing() {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Write a PD configuration and its model file into a fresh temp directory
pub(crate) fn write_pd_config(tag: &str, models: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("stoffel_share_pdk_{}_{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).expect("failed to create config directory");

    std::fs::write(dir.join("models.toml"), models).expect("failed to write models");
    let path = dir.join("pd.toml");
    std::fs::write(
        &path,
        "[ProtectionDomain]\nModelEvaluatorConfiguration = \"models.toml\"\n",
    )
    .expect("failed to write PD configuration");
    path
}

pub(crate) fn syscall_name(op: &str) -> String {
    format!("{}::{}", MODULE_NAME, op)
}

/// Encode shares the way the interpreter lays them out, plus the trailing byte
pub(crate) fn encode<T: ShareValue>(values: &[T::Share]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * T::SHARE_SIZE + 1];
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(T::SHARE_SIZE)) {
        value.write_ne(chunk);
    }
    bytes
}

/// A host with one started domain and one running process
pub(crate) struct Fixture {
    pub host: LocalHost,
    pub pd: u64,
}

impl Fixture {
    pub fn new(tag: &str) -> Self {
        setup_test_tracing();
        let path = write_pd_config(tag, TEST_MODELS);
        let mut host = LocalHost::new().expect("module initialization failed");
        host.start_domain(TEST_PD, &path).expect("PD startup failed");
        let pd = host.start_process(TEST_PD).expect("PDPI startup failed");
        Fixture { host, pd }
    }

    fn args(&self, args: &[u64]) -> SmallVec<[CodeBlock; 8]> {
        std::iter::once(self.pd)
            .chain(args.iter().copied())
            .map(CodeBlock::from_u64)
            .collect()
    }

    pub fn heap(&self) -> &HandleHeap {
        self.host.pdpi(self.pd).expect("PDPI is gone").heap()
    }

    /// Syscall without references or return slot; `args` excludes the PD index
    pub fn call(&mut self, op: &str, args: &[u64]) -> ModuleResult {
        let args = self.args(args);
        let mut call = SyscallCall::new(&args);
        self.host.syscall(&syscall_name(op), &mut call)
    }

    pub fn call_ret(&mut self, op: &str, args: &[u64]) -> (ModuleResult, u64) {
        let args = self.args(args);
        let mut ret = CodeBlock::from_u64(u64::MAX);
        let mut call = SyscallCall::new(&args).with_return(&mut ret);
        let result = self.host.syscall(&syscall_name(op), &mut call);
        (result, ret.uint64())
    }

    pub fn call_cref(&mut self, op: &str, args: &[u64], data: &[u8]) -> ModuleResult {
        let args = self.args(args);
        let crefs = [CReference::new(data)];
        let mut call = SyscallCall::new(&args).with_crefs(&crefs);
        self.host.syscall(&syscall_name(op), &mut call)
    }

    pub fn call_ref(&mut self, op: &str, args: &[u64], data: &mut [u8]) -> ModuleResult {
        let args = self.args(args);
        let mut refs = [Reference::new(data)];
        let mut call = SyscallCall::new(&args).with_refs(&mut refs);
        self.host.syscall(&syscall_name(op), &mut call)
    }

    pub fn new_vec<T: ShareValue>(&mut self, len: u64) -> u64 {
        let (result, handle) = self.call_ret(&format!("new_{}_vec", T::TAG), &[len]);
        result.expect("new_vec failed");
        handle
    }

    /// Create a vector holding `values`
    pub fn vec_from<T: ShareValue>(&mut self, values: &[T::Share]) -> u64 {
        let handle = self.new_vec::<T>(values.len() as u64);
        self.set_shares::<T>(handle, values).expect("set_shares failed");
        handle
    }

    pub fn set_shares<T: ShareValue>(&mut self, handle: u64, values: &[T::Share]) -> ModuleResult {
        let bytes = encode::<T>(values);
        self.call_cref(&format!("set_shares_{}_vec", T::TAG), &[handle], &bytes)
    }

    pub fn get_shares<T: ShareValue>(&mut self, handle: u64) -> Vec<T::Share> {
        let len = self
            .heap()
            .get::<T>(crate::heap::Handle::from_raw(handle))
            .expect("handle is not live")
            .len();
        let mut bytes = vec![0u8; len * T::SHARE_SIZE + 1];
        self.call_ref(&format!("get_shares_{}_vec", T::TAG), &[handle], &mut bytes)
            .expect("get_shares failed");
        bytes[..len * T::SHARE_SIZE]
            .chunks_exact(T::SHARE_SIZE)
            .map(T::Share::read_ne)
            .collect()
    }
}
