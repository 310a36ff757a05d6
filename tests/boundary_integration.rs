// Drives the module only through its public API: a local host, a protection
// domain loaded from disk, and raw syscall calls the way an interpreter would
// issue them.

use std::path::PathBuf;
use std::sync::Once;

use stoffel_share_pdk::host::{HostFacilities, LocalHost};
use stoffel_share_pdk::module_api::{ModuleError, STATUS_OK};
use stoffel_share_pdk::{CReference, CodeBlock, Reference, SyscallCall};

static INIT: Once = Once::new();

fn setup_test_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn write_config(tag: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("stoffel_share_pdk_it_{}_{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).expect("failed to create config directory");
    std::fs::write(
        dir.join("models.toml"),
        "[TimeModel]\n\"stoffel_share::mul_uint64_vec\" = [0.0, 3.0]\n",
    )
    .expect("failed to write models");
    let path = dir.join("pd.toml");
    std::fs::write(&path, "[ProtectionDomain]\nModelEvaluatorConfiguration = \"models.toml\"\n")
        .expect("failed to write PD configuration");
    path
}

fn words(values: &[u64]) -> Vec<CodeBlock> {
    values.iter().copied().map(CodeBlock::from_u64).collect()
}

fn new_vec(host: &mut LocalHost, pd: u64, ty: &str, len: u64) -> u64 {
    let args = words(&[pd, len]);
    let mut ret = CodeBlock::default();
    let mut call = SyscallCall::new(&args).with_return(&mut ret);
    host.syscall(&format!("stoffel_share::new_{}_vec", ty), &mut call)
        .expect("new_vec failed");
    ret.uint64()
}

fn set_u64(host: &mut LocalHost, pd: u64, handle: u64, values: &[u64]) {
    let mut bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    bytes.push(0);
    let args = words(&[pd, handle]);
    let crefs = [CReference::new(&bytes)];
    let mut call = SyscallCall::new(&args).with_crefs(&crefs);
    host.syscall("stoffel_share::set_shares_uint64_vec", &mut call)
        .expect("set_shares failed");
}

fn get_u64(host: &mut LocalHost, pd: u64, handle: u64, len: usize) -> Vec<u64> {
    let mut bytes = vec![0u8; len * 8 + 1];
    {
        let args = words(&[pd, handle]);
        let mut refs = [Reference::new(&mut bytes)];
        let mut call = SyscallCall::new(&args).with_refs(&mut refs);
        host.syscall("stoffel_share::get_shares_uint64_vec", &mut call)
            .expect("get_shares failed");
    }
    bytes[..len * 8]
        .chunks_exact(8)
        .map(|chunk| u64::from_ne_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[test]
fn test_dot_product_through_the_boundary() {
    setup_test_tracing();
    let mut host = LocalHost::new().expect("module initialization failed");
    host.start_domain("analytics", &write_config("dot_product"))
        .expect("PD startup failed");
    let pd = host.start_process("analytics").expect("PDPI startup failed");

    let a = new_vec(&mut host, pd, "uint64", 3);
    let b = new_vec(&mut host, pd, "uint64", 3);
    let product = new_vec(&mut host, pd, "uint64", 3);
    set_u64(&mut host, pd, a, &[1, 2, 3]);
    set_u64(&mut host, pd, b, &[4, 5, 6]);

    let args = words(&[pd, a, b, product]);
    let mut call = SyscallCall::new(&args);
    host.syscall("stoffel_share::mul_uint64_vec", &mut call).unwrap();
    let products = get_u64(&mut host, pd, product, 3);
    assert_eq!(products, vec![4, 10, 18]);
    assert_eq!(products.iter().sum::<u64>(), 32);

    let sections = host.profiler().sections_named("stoffel_share::mul_uint64_vec");
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].duration, 9.0);

    assert_eq!(host.stop_process(pd), Some(3));
}

#[test]
fn test_status_codes_seen_by_the_interpreter() {
    setup_test_tracing();
    let mut host = LocalHost::new().expect("module initialization failed");
    host.start_domain("status", &write_config("status")).unwrap();
    let pd = host.start_process("status").unwrap();
    let handle = new_vec(&mut host, pd, "uint32", 2);

    let args = words(&[pd, handle]);
    let mut call = SyscallCall::new(&args);
    let ok = host.syscall("stoffel_share::delete_uint32_vec", &mut call);
    assert_eq!(ModuleError::status(&ok), STATUS_OK);

    let mut call = SyscallCall::new(&args);
    let stale = host.syscall("stoffel_share::delete_uint32_vec", &mut call);
    assert_eq!(ModuleError::status(&stale), ModuleError::OperationFailed.code());

    let args = words(&[pd]);
    let mut call = SyscallCall::new(&args);
    let malformed = host.syscall("stoffel_share::delete_uint32_vec", &mut call);
    assert_eq!(ModuleError::status(&malformed), ModuleError::InvalidCall.code());
}

#[test]
fn test_two_processes_are_isolated() {
    setup_test_tracing();
    let mut host = LocalHost::new().expect("module initialization failed");
    host.start_domain("isolation", &write_config("isolation")).unwrap();
    let first = host.start_process("isolation").unwrap();
    let second = host.start_process("isolation").unwrap();

    let mine = new_vec(&mut host, first, "uint64", 1);
    let theirs = new_vec(&mut host, second, "uint64", 1);
    assert_ne!(mine, theirs);

    // Operating on the other process's handle fails without touching it
    let args = words(&[first, 5, theirs]);
    let mut call = SyscallCall::new(&args);
    assert_eq!(
        host.syscall("stoffel_share::init_uint64_vec", &mut call),
        Err(ModuleError::OperationFailed)
    );
    assert_eq!(get_u64(&mut host, second, theirs, 1), vec![0]);
}

#[test]
fn test_host_without_facilities_cannot_start() {
    setup_test_tracing();
    assert_eq!(
        LocalHost::with_facilities(&HostFacilities::empty()).err(),
        Some(ModuleError::MissingFacility)
    );
}
