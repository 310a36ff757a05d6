// Syscall Benchmarks
// This file contains benchmarks for the share module's syscall boundary.
//
// 1. Dispatch (bench_dispatch):
//    - Measures the fixed cost of a syscall: name lookup, shape check,
//      PDPI resolution and handle validation
//    - Uses get_type_size, which does no work beyond the skeleton
//
// 2. Vector Lifecycle (bench_vector_lifecycle):
//    - Creates and deletes a vector per iteration
//    - Exercises slot reuse in the handle heap
//
// 3. Protocol Templates (bench_protocols):
//    - Elementwise addition over growing vector sizes
//    - Compares a distinct output against in-place operation, which pays
//      for the input snapshot

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stoffel_share_pdk::{CodeBlock, LocalHost, SyscallCall};

fn setup_host() -> (LocalHost, u64) {
    let mut dir = std::env::temp_dir();
    dir.push(format!("stoffel_share_pdk_bench_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("models.toml"), "[TimeModel]\n").unwrap();
    let path = dir.join("pd.toml");
    std::fs::write(&path, "[ProtectionDomain]\nModelEvaluatorConfiguration = \"models.toml\"\n").unwrap();

    let mut host = LocalHost::new().unwrap();
    host.start_domain("bench", &path).unwrap();
    let pd = host.start_process("bench").unwrap();
    (host, pd)
}

fn new_vec(host: &mut LocalHost, pd: u64, len: u64) -> u64 {
    let args = [CodeBlock::from_u64(pd), CodeBlock::from_u64(len)];
    let mut ret = CodeBlock::default();
    let mut call = SyscallCall::new(&args).with_return(&mut ret);
    host.syscall("stoffel_share::new_uint64_vec", &mut call).unwrap();
    ret.uint64()
}

fn bench_dispatch(c: &mut Criterion) {
    let (mut host, pd) = setup_host();
    let args = [CodeBlock::from_u64(pd)];

    c.bench_function("get_type_size_uint64", |b| {
        b.iter(|| {
            let mut ret = CodeBlock::default();
            let mut call = SyscallCall::new(&args).with_return(&mut ret);
            host.syscall("stoffel_share::get_type_size_uint64", &mut call).unwrap();
            black_box(ret.uint64())
        });
    });
}

fn bench_vector_lifecycle(c: &mut Criterion) {
    let (mut host, pd) = setup_host();

    c.bench_function("new_delete_uint64_vec", |b| {
        b.iter(|| {
            let handle = new_vec(&mut host, pd, black_box(16));
            let args = [CodeBlock::from_u64(pd), CodeBlock::from_u64(handle)];
            let mut call = SyscallCall::new(&args);
            host.syscall("stoffel_share::delete_uint64_vec", &mut call).unwrap();
        });
    });
}

fn bench_protocols(c: &mut Criterion) {
    let mut group = c.benchmark_group("Protocol Templates");
    group.measurement_time(Duration::from_secs(5));
    let (mut host, pd) = setup_host();

    for size in [16u64, 1024, 65536] {
        let lhs = new_vec(&mut host, pd, size);
        let rhs = new_vec(&mut host, pd, size);
        let out = new_vec(&mut host, pd, size);

        group.bench_with_input(BenchmarkId::new("add_distinct", size), &size, |b, _| {
            let args = [pd, lhs, rhs, out].map(CodeBlock::from_u64);
            b.iter(|| {
                let mut call = SyscallCall::new(&args);
                host.syscall("stoffel_share::add_uint64_vec", &mut call).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("add_in_place", size), &size, |b, _| {
            let args = [pd, lhs, lhs, lhs].map(CodeBlock::from_u64);
            b.iter(|| {
                let mut call = SyscallCall::new(&args);
                host.syscall("stoffel_share::add_uint64_vec", &mut call).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_vector_lifecycle, bench_protocols);
criterion_main!(benches);
