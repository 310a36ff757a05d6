use crate::module_api::ModuleError;
use crate::tests::{encode, Fixture};
use crate::value_traits::{SfUint32, SfUint64};

#[test]
fn test_binary_arithmetic() {
    let mut fx = Fixture::new("binary_arith");
    let lhs = fx.vec_from::<SfUint32>(&[1, 2, u32::MAX]);
    let rhs = fx.vec_from::<SfUint32>(&[10, 20, 2]);
    let out = fx.new_vec::<SfUint32>(3);

    fx.call("add_uint32_vec", &[lhs, rhs, out]).unwrap();
    assert_eq!(fx.get_shares::<SfUint32>(out), vec![11, 22, 1]);

    fx.call("sub_uint32_vec", &[lhs, rhs, out]).unwrap();
    assert_eq!(
        fx.get_shares::<SfUint32>(out),
        vec![1u32.wrapping_sub(10), 2u32.wrapping_sub(20), u32::MAX - 2]
    );

    fx.call("mul_uint32_vec", &[lhs, rhs, out]).unwrap();
    assert_eq!(
        fx.get_shares::<SfUint32>(out),
        vec![10, 40, u32::MAX.wrapping_mul(2)]
    );
}

#[test]
fn test_in_place_operation_sees_inputs_before_the_call() {
    let mut fx = Fixture::new("in_place");
    let v = fx.vec_from::<SfUint64>(&[3, 4, 5]);

    fx.call("mul_uint64_vec", &[v, v, v]).unwrap();
    assert_eq!(fx.get_shares::<SfUint64>(v), vec![9, 16, 25]);

    let other = fx.vec_from::<SfUint64>(&[1, 1, 1]);
    fx.call("sub_uint64_vec", &[other, v, v]).unwrap();
    assert_eq!(
        fx.get_shares::<SfUint64>(v),
        vec![1u64.wrapping_sub(9), 1u64.wrapping_sub(16), 1u64.wrapping_sub(25)]
    );
}

#[test]
fn test_public_operand_variants() {
    let mut fx = Fixture::new("public_operand");
    let lhs = fx.vec_from::<SfUint32>(&[5, 6]);
    let out = fx.new_vec::<SfUint32>(2);

    let rhs = encode::<SfUint32>(&[1, 2]);
    fx.call_cref("add_public_uint32_vec", &[lhs, out], &rhs).unwrap();
    assert_eq!(fx.get_shares::<SfUint32>(out), vec![6, 8]);

    fx.call_cref("mul_public_uint32_vec", &[lhs, lhs], &rhs).unwrap();
    assert_eq!(fx.get_shares::<SfUint32>(lhs), vec![5, 12]);

    let short = encode::<SfUint32>(&[1]);
    assert_eq!(
        fx.call_cref("sub_public_uint32_vec", &[lhs, out], &short),
        Err(ModuleError::OperationFailed)
    );
    assert_eq!(
        fx.call_cref("sub_public_uint32_vec", &[lhs, out], &[]),
        Err(ModuleError::InvalidCall)
    );
    assert_eq!(fx.get_shares::<SfUint32>(out), vec![6, 8]);
}

#[test]
fn test_comparisons() {
    let mut fx = Fixture::new("comparisons");
    let lhs = fx.vec_from::<SfUint64>(&[1, 5, 9]);
    let rhs = fx.vec_from::<SfUint64>(&[5, 5, 5]);
    let out = fx.new_vec::<SfUint64>(3);

    let expected: [(&str, [u64; 3]); 5] = [
        ("eq_uint64_vec", [0, 1, 0]),
        ("gt_uint64_vec", [0, 0, 1]),
        ("gte_uint64_vec", [0, 1, 1]),
        ("lt_uint64_vec", [1, 0, 0]),
        ("lte_uint64_vec", [1, 1, 0]),
    ];
    for (op, values) in expected {
        fx.call(op, &[lhs, rhs, out]).unwrap();
        assert_eq!(fx.get_shares::<SfUint64>(out), values.to_vec(), "{}", op);
    }
}

#[test]
fn test_conversions_between_widths() {
    let mut fx = Fixture::new("conversions");
    let wide = fx.vec_from::<SfUint64>(&[0x1_0000_0002, 7]);
    let narrow = fx.new_vec::<SfUint32>(2);

    fx.call("conv_uint64_to_uint32_vec", &[wide, narrow]).unwrap();
    assert_eq!(fx.get_shares::<SfUint32>(narrow), vec![2, 7]);

    fx.call("init_uint32_vec", &[u32::MAX as u64, narrow]).unwrap();
    fx.call("conv_uint32_to_uint64_vec", &[narrow, wide]).unwrap();
    assert_eq!(fx.get_shares::<SfUint64>(wide), vec![u32::MAX as u64; 2]);

    // Input and output must have the types the conversion names
    assert_eq!(
        fx.call("conv_uint64_to_uint32_vec", &[narrow, wide]),
        Err(ModuleError::OperationFailed)
    );
}

#[test]
fn test_oblivious_choice() {
    let mut fx = Fixture::new("choose");
    let cond = fx.vec_from::<SfUint32>(&[1, 0, 1]);
    let a = fx.vec_from::<SfUint32>(&[10, 20, 30]);
    let b = fx.vec_from::<SfUint32>(&[11, 21, 31]);
    let out = fx.new_vec::<SfUint32>(3);

    fx.call("choose_uint32_vec", &[cond, a, b, out]).unwrap();
    assert_eq!(fx.get_shares::<SfUint32>(out), vec![10, 21, 30]);

    fx.call("choose_uint32_vec", &[cond, a, b, cond]).unwrap();
    assert_eq!(fx.get_shares::<SfUint32>(cond), vec![10, 21, 30]);
}

#[test]
fn test_random_shares_keep_length() {
    let mut fx = Fixture::new("rand");
    let out = fx.new_vec::<SfUint64>(32);

    fx.call("rand_uint64_vec", &[out]).unwrap();
    let shares = fx.get_shares::<SfUint64>(out);
    assert_eq!(shares.len(), 32);
    assert!(shares.iter().any(|s| *s != 0));
}

#[test]
fn test_protocol_failure_leaves_output_intact() {
    let mut fx = Fixture::new("protocol_failure");
    let lhs = fx.vec_from::<SfUint32>(&[1, 2, 3]);
    let rhs = fx.vec_from::<SfUint32>(&[1, 2]);
    let out = fx.vec_from::<SfUint32>(&[7, 7, 7]);

    assert_eq!(
        fx.call("add_uint32_vec", &[lhs, rhs, out]),
        Err(ModuleError::OperationFailed)
    );
    assert_eq!(fx.get_shares::<SfUint32>(out), vec![7, 7, 7]);
}

#[test]
fn test_invalid_handles_in_protocol_templates() {
    let mut fx = Fixture::new("protocol_handles");
    let lhs = fx.vec_from::<SfUint32>(&[1]);
    let rhs = fx.vec_from::<SfUint32>(&[2]);
    let out = fx.new_vec::<SfUint32>(1);
    let wide = fx.new_vec::<SfUint64>(1);

    assert_eq!(
        fx.call("add_uint32_vec", &[lhs, rhs, 0]),
        Err(ModuleError::OperationFailed)
    );
    assert_eq!(
        fx.call("add_uint32_vec", &[lhs, wide, out]),
        Err(ModuleError::OperationFailed)
    );

    fx.call("delete_uint32_vec", &[rhs]).unwrap();
    assert_eq!(
        fx.call("add_uint32_vec", &[lhs, rhs, out]),
        Err(ModuleError::OperationFailed)
    );
    assert_eq!(
        fx.call("rand_uint32_vec", &[wide]),
        Err(ModuleError::OperationFailed)
    );
    assert_eq!(
        fx.call("add_uint32_vec", &[lhs, out]),
        Err(ModuleError::InvalidCall)
    );
}
