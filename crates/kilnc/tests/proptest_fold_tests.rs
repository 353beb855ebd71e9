//! Property-based tests for constant folding and stack-effect checking
//!
//! These tests use proptest to verify that:
//! 1. Folded constants agree with wrapping i64 arithmetic
//! 2. Struct member offsets follow declaration order
//! 3. Generated programs with a known net effect check and get the right contracts

use kiln_compiler::check::BlockContract;
use kiln_compiler::driver::compile;
use kiln_compiler::ir::OpKind;
use kiln_compiler::types::TypeTag;
use proptest::prelude::*;

fn operator() -> impl Strategy<Value = (&'static str, fn(i64, i64) -> i64)> {
    prop_oneof![
        Just(("+", i64::wrapping_add as fn(i64, i64) -> i64)),
        Just(("-", i64::wrapping_sub as fn(i64, i64) -> i64)),
        Just(("*", i64::wrapping_mul as fn(i64, i64) -> i64)),
    ]
}

proptest! {
    #[test]
    fn folded_constant_matches_arithmetic(
        a in -100_000i64..100_000,
        b in -100_000i64..100_000,
        (op, apply) in operator(),
    ) {
        let source = format!("C :: {} {} {} end\nmain :: C print end", a, b, op);
        let checked = compile(&source, "prop.kln").unwrap();
        let expected = apply(a, b);
        prop_assert_eq!(checked.program.symbols.consts[0].value, expected);
        prop_assert_eq!(checked.program.symbols.consts[0].ty, TypeTag::Int);
        prop_assert_eq!(&checked.program.ops[1].kind, &OpKind::PushInt(expected));
    }

    #[test]
    fn shuffles_fold_like_a_stack(a in any::<i32>(), b in any::<i32>(), c in any::<i32>()) {
        // a b c rot -> b c a; swap -> b a c; drop -> b a; over -> b a b
        let source = format!("S :: {} {} {} rot swap drop over - - end", a, b, c);
        let checked = compile(&source, "prop.kln").unwrap();
        let (a, b) = (i64::from(a), i64::from(b));
        let expected = b.wrapping_sub(a.wrapping_sub(b));
        prop_assert_eq!(checked.program.symbols.consts[0].value, expected);
    }

    #[test]
    fn member_offsets_follow_declaration_order(count in 1usize..12, pick in 0usize..12) {
        let pick = pick % count;
        let members: Vec<String> = (0..count).map(|i| format!("m{} int", i)).collect();
        let source = format!(
            "S struct {} end\nv : S end\nmain :: *v .m{} print end",
            members.join(" "),
            pick
        );
        let checked = compile(&source, "prop.kln").unwrap();
        let offset = match checked.program.ops[2].kind {
            OpKind::Member { offset, .. } => offset,
            _ => None,
        };
        prop_assert_eq!(offset, Some(pick as u32 * 4));
    }

    #[test]
    fn summing_n_values_always_checks(values in prop::collection::vec(-1000i64..1000, 1..20)) {
        let pushes: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let adds = vec!["+"; values.len() - 1].join(" ");
        let source = format!("sum :: -> int {} {} end", pushes.join(" "), adds);
        let checked = compile(&source, "prop.kln").unwrap();
        prop_assert_eq!(checked.contracts[&0], BlockContract { ins: 0, outs: 1 });
    }

    #[test]
    fn bare_if_contract_counts_the_deepest_dip(depth in 1usize..8) {
        // the branch sums `depth + 1` cells, then pushes `depth` zeros back
        let ins = vec!["int"; depth + 1].join(" ");
        let adds = vec!["+"; depth].join(" ");
        let zeros = vec!["0"; depth].join(" ");
        let source = format!("f :: {ins} bool -> int if {adds} {zeros} end {adds} end");
        let checked = compile(&source, "prop.kln").unwrap();
        let expected = BlockContract {
            ins: depth + 1,
            outs: depth + 1,
        };
        prop_assert_eq!(checked.contracts[&1], expected);
    }
}
