use opemu_core::interp::bmi::{
    andn, bextr, blsi, blsmsk, blsr, bzhi, pdep, pext, rorx, sarx, shlx, shrx,
};
use opemu_core::RFlags;
use proptest::prelude::*;

fn popcount_mask(m: u64) -> u64 {
    match m.count_ones() {
        64 => u64::MAX,
        n => (1u64 << n) - 1,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 2048,
        .. ProptestConfig::default()
    })]

    #[test]
    fn pext_inverts_pdep(v in any::<u64>(), m in any::<u64>()) {
        let low = v & popcount_mask(m);
        prop_assert_eq!(pext(pdep(low, m), m), low);
    }

    #[test]
    fn pdep_inverts_pext_on_the_mask(x in any::<u64>(), m in any::<u64>()) {
        prop_assert_eq!(pdep(pext(x, m), m), x & m);
    }

    #[test]
    fn narrow_ops_match_wide_ops_on_low_half(a in any::<u32>(), b in any::<u32>()) {
        prop_assert_eq!(u64::from(pext(a, b)), pext(u64::from(a), u64::from(b)));
        prop_assert_eq!(u64::from(pdep(a, b)), pdep(u64::from(a), u64::from(b)));
        prop_assert_eq!(u64::from(andn(a, b).0), andn(u64::from(a), u64::from(b)).0);
    }

    #[test]
    fn lowest_set_bit_identities(x in any::<u64>()) {
        let tz = x.trailing_zeros();
        let lowest = if x == 0 { 0 } else { 1u64 << tz };
        prop_assert_eq!(blsi(x).0, lowest);
        prop_assert_eq!(blsr(x).0, x ^ lowest);
        let below = if x == 0 { u64::MAX } else { (lowest - 1) | lowest };
        prop_assert_eq!(blsmsk(x).0, below);
        // exactly one of BLSI and BLSR/BLSMSK reports carry
        prop_assert_ne!(blsi(x).1.values.contains(RFlags::CF), blsr(x).1.values.contains(RFlags::CF));
    }

    #[test]
    fn shifts_match_native(x in any::<u32>(), c in any::<u32>(), y in any::<u64>(), d in any::<u64>()) {
        prop_assert_eq!(shlx(x, c), x.wrapping_shl(c));
        prop_assert_eq!(shrx(x, c), x.wrapping_shr(c));
        prop_assert_eq!(sarx(x, c), (x as i32).wrapping_shr(c) as u32);
        prop_assert_eq!(shlx(y, d), y.wrapping_shl(d as u32));
        prop_assert_eq!(sarx(y, d), (y as i64).wrapping_shr(d as u32) as u64);
        prop_assert_eq!(rorx(y, d as u8), y.rotate_right(u32::from(d as u8) % 64));
    }

    #[test]
    fn bzhi_and_bextr_agree(x in any::<u64>(), n in 0u64..=0xFF) {
        let (z, zf) = bzhi(x, n);
        let (e, _) = bextr(x, n << 8);
        prop_assert_eq!(z, e);
        prop_assert_eq!(zf.values.contains(RFlags::CF), n > 63);
        prop_assert_eq!(zf.values.contains(RFlags::ZF), z == 0);
    }
}
