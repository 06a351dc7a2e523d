//! Algebraic laws of the bit vector kernel.

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use rhdl_bitvec::{BitVec, Width, Word};
use rstest::rstest;

/// An arbitrary (value, width) pair with the value already masked.
#[derive(Debug, Clone, Copy)]
struct AnyBits(BitVec);

impl Arbitrary for AnyBits {
    fn arbitrary(g: &mut Gen) -> Self {
        let width = u32::arbitrary(g) % 128 + 1;
        AnyBits(BitVec::new(Word::arbitrary(g), width).unwrap())
    }
}

#[quickcheck]
fn extend_to_own_width_is_identity(v: AnyBits) -> bool {
    let v = v.0;
    v.zext(v.width()).unwrap() == v && v.sext(v.width()).unwrap() == v
}

#[quickcheck]
fn additive_inverse_is_zero(v: AnyBits) -> bool {
    let v = v.0;
    v.add(&v.negate()).unwrap().is_zero()
}

#[quickcheck]
fn slice_of_concat_recovers_the_high_part(a: AnyBits, b: AnyBits) -> bool {
    let (a, b) = (a.0, b.0);
    if a.width() + b.width() > 128 {
        return true;
    }
    let joined = BitVec::concat(&[a, b]).unwrap();
    joined
        .slice(a.width() + b.width() - 1, b.width())
        .unwrap()
        == a
}

#[quickcheck]
fn slice_of_concat_recovers_the_low_part(a: AnyBits, b: AnyBits) -> bool {
    let (a, b) = (a.0, b.0);
    if a.width() + b.width() > 128 {
        return true;
    }
    let joined = BitVec::concat(&[a, b]).unwrap();
    joined.slice(b.width() - 1, 0).unwrap() == b
}

#[quickcheck]
fn shifts_match_their_bit_level_definition(v: AnyBits, amount: u8) -> bool {
    let v = v.0;
    let amount = u32::from(amount) % v.width();
    let left = v.shl(amount);
    let right = v.shr(amount);
    (0..v.width()).all(|i| {
        let l = left.get(i).unwrap();
        let r = right.get(i).unwrap();
        let l_expect = i >= amount && v.get(i - amount).unwrap();
        let r_expect = i + amount < v.width() && v.get(i + amount).unwrap();
        l == l_expect && r == r_expect
    })
}

#[quickcheck]
fn not_is_an_involution(v: AnyBits) -> bool {
    let v = v.0;
    v.not().not() == v
}

#[quickcheck]
fn xor_with_self_is_zero(v: AnyBits) -> bool {
    let v = v.0;
    v.xor(&v).unwrap().is_zero()
}

#[quickcheck]
fn unsigned_compare_matches_payload_order(a: AnyBits, b: AnyBits) -> bool {
    let (a, b) = (a.0, b.0);
    let b = match BitVec::new(b.value(), a.width()) {
        Ok(b) => b,
        Err(_) => return true,
    };
    a.lt_u(&b).unwrap() == BitVec::bit(a.value() < b.value())
}

#[rstest]
#[case(0x00, 8, 0)]
#[case(0xff, 8, 8)]
#[case(0xa5, 8, 4)]
#[case(0x01, 1, 1)]
fn popcount(#[case] value: Word, #[case] width: Width, #[case] expect: u32) {
    assert_eq!(BitVec::new(value, width).unwrap().count_ones(), expect);
}

#[rstest]
#[case(0x7f, 0x01, 0x80)]
#[case(0xff, 0x01, 0x00)]
#[case(0x00, 0x00, 0x00)]
fn eight_bit_addition(#[case] a: Word, #[case] b: Word, #[case] sum: Word) {
    let a = BitVec::new(a, 8).unwrap();
    let b = BitVec::new(b, 8).unwrap();
    assert_eq!(a.add(&b).unwrap(), BitVec::new(sum, 8).unwrap());
}

#[test]
fn serde_round_trip_preserves_width_and_value() {
    let v = BitVec::new(0x2a, 8).unwrap();
    let text = serde_json::to_string(&v).unwrap();
    let back: BitVec = serde_json::from_str(&text).unwrap();
    assert_eq!(back, v);
}
