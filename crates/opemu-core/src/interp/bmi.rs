//! BMI1/BMI2 integer bit manipulation.
//!
//! Every operation is written once over [`Word`] and instantiated for `u32`
//! and `u64`; the operand width is picked from VEX.W (long mode only) before
//! any operand is read.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not, Shl, Shr};

use opemu_decoder::InstructionDescriptor;

use super::Emulation;
use crate::error::EmulationError;
use crate::mem::UserMemory;
use crate::operand::{Operand, OperandWidth};
use crate::state::{gpr, FlagUpdate, RFlags, RegisterSnapshot};
use crate::writeback::{EmulationResult, RegWrite};

/// Fixed-width unsigned integer an operation runs at.
pub trait Word:
    Copy
    + Eq
    + fmt::Debug
    + Not<Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    const BITS: u32;
    const WIDTH: OperandWidth;
    const ZERO: Self;
    const ONE: Self;

    /// Keep the low `BITS` bits of `v`.
    fn truncate(v: u64) -> Self;
    fn zero_extend(self) -> u64;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_neg(self) -> Self;
    fn rotate_right(self, n: u32) -> Self;
    /// Arithmetic shift right; `n < BITS`.
    fn sar(self, n: u32) -> Self;
    /// Full unsigned product as `(high, low)`.
    fn widening_mul(self, rhs: Self) -> (Self, Self);

    fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    fn sign(self) -> bool {
        self.bit(Self::BITS - 1)
    }

    fn bit(self, i: u32) -> bool {
        (self >> i) & Self::ONE == Self::ONE
    }

    /// The low `n` bits set; all ones once `n >= BITS`.
    fn low_mask(n: u32) -> Self {
        if n >= Self::BITS {
            !Self::ZERO
        } else {
            (Self::ONE << n).wrapping_sub(Self::ONE)
        }
    }
}

macro_rules! impl_word {
    ($t:ty, $signed:ty, $wide:ty, $width:expr) => {
        impl Word for $t {
            const BITS: u32 = <$t>::BITS;
            const WIDTH: OperandWidth = $width;
            const ZERO: Self = 0;
            const ONE: Self = 1;

            fn truncate(v: u64) -> Self {
                v as $t
            }

            fn zero_extend(self) -> u64 {
                self as u64
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                <$t>::wrapping_sub(self, rhs)
            }

            fn wrapping_neg(self) -> Self {
                <$t>::wrapping_neg(self)
            }

            fn rotate_right(self, n: u32) -> Self {
                <$t>::rotate_right(self, n)
            }

            fn sar(self, n: u32) -> Self {
                ((self as $signed) >> n) as $t
            }

            fn widening_mul(self, rhs: Self) -> (Self, Self) {
                let product = (self as $wide) * (rhs as $wide);
                ((product >> <$t>::BITS) as $t, product as $t)
            }
        }
    };
}

impl_word!(u32, i32, u64, OperandWidth::W32);
impl_word!(u64, i64, u128, OperandWidth::W64);

const LOGIC_FLAGS: RFlags = RFlags::ZF
    .union(RFlags::SF)
    .union(RFlags::CF)
    .union(RFlags::OF);

pub fn andn<W: Word>(src1: W, src2: W) -> (W, FlagUpdate) {
    let r = !src1 & src2;
    let flags = FlagUpdate::new(LOGIC_FLAGS)
        .with(RFlags::ZF, r.is_zero())
        .with(RFlags::SF, r.sign());
    (r, flags)
}

pub fn blsr<W: Word>(src: W) -> (W, FlagUpdate) {
    let r = src & src.wrapping_sub(W::ONE);
    let flags = FlagUpdate::new(LOGIC_FLAGS)
        .with(RFlags::ZF, r.is_zero())
        .with(RFlags::SF, r.sign())
        .with(RFlags::CF, src.is_zero());
    (r, flags)
}

pub fn blsmsk<W: Word>(src: W) -> (W, FlagUpdate) {
    let r = src ^ src.wrapping_sub(W::ONE);
    // ZF is always cleared: the result has at least one bit set.
    let flags = FlagUpdate::new(LOGIC_FLAGS)
        .with(RFlags::SF, r.sign())
        .with(RFlags::CF, src.is_zero());
    (r, flags)
}

pub fn blsi<W: Word>(src: W) -> (W, FlagUpdate) {
    let r = src & src.wrapping_neg();
    let flags = FlagUpdate::new(LOGIC_FLAGS)
        .with(RFlags::ZF, r.is_zero())
        .with(RFlags::SF, r.sign())
        .with(RFlags::CF, !src.is_zero());
    (r, flags)
}

/// Zero the bits of `src` from position `index[7:0]` upwards.
pub fn bzhi<W: Word>(src: W, index: W) -> (W, FlagUpdate) {
    let n = (index.zero_extend() & 0xFF) as u32;
    let r = src & W::low_mask(n);
    let flags = FlagUpdate::new(LOGIC_FLAGS)
        .with(RFlags::ZF, r.is_zero())
        .with(RFlags::SF, r.sign())
        .with(RFlags::CF, n > W::BITS - 1);
    (r, flags)
}

/// Extract `control[15:8]` bits of `src` starting at bit `control[7:0]`.
pub fn bextr<W: Word>(src: W, control: W) -> (W, FlagUpdate) {
    let control = control.zero_extend();
    let start = (control & 0xFF) as u32;
    let len = ((control >> 8) & 0xFF) as u32;
    let r = if start >= W::BITS {
        W::ZERO
    } else {
        (src >> start) & W::low_mask(len)
    };
    let flags = FlagUpdate::new(RFlags::ZF | RFlags::CF | RFlags::OF).with(RFlags::ZF, r.is_zero());
    (r, flags)
}

/// Gather the bits of `src` selected by `mask` into the low bits of the result.
pub fn pext<W: Word>(src: W, mask: W) -> W {
    let mut out = W::ZERO;
    let mut k = 0;
    for i in 0..W::BITS {
        if mask.bit(i) {
            if src.bit(i) {
                out = out | (W::ONE << k);
            }
            k += 1;
        }
    }
    out
}

/// Scatter the low bits of `src` to the positions selected by `mask`.
pub fn pdep<W: Word>(src: W, mask: W) -> W {
    let mut out = W::ZERO;
    let mut k = 0;
    for i in 0..W::BITS {
        if mask.bit(i) {
            if src.bit(k) {
                out = out | (W::ONE << i);
            }
            k += 1;
        }
    }
    out
}

/// Unsigned `a * b` as `(high, low)`.
pub fn mulx<W: Word>(a: W, b: W) -> (W, W) {
    a.widening_mul(b)
}

fn count<W: Word>(c: W) -> u32 {
    (c.zero_extend() as u32) & (W::BITS - 1)
}

pub fn shlx<W: Word>(src: W, c: W) -> W {
    src << count(c)
}

pub fn shrx<W: Word>(src: W, c: W) -> W {
    src >> count(c)
}

pub fn sarx<W: Word>(src: W, c: W) -> W {
    src.sar(count(c))
}

pub fn rorx<W: Word>(src: W, imm: u8) -> W {
    src.rotate_right(u32::from(imm) & (W::BITS - 1))
}

pub fn execute<M: UserMemory + ?Sized>(
    emulation: Emulation,
    desc: &InstructionDescriptor,
    regs: &RegisterSnapshot,
    mem: &mut M,
) -> Result<EmulationResult, EmulationError> {
    match OperandWidth::gpr(desc) {
        OperandWidth::W64 => execute_at::<u64, M>(emulation, desc, regs, mem),
        _ => execute_at::<u32, M>(emulation, desc, regs, mem),
    }
}

fn gpr_write<W: Word>(index: u8, value: W) -> RegWrite {
    RegWrite::Gpr {
        index,
        value: value.zero_extend(),
    }
}

fn execute_at<W: Word, M: UserMemory + ?Sized>(
    emulation: Emulation,
    desc: &InstructionDescriptor,
    regs: &RegisterSnapshot,
    mem: &mut M,
) -> Result<EmulationResult, EmulationError> {
    let rm = W::truncate(Operand::rm(desc, regs).read(regs, mem, W::WIDTH)? as u64);
    let vvvv = W::truncate(regs.gpr_u64(usize::from(desc.vvvv)));
    let reg = desc.reg_index();
    let mut out = EmulationResult::new(desc.len);

    // BLSR/BLSMSK/BLSI write the register named by VEX.vvvv.
    let (dst, value, flags) = match emulation {
        Emulation::Rorx => (reg, rorx(rm, desc.imm.unwrap_or(0)), None),
        Emulation::Andn => {
            let (r, f) = andn(vvvv, rm);
            (reg, r, Some(f))
        }
        Emulation::Blsr => {
            let (r, f) = blsr(rm);
            (desc.vvvv, r, Some(f))
        }
        Emulation::Blsmsk => {
            let (r, f) = blsmsk(rm);
            (desc.vvvv, r, Some(f))
        }
        Emulation::Blsi => {
            let (r, f) = blsi(rm);
            (desc.vvvv, r, Some(f))
        }
        Emulation::Bzhi => {
            let (r, f) = bzhi(rm, vvvv);
            (reg, r, Some(f))
        }
        Emulation::Pext => (reg, pext(vvvv, rm), None),
        Emulation::Pdep => (reg, pdep(vvvv, rm), None),
        Emulation::Mulx => {
            let (hi, lo) = mulx(W::truncate(regs.gpr_u64(gpr::RDX)), rm);
            // Low half first: if both destinations name one register it ends up with the high half.
            out.push(gpr_write(desc.vvvv, lo));
            (reg, hi, None)
        }
        Emulation::Bextr => {
            let (r, f) = bextr(rm, vvvv);
            (reg, r, Some(f))
        }
        Emulation::Shlx => (reg, shlx(rm, vvvv), None),
        Emulation::Sarx => (reg, sarx(rm, vvvv), None),
        Emulation::Shrx => (reg, shrx(rm, vvvv), None),
        Emulation::Pcmpestrm
        | Emulation::Pcmpestri
        | Emulation::Pcmpistrm
        | Emulation::Pcmpistri => return Err(EmulationError::Unsupported),
    };

    out.push(gpr_write(dst, value));
    if let Some(flags) = flags {
        out = out.with_flags(flags);
    }
    Ok(out)
}
