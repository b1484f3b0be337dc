//! SSE4.2 packed text comparison (`PCMPESTRI`, `PCMPESTRM`, `PCMPISTRI`,
//! `PCMPISTRM`).
//!
//! All four instructions share one pipeline: compute the valid lengths, build
//! the pairwise comparison matrix, force the entries at invalid positions,
//! aggregate into `IntRes1`, apply polarity to get `IntRes2`, then emit
//! either an index (into ECX) or a mask (into XMM0). Byte and word formats
//! run through the same code with the element count as a parameter.

use opemu_decoder::InstructionDescriptor;

use super::Emulation;
use crate::error::EmulationError;
use crate::mem::UserMemory;
use crate::operand::{Operand, OperandWidth};
use crate::state::{gpr, FlagUpdate, RFlags, RegisterSnapshot};
use crate::writeback::{EmulationResult, RegWrite};

/// Most elements an operand can hold (bytes in a 128-bit register).
pub const MAX_ELEMENTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
    UnsignedBytes,
    UnsignedWords,
    SignedBytes,
    SignedWords,
}

impl ElementFormat {
    pub fn count(self) -> usize {
        match self {
            ElementFormat::UnsignedBytes | ElementFormat::SignedBytes => 16,
            ElementFormat::UnsignedWords | ElementFormat::SignedWords => 8,
        }
    }

    /// Elements of `v`, sign- or zero-extended; only the first `count()` are used.
    pub fn elements(self, v: u128) -> [i32; MAX_ELEMENTS] {
        let bytes = v.to_le_bytes();
        let mut out = [0i32; MAX_ELEMENTS];
        for (i, slot) in out.iter_mut().take(self.count()).enumerate() {
            *slot = match self {
                ElementFormat::UnsignedBytes => i32::from(bytes[i]),
                ElementFormat::SignedBytes => i32::from(bytes[i] as i8),
                ElementFormat::UnsignedWords => {
                    i32::from(u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]))
                }
                ElementFormat::SignedWords => {
                    i32::from(i16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]))
                }
            };
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    EqualAny,
    Ranges,
    EqualEach,
    EqualOrdered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    MaskedPositive,
    /// Negate only the positions that are valid in the second operand.
    MaskedNegative,
}

/// The imm8 control byte. Bit 7 is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub format: ElementFormat,
    pub aggregation: Aggregation,
    pub polarity: Polarity,
    /// imm8[6]: most-significant index for the index forms, element-expanded
    /// mask for the mask forms.
    pub msb: bool,
}

impl Control {
    pub fn from_imm(imm: u8) -> Self {
        let format = match imm & 0x3 {
            0 => ElementFormat::UnsignedBytes,
            1 => ElementFormat::UnsignedWords,
            2 => ElementFormat::SignedBytes,
            _ => ElementFormat::SignedWords,
        };
        let aggregation = match (imm >> 2) & 0x3 {
            0 => Aggregation::EqualAny,
            1 => Aggregation::Ranges,
            2 => Aggregation::EqualEach,
            _ => Aggregation::EqualOrdered,
        };
        let polarity = match (imm >> 4) & 0x3 {
            0 => Polarity::Positive,
            1 => Polarity::Negative,
            2 => Polarity::MaskedPositive,
            _ => Polarity::MaskedNegative,
        };
        Self {
            format,
            aggregation,
            polarity,
            msb: imm & 0x40 != 0,
        }
    }
}

/// Length of a zero-terminated operand: index of the first zero element, or
/// the element count.
pub fn implicit_length(v: u128, format: ElementFormat) -> usize {
    let n = format.count();
    let elements = format.elements(v);
    elements[..n].iter().position(|&e| e == 0).unwrap_or(n)
}

/// Length taken from EAX/EDX (RAX/RDX when `wide`): the absolute value of the
/// signed register, saturated to the element count.
pub fn explicit_length(raw: u64, wide: bool, format: ElementFormat) -> usize {
    let signed = if wide {
        raw as i64
    } else {
        i64::from(raw as u32 as i32)
    };
    signed.unsigned_abs().min(format.count() as u64) as usize
}

/// `cells[i][j]`: element `i` of the first operand against element `j` of the
/// second. Only the top-left `n x n` corner is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonMatrix {
    cells: [[bool; MAX_ELEMENTS]; MAX_ELEMENTS],
    n: usize,
}

impl ComparisonMatrix {
    pub fn build(
        a: &[i32; MAX_ELEMENTS],
        b: &[i32; MAX_ELEMENTS],
        n: usize,
        aggregation: Aggregation,
    ) -> Self {
        let mut cells = [[false; MAX_ELEMENTS]; MAX_ELEMENTS];
        for (i, row) in cells.iter_mut().take(n).enumerate() {
            for (j, cell) in row.iter_mut().take(n).enumerate() {
                *cell = match aggregation {
                    // Even elements of `a` are lower bounds, odd ones upper bounds.
                    Aggregation::Ranges if i % 2 == 0 => b[j] >= a[i],
                    Aggregation::Ranges => b[j] <= a[i],
                    _ => a[i] == b[j],
                };
            }
        }
        Self { cells, n }
    }

    pub fn get(&self, i: usize, j: usize) -> bool {
        self.cells[i][j]
    }

    /// Replace every entry that involves an element past `la` (first operand)
    /// or `lb` (second operand).
    pub fn force_invalid(&mut self, aggregation: Aggregation, la: usize, lb: usize) {
        for i in 0..self.n {
            for j in 0..self.n {
                let forced = match (i < la, j < lb) {
                    (true, true) => continue,
                    (false, true) => aggregation == Aggregation::EqualOrdered,
                    (true, false) => false,
                    (false, false) => matches!(
                        aggregation,
                        Aggregation::EqualEach | Aggregation::EqualOrdered
                    ),
                };
                self.cells[i][j] = forced;
            }
        }
    }

    /// Reduce to `IntRes1`, one bit per element of the second operand.
    pub fn aggregate(&self, aggregation: Aggregation) -> u16 {
        let n = self.n;
        let mut res = 0u16;
        for j in 0..n {
            let hit = match aggregation {
                Aggregation::EqualAny => (0..n).any(|i| self.cells[i][j]),
                Aggregation::Ranges => (0..n)
                    .step_by(2)
                    .any(|i| self.cells[i][j] && self.cells[i + 1][j]),
                Aggregation::EqualEach => self.cells[j][j],
                Aggregation::EqualOrdered => (0..n - j).all(|k| self.cells[k][j + k]),
            };
            if hit {
                res |= 1 << j;
            }
        }
        res
    }
}

fn low_bits(n: usize) -> u16 {
    ((1u32 << n) - 1) as u16
}

/// The shared result of all four instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOutcome {
    /// `IntRes2`: aggregated comparison after polarity.
    pub result: u16,
    pub la: usize,
    pub lb: usize,
    pub count: usize,
}

impl CompareOutcome {
    /// Lowest (or with `msb`, highest) set bit of the result; the element
    /// count when none is set.
    pub fn index(&self, msb: bool) -> u32 {
        if self.result == 0 {
            self.count as u32
        } else if msb {
            15 - self.result.leading_zeros()
        } else {
            self.result.trailing_zeros()
        }
    }

    /// Mask output: the bits themselves, or with `expand` every element set
    /// to all ones where its bit is set.
    pub fn mask(&self, expand: bool) -> u128 {
        if !expand {
            return u128::from(self.result);
        }
        let width = 128 / self.count;
        let element = (1u128 << width) - 1;
        (0..self.count)
            .filter(|&j| self.result & (1 << j) != 0)
            .fold(0u128, |acc, j| acc | (element << (j * width)))
    }

    pub fn flags(&self) -> FlagUpdate {
        FlagUpdate::new(RFlags::STATUS)
            .with(RFlags::CF, self.result != 0)
            .with(RFlags::ZF, self.lb < self.count)
            .with(RFlags::SF, self.la < self.count)
            .with(RFlags::OF, self.result & 1 != 0)
    }
}

/// Run the comparison pipeline on two operands with known valid lengths.
pub fn compare(a: u128, b: u128, control: Control, la: usize, lb: usize) -> CompareOutcome {
    let format = control.format;
    let n = format.count();
    let (la, lb) = (la.min(n), lb.min(n));

    let mut matrix = ComparisonMatrix::build(
        &format.elements(a),
        &format.elements(b),
        n,
        control.aggregation,
    );
    matrix.force_invalid(control.aggregation, la, lb);
    let int_res1 = matrix.aggregate(control.aggregation);

    let result = match control.polarity {
        Polarity::Positive | Polarity::MaskedPositive => int_res1,
        Polarity::Negative => int_res1 ^ low_bits(n),
        Polarity::MaskedNegative => int_res1 ^ low_bits(lb),
    };

    CompareOutcome {
        result,
        la,
        lb,
        count: n,
    }
}

pub fn execute<M: UserMemory + ?Sized>(
    emulation: Emulation,
    desc: &InstructionDescriptor,
    regs: &RegisterSnapshot,
    mem: &mut M,
) -> Result<EmulationResult, EmulationError> {
    let control = Control::from_imm(desc.imm.unwrap_or(0));
    let format = control.format;
    let a = regs.xmm[usize::from(desc.reg_index())];
    let b = Operand::rm(desc, regs).read(regs, mem, OperandWidth::W128)?;

    let (la, lb) = match emulation {
        Emulation::Pcmpestri | Emulation::Pcmpestrm => (
            explicit_length(regs.gpr_u64(gpr::RAX), desc.wide(), format),
            explicit_length(regs.gpr_u64(gpr::RDX), desc.wide(), format),
        ),
        Emulation::Pcmpistri | Emulation::Pcmpistrm => {
            (implicit_length(a, format), implicit_length(b, format))
        }
        _ => return Err(EmulationError::Unsupported),
    };

    let outcome = compare(a, b, control, la, lb);
    let mut out = EmulationResult::new(desc.len).with_flags(outcome.flags());
    match emulation {
        Emulation::Pcmpestri | Emulation::Pcmpistri => out.push(RegWrite::Gpr {
            index: gpr::RCX as u8,
            value: u64::from(outcome.index(control.msb)),
        }),
        _ => out.push(RegWrite::Xmm {
            index: 0,
            value: outcome.mask(control.msb),
        }),
    }
    Ok(out)
}
