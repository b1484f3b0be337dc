//! Operand resolution: turns the ModRM/SIB/displacement fields of a decoded
//! instruction into a register number or a linear address, and reads the value.

use opemu_decoder::{DecodeMode, InstructionDescriptor, SegmentOverride};

use crate::mem::{MemoryFault, UserMemory};
use crate::state::{mask_bits, RegisterSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    W32,
    W64,
    W128,
}

impl OperandWidth {
    pub fn bits(self) -> u32 {
        match self {
            OperandWidth::W32 => 32,
            OperandWidth::W64 => 64,
            OperandWidth::W128 => 128,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// GPR operand width of an instruction: 64 only for W=1 in long mode.
    pub fn gpr(desc: &InstructionDescriptor) -> Self {
        if desc.wide() {
            OperandWidth::W64
        } else {
            OperandWidth::W32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Register number; a GPR or an XMM register depending on the width read.
    Reg(u8),
    /// Linear address in the faulting process.
    Mem(u64),
}

impl Operand {
    /// The ModRM r/m operand.
    pub fn rm(desc: &InstructionDescriptor, regs: &RegisterSnapshot) -> Self {
        if desc.modrm.is_register() {
            Operand::Reg(desc.rm_index())
        } else {
            Operand::Mem(effective_address(desc, regs))
        }
    }

    /// Read the operand at `width`, zero-extended. 128-bit register reads come
    /// from the XMM file, narrower ones from the GPRs.
    pub fn read<M: UserMemory + ?Sized>(
        self,
        regs: &RegisterSnapshot,
        mem: &mut M,
        width: OperandWidth,
    ) -> Result<u128, MemoryFault> {
        match (self, width) {
            (Operand::Reg(r), OperandWidth::W128) => Ok(regs.xmm[usize::from(r & 0xF)]),
            (Operand::Reg(r), w) => Ok(regs.read_gpr(usize::from(r), w.bits()) as u128),
            (Operand::Mem(addr), w) => {
                let mut raw = [0u8; 16];
                mem.read(addr, &mut raw[..w.bytes()])?;
                Ok(u128::from_le_bytes(raw))
            }
        }
    }
}

fn address_bits(desc: &InstructionDescriptor) -> u32 {
    match (desc.mode, desc.address_size_override) {
        (DecodeMode::Bits64, false) => 64,
        _ => 32,
    }
}

fn segment_base(desc: &InstructionDescriptor, regs: &RegisterSnapshot) -> u64 {
    // ES/CS/SS/DS are flat in every mode a user process runs in.
    match desc.segment {
        Some(SegmentOverride::Fs) => regs.fs_base,
        Some(SegmentOverride::Gs) => regs.gs_base,
        _ => 0,
    }
}

/// Linear address of a memory operand (`mod != 11`).
pub fn effective_address(desc: &InstructionDescriptor, regs: &RegisterSnapshot) -> u64 {
    let modrm = desc.modrm;
    debug_assert!(!modrm.is_register());

    let addr_mask = mask_bits(address_bits(desc));
    let disp = desc.disp.map_or(0, |d| d.value() as u64);

    let offset = match desc.sib {
        Some(sib) => {
            let base = if sib.base == 5 && modrm.md == 0 {
                0
            } else {
                regs.gpr_u64(usize::from(sib.base | ((desc.ext.b as u8) << 3)))
            };
            let index_reg = sib.index | ((desc.ext.x as u8) << 3);
            // Index 100b without REX.X/VEX.X means "no index".
            let index = if index_reg == 4 {
                0
            } else {
                regs.gpr_u64(usize::from(index_reg)) << sib.scale
            };
            base.wrapping_add(index).wrapping_add(disp)
        }
        None if modrm.rm == 5 && modrm.md == 0 => {
            if desc.mode == DecodeMode::Bits64 {
                // RIP-relative: relative to the next instruction.
                regs.rip()
                    .wrapping_add(u64::from(desc.len))
                    .wrapping_add(disp)
            } else {
                disp
            }
        }
        None => regs
            .gpr_u64(usize::from(desc.rm_index()))
            .wrapping_add(disp),
    };

    let linear = segment_base(desc, regs).wrapping_add(offset & addr_mask);
    linear & regs.mode.ip_mask()
}
