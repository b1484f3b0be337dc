use bitflags::bitflags;
use opemu_decoder::DecodeMode;

/// Architectural GPR numbering (ModRM/VEX register index order).
pub mod gpr {
    pub const RAX: usize = 0;
    pub const RCX: usize = 1;
    pub const RDX: usize = 2;
    pub const RBX: usize = 3;
    pub const RSP: usize = 4;
    pub const RBP: usize = 5;
    pub const RSI: usize = 6;
    pub const RDI: usize = 7;
    pub const R8: usize = 8;
    pub const R9: usize = 9;
    pub const R10: usize = 10;
    pub const R11: usize = 11;
    pub const R12: usize = 12;
    pub const R13: usize = 13;
    pub const R14: usize = 14;
    pub const R15: usize = 15;
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RFlags: u64 {
        const CF = 1 << 0;
        const PF = 1 << 2;
        const AF = 1 << 4;
        const ZF = 1 << 6;
        const SF = 1 << 7;
        const DF = 1 << 10;
        const OF = 1 << 11;

        /// The six arithmetic status flags.
        const STATUS = Self::CF.bits()
            | Self::PF.bits()
            | Self::AF.bits()
            | Self::ZF.bits()
            | Self::SF.bits()
            | Self::OF.bits();
    }
}

/// Reserved RFLAGS bit 1, which always reads as 1.
pub const RFLAGS_FIXED: u64 = 0x2;

/// A change to a subset of the status flags.
///
/// Flags outside `affected` keep their current value; this is how "not
/// affected" and "undefined" flags are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagUpdate {
    pub affected: RFlags,
    pub values: RFlags,
}

impl FlagUpdate {
    pub fn new(affected: RFlags) -> Self {
        Self {
            affected,
            values: RFlags::empty(),
        }
    }

    /// Record `flag` as set or clear. The flag must be part of `affected`.
    pub fn with(mut self, flag: RFlags, on: bool) -> Self {
        debug_assert!(self.affected.contains(flag));
        self.values.set(flag, on);
        self
    }

    pub fn apply(self, rflags: u64) -> u64 {
        let affected = self.affected.bits();
        (rflags & !affected) | (self.values.bits() & affected) | RFLAGS_FIXED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    /// 32-bit code segment (protected or compatibility mode).
    Bit32,
    /// 64-bit code segment (long mode).
    Bit64,
}

impl CpuMode {
    pub fn bitness(self) -> u32 {
        match self {
            CpuMode::Bit32 => 32,
            CpuMode::Bit64 => 64,
        }
    }

    pub fn ip_mask(self) -> u64 {
        mask_bits(self.bitness())
    }

    pub fn decode_mode(self) -> DecodeMode {
        match self {
            CpuMode::Bit32 => DecodeMode::Bits32,
            CpuMode::Bit64 => DecodeMode::Bits64,
        }
    }
}

/// Register state of the faulting thread, as saved by the host on trap entry.
///
/// The dispatcher owns it for the duration of one fault and writes results
/// back in place; the host resumes from whatever `rip` holds afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub gpr: [u64; 16],
    pub xmm: [u128; 16],
    pub rip: u64,
    pub rflags: u64,
    /// Code segment selector. RPL 3 means the fault came from user mode.
    pub cs: u16,
    pub mode: CpuMode,
    pub fs_base: u64,
    pub gs_base: u64,
}

impl RegisterSnapshot {
    /// Flat user-mode state with the conventional Linux user code selectors.
    pub fn new(mode: CpuMode) -> Self {
        Self {
            gpr: [0; 16],
            xmm: [0; 16],
            rip: 0,
            rflags: RFLAGS_FIXED,
            cs: match mode {
                CpuMode::Bit32 => 0x23,
                CpuMode::Bit64 => 0x33,
            },
            mode,
            fs_base: 0,
            gs_base: 0,
        }
    }

    pub fn is_user(&self) -> bool {
        self.cs & 0x3 == 0x3
    }

    pub fn rip(&self) -> u64 {
        self.rip & self.mode.ip_mask()
    }

    pub fn set_rip(&mut self, rip: u64) {
        self.rip = rip & self.mode.ip_mask();
    }

    pub fn advance_rip(&mut self, delta: u64) {
        self.set_rip(self.rip().wrapping_add(delta));
    }

    pub fn flags(&self) -> RFlags {
        RFlags::from_bits_truncate(self.rflags)
    }

    pub fn get_flag(&self, flag: RFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn apply_flags(&mut self, update: FlagUpdate) {
        self.rflags = update.apply(self.rflags);
    }

    pub fn gpr_u64(&self, index: usize) -> u64 {
        self.gpr[index & 0xF]
    }

    /// Low `bits` of a GPR.
    pub fn read_gpr(&self, index: usize, bits: u32) -> u64 {
        self.gpr_u64(index) & mask_bits(bits)
    }

    /// Write the low `bits` of a GPR. 32-bit writes zero the upper half.
    pub fn write_gpr(&mut self, index: usize, bits: u32, val: u64) {
        self.gpr[index & 0xF] = val & mask_bits(bits);
    }
}

pub fn mask_bits(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
