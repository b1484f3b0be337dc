use crate::state::{FlagUpdate, RegisterSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWrite {
    /// Full 64-bit value; 32-bit results arrive already zero-extended.
    Gpr { index: u8, value: u64 },
    Xmm { index: u8, value: u128 },
}

/// Everything one emulated instruction changes, computed before any of it is
/// committed. At most two register writes (MULX is the only two-destination
/// instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationResult {
    writes: [Option<RegWrite>; 2],
    pub flags: Option<FlagUpdate>,
    pub len: u8,
}

impl EmulationResult {
    pub fn new(len: u8) -> Self {
        Self {
            writes: [None; 2],
            flags: None,
            len,
        }
    }

    /// Queue a write. Writes are committed in the order they were pushed, so
    /// a later write to the same register wins.
    pub fn push(&mut self, write: RegWrite) {
        debug_assert!(self.writes[1].is_none(), "more than two register writes");
        if let Some(slot) = self.writes.iter_mut().find(|w| w.is_none()) {
            *slot = Some(write);
        }
    }

    pub fn with_flags(mut self, flags: FlagUpdate) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn writes(&self) -> impl Iterator<Item = &RegWrite> {
        self.writes.iter().flatten()
    }

    /// Apply the result to `regs` and step past the instruction.
    pub fn commit(&self, regs: &mut RegisterSnapshot) {
        for write in self.writes() {
            match *write {
                RegWrite::Gpr { index, value } => regs.gpr[usize::from(index & 0xF)] = value,
                RegWrite::Xmm { index, value } => regs.xmm[usize::from(index & 0xF)] = value,
            }
        }
        if let Some(flags) = self.flags {
            regs.apply_flags(flags);
        }
        regs.advance_rip(u64::from(self.len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CpuMode, RFlags};

    #[test]
    fn commit_applies_writes_in_order_and_advances_rip() {
        let mut regs = RegisterSnapshot::new(CpuMode::Bit64);
        regs.rip = 0x1000;
        regs.rflags |= RFlags::CF.bits();

        let mut result = EmulationResult::new(5)
            .with_flags(FlagUpdate::new(RFlags::CF | RFlags::ZF).with(RFlags::ZF, true));
        result.push(RegWrite::Gpr { index: 3, value: 1 });
        result.push(RegWrite::Gpr { index: 3, value: 2 });
        result.commit(&mut regs);

        assert_eq!(regs.gpr[3], 2);
        assert_eq!(regs.rip, 0x1005);
        assert!(regs.get_flag(RFlags::ZF));
        assert!(!regs.get_flag(RFlags::CF));
    }
}
