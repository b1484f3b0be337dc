use opemu_decoder::MAX_INST_LEN;
use thiserror::Error;

/// A user-memory access that could not be completed (unmapped, or not readable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("user memory fault at {addr:#x}")]
pub struct MemoryFault {
    pub addr: u64,
}

/// Read access to the faulting process's address space.
///
/// Implementations must not block or sleep and must report inaccessible
/// addresses as [`MemoryFault`] rather than faulting themselves.
pub trait UserMemory {
    /// Fill `buf` from linear address `addr`. On error the contents of `buf`
    /// are unspecified.
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryFault>;

    fn read_u32(&mut self, addr: u64) -> Result<u32, MemoryFault> {
        let mut raw = [0u8; 4];
        self.read(addr, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_u64(&mut self, addr: u64) -> Result<u64, MemoryFault> {
        let mut raw = [0u8; 8];
        self.read(addr, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    fn read_u128(&mut self, addr: u64) -> Result<u128, MemoryFault> {
        let mut raw = [0u8; 16];
        self.read(addr, &mut raw)?;
        Ok(u128::from_le_bytes(raw))
    }
}

/// Fetch up to [`MAX_INST_LEN`] instruction bytes starting at `rip`.
///
/// Bytes are read one at a time so an instruction that ends right before an
/// unmapped page still decodes; the fetch stops at the first inaccessible
/// byte. Returns the number of bytes read, or the fault if not even the first
/// byte was readable.
pub fn fetch_instruction<M: UserMemory + ?Sized>(
    mem: &mut M,
    rip: u64,
    addr_mask: u64,
    buf: &mut [u8; MAX_INST_LEN],
) -> Result<usize, MemoryFault> {
    for i in 0..MAX_INST_LEN {
        let addr = rip.wrapping_add(i as u64) & addr_mask;
        if let Err(fault) = mem.read(addr, &mut buf[i..i + 1]) {
            if i == 0 {
                return Err(fault);
            }
            return Ok(i);
        }
    }
    Ok(MAX_INST_LEN)
}

/// Flat memory window starting at `base`, used by tests and tools.
#[derive(Debug, Clone)]
pub struct FlatTestMemory {
    base: u64,
    mem: Vec<u8>,
}

impl FlatTestMemory {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            mem: vec![0; size],
        }
    }

    pub fn load(&mut self, addr: u64, data: &[u8]) {
        let start = (addr - self.base) as usize;
        let end = start + data.len();
        self.mem[start..end].copy_from_slice(data);
    }

    pub fn end(&self) -> u64 {
        self.base + self.mem.len() as u64
    }
}

impl UserMemory for FlatTestMemory {
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryFault> {
        let fault = MemoryFault { addr };
        let start = addr.checked_sub(self.base).ok_or(fault)? as usize;
        let end = start.checked_add(buf.len()).ok_or(fault)?;
        let src = self.mem.get(start..end).ok_or(fault)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}
