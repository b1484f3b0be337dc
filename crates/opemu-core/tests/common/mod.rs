// Shared test helpers (integration tests compile as separate crates, so put
// common code in a submodule to avoid it becoming its own test target).

#![allow(dead_code)]

use opemu_core::{
    CpuMode, EmulatorConfig, Exception, FlatTestMemory, RegisterSnapshot, TrapDispatcher,
    TrapOutcome,
};

pub const CODE: u64 = 0x40_0000;
pub const DATA: u64 = 0x40_1000;
pub const WINDOW: usize = 0x2000;

/// A faulting user thread: registers plus one flat mapping holding code and data.
pub struct Machine {
    pub regs: RegisterSnapshot,
    pub mem: FlatTestMemory,
    pub dispatcher: TrapDispatcher,
}

impl Machine {
    pub fn new(mode: CpuMode, code: &[u8]) -> Self {
        let mut mem = FlatTestMemory::new(CODE, WINDOW);
        mem.load(CODE, code);
        let mut regs = RegisterSnapshot::new(mode);
        regs.rip = CODE;
        Self {
            regs,
            mem,
            dispatcher: TrapDispatcher::default(),
        }
    }

    pub fn with_config(mut self, config: EmulatorConfig) -> Self {
        self.dispatcher = TrapDispatcher::new(config);
        self
    }

    /// Deliver #UD at the current RIP.
    pub fn ud(&mut self) -> TrapOutcome {
        self.trap(Exception::InvalidOpcode.vector())
    }

    pub fn trap(&mut self, vector: u8) -> TrapOutcome {
        self.dispatcher
            .handle_trap(&mut self.regs, &mut self.mem, vector)
    }
}

/// Little-endian packed bytes, zero padded.
pub fn text(s: &[u8]) -> u128 {
    let mut raw = [0u8; 16];
    raw[..s.len()].copy_from_slice(s);
    u128::from_le_bytes(raw)
}

#[derive(Debug, Clone, Copy)]
pub struct Vector {
    pub name: &'static str,
    pub mode: CpuMode,
    pub bytes: &'static [u8],
}

const fn v64(name: &'static str, bytes: &'static [u8]) -> Vector {
    Vector {
        name,
        mode: CpuMode::Bit64,
        bytes,
    }
}

const fn v32(name: &'static str, bytes: &'static [u8]) -> Vector {
    Vector {
        name,
        mode: CpuMode::Bit32,
        bytes,
    }
}

/// One or more encodings of every emulated instruction. Memory forms address
/// the mapping through RIP or an absolute displacement so they work with any
/// register contents.
pub const VECTORS: &[Vector] = &[
    v64("rorx rax, rbx, 7", &[0xC4, 0xE3, 0xFB, 0xF0, 0xC3, 0x07]),
    v64("andn eax, ebx, ecx", &[0xC4, 0xE2, 0x60, 0xF2, 0xC1]),
    v64("blsr ecx, edx", &[0xC4, 0xE2, 0x70, 0xF3, 0xCA]),
    v64("blsmsk ecx, edx", &[0xC4, 0xE2, 0x70, 0xF3, 0xD2]),
    v64("blsi ecx, edx", &[0xC4, 0xE2, 0x70, 0xF3, 0xDA]),
    v64("bzhi eax, ecx, ebx", &[0xC4, 0xE2, 0x60, 0xF5, 0xC1]),
    v64("pext eax, ebx, ecx", &[0xC4, 0xE2, 0x62, 0xF5, 0xC1]),
    v64("pdep eax, ebx, ecx", &[0xC4, 0xE2, 0x63, 0xF5, 0xC1]),
    v64("mulx rax, rbx, rcx", &[0xC4, 0xE2, 0xE3, 0xF6, 0xC1]),
    v64("bextr eax, ecx, ebx", &[0xC4, 0xE2, 0x60, 0xF7, 0xC1]),
    v64("shlx eax, ecx, ebx", &[0xC4, 0xE2, 0x61, 0xF7, 0xC1]),
    v64("sarx eax, ecx, ebx", &[0xC4, 0xE2, 0x62, 0xF7, 0xC1]),
    v64("shrx eax, ecx, ebx", &[0xC4, 0xE2, 0x63, 0xF7, 0xC1]),
    v64("pcmpestrm xmm1, xmm2, 0", &[0x66, 0x0F, 0x3A, 0x60, 0xCA, 0x00]),
    v64("pcmpestri xmm1, xmm2, 0x0c", &[0x66, 0x0F, 0x3A, 0x61, 0xCA, 0x0C]),
    v64("pcmpistrm xmm1, xmm2, 0x44", &[0x66, 0x0F, 0x3A, 0x62, 0xCA, 0x44]),
    v64("pcmpistri xmm1, xmm2, 0", &[0x66, 0x0F, 0x3A, 0x63, 0xCA, 0x00]),
    v64(
        "pcmpistri xmm1, [rip+0x10], 0x0c",
        &[0x66, 0x0F, 0x3A, 0x63, 0x0D, 0x10, 0x00, 0x00, 0x00, 0x0C],
    ),
    v64("vpcmpestri xmm1, xmm2, 0x18 (W1)", &[0xC4, 0xE3, 0xF9, 0x61, 0xCA, 0x18]),
    v64(
        "pdep r8, r9, [rip+0x20]",
        &[0xC4, 0x42, 0xB3, 0xF5, 0x05, 0x20, 0x00, 0x00, 0x00],
    ),
    v64("pcmpestri xmm9, xmm10, 0x40 (REX)", &[0x66, 0x45, 0x0F, 0x3A, 0x61, 0xCA, 0x40]),
    v32("shlx eax, ecx, edx", &[0xC4, 0xE2, 0x69, 0xF7, 0xC1]),
    v32("andn eax, ebx, [0x401000]", &[0xC4, 0xE2, 0x60, 0xF2, 0x05, 0x00, 0x10, 0x40, 0x00]),
    v32("pcmpistrm xmm1, xmm2, 0x40", &[0x66, 0x0F, 0x3A, 0x62, 0xCA, 0x40]),
];

/// xorshift64* for deterministic pseudo-random register contents.
#[derive(Debug, Clone)]
pub struct XorShift64(pub u64);

impl XorShift64 {
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    pub fn next_u128(&mut self) -> u128 {
        (u128::from(self.next_u64()) << 64) | u128::from(self.next_u64())
    }
}
