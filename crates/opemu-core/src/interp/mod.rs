//! Opcode lookup and the two emulation engines.

pub mod bmi;
pub mod pcmpstr;

use opemu_decoder::{Family, InstructionDescriptor, OpcodeMap, SimdPrefix};
use OpcodeMap::{Map0F38, Map0F3A};
use SimdPrefix::{None as NP, P66, PF2, PF3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emulation {
    Rorx,
    Andn,
    Blsr,
    Blsmsk,
    Blsi,
    Bzhi,
    Pext,
    Pdep,
    Mulx,
    Bextr,
    Shlx,
    Sarx,
    Shrx,
    Pcmpestrm,
    Pcmpestri,
    Pcmpistrm,
    Pcmpistri,
}

impl Emulation {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Emulation::Rorx => "rorx",
            Emulation::Andn => "andn",
            Emulation::Blsr => "blsr",
            Emulation::Blsmsk => "blsmsk",
            Emulation::Blsi => "blsi",
            Emulation::Bzhi => "bzhi",
            Emulation::Pext => "pext",
            Emulation::Pdep => "pdep",
            Emulation::Mulx => "mulx",
            Emulation::Bextr => "bextr",
            Emulation::Shlx => "shlx",
            Emulation::Sarx => "sarx",
            Emulation::Shrx => "shrx",
            Emulation::Pcmpestrm => "pcmpestrm",
            Emulation::Pcmpestri => "pcmpestri",
            Emulation::Pcmpistrm => "pcmpistrm",
            Emulation::Pcmpistri => "pcmpistri",
        }
    }

    pub fn family(self) -> Family {
        match self {
            Emulation::Pcmpestrm
            | Emulation::Pcmpestri
            | Emulation::Pcmpistrm
            | Emulation::Pcmpistri => Family::StringCompare,
            _ => Family::BitManipulation,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpcodeEntry {
    map: OpcodeMap,
    opcode: u8,
    prefix: SimdPrefix,
    /// ModRM.reg value for group opcodes.
    reg: Option<u8>,
    vex_only: bool,
    /// VEX.vvvv must be 1111b.
    vvvv_unused: bool,
    emulation: Emulation,
}

const fn vex(
    map: OpcodeMap,
    opcode: u8,
    prefix: SimdPrefix,
    reg: Option<u8>,
    emulation: Emulation,
) -> OpcodeEntry {
    OpcodeEntry {
        map,
        opcode,
        prefix,
        reg,
        vex_only: true,
        vvvv_unused: false,
        emulation,
    }
}

const fn sse42(opcode: u8, emulation: Emulation) -> OpcodeEntry {
    OpcodeEntry {
        map: OpcodeMap::Map0F3A,
        opcode,
        prefix: SimdPrefix::P66,
        reg: None,
        vex_only: false,
        vvvv_unused: true,
        emulation,
    }
}

static OPCODE_TABLE: [OpcodeEntry; 17] = [
    OpcodeEntry {
        vvvv_unused: true,
        ..vex(Map0F3A, 0xF0, PF2, None, Emulation::Rorx)
    },
    vex(Map0F38, 0xF2, NP, None, Emulation::Andn),
    vex(Map0F38, 0xF3, NP, Some(1), Emulation::Blsr),
    vex(Map0F38, 0xF3, NP, Some(2), Emulation::Blsmsk),
    vex(Map0F38, 0xF3, NP, Some(3), Emulation::Blsi),
    vex(Map0F38, 0xF5, NP, None, Emulation::Bzhi),
    vex(Map0F38, 0xF5, PF3, None, Emulation::Pext),
    vex(Map0F38, 0xF5, PF2, None, Emulation::Pdep),
    vex(Map0F38, 0xF6, PF2, None, Emulation::Mulx),
    vex(Map0F38, 0xF7, NP, None, Emulation::Bextr),
    vex(Map0F38, 0xF7, P66, None, Emulation::Shlx),
    vex(Map0F38, 0xF7, PF3, None, Emulation::Sarx),
    vex(Map0F38, 0xF7, PF2, None, Emulation::Shrx),
    sse42(0x60, Emulation::Pcmpestrm),
    sse42(0x61, Emulation::Pcmpestri),
    sse42(0x62, Emulation::Pcmpistrm),
    sse42(0x63, Emulation::Pcmpistri),
];

/// Find the emulation for a decoded instruction, or `None` if the encoding
/// is one we do not handle (and the CPU would #UD on anyway).
pub fn lookup(desc: &InstructionDescriptor) -> Option<Emulation> {
    OPCODE_TABLE
        .iter()
        .find(|e| {
            e.map == desc.map
                && e.opcode == desc.opcode
                && e.prefix == desc.prefix
                && e.reg.map_or(true, |r| r == desc.modrm.reg)
                && (desc.is_vex() || !e.vex_only)
                && !(desc.is_vex() && e.vvvv_unused && desc.vvvv != 0)
        })
        .map(|e| e.emulation)
}
