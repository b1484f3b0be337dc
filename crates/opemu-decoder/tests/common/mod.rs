// Shared test helpers (integration tests compile as separate crates, so put
// common code in a submodule to avoid it becoming its own test target).

#![allow(dead_code)]

use opemu_decoder::{
    DecodeMode, Displacement, ExtBits, Family, ModRm, OpcodeMap, SegmentOverride, Sib, SimdPrefix,
    VexForm,
};

/// One legal instruction form the emulator handles.
#[derive(Debug, Clone, Copy)]
pub struct Form {
    pub mnemonic: &'static str,
    pub map: OpcodeMap,
    pub opcode: u8,
    pub prefix: SimdPrefix,
    /// Fixed ModRM.reg sub-selector, if the opcode is a group.
    pub reg: Option<u8>,
    /// Legacy (non-VEX) encoding is also legal.
    pub legacy_ok: bool,
    /// VEX.vvvv must be 1111b (unused).
    pub vvvv_unused: bool,
    pub family: Family,
}

const fn bmi(
    mnemonic: &'static str,
    map: OpcodeMap,
    opcode: u8,
    prefix: SimdPrefix,
    reg: Option<u8>,
) -> Form {
    Form {
        mnemonic,
        map,
        opcode,
        prefix,
        reg,
        legacy_ok: false,
        vvvv_unused: matches!(map, OpcodeMap::Map0F3A),
        family: Family::BitManipulation,
    }
}

const fn pcmp(mnemonic: &'static str, opcode: u8) -> Form {
    Form {
        mnemonic,
        map: OpcodeMap::Map0F3A,
        opcode,
        prefix: SimdPrefix::P66,
        reg: None,
        legacy_ok: true,
        vvvv_unused: true,
        family: Family::StringCompare,
    }
}

pub const FORMS: &[Form] = &[
    bmi("rorx", OpcodeMap::Map0F3A, 0xF0, SimdPrefix::PF2, None),
    bmi("andn", OpcodeMap::Map0F38, 0xF2, SimdPrefix::None, None),
    bmi("blsr", OpcodeMap::Map0F38, 0xF3, SimdPrefix::None, Some(1)),
    bmi("blsmsk", OpcodeMap::Map0F38, 0xF3, SimdPrefix::None, Some(2)),
    bmi("blsi", OpcodeMap::Map0F38, 0xF3, SimdPrefix::None, Some(3)),
    bmi("bzhi", OpcodeMap::Map0F38, 0xF5, SimdPrefix::None, None),
    bmi("pext", OpcodeMap::Map0F38, 0xF5, SimdPrefix::PF3, None),
    bmi("pdep", OpcodeMap::Map0F38, 0xF5, SimdPrefix::PF2, None),
    bmi("mulx", OpcodeMap::Map0F38, 0xF6, SimdPrefix::PF2, None),
    bmi("bextr", OpcodeMap::Map0F38, 0xF7, SimdPrefix::None, None),
    bmi("shlx", OpcodeMap::Map0F38, 0xF7, SimdPrefix::P66, None),
    bmi("sarx", OpcodeMap::Map0F38, 0xF7, SimdPrefix::PF3, None),
    bmi("shrx", OpcodeMap::Map0F38, 0xF7, SimdPrefix::PF2, None),
    pcmp("pcmpestrm", 0x60),
    pcmp("pcmpestri", 0x61),
    pcmp("pcmpistrm", 0x62),
    pcmp("pcmpistri", 0x63),
];

/// Field-level description of an instruction, turned into bytes by [`Encoding::encode`].
#[derive(Debug, Clone, Copy)]
pub struct Encoding {
    pub mode: DecodeMode,
    pub vex: Option<VexForm>,
    pub ext: ExtBits,
    pub vvvv: u8,
    pub prefix: SimdPrefix,
    pub map: OpcodeMap,
    pub opcode: u8,
    pub modrm: ModRm,
    pub sib: Option<Sib>,
    pub disp: Option<Displacement>,
    pub imm: Option<u8>,
    /// Raw segment-override prefix byte.
    pub segment: Option<u8>,
    pub address_size_override: bool,
}

impl Encoding {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(15);
        if let Some(seg) = self.segment {
            out.push(seg);
        }
        if self.address_size_override {
            out.push(0x67);
        }

        match self.vex {
            Some(VexForm::ThreeByte) => {
                let mut b1 = self.map.mmmmm();
                if !self.ext.r {
                    b1 |= 0x80;
                }
                if !self.ext.x {
                    b1 |= 0x40;
                }
                if !self.ext.b {
                    b1 |= 0x20;
                }
                let b2 =
                    ((self.ext.w as u8) << 7) | ((!self.vvvv & 0xF) << 3) | self.prefix.pp();
                out.extend_from_slice(&[0xC4, b1, b2]);
            }
            Some(VexForm::TwoByte) => {
                let b1 = ((!self.ext.r as u8) << 7) | ((!self.vvvv & 0xF) << 3) | self.prefix.pp();
                out.extend_from_slice(&[0xC5, b1]);
            }
            None => {
                match self.prefix {
                    SimdPrefix::None => {}
                    SimdPrefix::P66 => out.push(0x66),
                    SimdPrefix::PF3 => out.push(0xF3),
                    SimdPrefix::PF2 => out.push(0xF2),
                }
                let ExtBits { r, x, b, w } = self.ext;
                if r || x || b || w {
                    out.push(
                        0x40 | ((w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | b as u8,
                    );
                }
                out.push(0x0F);
                match self.map {
                    OpcodeMap::Map0F => {}
                    OpcodeMap::Map0F38 => out.push(0x38),
                    OpcodeMap::Map0F3A => out.push(0x3A),
                }
            }
        }

        out.push(self.opcode);
        out.push(self.modrm.to_byte());
        if let Some(sib) = self.sib {
            out.push(sib.to_byte());
        }
        match self.disp {
            Some(Displacement::Disp8(d)) => out.push(d as u8),
            Some(Displacement::Disp32(d)) => out.extend_from_slice(&d.to_le_bytes()),
            None => {}
        }
        if let Some(imm) = self.imm {
            out.push(imm);
        }
        out
    }

    /// Segment override the decoder is expected to report for this encoding.
    pub fn expected_segment(&self) -> Option<SegmentOverride> {
        let seg = match self.segment? {
            0x26 => SegmentOverride::Es,
            0x2E => SegmentOverride::Cs,
            0x36 => SegmentOverride::Ss,
            0x3E => SegmentOverride::Ds,
            0x64 => SegmentOverride::Fs,
            0x65 => SegmentOverride::Gs,
            other => panic!("not a segment prefix: {other:#x}"),
        };
        match (self.mode, seg) {
            (DecodeMode::Bits64, SegmentOverride::Fs | SegmentOverride::Gs) => Some(seg),
            (DecodeMode::Bits64, _) => None,
            _ => Some(seg),
        }
    }
}

/// Builds the addressing tail (ModRM + optional SIB/displacement) for the given raw fields,
/// adding exactly the displacement the encoding requires.
pub fn addressing(md: u8, reg: u8, rm: u8, sib: u8, d8: i8, d32: i32) -> (ModRm, Option<Sib>, Option<Displacement>) {
    let modrm = ModRm { md, reg, rm };
    if modrm.is_register() {
        return (modrm, None, None);
    }
    let sib = (rm == 4).then(|| Sib::from_byte(sib));
    let no_base = sib.map_or(rm == 5, |s| s.base == 5);
    let disp = match md {
        0 if no_base => Some(Displacement::Disp32(d32)),
        0 => None,
        1 => Some(Displacement::Disp8(d8)),
        _ => Some(Displacement::Disp32(d32)),
    };
    (modrm, sib, disp)
}
