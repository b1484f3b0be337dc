//! Instruction decoder for the opcode families `opemu` emulates.
//!
//! This is a small, allocation-free decoder. It understands the legacy prefix
//! stream, REX, both VEX forms, the `0F`/`0F38`/`0F3A` escape maps and the
//! ModRM/SIB/displacement/immediate tail, but it only *recognizes* the VEX
//! bit-manipulation opcodes and the SSE4.2 packed string-compare opcodes.
//! Anything else is reported as [`DecodeError::NotRecognized`] so the caller
//! can hand the fault back to the host.
//!
//! Register fields are kept raw (3-bit ModRM/SIB fields plus the extension
//! bits) so a descriptor reproduces exactly what was encoded; use the
//! `*_index` helpers to get full 4-bit register numbers.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Maximum x86 instruction length (architectural limit).
pub const MAX_INST_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte stream ended before the instruction could be fully decoded.
    #[error("unexpected end of instruction bytes")]
    UnexpectedEof,
    /// The instruction exceeds the architectural 15-byte length limit.
    #[error("instruction exceeds 15-byte length limit")]
    TooLong,
    /// Well-formed or not, this is not an instruction we emulate.
    #[error("instruction not recognized")]
    NotRecognized,
}

/// Code-segment mode the faulting instruction was fetched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// 32-bit protected/compatibility mode.
    Bits32,
    /// 64-bit long mode.
    Bits64,
}

impl DecodeMode {
    pub fn bitness(self) -> u32 {
        match self {
            DecodeMode::Bits32 => 32,
            DecodeMode::Bits64 => 64,
        }
    }
}

/// Mandatory/SIMD prefix class (`VEX.pp`, or the legacy 66/F3/F2 byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimdPrefix {
    #[default]
    None,
    P66,
    PF3,
    PF2,
}

impl SimdPrefix {
    pub fn from_pp(pp: u8) -> Self {
        match pp & 0x3 {
            0 => SimdPrefix::None,
            1 => SimdPrefix::P66,
            2 => SimdPrefix::PF3,
            _ => SimdPrefix::PF2,
        }
    }

    pub fn pp(self) -> u8 {
        match self {
            SimdPrefix::None => 0,
            SimdPrefix::P66 => 1,
            SimdPrefix::PF3 => 2,
            SimdPrefix::PF2 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeMap {
    Map0F,
    Map0F38,
    Map0F3A,
}

impl OpcodeMap {
    /// Map selected by the VEX `m-mmmm` field.
    pub fn from_mmmmm(m: u8) -> Option<Self> {
        match m & 0x1F {
            1 => Some(OpcodeMap::Map0F),
            2 => Some(OpcodeMap::Map0F38),
            3 => Some(OpcodeMap::Map0F3A),
            _ => None,
        }
    }

    pub fn mmmmm(self) -> u8 {
        match self {
            OpcodeMap::Map0F => 1,
            OpcodeMap::Map0F38 => 2,
            OpcodeMap::Map0F3A => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VexForm {
    /// `C5 xx`
    TwoByte,
    /// `C4 xx xx`
    ThreeByte,
}

/// Register-extension and width bits, taken from VEX or REX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtBits {
    pub r: bool,
    pub x: bool,
    pub b: bool,
    pub w: bool,
}

impl ExtBits {
    fn from_rex(rex: u8) -> Self {
        debug_assert!((0x40..=0x4F).contains(&rex));
        Self {
            w: (rex & 0b1000) != 0,
            r: (rex & 0b0100) != 0,
            x: (rex & 0b0010) != 0,
            b: (rex & 0b0001) != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    pub md: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            md: (byte >> 6) & 0x3,
            reg: (byte >> 3) & 0x7,
            rm: byte & 0x7,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.md << 6) | ((self.reg & 0x7) << 3) | (self.rm & 0x7)
    }

    /// `mod == 11`: the r/m operand is a register.
    pub fn is_register(self) -> bool {
        self.md == 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib {
    /// Raw 2-bit scale field; the multiplier is `1 << scale`.
    pub scale: u8,
    pub index: u8,
    pub base: u8,
}

impl Sib {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            scale: (byte >> 6) & 0x3,
            index: (byte >> 3) & 0x7,
            base: byte & 0x7,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.scale << 6) | ((self.index & 0x7) << 3) | (self.base & 0x7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Displacement {
    Disp8(i8),
    Disp32(i32),
}

impl Displacement {
    /// Sign-extended displacement value.
    pub fn value(self) -> i64 {
        match self {
            Displacement::Disp8(v) => v as i64,
            Displacement::Disp32(v) => v as i64,
        }
    }

    /// Encoded size in bytes.
    pub fn size(self) -> usize {
        match self {
            Displacement::Disp8(_) => 1,
            Displacement::Disp32(_) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOverride {
    Es,
    Cs,
    Ss,
    Ds,
    Fs,
    Gs,
}

impl SegmentOverride {
    fn from_prefix(b: u8) -> Option<Self> {
        match b {
            0x26 => Some(SegmentOverride::Es),
            0x2E => Some(SegmentOverride::Cs),
            0x36 => Some(SegmentOverride::Ss),
            0x3E => Some(SegmentOverride::Ds),
            0x64 => Some(SegmentOverride::Fs),
            0x65 => Some(SegmentOverride::Gs),
            _ => None,
        }
    }
}

/// Which emulator an instruction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// VEX-encoded BMI1/BMI2 integer bit manipulation.
    BitManipulation,
    /// SSE4.2 `PCMPxSTRx` packed text comparison (legacy or VEX.128).
    StringCompare,
}

/// Everything decoded from one faulting instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionDescriptor {
    pub mode: DecodeMode,
    pub vex: Option<VexForm>,
    pub ext: ExtBits,
    /// VEX.vvvv, already un-inverted. Zero for legacy encodings.
    pub vvvv: u8,
    pub prefix: SimdPrefix,
    pub map: OpcodeMap,
    pub opcode: u8,
    pub modrm: ModRm,
    pub sib: Option<Sib>,
    pub disp: Option<Displacement>,
    pub imm: Option<u8>,
    pub segment: Option<SegmentOverride>,
    pub address_size_override: bool,
    pub family: Family,
    /// Total bytes consumed, prefixes through immediate.
    pub len: u8,
}

impl InstructionDescriptor {
    pub fn is_vex(&self) -> bool {
        self.vex.is_some()
    }

    /// Full register number selected by ModRM.reg.
    pub fn reg_index(&self) -> u8 {
        self.modrm.reg | ((self.ext.r as u8) << 3)
    }

    /// Full register number selected by ModRM.rm (only meaningful when `mod == 11`).
    pub fn rm_index(&self) -> u8 {
        self.modrm.rm | ((self.ext.b as u8) << 3)
    }

    /// `REX.W`/`VEX.W` in long mode. The bit is ignored elsewhere.
    pub fn wide(&self) -> bool {
        self.mode == DecodeMode::Bits64 && self.ext.w
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek_at(&self, offset: usize) -> Result<u8, DecodeError> {
        let at = self.pos + offset;
        if at >= MAX_INST_LEN {
            return Err(DecodeError::TooLong);
        }
        self.bytes.get(at).copied().ok_or(DecodeError::UnexpectedEof)
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.peek_at(0)
    }

    fn next(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn next_i32(&mut self) -> Result<i32, DecodeError> {
        let mut raw = [0u8; 4];
        for b in raw.iter_mut() {
            *b = self.next()?;
        }
        Ok(i32::from_le_bytes(raw))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LegacyPrefixes {
    operand_size_override: bool,
    address_size_override: bool,
    rep: Option<SimdPrefix>,
    lock: bool,
    segment: Option<SegmentOverride>,
    rex: Option<u8>,
}

impl LegacyPrefixes {
    fn simd_prefix(&self) -> SimdPrefix {
        // F2/F3 take precedence over 66 as the mandatory prefix.
        match self.rep {
            Some(p) => p,
            None if self.operand_size_override => SimdPrefix::P66,
            None => SimdPrefix::None,
        }
    }

    /// VEX #UDs when preceded by any of these.
    fn conflicts_with_vex(&self) -> bool {
        self.operand_size_override || self.rep.is_some() || self.lock || self.rex.is_some()
    }
}

fn scan_prefixes(cur: &mut Cursor<'_>, mode: DecodeMode) -> Result<LegacyPrefixes, DecodeError> {
    let mut prefixes = LegacyPrefixes::default();

    loop {
        let b = cur.peek()?;

        // REX only counts when it is the last prefix before the opcode.
        if mode == DecodeMode::Bits64 && (0x40..=0x4F).contains(&b) {
            prefixes.rex = Some(b);
            cur.pos += 1;
            continue;
        }

        if let Some(seg) = SegmentOverride::from_prefix(b) {
            // Long mode only honours FS/GS; the others are accepted but ignored and must not
            // clear an earlier FS/GS override.
            match (mode, seg) {
                (DecodeMode::Bits64, SegmentOverride::Fs | SegmentOverride::Gs) => {
                    prefixes.segment = Some(seg);
                }
                (DecodeMode::Bits64, _) => {}
                _ => prefixes.segment = Some(seg),
            }
        } else {
            match b {
                0x66 => prefixes.operand_size_override = true,
                0x67 => prefixes.address_size_override = true,
                0xF2 => prefixes.rep = Some(SimdPrefix::PF2),
                0xF3 => prefixes.rep = Some(SimdPrefix::PF3),
                0xF0 => prefixes.lock = true,
                _ => break,
            }
        }

        prefixes.rex = None;
        cur.pos += 1;
    }

    Ok(prefixes)
}

/// `C4`/`C5` always start a VEX prefix in long mode. Elsewhere they are LES/LDS unless the
/// following byte has `mod == 11`, which those legacy opcodes cannot encode.
fn starts_vex(cur: &Cursor<'_>, mode: DecodeMode) -> Result<bool, DecodeError> {
    let lead = cur.peek()?;
    if !matches!(lead, 0xC4 | 0xC5) {
        return Ok(false);
    }
    if mode == DecodeMode::Bits64 {
        return Ok(true);
    }
    Ok((cur.peek_at(1)? & 0xC0) == 0xC0)
}

struct VexFields {
    form: VexForm,
    ext: ExtBits,
    vvvv: u8,
    long: bool,
    prefix: SimdPrefix,
    map: OpcodeMap,
}

fn parse_vex(cur: &mut Cursor<'_>, mode: DecodeMode) -> Result<VexFields, DecodeError> {
    let lead = cur.next()?;
    let b1 = cur.next()?;

    let mut fields = if lead == 0xC5 {
        VexFields {
            form: VexForm::TwoByte,
            ext: ExtBits {
                r: (b1 & 0x80) == 0,
                ..ExtBits::default()
            },
            vvvv: (!b1 >> 3) & 0xF,
            long: (b1 & 0x04) != 0,
            prefix: SimdPrefix::from_pp(b1),
            map: OpcodeMap::Map0F,
        }
    } else {
        let b2 = cur.next()?;
        VexFields {
            form: VexForm::ThreeByte,
            ext: ExtBits {
                r: (b1 & 0x80) == 0,
                x: (b1 & 0x40) == 0,
                b: (b1 & 0x20) == 0,
                w: (b2 & 0x80) != 0,
            },
            vvvv: (!b2 >> 3) & 0xF,
            long: (b2 & 0x04) != 0,
            prefix: SimdPrefix::from_pp(b2),
            map: OpcodeMap::from_mmmmm(b1).ok_or(DecodeError::NotRecognized)?,
        }
    };

    if mode == DecodeMode::Bits32 {
        // Only eight registers are addressable outside long mode.
        fields.ext.b = false;
        fields.vvvv &= 0x7;
    }

    Ok(fields)
}

fn recognize(vex: bool, map: OpcodeMap, opcode: u8) -> Option<Family> {
    match (vex, map, opcode) {
        (true, OpcodeMap::Map0F38, 0xF2 | 0xF3 | 0xF5 | 0xF6 | 0xF7) => {
            Some(Family::BitManipulation)
        }
        (true, OpcodeMap::Map0F3A, 0xF0) => Some(Family::BitManipulation),
        (_, OpcodeMap::Map0F3A, 0x60..=0x63) => Some(Family::StringCompare),
        _ => None,
    }
}

/// Decode a single instruction from the start of `bytes`.
///
/// At most [`MAX_INST_LEN`] bytes are examined. The returned descriptor's `len`
/// counts every byte consumed, so `rip + len` is the next instruction.
pub fn decode(bytes: &[u8], mode: DecodeMode) -> Result<InstructionDescriptor, DecodeError> {
    let mut cur = Cursor::new(bytes);
    let legacy = scan_prefixes(&mut cur, mode)?;

    if legacy.lock {
        return Err(DecodeError::NotRecognized);
    }
    if mode == DecodeMode::Bits32 && legacy.address_size_override {
        // 16-bit addressing forms are not supported.
        return Err(DecodeError::NotRecognized);
    }

    let (vex, ext, vvvv, prefix, map) = if starts_vex(&cur, mode)? {
        if legacy.conflicts_with_vex() {
            return Err(DecodeError::NotRecognized);
        }
        let fields = parse_vex(&mut cur, mode)?;
        if fields.long {
            return Err(DecodeError::NotRecognized);
        }
        (
            Some(fields.form),
            fields.ext,
            fields.vvvv,
            fields.prefix,
            fields.map,
        )
    } else {
        if cur.next()? != 0x0F {
            return Err(DecodeError::NotRecognized);
        }
        let map = match cur.peek()? {
            0x38 => {
                cur.pos += 1;
                OpcodeMap::Map0F38
            }
            0x3A => {
                cur.pos += 1;
                OpcodeMap::Map0F3A
            }
            _ => OpcodeMap::Map0F,
        };
        let ext = legacy.rex.map(ExtBits::from_rex).unwrap_or_default();
        (None, ext, 0, legacy.simd_prefix(), map)
    };

    let opcode = cur.next()?;
    let family = recognize(vex.is_some(), map, opcode).ok_or(DecodeError::NotRecognized)?;

    let modrm = ModRm::from_byte(cur.next()?);
    let mut sib = None;
    let mut disp = None;
    if !modrm.is_register() {
        if modrm.rm == 4 {
            sib = Some(Sib::from_byte(cur.next()?));
        }
        let no_base = match sib {
            Some(s) => s.base == 5,
            None => modrm.rm == 5,
        };
        disp = match modrm.md {
            0 if no_base => Some(Displacement::Disp32(cur.next_i32()?)),
            0 => None,
            1 => Some(Displacement::Disp8(cur.next()? as i8)),
            _ => Some(Displacement::Disp32(cur.next_i32()?)),
        };
    }

    // Every recognized 0F3A opcode carries an imm8.
    let imm = if map == OpcodeMap::Map0F3A {
        Some(cur.next()?)
    } else {
        None
    };

    Ok(InstructionDescriptor {
        mode,
        vex,
        ext,
        vvvv,
        prefix,
        map,
        opcode,
        modrm,
        sib,
        disp,
        imm,
        segment: legacy.segment,
        address_size_override: legacy.address_size_override,
        family,
        len: cur.pos as u8,
    })
}
