//! Architecturally defined x86 exception vectors, as delivered by the host's
//! trap entry.

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    DivideError = 0,          // #DE
    Debug = 1,                // #DB
    NonMaskableInterrupt = 2, // NMI
    Breakpoint = 3,           // #BP
    Overflow = 4,             // #OF
    BoundRangeExceeded = 5,   // #BR
    InvalidOpcode = 6,        // #UD
    DeviceNotAvailable = 7,   // #NM
    DoubleFault = 8,          // #DF
    InvalidTss = 10,          // #TS
    SegmentNotPresent = 11,   // #NP
    StackFault = 12,          // #SS
    GeneralProtection = 13,   // #GP
    PageFault = 14,           // #PF
    X87Fpu = 16,              // #MF
    AlignmentCheck = 17,      // #AC
    MachineCheck = 18,        // #MC
    SimdFloatingPoint = 19,   // #XM/#XF
    Virtualization = 20,      // #VE
    ControlProtection = 21,   // #CP
}

impl Exception {
    #[inline]
    pub const fn vector(self) -> u8 {
        self as u8
    }

    /// Map a raw trap number back to its exception; reserved and
    /// interrupt vectors return `None`.
    pub const fn from_vector(vector: u8) -> Option<Self> {
        Some(match vector {
            0 => Exception::DivideError,
            1 => Exception::Debug,
            2 => Exception::NonMaskableInterrupt,
            3 => Exception::Breakpoint,
            4 => Exception::Overflow,
            5 => Exception::BoundRangeExceeded,
            6 => Exception::InvalidOpcode,
            7 => Exception::DeviceNotAvailable,
            8 => Exception::DoubleFault,
            10 => Exception::InvalidTss,
            11 => Exception::SegmentNotPresent,
            12 => Exception::StackFault,
            13 => Exception::GeneralProtection,
            14 => Exception::PageFault,
            16 => Exception::X87Fpu,
            17 => Exception::AlignmentCheck,
            18 => Exception::MachineCheck,
            19 => Exception::SimdFloatingPoint,
            20 => Exception::Virtualization,
            21 => Exception::ControlProtection,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Exception;

    #[test]
    fn vectors_round_trip() {
        for v in 0..=255u8 {
            if let Some(e) = Exception::from_vector(v) {
                assert_eq!(e.vector(), v);
            }
        }
        assert_eq!(Exception::from_vector(6), Some(Exception::InvalidOpcode));
        assert_eq!(Exception::from_vector(9), None);
        assert_eq!(Exception::from_vector(32), None);
    }
}
