use opemu_decoder::Family;

/// Which instruction families the dispatcher emulates.
///
/// A disabled family is forwarded to the host exactly like an unrecognized
/// opcode, so the process sees the usual SIGILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorConfig {
    pub bit_manipulation: bool,
    pub string_compare: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            bit_manipulation: true,
            string_compare: true,
        }
    }
}

impl EmulatorConfig {
    pub fn allows(&self, family: Family) -> bool {
        match family {
            Family::BitManipulation => self.bit_manipulation,
            Family::StringCompare => self.string_compare,
        }
    }
}
