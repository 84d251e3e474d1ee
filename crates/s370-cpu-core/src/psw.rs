//! PSW layouts and the fixed low-core assignments.

use bitflags::bitflags;

bitflags! {
    /// The AMWP nibble of the PSW (bits 12-15 of word 1 in both modes).
    /// Bit 12 selects the EC-mode layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PswFlags: u8 {
        const EC = 0x8;
        const MCHECK = 0x4;
        const WAIT = 0x2;
        const PROBLEM = 0x1;
    }
}

// Old-PSW vectors; the matching new PSW lives at vector + 0x40.
pub const O_EPSW: u32 = 0x18;
pub const O_SPSW: u32 = 0x20;
pub const O_PPSW: u32 = 0x28;
pub const O_MPSW: u32 = 0x30;
pub const O_IOPSW: u32 = 0x38;

pub const CSW: u32 = 0x40;
pub const CAW: u32 = 0x48;
pub const INTERVAL_TIMER: u32 = 0x50;

// EC-mode interruption-code assignments.
pub const EXT_CODE: u32 = 0x84;
pub const SVC_CODE: u32 = 0x88;
pub const PROG_CODE: u32 = 0x8C;
pub const TRANS_EXC: u32 = 0x90;
pub const MONITOR_CLASS: u32 = 0x94;
pub const PER_CODE: u32 = 0x96;
pub const PER_ADDR: u32 = 0x98;
pub const CHAN_ID: u32 = 0xA8;
pub const IO_CODE: u32 = 0xB8;
pub const IPL_DEV: u32 = 0xBA;

// External-interruption codes.
pub const EXT_IRQ_CODE: u16 = 0x0040;
pub const INTERVAL_IRQ_CODE: u16 = 0x0080;
pub const CPU_TIMER_IRQ_CODE: u16 = 0x1005;
pub const CLOCK_CMP_IRQ_CODE: u16 = 0x1004;

// Must-be-zero bits of an EC-mode PSW.
pub const EC_W1_MBZ: u32 = 0xB800_C0FF;
pub const EC_W2_MBZ: u32 = 0xFF00_0000;
