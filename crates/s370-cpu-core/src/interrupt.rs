//! PSW store/load and the interrupt entry sequence.
//!
//! `psw_interrupt` is the single trap path: store the old PSW at the class
//! vector, then load the new PSW from vector + 0x40. Low-core accesses here
//! are physical; they can only fail if storage is smaller than the
//! architected low core, which the caller treats as fatal.

use s370_mmu::{InvalidAddress, MainStorage, AMASK};

use crate::exception::IRC_PER;
use crate::psw::{self, PswFlags};
use crate::state::Cpu;

impl<M: MainStorage> Cpu<M> {
    /// Store the current PSW at `vector` and the interruption code at the
    /// class-specific low-core location (EC mode).
    pub(crate) fn store_psw(&mut self, vector: u32, mut code: u16) -> Result<(), InvalidAddress> {
        if vector == psw::O_PPSW && self.per_code != 0 {
            code |= IRC_PER;
            self.mem
                .put_word_mask(psw::PER_CODE, self.per_code as u32, 0x0000_FFFF)?;
            self.mem.put_word(psw::PER_ADDR, self.per_addr & AMASK)?;
            self.cycles += 2;
        }

        let (w1, w2) = if self.ec_mode() {
            let w1 = ((self.per_enb as u32) << 30)
                | ((self.page_enb as u32) << 26)
                | ((self.irq_enb as u32) << 25)
                | ((self.ext_enb as u32) << 24)
                | ((self.st_key as u32) << 20)
                | ((self.flags.bits() as u32) << 16)
                | ((self.cc as u32) << 12)
                | ((self.prog_mask as u32) << 8);
            let w2 = self.pc & AMASK;
            let long_code = ((self.ilc as u32) << 17) | code as u32;
            match vector {
                psw::O_EPSW => {
                    self.mem
                        .put_word_mask(psw::EXT_CODE, (code as u32) << 16, 0xFFFF_0000)?;
                    self.cycles += 1;
                }
                psw::O_SPSW => {
                    self.mem.put_word(psw::SVC_CODE, long_code)?;
                    self.cycles += 1;
                }
                psw::O_PPSW => {
                    self.mem.put_word(psw::PROG_CODE, long_code)?;
                    self.cycles += 1;
                }
                psw::O_IOPSW => {
                    self.mem.put_word(psw::IO_CODE, code as u32)?;
                    self.cycles += 1;
                }
                _ => {}
            }
            (w1, w2)
        } else {
            let mut mask = ((self.sys_mask >> 8) as u32) & 0xFC;
            if self.sys_mask & 0x03FF != 0 {
                mask |= 0x02;
            }
            if self.ext_enb {
                mask |= 0x01;
            }
            let w1 = (mask << 24)
                | ((self.st_key as u32) << 20)
                | ((self.flags.bits() as u32) << 16)
                | code as u32;
            let w2 = ((self.ilc as u32) << 30)
                | ((self.cc as u32) << 28)
                | ((self.prog_mask as u32) << 24)
                | (self.pc & AMASK);
            (w1, w2)
        };

        self.mem.put_word(vector, w1)?;
        self.mem.put_word(vector + 4, w2)?;
        self.cycles += 2;
        Ok(())
    }

    /// Install a PSW image. Reserved must-be-zero violations in EC mode
    /// are latched and raise Specification at the next cycle boundary.
    pub fn lpsw(&mut self, w1: u32, w2: u32) {
        self.st_key = ((w1 >> 20) & 0xF) as u8;
        self.flags = PswFlags::from_bits_truncate(((w1 >> 16) & 0xF) as u8);

        if self.ec_mode() {
            self.per_enb = w1 & 0x4000_0000 != 0;
            self.page_enb = w1 & 0x0400_0000 != 0;
            self.irq_enb = w1 & 0x0200_0000 != 0;
            self.ext_enb = w1 & 0x0100_0000 != 0;
            self.cc = ((w1 >> 12) & 0x3) as u8;
            self.prog_mask = ((w1 >> 8) & 0xF) as u8;
            self.sys_mask = if self.irq_enb {
                (self.cregs[2] >> 16) as u16
            } else {
                0
            };
            if w1 & psw::EC_W1_MBZ != 0 || w2 & psw::EC_W2_MBZ != 0 {
                self.psw_spec_pending = true;
            }
        } else {
            let mask = w1 >> 24;
            self.sys_mask = (((mask & 0xFC) as u16) << 8)
                | if mask & 0x02 != 0 {
                    (self.cregs[2] & 0x03FF) as u16
                } else {
                    0
                };
            self.ext_enb = mask & 0x01 != 0;
            self.irq_enb = self.sys_mask != 0;
            self.page_enb = false;
            self.per_enb = false;
            self.cc = ((w2 >> 28) & 0x3) as u8;
            self.prog_mask = ((w2 >> 24) & 0xF) as u8;
        }
        self.dat.set_enabled(self.page_enb);
        self.pc = w2 & AMASK;
    }

    /// Full trap: old PSW out, new PSW in. PER state is consumed by the
    /// program class.
    pub(crate) fn psw_interrupt(&mut self, vector: u32, code: u16) -> Result<(), InvalidAddress> {
        self.store_psw(vector, code)?;
        if vector == psw::O_PPSW {
            self.per_code = 0;
            self.per_reg_mod = 0;
        }
        let w1 = self.mem.get_word(vector + 0x40)?;
        let w2 = self.mem.get_word(vector + 0x44)?;
        self.cycles += 2;
        self.lpsw(w1, w2);
        Ok(())
    }
}
