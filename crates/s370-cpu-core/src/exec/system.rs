//! Supervisor-state instructions: PSW and key manipulation, control
//! registers, translation queries, the B2 group, and I/O delegation.

use s370_mmu::{LraOutcome, MainStorage, AMASK, KEY_CHANGE, KEY_REFERENCE};

use crate::chan::Channel;
use crate::exception::Exception;
use crate::exec::fixed::reg_range;
use crate::psw;
use crate::state::{Cpu, StepInfo};
use crate::timer::{compose, decompose};

/// STIDP value: version 0, serial 000001, model 0145.
const CPU_ID: u64 = 0x0000_0001_0145_0000;

impl<M: MainStorage> Cpu<M> {
    /// Current PSW system-mask byte (the SSM/STNSM/STOSM operand).
    fn sys_mask_byte(&self) -> u8 {
        if self.ec_mode() {
            ((self.per_enb as u8) << 6)
                | ((self.page_enb as u8) << 2)
                | ((self.irq_enb as u8) << 1)
                | self.ext_enb as u8
        } else {
            let mut b = ((self.sys_mask >> 8) as u8) & 0xFC;
            if self.sys_mask & 0x03FF != 0 {
                b |= 0x02;
            }
            if self.ext_enb {
                b |= 0x01;
            }
            b
        }
    }

    fn install_sys_mask(&mut self, b: u8) -> Result<(), Exception> {
        if self.ec_mode() {
            if b & 0xB8 != 0 {
                return Err(Exception::Specification);
            }
            self.per_enb = b & 0x40 != 0;
            self.page_enb = b & 0x04 != 0;
            self.irq_enb = b & 0x02 != 0;
            self.ext_enb = b & 0x01 != 0;
            self.sys_mask = if self.irq_enb {
                (self.cregs[2] >> 16) as u16
            } else {
                0
            };
        } else {
            self.sys_mask = (((b & 0xFC) as u16) << 8)
                | if b & 0x02 != 0 {
                    (self.cregs[2] & 0x03FF) as u16
                } else {
                    0
                };
            self.ext_enb = b & 0x01 != 0;
            self.irq_enb = self.sys_mask != 0;
        }
        self.dat.set_enabled(self.page_enb);
        Ok(())
    }

    pub(super) fn op_ssm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        if self.cregs[0] & 0x4000_0000 != 0 {
            return Err(Exception::SpecialOperation);
        }
        let b = self.read_byte(step.address1)?;
        self.install_sys_mask(b)
    }

    pub(super) fn op_stnsm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        let current = self.sys_mask_byte();
        self.write_byte(step.address1, current)?;
        self.install_sys_mask(current & step.reg)
    }

    pub(super) fn op_stosm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        let current = self.sys_mask_byte();
        self.write_byte(step.address1, current)?;
        self.install_sys_mask(current | step.reg)
    }

    pub(super) fn op_lpsw(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        if step.address1 & 7 != 0 {
            return Err(Exception::Specification);
        }
        let w1 = self.read_full(step.address1)?;
        let w2 = self.read_full(step.address1 + 4)?;
        self.lpsw(w1, w2);
        Ok(())
    }

    pub(super) fn op_ssk(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        let addr = step.src2 & AMASK;
        if addr & 0x0F != 0 {
            return Err(Exception::Specification);
        }
        if !self.mem.check_addr(addr) {
            return Err(Exception::Addressing);
        }
        self.mem.put_key(addr, step.src1 as u8 & 0xF8);
        Ok(())
    }

    pub(super) fn op_isk(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        let addr = step.src2 & AMASK;
        if addr & 0x0F != 0 {
            return Err(Exception::Specification);
        }
        if !self.mem.check_addr(addr) {
            return Err(Exception::Addressing);
        }
        let key = self.mem.get_key(addr) & 0xF8;
        self.set_reg(step.r1, (step.src1 & 0xFFFF_FF00) | key as u32);
        Ok(())
    }

    pub(super) fn op_svc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.psw_interrupt(psw::O_SPSW, step.reg as u16)
            .map_err(Exception::from)
    }

    pub(super) fn op_lctl(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        if step.address1 & 3 != 0 {
            return Err(Exception::Specification);
        }
        let mut addr = step.address1;
        for r in reg_range(step.r1, step.r2) {
            let v = self.read_full(addr)?;
            self.set_cr(r, v);
            addr = addr.wrapping_add(4);
        }
        Ok(())
    }

    pub(super) fn op_stctl(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        if step.address1 & 3 != 0 {
            return Err(Exception::Specification);
        }
        let mut addr = step.address1;
        for r in reg_range(step.r1, step.r2) {
            self.write_full(addr, self.cregs[r])?;
            addr = addr.wrapping_add(4);
        }
        Ok(())
    }

    pub(super) fn op_lra(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        let outcome = self.dat.lookup(&mut self.mem, step.address1)?;
        let (cc, value) = match outcome {
            LraOutcome::Mapped(phys) => (0, phys),
            LraOutcome::SegmentInvalid(ste) => (1, ste),
            LraOutcome::PageInvalid(pte) => (2, pte),
            LraOutcome::Length(ste) => (3, ste),
        };
        self.set_reg(step.r1, value);
        self.cc = cc;
        Ok(())
    }

    pub(super) fn op_mc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.reg & 0xF0 != 0 {
            return Err(Exception::Specification);
        }
        let class = step.reg as u32;
        if self.cregs[8] & (0x8000 >> class) == 0 {
            return Ok(());
        }
        self.mem
            .put_word_mask(psw::MONITOR_CLASS, class << 16, 0xFFFF_0000)?;
        self.cycles += 1;
        Err(Exception::Monitor)
    }

    pub(super) fn op_diag(&mut self, _step: &StepInfo) -> Result<(), Exception> {
        self.privileged()?;
        self.psw_interrupt(psw::O_MPSW, 0).map_err(Exception::from)
    }

    pub(super) fn op_sio(
        &mut self,
        chan: &mut dyn Channel,
        step: &StepInfo,
    ) -> Result<(), Exception> {
        self.privileged()?;
        self.cc = chan.start_io((step.address1 & 0xFFFF) as u16, &mut self.mem);
        Ok(())
    }

    pub(super) fn op_tio(
        &mut self,
        chan: &mut dyn Channel,
        step: &StepInfo,
    ) -> Result<(), Exception> {
        self.privileged()?;
        self.cc = chan.test_io((step.address1 & 0xFFFF) as u16, &mut self.mem);
        Ok(())
    }

    pub(super) fn op_hio(
        &mut self,
        chan: &mut dyn Channel,
        step: &StepInfo,
    ) -> Result<(), Exception> {
        self.privileged()?;
        self.cc = chan.halt_io((step.address1 & 0xFFFF) as u16, &mut self.mem);
        Ok(())
    }

    pub(super) fn op_tch(
        &mut self,
        chan: &mut dyn Channel,
        step: &StepInfo,
    ) -> Result<(), Exception> {
        self.privileged()?;
        self.cc = chan.test_chan((step.address1 & 0xFFFF) as u16);
        Ok(())
    }

    /// Second-level dispatch for the 0xB2 opcode group.
    pub(super) fn op_b2(&mut self, step: &StepInfo) -> Result<(), Exception> {
        match step.reg {
            // Channel-set connect/disconnect: one channel set, number 0.
            0x00 | 0x01 => {
                self.privileged()?;
                self.cc = if step.address1 & 0xFFFF == 0 { 0 } else { 3 };
                Ok(())
            }
            0x02 => {
                self.privileged()?;
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                self.write_dword(step.address1, CPU_ID)
            }
            0x03 => {
                self.privileged()?;
                self.mem.put_word(psw::CHAN_ID, 0)?;
                self.cycles += 1;
                self.cc = 0;
                Ok(())
            }
            0x04 => {
                self.privileged()?;
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                let v = self.read_dword(step.address1)?;
                self.tod_clock = decompose(v);
                self.tod_set = true;
                self.recheck_tod_irq();
                self.cc = 0;
                Ok(())
            }
            0x05 => {
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                self.write_dword(step.address1, compose(self.tod_clock))?;
                self.cc = if self.tod_set { 0 } else { 1 };
                Ok(())
            }
            0x06 => {
                self.privileged()?;
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                let v = self.read_dword(step.address1)?;
                self.clk_cmp = decompose(v);
                self.recheck_tod_irq();
                Ok(())
            }
            0x07 => {
                self.privileged()?;
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                self.write_dword(step.address1, compose(self.clk_cmp))
            }
            0x08 => {
                self.privileged()?;
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                let v = self.read_dword(step.address1)?;
                self.cpu_timer = decompose(v);
                Ok(())
            }
            0x09 => {
                self.privileged()?;
                if step.address1 & 7 != 0 {
                    return Err(Exception::Specification);
                }
                self.write_dword(step.address1, compose(self.cpu_timer))
            }
            0x0A => {
                self.privileged()?;
                self.st_key = ((step.address1 >> 4) & 0xF) as u8;
                Ok(())
            }
            0x0B => {
                self.privileged()?;
                let r2 = (self.regs[2] & 0xFFFF_FF00) | ((self.st_key as u32) << 4);
                self.set_reg(2, r2);
                Ok(())
            }
            0x0D => {
                self.privileged()?;
                self.dat.flush();
                Ok(())
            }
            0x13 => {
                self.privileged()?;
                let addr = step.address1;
                if !self.mem.check_addr(addr) {
                    return Err(Exception::Addressing);
                }
                let key = self.mem.get_key(addr);
                self.cc = (((key & KEY_REFERENCE != 0) as u8) << 1)
                    | (key & KEY_CHANGE != 0) as u8;
                self.mem.put_key(addr, key & !KEY_REFERENCE);
                Ok(())
            }
            // SPX/STPX/STAP: no multiprocessing feature installed.
            _ => Err(Exception::Operation),
        }
    }
}
