//! Storage-to-storage operations: moves, logical SS ops, translate, and
//! the long move/compare pair.
//!
//! SS stores validate the whole destination range with `test_access`
//! before the first byte is committed, so a protection or translation
//! fault leaves the destination untouched.

use s370_mmu::{MainStorage, AMASK};

use crate::exception::Exception;
use crate::state::{Cpu, StepInfo};

impl<M: MainStorage> Cpu<M> {
    pub(super) fn op_mvc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let len = step.reg as u32;
        self.test_access(step.address2, len, false)?;
        self.test_access(step.address1, len, true)?;
        // Byte-by-byte, ascending: overlapping moves propagate.
        for i in 0..=len {
            let b = self.read_byte(step.address2.wrapping_add(i))?;
            self.write_byte(step.address1.wrapping_add(i), b)?;
        }
        Ok(())
    }

    pub(super) fn op_mvn(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let len = step.reg as u32;
        self.test_access(step.address2, len, false)?;
        self.test_access(step.address1, len, true)?;
        for i in 0..=len {
            let src = self.read_byte(step.address2.wrapping_add(i))?;
            let dst = self.read_byte(step.address1.wrapping_add(i))?;
            self.write_byte(step.address1.wrapping_add(i), (dst & 0xF0) | (src & 0x0F))?;
        }
        Ok(())
    }

    pub(super) fn op_mvz(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let len = step.reg as u32;
        self.test_access(step.address2, len, false)?;
        self.test_access(step.address1, len, true)?;
        for i in 0..=len {
            let src = self.read_byte(step.address2.wrapping_add(i))?;
            let dst = self.read_byte(step.address1.wrapping_add(i))?;
            self.write_byte(step.address1.wrapping_add(i), (dst & 0x0F) | (src & 0xF0))?;
        }
        Ok(())
    }

    fn ss_logical(
        &mut self,
        step: &StepInfo,
        op: impl Fn(u8, u8) -> u8,
    ) -> Result<(), Exception> {
        let len = step.reg as u32;
        self.test_access(step.address2, len, false)?;
        self.test_access(step.address1, len, true)?;
        let mut nonzero = false;
        for i in 0..=len {
            let src = self.read_byte(step.address2.wrapping_add(i))?;
            let dst = self.read_byte(step.address1.wrapping_add(i))?;
            let r = op(dst, src);
            nonzero |= r != 0;
            self.write_byte(step.address1.wrapping_add(i), r)?;
        }
        self.cc = nonzero as u8;
        Ok(())
    }

    pub(super) fn op_nc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.ss_logical(step, |d, s| d & s)
    }

    pub(super) fn op_oc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.ss_logical(step, |d, s| d | s)
    }

    pub(super) fn op_xc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.ss_logical(step, |d, s| d ^ s)
    }

    pub(super) fn op_clc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        for i in 0..=step.reg as u32 {
            let a = self.read_byte(step.address1.wrapping_add(i))?;
            let b = self.read_byte(step.address2.wrapping_add(i))?;
            match a.cmp(&b) {
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Less => {
                    self.cc = 1;
                    return Ok(());
                }
                std::cmp::Ordering::Greater => {
                    self.cc = 2;
                    return Ok(());
                }
            }
        }
        self.cc = 0;
        Ok(())
    }

    pub(super) fn op_tr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let len = step.reg as u32;
        self.test_access(step.address1, len, true)?;
        for i in 0..=len {
            let b = self.read_byte(step.address1.wrapping_add(i))?;
            let t = self.read_byte(step.address2.wrapping_add(b as u32))?;
            self.write_byte(step.address1.wrapping_add(i), t)?;
        }
        Ok(())
    }

    pub(super) fn op_trt(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let len = step.reg as u32;
        for i in 0..=len {
            let b = self.read_byte(step.address1.wrapping_add(i))?;
            let function = self.read_byte(step.address2.wrapping_add(b as u32))?;
            if function != 0 {
                let hit = step.address1.wrapping_add(i) & AMASK;
                let r1 = (self.regs[1] & 0xFF00_0000) | hit;
                self.set_reg(1, r1);
                let r2 = (self.regs[2] & 0xFFFF_FF00) | function as u32;
                self.set_reg(2, r2);
                self.cc = if i == len { 2 } else { 1 };
                return Ok(());
            }
        }
        self.cc = 0;
        Ok(())
    }

    /// MVCL: both operands are even/odd register pairs {address, length};
    /// the source pair's high byte is the pad. Registers reflect progress
    /// even when a byte access faults mid-move.
    pub(super) fn op_mvcl(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.r1 & 1 != 0 || step.r2 & 1 != 0 {
            return Err(Exception::Specification);
        }
        let mut daddr = self.regs[step.r1 as usize] & AMASK;
        let dlen = self.regs[(step.r1 + 1) as usize] & AMASK;
        let mut saddr = self.regs[step.r2 as usize] & AMASK;
        let slen = self.regs[(step.r2 + 1) as usize] & AMASK;
        let pad = (self.regs[(step.r2 + 1) as usize] >> 24) as u8;

        // Destructive overlap: destination starts inside the source.
        if slen > 0 && dlen > 0 && daddr > saddr && daddr < saddr.wrapping_add(slen.min(dlen)) {
            self.cc = 3;
            return Ok(());
        }

        let mut moved = 0u32;
        let mut taken = 0u32;
        let result = loop {
            if moved >= dlen {
                break Ok(());
            }
            let b = if taken < slen {
                match self.read_byte(saddr) {
                    Ok(b) => {
                        taken += 1;
                        saddr = saddr.wrapping_add(1) & AMASK;
                        b
                    }
                    Err(e) => break Err(e),
                }
            } else {
                pad
            };
            if let Err(e) = self.write_byte(daddr, b) {
                break Err(e);
            }
            daddr = daddr.wrapping_add(1) & AMASK;
            moved += 1;
        };

        self.set_reg(step.r1, daddr);
        let dhold = self.regs[(step.r1 + 1) as usize] & 0xFF00_0000;
        self.set_reg(step.r1 + 1, dhold | ((dlen - moved) & AMASK));
        self.set_reg(step.r2, saddr);
        self.set_reg(step.r2 + 1, ((pad as u32) << 24) | ((slen - taken) & AMASK));

        result?;
        self.cc = match dlen.cmp(&slen) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
        Ok(())
    }

    pub(super) fn op_clcl(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.r1 & 1 != 0 || step.r2 & 1 != 0 {
            return Err(Exception::Specification);
        }
        let mut addr1 = self.regs[step.r1 as usize] & AMASK;
        let mut len1 = self.regs[(step.r1 + 1) as usize] & AMASK;
        let mut addr2 = self.regs[step.r2 as usize] & AMASK;
        let mut len2 = self.regs[(step.r2 + 1) as usize] & AMASK;
        let pad = (self.regs[(step.r2 + 1) as usize] >> 24) as u8;

        let mut cc = 0u8;
        let result = loop {
            if len1 == 0 && len2 == 0 {
                break Ok(());
            }
            let a = if len1 > 0 {
                match self.read_byte(addr1) {
                    Ok(b) => b,
                    Err(e) => break Err(e),
                }
            } else {
                pad
            };
            let b = if len2 > 0 {
                match self.read_byte(addr2) {
                    Ok(b) => b,
                    Err(e) => break Err(e),
                }
            } else {
                pad
            };
            match a.cmp(&b) {
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Less => {
                    cc = 1;
                    break Ok(());
                }
                std::cmp::Ordering::Greater => {
                    cc = 2;
                    break Ok(());
                }
            }
            if len1 > 0 {
                addr1 = addr1.wrapping_add(1) & AMASK;
                len1 -= 1;
            }
            if len2 > 0 {
                addr2 = addr2.wrapping_add(1) & AMASK;
                len2 -= 1;
            }
        };

        self.set_reg(step.r1, addr1);
        let hold1 = self.regs[(step.r1 + 1) as usize] & 0xFF00_0000;
        self.set_reg(step.r1 + 1, hold1 | len1);
        self.set_reg(step.r2, addr2);
        self.set_reg(step.r2 + 1, ((pad as u32) << 24) | len2);

        result?;
        self.cc = cc;
        Ok(())
    }
}
