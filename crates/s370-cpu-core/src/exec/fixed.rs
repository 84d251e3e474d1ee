//! Fixed-point binary arithmetic, logical, shift, and the
//! compare-and-swap family.

use s370_mmu::MainStorage;

use crate::exception::Exception;
use crate::state::{Cpu, StepInfo};

/// Register range for LM/STM/LCTL/STCTL, wrapping 15 -> 0 when R1 > R3.
pub(crate) fn reg_range(r1: u8, r3: u8) -> impl Iterator<Item = usize> {
    let count = ((r3.wrapping_sub(r1)) & 0xF) as usize + 1;
    (r1 as usize..).map(|r| r & 0xF).take(count)
}

impl<M: MainStorage> Cpu<M> {
    pub(crate) fn cc_signed(&mut self, value: u32) {
        self.cc = match (value as i32).cmp(&0) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
    }

    fn fixed_overflow(&mut self) -> Result<(), Exception> {
        self.cc = 3;
        if self.prog_mask & 0x8 != 0 {
            Err(Exception::FixedOverflow)
        } else {
            Ok(())
        }
    }

    pub(super) fn op_lr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, step.src2);
        Ok(())
    }

    pub(super) fn op_l(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, step.src2);
        Ok(())
    }

    pub(super) fn op_lh(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, step.src2);
        Ok(())
    }

    pub(super) fn op_ltr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, step.src2);
        self.cc_signed(step.src2);
        Ok(())
    }

    pub(super) fn op_lpr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let v = step.src2 as i32;
        if v == i32::MIN {
            self.set_reg(step.r1, v as u32);
            return self.fixed_overflow();
        }
        let r = v.unsigned_abs();
        self.set_reg(step.r1, r);
        self.cc = if r == 0 { 0 } else { 2 };
        Ok(())
    }

    pub(super) fn op_lnr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let v = step.src2 as i32;
        let r = if v > 0 { -v } else { v };
        self.set_reg(step.r1, r as u32);
        self.cc = if r == 0 { 0 } else { 1 };
        Ok(())
    }

    pub(super) fn op_lcr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let v = step.src2 as i32;
        if v == i32::MIN {
            self.set_reg(step.r1, v as u32);
            return self.fixed_overflow();
        }
        self.set_reg(step.r1, (-v) as u32);
        self.cc_signed((-v) as u32);
        Ok(())
    }

    pub(super) fn op_and(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = step.src1 & step.src2;
        self.set_reg(step.r1, r);
        self.cc = (r != 0) as u8;
        Ok(())
    }

    pub(super) fn op_or(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = step.src1 | step.src2;
        self.set_reg(step.r1, r);
        self.cc = (r != 0) as u8;
        Ok(())
    }

    pub(super) fn op_xor(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = step.src1 ^ step.src2;
        self.set_reg(step.r1, r);
        self.cc = (r != 0) as u8;
        Ok(())
    }

    pub(super) fn op_c(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.cc = match (step.src1 as i32).cmp(&(step.src2 as i32)) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
        Ok(())
    }

    pub(super) fn op_cl(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.cc = match step.src1.cmp(&step.src2) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
        Ok(())
    }

    pub(super) fn op_a(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = step.src1.wrapping_add(step.src2);
        let overflow = (!(step.src1 ^ step.src2) & (step.src1 ^ r)) >> 31 != 0;
        self.set_reg(step.r1, r);
        if overflow {
            return self.fixed_overflow();
        }
        self.cc_signed(r);
        Ok(())
    }

    pub(super) fn op_s(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = step.src1.wrapping_sub(step.src2);
        let overflow = ((step.src1 ^ step.src2) & (step.src1 ^ r)) >> 31 != 0;
        self.set_reg(step.r1, r);
        if overflow {
            return self.fixed_overflow();
        }
        self.cc_signed(r);
        Ok(())
    }

    pub(super) fn op_al(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let (r, carry) = step.src1.overflowing_add(step.src2);
        self.set_reg(step.r1, r);
        self.cc = ((carry as u8) << 1) | (r != 0) as u8;
        Ok(())
    }

    pub(super) fn op_sl(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = step.src1.wrapping_sub(step.src2);
        let carry = step.src1 >= step.src2;
        self.set_reg(step.r1, r);
        self.cc = if carry {
            if r == 0 {
                2
            } else {
                3
            }
        } else {
            1
        };
        Ok(())
    }

    pub(super) fn op_m(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.r1 & 1 != 0 {
            return Err(Exception::Specification);
        }
        let a = self.regs[(step.r1 + 1) as usize] as i32 as i64;
        let product = a.wrapping_mul(step.src2 as i32 as i64);
        self.set_reg_pair(step.r1, product as u64);
        Ok(())
    }

    pub(super) fn op_mh(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let r = (step.src1 as i32).wrapping_mul(step.src2 as i32);
        self.set_reg(step.r1, r as u32);
        Ok(())
    }

    pub(super) fn op_d(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.r1 & 1 != 0 {
            return Err(Exception::Specification);
        }
        let dividend = self.reg_pair(step.r1) as i64;
        let divisor = step.src2 as i32 as i64;
        if divisor == 0 {
            return Err(Exception::FixedDivide);
        }
        let quotient = dividend.wrapping_div(divisor);
        let remainder = dividend.wrapping_rem(divisor);
        if quotient > i32::MAX as i64 || quotient < i32::MIN as i64 {
            return Err(Exception::FixedDivide);
        }
        self.set_reg(step.r1, remainder as u32);
        self.set_reg(step.r1 + 1, quotient as u32);
        Ok(())
    }

    /// The eight shift opcodes 0x88-0x8F share decode: the shift count is
    /// the low six bits of the effective address.
    pub(super) fn op_shift(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let count = step.address1 & 0x3F;
        let double = step.opcode & 0x04 != 0;
        if double && step.r1 & 1 != 0 {
            return Err(Exception::Specification);
        }

        match step.opcode {
            0x88 => {
                let v = step.src1.checked_shr(count).unwrap_or(0);
                self.set_reg(step.r1, v);
            }
            0x89 => {
                let v = step.src1.checked_shl(count).unwrap_or(0);
                self.set_reg(step.r1, v);
            }
            0x8A => {
                let v = (step.src1 as i32) >> count.min(31);
                self.set_reg(step.r1, v as u32);
                self.cc_signed(v as u32);
            }
            0x8B => {
                let (v, overflow) = shift_left_arith(step.src1 as i32 as i64, count, 32);
                self.set_reg(step.r1, v as u32);
                if overflow {
                    return self.fixed_overflow();
                }
                self.cc_signed(v as u32);
            }
            0x8C => {
                let v = self.reg_pair(step.r1).checked_shr(count).unwrap_or(0);
                self.set_reg_pair(step.r1, v);
            }
            0x8D => {
                let v = self.reg_pair(step.r1).checked_shl(count).unwrap_or(0);
                self.set_reg_pair(step.r1, v);
            }
            0x8E => {
                let v = (self.reg_pair(step.r1) as i64) >> count.min(63);
                self.set_reg_pair(step.r1, v as u64);
                self.cc = match v.cmp(&0) {
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Less => 1,
                    std::cmp::Ordering::Greater => 2,
                };
            }
            _ => {
                let (v, overflow) = shift_left_arith(self.reg_pair(step.r1) as i64, count, 64);
                self.set_reg_pair(step.r1, v as u64);
                if overflow {
                    return self.fixed_overflow();
                }
                self.cc = match v.cmp(&0) {
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Less => 1,
                    std::cmp::Ordering::Greater => 2,
                };
            }
        }
        Ok(())
    }

    pub(super) fn op_la(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, step.address1);
        Ok(())
    }

    pub(super) fn op_ic(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)?;
        self.set_reg(step.r1, (step.src1 & 0xFFFF_FF00) | b as u32);
        Ok(())
    }

    pub(super) fn op_stc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.write_byte(step.address1, step.src1 as u8)
    }

    pub(super) fn op_st(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.write_full(step.address1, step.src1)
    }

    pub(super) fn op_sth(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.write_half(step.address1, step.src1)
    }

    pub(super) fn op_stm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let mut addr = step.address1;
        for r in reg_range(step.r1, step.r2) {
            self.write_full(addr, self.regs[r])?;
            addr = addr.wrapping_add(4);
        }
        Ok(())
    }

    pub(super) fn op_lm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let count = ((step.r2.wrapping_sub(step.r1)) & 0xF) as u32 + 1;
        self.test_access(step.address1, count * 4 - 1, false)?;
        let mut addr = step.address1;
        for r in reg_range(step.r1, step.r2) {
            let v = self.read_full(addr)?;
            self.set_reg(r as u8, v);
            addr = addr.wrapping_add(4);
        }
        Ok(())
    }

    pub(super) fn op_cs(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.address1 & 3 != 0 {
            return Err(Exception::Specification);
        }
        let current = self.read_full(step.address1)?;
        if current == self.regs[step.r1 as usize] {
            self.write_full(step.address1, self.regs[step.r2 as usize])?;
            self.cc = 0;
        } else {
            self.set_reg(step.r1, current);
            self.cc = 1;
        }
        Ok(())
    }

    pub(super) fn op_cds(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.address1 & 7 != 0 || step.r1 & 1 != 0 || step.r2 & 1 != 0 {
            return Err(Exception::Specification);
        }
        let current = self.read_dword(step.address1)?;
        if current == self.reg_pair(step.r1) {
            self.write_dword(step.address1, self.reg_pair(step.r2))?;
            self.cc = 0;
        } else {
            self.set_reg_pair(step.r1, current);
            self.cc = 1;
        }
        Ok(())
    }

    pub(super) fn op_icm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let mask = step.r2;
        let mut addr = step.address1;
        let mut value = self.regs[step.r1 as usize];
        let mut inserted = 0u32;
        let mut first_bit = false;
        let mut first = true;
        for pos in 0..4 {
            if mask & (8 >> pos) != 0 {
                let b = self.read_byte(addr)?;
                addr = addr.wrapping_add(1);
                let shift = 8 * (3 - pos);
                value = (value & !(0xFF << shift)) | ((b as u32) << shift);
                inserted |= b as u32;
                if first {
                    first_bit = b & 0x80 != 0;
                    first = false;
                }
            }
        }
        self.set_reg(step.r1, value);
        self.cc = if mask == 0 || inserted == 0 {
            0
        } else if first_bit {
            1
        } else {
            2
        };
        Ok(())
    }

    pub(super) fn op_stcm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let mask = step.r2;
        let mut addr = step.address1;
        for pos in 0..4 {
            if mask & (8 >> pos) != 0 {
                let b = (self.regs[step.r1 as usize] >> (8 * (3 - pos))) as u8;
                self.write_byte(addr, b)?;
                addr = addr.wrapping_add(1);
            }
        }
        Ok(())
    }

    pub(super) fn op_clm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let mask = step.r2;
        let mut addr = step.address1;
        for pos in 0..4 {
            if mask & (8 >> pos) != 0 {
                let mem = self.read_byte(addr)?;
                addr = addr.wrapping_add(1);
                let reg = (self.regs[step.r1 as usize] >> (8 * (3 - pos))) as u8;
                match reg.cmp(&mem) {
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
        }
        self.cc = 0;
        Ok(())
    }

    // SI byte operations.

    pub(super) fn op_tm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)?;
        let t = b & step.reg;
        self.cc = if t == 0 {
            0
        } else if t == step.reg {
            3
        } else {
            1
        };
        Ok(())
    }

    pub(super) fn op_mvi(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.write_byte(step.address1, step.reg)
    }

    pub(super) fn op_ni(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)? & step.reg;
        self.write_byte(step.address1, b)?;
        self.cc = (b != 0) as u8;
        Ok(())
    }

    pub(super) fn op_oi(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)? | step.reg;
        self.write_byte(step.address1, b)?;
        self.cc = (b != 0) as u8;
        Ok(())
    }

    pub(super) fn op_xi(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)? ^ step.reg;
        self.write_byte(step.address1, b)?;
        self.cc = (b != 0) as u8;
        Ok(())
    }

    pub(super) fn op_cli(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)?;
        self.cc = match b.cmp(&step.reg) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
        Ok(())
    }

    pub(super) fn op_ts(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.read_byte(step.address1)?;
        self.write_byte(step.address1, 0xFF)?;
        self.cc = b >> 7;
        Ok(())
    }

    pub(super) fn op_spm(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.cc = ((step.src1 >> 28) & 0x3) as u8;
        self.prog_mask = ((step.src1 >> 24) & 0xF) as u8;
        Ok(())
    }
}

/// Arithmetic left shift of a `bits`-wide value (sign-extended in `i64`).
/// The sign bit stays put; overflow reports any shifted-out magnitude bit
/// that differs from the sign.
fn shift_left_arith(value: i64, count: u32, bits: u32) -> (i64, bool) {
    let sign = value < 0;
    let mag_mask = (1u64 << (bits - 1)) - 1;
    let mut mag = (value as u64) & mag_mask;
    let mut overflow = false;
    for _ in 0..count {
        if ((mag >> (bits - 2)) & 1 != 0) != sign {
            overflow = true;
        }
        mag = (mag << 1) & mag_mask;
    }
    let result = if sign {
        (mag | !mag_mask) as i64
    } else {
        mag as i64
    };
    (result, overflow)
}
