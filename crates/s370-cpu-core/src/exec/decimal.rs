//! Packed-decimal arithmetic, conversions, and editing.
//!
//! Operands are at most 16 bytes (31 digits), so magnitudes fit an `i128`.
//! Digit and sign nibbles are validated on load (data exception);
//! overflow on store is reported to the caller so the decimal-overflow
//! mask can gate the trap.

use s370_mmu::{MainStorage, AMASK};

use crate::exception::Exception;
use crate::state::{Cpu, StepInfo};

fn is_minus(sign: u8) -> bool {
    sign == 0xB || sign == 0xD
}

impl<M: MainStorage> Cpu<M> {
    fn load_packed(&mut self, addr: u32, len: u32) -> Result<i128, Exception> {
        let mut value: i128 = 0;
        let mut sign = 0xC;
        for i in 0..len {
            let b = self.read_byte(addr.wrapping_add(i))?;
            let hi = b >> 4;
            let lo = b & 0xF;
            if hi > 9 {
                return Err(Exception::Data);
            }
            value = value * 10 + hi as i128;
            if i == len - 1 {
                if lo < 0xA {
                    return Err(Exception::Data);
                }
                sign = lo;
            } else {
                if lo > 9 {
                    return Err(Exception::Data);
                }
                value = value * 10 + lo as i128;
            }
        }
        Ok(if is_minus(sign) { -value } else { value })
    }

    /// Store `value` into a packed field, truncating high digits.
    /// Returns true when significant digits were lost.
    fn store_packed(&mut self, addr: u32, len: u32, value: i128) -> Result<bool, Exception> {
        self.test_access(addr, len - 1, true)?;
        let sign = if value < 0 { 0xD } else { 0xC };
        let mut mag = value.unsigned_abs();
        for i in (0..len).rev() {
            let b = if i == len - 1 {
                let d = (mag % 10) as u8;
                mag /= 10;
                (d << 4) | sign
            } else {
                let lo = (mag % 10) as u8;
                mag /= 10;
                let hi = (mag % 10) as u8;
                mag /= 10;
                (hi << 4) | lo
            };
            self.write_byte(addr.wrapping_add(i), b)?;
        }
        Ok(mag != 0)
    }

    fn cc_decimal(&mut self, value: i128, overflow: bool) -> Result<(), Exception> {
        if overflow {
            self.cc = 3;
            if self.prog_mask & 0x4 != 0 {
                return Err(Exception::DecimalOverflow);
            }
            return Ok(());
        }
        self.cc = match value.cmp(&0) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
        Ok(())
    }

    pub(super) fn op_ap(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let a = self.load_packed(step.address1, step.r1 as u32 + 1)?;
        let b = self.load_packed(step.address2, step.r2 as u32 + 1)?;
        let sum = a + b;
        let overflow = self.store_packed(step.address1, step.r1 as u32 + 1, sum)?;
        self.cc_decimal(sum, overflow)
    }

    pub(super) fn op_sp(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let a = self.load_packed(step.address1, step.r1 as u32 + 1)?;
        let b = self.load_packed(step.address2, step.r2 as u32 + 1)?;
        let diff = a - b;
        let overflow = self.store_packed(step.address1, step.r1 as u32 + 1, diff)?;
        self.cc_decimal(diff, overflow)
    }

    pub(super) fn op_zap(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let b = self.load_packed(step.address2, step.r2 as u32 + 1)?;
        let overflow = self.store_packed(step.address1, step.r1 as u32 + 1, b)?;
        self.cc_decimal(b, overflow)
    }

    pub(super) fn op_cp(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let a = self.load_packed(step.address1, step.r1 as u32 + 1)?;
        let b = self.load_packed(step.address2, step.r2 as u32 + 1)?;
        self.cc = match a.cmp(&b) {
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => 2,
        };
        Ok(())
    }

    pub(super) fn op_mp(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let l1 = step.r1 as u32 + 1;
        let l2 = step.r2 as u32 + 1;
        if l2 > 8 || l2 >= l1 {
            return Err(Exception::Specification);
        }
        let a = self.load_packed(step.address1, l1)?;
        let b = self.load_packed(step.address2, l2)?;
        // The multiplicand needs l2 bytes of leading zeros.
        let limit = 10i128.pow(2 * (l1 - l2) - 1);
        if a.unsigned_abs() >= limit as u128 {
            return Err(Exception::Data);
        }
        let product = a * b;
        self.store_packed(step.address1, l1, product)?;
        Ok(())
    }

    pub(super) fn op_dp(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let l1 = step.r1 as u32 + 1;
        let l2 = step.r2 as u32 + 1;
        if l2 > 8 || l2 >= l1 {
            return Err(Exception::Specification);
        }
        let a = self.load_packed(step.address1, l1)?;
        let b = self.load_packed(step.address2, l2)?;
        if b == 0 {
            return Err(Exception::DecimalDivide);
        }
        let quotient = a / b;
        let remainder = a % b;
        let qlen = l1 - l2;
        if quotient.unsigned_abs() >= 10u128.pow(2 * qlen - 1) {
            return Err(Exception::DecimalDivide);
        }
        self.store_packed(step.address1, qlen, quotient)?;
        // Remainder carries the dividend's sign, even when zero.
        let rem_addr = step.address1.wrapping_add(qlen) & AMASK;
        self.store_packed(rem_addr, l2, remainder)?;
        if a < 0 && remainder == 0 {
            let last = rem_addr.wrapping_add(l2 - 1);
            let b = self.read_byte(last)?;
            self.write_byte(last, (b & 0xF0) | 0xD)?;
        }
        Ok(())
    }

    pub(super) fn op_srp(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let len = step.r1 as u32 + 1;
        let round = step.r2 as i128;
        if round > 9 {
            return Err(Exception::Specification);
        }
        let a = self.load_packed(step.address1, len)?;
        let count = step.address2 & 0x3F;
        let (shifted, lost) = if count & 0x20 == 0 {
            // Left shift; pre-truncate to the 31-digit maximum so the
            // i128 cannot overflow, and remember what fell off.
            let keep = 10i128.pow(31 - count);
            let kept = a % keep;
            (kept * 10i128.pow(count), kept != a)
        } else {
            let right = 64 - count;
            let div = 10i128.pow(right);
            let rounded = a.unsigned_abs() as i128 + round * (div / 10);
            let mag = rounded / div;
            (if a < 0 { -mag } else { mag }, false)
        };
        let overflow = self.store_packed(step.address1, len, shifted)? || lost;
        self.cc_decimal(shifted, overflow)
    }

    pub(super) fn op_cvb(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let value = self.load_packed(step.address1, 8)?;
        self.set_reg(step.r1, value as i64 as u32);
        if value > i32::MAX as i128 || value < i32::MIN as i128 {
            return Err(Exception::FixedDivide);
        }
        Ok(())
    }

    pub(super) fn op_cvd(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let value = self.regs[step.r1 as usize] as i32 as i128;
        self.store_packed(step.address1, 8, value)?;
        Ok(())
    }

    pub(super) fn op_pack(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let l1 = step.r1 as u32 + 1;
        let l2 = step.r2 as u32 + 1;
        self.test_access(step.address1, l1 - 1, true)?;
        // Digits right to left from the zoned source; the zone of its
        // rightmost byte is the sign. No validation is performed.
        let last = self.read_byte(step.address2.wrapping_add(l2 - 1))?;
        let mut digits = Vec::with_capacity(l2 as usize);
        digits.push(last & 0xF);
        for i in (0..l2 - 1).rev() {
            digits.push(self.read_byte(step.address2.wrapping_add(i))? & 0xF);
        }
        let mut next = digits.into_iter().chain(std::iter::repeat(0));
        let mut out = vec![0u8; l1 as usize];
        let l1 = l1 as usize;
        out[l1 - 1] = (next.next().unwrap_or(0) << 4) | (last >> 4);
        for i in (0..l1 - 1).rev() {
            let lo = next.next().unwrap_or(0);
            let hi = next.next().unwrap_or(0);
            out[i] = (hi << 4) | lo;
        }
        for (i, b) in out.iter().enumerate() {
            self.write_byte(step.address1.wrapping_add(i as u32), *b)?;
        }
        Ok(())
    }

    pub(super) fn op_unpk(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let l1 = step.r1 as u32 + 1;
        let l2 = step.r2 as u32 + 1;
        self.test_access(step.address1, l1 - 1, true)?;
        let last = self.read_byte(step.address2.wrapping_add(l2 - 1))?;
        let mut digits = Vec::with_capacity(2 * l2 as usize);
        digits.push(last >> 4);
        for i in (0..l2 - 1).rev() {
            let b = self.read_byte(step.address2.wrapping_add(i))?;
            digits.push(b & 0xF);
            digits.push(b >> 4);
        }
        let mut next = digits.into_iter().chain(std::iter::repeat(0));
        let l1 = l1 as usize;
        let mut out = vec![0u8; l1];
        out[l1 - 1] = ((last & 0xF) << 4) | next.next().unwrap_or(0);
        for i in (0..l1 - 1).rev() {
            out[i] = 0xF0 | next.next().unwrap_or(0);
        }
        for (i, b) in out.iter().enumerate() {
            self.write_byte(step.address1.wrapping_add(i as u32), *b)?;
        }
        Ok(())
    }

    pub(super) fn op_mvo(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let l1 = step.r1 as u32 + 1;
        let l2 = step.r2 as u32 + 1;
        self.test_access(step.address1, l1 - 1, true)?;
        // Source nibbles, rightmost first, slotted in above the preserved
        // sign nibble of the destination.
        let mut nibbles = Vec::with_capacity(2 * l2 as usize);
        for i in (0..l2).rev() {
            let b = self.read_byte(step.address2.wrapping_add(i))?;
            nibbles.push(b & 0xF);
            nibbles.push(b >> 4);
        }
        let mut next = nibbles.into_iter().chain(std::iter::repeat(0));
        let l1 = l1 as usize;
        let sign = self.read_byte(step.address1.wrapping_add(l1 as u32 - 1))? & 0xF;
        let mut out = vec![0u8; l1];
        out[l1 - 1] = (next.next().unwrap_or(0) << 4) | sign;
        for i in (0..l1 - 1).rev() {
            let lo = next.next().unwrap_or(0);
            let hi = next.next().unwrap_or(0);
            out[i] = (hi << 4) | lo;
        }
        for (i, b) in out.iter().enumerate() {
            self.write_byte(step.address1.wrapping_add(i as u32), *b)?;
        }
        Ok(())
    }

    /// ED and EDMK share everything except the R1 marking.
    pub(super) fn op_ed(&mut self, step: &StepInfo, mark: bool) -> Result<(), Exception> {
        const DIGIT_SELECT: u8 = 0x20;
        const SIG_START: u8 = 0x21;
        const FIELD_SEP: u8 = 0x22;

        let len = step.reg as u32;
        self.test_access(step.address1, len, true)?;
        let fill = self.read_byte(step.address1)?;

        let mut src = step.address2;
        let mut pending_low: Option<u8> = None;
        let mut significance = false;
        let mut nonzero = false;

        for i in 1..=len {
            let at = step.address1.wrapping_add(i);
            let p = self.read_byte(at)?;
            match p {
                DIGIT_SELECT | SIG_START => {
                    let mut plus_sign = false;
                    let digit = match pending_low.take() {
                        Some(d) => d,
                        None => {
                            let b = self.read_byte(src)?;
                            src = src.wrapping_add(1) & AMASK;
                            let lo = b & 0xF;
                            if lo > 9 {
                                // Sign in the low nibble ends the field.
                                plus_sign = !is_minus(lo);
                            } else {
                                pending_low = Some(lo);
                            }
                            b >> 4
                        }
                    };
                    if digit > 9 {
                        return Err(Exception::Data);
                    }
                    if digit != 0 || significance {
                        self.write_byte(at, 0xF0 | digit)?;
                        if digit != 0 {
                            // EDMK records where significance started,
                            // always in general register 1.
                            if !significance && mark {
                                let r1 = (self.regs[1] & 0xFF00_0000) | (at & AMASK);
                                self.set_reg(1, r1);
                            }
                            nonzero = true;
                            significance = true;
                        }
                    } else {
                        self.write_byte(at, fill)?;
                    }
                    if p == SIG_START {
                        significance = true;
                    }
                    if plus_sign {
                        significance = false;
                    }
                }
                FIELD_SEP => {
                    self.write_byte(at, fill)?;
                    significance = false;
                    nonzero = false;
                }
                _ => {
                    if !significance {
                        self.write_byte(at, fill)?;
                    }
                }
            }
        }

        self.cc = if !nonzero {
            0
        } else if significance {
            1
        } else {
            2
        };
        Ok(())
    }
}
