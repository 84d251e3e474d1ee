//! Instruction fetch, decode, operand prefetch, and dispatch.

mod branch;
mod decimal;
mod fixed;
mod float;
mod storage;
mod system;

use s370_mmu::{MainStorage, AMASK};

use crate::chan::Channel;
use crate::exception::Exception;
use crate::psw::{
    self, CLOCK_CMP_IRQ_CODE, CPU_TIMER_IRQ_CODE, EXT_IRQ_CODE, INTERVAL_IRQ_CODE,
};
use crate::state::{Cpu, StepInfo};

impl<M: MainStorage> Cpu<M> {
    /// One simulated cycle: dispatch one pending interrupt or execute one
    /// instruction. Returns the memory cycles consumed and whether the
    /// machine is still runnable.
    pub fn cycle(&mut self, chan: &mut dyn Channel) -> (u32, bool) {
        let start = self.cycles;

        // I/O first: a completed IPL swaps in the PSW the boot record put
        // at location 0.
        if let Some(dev) = chan.scan(self.sys_mask, self.irq_enb) {
            if chan.loading().is_some() {
                chan.clear_loading();
                let ok = self.ipl_complete(dev).is_ok();
                return (self.consumed(start), ok);
            }
            self.ilc = 0;
            let ok = self.psw_interrupt(psw::O_IOPSW, dev).is_ok();
            return (self.consumed(start), ok);
        }

        if self.ext_enb {
            let code = if self.ext_irq
                && (self.cregs[0] & 0x20 != 0 || self.cregs[6] & 0x40 != 0)
            {
                self.ext_irq = false;
                Some(EXT_IRQ_CODE)
            } else if self.int_irq && self.cregs[0] & 0x80 != 0 {
                self.int_irq = false;
                Some(INTERVAL_IRQ_CODE)
            } else if self.clk_irq && self.int_enb {
                self.clk_irq = false;
                Some(CPU_TIMER_IRQ_CODE)
            } else if self.tod_irq && self.tod_enb {
                Some(CLOCK_CMP_IRQ_CODE)
            } else {
                None
            };
            if let Some(code) = code {
                self.ilc = 0;
                let ok = self.psw_interrupt(psw::O_EPSW, code).is_ok();
                return (self.consumed(start), ok);
            }
        }

        // A PSW with reserved bits set traps once it becomes current.
        if self.psw_spec_pending {
            self.psw_spec_pending = false;
            self.ilc = 0;
            let ok = self.program_interrupt(Exception::Specification.code()).is_ok();
            return (self.consumed(start), ok);
        }

        if self.wait_state() {
            self.cycles += 1;
            // Wait with every interrupt source masked can never resume.
            let alive = self.ext_enb || self.sys_mask != 0;
            return (self.consumed(start), alive);
        }

        self.ipc = self.pc;
        self.per_reg_mod = 0;
        if let Err(e) = self.step(chan) {
            if e.restarts() {
                self.pc = self.ipc;
            }
            let ok = self.program_interrupt(e.code()).is_ok();
            return (self.consumed(start), ok);
        }

        self.per_reg_check();
        if self.per_code != 0 {
            let ok = self.program_interrupt(0).is_ok();
            return (self.consumed(start), ok);
        }
        (self.consumed(start), true)
    }

    fn consumed(&self, start: u64) -> u32 {
        ((self.cycles - start).max(1)) as u32
    }

    pub(crate) fn program_interrupt(&mut self, code: u16) -> Result<(), s370_mmu::InvalidAddress> {
        self.psw_interrupt(psw::O_PPSW, code)
    }

    /// IPL completion: the device number replaces the interruption-code
    /// halfword of the boot PSW image and is recorded at 0xBA, then the
    /// PSW is loaded from words 0 and 4.
    fn ipl_complete(&mut self, dev: u16) -> Result<(), s370_mmu::InvalidAddress> {
        self.mem.put_word_mask(0x00, dev as u32, 0x0000_FFFF)?;
        self.mem
            .put_word_mask(psw::IPL_DEV & !3, dev as u32, 0x0000_FFFF)?;
        let w1 = self.mem.get_word(0)?;
        let w2 = self.mem.get_word(4)?;
        self.cycles += 4;
        self.ilc = 0;
        self.lpsw(w1, w2);
        Ok(())
    }

    fn step(&mut self, chan: &mut dyn Channel) -> Result<(), Exception> {
        self.ilc = 0;
        if self.pc & 1 != 0 {
            return Err(Exception::Specification);
        }
        self.per_fetch_event(self.pc);
        let half = self.fetch_half(self.pc)?;
        self.ilc = 1;
        self.pc = (self.pc + 2) & AMASK;
        self.exec_from(chan, half, self.pc, true)
    }

    /// Decode and execute the instruction whose first halfword is `half`.
    /// Remaining halfwords come from `cursor`; `advance` distinguishes the
    /// normal path (PC and ILC track the fetch) from EX subjects (PC and
    /// ILC stay those of the EX).
    pub(crate) fn exec_from(
        &mut self,
        chan: &mut dyn Channel,
        half: u16,
        mut cursor: u32,
        advance: bool,
    ) -> Result<(), Exception> {
        let mut step = StepInfo {
            opcode: (half >> 8) as u8,
            reg: half as u8,
            r1: ((half >> 4) & 0xF) as u8,
            r2: (half & 0xF) as u8,
            ..StepInfo::default()
        };

        if step.opcode & 0xC0 != 0 {
            let h = self.fetch_half(cursor)?;
            cursor = (cursor + 2) & AMASK;
            if advance {
                self.pc = (self.pc + 2) & AMASK;
                self.ilc = 2;
            }
            let base = (h >> 12) as usize;
            let mut addr = (h & 0x0FFF) as u32;
            if base != 0 {
                addr = addr.wrapping_add(self.regs[base]);
            }
            if step.opcode & 0xC0 == 0x40 && step.r2 != 0 {
                addr = addr.wrapping_add(self.regs[step.r2 as usize]);
            }
            step.address1 = addr & AMASK;

            if step.opcode & 0xC0 == 0xC0 {
                let h = self.fetch_half(cursor)?;
                if advance {
                    self.pc = (self.pc + 2) & AMASK;
                    self.ilc = 3;
                }
                let base = (h >> 12) as usize;
                let mut addr = (h & 0x0FFF) as u32;
                if base != 0 {
                    addr = addr.wrapping_add(self.regs[base]);
                }
                step.address2 = addr & AMASK;
            }
        }

        self.prefetch(&mut step)?;
        self.dispatch(chan, &mut step)
    }

    fn prefetch(&mut self, step: &mut StepInfo) -> Result<(), Exception> {
        match step.opcode {
            0x00..=0x1F => {
                step.src1 = self.regs[step.r1 as usize];
                step.src2 = self.regs[step.r2 as usize];
                step.address1 = step.src2 & AMASK;
            }
            0x20..=0x3F => {
                if step.r1 & 9 != 0 || step.r2 & 9 != 0 {
                    return Err(Exception::Specification);
                }
                step.fsrc1 = self.fpregs[(step.r1 >> 1) as usize];
                step.fsrc2 = self.fpregs[(step.r2 >> 1) as usize];
            }
            0x48..=0x4C => {
                step.src1 = self.regs[step.r1 as usize];
                step.src2 = self.read_half(step.address1)?;
            }
            0x54..=0x5F => {
                step.src1 = self.regs[step.r1 as usize];
                step.src2 = self.read_full(step.address1)?;
            }
            0x40..=0x47 | 0x4D..=0x53 => {
                step.src1 = self.regs[step.r1 as usize];
            }
            0x60 | 0x70 => {
                if step.r1 & 9 != 0 {
                    return Err(Exception::Specification);
                }
                step.fsrc1 = self.fpregs[(step.r1 >> 1) as usize];
            }
            0x68..=0x6F => {
                if step.r1 & 9 != 0 {
                    return Err(Exception::Specification);
                }
                step.fsrc1 = self.fpregs[(step.r1 >> 1) as usize];
                step.fsrc2 = self.read_dword(step.address1)?;
            }
            0x78..=0x7F => {
                if step.r1 & 9 != 0 {
                    return Err(Exception::Specification);
                }
                step.fsrc1 = self.fpregs[(step.r1 >> 1) as usize];
                step.fsrc2 = (self.read_full(step.address1)? as u64) << 32;
            }
            0x80..=0xBF => {
                step.src1 = self.regs[step.r1 as usize];
                step.src2 = self.regs[step.r2 as usize];
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch(&mut self, chan: &mut dyn Channel, step: &mut StepInfo) -> Result<(), Exception> {
        match step.opcode {
            // RR
            0x04 => self.op_spm(step),
            0x05 => self.op_balr(step),
            0x06 => self.op_bctr(step),
            0x07 => self.op_bcr(step),
            0x08 => self.op_ssk(step),
            0x09 => self.op_isk(step),
            0x0A => self.op_svc(step),
            0x0D => self.op_basr(step),
            0x0E => self.op_mvcl(step),
            0x0F => self.op_clcl(step),
            0x10 => self.op_lpr(step),
            0x11 => self.op_lnr(step),
            0x12 => self.op_ltr(step),
            0x13 => self.op_lcr(step),
            0x14 | 0x54 => self.op_and(step),
            0x15 | 0x55 => self.op_cl(step),
            0x16 | 0x56 => self.op_or(step),
            0x17 | 0x57 => self.op_xor(step),
            0x18 => self.op_lr(step),
            0x19 | 0x59 => self.op_c(step),
            0x1A | 0x5A => self.op_a(step),
            0x1B | 0x5B => self.op_s(step),
            0x1C | 0x5C => self.op_m(step),
            0x1D | 0x5D => self.op_d(step),
            0x1E | 0x5E => self.op_al(step),
            0x1F | 0x5F => self.op_sl(step),

            // Floating point, RR and RX forms
            0x20 | 0x30 => self.op_fp_lp(step),
            0x21 | 0x31 => self.op_fp_ln(step),
            0x22 | 0x32 => self.op_fp_lt(step),
            0x23 | 0x33 => self.op_fp_lc(step),
            0x24 | 0x34 => self.op_fp_halve(step),
            0x35 => self.op_fp_round(step),
            0x28 | 0x38 => self.op_fp_lrr(step),
            0x29 | 0x39 | 0x69 | 0x79 => self.op_fp_compare(step),
            0x2A | 0x3A | 0x6A | 0x7A => self.op_fp_add(step, true),
            0x2B | 0x3B | 0x6B | 0x7B => self.op_fp_sub(step, true),
            0x2C | 0x3C | 0x6C | 0x7C => self.op_fp_mul(step),
            0x2D | 0x3D | 0x6D | 0x7D => self.op_fp_div(step),
            0x2E | 0x3E | 0x6E | 0x7E => self.op_fp_add(step, false),
            0x2F | 0x3F | 0x6F | 0x7F => self.op_fp_sub(step, false),
            0x60 | 0x70 => self.op_fp_store(step),
            0x68 | 0x78 => self.op_fp_load(step),

            // RX
            0x40 => self.op_sth(step),
            0x41 => self.op_la(step),
            0x42 => self.op_stc(step),
            0x43 => self.op_ic(step),
            0x44 => self.op_ex(chan, step),
            0x45 => self.op_bal(step),
            0x46 => self.op_bct(step),
            0x47 => self.op_bc(step),
            0x48 => self.op_lh(step),
            0x49 => self.op_c(step),
            0x4A => self.op_a(step),
            0x4B => self.op_s(step),
            0x4C => self.op_mh(step),
            0x4D => self.op_bas(step),
            0x4E => self.op_cvd(step),
            0x4F => self.op_cvb(step),
            0x50 => self.op_st(step),
            0x58 => self.op_l(step),

            // RS / SI
            0x80 => self.op_ssm(step),
            0x82 => self.op_lpsw(step),
            0x83 => self.op_diag(step),
            0x86 => self.op_bxh(step),
            0x87 => self.op_bxle(step),
            0x88..=0x8F => self.op_shift(step),
            0x90 => self.op_stm(step),
            0x91 => self.op_tm(step),
            0x92 => self.op_mvi(step),
            0x93 => self.op_ts(step),
            0x94 => self.op_ni(step),
            0x95 => self.op_cli(step),
            0x96 => self.op_oi(step),
            0x97 => self.op_xi(step),
            0x98 => self.op_lm(step),
            0x9C => self.op_sio(chan, step),
            0x9D => self.op_tio(chan, step),
            0x9E => self.op_hio(chan, step),
            0x9F => self.op_tch(chan, step),
            0xAC => self.op_stnsm(step),
            0xAD => self.op_stosm(step),
            0xAF => self.op_mc(step),
            0xB1 => self.op_lra(step),
            0xB2 => self.op_b2(step),
            0xB6 => self.op_stctl(step),
            0xB7 => self.op_lctl(step),
            0xBA => self.op_cs(step),
            0xBB => self.op_cds(step),
            0xBD => self.op_clm(step),
            0xBE => self.op_stcm(step),
            0xBF => self.op_icm(step),

            // SS
            0xD1 => self.op_mvn(step),
            0xD2 => self.op_mvc(step),
            0xD3 => self.op_mvz(step),
            0xD4 => self.op_nc(step),
            0xD5 => self.op_clc(step),
            0xD6 => self.op_oc(step),
            0xD7 => self.op_xc(step),
            0xDC => self.op_tr(step),
            0xDD => self.op_trt(step),
            0xDE => self.op_ed(step, false),
            0xDF => self.op_ed(step, true),
            0xF0 => self.op_srp(step),
            0xF1 => self.op_mvo(step),
            0xF2 => self.op_pack(step),
            0xF3 => self.op_unpk(step),
            0xF8 => self.op_zap(step),
            0xF9 => self.op_cp(step),
            0xFA => self.op_ap(step),
            0xFB => self.op_sp(step),
            0xFC => self.op_mp(step),
            0xFD => self.op_dp(step),

            _ => Err(Exception::Operation),
        }
    }

    pub(crate) fn privileged(&self) -> Result<(), Exception> {
        if self.problem_state() {
            Err(Exception::Privileged)
        } else {
            Ok(())
        }
    }
}
