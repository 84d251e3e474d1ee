//! Branching and the execute instruction.

use s370_mmu::{MainStorage, AMASK};

use crate::chan::Channel;
use crate::exception::Exception;
use crate::state::{Cpu, StepInfo};

impl<M: MainStorage> Cpu<M> {
    /// BAL/BALR link word: ILC, condition code, program mask, next address.
    fn bal_link(&self) -> u32 {
        ((self.ilc as u32) << 30)
            | ((self.cc as u32) << 28)
            | ((self.prog_mask as u32) << 24)
            | (self.pc & AMASK)
    }

    pub(super) fn op_balr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let link = self.bal_link();
        self.set_reg(step.r1, link);
        if step.r2 != 0 {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bal(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let link = self.bal_link();
        self.set_reg(step.r1, link);
        self.branch_to(step.address1);
        Ok(())
    }

    pub(super) fn op_basr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, self.pc & AMASK);
        if step.r2 != 0 {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bas(&mut self, step: &StepInfo) -> Result<(), Exception> {
        self.set_reg(step.r1, self.pc & AMASK);
        self.branch_to(step.address1);
        Ok(())
    }

    pub(super) fn op_bctr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let v = step.src1.wrapping_sub(1);
        self.set_reg(step.r1, v);
        if v != 0 && step.r2 != 0 {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bct(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let v = step.src1.wrapping_sub(1);
        self.set_reg(step.r1, v);
        if v != 0 {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bcr(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.r2 != 0 && step.r1 & (8 >> self.cc) != 0 {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bc(&mut self, step: &StepInfo) -> Result<(), Exception> {
        if step.r1 & (8 >> self.cc) != 0 {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bxh(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let increment = self.regs[step.r2 as usize];
        let compare = self.regs[(step.r2 | 1) as usize];
        let sum = self.regs[step.r1 as usize].wrapping_add(increment);
        self.set_reg(step.r1, sum);
        if (sum as i32) > (compare as i32) {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    pub(super) fn op_bxle(&mut self, step: &StepInfo) -> Result<(), Exception> {
        let increment = self.regs[step.r2 as usize];
        let compare = self.regs[(step.r2 | 1) as usize];
        let sum = self.regs[step.r1 as usize].wrapping_add(increment);
        self.set_reg(step.r1, sum);
        if (sum as i32) <= (compare as i32) {
            self.branch_to(step.address1);
        }
        Ok(())
    }

    /// EX: run the halfword at the target address with its second byte
    /// OR-ed with the low byte of R1. PC and ILC stay those of the EX, so
    /// traps in the subject restart at the EX itself.
    pub(super) fn op_ex(
        &mut self,
        chan: &mut dyn Channel,
        step: &StepInfo,
    ) -> Result<(), Exception> {
        if step.address1 & 1 != 0 {
            return Err(Exception::Specification);
        }
        let mut half = self.fetch_half(step.address1)?;
        if (half >> 8) as u8 == 0x44 {
            return Err(Exception::Execute);
        }
        if step.r1 != 0 {
            half |= (step.src1 & 0xFF) as u16;
        }
        self.exec_from(chan, half, (step.address1 + 2) & AMASK, false)
    }
}
