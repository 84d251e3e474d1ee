//! Memory access shim: every operand access goes through DAT, protection,
//! and key tagging here. Unaligned accesses that span a word are split and
//! merged with explicit shifts; a split that crosses a 2KB key block is
//! translated and protection-checked a second time. Each storage word
//! touched counts one memory cycle for timer pacing.

use s370_mmu::{MainStorage, AMASK, KEY_BLOCK_SHIFT, KEY_CHANGE, KEY_REFERENCE};

use crate::exception::Exception;
use crate::state::Cpu;

impl<M: MainStorage> Cpu<M> {
    /// Translate, bounds-check, protection-check, and tag one address.
    pub(crate) fn virt_to_phys(&mut self, virt: u32, write: bool) -> Result<u32, Exception> {
        let phys = self.dat.translate(&mut self.mem, virt)?;
        if !self.mem.check_addr(phys) {
            return Err(Exception::Addressing);
        }
        if self.dat.check_protect(&self.mem, phys, self.st_key, write) {
            return Err(Exception::Protection);
        }
        let tag = if write {
            KEY_REFERENCE | KEY_CHANGE
        } else {
            KEY_REFERENCE
        };
        self.mem.tag_key(phys, tag);
        Ok(phys)
    }

    /// Physical word address of the second word of a split access.
    /// Re-translates only when the split crosses a 2KB key block;
    /// otherwise the page (and key) are those of the first word.
    fn split_second(&mut self, virt: u32, phys: u32, write: bool) -> Result<u32, Exception> {
        let virt2 = ((virt & AMASK) & !3) + 4;
        if virt2 >> KEY_BLOCK_SHIFT != (virt & AMASK) >> KEY_BLOCK_SHIFT {
            self.virt_to_phys(virt2, write)
        } else {
            Ok((phys & !3) + 4)
        }
    }

    pub fn read_full(&mut self, virt: u32) -> Result<u32, Exception> {
        let virt = virt & AMASK;
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, false)?;
        let w1 = self.mem.get_word(phys)?;
        let offset = virt & 3;
        if offset == 0 {
            return Ok(w1);
        }
        let phys2 = self.split_second(virt, phys, false)?;
        self.cycles += 1;
        let w2 = self.mem.get_word(phys2)?;
        let shift = 8 * offset;
        Ok((w1 << shift) | (w2 >> (32 - shift)))
    }

    /// Halfword read, sign-extended to 32 bits.
    pub fn read_half(&mut self, virt: u32) -> Result<u32, Exception> {
        let virt = virt & AMASK;
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, false)?;
        let w1 = self.mem.get_word(phys)?;
        let half = match virt & 3 {
            0 => w1 >> 16,
            1 => w1 >> 8,
            2 => w1,
            _ => {
                let phys2 = self.split_second(virt, phys, false)?;
                self.cycles += 1;
                let w2 = self.mem.get_word(phys2)?;
                (w1 << 8) | (w2 >> 24)
            }
        } & 0xFFFF;
        Ok(half as u16 as i16 as i32 as u32)
    }

    pub fn read_byte(&mut self, virt: u32) -> Result<u8, Exception> {
        let virt = virt & AMASK;
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, false)?;
        let word = self.mem.get_word(phys)?;
        Ok((word >> (8 * (3 - (virt & 3)))) as u8)
    }

    /// Doubleword read as two word reads.
    pub fn read_dword(&mut self, virt: u32) -> Result<u64, Exception> {
        let hi = self.read_full(virt)?;
        let lo = self.read_full(virt + 4)?;
        Ok(((hi as u64) << 32) | lo as u64)
    }

    pub fn write_full(&mut self, virt: u32, value: u32) -> Result<(), Exception> {
        let virt = virt & AMASK;
        self.per_store_event(virt);
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, true)?;
        let offset = virt & 3;
        if offset == 0 {
            self.mem.put_word(phys, value)?;
            return Ok(());
        }
        let shift = 8 * offset;
        let phys2 = self.split_second(virt, phys, true)?;
        self.mem
            .put_word_mask(phys, value >> shift, 0xFFFF_FFFF >> shift)?;
        self.cycles += 1;
        self.mem
            .put_word_mask(phys2, value << (32 - shift), 0xFFFF_FFFF << (32 - shift))?;
        Ok(())
    }

    pub fn write_half(&mut self, virt: u32, value: u32) -> Result<(), Exception> {
        let virt = virt & AMASK;
        self.per_store_event(virt);
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, true)?;
        let value = value & 0xFFFF;
        match virt & 3 {
            0 => self.mem.put_word_mask(phys, value << 16, 0xFFFF_0000)?,
            1 => self.mem.put_word_mask(phys, value << 8, 0x00FF_FF00)?,
            2 => self.mem.put_word_mask(phys, value, 0x0000_FFFF)?,
            _ => {
                let phys2 = self.split_second(virt, phys, true)?;
                self.mem.put_word_mask(phys, value >> 8, 0x0000_00FF)?;
                self.cycles += 1;
                self.mem.put_word_mask(phys2, value << 24, 0xFF00_0000)?;
            }
        }
        Ok(())
    }

    pub fn write_byte(&mut self, virt: u32, value: u8) -> Result<(), Exception> {
        let virt = virt & AMASK;
        self.per_store_event(virt);
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, true)?;
        let shift = 8 * (3 - (virt & 3));
        self.mem
            .put_word_mask(phys, (value as u32) << shift, 0xFF << shift)?;
        Ok(())
    }

    pub fn write_dword(&mut self, virt: u32, value: u64) -> Result<(), Exception> {
        self.write_full(virt, (value >> 32) as u32)?;
        self.write_full(virt + 4, value as u32)
    }

    /// Pre-commit validation for SS-type stores: the whole destination
    /// range must translate and pass protection before any byte moves.
    pub(crate) fn test_access(
        &mut self,
        virt: u32,
        len: u32,
        write: bool,
    ) -> Result<(), Exception> {
        self.dat
            .test_access(&mut self.mem, virt, len, self.st_key, write)
            .map_err(Exception::from)
    }

    /// Aligned word read on the instruction-fetch path: fetch protection
    /// applies, reference is tagged, change is not.
    pub(crate) fn fetch_word(&mut self, virt: u32) -> Result<u32, Exception> {
        let virt = virt & AMASK & !3;
        self.cycles += 1;
        let phys = self.virt_to_phys(virt, false)?;
        Ok(self.mem.get_word(phys)?)
    }

    /// Instruction-stream halfword at `addr` (always even).
    pub(crate) fn fetch_half(&mut self, addr: u32) -> Result<u16, Exception> {
        let word = self.fetch_word(addr)?;
        Ok(if addr & 2 == 0 {
            (word >> 16) as u16
        } else {
            word as u16
        })
    }
}
