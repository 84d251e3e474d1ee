use crate::{InvalidAddress, MainStorage, AMASK, KEY_BLOCK_SHIFT, KEY_FETCH_PROTECT};

/// Translation outcome other than success. The CPU core maps these onto
/// program-interruption codes at the shim boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TranslateFault {
    #[error("segment-translation exception")]
    Segment,
    #[error("page-translation exception")]
    Page,
    #[error("translation specification exception")]
    Specification,
    #[error("addressing exception")]
    Addressing,
    #[error("protection exception")]
    Protection,
}

/// Location where the faulting virtual address is stored on a translation
/// exception.
const TRANS_EXC_ADDR: u32 = 0x90;

/// LRA walk result: the condition-code cases of load-real-address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LraOutcome {
    /// cc 0: translated physical address.
    Mapped(u32),
    /// cc 1: segment-table entry invalid; carries the STE address.
    SegmentInvalid(u32),
    /// cc 2: page-table entry invalid; carries the PTE address.
    PageInvalid(u32),
    /// cc 3: outside the segment- or page-table length.
    Length(u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct TlbEntry {
    valid: bool,
    /// Bits 8.. of the virtual page number.
    tag: u16,
    /// Physical frame number.
    frame: u16,
}

/// DAT state derived from CR0/CR1 plus the TLB.
///
/// The translator is direct-mapped: the low 8 bits of the virtual page
/// number index the TLB, the remaining bits are the match tag. Any CR1
/// store and PTLB flush the whole table.
#[derive(Debug)]
pub struct Dat {
    enabled: bool,
    tlb: [TlbEntry; 256],

    page_shift: u32,
    page_mask: u32,
    seg_shift: u32,
    seg_mask: u32,
    page_index_mask: u32,
    /// Raw-PTE invalid bit and must-be-zero mask for the selected page size.
    pte_invalid: u16,
    pte_mbz: u16,
    pte_shift: u32,
    /// Scale from page index to page-table-length units (1/16 segment).
    pte_len_shift: u32,
    /// Page/segment size fields of CR0 decoded to something usable.
    size_valid: bool,

    seg_addr: u32,
    seg_len: u32,
}

impl Default for Dat {
    fn default() -> Self {
        let mut dat = Dat {
            enabled: false,
            tlb: [TlbEntry::default(); 256],
            page_shift: 0,
            page_mask: 0,
            seg_shift: 0,
            seg_mask: 0,
            page_index_mask: 0,
            pte_invalid: 0,
            pte_mbz: 0,
            pte_shift: 0,
            pte_len_shift: 0,
            size_valid: false,
            seg_addr: 0,
            seg_len: 0,
        };
        dat.set_cr0(0);
        dat.set_cr1(0);
        dat
    }
}

impl Dat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Reinterpret the page-size (bits 8-9) and segment-size (bits 10-12)
    /// fields of CR0 and recompute every derived parameter.
    pub fn set_cr0(&mut self, cr0: u32) {
        let page_bits = (cr0 >> 22) & 0x3;
        let seg_bits = (cr0 >> 19) & 0x7;

        self.size_valid = true;
        match page_bits {
            0b01 => {
                self.page_shift = 11;
                self.pte_shift = 3;
                self.pte_invalid = 0x0004;
                self.pte_mbz = 0x0003;
            }
            0b10 | 0b11 => {
                self.page_shift = 12;
                self.pte_shift = 4;
                self.pte_invalid = 0x0008;
                self.pte_mbz = 0x0007;
            }
            _ => self.size_valid = false,
        }
        match seg_bits {
            0b000 => self.seg_shift = 16,
            0b010 => self.seg_shift = 20,
            _ => self.size_valid = false,
        }

        if self.size_valid {
            self.page_mask = (1 << self.page_shift) - 1;
            self.seg_mask = (AMASK >> self.seg_shift) as u32;
            self.page_index_mask = (1 << (self.seg_shift - self.page_shift)) - 1;
            self.pte_len_shift = self.seg_shift - self.page_shift - 4;
        }
        self.flush();
    }

    /// Segment-table origin and length from CR1. Flushes the TLB.
    pub fn set_cr1(&mut self, cr1: u32) {
        self.seg_addr = cr1 & 0x00FF_FFC0;
        self.seg_len = (((cr1 >> 24) & 0xFF) + 1) << 4;
        self.flush();
    }

    /// Invalidate every TLB entry (PTLB, CR1 store).
    pub fn flush(&mut self) {
        self.tlb = [TlbEntry::default(); 256];
    }

    /// Translate a virtual address. With paging disabled this is the
    /// identity under `AMASK`. Segment/page faults store the faulting
    /// virtual address at 0x90 before reporting.
    pub fn translate(
        &mut self,
        store: &mut dyn MainStorage,
        virt: u32,
    ) -> Result<u32, TranslateFault> {
        let virt = virt & AMASK;
        if !self.enabled {
            return Ok(virt);
        }
        if !self.size_valid {
            return Err(TranslateFault::Specification);
        }

        let page = virt >> self.page_shift;
        let index = (page & 0xFF) as usize;
        let tag = (page >> 8) as u16;

        let entry = self.tlb[index];
        if entry.valid && entry.tag == tag {
            return Ok((virt & self.page_mask) | ((entry.frame as u32) << self.page_shift));
        }
        self.tlb[index] = TlbEntry::default();

        let seg = (virt >> self.seg_shift) & self.seg_mask;
        let page_index = page & self.page_index_mask;

        if seg >= self.seg_len {
            return Err(self.report(store, virt, TranslateFault::Segment));
        }

        let ste = store
            .get_word((seg << 2) + self.seg_addr)
            .map_err(|InvalidAddress(_)| TranslateFault::Addressing)?;
        if ste & 1 != 0 {
            return Err(self.report(store, virt, TranslateFault::Segment));
        }

        let pt_len = ste >> 28;
        if (page_index >> self.pte_len_shift) > pt_len {
            return Err(self.report(store, virt, TranslateFault::Page));
        }

        let pt_origin = ste & 0x00FF_FFF8;
        let pte_addr = pt_origin + page_index * 2;
        let word = store
            .get_word(pte_addr)
            .map_err(|InvalidAddress(_)| TranslateFault::Addressing)?;
        let pte = if pte_addr & 2 == 0 {
            (word >> 16) as u16
        } else {
            word as u16
        };

        if pte & self.pte_mbz != 0 {
            return Err(TranslateFault::Specification);
        }
        if pte & self.pte_invalid != 0 {
            return Err(self.report(store, virt, TranslateFault::Page));
        }

        let frame = pte >> self.pte_shift;
        self.tlb[index] = TlbEntry {
            valid: true,
            tag,
            frame,
        };
        Ok((virt & self.page_mask) | ((frame as u32) << self.page_shift))
    }

    /// Table walk for LRA: reports the outcome as a condition code plus
    /// the relevant address instead of faulting, and leaves the TLB alone.
    pub fn lookup(&self, store: &mut dyn MainStorage, virt: u32) -> Result<LraOutcome, TranslateFault> {
        if !self.size_valid {
            return Err(TranslateFault::Specification);
        }
        let virt = virt & AMASK;
        let seg = (virt >> self.seg_shift) & self.seg_mask;
        let page_index = (virt >> self.page_shift) & self.page_index_mask;

        let ste_addr = (seg << 2) + self.seg_addr;
        if seg >= self.seg_len {
            return Ok(LraOutcome::Length(ste_addr));
        }
        let ste = store
            .get_word(ste_addr)
            .map_err(|InvalidAddress(_)| TranslateFault::Addressing)?;
        if ste & 1 != 0 {
            return Ok(LraOutcome::SegmentInvalid(ste_addr));
        }
        if (page_index >> self.pte_len_shift) > (ste >> 28) {
            return Ok(LraOutcome::Length(ste_addr));
        }
        let pte_addr = (ste & 0x00FF_FFF8) + page_index * 2;
        let word = store
            .get_word(pte_addr)
            .map_err(|InvalidAddress(_)| TranslateFault::Addressing)?;
        let pte = if pte_addr & 2 == 0 {
            (word >> 16) as u16
        } else {
            word as u16
        };
        if pte & self.pte_mbz != 0 {
            return Err(TranslateFault::Specification);
        }
        if pte & self.pte_invalid != 0 {
            return Ok(LraOutcome::PageInvalid(pte_addr));
        }
        let frame = (pte >> self.pte_shift) as u32;
        Ok(LraOutcome::Mapped((virt & self.page_mask) | (frame << self.page_shift)))
    }

    fn report(
        &self,
        store: &mut dyn MainStorage,
        virt: u32,
        fault: TranslateFault,
    ) -> TranslateFault {
        match store.put_word(TRANS_EXC_ADDR, virt) {
            Ok(()) => fault,
            Err(_) => TranslateFault::Addressing,
        }
    }

    /// Storage-key protection. Key zero in the PSW always passes; stores
    /// require an exact key match; fetches only when the block is
    /// fetch-protected.
    pub fn check_protect(
        &self,
        store: &dyn MainStorage,
        phys: u32,
        access_key: u8,
        write: bool,
    ) -> bool {
        if access_key == 0 {
            return false;
        }
        let key = store.get_key(phys);
        if write {
            (key >> 4) != access_key
        } else {
            key & KEY_FETCH_PROTECT != 0 && (key >> 4) != access_key
        }
    }

    /// Validate that an access of `size` bytes at `virt` can complete:
    /// translation and protection for the first byte, and again for the
    /// last byte when it falls in a different 2KB key block.
    pub fn test_access(
        &mut self,
        store: &mut dyn MainStorage,
        virt: u32,
        size: u32,
        access_key: u8,
        write: bool,
    ) -> Result<(), TranslateFault> {
        let phys = self.translate(store, virt)?;
        if !store.check_addr(phys) {
            return Err(TranslateFault::Addressing);
        }
        if self.check_protect(store, phys, access_key, write) {
            return Err(TranslateFault::Protection);
        }
        let last = (virt + size) & AMASK;
        if last >> KEY_BLOCK_SHIFT != (virt & AMASK) >> KEY_BLOCK_SHIFT {
            let phys = self.translate(store, last)?;
            if !store.check_addr(phys) {
                return Err(TranslateFault::Addressing);
            }
            if self.check_protect(store, phys, access_key, write) {
                return Err(TranslateFault::Protection);
            }
        }
        Ok(())
    }
}
