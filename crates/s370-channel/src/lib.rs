//! Multiplexer channel set: CCW interpretation, CSW posting, interrupt
//! scanning, and IPL sequencing, behind `s370-cpu-core`'s [`Channel`]
//! trait. Channel programs run synchronously against main storage; device
//! end is latched and surfaced through `scan` on a later cycle.

mod device;

pub use device::{Device, MemoryDevice};

use std::collections::BTreeMap;

use s370_cpu_core::Channel;
use s370_mmu::{InvalidAddress, MainStorage, AMASK};

/// CSW location.
const CSW: u32 = 0x40;
/// CAW location.
const CAW: u32 = 0x48;

// CCW flag bits.
const CCW_CD: u8 = 0x80;
const CCW_CC: u8 = 0x40;
const CCW_SLI: u8 = 0x20;
const CCW_SKIP: u8 = 0x10;

// Unit-status bits.
pub const US_CHANNEL_END: u8 = 0x08;
pub const US_DEVICE_END: u8 = 0x04;
pub const US_UNIT_CHECK: u8 = 0x02;

// Channel-status bits.
const CS_INCORRECT_LENGTH: u8 = 0x40;
const CS_PROGRAM_CHECK: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("no device at address {0:#05x}")]
    NoDevice(u16),
    #[error("storage access failed during channel program: {0}")]
    Storage(#[from] InvalidAddress),
}

#[derive(Debug)]
struct Slot {
    dev: Box<dyn Device>,
    irq_pending: bool,
}

/// One channel set; devices are keyed by the 16-bit channel/unit address
/// (channel number in the high byte).
#[derive(Debug, Default)]
pub struct ChannelSet {
    slots: BTreeMap<u16, Slot>,
    loading: Option<u16>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, addr: u16, dev: Box<dyn Device>) {
        self.slots.insert(
            addr,
            Slot {
                dev,
                irq_pending: false,
            },
        );
    }

    /// Begin an IPL: read the 24-byte boot record to location 0, run the
    /// CCW chain it placed at 0x08, and leave the device-end interrupt
    /// pending with the loading latch set.
    pub fn ipl_device(
        &mut self,
        addr: u16,
        store: &mut dyn MainStorage,
    ) -> Result<(), ChannelError> {
        let slot = self.slots.get_mut(&addr).ok_or(ChannelError::NoDevice(addr))?;
        tracing::info!(dev = format_args!("{addr:03X}"), "IPL start");
        slot.dev.begin();
        let (bytes, _status) = slot.dev.exec(0x02, 24, &[]);
        for (i, b) in bytes.iter().take(24).enumerate() {
            put_byte(store, i as u32, *b)?;
        }
        // The boot record supplies a CCW pair at 0x08; a zero word there
        // means the record is complete as read.
        let ccw1 = store.get_word(0x08)?;
        if ccw1 != 0 {
            self.run_program(addr, 0, 0x08, store)?;
        }
        if let Some(slot) = self.slots.get_mut(&addr) {
            slot.irq_pending = true;
        }
        self.loading = Some(addr);
        Ok(())
    }

    /// Execute a channel program. Stores the CSW and returns the SIO
    /// condition code.
    fn run_program(
        &mut self,
        addr: u16,
        key: u8,
        start: u32,
        store: &mut dyn MainStorage,
    ) -> Result<u8, ChannelError> {
        let slot = self.slots.get_mut(&addr).ok_or(ChannelError::NoDevice(addr))?;
        let mut ccw_addr = start;
        let mut unit_status = 0u8;
        let mut chan_status = 0u8;
        let mut residual = 0u16;
        let mut tic_ok = false;

        loop {
            let w1 = store.get_word(ccw_addr)?;
            let w2 = store.get_word(ccw_addr + 4)?;
            ccw_addr += 8;

            let cmd = (w1 >> 24) as u8;
            let data_addr = w1 & AMASK;
            let flags = (w2 >> 24) as u8;
            let count = (w2 & 0xFFFF) as u16;

            if cmd == 0x08 {
                // Transfer in channel.
                if !tic_ok {
                    chan_status |= CS_PROGRAM_CHECK;
                    break;
                }
                ccw_addr = data_addr;
                tic_ok = false;
                continue;
            }
            tic_ok = true;
            if cmd == 0 || count == 0 {
                chan_status |= CS_PROGRAM_CHECK;
                break;
            }

            let status = match cmd & 0x03 {
                0x01 => {
                    // Write: gather from storage first.
                    let mut data = Vec::with_capacity(count as usize);
                    for i in 0..count as u32 {
                        data.push(get_byte(store, data_addr + i)?);
                    }
                    let (_out, status) = slot.dev.exec(cmd, count as u32, &data);
                    residual = 0;
                    status
                }
                0x02 => {
                    let (bytes, status) = slot.dev.exec(cmd, count as u32, &[]);
                    if flags & CCW_SKIP == 0 {
                        for (i, b) in bytes.iter().enumerate() {
                            put_byte(store, data_addr + i as u32, *b)?;
                        }
                    }
                    residual = count - bytes.len().min(count as usize) as u16;
                    if residual != 0 && flags & CCW_SLI == 0 {
                        chan_status |= CS_INCORRECT_LENGTH;
                    }
                    status
                }
                _ => {
                    // Control and sense-class commands carry no storage
                    // transfer in this model.
                    let (_bytes, status) = slot.dev.exec(cmd, count as u32, &[]);
                    residual = count;
                    status
                }
            };

            unit_status = status;
            if status & US_UNIT_CHECK != 0 || chan_status != 0 {
                break;
            }
            if flags & (CCW_CC | CCW_CD) == 0 {
                break;
            }
        }

        store.put_word(CSW, ((key as u32) << 28) | (ccw_addr & AMASK))?;
        store.put_word(
            CSW + 4,
            ((unit_status as u32) << 24) | ((chan_status as u32) << 16) | residual as u32,
        )?;
        slot.irq_pending = true;
        tracing::debug!(
            dev = format_args!("{addr:03X}"),
            unit_status,
            chan_status,
            "channel program complete"
        );
        Ok(0)
    }
}

impl Channel for ChannelSet {
    fn start_io(&mut self, dev: u16, store: &mut dyn MainStorage) -> u8 {
        let Some(slot) = self.slots.get_mut(&dev) else {
            return 3;
        };
        if slot.irq_pending {
            return 2;
        }
        let caw = match store.get_word(CAW) {
            Ok(w) => w,
            Err(_) => return 3,
        };
        let key = (caw >> 28) as u8;
        let start = caw & AMASK;
        if start & 0x7 != 0 || start == 0 {
            let _ = store.put_word(CSW, 0);
            let _ = store.put_word(CSW + 4, (CS_PROGRAM_CHECK as u32) << 16);
            return 1;
        }
        slot.dev.begin();
        match self.run_program(dev, key, start, store) {
            Ok(cc) => cc,
            Err(_) => 3,
        }
    }

    fn test_io(&mut self, dev: u16, _store: &mut dyn MainStorage) -> u8 {
        match self.slots.get_mut(&dev) {
            Some(slot) if slot.irq_pending => {
                slot.irq_pending = false;
                1
            }
            Some(_) => 0,
            None => 3,
        }
    }

    fn halt_io(&mut self, dev: u16, _store: &mut dyn MainStorage) -> u8 {
        match self.slots.get_mut(&dev) {
            // Programs run to completion within SIO, so there is never a
            // transfer to halt.
            Some(_) => 0,
            None => 3,
        }
    }

    fn test_chan(&mut self, dev: u16) -> u8 {
        let chan = dev >> 8;
        if self.slots.keys().any(|k| k >> 8 == chan) {
            0
        } else {
            3
        }
    }

    fn scan(&mut self, sys_mask: u16, irq_enb: bool) -> Option<u16> {
        if let Some(ldev) = self.loading {
            let slot = self.slots.get_mut(&ldev)?;
            if slot.irq_pending {
                slot.irq_pending = false;
                return Some(ldev);
            }
            return None;
        }
        if !irq_enb {
            return None;
        }
        for (&addr, slot) in self.slots.iter_mut() {
            let chan_bit = 0x8000u16 >> (addr >> 8).min(15);
            if slot.irq_pending && sys_mask & chan_bit != 0 {
                slot.irq_pending = false;
                return Some(addr);
            }
        }
        None
    }

    fn loading(&self) -> Option<u16> {
        self.loading
    }

    fn clear_loading(&mut self) {
        self.loading = None;
    }

    fn irq_pending(&self) -> bool {
        self.slots.values().any(|s| s.irq_pending)
    }
}

fn get_byte(store: &mut dyn MainStorage, addr: u32) -> Result<u8, InvalidAddress> {
    let w = store.get_word(addr)?;
    Ok((w >> (8 * (3 - (addr & 3)))) as u8)
}

fn put_byte(store: &mut dyn MainStorage, addr: u32, value: u8) -> Result<(), InvalidAddress> {
    let shift = 8 * (3 - (addr & 3));
    store.put_word_mask(addr, (value as u32) << shift, 0xFF << shift)
}
