use crate::{US_CHANNEL_END, US_DEVICE_END, US_UNIT_CHECK};

/// A unit on the channel. Commands are the CCW command byte; read-class
/// commands return data, write-class commands consume it. The returned
/// unit status ends or continues the chain.
pub trait Device: std::fmt::Debug {
    /// Reset the device's channel-program position (new SIO or IPL).
    fn begin(&mut self) {}

    /// Execute one command for up to `count` bytes.
    fn exec(&mut self, cmd: u8, count: u32, data: &[u8]) -> (Vec<u8>, u8);
}

/// Sequential record device backed by a byte buffer: reads stream from
/// the buffer, writes are captured. Enough device for channel tests and
/// IPL boot records.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    content: Vec<u8>,
    written: Vec<u8>,
    pos: usize,
}

impl MemoryDevice {
    pub fn new(content: Vec<u8>) -> Self {
        MemoryDevice {
            content,
            written: Vec::new(),
            pos: 0,
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Device for MemoryDevice {
    fn begin(&mut self) {
        self.pos = 0;
    }

    fn exec(&mut self, cmd: u8, count: u32, data: &[u8]) -> (Vec<u8>, u8) {
        match cmd & 0x03 {
            0x02 => {
                let end = (self.pos + count as usize).min(self.content.len());
                if self.pos >= self.content.len() {
                    return (Vec::new(), US_CHANNEL_END | US_DEVICE_END | US_UNIT_CHECK);
                }
                let bytes = self.content[self.pos..end].to_vec();
                self.pos = end;
                (bytes, US_CHANNEL_END | US_DEVICE_END)
            }
            0x01 => {
                self.written.extend_from_slice(data);
                (Vec::new(), US_CHANNEL_END | US_DEVICE_END)
            }
            _ => (Vec::new(), US_CHANNEL_END | US_DEVICE_END),
        }
    }
}
