//! The machine facade: CPU + main store + channel set + event queue.
//!
//! The run loop is cooperative: each CPU cycle reports how many memory
//! cycles it consumed, the event queue advances by that amount, and due
//! events (the ~150 Hz clock tick, at nominal instruction pacing) fire
//! between cycles.

use s370_channel::{ChannelError, ChannelSet, Device};
use s370_cpu_core::{Cpu, PswFlags};
use s370_mem::MainStore;
use s370_timers::EventQueue;

#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    /// Main storage size in bytes (rounded up to 2KB).
    pub mem_size: u32,
    /// CPU cycles per clock tick; the default approximates 150 Hz at the
    /// model's nominal memory-cycle rate.
    pub tick_cycles: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            mem_size: 256 * 1024,
            tick_cycles: 3333,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The CPU cannot continue: wait state with every interrupt source
    /// masked, or a PSW swap walked off the end of storage.
    Halted,
    /// The cycle budget ran out first.
    BudgetExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Clock,
}

#[derive(Debug)]
pub struct Machine {
    pub cpu: Cpu<MainStore>,
    pub chan: ChannelSet,
    queue: EventQueue<Tick>,
    tick_cycles: u64,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        let mut queue = EventQueue::new();
        queue.schedule(config.tick_cycles, Tick::Clock);
        Machine {
            cpu: Cpu::new(MainStore::new(config.mem_size)),
            chan: ChannelSet::new(),
            queue,
            tick_cycles: config.tick_cycles,
        }
    }

    pub fn attach(&mut self, addr: u16, dev: Box<dyn Device>) {
        self.chan.attach(addr, dev);
    }

    /// Program reset; storage contents survive, CPU state does not.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Initial program load: the CPU waits with all channels unmasked
    /// while the boot record reads in; the completion interrupt loads the
    /// PSW the record placed at location 0.
    pub fn ipl(&mut self, dev: u16) -> Result<(), MachineError> {
        self.cpu.flags |= PswFlags::WAIT;
        self.cpu.sys_mask = 0xFFFF;
        self.cpu.irq_enb = true;
        self.chan.ipl_device(dev, &mut self.cpu.mem)?;
        Ok(())
    }

    /// One CPU cycle plus any events it made due.
    pub fn step(&mut self) -> (u32, bool) {
        let (cycles, alive) = self.cpu.cycle(&mut self.chan);
        self.queue.advance(cycles as u64);
        while let Some(ev) = self.queue.pop_due() {
            match ev.payload {
                Tick::Clock => {
                    self.cpu.update_clock();
                    let late = self.queue.now() - ev.deadline;
                    self.queue
                        .schedule(self.tick_cycles.saturating_sub(late).max(1), Tick::Clock);
                }
            }
        }
        (cycles, alive)
    }

    /// Run until the machine halts or `budget` cycles elapse.
    pub fn run(&mut self, budget: u64) -> RunExit {
        let mut spent = 0u64;
        while spent < budget {
            let (cycles, alive) = self.step();
            spent += cycles as u64;
            if !alive {
                tracing::error!(
                    pc = format_args!("{:06X}", self.cpu.pc),
                    flags = ?self.cpu.flags,
                    sys_mask = self.cpu.sys_mask,
                    "uninterruptible wait, halting"
                );
                return RunExit::Halted;
            }
        }
        RunExit::BudgetExhausted
    }
}
