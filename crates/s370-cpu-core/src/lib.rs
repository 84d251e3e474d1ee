//! System/370 instruction-execution core.
//!
//! The [`Cpu`] owns main storage (generic over `s370-mmu`'s `MainStorage`)
//! and the DAT state; the channel subsystem is handed in per cycle so the
//! CPU, channels, and scheduler never own each other. One [`Cpu::cycle`]
//! call dispatches a single pending interrupt or executes one instruction
//! and reports `(cycles_consumed, alive)`.

pub mod chan;
pub mod exception;
mod exec;
mod interrupt;
mod mem;
mod per;
pub mod psw;
mod state;
mod timer;

pub use chan::{Channel, NoChannel};
pub use exception::Exception;
pub use psw::PswFlags;
pub use s370_mmu::{Dat, MainStorage, TranslateFault, AMASK};
pub use state::{Cpu, StepInfo};
