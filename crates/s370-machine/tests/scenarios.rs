//! End-to-end machine scenarios: IPL, SIO/wait/interrupt/resume, and
//! clock ticks through the event queue.

use pretty_assertions::assert_eq;
use s370_channel::MemoryDevice;
use s370_cpu_core::Channel as _;
use s370_machine::{Machine, MachineConfig, RunExit};
use s370_mmu::MainStorage as _;

fn machine() -> Machine {
    Machine::new(MachineConfig::default())
}

#[test]
fn ipl_reads_boot_record_and_loads_psw() {
    let mut m = machine();
    let mut image = Vec::new();
    // IPL PSW: run at 0x800.
    image.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00]);
    // CCW1: read 8 bytes to 0x800 (SLI).
    image.extend_from_slice(&[0x02, 0x00, 0x08, 0x00, 0x20, 0x00, 0x00, 0x08]);
    // CCW2 unused.
    image.extend_from_slice(&[0; 8]);
    // The program: LPSW 0x808 into an enabled wait.
    image.extend_from_slice(&[0x82, 0x00, 0x08, 0x08, 0x00, 0x00, 0x00, 0x00]);
    m.attach(0x00F, Box::new(MemoryDevice::new(image)));

    m.ipl(0x00F).unwrap();
    assert!(m.cpu.wait_state());
    assert_eq!(m.cpu.sys_mask, 0xFFFF);

    // Enabled-wait PSW the program loads.
    m.cpu.mem.put_word(0x808, 0x0102_0000).unwrap();
    m.cpu.mem.put_word(0x80C, 0).unwrap();

    assert_eq!(m.run(1_000), RunExit::BudgetExhausted);
    // IPL completion recorded the device number at 0 and 0xBA.
    assert_eq!(m.cpu.mem.get_word(0x00).unwrap() & 0xFFFF, 0x00F);
    assert_eq!(m.cpu.mem.get_word(0xB8).unwrap() & 0xFFFF, 0x00F);
    assert!(m.cpu.wait_state());
    assert!(m.chan.loading().is_none());
}

#[test]
fn sio_wait_interrupt_resume() {
    let mut m = machine();
    m.attach(0x00F, Box::new(MemoryDevice::new(Vec::new())));

    // Program: SIO 0x00F ; LPSW 0x410.
    m.cpu
        .mem
        .load_image(0x400, &[0x9C, 0x00, 0x00, 0x0F, 0x82, 0x00, 0x04, 0x10])
        .unwrap();
    // Enabled-wait PSW.
    m.cpu.mem.put_word(0x410, 0xFF06_0000).unwrap();
    m.cpu.mem.put_word(0x414, 0x1400_0408).unwrap();
    // CAW and a one-CCW write program.
    m.cpu.mem.put_word(0x48, 0x0000_0500).unwrap();
    m.cpu.mem.put_word(0x500, 0x0100_0600).unwrap();
    m.cpu.mem.put_word(0x504, 0x0000_0008).unwrap();
    // New I/O PSW: resume disabled at 0x420.
    m.cpu.mem.put_word(0x78, 0).unwrap();
    m.cpu.mem.put_word(0x7C, 0x0000_0420).unwrap();
    m.cpu.pc = 0x400;

    m.step(); // SIO
    assert_eq!(m.cpu.cc, 0);
    m.step(); // LPSW into the wait
    assert!(m.cpu.wait_state());
    m.step(); // I/O interrupt

    assert_eq!(m.cpu.mem.get_word(0x40).unwrap(), 0x0000_0508);
    assert_eq!(m.cpu.mem.get_word(0x44).unwrap(), 0x0C00_0000);
    assert_eq!(m.cpu.mem.get_word(0x38).unwrap(), 0xFF06_000F);
    assert_eq!(m.cpu.mem.get_word(0x3C).unwrap(), 0x1400_0408);
    assert_eq!(m.cpu.pc, 0x420);
    assert!(!m.cpu.wait_state());
}

#[test]
fn clock_tick_fires_through_event_queue() {
    let mut m = Machine::new(MachineConfig {
        tick_cycles: 1,
        ..MachineConfig::default()
    });
    // Spin on BCR 0,0 (a no-op branch).
    m.cpu
        .mem
        .load_image(0x400, &[0x07, 0x00, 0x47, 0xF0, 0x04, 0x00])
        .unwrap();
    m.cpu.pc = 0x400;
    m.cpu.mem.put_word(0x50, 0x0000_0400).unwrap();

    let before = m.cpu.mem.get_word(0x50).unwrap();
    for _ in 0..4 {
        m.step();
    }
    let after = m.cpu.mem.get_word(0x50).unwrap();
    assert!(after < before, "interval timer should have decremented");
}

#[test]
fn halting_wait_reports_halt() {
    let mut m = machine();
    // Disabled wait at reset: PSW zeros with the wait bit.
    m.cpu.lpsw(0x0002_0000, 0);
    assert_eq!(m.run(1_000), RunExit::Halted);
}
