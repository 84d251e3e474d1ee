use s370_cpu_core::{Cpu, NoChannel};
use s370_mem::MainStore;
use s370_mmu::MainStorage as _;

fn cpu() -> Cpu<MainStore> {
    Cpu::new(MainStore::new(64 * 1024))
}

fn step(cpu: &mut Cpu<MainStore>) -> bool {
    let mut chan = NoChannel;
    cpu.cycle(&mut chan).1
}

#[test]
fn odd_pc_raises_specification_with_ilc_zero() {
    let mut cpu = cpu();
    // New program PSW: continue at 0x800.
    cpu.mem.put_word(0x68, 0).unwrap();
    cpu.mem.put_word(0x6C, 0x800).unwrap();
    cpu.lpsw(0, 0x0000_0401);
    assert!(step(&mut cpu));

    // Old program PSW: code 6, ILC 0, PC still the odd address.
    assert_eq!(cpu.mem.get_word(0x28).unwrap(), 0x0000_0006);
    assert_eq!(cpu.mem.get_word(0x2C).unwrap(), 0x0000_0401);
    assert_eq!(cpu.pc, 0x800);
}

#[test]
fn svc_stores_old_psw_and_code_in_ec_mode() {
    let mut cpu = cpu();
    cpu.mem.load_image(0x404, &[0x0A, 0x21]).unwrap();
    // EC PSW: key 5, cc 2, program mask 9, at 0x404.
    let w1 = 0x0058_2900;
    cpu.lpsw(w1, 0x0000_0404);
    assert!(step(&mut cpu));

    assert_eq!(cpu.mem.get_word(0x20).unwrap(), w1);
    assert_eq!(cpu.mem.get_word(0x24).unwrap(), 0x0000_0406);
    assert_eq!(cpu.mem.get_word(0x88).unwrap(), (1 << 17) | 0x21);

    // Loading the stored PSW restores the interrupted state.
    let old1 = cpu.mem.get_word(0x20).unwrap();
    let old2 = cpu.mem.get_word(0x24).unwrap();
    cpu.lpsw(old1, old2);
    assert!(cpu.ec_mode());
    assert_eq!(cpu.st_key, 5);
    assert_eq!(cpu.cc, 2);
    assert_eq!(cpu.prog_mask, 9);
    assert_eq!(cpu.pc, 0x406);
}

#[test]
fn protection_fault_suppresses_store_and_restarts() {
    let mut cpu = cpu();
    // ST R1,0x900 with PSW key 2; the target block is keyed 1.
    cpu.mem.load_image(0x400, &[0x50, 0x10, 0x09, 0x00]).unwrap();
    cpu.mem.put_key(0x800, 0x10);
    cpu.mem.put_key(0x000, 0x20); // instruction fetch stays legal
    cpu.regs[1] = 0xDEAD_BEEF;
    cpu.lpsw(0x0020_0000, 0x0000_0400);
    assert!(step(&mut cpu));

    assert_eq!(cpu.mem.get_word(0x900).unwrap(), 0);
    assert_eq!(cpu.regs[1], 0xDEAD_BEEF);
    // Old PSW: code 4, PC backed up to the instruction start.
    let w1 = cpu.mem.get_word(0x28).unwrap();
    let w2 = cpu.mem.get_word(0x2C).unwrap();
    assert_eq!(w1 & 0xFFFF, 0x0004);
    assert_eq!(w2 & 0x00FF_FFFF, 0x400);
}

#[test]
fn uninterruptible_wait_is_fatal() {
    let mut cpu = cpu();
    cpu.lpsw(0x0002_0000, 0);
    assert!(cpu.wait_state());
    assert!(!step(&mut cpu));
}

#[test]
fn enabled_wait_idles() {
    let mut cpu = cpu();
    // Wait with the external mask on: nothing pending, but resumable.
    cpu.lpsw(0x0102_0000, 0);
    assert!(step(&mut cpu));
    assert!(cpu.wait_state());
}

#[test]
fn external_interrupts_follow_priority_order() {
    let mut cpu = cpu();
    // Both the external signal and the interval timer are pending.
    cpu.post_ext_irq();
    cpu.int_irq = true;
    // New external PSW re-enters an enabled wait so the second interrupt
    // can be taken.
    cpu.mem.put_word(0x58, 0x0102_0000).unwrap();
    cpu.mem.put_word(0x5C, 0).unwrap();
    cpu.lpsw(0x0102_0000, 0);

    assert!(step(&mut cpu));
    assert_eq!(cpu.mem.get_word(0x18).unwrap() & 0xFFFF, 0x0040);

    assert!(step(&mut cpu));
    assert_eq!(cpu.mem.get_word(0x18).unwrap() & 0xFFFF, 0x0080);
    assert!(!cpu.ext_irq);
    assert!(!cpu.int_irq);
}

#[test]
fn psw_with_reserved_bits_traps_on_next_cycle() {
    let mut cpu = cpu();
    // EC PSW with a must-be-zero bit (bit 0) set.
    cpu.lpsw(0x8008_0000, 0x0000_0400);
    assert!(step(&mut cpu));
    // Specification, ILC 0, before any instruction executes.
    assert_eq!(cpu.mem.get_word(0x8C).unwrap(), 0x0006);
    assert_eq!(cpu.mem.get_word(0x2C).unwrap(), 0x0000_0400);
}

#[test]
fn bc_mode_sysmask_expands_channel_bits() {
    let mut cpu = cpu();
    // Channels 0-5 from the PSW byte; bit 6 pulls channels 6-15 from CR2.
    cpu.set_cr(2, 0x0000_03FF);
    cpu.lpsw(0xFF00_0000, 0);
    assert_eq!(cpu.sys_mask, 0xFFFF);
    assert!(cpu.ext_enb);
    assert!(cpu.irq_enb);

    cpu.lpsw(0xFC00_0000, 0);
    assert_eq!(cpu.sys_mask, 0xFC00);
    assert!(!cpu.ext_enb);
}
