//! Supervisor-state instructions: keys, control registers, masks, and the
//! B2 group.

use s370_cpu_core::{Cpu, NoChannel};
use s370_mem::MainStore;
use s370_mmu::MainStorage as _;

fn cpu_with(bytes: &[u8]) -> Cpu<MainStore> {
    let mut cpu = Cpu::new(MainStore::new(64 * 1024));
    cpu.mem.load_image(0x400, bytes).unwrap();
    cpu.pc = 0x400;
    cpu
}

fn step(cpu: &mut Cpu<MainStore>) {
    let mut chan = NoChannel;
    assert!(cpu.cycle(&mut chan).1);
}

#[test]
fn ssk_isk_roundtrip() {
    // SSK R1,R2 ; ISK R3,R2
    let mut cpu = cpu_with(&[0x08, 0x12, 0x09, 0x32]);
    cpu.regs[1] = 0x35;
    cpu.regs[2] = 0x1000;
    cpu.regs[3] = 0xFFFF_FFFF;
    step(&mut cpu);
    assert_eq!(cpu.mem.get_key(0x1000), 0x30);
    step(&mut cpu);
    assert_eq!(cpu.regs[3], 0xFFFF_FF30);
}

#[test]
fn ssk_requires_aligned_address() {
    let mut cpu = cpu_with(&[0x08, 0x12]);
    cpu.regs[2] = 0x1001;
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0006);
}

#[test]
fn privileged_ops_fault_in_problem_state() {
    let mut cpu = cpu_with(&[0x08, 0x12]);
    cpu.lpsw(0x0001_0000, 0x0000_0400);
    assert!(cpu.problem_state());
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0002);
}

#[test]
fn lctl_stctl_roundtrip_with_wrap() {
    // LCTL C14,C1,0x500 loads CR14,15,0,1; STCTL writes them back out.
    let mut cpu = cpu_with(&[0xB7, 0xE1, 0x05, 0x00, 0xB6, 0xE1, 0x06, 0x00]);
    // CR0 image keeps valid page/segment size fields.
    let values = [0x1111_1111, 0x2222_2222, 0x0080_00E0, 0x0000_7000];
    for (i, v) in values.iter().enumerate() {
        cpu.mem.put_word(0x500 + 4 * i as u32, *v).unwrap();
    }
    step(&mut cpu);
    assert_eq!(cpu.cregs[14], 0x1111_1111);
    assert_eq!(cpu.cregs[15], 0x2222_2222);
    assert_eq!(cpu.cregs[0], 0x0080_00E0);
    assert_eq!(cpu.cregs[1], 0x0000_7000);
    step(&mut cpu);
    for (i, v) in values.iter().enumerate() {
        assert_eq!(cpu.mem.get_word(0x600 + 4 * i as u32).unwrap(), *v);
    }
}

#[test]
fn stosm_stnsm_store_and_update_mask() {
    // STOSM 0x600,0x01 ; STNSM 0x601,0xFE
    let mut cpu = cpu_with(&[0xAD, 0x01, 0x06, 0x00, 0xAC, 0xFE, 0x06, 0x01]);
    step(&mut cpu);
    assert_eq!(cpu.read_byte(0x600).unwrap(), 0x00);
    assert!(cpu.ext_enb);
    step(&mut cpu);
    assert_eq!(cpu.read_byte(0x601).unwrap(), 0x01);
    assert!(!cpu.ext_enb);
}

#[test]
fn ssm_can_be_fenced_by_cr0() {
    let mut cpu = cpu_with(&[0x80, 0x00, 0x06, 0x00]);
    cpu.set_cr(0, cpu.cregs[0] | 0x4000_0000);
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0013);
}

#[test]
fn spka_and_ipk_move_the_psw_key() {
    // SPKA 0x50 ; IPK
    let mut cpu = cpu_with(&[0xB2, 0x0A, 0x00, 0x50, 0xB2, 0x0B, 0x00, 0x00]);
    step(&mut cpu);
    assert_eq!(cpu.st_key, 5);
    step(&mut cpu);
    assert_eq!(cpu.regs[2] & 0xFF, 0x50);
}

#[test]
fn stidp_stores_cpu_id() {
    let mut cpu = cpu_with(&[0xB2, 0x02, 0x06, 0x00]);
    step(&mut cpu);
    assert_eq!(cpu.read_dword(0x600).unwrap(), 0x0000_0001_0145_0000);
}

#[test]
fn sck_stck_roundtrip() {
    // STCK before the clock is set reports cc 1.
    let mut cpu = cpu_with(&[
        0xB2, 0x05, 0x06, 0x08, // STCK 0x608
        0xB2, 0x04, 0x06, 0x00, // SCK 0x600
        0xB2, 0x05, 0x06, 0x08, // STCK 0x608
    ]);
    cpu.mem.put_word(0x600, 0x1234_5678).unwrap();
    cpu.mem.put_word(0x604, 0x9ABC_DEF0).unwrap();
    step(&mut cpu);
    assert_eq!(cpu.cc, 1);
    step(&mut cpu);
    assert!(cpu.tod_set);
    step(&mut cpu);
    assert_eq!(cpu.cc, 0);
    assert_eq!(cpu.read_dword(0x608).unwrap(), 0x1234_5678_9ABC_DEF0);
}

#[test]
fn clock_comparator_and_timer_alignment_checks() {
    // SCKC with an unaligned operand.
    let mut cpu = cpu_with(&[0xB2, 0x06, 0x06, 0x04]);
    cpu.mem.put_word(0x604, 0).unwrap();
    cpu.pc = 0x400;
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0006);
}

#[test]
fn spt_stpt_roundtrip() {
    let mut cpu = cpu_with(&[0xB2, 0x08, 0x06, 0x00, 0xB2, 0x09, 0x06, 0x08]);
    cpu.mem.put_word(0x600, 0x0000_0123).unwrap();
    cpu.mem.put_word(0x604, 0x4567_89AB).unwrap();
    step(&mut cpu);
    assert_eq!(cpu.cpu_timer, [0x123, 0x4567_89AB]);
    step(&mut cpu);
    assert_eq!(cpu.read_dword(0x608).unwrap(), 0x0000_0123_4567_89AB);
}

#[test]
fn rrb_reports_and_clears_reference() {
    let mut cpu = cpu_with(&[0xB2, 0x13, 0x10, 0x00]);
    cpu.regs[1] = 0; // base register
    cpu.mem.put_key(0x1000, 0x36); // ref + change
    cpu.regs[1] = 0x1000;
    // RRB 0(R1): base 1, displacement 0.
    cpu.mem.load_image(0x400, &[0xB2, 0x13, 0x10, 0x00]).unwrap();
    step(&mut cpu);
    assert_eq!(cpu.cc, 3);
    assert_eq!(cpu.mem.get_key(0x1000), 0x32);
}

#[test]
fn monitor_call_gated_by_cr8() {
    let mut cpu = cpu_with(&[0xAF, 0x03, 0x00, 0x64]);
    cpu.set_cr(8, 0x8000 >> 3);
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0040);
    assert_eq!(cpu.mem.get_word(0x94).unwrap() >> 16, 3);

    // Masked off: no interruption.
    let mut cpu = cpu_with(&[0xAF, 0x03, 0x00, 0x64]);
    step(&mut cpu);
    assert_eq!(cpu.pc, 0x404);
    assert_eq!(cpu.mem.get_word(0x28).unwrap(), 0);
}

#[test]
fn test_and_set_is_atomic_read_set() {
    let mut cpu = cpu_with(&[0x93, 0x00, 0x08, 0x00]);
    cpu.mem.load_image(0x800, &[0x80]).unwrap();
    step(&mut cpu);
    assert_eq!(cpu.cc, 1);
    assert_eq!(cpu.read_byte(0x800).unwrap(), 0xFF);

    let mut cpu = cpu_with(&[0x93, 0x00, 0x08, 0x00]);
    step(&mut cpu);
    assert_eq!(cpu.cc, 0);
    assert_eq!(cpu.read_byte(0x800).unwrap(), 0xFF);
}

#[test]
fn sigp_and_extended_float_are_uninstalled() {
    for bytes in [
        vec![0xAE, 0x12, 0x00, 0x00], // SIGP
        vec![0x26, 0x02],             // MXR
        vec![0xB2, 0x10, 0x00, 0x00], // SPX
    ] {
        let mut cpu = cpu_with(&bytes);
        step(&mut cpu);
        assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0001);
    }
}

#[test]
fn channel_set_connect_is_set_zero_only() {
    let mut cpu = cpu_with(&[0xB2, 0x00, 0x00, 0x00, 0xB2, 0x01, 0x00, 0x01]);
    step(&mut cpu);
    assert_eq!(cpu.cc, 0);
    step(&mut cpu);
    assert_eq!(cpu.cc, 3);
}
