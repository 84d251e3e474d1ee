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

fn field(cpu: &mut Cpu<MainStore>, addr: u32, len: u32) -> Vec<u8> {
    (0..len).map(|i| cpu.read_byte(addr + i).unwrap()).collect()
}

#[test]
fn add_packed() {
    // AP 0x600(3),0x608(3): 123 + 45.
    let mut cpu = cpu_with(&[0xFA, 0x22, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x00, 0x12, 0x3C]).unwrap();
    cpu.mem.load_image(0x608, &[0x00, 0x04, 0x5C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 3), vec![0x00, 0x16, 0x8C]);
    assert_eq!(cpu.cc, 2);
}

#[test]
fn subtract_packed_goes_negative() {
    // SP 0x600(3),0x608(3): 45 - 123 = -78.
    let mut cpu = cpu_with(&[0xFB, 0x22, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x00, 0x04, 0x5C]).unwrap();
    cpu.mem.load_image(0x608, &[0x00, 0x12, 0x3C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 3), vec![0x00, 0x07, 0x8D]);
    assert_eq!(cpu.cc, 1);
}

#[test]
fn add_packed_overflow_sets_cc3() {
    // AP 0x600(1),0x601(1): 9 + 5 in a one-digit field.
    let mut cpu = cpu_with(&[0xFA, 0x00, 0x06, 0x00, 0x06, 0x01]);
    cpu.mem.load_image(0x600, &[0x9C, 0x5C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 1), vec![0x4C]);
    assert_eq!(cpu.cc, 3);
}

#[test]
fn invalid_sign_is_data_exception() {
    // AP with a digit in the sign position.
    let mut cpu = cpu_with(&[0xFA, 0x11, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x12, 0x34]).unwrap();
    cpu.mem.load_image(0x608, &[0x00, 0x1C]).unwrap();
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0007);
}

#[test]
fn zero_and_add_then_compare() {
    // ZAP 0x600(3),0x608(2) ; CP 0x600(3),0x608(2)
    let mut cpu = cpu_with(&[
        0xF8, 0x21, 0x06, 0x00, 0x06, 0x08,
        0xF9, 0x21, 0x06, 0x00, 0x06, 0x08,
    ]);
    cpu.mem.load_image(0x600, &[0xFF, 0xFF, 0xFF]).unwrap();
    cpu.mem.load_image(0x608, &[0x77, 0x7D]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 3), vec![0x00, 0x77, 0x7D]);
    assert_eq!(cpu.cc, 1);
    step(&mut cpu);
    assert_eq!(cpu.cc, 0);
}

#[test]
fn multiply_then_divide_packed() {
    // MP 0x600(4),0x608(1): 123 * 4 = 492.
    let mut cpu = cpu_with(&[0xFC, 0x30, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x00, 0x00, 0x12, 0x3C]).unwrap();
    cpu.mem.load_image(0x608, &[0x4C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 4), vec![0x00, 0x00, 0x49, 0x2C]);

    // DP 0x600(4),0x608(1): 492 / 4 -> quotient 123, remainder 0.
    let mut cpu = cpu_with(&[0xFD, 0x30, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x00, 0x00, 0x49, 0x2C]).unwrap();
    cpu.mem.load_image(0x608, &[0x4C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 4), vec![0x00, 0x12, 0x3C, 0x0C]);
}

#[test]
fn decimal_divide_by_zero() {
    let mut cpu = cpu_with(&[0xFD, 0x30, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x00, 0x00, 0x49, 0x2C]).unwrap();
    cpu.mem.load_image(0x608, &[0x0C]).unwrap();
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x000B);
}

#[test]
fn pack_and_unpack() {
    // PACK 0x610(3),0x618(3) from zoned "123+".
    let mut cpu = cpu_with(&[0xF2, 0x22, 0x06, 0x10, 0x06, 0x18]);
    cpu.mem.load_image(0x618, &[0xF1, 0xF2, 0xC3]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x610, 3), vec![0x00, 0x12, 0x3C]);

    // UNPK 0x620(5),0x610(3) back to zoned.
    let mut cpu = cpu_with(&[0xF3, 0x42, 0x06, 0x20, 0x06, 0x10]);
    cpu.mem.load_image(0x610, &[0x00, 0x12, 0x3C]).unwrap();
    step(&mut cpu);
    assert_eq!(
        field(&mut cpu, 0x620, 5),
        vec![0xF0, 0xF0, 0xF1, 0xF2, 0xC3]
    );
}

#[test]
fn move_with_offset() {
    // MVO 0x600(4),0x608(3): source digits slide over the sign nibble.
    let mut cpu = cpu_with(&[0xF1, 0x32, 0x06, 0x00, 0x06, 0x08]);
    cpu.mem.load_image(0x600, &[0x77, 0x88, 0x99, 0x2C]).unwrap();
    cpu.mem.load_image(0x608, &[0x12, 0x34, 0x56]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 4), vec![0x01, 0x23, 0x45, 0x6C]);
}

#[test]
fn convert_to_decimal_and_back() {
    // CVD R1,0x700 ; CVB R2,0x700
    let mut cpu = cpu_with(&[0x4E, 0x10, 0x07, 0x00, 0x4F, 0x20, 0x07, 0x00]);
    cpu.regs[1] = (-123i32) as u32;
    step(&mut cpu);
    assert_eq!(
        field(&mut cpu, 0x700, 8),
        vec![0, 0, 0, 0, 0, 0, 0x12, 0x3D]
    );
    step(&mut cpu);
    assert_eq!(cpu.regs[2], (-123i32) as u32);
}

#[test]
fn cvb_overflow_is_fixed_divide() {
    let mut cpu = cpu_with(&[0x4F, 0x20, 0x07, 0x00]);
    // 99,999,999,999 does not fit in 32 bits.
    cpu.mem
        .load_image(0x700, &[0, 0, 0x09, 0x99, 0x99, 0x99, 0x99, 0x9C])
        .unwrap();
    step(&mut cpu);
    assert_eq!(cpu.mem.get_word(0x28).unwrap() & 0xFFFF, 0x0009);
}

#[test]
fn shift_round_packed() {
    // SRP 0x600(3),2,0: shift 123 left two digits.
    let mut cpu = cpu_with(&[0xF0, 0x20, 0x06, 0x00, 0x00, 0x02]);
    cpu.mem.load_image(0x600, &[0x00, 0x12, 0x3C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 3), vec![0x12, 0x30, 0x0C]);
    assert_eq!(cpu.cc, 2);

    // SRP 0x600(3),0x3F,5: shift right one with rounding.
    let mut cpu = cpu_with(&[0xF0, 0x25, 0x06, 0x00, 0x00, 0x3F]);
    cpu.mem.load_image(0x600, &[0x00, 0x12, 0x3C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x600, 3), vec![0x00, 0x01, 0x2C]);
}

#[test]
fn edit_produces_printable_field() {
    // ED 0x700(3),0x708 over pattern fill,DS,DS,DS and source 012+.
    let mut cpu = cpu_with(&[0xDE, 0x03, 0x07, 0x00, 0x07, 0x08]);
    cpu.mem
        .load_image(0x700, &[0x40, 0x20, 0x20, 0x20])
        .unwrap();
    cpu.mem.load_image(0x708, &[0x01, 0x2C]).unwrap();
    step(&mut cpu);
    assert_eq!(field(&mut cpu, 0x700, 4), vec![0x40, 0x40, 0xF1, 0xF2]);
    assert_eq!(cpu.cc, 2);
}

#[test]
fn edit_negative_sets_cc1_and_edmk_marks() {
    // EDMK on a negative source leaves significance on.
    let mut cpu = cpu_with(&[0xDF, 0x03, 0x07, 0x00, 0x07, 0x08]);
    cpu.mem
        .load_image(0x700, &[0x40, 0x20, 0x20, 0x20])
        .unwrap();
    cpu.mem.load_image(0x708, &[0x01, 0x2D]).unwrap();
    cpu.regs[1] = 0xAA00_0000;
    step(&mut cpu);
    assert_eq!(cpu.cc, 1);
    // R1 low 24 bits point at the first significant result byte.
    assert_eq!(cpu.regs[1], 0xAA00_0702);
}
