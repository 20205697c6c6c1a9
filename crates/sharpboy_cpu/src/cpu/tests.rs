use super::*;
use crate::memory::{IE_ADDR, IF_ADDR, JOYP_ADDR};
use crate::opcode::OpcodeTable;
use once_cell::sync::OnceCell;

static TABLE: OnceCell<OpcodeTable> = OnceCell::new();

fn table() -> &'static OpcodeTable {
    TABLE.get_or_init(|| OpcodeTable::load_default().expect("bundled opcode table"))
}

const ORIGIN: u16 = 0xC000;

struct TestBus {
    memory: Box<[u8; 0x10000]>,
    ticked: u32,
}

impl Default for TestBus {
    fn default() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            ticked: 0,
        }
    }
}

impl Bus for TestBus {
    fn read8(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write8(&mut self, addr: u16, value: u8) {
        self.memory[addr as usize] = value;
    }

    fn tick(&mut self, cycles: u32) {
        self.ticked += cycles;
    }
}

/// Post-boot CPU with `program` placed at `ORIGIN` in work RAM.
fn setup(program: &[u8]) -> (Cpu, TestBus) {
    let mut bus = TestBus::default();
    let start = ORIGIN as usize;
    bus.memory[start..start + program.len()].copy_from_slice(program);
    let mut regs = Registers::post_boot();
    regs.pc = ORIGIN;
    (Cpu::with_registers(regs), bus)
}

fn step(cpu: &mut Cpu, bus: &mut TestBus) -> u32 {
    cpu.step(table(), bus)
}

#[test]
fn nop_only_advances_pc() {
    let (mut cpu, mut bus) = setup(&[0x00]);
    let before = cpu.regs;
    assert_eq!(step(&mut cpu, &mut bus), 4);
    let mut expected = before;
    expected.pc = ORIGIN + 1;
    assert_eq!(cpu.regs, expected);
    assert_eq!(bus.ticked, 4);
}

#[test]
fn ld_bc_immediate_word() {
    let (mut cpu, mut bus) = setup(&[0x01, 0x34, 0x12]);
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(cpu.regs.bc(), 0x1234);
    assert_eq!(cpu.regs.pc, ORIGIN + 3);
}

#[test]
fn ld_bc_immediate_word_micro_steps() {
    let (mut cpu, mut bus) = setup(&[0x01, 0x34, 0x12]);
    assert_eq!(cpu.step_micro(table(), &mut bus), 4);
    assert_eq!(cpu.state(), CpuState::Execute);
    assert_eq!(cpu.step_micro(table(), &mut bus), 4);
    assert_eq!(cpu.step_micro(table(), &mut bus), 4);
    // Both bytes read, but BC is only written by a later register step.
    assert_eq!(cpu.regs.bc(), 0x0013);
    let mut total = 12;
    while cpu.state() == CpuState::Execute {
        total += cpu.step_micro(table(), &mut bus);
    }
    assert_eq!(total, 12);
    assert_eq!(cpu.regs.bc(), 0x1234);
    assert_eq!(cpu.cycles(), 12);
    assert_eq!(cpu.instructions(), 1);
}

#[test]
fn call_pushes_return_address() {
    let mut bus = TestBus::default();
    bus.memory[0x0100..0x0103].copy_from_slice(&[0xCD, 0x34, 0x12]);
    let mut cpu = Cpu::new();
    assert_eq!(cpu.regs.pc, 0x0100);
    assert_eq!(cpu.regs.sp, 0xFFFE);

    assert_eq!(step(&mut cpu, &mut bus), 24);
    assert_eq!(cpu.regs.pc, 0x1234);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(stack::peek(cpu.regs.sp, &mut bus), 0x0103);
}

#[test]
fn ret_returns_to_caller() {
    // CALL C010; ... C010: RET
    let mut program = vec![0xCD, 0x10, 0xC0];
    program.resize(0x10, 0x00);
    program.push(0xC9);
    let (mut cpu, mut bus) = setup(&program);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.pc, 0xC010);
    assert_eq!(step(&mut cpu, &mut bus), 16);
    assert_eq!(cpu.regs.pc, ORIGIN + 3);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn conditional_jr_cycles() {
    // JR NZ,+5
    let (mut cpu, mut bus) = setup(&[0x20, 0x05]);
    cpu.regs.set_flag(Flag::Z, true);
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);

    let (mut cpu, mut bus) = setup(&[0x20, 0x05]);
    cpu.regs.set_flag(Flag::Z, false);
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(cpu.regs.pc, ORIGIN + 2 + 5);

    // JR -2 loops onto itself.
    let (mut cpu, mut bus) = setup(&[0x18, 0xFE]);
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(cpu.regs.pc, ORIGIN);
}

#[test]
fn conditional_call_and_ret_cycles() {
    // CALL NC,a16 with carry set: not taken.
    let (mut cpu, mut bus) = setup(&[0xD4, 0x00, 0xD0]);
    cpu.regs.set_flag(Flag::C, true);
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(cpu.regs.pc, ORIGIN + 3);
    assert_eq!(cpu.regs.sp, 0xFFFE);

    // RET Z taken / not taken.
    let (mut cpu, mut bus) = setup(&[0xC8]);
    cpu.regs.sp = 0xDFF0;
    bus.memory[0xDFF0] = 0x34;
    bus.memory[0xDFF1] = 0x12;
    cpu.regs.set_flag(Flag::Z, false);
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.regs.pc, ORIGIN + 1);
    assert_eq!(cpu.regs.sp, 0xDFF0);

    let (mut cpu, mut bus) = setup(&[0xC8]);
    cpu.regs.sp = 0xDFF0;
    bus.memory[0xDFF0] = 0x34;
    bus.memory[0xDFF1] = 0x12;
    cpu.regs.set_flag(Flag::Z, true);
    assert_eq!(step(&mut cpu, &mut bus), 20);
    assert_eq!(cpu.regs.pc, 0x1234);
    assert_eq!(cpu.regs.sp, 0xDFF2);

    // JP C,a16 taken.
    let (mut cpu, mut bus) = setup(&[0xDA, 0x00, 0x20]);
    cpu.regs.set_flag(Flag::C, true);
    assert_eq!(step(&mut cpu, &mut bus), 16);
    assert_eq!(cpu.regs.pc, 0x2000);
}

#[test]
fn push_pop_round_trip() {
    // PUSH BC; POP DE
    let (mut cpu, mut bus) = setup(&[0xC5, 0xD1]);
    cpu.regs.set_bc(0xBEEF);
    let sp = cpu.regs.sp;
    assert_eq!(step(&mut cpu, &mut bus), 16);
    assert_eq!(cpu.regs.sp, sp.wrapping_sub(2));
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(cpu.regs.de(), 0xBEEF);
    assert_eq!(cpu.regs.sp, sp);
}

#[test]
fn push_at_zero_wraps() {
    let (mut cpu, mut bus) = setup(&[0xC5]);
    cpu.regs.sp = 0x0000;
    cpu.regs.set_bc(0x1234);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.sp, 0xFFFE);
    assert_eq!(bus.memory[0xFFFE], 0x34);
    assert_eq!(bus.memory[0xFFFF], 0x12);
}

#[test]
fn pop_af_clears_low_nibble() {
    let (mut cpu, mut bus) = setup(&[0xF1]);
    cpu.regs.sp = 0xDFF0;
    bus.memory[0xDFF0] = 0xFF;
    bus.memory[0xDFF1] = 0x12;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x12);
    assert_eq!(cpu.regs.f, 0xF0);

    let (mut cpu, mut bus) = setup(&[0xF1]);
    cpu.regs.sp = 0xDFF0;
    bus.memory[0xDFF0] = 0x5A;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, 0x50);
}

#[test]
fn daa_double_adjust() {
    let (mut cpu, mut bus) = setup(&[0x27]);
    cpu.regs.a = 0x9A;
    cpu.regs.f = 0;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x00);
    assert!(cpu.regs.flag(Flag::Z));
    assert!(cpu.regs.flag(Flag::C));
    assert!(!cpu.regs.flag(Flag::H));
    assert!(!cpu.regs.flag(Flag::N));
}

#[test]
fn bcd_addition_via_daa() {
    // ADD A,B; DAA: 0x19 + 0x28 = 0x47 in BCD.
    let (mut cpu, mut bus) = setup(&[0x80, 0x27]);
    cpu.regs.a = 0x19;
    cpu.regs.b = 0x28;
    step(&mut cpu, &mut bus);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x47);
    assert!(!cpu.regs.flag(Flag::C));
}

#[test]
fn eight_bit_add_matches_reference() {
    for x in (0u16..=0xFF).step_by(3) {
        for y in (0u16..=0xFF).step_by(11) {
            // ADD A,B
            let (mut cpu, mut bus) = setup(&[0x80]);
            cpu.regs.a = x as u8;
            cpu.regs.b = y as u8;
            cpu.regs.f = 0;
            step(&mut cpu, &mut bus);
            assert_eq!(cpu.regs.a as u16, (x + y) & 0xFF);
            assert_eq!(cpu.regs.flag(Flag::C), x + y > 0xFF);
            assert_eq!(cpu.regs.flag(Flag::H), (x & 0xF) + (y & 0xF) > 0xF);
            assert_eq!(cpu.regs.flag(Flag::Z), (x + y) & 0xFF == 0);
            assert!(!cpu.regs.flag(Flag::N));
        }
    }
}

#[test]
fn sub_and_cp_flags() {
    // SUB A,n8 / CP A,n8
    let (mut cpu, mut bus) = setup(&[0xD6, 0x01, 0xFE, 0x00]);
    cpu.regs.a = 0x10;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x0F);
    assert!(cpu.regs.flag(Flag::H));
    assert!(cpu.regs.flag(Flag::N));
    assert!(!cpu.regs.flag(Flag::C));
    step(&mut cpu, &mut bus);
    // CP leaves A alone.
    assert_eq!(cpu.regs.a, 0x0F);
    assert!(!cpu.regs.flag(Flag::Z));
}

#[test]
fn cp_sets_zero_only_on_match() {
    // LD A,$3C; CP A,$3C; CP A,$40; LD A,$00; CP A,$01; CP A,$00
    let (mut cpu, mut bus) = setup(&[
        0x3E, 0x3C, 0xFE, 0x3C, 0xFE, 0x40, 0x3E, 0x00, 0xFE, 0x01, 0xFE, 0x00,
    ]);
    step(&mut cpu, &mut bus);
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.regs.f, 0xC0);
    assert_eq!(cpu.regs.a, 0x3C);

    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, 0x50);
    assert_eq!(cpu.regs.a, 0x3C);

    step(&mut cpu, &mut bus);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, 0x70);
    assert_eq!(cpu.regs.a, 0x00);

    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, 0xC0);
}

#[test]
fn cp_driven_countdown_loop() {
    // loop: INC B; LD A,B; CP A,$05; JR NZ,loop; HALT
    let (mut cpu, mut bus) = setup(&[0x04, 0x78, 0xFE, 0x05, 0x20, 0xFA, 0x76]);
    cpu.regs.b = 0;
    for _ in 0..50 {
        step(&mut cpu, &mut bus);
        if cpu.state() == CpuState::Halted {
            break;
        }
    }
    assert_eq!(cpu.state(), CpuState::Halted);
    assert_eq!(cpu.regs.b, 5);
    assert_eq!(cpu.regs.pc, ORIGIN + 7);
}

#[test]
fn xor_a_clears_and_sets_zero() {
    let (mut cpu, mut bus) = setup(&[0xAF]);
    cpu.regs.f = 0x70;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0);
    assert_eq!(cpu.regs.f, Flag::Z.mask());
}

#[test]
fn bit_res_set_touch_only_target() {
    for index in 0..8u8 {
        for value in [0x00u8, 0xFF, 0xA5] {
            // BIT n,B
            let (mut cpu, mut bus) = setup(&[0xCB, 0x40 | (index << 3)]);
            cpu.regs.b = value;
            cpu.regs.set_flag(Flag::C, true);
            assert_eq!(step(&mut cpu, &mut bus), 8);
            assert_eq!(cpu.regs.b, value);
            assert_eq!(cpu.regs.flag(Flag::Z), value & (1 << index) == 0);
            assert!(cpu.regs.flag(Flag::H));
            assert!(cpu.regs.flag(Flag::C));

            // RES n,(HL)
            let (mut cpu, mut bus) = setup(&[0xCB, 0x86 | (index << 3)]);
            cpu.regs.set_hl(0xD000);
            bus.memory[0xD000] = value;
            let f = cpu.regs.f;
            assert_eq!(step(&mut cpu, &mut bus), 16);
            assert_eq!(bus.memory[0xD000], value & !(1 << index));
            assert_eq!(cpu.regs.f, f);

            // SET n,A
            let (mut cpu, mut bus) = setup(&[0xCB, 0xC7 | (index << 3)]);
            cpu.regs.a = value;
            step(&mut cpu, &mut bus);
            assert_eq!(cpu.regs.a, value | (1 << index));
        }
    }
}

#[test]
fn cb_swap_and_rotate_flags() {
    // SWAP A; RL B
    let (mut cpu, mut bus) = setup(&[0xCB, 0x37, 0xCB, 0x10]);
    cpu.regs.a = 0xF0;
    cpu.regs.b = 0x80;
    cpu.regs.f = 0;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x0F);
    assert_eq!(cpu.regs.f, 0);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.b, 0x00);
    assert!(cpu.regs.flag(Flag::Z));
    assert!(cpu.regs.flag(Flag::C));
}

#[test]
fn rlca_never_sets_zero() {
    let (mut cpu, mut bus) = setup(&[0x07]);
    cpu.regs.a = 0x00;
    cpu.regs.f = 0xF0;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, 0x00);
    let (mut cpu, mut bus) = setup(&[0x07]);
    cpu.regs.a = 0x80;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x01);
    assert_eq!(cpu.regs.f, Flag::C.mask());
}

#[test]
fn inc_memory_uses_post_operation_value() {
    // INC (HL)
    let (mut cpu, mut bus) = setup(&[0x34]);
    cpu.regs.set_hl(0xD000);
    bus.memory[0xD000] = 0x0F;
    cpu.regs.f = Flag::C.mask() | Flag::N.mask();
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(bus.memory[0xD000], 0x10);
    assert!(cpu.regs.flag(Flag::H));
    assert!(!cpu.regs.flag(Flag::Z));
    assert!(!cpu.regs.flag(Flag::N));
    assert!(cpu.regs.flag(Flag::C));

    // DEC (HL) to zero.
    let (mut cpu, mut bus) = setup(&[0x35]);
    cpu.regs.set_hl(0xD000);
    bus.memory[0xD000] = 0x01;
    step(&mut cpu, &mut bus);
    assert_eq!(bus.memory[0xD000], 0x00);
    assert!(cpu.regs.flag(Flag::Z));
    assert!(cpu.regs.flag(Flag::N));
}

#[test]
fn inc16_leaves_flags() {
    let (mut cpu, mut bus) = setup(&[0x03]);
    cpu.regs.set_bc(0xFFFF);
    let f = cpu.regs.f;
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.regs.bc(), 0x0000);
    assert_eq!(cpu.regs.f, f);
}

#[test]
fn hl_increment_and_decrement_loads() {
    // LD (HL+),A; LD A,(HL-)
    let (mut cpu, mut bus) = setup(&[0x22, 0x3A]);
    cpu.regs.set_hl(0xD000);
    cpu.regs.a = 0x42;
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(bus.memory[0xD000], 0x42);
    assert_eq!(cpu.regs.hl(), 0xD001);
    bus.memory[0xD001] = 0x99;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x99);
    assert_eq!(cpu.regs.hl(), 0xD000);
}

#[test]
fn high_page_loads() {
    // LDH (a8),A; LDH A,(C)
    let (mut cpu, mut bus) = setup(&[0xE0, 0x80, 0xF2]);
    cpu.regs.a = 0x5A;
    cpu.regs.c = 0x81;
    bus.memory[0xFF81] = 0x77;
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(bus.memory[0xFF80], 0x5A);
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.regs.a, 0x77);
}

#[test]
fn store_sp_to_absolute() {
    let (mut cpu, mut bus) = setup(&[0x08, 0x00, 0xD1]);
    cpu.regs.sp = 0xABCD;
    assert_eq!(step(&mut cpu, &mut bus), 20);
    assert_eq!(bus.memory[0xD100], 0xCD);
    assert_eq!(bus.memory[0xD101], 0xAB);
}

#[test]
fn add_sp_and_ld_hl_sp_offset() {
    // ADD SP,-8; LD HL,SP+2
    let (mut cpu, mut bus) = setup(&[0xE8, 0xF8, 0xF8, 0x02]);
    cpu.regs.sp = 0xFFF8;
    assert_eq!(step(&mut cpu, &mut bus), 16);
    assert_eq!(cpu.regs.sp, 0xFFF0);
    // 0xF8 + 0xF8 carries out of both the nibble and the byte.
    assert!(cpu.regs.flag(Flag::C));
    assert!(cpu.regs.flag(Flag::H));
    assert!(!cpu.regs.flag(Flag::Z));
    assert_eq!(step(&mut cpu, &mut bus), 12);
    assert_eq!(cpu.regs.hl(), 0xFFF2);
    assert_eq!(cpu.regs.sp, 0xFFF0);
}

#[test]
fn add_hl_carries_from_bit_eleven() {
    let (mut cpu, mut bus) = setup(&[0x09]);
    cpu.regs.set_hl(0x0FFF);
    cpu.regs.set_bc(0x0001);
    cpu.regs.f = Flag::Z.mask();
    assert_eq!(step(&mut cpu, &mut bus), 8);
    assert_eq!(cpu.regs.hl(), 0x1000);
    assert!(cpu.regs.flag(Flag::H));
    assert!(!cpu.regs.flag(Flag::C));
    assert!(cpu.regs.flag(Flag::Z));
}

#[test]
fn rst_jumps_to_vector() {
    let (mut cpu, mut bus) = setup(&[0xFF]);
    assert_eq!(step(&mut cpu, &mut bus), 16);
    assert_eq!(cpu.regs.pc, 0x0038);
    assert_eq!(stack::peek(cpu.regs.sp, &mut bus), ORIGIN + 1);
}

#[test]
fn scf_ccf_cpl() {
    // SCF; CCF; CPL
    let (mut cpu, mut bus) = setup(&[0x37, 0x3F, 0x2F]);
    cpu.regs.a = 0x0F;
    cpu.regs.f = Flag::Z.mask() | Flag::H.mask();
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, Flag::Z.mask() | Flag::C.mask());
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.f, Flag::Z.mask());
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0xF0);
    assert_eq!(cpu.regs.f, Flag::Z.mask() | Flag::N.mask() | Flag::H.mask());
}

#[test]
fn unmapped_opcode_is_one_byte_skip() {
    let (mut cpu, mut bus) = setup(&[0xD3, 0x00]);
    let before = cpu.regs;
    assert_eq!(step(&mut cpu, &mut bus), 4);
    let mut expected = before;
    expected.pc = ORIGIN + 1;
    assert_eq!(cpu.regs, expected);
    assert_eq!(cpu.state(), CpuState::Fetch);
    // The run continues with the next byte.
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
}

#[test]
fn ei_enables_after_following_instruction() {
    // EI; NOP; NOP
    let (mut cpu, mut bus) = setup(&[0xFB, 0x00, 0x00]);
    bus.memory[IE_ADDR as usize] = 0x01;
    bus.memory[IF_ADDR as usize] = 0x01;

    step(&mut cpu, &mut bus);
    assert!(!cpu.ime());
    assert_eq!(cpu.regs.pc, ORIGIN + 1);

    // The instruction after EI still runs before any dispatch.
    step(&mut cpu, &mut bus);
    assert!(cpu.ime());
    assert_eq!(cpu.regs.pc, ORIGIN + 2);

    assert_eq!(step(&mut cpu, &mut bus), 20);
    assert_eq!(cpu.regs.pc, 0x0040);
    assert!(!cpu.ime());
    assert_eq!(bus.memory[IF_ADDR as usize], 0x00);
    assert_eq!(stack::peek(cpu.regs.sp, &mut bus), ORIGIN + 2);
}

#[test]
fn dispatch_picks_lowest_pending_bit() {
    let (mut cpu, mut bus) = setup(&[0x00]);
    cpu.set_ime(true);
    bus.memory[IE_ADDR as usize] = 0x1F;
    bus.memory[IF_ADDR as usize] = 0x0C;
    assert_eq!(step(&mut cpu, &mut bus), 20);
    assert_eq!(cpu.regs.pc, 0x0050);
    assert_eq!(bus.memory[IF_ADDR as usize], 0x08);
}

#[test]
fn di_blocks_dispatch() {
    // DI; NOP
    let (mut cpu, mut bus) = setup(&[0xF3, 0x00]);
    cpu.set_ime(true);
    step(&mut cpu, &mut bus);
    bus.memory[IE_ADDR as usize] = 0x01;
    bus.memory[IF_ADDR as usize] = 0x01;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
}

#[test]
fn reti_enables_immediately() {
    let (mut cpu, mut bus) = setup(&[0xD9]);
    cpu.regs.sp = 0xDFF0;
    bus.memory[0xDFF0] = 0x00;
    bus.memory[0xDFF1] = 0xC1;
    assert_eq!(step(&mut cpu, &mut bus), 16);
    assert!(cpu.ime());
    assert_eq!(cpu.regs.pc, 0xC100);
}

#[test]
fn halt_idles_until_interrupt_requested() {
    // HALT; INC A
    let (mut cpu, mut bus) = setup(&[0x76, 0x3C]);
    bus.memory[IE_ADDR as usize] = 0x04;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state(), CpuState::Halted);
    assert_eq!(cpu.regs.pc, ORIGIN + 1);

    for _ in 0..10 {
        assert_eq!(step(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.state(), CpuState::Halted);
    }

    bus.memory[IF_ADDR as usize] = 0x04;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state(), CpuState::Fetch);
    // IME clear: execution resumes after HALT without dispatching.
    let a = cpu.regs.a;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, a.wrapping_add(1));
    assert_eq!(bus.memory[IF_ADDR as usize], 0x04);
}

#[test]
fn halt_with_ime_dispatches_on_wake() {
    let (mut cpu, mut bus) = setup(&[0x76, 0x00]);
    cpu.set_ime(true);
    bus.memory[IE_ADDR as usize] = 0x04;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state(), CpuState::Halted);
    bus.memory[IF_ADDR as usize] = 0x04;
    step(&mut cpu, &mut bus);
    assert_eq!(step(&mut cpu, &mut bus), 20);
    assert_eq!(cpu.regs.pc, 0x0050);
    assert_eq!(stack::peek(cpu.regs.sp, &mut bus), ORIGIN + 1);
}

#[test]
fn halt_with_ime_and_pending_interrupt_dispatches_at_once() {
    // HALT; NOP
    let (mut cpu, mut bus) = setup(&[0x76, 0x00]);
    cpu.set_ime(true);
    bus.memory[IE_ADDR as usize] = 0x01;
    bus.memory[IF_ADDR as usize] = 0x01;
    assert_eq!(step(&mut cpu, &mut bus), 4);
    assert_eq!(cpu.state(), CpuState::Fetch);
    assert_eq!(step(&mut cpu, &mut bus), 20);
    assert_eq!(cpu.regs.pc, 0x0040);
    assert_eq!(stack::peek(cpu.regs.sp, &mut bus), ORIGIN + 1);
    assert_eq!(cpu.cycles(), 24);
}

#[test]
fn halt_bug_repeats_next_byte() {
    // HALT; INC A with IME clear and an interrupt already pending.
    let (mut cpu, mut bus) = setup(&[0x76, 0x3C, 0x00]);
    bus.memory[IE_ADDR as usize] = 0x01;
    bus.memory[IF_ADDR as usize] = 0x01;
    let a = cpu.regs.a;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state(), CpuState::Fetch);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.pc, ORIGIN + 1);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
    assert_eq!(cpu.regs.a, a.wrapping_add(2));
}

#[test]
fn stop_waits_for_joypad() {
    let (mut cpu, mut bus) = setup(&[0x10, 0x00, 0x00]);
    bus.memory[JOYP_ADDR as usize] = 0xCF;
    assert_eq!(step(&mut cpu, &mut bus), 4);
    assert_eq!(cpu.state(), CpuState::Stopped);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
    let ticked = bus.ticked;

    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state(), CpuState::Stopped);
    // Timers are frozen while stopped.
    assert_eq!(bus.ticked, ticked);

    bus.memory[JOYP_ADDR as usize] = 0xCE;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state(), CpuState::Fetch);
}
