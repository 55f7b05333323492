//! Whole-machine runs: a scripted CPU executes a tiny instruction table
//! against the real bus, a scripted host feeds keys to the debugger.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use beast_core::cpu::{Cpu, Register, Registers, FLAG_Z};
use beast_core::host::{Host, HostEvent, Key, KeyEvent, Snapshot};
use beast_core::peripherals::{Pio, Uart};
use beast_core::pins::{Pins, IORQ, MREQ, RD, WR};
use beast_core::{Beast, BeastConfig, InstructionClassifier, Mode};

/// Bus cycles per instruction.
const TICKS: u8 = 4;

#[derive(Debug, Clone, Copy)]
enum Op {
    Nop,
    Jump(u16),
    Call(u16),
    Ret,
    JrNz(u16),
    SetFlags(u8),
    Out(u16, u8),
    Store(u16, u8),
    Load(u16),
    /// Jump to self.
    Halt,
}

#[derive(Default)]
struct Trace {
    executed: Vec<u16>,
    loads: Vec<u8>,
}

/// Executes `program` one instruction per `TICKS` cycles, with the same
/// prefetch convention as the real core: at a boundary `pc` is one past the
/// instruction about to run.
struct ScriptCpu {
    program: HashMap<u16, Op>,
    regs: Registers,
    stack: Vec<u16>,
    phase: u8,
    done: bool,
    trace: Rc<RefCell<Trace>>,
}

impl ScriptCpu {
    fn new(program: &[(u16, Op)], trace: Rc<RefCell<Trace>>) -> Self {
        ScriptCpu {
            program: program.iter().copied().collect(),
            regs: Registers { pc: 0x0001, f: FLAG_Z, ..Default::default() },
            stack: Vec::new(),
            phase: 0,
            done: false,
            trace,
        }
    }
}

fn bus(flags: u64, addr: u16, data: u8) -> Pins {
    let mut p = Pins(flags);
    p.set_addr(addr);
    p.set_data(data);
    p
}

impl Cpu for ScriptCpu {
    fn tick(&mut self, pins: Pins) -> Pins {
        let addr = self.regs.current_pc();
        let op = self.program.get(&addr).copied().unwrap_or(Op::Nop);
        if self.phase == 2 {
            if let Op::Load(_) = op {
                self.regs.a = pins.data();
                self.trace.borrow_mut().loads.push(pins.data());
            }
        }
        self.phase += 1;
        self.done = false;

        let out = match (self.phase, op) {
            (2, Op::Out(port, v)) => bus(IORQ | WR, port, v),
            (2, Op::Store(a, v)) => bus(MREQ | WR, a, v),
            (2, Op::Load(a)) => bus(MREQ | RD, a, 0),
            _ => Pins::default(),
        };
        if self.phase == TICKS {
            let next = match op {
                Op::Nop | Op::SetFlags(_) => addr.wrapping_add(1),
                Op::Out(..) | Op::Store(..) | Op::Load(_) => addr.wrapping_add(2),
                Op::Jump(t) => t,
                Op::Call(t) => {
                    self.stack.push(addr.wrapping_add(3));
                    t
                }
                Op::Ret => self.stack.pop().unwrap_or(addr.wrapping_add(1)),
                Op::JrNz(t) => {
                    if self.regs.f & FLAG_Z == 0 { t } else { addr.wrapping_add(2) }
                }
                Op::Halt => addr,
            };
            if let Op::SetFlags(f) = op {
                self.regs.f = f;
            }
            self.trace.borrow_mut().executed.push(addr);
            self.regs.pc = next.wrapping_add(1);
            self.phase = 0;
            self.done = true;
        }
        out
    }

    fn opdone(&self) -> bool {
        self.done
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn set_register(&mut self, reg: Register, value: u16) {
        match reg {
            Register::A => self.regs.a = value as u8,
            Register::HL => self.regs.hl = value,
            _ => {}
        }
    }

    fn prefetch(&mut self, address: u16) -> Pins {
        self.regs.pc = address.wrapping_add(1);
        self.phase = 0;
        Pins::default()
    }
}

struct NullPio;

impl Pio for NullPio {
    fn tick(&mut self, pins: Pins) -> Pins {
        pins
    }
}

struct LinkUart {
    connects: Rc<RefCell<Vec<bool>>>,
    connected: bool,
}

impl Uart for LinkUart {
    fn tick(&mut self, pins: Pins, _time_ps: u64) -> Pins {
        pins
    }
    fn read(&mut self, _reg: u8) -> u8 {
        0
    }
    fn write(&mut self, _reg: u8, _data: u8, _time_ps: u64) {}
    fn modem_control(&self) -> u8 {
        0
    }
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn connect(&mut self, connect: bool) {
        self.connects.borrow_mut().push(connect);
        self.connected = connect;
    }
    fn port(&self) -> u16 {
        8456
    }
}

/// Feeds `halted` to the debugger one event per wait (`None` = timeout) and
/// closes the window once they run out. `running` is drained by polls while
/// the machine runs, `None` being a poll with nothing pending.
#[derive(Default)]
struct ScriptHost {
    halted: VecDeque<Option<HostEvent>>,
    running: VecDeque<Option<HostEvent>>,
    /// Mode and current PC at every halted redraw.
    frames: Vec<(Mode, u16)>,
    files: Vec<String>,
}

impl ScriptHost {
    fn keys(keys: &[Key]) -> Self {
        ScriptHost {
            halted: keys.iter().map(|&k| Some(HostEvent::KeyDown(KeyEvent::new(k)))).collect(),
            ..Default::default()
        }
    }
}

impl Host for ScriptHost {
    fn poll_event(&mut self) -> Option<HostEvent> {
        self.running.pop_front().flatten()
    }

    fn wait_event(&mut self, _timeout: Duration) -> Option<HostEvent> {
        self.halted.pop_front().unwrap_or(Some(HostEvent::Quit))
    }

    fn present(&mut self, snapshot: &Snapshot) {
        if snapshot.mode.is_halted() {
            self.frames.push((snapshot.mode, snapshot.registers.current_pc()));
        }
    }

    fn file_count(&self) -> usize {
        self.files.len()
    }

    fn remove_file(&mut self, index: usize) {
        self.files.remove(index);
    }
}

struct Rig {
    beast: Beast,
    trace: Rc<RefCell<Trace>>,
    connects: Rc<RefCell<Vec<bool>>>,
}

fn rig(program: &[(u16, Op)], rom: &[(u16, &[u8])], breakpoint: Option<u16>) -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();
    let trace = Rc::new(RefCell::new(Trace::default()));
    let connects = Rc::new(RefCell::new(Vec::new()));
    let config = BeastConfig { throttle: false, breakpoint, sample_rate: 0, ..Default::default() };
    let mut beast = Beast::new(
        config,
        Box::new(ScriptCpu::new(program, trace.clone())),
        Box::new(NullPio),
        Box::new(LinkUart { connects: connects.clone(), connected: true }),
    )
    .unwrap();
    for (addr, bytes) in rom {
        let start = *addr as usize;
        beast.memory.rom[start..start + bytes.len()].copy_from_slice(bytes);
    }
    Rig { beast, trace, connects }
}

/// main: NOP; CALL sub; NOP; HALT    sub: NOP; NOP; RET
fn call_program() -> (Vec<(u16, Op)>, Vec<(u16, &'static [u8])>) {
    let program = vec![
        (0x0000, Op::Nop),
        (0x0001, Op::Call(0x2000)),
        (0x0004, Op::Nop),
        (0x0005, Op::Halt),
        (0x2000, Op::Nop),
        (0x2001, Op::Nop),
        (0x2002, Op::Ret),
    ];
    let rom: [(u16, &'static [u8]); 2] = [
        (0x0000, &[0x00, 0xCD, 0x00, 0x20, 0x00, 0x18, 0xFE]),
        (0x2000, &[0x00, 0x00, 0xC9]),
    ];
    (program, rom.to_vec())
}

#[test]
fn test_run_stops_at_breakpoint() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x2001));
    let mut host = ScriptHost::default();
    r.beast.main_loop(&mut host);

    assert_eq!(r.beast.mode, Mode::Quit);
    assert_eq!(host.frames.first(), Some(&(Mode::Debug, 0x2001)));
    assert_eq!(r.trace.borrow().executed, vec![0x0000, 0x0001, 0x2000]);
}

#[test]
fn test_over_runs_whole_call() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x0001));
    let mut host = ScriptHost::keys(&[Key::Char('o')]);
    r.beast.main_loop(&mut host);

    assert_eq!(host.frames[0], (Mode::Debug, 0x0001));
    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x0004)));
    assert_eq!(r.trace.borrow().executed, vec![0x0000, 0x0001, 0x2000, 0x2001, 0x2002]);
}

#[test]
fn test_over_jump_degrades_to_step() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x0005));
    let mut host = ScriptHost::keys(&[Key::Char('o')]);
    r.beast.main_loop(&mut host);

    // JR $ at the breakpoint: one instruction, lands on itself
    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x0005)));
    assert_eq!(r.trace.borrow().executed.last(), Some(&0x0005));
    assert_eq!(r.trace.borrow().executed.iter().filter(|&&a| a == 0x0005).count(), 1);
}

/// Knows no instruction lengths, so OVER can never plan past anything.
struct Opaque;

impl InstructionClassifier for Opaque {
    fn is_jump_or_return(&self, _op0: u8, _op1: u8) -> bool {
        false
    }
    fn is_conditional(&self, _op0: u8, _op1: u8) -> bool {
        false
    }
    fn is_taken(&self, _op0: u8, _op1: u8, _regs: &Registers) -> bool {
        false
    }
    fn instruction_length(&self, _op0: u8, _op1: u8) -> Option<u8> {
        None
    }
    fn reset_stack(&mut self) {}
    fn is_out(&mut self, _op0: u8, _op1: u8, _flags: u8) -> bool {
        false
    }
}

#[test]
fn test_host_classifier_drives_over() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x0001));
    r.beast.set_classifier(Box::new(Opaque));
    let mut host = ScriptHost::keys(&[Key::Char('o')]);
    r.beast.main_loop(&mut host);

    // The CALL is stepped into rather than run over
    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x2000)));
    assert_eq!(r.trace.borrow().executed, vec![0x0000, 0x0001]);
}

#[test]
fn test_out_returns_to_caller() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x2000));
    let mut host = ScriptHost::keys(&[Key::Char('u')]);
    r.beast.main_loop(&mut host);

    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x0004)));
    assert_eq!(r.trace.borrow().executed.last(), Some(&0x2002));
}

#[test]
fn test_step_executes_one_instruction() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x0001));
    let mut host = ScriptHost::keys(&[Key::Char('s'), Key::Char('s')]);
    r.beast.main_loop(&mut host);

    let pcs: Vec<u16> = host.frames.iter().map(|f| f.1).collect();
    assert_eq!(pcs, vec![0x0001, 0x2000, 0x2001]);
}

#[test]
fn test_take_waits_for_branch_taken() {
    // 10: JR NZ,30   12: clear Z   13: JP 10   30: HALT
    let program = [
        (0x0010, Op::JrNz(0x0030)),
        (0x0012, Op::SetFlags(0)),
        (0x0013, Op::Jump(0x0010)),
        (0x0030, Op::Halt),
    ];
    let rom: [(u16, &[u8]); 2] =
        [(0x0010, &[0x20, 0x1E, 0xB7, 0xC3, 0x10, 0x00]), (0x0030, &[0x18, 0xFE])];
    let mut r = rig(&program, &rom, Some(0x0010));
    // Clear the breakpoint so the loop back to 10 is not caught by it
    let mut host = ScriptHost::keys(&[Key::Char('b'), Key::Char('t')]);
    r.beast.main_loop(&mut host);

    assert_eq!(r.beast.debugger.breakpoint, None);
    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x0030)));
    let executed = r.trace.borrow().executed.clone();
    assert_eq!(&executed[executed.len() - 4..], &[0x0010, 0x0012, 0x0013, 0x0010]);
}

#[test]
fn test_take_on_unconditional_steps() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, Some(0x0000));
    r.beast.mode = Mode::Debug;
    let mut host = ScriptHost::keys(&[Key::Char('t')]);
    r.beast.main_loop(&mut host);

    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x0001)));
}

#[test]
fn test_quit_during_step_is_kept() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, None);
    r.beast.mode = Mode::Debug;
    let mut host = ScriptHost::keys(&[Key::Char('s'), Key::Char('s')]);
    // Skip the start-up tick's poll; the step's first poll sees Quit
    host.running.extend([None, Some(HostEvent::Quit)]);
    r.beast.main_loop(&mut host);

    assert_eq!(r.beast.mode, Mode::Quit);
    // The second 's' was never read
    assert_eq!(host.halted.len(), 1);
    assert!(r.beast.cpu.opdone());
}

#[test]
fn test_over_cancelled_while_finishing_instruction() {
    for (event, mode) in [
        (HostEvent::KeyDown(KeyEvent::new(Key::Escape)), Mode::Debug),
        (HostEvent::Quit, Mode::Quit),
    ] {
        let (program, rom) = call_program();
        let mut r = rig(&program, &rom, None);
        // Mid-way through the NOP ahead of the CALL
        r.beast.mode = Mode::Over;
        let mut host = ScriptHost::default();
        host.running.push_back(Some(event));
        r.beast.step_mode(&mut host);

        assert_eq!(r.beast.mode, mode);
        assert_eq!(r.trace.borrow().executed, vec![0x0000]);
    }
}

#[test]
fn test_escape_interrupts_run() {
    let program = [(0x0000, Op::Halt)];
    let mut r = rig(&program, &[(0x0000, &[0x18, 0xFE])], None);
    let mut host = ScriptHost::default();
    host.running.extend([None, Some(HostEvent::KeyDown(KeyEvent::new(Key::Escape)))]);
    r.beast.main_loop(&mut host);

    assert_eq!(host.frames.first(), Some(&(Mode::Debug, 0x0000)));
    assert!(r.beast.cpu.opdone());
}

#[test]
fn test_paging_and_flash_program_on_the_bus() {
    let program = [
        (0x0000, Op::Out(0x0071, 0x01)), // page 1 = ROM bank 1
        (0x0002, Op::Out(0x0072, 0x21)), // page 2 = RAM bank 1
        (0x0004, Op::Out(0x0074, 0x01)), // paging on
        (0x0006, Op::Store(0x5555, 0xAA)),
        (0x0008, Op::Store(0x2AAA, 0x55)),
        (0x000A, Op::Store(0x5555, 0xA0)),
        (0x000C, Op::Store(0x7000, 0x42)),
        (0x000E, Op::Load(0x7000)),
        (0x0010, Op::Load(0x7000)),
        (0x0012, Op::Store(0x8010, 0x99)),
        (0x0014, Op::Halt),
    ];
    let mut r = rig(&program, &[(0x0014, &[0x18, 0xFE])], Some(0x0014));
    let mut host = ScriptHost::default();
    r.beast.main_loop(&mut host);

    let b = &r.beast;
    assert!(b.paging.enabled);
    assert_eq!(b.paging.pages[..3], [0x00, 0x01, 0x21]);
    assert_eq!(b.memory.rom[0x7000], 0x42);
    assert_eq!(b.memory.ram[0x4010], 0x99);
    // Program still in progress: status reads toggle bit 6
    assert!(b.flash.is_busy(b.clock_ps));
    assert_eq!(r.trace.borrow().loads, vec![0x42, 0x02]);
}

#[test]
fn test_memory_edit_writes_through_page_view() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, None);
    r.beast.mode = Mode::Debug;
    // Up wraps to the page view's address row; Space starts the scan edit
    let keys = [
        Key::Up,
        Key::Space,
        Key::Char('a'),
        Key::Char('b'),
        Key::Char('c'),
        Key::Char('d'),
        Key::Escape,
    ];
    let mut host = ScriptHost::keys(&keys);
    r.beast.main_loop(&mut host);

    assert_eq!(&r.beast.memory.ram[..3], &[0xAB, 0xCD, 0x00]);
    assert!(r.beast.debugger.edit.is_none());
}

#[test]
fn test_rom_edit_bypasses_flash_protocol() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, None);
    r.beast.mode = Mode::Debug;
    r.beast.debugger.views[2].page = 0x03;
    r.beast.debugger.views[2].page_address = 0x0100;
    let keys = [Key::Up, Key::Space, Key::Char('5'), Key::Char('a'), Key::Return];
    let mut host = ScriptHost::keys(&keys);
    r.beast.main_loop(&mut host);

    assert_eq!(r.beast.memory.rom[0xC100], 0x5A);
    assert!(!r.beast.flash.operation_active);
    assert!(r.beast.debugger.edit.is_none());
}

#[test]
fn test_pc_edit_prefetches() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, None);
    r.beast.mode = Mode::Debug;
    let keys = [Key::Return, Key::Char('2'), Key::Char('0'), Key::Char('0'), Key::Char('2')];
    let mut host = ScriptHost::keys(&keys);
    r.beast.main_loop(&mut host);

    assert_eq!(r.beast.cpu.registers().current_pc(), 0x2002);
    assert_eq!(host.frames.last(), Some(&(Mode::Debug, 0x2002)));
}

#[test]
fn test_uart_reconnects_when_idle() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, None);
    r.beast.mode = Mode::Debug;
    let mut host = ScriptHost::keys(&[Key::Char('d')]);
    host.halted.push_back(None);
    r.beast.main_loop(&mut host);

    assert_eq!(*r.connects.borrow(), vec![false, true]);
    assert!(r.beast.uart.is_connected());
}

#[test]
fn test_files_menu_remove_and_back() {
    let (program, rom) = call_program();
    let mut r = rig(&program, &rom, None);
    r.beast.mode = Mode::Debug;
    let keys = [Key::Char('f'), Key::Down, Key::Return, Key::Char('y'), Key::Char('b')];
    let mut host = ScriptHost::keys(&keys);
    host.files = vec!["monitor.lst".into(), "basic.lst".into(), "cpm.lst".into()];
    r.beast.main_loop(&mut host);

    assert_eq!(host.files, vec!["monitor.lst".to_string(), "cpm.lst".to_string()]);
    assert!(host.frames.iter().any(|f| f.0 == Mode::Files));
    assert_eq!(host.frames.last().map(|f| f.0), Some(Mode::Debug));
}
