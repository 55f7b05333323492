//! Halted-mode debugger: register/memory menu, FILES menu and edit sessions.
//!
//! While the machine sits in [`Mode::Debug`] or [`Mode::Files`], every key
//! press goes to [`Debugger::on_key`]. The debugger never touches the
//! machine directly. It reads through a [`MachineView`] and returns
//! [`Action`]s that the machine applies in order.
//!
//! ## Menu layout
//!
//! | rows                     | selection                          |
//! |--------------------------|------------------------------------|
//! | registers                | PC A HL BC DE F SP IX IY           |
//! | paging                   | enable, page 0–3                   |
//! | alternate set            | A' HL' BC' DE'                     |
//! | memory view 0–2          | kind, page, video region, address  |
//! | breakpoint (when armed)  | address                            |
//!
//! Up/Down skip rows a view does not show (page row only for page views,
//! region row only for video views).

use crate::classify::InstructionClassifier;
use crate::cpu::{Register, Registers};
use crate::edit::{hex_digit, CellKind, EditSession, EditTarget, MemoryCell};
use crate::host::Key;
use crate::memory::Memory;
use crate::paging::{page_mapping, Mapping, Paging, Region};
use crate::peripherals::{VideoDevice, VideoView};

/// Execution controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Step,
    Out,
    Over,
    Take,
    Debug,
    Files,
    Quit,
}

impl Mode {
    /// Halted, waiting for host input.
    pub fn is_halted(self) -> bool {
        matches!(self, Mode::Debug | Mode::Files)
    }
}

// ─── Memory views ───────────────────────────────────────────────────────────

/// What a memory view follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Pc,
    Sp,
    Hl,
    Bc,
    De,
    Ix,
    Iy,
    /// Free CPU address.
    Z80,
    /// Explicit physical page.
    Page,
    /// VideoBeast region.
    Video,
}

impl ViewKind {
    const ORDER: [ViewKind; 10] = [
        ViewKind::Pc,
        ViewKind::Sp,
        ViewKind::Hl,
        ViewKind::Bc,
        ViewKind::De,
        ViewKind::Ix,
        ViewKind::Iy,
        ViewKind::Z80,
        ViewKind::Page,
        ViewKind::Video,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ViewKind::Pc => "PC",
            ViewKind::Sp => "SP",
            ViewKind::Hl => "HL",
            ViewKind::Bc => "BC",
            ViewKind::De => "DE",
            ViewKind::Ix => "IX",
            ViewKind::Iy => "IY",
            ViewKind::Z80 => "Z80",
            ViewKind::Page => "PAGE",
            ViewKind::Video => "VIDEO",
        }
    }

    /// Next kind in `dir`, wrapping. `Video` only exists with a video board.
    pub fn next(self, dir: i32, has_video: bool) -> ViewKind {
        let n = if has_video { Self::ORDER.len() } else { Self::ORDER.len() - 1 } as i32;
        let i = Self::ORDER.iter().position(|&k| k == self).unwrap_or(0) as i32;
        Self::ORDER[(i + dir).rem_euclid(n) as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryView {
    pub kind: ViewKind,
    /// Page shown by a `Page` view, at most 0x40.
    pub page: u8,
    pub z80_address: u16,
    /// Offset within the page, 14 bits.
    pub page_address: u16,
    pub video_view: VideoView,
    /// Start address per video region.
    pub video_address: [u32; 5],
}

impl MemoryView {
    pub fn new(kind: ViewKind) -> Self {
        MemoryView {
            kind,
            page: 0x20,
            z80_address: 0,
            page_address: 0,
            video_view: VideoView::Ram,
            video_address: [0; 5],
        }
    }

    /// First address shown.
    pub fn address(&self, regs: &Registers) -> u32 {
        match self.kind {
            ViewKind::Pc => regs.current_pc() as u32,
            ViewKind::Sp => regs.sp as u32,
            ViewKind::Hl => regs.hl as u32,
            ViewKind::Bc => regs.bc as u32,
            ViewKind::De => regs.de as u32,
            ViewKind::Ix => regs.ix as u32,
            ViewKind::Iy => regs.iy as u32,
            ViewKind::Z80 => self.z80_address as u32,
            ViewKind::Page => self.page_address as u32,
            ViewKind::Video => self.video_address[self.video_view.index()],
        }
    }

    pub fn address_mask(&self) -> u32 {
        match self.kind {
            ViewKind::Page => 0x3FFF,
            ViewKind::Video => self.video_view.mask(),
            _ => 0xFFFF,
        }
    }

    fn set_address(&mut self, value: u32) {
        match self.kind {
            ViewKind::Z80 => self.z80_address = value as u16,
            ViewKind::Page => self.page_address = (value & 0x3FFF) as u16,
            ViewKind::Video => {
                let v = self.video_view;
                self.video_address[v.index()] = value & v.mask();
            }
            _ => {}
        }
    }

    /// Editable address field, if the view has one.
    fn address_edit(&self) -> Option<(u32, u8)> {
        match self.kind {
            ViewKind::Z80 => Some((self.z80_address as u32, 4)),
            ViewKind::Page => Some((self.page_address as u32, 4)),
            ViewKind::Video => {
                Some((self.address(&Registers::default()), self.video_view.digits()))
            }
            _ => None,
        }
    }

    fn cell(&self, index: usize, regs: &Registers) -> MemoryCell {
        MemoryCell {
            view: index,
            page: (self.kind == ViewKind::Page).then_some(self.page),
            address: self.address(regs),
            kind: match self.kind {
                ViewKind::Video => CellKind::Video(self.video_view),
                _ => CellKind::Cpu,
            },
        }
    }
}

// ─── Read-only machine view ─────────────────────────────────────────────────

/// Borrowed, side-effect free view of the machine for the debugger and
/// the presentation layer. Reads bypass flash toggle masking.
pub struct MachineView<'a> {
    pub registers: Registers,
    pub memory: &'a Memory,
    pub paging: &'a Paging,
    pub video: Option<&'a dyn VideoDevice>,
    pub classifier: &'a dyn InstructionClassifier,
    /// Entries in the host's source listing.
    pub file_count: usize,
}

impl MachineView<'_> {
    fn read_mapping(&self, m: Mapping) -> u8 {
        match m.region {
            Region::Ram => self.memory.ram_read(m.offset),
            Region::Rom => self.memory.rom_read(m.offset),
            Region::Video => self.video.map_or(0, |v| v.peek(m.offset)),
        }
    }

    /// Byte at a CPU address under the current paging.
    pub fn read_mem(&self, address: u16) -> u8 {
        self.read_mapping(self.paging.translate(address))
    }

    /// Byte at `address` within an explicit page.
    pub fn read_page(&self, page: u8, address: u32) -> u8 {
        self.read_mapping(page_mapping(page, address))
    }

    pub fn read_cell(&self, cell: &MemoryCell) -> u8 {
        match (cell.kind, cell.page) {
            (CellKind::Video(v), _) => self.video.map_or(0, |d| v.read(d, cell.address)),
            (CellKind::Cpu, Some(page)) => self.read_page(page, cell.address),
            (CellKind::Cpu, None) => self.read_mem(cell.address as u16),
        }
    }

    /// Opcode bytes of the instruction about to run.
    pub fn opcodes(&self) -> (u8, u8) {
        let pc = self.registers.pc;
        (self.read_mem(pc.wrapping_sub(1)), self.read_mem(pc))
    }

    /// `len` bytes of a memory view starting at its current address.
    pub fn window(&self, view: &MemoryView, len: usize) -> Vec<u8> {
        let start = view.address(&self.registers);
        let mask = view.address_mask();
        (0..len as u32)
            .map(|i| {
                let cell = MemoryCell {
                    view: 0,
                    page: (view.kind == ViewKind::Page).then_some(view.page),
                    address: start.wrapping_add(i) & mask,
                    kind: match view.kind {
                        ViewKind::Video => CellKind::Video(view.video_view),
                        _ => CellKind::Cpu,
                    },
                };
                self.read_cell(&cell)
            })
            .collect()
    }
}

// ─── Selection ──────────────────────────────────────────────────────────────

/// Highlighted debugger menu row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Pc,
    A,
    Hl,
    Bc,
    De,
    Flags,
    Sp,
    Ix,
    Iy,
    Paging,
    Page(usize),
    A2,
    Hl2,
    Bc2,
    De2,
    /// Memory view kind selector.
    Mem(usize),
    ViewPage(usize),
    VideoView(usize),
    ViewAddr(usize),
    Breakpoint,
}

const FIXED_ROWS: [Selection; 18] = [
    Selection::Pc,
    Selection::A,
    Selection::Hl,
    Selection::Bc,
    Selection::De,
    Selection::Flags,
    Selection::Sp,
    Selection::Ix,
    Selection::Iy,
    Selection::Paging,
    Selection::Page(0),
    Selection::Page(1),
    Selection::Page(2),
    Selection::Page(3),
    Selection::A2,
    Selection::Hl2,
    Selection::Bc2,
    Selection::De2,
];
const VIEW_ROWS: usize = 4;
const VIEW_COUNT: usize = 3;
/// Index of the breakpoint row; also the row count when no breakpoint is armed.
const BREAKPOINT_ROW: usize = FIXED_ROWS.len() + VIEW_ROWS * VIEW_COUNT;

impl Selection {
    pub fn index(self) -> usize {
        let view_row = |n: usize, r: usize| FIXED_ROWS.len() + n * VIEW_ROWS + r;
        match self {
            Selection::Mem(n) => view_row(n, 0),
            Selection::ViewPage(n) => view_row(n, 1),
            Selection::VideoView(n) => view_row(n, 2),
            Selection::ViewAddr(n) => view_row(n, 3),
            Selection::Breakpoint => BREAKPOINT_ROW,
            s => FIXED_ROWS.iter().position(|&f| f == s).unwrap_or(0),
        }
    }

    pub fn from_index(i: usize) -> Selection {
        if i < FIXED_ROWS.len() {
            return FIXED_ROWS[i];
        }
        if i >= BREAKPOINT_ROW {
            return Selection::Breakpoint;
        }
        let i = i - FIXED_ROWS.len();
        let n = i / VIEW_ROWS;
        match i % VIEW_ROWS {
            0 => Selection::Mem(n),
            1 => Selection::ViewPage(n),
            2 => Selection::VideoView(n),
            _ => Selection::ViewAddr(n),
        }
    }

    /// Memory view this row belongs to.
    fn view(self) -> Option<usize> {
        match self {
            Selection::Mem(n)
            | Selection::ViewPage(n)
            | Selection::VideoView(n)
            | Selection::ViewAddr(n) => Some(n),
            _ => None,
        }
    }

    fn register(self) -> Option<Register> {
        Some(match self {
            Selection::A => Register::A,
            Selection::Hl => Register::HL,
            Selection::Bc => Register::BC,
            Selection::De => Register::DE,
            Selection::Flags => Register::F,
            Selection::Sp => Register::SP,
            Selection::Ix => Register::IX,
            Selection::Iy => Register::IY,
            Selection::A2 => Register::A2,
            Selection::Hl2 => Register::HL2,
            Selection::Bc2 => Register::BC2,
            Selection::De2 => Register::DE2,
            _ => return None,
        })
    }
}

// ─── Actions ────────────────────────────────────────────────────────────────

/// Side effect requested by a key press, applied by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetMode(Mode),
    /// Store an edited value into its target.
    Write(EditTarget, u32),
    /// Move the memory edit cursor after the preceding write and re-seed it.
    AdvanceMemoryEdit(i32),
    TogglePaging,
    ToggleAudioCapture,
    DisconnectUart,
    RemoveFile(usize),
    AddFile,
}

// ─── Debugger ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Debugger {
    pub selection: Selection,
    pub breakpoint: Option<u16>,
    /// Value restored when the breakpoint is re-armed.
    pub last_breakpoint: u16,
    pub edit: Option<EditSession>,
    pub views: [MemoryView; 3],
    pub file_selection: usize,
    /// File awaiting a y/n confirmation.
    pub confirm_remove: Option<usize>,
}

impl Debugger {
    pub fn new(breakpoint: Option<u16>) -> Self {
        Debugger {
            selection: Selection::Pc,
            breakpoint,
            last_breakpoint: breakpoint.unwrap_or(0),
            edit: None,
            views: [
                MemoryView::new(ViewKind::Pc),
                MemoryView::new(ViewKind::Sp),
                MemoryView::new(ViewKind::Page),
            ],
            file_selection: 0,
            confirm_remove: None,
        }
    }

    pub fn is_memory_edit(&self) -> bool {
        self.edit.as_ref().is_some_and(|e| e.is_memory())
    }

    /// Handle one key press in a halted mode.
    pub fn on_key(&mut self, key: Key, mode: Mode, view: &MachineView) -> Vec<Action> {
        if self.edit.is_some() {
            self.edit_key(key, view)
        } else if mode == Mode::Files {
            self.files_key(key, view.file_count)
        } else {
            self.debug_key(key, view)
        }
    }

    // ─── Edit mode ──────────────────────────────────────────────────────

    fn edit_key(&mut self, key: Key, view: &MachineView) -> Vec<Action> {
        let Some(edit) = self.edit.as_mut() else { return Vec::new() };
        match key {
            Key::Escape => {
                self.edit = None;
                Vec::new()
            }
            Key::Return => {
                let commit = Action::Write(edit.target, edit.value);
                self.edit = None;
                vec![commit]
            }
            Key::Backspace => {
                edit.backspace();
                Vec::new()
            }
            Key::Char(c) => {
                let Some(digit) = hex_digit(c) else { return Vec::new() };
                if !edit.input_digit(digit) {
                    return Vec::new();
                }
                let commit = Action::Write(edit.target, edit.value);
                if edit.is_memory() {
                    // Keep scanning: the machine re-seeds after the write
                    vec![commit, Action::AdvanceMemoryEdit(1)]
                } else {
                    self.edit = None;
                    vec![commit]
                }
            }
            Key::Up | Key::Down | Key::Left | Key::Right => {
                let delta = match key {
                    Key::Up => -16,
                    Key::Down => 16,
                    Key::Left => -1,
                    _ => 1,
                };
                self.update_memory_edit(delta, view);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Move the memory edit to `address + delta` and re-seed it from memory.
    /// Page views carry into the neighbouring page when scanning off either end.
    pub fn update_memory_edit(&mut self, delta: i32, view: &MachineView) {
        let Some(EditTarget::Memory(mut cell)) = self.edit.as_ref().map(|e| e.target) else {
            return;
        };
        cell.address = cell.address.wrapping_add_signed(delta);
        if let Some(page) = cell.page.filter(|&p| p > 0 && p < 0x40) {
            if cell.address & 0xFF00 == 0xFF00 {
                cell.page = Some(page - 1);
            } else if cell.address & 0x4000 != 0 {
                cell.page = Some(page + 1);
            }
        }
        cell.address &= match (cell.kind, cell.page) {
            (CellKind::Video(v), _) => v.mask(),
            (CellKind::Cpu, Some(_)) => 0x3FFF,
            (CellKind::Cpu, None) => 0xFFFF,
        };
        let data = view.read_cell(&cell);
        self.edit = Some(EditSession::start(EditTarget::Memory(cell), data as u32, 2));
    }

    /// Toggle scan-and-edit on memory view `n`.
    pub fn start_memory_edit(&mut self, n: usize, view: &MachineView) {
        if self.is_memory_edit() {
            self.edit = None;
            return;
        }
        let cell = self.views[n].cell(n, &view.registers);
        self.edit = Some(EditSession::start(EditTarget::Memory(cell), 0, 2));
        self.update_memory_edit(0, view);
    }

    // ─── DEBUG menu ─────────────────────────────────────────────────────

    /// Edit target, current value and width for the selected row.
    fn selection_edit(&self, view: &MachineView) -> Option<(EditTarget, u32, u8)> {
        let regs = &view.registers;
        if let Some(reg) = self.selection.register() {
            return Some((EditTarget::Register(reg), regs.get(reg) as u32, reg.digits()));
        }
        match self.selection {
            Selection::Pc => Some((EditTarget::Pc, regs.current_pc() as u32, 4)),
            Selection::Page(n) => Some((EditTarget::Page(n), view.paging.pages[n] as u32, 2)),
            Selection::ViewPage(n) => Some((EditTarget::ViewPage(n), self.views[n].page as u32, 2)),
            Selection::ViewAddr(n) => {
                self.views[n].address_edit().map(|(v, d)| (EditTarget::ViewAddress(n), v, d))
            }
            Selection::Breakpoint => {
                let value = self.breakpoint.unwrap_or(self.last_breakpoint);
                Some((EditTarget::Breakpoint, value as u32, 4))
            }
            _ => None,
        }
    }

    fn row_count(&self) -> usize {
        if self.breakpoint.is_some() { BREAKPOINT_ROW + 1 } else { BREAKPOINT_ROW }
    }

    fn row_hidden(&self, sel: Selection) -> bool {
        match sel {
            Selection::ViewPage(n) => self.views[n].kind != ViewKind::Page,
            Selection::VideoView(n) => self.views[n].kind != ViewKind::Video,
            Selection::ViewAddr(n) => {
                !matches!(self.views[n].kind, ViewKind::Page | ViewKind::Z80 | ViewKind::Video)
            }
            _ => false,
        }
    }

    /// Move the highlight, wrapping and skipping hidden rows.
    pub fn move_selection(&mut self, dir: i32) {
        let count = self.row_count() as i32;
        let mut i = self.selection.index() as i32;
        for _ in 0..count {
            i = (i + dir).rem_euclid(count);
            if !self.row_hidden(Selection::from_index(i as usize)) {
                break;
            }
        }
        self.selection = Selection::from_index(i as usize);
    }

    fn item_select(&mut self, dir: i32, has_video: bool) {
        match self.selection {
            Selection::Mem(n) => self.views[n].kind = self.views[n].kind.next(dir, has_video),
            Selection::VideoView(n) => {
                self.views[n].video_view = self.views[n].video_view.cycle(dir)
            }
            _ => {}
        }
    }

    fn debug_key(&mut self, key: Key, view: &MachineView) -> Vec<Action> {
        match key {
            Key::Up => self.move_selection(-1),
            Key::Down => self.move_selection(1),
            Key::Left | Key::Right => {
                let dir = if key == Key::Left { -1 } else { 1 };
                if self.selection == Selection::Paging {
                    return vec![Action::TogglePaging];
                }
                if let Some((target, value, digits)) = self.selection_edit(view) {
                    let mut e = EditSession::start(target, value, digits);
                    e.adjust(dir);
                    return vec![Action::Write(target, e.value)];
                }
                self.item_select(dir, view.video.is_some());
            }
            Key::Return => match self.selection {
                Selection::Mem(n) | Selection::VideoView(n) => self.start_memory_edit(n, view),
                Selection::Paging => return vec![Action::TogglePaging],
                _ => {
                    if let Some((target, value, digits)) = self.selection_edit(view) {
                        self.edit = Some(EditSession::start(target, value, digits));
                    }
                }
            },
            Key::Space => {
                if let Some(n) = self.selection.view() {
                    self.start_memory_edit(n, view);
                }
            }
            Key::Char('b') => self.toggle_breakpoint(),
            Key::Char('q') => return vec![Action::SetMode(Mode::Quit)],
            Key::Char('r') => return vec![Action::SetMode(Mode::Run)],
            Key::Char('s') => return vec![Action::SetMode(Mode::Step)],
            Key::Char('u') => return vec![Action::SetMode(Mode::Out)],
            Key::Char('o') => return vec![Action::SetMode(Mode::Over)],
            Key::Char('t') => {
                let (op0, op1) = view.opcodes();
                let mode = if view.classifier.is_conditional(op0, op1) {
                    Mode::Take
                } else {
                    Mode::Step
                };
                return vec![Action::SetMode(mode)];
            }
            Key::Char('f') => {
                self.file_selection = 0;
                self.confirm_remove = None;
                return vec![Action::SetMode(Mode::Files)];
            }
            Key::Char('d') => return vec![Action::DisconnectUart],
            Key::Char('a') => return vec![Action::ToggleAudioCapture],
            _ => {}
        }
        Vec::new()
    }

    fn toggle_breakpoint(&mut self) {
        match self.breakpoint.take() {
            Some(bp) => {
                self.last_breakpoint = bp;
                self.selection = Selection::Pc;
            }
            None => {
                self.breakpoint = Some(self.last_breakpoint);
                self.selection = Selection::Breakpoint;
                let value = self.last_breakpoint as u32;
                self.edit = Some(EditSession::start(EditTarget::Breakpoint, value, 4));
            }
        }
    }

    /// Store a value into a target the debugger owns. Returns false for
    /// machine targets.
    pub fn write_own(&mut self, target: EditTarget, value: u32) -> bool {
        match target {
            EditTarget::Breakpoint => self.breakpoint = Some(value as u16),
            EditTarget::ViewPage(n) => self.views[n].page = value.min(0x40) as u8,
            EditTarget::ViewAddress(n) => self.views[n].set_address(value),
            _ => return false,
        }
        true
    }

    // ─── FILES menu ─────────────────────────────────────────────────────

    fn files_key(&mut self, key: Key, file_count: usize) -> Vec<Action> {
        if let Some(index) = self.confirm_remove {
            match key {
                Key::Char('y') => {
                    self.confirm_remove = None;
                    self.file_selection = index.saturating_sub(1);
                    return vec![Action::RemoveFile(index)];
                }
                Key::Char('n') | Key::Escape => self.confirm_remove = None,
                _ => {}
            }
            return Vec::new();
        }
        match key {
            Key::Up | Key::Down if file_count > 0 => {
                let dir = if key == Key::Up { -1 } else { 1 };
                self.file_selection =
                    (self.file_selection as i64 + dir).rem_euclid(file_count as i64) as usize;
            }
            Key::Char('q') => return vec![Action::SetMode(Mode::Quit)],
            Key::Char('b') => {
                self.selection = Selection::Pc;
                return vec![Action::SetMode(Mode::Debug)];
            }
            Key::Return if self.file_selection < file_count => {
                self.confirm_remove = Some(self.file_selection)
            }
            Key::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                if index < file_count {
                    self.confirm_remove = Some(index);
                }
            }
            Key::Char('a') => return vec![Action::AddFile],
            _ => {}
        }
        Vec::new()
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new(None)
    }
}
