//! Minimal x86-64 instruction encoder.
//!
//! Emits exactly the handful of 64-bit forms the JIT needs: register moves
//! to and from `[base + disp]`, immediate loads, compare/set, and rel32
//! branches with patchable placeholder displacements. Memory operands are
//! always base-plus-displacement with RSI or RDX as the base, so no SIB
//! bytes are ever required.

/// Growable byte buffer the assembler appends to.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    pub fn emit_u32_le(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u64_le(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrites the four bytes at `at` with `value` in little-endian
    /// order. Used to resolve branch placeholders.
    pub fn patch_u32_le(&mut self, at: usize, value: u32) {
        self.code[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}

/// General-purpose registers addressable without a REX.B prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
}

impl Reg {
    fn encoding(self) -> u8 {
        self as u8
    }
}

const REX_W: u8 = 0x48;

fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | (reg << 3) | rm
}

/// Instruction emitter over a [`CodeBuffer`].
pub struct Assembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> Assembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    /// `mov dst, imm64` (REX.W B8+rd io).
    pub fn mov_ri64(&mut self, dst: Reg, imm: u64) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0xB8 + dst.encoding());
        self.buf.emit_u64_le(imm);
    }

    /// `mov dst, [base + disp]` (REX.W 8B /r).
    pub fn mov_rm(&mut self, dst: Reg, base: Reg, disp: i32) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0x8B);
        self.mem_operand(dst.encoding(), base, disp);
    }

    /// `mov [base + disp], src` (REX.W 89 /r).
    pub fn mov_mr(&mut self, base: Reg, disp: i32, src: Reg) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0x89);
        self.mem_operand(src.encoding(), base, disp);
    }

    /// `inc reg` (REX.W FF /0).
    pub fn inc_r(&mut self, reg: Reg) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0xFF);
        self.buf.emit_u8(modrm(0b11, 0, reg.encoding()));
    }

    /// `cmp lhs, rhs` (REX.W 39 /r): sets flags from `lhs - rhs`.
    pub fn cmp_rr(&mut self, lhs: Reg, rhs: Reg) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0x39);
        self.buf.emit_u8(modrm(0b11, rhs.encoding(), lhs.encoding()));
    }

    /// `cmp reg, imm8` (REX.W 83 /7 ib), sign-extended immediate.
    pub fn cmp_ri8(&mut self, reg: Reg, imm: i8) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0x83);
        self.buf.emit_u8(modrm(0b11, 7, reg.encoding()));
        self.buf.emit_u8(imm as u8);
    }

    /// `setl dst8` (0F 9C /r): low byte becomes 1 when the last compare was
    /// signed-less-than. Without a REX prefix only AL..BL are addressable.
    pub fn setl(&mut self, dst: Reg) {
        debug_assert!(
            dst.encoding() < 4,
            "setl without REX addresses only AL, CL, DL, BL"
        );
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0x9C);
        self.buf.emit_u8(modrm(0b11, 0, dst.encoding()));
    }

    /// `movzx dst, src8` (REX.W 0F B6 /r).
    pub fn movzx_r64_r8(&mut self, dst: Reg, src: Reg) {
        self.buf.emit_u8(REX_W);
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0xB6);
        self.buf.emit_u8(modrm(0b11, dst.encoding(), src.encoding()));
    }

    /// `jmp rel32` (E9 cd) with a zero placeholder displacement; returns
    /// the placeholder's byte offset for later patching.
    pub fn jmp_rel32(&mut self) -> usize {
        self.buf.emit_u8(0xE9);
        let site = self.buf.len();
        self.buf.emit_u32_le(0);
        site
    }

    /// `je rel32` (0F 84 cd) with a zero placeholder displacement; returns
    /// the placeholder's byte offset for later patching.
    pub fn je_rel32(&mut self) -> usize {
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0x84);
        let site = self.buf.len();
        self.buf.emit_u32_le(0);
        site
    }

    /// `ret` (C3).
    pub fn ret(&mut self) {
        self.buf.emit_u8(0xC3);
    }

    /// ModRM + displacement for `[base + disp]`, picking the shortest of
    /// the no-disp, disp8, and disp32 forms. RSP needs a SIB byte and RBP
    /// has no disp-free form; neither base occurs here.
    fn mem_operand(&mut self, reg: u8, base: Reg, disp: i32) {
        debug_assert!(base != Reg::Rsp, "RSP-based addressing needs a SIB byte");
        let rm = base.encoding();
        if disp == 0 && base != Reg::Rbp {
            self.buf.emit_u8(modrm(0b00, reg, rm));
        } else if let Ok(disp8) = i8::try_from(disp) {
            self.buf.emit_u8(modrm(0b01, reg, rm));
            self.buf.emit_u8(disp8 as u8);
        } else {
            self.buf.emit_u8(modrm(0b10, reg, rm));
            self.buf.emit_u32_le(disp as u32);
        }
    }
}
