//! Component C: the classic-BPF filter runner. Parses a program once, outside
//! the hot loop, then evaluates it per record with no I/O and no mutation of
//! its input — a pure `(bytes) -> bool` predicate.

use std::fmt;
use std::fs;
use std::path::Path;

use error::{Error, Result};

/// One classic-BPF instruction (`struct sock_filter` layout: `code, jt, jf, k`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Insn {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl Insn {
    pub fn new(code: u16, jt: u8, jf: u8, k: u32) -> Insn {
        Insn { code, jt, jf, k }
    }
}

// BPF instruction classes and addressing modes (linux/filter.h / linux/bpf_common.h).
const BPF_CLASS_MASK: u16 = 0x07;
const BPF_LD: u16 = 0x00;
const BPF_LDX: u16 = 0x01;
const BPF_ST: u16 = 0x02;
const BPF_STX: u16 = 0x03;
const BPF_ALU: u16 = 0x04;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_MISC: u16 = 0x07;

const BPF_SIZE_MASK: u16 = 0x18;
const BPF_W: u16 = 0x00;
const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;

const BPF_MODE_MASK: u16 = 0xe0;
const BPF_IMM: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_IND: u16 = 0x40;
const BPF_MEM: u16 = 0x60;
const BPF_LEN: u16 = 0x80;

const BPF_OP_MASK: u16 = 0xf0;
const BPF_ADD: u16 = 0x00;
const BPF_SUB: u16 = 0x10;
const BPF_MUL: u16 = 0x20;
const BPF_DIV: u16 = 0x30;
const BPF_OR: u16 = 0x40;
const BPF_AND: u16 = 0x50;
const BPF_LSH: u16 = 0x60;
const BPF_RSH: u16 = 0x70;
const BPF_NEG: u16 = 0x80;
const BPF_MOD: u16 = 0x90;
const BPF_XOR: u16 = 0xa0;

const BPF_JA: u16 = 0x00;
const BPF_JEQ: u16 = 0x10;
const BPF_JGT: u16 = 0x20;
const BPF_JGE: u16 = 0x30;
const BPF_JSET: u16 = 0x40;

const BPF_SRC_MASK: u16 = 0x08;
const BPF_K: u16 = 0x00;
const BPF_X: u16 = 0x08;

const BPF_RVAL_MASK: u16 = 0x18;
const BPF_MISC_TAX: u16 = 0x00;
const BPF_MISC_TXA: u16 = 0x80;

/// A parsed, ready-to-run filter program.
#[derive(Clone, Debug)]
pub struct Program {
    insns: Vec<Insn>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, insn) in self.insns.iter().enumerate() {
            writeln!(
                f,
                "{:>3}: {{ code: {:#06x}, jt: {}, jf: {}, k: {:#x} }}",
                i, insn.code, insn.jt, insn.jf, insn.k
            )?;
        }
        Ok(())
    }
}

impl Program {
    /// Wraps a pre-assembled instruction list (used by tests and embedders
    /// that already have a compiled filter). Parsing a tcpdump-style textual
    /// expression is left to the external assembler this crate treats as a
    /// collaborator, not reimplemented here.
    pub fn from_insns(insns: Vec<Insn>) -> Result<Program> {
        if insns.is_empty() {
            return Err(Error::Config {
                reason: "empty filter program".into(),
            });
        }
        Ok(Program { insns })
    }

    /// Loads a program from a file containing one `code,jt,jf,k` tuple per
    /// line (the format `tcpdump -ddd` and this crate's `--dump-bpf` emit).
    pub fn from_path(path: &Path) -> Result<Program> {
        let text = fs::read_to_string(path)?;
        let mut insns = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() != 4 {
                return Err(Error::Config {
                    reason: format!("malformed filter line: `{}`", line),
                });
            }
            let code = parts[0].trim().parse().map_err(|_| Error::Config {
                reason: format!("bad opcode in `{}`", line),
            })?;
            let jt = parts[1].trim().parse().map_err(|_| Error::Config {
                reason: format!("bad jt in `{}`", line),
            })?;
            let jf = parts[2].trim().parse().map_err(|_| Error::Config {
                reason: format!("bad jf in `{}`", line),
            })?;
            let k = parts[3].trim().parse().map_err(|_| Error::Config {
                reason: format!("bad k in `{}`", line),
            })?;
            insns.push(Insn::new(code, jt, jf, k));
        }
        Program::from_insns(insns)
    }

    /// Convenience constructor for a trivial single-field accept filter, used
    /// by tests and examples that don't want to hand-assemble BPF.
    pub fn accept_if_u16_eq(byte_offset: u32, value: u16) -> Program {
        Program {
            insns: vec![
                Insn::new(BPF_LD | BPF_H | BPF_ABS, 0, 0, byte_offset),
                Insn::new(BPF_JMP | BPF_JEQ | BPF_K, 0, 1, value as u32),
                Insn::new(BPF_RET | BPF_K, 0, 0, 0xffff),
                Insn::new(BPF_RET | BPF_K, 0, 0, 0),
            ],
        }
    }

    pub fn accept_all() -> Program {
        Program {
            insns: vec![Insn::new(BPF_RET | BPF_K, 0, 0, 0xffff)],
        }
    }

    /// Raw `sock_filter`-compatible instruction slice for `SO_ATTACH_FILTER`.
    pub fn as_sock_filter(&self) -> Vec<libc::sock_filter> {
        self.insns
            .iter()
            .map(|i| libc::sock_filter {
                code: i.code,
                jt: i.jt,
                jf: i.jf,
                k: i.k,
            })
            .collect()
    }

    /// Runs the program against `bytes`, returning whether the record is
    /// accepted. Pure: no I/O, no mutation of `bytes`.
    pub fn run(&self, bytes: &[u8]) -> bool {
        run(&self.insns, bytes) != 0
    }
}

fn load_word(bytes: &[u8], off: usize, size: u16) -> Option<u32> {
    match size {
        BPF_W => bytes
            .get(off..off + 4)
            .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]])),
        BPF_H => bytes.get(off..off + 2).map(|s| u16::from_be_bytes([s[0], s[1]]) as u32),
        BPF_B => bytes.get(off).map(|&b| b as u32),
        _ => None,
    }
}

/// Interprets a classic-BPF program against `bytes`; returns the accepted
/// snaplen (0 means reject) matching the kernel's own `bpf_prog_run` contract.
fn run(insns: &[Insn], bytes: &[u8]) -> u32 {
    let mut a: u32 = 0;
    let mut x: u32 = 0;
    let mut mem = [0u32; 16];
    let mut pc: usize = 0;

    while pc < insns.len() {
        let insn = insns[pc];
        let class = insn.code & BPF_CLASS_MASK;
        match class {
            BPF_LD | BPF_LDX => {
                let size = insn.code & BPF_SIZE_MASK;
                let mode = insn.code & BPF_MODE_MASK;
                let value = match mode {
                    BPF_IMM => insn.k,
                    BPF_ABS => match load_word(bytes, insn.k as usize, size) {
                        Some(v) => v,
                        None => return 0,
                    },
                    BPF_IND => match load_word(bytes, (insn.k + x) as usize, size) {
                        Some(v) => v,
                        None => return 0,
                    },
                    BPF_MEM => mem[(insn.k as usize) & 0xf],
                    BPF_LEN => bytes.len() as u32,
                    _ => return 0,
                };
                if class == BPF_LD {
                    a = value;
                } else {
                    x = value;
                }
            }
            BPF_ST => {
                mem[(insn.k as usize) & 0xf] = a;
            }
            BPF_STX => {
                mem[(insn.k as usize) & 0xf] = x;
            }
            BPF_ALU => {
                let src = if insn.code & BPF_SRC_MASK == BPF_X { x } else { insn.k };
                a = match insn.code & BPF_OP_MASK {
                    BPF_ADD => a.wrapping_add(src),
                    BPF_SUB => a.wrapping_sub(src),
                    BPF_MUL => a.wrapping_mul(src),
                    BPF_DIV => {
                        if src == 0 {
                            return 0;
                        }
                        a / src
                    }
                    BPF_MOD => {
                        if src == 0 {
                            return 0;
                        }
                        a % src
                    }
                    BPF_OR => a | src,
                    BPF_AND => a & src,
                    BPF_XOR => a ^ src,
                    BPF_LSH => a.wrapping_shl(src),
                    BPF_RSH => a.wrapping_shr(src),
                    BPF_NEG => (a as i32).wrapping_neg() as u32,
                    _ => a,
                };
            }
            BPF_JMP => {
                let src = if insn.code & BPF_SRC_MASK == BPF_X { x } else { insn.k };
                let taken = match insn.code & BPF_OP_MASK {
                    BPF_JA => {
                        pc = (pc as i64 + insn.k as i64 + 1) as usize;
                        continue;
                    }
                    BPF_JEQ => a == src,
                    BPF_JGT => a > src,
                    BPF_JGE => a >= src,
                    BPF_JSET => (a & src) != 0,
                    _ => false,
                };
                pc += 1 + if taken { insn.jt as usize } else { insn.jf as usize };
                continue;
            }
            BPF_RET => {
                return match insn.code & BPF_SRC_MASK {
                    BPF_K => insn.k,
                    _ => a,
                };
            }
            BPF_MISC => {
                match insn.code & BPF_RVAL_MASK {
                    BPF_MISC_TAX => x = a,
                    BPF_MISC_TXA => a = x,
                    _ => {}
                }
            }
            _ => return 0,
        }
        pc += 1;
    }
    0
}

/// Parses the filter named by a run context (a file of assembled `sock_filter`
/// tuples), or yields an accept-all program when no filter was configured.
pub fn parse(path: Option<&Path>) -> Result<Program> {
    match path {
        Some(p) => Program::from_path(p),
        None => Ok(Program::accept_all()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_all_accepts_anything() {
        let p = Program::accept_all();
        assert!(p.run(&[]));
        assert!(p.run(&[1, 2, 3]));
    }

    #[test]
    fn single_field_match_accepts_and_rejects() {
        // ethertype IPv4 (0x0800) at offset 12.
        let p = Program::accept_if_u16_eq(12, 0x0800);
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert!(p.run(&frame));

        frame[13] = 0x06; // ARP
        assert!(!p.run(&frame));
    }

    #[test]
    fn out_of_bounds_load_rejects_rather_than_panics() {
        let p = Program::accept_if_u16_eq(1000, 0x0800);
        assert!(!p.run(&[1, 2, 3]));
    }

    #[test]
    fn empty_program_is_rejected_at_parse_time() {
        assert!(Program::from_insns(vec![]).is_err());
    }

    #[test]
    fn from_path_round_trips_simple_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.txt");
        std::fs::write(&path, "0x28,0,0,0xc\n0x15,0,1,0x800\n0x6,0,0,0xffff\n0x6,0,0,0\n").unwrap();
        let p = Program::from_path(&path).unwrap();
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert!(p.run(&frame));
    }
}
