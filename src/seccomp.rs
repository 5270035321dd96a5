//! seccomp-bpf filter policy.
//!
//! Builds a classic BPF program rule by rule and installs it with
//! prctl(PR_SET_SECCOMP). No libseccomp.
//!
//! Layout of a compiled policy:
//!
//! ```text
//! [0-2]   architecture check -> KILL_PROCESS on foreign arch
//! [3]     load syscall number
//! [4-5]   (x86_64) x32 ABI check -> KILL_PROCESS
//! [..]    5 instructions per rule
//! [last]  RET default action
//! ```
//!
//! Installed filters survive execve and are inherited by every child.

use nix::errno::Errno;
use thiserror::Error;

// BPF instruction encoding
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
#[cfg(target_arch = "x86_64")]
const BPF_JGE: u16 = 0x30;
const BPF_K: u16 = 0x00;

/// Kernel limit on classic BPF program length.
const BPF_MAXINSNS: usize = 4096;

// seccomp constants
const SECCOMP_RET_KILL_PROCESS: u32 = 0x80000000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff0000;
const SECCOMP_MODE_FILTER: libc::c_ulong = 2;

// Architecture
#[cfg(target_arch = "x86_64")]
const AUDIT_ARCH_NATIVE: u32 = 0xc000003e;
#[cfg(target_arch = "aarch64")]
const AUDIT_ARCH_NATIVE: u32 = 0xc00000b7;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("ttyguard supports x86_64 and aarch64 only");

#[cfg(target_arch = "x86_64")]
const X32_SYSCALL_BIT: u32 = 0x40000000;

// seccomp_data offsets
const OFFSET_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;
const OFFSET_ARGS: u32 = 16;
const MAX_ARGS: u8 = 6;

/// Instructions emitted per rule.
const RULE_LEN: usize = 5;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SockFilter {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

#[repr(C)]
struct SockFprog {
    len: libc::c_ushort,
    filter: *const SockFilter,
}

const fn bpf_stmt(code: u16, k: u32) -> SockFilter {
    SockFilter { code, jt: 0, jf: 0, k }
}

const fn bpf_jump(code: u16, k: u32, jt: u8, jf: u8) -> SockFilter {
    SockFilter { code, jt, jf, k }
}

/// Offset of the low 32 bits of syscall argument `index`.
const fn arg_low_offset(index: u8) -> u32 {
    let base = OFFSET_ARGS + 8 * index as u32;
    if cfg!(target_endian = "little") {
        base
    } else {
        base + 4
    }
}

/// Errors raised while building or installing a policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("syscall argument index {index} out of range (0..={max})", max = MAX_ARGS - 1)]
    ArgumentIndex { index: u8 },

    #[error("invalid syscall number {0}")]
    Syscall(libc::c_long),

    #[error("filter program too long ({len} > {max} instructions)", max = BPF_MAXINSNS)]
    TooLong { len: usize },

    #[error("prctl(PR_SET_NO_NEW_PRIVS): {0}")]
    NoNewPrivs(Errno),

    #[error("prctl(PR_SET_SECCOMP): {0}")]
    Install(Errno),
}

/// What the kernel does when a syscall matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Allow,
    /// Kill every thread of the process with SIGSYS.
    KillProcess,
}

impl Action {
    const fn ret(self) -> u32 {
        match self {
            Action::Allow => SECCOMP_RET_ALLOW,
            Action::KillProcess => SECCOMP_RET_KILL_PROCESS,
        }
    }
}

/// Match `syscall` when the low 32 bits of argument `arg` equal `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub syscall: libc::c_long,
    pub arg: u8,
    pub value: u32,
    pub action: Action,
}

/// The TIOCSTI guard: any ioctl(fd, TIOCSTI, ...) kills the whole process.
///
/// The tty layer reads the request code as an `unsigned int`, so only the
/// low 32 bits of argument 1 are compared.
pub const fn tiocsti_rule() -> Rule {
    Rule {
        syscall: libc::SYS_ioctl,
        arg: 1,
        value: libc::TIOCSTI as u32,
        action: Action::KillProcess,
    }
}

/// A seccomp filter under construction.
///
/// The program is always complete: rules are compiled in place ahead of the
/// trailing default return, so [`Policy::load`] only has to hand it to the
/// kernel.
#[derive(Debug)]
pub struct Policy {
    program: Vec<SockFilter>,
}

impl Policy {
    pub fn new(default_action: Action) -> Self {
        let mut program = vec![
            // Load architecture
            bpf_stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH),
            // Verify native arch -- kill otherwise
            bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, AUDIT_ARCH_NATIVE, 1, 0),
            bpf_stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),
            // Load syscall number
            bpf_stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_NR),
        ];

        // x32 syscalls share AUDIT_ARCH_X86_64 but use different numbers
        #[cfg(target_arch = "x86_64")]
        program.extend([
            bpf_jump(BPF_JMP | BPF_JGE | BPF_K, X32_SYSCALL_BIT, 0, 1),
            bpf_stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),
        ]);

        program.push(bpf_stmt(BPF_RET | BPF_K, default_action.ret()));
        Self { program }
    }

    /// Compile `rule` into the program, ahead of the default return.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), Error> {
        if rule.arg >= MAX_ARGS {
            return Err(Error::ArgumentIndex { index: rule.arg });
        }
        let syscall =
            u32::try_from(rule.syscall).map_err(|_| Error::Syscall(rule.syscall))?;
        let len = self.program.len() + RULE_LEN;
        if len > BPF_MAXINSNS {
            return Err(Error::TooLong { len });
        }

        let compiled = [
            // Accumulator may hold an argument from the previous rule
            bpf_stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_NR),
            bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, syscall, 0, 3),
            bpf_stmt(BPF_LD | BPF_W | BPF_ABS, arg_low_offset(rule.arg)),
            bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, rule.value, 0, 1),
            bpf_stmt(BPF_RET | BPF_K, rule.action.ret()),
        ];
        let at = self.program.len() - 1;
        self.program.splice(at..at, compiled);
        Ok(())
    }

    /// Install the policy into the calling process.
    ///
    /// Consumes the handle: it is released here whether or not the kernel
    /// accepts the program.
    pub fn load(self) -> Result<(), Error> {
        let prog = SockFprog {
            len: self.program.len() as libc::c_ushort,
            filter: self.program.as_ptr(),
        };

        // Required for unprivileged PR_SET_SECCOMP
        let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
        Errno::result(ret).map_err(Error::NoNewPrivs)?;

        let ret = unsafe {
            libc::prctl(
                libc::PR_SET_SECCOMP,
                SECCOMP_MODE_FILTER,
                &prog as *const SockFprog,
            )
        };
        Errno::result(ret).map(drop).map_err(Error::Install)
    }
}

/// Install a filter that fails every further PR_SET_SECCOMP with EPERM.
#[cfg(test)]
pub(crate) fn deny_seccomp_installs() -> bool {
    const SECCOMP_RET_ERRNO: u32 = 0x00050000;
    let filter = [
        bpf_stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_NR),
        bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, libc::SYS_prctl as u32, 0, 3),
        bpf_stmt(BPF_LD | BPF_W | BPF_ABS, arg_low_offset(0)),
        bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, libc::PR_SET_SECCOMP as u32, 0, 1),
        bpf_stmt(BPF_RET | BPF_K, SECCOMP_RET_ERRNO | libc::EPERM as u32),
        bpf_stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW),
    ];
    let prog = SockFprog {
        len: filter.len() as libc::c_ushort,
        filter: filter.as_ptr(),
    };
    unsafe {
        libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) == 0
            && libc::prctl(
                libc::PR_SET_SECCOMP,
                SECCOMP_MODE_FILTER,
                &prog as *const SockFprog,
            ) == 0
    }
}
