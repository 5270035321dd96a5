//! Launch failures and their exit codes.

use std::ffi::OsString;

use nix::errno::Errno;
use thiserror::Error;

use crate::seccomp;
use crate::{EXIT_ACTIVATE, EXIT_INSTALL, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, EXIT_USAGE};

/// Every way a run can end without replacing the process image.
#[derive(Debug, Error)]
pub enum Failure {
    /// No target program was named.
    #[error("usage: ttyguard <program> [args...]")]
    Usage,

    /// The guard rule could not be compiled into the policy.
    #[error("[{code}] failed to install seccomp filter: {0}", code = EXIT_INSTALL)]
    Install(#[source] seccomp::Error),

    /// The kernel refused the policy.
    #[error("[{code}] failed to load seccomp context: {0}", code = EXIT_ACTIVATE)]
    Activate(#[source] seccomp::Error),

    /// An argument cannot be handed to execvp.
    #[error("argument contains an interior NUL byte: {}", .0.to_string_lossy())]
    Argument(OsString),

    /// execvp returned.
    #[error("failed to execute {}: {errno}", .program.to_string_lossy())]
    Exec { program: OsString, errno: Errno },
}

impl Failure {
    pub fn exit_code(&self) -> i32 {
        match self {
            Failure::Usage => EXIT_USAGE,
            Failure::Install(_) => EXIT_INSTALL,
            Failure::Activate(_) => EXIT_ACTIVATE,
            Failure::Argument(_) => EXIT_NOT_EXECUTABLE,
            Failure::Exec { errno, .. } => match errno {
                Errno::ENOENT | Errno::ENOTDIR => EXIT_NOT_FOUND,
                _ => EXIT_NOT_EXECUTABLE,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn exec_failure(errno: Errno) -> Failure {
        Failure::Exec {
            program: OsString::from("missing-tool"),
            errno,
        }
    }

    #[rstest]
    #[case(Failure::Usage, 2)]
    #[case(Failure::Install(seccomp::Error::ArgumentIndex { index: 9 }), 1471)]
    #[case(Failure::Activate(seccomp::Error::Install(Errno::EPERM)), 1472)]
    #[case(Failure::Argument(OsString::from("a")), 126)]
    #[case(exec_failure(Errno::ENOENT), 127)]
    #[case(exec_failure(Errno::ENOTDIR), 127)]
    #[case(exec_failure(Errno::EACCES), 126)]
    #[case(exec_failure(Errno::ENOEXEC), 126)]
    fn failures_map_to_exit_codes(#[case] failure: Failure, #[case] code: i32) {
        assert_eq!(failure.exit_code(), code);
    }

    #[test]
    fn filter_failures_stay_distinct_after_truncation() {
        let install = Failure::Install(seccomp::Error::TooLong { len: 4097 }).exit_code();
        let activate = Failure::Activate(seccomp::Error::NoNewPrivs(Errno::EINVAL)).exit_code();
        let observed = [install & 0xff, activate & 0xff, EXIT_USAGE, 126, 127];
        for (i, a) in observed.iter().enumerate() {
            for b in &observed[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(install & 0xff, 191);
        assert_eq!(activate & 0xff, 192);
    }

    #[test]
    fn diagnostics_carry_the_failure_code() {
        let install = Failure::Install(seccomp::Error::ArgumentIndex { index: 6 });
        assert!(install.to_string().starts_with("[1471] failed to install seccomp filter"));

        let activate = Failure::Activate(seccomp::Error::Install(Errno::EPERM));
        let message = activate.to_string();
        assert!(message.starts_with("[1472] failed to load seccomp context"));
        assert!(message.contains("EPERM"), "{message}");

        let exec = exec_failure(Errno::ENOENT);
        assert!(exec.to_string().starts_with("failed to execute missing-tool"));
    }
}
