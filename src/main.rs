//! ttyguard - run a program that cannot inject input into its terminal
//!
//! Usage: ttyguard PROGRAM [ARGS...]
//!
//! Installs a seccomp filter that kills the process on ioctl(TIOCSTI), then
//! execs PROGRAM. The filter is inherited across exec and by every child, so
//! nothing in the launched process tree can push keystrokes into the
//! controlling terminal.

mod error;
mod launch;
mod seccomp;

use std::process;

use error::Failure;
use launch::LaunchSpec;
use seccomp::{Action, Policy, Rule};

/// No target program named
pub const EXIT_USAGE: i32 = 2;
/// Guard rule rejected while building the filter
pub const EXIT_INSTALL: i32 = 1471;
/// Kernel refused the filter
pub const EXIT_ACTIVATE: i32 = 1472;
/// Target found but could not be executed
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Target not found on PATH
pub const EXIT_NOT_FOUND: i32 = 127;

/// Build the guard policy and load it into this process.
///
/// On any error the filter is not active and the target must not run.
fn install_guard(rule: Rule) -> Result<(), Failure> {
    let mut policy = Policy::new(Action::Allow);
    policy.add_rule(rule).map_err(Failure::Install)?;
    policy.load().map_err(Failure::Activate)
}

/// Validate, guard, exec. Returns only on failure.
///
/// Silent on success: stderr belongs to the target once exec succeeds, and
/// a failed run reports a single line from `main`.
fn run() -> Failure {
    let spec = match LaunchSpec::from_args(std::env::args_os()) {
        Ok(spec) => spec,
        Err(e) => return e,
    };

    if let Err(e) = install_guard(seccomp::tiocsti_rule()) {
        return e;
    }

    spec.exec()
}

fn main() {
    let failure = run();
    eprintln!("{failure}");
    process::exit(failure.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};

    #[test]
    fn rule_failure_maps_to_install_code() {
        let rule = Rule {
            arg: 6,
            ..seccomp::tiocsti_rule()
        };
        let failure = install_guard(rule).expect_err("invalid rule must fail");
        assert!(matches!(failure, Failure::Install(_)));
        assert_eq!(failure.exit_code(), EXIT_INSTALL);
    }

    #[test]
    fn activation_failure_exits_with_its_code() {
        let status = match unsafe { fork() }.expect("fork failed") {
            ForkResult::Child => {
                let code = if seccomp::deny_seccomp_installs() {
                    match install_guard(seccomp::tiocsti_rule()) {
                        Err(failure) => failure.exit_code(),
                        Ok(()) => 0,
                    }
                } else {
                    99
                };
                unsafe { libc::_exit(code) }
            }
            ForkResult::Parent { child } => waitpid(child, None).expect("waitpid failed"),
        };
        assert_eq!(
            status,
            WaitStatus::Exited(status.pid().expect("no pid"), EXIT_ACTIVATE & 0xff)
        );
    }
}
