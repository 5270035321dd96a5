//! Launch spec and process image replacement.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;

use nix::unistd::execvp;

use crate::error::Failure;

/// The target program and the argv it will observe.
///
/// `argv[0]` is the program name as given, so the target sees exactly the
/// arguments that followed it on our own command line.
#[derive(Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    program: OsString,
    argv: Vec<CString>,
}

impl LaunchSpec {
    /// Build from our own argument list, skipping our program name.
    pub fn from_args<I>(args: I) -> Result<Self, Failure>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter().skip(1).peekable();
        let program = args.peek().cloned().ok_or(Failure::Usage)?;

        let argv = args
            .map(|arg| CString::new(arg.as_bytes()).map_err(|_| Failure::Argument(arg)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { program, argv })
    }

    /// Replace the process image, searching PATH for the program.
    ///
    /// Only returns on failure. Environment, descriptors and any installed
    /// seccomp filter carry over to the new image.
    pub fn exec(self) -> Failure {
        match execvp(&self.argv[0], &self.argv) {
            Ok(never) => match never {},
            Err(errno) => Failure::Exec {
                program: self.program,
                errno,
            },
        }
    }
}
