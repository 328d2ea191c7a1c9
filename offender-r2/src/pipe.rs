//! Minimal radare2 command pipe.
//!
//! Grounded on `r2searcher.py`'s use of `r2pipe.open(path)`. No
//! maintained `r2pipe` crate exists in this workspace's dependency pack,
//! so this is a small in-crate client over the same native pipe
//! protocol `r2pipe`'s Python binding itself uses: spawn
//! `radare2 -q0 <path>`, write one command per line to its stdin, and
//! read its stdout up to the NUL byte radare2 emits at the end of every
//! response in `-0` mode.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use offender_core::{Error, Result};

pub struct R2Pipe {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl R2Pipe {
    pub fn open(path: &Path) -> Result<Self> {
        let mut child = Command::new("radare2")
            .args(["-q0", &path.to_string_lossy()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::SearcherUnavailable {
                name: "offender-r2".to_owned(),
                reason: format!("failed to spawn radare2: {e}"),
            })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let mut stdout = child.stdout.take().expect("piped stdout");

        // `radare2 -q0` writes a NUL as soon as the file is loaded, before
        // any command is sent; `r2pipe.open()` consumes it the same way
        // (`process.stdout.read(1)`) so the first real `cmd()` doesn't
        // read this leftover byte instead of its own response.
        read_until_nul(&mut stdout)?;

        Ok(Self { child, stdin, stdout })
    }

    /// Sends `command` and returns its output with the trailing NUL and
    /// newline stripped.
    pub fn cmd(&mut self, command: &str) -> Result<String> {
        writeln!(self.stdin, "{command}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| Error::FindFailure(format!("failed to write to radare2: {e}")))?;

        let buf = read_until_nul(&mut self.stdout)?;
        Ok(String::from_utf8_lossy(&buf).trim_end().to_owned())
    }
}

fn read_until_nul(stdout: &mut ChildStdout) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stdout
            .read(&mut byte)
            .map_err(|e| Error::FindFailure(format!("failed to read from radare2: {e}")))?;
        if n == 0 || byte[0] == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    Ok(buf)
}

impl Drop for R2Pipe {
    fn drop(&mut self) {
        let _ = self.cmd("q");
        let _ = self.child.wait();
    }
}
