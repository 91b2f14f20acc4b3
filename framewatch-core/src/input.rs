//! Operator keystroke listener.
//!
//! Runs on its own thread, polling stdin with a bounded `select(2)` wait so
//! it stays responsive to the termination flag without ever blocking the
//! decode loop. Canonical mode and echo are switched off only for the
//! duration of each poll and restored immediately after.

use std::mem;
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::session::Shared;

/// Jump size per seek keystroke, in engine time units (microseconds).
pub const SEEK_STEP_US: i64 = 5_000_000;

/// Upper bound on one stdin poll before the termination flag is rechecked.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    SeekForward,
    SeekBackward,
}

/// Map one keystroke to an operator command. Unknown keys are ignored.
pub fn key_command(byte: u8) -> Option<Command> {
    match byte {
        b'q' => Some(Command::Quit),
        b's' => Some(Command::SeekForward),
        b'a' => Some(Command::SeekBackward),
        _ => None,
    }
}

/// Listener loop: runs until the operator quits or the session terminates.
///
/// Seek requests go through the shared slot, which coalesces them; a fast
/// typist can never queue more than one outstanding request.
pub fn listen(shared: &Shared) {
    println!("Controls:");
    println!("  s - Seek forward 5s");
    println!("  a - Seek backward 5s");
    println!("  q - Quit");

    while !shared.quit.load(Ordering::SeqCst) {
        let Some(byte) = poll_key(POLL_INTERVAL) else {
            continue;
        };
        match key_command(byte) {
            Some(Command::Quit) => {
                println!("[Quit]");
                shared.quit.store(true, Ordering::SeqCst);
                break;
            }
            Some(Command::SeekForward) => shared.seek.request(SEEK_STEP_US),
            Some(Command::SeekBackward) => shared.seek.request(-SEEK_STEP_US),
            None => debug!("ignored key {byte:#04x}"),
        }
    }
}

/// Saves the terminal state on construction and restores it on drop, so
/// every exit path leaves the operator's shell usable.
pub struct TermGuard {
    saved: libc::termios,
}

impl TermGuard {
    pub fn capture() -> Option<Self> {
        let mut saved = unsafe { mem::zeroed::<libc::termios>() };
        let ok = unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut saved) } == 0;
        ok.then_some(Self { saved })
    }
}

impl Drop for TermGuard {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
        }
    }
}

/// Wait up to `timeout` for a single keystroke without echo or line
/// buffering. Returns `None` on timeout or when stdin is not a terminal.
fn poll_key(timeout: Duration) -> Option<u8> {
    unsafe {
        let mut saved: libc::termios = mem::zeroed();
        if libc::tcgetattr(libc::STDIN_FILENO, &mut saved) != 0 {
            return None;
        }
        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) != 0 {
            return None;
        }

        let mut readfds: libc::fd_set = mem::zeroed();
        libc::FD_ZERO(&mut readfds);
        libc::FD_SET(libc::STDIN_FILENO, &mut readfds);
        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        let ready = libc::select(
            libc::STDIN_FILENO + 1,
            &mut readfds,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut tv,
        );

        let mut byte = 0u8;
        let got = ready > 0
            && libc::FD_ISSET(libc::STDIN_FILENO, &readfds)
            && libc::read(libc::STDIN_FILENO, (&mut byte as *mut u8).cast(), 1) == 1;

        libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
        got.then_some(byte)
    }
}
