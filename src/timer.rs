//! Component E: the signal/timer plane. SIGINT sets a process-wide stop flag;
//! SIGHUP is caught and ignored; one interval timer drives SIGALRM into
//! exactly one of the flush-TX or rotate handlers for the life of a loop.
//!
//! Signal handlers can only touch async-signal-safe state, so every handler
//! here does nothing but flip an `AtomicBool` (and, for flush-TX, issue one
//! non-blocking syscall on a descriptor that outlives the loop). Everything
//! else happens back on the main thread, which polls the flags.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use error::{Error, Result};

static STOP: AtomicBool = AtomicBool::new(false);
static ROTATE_DUE: AtomicBool = AtomicBool::new(false);
static FLUSH_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_sigint(_: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

extern "C" fn on_sighup(_: libc::c_int) {}

extern "C" fn on_alarm_rotate(_: libc::c_int) {
    ROTATE_DUE.store(true, Ordering::SeqCst);
}

extern "C" fn on_alarm_flush(_: libc::c_int) {
    let fd = FLUSH_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        unsafe {
            libc::send(fd, std::ptr::null(), 0, libc::MSG_DONTWAIT);
        }
    }
}

/// What the next `SIGALRM` should do; bound once per loop invocation, never
/// switched mid-loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmPurpose {
    /// file→TX and RX→TX bridge loops: nudge the kernel to drain TX slots.
    FlushTx(RawFd),
    /// RX→file loop under time-interval rotation.
    RotateDump,
}

fn install(signum: libc::c_int, handler: extern "C" fn(libc::c_int)) -> Result<()> {
    let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
    sa.sa_sigaction = handler as usize;
    sa.sa_flags = 0;
    unsafe {
        libc::sigemptyset(&mut sa.sa_mask);
        if libc::sigaction(signum, &sa, std::ptr::null_mut()) < 0 {
            return Err(Error::Io {
                inner: std::io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

/// Installs SIGINT/SIGHUP and binds SIGALRM to the purpose this loop needs.
/// Must run once, before the loop's `poll`, and exactly once per process.
pub fn install_signal_handlers(purpose: AlarmPurpose) -> Result<()> {
    install(libc::SIGINT, on_sigint)?;
    install(libc::SIGHUP, on_sighup)?;
    match purpose {
        AlarmPurpose::FlushTx(fd) => {
            FLUSH_FD.store(fd, Ordering::SeqCst);
            install(libc::SIGALRM, on_alarm_flush)?;
        }
        AlarmPurpose::RotateDump => {
            install(libc::SIGALRM, on_alarm_rotate)?;
        }
    }
    Ok(())
}

/// Arms (or re-arms) the interval timer to fire once after `interval`, then
/// repeat every `interval`.
pub fn arm_interval(interval: Duration) -> Result<()> {
    let tv = libc::timeval {
        tv_sec: interval.as_secs() as libc::time_t,
        tv_usec: interval.subsec_micros() as libc::suseconds_t,
    };
    let itimer = libc::itimerval {
        it_interval: tv,
        it_value: tv,
    };
    let ret = unsafe { libc::setitimer(libc::ITIMER_REAL, &itimer, std::ptr::null_mut()) };
    if ret < 0 {
        return Err(Error::Io {
            inner: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

pub fn disarm() {
    let zero = libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };
    unsafe {
        libc::setitimer(libc::ITIMER_REAL, &zero, std::ptr::null_mut());
    }
}

pub fn stop_requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

pub fn request_stop() {
    STOP.store(true, Ordering::SeqCst);
}

/// Consumes the rotate-due flag, returning whether a rotation was pending.
pub fn take_rotate_due() -> bool {
    ROTATE_DUE.swap(false, Ordering::SeqCst)
}

/// Test-only: resets module-level flags so successive tests don't leak state
/// (the flags are process-global since signal handlers can't close over anything).
#[cfg(test)]
pub fn reset_for_test() {
    STOP.store(false, Ordering::SeqCst);
    ROTATE_DUE.store(false, Ordering::SeqCst);
    FLUSH_FD.store(-1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Signal state is process-global; serialize the tests that touch it.
    static LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn stop_flag_round_trips() {
        let _g = LOCK.lock().unwrap();
        reset_for_test();
        assert!(!stop_requested());
        request_stop();
        assert!(stop_requested());
        reset_for_test();
    }

    #[test]
    fn rotate_due_is_consumed_once() {
        let _g = LOCK.lock().unwrap();
        reset_for_test();
        ROTATE_DUE.store(true, Ordering::SeqCst);
        assert!(take_rotate_due());
        assert!(!take_rotate_due());
    }
}
