// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Note: The API is not stable and may change in future versions.

use std::ffi;
use std::io::Write;
use std::sync::atomic;

use libc::c_char;
use libc::c_int;
use libc::c_void;
use libc::size_t;

use crate::error::Error;
use crate::Result;
use crate::*;

struct LogWriter {
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: std::sync::atomic::AtomicPtr<c_void>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (self.cb)(
            buf.as_ptr(),
            buf.len(),
            self.argp.load(atomic::Ordering::Relaxed),
        );
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl log::Log for LogWriter {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!("{}: {}\n", record.target(), record.args());
        (self.cb)(
            line.as_ptr(),
            line.len(),
            self.argp.load(atomic::Ordering::Relaxed),
        );
    }

    fn flush(&self) {}
}

fn param_name<'a>(name: *const c_char) -> Result<&'a str> {
    if name.is_null() {
        return Err(Error::InvalidConfig("null parameter name".into()));
    }

    let name = unsafe { ffi::CStr::from_ptr(name) };
    name.to_str()
        .map_err(|_| Error::InvalidConfig("parameter name is not utf-8".into()))
}

/// Create the QVegas state of a connection, using the process wide tunables.
/// The caller is responsible for the memory of the QVegas instance and should
/// properly destroy it by calling `qvegas_free`.
#[no_mangle]
pub extern "C" fn qvegas_new() -> *mut QVegas {
    Box::into_raw(Box::new(QVegas::new(module_params())))
}

/// Destroy a QVegas instance.
#[no_mangle]
pub extern "C" fn qvegas_free(qvegas: *mut QVegas) {
    unsafe {
        let _ = Box::from_raw(qvegas);
    };
}

/// Initialize the connection state. Call it when the connection is established.
#[no_mangle]
pub extern "C" fn qvegas_init(qvegas: &mut QVegas, tp: &mut TcpSock) {
    qvegas.init(tp);
}

/// Feed the RTT sample carried by an ACK.
#[no_mangle]
pub extern "C" fn qvegas_pkts_acked(qvegas: &mut QVegas, tp: &TcpSock, sample: &AckSample) {
    qvegas.pkts_acked(tp, sample);
}

/// Adjust the congestion window on an ACK. `ack` is the acknowledged sequence
/// number and `acked` the number of newly acknowledged segments.
#[no_mangle]
pub extern "C" fn qvegas_cong_avoid(qvegas: &mut QVegas, tp: &mut TcpSock, ack: u32, acked: u32) {
    qvegas.cong_avoid(tp, ack, acked);
}

/// Notify a congestion state change, before `tp.ca_state` is updated.
#[no_mangle]
pub extern "C" fn qvegas_set_state(qvegas: &mut QVegas, tp: &mut TcpSock, state: CaState) {
    qvegas.set_state(tp, state);
}

/// Notify a congestion event.
#[no_mangle]
pub extern "C" fn qvegas_cwnd_event(qvegas: &mut QVegas, tp: &mut TcpSock, event: CaEvent) {
    qvegas.cwnd_event(tp, event);
}

/// Return the slow start threshold to use after a loss.
#[no_mangle]
pub extern "C" fn qvegas_ssthresh(qvegas: &mut QVegas, tp: &TcpSock) -> u32 {
    qvegas.ssthresh(tp)
}

/// Return the window to restore after a spurious loss.
#[no_mangle]
pub extern "C" fn qvegas_undo_cwnd(qvegas: &QVegas, tp: &TcpSock) -> u32 {
    qvegas.undo_cwnd(tp)
}

/// Copy the sampling diagnostics into `out`.
#[no_mangle]
pub extern "C" fn qvegas_get_info(qvegas: &QVegas, out: &mut QVegasInfo) -> c_int {
    match qvegas.get_info() {
        Some(CongestionInfo::QVegas(info)) => {
            *out = info;
            0
        }
        None => Error::SerializeError("no info".into()).to_errno(),
    }
}

/// Set a process wide tunable (`alpha`, `beta` or `gamma`).
/// Return 0 on success, or a negative error code.
#[no_mangle]
pub extern "C" fn qvegas_param_set(name: *const c_char, value: u32) -> c_int {
    match param_name(name).and_then(|name| module_params().set(name, value)) {
        Ok(_) => 0,
        Err(e) => e.to_errno(),
    }
}

/// Read a process wide tunable into `out`.
/// Return 0 on success, or a negative error code.
#[no_mangle]
pub extern "C" fn qvegas_param_get(name: *const c_char, out: &mut u32) -> c_int {
    match param_name(name).and_then(|name| module_params().get(name)) {
        Ok(v) => {
            *out = v;
            0
        }
        Err(e) => e.to_errno(),
    }
}

/// Set logger.
/// `cb` is a callback function that will be called for each log message.
/// `data` is a '\n' terminated log message and `argp` is user-defined data that will be passed to
/// the callback.
/// `level` represents the log level.
#[no_mangle]
pub extern "C" fn qvegas_set_logger(
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: *mut c_void,
    level: log::LevelFilter,
) {
    let argp = atomic::AtomicPtr::new(argp);
    let logger = Box::new(LogWriter { cb, argp });
    let _ = log::set_boxed_logger(logger);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffi_connection_lifecycle() {
        let qvegas = qvegas_new();
        assert!(!qvegas.is_null());

        let qv = unsafe { &mut *qvegas };
        let mut tp = TcpSock::new(10, u32::MAX);
        tp.snd_nxt = 100;
        qvegas_init(qv, &mut tp);

        let mut info = QVegasInfo::default();
        assert_eq!(qvegas_get_info(qv, &mut info), 0);
        assert!(info.enabled);
        assert_eq!(info.rtt_cnt, 0);

        qvegas_pkts_acked(
            qv,
            &tp,
            &AckSample {
                pkts_acked: 1,
                rtt_us: 40_000,
            },
        );
        qvegas_cong_avoid(qv, &mut tp, 101, 1);
        assert_eq!(tp.snd_cwnd, 11);

        qvegas_set_state(qv, &mut tp, CaState::Recovery);
        assert_eq!(qvegas_get_info(qv, &mut info), 0);
        assert!(!info.enabled);
        assert_eq!(qvegas_ssthresh(qv, &tp), 5);
        assert_eq!(qvegas_undo_cwnd(qv, &tp), 11);

        qvegas_cwnd_event(qv, &mut tp, CaEvent::CwndRestart);
        assert!(qv.is_sampling());

        qvegas_free(qvegas);
    }

    #[test]
    fn ffi_params() {
        let mut v = 0;
        let gamma = ffi::CString::new("gamma").unwrap();
        assert_eq!(qvegas_param_get(gamma.as_ptr(), &mut v), 0);
        assert_eq!(v, module_params().gamma());

        let unknown = ffi::CString::new("delta").unwrap();
        assert_eq!(qvegas_param_set(unknown.as_ptr(), 1), -1);
        assert_eq!(qvegas_param_get(unknown.as_ptr(), &mut v), -1);
        assert_eq!(qvegas_param_get(std::ptr::null(), &mut v), -1);
    }
}
