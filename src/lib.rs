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

//! QVegas is a delay based TCP congestion control algorithm, a variant of
//! TCP Vegas.
//!
//! On every acknowledgment the host transport hands its sender state
//! ([`TcpSock`]) to a [`CongestionController`], which updates the congestion
//! window and slow start threshold in place. QVegas estimates the path's
//! propagation delay, compares it with the RTT observed during the last round
//! trip, and uses the gap to detect queuing before packets are lost.
//!
//! Loss detection, retransmission and timers stay with the host; it reports
//! state changes ([`CaState`]) and events ([`CaEvent`]) to the controller.
//!
//! ## Get started
//!
//! ```
//! use qvegas::AckSample;
//! use qvegas::Config;
//! use qvegas::TcpSock;
//!
//! let config = Config::new();
//! let mut tp = TcpSock::new(config.initial_congestion_window(), config.congestion_window_clamp());
//! let mut cc = qvegas::build_congestion_controller(&config);
//!
//! cc.init(&mut tp);
//! tp.snd_nxt = tp.snd_nxt.wrapping_add(10);
//! cc.pkts_acked(&tp, &AckSample { pkts_acked: 1, rtt_us: 20_000 });
//! cc.cong_avoid(&mut tp, 1, 1);
//! assert_eq!(tp.snd_cwnd, 11);
//! ```
//!
//! ## Feature flags
//!
//! * `ffi`: Build and expose the FFI API.

use std::sync::Arc;

/// The initial congestion window in segments.
/// See RFC 6928.
pub const TCP_INIT_CWND: u32 = 10;

/// Slow start threshold before the first congestion event.
pub const TCP_INFINITE_SSTHRESH: u32 = 0x7fff_ffff;

/// Result type for congestion control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about congestion control.
#[derive(Debug, Clone)]
pub struct Config {
    /// The congestion control algorithm used for a connection.
    congestion_control_algorithm: CongestionControlAlgorithm,

    /// The initial congestion window in segments.
    initial_congestion_window: u32,

    /// The upper bound of the congestion window in segments.
    congestion_window_clamp: u32,

    /// QVegas tunables, shared by every connection built from this config.
    qvegas_params: Arc<QVegasParams>,
}

impl Config {
    /// Create default configuration, using the process wide QVegas tunables.
    pub fn new() -> Self {
        Self {
            congestion_control_algorithm: CongestionControlAlgorithm::default(),
            initial_congestion_window: TCP_INIT_CWND,
            congestion_window_clamp: u32::MAX,
            qvegas_params: module_params(),
        }
    }

    /// Set the congestion control algorithm.
    /// The default value is `QVegas`.
    pub fn set_congestion_control_algorithm(&mut self, v: CongestionControlAlgorithm) {
        self.congestion_control_algorithm = v;
    }

    /// Set the initial congestion window in segments.
    /// The default value is `10`.
    pub fn set_initial_congestion_window(&mut self, v: u32) {
        self.initial_congestion_window = v.max(1);
    }

    /// Set the upper bound of the congestion window in segments. Values below
    /// the QVegas window floor of `4` segments are raised to it.
    pub fn set_congestion_window_clamp(&mut self, v: u32) {
        self.congestion_window_clamp = v.max(4);
    }

    /// Use a private set of QVegas tunables instead of the process wide one.
    /// `alpha` must not exceed `beta`.
    pub fn set_qvegas_params(&mut self, alpha: u32, beta: u32, gamma: u32) -> Result<()> {
        if alpha > beta {
            return Err(Error::InvalidConfig(format!(
                "alpha {} is larger than beta {}",
                alpha, beta
            )));
        }

        self.qvegas_params = Arc::new(QVegasParams::new(alpha, beta, gamma));
        Ok(())
    }

    pub fn congestion_control_algorithm(&self) -> CongestionControlAlgorithm {
        self.congestion_control_algorithm
    }

    pub fn initial_congestion_window(&self) -> u32 {
        self.initial_congestion_window
    }

    pub fn congestion_window_clamp(&self) -> u32 {
        self.congestion_window_clamp
    }

    pub fn qvegas_params(&self) -> &Arc<QVegasParams> {
        &self.qvegas_params
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::module_params;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionInfo;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::QVegas;
pub use crate::congestion_control::QVegasInfo;
pub use crate::congestion_control::QVegasParams;
pub use crate::congestion_control::Reno;
pub use crate::congestion_control::RttSampler;
pub use crate::congestion_control::StandardIncrease;
pub use crate::congestion_control::RTT_INFINITY;
pub use crate::error::Error;
pub use crate::tcp_sock::after;
pub use crate::tcp_sock::before;
pub use crate::tcp_sock::AckSample;
pub use crate::tcp_sock::CaEvent;
pub use crate::tcp_sock::CaState;
pub use crate::tcp_sock::TcpSock;

#[path = "congestion_control/congestion_control.rs"]
mod congestion_control;

#[cfg(feature = "ffi")]
mod ffi;

pub mod error;
pub mod tcp_sock;
