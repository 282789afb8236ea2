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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;

use serde::Serialize;

use crate::tcp_sock::AckSample;
use crate::tcp_sock::CaEvent;
use crate::tcp_sock::CaState;
use crate::tcp_sock::TcpSock;
use crate::Config;
use crate::Error;
use crate::Result;
pub use qvegas::module_params;
pub use qvegas::QVegas;
pub use qvegas::QVegasInfo;
pub use qvegas::QVegasParams;
pub use reno::Reno;
pub use rtt_sampler::RttSampler;
pub use rtt_sampler::RTT_INFINITY;

/// Available congestion control algorithm
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionControlAlgorithm {
    /// Reno grows the window by one segment per RTT in congestion avoidance
    /// and halves it on loss.
    Reno,

    /// QVegas compares the propagation delay with the RTT observed during the
    /// last round trip, and adjusts the window once per RTT to keep a small,
    /// bounded number of packets queued at the bottleneck.
    #[default]
    QVegas,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("reno") {
            Ok(CongestionControlAlgorithm::Reno)
        } else if algor.eq_ignore_ascii_case("qvegas") {
            Ok(CongestionControlAlgorithm::QVegas)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CongestionStats {
    /// RTT epochs completed.
    pub epochs: u64,

    /// Epochs closed by the standard algorithm because too few RTT samples
    /// were seen.
    pub low_confidence_epochs: u64,

    /// Times slow start was left because of queuing delay.
    pub slow_start_exits: u64,

    /// Epochs that ended with a one segment increase.
    pub cwnd_increases: u64,

    /// Epochs that ended with a one segment decrease.
    pub cwnd_decreases: u64,

    /// Epochs that left the window unchanged.
    pub cwnd_holds: u64,

    /// Full re-initializations (connection start, idle restart).
    pub restarts: u64,

    /// Valid RTT samples.
    pub rtt_samples: u64,

    /// ACKs without a valid RTT sample.
    pub invalid_rtt_samples: u64,
}

/// Algorithm specific diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum CongestionInfo {
    QVegas(QVegasInfo),
}

impl CongestionInfo {
    /// Render the diagnostics as a JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The loss based window growth rule a delay based controller falls back to
/// when it cannot trust its delay measurements.
pub trait StandardIncrease {
    /// Grow the window by up to `acked` segments without crossing
    /// `snd_ssthresh`. Return the part of `acked` left unused.
    fn slow_start(&self, tp: &mut TcpSock, acked: u32) -> u32;

    /// Per-ACK window growth: slow start below `snd_ssthresh`, additive
    /// increase above it.
    fn cong_avoid(&self, tp: &mut TcpSock, ack: u32, acked: u32);

    /// Slow start threshold that reflects the current window.
    fn current_ssthresh(&self, tp: &TcpSock) -> u32;
}

/// Congestion control interfaces shared by different algorithms.
///
/// The host transport owns the `TcpSock` and invokes these callbacks from the
/// connection's ACK processing path; at most one call per connection runs at a
/// time.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Initialize the algorithm state, on connection establishment or when the
    /// host restarts congestion control.
    fn init(&mut self, tp: &mut TcpSock) {}

    /// Slow start threshold to use after a loss.
    fn ssthresh(&mut self, tp: &TcpSock) -> u32;

    /// Per-ACK window adjustment.
    fn cong_avoid(&mut self, tp: &mut TcpSock, ack: u32, acked: u32);

    /// Callback for each ACK carrying a (possibly invalid) RTT sample.
    fn pkts_acked(&mut self, tp: &TcpSock, sample: &AckSample) {}

    /// Callback before the host changes its congestion state.
    fn set_state(&mut self, tp: &mut TcpSock, new_state: CaState) {}

    /// Callback for host events.
    fn cwnd_event(&mut self, tp: &mut TcpSock, event: CaEvent) {}

    /// Window to restore when a loss is found to be spurious.
    fn undo_cwnd(&self, tp: &TcpSock) -> u32;

    /// Algorithm diagnostics, if the algorithm exposes any.
    fn get_info(&self) -> Option<CongestionInfo> {
        None
    }

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &Config) -> Box<dyn CongestionController> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::Reno => Box::new(Reno::new()),
        CongestionControlAlgorithm::QVegas => Box::new(QVegas::new(conf.qvegas_params.clone())),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn congestion_control_name() {
        use super::*;

        let cases = [
            ("reno", Ok(CongestionControlAlgorithm::Reno)),
            ("Reno", Ok(CongestionControlAlgorithm::Reno)),
            ("RENO", Ok(CongestionControlAlgorithm::Reno)),
            ("qvegas", Ok(CongestionControlAlgorithm::QVegas)),
            ("QVegas", Ok(CongestionControlAlgorithm::QVegas)),
            ("QVEGAS", Ok(CongestionControlAlgorithm::QVegas)),
            ("vegas", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
    }

    #[test]
    fn build_controller() {
        use super::*;

        let mut config = Config::new();
        let cc = build_congestion_controller(&config);
        assert_eq!(cc.name(), "QVEGAS");

        config.set_congestion_control_algorithm(CongestionControlAlgorithm::Reno);
        let cc = build_congestion_controller(&config);
        assert_eq!(cc.name(), "RENO");
        assert!(cc.get_info().is_none());
        assert_eq!(format!("{:?}", cc), "congestion controller.");
    }

    #[test]
    fn congestion_info_json() {
        use super::*;

        let info = CongestionInfo::QVegas(QVegasInfo {
            enabled: true,
            rtt_cnt: 3,
            base_rtt: 100_000,
            min_rtt: 150_000,
        });
        assert_eq!(
            info.to_json().unwrap(),
            "{\"algorithm\":\"qvegas\",\"enabled\":true,\"rtt_cnt\":3,\"base_rtt\":100000,\"min_rtt\":150000}"
        );
    }
}

mod qvegas;
mod reno;
mod rtt_sampler;
