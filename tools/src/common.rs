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

//! A sender driving a congestion controller over a single bottleneck link.

use std::collections::VecDeque;
use std::fs::OpenOptions;

use log::*;
use rand::Rng;
use serde::Serialize;
use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;
use statrs::statistics::OrderStatistics;

use qvegas::before;
use qvegas::AckSample;
use qvegas::CaEvent;
use qvegas::CaState;
use qvegas::CongestionController;
use qvegas::CongestionInfo;
use qvegas::CongestionStats;
use qvegas::TcpSock;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Size of a simulated segment in bytes.
pub const SEGMENT_SIZE: u64 = 1500;

/// Log target: the given file, or `stderr` if there is none.
pub fn log_target(log_file: &Option<String>) -> Result<env_logger::Target> {
    if let Some(log_file) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        return Ok(env_logger::Target::Pipe(Box::new(file)));
    }

    Ok(env_logger::Target::Stderr)
}

/// Bottleneck link and traffic settings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LinkConfig {
    /// Bottleneck bandwidth in Mbit/s.
    pub bandwidth_mbps: f64,

    /// Propagation round trip time in microseconds.
    pub prop_rtt_us: u64,

    /// Bottleneck buffer in segments.
    pub buffer: u64,

    /// Probability that a segment is dropped on the path.
    pub loss_rate: f64,

    /// Simulated time in microseconds.
    pub duration_us: u64,

    /// The sender pauses at `.0` for `.1` microseconds.
    pub idle: Option<(u64, u64)>,
}

impl LinkConfig {
    /// Time to serialize one segment on the bottleneck, in microseconds.
    fn service_us(&self) -> u64 {
        let bits = (SEGMENT_SIZE * 8) as f64;
        (bits / self.bandwidth_mbps).ceil().max(1.0) as u64
    }

    /// Bandwidth delay product in segments.
    pub fn bdp(&self) -> u64 {
        self.prop_rtt_us / self.service_us()
    }
}

#[derive(Debug)]
struct Segment {
    seq: u32,
    sent_at: u64,
    acked_at: u64,
    lost: bool,
}

/// Min, max and percentiles of a series.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub p90: f64,
    pub p99: f64,
}

impl Summary {
    fn new(samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut s = Data::new(samples);
        Summary {
            min: s.min(),
            max: s.max(),
            mean: s.mean().unwrap_or(0.0),
            std_dev: s.std_dev().unwrap_or(0.0),
            median: s.median(),
            p90: s.percentile(90),
            p99: s.percentile(99),
        }
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub algorithm: String,
    pub link: LinkConfig,
    pub bdp: u64,
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub recoveries: u64,
    pub throughput_mbps: f64,

    /// Congestion window in segments, sampled on every ACK.
    pub cwnd: Summary,

    /// RTT in milliseconds.
    pub rtt: Summary,

    pub stats: CongestionStats,
    pub info: Option<CongestionInfo>,
}

/// A window limited sender over one bottleneck with a FIFO drop-tail queue.
pub struct Simulation<R: Rng> {
    link: LinkConfig,
    tp: TcpSock,
    cc: Box<dyn CongestionController>,
    rng: R,

    /// Current time in microseconds.
    now: u64,

    /// Time the bottleneck finishes serializing its last queued segment.
    busy_until: u64,

    /// Segments sent and not yet acknowledged, in sending order.
    inflight: VecDeque<Segment>,

    /// Recovery ends when this sequence is acknowledged.
    recovery_point: Option<u32>,

    idle_done: bool,
    sent: u64,
    delivered: u64,
    lost: u64,
    recoveries: u64,
    cwnd_samples: Vec<f64>,
    rtt_samples: Vec<f64>,
}

impl<R: Rng> Simulation<R> {
    pub fn new(
        link: LinkConfig,
        mut tp: TcpSock,
        mut cc: Box<dyn CongestionController>,
        rng: R,
    ) -> Self {
        cc.init(&mut tp);

        Self {
            link,
            tp,
            cc,
            rng,
            now: 0,
            busy_until: 0,
            inflight: VecDeque::new(),
            recovery_point: None,
            idle_done: false,
            sent: 0,
            delivered: 0,
            lost: 0,
            recoveries: 0,
            cwnd_samples: Vec::new(),
            rtt_samples: Vec::new(),
        }
    }

    /// Run until the simulated time is over.
    pub fn run(mut self) -> Report {
        while self.now < self.link.duration_us {
            if !self.is_idle() {
                self.send();
            }

            match self.inflight.pop_front() {
                Some(seg) => {
                    self.now = seg.acked_at;
                    if seg.lost {
                        self.on_loss();
                    } else {
                        self.on_ack(seg);
                    }
                }
                None => {
                    if !self.restart_after_idle() {
                        break;
                    }
                }
            }
        }

        self.report()
    }

    fn is_idle(&self) -> bool {
        match self.link.idle {
            Some((start, _)) => !self.idle_done && self.now >= start,
            None => false,
        }
    }

    /// Resume sending once everything in flight has drained.
    fn restart_after_idle(&mut self) -> bool {
        let (start, len) = match self.link.idle {
            Some(idle) if self.is_idle() => idle,
            _ => return false,
        };

        self.now = self.now.max(start.saturating_add(len));
        self.idle_done = true;
        if self.recovery_point.take().is_some() {
            self.exit_recovery();
        }
        self.cc.cwnd_event(&mut self.tp, CaEvent::CwndRestart);

        debug!("{}. resume after idle at {}us", self.cc.name(), self.now);
        true
    }

    fn send(&mut self) {
        let service = self.link.service_us();

        while (self.inflight.len() as u64) < self.tp.snd_cwnd as u64 {
            let seq = self.tp.snd_nxt;
            self.tp.snd_nxt = self.tp.snd_nxt.wrapping_add(1);
            self.sent += 1;

            let start = self.busy_until.max(self.now);
            let backlog = (start - self.now) / service;
            let dropped = backlog >= self.link.buffer || self.rng.gen_bool(self.link.loss_rate);

            let acked_at = if dropped {
                // Noticed by the ACK of the segment sent after it.
                start + service + self.link.prop_rtt_us
            } else {
                self.busy_until = start + service;
                self.busy_until + self.link.prop_rtt_us
            };

            self.inflight.push_back(Segment {
                seq,
                sent_at: self.now,
                acked_at,
                lost: dropped,
            });
        }
    }

    fn on_loss(&mut self) {
        self.lost += 1;
        self.tp.lost_out = self.tp.lost_out.saturating_add(1);

        if self.recovery_point.is_some() {
            return;
        }

        self.cc.set_state(&mut self.tp, CaState::Recovery);
        self.tp.prior_cwnd = self.tp.snd_cwnd;
        self.tp.snd_ssthresh = self.cc.ssthresh(&self.tp);
        self.tp.snd_cwnd = self.tp.snd_ssthresh;
        self.tp.ca_state = CaState::Recovery;
        self.recovery_point = Some(self.tp.snd_nxt);
        self.recoveries += 1;

        debug!(
            "{}. enter recovery at {}us, cwnd {} -> {}",
            self.cc.name(),
            self.now,
            self.tp.prior_cwnd,
            self.tp.snd_cwnd
        );
    }

    fn exit_recovery(&mut self) {
        self.cc.set_state(&mut self.tp, CaState::Open);
        self.tp.ca_state = CaState::Open;
        self.tp.lost_out = 0;
    }

    fn on_ack(&mut self, seg: Segment) {
        let ack = seg.seq.wrapping_add(1);
        let rtt = self.now - seg.sent_at;

        self.delivered += 1;
        self.tp.snd_una = ack;
        self.cc.pkts_acked(
            &self.tp,
            &AckSample {
                pkts_acked: 1,
                rtt_us: rtt as i64,
            },
        );

        match self.recovery_point {
            Some(point) if !before(ack, point) => {
                self.recovery_point = None;
                self.exit_recovery();
            }
            Some(_) => (),
            None => self.cc.cong_avoid(&mut self.tp, ack, 1),
        }

        self.cwnd_samples.push(self.tp.snd_cwnd as f64);
        self.rtt_samples.push(rtt as f64 / 1000.0);
    }

    fn report(self) -> Report {
        let throughput_mbps = (self.delivered * SEGMENT_SIZE * 8) as f64 / self.now.max(1) as f64;

        Report {
            algorithm: self.cc.name().to_string(),
            link: self.link,
            bdp: self.link.bdp(),
            sent: self.sent,
            delivered: self.delivered,
            lost: self.lost,
            recoveries: self.recoveries,
            throughput_mbps,
            cwnd: Summary::new(self.cwnd_samples),
            rtt: Summary::new(self.rtt_samples),
            stats: self.cc.stats().clone(),
            info: self.cc.get_info(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvegas::CongestionControlAlgorithm;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn link() -> LinkConfig {
        LinkConfig {
            bandwidth_mbps: 12.0,
            prop_rtt_us: 40_000,
            buffer: 100,
            loss_rate: 0.0,
            duration_us: 10_000_000,
            idle: None,
        }
    }

    fn run(link: LinkConfig, algor: CongestionControlAlgorithm) -> Report {
        let mut config = qvegas::Config::new();
        config.set_congestion_control_algorithm(algor);

        let tp = TcpSock::new(
            config.initial_congestion_window(),
            config.congestion_window_clamp(),
        );
        let cc = qvegas::build_congestion_controller(&config);
        Simulation::new(link, tp, cc, StdRng::seed_from_u64(7)).run()
    }

    #[test]
    fn link_bdp() {
        let link = link();
        assert_eq!(link.service_us(), 1000);
        assert_eq!(link.bdp(), 40);
    }

    #[test]
    fn qvegas_clean_link() {
        let report = run(link(), CongestionControlAlgorithm::QVegas);
        assert_eq!(report.algorithm, "QVEGAS");
        assert!(report.delivered > 0);
        assert!(report.stats.epochs > 0);
        assert!(report.rtt.min >= 40.0);
        assert!(report.throughput_mbps <= 12.0);
        assert!(matches!(report.info, Some(CongestionInfo::QVegas(_))));
    }

    #[test]
    fn random_loss_enters_recovery() {
        let mut link = link();
        link.loss_rate = 0.05;

        for algor in [CongestionControlAlgorithm::QVegas, CongestionControlAlgorithm::Reno] {
            let report = run(link, algor);
            assert!(report.lost > 0);
            assert!(report.recoveries > 0);
            assert!(report.recoveries <= report.lost);
        }
    }

    #[test]
    fn idle_restart() {
        let mut link = link();
        link.idle = Some((2_000_000, 1_000_000));

        let report = run(link, CongestionControlAlgorithm::QVegas);
        assert_eq!(report.stats.restarts, 2);
    }

    #[test]
    fn report_json() {
        let report = run(link(), CongestionControlAlgorithm::Reno);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"algorithm\":\"RENO\""));
        assert!(json.contains("\"info\":null"));
    }
}
