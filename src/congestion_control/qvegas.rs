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

//! QVegas: delay based congestion avoidance.
//!
//! QVegas compares the propagation delay of the path (the minimum RTT ever
//! seen) with the minimum RTT seen during the last round trip. The gap tells
//! how many packets the connection keeps queued at the bottleneck, and the
//! window is adjusted once per RTT to keep that number between `alpha` and
//! `beta`, before any loss happens.
//!
//! It differs from the Arizona Vegas in a few ways:
//!   o loss detection and recovery are left entirely to the host transport;
//!   o the window grows every RTT during slow start, like Reno;
//!   o the rate at which ACKs come back is used as the actual rate;
//!   o when leaving slow start, the window is set to achieve the actual rate;
//!   o the minimum RTT of the last round trip is used, to filter out the noise
//!     of delayed ACKs;
//!   o after an idle period, no decision is made until ACKs for an entire
//!     flight of new data have been received.
//!
//! See Brakmo and Peterson, "TCP Vegas: End to end congestion avoidance on a
//! global internet", IEEE JSAC 13(8), 1995.

use std::str::FromStr;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::*;
use serde::Serialize;
use strum_macros::EnumString;

use super::rtt_sampler::RttSampler;
use super::CongestionController;
use super::CongestionInfo;
use super::CongestionStats;
use super::Reno;
use super::StandardIncrease;
use crate::tcp_sock::after;
use crate::tcp_sock::AckSample;
use crate::tcp_sock::CaEvent;
use crate::tcp_sock::CaState;
use crate::tcp_sock::TcpSock;
use crate::Error;
use crate::Result;
use crate::TCP_INIT_CWND;

/// Default lower bound of packets queued in the network.
pub const DEFAULT_ALPHA: u32 = 2;

/// Default upper bound of packets queued in the network.
pub const DEFAULT_BETA: u32 = 4;

/// Default limit of packets queued in the network during slow start.
pub const DEFAULT_GAMMA: u32 = 1;

/// The window never drops below this many segments on a QVegas decision.
const MIN_CWND: u32 = 4;

/// Lower bound of the slow start threshold and of restored windows.
const MIN_SSTHRESH: u32 = 2;

/// Space a host reserves for the private state of a congestion control
/// module in each connection.
pub const CA_PRIV_SIZE: usize = 104;

/// Names of the QVegas tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum Param {
    Alpha,
    Beta,
    Gamma,
}

/// QVegas tunables.
///
/// One instance is shared by every connection using it. Values can be tuned at
/// runtime, each independently; connections pick the new values up on their
/// next decision.
#[derive(Debug)]
pub struct QVegasParams {
    /// Lower bound of packets in network.
    alpha: AtomicU32,

    /// Upper bound of packets in network.
    beta: AtomicU32,

    /// Limit on packets in network while in slow start.
    gamma: AtomicU32,
}

impl QVegasParams {
    pub fn new(alpha: u32, beta: u32, gamma: u32) -> Self {
        Self {
            alpha: AtomicU32::new(alpha),
            beta: AtomicU32::new(beta),
            gamma: AtomicU32::new(gamma),
        }
    }

    pub fn alpha(&self) -> u32 {
        self.alpha.load(Ordering::Relaxed)
    }

    pub fn beta(&self) -> u32 {
        self.beta.load(Ordering::Relaxed)
    }

    pub fn gamma(&self) -> u32 {
        self.gamma.load(Ordering::Relaxed)
    }

    pub fn set_alpha(&self, v: u32) {
        self.alpha.store(v, Ordering::Relaxed);
    }

    pub fn set_beta(&self, v: u32) {
        self.beta.store(v, Ordering::Relaxed);
    }

    pub fn set_gamma(&self, v: u32) {
        self.gamma.store(v, Ordering::Relaxed);
    }

    fn slot(&self, name: &str) -> Result<&AtomicU32> {
        let param = Param::from_str(name.trim())
            .map_err(|_| Error::InvalidConfig(format!("unknown parameter {}", name)))?;

        Ok(match param {
            Param::Alpha => &self.alpha,
            Param::Beta => &self.beta,
            Param::Gamma => &self.gamma,
        })
    }

    /// Read a tunable by name.
    pub fn get(&self, name: &str) -> Result<u32> {
        Ok(self.slot(name)?.load(Ordering::Relaxed))
    }

    /// Set a tunable by name.
    pub fn set(&self, name: &str, value: u32) -> Result<()> {
        self.slot(name)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Apply a `name=value` assignment, e.g. `beta=6`.
    pub fn apply(&self, assignment: &str) -> Result<()> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::InvalidConfig(format!("expect name=value: {}", assignment)))?;
        let value = value.trim().parse::<u32>()?;

        self.set(name, value)
    }
}

impl Default for QVegasParams {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA, DEFAULT_BETA, DEFAULT_GAMMA)
    }
}

lazy_static! {
    static ref MODULE_PARAMS: Arc<QVegasParams> = Arc::new(QVegasParams::default());
}

/// Process wide QVegas tunables.
pub fn module_params() -> Arc<QVegasParams> {
    MODULE_PARAMS.clone()
}

/// Snapshot of the QVegas sampling state.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QVegasInfo {
    /// Whether RTT sampling and per-RTT decisions are active.
    pub enabled: bool,

    /// Number of RTT samples in the current epoch.
    pub rtt_cnt: u16,

    /// Propagation delay estimate in microseconds.
    pub base_rtt: u32,

    /// Minimum RTT of the current epoch in microseconds.
    pub min_rtt: u32,
}

/// Per-connection QVegas state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct QVegasState {
    /// Right edge of the send window when the current epoch began.
    epoch_start_seq: u32,

    /// Left edge of the send window when the current epoch began.
    epoch_start_ack: u32,

    /// Window at the end of the previous epoch.
    recovered_cwnd: u32,

    /// Window to fall back to after a loss, or on a spurious loss.
    pre_loss_cwnd: u32,

    /// Window growth made by the standard algorithm since sampling was
    /// enabled.
    standard_increase_credit: u32,

    /// If true, make a QVegas decision at the end of this epoch.
    sampling_active: bool,

    /// RTT filters.
    sampler: RttSampler,
}

const _: () = assert!(std::mem::size_of::<QVegasState>() <= CA_PRIV_SIZE);

impl QVegasState {
    /// Begin taking samples, with the epoch ending at the next send edge.
    fn enable(&mut self, snd_nxt: u32, snd_una: u32) {
        self.sampling_active = true;
        self.epoch_start_seq = snd_nxt;
        self.epoch_start_ack = snd_una;
        self.standard_increase_credit = 0;
        self.sampler.reset_epoch();
    }

    /// Stop taking samples for now.
    fn disable(&mut self) {
        self.sampling_active = false;
    }

    /// Reset to a clean slate. Saved windows and RTT feedback are stale on
    /// connection establishment and after an idle period.
    fn full_reinit(&mut self, tp: &TcpSock) {
        self.pre_loss_cwnd = if self.sampler.is_initialized() {
            tp.snd_cwnd
        } else {
            TCP_INIT_CWND
        };
        self.recovered_cwnd = tp.snd_cwnd;
        self.sampler.reset_base();
        self.enable(tp.snd_nxt, tp.snd_una);
    }
}

/// Keep the window within `[MIN_CWND, snd_cwnd_clamp]`. The floor wins over
/// a clamp below it.
fn bound_cwnd(tp: &mut TcpSock) {
    if tp.snd_cwnd < MIN_CWND {
        tp.snd_cwnd = MIN_CWND;
    } else if tp.snd_cwnd > tp.snd_cwnd_clamp {
        tp.snd_cwnd = tp.snd_cwnd_clamp;
    }
}

/// QVegas congestion control algorithm.
///
/// `S` is the loss based algorithm used while delay samples cannot be trusted.
#[derive(Debug)]
pub struct QVegas<S: StandardIncrease = Reno> {
    /// Tunables.
    params: Arc<QVegasParams>,

    /// Fallback window growth.
    standard: S,

    /// Per-connection state.
    state: QVegasState,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl QVegas<Reno> {
    pub fn new(params: Arc<QVegasParams>) -> Self {
        Self::with_strategy(params, Reno::new())
    }
}

impl<S: StandardIncrease> QVegas<S> {
    pub fn with_strategy(params: Arc<QVegasParams>, standard: S) -> Self {
        Self {
            params,
            standard,
            state: QVegasState::default(),
            stats: Default::default(),
        }
    }

    /// Whether per-RTT decisions are currently made.
    pub fn is_sampling(&self) -> bool {
        self.state.sampling_active
    }

    /// RTT filters of the connection.
    pub fn rtt_sampler(&self) -> &RttSampler {
        &self.state.sampler
    }

    fn name_str(&self) -> &'static str {
        "QVEGAS"
    }

    /// Run the standard algorithm and account for the growth it made.
    fn standard_cong_avoid(&mut self, tp: &mut TcpSock, ack: u32, acked: u32) {
        let cwnd = tp.snd_cwnd;
        self.standard.cong_avoid(tp, ack, acked);
        self.credit(tp.snd_cwnd.saturating_sub(cwnd));
    }

    fn credit(&mut self, inc: u32) {
        self.state.standard_increase_credit =
            self.state.standard_increase_credit.saturating_add(inc);
    }

    /// Slow start threshold after the window was found too large.
    ///
    /// With segments presumed lost, also refresh the window to restore once
    /// the loss is repaired.
    fn recompute_ssthresh(&mut self, tp: &TcpSock) -> u32 {
        if tp.lost_out > 0 {
            // Read as `cwnd - (credit >> 1)`. The same expression in C,
            // `cwnd - credit >> 1`, parses as `(cwnd - credit) >> 1`.
            self.state.pre_loss_cwnd = tp
                .snd_cwnd
                .saturating_sub(self.state.standard_increase_credit >> 1)
                .max(MIN_SSTHRESH);
        }

        tp.snd_ssthresh
            .min(tp.snd_cwnd.saturating_sub(1))
            .max(MIN_SSTHRESH)
    }

    /// The once-per-RTT decision, made with enough samples in the epoch.
    fn adjust_cwnd(&mut self, tp: &mut TcpSock, acked: u32) {
        // The min RTT of the last epoch filters out delayed ACKs, at the cost
        // of noticing congestion a bit later.
        let rtt = self.state.sampler.min_rtt() as u64;
        let base_rtt = self.state.sampler.base_rtt() as u64;
        let cwnd = tp.snd_cwnd as u64;

        // The window we should have if we weren't queuing:
        //     (actual rate in segments) * base_rtt
        let target_cwnd = cwnd * base_rtt / rtt;

        // Packets we keep queued in the network beyond what the bottleneck
        // needs. This is "Diff" from the Vegas paper.
        let diff = cwnd * rtt.saturating_sub(base_rtt) / base_rtt;

        let alpha = self.params.alpha() as u64;
        let beta = self.params.beta() as u64;
        let gamma = self.params.gamma() as u64;

        if diff > gamma && tp.in_slow_start() {
            // Going too fast. Set the window to match the actual rate, plus
            // one since the integer truncation robs us of full utilization.
            let target = u32::try_from(target_cwnd.saturating_add(1)).unwrap_or(u32::MAX);
            tp.snd_cwnd = tp.snd_cwnd.min(target);
            tp.snd_ssthresh = self.recompute_ssthresh(tp);
            self.stats.slow_start_exits = self.stats.slow_start_exits.saturating_add(1);

            debug!(
                "{}. exit slow start, diff = {}, target_cwnd = {}, cwnd {} -> {}, ssthresh = {}",
                self.name_str(),
                diff,
                target_cwnd,
                cwnd,
                tp.snd_cwnd,
                tp.snd_ssthresh
            );
        } else if tp.in_slow_start() {
            self.standard.slow_start(tp, acked);
        } else if diff > beta {
            // Too many packets queued, slow down.
            tp.snd_cwnd = tp.snd_cwnd.saturating_sub(1);
            tp.snd_ssthresh = self.recompute_ssthresh(tp);
            self.stats.cwnd_decreases = self.stats.cwnd_decreases.saturating_add(1);
        } else if diff < alpha {
            // Not enough packets in the network, speed up.
            tp.snd_cwnd = tp.snd_cwnd.saturating_add(1);
            self.stats.cwnd_increases = self.stats.cwnd_increases.saturating_add(1);
        } else {
            self.stats.cwnd_holds = self.stats.cwnd_holds.saturating_add(1);
        }

        bound_cwnd(tp);
        tp.snd_ssthresh = self.standard.current_ssthresh(tp);

        debug!(
            "{}. rtt = {}us, base_rtt = {}us, diff = {}, cwnd {} -> {}, ssthresh = {}",
            self.name_str(),
            rtt,
            base_rtt,
            diff,
            cwnd,
            tp.snd_cwnd,
            tp.snd_ssthresh
        );
    }

    /// Wipe the slate clean for the next epoch.
    fn close_epoch(&mut self, tp: &TcpSock) {
        self.state.sampler.reset_epoch();
        self.state.recovered_cwnd = tp.snd_cwnd;

        // Keep a loss seed computed during this epoch.
        if tp.lost_out == 0 {
            self.state.pre_loss_cwnd = tp.snd_cwnd;
        }
    }
}

impl<S: StandardIncrease> CongestionController for QVegas<S> {
    fn name(&self) -> &str {
        self.name_str()
    }

    fn init(&mut self, tp: &mut TcpSock) {
        self.state.full_reinit(tp);
        self.stats.restarts = self.stats.restarts.saturating_add(1);

        debug!(
            "{}. init, cwnd = {}, pre_loss_cwnd = {}, snd_nxt = {}",
            self.name(),
            tp.snd_cwnd,
            self.state.pre_loss_cwnd,
            tp.snd_nxt
        );
    }

    fn ssthresh(&mut self, tp: &TcpSock) -> u32 {
        (tp.snd_cwnd >> 1).max(MIN_SSTHRESH)
    }

    fn cong_avoid(&mut self, tp: &mut TcpSock, ack: u32, acked: u32) {
        if !self.state.sampling_active {
            // Decisions are suspended, only slow start continues.
            if tp.in_slow_start() {
                let cwnd = tp.snd_cwnd;
                self.standard.slow_start(tp, acked);
                self.credit(tp.snd_cwnd.saturating_sub(cwnd));
            }
            return;
        }

        if !after(ack, self.state.epoch_start_seq) {
            if tp.in_slow_start() {
                self.standard.slow_start(tp, acked);
            }
            return;
        }

        // A full epoch has elapsed. Decide from the window it started with.
        tp.snd_cwnd = self.state.recovered_cwnd;
        self.state.epoch_start_seq = tp.snd_nxt;
        self.state.epoch_start_ack = tp.snd_una;
        self.stats.epochs = self.stats.epochs.saturating_add(1);

        if self.state.sampler.is_confident() {
            self.adjust_cwnd(tp, acked);
        } else {
            // With two samples or fewer we are most likely seeing one delayed
            // ACK per RTT; the measured delay is not reliable.
            trace!(
                "{}. {} rtt samples in epoch, use standard increase",
                self.name(),
                self.state.sampler.sample_count()
            );
            self.standard_cong_avoid(tp, ack, acked);
            self.stats.low_confidence_epochs = self.stats.low_confidence_epochs.saturating_add(1);
        }

        self.close_epoch(tp);
    }

    fn pkts_acked(&mut self, _tp: &TcpSock, sample: &AckSample) {
        if self.state.sampler.on_ack_rtt(sample.rtt_us) {
            self.stats.rtt_samples = self.stats.rtt_samples.saturating_add(1);
        } else {
            self.stats.invalid_rtt_samples = self.stats.invalid_rtt_samples.saturating_add(1);
        }

        trace!(
            "{}. ON_ACK. rtt = {}us, min_rtt = {}us, base_rtt = {}us, cnt = {}",
            self.name(),
            sample.rtt_us,
            self.state.sampler.min_rtt(),
            self.state.sampler.base_rtt(),
            self.state.sampler.sample_count()
        );
    }

    fn set_state(&mut self, tp: &mut TcpSock, new_state: CaState) {
        if new_state == CaState::Open {
            self.state.enable(tp.snd_nxt, tp.snd_una);
            tp.snd_cwnd = self.state.pre_loss_cwnd;
            bound_cwnd(tp);
            self.state.recovered_cwnd = tp.snd_cwnd;
        } else {
            self.state.disable();
        }

        debug!(
            "{}. state -> {}, sampling = {}, cwnd = {}",
            self.name(),
            new_state,
            self.state.sampling_active,
            tp.snd_cwnd
        );
    }

    fn cwnd_event(&mut self, tp: &mut TcpSock, event: CaEvent) {
        match event {
            // Restarting from idle: wait for fresh samples of a whole flight
            // of new data before deciding again.
            CaEvent::CwndRestart | CaEvent::TxStart => self.init(tp),
            CaEvent::CompleteCwr | CaEvent::Loss | CaEvent::EcnNoCe | CaEvent::EcnIsCe => (),
        }
    }

    fn undo_cwnd(&self, _tp: &TcpSock) -> u32 {
        self.state.pre_loss_cwnd.max(MIN_SSTHRESH)
    }

    fn get_info(&self) -> Option<CongestionInfo> {
        Some(CongestionInfo::QVegas(QVegasInfo {
            enabled: self.state.sampling_active,
            rtt_cnt: self.state.sampler.sample_count(),
            base_rtt: self.state.sampler.base_rtt(),
            min_rtt: self.state.sampler.min_rtt(),
        }))
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
