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

//! The part of a TCP control block that congestion control reads and writes.

use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumIter;

use crate::TCP_INFINITE_SSTHRESH;

/// Congestion state of the host transport.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Display, EnumIter, Serialize)]
pub enum CaState {
    /// Normal state, no dubious events.
    #[default]
    Open,

    /// Duplicate ACKs or SACKs were received.
    Disorder,

    /// The window was reduced due to a congestion notification (ECN, local
    /// device queue).
    Cwr,

    /// Fast retransmit is in progress.
    Recovery,

    /// A retransmission timeout fired.
    Loss,
}

/// Events the host transport reports to congestion control.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Display, EnumIter, Serialize)]
pub enum CaEvent {
    /// First transmission when no packets are in flight.
    TxStart,

    /// The window is restarted after an idle period.
    CwndRestart,

    /// End of the congestion window reduction.
    CompleteCwr,

    /// Loss timeout.
    Loss,

    /// An ECT packet without the CE mark was received.
    EcnNoCe,

    /// A packet with the CE mark was received.
    EcnIsCe,
}

/// Acknowledgment sample passed to congestion control for each ACK.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct AckSample {
    /// Number of segments newly acknowledged.
    pub pkts_acked: u32,

    /// RTT measured by this ACK in microseconds. Negative if the ACK carries
    /// no valid measurement.
    pub rtt_us: i64,
}

/// TCP sender state shared between the host transport and congestion control.
///
/// Windows and thresholds are counted in segments.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TcpSock {
    /// Congestion window.
    pub snd_cwnd: u32,

    /// Slow start threshold.
    pub snd_ssthresh: u32,

    /// Upper bound of the congestion window.
    pub snd_cwnd_clamp: u32,

    /// Linear increase counter.
    pub snd_cwnd_cnt: u32,

    /// Next sequence number to be sent.
    pub snd_nxt: u32,

    /// First byte we want an ack for.
    pub snd_una: u32,

    /// Congestion window before the last reduction.
    pub prior_cwnd: u32,

    /// Segments presumed lost.
    pub lost_out: u32,

    /// Whether the sender is limited by the congestion window.
    pub is_cwnd_limited: bool,

    /// Congestion state.
    pub ca_state: CaState,
}

impl TcpSock {
    pub fn new(initial_cwnd: u32, cwnd_clamp: u32) -> Self {
        Self {
            snd_cwnd: initial_cwnd,
            snd_ssthresh: TCP_INFINITE_SSTHRESH,
            snd_cwnd_clamp: cwnd_clamp,
            snd_cwnd_cnt: 0,
            snd_nxt: 0,
            snd_una: 0,
            prior_cwnd: 0,
            lost_out: 0,
            is_cwnd_limited: true,
            ca_state: CaState::Open,
        }
    }

    /// Check if the sender is in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.snd_cwnd < self.snd_ssthresh
    }

    /// Check if the window is currently being reduced.
    pub fn in_recovery_or_cwr(&self) -> bool {
        matches!(self.ca_state, CaState::Cwr | CaState::Recovery)
    }
}

impl Default for TcpSock {
    fn default() -> Self {
        Self::new(crate::TCP_INIT_CWND, u32::MAX)
    }
}

/// Return true if `seq1` is before `seq2` in sequence space.
#[inline]
pub fn before(seq1: u32, seq2: u32) -> bool {
    (seq1.wrapping_sub(seq2) as i32) < 0
}

/// Return true if `seq2` is before `seq1` in sequence space.
#[inline]
pub fn after(seq1: u32, seq2: u32) -> bool {
    before(seq2, seq1)
}
