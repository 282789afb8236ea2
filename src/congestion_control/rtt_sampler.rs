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

/// RTT value meaning "no sample yet", in microseconds.
pub const RTT_INFINITY: u32 = 0x7fff_ffff;

/// Minimum number of RTT samples in an epoch needed to trust the epoch's
/// minimum. With two samples or fewer the receiver is most likely sending one
/// delayed ACK per RTT.
const MIN_CONFIDENT_SAMPLES: u16 = 3;

/// Min-filters RTT samples over two horizons:
///   o the current epoch (one RTT), giving propagation plus queuing delay;
///   o the lifetime of the connection, giving the propagation delay.
///
/// Taking the minimum within an epoch filters out the effect of delayed ACKs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RttSampler {
    /// Minimum of all RTT samples since the last full reset, in microseconds.
    /// Zero until the sampler is first reset.
    base_rtt: u32,

    /// Minimum RTT seen in the current epoch, in microseconds.
    min_rtt: u32,

    /// Number of RTT samples seen in the current epoch.
    cnt_rtt: u16,
}

impl RttSampler {
    /// Feed the RTT measured by one ACK. Negative samples carry no measurement
    /// and are ignored.
    pub fn on_ack_rtt(&mut self, sample_us: i64) -> bool {
        if sample_us < 0 {
            return false;
        }

        // Never allow a zero RTT; it ends up as a divisor.
        let vrtt = sample_us.clamp(1, (RTT_INFINITY - 1) as i64) as u32;

        if !self.has_base_rtt() || vrtt < self.base_rtt {
            self.base_rtt = vrtt;
        }
        self.min_rtt = self.min_rtt.min(vrtt);
        self.cnt_rtt = self.cnt_rtt.saturating_add(1);

        true
    }

    /// Start a new epoch.
    pub fn reset_epoch(&mut self) {
        self.cnt_rtt = 0;
        self.min_rtt = RTT_INFINITY;
    }

    /// Forget the propagation delay estimate.
    pub fn reset_base(&mut self) {
        self.base_rtt = RTT_INFINITY;
    }

    /// Whether the sampler has ever been reset. A fresh connection has not.
    pub fn is_initialized(&self) -> bool {
        self.base_rtt != 0
    }

    /// Whether `base_rtt` holds a real measurement.
    pub fn has_base_rtt(&self) -> bool {
        self.base_rtt != 0 && self.base_rtt != RTT_INFINITY
    }

    /// Whether the current epoch carries enough samples to make a decision.
    pub fn is_confident(&self) -> bool {
        self.cnt_rtt >= MIN_CONFIDENT_SAMPLES
            && self.has_base_rtt()
            && self.min_rtt != RTT_INFINITY
    }

    pub fn base_rtt(&self) -> u32 {
        self.base_rtt
    }

    pub fn min_rtt(&self) -> u32 {
        self.min_rtt
    }

    pub fn sample_count(&self) -> u16 {
        self.cnt_rtt
    }
}
