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

//! Reno: slow start, additive increase and multiplicative decrease.
//!
//! See <https://www.rfc-editor.org/rfc/rfc5681.html>.

use log::*;

use super::CongestionController;
use super::CongestionStats;
use super::StandardIncrease;
use crate::tcp_sock::TcpSock;

/// Reno congestion control algorithm.
#[derive(Debug, Default)]
pub struct Reno {
    /// Congestion statistics.
    stats: CongestionStats,
}

impl Reno {
    pub fn new() -> Self {
        Self::default()
    }

    /// In theory this is `cwnd += 1 / cwnd` per acked segment; `snd_cwnd_cnt`
    /// accumulates acked segments until a whole window of `w` is reached.
    fn cong_avoid_ai(&self, tp: &mut TcpSock, w: u32, acked: u32) {
        let w = w.max(1);

        // If credits accumulated at a higher w, apply them gently now.
        if tp.snd_cwnd_cnt >= w {
            tp.snd_cwnd_cnt = 0;
            tp.snd_cwnd = tp.snd_cwnd.saturating_add(1);
        }

        tp.snd_cwnd_cnt = tp.snd_cwnd_cnt.saturating_add(acked);
        if tp.snd_cwnd_cnt >= w {
            let delta = tp.snd_cwnd_cnt / w;

            tp.snd_cwnd_cnt -= delta * w;
            tp.snd_cwnd = tp.snd_cwnd.saturating_add(delta);
        }
        tp.snd_cwnd = tp.snd_cwnd.min(tp.snd_cwnd_clamp);
    }
}

impl StandardIncrease for Reno {
    fn slow_start(&self, tp: &mut TcpSock, acked: u32) -> u32 {
        let cwnd = tp.snd_cwnd.saturating_add(acked).min(tp.snd_ssthresh);
        let used = cwnd.saturating_sub(tp.snd_cwnd);

        tp.snd_cwnd = cwnd.min(tp.snd_cwnd_clamp);
        acked.saturating_sub(used)
    }

    fn cong_avoid(&self, tp: &mut TcpSock, _ack: u32, acked: u32) {
        if !tp.is_cwnd_limited {
            return;
        }

        let mut acked = acked;

        // In "safe" area, increase.
        if tp.in_slow_start() {
            acked = self.slow_start(tp, acked);
            if acked == 0 {
                return;
            }
        }

        // In dangerous area, increase slowly.
        self.cong_avoid_ai(tp, tp.snd_cwnd, acked);
    }

    fn current_ssthresh(&self, tp: &TcpSock) -> u32 {
        if tp.in_recovery_or_cwr() {
            tp.snd_ssthresh
        } else {
            tp.snd_ssthresh
                .max((tp.snd_cwnd >> 1).saturating_add(tp.snd_cwnd >> 2))
        }
    }
}

impl CongestionController for Reno {
    fn name(&self) -> &str {
        "RENO"
    }

    fn ssthresh(&mut self, tp: &TcpSock) -> u32 {
        (tp.snd_cwnd >> 1).max(2)
    }

    fn cong_avoid(&mut self, tp: &mut TcpSock, ack: u32, acked: u32) {
        let cwnd = tp.snd_cwnd;
        StandardIncrease::cong_avoid(self, tp, ack, acked);

        if tp.snd_cwnd > cwnd && !tp.in_slow_start() {
            self.stats.cwnd_increases = self.stats.cwnd_increases.saturating_add(1);
        }
        trace!(
            "{}. ack = {}, acked = {}, cwnd {} -> {}, ssthresh = {}",
            self.name(),
            ack,
            acked,
            cwnd,
            tp.snd_cwnd,
            tp.snd_ssthresh
        );
    }

    fn undo_cwnd(&self, tp: &TcpSock) -> u32 {
        tp.snd_cwnd.max(tp.prior_cwnd)
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reno_slow_start() {
        let reno = Reno::new();
        let mut tp = TcpSock::new(10, u32::MAX);
        tp.snd_ssthresh = 14;

        // Grows by the number of acked segments.
        assert_eq!(reno.slow_start(&mut tp, 2), 0);
        assert_eq!(tp.snd_cwnd, 12);

        // Never crosses ssthresh, the rest is returned.
        assert_eq!(reno.slow_start(&mut tp, 5), 3);
        assert_eq!(tp.snd_cwnd, 14);

        // Bounded by the clamp.
        let mut tp = TcpSock::new(10, 11);
        assert_eq!(reno.slow_start(&mut tp, 5), 0);
        assert_eq!(tp.snd_cwnd, 11);
    }

    #[test]
    fn reno_cong_avoid_ai() {
        let reno = Reno::new();
        let mut tp = TcpSock::new(10, u32::MAX);
        tp.snd_ssthresh = 10;

        // One segment per window of acked segments.
        for _ in 0..9 {
            StandardIncrease::cong_avoid(&reno, &mut tp, 0, 1);
            assert_eq!(tp.snd_cwnd, 10);
        }
        StandardIncrease::cong_avoid(&reno, &mut tp, 0, 1);
        assert_eq!(tp.snd_cwnd, 11);
        assert_eq!(tp.snd_cwnd_cnt, 0);

        // Stretch ACKs apply several segments at once.
        StandardIncrease::cong_avoid(&reno, &mut tp, 0, 23);
        assert_eq!(tp.snd_cwnd, 13);
        assert_eq!(tp.snd_cwnd_cnt, 1);
    }

    #[test]
    fn reno_cong_avoid_slow_start_spill() {
        let reno = Reno::new();
        let mut tp = TcpSock::new(8, u32::MAX);
        tp.snd_ssthresh = 10;

        // Two segments finish slow start, the other ten feed the AI counter.
        StandardIncrease::cong_avoid(&reno, &mut tp, 0, 12);
        assert_eq!(tp.snd_cwnd, 11);
        assert_eq!(tp.snd_cwnd_cnt, 0);
    }

    #[test]
    fn reno_not_cwnd_limited() {
        let mut reno = Reno::new();
        let mut tp = TcpSock::new(10, u32::MAX);
        tp.is_cwnd_limited = false;

        CongestionController::cong_avoid(&mut reno, &mut tp, 0, 5);
        assert_eq!(tp.snd_cwnd, 10);
    }

    #[test]
    fn reno_ssthresh_and_undo() {
        let mut reno = Reno::new();
        let mut tp = TcpSock::new(20, u32::MAX);
        assert_eq!(reno.ssthresh(&tp), 10);

        tp.snd_cwnd = 3;
        assert_eq!(reno.ssthresh(&tp), 2);

        tp.prior_cwnd = 20;
        assert_eq!(reno.undo_cwnd(&tp), 20);
    }

    #[test]
    fn reno_current_ssthresh() {
        let reno = Reno::new();
        let mut tp = TcpSock::new(20, u32::MAX);
        tp.snd_ssthresh = 10;

        // Three quarters of the window.
        assert_eq!(reno.current_ssthresh(&tp), 15);

        // Kept while the window is being reduced.
        tp.ca_state = crate::CaState::Recovery;
        assert_eq!(reno.current_ssthresh(&tp), 10);
    }
}
