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

#![no_main]

use std::sync::Arc;

use lazy_static::lazy_static;
use libfuzzer_sys::fuzz_target;

use qvegas::AckSample;
use qvegas::CaEvent;
use qvegas::CaState;
use qvegas::CongestionController;
use qvegas::QVegas;
use qvegas::QVegasParams;
use qvegas::TcpSock;

lazy_static! {
    static ref PARAMS: Arc<QVegasParams> = Arc::new(QVegasParams::default());
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let clamp = (data[0] as u32).max(4);
    let mut tp = TcpSock::new((data[1] as u32).max(1), clamp);
    let mut cc = QVegas::new(PARAMS.clone());
    cc.init(&mut tp);

    for chunk in data[2..].chunks(4) {
        let op = chunk[0];
        let arg = chunk.get(1..).map_or(0, |b| {
            b.iter().fold(0u32, |acc, v| (acc << 8) | *v as u32)
        });

        match op % 8 {
            0 => cc.pkts_acked(
                &tp,
                &AckSample {
                    pkts_acked: 1,
                    rtt_us: arg as i64 - 1,
                },
            ),
            1 => {
                tp.snd_nxt = tp.snd_nxt.wrapping_add(arg & 0xff);
                let ack = tp.snd_nxt.wrapping_sub(arg >> 8 & 0xf);
                let decisions = cc.stats().epochs - cc.stats().low_confidence_epochs;

                cc.cong_avoid(&mut tp, ack, (arg >> 12 & 0xf) + 1);
                if cc.stats().epochs - cc.stats().low_confidence_epochs > decisions {
                    assert!(tp.snd_cwnd >= 4 && tp.snd_cwnd <= clamp);
                }
            }
            2 => {
                let state = match arg % 5 {
                    0 => CaState::Open,
                    1 => CaState::Disorder,
                    2 => CaState::Cwr,
                    3 => CaState::Recovery,
                    _ => CaState::Loss,
                };
                cc.set_state(&mut tp, state);
                tp.ca_state = state;
                if state == CaState::Open {
                    assert!(tp.snd_cwnd >= 4 && tp.snd_cwnd <= clamp);
                }
            }
            3 => {
                let event = match arg % 6 {
                    0 => CaEvent::TxStart,
                    1 => CaEvent::CwndRestart,
                    2 => CaEvent::CompleteCwr,
                    3 => CaEvent::Loss,
                    4 => CaEvent::EcnNoCe,
                    _ => CaEvent::EcnIsCe,
                };
                cc.cwnd_event(&mut tp, event);
            }
            4 => {
                tp.snd_ssthresh = cc.ssthresh(&tp);
                tp.snd_cwnd = tp.snd_ssthresh;
            }
            5 => tp.snd_cwnd = cc.undo_cwnd(&tp).min(clamp),
            6 => tp.lost_out = arg & 0x3,
            _ => tp.is_cwnd_limited = arg & 1 == 0,
        }

        let sampler = cc.rtt_sampler();
        if sampler.sample_count() > 0 {
            assert!(sampler.base_rtt() <= sampler.min_rtt());
        }
    }
});
