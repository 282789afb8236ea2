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

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use log::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use qvegas::CongestionControlAlgorithm;
use qvegas::TcpSock;
use qvegas_tools::LinkConfig;
use qvegas_tools::Report;
use qvegas_tools::Result;
use qvegas_tools::Simulation;

#[derive(Parser, Debug, Clone)]
#[clap(name = "qvegas_sim")]
pub struct SimOpt {
    /// Congestion control algorithm.
    #[clap(long, default_value = "QVEGAS")]
    pub congestion_control_algor: CongestionControlAlgorithm,

    /// Bottleneck bandwidth in Mbit/s.
    #[clap(short, long, default_value = "10", value_name = "MBPS")]
    pub bandwidth: f64,

    /// Propagation round trip time in milliseconds.
    #[clap(short, long, default_value = "50", value_name = "TIME")]
    pub rtt: u64,

    /// Bottleneck buffer in segments.
    #[clap(long, default_value = "100", value_name = "NUM")]
    pub buffer: u64,

    /// Random loss rate, between 0 and 1.
    #[clap(long, default_value = "0", value_name = "RATE")]
    pub loss_rate: f64,

    /// Simulated duration in seconds.
    #[clap(short, long, default_value = "30", value_name = "TIME")]
    pub duration: u64,

    /// Stop sending at this time in milliseconds, for `--idle-duration`.
    #[clap(long, value_name = "TIME", requires = "idle_duration")]
    pub idle_at: Option<u64>,

    /// Length of the idle period in milliseconds.
    #[clap(long, value_name = "TIME", requires = "idle_at")]
    pub idle_duration: Option<u64>,

    /// Initial congestion window in segments.
    #[clap(long, default_value = "10", value_name = "NUM")]
    pub initial_congestion_window: u32,

    /// Upper bound of the congestion window in segments.
    #[clap(long, value_name = "NUM")]
    pub congestion_window_clamp: Option<u32>,

    /// QVegas lower bound of queued segments.
    #[clap(long, default_value = "2", value_name = "NUM")]
    pub alpha: u32,

    /// QVegas upper bound of queued segments.
    #[clap(long, default_value = "4", value_name = "NUM")]
    pub beta: u32,

    /// QVegas limit of queued segments in slow start.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub gamma: u32,

    /// Seed of the loss generator. A random seed is used if not specified.
    #[clap(long, value_name = "NUM")]
    pub seed: Option<u64>,

    /// Print the report as JSON.
    #[clap(long)]
    pub json: bool,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

fn parse_option() -> std::result::Result<SimOpt, clap::error::Error> {
    let option = SimOpt::parse();

    if option.bandwidth <= 0.0 {
        return Err(SimOpt::command().error(
            ErrorKind::InvalidValue,
            "Bandwidth should be larger than 0",
        ));
    }

    if !(0.0..=1.0).contains(&option.loss_rate) {
        return Err(SimOpt::command().error(
            ErrorKind::InvalidValue,
            "Loss rate should be between 0 and 1",
        ));
    }

    Ok(option)
}

fn process_option(option: &SimOpt) -> Result<()> {
    env_logger::builder()
        .target(qvegas_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    Ok(())
}

fn print_report(report: &Report) {
    println!(
        "{}: {:.1} Mbit/s, {} ms, buffer {}, loss {}, bdp {} segments",
        report.algorithm,
        report.link.bandwidth_mbps,
        report.link.prop_rtt_us / 1000,
        report.link.buffer,
        report.link.loss_rate,
        report.bdp
    );
    println!(
        "segments: sent {}, delivered {}, lost {}, recoveries {}",
        report.sent, report.delivered, report.lost, report.recoveries
    );
    println!("throughput: {:.2} Mbit/s", report.throughput_mbps);

    println!("cwnd(segments):");
    println!(
        "\tmin: {:.2}, max: {:.2}, mean: {:.2}, sd: {:.2}",
        report.cwnd.min, report.cwnd.max, report.cwnd.mean, report.cwnd.std_dev,
    );
    println!(
        "\tmedian: {:.2}, p90: {:.2}, p99: {:.2}",
        report.cwnd.median, report.cwnd.p90, report.cwnd.p99,
    );

    println!("rtt(ms):");
    println!(
        "\tmin: {:.2}, max: {:.2}, mean: {:.2}, sd: {:.2}",
        report.rtt.min, report.rtt.max, report.rtt.mean, report.rtt.std_dev,
    );
    println!(
        "\tmedian: {:.2}, p90: {:.2}, p99: {:.2}",
        report.rtt.median, report.rtt.p90, report.rtt.p99,
    );

    let stats = &report.stats;
    println!(
        "epochs: total {}, low confidence {}, increase {}, decrease {}, hold {}",
        stats.epochs,
        stats.low_confidence_epochs,
        stats.cwnd_increases,
        stats.cwnd_decreases,
        stats.cwnd_holds
    );
    println!(
        "slow start exits: {}, restarts: {}, rtt samples: {}",
        stats.slow_start_exits, stats.restarts, stats.rtt_samples
    );
}

fn main() -> Result<()> {
    // Parse simulation option.
    let option = match parse_option() {
        Ok(option) => option,
        Err(e) => e.exit(),
    };

    // Process simulation option.
    process_option(&option)?;

    let mut config = qvegas::Config::new();
    config.set_congestion_control_algorithm(option.congestion_control_algor);
    config.set_initial_congestion_window(option.initial_congestion_window);
    if let Some(clamp) = option.congestion_window_clamp {
        config.set_congestion_window_clamp(clamp);
    }
    config.set_qvegas_params(option.alpha, option.beta, option.gamma)?;

    let link = LinkConfig {
        bandwidth_mbps: option.bandwidth,
        prop_rtt_us: option.rtt.saturating_mul(1000),
        buffer: option.buffer,
        loss_rate: option.loss_rate,
        duration_us: option.duration.saturating_mul(1_000_000),
        idle: option
            .idle_at
            .zip(option.idle_duration)
            .map(|(at, len)| (at.saturating_mul(1000), len.saturating_mul(1000))),
    };
    let seed = option.seed.unwrap_or_else(rand::random);
    info!("simulate {:?}, seed {}", link, seed);

    let tp = TcpSock::new(
        config.initial_congestion_window(),
        config.congestion_window_clamp(),
    );
    let cc = qvegas::build_congestion_controller(&config);
    let report = Simulation::new(link, tp, cc, StdRng::seed_from_u64(seed)).run();

    if option.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}
