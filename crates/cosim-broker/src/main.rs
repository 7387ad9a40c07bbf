// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! cosim Broker
//!
//! Standalone TCP broker for federations whose federates run in separate
//! processes or on separate hosts. Federates connect with
//! `--broker_address=<host>:<port>` in their core init string.
//!
//! # Usage
//!
//! ```bash
//! # Broker on the default port (24160) waiting for 2 federates
//! cosim-broker --federates 2
//!
//! # Custom port and config
//! cosim-broker --port 24170 --config broker.json
//!
//! # Report the time status every 5 seconds
//! cosim-broker --federates 3 --status-interval 5
//! ```

use clap::Parser;
use cosim::{Broker, BrokerQuery, CoreType, Library, LogLevel};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

pub use config::BrokerServerConfig;

const TERMINATION_POLL: Duration = Duration::from_millis(200);

/// cosim Broker - time and data coordination for distributed federations
#[derive(Parser, Debug)]
#[command(name = "cosim-broker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface address to listen on
    #[arg(short, long)]
    interface: Option<String>,

    /// Federates expected before execution starts
    #[arg(short, long)]
    federates: Option<usize>,

    /// Broker name
    #[arg(short, long)]
    name: Option<String>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (none, error, warning, summary, connections, interfaces, timing, data, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Seconds between time-status reports (0 disables)
    #[arg(long)]
    status_interval: Option<u64>,
}

impl Args {
    /// File (or default) configuration with command-line overrides applied.
    fn into_config(self) -> Result<BrokerServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => BrokerServerConfig::from_file(path)?,
            None => BrokerServerConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interface) = self.interface {
            config.interface = interface.parse()?;
        }
        if let Some(federates) = self.federates {
            config.federates = federates;
        }
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(secs) = self.status_interval {
            config.status_interval_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

/// `RUST_LOG` wins; otherwise the broker level picks the filter.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = level
            .as_log_level()
            .map_or("off".to_string(), |l| l.as_str().to_ascii_lowercase());
        EnvFilter::new(directive)
    })
}

/// Resolves once the broker has terminated.
async fn terminated(broker: Broker) {
    let mut poll = tokio::time::interval(TERMINATION_POLL);
    while broker.is_connected() {
        poll.tick().await;
    }
}

/// Logs the time-status query every `period`; never resolves.
async fn report_status(broker: Broker, period: Option<Duration>) {
    let Some(period) = period else {
        return std::future::pending().await;
    };
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let b = broker.clone();
        match tokio::task::spawn_blocking(move || b.query(BrokerQuery::TimeStatus)).await {
            Ok(Ok(status)) => info!(target: "cosim_broker::status", "{}", status.to_json()),
            Ok(Err(e)) => warn!("time status query failed: {}", e),
            Err(e) => warn!("time status task failed: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;
    let level = config.level()?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| e as Box<dyn std::error::Error>)?;

    info!("+----------------------------------------------------+");
    info!(
        "|       cosim Broker v{}                          |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Name:      {:38} |", config.name);
    info!(
        "|  Listen:    {:38} |",
        format!("{}:{}", config.interface, config.port)
    );
    info!("|  Federates: {:38} |", config.federates);
    info!("|  Brokers:   {:38} |", config.min_brokers);
    info!("|  Log level: {:38} |", level);
    info!("+----------------------------------------------------+");

    let library = Library::open();
    let broker = library.create_broker(CoreType::Tcp, &config.name, &config.init_string())?;
    if let Some(address) = broker.address() {
        info!("Broker '{}' accepting federates on {}", broker.name(), address);
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping broker...");
            broker.disconnect();
        }
        _ = terminated(broker.clone()) => {
            info!("Federation terminated");
        }
        _ = report_status(broker.clone(), config.status_interval()) => {}
    }

    let stats = broker.stats();
    info!(
        "Federates joined {}, left {}, values delivered {}, messages routed {}",
        stats.federates_joined, stats.federates_left, stats.values_delivered, stats.messages_routed
    );
    library.close();

    info!("Broker stopped");
    Ok(())
}
