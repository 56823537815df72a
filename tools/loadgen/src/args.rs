// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::config::LoadConfig;
use clap::builder::ValueHint;
use clap_derive::{Parser, ValueEnum};
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format as ProviderFormat, Serialized, Yaml};
use porthos_common::ShutdownPolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shutdown {
    Drain,
    Abandon,
}

#[derive(Parser, Debug)]
pub struct Args {
    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. If not specified, defaults are used.\
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(long, help = "Name of the service (and its request queue)")]
    pub service: Option<String>,

    #[arg(short = 'n', long, help = "Total number of calls to make")]
    pub requests: Option<usize>,

    #[arg(short, long, help = "Number of calls kept outstanding at once")]
    pub concurrency: Option<usize>,

    #[arg(
        long,
        value_name = "duration",
        help = "How long each call waits for its reply, e.g. 500ms or 5s",
        value_parser = humantime::parse_duration
    )]
    pub call_timeout: Option<Duration>,

    #[arg(long, help = "Bound on concurrently running handlers on the server side")]
    pub max_in_flight: Option<usize>,

    #[arg(long, help = "Have the broker settle requests on delivery")]
    pub auto_ack: bool,

    #[arg(long, value_enum, help = "What closing the server does with in-flight handlers")]
    pub shutdown: Option<Shutdown>,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

impl Args {
    fn merge_config(&self, mut config: LoadConfig) -> LoadConfig {
        if let Some(service) = self.service.as_ref() {
            config.service = service.clone();
        }
        if let Some(requests) = self.requests {
            config.requests = requests;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = self.call_timeout {
            config.call_timeout = timeout;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.server.max_in_flight = Some(max_in_flight);
        }
        if self.auto_ack {
            config.server.auto_ack = true;
        }
        match self.shutdown {
            Some(Shutdown::Abandon) => config.server.shutdown = ShutdownPolicy::Abandon,
            Some(Shutdown::Drain) if config.server.shutdown == ShutdownPolicy::Abandon => {
                config.server.shutdown = ShutdownPolicy::default();
            }
            _ => {}
        }
        config
    }

    /// Load the configuration file if we have it, then apply the command line on top.
    pub fn load_config(&self) -> Result<LoadConfig, eyre::Report> {
        let config = match self.config_file.as_ref() {
            Some(config_path) => Figment::new()
                .merge(Serialized::defaults(LoadConfig::default()))
                .merge(Yaml::file(config_path))
                .extract::<LoadConfig>()
                .map_err(|e| {
                    eyre!(
                        "Failed to parse configuration from {:?}: {}",
                        config_path,
                        e
                    )
                })?,
            None => LoadConfig::default(),
        };
        let config = self.merge_config(config);
        if config.concurrency == 0 {
            return Err(eyre!("concurrency must be at least 1"));
        }
        Ok(config)
    }
}
