//! Command-line configuration for the groundctl binary

use crate::link::{FcConnectionType, MavlinkConfig, SimConfig};
use crate::session::{SamplerConfig, SessionSettings};
use anyhow::{anyhow, bail, Context, Result};
use groundctl_shared::limits;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which vehicle driver to use
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkConfig {
    /// In-process simulated vehicle
    #[default]
    Simulated,
    /// ArduPilot flight controller over MAVLink
    Mavlink(FcConnectionType),
}

impl FromStr for LinkConfig {
    type Err = anyhow::Error;

    /// `sim`, `udp:<addr>`, `tcp:<addr>` or `serial:<port>:<baud>`
    fn from_str(raw: &str) -> Result<Self> {
        if raw == "sim" {
            return Ok(LinkConfig::Simulated);
        }

        let (kind, rest) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("unknown link '{raw}', expected sim, udp:, tcp: or serial:"))?;

        let connection = match kind {
            "udp" => FcConnectionType::Udp {
                address: rest.to_string(),
            },
            "tcp" => FcConnectionType::Tcp {
                address: rest.to_string(),
            },
            "serial" => {
                let (port, baud) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| anyhow!("serial link needs serial:<port>:<baud>"))?;
                let baud = baud
                    .parse()
                    .with_context(|| format!("invalid baud rate '{baud}'"))?;
                FcConnectionType::Serial {
                    port: port.to_string(),
                    baud,
                }
            }
            other => bail!("unknown link type '{other}', expected sim, udp, tcp or serial"),
        };

        let missing = match &connection {
            FcConnectionType::Udp { address } | FcConnectionType::Tcp { address } => {
                address.is_empty()
            }
            FcConnectionType::Serial { port, .. } => port.is_empty(),
        };
        if missing {
            bail!("link '{raw}' is missing an address");
        }
        Ok(LinkConfig::Mavlink(connection))
    }
}

/// Everything the binary needs to run a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub link: LinkConfig,
    pub telemetry_file: PathBuf,
    pub sample_interval: Duration,
    /// Consecutive telemetry failures tolerated before shutdown
    pub sampler_retry_limit: u32,
    pub sim: SimConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            telemetry_file: PathBuf::from(limits::TELEMETRY_FILE),
            sample_interval: Duration::from_millis(limits::SAMPLE_INTERVAL_MS),
            sampler_retry_limit: 0,
            sim: SimConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            telemetry_file: self.telemetry_file.clone(),
            sampler: SamplerConfig {
                interval: self.sample_interval,
                retry_limit: self.sampler_retry_limit,
            },
        }
    }

    /// MAVLink settings, if a MAVLink link was selected
    pub fn mavlink(&self) -> Option<MavlinkConfig> {
        match &self.link {
            LinkConfig::Mavlink(connection) => Some(MavlinkConfig {
                connection: connection.clone(),
                ..Default::default()
            }),
            LinkConfig::Simulated => None,
        }
    }
}

/// What the binary was asked to do
#[derive(Debug, Clone)]
pub enum Command {
    Run(SessionConfig),
    ShowHelp,
    ShowVersion,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Command> {
        let mut config = SessionConfig::default();
        let mut iter = args.iter();

        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "-h" | "--help" => return Ok(Command::ShowHelp),
                "-V" | "--version" => return Ok(Command::ShowVersion),
                "--link" => {
                    config.link = take_value(flag, &mut iter)?.parse()?;
                }
                "--telemetry-file" => {
                    config.telemetry_file = PathBuf::from(take_value(flag, &mut iter)?);
                }
                "--sample-interval-ms" => {
                    let ms: u64 = parse_number(flag, &mut iter)?;
                    if ms == 0 {
                        bail!("sample-interval-ms must be greater than zero");
                    }
                    config.sample_interval = Duration::from_millis(ms);
                }
                "--sampler-retries" => {
                    config.sampler_retry_limit = parse_number(flag, &mut iter)?;
                }
                "--sim-latency-ms" => {
                    let ms: u64 = parse_number(flag, &mut iter)?;
                    config.sim.command_latency = Duration::from_millis(ms);
                }
                other => bail!("unknown flag '{other}', try --help"),
            }
        }

        Ok(Command::Run(config))
    }

    pub fn help() -> String {
        format!(
            concat!(
                "groundctl - Ground-control session for a single drone\n",
                "\n",
                "USAGE:\n",
                "  groundctl [--link <link>] [--telemetry-file <path>] [--sample-interval-ms <number>]\n",
                "            [--sampler-retries <number>] [--sim-latency-ms <number>]\n",
                "  groundctl --help\n",
                "  groundctl --version\n",
                "\n",
                "OPTIONS:\n",
                "  --link <link>                  sim | udp:<addr> | tcp:<addr> | serial:<port>:<baud> (default: sim)\n",
                "  --telemetry-file <path>        Telemetry log written at exit (default: {})\n",
                "  --sample-interval-ms <number>  Telemetry poll interval (default: {})\n",
                "  --sampler-retries <number>     Telemetry failures tolerated before shutdown (default: 0)\n",
                "  --sim-latency-ms <number>      Simulated command latency (default: 50)\n",
                "  -h, --help                     Show this help\n",
                "  -V, --version                  Show version\n",
            ),
            limits::TELEMETRY_FILE,
            limits::SAMPLE_INTERVAL_MS
        )
    }
}

fn take_value(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| anyhow!("expected a value after {flag}"))
}

fn parse_number<T>(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = take_value(flag, iter)?;
    raw.parse()
        .with_context(|| format!("{} must be a non-negative integer", flag.trim_start_matches('-')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_config(list: &[&str]) -> SessionConfig {
        match Command::parse(&args(list)).unwrap() {
            Command::Run(config) => config,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_with_no_args() {
        let config = run_config(&[]);
        assert_eq!(config.link, LinkConfig::Simulated);
        assert_eq!(config.telemetry_file, PathBuf::from("telemetry_log.csv"));
        assert_eq!(config.sample_interval, Duration::from_secs(1));
        assert_eq!(config.sampler_retry_limit, 0);
        assert!(config.mavlink().is_none());
    }

    #[test]
    fn test_parses_all_flags() {
        let config = run_config(&[
            "--link",
            "udp:0.0.0.0:14550",
            "--telemetry-file",
            "/tmp/flight.csv",
            "--sample-interval-ms",
            "250",
            "--sampler-retries",
            "3",
            "--sim-latency-ms",
            "5",
        ]);
        assert_eq!(
            config.link,
            LinkConfig::Mavlink(FcConnectionType::Udp {
                address: "0.0.0.0:14550".into()
            })
        );
        assert_eq!(config.telemetry_file, PathBuf::from("/tmp/flight.csv"));
        assert_eq!(config.sample_interval, Duration::from_millis(250));
        assert_eq!(config.sampler_retry_limit, 3);
        assert_eq!(config.sim.command_latency, Duration::from_millis(5));

        let settings = config.settings();
        assert_eq!(settings.sampler.retry_limit, 3);
        assert_eq!(
            config.mavlink().unwrap().connection.address(),
            "udpin:0.0.0.0:14550"
        );
    }

    #[test]
    fn test_link_forms() {
        assert_eq!(
            "serial:/dev/ttyACM0:57600".parse::<LinkConfig>().unwrap(),
            LinkConfig::Mavlink(FcConnectionType::Serial {
                port: "/dev/ttyACM0".into(),
                baud: 57600
            })
        );
        assert_eq!(
            "tcp:127.0.0.1:5760".parse::<LinkConfig>().unwrap(),
            LinkConfig::Mavlink(FcConnectionType::Tcp {
                address: "127.0.0.1:5760".into()
            })
        );
        assert!("serial:/dev/ttyACM0".parse::<LinkConfig>().is_err());
        assert!("udp:".parse::<LinkConfig>().is_err());
        assert!("bluetooth".parse::<LinkConfig>().is_err());
    }

    #[test]
    fn test_help_and_version() {
        assert!(matches!(
            Command::parse(&args(&["--help"])).unwrap(),
            Command::ShowHelp
        ));
        assert!(matches!(
            Command::parse(&args(&["-V"])).unwrap(),
            Command::ShowVersion
        ));
        assert!(Command::help().contains("--telemetry-file"));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Command::parse(&args(&["--fly"])).is_err());
        assert!(Command::parse(&args(&["--sample-interval-ms"])).is_err());
        assert!(Command::parse(&args(&["--sample-interval-ms", "0"])).is_err());
        assert!(Command::parse(&args(&["--sampler-retries", "-1"])).is_err());
    }
}
