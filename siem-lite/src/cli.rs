use std::{ffi::OsString, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use siem_lite_common::parse_timestamp;

use crate::configuration::Configuration;
use crate::filter::{FilterState, DEFAULT_PAGE_LIMIT};

pub struct CliApp {
    app: Command,
}

impl CliApp {
    pub fn new() -> Self {
        let app = Command::new("siem-lite")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Live security event dashboard for a SIEM-lite backend")
            .long_about("siem-lite merges periodic log snapshots with a live push stream into one bounded, de-duplicated, newest-first view, and derives alert metrics from it.")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (YAML, JSON or TOML)")
                    .global(true)
                    .value_parser(clap::value_parser!(PathBuf))
            )
            .arg(
                Arg::new("api-url")
                    .long("api-url")
                    .value_name("URL")
                    .help("Backend base URL")
                    .global(true)
            )
            .arg(
                Arg::new("stream-url")
                    .long("stream-url")
                    .value_name("URL")
                    .help("Websocket URL (derived from --api-url when omitted)")
                    .global(true)
            )
            .arg(
                Arg::new("capacity")
                    .long("capacity")
                    .value_name("N")
                    .help("Maximum number of buffered events")
                    .global(true)
            )
            .arg(
                Arg::new("snapshot-interval")
                    .long("snapshot-interval")
                    .value_name("SECONDS")
                    .help("Seconds between snapshot refreshes")
                    .global(true)
            )
            .arg(
                Arg::new("health-interval")
                    .long("health-interval")
                    .value_name("SECONDS")
                    .help("Seconds between health checks")
                    .global(true)
            )
            .arg(
                Arg::new("max-retries")
                    .long("max-retries")
                    .value_name("N")
                    .help("Stream reconnect attempts before giving up")
                    .global(true)
            )
            .arg(
                Arg::new("retry-delay-ms")
                    .long("retry-delay-ms")
                    .value_name("MILLIS")
                    .help("Delay between stream reconnect attempts")
                    .global(true)
            )
            .arg(
                Arg::new("no-backfill")
                    .long("no-backfill")
                    .help("Do not fetch a snapshot when the stream reconnects")
                    .global(true)
                    .action(ArgAction::SetTrue)
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Show event messages")
                    .global(true)
                    .action(ArgAction::SetTrue)
            )
            .arg(
                Arg::new("format")
                    .short('f')
                    .long("format")
                    .value_name("FORMAT")
                    .help("Output format")
                    .global(true)
                    .value_parser(["plain", "text", "json", "csv"])
            )
            .subcommand(
                Command::new("watch")
                    .about("Follow the live event stream")
                    .args(filter_args())
                    .arg(
                        Arg::new("duration")
                            .short('d')
                            .long("duration")
                            .value_name("SECONDS")
                            .help("Stop after this many seconds")
                            .long_help("Specify how long to watch. If not specified, runs until Ctrl+C is pressed.")
                            .value_parser(clap::value_parser!(u64))
                    )
                    .arg(
                        Arg::new("no-header")
                            .long("no-header")
                            .help("Suppress column headers in output")
                            .action(ArgAction::SetTrue)
                    )
            )
            .subcommand(
                Command::new("search")
                    .about("Search the backend's full log store")
                    .args(filter_args())
                    .arg(
                        Arg::new("page")
                            .long("page")
                            .value_name("N")
                            .help("1-based page number")
                            .value_parser(clap::value_parser!(u32).range(1..))
                            .default_value("1")
                    )
                    .arg(
                        Arg::new("limit")
                            .long("limit")
                            .value_name("N")
                            .help("Results per page")
                            .value_parser(clap::value_parser!(u32).range(1..))
                            .default_value("50")
                    )
            )
            .subcommand(
                Command::new("upload")
                    .about("Upload a log file (.csv, .json, .log, .txt)")
                    .arg(
                        Arg::new("file")
                            .value_name("FILE")
                            .required(true)
                            .value_parser(clap::value_parser!(PathBuf))
                    )
            )
            .subcommand(Command::new("health").about("Check backend health"))
            .subcommand(
                Command::new("export")
                    .about("Fetch the latest events and write them to a file")
                    .args(filter_args())
                    .arg(
                        Arg::new("output")
                            .short('o')
                            .long("output")
                            .value_name("FILE")
                            .help("Destination file (default: logs-export-YYYY-MM-DD.<ext>)")
                            .value_parser(clap::value_parser!(PathBuf))
                    )
            )
            .subcommand(
                Command::new("config")
                    .about("Manage configuration files")
                    .subcommand_required(true)
                    .subcommand(
                        Command::new("generate")
                            .about("Write a configuration file with every default")
                            .arg(
                                Arg::new("output")
                                    .short('o')
                                    .long("output")
                                    .value_name("FILE")
                                    .default_value("siem-lite.yaml")
                                    .value_parser(clap::value_parser!(PathBuf))
                            )
                    )
                    .subcommand(
                        Command::new("validate")
                            .about("Check a configuration file")
                            .arg(
                                Arg::new("file")
                                    .value_name("FILE")
                                    .required(true)
                                    .value_parser(clap::value_parser!(PathBuf))
                            )
                    )
            );

        Self { app }
    }

    pub fn get_matches(self) -> ArgMatches {
        self.app.get_matches()
    }

    pub fn try_get_matches_from<I, T>(self, args: I) -> Result<ArgMatches, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.app.try_get_matches_from(args)
    }
}

impl Default for CliApp {
    fn default() -> Self {
        Self::new()
    }
}

fn filter_args() -> [Arg; 4] {
    [
        Arg::new("actor")
            .long("actor")
            .value_name("IP")
            .help("Only events from this actor address"),
        Arg::new("event-type")
            .long("event-type")
            .value_name("TYPE")
            .help("Only event types containing this text (case-insensitive)"),
        Arg::new("from")
            .long("from")
            .value_name("TIME")
            .help("Earliest timestamp (RFC 3339, epoch, or YYYY-MM-DD)"),
        Arg::new("to")
            .long("to")
            .value_name("TIME")
            .help("Latest timestamp (RFC 3339, epoch, or YYYY-MM-DD)"),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Watch {
        filter: FilterState,
        duration: Option<Duration>,
        no_header: bool,
    },
    Search {
        filter: FilterState,
        page: u32,
        limit: u32,
    },
    Upload {
        file: PathBuf,
    },
    Health,
    Export {
        filter: FilterState,
        output: Option<PathBuf>,
    },
    ConfigGenerate {
        output: PathBuf,
    },
    ConfigValidate {
        file: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub config_file: Option<PathBuf>,
    /// Global flags in the form `Configuration::builder().from_cli_args` reads.
    pub overrides: Vec<String>,
    pub command: CliCommand,
}

impl CliConfig {
    pub fn from_matches(matches: &ArgMatches) -> anyhow::Result<Self> {
        let config_file = matches.get_one::<PathBuf>("config").cloned();

        let mut overrides = Vec::new();
        for id in [
            "api-url",
            "stream-url",
            "capacity",
            "snapshot-interval",
            "health-interval",
            "max-retries",
            "retry-delay-ms",
            "format",
        ] {
            if let Some(value) = matches.get_one::<String>(id) {
                overrides.push(format!("--{}", id));
                overrides.push(value.clone());
            }
        }
        for id in ["no-backfill", "verbose"] {
            if matches.get_flag(id) {
                overrides.push(format!("--{}", id));
            }
        }

        let command = match matches.subcommand() {
            Some(("watch", sub)) => CliCommand::Watch {
                filter: filter_from_matches(sub)?,
                duration: sub.get_one::<u64>("duration").map(|&d| Duration::from_secs(d)),
                no_header: sub.get_flag("no-header"),
            },
            Some(("search", sub)) => CliCommand::Search {
                filter: filter_from_matches(sub)?,
                page: sub.get_one::<u32>("page").copied().unwrap_or(1),
                limit: sub
                    .get_one::<u32>("limit")
                    .copied()
                    .unwrap_or(DEFAULT_PAGE_LIMIT),
            },
            Some(("upload", sub)) => CliCommand::Upload {
                file: sub
                    .get_one::<PathBuf>("file")
                    .cloned()
                    .ok_or_else(|| anyhow!("upload requires a file"))?,
            },
            Some(("health", _)) => CliCommand::Health,
            Some(("export", sub)) => CliCommand::Export {
                filter: filter_from_matches(sub)?,
                output: sub.get_one::<PathBuf>("output").cloned(),
            },
            Some(("config", sub)) => match sub.subcommand() {
                Some(("generate", gen)) => CliCommand::ConfigGenerate {
                    output: gen
                        .get_one::<PathBuf>("output")
                        .cloned()
                        .unwrap_or_else(|| PathBuf::from("siem-lite.yaml")),
                },
                Some(("validate", val)) => CliCommand::ConfigValidate {
                    file: val
                        .get_one::<PathBuf>("file")
                        .cloned()
                        .ok_or_else(|| anyhow!("config validate requires a file"))?,
                },
                _ => return Err(anyhow!("Unknown config subcommand")),
            },
            _ => return Err(anyhow!("No command given")),
        };

        Ok(Self {
            config_file,
            overrides,
            command,
        })
    }

    /// Defaults, then the config file, then `SIEM_*` variables, then flags.
    pub fn configuration(&self) -> anyhow::Result<Configuration> {
        let mut builder = Configuration::builder();
        if let Some(path) = &self.config_file {
            builder = builder
                .from_config_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
        }

        let args: Vec<&str> = self.overrides.iter().map(String::as_str).collect();
        let config = builder.from_environment()?.from_cli_args(&args)?.build()?;
        Ok(config)
    }
}

fn filter_from_matches(matches: &ArgMatches) -> anyhow::Result<FilterState> {
    let mut filter = FilterState::default();
    if let Some(actor) = matches.get_one::<String>("actor") {
        filter = filter.with_actor(actor.clone());
    }
    if let Some(event_type) = matches.get_one::<String>("event-type") {
        filter = filter.with_event_type(event_type.clone());
    }

    let from = matches
        .get_one::<String>("from")
        .map(|raw| parse_bound(raw, false))
        .transpose()
        .context("invalid --from")?;
    let to = matches
        .get_one::<String>("to")
        .map(|raw| parse_bound(raw, true))
        .transpose()
        .context("invalid --to")?;

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(anyhow!("--from {} is after --to {}", from, to));
        }
    }

    Ok(filter.with_range(from, to))
}

/// A bare date covers the whole day: start of day for a lower bound, last
/// millisecond for an upper bound.
pub fn parse_bound(raw: &str, end_of_day: bool) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        } else {
            NaiveTime::from_hms_opt(0, 0, 0)
        }
        .ok_or_else(|| anyhow!("invalid time of day"))?;
        return Ok(date.and_time(time).and_utc());
    }

    Ok(parse_timestamp(raw)?)
}

pub fn print_banner() {
    println!("🔍 siem-lite v{}", env!("CARGO_PKG_VERSION"));
    println!("Live Security Event Dashboard");
    println!("=============================");
}

pub fn print_usage_examples() {
    println!("\nExamples:");
    println!("  # Follow live events from a local backend");
    println!("  siem-lite watch");
    println!();
    println!("  # Watch failed logins from one address for five minutes");
    println!("  siem-lite watch --actor 192.168.1.50 --event-type failed --duration 300");
    println!();
    println!("  # Search the full store, second page");
    println!("  siem-lite search --event-type malware --page 2");
    println!();
    println!("  # Export today's view as CSV");
    println!("  siem-lite export --format csv");
    println!();
    println!("  # Generate configuration file");
    println!("  siem-lite config generate --output my-config.yaml");
}
