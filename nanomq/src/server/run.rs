// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Entry point of the broker: command line parsing, config layering and
//! the `start`/`stop`/`restart` subcommands.

use clap::{Arg, ArgAction, ArgMatches};
use std::env;
use std::path::{Path, PathBuf};

use super::ServerContext;
use crate::config::Config;
use crate::error::Error;
use crate::log::init_log;

const CMD_START: &str = "start";
const CMD_STOP: &str = "stop";
const CMD_RESTART: &str = "restart";

const OPT_URL: &str = "url";
const OPT_CONF: &str = "conf";
const OPT_BRIDGE: &str = "bridge";
const OPT_AUTH: &str = "auth";
const OPT_DAEMON: &str = "daemon";
const OPT_TQ_THREAD: &str = "tq_thread";
const OPT_MAX_TQ_THREAD: &str = "max_tq_thread";
const OPT_PARALLEL: &str = "parallel";
const OPT_PROPERTY_SIZE: &str = "property_size";
const OPT_MSQ_LEN: &str = "msq_len";
const OPT_QOS_DURATION: &str = "qos_duration";
const OPT_HTTP: &str = "http";
const OPT_PORT: &str = "port";

const ENV_CONF_PATH: &str = "NANOMQ_CONF_PATH";
const ENV_BRIDGE_CONF_PATH: &str = "NANOMQ_BRIDGE_CONF_PATH";
const ENV_AUTH_CONF_PATH: &str = "NANOMQ_AUTH_CONF_PATH";

fn cli_command() -> clap::Command {
    let broker_args = [
        Arg::new(OPT_URL)
            .long(OPT_URL)
            .value_name("url")
            .global(true)
            .help("Listener url, e.g. broker+tcp://0.0.0.0:1883"),
        Arg::new(OPT_CONF)
            .long(OPT_CONF)
            .value_name("path")
            .global(true)
            .help("Read broker config from a file"),
        Arg::new(OPT_BRIDGE)
            .long(OPT_BRIDGE)
            .value_name("path")
            .global(true)
            .help("Read bridge config from a file"),
        Arg::new(OPT_AUTH)
            .long(OPT_AUTH)
            .value_name("path")
            .global(true)
            .help("Read username/password entries from a file"),
        Arg::new(OPT_DAEMON)
            .short('d')
            .long(OPT_DAEMON)
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Run as daemon, console logging disabled"),
        Arg::new(OPT_TQ_THREAD)
            .short('t')
            .long(OPT_TQ_THREAD)
            .value_name("num")
            .value_parser(clap::value_parser!(u8).range(1..))
            .global(true)
            .help("Number of taskq threads, 1..=255"),
        Arg::new(OPT_MAX_TQ_THREAD)
            .short('T')
            .long(OPT_MAX_TQ_THREAD)
            .value_name("num")
            .value_parser(clap::value_parser!(u8).range(1..))
            .global(true)
            .help("Maximum number of taskq threads, 1..=255"),
        Arg::new(OPT_PARALLEL)
            .short('n')
            .long(OPT_PARALLEL)
            .value_name("num")
            .value_parser(clap::value_parser!(u64))
            .global(true)
            .help("Number of parallel connections served per listener"),
        Arg::new(OPT_PROPERTY_SIZE)
            .short('s')
            .long(OPT_PROPERTY_SIZE)
            .value_name("bytes")
            .value_parser(clap::value_parser!(u64))
            .global(true)
            .help("Max size of MQTT 5.0 user properties"),
        Arg::new(OPT_MSQ_LEN)
            .short('S')
            .long(OPT_MSQ_LEN)
            .value_name("num")
            .value_parser(clap::value_parser!(u64))
            .global(true)
            .help("Per-connection outbound queue length"),
        Arg::new(OPT_QOS_DURATION)
            .short('D')
            .long(OPT_QOS_DURATION)
            .value_name("seconds")
            .value_parser(clap::value_parser!(u64))
            .global(true)
            .help("Interval of the qos retransmission timer"),
        Arg::new(OPT_HTTP)
            .long(OPT_HTTP)
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Enable the embedded http server"),
        Arg::new(OPT_PORT)
            .short('p')
            .long(OPT_PORT)
            .value_name("port")
            .value_parser(clap::value_parser!(u16))
            .global(true)
            .help("Override the port of the listener url"),
    ];

    clap::Command::new("nanomq")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lightweight MQTT broker for edge and IoT deployments")
        .subcommand(clap::Command::new(CMD_START).about("Start a broker instance"))
        .subcommand(clap::Command::new(CMD_STOP).about("Stop the running instance"))
        .subcommand(clap::Command::new(CMD_RESTART).about("Restart the broker instance"))
        .args(broker_args)
}

/// Build the effective config honoring the precedence
/// CLI > environment > config file > defaults.
fn build_config(matches: &ArgMatches) -> Result<Config, Error> {
    let mut config = Config::default();

    // Config file first, lowest layer above the defaults.
    let conf_path: Option<PathBuf> = matches
        .get_one::<String>(OPT_CONF)
        .map(PathBuf::from)
        .or_else(|| env::var(ENV_CONF_PATH).ok().map(PathBuf::from));
    if let Some(path) = &conf_path {
        config.load_file(path)?;
    }

    // Environment overrides the file.
    config.load_env()?;

    // Command line flags override everything.
    if let Some(url) = matches.get_one::<String>(OPT_URL) {
        config.set_url(url);
    }
    if matches.get_flag(OPT_DAEMON) {
        config.set_daemon(true);
    }
    if let Some(n) = matches.get_one::<u8>(OPT_TQ_THREAD) {
        config.set_num_taskq_thread(*n);
    }
    if let Some(n) = matches.get_one::<u8>(OPT_MAX_TQ_THREAD) {
        config.set_max_taskq_thread(*n);
    }
    if let Some(n) = matches.get_one::<u64>(OPT_PARALLEL) {
        config.set_parallel(usize::try_from(*n).unwrap_or(usize::MAX));
    }
    if let Some(n) = matches.get_one::<u64>(OPT_PROPERTY_SIZE) {
        config.set_property_size(usize::try_from(*n).unwrap_or(usize::MAX));
    }
    if let Some(n) = matches.get_one::<u64>(OPT_MSQ_LEN) {
        config.set_msq_len(usize::try_from(*n).unwrap_or(usize::MAX));
    }
    if let Some(n) = matches.get_one::<u64>(OPT_QOS_DURATION) {
        config.set_qos_duration(*n);
    }
    if matches.get_flag(OPT_HTTP) {
        config.set_http_server_enable(true);
    }
    if let Some(port) = matches.get_one::<u16>(OPT_PORT) {
        config.set_port(*port)?;
    }

    // Side config files.
    let bridge_path: Option<PathBuf> = matches
        .get_one::<String>(OPT_BRIDGE)
        .map(PathBuf::from)
        .or_else(|| env::var(ENV_BRIDGE_CONF_PATH).ok().map(PathBuf::from));
    if let Some(path) = &bridge_path {
        config.load_bridge_file(path)?;
    }

    let auth_path: Option<PathBuf> = matches
        .get_one::<String>(OPT_AUTH)
        .map(PathBuf::from)
        .or_else(|| env::var(ENV_AUTH_CONF_PATH).ok().map(PathBuf::from));
    if let Some(path) = &auth_path {
        config.set_auth_file(Path::new(path));
    }

    Ok(config)
}

/// Entry point of the broker binary.
///
/// # Errors
///
/// Returns error on invalid config, an already running instance, or a
/// failed bind; the process exits non-zero in each case.
pub fn run_server() -> Result<(), Error> {
    let matches = cli_command().get_matches();
    let config = build_config(&matches)?;

    match matches.subcommand_name() {
        Some(CMD_STOP) => {
            return ServerContext::send_stop_signal();
        }
        Some(CMD_RESTART) => {
            if let Err(err) = ServerContext::stop_and_wait() {
                log::warn!("server: Stop before restart failed: {err}");
            }
        }
        _ => (),
    }

    if let Err(err) = config.validate() {
        eprintln!("Invalid config: {err}");
        return Err(err);
    }
    init_log(config.log(), config.daemon())?;

    let mut server = ServerContext::new(config);
    server.run_loop()
}

/// Run the broker with a prepared config. Useful for integration tests.
///
/// # Errors
///
/// Returns error if the broker fails to initialize.
pub fn run_server_with_config(config: Config) -> Result<(), Error> {
    config.validate()?;
    let mut server = ServerContext::new(config);
    server.run_loop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_precedence() {
        let matches = cli_command()
            .try_get_matches_from(["nanomq", "start", "--url", "broker+tcp://127.0.0.1:2000"])
            .unwrap();
        env::set_var("NANOMQ_PARALLEL", "7");
        let config = build_config(&matches).unwrap();
        env::remove_var("NANOMQ_PARALLEL");

        assert_eq!(config.url(), "broker+tcp://127.0.0.1:2000");
        assert_eq!(config.parallel(), 7);
    }

    #[test]
    fn test_cli_flags() {
        let matches = cli_command()
            .try_get_matches_from([
                "nanomq", "start", "-t", "2", "-T", "4", "-S", "128", "-D", "5", "-p", "1999",
            ])
            .unwrap();
        let config = build_config(&matches).unwrap();
        assert_eq!(config.num_taskq_thread(), 2);
        assert_eq!(config.max_taskq_thread(), 4);
        assert_eq!(config.msq_len(), 128);
        assert_eq!(config.qos_duration(), 5);
        assert_eq!(config.url(), "broker+tcp://0.0.0.0:1999");
    }

    #[test]
    fn test_invalid_thread_count_rejected() {
        let result = cli_command().try_get_matches_from(["nanomq", "start", "-t", "0"]);
        assert!(result.is_err());
    }
}
