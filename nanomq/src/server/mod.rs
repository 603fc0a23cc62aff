// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `ServerContext` is the main entry point of the broker.
//!
//! It owns the pid file, handles kernel signals and manages the lifetime
//! of the listener, dispatcher and bridge tasks.

use std::fs;
use std::path::Path;
use tokio::runtime::Runtime;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::config::Config;
use crate::error::{Error, ErrorKind};

mod init;
pub mod run;

pub const CHANNEL_CAPACITY: usize = 16;

/// Pid file location, fixed for all instances.
pub const PID_FILE: &str = "/tmp/nanomq/nanomq.pid";

/// Seconds to wait for SIGTERM to take effect before escalating to
/// SIGKILL on restart.
const STOP_WAIT_SECS: u32 = 10;

#[allow(clippy::module_name_repetitions)]
pub struct ServerContext {
    config: Config,
}

impl ServerContext {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Read the pid recorded in the pid file, if any.
    fn read_pid() -> Option<i32> {
        let pid_str = fs::read_to_string(PID_FILE).ok()?;
        pid_str.trim().parse::<i32>().ok()
    }

    #[cfg(unix)]
    fn pid_alive(pid: i32) -> bool {
        // Signal 0 performs the permission checks without delivering
        // anything.
        unsafe { nc::kill(pid, 0).is_ok() }
    }

    #[cfg(not(unix))]
    fn pid_alive(_pid: i32) -> bool {
        false
    }

    #[cfg(unix)]
    fn kill(pid: i32, sig: i32) -> Result<(), Error> {
        unsafe {
            nc::kill(pid, sig).map_err(|errno| {
                Error::from_string(
                    ErrorKind::PidError,
                    format!("Failed to signal process {pid}, got {errno}"),
                )
            })
        }
    }

    #[cfg(not(unix))]
    fn kill(_pid: i32, _sig: i32) -> Result<(), Error> {
        Err(Error::new(
            ErrorKind::PidError,
            "Signals are not supported on this platform",
        ))
    }

    /// Refuse to start when the pid file names a live process.
    fn check_not_running() -> Result<(), Error> {
        if let Some(pid) = Self::read_pid() {
            if Self::pid_alive(pid) {
                return Err(Error::from_string(
                    ErrorKind::PidError,
                    format!("Broker already running with pid {pid}"),
                ));
            }
            log::info!("server: Removing stale pid file of dead process {pid}");
            let _ret = fs::remove_file(PID_FILE);
        }
        Ok(())
    }

    fn write_pid() -> Result<(), Error> {
        if let Some(parent) = Path::new(PID_FILE).parent() {
            fs::create_dir_all(parent)?;
        }
        let pid = std::process::id();
        fs::write(PID_FILE, format!("{pid}")).map_err(|err| {
            Error::from_string(
                ErrorKind::IoError,
                format!("Failed to write pid to {PID_FILE}, got: {err:?}"),
            )
        })
    }

    /// Send SIGTERM to the running instance.
    ///
    /// # Errors
    ///
    /// Returns error if no instance is running or the signal fails.
    pub fn send_stop_signal() -> Result<(), Error> {
        let pid = Self::read_pid().ok_or_else(|| {
            Error::from_string(
                ErrorKind::PidError,
                format!("No pid file at {PID_FILE}, is the broker running?"),
            )
        })?;
        #[cfg(unix)]
        Self::kill(pid, nc::SIGTERM)?;
        #[cfg(not(unix))]
        Self::kill(pid, 0)?;
        log::info!("server: Sent SIGTERM to {pid}");
        Ok(())
    }

    /// Stop the running instance and wait until it is gone, escalating to
    /// SIGKILL if SIGTERM does not take effect.
    ///
    /// # Errors
    ///
    /// Returns error if no instance is running or signalling fails.
    pub fn stop_and_wait() -> Result<(), Error> {
        let pid = Self::read_pid().ok_or_else(|| {
            Error::from_string(
                ErrorKind::PidError,
                format!("No pid file at {PID_FILE}, is the broker running?"),
            )
        })?;
        #[cfg(unix)]
        {
            Self::kill(pid, nc::SIGTERM)?;
            for _ in 0..(STOP_WAIT_SECS * 10) {
                if !Self::pid_alive(pid) {
                    let _ret = fs::remove_file(PID_FILE);
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            log::warn!("server: Process {pid} ignored SIGTERM, sending SIGKILL");
            Self::kill(pid, nc::SIGKILL)?;
            let _ret = fs::remove_file(PID_FILE);
            Ok(())
        }
        #[cfg(not(unix))]
        Self::kill(pid, 0)
    }

    /// Init modules and run the tokio runtime until a stop signal arrives.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Server config is invalid
    /// - Another instance is already running
    /// - Failed to bind listeners
    pub fn run_loop(&mut self) -> Result<(), Error> {
        self.config.validate()?;
        Self::check_not_running()?;
        Self::write_pid()?;

        let worker_threads = usize::from(
            self.config
                .num_taskq_thread()
                .min(self.config.max_taskq_thread()),
        );
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?;

        let result = self.block_on_broker(&runtime);
        let _ret = fs::remove_file(PID_FILE);
        result
    }

    fn block_on_broker(&mut self, runtime: &Runtime) -> Result<(), Error> {
        runtime.block_on(async {
            self.init_modules().await?;
            Self::run_signal_loop().await
        })
    }

    #[cfg(unix)]
    async fn run_signal_loop() -> Result<(), Error> {
        let mut sigterm_stream = signal(SignalKind::terminate())?;
        let mut sigquit_stream = signal(SignalKind::quit())?;
        let mut sigint_stream = signal(SignalKind::interrupt())?;

        tokio::select! {
            Some(()) = sigterm_stream.recv() => {
                log::info!("server: Quit with SIGTERM");
            }
            Some(()) = sigquit_stream.recv() => {
                log::info!("server: Quit with SIGQUIT");
            }
            Some(()) = sigint_stream.recv() => {
                log::info!("server: Quit with SIGINT");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn run_signal_loop() -> Result<(), Error> {
        tokio::signal::ctrl_c().await?;
        log::info!("server: Quit with ctrl-c");
        Ok(())
    }
}
