use anyhow::bail;
use clap::Parser;
use docpool::PoolConfig;
use std::{path::PathBuf, time::Duration};

/// Upper bound accepted for any `*_TIMEOUT_SECS` option (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Runtime configuration for the `docpool-server` binary.
///
/// These settings control the size of the worker pool, the depth of the job
/// queue and the time limits applied at each stage of a job. All values are
/// parsed from CLI arguments or environment variables (a `.env` file is loaded
/// first), with defaults suitable for a single host.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "docpool-server",
    version,
    about = "An HTTP service that renders documents on a bounded worker pool"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Number of worker tasks rendering documents concurrently.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = num_cpus::get())]
    pub num_workers: usize,

    /// Maximum number of jobs waiting for a worker.
    ///
    /// Once full, submissions wait up to `SUBMIT_TIMEOUT_SECS` and are then
    /// answered with `429 Too Many Requests`.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = docpool::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Seconds a submission may wait for queue space.
    ///
    /// Environment variable: `SUBMIT_TIMEOUT_SECS`
    #[arg(long, env = "SUBMIT_TIMEOUT_SECS", default_value_t = 30)]
    pub submit_timeout_secs: u64,

    /// Seconds a single render may run before it is cancelled.
    ///
    /// Environment variable: `RENDER_TIMEOUT_SECS`
    #[arg(long, env = "RENDER_TIMEOUT_SECS", default_value_t = 300)]
    pub render_timeout_secs: u64,

    /// Seconds a worker waits to deliver an outcome before dropping it.
    ///
    /// Environment variable: `RESULT_TIMEOUT_SECS`
    #[arg(long, env = "RESULT_TIMEOUT_SECS", default_value_t = 10)]
    pub result_timeout_secs: u64,

    /// Seconds a request's monitor waits for the job outcome.
    ///
    /// Should cover queueing plus `RENDER_TIMEOUT_SECS`.
    ///
    /// Environment variable: `MONITOR_TIMEOUT_SECS`
    #[arg(long, env = "MONITOR_TIMEOUT_SECS", default_value_t = 600)]
    pub monitor_timeout_secs: u64,

    /// Seconds to wait for in-flight renders during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,

    /// Directory rendered documents are written to. Created if missing.
    ///
    /// Environment variable: `OUTPUT_DIR`
    #[arg(long, env = "OUTPUT_DIR", default_value = "./documents")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub num_workers: usize,
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
    pub render_timeout: Duration,
    pub result_timeout: Duration,
    pub monitor_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub output_dir: PathBuf,
}

impl ServerConfig {
    /// Pool settings derived from this configuration. Dispatcher timeouts
    /// keep their library defaults.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.num_workers, self.queue_capacity)
            .with_submit_timeout(self.submit_timeout)
            .with_render_timeout(self.render_timeout)
            .with_result_timeout(self.result_timeout)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.queue_capacity == 0 {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }

        if args.render_timeout_secs == 0 {
            bail!("RENDER_TIMEOUT_SECS must be greater than 0");
        }

        for (name, secs) in [
            ("SUBMIT_TIMEOUT_SECS", args.submit_timeout_secs),
            ("RENDER_TIMEOUT_SECS", args.render_timeout_secs),
            ("RESULT_TIMEOUT_SECS", args.result_timeout_secs),
            ("MONITOR_TIMEOUT_SECS", args.monitor_timeout_secs),
            ("SHUTDOWN_TIMEOUT_SECS", args.shutdown_timeout_secs),
        ] {
            if secs > MAX_TIMEOUT_SECS {
                bail!("{name} ({secs}) exceeds the maximum of {MAX_TIMEOUT_SECS} seconds");
            }
        }

        if args.monitor_timeout_secs < args.render_timeout_secs {
            bail!(
                "MONITOR_TIMEOUT_SECS ({}) must be at least RENDER_TIMEOUT_SECS ({})",
                args.monitor_timeout_secs,
                args.render_timeout_secs
            );
        }

        Ok(Self {
            server_addr: args.server_addr,
            num_workers: args.num_workers,
            queue_capacity: args.queue_capacity,
            submit_timeout: Duration::from_secs(args.submit_timeout_secs),
            render_timeout: Duration::from_secs(args.render_timeout_secs),
            result_timeout: Duration::from_secs(args.result_timeout_secs),
            monitor_timeout: Duration::from_secs(args.monitor_timeout_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            output_dir: args.output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> CliArgs {
        let args = ["docpool-server"].iter().chain(extra);
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn builds_pool_config_from_args() {
        let args = parse(&[
            "--num-workers",
            "3",
            "--queue-capacity",
            "7",
            "--render-timeout-secs",
            "12",
            "--monitor-timeout-secs",
            "20",
        ]);
        let config = ServerConfig::try_from(args).unwrap();
        let pool = config.pool_config();

        assert_eq!(pool.num_workers, 3);
        assert_eq!(pool.queue_capacity, 7);
        assert_eq!(pool.render_timeout, Duration::from_secs(12));
        assert_eq!(pool.submit_timeout, Duration::from_secs(30));
        assert_eq!(pool.acquire_timeout, docpool::DEFAULT_ACQUIRE_TIMEOUT);
        assert_eq!(config.monitor_timeout, Duration::from_secs(20));
    }

    #[test]
    fn rejects_zero_workers() {
        let err = ServerConfig::try_from(parse(&["--num-workers", "0"])).unwrap_err();
        assert!(err.to_string().contains("NUM_WORKERS"));
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let err = ServerConfig::try_from(parse(&["--queue-capacity", "0"])).unwrap_err();
        assert!(err.to_string().contains("QUEUE_CAPACITY"));
    }

    #[test]
    fn rejects_unbounded_render_timeout() {
        let err = ServerConfig::try_from(parse(&[
            "--render-timeout-secs",
            &u64::MAX.to_string(),
            "--monitor-timeout-secs",
            &u64::MAX.to_string(),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RENDER_TIMEOUT_SECS"));
    }

    #[test]
    fn rejects_monitor_shorter_than_render() {
        let err = ServerConfig::try_from(parse(&[
            "--render-timeout-secs",
            "60",
            "--monitor-timeout-secs",
            "30",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MONITOR_TIMEOUT_SECS"));
    }
}
