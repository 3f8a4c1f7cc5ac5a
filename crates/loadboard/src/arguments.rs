use {
    clap::Parser,
    std::{net::SocketAddr, time::Duration},
    tracing::level_filters::LevelFilter,
    url::Url,
};

#[derive(Parser)]
pub struct Arguments {
    /// Filter directives for the tracing subscriber, env_logger syntax.
    #[clap(
        long,
        env,
        default_value = "warn,loadboard=debug,acceptance=debug,rate_confirmation=debug,storage=debug"
    )]
    pub log_filter: String,

    /// Logs at or above this level additionally go to stderr.
    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    /// Address the HTTP API binds to.
    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub bind_address: SocketAddr,

    /// Url of the Postgres database. When absent the service runs on an
    /// in-memory store and loses all state on restart; only suitable for
    /// local development.
    #[clap(long, env)]
    pub db_url: Option<Url>,

    /// Time to live of the advisory lock taken while an accept attempt is
    /// in flight.
    #[clap(long, env, default_value = "90s", value_parser = humantime::parse_duration)]
    pub lock_ttl: Duration,

    /// How long the assigned driver has to accept or reject a rate
    /// confirmation after dispatch signed it.
    #[clap(long, env, default_value = "30m", value_parser = humantime::parse_duration)]
    pub driver_decision_window: Duration,

    /// How often the sweeper checks for lapsed driver decision windows.
    #[clap(long, env, default_value = "60s", value_parser = humantime::parse_duration)]
    pub sweep_interval: Duration,
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            log_filter,
            log_stderr_threshold,
            bind_address,
            db_url,
            lock_ttl,
            driver_decision_window,
            sweep_interval,
        } = self;
        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold}")?;
        writeln!(f, "bind_address: {bind_address}")?;
        let db_url = db_url.as_ref().map(|_| "SECRET").unwrap_or("<in-memory>");
        writeln!(f, "db_url: {db_url}")?;
        writeln!(f, "lock_ttl: {lock_ttl:?}")?;
        writeln!(f, "driver_decision_window: {driver_decision_window:?}")?;
        writeln!(f, "sweep_interval: {sweep_interval:?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = Arguments::parse_from(["loadboard"]);
        assert_eq!(args.lock_ttl, Duration::from_secs(90));
        assert_eq!(args.driver_decision_window, Duration::from_secs(30 * 60));
        assert_eq!(args.sweep_interval, Duration::from_secs(60));
        assert!(args.db_url.is_none());
    }

    #[test]
    fn display_redacts_the_database_url() {
        let args = Arguments::parse_from([
            "loadboard",
            "--db-url",
            "postgresql://user:hunter2@db/loadboard",
        ]);
        let rendered = args.to_string();
        assert!(rendered.contains("db_url: SECRET"));
        assert!(!rendered.contains("hunter2"));
    }
}
