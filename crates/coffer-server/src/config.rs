//! Server configuration parsing.
//!
//! Handles conversion from CLI-friendly strings ("5s", "250ms",
//! "analytics=10.0.0.5:7070") into the types the node boots with.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Command-line options for a coffer node.
#[derive(Debug, Parser)]
#[command(name = "coffer-server", about = "A distributed JSON document store node")]
pub struct ServerOptions {
    /// Stable node name, unique within the local cluster.
    #[arg(long)]
    pub node_name: String,

    /// Address other nodes reach this one at.
    #[arg(long, default_value = "127.0.0.1:7070")]
    pub bind: SocketAddr,

    /// Name of the cluster this node belongs to.
    #[arg(long, default_value = "main")]
    pub cluster: String,

    /// Remote ensemble clusters as `name=host:port` seed pairs. Repeatable.
    #[arg(long = "ensemble-seed", value_parser = parse_seed_pair)]
    pub ensemble_seeds: Vec<(String, String)>,

    /// Interval between discovery probes of remote clusters.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub discovery_interval: Duration,

    /// Deadline for one command exchange with a remote node.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub reply_timeout: Duration,

    /// Concurrent command executions allowed on the local node.
    #[arg(long, default_value_t = 64)]
    pub worker_permits: usize,
}

/// Parses a human-readable duration: a number with an `ms`, `s` or `m`
/// suffix. Plain numbers are milliseconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".into());
    }

    let (digits, unit): (&str, fn(u64) -> Duration) = if let Some(n) = input.strip_suffix("ms") {
        (n, Duration::from_millis)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, Duration::from_secs)
    } else if let Some(n) = input.strip_suffix('m') {
        (n, |v| Duration::from_secs(v * 60))
    } else {
        (input, Duration::from_millis)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: '{input}'"))?;
    Ok(unit(value))
}

/// Parses one `cluster=host:port` ensemble seed.
pub fn parse_seed_pair(input: &str) -> Result<(String, String), String> {
    let (cluster, seed) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid seed '{input}': expected cluster=host:port"))?;
    if cluster.is_empty() {
        return Err(format!("invalid seed '{input}': empty cluster name"));
    }
    let (host, port) = seed
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid seed '{input}': expected cluster=host:port"))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(format!("invalid seed '{input}': bad host or port"));
    }
    Ok((cluster.to_string(), seed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_suffixes() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("100").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn bad_durations_are_rejected() {
        for bad in ["", "fast", "5h", "-3s"] {
            assert!(parse_duration(bad).is_err(), "input: {bad}");
        }
    }

    #[test]
    fn seed_pairs() {
        assert_eq!(
            parse_seed_pair("analytics=10.0.0.5:7070").unwrap(),
            ("analytics".to_string(), "10.0.0.5:7070".to_string())
        );
    }

    #[test]
    fn bad_seed_pairs_are_rejected() {
        for bad in ["analytics", "=h:1", "c=nohostport", "c=h:notaport", "c=:7070"] {
            assert!(parse_seed_pair(bad).is_err(), "input: {bad}");
        }
    }

    #[test]
    fn options_parse_from_args() {
        let options = ServerOptions::parse_from([
            "coffer-server",
            "--node-name",
            "n1",
            "--cluster",
            "main",
            "--ensemble-seed",
            "analytics=10.0.0.5:7070",
            "--discovery-interval",
            "2s",
        ]);
        assert_eq!(options.node_name, "n1");
        assert_eq!(options.discovery_interval, Duration::from_secs(2));
        assert_eq!(options.ensemble_seeds.len(), 1);
    }
}
