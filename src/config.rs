use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUEUE_DIR: &str = "/tmp/claude-approvals";
pub const DEFAULT_PORT: u16 = 19836;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory shared with the hook. Set via APPROVAL_QUEUE_DIR.
    pub queue_dir: PathBuf,
    /// Bind address. Set via APPROVAL_HOST. Default: 127.0.0.1, since
    /// nothing authenticates the approver.
    pub host: IpAddr,
    pub port: u16,
    /// How often the background job prunes requests from dead hooks.
    /// Set via APPROVAL_SWEEP_INTERVAL_SECS. 0 = disabled.
    pub sweep_interval: Option<Duration>,
    pub log_format: LogFormat,
}

pub fn load() -> Config {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from an arbitrary variable source. Unusable values fall
/// back to their defaults so that CLI flags can still override them.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
    let default_host = IpAddr::from([127, 0, 0, 1]);
    let host = match lookup("APPROVAL_HOST") {
        Some(raw) => raw.trim().parse::<IpAddr>().unwrap_or_else(|_| {
            eprintln!("⚠️  APPROVAL_HOST '{raw}' is not an IP address, using {default_host}.");
            default_host
        }),
        None => default_host,
    };

    let sweep_secs = lookup("APPROVAL_SWEEP_INTERVAL_SECS")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    Config {
        queue_dir: lookup("APPROVAL_QUEUE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_QUEUE_DIR)),
        host,
        port: lookup("APPROVAL_PORT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT),
        sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        log_format: match lookup("APPROVAL_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.queue_dir, PathBuf::from(DEFAULT_QUEUE_DIR));
        assert_eq!(cfg.host, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.sweep_interval, Some(Duration::from_secs(30)));
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let cfg = config(&[
            ("APPROVAL_QUEUE_DIR", "/var/run/approvals"),
            ("APPROVAL_HOST", "0.0.0.0"),
            ("APPROVAL_PORT", "not-a-port"),
            ("APPROVAL_SWEEP_INTERVAL_SECS", "0"),
            ("APPROVAL_LOG_FORMAT", "json"),
        ]);
        assert_eq!(cfg.queue_dir, PathBuf::from("/var/run/approvals"));
        assert_eq!(cfg.host, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.sweep_interval, None);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn test_bad_host_falls_back_to_loopback() {
        let cfg = config(&[("APPROVAL_HOST", "bogus")]);
        assert_eq!(cfg.host, IpAddr::from([127, 0, 0, 1]));
    }
}
