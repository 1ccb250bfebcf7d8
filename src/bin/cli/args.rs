use clap::Parser;

#[derive(Parser)]
#[command(name = "stomp-session")]
#[command(version)]
#[command(about = "Interactive client for a failover-aware STOMP session")]
pub struct Cli {
    /// Broker URI or failover list, e.g. failover://(tcp://mq1:61613,tcp://mq2:61613)
    #[arg(short, long, default_value = "tcp://127.0.0.1:61613")]
    pub url: String,

    /// Login username
    #[arg(short, long, default_value = "guest")]
    pub login: String,

    /// Passcode
    #[arg(short, long, default_value = "guest")]
    pub passcode: String,

    /// Extra CONNECT header as key=value (can be specified multiple times)
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Queues to subscribe to (can be specified multiple times)
    #[arg(short, long)]
    pub subscribe: Vec<String>,

    /// Wrap every send in its own transaction instead of waiting for a receipt
    #[arg(long)]
    pub transactional: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log: String,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_argument_splits_on_first_equals() {
        assert_eq!(
            parse_header("selector=a=b").unwrap(),
            ("selector".to_string(), "a=b".to_string())
        );
        assert!(parse_header("novalue").is_err());
        assert!(parse_header("=x").is_err());
    }

    #[test]
    fn repeated_flags_accumulate() {
        let cli = Cli::parse_from([
            "stomp-session",
            "--header",
            "client-id=w1",
            "--header",
            "host=vhost",
            "-s",
            "/queue/a",
            "-s",
            "/queue/b",
            "--transactional",
        ]);
        assert_eq!(cli.headers.len(), 2);
        assert_eq!(cli.subscribe, vec!["/queue/a", "/queue/b"]);
        assert!(cli.transactional);
        assert_eq!(cli.url, "tcp://127.0.0.1:61613");
    }
}
