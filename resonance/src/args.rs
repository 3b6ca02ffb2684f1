use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Resonance audio ML backend
#[derive(Debug, Parser)]
#[command(name = "resonance", about = "Audio analysis ML backend for annotation platforms")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "resonance.toml", env = "RESONANCE_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "RESONANCE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directives
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "RESONANCE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["resonance"]).unwrap();
        assert_eq!(args.config, PathBuf::from("resonance.toml"));
        assert_eq!(args.listen, None);
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn overrides() {
        let args = Args::try_parse_from([
            "resonance",
            "-c",
            "/etc/resonance.toml",
            "--listen",
            "127.0.0.1:9191",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/resonance.toml"));
        assert_eq!(args.listen, Some(SocketAddr::from(([127, 0, 0, 1], 9191))));
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
