use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use pbstream::Timestamp;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "arget")]
#[command(about = "Query an Archiver Appliance, or check one of its archive files")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Appliance info URL, overrides the config file
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,

    /// Print more, twice for debug output
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show archive server information
    Info,

    /// Search for channels matching the given pattern(s)
    Search {
        /// Regular expressions
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Retrieve data for given channels
    Get {
        #[arg(required = true)]
        pvs: Vec<String>,

        /// Start of query window: "now", RFC 3339 or relative ("-1 h")
        #[arg(short, long, value_name = "TIME", allow_hyphen_values = true)]
        start: String,

        /// End of query window, defaults to now
        #[arg(short, long, value_name = "TIME", allow_hyphen_values = true)]
        end: Option<String>,

        /// Maximum number of samples to read per channel, 0 for all
        #[arg(short = 'n', long, value_name = "NUM")]
        count: Option<u64>,
    },

    /// Check the header and the last samples of an archive file
    Verify {
        file: PathBuf,

        /// Expected payload type code
        #[arg(long = "type", value_name = "CODE")]
        typ: Option<i32>,

        /// Expected PV name
        #[arg(long)]
        pv: Option<String>,

        /// Expected year
        #[arg(long)]
        year: Option<i32>,

        /// No sample may be newer than SEC[.NANO] into the year
        #[arg(long, value_name = "SEC[.NANO]")]
        upper: Option<Timestamp>,
    },
}

// Defaults, a config file only needs the keys it changes
pub const DEFAULT_CONFIG: &str = r#"
    url = "http://localhost:17665/mgmt/bpl/getApplianceInfo"
    info_ttl = 3600
    rx_buf_size = 10485760
    count = 10
"#;

#[derive(Deserialize, Debug)]
pub struct Config {
    pub url: String,

    /// Seconds the appliance info is trusted
    pub info_ttl: u64,

    /// Bytes of a reply held before decoding
    pub rx_buf_size: usize,

    pub count: u64,
}

impl Config {
    /// Layer `overlay` over the defaults
    pub fn parse(overlay: &str) -> Result<Config, toml::de::Error> {
        let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let overlay: toml::Table = toml::from_str(overlay)?;
        table.extend(overlay);

        toml::Value::Table(table).try_into()
    }

    pub fn info_ttl(&self) -> Duration {
        Duration::from_secs(self.info_ttl)
    }
}

#[cfg(test)]
mod test_config {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.count, 10);
        assert_eq!(config.info_ttl(), Duration::from_secs(3600));
        assert_eq!(config.rx_buf_size, 10 * 1024 * 1024);
    }

    #[test]
    fn overlay() {
        let config = Config::parse(
            r#"
            url = "http://archiver:17665/mgmt/bpl/getApplianceInfo"
            count = 0
        "#,
        )
        .unwrap();

        assert_eq!(config.url, "http://archiver:17665/mgmt/bpl/getApplianceInfo");
        assert_eq!(config.count, 0);
        assert_eq!(config.info_ttl, 3600);
    }

    #[test]
    fn bad_value() {
        assert!(Config::parse("count = \"many\"").is_err());
    }

    #[test]
    fn command_line() {
        let cli = Cli::try_parse_from([
            "arget", "-vv", "get", "PV:1", "PV:2", "-s", "-1 h", "-n", "5",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Get {
                pvs,
                start,
                end,
                count,
            } => {
                assert_eq!(pvs, vec!["PV:1", "PV:2"]);
                assert_eq!(start, "-1 h");
                assert_eq!(end, None);
                assert_eq!(count, Some(5));
            }
            _ => panic!("not get"),
        }

        let cli = Cli::try_parse_from(["arget", "verify", "a.pb", "--upper", "100.5"]).unwrap();
        match cli.command {
            Commands::Verify { upper, .. } => assert_eq!(upper, Some(Timestamp::new(100, 500_000_000))),
            _ => panic!("not verify"),
        }
    }
}
