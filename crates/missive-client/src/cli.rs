//! Command-line interface definition.

use clap::{Parser, ValueEnum};

use missive_protocol::WireMode;
use missive_server::{DEFAULT_HOST, DEFAULT_PORT};

/// missive - talk to people through a missive server
#[derive(Debug, Parser)]
#[command(name = "missive")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server host to connect to
    #[arg(default_value = DEFAULT_HOST, env = "MISSIVE_HOST")]
    pub host: String,

    /// Server port to connect to
    #[arg(default_value_t = DEFAULT_PORT, env = "MISSIVE_PORT")]
    pub port: u16,

    /// Wire encoding for this session
    #[arg(long, value_enum, default_value_t = Encoding::Structured)]
    pub encoding: Encoding,

    /// Connection timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: u64,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,
}

/// Wire encodings the client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    /// Self-describing JSON frames
    Structured,
    /// Binary frames with a checksum trailer
    Compact,
}

impl From<Encoding> for WireMode {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Structured => WireMode::Structured,
            Encoding::Compact => WireMode::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_server() {
        let cli = Cli::parse_from(["missive"]);
        assert_eq!(cli.host, DEFAULT_HOST);
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.encoding, Encoding::Structured);
    }

    #[test]
    fn positional_host_and_port() {
        let cli = Cli::parse_from(["missive", "example.org", "9000", "--encoding", "compact"]);
        assert_eq!(cli.host, "example.org");
        assert_eq!(cli.port, 9000);
        assert_eq!(WireMode::from(cli.encoding), WireMode::Compact);
    }
}
