use std::path::PathBuf;

use clap::Parser;

/// Parley chat-completion gateway
#[derive(Debug, Parser)]
#[command(name = "parley", about = "Chat-completion gateway for role-play front-ends")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parley.toml", env = "PARLEY_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "PARLEY_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn listen_override_parses() {
        let args = Args::try_parse_from(["parley", "-c", "dev.toml", "--listen", "127.0.0.1:9000"]).unwrap();
        assert_eq!(args.config, PathBuf::from("dev.toml"));
        assert_eq!(args.listen, Some("127.0.0.1:9000".parse().unwrap()));
    }
}
