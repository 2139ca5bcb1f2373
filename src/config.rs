use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "stagingd",
    about = "Staging slot registry",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the registry HTTP server (default).
    Run,

    /// Provision one staging record in the store under --data-dir.
    Seed(SeedArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// Stable identity of the staging instance; unique by convention.
    #[arg(long, value_name = "HOST")]
    pub hostname: String,

    /// Display label for the instance.
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Network address of the instance.
    #[arg(long, value_name = "ADDR")]
    pub ip: String,

    #[arg(long, value_name = "USER", default_value = "nobody")]
    pub user: String,

    #[arg(long, value_name = "BRANCH", default_value = "main")]
    pub branch: String,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        value_name = "ADDR",
        default_value = "127.0.0.1:62431"
    )]
    pub bind: SocketAddr,

    #[arg(
        long,
        global = true,
        env = "STAGINGD_DATA_DIR",
        value_name = "PATH",
        default_value = "./data"
    )]
    pub data_dir: PathBuf,

    /// Shared secret compared against the `token` field of every request.
    #[arg(
        long,
        global = true,
        env = "STAGINGD_TOKEN",
        value_name = "TOKEN",
        default_value = ""
    )]
    pub token: String,
}

impl Config {
    /// The configured secret, or `None` when blank. The server refuses to
    /// start without one.
    pub fn shared_token(&self) -> Option<&str> {
        let token = self.token.trim();
        if token.is_empty() { None } else { Some(token) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_flags_absent() {
        let cli = Cli::try_parse_from(["stagingd"]).unwrap();
        assert_eq!(cli.config.bind.to_string(), "127.0.0.1:62431");
        assert_eq!(cli.config.data_dir, PathBuf::from("./data"));
        assert_eq!(cli.config.shared_token(), None);
    }

    #[test]
    fn blank_token_counts_as_absent() {
        let cli = Cli::try_parse_from(["stagingd", "--token", "   "]).unwrap();
        assert_eq!(cli.config.shared_token(), None);
    }

    #[test]
    fn token_flag_is_surfaced() {
        let cli = Cli::try_parse_from(["stagingd", "--token", "hunter2"]).unwrap();
        assert_eq!(cli.config.shared_token(), Some("hunter2"));
    }

    #[test]
    fn seed_requires_identity_fields() {
        let err = Cli::try_parse_from(["stagingd", "seed", "--hostname", "h1"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--name"));
        assert!(msg.contains("--ip"));
    }

    #[test]
    fn seed_defaults_user_and_branch() {
        let cli = Cli::try_parse_from([
            "stagingd", "seed", "--hostname", "h1", "--name", "env1", "--ip", "10.0.0.1",
        ])
        .unwrap();
        let Some(Command::Seed(args)) = cli.command else {
            panic!("expected seed subcommand");
        };
        assert_eq!(args.user, "nobody");
        assert_eq!(args.branch, "main");
    }
}
