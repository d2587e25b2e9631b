use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "textlabel", about = "Keyboard-driven text annotation server")]
pub struct Cli {
    #[arg(long, global = true, default_value = "textlabel.toml")]
    pub config: PathBuf,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the annotation server.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print annotation progress.
    Stats {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate the item source and label schema.
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_accepts_bind_override() {
        let cli = Cli::try_parse_from(["textlabel", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("textlabel.toml"));
        match cli.command {
            Command::Serve { bind } => assert_eq!(bind.as_deref(), Some("127.0.0.1:9000")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli =
            Cli::try_parse_from(["textlabel", "stats", "--json", "--verbose", "--config", "a.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("a.toml"));
        assert!(matches!(cli.command, Command::Stats { json: true }));
    }
}
