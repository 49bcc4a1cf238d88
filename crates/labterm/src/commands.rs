use clap::Parser;
use clap::Subcommand;
use clap_complete::Shell;

#[derive(Parser)]
#[command(
    name = "labterm",
    version,
    about = "Launch remote training scenarios and drive them from a live terminal"
)]
pub struct Cli {
    /// Backend base URL, e.g. http://localhost:5000
    #[arg(long, global = true, env = "LABTERM_BASE_URL")]
    pub base_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a scenario and attach an interactive terminal to it
    Start {
        /// Scenario repository name
        repo: String,
    },
    /// Extend a running session's deadline by the backend's grant
    Extend {
        /// Session id returned at provisioning time
        session_id: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
