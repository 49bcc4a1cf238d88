use std::error::Error;
use std::sync::Arc;

use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use labterm::commands::Cli;
use labterm::commands::Commands;
use labterm::interactive;
use labterm_client::ClientConfig;
use labterm_client::StartError;
use labterm_common::Colors;
use labterm_common::color_init;
use labterm_proto::ApiError;
use labterm_proto::ScenarioApi;

fn main() {
    if let Err(e) = run() {
        if let Some(api_error) = e.downcast_ref::<ApiError>() {
            eprintln!("{} {}", Colors::error("Error:"), api_error);
            eprintln!("{} {}", Colors::dim("Suggestion:"), api_error.suggestion());
            if api_error.is_retryable() {
                eprintln!(
                    "{}",
                    Colors::dim("(This error may be transient - retry may succeed)")
                );
            }
            std::process::exit(74); // EX_IOERR
        } else if let Some(start_error) = e.downcast_ref::<StartError>() {
            eprintln!("{} {}", Colors::error("Error:"), start_error);
            eprintln!("{} {}", Colors::dim("Suggestion:"), start_error.suggestion());
            std::process::exit(64); // EX_USAGE
        } else {
            eprintln!("{} {}", Colors::error("Error:"), e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    color_init(cli.no_color);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "labterm", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = ClientConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Completions { .. } => unreachable!(),
            Commands::Start { repo } => handle_start(config, &repo).await,
            Commands::Extend { session_id } => handle_extend(config, &session_id).await,
        }
    })
}

async fn handle_start(config: ClientConfig, repo: &str) -> Result<(), Box<dyn Error>> {
    let api = Arc::new(ScenarioApi::new(&config.base_url));

    if let Ok(guide) = std::env::var("LABTERM_GUIDE_URL") {
        eprintln!("{} {}", Colors::dim("Guide:"), guide);
    }
    eprintln!(
        "{} Provisioning scenario '{}'... this may take a few minutes.",
        Colors::dim("[labterm]"),
        repo
    );

    let scenario = api.provision(repo).await?;
    eprintln!(
        "{} Scenario ready. Session {}",
        Colors::success("[labterm]"),
        Colors::session_id(&scenario.session_id)
    );

    interactive::run_session(config, scenario, api).await
}

async fn handle_extend(config: ClientConfig, session_id: &str) -> Result<(), Box<dyn Error>> {
    let api = ScenarioApi::new(&config.base_url);
    let new_end_time = api.extend_timer(session_id).await?;
    println!("{}", new_end_time);
    eprintln!(
        "{} Session {} extended; new deadline at epoch {}",
        Colors::success("[labterm]"),
        Colors::session_id(session_id),
        new_end_time
    );
    Ok(())
}
