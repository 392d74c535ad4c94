use anyhow::Result;
use clap::{CommandFactory, Parser};
use narrastream::app::{run_narrate_command, run_speak_command, run_status_command};
use narrastream::cli::{Cli, Commands, ConfigAction};
use narrastream::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Speak {
            text,
            provider,
            voice,
            format,
            output,
        } => {
            let config = load_config(cli.config.as_deref(), cli.base_url)?;
            run_speak_command(config, text, provider, voice, format, output, cli.quiet).await?;
        }
        Commands::Narrate {
            document_id,
            skip_generate,
            regenerate,
            style,
            from_page,
            timeout,
        } => {
            let config = load_config(cli.config.as_deref(), cli.base_url)?;
            run_narrate_command(
                config,
                document_id,
                skip_generate,
                regenerate,
                style,
                from_page,
                timeout,
                cli.quiet,
            )
            .await?;
        }
        Commands::Status { document_id } => {
            let config = load_config(cli.config.as_deref(), cli.base_url)?;
            run_status_command(config, document_id).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref(), cli.base_url)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "narrastream",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over -q/-v.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "narrastream=info",
        (false, 2) => "narrastream=debug",
        _ => "narrastream=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file (or defaults) and apply env and CLI overrides.
fn load_config(custom_path: Option<&std::path::Path>, base_url: Option<String>) -> Result<Config> {
    let mut config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        let default_path = Config::default_path();
        Config::load_or_default(&default_path)?
    }
    .with_env_overrides();

    if let Some(url) = base_url {
        config.server.base_url = url;
    }
    Ok(config)
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
    base_url: Option<String>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path, base_url)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
