use sessionkeeper::domain_model::AppState;
use sessionkeeper::logger::*;
use sessionkeeper::runtime::*;
use sessionkeeper::settings::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let app = App::try_new(&project_settings, AppState::Active)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<HostCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };
        let quit = matches!(command, HostCommand::Quit);
        match app.execute(command).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => println!("error: {e:#}"),
        }
        if quit {
            break;
        }
    }

    let shutdown_timeout = std::time::Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, app.shutdown()).await {
        Ok(_) => tracing::info!("session keeper shutdown successfully"),
        Err(_) => tracing::error!("session keeper shutdown timed out"),
    }

    Ok(())
}
