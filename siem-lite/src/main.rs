use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use log::{debug, info};
use siem_lite::{
    channel::{ApiClient, HealthSource, LogUploader, StreamState},
    cli::{print_banner, print_usage_examples, CliApp, CliCommand, CliConfig},
    configuration::{Configuration, OutputFormat},
    event_processing::DashboardProjection,
    filter::{FilterState, SearchMode},
    output_strategy::{default_export_path, strategy_for},
    ChannelSet, ConnectivitySupervisor, DashboardSession, EventFormatter,
};
use siem_lite_common::{EventKey, LogEvent};
use tokio::{signal, sync::watch, time::timeout};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = CliApp::new().get_matches();
    let cli = match CliConfig::from_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_usage_examples();
            std::process::exit(1);
        }
    };

    match &cli.command {
        CliCommand::ConfigGenerate { output } => return generate_config(output),
        CliCommand::ConfigValidate { file } => return validate_config(file),
        _ => {}
    }

    let config = Arc::new(cli.configuration()?);
    debug!("Using configuration: {:?}", config);

    match cli.command {
        CliCommand::Watch {
            filter,
            duration,
            no_header,
        } => watch_events(config, filter, duration, no_header).await,
        CliCommand::Search {
            filter,
            page,
            limit,
        } => search_events(config, filter, page, limit).await,
        CliCommand::Upload { file } => upload_file(&config, &file).await,
        CliCommand::Health => check_health(&config).await,
        CliCommand::Export { filter, output } => export_events(config, filter, output).await,
        CliCommand::ConfigGenerate { .. } | CliCommand::ConfigValidate { .. } => Ok(()),
    }
}

async fn watch_events(
    config: Arc<Configuration>,
    filter: FilterState,
    duration: Option<Duration>,
    no_header: bool,
) -> anyhow::Result<()> {
    print_banner();

    let session = Arc::new(DashboardSession::new(config.clone()));
    session.set_filter(filter);
    let channels = ChannelSet::http(&config)?;
    let mut supervisor = ConnectivitySupervisor::new(config.clone(), session.clone(), channels);

    let _connectivity = supervisor
        .observers()
        .connectivity
        .subscribe(|state: &StreamState| match state {
            StreamState::Connected => eprintln!("📡 Live stream connected"),
            StreamState::Connecting => eprintln!("📡 Connecting to live stream..."),
            StreamState::Disconnected => eprintln!("📡 Live stream disconnected"),
        });
    let _alerts = supervisor
        .observers()
        .alerts
        .subscribe(|alert: &serde_json::Value| eprintln!("🚨 Alert: {}", alert));

    let formatter = EventFormatter::new(config.is_verbose());
    if !no_header {
        println!("{}", formatter.header());
        println!("{}", formatter.separator());
    }

    let renderer = render_new_events(session.subscribe(), formatter);
    supervisor.start()?;

    match duration {
        Some(duration) => {
            if timeout(duration, renderer).await.is_err() {
                println!("\nWatch completed after {} seconds", duration.as_secs());
            }
        }
        None => {
            tokio::select! {
                _ = renderer => {},
                _ = signal::ctrl_c() => {
                    println!("\nReceived Ctrl+C, exiting...");
                }
            }
        }
    }

    supervisor.dispose();

    let projection = session.projection();
    let summary = strategy_for(config.output.format, config.is_verbose());
    print!("{}", summary.format_summary(&projection.view, &projection.metrics));
    info!(
        "Watched {} events ({} metrics)",
        projection.events.len(),
        projection.metrics_source.as_str()
    );
    Ok(())
}

/// Print rows that appeared in the view since the last projection,
/// oldest first so the terminal scrolls in time order.
async fn render_new_events(
    mut projections: watch::Receiver<Arc<DashboardProjection>>,
    formatter: EventFormatter,
) {
    let mut printed: HashSet<EventKey> = HashSet::new();

    while projections.changed().await.is_ok() {
        let projection = projections.borrow_and_update().clone();
        for event in projection
            .view
            .iter()
            .rev()
            .filter(|e| !printed.contains(&e.key()))
        {
            println!("{}", formatter.format_event(event));
        }
        printed = projection.view.iter().map(LogEvent::key).collect();
    }
}

async fn search_events(
    config: Arc<Configuration>,
    filter: FilterState,
    page: u32,
    limit: u32,
) -> anyhow::Result<()> {
    let session = Arc::new(DashboardSession::new(config.clone()));
    session.set_search_mode(SearchMode::Remote);
    session.set_filter(filter);
    let channels = ChannelSet::http(&config)?;
    let supervisor = ConnectivitySupervisor::new(config.clone(), session.clone(), channels);

    supervisor
        .search(page, limit)
        .await
        .context("remote search failed")?;

    let projection = session.projection();
    print_events(&config, &projection.view);

    if config.output.format == OutputFormat::Plain {
        let pages = projection.view_total.div_ceil(limit.max(1) as usize).max(1);
        println!(
            "\nPage {} of {} ({} matching events)",
            projection.remote_page.unwrap_or(page),
            pages,
            projection.view_total
        );
    }
    Ok(())
}

async fn export_events(
    config: Arc<Configuration>,
    filter: FilterState,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let session = Arc::new(DashboardSession::new(config.clone()));
    session.set_filter(filter);
    let channels = ChannelSet::http(&config)?;
    let supervisor = ConnectivitySupervisor::new(config.clone(), session.clone(), channels);

    supervisor
        .refresh()
        .await
        .context("failed to fetch latest events")?;

    let view = session.view();
    let strategy = strategy_for(config.output.format, config.is_verbose());
    let path = output.unwrap_or_else(|| {
        default_export_path(chrono::Local::now().date_naive(), strategy.as_ref())
    });

    strategy
        .save_to_file(&path, &strategy.render(&view))
        .with_context(|| format!("writing {}", path.display()))?;

    println!("📄 Exported {} events to {}", view.len(), path.display());
    Ok(())
}

async fn upload_file(config: &Configuration, file: &Path) -> anyhow::Result<()> {
    let client = ApiClient::new(config)?;
    let receipt = client
        .upload(file)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    if !receipt.success {
        anyhow::bail!(
            "Upload rejected: {}",
            receipt.message.as_deref().unwrap_or("no reason given")
        );
    }

    match receipt.count {
        Some(count) => println!("✅ Uploaded {} ({} events processed)", file.display(), count),
        None => println!("✅ Uploaded {}", file.display()),
    }
    if let Some(message) = receipt.message {
        println!("   {}", message);
    }
    Ok(())
}

async fn check_health(config: &Configuration) -> anyhow::Result<()> {
    let client = ApiClient::new(config)?;
    match client.check_health().await {
        Ok(status) if status.healthy => {
            println!("✅ Backend at {} is {}", client.base_url(), status.status);
            Ok(())
        }
        Ok(status) => {
            println!("❌ Backend at {} reports {}", client.base_url(), status.status);
            std::process::exit(1);
        }
        Err(e) => {
            println!("❌ Backend at {} unreachable: {}", client.base_url(), e);
            std::process::exit(1);
        }
    }
}

fn print_events(config: &Configuration, events: &[LogEvent]) {
    match config.output.format {
        OutputFormat::Plain => {
            let formatter = EventFormatter::new(config.is_verbose());
            println!("{}", formatter.header());
            println!("{}", formatter.separator());
            for event in events {
                println!("{}", formatter.format_event(event));
            }
        }
        format => {
            let strategy = strategy_for(format, config.is_verbose());
            print!("{}", strategy.render(events));
        }
    }
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    let yaml = Configuration::default().to_yaml()?;
    std::fs::write(output, yaml).with_context(|| format!("writing {}", output.display()))?;
    println!("📝 Wrote default configuration to {}", output.display());
    Ok(())
}

fn validate_config(file: &Path) -> anyhow::Result<()> {
    let config = Configuration::builder().from_config_file(file)?.build()?;
    println!("✅ {} is valid", file.display());
    println!("   API:      {}", config.api.base_url);
    println!("   Stream:   {}", config.stream_url()?);
    println!("   Capacity: {}", config.buffer_capacity());
    Ok(())
}
