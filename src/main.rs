use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use phishlens::api::{app, AppState};
use phishlens::pipeline::{normalize_url, Analyzer, Assessment};
use phishlens::upload::Upload;
use phishlens::Config;
use std::path::Path;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishlens")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fraud and phishing risk assessment for documents, images, URLs and emails")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phishlens.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging, including every rule that fires")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Listen address, overrides server.bind")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-file")
                .long("test-file")
                .value_name("FILE")
                .help("Assess a document, image or text file and print the result")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-url")
                .long("test-url")
                .value_name("URL")
                .help("Assess a URL and print the result")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Assess a raw email file and print the result")
                .action(ArgAction::Set),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/phishlens.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.server.bind = bind.clone();
    }

    let analyzer = match Analyzer::live(&config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("Error initialising analyzer: {e:#}");
            process::exit(1);
        }
    };

    let outcome = if let Some(file) = matches.get_one::<String>("test-file") {
        test_file(&analyzer, file).await
    } else if let Some(url) = matches.get_one::<String>("test-url") {
        test_url(&analyzer, url).await
    } else if let Some(email_file) = matches.get_one::<String>("test-email") {
        test_email_file(&analyzer, email_file).await
    } else {
        serve(&config, analyzer).await
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path).with_context(|| format!("reading {path}"))
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn print_assessment(assessment: &Assessment) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(assessment)?);
    Ok(())
}

async fn test_file(analyzer: &Analyzer, file: &str) -> anyhow::Result<()> {
    let upload = Upload::from_path(Path::new(file)).with_context(|| format!("reading {file}"))?;
    log::info!("Testing {file} as {:?}", upload.kind());

    let assessment = analyzer.analyze_upload(&upload).await?;
    print_assessment(&assessment)
}

async fn test_url(analyzer: &Analyzer, input: &str) -> anyhow::Result<()> {
    let url = normalize_url(input)?;
    let assessment = analyzer.analyze_url(&url).await;
    print_assessment(&assessment)
}

async fn test_email_file(analyzer: &Analyzer, email_file: &str) -> anyhow::Result<()> {
    let bytes = std::fs::read(email_file).with_context(|| format!("reading {email_file}"))?;
    let raw = String::from_utf8_lossy(&bytes);

    let assessment = analyzer.analyze_email(&raw).await;
    print_assessment(&assessment)
}

async fn serve(config: &Config, analyzer: Analyzer) -> anyhow::Result<()> {
    let state = AppState {
        analyzer: Arc::new(analyzer),
    };
    let router = app(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    log::info!("phishlens listening on {}", config.server.bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("phishlens stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
