//! `portfolio` - CLI for the portfolio backend
//!
//! This binary runs the HTTP server and provides maintenance commands for the
//! view store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use portfolio::cli::{Cli, Command, ConfigCommand, ServeCommand, StatsCommand};
use portfolio::{init_logging, Config, ConnectionManager, Database, ViewTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, serve_cmd).await,
        Command::Stats(stats_cmd) => handle_stats(&config, &stats_cmd).await,
        Command::Prune => handle_prune(&config).await,
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    portfolio::server::serve(&config).await?;
    Ok(())
}

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    let manager = ConnectionManager::new(config.database.clone());
    manager
        .database()
        .await
        .context("failed to open the view store")
}

async fn handle_stats(config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let manager = Arc::new(ConnectionManager::new(config.database.clone()));
    let tracker = ViewTracker::new(Arc::clone(&manager), None);

    let stats = tracker.snapshot(cmd.limit).await?;
    let db = manager.database().await?;
    let summary = tokio::task::spawn_blocking(move || db.summary()).await??;

    if cmd.json {
        let output = serde_json::json!({
            "database": manager.database_name(),
            "totalPages": summary.total_pages,
            "totalViews": summary.total_views,
            "totalLogEntries": summary.total_log_entries,
            "oldestLog": summary.oldest_log,
            "newestLog": summary.newest_log,
            "dbSizeBytes": summary.db_size_bytes,
            "views": stats.views,
            "recentLogs": stats.recent_logs,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("portfolio stats");
    println!("---------------");
    println!("Database:      {}", manager.database_name());
    println!("Pages:         {}", summary.total_pages);
    println!("Total views:   {}", summary.total_views);
    println!("Log entries:   {}", summary.total_log_entries);
    if let (Some(oldest), Some(newest)) = (summary.oldest_log, summary.newest_log) {
        println!("Log range:     {oldest} .. {newest}");
    }
    println!("Size:          {} bytes", summary.db_size_bytes);

    println!();
    println!("{:<40} {:>10}", "PAGE", "VIEWS");
    for counter in &stats.views {
        println!("{:<40} {:>10}", counter.page, counter.count);
    }

    println!();
    println!("Recent visits (newest first):");
    if stats.recent_logs.is_empty() {
        println!("  (none)");
    }
    for entry in &stats.recent_logs {
        println!(
            "  {}  {:<30} {:<16} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.page,
            entry.ip,
            entry.user_agent
        );
    }
    Ok(())
}

async fn handle_prune(config: &Config) -> anyhow::Result<()> {
    let max_entries = config.max_log_entries();
    let max_age = config
        .max_log_age()
        .map(chrono::Duration::from_std)
        .transpose()
        .context("retention.max_log_age_days is out of range")?;

    if max_entries.is_none() && max_age.is_none() {
        println!("Log retention is disabled; nothing to prune.");
        return Ok(());
    }

    let db = open_database(config).await?;
    let (by_age, by_count) = tokio::task::spawn_blocking(move || {
        let by_age = match max_age {
            Some(age) => db.prune_logs_older_than(age)?,
            None => 0,
        };
        let by_count = match max_entries {
            Some(keep) => db.prune_logs_keep_recent(keep)?,
            None => 0,
        };
        Ok::<_, portfolio::Error>((by_age, by_count))
    })
    .await??;

    println!("Pruned {by_age} entries by age and {by_count} by count.");
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                let set = |value: bool| if value { "set" } else { "not set" };

                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.bind_address());
                println!(
                    "  Allowed origins:    {}",
                    config.server.allow_origins.join(", ")
                );
                println!();
                println!("[Database]");
                println!(
                    "  URL:                {}",
                    config.database.url.as_deref().unwrap_or("not set")
                );
                println!("  Name:               {}", config.database.name);
                println!();
                println!("[Stats]");
                println!("  Secret:             {}", set(config.stats.secret.is_some()));
                println!();
                println!("[Mail]");
                println!(
                    "  SMTP relay:         {}:{}",
                    config.mail.smtp_host, config.mail.smtp_port
                );
                println!(
                    "  Username:           {}",
                    config.mail.username.as_deref().unwrap_or("not set")
                );
                println!("  Password:           {}", set(config.mail.password.is_some()));
                println!(
                    "  Contact email:      {}",
                    config.mail.contact_email.as_deref().unwrap_or("not set")
                );
                println!();
                println!("[Retention]");
                println!(
                    "  Max log entries:    {}",
                    config.retention.max_log_entries
                );
                println!(
                    "  Max age (days):     {}",
                    config.retention.max_log_age_days
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
