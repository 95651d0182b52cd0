use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use location_cache::sync::{StatusLevel, StatusReporter};
use location_cache::{
    AppConfig, AuthState, AuthUser, LocationCache, LocationRecord, SyncOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "location-cache")]
#[command(about = "Local identity location cache with remote signature sync")]
pub struct Cli {
    /// Overrides LOCATION_CACHE_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Overrides LOCATION_CACHE_API_BASE
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Overrides LOCATION_CACHE_HTTP_TIMEOUT_SECS
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn apply(&self, mut config: AppConfig) -> Result<AppConfig> {
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(base) = &self.api_base {
            let url = base
                .parse::<reqwest::Url>()
                .with_context(|| format!("invalid --api-base '{}'", base))?;
            config = config.with_api_base(url);
        }
        if let Some(secs) = self.timeout_secs {
            if secs == 0 {
                return Err(anyhow!("--timeout-secs must be positive"));
            }
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Record a scraped location; omit LOCATION to record "no location set"
    Record {
        identity: String,
        location: Option<String>,
    },
    Show {
        identity: String,
    },
    List,
    Remove {
        identity: String,
    },
    /// Write a backup file, or print it when no path is given
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the store with a backup file
    Import {
        file: PathBuf,
    },
    Sync,
    Upload,
    SignIn {
        #[arg(long)]
        token: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    SignOut,
    Status,
}

/// Prints status messages the way the popup would show them.
struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn report(&self, level: StatusLevel, message: &str) {
        match level {
            StatusLevel::Error => eprintln!("error: {}", message),
            StatusLevel::Success | StatusLevel::Info => println!("{}", message),
        }
    }
}

pub struct App {
    cache: LocationCache,
}

impl App {
    pub fn open(config: AppConfig) -> Result<Self> {
        Ok(Self {
            cache: LocationCache::open_with(&config, Arc::new(ConsoleReporter))?,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Record { identity, location } => {
                match self
                    .cache
                    .record_observation(&identity, location.as_deref())
                    .await?
                {
                    Some(record) => print_record(&identity, &record),
                    None => return Err(anyhow!("identity must not be empty")),
                }
            }
            Command::Show { identity } => match self.cache.get(&identity).await? {
                Some(record) => print_record(&identity, &record),
                None => println!("{}: unknown", identity),
            },
            Command::List => {
                let records = self.cache.list().await?;
                for (identity, record) in &records {
                    println!(
                        "{:<24} {:<24} {} entries",
                        identity,
                        record.current.as_deref().unwrap_or("-"),
                        record.locations.len()
                    );
                }
                println!("{} identities", records.len());
            }
            Command::Remove { identity } => {
                self.cache.remove(&identity).await?;
                println!("removed {}", identity);
            }
            Command::Export { out } => {
                let json = self.cache.export_json().await?;
                match out {
                    Some(path) => {
                        tokio::fs::write(&path, json)
                            .await
                            .with_context(|| format!("failed to write '{}'", path.display()))?;
                        println!("exported to {}", path.display());
                    }
                    None => println!("{}", json),
                }
            }
            Command::Import { file } => {
                let text = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read '{}'", file.display()))?;
                let summary = self.cache.import_json(&text).await?;
                println!(
                    "imported {} identities ({} migrated, {} skipped)",
                    summary.records, summary.migrated, summary.skipped
                );
            }
            Command::Sync => match self.cache.sync().await? {
                SyncOutcome::Completed(report) => println!(
                    "version {} -> {} ({} deltas, {} records uploaded)",
                    report.starting_version,
                    report.final_version,
                    report.applied_deltas,
                    report.uploaded_records
                ),
                SyncOutcome::AlreadyRunning => println!("sync already in progress"),
                SyncOutcome::NotSignedIn => {}
            },
            Command::Upload => {
                self.cache.upload().await?;
            }
            Command::SignIn { token, name, email } => {
                let state = AuthState::new(token, AuthUser { name, email });
                if let Some(SyncOutcome::Completed(report)) = self.cache.sign_in(state).await? {
                    println!("synced to version {}", report.final_version);
                }
                println!("signed in");
            }
            Command::SignOut => {
                self.cache.sign_out().await;
                println!("signed out");
            }
            Command::Status => {
                let status = self.cache.status().await?;
                match status.signed_in_as {
                    Some(name) if !name.is_empty() => println!("signed in as {}", name),
                    Some(_) => println!("signed in"),
                    None => println!("not signed in"),
                }
                println!("signature version {}", status.sync_state.version);
                if let Some(at) = status
                    .sync_state
                    .last_synced_at
                    .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
                {
                    println!("last synced {}", at.to_rfc3339());
                }
                println!("{} identities cached", status.records);
            }
        }
        Ok(())
    }
}

fn print_record(identity: &str, record: &LocationRecord) {
    println!("{}: {}", identity, record.current.as_deref().unwrap_or("(no location)"));
    for entry in &record.locations {
        let when = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(entry.timestamp)
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| entry.timestamp.to_string());
        match entry.version {
            Some(version) => println!(
                "  {}  {}  v{}",
                when,
                entry.location.as_deref().unwrap_or("-"),
                version
            ),
            None => println!("  {}  {}", when, entry.location.as_deref().unwrap_or("-")),
        }
    }
}
