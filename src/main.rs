mod prompt;

use background_service::{
    AuditLog, BadgeMonitor, ChangeTrigger, FilterService, PageSignal, TopicRegistry,
    TriggerHandle,
};
use clap::{Parser, Subcommand};
use database::{KeyStore, ResultCache, SqliteStore};
use feed_scanner::SnapshotPage;
use feedfilter_core::{default_database_path, AppConfig, CoreError, ErrorExt, TopicRule};
use llm_interface::OpenRouterClassifier;
use prompt::TerminalPrompt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::LocalSet;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "feedfilter=info,background_service=info,llm_interface=info,feed_scanner=info,database=info";

/// Hides feed posts that an LLM scores above per-topic thresholds.
#[derive(Parser)]
#[command(name = "feedfilter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store location, e.g. sqlite:///path/to/store.db
    #[arg(long, global = true, env = "FEEDFILTER_DATABASE")]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one filtering pass over a saved page and print each post's state.
    Scan {
        /// HTML snapshot of the feed.
        #[arg(long)]
        page: PathBuf,

        /// Print the audit records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Filter a page file continuously, rescanning whenever it changes.
    Watch {
        #[arg(long)]
        page: PathBuf,
    },

    /// Remove every cached analysis.
    ClearCache,

    /// Store the OpenRouter API key.
    SetKey { key: String },

    /// Remove the stored API key.
    ForgetKey,

    /// Manage filter topics.
    Topics {
        #[command(subcommand)]
        action: TopicsCommand,
    },
}

#[derive(Subcommand)]
enum TopicsCommand {
    List,
    Add {
        name: String,
        description: String,
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,
    },
    Remove {
        name: String,
    },
    /// Enable or disable a topic.
    Toggle {
        name: String,
    },
    Threshold {
        name: String,
        value: f64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let result = LocalSet::new().run_until(run(cli)).await;
    let code = exit_code(&result);
    if code != 0 {
        std::process::exit(code);
    }
}

/// Reports a failed run once and maps it to the process exit code.
fn exit_code(result: &Result<(), CoreError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            e.log_error();
            eprintln!("{}", e.user_friendly_message());
            1
        }
    }
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let store = Arc::new(open_store(&config, cli.database).await?);

    match cli.command {
        Commands::Scan { page, json } => scan(config, store, &page, json).await,
        Commands::Watch { page } => watch(config, store, &page).await,
        Commands::ClearCache => {
            let removed = ResultCache::new(store).clear_all().await?;
            println!("Removed {} cached analyses", removed);
            Ok(())
        }
        Commands::SetKey { key } => {
            KeyStore::new(store, TerminalPrompt)
                .set_credential(key.trim())
                .await
        }
        Commands::ForgetKey => KeyStore::new(store, TerminalPrompt).clear_credential().await,
        Commands::Topics { action } => topics(config, store, action).await,
    }
}

async fn open_store(
    config: &AppConfig,
    database: Option<String>,
) -> Result<SqliteStore, CoreError> {
    let url = match database.or_else(|| config.storage.database_url.clone()) {
        Some(url) => url,
        None => {
            let path = default_database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            config.database_url()
        }
    };
    SqliteStore::open(url).await
}

type Service = FilterService<SqliteStore, OpenRouterClassifier, TerminalPrompt, SnapshotPage>;

fn build_service(
    config: &AppConfig,
    store: Arc<SqliteStore>,
    page: Rc<SnapshotPage>,
    audit: Arc<AuditLog>,
) -> Result<Service, CoreError> {
    let classifier = OpenRouterClassifier::from_settings(config.classifier.clone())?;
    FilterService::new(
        store,
        Arc::new(classifier),
        TerminalPrompt,
        page,
        config.topics.clone(),
        audit,
    )
}

async fn scan(
    config: AppConfig,
    store: Arc<SqliteStore>,
    path: &Path,
    json: bool,
) -> Result<(), CoreError> {
    let page = Rc::new(SnapshotPage::from_html(read_page(path).await?));
    let audit = Arc::new(AuditLog::new());
    let mut service = build_service(&config, store, page.clone(), audit.clone())?;

    let outcome = service.run_cycle().await?;
    service.wait_idle().await;
    debug!("Scan outcome: {:?}", outcome);

    if json {
        println!("{}", serde_json::to_string_pretty(&audit.entries())?);
    } else {
        for (identifier, state) in page.report() {
            println!("{:<24} {}", identifier, state.label());
        }
        println!("{} hidden", page.hidden_count());
    }
    Ok(())
}

async fn watch(config: AppConfig, store: Arc<SqliteStore>, path: &Path) -> Result<(), CoreError> {
    let html = read_page(path).await?;
    let page = Rc::new(SnapshotPage::from_html(html.clone()));
    let audit = Arc::new(AuditLog::new());

    let badge = BadgeMonitor::start(store.as_ref()).await?;
    let mut badge_states = badge.watch();
    tokio::task::spawn_local(badge.run());
    tokio::task::spawn_local(async move {
        while badge_states.changed().await.is_ok() {
            let state = *badge_states.borrow_and_update();
            info!("Badge \"{}\" ({:?})", state.text(), state);
        }
    });

    let (handle, debouncer) = ChangeTrigger::new(config.trigger.debounce_window());
    tokio::task::spawn_local(poll_page(
        path.to_path_buf(),
        page.clone(),
        handle,
        config.trigger.poll_interval(),
        html,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        },
    ));

    let mut service = build_service(&config, store, page, audit.clone())?;
    service.run(debouncer).await?;
    info!("{} posts hidden this session", audit.hidden_count());
    Ok(())
}

/// Replaces the page whenever the file changes, until `shutdown` resolves.
async fn poll_page(
    path: PathBuf,
    page: Rc<SnapshotPage>,
    trigger: TriggerHandle,
    interval: Duration,
    mut last: String,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = tokio::time::interval(interval);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, finishing pending posts");
                break;
            }
            _ = ticker.tick() => {}
        }

        let read = tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, finishing pending posts");
                break;
            }
            read = read_page(&path) => read,
        };
        let html = match read {
            Ok(html) => html,
            Err(e) => {
                e.log_warn();
                continue;
            }
        };
        if html == last {
            continue;
        }

        page.replace_html(html.clone());
        last = html;
        if !trigger.signal(PageSignal::Mutation { added_nodes: 1 }) {
            warn!("Filter service is gone, stopping page watcher");
            break;
        }
    }
}

async fn read_page(path: &Path) -> Result<String, CoreError> {
    Ok(tokio::fs::read_to_string(path).await?)
}

async fn topics(
    config: AppConfig,
    store: Arc<SqliteStore>,
    action: TopicsCommand,
) -> Result<(), CoreError> {
    let registry = TopicRegistry::new(store, config.topics);

    match action {
        TopicsCommand::List => {
            for topic in registry.load().await {
                println!(
                    "[{}] {:<16} {:.2}  {}",
                    if topic.enabled { "x" } else { " " },
                    topic.name,
                    topic.threshold,
                    topic.description
                );
            }
        }
        TopicsCommand::Add {
            name,
            description,
            threshold,
        } => {
            let name = name.trim().to_lowercase();
            registry
                .add(TopicRule::new(name.clone(), description.trim(), threshold))
                .await?;
            println!("Added topic {}", name);
        }
        TopicsCommand::Remove { name } => {
            registry.remove(&name).await?;
            println!("Removed topic {}", name);
        }
        TopicsCommand::Toggle { name } => {
            let enabled = registry.toggle(&name).await?;
            println!(
                "Topic {} {}",
                name,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        TopicsCommand::Threshold { name, value } => {
            registry.set_threshold(&name, value).await?;
            println!("Topic {} threshold set to {:.2}", name, value);
        }
    }
    Ok(())
}
