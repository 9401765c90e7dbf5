//! Xrepo CLI - cross-repository precise symbol resolution

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use xrepo::config::{XrepoConfig, ensure_db_dir, ensure_storage_dirs, load_config};
use xrepo::output::{OutputMode, emit_error, emit_success};
use xrepo::server::{AppState, start_server};
use xrepo::ui::{self, Icons};
use xrepo::{HttpBundleManager, MonikerData, MonikerModel, MonikerResolver, RequestContext, SqliteStore};
use xrepo::dump::PackageKey;

#[derive(Parser)]
#[command(name = "xrepo")]
#[command(version)]
#[command(about = "Cross-repository precise symbol resolution")]
#[command(long_about = r#"
Xrepo links monikers found in one repository's code-intelligence bundle to
the dumps that define or reference the same package elsewhere:
  • Find the dump defining a package
  • Resolve a package-bound moniker to remote locations
  • Page through references from the same repository or the whole fleet

Example usage:
  xrepo package gomod:leftpad@0.1.0
  xrepo references gomod:leftpad@0.1.0 --repository 50 --commit <sha>
  xrepo resolve --dump 12 --path main.go --scheme gomod --identifier leftpad.Pad --package-information-id 3
"#)]
struct Cli {
    /// Path to xrepo.toml (defaults to ./xrepo.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (defaults to <storage_root>/xrepo.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Emit a JSON envelope instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Deadline for the whole command, in seconds (0 for none)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the dump that defines a package
    Package {
        /// Package as scheme:name@version
        package: PackageKey,
    },

    /// Resolve a moniker to locations in the dump defining its package
    Resolve {
        /// Dump the moniker was found in
        #[arg(long)]
        dump: i64,

        /// Bundle-local path of the moniker's document
        #[arg(long)]
        path: String,

        #[arg(long)]
        scheme: String,

        #[arg(long)]
        identifier: String,

        /// Empty for local monikers
        #[arg(long, default_value = "")]
        package_information_id: String,

        /// definition or reference
        #[arg(short, long, default_value = "definition")]
        model: MonikerModel,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(long, default_value = "100")]
        take: usize,

        /// Bundle manager base URL
        #[arg(long)]
        bundle_manager: Option<String>,
    },

    /// Page through references to a package
    References {
        /// Package as scheme:name@version
        package: PackageKey,

        /// Requesting repository
        #[arg(short, long)]
        repository: i64,

        /// Restrict to dumps near this commit of the requesting repository;
        /// without it, tip-visible references from other repositories are listed
        #[arg(short, long)]
        commit: Option<String>,

        #[arg(long, default_value = "10")]
        page_size: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Fetch every page
        #[arg(long)]
        all: bool,
    },

    /// Show statistics about the dump metadata store
    Stats,

    /// Serve resolution queries over HTTP
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Bundle manager base URL
        #[arg(long)]
        bundle_manager: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Package { .. } => "package",
            Commands::Resolve { .. } => "resolve",
            Commands::References { .. } => "references",
            Commands::Stats => "stats",
            Commands::Serve { .. } => "serve",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = OutputMode::from_json_flag(cli.json);
    let command = cli.command.name();
    if let Err(err) = run(cli, output_mode) {
        emit_error(output_mode, command, &err)?;
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli, output_mode: OutputMode) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?.unwrap_or_default();
    config.apply_env();
    if let Some(database) = &cli.database {
        config.database = Some(database.display().to_string());
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = Some(timeout);
    }

    let ctx = match config.request_timeout() {
        Some(timeout) => RequestContext::with_timeout(timeout),
        None => RequestContext::background(),
    };

    match cli.command {
        Commands::Package { package } => {
            let store = open_existing_store(&config)?;
            let dump = store.get_package(&ctx, &package.scheme, &package.name, &package.version)?;

            if output_mode.is_human() {
                match &dump {
                    Some(dump) => {
                        ui::header(Icons::PACKAGE, &format!("{} is defined by dump {}", package, dump.id));
                        ui::summary_row("Repository:", &dump.repository_id.to_string());
                        ui::summary_row("Commit:", &dump.commit);
                        ui::summary_row("Root:", if dump.root.is_empty() { "/" } else { dump.root.as_str() });
                        ui::summary_row("Indexer:", &dump.indexer);
                        ui::summary_row("Uploaded:", &dump.uploaded_at.to_rfc3339());
                    }
                    None => println!("{} No dump defines {}", Icons::EMPTY, package),
                }
            }
            emit_success(
                output_mode,
                "package",
                serde_json::json!({ "package": package, "found": dump.is_some(), "dump": dump }),
            )?;
        }

        Commands::Resolve {
            dump,
            path,
            scheme,
            identifier,
            package_information_id,
            model,
            skip,
            take,
            bundle_manager,
        } => {
            let store = open_existing_store(&config)?;
            let url = bundle_manager.unwrap_or_else(|| config.bundle_manager_url().to_string());
            let resolver = MonikerResolver::new(&store, HttpBundleManager::new(&url)?);
            let moniker = MonikerData::new(scheme, identifier).with_package_information(package_information_id);

            let (locations, count) = resolver.resolve(&ctx, dump, &path, model, &moniker, skip, take)?;

            if output_mode.is_human() {
                ui::header(
                    Icons::LINK,
                    &format!("{} {}:{} ({} of {})", model, moniker.scheme, moniker.identifier, locations.len(), count),
                );
                if locations.is_empty() {
                    println!("{} No locations found.", Icons::EMPTY);
                } else {
                    println!("{}", ui::locations_table(&locations));
                }
            }
            emit_success(
                output_mode,
                "resolve",
                serde_json::json!({ "locations": locations, "count": count }),
            )?;
        }

        Commands::References { package, repository, commit, page_size: requested, offset, all } => {
            let store = open_existing_store(&config)?;
            let (total_count, mut pager) = match &commit {
                Some(commit) => store.same_repo_pager(&ctx, &store, repository, commit, &package, requested)?,
                None => store.package_reference_pager(&ctx, &package, repository, requested)?,
            };

            let fetched = if all {
                pager.collect_all(&ctx)
            } else {
                pager.page_from_offset(&ctx, offset)
            };
            let page_count = pager.page_count();
            let page_size = pager.page_size();
            pager.close()?;
            let references = fetched?;

            if output_mode.is_human() {
                let scope = if commit.is_some() { "same repository" } else { "fleet" };
                ui::header(Icons::SEARCH, &format!("References to {} ({})", package, scope));
                if references.is_empty() {
                    println!("{} No references found.", Icons::EMPTY);
                } else {
                    println!("{}", ui::references_table(&references));
                    let first = if all { 0 } else { offset };
                    ui::summary_row(
                        "Showing:",
                        &format!("{}-{} of {} ({} pages)", first + 1, first + references.len(), total_count, page_count),
                    );
                }
            }
            emit_success(
                output_mode,
                "references",
                serde_json::json!({
                    "references": references,
                    "totalCount": total_count,
                    "offset": if all { 0 } else { offset },
                    "pageSize": page_size,
                }),
            )?;
        }

        Commands::Stats => {
            let database = config.database_path();
            let store = open_existing_store(&config)?;
            let stats = store.stats(&ctx)?;

            if output_mode.is_human() {
                ui::header(Icons::STATS, &format!("Xrepo Statistics ({})", database.display()));
                println!("{}", ui::stats_table(&stats));
            }
            emit_success(output_mode, "stats", &stats)?;
        }

        Commands::Serve { port, bundle_manager } => {
            let storage_root = config.storage_root();
            ensure_storage_dirs(&storage_root)?;
            let database = config.database_path();
            ensure_db_dir(&database)?;
            // Initialize the schema once before handlers start opening it
            SqliteStore::open(&database)?;

            let url = bundle_manager.unwrap_or_else(|| config.bundle_manager_url().to_string());
            // Built outside the runtime: the blocking client must not be created in async context
            let bundles = HttpBundleManager::new(&url)?;
            let state = AppState::new(database.clone(), bundles.clone())
                .with_traversal_limit(config.traversal_limit())
                .with_request_timeout(config.request_timeout());

            let port = port.unwrap_or_else(|| config.port());
            if output_mode.is_human() {
                ui::info("Storage root", &storage_root.display().to_string());
                ui::info("Database", &database.display().to_string());
                ui::info("Bundle manager", bundles.base_url().as_str());
                ui::success(&format!("Serving on http://0.0.0.0:{}", port));
            }

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(start_server(port, state))?;
            emit_success(output_mode, "serve", serde_json::json!({ "port": port }))?;
        }
    }

    Ok(())
}

fn open_existing_store(config: &XrepoConfig) -> anyhow::Result<SqliteStore> {
    let database = config.database_path();
    if !database.exists() {
        anyhow::bail!("database not found at {} (set --database or storage_root)", database.display());
    }
    Ok(SqliteStore::open(&database)?.with_traversal_limit(config.traversal_limit()))
}
