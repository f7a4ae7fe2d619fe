//! Journey Migration CLI
//!
//! Exports journeys with their dependencies, imports them into another
//! environment and prunes orphaned nodes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use journey_migrator::bundle::{self, Bundle};
use journey_migrator::import::suggest;
use journey_migrator::naming::{all_journeys_file_name, journey_file_name};
use journey_migrator::{
    describe, ArtifactStore, CustomNodeClassifier, Exporter, HttpArtifactStore, ImportOptions,
    ImportSummary, Importer, MigratorConfig, NodeCatalog, OrphanAuditor,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "journey-migrate")]
#[command(about = "Export and import authentication journeys with their dependencies")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Leave out scripts, email templates, providers and themes
    #[arg(long, global = true)]
    no_deps: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one journey or every journey of the realm
    Export {
        /// Journey to export
        #[arg(short, long, conflicts_with_all = ["all", "all_separate"])]
        tree: Option<String>,
        /// Every journey into one file
        #[arg(short, long, conflicts_with = "all_separate")]
        all: bool,
        /// Every journey into its own file
        #[arg(short = 'A', long)]
        all_separate: bool,
        /// Output file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Import one journey from a bundle file
    Import {
        /// Journey to import
        #[arg(short, long)]
        tree: String,
        /// Bundle file
        #[arg(short, long)]
        file: PathBuf,
        /// Keep node ids from the file
        #[arg(long)]
        no_re_uuid: bool,
    },

    /// Import every journey of a bundle file or directory
    ImportAll {
        /// Bundle file
        #[arg(short, long, conflicts_with = "dir", required_unless_present = "dir")]
        file: Option<PathBuf>,
        /// Directory of *.journey.json files
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Keep node ids from the files
        #[arg(long)]
        no_re_uuid: bool,
    },

    /// Delete nodes no journey references
    Prune {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List the realm's journeys
    List {
        /// Mark journeys using custom nodes with `*`
        #[arg(short, long)]
        analyze: bool,
    },

    /// Summarize the journeys of a bundle file
    Describe {
        /// Bundle file
        #[arg(short, long)]
        file: PathBuf,
        /// Journey to describe
        #[arg(short, long)]
        tree: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = MigratorConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Export {
            tree,
            all,
            all_separate,
            file,
        } => {
            let store = connect(&config)?;
            let include_dependencies = config.export.include_dependencies && !cli.no_deps;
            let exporter = Exporter::new(&store, &config.connection, include_dependencies);
            let format = config.export.output_format;

            if let Some(tree) = tree {
                let bundle = exporter.export_journey(&tree).await?;
                let path = file.unwrap_or_else(|| config.output_dir().join(journey_file_name(&tree)));
                bundle::write_file(&path, &bundle, format)?;
                println!("✅ Exported {} to {}", tree, path.display());
            } else if all {
                let bundle = exporter.export_all().await?;
                let path = file.unwrap_or_else(|| {
                    config
                        .output_dir()
                        .join(all_journeys_file_name(config.connection.realm_name()))
                });
                bundle::write_file(&path, &bundle, format)?;
                println!(
                    "✅ Exported {} journeys to {}",
                    bundle.journey_ids().len(),
                    path.display()
                );
            } else if all_separate {
                let written = exporter
                    .export_all_separate(&config.output_dir(), format)
                    .await?;
                println!(
                    "✅ Exported {} journeys to {}",
                    written.len(),
                    config.output_dir().display()
                );
            } else {
                bail!("Specify --tree, --all or --all-separate");
            }
            Ok(())
        }

        Commands::Import {
            tree,
            file,
            no_re_uuid,
        } => {
            let store = connect(&config)?;
            let options = import_options(&config, no_re_uuid, cli.no_deps);
            let bundle = bundle::read_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            Importer::new(&store, &config.connection, options)
                .import_journey(&bundle, &tree)
                .await?;
            println!("✅ Imported {}", tree);
            Ok(())
        }

        Commands::ImportAll {
            file,
            dir,
            no_re_uuid,
        } => {
            let store = connect(&config)?;
            let options = import_options(&config, no_re_uuid, cli.no_deps);
            let importer = Importer::new(&store, &config.connection, options);
            let summary = match (file, dir) {
                (Some(file), _) => {
                    let bundle = bundle::read_file(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    importer.import_all(&bundle).await?
                }
                (None, Some(dir)) => importer.import_all_from_dir(&dir).await?,
                (None, None) => bail!("Specify --file or --dir"),
            };
            report_import(&summary)
        }

        Commands::Prune { yes } => {
            let store = connect(&config)?;
            let auditor = OrphanAuditor::new(&store);
            let report = auditor.find_orphans().await?;
            println!(
                "🔍 {} of {} nodes are orphaned",
                report.orphaned.len(),
                report.all.len()
            );
            if report.orphaned.is_empty() {
                return Ok(());
            }

            let confirmed = yes
                || confirm(&format!(
                    "Delete {} orphaned nodes? (y/n) ",
                    report.orphaned.len()
                ))?;
            let result = auditor.prune(&report.orphaned, confirmed).await;
            if !confirmed {
                println!("Nothing deleted");
                return Ok(());
            }

            println!("✅ Deleted {} nodes", result.deleted);
            if !result.failures.is_empty() {
                for id in &result.failures {
                    println!("  ❌ {}", id);
                }
                bail!("{} nodes could not be deleted", result.failures.len());
            }
            Ok(())
        }

        Commands::List { analyze } => {
            let store = connect(&config)?;
            let mut journeys = store.list_all_journeys().await?;
            journeys.sort_by(|a, b| a.id.cmp(&b.id));

            if !analyze {
                for journey in &journeys {
                    println!("{}", journey.id);
                }
                return Ok(());
            }

            let version = match &config.connection.platform_version {
                Some(version) => version.clone(),
                None => store.server_version().await?,
            };
            let catalog = NodeCatalog::builtin();
            let classifier = CustomNodeClassifier::new(&store, &catalog);
            for journey in &journeys {
                let marker = if classifier.is_custom(journey, &version).await? {
                    "*"
                } else {
                    ""
                };
                println!("{}{}", marker, journey.id);
            }
            println!();
            println!("(*) uses node types outside platform {}", version);
            Ok(())
        }

        Commands::Describe { file, tree } => describe_file(&file, tree.as_deref()),
    }
}

fn connect(config: &MigratorConfig) -> Result<HttpArtifactStore> {
    if config.connection.tenant.is_empty() {
        bail!("No tenant configured; set connection.tenant or JOURNEY_MIGRATOR__CONNECTION__TENANT");
    }
    Ok(HttpArtifactStore::new(&config.connection)?)
}

fn import_options(config: &MigratorConfig, no_re_uuid: bool, no_deps: bool) -> ImportOptions {
    let mut options = ImportOptions::from(&config.import);
    if no_re_uuid {
        options.re_uuid = false;
    }
    if no_deps {
        options.include_dependencies = false;
    }
    options
}

fn report_import(summary: &ImportSummary) -> Result<()> {
    for id in &summary.imported {
        println!("  ✅ {}", id);
    }
    for (id, message) in &summary.failed {
        println!("  ❌ {} - {}", id, message);
    }
    for (id, deps) in &summary.unresolved {
        println!("  ⏭️  {} - unresolved: {}", id, deps.join(", "));
    }

    if summary.is_success() {
        println!("✅ Imported {} journeys", summary.imported.len());
        Ok(())
    } else {
        bail!(
            "{} journeys failed, {} unresolved",
            summary.failed.len(),
            summary.unresolved.len()
        )
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn describe_file(file: &Path, tree: Option<&str>) -> Result<()> {
    let bundle: Bundle = bundle::read_file(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    match tree {
        Some(tree) => {
            let Some(journey) = bundle.journey(tree) else {
                let suggestions = suggest(bundle.journey_ids(), tree);
                if suggestions.is_empty() {
                    bail!("Journey {} is not in {}", tree, file.display());
                }
                bail!(
                    "Journey {} is not in {}. Did you mean: {}?",
                    tree,
                    file.display(),
                    suggestions.join(", ")
                );
            };
            print!("{}", describe(journey));
        }
        None => {
            for journey in bundle.into_journeys().values() {
                println!("{}", describe(journey));
            }
        }
    }
    Ok(())
}
