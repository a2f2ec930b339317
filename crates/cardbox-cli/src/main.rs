//! Command-line front end for cardbox.
//!
//! Lists, edits and studies flashcard modules, and runs the repair
//! workflows (missing-image scan and fix, module import, asset audit).

use std::path::PathBuf;

use cardbox::{
    ALL_TOPICS, Answer, Card, CardId, ConflictResolution, Error, Module, Repository, StoreConfig,
};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

// ============================================================================
// CLI Arguments
// ============================================================================

/// Manage flashcard modules and their image assets.
#[derive(Parser, Debug)]
#[command(name = "cardbox")]
#[command(version, about, long_about = None)]
struct Args {
    /// Data directory holding module files
    #[arg(long, env = "CARDBOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// TOML config file (data_dir, images_dir, module_extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List modules
    List,

    /// Show the cards of a module
    Show {
        module: String,
        /// Only cards with this topic
        #[arg(long)]
        topic: Option<String>,
    },

    /// List the topics of a module
    Topics { module: String },

    /// Create an empty module
    Create { module: String },

    /// Delete a module and its file
    Delete { module: String },

    /// Add a card to a module
    AddCard {
        module: String,
        #[arg(long)]
        question: String,
        /// Text answer
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        answer: Option<String>,
        /// Image file to use as the answer
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long, default_value = "")]
        topic: String,
    },

    /// Remove the card at a position
    RemoveCard { module: String, index: usize },

    /// Rename a topic within a module
    RenameTopic {
        module: String,
        old: String,
        new: String,
    },

    /// Move every card of one topic into another
    MergeTopic {
        module: String,
        source: String,
        target: String,
    },

    /// Print a shuffled study session
    Study {
        module: String,
        #[arg(long)]
        topic: Option<String>,
        /// Seed for a repeatable order
        #[arg(long)]
        seed: Option<u64>,
        /// Save the shuffled order as the module's order
        #[arg(long, default_value_t = false)]
        persist: bool,
    },

    /// List image cards whose file is missing
    Scan {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Attach a new image to a card
    Fix { card_id: String, image: PathBuf },

    /// Import a module file
    Import {
        file: PathBuf,
        /// Replace an existing module with the same name
        #[arg(long, conflicts_with = "rename")]
        replace: bool,
        /// Import under a different name
        #[arg(long)]
        rename: Option<String>,
    },

    /// Compare the asset directory with what cards reference
    Audit {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Load every module, upgrade old formats and write them back
    Migrate,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> CliResult {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    debug!(data_dir = %config.data_dir.display(), "Using data directory");

    if let Command::Migrate = args.command {
        return migrate(config);
    }

    let mut repo = Repository::open(config)?;
    run(&mut repo, args.command)
}

fn load_config(args: &Args) -> CliResult<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config = config.data_dir(dir);
    }
    Ok(config)
}

fn run(repo: &mut Repository, command: Command) -> CliResult {
    match command {
        Command::List => {
            for module in repo.modules() {
                println!(
                    "{}\t{} cards\t{} topics",
                    module.name(),
                    module.len(),
                    module.topics().len()
                );
            }
        }
        Command::Show { module, topic } => show(repo, &module, topic.as_deref())?,
        Command::Topics { module } => {
            for topic in module_ref(repo, &module)?.topics() {
                println!("{}", topic);
            }
        }
        Command::Create { module } => {
            repo.create_module(&module)?;
            println!("Created module '{}'", module.trim());
        }
        Command::Delete { module } => match repo.remove_by_name(&module) {
            Ok(_) => println!("Deleted module '{}'", module),
            Err(e @ Error::Deletion { .. }) => {
                warn!(module = %module, "Module unloaded but its file remains");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        },
        Command::AddCard {
            module,
            question,
            answer,
            image,
            topic,
        } => {
            module_ref(repo, &module)?;
            let card = match (answer, image) {
                (_, Some(path)) => {
                    Card::with_image_file(repo.store(), question, &path, &topic, module.as_str())?
                }
                (Some(text), None) => Card::with_text(question, text, &topic, module.as_str()),
                (None, None) => return Err("either --answer or --image is required".into()),
            };
            let id = card.id();
            module_mut(repo, &module)?.add_card(card);
            repo.save_module(&module)?;
            println!("Added card {}", id);
        }
        Command::RemoveCard { module, index } => {
            let card = module_mut(repo, &module)?.remove_card_at(index)?;
            repo.save_module(&module)?;
            println!("Removed '{}'", card.question());
        }
        Command::RenameTopic { module, old, new } => {
            let changed = module_mut(repo, &module)?.rename_topic(&old, &new)?;
            repo.save_module(&module)?;
            println!("Renamed topic on {} cards", changed);
        }
        Command::MergeTopic {
            module,
            source,
            target,
        } => {
            let changed = module_mut(repo, &module)?.merge_topic(&source, &target)?;
            repo.save_module(&module)?;
            println!("Moved {} cards into '{}'", changed, target);
        }
        Command::Study {
            module,
            topic,
            seed,
            persist,
        } => study(repo, &module, topic.as_deref(), seed, persist)?,
        Command::Scan { json } => {
            let scan = repo.recovery().scan_missing_images();
            if json {
                println!("{}", serde_json::to_string_pretty(&scan)?);
            } else {
                for missing in &scan.missing {
                    println!(
                        "{}\t{}#{}\t{}\t{}",
                        missing.card_id,
                        missing.module,
                        missing.index,
                        missing.reference.as_deref().unwrap_or("-"),
                        missing.question
                    );
                }
                println!(
                    "{} of {} cards have missing images",
                    scan.missing.len(),
                    scan.cards_scanned
                );
            }
        }
        Command::Fix { card_id, image } => {
            let id: CardId = card_id.parse()?;
            match repo.recovery().fix_card_image(id, &image) {
                Ok(fixed) => {
                    println!("Card {} in '{}' now uses {}", id, fixed.module, fixed.path);
                    if !fixed.save.is_complete() {
                        return Err("image fixed but some modules could not be saved".into());
                    }
                }
                Err(e) if e.needs_decision() => {
                    eprintln!("Cannot tell which module owns card {}; fix it from its module.", id);
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Import {
            file,
            replace,
            rename,
        } => {
            let resolution = match (replace, rename) {
                (true, _) => Some(ConflictResolution::Replace),
                (false, Some(name)) => Some(ConflictResolution::Rename(name)),
                (false, None) => None,
            };
            match repo.recovery().import_module_file(&file, resolution) {
                Ok(imported) => println!(
                    "Imported '{}' ({} cards, {} images moved{})",
                    imported.name,
                    imported.cards,
                    imported.migration.relocated,
                    if imported.replaced { ", replaced existing" } else { "" }
                ),
                Err(e) if e.needs_decision() => {
                    eprintln!("Rerun with --replace or --rename <NAME>.");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Audit { json } => {
            let audit = repo.recovery().audit_assets()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&audit)?);
            } else {
                for file in &audit.orphaned {
                    println!("orphaned\t{}", file);
                }
                for missing in &audit.missing {
                    println!("missing\t{}#{}\t{}", missing.module, missing.index, missing.question);
                }
                println!(
                    "{} files, {} orphaned, {} cards missing images",
                    audit.total_files,
                    audit.orphaned.len(),
                    audit.missing.len()
                );
            }
        }
        Command::Migrate => unreachable!("handled before the repository is opened"),
    }
    Ok(())
}

fn module_ref<'a>(repo: &'a Repository, name: &str) -> Result<&'a Module, Error> {
    repo.get_by_name(name)
        .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
}

fn module_mut<'a>(repo: &'a mut Repository, name: &str) -> Result<&'a mut Module, Error> {
    repo.get_mut_by_name(name)
        .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
}

fn show(repo: &Repository, name: &str, topic: Option<&str>) -> CliResult {
    let module = module_ref(repo, name)?;
    let store = repo.store();

    for (index, card) in module.cards().iter().enumerate() {
        if topic.is_some_and(|t| t != ALL_TOPICS && t != card.topic()) {
            continue;
        }
        let answer = match card.answer() {
            Answer::Text(text) => text.clone(),
            Answer::Image(image) => match image.stored_path().map(|p| store.require(p)) {
                Some(Ok(path)) => path.display().to_string(),
                Some(Err(_)) | None => "[missing image]".to_string(),
            },
        };
        println!("{}\t[{}]\t{}\t{}", index, card.topic(), card.question(), answer);
    }
    Ok(())
}

fn study(
    repo: &mut Repository,
    name: &str,
    topic: Option<&str>,
    seed: Option<u64>,
    persist: bool,
) -> CliResult {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let store = repo.store().clone();
    let module = module_mut(repo, name)?;

    let mut session: Vec<Card> = if persist {
        module.shuffle_with(&mut rng);
        module.cards_by_topic(topic).into_iter().cloned().collect()
    } else {
        module.study_order(topic, &mut rng).into_iter().cloned().collect()
    };

    for (n, card) in session.iter_mut().enumerate() {
        println!("{}. {}", n + 1, card.question());
        match card.answer().clone() {
            Answer::Text(text) => println!("   {}", text),
            Answer::Image(_) => match card.load_image(&store) {
                Some(image) => println!("   [image {}, {} bytes]", image.path.display(), image.len()),
                None => println!("   [missing image]"),
            },
        }
    }

    if persist {
        repo.save_module(name)?;
    }
    Ok(())
}

fn migrate(config: StoreConfig) -> CliResult {
    config.ensure_layout()?;
    let mut repo = Repository::new(config);
    let report = repo.load_all();

    for (path, error) in &report.failed {
        println!("skipped\t{}\t{}", path.display(), error);
    }
    let summary = report.migration;
    println!(
        "{} modules, {} cards checked: {} images relocated, {} marked missing, {} unresolved",
        report.loaded.len(),
        summary.cards_checked,
        summary.relocated,
        summary.marked_missing,
        summary.unresolved
    );
    match report.resaved {
        Some(save) if !save.is_complete() => {
            for (module, error) in &save.failed {
                println!("not saved\t{}\t{}", module, error);
            }
            Err("some upgraded modules could not be written".into())
        }
        Some(save) => {
            println!("Wrote {} module files", save.saved.len());
            Ok(())
        }
        None => {
            println!("Everything is already up to date");
            Ok(())
        }
    }
}
