//! CLI front-end for declarative ELF/DWARF offset resolution.
//!
//! Grounded on `pdbtool/src/main.rs`'s flag/subcommand/tracing-setup
//! shape, re-targeted at `offender-core`'s extraction pipeline instead
//! of PDB manipulation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;

mod config_file;

use config_file::{FileConfig, VersionsManifest};
use offender_core::{Extractor, Finder, SearcherFactory};

#[derive(clap::Parser)]
struct CommandWithFlags {
    /// Reduce logging to just warnings and errors.
    #[arg(long, global = true)]
    quiet: bool,

    /// Turn on debug output. Noisy!
    #[arg(long, global = true)]
    verbose: bool,

    /// Show timestamps in log messages.
    #[arg(long, global = true)]
    timestamps: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Resolves a config's offsets against a single binary set and
    /// prints the result as JSON.
    Extract(ExtractOptions),
    /// Resolves a config against every version in a manifest,
    /// recording found and failed versions to a results database.
    Find(FindOptions),
    /// Prints a previously recorded version's offsets from a results
    /// database.
    Show(ShowOptions),
}

#[derive(clap::Args)]
struct ExtractOptions {
    /// TOML file declaring the offsets to resolve.
    config: PathBuf,
    /// Primary ELF path to search. Repeat for multiple binaries.
    #[arg(long = "bin", required = true)]
    binaries: Vec<PathBuf>,
    /// Companion (separated debug info) path, positionally paired with
    /// `--bin` by index.
    #[arg(long = "companion")]
    companions: Vec<PathBuf>,
}

#[derive(clap::Args)]
struct FindOptions {
    /// TOML file declaring the offsets to resolve.
    config: PathBuf,
    /// TOML manifest mapping version name to its binary set.
    versions: PathBuf,
    /// sqlite database to record results into (created if absent).
    #[arg(long, default_value = "offender.db")]
    database: PathBuf,
}

#[derive(clap::Args)]
struct ShowOptions {
    /// sqlite database to read from.
    database: PathBuf,
    /// Show only this version; omit to show every recorded version.
    version: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let command_with_flags = CommandWithFlags::parse();
    configure_tracing(&command_with_flags);

    match command_with_flags.command {
        Command::Extract(args) => extract_command(args)?,
        Command::Find(args) => find_command(args)?,
        Command::Show(args) => show_command(args)?,
    }

    Ok(())
}

fn configure_tracing(args: &CommandWithFlags) {
    use tracing_subscriber::filter::LevelFilter;

    let max_level = if args.quiet {
        LevelFilter::WARN
    } else if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let builder = tracing_subscriber::fmt().with_max_level(max_level);
    if args.timestamps {
        builder.init();
    } else {
        builder.without_time().init();
    }
}

fn searcher_factories() -> Vec<Box<dyn SearcherFactory>> {
    vec![
        Box::new(offender_elf::ElfSearcherFactory::new(true)),
        Box::new(offender_nm::NmSearcherFactory::new(true, offender_nm::AssemblerArch::default())),
        Box::new(offender_r2::R2SearcherFactory::new(true)),
    ]
}

fn extract_command(args: ExtractOptions) -> anyhow::Result<()> {
    let config = FileConfig::load(&args.config)?.into_config()?;

    let handles = args
        .binaries
        .into_iter()
        .enumerate()
        .map(|(i, primary)| offender_core::BinaryHandle::new(primary, args.companions.get(i).cloned()))
        .collect();
    let binaries = offender_core::BinarySet::new(handles);

    let factories = searcher_factories();
    let searchers = offender_core::select_searchers(&factories, &binaries)?;
    let extractor = Extractor::new(binaries, searchers)?;
    let context = extractor.extract(&config)?;

    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

fn find_command(args: FindOptions) -> anyhow::Result<()> {
    let config = FileConfig::load(&args.config)?.into_config()?;
    let versions: BTreeMap<String, offender_core::BinarySet> = VersionsManifest::load(&args.versions)?.into_binary_sets();

    let factories = searcher_factories();
    let finder = Finder::new(&config);
    let outcome = finder.find(&versions, &factories);

    let store = offender_store::Store::open(&args.database)?;
    for (version, context) in &outcome.succeeded {
        store.record_found(version, context)?;
    }
    for version in &outcome.failed {
        store.record_failed(version)?;
    }

    println!(
        "found offsets for {} version(s), failed on {}",
        outcome.succeeded.len(),
        outcome.failed.len()
    );
    if !outcome.failed.is_empty() {
        println!("failed versions: {}", outcome.failed.join(", "));
    }
    Ok(())
}

fn show_command(args: ShowOptions) -> anyhow::Result<()> {
    let store = offender_store::Store::open(&args.database)?;
    let found = store.read_found(args.version.as_deref())?;

    if found.is_empty() {
        println!("no recorded offsets match that query");
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}
