use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use nbtex::{analyze_block_entities, analyze_entities, EntityList};

#[derive(Parser)]
#[command(name = "nbtex")]
#[command(about = "Static NBT schema extraction from JVM class archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the entity hierarchy of an archive
    Entities {
        /// Class archive (.jar) or exploded class directory
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// entities.json produced by the data extractor
        #[arg(value_name = "LIST")]
        list: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Analyze the block-entity hierarchy of an archive
    BlockEntities {
        /// Class archive (.jar) or exploded class directory
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// block_entities.json produced by the data extractor
        #[arg(value_name = "LIST")]
        list: PathBuf,

        /// Game version the archive was built for; selects the save hook
        #[arg(short = 's', long, default_value = "1.20", value_name = "VERSION")]
        schema_version: String,

        /// Output file (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Entities {
            archive,
            list,
            output,
        } => {
            let list = read_list(list)?;
            let document = analyze_entities(archive, &list)
                .with_context(|| format!("analysis of {} failed", archive.display()))?;
            write_document(&document, output.as_deref())?;
        }
        Commands::BlockEntities {
            archive,
            list,
            schema_version,
            output,
        } => {
            let list = read_list(list)?;
            let document = analyze_block_entities(archive, schema_version, &list)
                .with_context(|| format!("analysis of {} failed", archive.display()))?;
            write_document(&document, output.as_deref())?;
        }
    }

    Ok(())
}

fn read_list(path: &PathBuf) -> Result<EntityList> {
    let file = fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    EntityList::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("cannot parse {}", path.display()))
}

fn write_document(document: &nbtex::SchemaDocument, output: Option<&std::path::Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?
        }
        None => println!("{json}"),
    }
    Ok(())
}
