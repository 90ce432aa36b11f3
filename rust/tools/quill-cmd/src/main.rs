use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "quill-cmd")]
#[command(about = "Command-line utility for building and inspecting quill indexes")]
#[command(version)]
struct Cli {
    /// Log indexing progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every text file under a directory, one document per file
    Index {
        /// Directory to read text files from
        #[arg(short, long)]
        input: String,

        /// Index directory, created if missing
        #[arg(short, long)]
        output: String,

        /// RAM buffer size in MB that triggers a flush
        #[arg(long)]
        ram_mb: Option<f64>,

        /// Number of indexing threads
        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Path to a JSON file with the writer configuration
        #[arg(long)]
        config: Option<String>,
    },

    /// Print the fields, terms and document count of index segments
    Dump {
        /// Index directory
        #[arg(long)]
        index: String,

        /// Segment to print (defaults to every segment)
        #[arg(long)]
        segment: Option<String>,

        /// Also print the stored fields of every document
        #[arg(long)]
        docs: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logger(cli.verbose);

    match cli.command {
        Commands::Index {
            input,
            output,
            ram_mb,
            threads,
            config,
        } => commands::index::run(input, output, ram_mb, threads, config),
        Commands::Dump {
            index,
            segment,
            docs,
        } => commands::dump::run(index, segment, docs),
    }
}
