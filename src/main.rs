use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use steg_png::{
    embed, extract, inspect, EmbedRequest, EmbedSummary, ExtractOutcome, ExtractRequest,
    InspectFilter, PayloadSource,
};

#[derive(Parser)]
#[command(name = "steg-png")]
#[command(about = "Embed, extract and inspect data hidden in PNG chunk streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a message or file in a PNG image
    Embed {
        /// Path to the source PNG file
        image: PathBuf,

        /// Message to embed; the payload is read from stdin when neither
        /// --message nor --file is given
        #[arg(short, long, conflicts_with = "file")]
        message: Option<String>,

        /// File whose contents are embedded
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output to a specific file (default: <file>.steg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// DEFLATE compression level, 0-9
        #[arg(short = 'l', long, value_parser = clap::value_parser!(u32).range(0..=9))]
        compression_level: Option<u32>,

        /// Store the payload uncompressed, with an embedding timestamp header
        #[arg(long, conflicts_with = "compression_level")]
        store: bool,

        /// Suppress the summary printed to stdout
        #[arg(short, long)]
        quiet: bool,
    },

    /// Extract embedded data from a PNG image
    Extract {
        /// Path to the PNG file carrying embedded data
        image: PathBuf,

        /// Alternate output file path (default: <file>.out)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a canonical hex+ASCII dump of the embedded data
        #[arg(long)]
        hexdump: bool,
    },

    /// Print a structural summary of a PNG file's chunk stream
    Inspect {
        /// Path to the PNG file
        image: PathBuf,

        /// Show chunks with a specific type (may be given multiple times)
        #[arg(long = "filter", value_name = "chunk type")]
        filters: Vec<String>,

        /// Show critical chunks
        #[arg(long)]
        critical: bool,

        /// Show ancillary chunks
        #[arg(long)]
        ancillary: bool,

        /// Print a canonical hex+ASCII dump of each chunk's data
        #[arg(long)]
        hexdump: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("fatal: {:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Embed {
            image,
            message,
            file,
            output,
            compression_level,
            store,
            quiet,
        } => {
            let payload = if let Some(message) = message {
                PayloadSource::Message(message.into_bytes())
            } else if let Some(path) = file {
                PayloadSource::File(path)
            } else {
                PayloadSource::Stdin
            };

            let request = EmbedRequest {
                source: image.clone(),
                output,
                payload,
                compression: if store {
                    None
                } else {
                    Some(compression_level.unwrap_or(6))
                },
                quiet,
            };

            let summary = embed(&request)
                .with_context(|| format!("failed to embed into '{}'", image.display()))?;

            if !quiet {
                print_embed_summary(&image, &summary);
            }
        }

        Commands::Extract {
            image,
            output,
            hexdump,
        } => {
            let request = ExtractRequest {
                source: image.clone(),
                output,
                hexdump,
            };

            let outcome = extract(&request)
                .with_context(|| format!("failed to extract from '{}'", image.display()))?;

            match outcome {
                ExtractOutcome::NoEmbeddedData => {
                    println!("input file is clean; embedded data could not be found");
                    std::process::exit(1);
                }
                ExtractOutcome::Recovered {
                    bytes,
                    output,
                    timestamp,
                } => {
                    if let Some(path) = output {
                        println!("extracted {} bytes to {}", bytes, path.display());
                    }
                    if let Some(timestamp) = timestamp {
                        println!("payload embedded at unix time {}", timestamp);
                    }
                }
            }
        }

        Commands::Inspect {
            image,
            filters,
            critical,
            ancillary,
            hexdump,
        } => {
            let filter = InspectFilter {
                types: filters,
                critical,
                ancillary,
                hexdump,
            };

            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            inspect(&mut lock, &image, &filter)
                .with_context(|| format!("failed to inspect '{}'", image.display()))?;
        }
    }

    Ok(())
}

fn print_embed_summary(source: &Path, summary: &EmbedSummary) {
    let name_in = source.display().to_string();
    let name_out = summary.output.display().to_string();
    let width = name_in.len().max(name_out.len());

    println!("in  {:<width$} {} bytes", name_in, summary.source_size);
    println!("out {:<width$} {} bytes", name_out, summary.output_size);
    println!();

    println!(
        "embedded {} stEG chunk(s) at offset {}: {} bytes in, {} bytes out (ratio {:.2})",
        summary.chunks_written,
        summary.first_chunk_offset,
        summary.bytes_in,
        summary.bytes_out,
        summary.compression_ratio(),
    );

    if let Some(timestamp) = summary.timestamp {
        println!("payload stored uncompressed at unix time {}", timestamp);
    }
}
