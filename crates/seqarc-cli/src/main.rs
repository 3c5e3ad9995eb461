use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use seqarc_lib::cli::{CodecChoice, DecompressConfig};

#[derive(Parser)]
#[command(name = "seqarc")]
#[command(author = "seqarc contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Block-parallel DNA read archive decompression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress an unpacked archive directory back to FASTQ
    Decompress(DecompressArgs),
}

#[derive(Parser)]
struct DecompressArgs {
    /// Temp directory holding the per-block artifacts and params.bin
    #[arg(long, value_name = "DIR", required = true)]
    temp_dir: PathBuf,

    /// Output file for mate 1 (or the single-end output)
    #[arg(long, value_name = "FILE", required = true)]
    out_1: PathBuf,

    /// Output file for mate 2 (paired-end archives)
    #[arg(long, value_name = "FILE")]
    out_2: Option<PathBuf>,

    /// Number of threads (0 = auto-detect)
    #[arg(long, default_value = "0")]
    num_threads: usize,

    /// First record to emit (per output file; pairs for paired-end)
    #[arg(long, default_value = "0")]
    start: u64,

    /// One past the last record to emit (defaults to all records)
    #[arg(long)]
    end: Option<u64>,

    /// Output gzipped FASTQ
    #[arg(long)]
    gzip: bool,

    /// Gzip compression level (0-9)
    #[arg(long, default_value = "6")]
    gzip_level: u32,

    /// Reference shards were encoded with the neural sequence codec
    #[arg(long)]
    deep: bool,

    /// GPU ordinal forwarded to the neural decoder
    #[arg(long, default_value = "0")]
    gpu_id: u32,

    /// External archiver binary; in-process codecs are used when absent
    #[arg(long, value_name = "PROGRAM")]
    archiver: Option<PathBuf>,

    /// Neural decoder program used with --deep and --archiver
    #[arg(long, value_name = "PROGRAM")]
    deep_decoder: Option<PathBuf>,
}

impl DecompressArgs {
    fn into_config(self) -> DecompressConfig {
        let codecs = match self.archiver {
            Some(archiver) => CodecChoice::Subprocess {
                archiver,
                deep_decoder: self.deep_decoder,
            },
            None => CodecChoice::InProcess,
        };
        DecompressConfig {
            temp_dir: self.temp_dir,
            out_1: self.out_1,
            out_2: self.out_2,
            num_threads: self.num_threads,
            start: self.start,
            end: self.end,
            gzip: self.gzip,
            gzip_level: self.gzip_level,
            deep: self.deep,
            gpu_id: self.gpu_id,
            codecs,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decompress(args) => {
            info!("Starting decompression...");
            let config = args.into_config();
            seqarc_lib::decode::decompress(&config)?;
            info!("Decompression complete!");
        }
    }

    Ok(())
}
