use std::path::PathBuf;

/// Which adapters back the external codec seams.
#[derive(Clone, Debug, Default)]
pub enum CodecChoice {
    /// zstd-backed in-process adapters (default)
    #[default]
    InProcess,
    /// External archiver binary invoked per artifact
    Subprocess {
        /// General-purpose archiver program (`<prog> x <archive> -to <dir>`)
        archiver: PathBuf,
        /// Neural sequence decoder program, used with --deep
        deep_decoder: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
pub struct DecompressConfig {
    /// Temp directory holding the per-block artifacts and params.bin
    pub temp_dir: PathBuf,
    /// Output file for mate 1 (or the single-end output)
    pub out_1: PathBuf,
    /// Output file for mate 2 (paired-end only)
    pub out_2: Option<PathBuf>,
    /// Number of worker threads (0 = auto-detect)
    pub num_threads: usize,
    /// First record to emit (per output file; pairs for paired-end)
    pub start: u64,
    /// One past the last record to emit (None = all records)
    pub end: Option<u64>,
    /// Output gzipped FASTQ
    pub gzip: bool,
    /// Gzip compression level (0-9)
    pub gzip_level: u32,
    /// Reference shards were encoded with the neural sequence codec
    pub deep: bool,
    /// GPU ordinal forwarded to the neural decoder
    pub gpu_id: u32,
    /// Codec adapter selection
    pub codecs: CodecChoice,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("."),
            out_1: PathBuf::new(),
            out_2: None,
            num_threads: 0,
            start: 0,
            end: None,
            gzip: false,
            gzip_level: 6,
            deep: false,
            gpu_id: 0,
            codecs: CodecChoice::InProcess,
        }
    }
}

pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}
