//! External codec seams: the entropy coders and the id coder are
//! collaborators behind traits, so subprocess and in-process adapters are
//! interchangeable per configuration.

mod inproc;
mod subprocess;

pub use inproc::{ZstdDeepCodec, ZstdGenCodec, ZstdIdCodec, ZstdStrArrayCodec};
pub use subprocess::{SubprocessDeepCodec, SubprocessGenCodec};

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::CodecChoice;

/// General-purpose file archiver. Each archive holds one or more named
/// entries; `decode` expands every entry into `dest_dir` under its stored
/// name. `encode` stores `src` under its own file name.
pub trait GenCodec: Send + Sync {
    fn decode(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
    fn encode(&self, src: &Path, archive: &Path) -> Result<()>;
}

/// Range/BWT codec over an array of byte strings whose lengths are carried
/// out of band. `lengths` must hold at least `n` entries; entry `i` gives
/// the decoded length of string `i`.
pub trait StrArrayCodec: Send + Sync {
    fn decode_array(&self, path: &Path, n: usize, lengths: &[u32]) -> Result<Vec<Vec<u8>>>;
    fn encode_array(&self, items: &[Vec<u8>], path: &Path) -> Result<()>;
}

/// Read-identifier coder. `modify_id` rewrites a mate-1 id into the
/// matching mate-2 id according to `paired_id_code`, whose semantics are
/// owned by the implementation.
pub trait IdCodec: Send + Sync {
    fn decode_block(&self, path: &Path, n: usize) -> Result<Vec<Vec<u8>>>;
    fn encode_block(&self, ids: &[Vec<u8>], path: &Path) -> Result<()>;
    fn modify_id(&self, id: &mut Vec<u8>, paired_id_code: u8) -> Result<()>;
}

/// Neural sequence decoder for reference shards. Returns the packed 2-bit
/// payload the shard was encoded from.
pub trait DeepCodec: Send + Sync {
    fn decode(&self, payload: &Path, gpu_id: u32) -> Result<Vec<u8>>;
}

/// The bundle of codec adapters a decode runs with.
#[derive(Clone)]
pub struct CodecSet {
    pub gen: Arc<dyn GenCodec>,
    pub str_array: Arc<dyn StrArrayCodec>,
    pub id: Arc<dyn IdCodec>,
    pub deep: Arc<dyn DeepCodec>,
}

impl CodecSet {
    /// All-in-process adapters (zstd-backed).
    pub fn in_process() -> Self {
        Self {
            gen: Arc::new(ZstdGenCodec),
            str_array: Arc::new(ZstdStrArrayCodec),
            id: Arc::new(ZstdIdCodec),
            deep: Arc::new(ZstdDeepCodec),
        }
    }

    /// Subprocess adapters for the archiver and (optionally) the neural
    /// decoder; the str-array and id coders stay in-process.
    pub fn subprocess(archiver: PathBuf, deep_decoder: Option<PathBuf>) -> Self {
        let deep: Arc<dyn DeepCodec> = match deep_decoder {
            Some(program) => Arc::new(SubprocessDeepCodec::new(program)),
            None => Arc::new(ZstdDeepCodec),
        };
        Self {
            gen: Arc::new(SubprocessGenCodec::new(archiver)),
            str_array: Arc::new(ZstdStrArrayCodec),
            id: Arc::new(ZstdIdCodec),
            deep,
        }
    }

    pub fn from_choice(choice: &CodecChoice) -> Self {
        match choice {
            CodecChoice::InProcess => Self::in_process(),
            CodecChoice::Subprocess { archiver, deep_decoder } => {
                Self::subprocess(archiver.clone(), deep_decoder.clone())
            }
        }
    }
}
