//! Block-parallel decompression pipelines.

mod artifacts;
mod dna;
mod long;
mod params;
mod reconstruct;
mod reference;
mod short;
mod streams;

pub use dna::reverse_complement;
pub use params::{DecodeParams, PARAMS_FILE};

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::cli::DecompressConfig;
use crate::codec::CodecSet;
use crate::io::FastqSink;

/// Decompress the archive in `config.temp_dir`, loading the parameter
/// block from the temp directory.
pub fn decompress(config: &DecompressConfig) -> Result<()> {
    let params = DecodeParams::load(&config.temp_dir)?;
    decompress_with_params(config, &params)
}

/// Entry point for callers that already hold the parameter block.
pub fn decompress_with_params(config: &DecompressConfig, params: &DecodeParams) -> Result<()> {
    let start_time = Instant::now();

    let total = params.records_per_file();
    let start = config.start;
    let end = config.end.unwrap_or(total);
    if start > end || end > total {
        anyhow::bail!("invalid record range [{start}, {end}) for {total} records");
    }
    let num_threads = if config.num_threads == 0 {
        crate::cli::num_cpus()
    } else {
        config.num_threads
    };
    let codecs = CodecSet::from_choice(&config.codecs);

    info!(
        "Decompressing records [{start}, {end}) of {total} with {num_threads} threads ({} mode)",
        if params.long_mode { "long" } else { "short" }
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .context("failed to build worker pool")?;

    pool.install(|| {
        if params.long_mode {
            long::decompress_long(config, params, &codecs, num_threads, start, end)
        } else {
            let seq = reference::unpack_reference(
                &config.temp_dir,
                params.num_thr_encode as usize,
                config.deep,
                config.gpu_id,
                &codecs,
            )?;
            short::decompress_short(config, params, &codecs, &seq, num_threads, start, end)
        }
    })?;

    info!(
        "Decompression completed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Split a slice into consecutive chunks of at most `chunk` elements,
/// as independently borrowable mutable slices.
fn carve<T>(mut slice: &mut [T], chunk: usize) -> Vec<&mut [T]> {
    let mut out = Vec::with_capacity(slice.len().div_ceil(chunk.max(1)));
    while !slice.is_empty() {
        let take = chunk.min(slice.len());
        let (head, rest) = slice.split_at_mut(take);
        out.push(head);
        slice = rest;
    }
    out
}

/// Like [`carve`], for arrays that exist only in some configurations.
/// Yields `num_chunks` `None`s when the array is absent.
fn carve_opt<T>(
    slice: Option<&mut [T]>,
    chunk: usize,
    num_chunks: usize,
) -> Vec<Option<&mut [T]>> {
    match slice {
        Some(slice) => carve(slice, chunk).into_iter().map(Some).collect(),
        None => (0..num_chunks).map(|_| None).collect(),
    }
}

/// Decode or synthesize the ids and qualities of one block for mate `j`.
/// Mate-2 ids under `paired_id_match` are rewritten in place from the
/// mate-1 ids already in the array.
#[allow(clippy::too_many_arguments)]
fn block_ids_and_qualities(
    codecs: &CodecSet,
    basedir: &Path,
    params: &DecodeParams,
    block_num: u64,
    j: usize,
    n: usize,
    base_global: u64,
    lengths: &[u32],
    ids: &mut [Vec<u8>],
    quals: Option<&mut [Vec<u8>]>,
) -> Result<()> {
    if let Some(quals) = quals {
        let path = basedir.join(format!("quality_{}.{}", j + 1, block_num));
        let decoded = codecs
            .str_array
            .decode_array(&path, n, lengths)
            .with_context(|| format!("qualities of block {block_num}"))?;
        for (slot, q) in quals.iter_mut().zip(decoded) {
            *slot = q;
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove consumed artifact {path:?}"))?;
    }

    if !params.preserve_id {
        for (k, id) in ids.iter_mut().enumerate().take(n) {
            *id = format!("@{}/{}", base_global + k as u64 + 1, j + 1).into_bytes();
        }
    } else if j == 1 && params.paired_id_match {
        for id in ids.iter_mut().take(n) {
            codecs.id.modify_id(id, params.paired_id_code)?;
        }
    } else {
        let path = basedir.join(format!("id_{}.{}", j + 1, block_num));
        let decoded = codecs
            .id
            .decode_block(&path, n)
            .with_context(|| format!("ids of block {block_num}"))?;
        for (slot, id) in ids.iter_mut().zip(decoded) {
            *slot = id;
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove consumed artifact {path:?}"))?;
    }
    Ok(())
}

/// Emit one step's records for one output file, honoring the `[start,
/// end)` window: the first step trims `start % block_size` records off
/// the head, and a step reaching `end` clamps its tail. Returns true
/// when the range is exhausted.
#[allow(clippy::too_many_arguments)]
fn emit_step(
    sink: &mut FastqSink,
    ids: &[Vec<u8>],
    reads: &[Vec<u8>],
    quals: Option<&[Vec<u8>]>,
    num_reads_done: u64,
    num_reads_cur_step: usize,
    is_first_step: bool,
    start: u64,
    end: u64,
    block_size: u64,
) -> Result<bool> {
    let mut out_n = num_reads_cur_step;
    let mut done = false;
    if num_reads_done + out_n as u64 >= end {
        out_n = (end - num_reads_done) as usize;
        done = true;
    }
    let shift = if is_first_step {
        (start % block_size) as usize
    } else {
        0
    };
    if out_n > shift {
        sink.write_block(
            &ids[shift..out_n],
            &reads[shift..out_n],
            quals.map(|q| &q[shift..out_n]),
        )?;
    }
    Ok(done)
}
