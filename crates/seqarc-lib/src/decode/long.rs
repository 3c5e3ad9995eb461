//! Long-read pipeline: no reference. Each block carries a length vector
//! and the reads themselves, decoded directly by the string-array codec.

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use super::artifacts::{ArtifactStore, GEN_SUFFIX};
use super::params::DecodeParams;
use super::{block_ids_and_qualities, carve, carve_opt, emit_step};
use crate::cli::DecompressConfig;
use crate::codec::CodecSet;
use crate::io::FastqSink;

struct LongJob<'a> {
    block_num: u64,
    base_index: usize,
    reads: &'a mut [Vec<u8>],
    lengths: &'a mut [u32],
    ids: &'a mut [Vec<u8>],
    quals: Option<&'a mut [Vec<u8>]>,
}

pub(super) fn decompress_long(
    config: &DecompressConfig,
    params: &DecodeParams,
    codecs: &CodecSet,
    num_threads: usize,
    start: u64,
    end: u64,
) -> Result<()> {
    let basedir = config.temp_dir.as_path();
    let block_size = params.num_reads_per_block_long as usize;
    let total = params.records_per_file();
    let paired = params.paired_end;

    let mut sink_1 = FastqSink::create(&config.out_1, config.gzip, config.gzip_level, num_threads)?;
    let mut sink_2 = if paired {
        let path = config
            .out_2
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("paired-end archive requires a second output file"))?;
        Some(FastqSink::create(path, config.gzip, config.gzip_level, num_threads)?)
    } else {
        if config.out_2.is_some() {
            warn!("archive is single-end; second output file ignored");
        }
        None
    };

    let num_reads_per_step = (num_threads * block_size).min(total as usize);
    let mut reads: Vec<Vec<u8>> = vec![Vec::new(); num_reads_per_step];
    let mut ids: Vec<Vec<u8>> = vec![Vec::new(); num_reads_per_step];
    let mut quals: Vec<Vec<u8>> = if params.preserve_quality {
        vec![Vec::new(); num_reads_per_step]
    } else {
        Vec::new()
    };
    let mut lengths = vec![0u32; num_reads_per_step];

    let first_blocks = start / block_size as u64;
    let mut num_blocks_done = first_blocks;
    let mut num_reads_done = first_blocks * block_size as u64;
    let mut done = false;

    while !done {
        let num_reads_cur_step = num_reads_per_step.min((total - num_reads_done) as usize);
        if num_reads_cur_step == 0 {
            break;
        }
        let num_blocks_cur_step = num_reads_cur_step.div_ceil(block_size);

        for j in 0..2 {
            if j == 1 && !paired {
                continue;
            }

            let quals_window: Option<&mut [Vec<u8>]> = if params.preserve_quality {
                Some(&mut quals[..num_reads_cur_step])
            } else {
                None
            };
            let jobs: Vec<LongJob> = carve(&mut reads[..num_reads_cur_step], block_size)
                .into_iter()
                .zip(carve(&mut lengths[..num_reads_cur_step], block_size))
                .zip(carve(&mut ids[..num_reads_cur_step], block_size))
                .zip(carve_opt(quals_window, block_size, num_blocks_cur_step))
                .enumerate()
                .map(|(tid, (((reads, lengths), ids), quals))| LongJob {
                    block_num: num_blocks_done + tid as u64,
                    base_index: tid * block_size,
                    reads,
                    lengths,
                    ids,
                    quals,
                })
                .collect();

            jobs.into_par_iter().try_for_each(|job| -> Result<()> {
                let n = job.reads.len();
                let block_num = job.block_num;

                // length vector for this block and mate
                let store = ArtifactStore::new(codecs.gen.as_ref(), basedir);
                let artifact = store.expand(
                    &format!("readlength_{}.{block_num}.{GEN_SUFFIX}", j + 1),
                    &format!("readlength_{}.{block_num}", j + 1),
                )?;
                let bytes = std::fs::read(&artifact.path)
                    .with_context(|| format!("failed to read length vector of block {block_num}"))?;
                if bytes.len() != n * 4 {
                    anyhow::bail!(
                        "length vector of block {block_num} holds {} bytes, expected {}",
                        bytes.len(),
                        n * 4
                    );
                }
                for (k, chunk) in bytes.chunks_exact(4).enumerate() {
                    job.lengths[k] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }

                // the reads themselves
                let path = basedir.join(format!("read_{}.{block_num}", j + 1));
                let decoded = codecs
                    .str_array
                    .decode_array(&path, n, job.lengths)
                    .with_context(|| format!("reads of block {block_num}"))?;
                for (slot, read) in job.reads.iter_mut().zip(decoded) {
                    *slot = read;
                }
                std::fs::remove_file(&path)
                    .with_context(|| format!("failed to remove consumed artifact {path:?}"))?;

                block_ids_and_qualities(
                    codecs,
                    basedir,
                    params,
                    block_num,
                    j,
                    n,
                    num_reads_done + job.base_index as u64,
                    job.lengths,
                    job.ids,
                    job.quals,
                )
            })?;

            let sink = if j == 0 {
                &mut sink_1
            } else {
                sink_2
                    .as_mut()
                    .ok_or_else(|| anyhow::anyhow!("mate-2 output sink missing"))?
            };
            done |= emit_step(
                sink,
                &ids,
                &reads,
                params.preserve_quality.then_some(quals.as_slice()),
                num_reads_done,
                num_reads_cur_step,
                num_blocks_done == first_blocks,
                start,
                end,
                block_size as u64,
            )?;
        }

        num_reads_done += num_reads_cur_step as u64;
        num_blocks_done += num_threads as u64;
    }

    sink_1.finish().context("failed to finish mate-1 output")?;
    if let Some(sink) = sink_2 {
        sink.finish().context("failed to finish mate-2 output")?;
    }
    info!("Wrote records [{start}, {end})");
    Ok(())
}
