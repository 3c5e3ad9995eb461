//! Short-read pipeline: a rolling window of `T` blocks per step, each
//! block reconstructed against the shared reference by one worker, with
//! ordered emission after the join.

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use super::artifacts::ArtifactStore;
use super::params::DecodeParams;
use super::reconstruct::BlockReconstructor;
use super::streams::BlockStreams;
use super::{block_ids_and_qualities, carve, carve_opt, emit_step};
use crate::cli::DecompressConfig;
use crate::codec::CodecSet;
use crate::io::FastqSink;

/// One block's slice of the step arrays, sequence-decode pass. Workers
/// own disjoint index ranges, so the join needs no merge step.
struct ReadJob<'a> {
    block_num: u64,
    base_index: usize,
    reads_1: &'a mut [Vec<u8>],
    lengths_1: &'a mut [u32],
    reads_2: Option<&'a mut [Vec<u8>]>,
    lengths_2: Option<&'a mut [u32]>,
    ids: &'a mut [Vec<u8>],
    quals: Option<&'a mut [Vec<u8>]>,
}

/// One block's slice of the step arrays, mate-2 id/quality pass.
struct MateJob<'a> {
    block_num: u64,
    base_index: usize,
    lengths: &'a [u32],
    ids: &'a mut [Vec<u8>],
    quals: Option<&'a mut [Vec<u8>]>,
}

#[allow(clippy::too_many_arguments)]
pub(super) fn decompress_short(
    config: &DecompressConfig,
    params: &DecodeParams,
    codecs: &CodecSet,
    seq: &[u8],
    num_threads: usize,
    start: u64,
    end: u64,
) -> Result<()> {
    let basedir = config.temp_dir.as_path();
    let block_size = params.num_reads_per_block as usize;
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
    let mut reads_1: Vec<Vec<u8>> = vec![Vec::new(); num_reads_per_step];
    let mut reads_2: Vec<Vec<u8>> = if paired {
        vec![Vec::new(); num_reads_per_step]
    } else {
        Vec::new()
    };
    let mut ids: Vec<Vec<u8>> = vec![Vec::new(); num_reads_per_step];
    let mut quals: Vec<Vec<u8>> = if params.preserve_quality {
        vec![Vec::new(); num_reads_per_step]
    } else {
        Vec::new()
    };
    let mut lengths_1 = vec![0u32; num_reads_per_step];
    let mut lengths_2 = vec![0u32; if paired { num_reads_per_step } else { 0 }];

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

            if j == 0 {
                // Sequences for BOTH mates are decoded on this pass, plus
                // mate-1 ids and qualities.
                let quals_window: Option<&mut [Vec<u8>]> = if params.preserve_quality {
                    Some(&mut quals[..num_reads_cur_step])
                } else {
                    None
                };
                let reads_2_window: Option<&mut [Vec<u8>]> = if paired {
                    Some(&mut reads_2[..num_reads_cur_step])
                } else {
                    None
                };
                let lengths_2_window: Option<&mut [u32]> = if paired {
                    Some(&mut lengths_2[..num_reads_cur_step])
                } else {
                    None
                };

                let jobs: Vec<ReadJob> = carve(&mut reads_1[..num_reads_cur_step], block_size)
                    .into_iter()
                    .zip(carve(&mut lengths_1[..num_reads_cur_step], block_size))
                    .zip(carve(&mut ids[..num_reads_cur_step], block_size))
                    .zip(carve_opt(quals_window, block_size, num_blocks_cur_step))
                    .zip(carve_opt(reads_2_window, block_size, num_blocks_cur_step))
                    .zip(carve_opt(lengths_2_window, block_size, num_blocks_cur_step))
                    .enumerate()
                    .map(
                        |(tid, (((((reads_1, lengths_1), ids), quals), reads_2), lengths_2))| {
                            ReadJob {
                                block_num: num_blocks_done + tid as u64,
                                base_index: tid * block_size,
                                reads_1,
                                lengths_1,
                                reads_2,
                                lengths_2,
                                ids,
                                quals,
                            }
                        },
                    )
                    .collect();

                jobs.into_par_iter().try_for_each(|job| -> Result<()> {
                    let n = job.reads_1.len();
                    let store = ArtifactStore::new(codecs.gen.as_ref(), basedir);
                    let files = store.expand_short_block(job.block_num, paired)?;
                    let mut streams = BlockStreams::open(files)?;
                    BlockReconstructor::new(seq, params.preserve_order, paired)
                        .run(
                            &mut streams,
                            n,
                            job.reads_1,
                            job.lengths_1,
                            job.reads_2,
                            job.lengths_2,
                        )
                        .with_context(|| format!("reconstructing block {}", job.block_num))?;
                    block_ids_and_qualities(
                        codecs,
                        basedir,
                        params,
                        job.block_num,
                        0,
                        n,
                        num_reads_done + job.base_index as u64,
                        job.lengths_1,
                        job.ids,
                        job.quals,
                    )
                })?;
            } else {
                // Mate-2 ids and qualities; sequences were already decoded.
                let quals_window: Option<&mut [Vec<u8>]> = if params.preserve_quality {
                    Some(&mut quals[..num_reads_cur_step])
                } else {
                    None
                };

                let jobs: Vec<MateJob> = carve(&mut ids[..num_reads_cur_step], block_size)
                    .into_iter()
                    .zip(carve_opt(quals_window, block_size, num_blocks_cur_step))
                    .zip(carve(&mut lengths_2[..num_reads_cur_step], block_size))
                    .enumerate()
                    .map(|(tid, ((ids, quals), lengths))| MateJob {
                        block_num: num_blocks_done + tid as u64,
                        base_index: tid * block_size,
                        lengths,
                        ids,
                        quals,
                    })
                    .collect();

                jobs.into_par_iter().try_for_each(|job| -> Result<()> {
                    block_ids_and_qualities(
                        codecs,
                        basedir,
                        params,
                        job.block_num,
                        1,
                        job.ids.len(),
                        num_reads_done + job.base_index as u64,
                        job.lengths,
                        job.ids,
                        job.quals,
                    )
                })?;
            }

            let step_done = if j == 0 {
                emit_step(
                    &mut sink_1,
                    &ids,
                    &reads_1,
                    params.preserve_quality.then_some(quals.as_slice()),
                    num_reads_done,
                    num_reads_cur_step,
                    num_blocks_done == first_blocks,
                    start,
                    end,
                    block_size as u64,
                )?
            } else {
                let sink = sink_2
                    .as_mut()
                    .ok_or_else(|| anyhow::anyhow!("mate-2 output sink missing"))?;
                emit_step(
                    sink,
                    &ids,
                    &reads_2,
                    params.preserve_quality.then_some(quals.as_slice()),
                    num_reads_done,
                    num_reads_cur_step,
                    num_blocks_done == first_blocks,
                    start,
                    end,
                    block_size as u64,
                )?
            };
            done |= step_done;
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
