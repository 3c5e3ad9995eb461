//! Per-read reconstruction: re-materializes each read from the shared
//! reference plus the positional, orientation, and noise streams.

use anyhow::Result;

use super::dna::reverse_complement;
use super::streams::{BlockStreams, POS_RESET_SENTINEL};

/// Noise substitution: a noise record always changes the reference base.
/// Codes '0'..'2' select the three other standard bases, '3' selects N;
/// for an N reference base the codes map to A, G, C, T in order.
pub(crate) fn substitute_noise(base: u8, code: u8) -> Result<u8> {
    let out = match (base, code) {
        (b'A', b'0') => b'C',
        (b'A', b'1') => b'G',
        (b'A', b'2') => b'T',
        (b'A', b'3') => b'N',
        (b'C', b'0') => b'A',
        (b'C', b'1') => b'G',
        (b'C', b'2') => b'T',
        (b'C', b'3') => b'N',
        (b'G', b'0') => b'T',
        (b'G', b'1') => b'A',
        (b'G', b'2') => b'C',
        (b'G', b'3') => b'N',
        (b'T', b'0') => b'G',
        (b'T', b'1') => b'C',
        (b'T', b'2') => b'A',
        (b'T', b'3') => b'N',
        (b'N', b'0') => b'A',
        (b'N', b'1') => b'G',
        (b'N', b'2') => b'C',
        (b'N', b'3') => b'T',
        _ => anyhow::bail!(
            "no noise substitution for base {:?} code {:?}",
            base as char,
            code as char
        ),
    };
    Ok(out)
}

/// Mate-2 orientation from mate-1's when the pair is relatively encoded:
/// '0' flips, '1' keeps.
pub(crate) fn relative_orientation(rc_1: u8, rel: u8) -> u8 {
    if rel == b'0' {
        if rc_1 == b'd' {
            b'r'
        } else {
            b'd'
        }
    } else {
        rc_1
    }
}

/// Decodes the records of a single block. Position state (`prev_pos` for
/// delta decoding) never crosses block boundaries.
pub(crate) struct BlockReconstructor<'a> {
    seq: &'a [u8],
    preserve_order: bool,
    paired_end: bool,
    prev_pos: Option<u64>,
}

impl<'a> BlockReconstructor<'a> {
    pub fn new(seq: &'a [u8], preserve_order: bool, paired_end: bool) -> Self {
        Self {
            seq,
            preserve_order,
            paired_end,
            prev_pos: None,
        }
    }

    /// Decode `n` records, filling the first `n` entries of the read and
    /// length slices (both mates for paired-end archives).
    pub fn run(
        mut self,
        streams: &mut BlockStreams,
        n: usize,
        reads_1: &mut [Vec<u8>],
        lengths_1: &mut [u32],
        mut reads_2: Option<&mut [Vec<u8>]>,
        mut lengths_2: Option<&mut [u32]>,
    ) -> Result<()> {
        for i in 0..n {
            let flag = streams.next_flag()?;
            let len_1 = streams.next_length()? as usize;
            lengths_1[i] = len_1 as u32;

            let singleton_1 = flag == b'2' || flag == b'4';
            let mut mate_1: Option<(u64, u8)> = None;
            if !singleton_1 {
                let pos_1 = self.next_mate1_pos(streams)?;
                let rc_1 = streams.next_orientation()?;
                reads_1[i] = self.materialize(streams, pos_1, len_1, rc_1)?;
                mate_1 = Some((pos_1, rc_1));
            } else {
                reads_1[i] = streams.read_unaligned(len_1)?;
            }

            if self.paired_end {
                let (reads_2, lengths_2) =
                    match (reads_2.as_deref_mut(), lengths_2.as_deref_mut()) {
                        (Some(r), Some(l)) => (r, l),
                        _ => anyhow::bail!("paired-end decode requires mate-2 buffers"),
                    };
                let len_2 = streams.next_length()? as usize;
                lengths_2[i] = len_2 as u32;

                let singleton_2 = flag == b'2' || flag == b'3';
                if !singleton_2 {
                    let (pos_2, rc_2) = if flag == b'1' || flag == b'4' {
                        // mates encoded independently
                        (streams.next_pos_absolute()?, streams.next_orientation()?)
                    } else {
                        // mate 2 encoded in terms of mate 1
                        let (pos_1, rc_1) = mate_1.ok_or_else(|| {
                            anyhow::anyhow!("relatively encoded mate-2 without an aligned mate-1")
                        })?;
                        Self::relative_mate2(streams, pos_1, rc_1)?
                    };
                    reads_2[i] = self.materialize(streams, pos_2, len_2, rc_2)?;
                } else {
                    reads_2[i] = streams.read_unaligned(len_2)?;
                }
            }
        }
        Ok(())
    }

    /// Position and orientation of a relatively encoded mate-2: an i16
    /// delta against mate-1's position and a flip/keep orientation bit.
    /// The flag alphabet routes every non-singleton mate-2 through the
    /// independent branch, so `run` reaches this only for flag values the
    /// compressor reserves for relative encoding; the decoder keeps the
    /// arm and trusts the emission.
    fn relative_mate2(streams: &mut BlockStreams, pos_1: u64, rc_1: u8) -> Result<(u64, u8)> {
        let delta = streams.next_pair_delta()?;
        let pos_2 = pos_1
            .checked_add_signed(delta as i64)
            .ok_or_else(|| anyhow::anyhow!("pair delta {delta} underflows position {pos_1}"))?;
        let rel = streams.next_pair_orientation()?;
        Ok((pos_2, relative_orientation(rc_1, rel)))
    }

    /// Mate-1 position: raw u64 in order-preserving mode; otherwise a u16
    /// delta against the previous aligned read, with 0xFFFF escaping to an
    /// embedded absolute reset. The first aligned mate-1 of the block is
    /// always absolute, wherever it occurs.
    fn next_mate1_pos(&mut self, streams: &mut BlockStreams) -> Result<u64> {
        if self.preserve_order {
            return streams.next_pos_absolute();
        }
        let pos = match self.prev_pos {
            None => streams.next_pos_absolute()?,
            Some(prev) => {
                let diff = streams.next_pos_delta()?;
                if diff == POS_RESET_SENTINEL {
                    streams.next_pos_absolute()?
                } else {
                    prev + diff as u64
                }
            }
        };
        self.prev_pos = Some(pos);
        Ok(pos)
    }

    /// Copy `len` bases at `pos` from the reference, apply this mate's
    /// noise record, and orient the result.
    fn materialize(
        &self,
        streams: &mut BlockStreams,
        pos: u64,
        len: usize,
        rc: u8,
    ) -> Result<Vec<u8>> {
        let start = usize::try_from(pos)
            .map_err(|_| anyhow::anyhow!("position {pos} exceeds the address space"))?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.seq.len())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "read at position {pos} with length {len} overruns the reference ({} bases)",
                    self.seq.len()
                )
            })?;
        let mut read = self.seq[start..end].to_vec();

        let noise = streams.next_noise_line()?;
        let mut prev_site = 0usize;
        for &code in &noise {
            let site = prev_site + streams.next_noise_offset()? as usize;
            let base = read.get_mut(site).ok_or_else(|| {
                anyhow::anyhow!("noise site {site} outside read of length {len}")
            })?;
            *base = substitute_noise(*base, code)?;
            prev_site = site;
        }

        if rc == b'r' {
            read = reverse_complement(&read);
        }
        Ok(read)
    }
}
