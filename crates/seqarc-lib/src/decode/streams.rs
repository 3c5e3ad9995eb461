//! Typed readers over the per-block stream files.
//!
//! All streams of a block advance in lockstep with the flag stream; one
//! object owning every handle keeps the consumption order honest and
//! validates each field's alphabet at the read site.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::artifacts::ShortBlockFiles;

/// Delta-mode escape: a u16 diff of 0xFFFF announces an embedded
/// absolute u64 position.
pub(crate) const POS_RESET_SENTINEL: u16 = u16::MAX;

fn open(path: &Path) -> Result<BufReader<std::fs::File>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open stream file {path:?}"))?;
    Ok(BufReader::new(file))
}

fn read_array<const N: usize>(
    reader: &mut BufReader<std::fs::File>,
    what: &str,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .with_context(|| format!("unexpected end of {what} stream"))?;
    Ok(buf)
}

fn read_char(reader: &mut BufReader<std::fs::File>, what: &str) -> Result<u8> {
    Ok(read_array::<1>(reader, what)?[0])
}

/// One block's stream handles, short mode.
pub(crate) struct BlockStreams {
    _files: ShortBlockFiles,
    flag: BufReader<std::fs::File>,
    pos: BufReader<std::fs::File>,
    noise: BufReader<std::fs::File>,
    noisepos: BufReader<std::fs::File>,
    rc: BufReader<std::fs::File>,
    unaligned: BufReader<std::fs::File>,
    lengths: BufReader<std::fs::File>,
    pos_pair: Option<BufReader<std::fs::File>>,
    rc_pair: Option<BufReader<std::fs::File>>,
}

impl BlockStreams {
    pub fn open(files: ShortBlockFiles) -> Result<Self> {
        Ok(Self {
            flag: open(&files.flag.path)?,
            pos: open(&files.pos.path)?,
            noise: open(&files.noise.path)?,
            noisepos: open(&files.noisepos.path)?,
            rc: open(&files.rc.path)?,
            unaligned: open(&files.unaligned.path)?,
            lengths: open(&files.lengths.path)?,
            pos_pair: files
                .pos_pair
                .as_ref()
                .map(|f| open(&f.path))
                .transpose()?,
            rc_pair: files.rc_pair.as_ref().map(|f| open(&f.path)).transpose()?,
            _files: files,
        })
    }

    pub fn next_flag(&mut self) -> Result<u8> {
        let flag = read_char(&mut self.flag, "flag")?;
        if !(b'1'..=b'4').contains(&flag) {
            anyhow::bail!("invalid flag character {:?}", flag as char);
        }
        Ok(flag)
    }

    pub fn next_length(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(&mut self.lengths, "read-length")?))
    }

    pub fn next_pos_absolute(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(read_array(&mut self.pos, "position")?))
    }

    pub fn next_pos_delta(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(&mut self.pos, "position")?))
    }

    pub fn next_orientation(&mut self) -> Result<u8> {
        let rc = read_char(&mut self.rc, "orientation")?;
        if rc != b'd' && rc != b'r' {
            anyhow::bail!("invalid orientation character {:?}", rc as char);
        }
        Ok(rc)
    }

    /// One newline-terminated noise record; its length is the number of
    /// substitution sites in the read. An empty line is a clean read.
    pub fn next_noise_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let n = self
            .noise
            .read_until(b'\n', &mut line)
            .context("failed to read noise stream")?;
        if n == 0 {
            anyhow::bail!("unexpected end of noise stream");
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        for &code in &line {
            if !(b'0'..=b'3').contains(&code) {
                anyhow::bail!("invalid noise code {:?}", code as char);
            }
        }
        Ok(line)
    }

    pub fn next_noise_offset(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(
            &mut self.noisepos,
            "noise-position",
        )?))
    }

    /// Exactly `len` raw bytes of a verbatim-encoded read.
    pub fn read_unaligned(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut read = vec![0u8; len];
        self.unaligned
            .read_exact(&mut read)
            .context("unexpected end of unaligned stream")?;
        Ok(read)
    }

    pub fn next_pair_delta(&mut self) -> Result<i16> {
        let reader = self
            .pos_pair
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("pair-position stream absent in single-end block"))?;
        Ok(i16::from_le_bytes(read_array(reader, "pair-position")?))
    }

    pub fn next_pair_orientation(&mut self) -> Result<u8> {
        let reader = self
            .rc_pair
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("pair-orientation stream absent in single-end block"))?;
        let rel = read_char(reader, "pair-orientation")?;
        if rel != b'0' && rel != b'1' {
            anyhow::bail!("invalid relative orientation character {:?}", rel as char);
        }
        Ok(rel)
    }
}
