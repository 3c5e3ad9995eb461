//! Archive decode parameters, stored beside the per-block artifacts as a
//! fixed-layout little-endian `params.bin`.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;

const PARAMS_MAGIC: [u8; 2] = *b"SA";
const PARAMS_VERSION: u8 = 1;
/// magic(2) + version(1) + four u32 fields + seven flag/code bytes
const PARAMS_SIZE: usize = 3 + 4 * 4 + 7;

/// File name of the parameter block inside the temp directory.
pub const PARAMS_FILE: &str = "params.bin";

/// Read-only configuration recorded at compression time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeParams {
    /// Total reads in the archive (pairs count double)
    pub num_reads: u32,
    /// Reads per block, short mode
    pub num_reads_per_block: u32,
    /// Reads per block, long mode
    pub num_reads_per_block_long: u32,
    /// Number of reference shards fixed at compression time
    pub num_thr_encode: u32,
    /// Long-read pipeline (no reference) instead of short-read
    pub long_mode: bool,
    pub paired_end: bool,
    pub preserve_id: bool,
    pub preserve_quality: bool,
    pub preserve_order: bool,
    /// Mate-2 ids derivable from mate-1 via `paired_id_code`
    pub paired_id_match: bool,
    /// Opaque pairing-convention byte, surfaced verbatim to the id codec
    pub paired_id_code: u8,
}

impl DecodeParams {
    /// Records per output file: pairs for paired-end, reads otherwise.
    pub fn records_per_file(&self) -> u64 {
        if self.paired_end {
            self.num_reads as u64 / 2
        } else {
            self.num_reads as u64
        }
    }

    pub fn load(temp_dir: &Path) -> Result<Self> {
        let path = temp_dir.join(PARAMS_FILE);
        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open parameter block {path:?}"))?;
        let mut buf = [0u8; PARAMS_SIZE];
        file.read_exact(&mut buf)
            .with_context(|| format!("truncated parameter block {path:?}"))?;
        Self::parse(&buf).with_context(|| format!("invalid parameter block {path:?}"))
    }

    fn parse(buf: &[u8; PARAMS_SIZE]) -> Result<Self> {
        if buf[0..2] != PARAMS_MAGIC {
            anyhow::bail!("missing magic bytes");
        }
        if buf[2] != PARAMS_VERSION {
            anyhow::bail!("unsupported version {}", buf[2]);
        }
        let u32_at =
            |off: usize| u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        let flag_at = |off: usize| -> Result<bool> {
            match buf[off] {
                0 => Ok(false),
                1 => Ok(true),
                v => anyhow::bail!("flag byte at offset {off} holds {v}"),
            }
        };
        let params = Self {
            num_reads: u32_at(3),
            num_reads_per_block: u32_at(7),
            num_reads_per_block_long: u32_at(11),
            num_thr_encode: u32_at(15),
            long_mode: flag_at(19)?,
            paired_end: flag_at(20)?,
            preserve_id: flag_at(21)?,
            preserve_quality: flag_at(22)?,
            preserve_order: flag_at(23)?,
            paired_id_match: flag_at(24)?,
            paired_id_code: buf[25],
        };
        if params.num_reads_per_block == 0 || params.num_reads_per_block_long == 0 {
            anyhow::bail!("zero block size");
        }
        if params.paired_end && params.num_reads % 2 != 0 {
            anyhow::bail!("paired-end archive with odd read count {}", params.num_reads);
        }
        Ok(params)
    }

    pub fn store(&self, temp_dir: &Path) -> Result<()> {
        let path = temp_dir.join(PARAMS_FILE);
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create parameter block {path:?}"))?;
        let mut buf = Vec::with_capacity(PARAMS_SIZE);
        buf.extend_from_slice(&PARAMS_MAGIC);
        buf.push(PARAMS_VERSION);
        buf.extend_from_slice(&self.num_reads.to_le_bytes());
        buf.extend_from_slice(&self.num_reads_per_block.to_le_bytes());
        buf.extend_from_slice(&self.num_reads_per_block_long.to_le_bytes());
        buf.extend_from_slice(&self.num_thr_encode.to_le_bytes());
        for flag in [
            self.long_mode,
            self.paired_end,
            self.preserve_id,
            self.preserve_quality,
            self.preserve_order,
            self.paired_id_match,
        ] {
            buf.push(flag as u8);
        }
        buf.push(self.paired_id_code);
        file.write_all(&buf)
            .with_context(|| format!("failed to write parameter block {path:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> DecodeParams {
        DecodeParams {
            num_reads: 1000,
            num_reads_per_block: 256,
            num_reads_per_block_long: 64,
            num_thr_encode: 4,
            long_mode: false,
            paired_end: true,
            preserve_id: true,
            preserve_quality: true,
            preserve_order: false,
            paired_id_match: true,
            paired_id_code: 1,
        }
    }

    #[test]
    fn test_params_roundtrip() {
        let dir = TempDir::new().unwrap();
        let params = sample();
        params.store(dir.path()).unwrap();
        assert_eq!(DecodeParams::load(dir.path()).unwrap(), params);
    }

    #[test]
    fn test_records_per_file() {
        let mut params = sample();
        assert_eq!(params.records_per_file(), 500);
        params.paired_end = false;
        assert_eq!(params.records_per_file(), 1000);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        sample().store(dir.path()).unwrap();
        let path = dir.path().join(PARAMS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'X';
        std::fs::write(&path, bytes).unwrap();
        assert!(DecodeParams::load(dir.path()).is_err());
    }

    #[test]
    fn test_rejects_odd_paired_count() {
        let dir = TempDir::new().unwrap();
        let mut params = sample();
        params.num_reads = 7;
        params.store(dir.path()).unwrap();
        assert!(DecodeParams::load(dir.path()).is_err());
    }
}
