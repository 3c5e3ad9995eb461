//! Block-ordered FASTQ output: plain buffered or parallel-gzip sinks.

use anyhow::{Context, Result};
use gzp::deflate::Gzip;
use gzp::par::compress::{ParCompress, ParCompressBuilder};
use gzp::{Compression, ZWriter};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output buffer flush threshold while assembling a block.
const WRITE_BATCH: usize = 2 * 1024 * 1024;

/// I/O buffer size for plain (non-gzip) output files.
const IO_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Destination for decoded reads. Records are written as 4-line FASTQ
/// when qualities are present and as 2-line `id`/`sequence` records when
/// the archive did not preserve them. Writes are strictly sequential;
/// gzip output is parallel-compressed internally by `gzp`.
pub enum FastqSink {
    Plain(BufWriter<std::fs::File>),
    Gzip(ParCompress<Gzip>),
}

impl FastqSink {
    pub fn create(path: &Path, gzip: bool, gzip_level: u32, num_threads: usize) -> Result<Self> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create output file {path:?}"))?;
        if gzip {
            let num_gz_threads = (num_threads / 2).max(2);
            let writer: ParCompress<Gzip> = ParCompressBuilder::new()
                .num_threads(num_gz_threads)
                .map_err(|e| anyhow::anyhow!("gzp error: {e}"))?
                .compression_level(Compression::new(gzip_level))
                .from_writer(file);
            Ok(FastqSink::Gzip(writer))
        } else {
            Ok(FastqSink::Plain(BufWriter::with_capacity(IO_BUFFER_SIZE, file)))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            FastqSink::Plain(w) => w,
            FastqSink::Gzip(w) => w,
        }
    }

    /// Write one contiguous block of records. `qualities` is `None` when
    /// the archive did not preserve quality values.
    pub fn write_block(
        &mut self,
        ids: &[Vec<u8>],
        reads: &[Vec<u8>],
        qualities: Option<&[Vec<u8>]>,
    ) -> Result<()> {
        debug_assert_eq!(ids.len(), reads.len());
        let out = self.writer();
        let mut buf = Vec::with_capacity(WRITE_BATCH + 1024);
        for (i, (id, read)) in ids.iter().zip(reads.iter()).enumerate() {
            buf.extend_from_slice(id);
            buf.push(b'\n');
            buf.extend_from_slice(read);
            buf.push(b'\n');
            if let Some(quals) = qualities {
                buf.extend_from_slice(b"+\n");
                buf.extend_from_slice(&quals[i]);
                buf.push(b'\n');
            }
            if buf.len() >= WRITE_BATCH {
                out.write_all(&buf)?;
                buf.clear();
            }
        }
        if !buf.is_empty() {
            out.write_all(&buf)?;
        }
        Ok(())
    }

    /// Flush and close the sink. Must be called once; gzip output is
    /// truncated otherwise.
    pub fn finish(self) -> Result<()> {
        match self {
            FastqSink::Plain(mut w) => w.flush().context("failed to flush output file"),
            FastqSink::Gzip(mut w) => w
                .finish()
                .map_err(|e| anyhow::anyhow!("gzp finish error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_block_with_quality() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.fastq");
        let mut sink = FastqSink::create(&path, false, 6, 1).unwrap();
        let ids = vec![b"@r1".to_vec(), b"@r2".to_vec()];
        let reads = vec![b"ACGT".to_vec(), b"TTTT".to_vec()];
        let quals = vec![b"IIII".to_vec(), b"JJJJ".to_vec()];
        sink.write_block(&ids, &reads, Some(&quals)).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nJJJJ\n");
    }

    #[test]
    fn test_write_block_without_quality() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.fastq");
        let mut sink = FastqSink::create(&path, false, 6, 1).unwrap();
        let ids = vec![b"@r1".to_vec()];
        let reads = vec![b"ACGT".to_vec()];
        sink.write_block(&ids, &reads, None).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "@r1\nACGT\n");
    }

    #[test]
    fn test_gzip_output_readable() {
        use std::io::Read;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.fastq.gz");
        let mut sink = FastqSink::create(&path, true, 6, 2).unwrap();
        let ids = vec![b"@r1".to_vec()];
        let reads = vec![b"ACGTACGT".to_vec()];
        let quals = vec![b"IIIIIIII".to_vec()];
        sink.write_block(&ids, &reads, Some(&quals)).unwrap();
        sink.finish().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let mut decoder = flate2::read::MultiGzDecoder::new(file);
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "@r1\nACGTACGT\n+\nIIIIIIII\n");
    }
}
