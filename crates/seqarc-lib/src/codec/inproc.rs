//! In-process codec adapters backed by `zstd::bulk`.
//!
//! Archive entry format for [`ZstdGenCodec`]:
//! `[name_len: u16 LE][name bytes][payload_len: u64 LE][zstd payload]`,
//! repeated per entry. The other adapters compress a single bare payload.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use super::{DeepCodec, GenCodec, IdCodec, StrArrayCodec};

const ZSTD_LEVEL: i32 = 3;

/// Decompressed artifacts are per-block scratch files; this bounds a
/// single entry against corrupt length fields.
const MAX_ENTRY_SIZE: usize = 1 << 32;

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::bulk::compress(data, ZSTD_LEVEL)
        .map_err(|e| anyhow::anyhow!("zstd compression failed: {e}"))
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::bulk::decompress(data, MAX_ENTRY_SIZE)
        .map_err(|e| anyhow::anyhow!("zstd decompression failed: {e}"))
}

pub struct ZstdGenCodec;

impl GenCodec for ZstdGenCodec {
    fn decode(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let data = std::fs::read(archive)
            .with_context(|| format!("failed to open artifact archive {archive:?}"))?;
        let mut offset = 0usize;
        while offset < data.len() {
            let name_len = data
                .get(offset..offset + 2)
                .and_then(|s| <[u8; 2]>::try_from(s).ok())
                .map(u16::from_le_bytes)
                .ok_or_else(|| anyhow::anyhow!("truncated entry header in {archive:?}"))?
                as usize;
            offset += 2;
            let name_bytes = data
                .get(offset..offset + name_len)
                .ok_or_else(|| anyhow::anyhow!("truncated entry name in {archive:?}"))?;
            let name = std::str::from_utf8(name_bytes)
                .with_context(|| format!("non-UTF-8 entry name in {archive:?}"))?;
            if name.contains('/') || name.contains('\\') || name == ".." {
                anyhow::bail!("unsafe entry name {name:?} in {archive:?}");
            }
            offset += name_len;
            let payload_len = data
                .get(offset..offset + 8)
                .and_then(|s| <[u8; 8]>::try_from(s).ok())
                .map(u64::from_le_bytes)
                .ok_or_else(|| anyhow::anyhow!("truncated payload length in {archive:?}"))?
                as usize;
            offset += 8;
            let payload = data
                .get(offset..offset + payload_len)
                .ok_or_else(|| anyhow::anyhow!("truncated payload in {archive:?}"))?;
            offset += payload_len;
            let raw = decompress(payload)
                .with_context(|| format!("entry {name:?} in {archive:?}"))?;
            std::fs::write(dest_dir.join(name), raw)
                .with_context(|| format!("failed to write decoded entry {name:?}"))?;
        }
        Ok(())
    }

    fn encode(&self, src: &Path, archive: &Path) -> Result<()> {
        let name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("source {src:?} has no usable file name"))?;
        let raw = std::fs::read(src)
            .with_context(|| format!("failed to read {src:?}"))?;
        let payload = compress(&raw)?;
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(archive)
                .with_context(|| format!("failed to create archive {archive:?}"))?,
        );
        out.write_all(&(name.len() as u16).to_le_bytes())?;
        out.write_all(name.as_bytes())?;
        out.write_all(&(payload.len() as u64).to_le_bytes())?;
        out.write_all(&payload)?;
        out.flush()?;
        Ok(())
    }
}

pub struct ZstdStrArrayCodec;

impl StrArrayCodec for ZstdStrArrayCodec {
    fn decode_array(&self, path: &Path, n: usize, lengths: &[u32]) -> Result<Vec<Vec<u8>>> {
        if lengths.len() < n {
            anyhow::bail!("length array too short: {} entries for {} strings", lengths.len(), n);
        }
        let data = std::fs::read(path)
            .with_context(|| format!("failed to open string-array artifact {path:?}"))?;
        let raw = decompress(&data).with_context(|| format!("artifact {path:?}"))?;
        let expected: usize = lengths[..n].iter().map(|&l| l as usize).sum();
        if raw.len() != expected {
            anyhow::bail!(
                "string-array artifact {path:?} holds {} bytes, lengths sum to {}",
                raw.len(),
                expected
            );
        }
        let mut out = Vec::with_capacity(n);
        let mut offset = 0usize;
        for &len in &lengths[..n] {
            let len = len as usize;
            out.push(raw[offset..offset + len].to_vec());
            offset += len;
        }
        Ok(out)
    }

    fn encode_array(&self, items: &[Vec<u8>], path: &Path) -> Result<()> {
        let total: usize = items.iter().map(|i| i.len()).sum();
        let mut raw = Vec::with_capacity(total);
        for item in items {
            raw.extend_from_slice(item);
        }
        std::fs::write(path, compress(&raw)?)
            .with_context(|| format!("failed to write string-array artifact {path:?}"))
    }
}

pub struct ZstdIdCodec;

impl IdCodec for ZstdIdCodec {
    fn decode_block(&self, path: &Path, n: usize) -> Result<Vec<Vec<u8>>> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to open id artifact {path:?}"))?;
        let raw = decompress(&data).with_context(|| format!("artifact {path:?}"))?;
        let mut out: Vec<Vec<u8>> = raw
            .split(|&b| b == b'\n')
            .map(|line| line.to_vec())
            .collect();
        // a trailing newline yields one empty tail entry
        if out.last().is_some_and(|l| l.is_empty()) {
            out.pop();
        }
        if out.len() != n {
            anyhow::bail!("id artifact {path:?} holds {} ids, expected {}", out.len(), n);
        }
        Ok(out)
    }

    fn encode_block(&self, ids: &[Vec<u8>], path: &Path) -> Result<()> {
        let mut raw = Vec::new();
        for id in ids {
            raw.extend_from_slice(id);
            raw.push(b'\n');
        }
        std::fs::write(path, compress(&raw)?)
            .with_context(|| format!("failed to write id artifact {path:?}"))
    }

    fn modify_id(&self, id: &mut Vec<u8>, paired_id_code: u8) -> Result<()> {
        match paired_id_code {
            // mate suffix convention: trailing '1' becomes '2' ("@r/1" -> "@r/2")
            1 | 2 => {
                match id.last_mut() {
                    Some(last @ b'1') => *last = b'2',
                    _ => anyhow::bail!(
                        "id {:?} does not end in '1' (paired_id_code {})",
                        String::from_utf8_lossy(id),
                        paired_id_code
                    ),
                }
                Ok(())
            }
            // both mates carry the identical id
            3 => Ok(()),
            _ => anyhow::bail!("unknown paired_id_code {paired_id_code}"),
        }
    }
}

/// In-process stand-in for the neural shard decoder: the "combined"
/// payload is a plain zstd frame over the packed bases.
pub struct ZstdDeepCodec;

impl DeepCodec for ZstdDeepCodec {
    fn decode(&self, payload: &Path, _gpu_id: u32) -> Result<Vec<u8>> {
        let data = std::fs::read(payload)
            .with_context(|| format!("failed to open shard payload {payload:?}"))?;
        decompress(&data).with_context(|| format!("shard payload {payload:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GenCodec, IdCodec, StrArrayCodec};
    use tempfile::TempDir;

    #[test]
    fn test_gen_codec_roundtrip() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("e.0");
        std::fs::write(&src, b"1234").unwrap();
        let archive = dir.path().join("read_flag.txt.0.zpaq");
        ZstdGenCodec.encode(&src, &archive).unwrap();

        let dest = TempDir::new().unwrap();
        ZstdGenCodec.decode(&archive, dest.path()).unwrap();
        assert_eq!(std::fs::read(dest.path().join("e.0")).unwrap(), b"1234");
    }

    #[test]
    fn test_gen_codec_truncated_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zpaq");
        std::fs::write(&archive, [5u8, 0]).unwrap();
        let dest = TempDir::new().unwrap();
        assert!(ZstdGenCodec.decode(&archive, dest.path()).is_err());
    }

    #[test]
    fn test_str_array_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quality_1.0");
        let items = vec![b"IIII".to_vec(), b"JJ".to_vec(), b"KKKKK".to_vec()];
        ZstdStrArrayCodec.encode_array(&items, &path).unwrap();
        let lengths = [4u32, 2, 5];
        let decoded = ZstdStrArrayCodec.decode_array(&path, 3, &lengths).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn test_str_array_length_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quality_1.0");
        ZstdStrArrayCodec
            .encode_array(&[b"IIII".to_vec()], &path)
            .unwrap();
        let lengths = [5u32];
        assert!(ZstdStrArrayCodec.decode_array(&path, 1, &lengths).is_err());
    }

    #[test]
    fn test_id_codec_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id_1.0");
        let ids = vec![b"@r1/1".to_vec(), b"@r2/1".to_vec()];
        ZstdIdCodec.encode_block(&ids, &path).unwrap();
        assert_eq!(ZstdIdCodec.decode_block(&path, 2).unwrap(), ids);
        assert!(ZstdIdCodec.decode_block(&path, 3).is_err());
    }

    #[test]
    fn test_modify_id_codes() {
        let codec = ZstdIdCodec;
        let mut id = b"@sample.42/1".to_vec();
        codec.modify_id(&mut id, 1).unwrap();
        assert_eq!(id, b"@sample.42/2");

        let mut id = b"@same-for-both".to_vec();
        codec.modify_id(&mut id, 3).unwrap();
        assert_eq!(id, b"@same-for-both");

        let mut id = b"@no-suffix".to_vec();
        assert!(codec.modify_id(&mut id, 1).is_err());
        assert!(codec.modify_id(&mut id, 9).is_err());
    }
}
