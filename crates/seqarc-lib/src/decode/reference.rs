//! Reference unpacking: each shard's 2-bit-packed payload becomes an
//! ASCII shard file, and the shards concatenate in index order into the
//! in-memory reference.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

use super::artifacts::{ArtifactStore, GEN_SUFFIX};
use super::dna::unpack_2bit;
use crate::codec::CodecSet;

pub(crate) const SEQ_PREFIX: &str = "read_seq.bin";

/// Unpack all shards (in parallel) and concatenate them into the shared
/// reference. Shard files and their inputs are deleted as they are
/// consumed; any shard failure aborts the decode.
pub(crate) fn unpack_reference(
    basedir: &Path,
    num_shards: usize,
    deep: bool,
    gpu_id: u32,
    codecs: &CodecSet,
) -> Result<Vec<u8>> {
    info!("Unpacking reference ({} shards)...", num_shards);
    (0..num_shards)
        .into_par_iter()
        .try_for_each(|shard| unpack_shard(basedir, shard, deep, gpu_id, codecs))?;

    let mut seq = Vec::new();
    for shard in 0..num_shards {
        let path = basedir.join(format!("{SEQ_PREFIX}.{shard}"));
        let bases = std::fs::read(&path)
            .with_context(|| format!("failed to read shard file {path:?}"))?;
        seq.extend_from_slice(&bases);
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove shard file {path:?}"))?;
    }
    info!("Reference length: {} bases", seq.len());
    Ok(seq)
}

fn unpack_shard(
    basedir: &Path,
    shard: usize,
    deep: bool,
    gpu_id: u32,
    codecs: &CodecSet,
) -> Result<()> {
    let packed = if deep {
        let payload = basedir.join(format!("{SEQ_PREFIX}.{shard}.tmp.compressed.combined"));
        let bytes = codecs.deep.decode(&payload, gpu_id)?;
        std::fs::remove_file(&payload)
            .with_context(|| format!("failed to remove shard payload {payload:?}"))?;
        bytes
    } else {
        let store = ArtifactStore::new(codecs.gen.as_ref(), basedir);
        let artifact = store.expand(
            &format!("{SEQ_PREFIX}.{shard}.{GEN_SUFFIX}"),
            &format!("{SEQ_PREFIX}.{shard}.tmp"),
        )?;
        std::fs::read(&artifact.path)
            .with_context(|| format!("failed to read shard payload {:?}", artifact.path))?
    };

    let mut bases = unpack_2bit(&packed);

    // 0-3 residual bases that did not fill a packed byte
    let tail_path = basedir.join(format!("{SEQ_PREFIX}.{shard}.tail"));
    let tail = std::fs::read(&tail_path)
        .with_context(|| format!("failed to read shard tail {tail_path:?}"))?;
    bases.extend_from_slice(&tail);

    // stage then rename so a failed shard never looks complete
    let staged = basedir.join(format!("{SEQ_PREFIX}.{shard}.tmp"));
    let final_path = basedir.join(format!("{SEQ_PREFIX}.{shard}"));
    std::fs::write(&staged, &bases)
        .with_context(|| format!("failed to write shard file {staged:?}"))?;
    std::fs::rename(&staged, &final_path)
        .with_context(|| format!("failed to finalize shard file {final_path:?}"))?;
    std::fs::remove_file(&tail_path)
        .with_context(|| format!("failed to remove shard tail {tail_path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecSet, GenCodec, ZstdGenCodec};
    use tempfile::TempDir;

    /// Pack ASCII bases 4-per-byte LSB-first, returning (packed, tail).
    fn pack_2bit(bases: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let code = |b: u8| match b {
            b'A' => 0u8,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => unreachable!(),
        };
        let full = bases.len() / 4 * 4;
        let packed = bases[..full]
            .chunks(4)
            .map(|c| code(c[0]) | code(c[1]) << 2 | code(c[2]) << 4 | code(c[3]) << 6)
            .collect();
        (packed, bases[full..].to_vec())
    }

    fn write_shard(basedir: &std::path::Path, shard: usize, bases: &[u8]) {
        let (packed, tail) = pack_2bit(bases);
        let stage = TempDir::new().unwrap();
        let inner = stage.path().join(format!("{SEQ_PREFIX}.{shard}.tmp"));
        std::fs::write(&inner, &packed).unwrap();
        ZstdGenCodec
            .encode(
                &inner,
                &basedir.join(format!("{SEQ_PREFIX}.{shard}.{GEN_SUFFIX}")),
            )
            .unwrap();
        std::fs::write(basedir.join(format!("{SEQ_PREFIX}.{shard}.tail")), &tail).unwrap();
    }

    #[test]
    fn test_unpack_reference_concatenates_shards_in_order() {
        let base = TempDir::new().unwrap();
        write_shard(base.path(), 0, b"ACGTACGTGT");
        write_shard(base.path(), 1, b"TTTTCCC");

        let codecs = CodecSet::in_process();
        let seq = unpack_reference(base.path(), 2, false, 0, &codecs).unwrap();
        assert_eq!(seq, b"ACGTACGTGTTTTTCCC");

        // all scratch inputs consumed
        let leftovers: Vec<_> = std::fs::read_dir(base.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
    }

    #[test]
    fn test_unpack_reference_deep_mode() {
        let base = TempDir::new().unwrap();
        let (packed, tail) = pack_2bit(b"ACGTAC");
        let payload = base
            .path()
            .join(format!("{SEQ_PREFIX}.0.tmp.compressed.combined"));
        std::fs::write(&payload, zstd::bulk::compress(&packed, 3).unwrap()).unwrap();
        std::fs::write(base.path().join(format!("{SEQ_PREFIX}.0.tail")), &tail).unwrap();

        let codecs = CodecSet::in_process();
        let seq = unpack_reference(base.path(), 1, true, 0, &codecs).unwrap();
        assert_eq!(seq, b"ACGTAC");
    }

    #[test]
    fn test_missing_shard_is_fatal() {
        let base = TempDir::new().unwrap();
        let codecs = CodecSet::in_process();
        assert!(unpack_reference(base.path(), 1, false, 0, &codecs).is_err());
    }
}
