//! Per-block artifact expansion.
//!
//! Every GenCodec invocation gets a fresh scratch directory inside the
//! temp dir and decoded files are located by their expected entry name.
//! Archive inputs are deleted right after expansion; expanded files live
//! only as long as the returned handles.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::codec::GenCodec;

/// Archive suffix used by the general-purpose codec.
pub(crate) const GEN_SUFFIX: &str = "zpaq";

/// A decoded artifact file, valid while its scratch directory lives.
#[derive(Debug)]
pub(crate) struct ExpandedArtifact {
    _scratch: TempDir,
    pub path: PathBuf,
}

/// The expanded stream files of one short-mode block. The compressor
/// stores most entries under single-letter names.
pub(crate) struct ShortBlockFiles {
    pub flag: ExpandedArtifact,
    pub pos: ExpandedArtifact,
    pub noise: ExpandedArtifact,
    pub noisepos: ExpandedArtifact,
    pub rc: ExpandedArtifact,
    pub unaligned: ExpandedArtifact,
    pub lengths: ExpandedArtifact,
    pub pos_pair: Option<ExpandedArtifact>,
    pub rc_pair: Option<ExpandedArtifact>,
}

pub(crate) struct ArtifactStore<'a> {
    gen: &'a dyn GenCodec,
    basedir: &'a Path,
}

impl<'a> ArtifactStore<'a> {
    pub fn new(gen: &'a dyn GenCodec, basedir: &'a Path) -> Self {
        Self { gen, basedir }
    }

    /// Expand one archive into a fresh scratch directory and return the
    /// entry named `expect`. The archive is deleted after expansion.
    pub fn expand(&self, archive_name: &str, expect: &str) -> Result<ExpandedArtifact> {
        let archive = self.basedir.join(archive_name);
        let scratch = TempDir::new_in(self.basedir)
            .context("failed to create artifact scratch directory")?;
        self.gen
            .decode(&archive, scratch.path())
            .with_context(|| format!("failed to expand artifact {archive:?}"))?;
        std::fs::remove_file(&archive)
            .with_context(|| format!("failed to remove consumed archive {archive:?}"))?;
        let path = scratch.path().join(expect);
        if !path.is_file() {
            anyhow::bail!("artifact layout violation: {archive_name} did not yield {expect}");
        }
        Ok(ExpandedArtifact { _scratch: scratch, path })
    }

    fn expand_kind(&self, stem: &str, entry_stem: &str, block: u64) -> Result<ExpandedArtifact> {
        self.expand(
            &format!("{stem}.{block}.{GEN_SUFFIX}"),
            &format!("{entry_stem}.{block}"),
        )
    }

    /// Expand the full artifact set of one short-mode block.
    pub fn expand_short_block(&self, block: u64, paired_end: bool) -> Result<ShortBlockFiles> {
        Ok(ShortBlockFiles {
            flag: self.expand_kind("read_flag.txt", "e", block)?,
            pos: self.expand_kind("read_pos.bin", "a", block)?,
            noise: self.expand_kind("read_noise.txt", "b", block)?,
            noisepos: self.expand_kind("read_noisepos.bin", "c", block)?,
            rc: self.expand_kind("read_rev.txt", "d", block)?,
            unaligned: self.expand_kind("read_unaligned.txt", "f", block)?,
            lengths: self.expand_kind("read_lengths.bin", "g", block)?,
            pos_pair: paired_end
                .then(|| self.expand_kind("read_pos_pair.bin", "read_pos_pair.bin", block))
                .transpose()?,
            rc_pair: paired_end
                .then(|| self.expand_kind("read_rev_pair.txt", "read_rev_pair.txt", block))
                .transpose()?,
        })
    }
}

#[cfg(test)]
impl ExpandedArtifact {
    /// Wrap a pre-staged file for stream-level tests.
    pub(crate) fn from_staged(scratch: TempDir, name: &str) -> Self {
        let path = scratch.path().join(name);
        Self { _scratch: scratch, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GenCodec, ZstdGenCodec};
    use tempfile::TempDir;

    #[test]
    fn test_expand_finds_expected_entry() {
        let base = TempDir::new().unwrap();
        let stage = TempDir::new().unwrap();
        let inner = stage.path().join("e.3");
        std::fs::write(&inner, b"1122").unwrap();
        ZstdGenCodec
            .encode(&inner, &base.path().join("read_flag.txt.3.zpaq"))
            .unwrap();

        let store = ArtifactStore::new(&ZstdGenCodec, base.path());
        let artifact = store.expand("read_flag.txt.3.zpaq", "e.3").unwrap();
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"1122");
        // consumed archive is gone
        assert!(!base.path().join("read_flag.txt.3.zpaq").exists());
    }

    #[test]
    fn test_expand_layout_violation() {
        let base = TempDir::new().unwrap();
        let stage = TempDir::new().unwrap();
        let inner = stage.path().join("wrong-name.3");
        std::fs::write(&inner, b"1122").unwrap();
        ZstdGenCodec
            .encode(&inner, &base.path().join("read_flag.txt.3.zpaq"))
            .unwrap();

        let store = ArtifactStore::new(&ZstdGenCodec, base.path());
        let err = store.expand("read_flag.txt.3.zpaq", "e.3").unwrap_err();
        assert!(err.to_string().contains("artifact layout violation"));
    }

    #[test]
    fn test_expand_missing_archive() {
        let base = TempDir::new().unwrap();
        let store = ArtifactStore::new(&ZstdGenCodec, base.path());
        assert!(store.expand("read_flag.txt.0.zpaq", "e.0").is_err());
    }
}
