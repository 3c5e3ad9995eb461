//! Subprocess codec adapters: external programs invoked per artifact.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{DeepCodec, GenCodec};

/// Shared suffix of a deep-encoded shard payload; stripping it yields the
/// path the decoder program writes its output to.
const DEEP_PAYLOAD_SUFFIX: &str = ".tmp.compressed.combined";

fn run(mut cmd: Command) -> Result<()> {
    let program = cmd.get_program().to_os_string();
    let status = cmd
        .status()
        .with_context(|| format!("failed to launch {program:?}"))?;
    if !status.success() {
        anyhow::bail!("{program:?} exited with {status}");
    }
    Ok(())
}

/// Adapter for a zpaq-style archiver: `<prog> a <archive> <file>` to
/// store, `<prog> x <archive> -to <dir>` to expand.
pub struct SubprocessGenCodec {
    program: PathBuf,
}

impl SubprocessGenCodec {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl GenCodec for SubprocessGenCodec {
    fn decode(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("x").arg(archive).arg("-to").arg(dest_dir);
        run(cmd).with_context(|| format!("expanding {archive:?}"))
    }

    fn encode(&self, src: &Path, archive: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("a").arg(archive).arg(src);
        run(cmd).with_context(|| format!("archiving {src:?}"))
    }
}

/// Adapter for the neural shard decoder: runs
/// `<prog> --input_dir <payload> --gpu_id <g>` and reads back the packed
/// bytes the program writes next to the payload.
pub struct SubprocessDeepCodec {
    program: PathBuf,
}

impl SubprocessDeepCodec {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl DeepCodec for SubprocessDeepCodec {
    fn decode(&self, payload: &Path, gpu_id: u32) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--input_dir")
            .arg(payload)
            .arg("--gpu_id")
            .arg(gpu_id.to_string());
        run(cmd).with_context(|| format!("decoding shard payload {payload:?}"))?;

        let payload_str = payload
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non-UTF-8 shard payload path {payload:?}"))?;
        let out_path = payload_str
            .strip_suffix(DEEP_PAYLOAD_SUFFIX)
            .ok_or_else(|| {
                anyhow::anyhow!("shard payload {payload:?} lacks the {DEEP_PAYLOAD_SUFFIX} suffix")
            })?;
        let packed = std::fs::read(out_path)
            .with_context(|| format!("decoder produced no output at {out_path:?}"))?;
        std::fs::remove_file(out_path).ok();
        Ok(packed)
    }
}
