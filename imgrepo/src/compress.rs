use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    runner::{ToolCommand, ToolRunner},
    Error, Result,
};

/// Block size virt-builder recommends for seekable xz images
pub const XZ_BLOCK_SIZE: u64 = 16_777_216;

pub fn xz_command(image: &Path) -> ToolCommand {
    ToolCommand::new("xz")
        .arg("--compress")
        .arg("--threads=0")
        .arg("--best")
        .arg("--force")
        .arg(format!("--block-size={}", XZ_BLOCK_SIZE))
        .path_arg("", image)
}

pub fn compressed_path(image: &Path) -> PathBuf {
    PathBuf::from(format!("{}.xz", image.display()))
}

/// Compress `image` to `<image>.xz`, replacing it. Returns the new path and
/// the size before compression.
pub async fn xz_compress(image: &Path, runner: &ToolRunner) -> Result<(PathBuf, u64)> {
    let uncompressed_size = fs::metadata(image)?.len();
    runner.run(&xz_command(image)).await?;

    let compressed = compressed_path(image);
    if !compressed.is_file() {
        return Err(Error::MissingOutput(compressed));
    }
    Ok((compressed, uncompressed_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xz_command() {
        let cmd = xz_command(Path::new("/repo/el7-1.0.qcow2"));
        assert_eq!(
            cmd.to_string(),
            "xz --compress --threads=0 --best --force --block-size=16777216 /repo/el7-1.0.qcow2"
        );
        assert_eq!(
            compressed_path(Path::new("/repo/el7-1.0.qcow2")),
            PathBuf::from("/repo/el7-1.0.qcow2.xz")
        );
    }
}
