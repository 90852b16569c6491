use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use futures::StreamExt;
use reqwest::header::USER_AGENT;
use tracing::{debug, info};

use crate::{
    runner::{ToolCommand, ToolRunner},
    Error, Result,
};

const XZ_MAGIC_BYTES: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];
const GZIP_MAGIC_BYTES: [u8; 2] = [0x1F, 0x8B];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Xz,
    Gzip,
    None,
}

impl Compression {
    pub fn detect<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let magic = calc_magic_bytes(path, XZ_MAGIC_BYTES.len())?;
        if magic.starts_with(&XZ_MAGIC_BYTES) {
            Ok(Compression::Xz)
        } else if magic.starts_with(&GZIP_MAGIC_BYTES) {
            Ok(Compression::Gzip)
        } else {
            Ok(Compression::None)
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::Xz => Some("xz"),
            Compression::Gzip => Some("gz"),
            Compression::None => None,
        }
    }

    /// Tool that decompresses `<file>.<ext>` into `<file>`
    pub fn tool(&self) -> Option<&'static str> {
        match self {
            Compression::Xz => Some("xz"),
            Compression::Gzip => Some("gzip"),
            Compression::None => None,
        }
    }
}

/// Read up to `size` leading bytes; shorter files give what they have
pub fn calc_magic_bytes<P: AsRef<Path>>(path: P, size: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut magic_bytes = Vec::with_capacity(size);
    file.take(size as u64).read_to_end(&mut magic_bytes)?;
    Ok(magic_bytes)
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Stream `url` into `out`, through a `.part` file renamed on completion
pub async fn download<P: AsRef<Path>>(url: &str, out: P) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header(USER_AGENT, concat!("imgrepo/", env!("CARGO_PKG_VERSION")))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Download {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let output_path = out.as_ref();
    if let Some(output_dir) = output_path.parent() {
        fs::create_dir_all(output_dir)?;
    }

    let temp_path = PathBuf::from(format!("{}.part", output_path.display()));
    let mut stream = response.bytes_stream();
    let mut file = File::create(&temp_path)?;
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        total += chunk.len() as u64;
    }
    file.sync_all()?;

    fs::rename(&temp_path, output_path)?;
    debug!("Downloaded {} bytes from {}", total, url);

    Ok(())
}

/// Bring `source` (URL or local path) to `dest` and decompress it in place
/// when it is xz or gzip compressed.
pub async fn fetch_image(source: &str, dest: &Path, runner: &ToolRunner) -> Result<PathBuf> {
    if is_url(source) {
        info!("Downloading {} to {}", source, dest.display());
        download(source, dest).await?;
    } else {
        info!("Copying {} to {}", source, dest.display());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
    }

    decompress_in_place(dest, runner).await?;
    Ok(dest.to_path_buf())
}

/// Replace a compressed file by its decompressed content, keeping its path
pub async fn decompress_in_place(path: &Path, runner: &ToolRunner) -> Result<Compression> {
    let compression = Compression::detect(path)?;
    let (Some(ext), Some(tool)) = (compression.extension(), compression.tool()) else {
        return Ok(compression);
    };

    let compressed = PathBuf::from(format!("{}.{}", path.display(), ext));
    fs::rename(path, &compressed)?;
    let cmd = ToolCommand::new(tool)
        .arg("--decompress")
        .arg("--force")
        .path_arg("", &compressed);
    runner.run(&cmd).await?;

    if !path.is_file() {
        return Err(Error::MissingOutput(path.to_path_buf()));
    }
    Ok(compression)
}
