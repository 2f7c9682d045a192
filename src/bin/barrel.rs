//! Command line access to barrel files

use anyhow::{bail, Context};
use barrel::{
    read_raw_data, AccessOptions, BarrelFile, CompressionLevel, FileLayout, FileSystemIOManager,
    IOManager,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "barrel", version, about = "Read and compress barrel (.brl) voxel cubes")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one cube of u8 voxels
    Read {
        file: PathBuf,
        #[arg(long, default_value_t = 128, allow_negative_numbers = true)]
        x: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        y: i64,
        #[arg(long, default_value_t = 512, allow_negative_numbers = true)]
        z: i64,
        #[arg(long, default_value_t = 32, allow_negative_numbers = true)]
        clen: i32,
        /// Write the voxels (Fortran order) to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print header and size of a file
    Info { file: PathBuf },
    /// Compress a raw file with LZ4HC
    Compress {
        src: PathBuf,
        dst: PathBuf,
        #[arg(long, default_value_t = 9)]
        level: u8,
    },
}

/// Split a path into an I/O manager on its directory and the file name
fn open_dir(path: &Path) -> anyhow::Result<(Arc<dyn IOManager>, String)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} does not name a file", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    Ok((Arc::new(FileSystemIOManager::new(dir)), name.to_string()))
}

/// The line printed for a failed read, if `status` is a failure
fn status_message(status: i32) -> Option<String> {
    (status != 0).then(|| format!("readRawData failed with exit code {}", status))
}

async fn read(
    file: &Path,
    (x, y, z): (i64, i64, i64),
    clen: i32,
    output: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let path = file
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", file.display()))?;

    // read_raw_data rejects lengths outside the file before looking at the buffer
    let file_clen = FileLayout::BARREL.file_clen() as i32;
    let numel = if clen > 0 && clen <= file_clen { (clen as usize).pow(3) } else { 0 };
    let mut buf = vec![0u8; numel];

    let status = read_raw_data(path, x, y, z, clen, &mut buf).await;
    if let Some(message) = status_message(status) {
        eprintln!("{}", message);
        return Ok(ExitCode::FAILURE);
    }

    log::info!("Read {}^3 voxels at ({}, {}, {}) from {}", clen, x, y, z, path);
    if let Some(output) = output {
        tokio::fs::write(output, &buf)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        log::info!("Wrote {} bytes to {}", buf.len(), output.display());
    }

    Ok(ExitCode::SUCCESS)
}

async fn info(file: &Path) -> anyhow::Result<ExitCode> {
    let (io, name) = open_dir(file)?;
    let file = BarrelFile::open(io, name, AccessOptions::default()).await?;
    let header = file.header();

    println!("{}", file.path());
    println!("  version:    {}", header.version);
    println!("  data type:  {}", header.data_type);
    println!("  block type: {}", header.block_type);
    println!("  {}", file.stats().summary());

    Ok(ExitCode::SUCCESS)
}

async fn compress(src: &Path, dst: &Path, level: u8) -> anyhow::Result<ExitCode> {
    let (src_io, src_name) = open_dir(src)?;
    let (dst_io, dst_name) = open_dir(dst)?;
    if dst_io.exists(&dst_name).await? {
        bail!("{} already exists", dst.display());
    }

    let options = AccessOptions::default().with_compression_level(CompressionLevel::new(level));
    let raw = BarrelFile::open(src_io, src_name, options).await?;
    let compressed = raw.compress_to(dst_io, &dst_name).await?;

    log::info!("{}", compressed.stats().summary());
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    pretty_env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Read {
            file,
            x,
            y,
            z,
            clen,
            output,
        } => read(&file, (x, y, z), clen, output.as_deref()).await,
        Command::Info { file } => info(&file).await,
        Command::Compress { src, dst, level } => compress(&src, &dst, level).await,
    }
}
