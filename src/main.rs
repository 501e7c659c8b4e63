use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use bpak::archive::Archive;
use bpak::codec::Compression;
use bpak::crypto::Encryption;
use bpak::header::EXTENSION;
use bpak::writer::{PackOptions, PackageWriter, DEFAULT_BLOCK_SIZE};

#[derive(Parser)]
#[command(name = "bpak", about = "The .bpk block-packaged archive CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more files into a .bpk archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Compression: zstd (default), deflate, lz4, lzma, none
        #[arg(short, long, default_value = "zstd")]
        codec: String,
        /// Compression level (zstd 1-19; deflate 0-9; ignored for lz4/lzma)
        #[arg(short, long, default_value = "3")]
        level: i32,
        /// Block size in KiB (default 64)
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE / 1024)]
        block_size: u32,
        /// Block cipher: none (default), xor, aes
        #[arg(short, long, default_value = "none")]
        encrypt: String,
        /// 32-byte key as 64 hex characters (required unless --encrypt none)
        #[arg(short, long)]
        key: Option<String>,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Unpack a .bpk archive
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List archive contents
    List {
        input: PathBuf,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
    /// Stream one entry to stdout
    Cat {
        input: PathBuf,
        path: String,
        #[arg(short, long)]
        key: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, input, codec, level, block_size, encrypt, key } => {
            let opts = PackOptions {
                compression: parse_codec(&codec)?,
                encryption:  parse_cipher(&encrypt)?,
                level,
                block_size:  block_size * 1024,
                key:         key.as_deref().map(parse_key).transpose()?,
            };
            let mut writer = PackageWriter::new(opts)?;
            for path in &input {
                let name = path
                    .file_name()
                    .ok_or_else(|| format!("not a file: {}", path.display()))?
                    .to_string_lossy()
                    .into_owned();
                writer.add_file(name, std::fs::read(path)?)?;
            }
            let mut sink = File::create(&output)?;
            writer.build(&mut sink)?;
            println!("Packed {} file(s) into {}", input.len(), output.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, key } => {
            let mut archive = open(&input, key.as_deref())?;
            if !output_dir.exists() {
                std::fs::create_dir_all(&output_dir)?;
            }
            for path in archive.list() {
                let data = archive.read_file(&path)?;
                let dest = entry_dest(&output_dir, &path)?;
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                File::create(&dest)?.write_all(&data)?;
                println!("  {} ({} bytes)", path, data.len());
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let archive = open(&input, None)?;
            for path in archive.list() {
                let entry = archive.stat(&path).unwrap();
                println!("{:>12}  {:>6} block(s)  {}", entry.uncompressed_size,
                         entry.block_count, path);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let archive = open(&input, None)?;
            let header = archive.header();
            println!("Format:        .{} v{}", EXTENSION, header.version);
            println!("Block size:    {} bytes", archive.block_size());
            println!("Index region:  {} bytes at offset {}",
                     header.index_length, header.index_offset);
            println!("Index flags:   {:#010x}", header.index_flags);
            println!("Files:         {}", archive.list().len());
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, path, key } => {
            let mut archive = open(&input, key.as_deref())?;
            let mut stream = archive.open_file(&path)?;
            io::copy(&mut stream, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

fn open(path: &PathBuf, key: Option<&str>) -> Result<Archive<File>, Box<dyn std::error::Error>> {
    Ok(match key {
        Some(k) => Archive::open_path_with_key(path, parse_key(k)?)?,
        None    => Archive::open_path(path)?,
    })
}

fn parse_codec(s: &str) -> Result<Compression, String> {
    Compression::from_name(s).ok_or_else(|| format!("unknown codec: {s}"))
}

fn parse_cipher(s: &str) -> Result<Encryption, String> {
    Encryption::from_name(s).ok_or_else(|| format!("unknown cipher: {s}"))
}

/// Join an archive entry path under the extraction directory.
///
/// Entry paths come from the archive, not the user: absolute paths and any
/// non-normal component (`..`, `.`) are refused so a hostile archive cannot
/// write outside the output directory.
fn entry_dest(base: &Path, entry: &str) -> Result<PathBuf, String> {
    let rel = Path::new(entry);
    if rel.is_absolute() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(format!("refusing to extract unsafe entry path: {entry}"));
    }
    Ok(base.join(rel))
}

fn parse_key(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(s).map_err(|e| format!("key is not valid hex: {e}"))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("key must be 32 bytes (64 hex chars), got {}", bytes.len()))
}
