//! Command-line front end for the NTFS parsing engine (§6).

use anyhow::{bail, Context, Result};
use clap::Parser;
use ntfs_core::Ntfs;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Inspect and extract files from a read-only NTFS volume image.
#[derive(Parser, Debug)]
#[command(name = "ntfsparser", version, about)]
struct Cli {
    /// Path to the NTFS volume image.
    image: PathBuf,

    /// Dump a file record by its MFT record number.
    #[arg(long, value_name = "N", conflicts_with_all = ["search", "reparse"])]
    filerecord: Option<u64>,

    /// Resolve a backslash-separated path from the volume root.
    #[arg(long, value_name = "PATH", conflicts_with_all = ["filerecord", "reparse"])]
    search: Option<String>,

    /// Dump the reparse point attached to the resolved record.
    #[arg(long, conflicts_with_all = ["filerecord", "search"])]
    reparse: bool,

    /// Write the resolved record's unnamed $DATA stream to this path.
    #[arg(long, value_name = "OUT")]
    fetch_file: Option<PathBuf>,

    /// List directory contents, recursing to DEPTH (-1 for unbounded).
    #[arg(long, value_name = "DEPTH", num_args = 0..=1, default_missing_value = "2")]
    list: Option<i32>,

    /// Suppress all diagnostics below error level.
    #[arg(long)]
    quiet: bool,

    /// Redirect diagnostics to a file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.quiet { "error" } else { "info" };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    );

    if let Some(path) = &cli.log_file {
        let file = File::create(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let ntfs = Ntfs::open(&cli.image)
        .with_context(|| format!("opening {}", cli.image.display()))?;

    let record = if let Some(record_number) = cli.filerecord {
        ntfs.file_record(record_number)?
    } else if let Some(path) = &cli.search {
        ntfs.file_by_path(path)?
    } else {
        ntfs.file_record(ntfs_core::structures::MFT_RECORD_ROOT)?
    }
    .context("file was not found")?;

    println!(
        "record {}: in_use={} directory={} real_size={}",
        record.record_number,
        record.is_in_use(),
        record.is_directory(),
        record.real_size
    );

    for name_attr in record.by_name("$FILE_NAME") {
        if let ntfs_core::attributes::AttributeBody::FileName(fna) = &name_attr.body {
            println!("  name: {} (namespace {})", fna.name, fna.namespace);
        }
    }

    if cli.reparse {
        let reparse = record
            .attributes
            .iter()
            .find_map(|a| match &a.body {
                ntfs_core::attributes::AttributeBody::ReparsePoint(rp) => Some(rp),
                _ => None,
            });
        match reparse {
            Some(rp) => println!(
                "  reparse tag 0x{:08x}: {} (print: {})",
                rp.reparse_tag, rp.substitute_name, rp.print_name
            ),
            None => println!("  no reparse point on this record"),
        }
    }

    if let Some(depth) = cli.list {
        if !record.is_directory() {
            bail!("--list requires a directory record");
        }
        print_directory(&ntfs, &record, depth, 0)?;
    }

    if let Some(out_path) = &cli.fetch_file {
        let mut stream = ntfs.open_data_stream(&record)?;
        let mut out = File::create(out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next_chunk()? {
            written += chunk.len() as u64;
            out.write_all(&chunk)?;
        }
        println!("wrote {written} bytes to {}", out_path.display());
    }

    Ok(())
}

fn print_directory(
    ntfs: &Ntfs,
    record: &ntfs_core::FileRecord,
    depth: i32,
    indent: usize,
) -> Result<()> {
    for (name, record_number) in ntfs.list_directory(record)? {
        println!("{}{}", "  ".repeat(indent), name);

        if depth == 0 {
            continue;
        }

        let Some(child) = ntfs.file_record(record_number)? else {
            continue;
        };
        if child.is_directory() {
            print_directory(ntfs, &child, depth - 1, indent + 1)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match run(&cli) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
