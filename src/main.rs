//! Main entry point for the zipstow CLI application.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zipstow::cli::{AddArgs, Command, ExtractArgs, ListArgs, RemoveArgs};
use zipstow::{
    AccessMode, Cli, CompressionMethod, ZipArchive, ZipFileEntry, batch,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Command::Add(args) => add(args, &cli),
        Command::List(args) => list(args, &cli),
        Command::Extract(args) => extract(args, &cli).await,
        Command::Remove(args) => remove(args, &cli),
    }
}

/// Logs go to stderr so that pipe mode output stays clean.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Failed to initialise logging, continuing with none\n{e}");
    }
}

fn add(args: &AddArgs, cli: &Cli) -> Result<()> {
    let method = if args.store {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflate
    };
    let mut zip = if args.archive.exists() {
        ZipArchive::open_file(&args.archive, AccessMode::Write)
    } else {
        ZipArchive::create_file(&args.archive, "")
    }
    .with_context(|| format!("Failed to open {}", args.archive.display()))?;
    let options = zip
        .options()
        .force_deflate(args.force_deflate)
        .encode_utf8(!args.legacy_names);
    zip.set_options(options);
    if let Some(comment) = &args.comment {
        zip.set_comment(comment)?;
    }

    for path in &args.paths {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("Cannot derive an entry name from {}", path.display()))?;

        if path.is_dir() {
            if !args.recursive {
                if !cli.is_quiet() {
                    eprintln!("Skipping: {} (is a directory, use -r)", path.display());
                }
                continue;
            }
            let added = zip
                .add_directory(method, path, "", "")
                .with_context(|| format!("Failed to add {}", path.display()))?;
            if !cli.is_quiet() {
                for entry in &added {
                    println!("  adding: {}", entry.file_name);
                }
            }
            info!(dir = %path.display(), entries = added.len(), "added directory");
        } else {
            let entry = zip
                .add_file(method, path, &name, "")
                .with_context(|| format!("Failed to add {}", path.display()))?;
            if !cli.is_quiet() {
                println!(
                    "  adding: {} ({} {})",
                    entry.file_name,
                    method_label(&entry),
                    ratio(entry.compressed_size as u64, entry.uncompressed_size as u64)
                );
            }
        }
    }

    zip.close()
        .with_context(|| format!("Failed to finalize {}", args.archive.display()))?;
    Ok(())
}

fn list(args: &ListArgs, cli: &Cli) -> Result<()> {
    let mut zip = ZipArchive::open_file(&args.archive, AccessMode::Read)
        .with_context(|| format!("Failed to open {}", args.archive.display()))?;
    let entries = zip.read_central_dir()?;
    let verbose = args.long || cli.verbose > 0;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_time();
            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio(entry.compressed_size as u64, entry.uncompressed_size as u64),
                year,
                month,
                day,
                hour,
                minute,
                entry.file_name
            );

            if !entry.is_directory() {
                total_uncompressed += entry.uncompressed_size as u64;
                total_compressed += entry.compressed_size as u64;
                file_count += 1;
            }
        } else {
            println!("{}", entry.file_name);
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
        if !zip.comment().is_empty() {
            println!("{}", zip.comment());
        }
    }

    Ok(())
}

async fn extract(args: &ExtractArgs, cli: &Cli) -> Result<()> {
    let unfiltered = args.files.is_empty() && args.exclude.is_empty();
    if unfiltered && args.overwrite && !args.pipe && !args.junk_paths {
        return extract_everything(args, cli);
    }

    let mut zip = ZipArchive::open_file(&args.archive, AccessMode::Read)
        .with_context(|| format!("Failed to open {}", args.archive.display()))?;
    let entries = zip.read_central_dir()?;

    // Directories are created on demand by their files.
    let selected: Vec<_> = entries
        .iter()
        .filter(|e| !e.is_directory())
        .filter(|e| {
            args.files.is_empty()
                || args.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &e.file_name)
                    } else {
                        e.file_name == *f || base_name(e) == *f
                    }
                })
        })
        .filter(|e| {
            !args
                .exclude
                .iter()
                .any(|x| e.file_name.contains(x.as_str()) || glob_match(x, &e.file_name))
        })
        .collect();

    if args.pipe {
        let mut stdout = tokio::io::stdout();
        let show_names = selected.len() > 1;
        for entry in selected {
            if show_names {
                stdout
                    .write_all(format!("--- {} ---\n", entry.file_name).as_bytes())
                    .await?;
            }
            zip.extract_async(entry, &mut stdout).await?;
        }
        return Ok(());
    }

    for entry in selected {
        extract_file(&mut zip, entry, args, cli)?;
    }
    Ok(())
}

/// Unfiltered overwrite-everything extraction goes through the batch helper.
fn extract_everything(args: &ExtractArgs, cli: &Cli) -> Result<()> {
    let dest = args.extract_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut failures = 0usize;
    for (name, outcome) in batch::extract_all(&args.archive, &dest)? {
        match outcome {
            Ok(_) if !cli.is_quiet() => println!("  extracting: {name}"),
            Ok(_) => {}
            Err(e) => {
                failures += 1;
                if !cli.is_very_quiet() {
                    eprintln!("error: {e:#}");
                }
            }
        }
    }
    if failures > 0 {
        bail!("{failures} entries could not be extracted");
    }
    Ok(())
}

fn extract_file(
    zip: &mut ZipArchive<std::fs::File>,
    entry: &ZipFileEntry,
    args: &ExtractArgs,
    cli: &Cli,
) -> Result<()> {
    let relative = if args.junk_paths {
        PathBuf::from(base_name(entry))
    } else {
        match entry.enclosed_name() {
            Some(path) => path,
            None => bail!("Refusing to extract unsafe entry name: {}", entry.file_name),
        }
    };
    let output_path = match &args.extract_dir {
        Some(dir) => dir.join(relative),
        None => relative,
    };

    if output_path.exists() {
        if args.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.file_name);
            }
            return Ok(());
        }
        if !args.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.file_name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.file_name);
    }
    zip.extract_to_file(entry, &output_path)
        .with_context(|| format!("Failed to extract {}", entry.file_name))?;
    Ok(())
}

fn remove(args: &RemoveArgs, cli: &Cli) -> Result<()> {
    let mut zip = ZipArchive::open_file(&args.archive, AccessMode::Read)
        .with_context(|| format!("Failed to open {}", args.archive.display()))?;
    let doomed: Vec<_> = zip
        .read_central_dir()?
        .into_iter()
        .filter(|e| args.names.iter().any(|n| *n == e.file_name))
        .collect();

    for name in &args.names {
        if !doomed.iter().any(|e| e.file_name == *name) && !cli.is_very_quiet() {
            eprintln!("Not found: {name}");
        }
    }
    if doomed.is_empty() {
        return Ok(());
    }

    let zip = zip
        .remove_entries(&doomed)
        .with_context(|| format!("Failed to rewrite {}", args.archive.display()))?;
    if !cli.is_quiet() {
        for entry in &doomed {
            println!("  removing: {}", entry.file_name);
        }
    }
    zip.close()?;
    Ok(())
}

fn base_name(entry: &ZipFileEntry) -> String {
    Path::new(&entry.file_name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.file_name.clone())
}

fn method_label(entry: &ZipFileEntry) -> &'static str {
    match entry.compression_method {
        CompressionMethod::Stored => "stored",
        CompressionMethod::Deflate => "deflated",
        CompressionMethod::Unknown(_) => "unknown",
    }
}

/// Percentage saved, formatted to a fixed width.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}
