use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;
use simse_files::config::{CliArgs, Command};
use simse_files::upload::{UploadHandler, UploadOutcome};
use simse_files::validation::{BufferedUpload, UploadRules, UploadedFile};
use simse_files::{Directory, File, Location, SharedStorage, StorageFactory};

fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let storage = StorageFactory::local(args.root.as_deref()).context("Failed to open storage root")?;
    run(args, &storage)
}

fn is_dir(storage: &SharedStorage, path: &str) -> Result<bool> {
    Ok(storage.directory_exists(&Location::new(path))?)
}

fn run(args: CliArgs, storage: &SharedStorage) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    match args.command {
        Command::Ls { path, filter, json } => {
            let dir = Directory::open(path.as_str(), storage)?;
            for entry in dir.iter()? {
                let entry = entry?;
                if filter.as_deref().is_some_and(|f| !entry.matches(f)) {
                    continue;
                }
                if json {
                    writeln!(stdout, "{}", entry.to_json()?)?;
                } else if entry.is_dir() {
                    writeln!(stdout, "{}/", entry.basename())?;
                } else {
                    writeln!(stdout, "{}", entry.basename())?;
                }
            }
        }
        Command::Info { path } => {
            let info = if is_dir(storage, &path)? {
                serde_json::to_value(Directory::open(path.as_str(), storage)?.info()?)?
            } else {
                File::open(path.as_str(), storage)?.to_json()?
            };
            writeln!(stdout, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        Command::Du { path } => {
            writeln!(stdout, "{}", Directory::open(path.as_str(), storage)?.size()?)?;
        }
        Command::Count { path, recursive } => {
            let dir = Directory::open(path.as_str(), storage)?;
            writeln!(stdout, "{}", dir.count(recursive)?)?;
        }
        Command::Cp {
            source,
            destination,
        } => {
            let target = if is_dir(storage, &source)? {
                Directory::open(source.as_str(), storage)?
                    .copy(destination.as_str())?
                    .location()
                    .clone()
            } else {
                let into_dir = is_dir(storage, &destination)?;
                File::open(source.as_str(), storage)?
                    .file()
                    .copy(destination.as_str(), into_dir)?
                    .location()
                    .clone()
            };
            writeln!(stdout, "{}", target)?;
        }
        Command::Mv {
            source,
            destination,
        } => {
            let target = if is_dir(storage, &source)? {
                Directory::open(source.as_str(), storage)?
                    .move_to(destination.as_str())?
                    .location()
                    .clone()
            } else {
                let mut entry = File::open(source.as_str(), storage)?;
                entry.file_mut().move_to(destination.as_str())?;
                entry.location().clone()
            };
            writeln!(stdout, "{}", target)?;
        }
        Command::Merge {
            target,
            sources,
            delete,
        } => {
            let target = Directory::create(target.as_str(), storage)?;
            let sources = sources
                .iter()
                .map(|source| Directory::open(source.as_str(), storage))
                .collect::<simse_files::Result<Vec<_>>>()?;
            target.merge(&sources, delete)?;
            writeln!(stdout, "{}", target.count(false)?)?;
        }
        Command::Mkdir { path } => {
            let dir = Directory::create(path.as_str(), storage)?;
            writeln!(stdout, "{}", dir.location())?;
        }
        Command::Rm { path } => {
            if is_dir(storage, &path)? {
                Directory::open(path.as_str(), storage)?.delete()?;
            } else {
                File::open(path.as_str(), storage)?.into_file().delete()?;
            }
        }
        Command::Put { path, from } => {
            let content = match from {
                Some(local) => std::fs::read(&local)
                    .with_context(|| format!("Failed to read {}", local.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let entry = File::create(Some(Location::new(&path)), &content, storage)?;
            writeln!(stdout, "{}", entry.location())?;
        }
        Command::Cat { path } => {
            let mut file = File::open(path.as_str(), storage)?.into_file();
            file.set_chunk_size(args.chunk_size);
            for chunk in file.chunks() {
                stdout.write_all(&chunk?)?;
            }
            stdout.flush()?;
        }
        Command::Upload {
            destination,
            files,
            mime_types,
            extensions,
            max_size,
            any,
        } => {
            let rules = if any {
                UploadRules::permissive()
            } else {
                let mut rules = UploadRules::default();
                if !mime_types.is_empty() {
                    rules = rules.with_mime_types(mime_types);
                }
                if max_size.is_some() {
                    rules = rules.with_max_size(max_size);
                }
                rules.with_extensions(extensions)
            };

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let content = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("Not a file: {}", path.display()))?;
                uploads.push(BufferedUpload::new(name, content));
            }
            let refs: Vec<&dyn UploadedFile> =
                uploads.iter().map(|u| u as &dyn UploadedFile).collect();

            let mut handler = UploadHandler::with_validator(SharedStorage::clone(storage), Box::new(rules));
            handler.set_tmp_dir(args.tmp_dir.as_str());

            match handler.handle(&refs)? {
                UploadOutcome::Stored { ids } => {
                    for entry in handler.move_uploaded_files(destination.as_str(), &ids)? {
                        writeln!(stdout, "{}", entry.location())?;
                    }
                }
                outcome @ UploadOutcome::Rejected { .. } => {
                    eprintln!("{}", outcome.body()?);
                    bail!("Upload rejected");
                }
            }
        }
    }

    Ok(())
}
