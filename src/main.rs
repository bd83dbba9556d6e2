mod cli;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::LevelFilter;
use quire_config::{Config, ConfigLoader, LogSettings};
use quire_doc::{Document, DocumentEvent, DocumentId, DocumentRegistry};
use quire_fs::{Encoding, FileInfo};

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = match &cli.config_file {
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => ConfigLoader::with_paths(vec![path.clone()]),
        None => ConfigLoader::new(),
    };
    loader.load()?;
    if let Some(file) = &cli.log_file {
        loader.update(|config| config.log.file = Some(file.clone()))?;
    }
    if let Command::Convert {
        keep_backup: true, ..
    } = &cli.command
    {
        loader.update(|config| config.files.keep_backup = true)?;
    }
    let config = loader.get_copy();
    setup_logging(&config.log, cli.verbosity)?;

    match cli.command {
        Command::Cat { file, encoding } => cat(&config, &file, encoding),
        Command::Info { file } => info(&config, &file),
        Command::Convert {
            input,
            output,
            to,
            from,
            ..
        } => convert(&config, &input, &output, to, from),
        Command::InitConfig { path } => {
            Config::create_default_config(&path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

fn setup_logging(settings: &LogSettings, verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => settings
            .level
            .parse::<LevelFilter>()
            .with_context(|| format!("invalid log level {:?}", settings.level))?,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(io::stderr());
    if let Some(file) = &settings.file {
        let file = fern::log_file(file)
            .with_context(|| format!("cannot open log file {}", file.display()))?;
        dispatch = dispatch.chain(file);
    }
    dispatch.apply()?;
    Ok(())
}

/// Open `path` in a fresh registry and run the load to completion.
fn load(
    config: &Config,
    path: &Path,
    encoding: Option<Encoding>,
) -> Result<(DocumentRegistry, DocumentId)> {
    let mut registry = DocumentRegistry::from_config(config)?;
    let id = registry.open(path, encoding, 0, false)?;
    let events = registry.run_io();
    report(&events, path)?;
    Ok((registry, id))
}

fn report(events: &[(DocumentId, DocumentEvent)], path: &Path) -> Result<()> {
    for (_, event) in events {
        match event {
            DocumentEvent::Loading {
                read,
                total: Some(total),
            } => log::debug!("{}: read {read}/{total}", path.display()),
            DocumentEvent::Saving { written, total } => {
                log::debug!("{}: wrote {written}/{total}", path.display())
            }
            DocumentEvent::Loaded(Err(err)) | DocumentEvent::Saved(Err(err)) => {
                return Err(err.clone().into());
            }
            _ => {}
        }
    }
    Ok(())
}

fn document(registry: &DocumentRegistry, id: DocumentId) -> Result<&Document> {
    registry.get(id).context("document vanished from the registry")
}

fn cat(config: &Config, path: &Path, encoding: Option<Encoding>) -> Result<()> {
    let (registry, id) = load(config, path, encoding)?;
    let doc = document(&registry, id)?;

    let mut stdout = io::stdout().lock();
    for chunk in doc.buffer().rope().chunks() {
        stdout.write_all(chunk.as_bytes())?;
    }
    stdout.flush()?;
    Ok(())
}

fn info(config: &Config, path: &Path) -> Result<()> {
    let (registry, id) = load(config, path, None)?;
    let doc = document(&registry, id)?;
    let file = FileInfo::from_path(path)?;

    println!("path:      {}", doc.path_for_display());
    let bom = if doc.has_bom() { " (BOM)" } else { "" };
    println!("encoding:  {}{bom}", doc.encoding());
    println!("mime type: {}", doc.mime_type());
    println!("language:  {}", doc.language().unwrap_or("none"));
    println!("size:      {} bytes", file.size);
    println!("lines:     {}", doc.buffer().len_lines());
    println!("chars:     {}", doc.buffer().len_chars());
    println!("mode:      {:o}", file.mode);
    println!("read only: {}", file.is_read_only());
    Ok(())
}

fn convert(
    config: &Config,
    input: &Path,
    output: &Path,
    to: Encoding,
    from: Option<Encoding>,
) -> Result<()> {
    let (mut registry, id) = load(config, input, from)?;
    let Some(doc) = registry.get_mut(id) else {
        bail!("document vanished from the registry");
    };
    log::info!("converting {} from {} to {to}", input.display(), doc.encoding());

    doc.save_as(output, to)?;
    let events = registry.run_io();
    report(&events, output)?;
    registry.close(id);
    Ok(())
}
