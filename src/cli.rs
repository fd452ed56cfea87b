//! Command-line interface.
//!
//! `transform` consumes facts files (one JSON translation unit each, emitted
//! by the external frontend), runs one transformer pass per unit, then
//! deduplicates across all of them. The frontend is responsible for
//! re-invoking the tool on rewritten sources until nothing changes.
//! `remove-annotations` strips the marker comments from accepted output.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::annotations::remove_annotations;
use crate::dedup::{deduplicate, ProcessedUnit};
use crate::errors::{print_error, unspanned, ErrorKind, ErrorReporting, PhaseContext, SourceContext, UnmacroError};
use crate::syntax::TranslationUnit;
use crate::transform::{TransformSettings, TransformerPass};

#[derive(Parser)]
#[command(name = "unmacro", version, about = "Rewrites C macro expansions into functions and variables")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Transform eligible macro expansions in the given translation units.
    Transform {
        /// Facts files emitted by the frontend, one per translation unit.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write rewritten sources back to the original C files.
        #[arg(short = 'o', long = "overwrite-files")]
        overwrite_files: bool,

        /// Log each analysis and rewrite decision.
        #[arg(short, long)]
        verbose: bool,

        /// Also transform macros defined in standard headers.
        #[arg(long = "standard-header-macros")]
        standard_header_macros: bool,
    },
    /// Strip marker comments from previously transformed source.
    RemoveAnnotations {
        /// The C file to clean.
        file: PathBuf,

        /// Write the cleaned source back to the file.
        #[arg(short = 'o', long = "overwrite-files")]
        overwrite_files: bool,
    },
}

pub fn run() -> Result<(), UnmacroError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Transform {
            files,
            overwrite_files,
            verbose,
            standard_header_macros,
        } => {
            init_logging(verbose);
            let settings = TransformSettings {
                overwrite_files,
                verbose,
                transform_std_header_macros: standard_header_macros,
            };
            transform_files(&files, settings)
        }
        Command::RemoveAnnotations {
            file,
            overwrite_files,
        } => {
            init_logging(false);
            clean_file(&file, overwrite_files)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn transform_files(files: &[PathBuf], settings: TransformSettings) -> Result<(), UnmacroError> {
    let pass = TransformerPass::new(settings);
    let mut units = Vec::with_capacity(files.len());
    for path in files {
        let json = read(path)?;
        let unit = TranslationUnit::from_json(&path.display().to_string(), &json)?;
        let outcome = pass.run(&unit)?;
        for failure in outcome.edit_failures {
            print_error(failure);
        }
        units.push(ProcessedUnit {
            declared: unit.declared_names(),
            file: unit.file,
            source: outcome.rewritten,
            definitions: outcome.definitions,
        });
    }

    deduplicate(&mut units)?;

    for unit in units {
        if settings.overwrite_files {
            write(Path::new(&unit.file), &unit.source)?;
        } else {
            println!("{}", unit.source);
        }
    }
    Ok(())
}

fn clean_file(path: &Path, overwrite_files: bool) -> Result<(), UnmacroError> {
    let source = read(path)?;
    let cleaned = remove_annotations(&source);
    if overwrite_files {
        write(path, &cleaned)?;
    } else {
        println!("{}", cleaned);
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, UnmacroError> {
    fs::read_to_string(path).map_err(|e| io_error(path, &e))
}

fn write(path: &Path, content: &str) -> Result<(), UnmacroError> {
    fs::write(path, content).map_err(|e| io_error(path, &e))
}

fn io_error(path: &Path, error: &std::io::Error) -> UnmacroError {
    let ctx = PhaseContext::new(SourceContext::fallback(&path.display().to_string()), "input");
    ctx.report(
        ErrorKind::Io {
            path: path.display().to_string(),
            detail: error.to_string(),
        },
        unspanned(),
    )
}
