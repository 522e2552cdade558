use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use idyll_io::prelude::*;

mod inspect;

/// Exit code for documents that fail to parse, validate or apply.
const EXIT_REJECTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "idyll", version, about = "Idyll document markup and diff CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Treat unknown elements and diff operations as errors
    #[arg(long)]
    strict: bool,
    /// Maximum element nesting depth
    #[arg(long, default_value_t = ParseOptions::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl ParseArgs {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            strict: self.strict,
            max_depth: self.max_depth,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a markup file and print its AST as canonical JSON.
    Parse {
        /// Input markup path (document, agent or diff)
        input: PathBuf,
        #[command(flatten)]
        parse: ParseArgs,
        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Parse a markup file and print it back in canonical form.
    Fmt {
        input: PathBuf,
        #[command(flatten)]
        parse: ParseArgs,
    },
    /// Print one row per block: id, type, depth and a short preview.
    Inspect {
        input: PathBuf,
        #[command(flatten)]
        parse: ParseArgs,
    },
    /// Check that a file parses and has no duplicated block ids.
    Validate {
        input: PathBuf,
        #[command(flatten)]
        parse: ParseArgs,
        /// Print failures as JSON on stderr
        #[arg(long)]
        json: bool,
    },
    /// Apply a diff document to a document.
    Apply {
        /// Document markup path
        #[arg(long)]
        doc: PathBuf,
        /// Diff markup path
        #[arg(long)]
        diff: PathBuf,
        /// Write the result here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print apply telemetry as JSON on stderr
        #[arg(long)]
        telemetry: bool,
        #[command(flatten)]
        parse: ParseArgs,
        /// Print failures as JSON on stderr
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// `Err` is an I/O or usage problem (exit 1). Documents that are rejected
/// come back as `Ok` with exit code 2 after the reason has been printed.
fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Command::Parse {
            input,
            parse,
            pretty,
        } => {
            let doc = match parse_file(&input, parse.options(), false)? {
                Ok(doc) => doc,
                Err(code) => return Ok(code),
            };
            let out = if pretty {
                canonical_json::to_canonical_json_pretty(&doc)?
            } else {
                canonical_json::to_canonical_json_string(&doc)?
            };
            println!("{out}");
        }
        Command::Fmt { input, parse } => {
            let doc = match parse_file(&input, parse.options(), false)? {
                Ok(doc) => doc,
                Err(code) => return Ok(code),
            };
            print!("{}", serialize(&doc)?);
        }
        Command::Inspect { input, parse } => {
            let doc = match parse_file(&input, parse.options(), false)? {
                Ok(doc) => doc,
                Err(code) => return Ok(code),
            };
            let Some(blocks) = doc.blocks() else {
                eprintln!("{} is a diff; inspect needs a document or agent", input.display());
                return Ok(ExitCode::from(EXIT_REJECTED));
            };
            inspect::write_table(io::stdout().lock(), &inspect::rows(blocks))?;
        }
        Command::Validate { input, parse, json } => {
            let doc = match parse_file(&input, parse.options(), json)? {
                Ok(doc) => doc,
                Err(code) => return Ok(code),
            };
            let duplicates = doc.blocks().map(duplicate_ids).unwrap_or_default();
            if !duplicates.is_empty() {
                let message = format!("duplicate block ids: {}", duplicates.join(", "));
                if json {
                    eprintln!(
                        "{}",
                        json!({ "code": "DUPLICATE_BLOCK_ID", "message": message, "ids": duplicates })
                    );
                } else {
                    eprintln!("{message}");
                }
                return Ok(ExitCode::from(EXIT_REJECTED));
            }
            println!("OK");
        }
        Command::Apply {
            doc,
            diff,
            out,
            telemetry,
            parse,
            json,
        } => {
            let document = match parse_file(&doc, parse.options(), json)? {
                Ok(ParsedDocument::Document(d)) => d,
                Ok(other) => {
                    eprintln!(
                        "{}: expected a <document> root, found <{}>",
                        doc.display(),
                        other.root_element()
                    );
                    return Ok(ExitCode::from(EXIT_REJECTED));
                }
                Err(code) => return Ok(code),
            };
            let diff_doc = match parse_file(&diff, parse.options(), json)? {
                Ok(ParsedDocument::Diff(d)) => d,
                Ok(other) => {
                    eprintln!(
                        "{}: expected a <diff> root, found <{}>",
                        diff.display(),
                        other.root_element()
                    );
                    return Ok(ExitCode::from(EXIT_REJECTED));
                }
                Err(code) => return Ok(code),
            };

            let (result, stats) = apply_diff_with_telemetry(&document, &diff_doc);
            if telemetry {
                let report = json!({ "format_version": version::FORMAT_VERSION, "telemetry": stats });
                eprintln!("{}", canonical_json::to_canonical_json_string(&report)?);
            }

            let applied = match result {
                Ok(d) => d,
                Err(e) => {
                    if json {
                        eprintln!("{}", canonical_json::to_canonical_json_string(&e)?);
                    } else {
                        eprintln!("{e}");
                    }
                    return Ok(ExitCode::from(EXIT_REJECTED));
                }
            };

            let text = serialize(&ParsedDocument::Document(applied))?;
            match out {
                Some(path) => fs::write(&path, text)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => io::stdout().lock().write_all(text.as_bytes())?,
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Read and parse a markup file.
///
/// I/O failures are returned as `Err`; a parse failure is reported on stderr
/// and becomes the inner `Err(exit code)`.
fn parse_file(
    path: &Path,
    options: ParseOptions,
    json: bool,
) -> anyhow::Result<Result<ParsedDocument, ExitCode>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    debug!(path = %path.display(), bytes = text.len(), "parsing");

    match parse_with(&text, options) {
        Ok(doc) => Ok(Ok(doc)),
        Err(e) => {
            if json {
                eprintln!("{}", canonical_json::to_canonical_json_string(&e)?);
            } else {
                eprintln!("{}: {e}", path.display());
            }
            Ok(Err(ExitCode::from(EXIT_REJECTED)))
        }
    }
}
