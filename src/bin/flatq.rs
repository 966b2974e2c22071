//! Command-line entry point.
//!
//! Runs a query string or a source file against a repository of delimited
//! files and renders SELECT results as tables. Exit codes: 0 on success, 1
//! on a runtime error, 2 on a usage or syntax error.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets};

use flatq::config::{Encoding, LineBreak, SessionFlags};
use flatq::driver::{self, ResultKind};
use flatq::session::Session;

#[derive(Parser)]
#[command(name = "flatq", version, about = "SQL for CSV, TSV, fixed-width, LTSV, and JSON files")]
struct Cli {
    /// Query to execute. Reads --source when omitted.
    query: Option<String>,

    /// Execute statements from this file instead of the argument.
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Directory that relative table names resolve against.
    #[arg(short, long, value_name = "DIR")]
    repository: Option<PathBuf>,

    /// Field delimiter for CSV sources.
    #[arg(short, long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Text encoding: AUTO, UTF8, UTF8M, UTF16LE, UTF16BE.
    #[arg(short, long, value_name = "ENC")]
    encoding: Option<String>,

    /// Line-break style for new files: LF, CRLF, CR.
    #[arg(long, value_name = "LB")]
    line_break: Option<String>,

    /// The first line of source files is data, not a header.
    #[arg(long)]
    no_header: bool,

    /// Read empty fields as empty strings instead of NULL.
    #[arg(long)]
    without_null: bool,

    /// Enclose every encoded CSV field.
    #[arg(long)]
    enclose_all: bool,

    /// Treat double-quoted tokens as identifiers.
    #[arg(long)]
    ansi_quotes: bool,

    /// Worker pool size for data-parallel passes.
    #[arg(long, value_name = "N")]
    cpu: Option<usize>,

    /// Seconds to wait for a file lock.
    #[arg(long, value_name = "SECS")]
    wait_timeout: Option<f64>,

    /// Log verbosity: error, warn, info, debug, trace.
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: log::LevelFilter,
}

fn install_logger(level: log::LevelFilter) {
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {message}", record.level()))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();
}

fn build_flags(cli: &Cli) -> Result<SessionFlags, String> {
    let mut flags = SessionFlags::default();
    if let Some(repo) = &cli.repository {
        flags.repository = repo.clone();
    }
    if let Some(d) = cli.delimiter {
        flags.delimiter = d;
    }
    if let Some(e) = &cli.encoding {
        flags.encoding = Encoding::parse(e).ok_or_else(|| format!("{e} is not an encoding"))?;
    }
    if let Some(lb) = &cli.line_break {
        flags.line_break =
            LineBreak::parse(lb).ok_or_else(|| format!("{lb} is not a line-break style"))?;
    }
    flags.no_header = cli.no_header;
    flags.without_null = cli.without_null;
    flags.enclose_all = cli.enclose_all;
    flags.ansi_quotes = cli.ansi_quotes;
    if let Some(cpu) = cli.cpu {
        flags.cpu = cpu.max(1);
    }
    if let Some(t) = cli.wait_timeout {
        flags.wait_timeout = t;
    }
    Ok(flags)
}

fn render(session: &Session) {
    for result in driver::take_results(session) {
        match result.kind {
            ResultKind::Select => {
                let Some(view) = &result.view else { continue };
                let mut table = Table::new();
                table
                    .load_preset(presets::UTF8_BORDERS_ONLY)
                    .set_content_arrangement(ContentArrangement::Dynamic);
                table.set_header(
                    view.header
                        .fields()
                        .iter()
                        .map(|f| f.column.clone())
                        .collect::<Vec<String>>(),
                );
                for record in &view.records {
                    table.add_row(
                        (0..view.header.len())
                            .map(|i| record.value(i).to_field().unwrap_or_default())
                            .collect::<Vec<String>>(),
                    );
                }
                println!("{table}");
            }
            ResultKind::Print => println!("{}", result.log),
            _ => eprintln!("{}", result.log),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logger(cli.log_level);

    let flags = match build_flags(&cli) {
        Ok(flags) => flags,
        Err(msg) => {
            eprintln!("flatq: {msg}");
            return ExitCode::from(2);
        }
    };

    let text = match (&cli.query, &cli.source) {
        (Some(q), _) => q.clone(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("flatq: {}: {e}", path.display());
                return ExitCode::from(1);
            }
        },
        (None, None) => {
            eprintln!("flatq: no query given; pass a query or --source");
            return ExitCode::from(2);
        }
    };

    let session = match Session::new(flags) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("flatq: {e}");
            return ExitCode::from(1);
        }
    };

    // Piped input becomes the STDIN table.
    if !std::io::stdin().is_terminal() {
        let mut buf = String::new();
        if std::io::stdin().read_to_string(&mut buf).is_ok() && !buf.is_empty() {
            session.set_stdin(buf);
        }
    }

    match driver::run_program(&session, &text) {
        Ok(code) => {
            render(&session);
            ExitCode::from(code.clamp(0, 255) as u8)
        }
        Err(e) => {
            render(&session);
            eprintln!("flatq: {e}");
            ExitCode::from(e.exit_code().clamp(0, 255) as u8)
        }
    }
}
