//! Purpose: `books` CLI entry point: REST server and client commands.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty on a TTY, compact otherwise).
//! Invariants: Non-interactive errors and notifications are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::net::IpAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;
mod shell;

use book_inventory::api::{Book, BookKey, Error, ErrorKind, RemoteClient, to_exit_code};
use book_inventory::view::{Notification, Severity, notification_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "books",
    version,
    about = "Book inventory: REST service and client",
    after_help = r#"EXAMPLES
  $ BOOKS_STORE_URI=./data books serve --port 5000
  $ books add --title Dune --author Herbert --year 1965
  $ books list
  $ books edit <key> --year 1966
  $ books delete <key> --yes
  $ books shell

  $ books <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr labels and tables: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Run the HTTP/JSON book service",
        long_about = r#"Serve /api/books over HTTP.

The store URI is required: `memory:` for a process-local store, a directory
path, or `file:///dir?db=name`. A missing or unreachable store is fatal."#
    )]
    Serve(ServeArgs),
    #[command(about = "Fetch and print every book")]
    List {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Add a book (all fields are required)")]
    Add {
        #[arg(long, default_value = "", help = "Book title")]
        title: String,
        #[arg(long, default_value = "", help = "Book author")]
        author: String,
        #[arg(long, default_value = "", help = "Publication year")]
        year: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Edit a book; omitted fields keep their current value")]
    Edit {
        #[arg(help = "Book key (24 hex characters)")]
        key: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Delete a book after confirmation")]
    Delete {
        #[arg(help = "Book key (24 hex characters)")]
        key: String,
        #[arg(long, short = 'y', help = "Skip the confirmation prompt")]
        yes: bool,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Interactive list view with add, edit, and delete")]
    Shell {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "BOOKS_STORE_URI", help = "Store URI: memory:, <dir>, or file:///<dir>?db=<name>")]
    store: Option<String>,
    #[arg(long, default_value = "127.0.0.1", help = "Interface to bind")]
    host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT, help = "Port to bind")]
    port: u16,
    #[arg(long = "cors-origin", help = "Allowed browser origin (repeatable; default: any)")]
    cors_origin: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, help = "Request body limit in bytes")]
    max_body_bytes: u64,
}

#[derive(Args)]
struct RemoteArgs {
    #[arg(
        long,
        env = "BOOKS_API_URL",
        default_value = DEFAULT_API_URL,
        help = "Base URL of the book service"
    )]
    url: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, help = "Per-request timeout in milliseconds")]
    timeout_ms: u64,
}

impl RemoteArgs {
    fn connect(&self) -> Result<RemoteClient, Error> {
        if self.timeout_ms == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--timeout-ms must be greater than zero")
                .with_hint("Use a positive value like 10000."));
        }
        Ok(RemoteClient::new(self.url.as_str())?
            .with_timeout(Duration::from_millis(self.timeout_ms)))
    }
}

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => {
            err.with_hint("Permission denied. Check directory permissions for the store.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the server address and that it is running."),
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Store data appears corrupt. Restore books.json from a backup or start a new db.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn books_json(books: &[Book]) -> Value {
    serde_json::to_value(books).unwrap_or_else(|_| Value::Array(Vec::new()))
}

fn book_rows(books: &[Book]) -> Vec<Vec<String>> {
    books
        .iter()
        .map(|book| {
            vec![
                book.key.to_string(),
                book.title.clone(),
                book.author.clone(),
                book.year.to_string(),
                key_time(&book.key),
            ]
        })
        .collect()
}

const BOOK_TABLE_HEADERS: [&str; 5] = ["KEY", "TITLE", "AUTHOR", "YEAR", "ADDED"];

// Keys embed their creation second.
fn key_time(key: &BookKey) -> String {
    use time::format_description::well_known::Rfc3339;
    time::OffsetDateTime::from_unix_timestamp(i64::from(key.timestamp_secs()))
        .ok()
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let column_count = headers.len();
    let mut sanitized_rows = Vec::with_capacity(rows.len());
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        let mut sanitized = Vec::with_capacity(column_count);
        for (idx, width) in widths.iter_mut().enumerate() {
            let value = row.get(idx).map(String::as_str).unwrap_or("");
            let cleaned = sanitize_table_cell(value);
            *width = (*width).max(cleaned.chars().count());
            sanitized.push(cleaned);
        }
        sanitized_rows.push(sanitized);
    }

    let mut lines = Vec::with_capacity(sanitized_rows.len() + 1);
    lines.push(format_table_line(
        &headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>(),
        &widths,
    ));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line.trim_end().to_string()
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
    Green,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
        AnsiColor::Green => "32",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notification_text(notification: &Notification, use_color: bool) -> String {
    let (label, color) = match notification.severity {
        Severity::Success => ("ok:", AnsiColor::Green),
        Severity::Info => ("notice:", AnsiColor::Yellow),
        Severity::Error => ("error:", AnsiColor::Red),
    };
    let mut line = format!(
        "{} {}",
        colorize_label(label, use_color, color),
        notification.message
    );
    if notification.retryable {
        line.push_str(" (retry available)");
    }
    line
}

fn emit_notification(notification: &Notification, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!(
            "{}",
            notification_text(notification, color_mode.use_color(is_tty))
        );
        return;
    }

    let value = notification_json(notification);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"error\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(key) = err.key() {
        lines.push(format!(
            "{} {key}",
            colorize_label("key:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `books --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "books") else {
        return "Try `books --help`.".to_string();
    };

    let mut parts = Vec::new();
    for token in tokens.iter().skip(pos + 1) {
        if token.starts_with('-') || token.starts_with('<') || token.starts_with('[') {
            break;
        }
        parts.push(*token);
    }

    if parts.is_empty() {
        return "Try `books --help`.".to_string();
    }
    format!("Try `books {} --help`.", parts.join(" "))
}
