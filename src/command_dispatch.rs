//! Purpose: Hold top-level CLI command dispatch for `books`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Client commands run through `BookView`, so each mutation ends with a full List.
//! Invariants: A failed view call exits with the code of its error kind after printing the notice.

use super::*;
use book_inventory::view::{BookView, BooksApi, Field, Outcome, Prompt};
use std::io::BufRead;
use std::net::SocketAddr;
use std::time::Instant;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Serve(args) => {
            let config = serve_config_from_args(args);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::List { remote } => {
            let mut view = BookView::new(remote.connect()?);
            let outcome = view.mount();
            finish_view(&view, outcome, None, color_mode)
        }
        Command::Add {
            title,
            author,
            year,
            remote,
        } => {
            let mut view = BookView::new(remote.connect()?);
            view.set_draft_field(Field::Title, title);
            view.set_draft_field(Field::Author, author);
            view.set_draft_field(Field::Year, year);
            let mut prompt = CliPrompt::new(false);
            let outcome = view.add(&mut prompt);
            finish_view(&view, outcome, prompt.alert.as_deref(), color_mode)
        }
        Command::Edit {
            key,
            title,
            author,
            year,
            remote,
        } => {
            let key = BookKey::parse(&key)?;
            let changes = [
                (Field::Title, title),
                (Field::Author, author),
                (Field::Year, year),
            ];
            if changes.iter().all(|(_, value)| value.is_none()) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("edit needs at least one field to change")
                    .with_hint("Pass --title, --author, or --year."));
            }

            let mut view = BookView::new(remote.connect()?);
            let outcome = view.mount();
            if outcome != Outcome::Completed {
                return finish_view(&view, outcome, None, color_mode);
            }
            if !view.begin_edit(&key) {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message("book not found")
                    .with_key(key.to_string())
                    .with_hint("Run `books list` to see current keys."));
            }
            for (field, value) in changes {
                if let Some(value) = value {
                    view.edit_field(field, value);
                }
            }
            let outcome = view.commit_edit();
            finish_view(&view, outcome, None, color_mode)
        }
        Command::Delete { key, yes, remote } => {
            let key = BookKey::parse(&key)?;
            if !yes && !io::stdin().is_terminal() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("delete needs confirmation")
                    .with_key(key.to_string())
                    .with_hint("Pass --yes to delete without a prompt."));
            }
            let mut view = BookView::new(remote.connect()?);
            let mut prompt = CliPrompt::new(yes);
            let outcome = view.delete(&key, &mut prompt);
            finish_view(&view, outcome, None, color_mode)
        }
        Command::Shell { remote } => shell::run_interactive(remote.connect()?, color_mode),
    }
}

fn serve_config_from_args(args: ServeArgs) -> serve::ServeConfig {
    serve::ServeConfig {
        bind: SocketAddr::new(args.host, args.port),
        store_uri: args.store,
        cors_allowed_origins: args.cors_origin,
        max_body_bytes: args.max_body_bytes,
    }
}

/// Prints the view's notification, then the list on success.
fn finish_view<A: BooksApi>(
    view: &BookView<A>,
    outcome: Outcome,
    alert: Option<&str>,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    if let Some(notification) = view.notification(Instant::now()) {
        emit_notification(notification, color_mode);
    }
    match outcome {
        Outcome::Completed => {
            emit_json(books_json(view.records()));
            Ok(RunOutcome::ok())
        }
        Outcome::Cancelled => Ok(RunOutcome::ok()),
        Outcome::Rejected => Err(Error::new(ErrorKind::Usage)
            .with_message(alert.unwrap_or("nothing to submit"))
            .with_hint("Pass --title, --author, and --year.")),
        Outcome::Failed(kind) => Ok(RunOutcome::with_code(to_exit_code(kind))),
    }
}

/// One-shot prompt: alerts are reported as the command error, confirmation
/// reads a single line from the terminal unless `--yes` was given.
struct CliPrompt {
    assume_yes: bool,
    alert: Option<String>,
}

impl CliPrompt {
    fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            alert: None,
        }
    }
}

impl Prompt for CliPrompt {
    fn alert(&mut self, message: &str) {
        self.alert = Some(message.to_string());
    }

    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{message} [y/N] ");
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => shell::is_affirmative(&line),
            Err(_) => false,
        }
    }
}
