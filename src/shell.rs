//! Purpose: Interactive terminal loop over `BookView`.
//! Exports: `run_interactive`, `is_affirmative`.
//! Role: Line-oriented stand-in for the list screen: table, new-book form, edit dialog.
//! Invariants: Confirmations read from the same input stream as commands.
//! Invariants: The table is re-rendered only from `BookView::records` after a List.

use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Instant;

use book_inventory::api::{BookKey, Error, ErrorKind, RemoteClient};
use book_inventory::view::{BookView, BooksApi, Field, Outcome, Prompt};

use super::{
    BOOK_TABLE_HEADERS, ColorMode, RunOutcome, book_rows, notification_text, render_table,
};

const HELP: &str = "\
commands:
  list                    reload and show all books
  new <field> <value>     fill the new-book form (title, author, year)
  add                     submit the new-book form
  edit <key>              open the edit dialog (a unique key prefix is enough)
  set <field> <value>     change a field in the edit dialog
  save                    commit the edit dialog
  cancel                  discard the edit dialog
  delete <key>            delete a book after confirmation
  retry                   repeat the last failed request
  show                    show the form and the edit dialog
  help                    show this help
  quit                    leave the shell";

pub(super) fn run_interactive(
    client: RemoteClient,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    let use_color = color_mode.use_color(io::stdout().is_terminal());
    let mut session = Session::new(BookView::new(client), use_color);
    let stdin = io::stdin();
    let stdout = io::stdout();
    session
        .run(&mut stdin.lock(), &mut stdout.lock())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("terminal i/o failed")
                .with_source(err)
        })?;
    Ok(RunOutcome::ok())
}

pub(super) fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum ShellCommand {
    List,
    New(Field, String),
    Add,
    Edit(String),
    Set(Field, String),
    Save,
    Cancel,
    Delete(String),
    Retry,
    Show,
    Help,
    Quit,
}

impl ShellCommand {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = split_word(line);
        let command = match word.to_ascii_lowercase().as_str() {
            "list" | "ls" | "refresh" => ShellCommand::List,
            "new" => {
                let (field, value) = field_and_value(word, rest)?;
                ShellCommand::New(field, value)
            }
            "add" => ShellCommand::Add,
            "edit" => ShellCommand::Edit(required_arg(word, rest, "<key>")?),
            "set" => {
                let (field, value) = field_and_value(word, rest)?;
                ShellCommand::Set(field, value)
            }
            "save" => ShellCommand::Save,
            "cancel" => ShellCommand::Cancel,
            "delete" | "rm" => ShellCommand::Delete(required_arg(word, rest, "<key>")?),
            "retry" => ShellCommand::Retry,
            "show" => ShellCommand::Show,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => return Err(format!("unknown command `{other}` (try `help`)")),
        };
        Ok(Some(command))
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn required_arg(command: &str, rest: &str, name: &str) -> Result<String, String> {
    if rest.is_empty() {
        return Err(format!("usage: {command} {name}"));
    }
    Ok(rest.to_string())
}

fn field_and_value(command: &str, rest: &str) -> Result<(Field, String), String> {
    let (name, value) = split_word(rest);
    if name.is_empty() {
        return Err(format!("usage: {command} <title|author|year> <value>"));
    }
    let field = Field::parse(name)
        .ok_or_else(|| format!("unknown field `{name}` (expected title, author, or year)"))?;
    Ok((field, value.to_string()))
}

fn field_name(field: Field) -> &'static str {
    match field {
        Field::Title => "title",
        Field::Author => "author",
        Field::Year => "year",
    }
}

/// Prompt backed by the shell's own input and output streams.
struct LinePrompt<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<R: BufRead, W: Write> Prompt for LinePrompt<'_, R, W> {
    fn alert(&mut self, message: &str) {
        let _ = writeln!(self.output, "! {message}");
    }

    fn confirm(&mut self, message: &str) -> bool {
        if write!(self.output, "{message} [y/N] ").is_err() || self.output.flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(_) => false,
        }
    }
}

struct Session<A> {
    view: BookView<A>,
    use_color: bool,
}

impl<A: BooksApi> Session<A> {
    fn new(view: BookView<A>, use_color: bool) -> Self {
        Self { view, use_color }
    }

    fn run<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> io::Result<()> {
        let outcome = self.view.mount();
        self.render_outcome(outcome, output)?;

        loop {
            self.view.dismiss_expired(Instant::now());
            write!(output, "{}", self.prompt_label())?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }
            let command = match ShellCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    writeln!(output, "{message}")?;
                    continue;
                }
            };
            if command == ShellCommand::Quit {
                return Ok(());
            }
            self.execute(command, input, output)?;
        }
    }

    fn prompt_label(&self) -> String {
        match self.view.editing() {
            Some(draft) => format!("books[edit {}]> ", short_key(&draft.key)),
            None => "books> ".to_string(),
        }
    }

    fn execute<R: BufRead, W: Write>(
        &mut self,
        command: ShellCommand,
        input: &mut R,
        output: &mut W,
    ) -> io::Result<()> {
        match command {
            ShellCommand::List => {
                let outcome = self.view.refresh();
                self.render_outcome(outcome, output)
            }
            ShellCommand::New(field, value) => {
                self.view.set_draft_field(field, value);
                self.render_draft(output)
            }
            ShellCommand::Add => {
                let mut prompt = LinePrompt {
                    input: &mut *input,
                    output: &mut *output,
                };
                let outcome = self.view.add(&mut prompt);
                self.render_outcome(outcome, output)
            }
            ShellCommand::Edit(token) => match self.resolve_key(&token) {
                Ok(key) => {
                    self.view.begin_edit(&key);
                    self.render_editing(output)
                }
                Err(message) => writeln!(output, "{message}"),
            },
            ShellCommand::Set(field, value) => {
                if self.view.edit_field(field, value) {
                    self.render_editing(output)
                } else {
                    writeln!(output, "no book is being edited (use `edit <key>`)")
                }
            }
            ShellCommand::Save => {
                if self.view.editing().is_none() {
                    return writeln!(output, "no book is being edited (use `edit <key>`)");
                }
                let outcome = self.view.commit_edit();
                self.render_outcome(outcome, output)
            }
            ShellCommand::Cancel => {
                self.view.cancel_edit();
                Ok(())
            }
            ShellCommand::Delete(token) => match self.resolve_key(&token) {
                Ok(key) => {
                    let mut prompt = LinePrompt {
                        input: &mut *input,
                        output: &mut *output,
                    };
                    let outcome = self.view.delete(&key, &mut prompt);
                    self.render_outcome(outcome, output)
                }
                Err(message) => writeln!(output, "{message}"),
            },
            ShellCommand::Retry => {
                if self.view.pending_retry().is_none() {
                    return writeln!(output, "nothing to retry");
                }
                let outcome = self.view.retry();
                self.render_outcome(outcome, output)
            }
            ShellCommand::Show => {
                self.render_draft(output)?;
                self.render_editing(output)
            }
            ShellCommand::Help => writeln!(output, "{HELP}"),
            ShellCommand::Quit => Ok(()),
        }
    }

    /// Full keys parse directly; anything else must prefix exactly one listed key.
    fn resolve_key(&self, token: &str) -> Result<BookKey, String> {
        if let Ok(key) = BookKey::parse(token) {
            return Ok(key);
        }
        let prefix = token.trim().to_ascii_lowercase();
        let mut matches = self
            .view
            .records()
            .iter()
            .map(|book| book.key)
            .filter(|key| key.to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(key), None) => Ok(key),
            (Some(_), Some(_)) => Err(format!("key prefix `{token}` is ambiguous")),
            (None, _) => Err(format!("no listed book matches `{token}`")),
        }
    }

    fn render_outcome<W: Write>(&self, outcome: Outcome, output: &mut W) -> io::Result<()> {
        if let Some(notification) = self.view.notification(Instant::now()) {
            writeln!(output, "{}", notification_text(notification, self.use_color))?;
        }
        match outcome {
            Outcome::Completed => writeln!(
                output,
                "{}",
                render_table(&BOOK_TABLE_HEADERS, &book_rows(self.view.records()))
            ),
            Outcome::Cancelled => writeln!(output, "cancelled"),
            Outcome::Rejected | Outcome::Failed(_) => Ok(()),
        }
    }

    fn render_draft<W: Write>(&self, output: &mut W) -> io::Result<()> {
        let draft = self.view.draft_new();
        writeln!(
            output,
            "new book: title={:?} author={:?} year={:?}",
            draft.title, draft.author, draft.year
        )
    }

    fn render_editing<W: Write>(&self, output: &mut W) -> io::Result<()> {
        match self.view.editing() {
            Some(draft) => {
                writeln!(output, "editing {}:", draft.key)?;
                for field in [Field::Title, Field::Author, Field::Year] {
                    let value = match field {
                        Field::Title => &draft.fields.title,
                        Field::Author => &draft.fields.author,
                        Field::Year => &draft.fields.year,
                    };
                    writeln!(output, "  {:<6} {value}", field_name(field))?;
                }
                Ok(())
            }
            None => writeln!(output, "no book is being edited"),
        }
    }
}

fn short_key(key: &BookKey) -> String {
    let hex = key.to_string();
    hex[hex.len() - 6..].to_string()
}

#[cfg(test)]
mod tests {
    use super::{Session, ShellCommand, is_affirmative};
    use book_inventory::api::{BookFields, LocalClient};
    use book_inventory::view::{BookView, Field};
    use std::io::Cursor;

    fn run_script(client: &LocalClient, script: &str) -> String {
        let mut session = Session::new(BookView::new(client), false);
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut output = Vec::new();
        session.run(&mut input, &mut output).expect("session");
        String::from_utf8(output).expect("utf8")
    }

    #[test]
    fn parses_commands_and_fields() {
        assert_eq!(ShellCommand::parse("   "), Ok(None));
        assert_eq!(
            ShellCommand::parse("new title Children of Dune"),
            Ok(Some(ShellCommand::New(
                Field::Title,
                "Children of Dune".to_string()
            )))
        );
        assert_eq!(
            ShellCommand::parse("set YEAR 1966\n"),
            Ok(Some(ShellCommand::Set(Field::Year, "1966".to_string())))
        );
        assert_eq!(
            ShellCommand::parse("delete abc"),
            Ok(Some(ShellCommand::Delete("abc".to_string())))
        );
        assert!(ShellCommand::parse("edit").is_err());
        assert!(ShellCommand::parse("new isbn 123").is_err());
        assert!(ShellCommand::parse("frobnicate").is_err());
    }

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }

    #[test]
    fn add_from_form_then_list() {
        let client = LocalClient::in_memory();
        let output = run_script(
            &client,
            "new title Dune\nnew author Frank Herbert\nnew year 1965\nadd\nquit\n",
        );
        let books = client.list_books().expect("list");
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].author, "Frank Herbert");
        assert!(output.contains("ok: Book added!"));
        assert!(output.contains("KEY"));
        assert!(output.contains("Frank Herbert"));
    }

    #[test]
    fn add_with_missing_field_alerts() {
        let client = LocalClient::in_memory();
        let output = run_script(&client, "new title Dune\nadd\n");
        assert!(output.contains("! Please fill all fields!"));
        assert!(client.list_books().expect("list").is_empty());
    }

    #[test]
    fn edit_by_prefix_and_save() {
        let client = LocalClient::in_memory();
        let created = client
            .create_book(&BookFields::new("Dune", "Herbert", "1965"))
            .expect("create");
        let prefix = &created.key.to_string()[..20];
        let script = format!("edit {prefix}\nset year 1966\nsave\n");
        let output = run_script(&client, &script);
        assert!(output.contains("ok: Book updated!"));
        assert_eq!(client.list_books().expect("list")[0].year, 1966);
    }

    #[test]
    fn delete_asks_on_the_same_stream() {
        let client = LocalClient::in_memory();
        let created = client
            .create_book(&BookFields::new("Dune", "Herbert", "1965"))
            .expect("create");
        let key = created.key.to_string();

        let output = run_script(&client, &format!("delete {key}\nn\n"));
        assert!(output.contains("Are you sure you want to delete this book? [y/N]"));
        assert!(output.contains("cancelled"));
        assert_eq!(client.list_books().expect("list").len(), 1);

        let output = run_script(&client, &format!("delete {key}\ny\n"));
        assert!(output.contains("notice: Book deleted!"));
        assert!(client.list_books().expect("list").is_empty());
    }

    #[test]
    fn unknown_key_is_reported() {
        let client = LocalClient::in_memory();
        let output = run_script(&client, "edit ffff\nsave\nretry\n");
        assert!(output.contains("no listed book matches `ffff`"));
        assert!(output.contains("no book is being edited"));
        assert!(output.contains("nothing to retry"));
    }
}
