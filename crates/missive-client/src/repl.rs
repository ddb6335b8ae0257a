//! Interactive session: command parsing, request/reply rendering, pushes.
//!
//! One request is in flight at a time. Deliveries pushed by the server can
//! arrive at any point, including between a request and its reply, and are
//! rendered as they come in.

use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use missive_core::{MessageId, hash_password};
use missive_protocol::{
    AccountPage, Action, Envelope, ErrorInfo, InboxPage, LoginOk, MessageView, RawFrame, Request,
    SendMessageOk, UsernameStatus,
};

use crate::error::{ClientError, ClientResult};
use crate::socket::{FrameReader, FrameWriter};

/// Page size used when a listing command gives no explicit limit.
const DEFAULT_PAGE_SIZE: u32 = 25;

const HELP: &str = "\
commands:
  /check <username>              see whether a username is free
  /login <username> <password>   log in, creating the account if needed
  /accounts [search] [offset] [limit]
                                 list accounts, optionally filtered
  /send <recipient> <message>    send a message
  /inbox [limit]                 fetch messages that arrived while you were away
  /read [limit]                  mark fetched messages seen and show them
  /delete <message-id>           delete a message you received
  /delete-account <password>     delete your account and end the session
  /ping                          check that the server is alive
  /quit                          leave";

/// A parsed interactive command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check { username: String },
    Login { username: String, password: String },
    Accounts { search: String, offset: u32, limit: u32 },
    Send { recipient: String, body: String },
    Inbox { limit: u32 },
    Read { limit: u32 },
    Delete { message_id: MessageId },
    DeleteAccount { password: String },
    Ping,
    Help,
    Quit,
}

/// Splits the first whitespace-separated word off a line.
fn split_first(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(at) => (&line[..at], line[at..].trim_start()),
        None => (line, ""),
    }
}

fn parse_number(arg: Option<&str>, default: u32, what: &str) -> Result<u32, String> {
    match arg {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("'{}' is not a valid {}", raw, what)),
    }
}

fn single_limit(rest: &str, command: &str) -> Result<u32, String> {
    let mut args = rest.split_whitespace();
    let limit = parse_number(args.next(), DEFAULT_PAGE_SIZE, "limit")?;
    if args.next().is_some() {
        return Err(format!("usage: {} [limit]", command));
    }
    Ok(limit)
}

fn no_args(rest: &str, command: Command, name: &str) -> Result<Command, String> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(format!("usage: {}", name))
    }
}

impl Command {
    /// Parses one input line.
    ///
    /// Returns `Ok(None)` for blank lines and a usage hint for bad input.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let (head, rest) = split_first(line);
        if head.is_empty() {
            return Ok(None);
        }

        let command = match head {
            "/check" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next()) {
                    (Some(username), None) => Command::Check {
                        username: username.to_string(),
                    },
                    _ => return Err("usage: /check <username>".into()),
                }
            }
            "/login" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(username), Some(password), None) => Command::Login {
                        username: username.to_string(),
                        password: password.to_string(),
                    },
                    _ => return Err("usage: /login <username> <password>".into()),
                }
            }
            "/accounts" => {
                let mut args = rest.split_whitespace();
                let search = args.next().unwrap_or("").to_string();
                let offset = parse_number(args.next(), 0, "offset")?;
                let limit = parse_number(args.next(), DEFAULT_PAGE_SIZE, "limit")?;
                if args.next().is_some() {
                    return Err("usage: /accounts [search] [offset] [limit]".into());
                }
                Command::Accounts {
                    search,
                    offset,
                    limit,
                }
            }
            "/send" => {
                // The body is the rest of the line verbatim, inner spacing kept.
                let (recipient, body) = split_first(rest);
                if recipient.is_empty() || body.is_empty() {
                    return Err("usage: /send <recipient> <message>".into());
                }
                Command::Send {
                    recipient: recipient.to_string(),
                    body: body.to_string(),
                }
            }
            "/inbox" => Command::Inbox {
                limit: single_limit(rest, "/inbox")?,
            },
            "/read" => Command::Read {
                limit: single_limit(rest, "/read")?,
            },
            "/delete" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next()) {
                    (Some(raw), None) => Command::Delete {
                        message_id: raw
                            .parse()
                            .map_err(|_| format!("'{}' is not a message id", raw))?,
                    },
                    _ => return Err("usage: /delete <message-id>".into()),
                }
            }
            "/delete-account" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next()) {
                    (Some(password), None) => Command::DeleteAccount {
                        password: password.to_string(),
                    },
                    _ => return Err("usage: /delete-account <password>".into()),
                }
            }
            "/ping" => no_args(rest, Command::Ping, "/ping")?,
            "/help" => no_args(rest, Command::Help, "/help")?,
            "/quit" | "/exit" => no_args(rest, Command::Quit, "/quit")?,
            other => return Err(format!("unknown command '{}'; type /help", other)),
        };
        Ok(Some(command))
    }
}

/// One rendered line for a message, used for listings and pushes alike.
fn message_line(view: &MessageView) -> String {
    format!(
        "[{}] {} <{}> {} ({})",
        view.message_id,
        view.created_at.format("%Y-%m-%d %H:%M"),
        view.sender,
        view.body,
        view.status
    )
}

/// Whether the session keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Continue,
    Done,
}

enum Step {
    Server(ClientResult<Option<RawFrame>>),
    Input(Option<String>),
}

/// Interactive client session over one server connection.
pub struct Repl {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Repl {
    /// Creates a session over an established connection.
    pub fn new(reader: FrameReader, writer: FrameWriter) -> Self {
        Self { reader, writer }
    }

    /// Runs the interactive loop until the user quits, stdin closes, or the
    /// server hangs up.
    pub async fn run(mut self) -> ClientResult<()> {
        output("*** connected; type /help for commands").await?;

        let mut input = stdin_lines();
        loop {
            let step = tokio::select! {
                frame = self.reader.next_frame() => Step::Server(frame),
                line = input.recv() => Step::Input(line),
                _ = tokio::signal::ctrl_c() => Step::Input(None),
            };

            match step {
                Step::Server(frame) => match frame? {
                    Some(frame) => self.handle_push(&frame).await?,
                    None => {
                        output("*** server closed the connection").await?;
                        break;
                    }
                },
                Step::Input(None) => break,
                Step::Input(Some(line)) => match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(command)) => {
                        if self.execute(command).await? == Outcome::Done {
                            break;
                        }
                    }
                    Err(hint) => alert(&hint).await?,
                },
            }
        }

        self.writer.shutdown().await;
        Ok(())
    }

    /// Sends the request for a command and renders the reply.
    async fn execute(&mut self, command: Command) -> ClientResult<Outcome> {
        let request = match command {
            Command::Help => {
                output(HELP).await?;
                return Ok(Outcome::Continue);
            }
            Command::Quit => return Ok(Outcome::Done),
            Command::Check { username } => Request::check_username(username),
            Command::Login { username, password } => {
                Request::login(username, hash_password(&password))
            }
            Command::Accounts {
                search,
                offset,
                limit,
            } => Request::list_accounts(search, offset, limit),
            Command::Send { recipient, body } => Request::send_message(recipient, body, Utc::now()),
            Command::Inbox { limit } => Request::check_inbox(limit),
            Command::Read { limit } => Request::read_messages(limit),
            Command::Delete { message_id } => Request::delete_message(message_id),
            Command::DeleteAccount { password } => {
                Request::delete_account(hash_password(&password))
            }
            Command::Ping => Request::Ping,
        };
        self.roundtrip(request).await
    }

    /// Writes one request and waits for its reply, rendering any deliveries
    /// that arrive in between.
    async fn roundtrip(&mut self, request: Request) -> ClientResult<Outcome> {
        let action = request.action();
        debug!(action = %action, "sending request");
        self.writer.send(&request).await?;

        loop {
            let Some(frame) = self.reader.next_frame().await? else {
                output("*** server closed the connection").await?;
                return Ok(Outcome::Done);
            };
            if frame.action == Action::DeliverMessage {
                self.handle_push(&frame).await?;
                continue;
            }
            if frame.action != action {
                return Err(ClientError::Protocol(format!(
                    "expected a {} reply, got {}",
                    action, frame.action
                )));
            }
            return self.render_reply(&frame).await;
        }
    }

    /// Renders a message the server pushed at us.
    async fn handle_push(&mut self, frame: &RawFrame) -> ClientResult<()> {
        if frame.action != Action::DeliverMessage {
            return Err(ClientError::Protocol(format!(
                "unsolicited {} frame",
                frame.action
            )));
        }
        let envelope: Envelope<MessageView> = self.decode(frame)?;
        match envelope.body {
            Some(view) => output(&message_line(&view)).await,
            None => Err(ClientError::Protocol("delivery push without a body".into())),
        }
    }

    fn decode<T: DeserializeOwned>(&self, frame: &RawFrame) -> ClientResult<Envelope<T>> {
        Ok(Envelope::from_content(self.writer.mode(), &frame.content)?)
    }

    async fn render_reply(&mut self, frame: &RawFrame) -> ClientResult<Outcome> {
        match frame.action {
            Action::CheckUsername => {
                let envelope: Envelope<UsernameStatus> = self.decode(frame)?;
                match envelope.body {
                    Some(status) if status.available => {
                        output(&format!("*** '{}' is available", status.username)).await?;
                    }
                    Some(status) => {
                        output(&format!("*** '{}' is taken", status.username)).await?;
                    }
                    None => render_error(envelope.as_error()).await?,
                }
            }
            Action::Login => {
                let envelope: Envelope<LoginOk> = self.decode(frame)?;
                match envelope.body {
                    Some(login) if login.created => {
                        output(&format!(
                            "*** welcome, {}! your account was created",
                            login.username
                        ))
                        .await?;
                    }
                    Some(login) => {
                        output(&format!(
                            "*** logged in as {}; {} pending message(s)",
                            login.username, login.pending_count
                        ))
                        .await?;
                    }
                    None => render_error(envelope.as_error()).await?,
                }
            }
            Action::ListAccounts => {
                let envelope: Envelope<AccountPage> = self.decode(frame)?;
                match envelope.body {
                    Some(page) => {
                        output(&format!("*** {} account(s) total", page.total)).await?;
                        for account in &page.accounts {
                            output(&format!("  - {}", account.username)).await?;
                        }
                    }
                    None => render_error(envelope.as_error()).await?,
                }
            }
            Action::SendMessage => {
                let envelope: Envelope<SendMessageOk> = self.decode(frame)?;
                match envelope.body {
                    Some(sent) if sent.delivered => {
                        output(&format!("*** delivered (message {})", sent.message_id)).await?;
                    }
                    Some(sent) => {
                        output(&format!(
                            "*** recipient is offline; queued (message {})",
                            sent.message_id
                        ))
                        .await?;
                    }
                    None => render_error(envelope.as_error()).await?,
                }
            }
            Action::CheckInbox | Action::ReadMessages => {
                let empty_note = if frame.action == Action::CheckInbox {
                    "*** no new messages"
                } else {
                    "*** nothing to read"
                };
                let envelope: Envelope<InboxPage> = self.decode(frame)?;
                match envelope.body {
                    Some(page) if page.messages.is_empty() => output(empty_note).await?,
                    Some(page) => {
                        for view in &page.messages {
                            output(&message_line(view)).await?;
                        }
                    }
                    None => render_error(envelope.as_error()).await?,
                }
            }
            Action::DeleteMessage => {
                let envelope: Envelope<()> = self.decode(frame)?;
                if envelope.success {
                    output("*** message deleted").await?;
                } else {
                    render_error(envelope.as_error()).await?;
                }
            }
            Action::DeleteAccount => {
                let envelope: Envelope<()> = self.decode(frame)?;
                if envelope.success {
                    output("*** account deleted, goodbye").await?;
                    return Ok(Outcome::Done);
                }
                render_error(envelope.as_error()).await?;
            }
            Action::Ping => {
                let envelope: Envelope<()> = self.decode(frame)?;
                if envelope.success {
                    output("*** pong").await?;
                } else {
                    render_error(envelope.as_error()).await?;
                }
            }
            Action::DeliverMessage => {
                return Err(ClientError::Protocol(
                    "delivery frame in a reply position".into(),
                ));
            }
        }
        Ok(Outcome::Continue)
    }
}

/// Reads stdin line by line on a dedicated task.
///
/// `recv` is cancellation safe, so racing it against the socket in `select!`
/// cannot drop a typed line; `read_line` gives no such guarantee.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

async fn render_error(error: Option<&ErrorInfo>) -> ClientResult<()> {
    match error {
        Some(error) if !error.message.is_empty() => alert(&error.message).await,
        Some(error) => alert(error.kind.description()).await,
        None => {
            warn!("failure envelope without error details");
            alert("request failed").await
        }
    }
}

async fn output(line: &str) -> ClientResult<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn alert(message: &str) -> ClientResult<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(b"!!! ").await?;
    stderr.write_all(message.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use missive_core::MessageStatus;

    #[test]
    fn blank_lines_parse_to_nothing() {
        assert_eq!(Command::parse(""), Ok(None));
        assert_eq!(Command::parse("   \n"), Ok(None));
    }

    #[test]
    fn send_keeps_inner_spacing() {
        let command = Command::parse("/send bob hello   there, bob\n").unwrap();
        assert_eq!(
            command,
            Some(Command::Send {
                recipient: "bob".into(),
                body: "hello   there, bob".into(),
            })
        );
    }

    #[test]
    fn send_without_a_body_is_a_usage_error() {
        assert!(Command::parse("/send bob").is_err());
        assert!(Command::parse("/send").is_err());
    }

    #[test]
    fn accounts_defaults_and_overrides() {
        assert_eq!(
            Command::parse("/accounts").unwrap(),
            Some(Command::Accounts {
                search: "".into(),
                offset: 0,
                limit: DEFAULT_PAGE_SIZE,
            })
        );
        assert_eq!(
            Command::parse("/accounts al 10 5").unwrap(),
            Some(Command::Accounts {
                search: "al".into(),
                offset: 10,
                limit: 5,
            })
        );
        assert!(Command::parse("/accounts al ten").is_err());
    }

    #[test]
    fn delete_needs_a_numeric_id() {
        assert_eq!(
            Command::parse("/delete 42").unwrap(),
            Some(Command::Delete { message_id: 42 })
        );
        assert!(Command::parse("/delete forty-two").is_err());
        assert!(Command::parse("/delete").is_err());
    }

    #[test]
    fn login_requires_both_fields() {
        assert_eq!(
            Command::parse("/login alice sesame").unwrap(),
            Some(Command::Login {
                username: "alice".into(),
                password: "sesame".into(),
            })
        );
        assert!(Command::parse("/login alice").is_err());
    }

    #[test]
    fn bare_words_are_rejected_with_a_hint() {
        let err = Command::parse("hello bob").unwrap_err();
        assert!(err.contains("/help"), "hint was: {}", err);
    }

    #[test]
    fn quit_and_exit_are_the_same() {
        assert_eq!(Command::parse("/quit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("/exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn message_lines_show_id_sender_and_status() {
        let view = MessageView {
            message_id: 7,
            sender: "alice".into(),
            body: "see you at noon".into(),
            status: MessageStatus::Delivered,
            created_at: chrono::Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 0).unwrap(),
        };
        assert_eq!(
            message_line(&view),
            "[7] 2024-05-04 12:30 <alice> see you at noon (delivered)"
        );
    }
}
