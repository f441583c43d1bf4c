//! Line-oriented chat client over stdin/stdout.

use potluck_backend::Backend;
use potluck_chat::typing::typing_summary;
use potluck_chat::{ChatEvent, ChatSession, Message};
use potluck_common::PotluckError;
use potluck_config::ChatConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(String),
    Delete(String),
    Reload,
    Quit,
    Unknown(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };
    match command.split_once(char::is_whitespace) {
        Some(("delete", id)) if !id.trim().is_empty() => Input::Delete(id.trim().to_string()),
        None if command == "reload" => Input::Reload,
        None if command == "quit" => Input::Quit,
        _ => Input::Unknown(trimmed.to_string()),
    }
}

fn render(msg: &Message) -> String {
    format!(
        "[{}] {} ({}): {}  #{}",
        msg.created_at.format("%H:%M"),
        msg.user_email,
        msg.user_role,
        msg.content,
        msg.id
    )
}

pub async fn run(backend: &Backend, config: &ChatConfig) -> Result<(), PotluckError> {
    let (mut session, mut events) = ChatSession::start(backend, config).await;

    for msg in session.messages().await {
        println!("{}", render(&msg));
    }
    if session.history_failed().await {
        println!("(could not load history)");
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::MessageAdded(msg) => println!("{}", render(&msg)),
                ChatEvent::MessageRemoved { id } => println!("(message {id} deleted)"),
                ChatEvent::TypingChanged(users) => {
                    if let Some(summary) = typing_summary(&users) {
                        println!("({summary})");
                    }
                }
                ChatEvent::HistoryLoaded { count, failed } => {
                    if failed {
                        println!("(could not load history)");
                    } else {
                        println!("(history reloaded, {count} messages)");
                    }
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Reload => session.reload().await,
            Input::Delete(id) => {
                if let Err(e) = session.delete(&id).await {
                    warn!(id = %id, error = %e, "Delete failed");
                    println!("(delete failed: {e})");
                }
            }
            Input::Send(body) => {
                session.notify_typing().await;
                if let Err(e) = session.send(&body).await {
                    println!("(send failed: {e})");
                }
            }
            Input::Unknown(command) => println!("(unknown command {command})"),
        }
    }

    session.close().await;
    drop(session);
    let _ = printer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_lines() {
        assert_eq!(parse_input("  "), Input::Empty);
        assert_eq!(parse_input("hi all "), Input::Send("hi all ".into()));
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input(" /reload "), Input::Reload);
        assert_eq!(parse_input("/delete  abc "), Input::Delete("abc".into()));
        assert_eq!(parse_input("/delete"), Input::Unknown("/delete".into()));
        assert_eq!(parse_input("/dance"), Input::Unknown("/dance".into()));
    }
}
