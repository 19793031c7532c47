//! Interactive REPL.

use crate::commands::{call, empty_args, format_message};
use colored::Colorize;
use muxrpc_client::{Client, InboundMessage};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::sync::broadcast::{self, error::TryRecvError};

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  <Service.Method> [json]       Call a remote method (args default to {})
  pending                       Show the number of calls in flight
  messages                      Print unsolicited messages received so far
  status                        Show connection status

  quit, exit                    Exit the REPL
"#;

/// What the REPL should do with a line.
#[derive(Debug, PartialEq)]
enum Line {
    Help,
    Quit,
    Pending,
    Messages,
    Status,
    Call { method: String, args: Value },
}

fn parse_line(line: &str) -> Result<Line, Box<dyn std::error::Error>> {
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head.to_lowercase().as_str() {
        "help" | "?" => return Ok(Line::Help),
        "quit" | "exit" | "q" => return Ok(Line::Quit),
        "pending" => return Ok(Line::Pending),
        "messages" | "m" => return Ok(Line::Messages),
        "status" => return Ok(Line::Status),
        _ => {}
    }

    let args = if rest.is_empty() {
        empty_args()
    } else {
        serde_json::from_str(rest)?
    };
    Ok(Line::Call {
        method: head.to_string(),
        args,
    })
}

/// Formats every message buffered on `rx`, noting any that were lost to lag.
fn drain_messages(rx: &mut broadcast::Receiver<InboundMessage>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(message) => lines.push(format_message(&message)),
            Err(TryRecvError::Lagged(n)) => {
                lines.push(format!("{}: skipped {} messages", "Warning".yellow(), n));
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    lines
}

pub async fn run(client: Client, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "muxrpc CLI".bold().cyan());
    println!("{} {}", "Connected to".green(), addr);

    // Subscribe before the first prompt so nothing is missed
    let mut message_rx = client.subscribe_messages();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = home::home_dir()
        .map(|h| h.join(".muxrpc_history"))
        .unwrap_or_else(|| ".muxrpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "muxrpc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let parsed = match parse_line(line) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        println!("{}: {}\n", "Error".red(), e);
                        continue;
                    }
                };

                match parsed {
                    Line::Help => println!("{}", HELP_TEXT),
                    Line::Quit => break,
                    Line::Pending => println!("{} pending\n", client.pending_count()),
                    Line::Messages => {
                        let lines = drain_messages(&mut message_rx);
                        if lines.is_empty() {
                            println!("{}", "No messages".yellow());
                        }
                        for line in lines {
                            println!("{}", line);
                        }
                        println!();
                    }
                    Line::Status => {
                        if client.is_connected() {
                            println!("{} {}\n", "Connected".green(), addr);
                        } else {
                            println!("{}\n", "Disconnected".red());
                        }
                    }
                    Line::Call { method, args } => match call(&client, &method, args).await {
                        Ok(output) => println!("{}\n", output),
                        Err(e) => println!("{}: {}\n", "Error".red(), e),
                    },
                }

                if !client.is_connected() {
                    println!("{}", "Connection lost.".red());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use muxrpc_protocol::MessageKind;
    use serde_json::json;

    fn message(n: u8) -> InboundMessage {
        InboundMessage {
            kind: MessageKind::from_byte(0x30),
            message: Bytes::from(vec![0x30, b'0' + n]),
        }
    }

    #[test]
    fn test_drain_messages_continues_past_lag() {
        colored::control::set_override(false);

        let (tx, mut rx) = broadcast::channel(2);
        for n in 0..4 {
            tx.send(message(n)).unwrap();
        }

        let lines = drain_messages(&mut rx);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Warning: skipped 2 messages");
        // Only the two newest survive.
        assert_eq!(lines[1], "[30] 2");
        assert_eq!(lines[2], "[30] 3");

        assert!(drain_messages(&mut rx).is_empty());
    }

    #[test]
    fn test_parse_builtins() {
        assert_eq!(parse_line("help").unwrap(), Line::Help);
        assert_eq!(parse_line("EXIT").unwrap(), Line::Quit);
        assert_eq!(parse_line("pending").unwrap(), Line::Pending);
        assert_eq!(parse_line("m").unwrap(), Line::Messages);
    }

    #[test]
    fn test_parse_call() {
        assert_eq!(
            parse_line("LitRPC.Balance").unwrap(),
            Line::Call {
                method: "LitRPC.Balance".to_string(),
                args: json!({}),
            }
        );
        assert_eq!(
            parse_line("LitRPC.Send   {\"Amts\": [1000], \"DestAddrs\": [\"tb1q\"]}").unwrap(),
            Line::Call {
                method: "LitRPC.Send".to_string(),
                args: json!({"Amts": [1000], "DestAddrs": ["tb1q"]}),
            }
        );
    }

    #[test]
    fn test_parse_bad_json() {
        assert!(parse_line("LitRPC.Send {oops").is_err());
    }
}
