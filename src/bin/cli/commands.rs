use stomp_session::{Connector, Frame, SessionAdapter, SessionError};

/// Result of executing a command
pub enum CommandResult {
    /// Command executed successfully
    Ok,
    /// Command produced a line of output
    Info(String),
    /// Command requests exit
    Quit,
    /// Error executing command
    Error(String),
    /// The session could not reach any broker
    Fatal(SessionError),
}

impl From<Result<(), SessionError>> for CommandResult {
    fn from(result: Result<(), SessionError>) -> Self {
        match result {
            Ok(()) => CommandResult::Ok,
            Err(e) => failure(e),
        }
    }
}

/// Connection failures end the loop; anything else is reported and the
/// prompt comes back.
fn failure(err: SessionError) -> CommandResult {
    if err.is_connection() {
        CommandResult::Fatal(err)
    } else {
        CommandResult::Error(err.to_string())
    }
}

/// Parse and execute a command
pub async fn execute_command<C: Connector>(
    line: &str,
    session: &mut SessionAdapter<C>,
) -> CommandResult {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    if parts.is_empty() || parts[0].is_empty() {
        return CommandResult::Ok;
    }

    match parts[0] {
        "quit" | "exit" | "q" => CommandResult::Quit,

        "send" => {
            if parts.len() < 3 {
                return CommandResult::Error("Usage: send <destination> <message>".to_string());
            }
            let headers = [("content-type".to_string(), "text/plain".to_string())];
            session.send(parts[1], parts[2], &headers).await.into()
        }

        "sub" | "subscribe" => {
            let Some(queue) = parts.get(1) else {
                return CommandResult::Error("Usage: sub <queue>".to_string());
            };
            match session.subscribe(queue).await {
                Ok(id) => CommandResult::Info(format!("Subscribed to {} (id {})", queue, id)),
                Err(e) => failure(e),
            }
        }

        "unsub" | "unsubscribe" => {
            let Some(queue) = parts.get(1) else {
                return CommandResult::Error("Usage: unsub <queue>".to_string());
            };
            session.unsubscribe(queue).await.into()
        }

        "poll" => match session.get_next_message().await {
            Ok(Some(frame)) => CommandResult::Info(format_message(&frame)),
            Ok(None) => CommandResult::Info("No message waiting".to_string()),
            Err(e) => failure(e),
        },

        "ack" | "nack" => {
            let Some(id) = parts.get(1) else {
                return CommandResult::Error(format!("Usage: {} <id>", parts[0]));
            };
            let outcome = if parts[0] == "ack" {
                session.ack(*id).await
            } else {
                session.nack(*id).await
            };
            match outcome {
                Ok(true) => CommandResult::Ok,
                Ok(false) => CommandResult::Error(format!("{} {} was not accepted", parts[0], id)),
                Err(e) => failure(e),
            }
        }

        "reconnect" => match session.reconnect().await {
            Ok(()) => CommandResult::Info(format!(
                "Reconnected, {} subscription(s) restored",
                session.active_queues().len()
            )),
            Err(e) => failure(e),
        },

        "status" => CommandResult::Info(status(session)),

        "help" | "?" => {
            print_help();
            CommandResult::Ok
        }

        _ => CommandResult::Error(format!("Unknown command: {}. Type 'help' for commands.", parts[0])),
    }
}

fn status<C: Connector>(session: &SessionAdapter<C>) -> String {
    let mut out = format!(
        "connected: {}\ndelivery: {:?}\nbrokers: {}",
        session.is_connected(),
        session.delivery_mode(),
        session.hosts().as_slice().join(", ")
    );
    let active = session.active_queues();
    if active.is_empty() {
        out.push_str("\nsubscriptions: none");
    } else {
        out.push_str(&format!("\nsubscriptions: {}", active.join(", ")));
    }
    for (host, reason) in session.last_errors() {
        out.push_str(&format!("\nlast error [{}]: {}", host, reason));
    }
    out
}

/// Render a received frame the way the prompt prints it.
pub fn format_message(frame: &Frame) -> String {
    let mut out = format!("{} received:", frame.command);
    for (k, v) in &frame.headers {
        out.push_str(&format!("\n  {}: {}", k, v));
    }
    if !frame.body.is_empty() {
        match frame.body_str() {
            Some(s) => out.push_str(&format!("\n  Body: {}", s)),
            None => out.push_str(&format!("\n  Body: ({} bytes, binary)", frame.body.len())),
        }
    }
    out
}

/// Print help text
pub fn print_help() {
    println!("Commands:");
    println!("  send <destination> <message>  - Send a message");
    println!("  sub <queue>                   - Subscribe to a queue");
    println!("  unsub <queue>                 - Unsubscribe from a queue");
    println!("  poll                          - Show the next received message, if any");
    println!("  ack <id>                      - Acknowledge a message");
    println!("  nack <id>                     - Reject a message for redelivery");
    println!("  reconnect                     - Reconnect and restore subscriptions");
    println!("  status                        - Show connection and subscriptions");
    println!("  quit                          - Exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_rendering_includes_headers_and_body() {
        let frame = Frame::new("MESSAGE")
            .header("message-id", "m-1")
            .set_body(b"hi".to_vec());
        assert_eq!(
            format_message(&frame),
            "MESSAGE received:\n  message-id: m-1\n  Body: hi"
        );
    }

    #[test]
    fn binary_body_is_summarised() {
        let frame = Frame::new("MESSAGE").set_body(vec![0xff, 0x00]);
        assert!(format_message(&frame).ends_with("(2 bytes, binary)"));
    }

    #[tokio::test]
    async fn poll_hands_out_buffered_messages_then_reports_a_lost_broker() {
        use std::time::Duration;
        use stomp_session::SessionConfig;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = format!("tcp://{}", listener.local_addr().unwrap());
        let (hangup_tx, hangup_rx) = oneshot::channel::<()>();
        let broker = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            drop(listener);
            let mut connect = Vec::new();
            while !connect.contains(&0) {
                let mut chunk = [0u8; 256];
                let n = stream.read(&mut chunk).await.unwrap();
                connect.extend_from_slice(&chunk[..n]);
            }
            stream
                .write_all(b"CONNECTED\nversion:1.2\n\n\0MESSAGE\nmessage-id:m-1\n\nhello\0")
                .await
                .unwrap();
            let _ = hangup_rx.await;
        });

        let mut session = SessionAdapter::open(SessionConfig::new(uri)).await.unwrap();

        let mut shown = None;
        for _ in 0..100 {
            match execute_command("poll", &mut session).await {
                CommandResult::Info(msg) if msg.starts_with("MESSAGE received") => {
                    shown = Some(msg);
                    break;
                }
                CommandResult::Info(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                _ => panic!("poll failed while the broker was up"),
            }
        }
        assert!(shown.is_some_and(|msg| msg.ends_with("Body: hello")));
        assert!(matches!(
            execute_command("poll", &mut session).await,
            CommandResult::Info(ref msg) if msg == "No message waiting"
        ));

        hangup_tx.send(()).unwrap();
        broker.await.unwrap();
        let mut lost = false;
        for _ in 0..100 {
            match execute_command("poll", &mut session).await {
                CommandResult::Fatal(err) => {
                    assert!(err.is_connection());
                    lost = true;
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert!(lost, "poll never reported the lost broker");
    }
}
