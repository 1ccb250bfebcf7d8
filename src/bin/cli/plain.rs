use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use stomp_session::{DeliveryMode, SessionAdapter, SessionConfig, SessionError};

use super::args::Cli;
use super::commands::{CommandResult, execute_command, print_help};
use super::exit_codes;

/// Install a stderr subscriber. `RUST_LOG` wins over `--log`.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn config_from(cli: &Cli) -> SessionConfig {
    let mode = if cli.transactional {
        DeliveryMode::Transactional
    } else {
        DeliveryMode::Receipt
    };
    cli.headers.iter().fold(
        SessionConfig::new(&cli.url)
            .credentials(&cli.login, &cli.passcode)
            .delivery_mode(mode),
        |config, (k, v)| config.header(k, v),
    )
}

/// Map a session error to the message and exit code the process ends with.
pub fn exit_status(err: &SessionError) -> (String, u8) {
    let code = if err.is_configuration() {
        exit_codes::CONFIG_ERROR
    } else {
        exit_codes::CONNECTION_ERROR
    };
    (err.to_string(), code)
}

/// Run the interactive loop until `quit`, end of input or a fatal error.
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    println!("Connecting to {}...", cli.url);
    let mut session = SessionAdapter::open(config_from(cli))
        .await
        .map_err(|e| exit_status(&e))?;
    println!("Connected.");

    for queue in &cli.subscribe {
        match session.subscribe(queue).await {
            Ok(id) => println!("Subscribed to {} (id {})", queue, id),
            Err(e) => return Err(exit_status(&e)),
        }
    }

    // Channel to receive user commands from stdin reader
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);

    // Spawn blocking stdin reader
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.blocking_send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    println!();
    print_help();
    println!();

    let outcome = loop {
        print!("> ");
        let _ = io::stdout().flush();

        let Some(line) = cmd_rx.recv().await else {
            break Ok(());
        };

        match execute_command(&line, &mut session).await {
            CommandResult::Ok => {}
            CommandResult::Info(msg) => println!("{}", msg),
            CommandResult::Error(msg) => eprintln!("{}", msg),
            CommandResult::Quit => break Ok(()),
            CommandResult::Fatal(err) => break Err(exit_status(&err)),
        }
    };

    println!("Disconnecting...");
    session.close().await;
    outcome
}
