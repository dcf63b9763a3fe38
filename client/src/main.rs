use clap::Parser;
use client::events::ServerEvent;
use client::game::ClientGameState;
use client::input::{ConsoleInput, InputManager};
use client::{Client, ClientConfig, ClientError};
use log::{debug, error, info, warn};
use shared::{AuthResult, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use std::io;
use std::net::IpAddr;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Server reliable (TCP) port
    #[arg(short = 't', long, default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,

    /// Server unreliable (UDP) port
    #[arg(short = 'u', long, default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

    /// Account name
    #[arg(short = 'n', long)]
    name: String,

    /// Account password
    #[arg(short = 'p', long)]
    password: String,

    /// Shared key for the wire transform, must match the server
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Connect messages sent before giving up
    #[arg(long, default_value = "5")]
    attempts: u32,
}

enum Next {
    Line(io::Result<Option<String>>),
    Event(Result<ServerEvent, ClientError>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ClientConfig {
        handshake_attempts: args.attempts,
        cipher_key: args.key,
        ..ClientConfig::for_server(args.host, args.tcp_port, args.udp_port)
    };

    info!("Starting client...");
    let mut client = Client::connect(&config).await?;

    let result = client.authenticate(&args.name, &args.password).await?;
    if result != AuthResult::Valid {
        error!("Login as '{}' refused: {:?}", args.name, result);
        client.disconnect().await?;
        return Ok(());
    }
    client.spawn().await?;

    let mut state = ClientGameState::new(client.id());
    let mut input = InputManager::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Controls: w/a/s/d toggle movement, stop, attack, look, /<command>, quit");

    loop {
        let next = tokio::select! {
            line = lines.next_line() => Next::Line(line),
            event = client.next_event() => Next::Event(event),
        };

        match next {
            Next::Line(line) => {
                let Some(line) = line? else {
                    break;
                };
                let inputs = match input.handle_line(&line) {
                    Ok(inputs) => inputs,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                if run_inputs(&mut client, &mut state, inputs).await? {
                    break;
                }
            }
            Next::Event(event) => {
                let event = match event {
                    Ok(event) => event,
                    Err(ClientError::Decode(e)) => {
                        warn!("Dropping malformed message: {}", e);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                debug!("{:?}", event);
                match &event {
                    ServerEvent::EntityCreated(entity) => {
                        info!("{} '{}' entered the world", entity.id, entity.name.0)
                    }
                    ServerEvent::EntityDestroyed(id) => info!("{} left the world", id),
                    ServerEvent::Disconnected => {
                        info!("Server closed the session");
                        return Ok(());
                    }
                    _ => {}
                }
                state.apply(&event);
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

/// Returns true once the user asked to quit
async fn run_inputs(
    client: &mut Client,
    state: &mut ClientGameState,
    inputs: Vec<ConsoleInput>,
) -> Result<bool, ClientError> {
    for input in inputs {
        match input {
            ConsoleInput::Action(action, action_state) => {
                client.action(action, action_state).await?
            }
            ConsoleInput::Command(line) => client.command(&line).await?,
            ConsoleInput::Look => match client.request_world_state().await {
                Ok(entities) => {
                    state.apply(&ServerEvent::WorldState(entities));
                    println!("{}", state.describe());
                }
                Err(e) => warn!("World state request failed: {}", e),
            },
            ConsoleInput::Quit => return Ok(true),
        }
    }
    Ok(false)
}
