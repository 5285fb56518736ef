//! Application entry point — terminal voice session client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the [`SessionManager`].
//! 4. Start a session against the configured agent.
//! 5. Run the command loop: stdin commands (`start`, `stop`, `mute`,
//!    `clear`, `quit`) interleaved with a poll that prints state changes
//!    and new transcript lines.
//!
//! The terminal front-end only reads the manager's public surface; all
//! session logic lives in the library.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use voice_session::config::AppConfig;
use voice_session::session::{SessionManager, VoiceState};

fn print_help() {
    println!("commands: start | stop | mute | clear | quit");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice session client starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    log::info!(
        "agent={} handshake={}",
        config.agent.agent_id,
        config.agent.handshake_url
    );

    // 3. Session manager
    let manager = SessionManager::new(config);

    // 4. First session
    match manager.start_session().await {
        Ok(()) => println!("session started — listening"),
        Err(e) => eprintln!("could not start session: {e}"),
    }
    print_help();

    // 5. Command loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(Duration::from_millis(200));
    let mut last_state = manager.voice_state();
    let mut printed_entries = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "start" => match manager.start_session().await {
                        Ok(()) => {
                            printed_entries = 0;
                            println!("session started — listening");
                        }
                        Err(e) => eprintln!("could not start session: {e}"),
                    },
                    "stop" => {
                        manager.end_session();
                        println!("session ended");
                    }
                    "mute" => {
                        let muted = manager.toggle_mute();
                        println!("microphone {}", if muted { "muted" } else { "live" });
                    }
                    "clear" => {
                        manager.clear_transcript();
                        printed_entries = 0;
                        println!("transcript cleared");
                    }
                    "quit" | "exit" => break,
                    "" => {}
                    _ => print_help(),
                }
            }
            _ = poll.tick() => {
                let state = manager.voice_state();
                if state != last_state {
                    println!("[{}]", state.label());
                    if state == VoiceState::Error {
                        if let Some(error) = manager.error() {
                            eprintln!("session error: {error}");
                        }
                    }
                    last_state = state;
                }

                let transcript = manager.transcript();
                for entry in transcript.iter().skip(printed_entries) {
                    let who = match entry.role {
                        voice_session::session::SpeakerRole::User => "you",
                        voice_session::session::SpeakerRole::Assistant => "agent",
                    };
                    println!("{who}: {}", entry.text);
                }
                printed_entries = transcript.len();
            }
        }
    }

    manager.end_session();
    log::info!("voice session client exiting");
    Ok(())
}
