use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use chrono::Local;
use lmsconfig::get_config;
use lmscontrol::time_utils::parse_time_flexible;
use lmscontrol::{
    Command, Controller, ControllerConfigExt, ControllerEvent, HttpTransport, PlayerId, Seek,
    VolumeDirection,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  play | pause | stop | power [on|off]
  next | prev | index <n> | repeat <0-2> | shuffle <0-2>
  vol <0-10> | vol +<n> | vol -<n> | seek <[h:]m:ss> | seek +<n> | seek -<n>
  players | select <playerid> | status | help | quit";

#[tokio::main]
async fn main() -> Result<()> {
    let config = get_config();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().unwrap_or_default()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let settings = config.get_controller_settings()?;
    info!(server = %settings.server_url, "🎛️ Starting remote");

    let controller = Controller::new(settings, Arc::new(HttpTransport::new()))?;
    let events = controller.subscribe();
    controller.start();

    let printer = thread::spawn(move || {
        for event in events.iter() {
            if let Some(line) = describe(&event) {
                println!("[{}] {}", Local::now().format("%H:%M:%S"), line);
            }
        }
    });

    println!("{HELP}");
    let mut lines = spawn_stdin_reader();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.recv() => match line {
                Some(line) => {
                    if !execute(&controller, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    info!("Shutting down");
    controller.shutdown();
    drop(controller);
    let _ = printer.join();
    Ok(())
}

/// Reads stdin on a plain thread; the channel closes on EOF or a read error.
///
/// The thread is never joined, so a pending read does not hold up exit.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Runs one input line. Returns false when the user asked to quit.
async fn execute(controller: &Controller, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return true;
    };
    let arg = words.next();

    let outcome = match (verb, arg) {
        ("quit" | "exit", _) => return false,
        ("help", _) => {
            println!("{HELP}");
            Ok(())
        }
        ("status", _) => {
            println!("{:#?}", controller.status());
            Ok(())
        }
        ("players", _) => {
            controller.update_all();
            Ok(())
        }
        ("select", Some(id)) => match controller.select_player_by_id(&PlayerId::new(id)).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                println!("no such player: {id}");
                Ok(())
            }
            Err(e) => Err(e),
        },
        ("vol", Some(amount)) => volume(controller, amount).await,
        (verb, arg) => match command(verb, arg) {
            Some(command) => controller.player_control(command, false).await.map(|_| ()),
            None => {
                println!("unknown command: {line}");
                Ok(())
            }
        },
    };

    if let Err(e) = outcome {
        println!("error: {e}");
    }
    true
}

async fn volume(controller: &Controller, amount: &str) -> lmscontrol::Result<()> {
    let (direction, digits) = match amount.as_bytes().first() {
        Some(b'+') => (Some(VolumeDirection::Up), &amount[1..]),
        Some(b'-') => (Some(VolumeDirection::Down), &amount[1..]),
        _ => (None, amount),
    };
    match digits.parse::<u32>() {
        Ok(step) => controller.set_volume(step, direction).await.map(|_| ()),
        Err(_) => {
            println!("volume takes a step from 0 to 10");
            Ok(())
        }
    }
}

fn command(verb: &str, arg: Option<&str>) -> Option<Command> {
    let number = |arg: Option<&str>| arg.and_then(|a| a.parse::<usize>().ok());
    match verb {
        "play" => Some(Command::Play),
        "pause" => Some(Command::Pause(None)),
        "stop" => Some(Command::Stop),
        "power" => match arg {
            Some("on") => Some(Command::Power(Some(true))),
            Some("off") => Some(Command::Power(Some(false))),
            None => Some(Command::Power(None)),
            Some(_) => None,
        },
        "next" => Some(Command::Raw(vec!["playlist".into(), "index".into(), "+1".into()])),
        "prev" => Some(Command::Raw(vec!["playlist".into(), "index".into(), "-1".into()])),
        "index" => number(arg).map(Command::PlaylistIndex),
        "repeat" => number(arg).map(|m| Command::PlaylistRepeat(m.min(2) as u32)),
        "shuffle" => number(arg).map(|m| Command::PlaylistShuffle(m.min(2) as u32)),
        "seek" => {
            let arg = arg?;
            if arg.starts_with(['+', '-']) {
                let delta: f64 = arg.trim_start_matches('+').parse().ok()?;
                Some(Command::Time(Seek::Relative(delta)))
            } else {
                let seconds = parse_time_flexible(arg).ok()?;
                Some(Command::Time(Seek::Absolute(f64::from(seconds))))
            }
        }
        _ => None,
    }
}

fn describe(event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::PlayerSelected { player, .. } => Some(format!(
            "▶ player {} ({})",
            player.name.as_deref().unwrap_or("?"),
            player.playerid
        )),
        ControllerEvent::ServerStatus(status) => {
            let players: Vec<_> = status
                .players_loop
                .iter()
                .map(|p| format!("{} [{}]", p.name.as_deref().unwrap_or("?"), p.playerid))
                .collect();
            Some(format!("server: {}", players.join(", ")))
        }
        ControllerEvent::PlayerStateChange(result) => {
            let title = result
                .current_entry()
                .and_then(|e| e.title.as_deref())
                .unwrap_or("-");
            Some(format!("{:?} · {}", result.mode, title))
        }
        ControllerEvent::PlaylistChange(result) => {
            Some(format!("playlist: {} track(s)", result.playlist_tracks.unwrap_or(0)))
        }
        ControllerEvent::ShowBriefly(text) => Some(format!("» {text}")),
        ControllerEvent::ScannerUpdate(update) if update.rescan => Some(format!(
            "scanning {} {}/{}",
            update.progress_name.as_deref().unwrap_or(""),
            update.progress_done.unwrap_or(0),
            update.progress_total.unwrap_or(0)
        )),
        ControllerEvent::ScannerUpdate(update) => Some(match &update.last_scan_failed {
            Some(reason) => format!("scan failed: {reason}"),
            None => "scan done".to_string(),
        }),
        // too chatty for a terminal
        ControllerEvent::PlaytimeUpdate(_) | ControllerEvent::ButtonUpdate(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(command("play", None), Some(Command::Play));
        assert_eq!(command("power", Some("off")), Some(Command::Power(Some(false))));
        assert_eq!(command("index", Some("3")), Some(Command::PlaylistIndex(3)));
        assert_eq!(command("repeat", Some("7")), Some(Command::PlaylistRepeat(2)));
        assert_eq!(command("seek", Some("+15")), Some(Command::Time(Seek::Relative(15.0))));
        assert_eq!(command("seek", Some("-15")), Some(Command::Time(Seek::Relative(-15.0))));
        assert_eq!(command("seek", Some("90")), Some(Command::Time(Seek::Absolute(90.0))));
        assert_eq!(command("seek", Some("1:30")), Some(Command::Time(Seek::Absolute(90.0))));
        assert_eq!(command("index", Some("x")), None);
        assert_eq!(command("dance", None), None);
    }

    #[test]
    fn test_next_uses_relative_index() {
        let next = command("next", None).unwrap();
        assert_eq!(next.to_params(), vec!["playlist", "index", "+1"]);
    }
}
