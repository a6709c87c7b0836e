// examples/watch_player.rs
//
// Prints every controller event as it happens:
//   - polls the server given on the command line (or the configured one)
//   - selects the player whose id is given as second argument, if any
//   - shows the playtime once per tick on a single line
//
// Run from the lmscontrol crate:
//   cargo run --example watch_player -- http://lms.local:9000/
//   cargo run --example watch_player -- http://lms.local:9000/ 00:04:20:aa:bb:cc
//
// Ctrl-C to quit.

use std::env;
use std::io::Write;
use std::sync::Arc;

use lmsconfig::get_config;
use lmscontrol::{
    Controller, ControllerConfigExt, ControllerEvent, HttpTransport, PlayerId, Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let args: Vec<String> = env::args().collect();
    let mut settings = get_config().get_controller_settings()?;
    if let Some(url) = args.get(1) {
        settings = settings.with_server_url(url.as_str());
    }
    if let Some(id) = args.get(2) {
        settings = settings.with_preferred_player(Some(PlayerId::new(id.as_str())));
    }

    println!("Watching {}", settings.server_url);
    let controller = Controller::new(settings, Arc::new(HttpTransport::new()))?;
    let events = controller.subscribe();
    controller.start();

    // crossbeam receivers block, keep them off the runtime
    let printer = std::thread::spawn(move || {
        for event in events.iter() {
            print_event(&event);
        }
    });

    let _ = tokio::signal::ctrl_c().await;
    println!();
    controller.shutdown();
    drop(controller);
    let _ = printer.join();
    Ok(())
}

fn print_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::PlayerSelected { player, previous } => {
            let name = player.name.as_deref().unwrap_or(player.playerid.as_str());
            match previous {
                Some(prev) => println!("player: {} (was {})", name, prev.playerid),
                None => println!("player: {}", name),
            }
        }
        ControllerEvent::ServerStatus(status) => {
            println!(
                "server: {} player(s), rescan={}",
                status.players_loop.len(),
                status.rescan
            );
        }
        ControllerEvent::PlayerStateChange(result) => {
            let title = result
                .current_entry()
                .and_then(|e| e.title.as_deref())
                .unwrap_or("-");
            println!(
                "state: mode={:?} index={:?} title={}",
                result.mode, result.playlist_cur_index, title
            );
        }
        ControllerEvent::PlaylistChange(result) => {
            println!("playlist: {:?} track(s)", result.playlist_tracks);
        }
        ControllerEvent::PlaytimeUpdate(playtime) => {
            print!(
                "\r{} {}    ",
                playtime.elapsed_label(),
                playtime.remaining_label()
            );
            let _ = std::io::stdout().flush();
        }
        ControllerEvent::ShowBriefly(text) => println!("\n>> {}", text),
        ControllerEvent::ScannerUpdate(update) => {
            if update.rescan {
                println!(
                    "scan: {} {}/{}",
                    update.progress_name.as_deref().unwrap_or(""),
                    update.progress_done.unwrap_or(0),
                    update.progress_total.unwrap_or(0)
                );
            } else {
                println!("scan: done");
            }
        }
        ControllerEvent::ButtonUpdate(_) => {}
    }
}
