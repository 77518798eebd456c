//! Console stand-in for the mix surface.
//!
//! Connects to the render service, sends a slowly drifting snapshot on an
//! interval and logs what comes back.  Run with `RUST_LOG=info` (or debug)
//! to see the channel at work.
use std::{path::PathBuf, thread::sleep, time::Duration};

use clap::Parser;
use log::{info, warn};

use fuzzymix::{
    channel::{handle::PlayableHandle, settings::default_params, snapshot::Deck},
    common::{box_error::BoxError, config::Config},
    utils::get_micro_time,
    ChannelSettings, ControlChannel, ControlSnapshot,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive a FuzzyMix render service from the terminal")]
struct Args {
    /// Settings file (bare name in the working directory)
    #[arg(short, long, default_value = "fuzzymix_settings.json")]
    config: String,

    /// Endpoint override, beats both the settings file and FUZZYMIX_WS_URL
    #[arg(short, long)]
    url: Option<String>,

    /// Milliseconds between snapshots
    #[arg(short, long, default_value_t = 500)]
    interval_ms: u64,

    /// Stop after this many seconds (runs forever when absent)
    #[arg(short, long)]
    duration_s: Option<u64>,

    /// Write every embedded WAV the service sends into this directory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Save the effective settings back to the settings file and exit
    #[arg(long, default_value_t = false)]
    write_settings: bool,
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = ChannelSettings::load(Some(&args.config))?;
    if let Some(url) = &args.url {
        fuzzymix::channel::settings::validate_ws_url(url)?;
        settings.ws_url = url.clone();
    }

    if args.write_settings {
        let mut config = Config::build(args.config.clone(), default_params())?;
        settings.store_into(&mut config)?;
        config.save_settings()?;
        config.dump();
        info!("fuzzy_console - settings written to {}", config.filename());
        return Ok(());
    }

    if let Some(dir) = &args.save_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut channel = ControlChannel::with_websocket(&settings);
    let status_rx = channel.subscribe();
    info!("fuzzy_console - render service at {}", channel.supervisor().url());
    channel.start();

    let interval = args.interval_ms.max(1) as u128 * 1_000;
    let started = get_micro_time();
    let mut next_send = started;
    let mut snapshot = ControlSnapshot::initial_mix();
    let mut last_locator = String::new();
    let mut step: u64 = 0;

    loop {
        let now = get_micro_time();
        if let Some(limit) = args.duration_s {
            if now.saturating_sub(started) > limit as u128 * 1_000_000 {
                break;
            }
        }

        channel.pump(now);

        for status in status_rx.try_iter() {
            info!("fuzzy_console - status {}", status);
        }

        if now >= next_send {
            next_send = now + interval;
            step += 1;
            snapshot = drift(snapshot, step);
            if channel.send(&snapshot) {
                info!(
                    "fuzzy_console - sent update {} (crossfader {}, {} BPM)",
                    channel.sent_count(),
                    snapshot.crossfader(),
                    snapshot.bpm()
                );
            }
        }

        if let Some(handle) = channel.playable() {
            if handle.locator() != last_locator {
                last_locator = handle.locator().to_string();
                report(handle, args.save_dir.as_ref());
            }
        }

        if !channel.status().is_connected() {
            // the socket read timeout paces us while connected
            sleep(Duration::from_millis(20));
        }
    }

    channel.dispose();
    info!("fuzzy_console - done after {} updates", channel.sent_count());
    Ok(())
}

/// Sweep the crossfader and wobble the energy input so the service has something to render.
fn drift(snapshot: ControlSnapshot, step: u64) -> ControlSnapshot {
    let sweep = (step % 200) as i64;
    let crossfader = if sweep > 100 { 200 - sweep } else { sweep };
    let heart_rate = 50 + (step % 30) as u8;
    // the right deck joins in for the second half of every sweep
    let snapshot = snapshot
        .with_crossfader(crossfader as u8)
        .with_input("heartRate", heart_rate)
        .with_playing(Deck::Right, sweep > 100);
    if step % 16 == 0 {
        snapshot.toggle_pad(((step / 16) % 16) as u8)
    } else {
        snapshot
    }
}

fn report(handle: &PlayableHandle, save_dir: Option<&PathBuf>) {
    match handle {
        PlayableHandle::Remote(url) => info!("fuzzy_console - play {}", url),
        PlayableHandle::Local(local) => {
            match local.wav_spec() {
                Ok(spec) => info!(
                    "fuzzy_console - play {} ({} bytes, {} ch @ {} Hz)",
                    local.locator(),
                    local.len(),
                    spec.channels,
                    spec.sample_rate
                ),
                Err(e) => warn!("fuzzy_console - {} is not a readable WAV: {}", local.locator(), e),
            }
            if let (Some(dir), Some(bytes)) = (save_dir, local.bytes()) {
                let name = local.locator().rsplit('/').next().unwrap_or("audio");
                let path = dir.join(format!("render_{}.wav", name));
                match std::fs::write(&path, &bytes[..]) {
                    Ok(()) => info!("fuzzy_console - saved {}", path.display()),
                    Err(e) => warn!("fuzzy_console - cannot save {}: {}", path.display(), e),
                }
            }
        }
    }
}
