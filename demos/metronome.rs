//! Play a click track locked to the system clock
//!
//! Run with: cargo run --example metronome --features cpal_sink -- [bpm]
//!
//! A delay-locked loop smooths the wall-clock time of every block, and the
//! metronome places each click on the exact sample where its beat falls.

use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{info, Level};
use zeitgeber::nodes::{DllNode, DllSettings, Metronome, MetronomeMessage, MetronomeSettings};
use zeitgeber::{Buffer, Controller, CpalDevice, Zeitgeber};

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let bpm: f64 = std::env::args().nth(1).and_then(|a| a.parse().ok()).unwrap_or(120.0);

    let Some(device) = CpalDevice::default_output() else {
        eprintln!("No audio output device found!");
        return;
    };
    info!(device = device.name(), sample_rate = device.sample_rate(), "using output");

    let mut zg = Zeitgeber::new(device.sample_rate())
        .with_channels(device.channels() as usize)
        .with_output(device.create_sink());
    let ctx = zg.context();
    let store = zg.store().clone();

    let dll = DllSettings {
        clock_source: "CLOCK_MONOTONIC".into(),
        ..Default::default()
    };
    let dll = zg.add(DllNode::new(dll.build(&ctx, &store).expect("valid clock")));

    let click = MetronomeSettings { bpm, ..Default::default() };
    let metronome = zg.add(Metronome::new(click.build(&ctx, &store)));
    let mut control = Controller::with_settings(metronome, click.clone());

    zg.connect(&dll, control.handle());
    zg.output(control.handle());

    println!("Clicking at {bpm} bpm, doubling after 5 seconds. Press Ctrl+C to stop\n");

    let sample_rate = zg.sample_rate() as f64;
    let start = Instant::now();
    let mut frames_generated = 0u64;
    let mut doubled = false;

    loop {
        let elapsed = start.elapsed().as_secs_f64();
        let frames_due = (elapsed * sample_rate) as u64 + 4 * Buffer::LEN as u64;

        if frames_generated < frames_due {
            zg.process();
            frames_generated += Buffer::LEN as u64;
        } else {
            sleep(Duration::from_micros(500));
        }

        if !doubled && elapsed > 5.0 {
            doubled = true;
            let faster = MetronomeSettings { bpm: bpm * 2.0, ..click.clone() };
            let build = |s: &MetronomeSettings| Ok(MetronomeMessage::configure(s.build(&ctx, &store)));
            if let Err(err) = control.apply(&faster, build) {
                eprintln!("tempo change failed: {err}");
            }
        }
    }
}
