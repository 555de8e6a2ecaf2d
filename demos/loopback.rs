//! Send a block-timestamped stream and play it back on a second timeline
//!
//! Run with: cargo run --example loopback
//!
//! Two engines share the monotonic clock but run their own loops. The first
//! stamps every sample it sends with its smoothed block times; the second
//! places the received samples on its own timeline by nearest timestamp.

use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{info, Level};
use zeitgeber::nodes::{
    DllNode, DllSettings, Metronome, MetronomeSettings, RtrbSink, StreamInput, StreamInputSettings,
    StreamOutput, StreamOutputSettings,
};
use zeitgeber::stream::LoopbackBus;
use zeitgeber::{Buffer, ProcessContext, Zeitgeber};

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let ctx = ProcessContext::new(48_000, 1);
    let bus = LoopbackBus::new();
    let clock = DllSettings {
        clock_source: "CLOCK_MONOTONIC".into(),
        ..Default::default()
    };

    // Sender: clicks at 240 bpm, stamped and published as "clicks"
    let (sent_tx, mut sent) = rtrb::RingBuffer::new(1 << 16);
    let mut sender = Zeitgeber::with_context(ctx).with_output(RtrbSink::mono(sent_tx));
    let dll = sender.add(DllNode::new(clock.build(&ctx, sender.store()).expect("valid clock")));
    let click = MetronomeSettings { bpm: 240.0, ..Default::default() };
    let click = sender.add(Metronome::new(click.build(&ctx, sender.store())));
    let stream = StreamOutputSettings {
        stream_name: "clicks".into(),
        ..Default::default()
    };
    let out = sender.add(StreamOutput::new(
        stream.build(&ctx, sender.store(), &bus).expect("outlet"),
    ));
    sender.connect(&dll, &click);
    sender.connect(&click, &out);
    sender.output(&out);

    // Receiver: an independent loop on the same clock
    let (received_tx, mut received) = rtrb::RingBuffer::new(1 << 16);
    let mut receiver = Zeitgeber::with_context(ctx).with_output(RtrbSink::mono(received_tx));
    let dll = receiver.add(DllNode::new(clock.build(&ctx, receiver.store()).expect("valid clock")));
    let input = StreamInputSettings {
        stream_name: "clicks".into(),
        ..Default::default()
    };
    let input = receiver.add(StreamInput::new(
        input.build(&ctx, receiver.store(), &bus).expect("stream"),
    ));
    receiver.connect(&dll, &input);
    receiver.output(&input);

    let start = Instant::now();
    let mut frames = 0u64;
    while start.elapsed() < Duration::from_secs(3) {
        let due = (start.elapsed().as_secs_f64() * ctx.sample_rate as f64) as u64;
        if frames >= due {
            sleep(Duration::from_micros(500));
            continue;
        }
        sender.process();
        receiver.process();
        frames += Buffer::LEN as u64;

        let sent_clicks = std::iter::from_fn(|| sent.pop().ok()).filter(|&s| s > 0.6).count();
        let received_clicks = std::iter::from_fn(|| received.pop().ok()).filter(|&s| s > 0.6).count();
        if sent_clicks > 0 {
            info!(t = start.elapsed().as_secs_f64(), "sent click");
        }
        if received_clicks > 0 {
            info!(t = start.elapsed().as_secs_f64(), "received click");
        }
    }
}
