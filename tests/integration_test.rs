use std::time::Duration;

use zeitgeber::nodes::{
    ClickWaveform, DllMessage, DllNode, DllSettings, Metronome, MetronomeSettings, RtrbSink, RtrbSource, StreamInput,
    StreamInputSettings, StreamOutput, StreamOutputSettings, Timestamper, TimestamperSettings,
};
use zeitgeber::stream::{LoopbackBus, StreamInlet, StreamInfo, StreamProvider, StreamResolver};
use zeitgeber::{Buffer, ConfigError, Controller, ProcessContext, Zeitgeber};

const SAMPLE_RATE: u32 = 48_000;

/// A clock that advances by exactly one block per reading.
fn block_clock(start: f64) -> impl FnMut() -> f64 + Send + 'static {
    let step = ProcessContext::new(SAMPLE_RATE, 1).block_duration();
    let mut next = start;
    move || {
        let now = next;
        next += step;
        now
    }
}

fn drain(consumer: &mut rtrb::Consumer<f32>) -> Vec<f32> {
    std::iter::from_fn(|| consumer.pop().ok()).collect()
}

#[test]
fn metronome_and_stream_follow_the_loop() {
    let (producer, mut played) = rtrb::RingBuffer::new(1 << 14);
    let mut zg = Zeitgeber::new(SAMPLE_RATE)
        .with_channels(1)
        .with_output(RtrbSink::mono(producer));
    let ctx = zg.context();
    let store = zg.store().clone();
    let bus = LoopbackBus::new();

    let raw = TimestamperSettings::default().build(&ctx, &store).unwrap();
    let raw = zg.add(Timestamper::with_time_source(raw, block_clock(100.05)));

    let dll = DllSettings::default().build(&ctx, &store).unwrap();
    let dll = zg.add(DllNode::with_time_source(dll, block_clock(100.05)));

    // 600 bpm: a beat every 0.1 s, at 100.1, 100.2 and 100.3
    let click = MetronomeSettings { bpm: 600.0, ..Default::default() };
    let click = zg.add(Metronome::new(click.build(&ctx, &store)));

    let out = StreamOutputSettings {
        stream_name: "metronome".into(),
        ..Default::default()
    };
    let out = zg.add(StreamOutput::new(out.build(&ctx, &store, &bus).unwrap()));

    zg.connect(&raw, &dll);
    zg.connect(&dll, &click);
    zg.connect(&click, &out);
    zg.output(&out);

    let info = bus.resolve("metronome", Duration::ZERO).remove(0);
    let mut inlet = bus.open_inlet(&info, Buffer::LEN).unwrap();

    let blocks = 200;
    for _ in 0..blocks {
        zg.process();
    }
    assert_eq!(zg.blocks_processed(), blocks);

    // One click peak per beat, nothing else at full height
    let audio = drain(&mut played);
    assert_eq!(audio.len(), blocks as usize * Buffer::LEN);
    let peaks: Vec<usize> = audio
        .iter()
        .enumerate()
        .filter(|(_, &s)| s == 0.6330)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(peaks.len(), 3);
    // Beats sit half a block into blocks 37, 112 and 187; clicks start there
    let pre = ClickWaveform::new(SAMPLE_RATE).pre_samples();
    for (peak, block) in peaks.iter().zip([37, 112, 187]) {
        assert_eq!(*peak, block * Buffer::LEN + Buffer::LEN / 2 + pre);
    }

    // The outlet carried the same audio, stamped sample by sample
    let mut samples = vec![0.0_f32; audio.len()];
    let mut stamps = vec![0.0_f64; audio.len()];
    assert_eq!(inlet.pull_chunk(&mut samples, &mut stamps), audio.len());
    assert_eq!(samples, audio);
    assert_eq!(stamps[0], 100.05);
    let period = 1.0 / SAMPLE_RATE as f64;
    for pair in stamps.windows(2) {
        assert!((pair[1] - pair[0] - period).abs() < 1e-9);
    }

    // Raw and smoothed times agree for a jitter-free clock
    assert!((store.get("timestamper") - store.get("dll_t0")).abs() < 1e-9);
}

#[test]
fn loopback_round_trip_is_sample_exact() {
    let ctx = ProcessContext::new(SAMPLE_RATE, 1);
    let bus = LoopbackBus::new();

    // Sender: ring → dll → stream output
    let (mut feed, source) = rtrb::RingBuffer::new(1 << 14);
    let (sent_tx, _sent) = rtrb::RingBuffer::new(1 << 14);
    let mut sender = Zeitgeber::with_context(ctx).with_output(RtrbSink::mono(sent_tx));
    let source = sender.add(RtrbSource::new(source, 1));
    let dll = DllSettings::default().build(&ctx, sender.store()).unwrap();
    let dll = sender.add(DllNode::with_time_source(dll, block_clock(7.0)));
    let out = StreamOutputSettings::default().build(&ctx, sender.store(), &bus).unwrap();
    let out = sender.add(StreamOutput::new(out));
    sender.connect(&source, &dll);
    sender.connect(&dll, &out);
    sender.output(&out);

    // Receiver: its own dll on the same clock → stream input
    let (received_tx, mut received) = rtrb::RingBuffer::new(1 << 14);
    let mut receiver = Zeitgeber::with_context(ctx).with_output(RtrbSink::mono(received_tx));
    let settings = StreamInputSettings {
        resolve_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let input = settings.build(&ctx, receiver.store(), &bus).unwrap();
    let dll = DllSettings::default().build(&ctx, receiver.store()).unwrap();
    let dll = receiver.add(DllNode::with_time_source(dll, block_clock(7.0)));
    let input = receiver.add(StreamInput::new(input));
    receiver.connect(&dll, &input);
    receiver.output(&input);

    let blocks = 50;
    let ramp: Vec<f32> = (0..blocks * Buffer::LEN).map(|i| i as f32).collect();
    for &sample in &ramp {
        feed.push(sample).unwrap();
    }

    for _ in 0..blocks {
        sender.process();
        receiver.process();
    }

    assert_eq!(drain(&mut received), ramp);
}

#[test]
fn controller_keeps_running_config_on_error() {
    let (producer, _consumer) = rtrb::RingBuffer::new(1 << 12);
    let mut zg = Zeitgeber::new(SAMPLE_RATE)
        .with_channels(1)
        .with_output(RtrbSink::mono(producer));
    let ctx = zg.context();
    let store = zg.store().clone();

    let settings = DllSettings {
        clock_source: "CLOCK_MONOTONIC".into(),
        ..Default::default()
    };
    let dll = zg.add(DllNode::new(settings.build(&ctx, &store).unwrap()));
    zg.output(&dll);
    let mut control = Controller::with_settings(dll, settings.clone());
    let build = |s: &DllSettings| s.build(&ctx, &store).map(DllMessage::configure);

    zg.process();
    assert!(store.get("dll_t0").is_finite());

    assert_eq!(control.apply(&settings, build), Ok(false));

    let bogus = DllSettings {
        clock_source: "CLOCK_BOGUS".into(),
        ..settings.clone()
    };
    assert_eq!(
        control.apply(&bogus, build),
        Err(ConfigError::UnknownClock("CLOCK_BOGUS".into()))
    );
    assert_eq!(control.settings(), Some(&settings));
    zg.process();
    assert!(store.get("dll_t0").is_finite());

    let renamed = DllSettings {
        name: "clock2".into(),
        ..settings
    };
    assert_eq!(control.apply(&renamed, build), Ok(true));
    zg.process();
    assert!(store.get("dll_t0").is_nan());
    assert!(store.get("dll_t1").is_nan());
    assert!(store.get("clock2_t0").is_finite());
    assert!(store.get("clock2_t1") > store.get("clock2_t0"));
}

#[test]
fn missing_stream_is_a_configuration_error() {
    let ctx = ProcessContext::new(SAMPLE_RATE, 2);
    let bus = LoopbackBus::new();
    let store = zeitgeber::TimingStore::new();
    let settings = StreamInputSettings {
        resolve_timeout: Duration::from_millis(50),
        ..Default::default()
    };

    let expected = ConfigError::StreamNotFound {
        name: "wav2lsl".into(),
        channels: 2,
        sample_rate: SAMPLE_RATE,
    };
    assert_eq!(settings.build(&ctx, &store, &bus).err(), Some(expected.clone()));

    // A stream with the wrong layout does not count
    let mono = ProcessContext::new(SAMPLE_RATE, 1);
    let _outlet = bus.create_outlet(StreamInfo::audio("wav2lsl", "", &mono), 64).unwrap();
    assert_eq!(settings.build(&ctx, &store, &bus).err(), Some(expected));
}
