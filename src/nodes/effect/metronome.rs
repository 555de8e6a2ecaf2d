//! Sample-accurate metronome
//!
//! The click for a beat has to start at the sample where the beat falls, not
//! at the start of whatever block happens to contain it. Each block the
//! metronome converts the smoothed `t0`/`t1` of its DLL into beat phase,
//! checks whether a beat boundary lies inside `[t0, t1)`, and if so writes the
//! click into a lookahead ring at the matching sample offset. The ring is then
//! played out one block at a time, so clicks spanning a block boundary
//! continue seamlessly into the next block.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use dasp_graph::{Buffer, Input};
use tracing::debug;

use crate::node::{pass_through, AudioNode, ProcessContext};
use crate::nodes::same_f64;
use crate::store::{TimeWindow, TimingStore};

/// Half-width of the click pulse in seconds.
const CLICK_HALF_WIDTH: f32 = 159.17e-6;

/// A short symmetric pulse: `pre` samples, a center sample, `pre` samples.
///
/// The envelope is a quadratic defined on a 44.1 kHz grid and stretched to
/// the actual sample rate, so the click sounds the same at any rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ClickWaveform {
    samples: Vec<f32>,
    pre: usize,
}

impl ClickWaveform {
    pub fn new(sample_rate: u32) -> Self {
        let pre = (sample_rate as f32 * CLICK_HALF_WIDTH) as usize;
        let mut samples = vec![0.0; 2 * pre + 1];

        for ds in 0..=pre {
            let ds44 = (ds * 44_100) as f32 / sample_rate as f32;
            let value = -0.01 * ds44 * ds44 - 0.02 * ds44 + 0.6330;
            samples[pre + ds] = value;
            samples[pre - ds] = value;
        }

        Self { samples, pre }
    }

    /// Number of samples before (and after) the center sample.
    #[inline]
    pub fn pre_samples(&self) -> usize {
        self.pre
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Lookahead buffer of not-yet-emitted samples.
///
/// Logical index 0 is the next sample to be played. Internally a circular
/// buffer with a moving head, so advancing costs one block, not the whole
/// buffer.
#[derive(Clone, Debug)]
pub struct FutureRing {
    buf: Vec<f32>,
    head: usize,
}

impl FutureRing {
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len.max(1)],
            head: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    fn slot(&self, index: usize) -> usize {
        (self.head + index) % self.buf.len()
    }

    /// Sample at logical position `index`.
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.buf[self.slot(index)]
    }

    /// Overwrite samples starting at logical position `offset`.
    ///
    /// Whatever falls past the end of the ring is dropped.
    pub fn write(&mut self, offset: usize, samples: &[f32]) {
        let end = self.buf.len().min(offset.saturating_add(samples.len()));
        for index in offset..end {
            let slot = self.slot(index);
            self.buf[slot] = samples[index - offset];
        }
    }

    /// Drop the first `frames` samples; the vacated tail reads zero.
    pub fn advance(&mut self, frames: usize) {
        let frames = frames.min(self.buf.len());
        for index in 0..frames {
            let slot = self.slot(index);
            self.buf[slot] = 0.0;
        }
        self.head = (self.head + frames) % self.buf.len();
    }
}

/// Offset in `frames` at which a beat inside the window `[t0, t1)` falls.
///
/// `t0` and `t1` are in beats. Returns `None` unless the window is finite,
/// forward, and contains exactly one integer beat, so at most one click is
/// spliced per block.
///
/// ```
/// use zeitgeber::nodes::effect::splice_offset;
///
/// assert_eq!(splice_offset(0.4, 1.6, 100), Some(50));
/// assert_eq!(splice_offset(0.2, 0.9, 100), None);
/// ```
pub fn splice_offset(t0: f64, t1: f64, frames: usize) -> Option<usize> {
    if !(t0.is_finite() && t1.is_finite() && t0 < t1) {
        return None;
    }
    let beat = t0.ceil();
    if beat != t1.floor() {
        return None;
    }
    Some(((beat - t0) / (t1 - t0) * frames as f64).round() as usize)
}

/// Places clicks on beat boundaries and plays them out block by block.
#[derive(Clone, Debug)]
pub struct BeatScheduler {
    click: ClickWaveform,
    future: FutureRing,
    /// Seconds per beat, NaN when disabled.
    beat_period: f64,
    replace: bool,
    frames: usize,
}

impl BeatScheduler {
    /// A scheduler for blocks of `frames` samples at `sample_rate`.
    ///
    /// A NaN `bpm` disables it: [`process`](Self::process) then leaves the
    /// signal untouched. With `replace` the click replaces the signal,
    /// otherwise it is mixed in.
    pub fn new(sample_rate: u32, frames: usize, bpm: f64, replace: bool) -> Self {
        let click = ClickWaveform::new(sample_rate);
        let future = FutureRing::new(click.len() + frames);
        Self {
            click,
            future,
            beat_period: 60.0 / bpm,
            replace,
            frames,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        !self.beat_period.is_nan()
    }

    /// Splice a click into the ring if a beat falls in `[t0, t1)` seconds.
    ///
    /// The click's first sample goes at the beat's offset within the block,
    /// which is returned.
    pub fn schedule(&mut self, t0: f64, t1: f64) -> Option<usize> {
        let offset = splice_offset(t0 / self.beat_period, t1 / self.beat_period, self.frames)?;
        self.future.write(offset, &self.click.samples);
        Some(offset)
    }

    /// Play the next block out of the ring into every channel, then advance.
    pub fn render<'a, I>(&mut self, channels: I)
    where
        I: IntoIterator<Item = &'a mut [f32]>,
    {
        for channel in channels {
            for (k, sample) in channel.iter_mut().take(self.frames).enumerate() {
                let click = self.future.get(k);
                if self.replace {
                    *sample = click;
                } else {
                    *sample += click;
                }
            }
        }
        self.future.advance(self.frames);
    }

    /// One block: schedule from `(t0, t1)` and render, unless disabled.
    pub fn process<'a, I>(&mut self, t0: f64, t1: f64, channels: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a mut [f32]>,
    {
        if !self.is_enabled() {
            return None;
        }
        let offset = self.schedule(t0, t1);
        self.render(channels);
        offset
    }
}

/// User-facing parameters of a [`Metronome`].
#[derive(Clone, Debug)]
pub struct MetronomeSettings {
    /// Beats per minute, NaN disables the metronome.
    pub bpm: f64,
    /// Base name of the DLL times to follow (`<time_base>_t0`, `<time_base>_t1`).
    pub time_base: String,
    /// Replace the signal with the clicks instead of mixing them in.
    pub replace: bool,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            bpm: f64::NAN,
            time_base: "dll".into(),
            replace: true,
        }
    }
}

impl PartialEq for MetronomeSettings {
    fn eq(&self, other: &Self) -> bool {
        same_f64(self.bpm, other.bpm)
            && self.time_base == other.time_base
            && self.replace == other.replace
    }
}

impl MetronomeSettings {
    pub fn build(&self, ctx: &ProcessContext, store: &TimingStore) -> MetronomeConfig {
        let scheduler = BeatScheduler::new(ctx.sample_rate, ctx.buffer_size, self.bpm, self.replace);
        debug!(
            bpm = self.bpm,
            time_base = %self.time_base,
            replace = self.replace,
            click_len = scheduler.click.len(),
            "built metronome configuration"
        );
        MetronomeConfig {
            scheduler,
            window: store.window(&self.time_base),
            channels: ctx.channels,
        }
    }
}

pub struct MetronomeConfig {
    scheduler: BeatScheduler,
    window: TimeWindow,
    channels: usize,
}

/// Messages to reconfigure a [`Metronome`]
pub enum MetronomeMessage {
    /// Replace the configuration, pending clicks included.
    Configure(Box<MetronomeConfig>),
}

impl MetronomeMessage {
    pub fn configure(config: MetronomeConfig) -> Self {
        MetronomeMessage::Configure(Box::new(config))
    }
}

/// Adds (or substitutes) a click on every beat of the DLL's timeline.
///
/// Reads `<time_base>_t0` / `<time_base>_t1` once per block. Invalid windows
/// (NaN, reversed, or no beat inside) just mean no new click this block.
pub struct Metronome {
    config: MetronomeConfig,
}

impl Metronome {
    pub fn new(config: MetronomeConfig) -> Self {
        Self { config }
    }
}

impl AudioNode for Metronome {
    type Message = MetronomeMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = MetronomeMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                MetronomeMessage::Configure(config) => self.config = *config,
            }
        }

        pass_through(inputs, outputs);

        let (t0, t1) = self.config.window.read();
        self.config
            .scheduler
            .process(t0, t1, outputs.iter_mut().map(|buffer| &mut buffer[..]));
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { self.config.channels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_is_symmetric_and_scaled() {
        let click = ClickWaveform::new(44_100);
        assert_eq!(click.pre_samples(), 7);
        assert_eq!(click.len(), 15);
        let s = click.samples();
        assert_eq!(s[7], 0.6330);
        for ds in 1..=7 {
            assert_eq!(s[7 - ds], s[7 + ds]);
            assert!(s[7 + ds] < s[7 + ds - 1]);
        }

        // Twice the rate, twice the samples, same shape
        let wide = ClickWaveform::new(88_200);
        assert_eq!(wide.pre_samples(), 14);
        assert_eq!(wide.samples()[14 + 2], s[7 + 1]);
    }

    #[test]
    fn splice_at_fractional_position() {
        assert_eq!(splice_offset(0.4, 1.6, 100), Some(50));
        assert_eq!(splice_offset(2.9, 3.4, 10), Some(2));
        assert_eq!(splice_offset(3.0, 3.5, 64), Some(0));
    }

    #[test]
    fn no_splice_without_boundary() {
        assert_eq!(splice_offset(0.2, 0.9, 100), None);
        // Two boundaries inside one window
        assert_eq!(splice_offset(0.5, 2.5, 100), None);
    }

    #[test]
    fn degenerate_windows_are_rejected() {
        assert_eq!(splice_offset(1.6, 0.4, 100), None);
        assert_eq!(splice_offset(0.5, 0.5, 100), None);
        assert_eq!(splice_offset(f64::NAN, 1.6, 100), None);
        assert_eq!(splice_offset(0.4, f64::INFINITY, 100), None);
        assert_eq!(splice_offset(f64::NEG_INFINITY, 1.6, 100), None);
    }

    #[test]
    fn ring_advances_and_zero_fills() {
        let mut ring = FutureRing::new(6);
        ring.write(2, &[1.0, 2.0, 3.0]);
        ring.advance(4);
        assert_eq!((0..6).map(|i| ring.get(i)).collect::<Vec<_>>(), [3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        // Writes past the end are clipped
        ring.write(4, &[7.0, 8.0, 9.0]);
        assert_eq!((0..6).map(|i| ring.get(i)).collect::<Vec<_>>(), [3.0, 0.0, 0.0, 0.0, 7.0, 8.0]);
    }

    #[test]
    fn later_write_wins() {
        let mut ring = FutureRing::new(4);
        ring.write(0, &[1.0, 1.0]);
        ring.write(1, &[5.0]);
        assert_eq!(ring.get(0), 1.0);
        assert_eq!(ring.get(1), 5.0);
    }

    #[test]
    fn click_starts_on_the_beat() {
        // 60 bpm: one beat per second, times are beats
        let mut scheduler = BeatScheduler::new(44_100, 100, 60.0, true);
        let mut block = vec![0.25_f32; 100];

        let offset = scheduler.process(0.4, 1.6, [&mut block[..]]);
        assert_eq!(offset, Some(50));

        let click = ClickWaveform::new(44_100);
        assert_eq!(block[50], click.samples()[0]);
        for (k, &sample) in block.iter().enumerate() {
            let expected = match k.checked_sub(50) {
                Some(i) if i < click.len() => click.samples()[i],
                _ => 0.0,
            };
            assert_eq!(sample, expected, "sample {k}");
        }
    }

    #[test]
    fn click_spills_into_next_block() {
        let mut scheduler = BeatScheduler::new(44_100, 100, 60.0, true);
        let click = ClickWaveform::new(44_100);

        let mut first = vec![0.0_f32; 100];
        // Beat lands on the second to last sample
        assert_eq!(scheduler.process(0.01, 1.0099, [&mut first[..]]), Some(99));
        assert!(first[..99].iter().all(|&s| s == 0.0));
        assert_eq!(first[99], click.samples()[0]);

        let mut second = vec![0.0_f32; 100];
        assert_eq!(scheduler.process(1.0099, 1.9, [&mut second[..]]), None);
        assert_eq!(&second[..14], &click.samples()[1..]);
        assert!(second[14..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn click_at_block_start_plays_whole() {
        let mut scheduler = BeatScheduler::new(44_100, 100, 60.0, true);
        let click = ClickWaveform::new(44_100);
        let mut block = vec![0.0_f32; 100];
        assert_eq!(scheduler.process(3.0, 3.9, [&mut block[..]]), Some(0));
        assert_eq!(&block[..15], click.samples());
        assert!(block[15..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn beat_on_last_rounded_offset_fits_the_ring() {
        // 0.999 of the block rounds up to the full block length
        let mut scheduler = BeatScheduler::new(44_100, 100, 60.0, true);
        let click = ClickWaveform::new(44_100);
        let mut block = vec![0.0_f32; 100];
        assert_eq!(scheduler.process(0.0015, 1.001, [&mut block[..]]), Some(100));
        assert!(block.iter().all(|&s| s == 0.0));

        let mut next = vec![0.0_f32; 100];
        assert_eq!(scheduler.process(1.001, 1.5, [&mut next[..]]), None);
        assert_eq!(&next[..15], click.samples());
    }

    #[test]
    fn mixing_adds_to_the_signal() {
        let mut scheduler = BeatScheduler::new(44_100, 64, 60.0, false);
        let click = ClickWaveform::new(44_100);
        let peak = click.pre_samples();
        let mut left = vec![0.5_f32; 64];
        let mut right = vec![-0.5_f32; 64];
        let offset = scheduler
            .process(0.5, 1.5, [&mut left[..], &mut right[..]])
            .unwrap();
        assert_eq!(offset, 32);
        assert_eq!(left[0], 0.5);
        assert_eq!(left[offset], 0.5 + click.samples()[0]);
        assert_eq!(left[offset + peak], 0.5 + 0.6330);
        assert_eq!(right[offset + peak], -0.5 + 0.6330);
    }

    #[test]
    fn replace_silences_between_clicks() {
        let mut scheduler = BeatScheduler::new(48_000, 64, 120.0, true);
        let mut block = vec![0.8_f32; 64];
        assert_eq!(scheduler.process(0.1, 0.2, [&mut block[..]]), None);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn nan_bpm_passes_through() {
        let mut scheduler = BeatScheduler::new(48_000, 64, f64::NAN, true);
        assert!(!scheduler.is_enabled());
        let mut block = vec![0.8_f32; 64];
        assert_eq!(scheduler.process(0.4, 1.6, [&mut block[..]]), None);
        assert!(block.iter().all(|&s| s == 0.8));
    }

    #[test]
    fn tempo_scales_phase() {
        // 120 bpm: beat every half second, 1.25 s..1.75 s holds the beat at 1.5 s
        let mut scheduler = BeatScheduler::new(48_000, 64, 120.0, true);
        assert_eq!(scheduler.schedule(1.25, 1.75), Some(32));
        assert_eq!(scheduler.schedule(1.1, 1.4), None);
    }

    #[test]
    fn settings_compare_with_nan_bpm() {
        assert_eq!(MetronomeSettings::default(), MetronomeSettings::default());
        assert_ne!(
            MetronomeSettings::default(),
            MetronomeSettings { bpm: 90.0, ..Default::default() }
        );
    }

    #[test]
    fn node_follows_published_window() {
        let store = TimingStore::new();
        let ctx = ProcessContext::new(44_100, 1);
        let settings = MetronomeSettings {
            bpm: 60.0,
            ..Default::default()
        };
        let mut node = Metronome::new(settings.build(&ctx, &store));
        let window = store.window("dll");

        // Beat at 1.0 s, halfway through a 64-frame block
        window.publish(0.9, 1.1);
        let mut out = [Buffer::SILENT];
        node.process(&ctx, core::iter::empty(), &[], &mut out);
        let click = ClickWaveform::new(44_100);
        assert!(out[0][..32].iter().all(|&s| s == 0.0));
        assert_eq!(&out[0][32..32 + click.len()], click.samples());

        // Nothing published for this block: no new click, only the tail
        window.publish(f64::NAN, f64::NAN);
        let mut out = [Buffer::SILENT];
        node.process(&ctx, core::iter::empty(), &[], &mut out);
        assert!(out[0].iter().all(|&s| s == 0.0));
    }
}
