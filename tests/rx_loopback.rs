//! Integration tests: PL framer → channel impairments → receiver loopback
//!
//! Frames are built with the transmit-side framer, pulse shaped, passed
//! through a timing offset, carrier rotation and noise, then received. The
//! recovered payloads must match what was sent, decision for decision.

use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dvbs2rx_lib::adapters::{FrameCollector, MemoryIqSource, U8IqReader};
use dvbs2rx_lib::domain::{FrameSize, Modcod, PlsCode};
use dvbs2rx_lib::dsp::rrc::pulse_shape;
use dvbs2rx_lib::pipeline;
use dvbs2rx_lib::plsync::{PlFramer, SyncState};
use dvbs2rx_lib::{PlFrame, Receiver, ReceiverConfig, Sample};

const GOLD_CODE: u32 = 7;
const RRC_DELAY: usize = 10;

fn config() -> ReceiverConfig {
    ReceiverConfig {
        rrc_delay: RRC_DELAY,
        modcod: "QPSK1/2".to_string(),
        frame_size: FrameSize::Short,
        gold_code: GOLD_CODE,
        agc_rate: 1e-3,
        ..Default::default()
    }
}

fn pls() -> PlsCode {
    PlsCode::new(Modcod::new(4), FrameSize::Short, true)
}

fn qpsk(n: usize, rng: &mut StdRng) -> Vec<Sample> {
    let a = std::f32::consts::FRAC_1_SQRT_2;
    (0..n)
        .map(|_| {
            Sample::new(
                if rng.gen::<bool>() { a } else { -a },
                if rng.gen::<bool>() { a } else { -a },
            )
        })
        .collect()
}

/// Transmit a sequence of frame slots; `false` slots carry silence.
/// Returns the symbol stream and the payload sent in each slot.
fn transmit(slots: &[bool], rng: &mut StdRng) -> (Vec<Sample>, Vec<Option<Vec<Sample>>>) {
    let pls = pls();
    let framer = PlFramer::new(GOLD_CODE);
    let mut symbols = Vec::new();
    let mut sent = Vec::new();
    for &active in slots {
        if active {
            let payload = qpsk(pls.payload_len(), rng);
            symbols.extend(framer.build(&pls, &payload).unwrap());
            sent.push(Some(payload));
        } else {
            symbols.extend(std::iter::repeat(Sample::new(0.0, 0.0)).take(pls.frame_len()));
            sent.push(None);
        }
    }
    (symbols, sent)
}

/// Scale, rotate with a phase ramp and add white Gaussian noise
fn impair(
    samples: &[Sample],
    gain: f32,
    phase: f32,
    freq: f32,
    noise_std: f32,
    rng: &mut StdRng,
) -> Vec<Sample> {
    let mut gaussian = || {
        let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
    };
    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let rotated = s * gain * Sample::from_polar(1.0, phase + freq * i as f32);
            rotated + Sample::new(gaussian(), gaussian()) * noise_std
        })
        .collect()
}

fn rms(samples: &[Sample]) -> f32 {
    (samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Count QPSK decision errors of every received frame against the slot it
/// was sent in. Returns the slot indices that were recovered.
fn check_frames(frames: &[PlFrame], sent: &[Option<Vec<Sample>>]) -> Vec<usize> {
    let frame_len = pls().frame_len() as f64;
    let mut slots = Vec::new();
    for frame in frames {
        assert_eq!(frame.pls, pls());
        let slot = (frame.start as f64 / frame_len).round() as usize;
        let payload = sent[slot]
            .as_ref()
            .unwrap_or_else(|| panic!("frame at {} lands in a silent slot", frame.start));
        assert_eq!(frame.payload.len(), payload.len());
        let errors = frame
            .payload
            .iter()
            .zip(payload.iter())
            .filter(|(r, s)| (r.re > 0.0) != (s.re > 0.0) || (r.im > 0.0) != (s.im > 0.0))
            .count();
        assert_eq!(errors, 0, "frame at symbol {} (slot {slot})", frame.start);
        slots.push(slot);
    }
    slots
}

#[test]
fn test_loopback_through_timing_and_carrier_offsets() {
    let mut rng = StdRng::seed_from_u64(2024);
    let (symbols, sent) = transmit(&[true; 5], &mut rng);
    let clean = pulse_shape(&symbols, 2.0, 0.2, RRC_DELAY, 0.37);
    let noise = 0.03 * rms(&clean);
    let samples = impair(&clean, 0.4, 1.1, 1e-4, noise, &mut rng);

    let mut rx = Receiver::new(config()).unwrap();
    let frames = rx.process(&samples);

    let slots = check_frames(&frames, &sent);
    assert!(slots.len() >= 3, "recovered slots {slots:?}");
    assert!(slots.windows(2).all(|w| w[1] == w[0] + 1), "slots {slots:?}");

    let stats = rx.stats();
    assert_eq!(stats.state, SyncState::Locked);
    assert_eq!(stats.lock_losses, 0);
    assert_eq!(stats.pilot_errors, 0);
    assert!((stats.symbol_period - 2.0).abs() < 0.02, "period {}", stats.symbol_period);
}

#[test]
fn test_loss_of_signal_and_relock() {
    let mut rng = StdRng::seed_from_u64(77);
    let slots = [true, true, true, false, false, false, true, true, true, true];
    let (symbols, sent) = transmit(&slots, &mut rng);
    let samples = pulse_shape(&symbols, 2.0, 0.2, RRC_DELAY, 0.0);

    let mut rx = Receiver::new(config()).unwrap();
    let frames = rx.process(&samples);
    let recovered = check_frames(&frames, &sent);

    assert!(recovered.iter().any(|&s| s < 3), "no frames before the gap: {recovered:?}");
    assert!(
        recovered.iter().filter(|&&s| s > 5).count() >= 2,
        "no re-lock after the gap: {recovered:?}"
    );

    let stats = rx.stats();
    assert!(stats.lock_losses >= 1);
    assert!(stats.lock_acquisitions >= 2);
    assert_eq!(stats.state, SyncState::Locked);
}

#[test]
fn test_pipeline_over_u8_capture() {
    let mut rng = StdRng::seed_from_u64(5);
    let (symbols, sent) = transmit(&[true; 4], &mut rng);
    let clean = pulse_shape(&symbols, 2.0, 0.2, RRC_DELAY, 0.25);
    let samples = impair(&clean, 1.0, -0.6, 0.0, 0.0, &mut rng);

    // Quantize like an 8-bit SDR front end, peak well inside the range
    let scale = 0.35 / rms(&samples);
    let quantize = |x: f32| (x * scale * 128.0 + 127.0).round().clamp(0.0, 255.0) as u8;
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|s| [quantize(s.re), quantize(s.im)])
        .collect();

    let mut sink = FrameCollector::new();
    let stats = pipeline::run(
        config(),
        U8IqReader::new(Cursor::new(bytes)),
        &mut sink,
        Arc::new(AtomicBool::new(true)),
    )
    .unwrap();

    let recovered = check_frames(&sink.frames, &sent);
    assert!(recovered.len() >= 2, "recovered slots {recovered:?}");
    assert_eq!(stats.samples, samples.len() as u64);
    assert_eq!(stats.frames, sink.frames.len() as u64);
}

#[test]
fn test_pipeline_matches_direct_receiver() {
    let mut rng = StdRng::seed_from_u64(9);
    let (symbols, _) = transmit(&[true; 3], &mut rng);
    let samples = pulse_shape(&symbols, 2.0, 0.2, RRC_DELAY, 0.1);

    let direct = Receiver::new(config()).unwrap().process(&samples);

    let mut sink = FrameCollector::new();
    pipeline::run(
        config(),
        MemoryIqSource::new(samples),
        &mut sink,
        Arc::new(AtomicBool::new(true)),
    )
    .unwrap();

    assert!(!direct.is_empty());
    assert_eq!(sink.frames, direct);
}
