//! Receiver: the full synchronization chain
//!
//! AGC → matched filter / symbol sync → frame sync → carrier recovery →
//! descrambler. One `Receiver` owns every stage and is driven a block of
//! samples at a time from a single thread.

use std::collections::VecDeque;
use std::f64::consts::PI;

use log::{info, warn};
use serde::Serialize;

use super::carrier::CarrierRecovery;
use super::emitter::FrameEmitter;
use super::frame_sync::{FrameSync, SyncState, SyncedFrame};
use super::scrambler::PlScrambler;
use crate::domain::{FrameSize, Modcod, PlFrame, ReceiverConfig, RxError, RxResult, Sample};
use crate::dsp::{Agc, FftProcessor, RrcFilterBank, SymbolSync};

/// Points kept per constellation tap
const CONSTELLATION_POINTS: usize = 1024;

/// FFT size of the diagnostic spectra
const SPECTRUM_SIZE: usize = 1024;

/// Smoothing of the diagnostic power meters
const POWER_SMOOTHING: f32 = 1e-3;

/// Snapshot of receiver health
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverStats {
    pub state: SyncState,
    pub samples: u64,
    pub symbols: u64,
    pub frames: u64,
    pub dummy_frames: u64,
    pub dropped_frames: u64,
    pub lock_acquisitions: u64,
    pub lock_losses: u64,
    pub pilot_errors: u64,
    /// Emitted frames whose MODCOD or frame size differs from the configured one
    pub unexpected_modcod: u64,
    /// Coarse carrier frequency offset in Hz
    pub freq_offset_hz: f64,
    /// Average symbol period in input samples
    pub symbol_period: f64,
    /// Times the timing loop hit its period clamp and restarted
    pub timing_resets: u64,
    pub agc_gain: f32,
}

/// Optional signal taps; they never affect the processing chain
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub pre_agc_power: f32,
    pub post_agc_power: f32,
    /// Most recent symbol-sync outputs
    pub sym_constellation: VecDeque<Sample>,
    /// Payload symbols of the most recent frame
    pub pl_constellation: Vec<Sample>,
    /// Spectrum of the last frame before frequency correction, in dB
    pub spectrum_pre: Vec<f32>,
    /// Spectrum of the last frame after frequency correction, in dB
    pub spectrum_post: Vec<f32>,
}

struct DiagnosticTaps {
    data: Diagnostics,
    fft: FftProcessor,
}

impl DiagnosticTaps {
    fn new() -> Self {
        Self {
            data: Diagnostics::default(),
            fft: FftProcessor::new(SPECTRUM_SIZE),
        }
    }

    fn on_sample(&mut self, raw: Sample, normalized: Sample) {
        let d = &mut self.data;
        d.pre_agc_power += POWER_SMOOTHING * (raw.norm_sqr() - d.pre_agc_power);
        d.post_agc_power += POWER_SMOOTHING * (normalized.norm_sqr() - d.post_agc_power);
    }

    fn on_symbol(&mut self, symbol: Sample) {
        let points = &mut self.data.sym_constellation;
        if points.len() == CONSTELLATION_POINTS {
            points.pop_front();
        }
        points.push_back(symbol);
    }

    fn on_frame_before(&mut self, frame: &SyncedFrame) {
        self.data.spectrum_pre = self.fft.compute(&frame.symbols);
    }

    fn on_frame_after(&mut self, frame: &SyncedFrame) {
        self.data.spectrum_post = self.fft.compute(&frame.symbols);
    }

    fn on_payload(&mut self, frame: &PlFrame) {
        let n = frame.payload.len().min(CONSTELLATION_POINTS);
        self.data.pl_constellation = frame.payload[..n].to_vec();
    }
}

pub struct Receiver {
    config: ReceiverConfig,
    expected_modcod: Modcod,
    agc: Agc,
    symbol_sync: SymbolSync,
    frame_sync: FrameSync,
    carrier: CarrierRecovery,
    scrambler: PlScrambler,
    emitter: FrameEmitter,
    diagnostics: Option<DiagnosticTaps>,
    samples: u64,
    symbols: u64,
    pilot_errors: u64,
    unexpected_modcod: u64,
    /// Last unexpected MODCOD reported, so a steady mismatch warns once
    last_unexpected: Option<(Modcod, FrameSize)>,
}

impl Receiver {
    /// Build every stage from a validated configuration
    pub fn new(config: ReceiverConfig) -> RxResult<Self> {
        config.validate()?;
        let expected_modcod = config.expected_modcod()?;

        let bank = RrcFilterBank::new(config.rolloff, config.rrc_delay, config.rrc_nfilts, config.sps);
        let symbol_sync = SymbolSync::new(bank, config.sym_sync_loop_bw, config.sym_sync_damping);

        info!(
            "Receiver: {} {:?} frames, gold code {}, {} sps at {} baud",
            expected_modcod, config.frame_size, config.gold_code, config.sps, config.sym_rate
        );

        Ok(Self {
            agc: Agc::new(config.agc_gain, config.agc_rate, config.agc_ref),
            symbol_sync,
            frame_sync: FrameSync::new(config.max_missed_headers, config.max_plsc_errors),
            carrier: CarrierRecovery::new(config.pl_freq_est_period),
            scrambler: PlScrambler::new(config.gold_code),
            emitter: FrameEmitter::new(),
            diagnostics: config.diagnostics.then(DiagnosticTaps::new),
            expected_modcod,
            config,
            samples: 0,
            symbols: 0,
            pilot_errors: 0,
            unexpected_modcod: 0,
            last_unexpected: None,
        })
    }

    pub fn state(&self) -> SyncState {
        self.frame_sync.state()
    }

    /// Process a block of samples, returning the frames completed within it
    pub fn process(&mut self, samples: &[Sample]) -> Vec<PlFrame> {
        let mut frames = Vec::new();
        self.process_into(samples, &mut frames);
        frames
    }

    /// Process a block of samples, appending completed frames to `out`
    pub fn process_into(&mut self, samples: &[Sample], out: &mut Vec<PlFrame>) {
        for &raw in samples {
            self.samples += 1;
            let normalized = self.agc.process(raw);
            if let Some(taps) = self.diagnostics.as_mut() {
                taps.on_sample(raw, normalized);
            }

            let Some(symbol) = self.symbol_sync.process(normalized) else {
                continue;
            };
            self.symbols += 1;
            if let Some(taps) = self.diagnostics.as_mut() {
                taps.on_symbol(symbol);
            }

            if let Some(frame) = self.frame_sync.push(symbol) {
                if let Some(frame) = self.recover(frame) {
                    out.push(frame);
                }
            }
        }
    }

    fn recover(&mut self, mut frame: SyncedFrame) -> Option<PlFrame> {
        if let Some(taps) = self.diagnostics.as_mut() {
            taps.on_frame_before(&frame);
        }

        if let Err(e) = self.carrier.process(&mut frame, &self.scrambler) {
            match e {
                RxError::PilotsMissing(start) => {
                    warn!("No pilots in frame at symbol {start}, forcing frame search");
                    self.pilot_errors += 1;
                }
                other => warn!("Carrier recovery failed: {other}"),
            }
            self.frame_sync.force_search();
            return None;
        }

        if let Some(taps) = self.diagnostics.as_mut() {
            taps.on_frame_after(&frame);
        }

        let frame = self.emitter.emit(frame, &self.scrambler)?;
        if !self.is_expected_modcod(&frame) {
            self.unexpected_modcod += 1;
            let seen = (frame.modcod(), frame.pls.frame_size);
            if self.last_unexpected != Some(seen) {
                warn!(
                    "Frame at symbol {} carries {} {:?}, expected {} {:?}",
                    frame.start, seen.0, seen.1, self.expected_modcod, self.config.frame_size
                );
                self.last_unexpected = Some(seen);
            }
        }
        if let Some(taps) = self.diagnostics.as_mut() {
            taps.on_payload(&frame);
        }
        Some(frame)
    }

    /// Whether emitted frames carry the MODCOD the configuration expects
    pub fn is_expected_modcod(&self, frame: &PlFrame) -> bool {
        frame.modcod() == self.expected_modcod && frame.pls.frame_size == self.config.frame_size
    }

    pub fn stats(&self) -> ReceiverStats {
        let sync = self.frame_sync.stats();
        ReceiverStats {
            state: self.frame_sync.state(),
            samples: self.samples,
            symbols: self.symbols,
            frames: self.emitter.emitted(),
            dummy_frames: self.emitter.dummies(),
            dropped_frames: sync.dropped_frames,
            lock_acquisitions: sync.lock_acquisitions,
            lock_losses: sync.lock_losses,
            pilot_errors: self.pilot_errors,
            unexpected_modcod: self.unexpected_modcod,
            freq_offset_hz: self.carrier.frequency() * self.config.sym_rate as f64 / (2.0 * PI),
            symbol_period: self.symbol_sync.period(),
            timing_resets: self.symbol_sync.resets(),
            agc_gain: self.agc.current_gain(),
        }
    }

    /// Diagnostic taps, when enabled in the configuration
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref().map(|t| &t.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrameSize, PlsCode};
    use crate::plsync::framer::PlFramer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    /// Short matched filter and a fast AGC keep the tests quick
    fn test_config() -> ReceiverConfig {
        ReceiverConfig {
            rrc_delay: 10,
            modcod: "QPSK1/2".to_string(),
            frame_size: FrameSize::Short,
            agc_rate: 1e-3,
            ..Default::default()
        }
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

    fn signal(pls: &PlsCode, frames: usize, rng: &mut StdRng) -> (Vec<Sample>, Vec<Vec<Sample>>) {
        let framer = PlFramer::new(0);
        let payloads: Vec<Vec<Sample>> = (0..frames).map(|_| qpsk(pls.payload_len(), rng)).collect();
        let symbols: Vec<Sample> = payloads
            .iter()
            .flat_map(|p| framer.build(pls, p).unwrap())
            .collect();
        let samples = crate::dsp::rrc::pulse_shape(&symbols, 2.0, 0.2, 10, 0.0);
        (samples, payloads)
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = ReceiverConfig {
            gold_code: 300_000,
            ..Default::default()
        };
        assert!(matches!(Receiver::new(config), Err(RxError::Config(_))));
    }

    #[test]
    fn receives_clean_frames_and_reports_stats() {
        let mut rng = StdRng::seed_from_u64(21);
        let pls = PlsCode::new(Modcod::new(4), FrameSize::Short, true);
        let (samples, payloads) = signal(&pls, 4, &mut rng);

        let mut rx = Receiver::new(test_config()).unwrap();
        let frames = rx.process(&samples);

        // Acquisition may cost the first frame
        assert!(frames.len() >= 2, "got {} frames", frames.len());
        for frame in &frames {
            assert!(rx.is_expected_modcod(frame));
            let sent = &payloads[(frame.start / pls.frame_len() as u64) as usize];
            let errors = frame
                .payload
                .iter()
                .zip(sent.iter())
                .filter(|(r, s)| (r.re > 0.0) != (s.re > 0.0) || (r.im > 0.0) != (s.im > 0.0))
                .count();
            assert_eq!(errors, 0, "frame at {}", frame.start);
        }

        let stats = rx.stats();
        assert_eq!(stats.state, SyncState::Locked);
        assert_eq!(stats.frames, frames.len() as u64);
        assert_eq!(stats.samples, samples.len() as u64);
        assert!(rx.diagnostics().is_none());
    }

    #[test]
    fn diagnostics_are_recorded_when_enabled() {
        let mut rng = StdRng::seed_from_u64(22);
        let pls = PlsCode::new(Modcod::new(4), FrameSize::Short, false);
        let (samples, _) = signal(&pls, 3, &mut rng);

        let mut rx = Receiver::new(ReceiverConfig {
            diagnostics: true,
            ..test_config()
        })
        .unwrap();
        let frames = rx.process(&samples);
        assert!(!frames.is_empty());

        let diag = rx.diagnostics().expect("diagnostics enabled");
        assert_eq!(diag.sym_constellation.len(), CONSTELLATION_POINTS);
        assert_eq!(diag.pl_constellation.len(), CONSTELLATION_POINTS);
        assert_eq!(diag.spectrum_pre.len(), SPECTRUM_SIZE);
        assert_eq!(diag.spectrum_post.len(), SPECTRUM_SIZE);
        assert!(diag.post_agc_power > 0.0);
    }

    fn decision_errors(received: &[Sample], sent: &[Sample]) -> usize {
        received
            .iter()
            .zip(sent.iter())
            .filter(|(r, s)| (r.re > 0.0) != (s.re > 0.0) || (r.im > 0.0) != (s.im > 0.0))
            .count()
    }

    #[test]
    fn frames_with_another_modcod_are_counted() {
        let mut rng = StdRng::seed_from_u64(23);
        let pls = PlsCode::new(Modcod::new(4), FrameSize::Short, true);
        let (samples, _) = signal(&pls, 3, &mut rng);

        let mut rx = Receiver::new(ReceiverConfig {
            modcod: "8PSK3/5".to_string(),
            ..test_config()
        })
        .unwrap();
        let frames = rx.process(&samples);

        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| !rx.is_expected_modcod(f)));
        let stats = rx.stats();
        assert_eq!(stats.unexpected_modcod, frames.len() as u64);
        assert_eq!(stats.frames, frames.len() as u64);
    }

    #[test]
    fn expected_frames_are_not_counted_as_unexpected() {
        let mut rng = StdRng::seed_from_u64(24);
        let pls = PlsCode::new(Modcod::new(4), FrameSize::Short, false);
        let (samples, _) = signal(&pls, 3, &mut rng);

        let mut rx = Receiver::new(test_config()).unwrap();
        assert!(!rx.process(&samples).is_empty());
        assert_eq!(rx.stats().unexpected_modcod, 0);
    }

    #[test]
    fn coarse_frequency_converges_on_an_injected_offset() {
        let mut rng = StdRng::seed_from_u64(25);
        let pls = PlsCode::new(Modcod::new(4), FrameSize::Short, true);
        let (clean, payloads) = signal(&pls, 10, &mut rng);

        // 0.001 rad/sample at 2 sps is 0.002 rad/symbol; Es/N0 20 dB
        let freq_per_sample = 0.001f64;
        let power = clean.iter().map(|s| s.norm_sqr() as f64).sum::<f64>() / clean.len() as f64;
        let normal = Normal::new(0.0, (power * 2.0 / (2.0 * 100.0)).sqrt()).unwrap();
        let samples: Vec<Sample> = clean
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let r = freq_per_sample * i as f64 + 0.4;
                s * Sample::new(r.cos() as f32, r.sin() as f32)
                    + Sample::new(normal.sample(&mut rng) as f32, normal.sample(&mut rng) as f32)
            })
            .collect();

        let config = ReceiverConfig {
            pl_freq_est_period: 4,
            ..test_config()
        };
        let sym_rate = config.sym_rate as f64;
        let mut rx = Receiver::new(config).unwrap();
        let frames = rx.process(&samples);

        assert!(frames.len() >= 8, "got {} frames", frames.len());
        for frame in &frames {
            let sent = &payloads[(frame.start as f64 / pls.frame_len() as f64).round() as usize];
            assert_eq!(decision_errors(&frame.payload, sent), 0, "frame at {}", frame.start);
        }

        let stats = rx.stats();
        let expected_hz = 2.0 * freq_per_sample * sym_rate / (2.0 * PI);
        assert!(
            (stats.freq_offset_hz - expected_hz).abs() < 100.0,
            "estimated {} Hz, injected {expected_hz} Hz",
            stats.freq_offset_hz
        );
        assert_eq!(stats.lock_losses, 0);
        assert_eq!(stats.pilot_errors, 0);
        assert_eq!(stats.timing_resets, 0);
    }
}
