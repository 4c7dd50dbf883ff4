//! PL frame synchronization
//!
//! Symbol-rate state machine that finds PLHEADERs, decodes their signalling
//! and then follows the frame structure:
//!
//! - `Searching`: score every 90-symbol window against the header pattern.
//! - `HeaderFound`: a window crossed the threshold; follow the score while it
//!   rises, then decode the PLSC at the peak.
//! - `Locked`: collect frames, verifying each header only where the previous
//!   frame says it must be.

use std::collections::VecDeque;

use log::{debug, info, warn};
use serde::Serialize;

use super::plheader::{HeaderCorrelator, PlscDecode, DETECTION_THRESHOLD};
use crate::domain::{PlsCode, Sample, PLHEADER_LEN};

/// Frame synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Searching,
    HeaderFound,
    Locked,
}

/// One complete PLFRAME as located by the synchronizer
#[derive(Debug, Clone)]
pub struct SyncedFrame {
    /// Symbol index of the first header symbol
    pub start: u64,
    pub pls: PlsCode,
    /// Header plus body, pilots included, still scrambled
    pub symbols: Vec<Sample>,
    /// SOF frequency estimate for this header, radians per symbol
    pub freq_hint: f64,
}

/// Counters kept across the synchronizer's lifetime
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FrameSyncStats {
    pub lock_acquisitions: u64,
    pub lock_losses: u64,
    pub frames: u64,
    pub dropped_frames: u64,
    pub missed_headers: u64,
    pub plsc_errors: u64,
}

/// Peak of the header score while in `HeaderFound`
struct Candidate {
    score: f32,
    start: u64,
    window: Vec<Sample>,
    trailing: Vec<Sample>,
}

/// The frame being collected while `Locked`
struct FrameInProgress {
    start: u64,
    pls: PlsCode,
    freq_hint: f64,
    /// Header verified; unverified frames are consumed but not emitted
    verified: bool,
    symbols: Vec<Sample>,
}

pub struct FrameSync {
    correlator: HeaderCorrelator,
    state: SyncState,
    window: VecDeque<Sample>,
    /// Index of the next symbol to arrive
    symbol_index: u64,
    candidate: Option<Candidate>,
    frame: Option<FrameInProgress>,
    max_missed_headers: usize,
    max_plsc_errors: usize,
    consecutive_misses: usize,
    consecutive_plsc_errors: usize,
    stats: FrameSyncStats,
}

impl FrameSync {
    pub fn new(max_missed_headers: usize, max_plsc_errors: usize) -> Self {
        Self {
            correlator: HeaderCorrelator::new(),
            state: SyncState::Searching,
            window: VecDeque::with_capacity(PLHEADER_LEN),
            symbol_index: 0,
            candidate: None,
            frame: None,
            max_missed_headers: max_missed_headers.max(1),
            max_plsc_errors: max_plsc_errors.max(1),
            consecutive_misses: 0,
            consecutive_plsc_errors: 0,
            stats: FrameSyncStats::default(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> FrameSyncStats {
        self.stats
    }

    /// Abandon the current lock and any partial frame, and search again
    pub fn force_search(&mut self) {
        if self.state == SyncState::Locked {
            self.stats.lock_losses += 1;
        }
        debug!("Frame search forced at symbol {}", self.symbol_index);
        self.enter_search();
    }

    fn enter_search(&mut self) {
        self.state = SyncState::Searching;
        self.window.clear();
        self.candidate = None;
        self.frame = None;
        self.consecutive_misses = 0;
        self.consecutive_plsc_errors = 0;
    }

    /// Push one symbol; returns a frame when one completes
    pub fn push(&mut self, symbol: Sample) -> Option<SyncedFrame> {
        let index = self.symbol_index;
        self.symbol_index += 1;

        match self.state {
            SyncState::Searching => {
                self.slide(symbol);
                if self.window.len() == PLHEADER_LEN {
                    let window = self.window.make_contiguous();
                    let score = self.correlator.metric(window).score;
                    if score >= DETECTION_THRESHOLD {
                        debug!("Header candidate at symbol {} (score {score:.3})", index + 1 - PLHEADER_LEN as u64);
                        self.candidate = Some(Candidate {
                            score,
                            start: index + 1 - PLHEADER_LEN as u64,
                            window: window.to_vec(),
                            trailing: Vec::new(),
                        });
                        self.state = SyncState::HeaderFound;
                    }
                }
                None
            }
            SyncState::HeaderFound => {
                self.slide(symbol);
                let window = self.window.make_contiguous();
                let score = self.correlator.metric(window).score;
                let candidate = self.candidate.as_mut()?;

                if score > candidate.score {
                    candidate.score = score;
                    candidate.start = index + 1 - PLHEADER_LEN as u64;
                    candidate.window.copy_from_slice(window);
                    candidate.trailing.clear();
                    return None;
                }
                candidate.trailing.push(symbol);
                self.acquire();
                self.complete_frame()
            }
            SyncState::Locked => {
                let frame = self.frame.as_mut()?;
                frame.symbols.push(symbol);
                if frame.symbols.len() == PLHEADER_LEN && !frame.verified {
                    self.verify_header();
                }
                self.complete_frame()
            }
        }
    }

    /// Push a block of symbols, appending completed frames to `out`
    pub fn process_block(&mut self, symbols: &[Sample], out: &mut Vec<SyncedFrame>) {
        for &s in symbols {
            if let Some(frame) = self.push(s) {
                out.push(frame);
            }
        }
    }

    fn slide(&mut self, symbol: Sample) {
        if self.window.len() == PLHEADER_LEN {
            self.window.pop_front();
        }
        self.window.push_back(symbol);
    }

    /// Decode the PLSC at the score peak and lock if it is valid
    fn acquire(&mut self) {
        let Some(candidate) = self.candidate.take() else {
            return;
        };
        match self.correlator.decode(&candidate.window) {
            Some(decoded) => {
                info!(
                    "Frame lock acquired at symbol {}: {} {:?} pilots={} (score {:.3}, coherence {:.3}, {} bit errors)",
                    candidate.start,
                    decoded.pls.modcod,
                    decoded.pls.frame_size,
                    decoded.pls.pilots,
                    candidate.score,
                    decoded.coherence,
                    decoded.distance
                );
                let mut symbols = Vec::with_capacity(decoded.pls.frame_len());
                symbols.extend_from_slice(&candidate.window);
                symbols.extend_from_slice(&candidate.trailing);

                self.state = SyncState::Locked;
                self.stats.lock_acquisitions += 1;
                self.consecutive_misses = 0;
                self.consecutive_plsc_errors = 0;
                self.window.clear();
                self.frame = Some(FrameInProgress {
                    start: candidate.start,
                    pls: decoded.pls,
                    freq_hint: decoded.freq,
                    verified: true,
                    symbols,
                });
            }
            None => {
                debug!("PLSC decode failed at symbol {}, searching", candidate.start);
                self.state = SyncState::Searching;
            }
        }
    }

    /// Check the header of the frame in progress at its expected position
    fn verify_header(&mut self) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let metric = self.correlator.metric(&frame.symbols);
        if metric.score < DETECTION_THRESHOLD {
            self.stats.missed_headers += 1;
            self.consecutive_misses += 1;
            debug!(
                "Header missing at symbol {} (score {:.3}), {} consecutive",
                frame.start, metric.score, self.consecutive_misses
            );
            if self.consecutive_misses >= self.max_missed_headers {
                self.lose_lock("headers missing");
            }
            return;
        }

        match self.correlator.decode(&frame.symbols) {
            Some(PlscDecode { pls, freq, .. }) => {
                if pls != frame.pls {
                    debug!("PLS changed at symbol {}: {} -> {}", frame.start, frame.pls.modcod, pls.modcod);
                }
                frame.pls = pls;
                frame.freq_hint = freq;
                frame.verified = true;
                self.consecutive_misses = 0;
                self.consecutive_plsc_errors = 0;
            }
            None => {
                self.stats.plsc_errors += 1;
                self.consecutive_plsc_errors += 1;
                debug!(
                    "PLSC undecodable at symbol {}, {} consecutive",
                    frame.start, self.consecutive_plsc_errors
                );
                if self.consecutive_plsc_errors >= self.max_plsc_errors {
                    self.lose_lock("PLSC errors");
                }
            }
        }
    }

    fn lose_lock(&mut self, reason: &str) {
        warn!("Frame lock lost at symbol {}: {reason}", self.symbol_index);
        self.stats.lock_losses += 1;
        self.enter_search();
    }

    /// Hand out the frame in progress once all its symbols are in, and start
    /// collecting the next one right behind it
    fn complete_frame(&mut self) -> Option<SyncedFrame> {
        let frame_len = self.frame.as_ref()?.pls.frame_len();
        if self.frame.as_ref()?.symbols.len() < frame_len {
            return None;
        }

        let done = self.frame.take()?;
        self.frame = Some(FrameInProgress {
            start: done.start + frame_len as u64,
            pls: done.pls,
            freq_hint: done.freq_hint,
            verified: false,
            symbols: Vec::with_capacity(frame_len),
        });

        if !done.verified {
            self.stats.dropped_frames += 1;
            debug!("Dropping unverified frame at symbol {}", done.start);
            return None;
        }

        self.stats.frames += 1;
        Some(SyncedFrame {
            start: done.start,
            pls: done.pls,
            symbols: done.symbols,
            freq_hint: done.freq_hint,
        })
    }
}
