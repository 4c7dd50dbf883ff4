//! Receiver configuration
//!
//! A `ReceiverConfig` carries every tunable of the synchronization engine.
//! Defaults suit a 1 Mbaud QPSK 1/4 broadcast at 2 samples per symbol; profiles can be
//! saved and loaded as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{RxError, RxResult};
use super::types::{FrameSize, Modcod};

/// Highest Gold code sequence number: 2^18 - 2
pub const MAX_GOLD_CODE: u32 = 262_142;

/// Receiver configuration profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Initial AGC gain
    pub agc_gain: f32,
    /// AGC update rate (step size)
    pub agc_rate: f32,
    /// AGC reference output magnitude
    pub agc_ref: f32,
    /// RRC roll-off factor
    pub rolloff: f32,
    /// RRC filter delay in symbol periods
    pub rrc_delay: usize,
    /// Number of branches in the polyphase RRC filter
    pub rrc_nfilts: usize,
    /// Oversampling ratio in samples per symbol
    pub sps: f32,
    /// Symbol rate in bauds
    pub sym_rate: u32,
    /// Symbol synchronizer damping factor
    pub sym_sync_damping: f32,
    /// Symbol synchronizer normalized loop bandwidth
    pub sym_sync_loop_bw: f32,
    /// Expected MODCOD, e.g. "QPSK1/4"
    pub modcod: String,
    /// Expected FECFRAME size
    pub frame_size: FrameSize,
    /// Gold code sequence number of the PL scrambler
    pub gold_code: u32,
    /// Frames between coarse frequency offset re-estimates
    pub pl_freq_est_period: usize,
    /// Log verbosity (0 = info, 1 = debug, 2+ = trace)
    pub debug: u8,
    /// Consecutive unverified header positions before lock is dropped
    pub max_missed_headers: usize,
    /// Consecutive undecodable PLSC fields before lock is dropped
    pub max_plsc_errors: usize,
    /// Record diagnostic taps (power, constellations, spectra)
    pub diagnostics: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            agc_gain: 1.0,
            agc_rate: 1e-5,
            agc_ref: 1.0,
            rolloff: 0.2,
            rrc_delay: 50,
            rrc_nfilts: 32,
            sps: 2.0,
            sym_rate: 1_000_000,
            sym_sync_damping: 1.0,
            sym_sync_loop_bw: 0.0045,
            modcod: "QPSK1/4".to_string(),
            frame_size: FrameSize::Normal,
            gold_code: 0,
            pl_freq_est_period: 20,
            debug: 0,
            max_missed_headers: 3,
            max_plsc_errors: 3,
            diagnostics: false,
        }
    }
}

fn config_err(msg: impl Into<String>) -> RxError {
    RxError::Config(msg.into())
}

impl ReceiverConfig {
    /// Load a profile from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> RxResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: ReceiverConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save this profile as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> RxResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// The parsed MODCOD hint
    pub fn expected_modcod(&self) -> RxResult<Modcod> {
        self.modcod.parse::<Modcod>().map_err(config_err)
    }

    /// Reject configurations the engine cannot start with
    pub fn validate(&self) -> RxResult<()> {
        if !(self.agc_gain.is_finite() && self.agc_gain > 0.0) {
            return Err(config_err(format!("agc_gain must be positive, got {}", self.agc_gain)));
        }
        if !(self.agc_rate.is_finite() && (0.0..1.0).contains(&self.agc_rate)) {
            return Err(config_err(format!("agc_rate must be in [0, 1), got {}", self.agc_rate)));
        }
        if !(self.agc_ref.is_finite() && self.agc_ref > 0.0) {
            return Err(config_err(format!("agc_ref must be positive, got {}", self.agc_ref)));
        }
        if !(self.rolloff > 0.0 && self.rolloff <= 1.0) {
            return Err(config_err(format!("rolloff must be in (0, 1], got {}", self.rolloff)));
        }
        if self.rrc_delay == 0 {
            return Err(config_err("rrc_delay must be at least one symbol"));
        }
        if self.rrc_nfilts == 0 {
            return Err(config_err("rrc_nfilts must be at least 1"));
        }
        // The timing error detector needs a mid-symbol sample
        if !(self.sps.is_finite() && self.sps >= 2.0) {
            return Err(config_err(format!("sps must be at least 2, got {}", self.sps)));
        }
        if self.sym_rate == 0 {
            return Err(config_err("sym_rate must be positive"));
        }
        if !(self.sym_sync_damping.is_finite() && self.sym_sync_damping > 0.0) {
            return Err(config_err(format!(
                "sym_sync_damping must be positive, got {}",
                self.sym_sync_damping
            )));
        }
        if !(0.0..1.0).contains(&self.sym_sync_loop_bw) {
            return Err(config_err(format!(
                "sym_sync_loop_bw must be in [0, 1), got {}",
                self.sym_sync_loop_bw
            )));
        }
        let modcod = self.expected_modcod()?;
        if !modcod.supports(self.frame_size) {
            return Err(config_err(format!(
                "MODCOD {modcod} is not supported with {:?} frames",
                self.frame_size
            )));
        }
        if self.gold_code > MAX_GOLD_CODE {
            return Err(config_err(format!(
                "gold_code must be in 0..={MAX_GOLD_CODE}, got {}",
                self.gold_code
            )));
        }
        if self.pl_freq_est_period == 0 {
            return Err(config_err("pl_freq_est_period must be at least 1 frame"));
        }
        if self.max_missed_headers == 0 || self.max_plsc_errors == 0 {
            return Err(config_err("lock-loss thresholds must be at least 1"));
        }
        Ok(())
    }

    /// Number of taps in each matched-filter branch
    pub fn rrc_taps(&self) -> usize {
        (self.rrc_delay as f32 * self.sps) as usize + 1
    }
}
