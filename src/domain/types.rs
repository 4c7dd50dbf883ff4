//! Core domain types

use std::fmt;
use std::str::FromStr;

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Complex baseband sample (I + jQ), nominally within [-1, 1)
pub type Sample = Complex32;

/// Symbols in a PLHEADER (SOF + PLSC)
pub const PLHEADER_LEN: usize = 90;

/// Symbols in one PLFRAME slot
pub const SLOT_LEN: usize = 90;

/// Symbols in one pilot block
pub const PILOT_BLOCK_LEN: usize = 36;

/// Slots between consecutive pilot blocks
pub const SLOTS_PER_PILOT_BLOCK: usize = 16;

/// Slots carried by a dummy PLFRAME
const DUMMY_SLOTS: usize = 36;

/// Payload constellation of a PLFRAME
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constellation {
    Qpsk,
    Psk8,
    Apsk16,
    Apsk32,
}

impl Constellation {
    pub fn bits_per_symbol(&self) -> usize {
        match self {
            Constellation::Qpsk => 2,
            Constellation::Psk8 => 3,
            Constellation::Apsk16 => 4,
            Constellation::Apsk32 => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Constellation::Qpsk => "QPSK",
            Constellation::Psk8 => "8PSK",
            Constellation::Apsk16 => "16APSK",
            Constellation::Apsk32 => "32APSK",
        }
    }
}

/// LDPC code rate of a PLFRAME
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeRate {
    R1_4,
    R1_3,
    R2_5,
    R1_2,
    R3_5,
    R2_3,
    R3_4,
    R4_5,
    R5_6,
    R8_9,
    R9_10,
}

impl CodeRate {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeRate::R1_4 => "1/4",
            CodeRate::R1_3 => "1/3",
            CodeRate::R2_5 => "2/5",
            CodeRate::R1_2 => "1/2",
            CodeRate::R3_5 => "3/5",
            CodeRate::R2_3 => "2/3",
            CodeRate::R3_4 => "3/4",
            CodeRate::R4_5 => "4/5",
            CodeRate::R5_6 => "5/6",
            CodeRate::R8_9 => "8/9",
            CodeRate::R9_10 => "9/10",
        }
    }
}

/// Single source of truth for the MODCOD field ↔ (constellation, rate) mapping.
/// MODCOD 0 is the dummy PLFRAME; 29..=31 are reserved.
pub const MODCOD_TABLE: &[(u8, Constellation, CodeRate)] = &[
    (1, Constellation::Qpsk, CodeRate::R1_4),
    (2, Constellation::Qpsk, CodeRate::R1_3),
    (3, Constellation::Qpsk, CodeRate::R2_5),
    (4, Constellation::Qpsk, CodeRate::R1_2),
    (5, Constellation::Qpsk, CodeRate::R3_5),
    (6, Constellation::Qpsk, CodeRate::R2_3),
    (7, Constellation::Qpsk, CodeRate::R3_4),
    (8, Constellation::Qpsk, CodeRate::R4_5),
    (9, Constellation::Qpsk, CodeRate::R5_6),
    (10, Constellation::Qpsk, CodeRate::R8_9),
    (11, Constellation::Qpsk, CodeRate::R9_10),
    (12, Constellation::Psk8, CodeRate::R3_5),
    (13, Constellation::Psk8, CodeRate::R2_3),
    (14, Constellation::Psk8, CodeRate::R3_4),
    (15, Constellation::Psk8, CodeRate::R5_6),
    (16, Constellation::Psk8, CodeRate::R8_9),
    (17, Constellation::Psk8, CodeRate::R9_10),
    (18, Constellation::Apsk16, CodeRate::R2_3),
    (19, Constellation::Apsk16, CodeRate::R3_4),
    (20, Constellation::Apsk16, CodeRate::R4_5),
    (21, Constellation::Apsk16, CodeRate::R5_6),
    (22, Constellation::Apsk16, CodeRate::R8_9),
    (23, Constellation::Apsk16, CodeRate::R9_10),
    (24, Constellation::Apsk32, CodeRate::R3_4),
    (25, Constellation::Apsk32, CodeRate::R4_5),
    (26, Constellation::Apsk32, CodeRate::R5_6),
    (27, Constellation::Apsk32, CodeRate::R8_9),
    (28, Constellation::Apsk32, CodeRate::R9_10),
];

/// The 5-bit MODCOD field carried by the PLSC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Modcod(u8);

impl Modcod {
    pub const DUMMY: Modcod = Modcod(0);

    /// Wrap a raw MODCOD value; only the low five bits are kept
    pub fn new(value: u8) -> Self {
        Self(value & 0x1f)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_dummy(&self) -> bool {
        self.0 == 0
    }

    pub fn is_reserved(&self) -> bool {
        self.0 >= 29
    }

    fn entry(&self) -> Option<&'static (u8, Constellation, CodeRate)> {
        MODCOD_TABLE.iter().find(|(v, _, _)| *v == self.0)
    }

    pub fn constellation(&self) -> Option<Constellation> {
        self.entry().map(|(_, c, _)| *c)
    }

    pub fn code_rate(&self) -> Option<CodeRate> {
        self.entry().map(|(_, _, r)| *r)
    }

    /// Whether this MODCOD may be carried in a frame of the given size
    pub fn supports(&self, frame_size: FrameSize) -> bool {
        if self.is_reserved() {
            return false;
        }
        !(frame_size == FrameSize::Short && self.code_rate() == Some(CodeRate::R9_10))
    }
}

impl fmt::Display for Modcod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry() {
            Some((_, c, r)) => write!(f, "{}{}", c.name(), r.as_str()),
            None if self.is_dummy() => write!(f, "DUMMY"),
            None => write!(f, "RESERVED({})", self.0),
        }
    }
}

impl FromStr for Modcod {
    type Err = String;

    /// Parse names such as "QPSK1/4" or "8psk3/5"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        MODCOD_TABLE
            .iter()
            .find(|(_, c, r)| format!("{}{}", c.name(), r.as_str()) == wanted)
            .map(|(v, _, _)| Modcod(*v))
            .ok_or_else(|| format!("Unknown MODCOD '{s}'"))
    }
}

/// FECFRAME size class, which fixes the PLFRAME length for a constellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSize {
    Normal,
    Short,
}

impl FrameSize {
    pub fn fecframe_bits(&self) -> usize {
        match self {
            FrameSize::Normal => 64_800,
            FrameSize::Short => 16_200,
        }
    }
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(FrameSize::Normal),
            "short" => Ok(FrameSize::Short),
            other => Err(format!("Unknown frame size '{other}'")),
        }
    }
}

/// Decoded physical-layer signalling: MODCOD plus the two TYPE bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlsCode {
    pub modcod: Modcod,
    pub frame_size: FrameSize,
    pub pilots: bool,
}

impl PlsCode {
    pub fn new(modcod: Modcod, frame_size: FrameSize, pilots: bool) -> Self {
        Self {
            modcod,
            frame_size,
            pilots,
        }
    }

    /// The 7-bit PLS code: MODCOD in bits 6..2, short-frame flag in bit 1,
    /// pilots flag in bit 0
    pub fn code(&self) -> u8 {
        let short = u8::from(self.frame_size == FrameSize::Short);
        (self.modcod.value() << 2) | (short << 1) | u8::from(self.pilots)
    }

    pub fn from_code(code: u8) -> Self {
        let frame_size = if code & 0x02 != 0 {
            FrameSize::Short
        } else {
            FrameSize::Normal
        };
        Self {
            modcod: Modcod::new((code >> 2) & 0x1f),
            frame_size,
            pilots: code & 0x01 != 0,
        }
    }

    /// Whether the receiver can frame this signalling (not reserved)
    pub fn is_valid(&self) -> bool {
        self.modcod.is_dummy() || self.modcod.supports(self.frame_size)
    }

    /// Number of 90-symbol data slots
    pub fn slots(&self) -> usize {
        match self.modcod.constellation() {
            Some(c) => self.frame_size.fecframe_bits() / (c.bits_per_symbol() * SLOT_LEN),
            None => DUMMY_SLOTS,
        }
    }

    /// Pilot blocks actually present (dummy frames never carry pilots)
    pub fn pilot_blocks(&self) -> usize {
        if self.pilots && !self.modcod.is_dummy() {
            (self.slots() - 1) / SLOTS_PER_PILOT_BLOCK
        } else {
            0
        }
    }

    /// Symbols following the PLHEADER, pilots included
    pub fn body_len(&self) -> usize {
        self.slots() * SLOT_LEN + self.pilot_blocks() * PILOT_BLOCK_LEN
    }

    /// Total PLFRAME length in symbols
    pub fn frame_len(&self) -> usize {
        PLHEADER_LEN + self.body_len()
    }

    /// Data symbols per frame, pilots excluded
    pub fn payload_len(&self) -> usize {
        self.slots() * SLOT_LEN
    }

    /// Offset of pilot block `block` from the start of the frame body
    pub fn pilot_offset(&self, block: usize) -> usize {
        (block + 1) * SLOTS_PER_PILOT_BLOCK * SLOT_LEN + block * PILOT_BLOCK_LEN
    }
}

/// A recovered, descrambled PLFRAME ready for FEC decoding
#[derive(Debug, Clone, PartialEq)]
pub struct PlFrame {
    /// Symbol index of the first PLHEADER symbol
    pub start: u64,
    pub pls: PlsCode,
    /// Phase-corrected, descrambled data symbols with pilots removed
    pub payload: Vec<Sample>,
}

impl PlFrame {
    pub fn modcod(&self) -> Modcod {
        self.pls.modcod
    }
}
