//! Gating window plans for pulse-train peripherals
//!
//! A pulse-train (remote control/RMT style) peripheral emits a sequence of 32-bit items, each
//! holding two `(level, duration)` pairs measured in ticks of the peripheral clock. Holding the
//! output high for a long, exact duration means splitting that duration over as many items as
//! the 15-bit duration fields require.
//!
//! [`WindowPlan`] performs that split once. The resulting segments can be handed to the
//! peripheral every time the window is to be emitted.
#![no_std]

use arbitrary_int::u15;
use bitbybit::bitfield;
use num_traits::float::FloatCore;

/// Largest duration representable in one sub-slot of a [`Segment`].
pub const MAX_DURATION: u16 = (1 << 15) - 1;

/// Largest number of active ticks one [`Segment`] can carry across both sub-slots.
pub const MAX_TICKS_PER_SEGMENT: u64 = 2 * MAX_DURATION as u64;

/// Storage capacity of a plan: 8 memory blocks of 64 items each.
pub const CAPACITY: usize = 512;

/// One item of the emitted pulse train.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq, Eq)]
pub struct Segment {
    #[bits(0..=14, rw)]
    pub duration0: u15,
    #[bit(15, rw)]
    pub level0: bool,
    #[bits(16..=30, rw)]
    pub duration1: u15,
    #[bit(31, rw)]
    pub level1: bool,
}

impl Segment {
    /// Number of ticks during which this segment drives the output high.
    pub fn active_ticks(&self) -> u32 {
        let mut ticks = 0;
        if self.level0() {
            ticks += self.duration0().value() as u32;
        }
        if self.level1() {
            ticks += self.duration1().value() as u32;
        }
        ticks
    }

    /// Whether the second sub-slot is the zero level, zero duration end marker.
    pub fn is_terminated(&self) -> bool {
        !self.level1() && self.duration1().value() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Window is shorter than one tick")]
    Empty,
    #[error("Window needs {required} segments, {available} available")]
    Length { required: usize, available: usize },
}

/// Number of whole ticks in a window.
///
/// Non-finite or non-positive quotients yield zero ticks.
pub fn window_ticks(window: f64, tick_period: f64) -> u64 {
    let ticks = FloatCore::floor(window / tick_period);
    if ticks.is_finite() && ticks > 0.0 {
        ticks as u64
    } else {
        0
    }
}

/// Minimal number of segments needed to carry `ticks` active ticks.
pub fn segment_count(ticks: u64) -> usize {
    usize::try_from(ticks.div_ceil(MAX_TICKS_PER_SEGMENT))
        .unwrap_or(usize::MAX)
}

/// The segments that hold the gating output high for exactly one sampling window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowPlan {
    segments: heapless::Vec<Segment, CAPACITY>,
}

impl WindowPlan {
    /// Plan a window of `window` seconds with a peripheral tick of `tick_period` seconds.
    ///
    /// # Args
    /// * `window` - Window length in seconds.
    /// * `tick_period` - Duration of one peripheral tick in seconds.
    /// * `max_segments` - Number of segments the peripheral can hold for this window.
    pub fn new(
        window: f64,
        tick_period: f64,
        max_segments: usize,
    ) -> Result<Self, Error> {
        Self::from_ticks(window_ticks(window, tick_period), max_segments)
    }

    /// Greedily pack `ticks` active ticks into segments.
    ///
    /// Every sub-slot but the last is filled to [`MAX_DURATION`]. If the final segment only
    /// needs its first sub-slot, the second one is left as the end marker.
    pub fn from_ticks(ticks: u64, max_segments: usize) -> Result<Self, Error> {
        if ticks == 0 {
            return Err(Error::Empty);
        }
        let required = segment_count(ticks);
        let available = max_segments.min(CAPACITY);
        if required > available {
            return Err(Error::Length {
                required,
                available,
            });
        }
        log::debug!("Window of {ticks} ticks in {required} segments");

        let take = |remaining: &mut u64| {
            let duration = (*remaining).min(MAX_DURATION as u64) as u16;
            *remaining -= duration as u64;
            u15::new(duration)
        };

        let mut segments: heapless::Vec<Segment, CAPACITY> = heapless::Vec::new();
        let mut remaining = ticks;
        while remaining > 0 {
            let mut segment = Segment::default()
                .with_level0(true)
                .with_duration0(take(&mut remaining));
            if remaining > 0 {
                segment = segment
                    .with_level1(true)
                    .with_duration1(take(&mut remaining));
            }
            log::trace!("[{}] {:?}", segments.len(), segment);
            segments
                .push(segment)
                .map_err(|_| Error::Length { required, available })?;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total active ticks across all segments.
    pub fn ticks(&self) -> u64 {
        self.segments.iter().map(|s| s.active_ticks() as u64).sum()
    }
}
