//! Peripheral capabilities consumed by the sampling loop
//!
//! # Design
//! The measurement needs two cooperating peripherals and a time base:
//! * An [EdgeCounter] counting both edges of the input signal while its gate line is high.
//! * A [WaveformOutput] driving the gate line from a sequence of [Segment]s timed by a fixed
//!   tick clock.
//! * A [Clock] providing absolute-time wakeups for the sampling cadence.
//!
//! The gate line is shared: the waveform output pin is wired (internally or externally) to the
//! counter control input. The counter therefore only accumulates while the window is emitted.
//!
//! Concrete bindings (register level drivers) implement these traits and are handed to
//! [crate::sampler::FrequencyCounter] at construction.
use core::marker::PhantomData;

use rtic_monotonics::Monotonic;
use waveform::Segment;

/// Time base of the sampling cadence: 1 MHz.
pub const TICK_HZ: u32 = 1_000_000;

pub type Instant = fugit::TimerInstantU64<TICK_HZ>;
pub type Duration = fugit::TimerDurationU64<TICK_HZ>;

/// Edge counter setup derived from [crate::configuration::Config].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CounterSetup {
    /// Signal input line whose edges are counted.
    pub input_pin: u8,
    /// Control line gating the count. This is the waveform output line.
    pub gate_pin: u8,
    pub unit: u8,
    pub channel: u8,
    /// Glitch filter length in base clock ticks.
    pub filter_length: u16,
}

/// Waveform output setup derived from [crate::configuration::Config].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutputSetup {
    pub output_pin: u8,
    pub channel: u8,
    /// Tick period as a divider of the base clock.
    pub clock_divider: u8,
    /// Number of segment memory blocks claimed, starting at `channel`.
    pub memory_blocks: u8,
}

/// A gated counter of signal transitions.
pub trait EdgeCounter {
    type Error: core::fmt::Debug;

    /// Number of counter units.
    const UNITS: u8;
    /// Number of input channels per unit.
    const CHANNELS: u8;
    /// Largest supported glitch filter length.
    const MAX_FILTER: u16;

    /// Configure the counter to increment on rising and falling edges of `input_pin` while
    /// `gate_pin` is high and hold while it is low.
    fn configure(&mut self, setup: CounterSetup) -> Result<(), Self::Error>;

    fn clear(&mut self) -> Result<(), Self::Error>;

    fn read(&mut self) -> Result<i16, Self::Error>;

    fn pause(&mut self) -> Result<(), Self::Error>;

    fn resume(&mut self) -> Result<(), Self::Error>;
}

/// A precisely timed pulse-train generator.
#[allow(async_fn_in_trait)]
pub trait WaveformOutput {
    type Error: core::fmt::Debug;

    /// Number of output channels.
    const CHANNELS: u8;
    /// Number of segments held by one memory block.
    const SEGMENTS_PER_BLOCK: u16;

    /// Configure the output. The line idles low when no segments are emitted.
    fn configure(&mut self, setup: OutputSetup) -> Result<(), Self::Error>;

    /// Start emitting `segments`.
    ///
    /// # Args
    /// * `segments` - The pulse train to emit.
    /// * `wait` - Block until a previously started transmission has completed.
    fn emit(&mut self, segments: &[Segment], wait: bool)
        -> Result<(), Self::Error>;

    /// Wait for the current transmission to complete.
    ///
    /// # Args
    /// * `timeout` - Give up after this long. `None` waits without bound.
    async fn await_completion(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), Self::Error>;
}

/// Absolute-time wakeups.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&mut self) -> Instant;

    /// Suspend until `deadline`. Returns immediately if it has already passed.
    async fn wait_until(&mut self, deadline: Instant);
}

/// [Clock] backed by an RTIC monotonic, e.g. a 1 MHz `Systick`.
pub struct MonotonicClock<M>(PhantomData<M>);

impl<M> MonotonicClock<M> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M> Default for MonotonicClock<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Monotonic<Instant = Instant>> Clock for MonotonicClock<M> {
    fn now(&mut self) -> Instant {
        M::now()
    }

    async fn wait_until(&mut self, deadline: Instant) {
        M::delay_until(deadline).await
    }
}
