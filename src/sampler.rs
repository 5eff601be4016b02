//! Gated frequency measurement loop
//!
//! # Design
//! Every cycle the edge counter is cleared and the waveform output emits the precomputed window
//! plan. The output line gates the counter, so once the transmission has completed the counter
//! holds the number of edges seen during exactly the planned window. Both edges of the input
//! are counted, so the frequency is half the count divided by the window length.
//!
//! Window starts are scheduled at `start + n * period` on the [Clock]. Latency of the individual
//! steps therefore does not accumulate. If a window ends after the next start is due (window
//! length at or above the period), the next cycle begins immediately.
//!
//! # Faults
//! There is no retry and no degraded sample. Any peripheral fault during setup prevents the
//! counter from being constructed, and any fault during sampling ends [FrequencyCounter::run].
//!
//! # Note
//! Edges arriving between the end of the transmission and the counter read are only excluded
//! if the gate closes before the read. This depends on the peripheral gating latency.
use core::convert::Infallible;

use crate::configuration::{Config, ConfigError, Schedule};
use crate::hardware::{
    Clock, Duration, EdgeCounter, Instant, WaveformOutput,
};

/// Notifications from the sampling loop.
///
/// Both are called synchronously from the sampling task and must not block.
pub trait Events {
    /// Called just prior to starting a sampling window.
    fn window_start(&mut self) {}

    /// Called each time a frequency has been determined.
    fn frequency(&mut self, _hz: f64) {}
}

impl Events for () {}

impl<T: Events> Events for &mut T {
    fn window_start(&mut self) {
        (**self).window_start()
    }

    fn frequency(&mut self, hz: f64) {
        (**self).frequency(hz)
    }
}

/// Frequency notifications only.
pub struct OnFrequency<F>(pub F);

impl<F: FnMut(f64)> Events for OnFrequency<F> {
    fn frequency(&mut self, hz: f64) {
        (self.0)(hz)
    }
}

/// When a peripheral fault occurred.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Peripheral configuration before sampling started.
    Setup,
    /// Register access or completion wait in the sampling loop.
    Sampling,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error<CE, WE> {
    #[error("Configuration")]
    Config(#[from] ConfigError),
    #[error("Edge counter fault during {0:?}: {1:?}")]
    Counter(Phase, CE),
    #[error("Waveform output fault during {0:?}: {1:?}")]
    Waveform(Phase, WE),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Counter cleared, window about to be emitted.
    Armed,
    /// Waveform emitting, counter gated on.
    WindowActive,
    /// Waveform finished, reading the counter.
    Draining,
    /// Waiting for the next window start.
    IdleWait,
}

/// The result of one sampling window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    /// Raw edge count.
    pub count: i16,
    /// Frequency in Hertz.
    pub frequency: f64,
}

/// Convert a count of rising and falling edges during `window` seconds into Hertz.
pub fn frequency(count: i16, window: f64) -> f64 {
    count as f64 / 2.0 / window
}

/// A frequency counter owning its edge counter, waveform output and clock.
pub struct FrequencyCounter<C, W, K, E> {
    counter: C,
    output: W,
    clock: K,
    events: E,
    schedule: Schedule,
    start: Instant,
    cycles: u64,
    state: State,
}

impl<C, W, K, E> FrequencyCounter<C, W, K, E>
where
    C: EdgeCounter,
    W: WaveformOutput,
    K: Clock,
    E: Events,
{
    /// Validate the configuration, plan the window and set up the peripherals.
    ///
    /// # Args
    /// * `config` - The measurement configuration.
    /// * `counter` - The edge counter, exclusively owned from now on.
    /// * `output` - The waveform output driving the counter gate.
    /// * `clock` - Time base for the sampling period.
    /// * `events` - Receives window start and frequency notifications.
    ///
    /// # Returns
    /// The frequency counter, armed. The current time becomes the reference for all window
    /// starts.
    pub fn new(
        config: &Config,
        mut counter: C,
        mut output: W,
        mut clock: K,
        events: E,
    ) -> Result<Self, Error<C::Error, W::Error>> {
        log::info!("{:?}", config);
        let schedule = config.build::<C, W>()?;
        log::info!(
            "Window: {} s, {} ticks in {} segments",
            schedule.window,
            schedule.plan.ticks(),
            schedule.plan.len()
        );

        let output_fault = |e| Error::<C::Error, _>::Waveform(Phase::Setup, e);
        let counter_fault = |e| Error::<_, W::Error>::Counter(Phase::Setup, e);
        output
            .configure(config.output_setup())
            .map_err(output_fault)?;
        counter
            .configure(config.counter_setup())
            .map_err(counter_fault)?;
        counter.pause().map_err(counter_fault)?;
        counter.clear().map_err(counter_fault)?;
        counter.resume().map_err(counter_fault)?;

        let start = clock.now();
        Ok(Self {
            counter,
            output,
            clock,
            events,
            schedule,
            start,
            cycles: 0,
            state: State::Armed,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Measure during one sampling window.
    pub async fn sample(
        &mut self,
    ) -> Result<Sample, Error<C::Error, W::Error>> {
        let output_fault =
            |e| Error::<C::Error, _>::Waveform(Phase::Sampling, e);
        let counter_fault =
            |e| Error::<_, W::Error>::Counter(Phase::Sampling, e);

        self.state = State::Armed;
        self.counter.clear().map_err(counter_fault)?;
        self.events.window_start();

        self.output
            .emit(self.schedule.plan.segments(), false)
            .map_err(output_fault)?;
        self.state = State::WindowActive;
        self.output
            .await_completion(None)
            .await
            .map_err(output_fault)?;

        self.state = State::Draining;
        let count = self.counter.read().map_err(counter_fault)?;
        self.counter.clear().map_err(counter_fault)?;
        if count < 0 {
            log::warn!("Counter wrapped: {count}");
        }

        let hz = frequency(count, self.schedule.window);
        log::debug!("counter {count}, frequency {hz} Hz");
        self.events.frequency(hz);
        Ok(Sample {
            count,
            frequency: hz,
        })
    }

    /// Wait until the next window is due.
    pub async fn idle(&mut self) {
        self.state = State::IdleWait;
        self.cycles += 1;
        let offset = self.schedule.period.ticks().wrapping_mul(self.cycles);
        let deadline = self.start + Duration::from_ticks(offset);
        if deadline > self.clock.now() {
            self.clock.wait_until(deadline).await;
        }
        self.state = State::Armed;
    }

    /// Sample forever.
    ///
    /// # Returns
    /// Only on a fault, which ends sampling.
    pub async fn run(
        &mut self,
    ) -> Result<Infallible, Error<C::Error, W::Error>> {
        loop {
            if let Err(err) = self.sample().await {
                log::error!("Sampling halted: {err:?}");
                return Err(err);
            }
            self.idle().await;
        }
    }
}
