//! Frequency counter configuration
//!
//! A [Config] is plain data: it can be deserialized from settings storage or built in code. It
//! is checked against the limits of the concrete peripherals by [Config::build], which also
//! computes the window plan. Nothing about the configuration changes once sampling has started.
use num_traits::float::FloatCore;
use serde::{Deserialize, Serialize};
use waveform::WindowPlan;

use crate::hardware::{
    CounterSetup, Duration, EdgeCounter, OutputSetup, WaveformOutput,
};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid sampling window")]
    Window,
    #[error("Invalid sampling period")]
    Period,
    #[error("Invalid tick clock")]
    Clock,
    #[error("Counter unit {0} out of range")]
    Unit(u8),
    #[error("Counter channel {0} out of range")]
    Channel(u8),
    #[error("Filter length {0} out of range")]
    Filter(u16),
    #[error("Waveform channel {0} out of range")]
    Output(u8),
    #[error("Invalid memory block count {0}")]
    Blocks(u8),
    #[error("Input and gate share line {0}")]
    Pins(u8),
    #[error("Window plan")]
    Plan(#[from] waveform::Error),
}

/// Frequency counter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Line carrying the signal to be measured.
    pub input_pin: u8,

    /// Counter unit used for counting.
    pub counter_unit: u8,

    /// Channel of the counter unit used for counting.
    pub counter_channel: u8,

    /// Line driven by the waveform output to define the sampling window. It also gates the
    /// counter and should not be used for anything else.
    pub output_pin: u8,

    /// Waveform output channel.
    pub waveform_channel: u8,

    /// Waveform tick period as a divider of the base clock.
    pub clock_divider: u8,

    /// Base clock of the waveform output and the counter filter in Hertz.
    pub base_clock: f64,

    /// Number of waveform memory blocks the window may occupy, starting at
    /// `waveform_channel`. Each block holds `WaveformOutput::SEGMENTS_PER_BLOCK` segments and
    /// each segment covers up to 65534 ticks.
    pub memory_blocks: u8,

    /// Time between the start of adjacent windows in seconds.
    pub sampling_period: f32,

    /// Length of the sampling window in seconds.
    ///
    /// This may exceed `sampling_period`, in which case windows run back to back.
    pub sampling_window: f32,

    /// Counter glitch filter length in base clock ticks. Pulses shorter than this are ignored.
    pub filter_length: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_pin: 4,
            counter_unit: 0,
            counter_channel: 0,
            output_pin: 17,
            waveform_channel: 0,
            // 0.5 MHz tick at the 80 MHz APB clock
            clock_divider: 160,
            base_clock: 80.0e6,
            memory_blocks: 1,
            sampling_period: 1.0,
            sampling_window: 0.5,
            // 12.5 µs at 80 MHz
            filter_length: 1000,
        }
    }
}

/// The validated, precomputed form of a [Config].
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    /// Gating waveform of one sampling window.
    pub plan: WindowPlan,
    /// Window length in seconds.
    pub window: f64,
    /// Time between window starts.
    pub period: Duration,
}

impl Config {
    /// Waveform tick period in seconds.
    pub fn tick_period(&self) -> f64 {
        self.clock_divider as f64 / self.base_clock
    }

    pub fn counter_setup(&self) -> CounterSetup {
        CounterSetup {
            input_pin: self.input_pin,
            gate_pin: self.output_pin,
            unit: self.counter_unit,
            channel: self.counter_channel,
            filter_length: self.filter_length,
        }
    }

    pub fn output_setup(&self) -> OutputSetup {
        OutputSetup {
            output_pin: self.output_pin,
            channel: self.waveform_channel,
            clock_divider: self.clock_divider,
            memory_blocks: self.memory_blocks,
        }
    }

    /// Number of segments available to the window plan.
    pub fn max_segments<W: WaveformOutput>(&self) -> usize {
        self.memory_blocks as usize * W::SEGMENTS_PER_BLOCK as usize
    }

    /// Validate against the peripheral limits and plan the sampling window.
    pub fn build<C: EdgeCounter, W: WaveformOutput>(
        &self,
    ) -> Result<Schedule, ConfigError> {
        let window = self.sampling_window as f64;
        if !window.is_finite() || window <= 0.0 {
            return Err(ConfigError::Window);
        }
        // Window starts are compared on a wrapping 64 bit microsecond timeline.
        let period = FloatCore::round(self.sampling_period as f64 * 1e6);
        if !period.is_finite()
            || period < 0.0
            || period >= i64::MAX as f64
        {
            return Err(ConfigError::Period);
        }
        if self.clock_divider == 0
            || !self.base_clock.is_finite()
            || self.base_clock <= 0.0
        {
            return Err(ConfigError::Clock);
        }
        if self.counter_unit >= C::UNITS {
            return Err(ConfigError::Unit(self.counter_unit));
        }
        if self.counter_channel >= C::CHANNELS {
            return Err(ConfigError::Channel(self.counter_channel));
        }
        if self.filter_length > C::MAX_FILTER {
            return Err(ConfigError::Filter(self.filter_length));
        }
        if self.waveform_channel >= W::CHANNELS {
            return Err(ConfigError::Output(self.waveform_channel));
        }
        // Additional blocks are borrowed from the following channels.
        if self.memory_blocks == 0
            || self.waveform_channel as u16 + self.memory_blocks as u16
                > W::CHANNELS as u16
        {
            return Err(ConfigError::Blocks(self.memory_blocks));
        }
        if self.input_pin == self.output_pin {
            return Err(ConfigError::Pins(self.input_pin));
        }

        let plan = WindowPlan::new(
            window,
            self.tick_period(),
            self.max_segments::<W>(),
        )?;
        let period = Duration::micros(period as u64);
        Ok(Schedule {
            plan,
            window,
            period,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveform::Segment;

    struct Counter;

    impl EdgeCounter for Counter {
        type Error = ();
        const UNITS: u8 = 8;
        const CHANNELS: u8 = 2;
        const MAX_FILTER: u16 = 1023;
        fn configure(&mut self, _: CounterSetup) -> Result<(), ()> {
            Ok(())
        }
        fn clear(&mut self) -> Result<(), ()> {
            Ok(())
        }
        fn read(&mut self) -> Result<i16, ()> {
            Ok(0)
        }
        fn pause(&mut self) -> Result<(), ()> {
            Ok(())
        }
        fn resume(&mut self) -> Result<(), ()> {
            Ok(())
        }
    }

    struct Output;

    impl WaveformOutput for Output {
        type Error = ();
        const CHANNELS: u8 = 8;
        const SEGMENTS_PER_BLOCK: u16 = 64;
        fn configure(&mut self, _: OutputSetup) -> Result<(), ()> {
            Ok(())
        }
        fn emit(&mut self, _: &[Segment], _: bool) -> Result<(), ()> {
            Ok(())
        }
        async fn await_completion(
            &mut self,
            _: Option<Duration>,
        ) -> Result<(), ()> {
            Ok(())
        }
    }

    fn build(config: &Config) -> Result<Schedule, ConfigError> {
        config.build::<Counter, Output>()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.tick_period(), 2e-6);
        let schedule = build(&config).unwrap();
        assert_eq!(schedule.plan.ticks(), 250_000);
        assert_eq!(schedule.plan.len(), 4);
        assert_eq!(schedule.window, 0.5);
        assert_eq!(schedule.period, Duration::micros(1_000_000));
    }

    #[test]
    fn long_window() {
        let config = Config {
            sampling_window: 10.0,
            sampling_period: 10.0,
            ..Default::default()
        };
        assert_eq!(
            build(&config),
            Err(ConfigError::Plan(waveform::Error::Length {
                required: 77,
                available: 64
            }))
        );
        let config = Config {
            memory_blocks: 2,
            ..config
        };
        assert_eq!(build(&config).unwrap().plan.len(), 77);
    }

    #[test]
    fn window_exceeds_period() {
        let config = Config {
            sampling_window: 2.0,
            sampling_period: 0.5,
            ..Default::default()
        };
        let schedule = build(&config).unwrap();
        assert_eq!(schedule.period, Duration::millis(500));

        let config = Config {
            sampling_period: 0.0,
            ..config
        };
        assert_eq!(build(&config).unwrap().period, Duration::micros(0));
    }

    #[test]
    fn invalid() {
        let base = Config::default();
        for (config, err) in [
            (
                Config {
                    sampling_window: 1e-7,
                    ..base.clone()
                },
                ConfigError::Plan(waveform::Error::Empty),
            ),
            (
                Config {
                    sampling_window: 0.0,
                    ..base.clone()
                },
                ConfigError::Window,
            ),
            (
                Config {
                    sampling_window: f32::NAN,
                    ..base.clone()
                },
                ConfigError::Window,
            ),
            (
                Config {
                    sampling_period: -1.0,
                    ..base.clone()
                },
                ConfigError::Period,
            ),
            (
                Config {
                    sampling_period: 1.0e13,
                    ..base.clone()
                },
                ConfigError::Period,
            ),
            (
                Config {
                    sampling_period: f32::MAX,
                    ..base.clone()
                },
                ConfigError::Period,
            ),
            (
                Config {
                    clock_divider: 0,
                    ..base.clone()
                },
                ConfigError::Clock,
            ),
            (
                Config {
                    base_clock: 0.0,
                    ..base.clone()
                },
                ConfigError::Clock,
            ),
            (
                Config {
                    counter_unit: 8,
                    ..base.clone()
                },
                ConfigError::Unit(8),
            ),
            (
                Config {
                    counter_channel: 2,
                    ..base.clone()
                },
                ConfigError::Channel(2),
            ),
            (
                Config {
                    filter_length: 1024,
                    ..base.clone()
                },
                ConfigError::Filter(1024),
            ),
            (
                Config {
                    waveform_channel: 8,
                    ..base.clone()
                },
                ConfigError::Output(8),
            ),
            (
                Config {
                    memory_blocks: 0,
                    ..base.clone()
                },
                ConfigError::Blocks(0),
            ),
            (
                Config {
                    waveform_channel: 6,
                    memory_blocks: 3,
                    ..base.clone()
                },
                ConfigError::Blocks(3),
            ),
            (
                Config {
                    output_pin: 4,
                    ..base.clone()
                },
                ConfigError::Pins(4),
            ),
        ] {
            assert_eq!(build(&config), Err(err), "{config:?}");
        }
    }

    #[test]
    fn setups() {
        let config = Config::default();
        assert_eq!(
            config.counter_setup(),
            CounterSetup {
                input_pin: 4,
                gate_pin: 17,
                unit: 0,
                channel: 0,
                filter_length: 1000,
            }
        );
        assert_eq!(
            config.output_setup(),
            OutputSetup {
                output_pin: 17,
                channel: 0,
                clock_divider: 160,
                memory_blocks: 1,
            }
        );
    }

    #[test]
    fn from_json() {
        let (config, _): (Config, _) = serde_json_core::from_str(
            r#"{"input_pin":12,"output_pin":13,"sampling_window":0.25,"memory_blocks":2}"#,
        )
        .unwrap();
        assert_eq!(config.input_pin, 12);
        assert_eq!(config.output_pin, 13);
        assert_eq!(config.sampling_window, 0.25);
        assert_eq!(config.memory_blocks, 2);
        assert_eq!(config.clock_divider, 160);
        assert_eq!(build(&config).unwrap().plan.ticks(), 125_000);
    }
}
