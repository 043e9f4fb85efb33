//! Dirty tracking and batched hardware updates.
//!
//! Lights mark their outputs dirty when their visible color may change. Each
//! flush walks the dirty outputs in hardware order, evaluates them once, and
//! sends runs of sequential outputs sharing a fade as one batch. Outputs whose
//! fade does not finish inside the window one message can carry are put on a
//! schedule and revisited exactly when that window ends.

use core::mem;

use embassy_time::{Duration, Instant, Timer};
use heapless::Vec;

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::error::{Error, FlushError, Result};
use crate::fade::FadeStep;
use crate::shared::Shared;
use crate::time::{Clock, NO_FADE};
use crate::{BatchEntry, HardwareChannel, LightRef};

/// Default fade tolerance rate (50 Hz = 20 ms).
pub const DEFAULT_UPDATE_HZ: u32 = 50;

/// Default number of outputs per hardware message.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Default sleep between two flushes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a batch scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSchedulerConfig {
    /// Update rate of the hardware; fades closer than one update period are
    /// sent in the same batch
    pub update_hz: u32,
    /// Maximum number of outputs in one hardware message
    pub max_batch_size: usize,
    /// Sleep between two flushes of [`BatchScheduler::run`]
    pub poll_interval: Duration,
}

impl BatchSchedulerConfig {
    pub const DEFAULT: Self = Self {
        update_hz: DEFAULT_UPDATE_HZ,
        max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        poll_interval: DEFAULT_POLL_INTERVAL,
    };

    fn validate(&self) -> Result<()> {
        if self.update_hz == 0 {
            return Err(Error::InvalidConfig("update_hz must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(Error::InvalidConfig("max_batch_size must be positive"));
        }
        Ok(())
    }

    /// Largest fade difference between outputs of one batch (exclusive)
    pub fn fade_tolerance(&self) -> Duration {
        let millis = 1000 / u64::from(self.update_hz.max(1));
        Duration::from_millis(millis.max(1))
    }
}

impl Default for BatchSchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of `send_batch` calls
    pub batches: usize,
    /// Number of outputs sent
    pub lights: usize,
    /// Number of outputs put on the schedule
    pub rescheduled: usize,
}

/// Lights a scheduler can query during a flush
pub trait LightSource {
    /// Fire fade-out timers due at `now`
    fn service_timers(&self, now: Instant);

    /// Brightness step of output `light`, or `None` if no light drives it
    ///
    /// `fade_cap` further bounds the output's own `max_fade`.
    fn channel_fade(
        &self,
        light: LightRef,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> Option<FadeStep<u8>>;
}

impl<L: LightSource + ?Sized> LightSource for &L {
    fn service_timers(&self, now: Instant) {
        (**self).service_timers(now);
    }

    fn channel_fade(
        &self,
        light: LightRef,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> Option<FadeStep<u8>> {
        (**self).channel_fade(light, fade_cap, now)
    }
}

impl<L: LightSource> LightSource for [L] {
    fn service_timers(&self, now: Instant) {
        for light in self {
            light.service_timers(now);
        }
    }

    fn channel_fade(
        &self,
        light: LightRef,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> Option<FadeStep<u8>> {
        self.iter()
            .find_map(|source| source.channel_fade(light, fade_cap, now))
    }
}

impl<L: LightSource, const M: usize> LightSource for [L; M] {
    fn service_timers(&self, now: Instant) {
        self.as_slice().service_timers(now);
    }

    fn channel_fade(
        &self,
        light: LightRef,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> Option<FadeStep<u8>> {
        self.as_slice().channel_fade(light, fade_cap, now)
    }
}

#[derive(Debug, Default)]
struct SchedulerState<const N: usize> {
    /// Outputs to send on the next flush, in hardware order
    dirty: Vec<LightRef, N>,
    /// Outputs to revisit, ordered by wake time
    schedule: Vec<(Instant, LightRef), N>,
    stop_requested: bool,
}

impl<const N: usize> SchedulerState<N> {
    fn insert_dirty(&mut self, light: LightRef) -> Result<()> {
        if let Err(index) = self.dirty.binary_search(&light) {
            self.dirty
                .insert(index, light)
                .map_err(|_| Error::DirtySetFull)?;
        }
        Ok(())
    }

    fn unschedule(&mut self, light: LightRef) {
        self.schedule.retain(|&(_, scheduled)| scheduled != light);
    }

    /// Move schedule entries due at `now` into the dirty set
    fn promote_due(&mut self, now: Instant) -> Result<()> {
        while let Some(&(wake_time, light)) = self.schedule.first() {
            if wake_time > now {
                break;
            }
            self.schedule.remove(0);
            self.insert_dirty(light)?;
        }
        Ok(())
    }
}

/// Batch scheduler for one hardware channel
///
/// `N` is the capacity of the dirty set and of the schedule, i.e. the number
/// of outputs this scheduler can track.
///
/// # Usage
///
/// ```ignore
/// let scheduler = BatchScheduler::<_, 64>::new(SystemClock, BatchSchedulerConfig::DEFAULT)?;
/// let lights = [LightState::new(&scheduler, &config)?];
///
/// // Runs until `scheduler.stop()` is called or the hardware fails
/// scheduler.run(&lights, &mut hardware).await?;
/// ```
pub struct BatchScheduler<C: Clock, const N: usize> {
    clock: C,
    config: BatchSchedulerConfig,
    state: Shared<SchedulerState<N>>,
}

impl<C: Clock, const N: usize> BatchScheduler<C, N> {
    /// Create a scheduler
    pub fn new(clock: C, config: BatchSchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clock,
            config,
            state: Shared::new(SchedulerState {
                dirty: Vec::new(),
                schedule: Vec::new(),
                stop_requested: false,
            }),
        })
    }

    /// Current time of the scheduler clock
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub const fn config(&self) -> &BatchSchedulerConfig {
        &self.config
    }

    /// Queue `light` for the next flush
    ///
    /// A pending wake-up for `light` is dropped: the fresh value supersedes it.
    pub fn mark_dirty(&self, light: LightRef) -> Result<()> {
        self.state.with(|state| {
            state.unschedule(light);
            state.insert_dirty(light)
        })
    }

    /// Revisit `light` at `wake_time`
    ///
    /// Does nothing if `light` is already dirty.
    pub fn schedule(&self, light: LightRef, wake_time: Instant) -> Result<()> {
        self.state.with(|state| {
            if state.dirty.binary_search(&light).is_ok() {
                return Ok(());
            }
            state.unschedule(light);
            let index = state
                .schedule
                .iter()
                .position(|&entry| entry > (wake_time, light))
                .unwrap_or(state.schedule.len());
            state
                .schedule
                .insert(index, (wake_time, light))
                .map_err(|_| Error::ScheduleFull)
        })
    }

    /// Check if `light` will be sent on the next flush
    pub fn is_dirty(&self, light: LightRef) -> bool {
        self.state
            .with(|state| state.dirty.binary_search(&light).is_ok())
    }

    /// Wake time of `light`, if it is on the schedule
    pub fn scheduled_at(&self, light: LightRef) -> Option<Instant> {
        self.state.with(|state| {
            state
                .schedule
                .iter()
                .find(|&&(_, scheduled)| scheduled == light)
                .map(|&(wake_time, _)| wake_time)
        })
    }

    /// Number of outputs waiting for the next flush
    pub fn dirty_len(&self) -> usize {
        self.state.with(|state| state.dirty.len())
    }

    /// Earliest wake time on the schedule
    pub fn next_wake(&self) -> Option<Instant> {
        self.state
            .with(|state| state.schedule.first().map(|&(wake_time, _)| wake_time))
    }

    /// Ask [`BatchScheduler::run`] to return after its current iteration
    pub fn stop(&self) {
        self.state.with(|state| state.stop_requested = true);
    }

    /// Flush continuously until stopped or the hardware fails
    ///
    /// Stopping (or dropping the returned future) is not an error.
    pub async fn run<S, H>(
        &self,
        lights: &S,
        hardware: &mut H,
    ) -> core::result::Result<(), FlushError<H::Error>>
    where
        S: LightSource + ?Sized,
        H: HardwareChannel,
    {
        loop {
            if self.state.with(|state| mem::take(&mut state.stop_requested)) {
                #[cfg(feature = "esp32-log")]
                println!("[BatchScheduler.run] stopped");
                return Ok(());
            }

            if let Err(err) = self.flush(lights, hardware) {
                #[cfg(feature = "esp32-log")]
                println!("[BatchScheduler.run] flush failed, stopping");
                return Err(err);
            }

            Timer::after(self.config.poll_interval).await;
        }
    }

    /// Run one flush iteration
    ///
    /// Sends every dirty output and every scheduled output that is due. The
    /// dirty set is empty afterwards; outputs marked dirty from inside the
    /// flush wait for the next one.
    pub fn flush<S, H>(
        &self,
        lights: &S,
        hardware: &mut H,
    ) -> core::result::Result<FlushReport, FlushError<H::Error>>
    where
        S: LightSource + ?Sized,
        H: HardwareChannel,
    {
        let now = self.clock.now();
        lights.service_timers(now);

        let dirty = self.state.with(|state| -> Result<Vec<LightRef, N>> {
            state.promote_due(now)?;
            Ok(mem::take(&mut state.dirty))
        })?;

        let mut report = FlushReport::default();
        let mut run: Vec<LightRef, N> = Vec::new();
        for light in dirty {
            if let Some(&last) = run.last() {
                if !hardware.is_successor(last, light) {
                    self.send_run(&run, lights, hardware, &mut report)?;
                    run.clear();
                }
            }
            run.push(light).map_err(|_| Error::DirtySetFull)?;
        }
        if !run.is_empty() {
            self.send_run(&run, lights, hardware, &mut report)?;
        }

        Ok(report)
    }

    /// Evaluate one run of sequential outputs and send it in batches
    ///
    /// The first output's fade becomes the batch's common fade and bounds the
    /// window every following output is evaluated over. An output whose fade
    /// still differs by the tolerance (shorter, or any fade after a zero
    /// common fade) starts a new batch with its own fade.
    fn send_run<S, H>(
        &self,
        run: &[LightRef],
        lights: &S,
        hardware: &mut H,
        report: &mut FlushReport,
    ) -> core::result::Result<(), FlushError<H::Error>>
    where
        S: LightSource + ?Sized,
        H: HardwareChannel,
    {
        let tolerance = self.config.fade_tolerance();
        let max_batch_size = self.config.max_batch_size.min(N);

        let mut now = self.clock.now();
        let mut batch: Vec<BatchEntry, N> = Vec::new();
        let mut common_fade: Option<Duration> = None;

        for &light in run {
            let fade_cap = common_fade.filter(|&fade| fade > NO_FADE);
            let Some(step) = lights.channel_fade(light, fade_cap, now) else {
                #[cfg(feature = "esp32-log")]
                println!("[BatchScheduler.send_run] no light drives output {}", light);
                continue;
            };

            if !step.done {
                self.schedule(light, now + step.fade)?;
                report.rescheduled += 1;
            }

            let common = *common_fade.get_or_insert(step.fade);
            let entry = if fade_distance(common, step.fade) < tolerance
                && batch.len() < max_batch_size
            {
                BatchEntry {
                    light,
                    brightness: step.value,
                    fade: common,
                }
            } else {
                Self::send_batch(hardware, &batch, report)?;
                batch.clear();
                now = self.clock.now();
                common_fade = Some(step.fade);
                BatchEntry {
                    light,
                    brightness: step.value,
                    fade: step.fade,
                }
            };
            batch
                .push(entry)
                .map_err(|_| Error::InvalidConfig("batch exceeds scheduler capacity"))?;
        }

        if !batch.is_empty() {
            Self::send_batch(hardware, &batch, report)?;
        }
        Ok(())
    }

    fn send_batch<H: HardwareChannel>(
        hardware: &mut H,
        batch: &[BatchEntry],
        report: &mut FlushReport,
    ) -> core::result::Result<(), FlushError<H::Error>> {
        #[cfg(feature = "esp32-log")]
        println!(
            "[BatchScheduler.send_batch] {} outputs from {:?}",
            batch.len(),
            batch.first().map(|entry| entry.light)
        );

        hardware.send_batch(batch).map_err(FlushError::Hardware)?;
        report.batches += 1;
        report.lights += batch.len();
        Ok(())
    }
}

fn fade_distance(a: Duration, b: Duration) -> Duration {
    if a > b { a - b } else { b - a }
}
