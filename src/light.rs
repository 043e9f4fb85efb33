use embassy_time::{Duration, Instant};
use heapless::Vec;

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::LightRef;
use crate::batch_scheduler::{BatchScheduler, LightSource};
use crate::color::{OFF, Rgb, WHITE, scale_color};
use crate::error::{Error, Result};
use crate::fade::{FadeStep, evaluate};
use crate::filter::{FilterConfig, OutputFilter};
use crate::shared::Shared;
use crate::stack::{LightStack, MAX_STACK_DEPTH, StackEntry, StackKey};
use crate::time::{Clock, NO_FADE};

/// Maximum number of hardware channels driving one light
pub const MAX_CHANNELS: usize = 4;

/// Color component a hardware channel outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
    /// Simple white output, lit by the common part of red, green and blue
    White,
}

impl ColorChannel {
    /// Brightness of this channel for a color
    pub fn extract(self, color: Rgb) -> u8 {
        match self {
            ColorChannel::Red => color.r,
            ColorChannel::Green => color.g,
            ColorChannel::Blue => color.b,
            ColorChannel::White => color.r.min(color.g).min(color.b),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ColorChannel::Red => "red",
            ColorChannel::Green => "green",
            ColorChannel::Blue => "blue",
            ColorChannel::White => "white",
        }
    }
}

/// Wiring of one hardware channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Hardware address of the output
    pub light: LightRef,
    pub channel: ColorChannel,
    /// Longest fade one hardware message can carry; zero if the hardware
    /// cannot fade and values are stepped every poll instead
    pub max_fade: Duration,
}

/// Configuration for one light
#[derive(Debug, Clone)]
pub struct LightConfig {
    pub channels: Vec<ChannelConfig, MAX_CHANNELS>,
    /// Fade used when a command does not specify one
    pub default_fade: Duration,
    /// Color used by [`LightState::on`]
    pub default_on_color: Rgb,
    pub filters: FilterConfig,
}

impl LightConfig {
    /// Light driven by the given channels
    pub fn from_channels(channels: &[ChannelConfig]) -> Result<Self> {
        let channels = Vec::from_slice(channels).map_err(|()| Error::TooManyChannels)?;
        Ok(Self {
            channels,
            default_fade: NO_FADE,
            default_on_color: WHITE,
            filters: FilterConfig::IDENTITY,
        })
    }

    /// RGB light on three consecutive outputs starting at `first`
    pub fn rgb(first: LightRef, max_fade: Duration) -> Result<Self> {
        let output = |offset: u16, channel: ColorChannel| ChannelConfig {
            light: LightRef::new(first.chain, first.index.wrapping_add(offset)),
            channel,
            max_fade,
        };
        Self::from_channels(&[
            output(0, ColorChannel::Red),
            output(1, ColorChannel::Green),
            output(2, ColorChannel::Blue),
        ])
    }

    /// Single white output
    pub fn white(light: LightRef, max_fade: Duration) -> Result<Self> {
        Self::from_channels(&[ChannelConfig {
            light,
            channel: ColorChannel::White,
            max_fade,
        }])
    }

    #[must_use]
    pub fn with_default_fade(mut self, fade: Duration) -> Self {
        self.default_fade = fade;
        self
    }

    #[must_use]
    pub fn with_default_on_color(mut self, color: Rgb) -> Self {
        self.default_on_color = color;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }
}

/// Per-channel view of a light's stack
///
/// Every hardware channel of a light evaluates the same stack once per query
/// and picks its own component of the filtered color.
#[derive(Debug, Clone, Copy)]
pub struct ChannelExtractor {
    config: ChannelConfig,
}

impl ChannelExtractor {
    pub const fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub const fn light(&self) -> LightRef {
        self.config.light
    }

    pub const fn channel(&self) -> ColorChannel {
        self.config.channel
    }

    pub const fn max_fade(&self) -> Duration {
        self.config.max_fade
    }

    /// Brightness and fade of this channel for the next hardware message
    ///
    /// The evaluation window is the channel's `max_fade`, shortened to
    /// `fade_cap` if given.
    pub fn fade_step(
        &self,
        stack: &LightStack,
        filter: &OutputFilter,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> FadeStep<u8> {
        let limit = self.config.max_fade;
        let max_fade = fade_cap.map_or(limit, |cap| cap.min(limit));
        stack
            .evaluate(max_fade, now)
            .map(|color| self.config.channel.extract(filter.apply(color)))
    }
}

/// Armed removal of a transparent fade-out entry
#[derive(Debug, Clone)]
struct FadeOutTimer {
    key: StackKey,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct LightInner {
    stack: LightStack,
    fade_outs: Vec<FadeOutTimer, MAX_STACK_DEPTH>,
}

impl LightInner {
    fn cancel_fade_out(&mut self, key: &StackKey) {
        self.fade_outs.retain(|timer| timer.key != *key);
    }

    fn arm_fade_out(&mut self, key: StackKey, deadline: Instant) -> Result<()> {
        self.cancel_fade_out(&key);
        self.fade_outs
            .push(FadeOutTimer { key, deadline })
            .map_err(|_| Error::StackFull)
    }

    /// Fire every timer due at `now`, each exactly once
    fn fire_fade_outs(&mut self, now: Instant) {
        while let Some(index) = self
            .fade_outs
            .iter()
            .position(|timer| timer.deadline <= now)
        {
            let timer = self.fade_outs.swap_remove(index);
            if self.stack.remove_fade_out(&timer.key).is_some() {
                #[cfg(feature = "esp32-log")]
                println!("[LightState.fire_fade_outs] removed fade-out {}", timer.key);
            }
        }
    }
}

/// One physical light
///
/// Holds the priority stack of color commands and marks its hardware channels
/// dirty on `scheduler` whenever the visible output may change.
pub struct LightState<'a, C: Clock, const N: usize> {
    scheduler: &'a BatchScheduler<C, N>,
    channels: Vec<ChannelExtractor, MAX_CHANNELS>,
    default_fade: Duration,
    default_on_color: Rgb,
    filter: OutputFilter,
    inner: Shared<LightInner>,
}

impl<'a, C: Clock, const N: usize> LightState<'a, C, N> {
    /// Create a light attached to `scheduler`
    pub fn new(scheduler: &'a BatchScheduler<C, N>, config: &LightConfig) -> Result<Self> {
        if config.channels.is_empty() {
            return Err(Error::InvalidConfig("light has no channels"));
        }
        let mut channels: Vec<ChannelExtractor, MAX_CHANNELS> = config
            .channels
            .iter()
            .copied()
            .map(ChannelExtractor::new)
            .collect();
        // sorted outputs batch better on most platforms
        channels.sort_unstable_by_key(ChannelExtractor::light);

        Ok(Self {
            scheduler,
            channels,
            default_fade: config.default_fade,
            default_on_color: config.default_on_color,
            filter: OutputFilter::new(&config.filters),
            inner: Shared::new(LightInner::default()),
        })
    }

    /// Add or replace the color command identified by `key`
    ///
    /// `fade` defaults to the light's default fade and `key` to the empty key.
    /// A command with a lower priority than the existing entry for the same key
    /// is ignored. Commands below the top of the stack are kept and become
    /// visible once the entries above them are removed.
    pub fn color(
        &self,
        color: Rgb,
        fade: Option<Duration>,
        priority: i32,
        key: Option<&str>,
    ) -> Result<()> {
        let key = StackKey::new(key.unwrap_or(""))?;
        let fade = fade.unwrap_or(self.default_fade);
        let now = self.scheduler.now();

        let color_changes = self.inner.with(|inner| -> Result<bool> {
            inner.fire_fade_outs(now);

            if inner
                .stack
                .get(&key)
                .is_some_and(|existing| existing.priority > priority)
            {
                #[cfg(feature = "esp32-log")]
                println!(
                    "[LightState.color] ignoring {} at priority {}, key is held at a higher priority",
                    key, priority
                );
                return Ok(false);
            }

            let color_changes = inner
                .stack
                .top()
                .is_none_or(|top| top.priority <= priority || top.is_transparent());

            let (start_color, dest_time) = if fade > NO_FADE {
                let below = evaluate(inner.stack.below(priority, &key), NO_FADE, now);
                (Some(below.value), Some(now + fade))
            } else {
                (None, None)
            };

            #[cfg(feature = "esp32-log")]
            println!(
                "[LightState.color] adding {:?} at priority {} key '{}' fade {}ms",
                color,
                priority,
                key,
                fade.as_millis()
            );

            inner.cancel_fade_out(&key);
            inner.stack.insert(StackEntry {
                priority,
                key: key.clone(),
                start_time: now,
                start_color,
                dest_time,
                dest_color: Some(color),
            })?;

            Ok(color_changes)
        })?;

        if color_changes {
            self.schedule_update()?;
        }
        Ok(())
    }

    /// Turn the light on with its default on color
    ///
    /// `brightness` (0-255) dims the on color.
    pub fn on(
        &self,
        brightness: Option<u8>,
        fade: Option<Duration>,
        priority: i32,
        key: Option<&str>,
    ) -> Result<()> {
        let color = match brightness {
            Some(brightness) => scale_color(self.default_on_color, brightness),
            None => self.default_on_color,
        };
        self.color(color, fade, priority, key)
    }

    /// Turn the light off at the given priority
    pub fn off(&self, fade: Option<Duration>, priority: i32, key: Option<&str>) -> Result<()> {
        self.color(OFF, fade, priority, key)
    }

    /// Remove the command identified by `key`
    ///
    /// With a fade, the entry turns into a transparent fade-out revealing the
    /// entries below it and is deleted once the fade completes.
    pub fn remove_from_stack_by_key(&self, key: &str, fade: Option<Duration>) -> Result<()> {
        let key = StackKey::new(key)?;
        let fade = fade.unwrap_or(self.default_fade);
        let now = self.scheduler.now();

        let color_changes = self.inner.with(|inner| -> Result<bool> {
            inner.fire_fade_outs(now);

            let Some(index) = inner.stack.position(&key) else {
                return Ok(false);
            };
            let visible = inner.stack.is_visible_at(index);
            let Some((priority, fading_out)) = inner
                .stack
                .entries()
                .get(index)
                .map(|entry| (entry.priority, entry.is_transparent()))
            else {
                return Ok(false);
            };

            // a fade-out is never faded out again
            if fade == NO_FADE || fading_out {
                #[cfg(feature = "esp32-log")]
                println!("[LightState.remove_from_stack_by_key] removing '{}'", key);
                inner.stack.remove(&key);
                inner.cancel_fade_out(&key);
                return Ok(visible);
            }

            let color_of_key = evaluate(inner.stack.from_key(&key), NO_FADE, now).value;
            let deadline = now + fade;

            #[cfg(feature = "esp32-log")]
            println!(
                "[LightState.remove_from_stack_by_key] fading out '{}' over {}ms",
                key,
                fade.as_millis()
            );

            inner.stack.insert(StackEntry {
                priority,
                key: key.clone(),
                start_time: now,
                start_color: Some(color_of_key),
                dest_time: Some(deadline),
                dest_color: None,
            })?;
            inner.arm_fade_out(key, deadline)?;

            Ok(visible)
        })?;

        if color_changes {
            self.schedule_update()?;
        }
        Ok(())
    }

    /// Remove all entries; the light turns off
    pub fn clear_stack(&self) -> Result<()> {
        self.inner.with(|inner| {
            inner.stack.clear();
            inner.fade_outs.clear();
        });

        #[cfg(feature = "esp32-log")]
        println!("[LightState.clear_stack] stack cleared");

        self.schedule_update()
    }

    /// Color currently shown, before output filters
    pub fn get_color(&self) -> Rgb {
        self.color_at(self.scheduler.now())
    }

    /// Color shown at `now`, before output filters
    pub fn color_at(&self, now: Instant) -> Rgb {
        self.inner.with(|inner| {
            inner.fire_fade_outs(now);
            inner.stack.evaluate(NO_FADE, now).value
        })
    }

    /// Check if the top of the stack is still fading
    pub fn fade_in_progress(&self) -> bool {
        let now = self.scheduler.now();
        self.inner
            .with(|inner| inner.stack.top().is_some_and(|top| top.is_fading(now)))
    }

    /// Copy of the stack after firing due fade-out timers
    pub fn stack_snapshot(&self) -> LightStack {
        let now = self.scheduler.now();
        self.inner.with(|inner| {
            inner.fire_fade_outs(now);
            inner.stack.clone()
        })
    }

    /// Hardware outputs of this light in hardware order
    pub fn hardware_refs(&self) -> impl Iterator<Item = LightRef> + '_ {
        self.channels.iter().map(ChannelExtractor::light)
    }

    /// Channel extractors of this light in hardware order
    pub fn channels(&self) -> &[ChannelExtractor] {
        &self.channels
    }

    /// Brightness step for one of this light's outputs
    pub fn channel_fade(
        &self,
        light: LightRef,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> Option<FadeStep<u8>> {
        let extractor = self.channels.iter().find(|channel| channel.light() == light)?;
        Some(self.inner.with(|inner| {
            inner.fire_fade_outs(now);
            extractor.fade_step(&inner.stack, &self.filter, fade_cap, now)
        }))
    }

    fn schedule_update(&self) -> Result<()> {
        for channel in &self.channels {
            self.scheduler.mark_dirty(channel.light())?;
        }
        Ok(())
    }
}

impl<C: Clock, const N: usize> LightSource for LightState<'_, C, N> {
    fn service_timers(&self, now: Instant) {
        self.inner.with(|inner| inner.fire_fade_outs(now));
    }

    fn channel_fade(
        &self,
        light: LightRef,
        fade_cap: Option<Duration>,
        now: Instant,
    ) -> Option<FadeStep<u8>> {
        LightState::channel_fade(self, light, fade_cap, now)
    }
}

/// Check that no hardware output is claimed by two channels
///
/// Also rejects light sets with more outputs than the scheduler can track.
pub fn check_unique_refs<C: Clock, const N: usize>(lights: &[LightState<'_, C, N>]) -> Result<()> {
    let mut seen: Vec<LightRef, N> = Vec::new();
    for light in lights.iter().flat_map(LightState::hardware_refs) {
        if seen.contains(&light) {
            return Err(Error::DuplicateLightRef(light));
        }
        seen.push(light)
            .map_err(|_| Error::InvalidConfig("more outputs than the scheduler can track"))?;
    }
    Ok(())
}
