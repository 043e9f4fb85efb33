mod tests {
    use embassy_time::{Duration, Instant};
    use futures::executor::block_on;
    use pinball_light_composer::color::{BLUE, RED, WHITE};
    use pinball_light_composer::{
        BatchEntry, BatchScheduler, BatchSchedulerConfig, Error, FlushError, FlushReport,
        HardwareChannel, LightConfig, LightRef, LightState, ManualClock,
    };

    type Scheduler<'c> = BatchScheduler<&'c ManualClock, 16>;
    type Light<'a, 'c> = LightState<'a, &'c ManualClock, 16>;

    #[derive(Default)]
    struct RecordingHardware {
        batches: Vec<Vec<BatchEntry>>,
    }

    impl HardwareChannel for RecordingHardware {
        type Error = core::convert::Infallible;

        fn send_batch(&mut self, batch: &[BatchEntry]) -> Result<(), Self::Error> {
            self.batches.push(batch.to_vec());
            Ok(())
        }
    }

    struct FailingHardware;

    impl HardwareChannel for FailingHardware {
        type Error = &'static str;

        fn send_batch(&mut self, _batch: &[BatchEntry]) -> Result<(), Self::Error> {
            Err("link lost")
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn at(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    fn scheduler(clock: &ManualClock) -> Scheduler<'_> {
        BatchScheduler::new(clock, BatchSchedulerConfig::DEFAULT).unwrap()
    }

    fn white_light<'a, 'c>(scheduler: &'a Scheduler<'c>, index: u16, max_fade: u64) -> Light<'a, 'c> {
        let config = LightConfig::white(LightRef::new(0, index), ms(max_fade)).unwrap();
        LightState::new(scheduler, &config).unwrap()
    }

    fn entry(index: u16, brightness: u8, fade: u64) -> BatchEntry {
        BatchEntry {
            light: LightRef::new(0, index),
            brightness,
            fade: ms(fade),
        }
    }

    #[test]
    fn test_sequential_lights_share_a_batch() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [
            white_light(&scheduler, 0, 1000),
            white_light(&scheduler, 1, 1000),
            white_light(&scheduler, 2, 1000),
            white_light(&scheduler, 3, 1000),
        ];

        for light in &lights[..3] {
            light.color(WHITE, None, 0, None).unwrap();
        }
        lights[3].color(WHITE, Some(ms(500)), 0, None).unwrap();

        let mut hardware = RecordingHardware::default();
        let report = scheduler.flush(&lights, &mut hardware).unwrap();

        assert_eq!(
            report,
            FlushReport {
                batches: 2,
                lights: 4,
                rescheduled: 0,
            }
        );
        assert_eq!(
            hardware.batches,
            vec![
                vec![entry(0, 255, 0), entry(1, 255, 0), entry(2, 255, 0)],
                vec![entry(3, 255, 500)],
            ]
        );
        assert_eq!(scheduler.dirty_len(), 0);
    }

    #[test]
    fn test_fades_within_tolerance_share_a_batch() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000), white_light(&scheduler, 1, 1000)];

        lights[0].color(WHITE, None, 0, None).unwrap();
        lights[1].color(WHITE, Some(ms(10)), 0, None).unwrap();

        let mut hardware = RecordingHardware::default();
        scheduler.flush(&lights, &mut hardware).unwrap();

        // 10 ms is below the 20 ms tolerance at 50 Hz
        assert_eq!(
            hardware.batches,
            vec![vec![entry(0, 255, 0), entry(1, 255, 0)]]
        );
    }

    #[test]
    fn test_first_fade_bounds_the_batch() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000), white_light(&scheduler, 1, 1000)];

        lights[0].color(WHITE, Some(ms(100)), 0, None).unwrap();
        lights[1].color(WHITE, Some(ms(2000)), 0, None).unwrap();

        let mut hardware = RecordingHardware::default();
        let report = scheduler.flush(&lights, &mut hardware).unwrap();

        // the second output only looks 100 ms ahead and comes back after that
        assert_eq!(report.batches, 1);
        assert_eq!(report.rescheduled, 1);
        assert_eq!(
            hardware.batches,
            vec![vec![entry(0, 255, 100), entry(1, 12, 100)]]
        );
        assert_eq!(scheduler.scheduled_at(LightRef::new(0, 0)), None);
        assert_eq!(scheduler.scheduled_at(LightRef::new(0, 1)), Some(at(100)));
    }

    #[test]
    fn test_shorter_fade_starts_bounded_batch() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [
            white_light(&scheduler, 0, 1000),
            white_light(&scheduler, 1, 1000),
            white_light(&scheduler, 2, 1000),
        ];

        lights[0].color(WHITE, Some(ms(600)), 0, None).unwrap();
        lights[1].color(WHITE, Some(ms(100)), 0, None).unwrap();
        lights[2].color(WHITE, Some(ms(2000)), 0, None).unwrap();

        let mut hardware = RecordingHardware::default();
        scheduler.flush(&lights, &mut hardware).unwrap();

        assert_eq!(
            hardware.batches,
            vec![
                vec![entry(0, 255, 600)],
                vec![entry(1, 255, 100), entry(2, 12, 100)],
            ]
        );
        assert_eq!(scheduler.scheduled_at(LightRef::new(0, 2)), Some(at(100)));
    }

    #[test]
    fn test_gap_in_hardware_order_splits_batch() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000), white_light(&scheduler, 5, 1000)];

        for light in &lights {
            light.color(WHITE, None, 0, None).unwrap();
        }

        let mut hardware = RecordingHardware::default();
        let report = scheduler.flush(&lights, &mut hardware).unwrap();

        assert_eq!(report.batches, 2);
        assert_eq!(
            hardware.batches,
            vec![vec![entry(0, 255, 0)], vec![entry(5, 255, 0)]]
        );
    }

    #[test]
    fn test_max_batch_size() {
        let clock = ManualClock::default();
        let config = BatchSchedulerConfig {
            max_batch_size: 2,
            ..BatchSchedulerConfig::DEFAULT
        };
        let scheduler: Scheduler<'_> = BatchScheduler::new(&clock, config).unwrap();
        let lights = [
            white_light(&scheduler, 0, 1000),
            white_light(&scheduler, 1, 1000),
            white_light(&scheduler, 2, 1000),
        ];

        for light in &lights {
            light.color(WHITE, None, 0, None).unwrap();
        }

        let mut hardware = RecordingHardware::default();
        scheduler.flush(&lights, &mut hardware).unwrap();

        assert_eq!(
            hardware.batches,
            vec![vec![entry(0, 255, 0), entry(1, 255, 0)], vec![entry(2, 255, 0)]]
        );
    }

    #[test]
    fn test_long_fade_is_rescheduled() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 500)];
        let output = LightRef::new(0, 0);

        lights[0].color(WHITE, Some(ms(2000)), 0, None).unwrap();

        let mut hardware = RecordingHardware::default();
        let report = scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(report.rescheduled, 1);
        assert_eq!(hardware.batches, vec![vec![entry(0, 63, 500)]]);
        assert_eq!(scheduler.scheduled_at(output), Some(at(500)));
        assert_eq!(scheduler.next_wake(), Some(at(500)));
        assert!(!scheduler.is_dirty(output));

        clock.advance(ms(200));
        let report = scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(report.batches, 0);

        clock.advance(ms(300));
        scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(hardware.batches.last(), Some(&vec![entry(0, 127, 500)]));
        assert_eq!(scheduler.scheduled_at(output), Some(at(1000)));

        clock.set(at(2000));
        let report = scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(report.rescheduled, 0);
        assert_eq!(hardware.batches.last(), Some(&vec![entry(0, 255, 0)]));
        assert_eq!(scheduler.scheduled_at(output), None);
    }

    #[test]
    fn test_unfadeable_hardware_steps_every_flush() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 0)];
        let output = LightRef::new(0, 0);

        lights[0].color(WHITE, Some(ms(100)), 0, None).unwrap();

        let mut hardware = RecordingHardware::default();
        scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(hardware.batches, vec![vec![entry(0, 0, 0)]]);
        assert_eq!(scheduler.scheduled_at(output), Some(at(0)));

        clock.advance(ms(50));
        scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(hardware.batches.last(), Some(&vec![entry(0, 127, 0)]));
    }

    #[test]
    fn test_dirty_supersedes_schedule() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let output = LightRef::new(0, 0);

        scheduler.schedule(output, at(500)).unwrap();
        assert_eq!(scheduler.scheduled_at(output), Some(at(500)));

        scheduler.mark_dirty(output).unwrap();
        assert!(scheduler.is_dirty(output));
        assert_eq!(scheduler.scheduled_at(output), None);

        // scheduling a dirty output is a no-op
        scheduler.schedule(output, at(800)).unwrap();
        assert_eq!(scheduler.scheduled_at(output), None);
        assert_eq!(scheduler.dirty_len(), 1);
    }

    #[test]
    fn test_rescheduling_replaces_wake_time() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let first = LightRef::new(0, 0);
        let second = LightRef::new(0, 1);

        scheduler.schedule(first, at(500)).unwrap();
        scheduler.schedule(second, at(300)).unwrap();
        assert_eq!(scheduler.next_wake(), Some(at(300)));

        scheduler.schedule(second, at(900)).unwrap();
        assert_eq!(scheduler.scheduled_at(second), Some(at(900)));
        assert_eq!(scheduler.next_wake(), Some(at(500)));
    }

    #[test]
    fn test_hidden_changes_do_not_mark_dirty() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000)];
        let output = LightRef::new(0, 0);
        let mut hardware = RecordingHardware::default();

        lights[0].color(RED, None, 10, Some("top")).unwrap();
        scheduler.flush(&lights, &mut hardware).unwrap();

        lights[0].color(BLUE, None, 0, Some("below")).unwrap();
        assert!(!scheduler.is_dirty(output));

        lights[0].remove_from_stack_by_key("below", None).unwrap();
        assert!(!scheduler.is_dirty(output));

        lights[0].remove_from_stack_by_key("top", None).unwrap();
        assert!(scheduler.is_dirty(output));
    }

    #[test]
    fn test_unknown_output_is_skipped() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000)];

        scheduler.mark_dirty(LightRef::new(9, 9)).unwrap();

        let mut hardware = RecordingHardware::default();
        let report = scheduler.flush(&lights, &mut hardware).unwrap();
        assert_eq!(report, FlushReport::default());
        assert_eq!(scheduler.dirty_len(), 0);
    }

    #[test]
    fn test_hardware_failure() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000)];

        lights[0].color(WHITE, None, 0, None).unwrap();

        assert_eq!(
            scheduler.flush(&lights, &mut FailingHardware),
            Err(FlushError::Hardware("link lost"))
        );
    }

    #[test]
    fn test_dirty_set_full() {
        let clock = ManualClock::default();
        let scheduler: BatchScheduler<&ManualClock, 2> =
            BatchScheduler::new(&clock, BatchSchedulerConfig::DEFAULT).unwrap();
        let config = LightConfig::rgb(LightRef::new(0, 0), ms(1000)).unwrap();
        let light = LightState::new(&scheduler, &config).unwrap();

        assert_eq!(light.color(RED, None, 0, None), Err(Error::DirtySetFull));
    }

    #[test]
    fn test_invalid_config() {
        let clock = ManualClock::default();
        let config = BatchSchedulerConfig {
            update_hz: 0,
            ..BatchSchedulerConfig::DEFAULT
        };
        assert!(matches!(
            BatchScheduler::<_, 8>::new(&clock, config),
            Err(Error::InvalidConfig(_))
        ));

        let config = BatchSchedulerConfig {
            max_batch_size: 0,
            ..BatchSchedulerConfig::DEFAULT
        };
        assert!(matches!(
            BatchScheduler::<_, 8>::new(&clock, config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fade_tolerance() {
        assert_eq!(BatchSchedulerConfig::DEFAULT.fade_tolerance(), ms(20));

        let fast = BatchSchedulerConfig {
            update_hz: 2000,
            ..BatchSchedulerConfig::DEFAULT
        };
        assert_eq!(fast.fade_tolerance(), ms(1));
    }

    #[test]
    fn test_run_returns_after_stop() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000)];
        let mut hardware = RecordingHardware::default();

        lights[0].color(WHITE, None, 0, None).unwrap();
        scheduler.stop();

        assert_eq!(block_on(scheduler.run(&lights, &mut hardware)), Ok(()));
        assert!(hardware.batches.is_empty());
    }

    #[test]
    fn test_run_stops_on_hardware_failure() {
        let clock = ManualClock::default();
        let scheduler = scheduler(&clock);
        let lights = [white_light(&scheduler, 0, 1000)];

        lights[0].color(WHITE, None, 0, None).unwrap();

        assert_eq!(
            block_on(scheduler.run(&lights, &mut FailingHardware)),
            Err(FlushError::Hardware("link lost"))
        );
    }
}
