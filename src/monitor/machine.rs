//! Transition logic turning emeter samples into brewing lifecycle events.
//!
//! Everything here is synchronous and side-effect free apart from mutating the
//! calibration and state it is handed; the monitor persists and emits.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::calibration::Calibration;
use super::state::MonitorState;
use crate::cloud::EmeterStatus;
use crate::models::{EventKind, Reading};

/// Progress below which "heating stopped" is treated as a blip, not a finished batch.
pub const MIN_FINISH_PROGRESS: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub kind: EventKind,
    pub reading: Reading,
}

/// A `finished` event to be emitted once the brewed coffee has had time to drip through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingFinish {
    pub delay: Duration,
    pub reading: Reading,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// In detection order: power events first, then brew events
    pub emissions: Vec<Emission>,
    pub finish: Option<PendingFinish>,
}

impl Transition {
    fn emit(&mut self, kind: EventKind, reading: Reading) {
        self.emissions.push(Emission { kind, reading });
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.emissions.iter().map(|e| e.kind).collect()
    }
}

/// Fold one successful sample into the state. `state.previous` is left untouched;
/// call [`MonitorState::roll`] after persisting.
pub fn apply_sample(
    calibration: &mut Calibration,
    state: &mut MonitorState,
    sample: EmeterStatus,
    now: DateTime<Utc>,
) -> Transition {
    let carried = state.previous.map(|p| p.progress).unwrap_or(0.0);
    let current = Reading::new(sample.power, sample.total, carried);
    state.current = Some(current);

    let mut transition = Transition::default();
    update_power_status(calibration, state, current, now, &mut transition);
    update_brew_status(calibration, state, current, now, &mut transition);
    transition
}

fn update_power_status(
    calibration: &Calibration,
    state: &mut MonitorState,
    current: Reading,
    now: DateTime<Utc>,
    transition: &mut Transition,
) {
    let Some(previous) = state.previous else {
        return;
    };

    let was_powered = calibration.is_powered(&previous);
    let is_powered = calibration.is_powered(&current);

    if was_powered && !is_powered {
        state.last_power_off = Some(now);
        transition.emit(EventKind::PowerOff, current);
    } else if !was_powered && is_powered {
        transition.emit(EventKind::PowerOn, current);
    }
}

fn update_brew_status(
    calibration: &mut Calibration,
    state: &mut MonitorState,
    mut current: Reading,
    now: DateTime<Utc>,
    transition: &mut Transition,
) {
    let Some(start) = state.start else {
        if calibration.is_heating(&current) {
            let mut baseline = state.previous.unwrap_or(current);
            baseline.progress = 0.0;
            if calibration.is_cold_start(state.last_power_off, now) {
                baseline.total += calibration.cold_start_compensation_kwh;
            }
            state.start = Some(baseline);
            transition.emit(EventKind::Starting, baseline);
        }
        return;
    };

    current.progress = calibration.record_batch_energy(&start, &current);
    state.current = Some(current);

    if current.progress >= MIN_FINISH_PROGRESS && !calibration.is_heating(&current) {
        state.start = None;
        transition.emit(EventKind::Finishing, current);
        transition.finish = Some(PendingFinish {
            delay: calibration.finishing_delay(current.progress),
            reading: current,
        });
    } else if state
        .previous
        .is_some_and(|previous| previous.progress != current.progress)
    {
        transition.emit(EventKind::Progress, current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;

    fn scenario_calibration() -> Calibration {
        Calibration {
            cold_start_compensation_kwh: 0.0,
            kwh_per_batch: 0.136,
            power_on_threshold_watts: 5.0,
            action_threshold_watts: 150.0,
            finishing_seconds: 30.0,
            finishing_seconds_per_batch: 90.0,
            ..Calibration::default()
        }
    }

    fn sample(power: f64, total: f64) -> EmeterStatus {
        EmeterStatus { power, total }
    }

    /// Runs samples one tick apart and returns each tick's transition.
    fn run(
        calibration: &mut Calibration,
        state: &mut MonitorState,
        samples: &[(f64, f64)],
    ) -> Vec<Transition> {
        let base = Utc::now();
        samples
            .iter()
            .enumerate()
            .map(|(i, &(power, total))| {
                let now = base + ChronoDuration::seconds(5 * i as i64);
                let transition = apply_sample(calibration, state, sample(power, total), now);
                state.roll();
                transition
            })
            .collect()
    }

    #[test]
    fn test_full_brew_cycle() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let ticks = run(
            &mut cal,
            &mut state,
            &[(2.0, 0.0), (160.0, 0.0), (160.0, 0.068), (160.0, 0.136), (2.0, 0.136)],
        );

        assert!(ticks[0].emissions.is_empty());
        assert_eq!(ticks[1].kinds(), vec![EventKind::PowerOn, EventKind::Starting]);
        assert_eq!(ticks[1].emissions[1].reading.progress, 0.0);
        assert_eq!(ticks[1].emissions[1].reading.total, 0.0);

        assert_eq!(ticks[2].kinds(), vec![EventKind::Progress]);
        assert!((ticks[2].emissions[0].reading.progress - 0.5).abs() < 1e-9);

        assert_eq!(ticks[3].kinds(), vec![EventKind::Progress]);

        assert_eq!(ticks[4].kinds(), vec![EventKind::PowerOff, EventKind::Finishing]);
        let finishing = ticks[4].emissions[1].reading;
        assert!((finishing.progress - 1.0).abs() < 1e-9);

        let finish = ticks[4].finish.expect("finished should be scheduled");
        assert_eq!(finish.reading, finishing);
        assert_eq!(finish.delay.as_secs(), 120);

        assert!(state.start.is_none());
        assert!(state.last_power_off.is_some());
    }

    #[test]
    fn test_power_crossings_fire_once_each() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let samples = [
            (0.0, 0.0),
            (2.0, 0.0),
            (6.0, 0.0),
            (10.0, 0.0),
            (5.0, 0.0),
            (4.9, 0.0),
            (3.0, 0.0),
            (50.0, 0.0),
            (1.0, 0.0),
        ];
        let ticks = run(&mut cal, &mut state, &samples);

        let kinds: Vec<Vec<EventKind>> = ticks.iter().map(Transition::kinds).collect();
        assert_eq!(
            kinds,
            vec![
                vec![],
                vec![],
                vec![EventKind::PowerOn],
                vec![],
                vec![],
                vec![EventKind::PowerOff],
                vec![],
                vec![EventKind::PowerOn],
                vec![EventKind::PowerOff],
            ]
        );
    }

    #[test]
    fn test_first_tick_has_no_power_transition() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let transition = apply_sample(&mut cal, &mut state, sample(100.0, 0.0), Utc::now());
        assert!(transition.emissions.is_empty());
    }

    #[test]
    fn test_no_heating_means_no_brew_events() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let ticks = run(
            &mut cal,
            &mut state,
            &[(2.0, 0.0), (100.0, 0.01), (149.0, 0.05), (2.0, 0.06), (120.0, 0.09)],
        );

        for transition in &ticks {
            for emission in &transition.emissions {
                assert!(
                    matches!(emission.kind, EventKind::PowerOn | EventKind::PowerOff),
                    "unexpected {}",
                    emission.kind
                );
            }
            assert!(transition.finish.is_none());
        }
    }

    #[test]
    fn test_short_blip_is_not_a_finished_batch() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let ticks = run(
            &mut cal,
            &mut state,
            &[(2.0, 0.0), (160.0, 0.0), (160.0, 0.005), (2.0, 0.005)],
        );

        assert!(ticks.iter().all(|t| t.finish.is_none()));
        assert!(ticks
            .iter()
            .flat_map(|t| t.kinds())
            .all(|k| k != EventKind::Finishing));
        // still tracking; a later resumption continues the same cycle
        assert!(state.is_brewing());
    }

    #[test]
    fn test_cold_start_compensation_applied_without_power_off() {
        let mut cal = Calibration {
            cold_start_compensation_kwh: 0.004,
            ..scenario_calibration()
        };
        let mut state = MonitorState::default();
        let ticks = run(&mut cal, &mut state, &[(2.0, 1.0), (160.0, 1.0)]);

        let starting = ticks[1].emissions[1];
        assert_eq!(starting.kind, EventKind::Starting);
        assert!((starting.reading.total - 1.004).abs() < 1e-9);
    }

    #[test]
    fn test_warm_start_has_no_compensation() {
        let mut cal = Calibration {
            cold_start_compensation_kwh: 0.004,
            ..scenario_calibration()
        };
        let now = Utc::now();
        let mut state = MonitorState {
            previous: Some(Reading::new(2.0, 1.0, 0.0)),
            last_power_off: Some(now - ChronoDuration::seconds(60)),
            ..MonitorState::default()
        };

        let transition = apply_sample(&mut cal, &mut state, sample(160.0, 1.0), now);
        let starting = transition.emissions[1];
        assert_eq!(starting.kind, EventKind::Starting);
        assert_eq!(starting.reading.total, 1.0);
    }

    #[test]
    fn test_stale_power_off_counts_as_cold() {
        let mut cal = Calibration {
            cold_start_compensation_kwh: 0.004,
            ..scenario_calibration()
        };
        let now = Utc::now();
        let mut state = MonitorState {
            previous: Some(Reading::new(2.0, 1.0, 0.0)),
            last_power_off: Some(now - ChronoDuration::seconds(1201)),
            ..MonitorState::default()
        };

        let transition = apply_sample(&mut cal, &mut state, sample(160.0, 1.0), now);
        assert!((transition.emissions[1].reading.total - 1.004).abs() < 1e-9);
    }

    #[test]
    fn test_starting_without_previous_uses_current_baseline() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let transition = apply_sample(&mut cal, &mut state, sample(160.0, 3.0), Utc::now());

        assert_eq!(transition.kinds(), vec![EventKind::Starting]);
        assert_eq!(state.start, Some(Reading::new(160.0, 3.0, 0.0)));
    }

    #[test]
    fn test_batch_estimate_never_decreases() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let samples = [
            (2.0, 0.0),
            (160.0, 0.0),
            (160.0, 0.1),
            (160.0, 0.2),
            (2.0, 0.2),
            (2.0, 0.2),
            (160.0, 0.2),
            (160.0, 0.25),
            (2.0, 0.25),
        ];

        let mut last = cal.kwh_per_batch;
        let base = Utc::now();
        for (i, &(power, total)) in samples.iter().enumerate() {
            let now = base + ChronoDuration::seconds(5 * i as i64);
            apply_sample(&mut cal, &mut state, sample(power, total), now);
            state.roll();
            assert!(cal.kwh_per_batch >= last);
            last = cal.kwh_per_batch;
        }
        assert!((cal.kwh_per_batch - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_progress_resets_when_next_brew_starts() {
        let mut cal = scenario_calibration();
        let mut state = MonitorState::default();
        let ticks = run(
            &mut cal,
            &mut state,
            &[
                (2.0, 0.0),
                (160.0, 0.0),
                (160.0, 0.136),
                (2.0, 0.136),
                (160.0, 0.136),
                (160.0, 0.204),
            ],
        );

        let starting = ticks[4]
            .emissions
            .iter()
            .find(|e| e.kind == EventKind::Starting)
            .expect("second brew should start");
        assert_eq!(starting.reading.progress, 0.0);

        assert_eq!(ticks[5].kinds(), vec![EventKind::Progress]);
        assert!((ticks[5].emissions[0].reading.progress - 0.5).abs() < 1e-9);
    }
}
