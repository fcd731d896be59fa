use crate::camera_api::CameraDriver;
use crate::clock::{remaining, Clock};
use crate::config::{DualSeriesSettings, SeriesSettings, ShotSettings};
use crate::error::Result;
use crate::exposure::{Exposure, ExposureOutcome};
use crate::relay::RelayLine;
use crate::rig::Rig;
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use std::convert::TryFrom;
use std::time::Duration;

pub mod encoder;

/// Fixed number of cycles for a series, worked out once before the first
/// cycle. Cycles that overrun never change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CyclePlan {
    pub interval: Duration,
    pub duration: Duration,
    pub cycles: u64,
}

impl CyclePlan {
    pub fn new(interval: Duration, duration: Duration) -> Self {
        let cycles = if interval.as_nanos() == 0 {
            0
        } else {
            u64::try_from(duration.as_nanos() / interval.as_nanos()).unwrap_or(u64::MAX)
        };
        Self {
            interval,
            duration,
            cycles,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeriesReport {
    pub cycles_planned: u64,
    pub cycles_completed: u64,
    pub captured: u64,
    pub failed: u64,
    /// The loop stopped before running every planned cycle.
    pub aborted: bool,
}

impl SeriesReport {
    pub fn new(cycles_planned: u64) -> Self {
        Self {
            cycles_planned,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &ExposureOutcome) {
        if outcome.is_captured() {
            self.captured += 1;
        } else {
            self.failed += 1;
        }
    }
}

fn clock_reading(time: NaiveDateTime) -> String {
    time.format("%H:%M:%S%.3f").to_string()
}

impl<D: CameraDriver, R: RelayLine, K: Clock> Rig<D, R, K> {
    fn series_exposure(
        &self,
        subject: &str,
        timestamp: NaiveDateTime,
        shot: &ShotSettings,
        lights: bool,
    ) -> Exposure {
        Exposure {
            subject: subject.to_string(),
            timestamp,
            shot: shot.clone(),
            wait: self.settings.download_wait,
            lights,
        }
    }

    /// Runs an exposure and returns how long the call took, logging call and
    /// return times so drift can be traced afterwards.
    fn timed_expose(&mut self, label: &str, exposure: &Exposure) -> Result<(ExposureOutcome, Duration)> {
        let call = self.clock.now();
        debug!("{} capture function call: {}", label, clock_reading(self.clock.wall_time()));
        let outcome = self.expose(exposure)?;
        let returned = self.clock.now();
        debug!("{} capture function return: {}", label, clock_reading(self.clock.wall_time()));
        Ok((outcome, returned.saturating_duration_since(call)))
    }

    /// Marks the report aborted when the stop flag is up.
    fn stop_requested(&self, report: &mut SeriesReport, cycle: u64) -> bool {
        if !self.stop.is_raised() {
            return false;
        }
        warn!(
            "Stop requested, skipping the remaining {} of {} cycles",
            report.cycles_planned - cycle,
            report.cycles_planned
        );
        report.aborted = true;
        true
    }

    /// Same shot every interval. A failed shot is logged and the series goes
    /// on. Each cycle sleeps whatever is left of its interval; overrun is not
    /// carried over to later cycles.
    pub fn uniform_series(&mut self, settings: &SeriesSettings) -> Result<SeriesReport> {
        let plan = CyclePlan::new(settings.interval, settings.duration);
        info!(
            "Initiating timelapse loop: {} cycles with {:?} intervals",
            plan.cycles, plan.interval
        );
        let mut report = SeriesReport::new(plan.cycles);

        for cycle in 0..plan.cycles {
            if self.stop_requested(&mut report, cycle) {
                break;
            }
            info!("Cycle {} of {}", cycle + 1, plan.cycles);
            let exposure = self.series_exposure(
                &settings.subject,
                self.clock.wall_time(),
                &settings.shot,
                settings.lights,
            );
            let (outcome, elapsed) = self.timed_expose("Series", &exposure)?;
            report.record(&outcome);
            if !outcome.is_captured() {
                warn!("Cycle {} produced no image: {:?}", cycle + 1, outcome);
            }
            report.cycles_completed += 1;

            let pause = remaining(plan.interval, elapsed);
            debug!("Sleeping for {:?}", pause);
            self.clock.sleep_unless_stopped(pause, &self.stop);
        }
        Ok(report)
    }

    /// Dark shot at the start of every interval with the light off, light
    /// shot at its very end so the bulb has had the longest possible time to
    /// settle its color temperature. A failed light shot ends the series,
    /// since a cycle with only its dark image is of no use.
    pub fn dark_light_series(&mut self, settings: &DualSeriesSettings) -> Result<SeriesReport> {
        let plan = CyclePlan::new(settings.interval, settings.duration);
        info!(
            "Initiating dark/light timelapse loop: {} cycles with {:?} intervals",
            plan.cycles, plan.interval
        );
        let mut report = SeriesReport::new(plan.cycles);

        for cycle in 0..plan.cycles {
            if self.stop_requested(&mut report, cycle) {
                break;
            }
            info!("Cycle {} of {}", cycle + 1, plan.cycles);
            self.light.set_light(false)?;

            let timestamp = self.clock.wall_time();
            let dark = self.series_exposure(&settings.subject, timestamp, &settings.dark, false);
            let (outcome, dark_elapsed) = self.timed_expose("Dark", &dark)?;
            report.record(&outcome);
            if !outcome.is_captured() {
                warn!("Dark capture of cycle {} failed: {:?}", cycle + 1, outcome);
            }

            self.light.set_light(true)?;
            let pause = remaining(
                remaining(plan.interval, dark_elapsed),
                self.settings.pre_light_buffer,
            );
            debug!("Sleeping for {:?}", pause);
            if !self.clock.sleep_unless_stopped(pause, &self.stop) {
                self.stop_requested(&mut report, cycle);
                break;
            }

            let light = self.series_exposure(&settings.subject, timestamp, &settings.light, false);
            let (outcome, _) = self.timed_expose("Light", &light)?;
            report.record(&outcome);
            if !outcome.is_captured() {
                error!(
                    "Light capture of cycle {} failed, aborting the remaining {} cycles",
                    cycle + 1,
                    plan.cycles - cycle - 1
                );
                report.aborted = true;
                break;
            }
            report.cycles_completed += 1;

            self.clock
                .sleep_unless_stopped(self.settings.cycle_guard, &self.stop);
        }
        Ok(report)
    }
}
