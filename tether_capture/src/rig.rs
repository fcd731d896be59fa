use crate::camera_api::CameraDriver;
use crate::clock::{format_timestamp, Clock, StopFlag};
use crate::config::ProfileSettings;
use crate::error::Result;
use crate::exposure::Exposure;
use crate::parameters::ParameterTables;
use crate::relay::{Light, RelayLine};
use crate::supervisor;
use crate::timelapse::SeriesReport;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RELAY_PIN: u8 = 2;
pub const DEFAULT_CAMERA_MODEL: &str = "Canon EOS 80D";
/// gvfs spawns short-lived children too, so everything gvfs goes.
pub const DEFAULT_LOCK_PATTERN: &str = "gvfs";
pub const DEFAULT_SETTLE_SECS: f64 = 2.0;
pub const DEFAULT_WARM_UP_SECS: f64 = 3.0;
/// Long exposures (>10 min) silently lost their image with a 2 s wait.
pub const DEFAULT_DOWNLOAD_WAIT_SECS: f64 = 10.0;
pub const DEFAULT_PRE_LIGHT_BUFFER_SECS: f64 = 2.0;
pub const DEFAULT_CYCLE_GUARD_SECS: f64 = 2.0;

/// Hardware constants of one camera, relay and light setup.
#[derive(Clone, Debug, PartialEq)]
pub struct RigSettings {
    /// BCM number of the relay's GPIO line.
    pub relay_pin: u8,
    pub camera_model: String,
    pub lock_pattern: String,
    /// Wait after reconfiguring the relay for the switch to actuate.
    pub settle: Duration,
    /// Wait after switching the light on before an exposure that uses it.
    pub warm_up: Duration,
    pub download_wait: Duration,
    /// Dark/light series: time between the end of the interval's sleep and
    /// the light exposure, taken off the sleep.
    pub pre_light_buffer: Duration,
    /// Dark/light series: pause after the light exposure before the next
    /// cycle switches the light off.
    pub cycle_guard: Duration,
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            relay_pin: DEFAULT_RELAY_PIN,
            camera_model: DEFAULT_CAMERA_MODEL.to_string(),
            lock_pattern: DEFAULT_LOCK_PATTERN.to_string(),
            settle: Duration::from_secs_f64(DEFAULT_SETTLE_SECS),
            warm_up: Duration::from_secs_f64(DEFAULT_WARM_UP_SECS),
            download_wait: Duration::from_secs_f64(DEFAULT_DOWNLOAD_WAIT_SECS),
            pre_light_buffer: Duration::from_secs_f64(DEFAULT_PRE_LIGHT_BUFFER_SECS),
            cycle_guard: Duration::from_secs_f64(DEFAULT_CYCLE_GUARD_SECS),
        }
    }
}

/// The camera, the light and the clock of one capture run, owned exclusively.
pub struct Rig<D: CameraDriver, R: RelayLine, K: Clock> {
    pub(crate) camera: D,
    pub(crate) light: Light<R>,
    pub(crate) clock: K,
    pub(crate) tables: ParameterTables,
    pub(crate) settings: RigSettings,
    pub(crate) output_dir: PathBuf,
    pub(crate) stop: StopFlag,
}

impl<D: CameraDriver, R: RelayLine, K: Clock> Rig<D, R, K> {
    pub fn new(camera: D, relay: R, clock: K, tables: ParameterTables, settings: RigSettings) -> Self {
        Self {
            camera,
            light: Light::new(relay),
            clock,
            tables,
            settings,
            output_dir: PathBuf::from("."),
            stop: StopFlag::new(),
        }
    }

    /// Raising the returned flag ends the run after the current shot, still
    /// going through closeout.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Directory new images are downloaded into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn set_output_dir<P: Into<PathBuf>>(&mut self, dir: P) {
        self.output_dir = dir.into();
    }

    pub fn light_is_on(&self) -> bool {
        self.light.is_lit()
    }

    /// Checks the camera link, then brings the relay up with the light off.
    pub fn start(&mut self) -> Result<()> {
        supervisor::preflight(
            &mut self.camera,
            &self.settings.camera_model,
            &self.settings.lock_pattern,
        )?;
        self.light.initialize(&self.clock, self.settings.settle)
    }

    /// Leaves the light off. Dropping the rig does the same, which covers
    /// early returns and panics.
    pub fn closeout(&mut self) -> Result<()> {
        debug!("Closeout: switching the light off...");
        self.light.force_off()?;
        debug!("...done");
        Ok(())
    }

    /// Full run of one profile: link checks, relay setup, the captures, and
    /// closeout on every path.
    pub fn run(&mut self, profile: &ProfileSettings, images_dir: &Path) -> Result<SeriesReport> {
        let outcome = self.start().and_then(|_| self.capture(profile, images_dir));
        let closed = if self.light.is_armed() {
            self.closeout()
        } else {
            Ok(())
        };
        let report = outcome?;
        closed?;
        Ok(report)
    }

    fn capture(&mut self, profile: &ProfileSettings, images_dir: &Path) -> Result<SeriesReport> {
        match profile {
            ProfileSettings::Single(settings) => {
                fs::create_dir_all(images_dir)?;
                self.set_output_dir(images_dir);
                let exposure = Exposure {
                    subject: settings.subject.clone(),
                    timestamp: self.clock.wall_time(),
                    shot: settings.shot.clone(),
                    wait: self.settings.download_wait,
                    lights: settings.lights,
                };
                let mut report = SeriesReport::new(1);
                if self.stop.is_raised() {
                    warn!("Stop requested before the exposure");
                    report.aborted = true;
                    return Ok(report);
                }
                let outcome = self.expose(&exposure)?;
                report.record(&outcome);
                if outcome.is_captured() {
                    report.cycles_completed = 1;
                }
                Ok(report)
            }
            ProfileSettings::Series(settings) => {
                self.enter_batch_dir(images_dir, &settings.subject)?;
                let report = self.uniform_series(settings)?;
                info!("Picture cycle ended");
                Ok(report)
            }
            ProfileSettings::DualSeries(settings) => {
                self.enter_batch_dir(images_dir, &settings.subject)?;
                let report = self.dark_light_series(settings)?;
                info!("Picture cycle ended");
                Ok(report)
            }
        }
    }

    /// Each series lands in its own `<subject>_<timestamp>` directory.
    fn enter_batch_dir(&mut self, images_dir: &Path, subject: &str) -> Result<()> {
        let batch = format!("{}_{}", subject, format_timestamp(&self.clock.wall_time()));
        let dir = images_dir.join(&batch);
        fs::create_dir_all(&dir)?;
        info!("Starting new batch picture cycle: {}", batch);
        self.set_output_dir(dir);
        Ok(())
    }
}
