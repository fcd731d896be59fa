#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tether_capture::camera_api::{BulbRequest, CameraDriver, DriverReply};
use tether_capture::clock::{Clock, StopFlag};
use tether_capture::config::ShotSettings;
use tether_capture::exposure::ShutterSpeed;
use tether_capture::parameters::ParameterTables;
use tether_capture::relay::RelayLine;
use tether_capture::rig::{Rig, RigSettings, DEFAULT_CAMERA_MODEL};
use tether_capture::Result;

pub struct ClockState {
    base: Instant,
    start: NaiveDateTime,
    pub elapsed: Duration,
    pub sleeps: Vec<Duration>,
}

/// Clock that only moves when something sleeps or the fake camera works.
#[derive(Clone)]
pub struct FakeClock(pub Rc<RefCell<ClockState>>);

impl FakeClock {
    pub fn new() -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid start time");
        FakeClock(Rc::new(RefCell::new(ClockState {
            base: Instant::now(),
            start,
            elapsed: Duration::ZERO,
            sleeps: vec![],
        })))
    }

    pub fn advance(&self, duration: Duration) {
        self.0.borrow_mut().elapsed += duration;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.0.borrow().sleeps.clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let state = self.0.borrow();
        state.base + state.elapsed
    }

    fn wall_time(&self) -> NaiveDateTime {
        let state = self.0.borrow();
        state.start + chrono::Duration::milliseconds(state.elapsed.as_millis() as i64)
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.0.borrow_mut();
        state.sleeps.push(duration);
        state.elapsed += duration;
    }
}

pub struct CameraState {
    pub devices: Vec<String>,
    pub config: BTreeMap<String, String>,
    /// Parameters whose writes the camera silently ignores.
    pub ignored: BTreeSet<String>,
    /// Writes print an error instead of staying silent.
    pub noisy_writes: bool,
    pub writes: Vec<(String, String)>,
    pub reads: usize,
    pub captures: Vec<BulbRequest>,
    /// How long each capture call takes on the fake clock.
    pub capture_time: Duration,
    /// Captures whose file name contains one of these produce no file.
    pub fail_when: Vec<String>,
    pub panic_when: Option<String>,
    /// Raises the flag once a capture whose file name contains the text has
    /// been taken, like an operator pressing Ctrl-C mid-run.
    pub stop_when: Option<(String, StopFlag)>,
    pub processes: Vec<u32>,
    pub terminated: Vec<u32>,
}

#[derive(Clone)]
pub struct FakeCamera {
    pub state: Rc<RefCell<CameraState>>,
    clock: FakeClock,
}

impl FakeCamera {
    /// Attached 80D in bulb mode, already at f/2.8 and ISO 400.
    pub fn new(clock: &FakeClock) -> Self {
        let mut config = BTreeMap::new();
        config.insert("shutterspeed".to_string(), "bulb".to_string());
        config.insert("aperture".to_string(), "2.8".to_string());
        config.insert("iso".to_string(), "400".to_string());
        FakeCamera {
            state: Rc::new(RefCell::new(CameraState {
                devices: vec![
                    "Model                          Port".to_string(),
                    "----------------------------------------------------------".to_string(),
                    format!("{}                  usb:001,004", DEFAULT_CAMERA_MODEL),
                ],
                config,
                ignored: BTreeSet::new(),
                noisy_writes: false,
                writes: vec![],
                reads: 0,
                captures: vec![],
                capture_time: Duration::from_secs(5),
                fail_when: vec![],
                panic_when: None,
                stop_when: None,
                processes: vec![],
                terminated: vec![],
            })),
            clock: clock.clone(),
        }
    }

    pub fn set_config(&self, name: &str, value: &str) {
        self.state
            .borrow_mut()
            .config
            .insert(name.to_string(), value.to_string());
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.state.borrow().writes.clone()
    }

    pub fn captures(&self) -> Vec<BulbRequest> {
        self.state.borrow().captures.clone()
    }
}

impl CameraDriver for FakeCamera {
    fn auto_detect(&mut self) -> Result<Vec<String>> {
        Ok(self.state.borrow().devices.clone())
    }

    fn get_config(&mut self, name: &str) -> Result<DriverReply> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        let current = state.config.get(name).cloned();
        Ok(DriverReply {
            raw_output: format!("Label: {}\nCurrent: {:?}\n", name, current),
            success: current.is_some(),
            current,
        })
    }

    fn set_config_value(&mut self, name: &str, value: &str) -> Result<DriverReply> {
        let mut state = self.state.borrow_mut();
        state.writes.push((name.to_string(), value.to_string()));
        if state.noisy_writes {
            return Ok(DriverReply {
                raw_output: format!("*** Error: failed to set {} ***\n", name),
                current: None,
                success: false,
            });
        }
        if !state.ignored.contains(name) {
            state.config.insert(name.to_string(), value.to_string());
        }
        Ok(DriverReply {
            raw_output: String::new(),
            current: None,
            success: true,
        })
    }

    fn bulb_capture(&mut self, request: &BulbRequest) -> Result<DriverReply> {
        let name = request.filename.to_string_lossy().to_string();
        let (capture_time, fails, panics, stop) = {
            let mut state = self.state.borrow_mut();
            state.captures.push(request.clone());
            let fails = state.fail_when.iter().any(|p| name.contains(p.as_str()));
            let panics = state
                .panic_when
                .as_ref()
                .map_or(false, |p| name.contains(p.as_str()));
            let stop = state
                .stop_when
                .as_ref()
                .filter(|(p, _)| name.contains(p.as_str()))
                .map(|(_, flag)| flag.clone());
            (state.capture_time, fails, panics, stop)
        };
        if panics {
            panic!("camera fell over during {}", name);
        }
        self.clock.advance(capture_time);
        if !fails {
            fs::write(&request.filename, b"jpeg")?;
        }
        if let Some(flag) = stop {
            flag.raise();
        }
        Ok(DriverReply {
            raw_output: "New file is in location /capt0000.jpg on the camera\n".to_string(),
            current: None,
            success: true,
        })
    }

    fn find_processes(&mut self, _pattern: &str) -> Result<Vec<u32>> {
        Ok(self.state.borrow().processes.clone())
    }

    fn terminate_process(&mut self, pid: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.processes.retain(|p| *p != pid);
        state.terminated.push(pid);
        Ok(())
    }
}

#[derive(Default)]
pub struct RelayState {
    pub configured: bool,
    pub high: Option<bool>,
    pub history: Vec<bool>,
}

#[derive(Clone, Default)]
pub struct FakeRelay(pub Rc<RefCell<RelayState>>);

impl FakeRelay {
    pub fn is_high(&self) -> Option<bool> {
        self.0.borrow().high
    }

    pub fn history(&self) -> Vec<bool> {
        self.0.borrow().history.clone()
    }
}

impl RelayLine for FakeRelay {
    fn configure_low(&mut self) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.configured = true;
        state.high = Some(false);
        Ok(())
    }

    fn drive(&mut self, high: bool) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.high = Some(high);
        state.history.push(high);
        Ok(())
    }
}

fn table(values: &[&str]) -> BTreeMap<String, String> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i.to_string(), v.to_string()))
        .collect()
}

pub fn tables() -> ParameterTables {
    ParameterTables::new(
        table(&["2.8", "3.2", "5.6", "7.1"]),
        table(&["Auto", "100", "200", "400"]),
    )
}

pub fn shot(shutter: &str, aperture: &str, iso: &str) -> ShotSettings {
    ShotSettings {
        shutter: ShutterSpeed::parse(shutter).expect("valid shutter speed"),
        aperture: aperture.to_string(),
        iso: iso.to_string(),
    }
}

pub struct Bench {
    pub clock: FakeClock,
    pub camera: FakeCamera,
    pub relay: FakeRelay,
}

impl Bench {
    pub fn new() -> Self {
        let clock = FakeClock::new();
        let camera = FakeCamera::new(&clock);
        Bench {
            clock,
            camera,
            relay: FakeRelay::default(),
        }
    }

    pub fn rig(&self, output_dir: &Path) -> Rig<FakeCamera, FakeRelay, FakeClock> {
        let mut rig = Rig::new(
            self.camera.clone(),
            self.relay.clone(),
            self.clock.clone(),
            tables(),
            RigSettings::default(),
        );
        rig.set_output_dir(output_dir);
        rig
    }
}
