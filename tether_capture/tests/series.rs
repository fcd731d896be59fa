mod common;

use common::{shot, Bench};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tether_capture::config::{DualSeriesSettings, ProfileSettings, SeriesSettings, SingleSettings};
use tether_capture::timelapse::SeriesReport;
use tether_capture::CaptureError;

fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

fn series(interval: u64, duration: u64) -> SeriesSettings {
    SeriesSettings {
        subject: "S".to_string(),
        lights: false,
        shot: shot("1", "2.8", "400"),
        interval: secs(interval),
        duration: secs(duration),
    }
}

fn dual_series(interval: u64, duration: u64) -> ProfileSettings {
    ProfileSettings::DualSeries(DualSeriesSettings {
        subject: "S".to_string(),
        dark: shot("30", "2.8", "400"),
        light: shot("0.5", "7.1", "100"),
        interval: secs(interval),
        duration: secs(duration),
    })
}

#[test]
fn uniform_series_sleeps_what_is_left_of_the_interval() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().capture_time = secs(5);
    let mut rig = bench.rig(dir.path());

    let report = rig.uniform_series(&series(60, 180)).unwrap();

    assert_eq!(bench.clock.sleeps(), vec![secs(55), secs(55), secs(55)]);
    assert_eq!(report.captured, 3);
    assert_eq!(report.cycles_completed, 3);
}

#[test]
fn uniform_series_overrun_clamps_sleep_to_zero() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().capture_time = secs(65);
    let mut rig = bench.rig(dir.path());

    let report = rig.uniform_series(&series(60, 120)).unwrap();

    assert_eq!(bench.clock.sleeps(), vec![Duration::ZERO, Duration::ZERO]);
    // the overrun never changes the number of cycles
    assert_eq!(report.cycles_planned, 2);
    assert_eq!(report.cycles_completed, 2);
}

#[test]
fn uniform_series_keeps_going_after_a_failed_capture() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().fail_when.push("12:01:00".to_string());
    let mut rig = bench.rig(dir.path());

    let report = rig.uniform_series(&series(60, 180)).unwrap();

    assert_eq!(
        report,
        SeriesReport {
            cycles_planned: 3,
            cycles_completed: 3,
            captured: 2,
            failed: 1,
            aborted: false,
        }
    );
}

#[test]
fn dark_light_cycle_times_the_light_shot_to_the_end_of_the_interval() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    let mut rig = bench.rig(dir.path());

    let report = rig.run(&dual_series(60, 120), dir.path()).unwrap();

    // settle, then per cycle: interval - 5s dark capture - 2s buffer, guard
    assert_eq!(
        bench.clock.sleeps(),
        vec![secs(2), secs(53), secs(2), secs(53), secs(2)]
    );
    assert_eq!(report.captured, 4);
    assert!(!report.aborted);
    // off, on per cycle, then closeout
    assert_eq!(bench.relay.history(), vec![false, true, false, true, false]);
    assert_eq!(bench.relay.is_high(), Some(false));
}

#[test]
fn dark_and_light_shots_share_the_cycle_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    let mut rig = bench.rig(dir.path());

    rig.run(&dual_series(60, 60), dir.path()).unwrap();

    let names: Vec<String> = bench
        .camera
        .captures()
        .iter()
        .map(|c| c.filename.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "S_2024-01-01_12:00:02_dark_exp30s__f2.8_iso400.jpg",
            "S_2024-01-01_12:00:02_light_exp0.5s__f7.1_iso100.jpg",
        ]
    );
}

#[test]
fn failed_light_shot_aborts_the_series_and_leaves_the_light_off() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().fail_when.push("_light_".to_string());
    let mut rig = bench.rig(dir.path());

    let report = rig.run(&dual_series(60, 300), dir.path()).unwrap();

    assert_eq!(
        report,
        SeriesReport {
            cycles_planned: 5,
            cycles_completed: 0,
            captured: 1,
            failed: 1,
            aborted: true,
        }
    );
    assert_eq!(bench.camera.captures().len(), 2);
    assert_eq!(bench.relay.is_high(), Some(false));
    assert!(!rig.light_is_on());
}

#[test]
fn failed_dark_shot_does_not_abort() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().fail_when.push("_dark_".to_string());
    let mut rig = bench.rig(dir.path());

    let report = rig.run(&dual_series(60, 120), dir.path()).unwrap();

    assert_eq!(report.cycles_completed, 2);
    assert_eq!(report.captured, 2);
    assert_eq!(report.failed, 2);
    assert!(!report.aborted);
}

#[test]
fn light_is_forced_off_when_a_run_panics() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().panic_when = Some("_light_".to_string());

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut rig = bench.rig(dir.path());
        rig.run(&dual_series(60, 120), dir.path())
    }));

    assert!(result.is_err());
    assert_eq!(bench.relay.history().last(), Some(&false));
    assert_eq!(bench.relay.is_high(), Some(false));
}

#[test]
fn stop_during_the_light_wait_ends_the_run_with_the_light_off() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    let mut rig = bench.rig(dir.path());
    // second cycle's dark shot, 2 s settle + 60 s cycle + 5 s guard in
    bench.camera.state.borrow_mut().stop_when =
        Some(("12:01:07_dark".to_string(), rig.stop_flag()));

    let report = rig.run(&dual_series(60, 300), dir.path()).unwrap();

    assert_eq!(
        report,
        SeriesReport {
            cycles_planned: 5,
            cycles_completed: 1,
            captured: 3,
            failed: 0,
            aborted: true,
        }
    );
    assert_eq!(bench.camera.captures().len(), 3);
    assert_eq!(bench.relay.history(), vec![false, true, false, true, false]);
    assert_eq!(bench.relay.is_high(), Some(false));
    assert!(!rig.light_is_on());
}

#[test]
fn stop_ends_a_uniform_series_after_the_current_shot() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    let mut rig = bench.rig(dir.path());
    bench.camera.state.borrow_mut().stop_when = Some(("12:00:02".to_string(), rig.stop_flag()));

    let report = rig.run(&ProfileSettings::Series(series(60, 600)), dir.path()).unwrap();

    assert_eq!(report.cycles_completed, 1);
    assert_eq!(report.captured, 1);
    assert!(report.aborted);
    assert_eq!(bench.camera.captures().len(), 1);
    assert_eq!(bench.relay.is_high(), Some(false));
}

#[test]
fn failed_single_shot_completes_no_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().fail_when.push("_light_".to_string());
    let mut rig = bench.rig(dir.path());
    let single = ProfileSettings::Single(SingleSettings {
        subject: "S".to_string(),
        lights: true,
        shot: shot("0.5", "2.8", "400"),
    });

    let report = rig.run(&single, dir.path()).unwrap();

    assert_eq!(report.cycles_completed, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(bench.relay.is_high(), Some(false));
}

#[test]
fn series_images_land_in_a_batch_directory() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    let mut rig = bench.rig(dir.path());

    rig.run(&ProfileSettings::Series(series(60, 60)), dir.path())
        .unwrap();

    let batch = dir.path().join("S_2024-01-01_12:00:02");
    assert_eq!(rig.output_dir(), batch.as_path());
    assert!(batch
        .join("S_2024-01-01_12:00:02_light_exp1s__f2.8_iso400.jpg")
        .exists());
}

#[test]
fn single_profile_takes_one_lit_shot_and_closes_out() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    let mut rig = bench.rig(dir.path());
    let single = ProfileSettings::Single(SingleSettings {
        subject: "S".to_string(),
        lights: true,
        shot: shot("0.5", "2.8", "400"),
    });

    let report = rig.run(&single, dir.path()).unwrap();

    assert_eq!(report.captured, 1);
    assert_eq!(bench.relay.history(), vec![true, false]);
    assert_eq!(bench.clock.sleeps(), vec![secs(2), secs(3)]);
}

#[test]
fn missing_camera_stops_the_run_before_any_hardware_action() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.state.borrow_mut().devices.clear();
    let mut rig = bench.rig(dir.path());

    match rig.run(&dual_series(60, 120), dir.path()) {
        Err(CaptureError::CameraNotFound(model)) => assert_eq!(model, "Canon EOS 80D"),
        other => panic!("expected a missing camera, got {:?}", other),
    }
    assert!(!bench.relay.0.borrow().configured);
    assert!(bench.relay.history().is_empty());
    assert!(bench.camera.captures().is_empty());
    assert!(bench.camera.writes().is_empty());
}

#[test]
fn camera_outside_bulb_mode_is_a_precondition_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new();
    bench.camera.set_config("shutterspeed", "1/125");
    let mut rig = bench.rig(dir.path());

    match rig.run(&dual_series(60, 120), dir.path()) {
        Err(CaptureError::NotInBulbMode(current)) => assert_eq!(current, "1/125"),
        other => panic!("expected bulb mode failure, got {:?}", other),
    }
    assert!(bench.camera.captures().is_empty());
}
