use crate::camera_api::CameraDriver;
use crate::error::{CaptureError, Result};
use log::{debug, info, warn};

/// Looks for `model` among the auto-detected devices.
///
/// This is a weak liveness probe: a camera that was powered off but is still
/// plugged in keeps showing up, so `true` does not mean it will answer.
pub fn verify_connected<D: CameraDriver>(driver: &mut D, model: &str) -> Result<bool> {
    debug!("Autodetecting camera...");
    let found = driver.auto_detect()?.iter().any(|row| row.contains(model));
    if found {
        debug!("Found: {}", model);
    } else {
        warn!("Camera {} NOT found", model);
    }
    Ok(found)
}

/// The only shutter speed a camera offers in bulb mode is `bulb`, so the
/// current value tells the mode.
pub fn verify_exposure_mode<D: CameraDriver>(driver: &mut D) -> Result<bool> {
    Ok(bulb_check(driver)?.is_ok())
}

fn bulb_check<D: CameraDriver>(driver: &mut D) -> Result<std::result::Result<(), String>> {
    let reply = driver.get_config("shutterspeed")?;
    match reply.current {
        Some(ref current) if current == "bulb" => {
            debug!("Bulb mode verified");
            Ok(Ok(()))
        }
        other => {
            let current = other.unwrap_or_else(|| "unknown".to_string());
            warn!(
                "Camera is NOT in bulb mode (shutterspeed: {}), fix it on the camera",
                current
            );
            Ok(Err(current))
        }
    }
}

/// Kills every process matching `pattern`. The desktop volume monitor grabs
/// the camera as soon as it is attached and blocks configuration and capture
/// commands until it is gone. Finding nothing is fine.
pub fn release_driver_lock<D: CameraDriver>(driver: &mut D, pattern: &str) -> Result<usize> {
    debug!("Killing monitor processes matching {:?}...", pattern);
    let pids = driver.find_processes(pattern)?;
    if pids.is_empty() {
        debug!("No monitor process found");
    }
    for pid in &pids {
        driver.terminate_process(*pid)?;
        debug!("Killed monitor process (PID = {})", pid);
    }
    Ok(pids.len())
}

/// Gate run before any parameter is programmed or any shutter is opened.
pub fn preflight<D: CameraDriver>(driver: &mut D, model: &str, lock_pattern: &str) -> Result<()> {
    info!("Verifying camera link");
    release_driver_lock(driver, lock_pattern)?;
    if !verify_connected(driver, model)? {
        return Err(CaptureError::CameraNotFound(model.to_string()));
    }
    if let Err(current) = bulb_check(driver)? {
        return Err(CaptureError::NotInBulbMode(current));
    }
    Ok(())
}
