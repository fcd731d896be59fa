use crate::camera_api::{BulbRequest, CameraDriver};
use crate::clock::{format_timestamp, Clock};
use crate::config::ShotSettings;
use crate::error::Result;
use crate::parameters::{set_parameter, Programming};
use crate::relay::RelayLine;
use crate::rig::Rig;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Exposures this long or longer are tagged `dark`.
pub const DARK_THRESHOLD_SECS: f64 = 5.0;

/// Bulb exposure time in seconds, keeping the text it was configured with so
/// artifact names show exactly what the operator wrote.
#[derive(Clone, Debug, PartialEq)]
pub struct ShutterSpeed {
    text: String,
    seconds: f64,
}

impl ShutterSpeed {
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let seconds: f64 = text
            .trim()
            .parse()
            .map_err(|_| "not a number of seconds".to_string())?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err("must be a non-negative number of seconds".to_string());
        }
        Ok(Self {
            text: text.trim().to_string(),
            seconds,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// gphoto2 misreads fractional seconds, so timing goes out as whole
    /// milliseconds. The remainder is truncated.
    pub fn millis(&self) -> u64 {
        (self.seconds * 1000.0) as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExposureTag {
    Dark,
    Light,
}

impl fmt::Display for ExposureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureTag::Dark => f.write_str("dark"),
            ExposureTag::Light => f.write_str("light"),
        }
    }
}

/// Everything needed to take and name one shot.
#[derive(Clone, Debug, PartialEq)]
pub struct Exposure {
    pub subject: String,
    pub timestamp: NaiveDateTime,
    pub shot: ShotSettings,
    /// How long the driver may wait for the image to download.
    pub wait: Duration,
    pub lights: bool,
}

impl Exposure {
    pub fn tag(&self) -> ExposureTag {
        if self.shot.shutter.seconds() >= DARK_THRESHOLD_SECS {
            ExposureTag::Dark
        } else {
            ExposureTag::Light
        }
    }

    /// Names are unique within a run as long as two shots of one subject and
    /// tag never start within the same second.
    pub fn artifact_name(&self) -> String {
        format!(
            "{}_{}_{}_exp{}s__f{}_iso{}",
            self.subject,
            format_timestamp(&self.timestamp),
            self.tag(),
            self.shot.shutter.text(),
            self.shot.aperture,
            self.shot.iso
        )
    }

    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.artifact_name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExposureOutcome {
    Captured(PathBuf),
    /// Aperture or ISO could not be programmed; the shutter was never opened.
    ParameterFailed {
        parameter: String,
        value: String,
        result: Programming,
    },
    /// The driver returned but no image arrived.
    MissingArtifact(PathBuf),
}

impl ExposureOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, ExposureOutcome::Captured(_))
    }
}

impl<D: CameraDriver, R: RelayLine, K: Clock> Rig<D, R, K> {
    /// Takes one bulb exposure. Never retries: the caller decides what a
    /// failed shot means for the run.
    pub fn expose(&mut self, exposure: &Exposure) -> Result<ExposureOutcome> {
        if exposure.lights {
            self.light.set_light(true)?;
            // let the bulb come up to temperature
            self.clock.sleep(self.settings.warm_up);
        }

        let name = exposure.artifact_name();
        debug!("Starting capture routine for {}...", name);

        let parameters = [
            ("aperture", exposure.shot.aperture.as_str()),
            ("iso", exposure.shot.iso.as_str()),
        ];
        for (parameter, value) in parameters.iter() {
            let result = set_parameter(&mut self.camera, &self.tables, parameter, value)?;
            if result != Programming::Verified {
                warn!(
                    "Failed to set {} to {} ({:?}), skipping {}",
                    parameter, value, result, name
                );
                return Ok(ExposureOutcome::ParameterFailed {
                    parameter: parameter.to_string(),
                    value: value.to_string(),
                    result,
                });
            }
        }

        let path = self.output_dir.join(exposure.file_name());
        let request = BulbRequest {
            filename: path.clone(),
            exposure_ms: exposure.shot.shutter.millis(),
            download_wait_ms: exposure.wait.as_millis() as u64,
        };
        debug!(
            "Passing capture command ({} ms exposure, {} ms download wait)...",
            request.exposure_ms, request.download_wait_ms
        );
        let reply = self.camera.bulb_capture(&request)?;
        if !reply.success {
            debug!("Capture command exited unsuccessfully");
        }

        // the driver's output is too verbose to judge, the file is the verdict
        if path.exists() {
            info!("Image captured: {}", name);
            Ok(ExposureOutcome::Captured(path))
        } else {
            warn!(
                "Image capture failed, no image found at {}. Troubleshoot me!",
                path.display()
            );
            Ok(ExposureOutcome::MissingArtifact(path))
        }
    }
}
