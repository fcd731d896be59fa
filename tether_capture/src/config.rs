//! Capture configuration: one `key=value` pair per line, `#` starts a
//! comment, blank lines are skipped and whitespace around keys and values is
//! ignored. Each capture profile accepts exactly one set of keys.

use crate::error::{CaptureError, Result};
use crate::exposure::ShutterSpeed;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

const SINGLE_KEYS: &[&str] = &["aperture", "iso", "lights", "shutterspeed", "subject"];
const SERIES_KEYS: &[&str] = &[
    "aperture",
    "duration",
    "interval",
    "iso",
    "lights",
    "shutterspeed",
    "subject",
];
const DUAL_SERIES_KEYS: &[&str] = &[
    "aperture_dark",
    "aperture_light",
    "duration",
    "interval",
    "iso_dark",
    "iso_light",
    "shutterspeed_dark",
    "shutterspeed_light",
    "subject",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureProfile {
    Single,
    Series,
    #[value(name = "dual_series")]
    DualSeries,
}

impl CaptureProfile {
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            CaptureProfile::Single => SINGLE_KEYS,
            CaptureProfile::Series => SERIES_KEYS,
            CaptureProfile::DualSeries => DUAL_SERIES_KEYS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CaptureProfile::Single => "single",
            CaptureProfile::Series => "series",
            CaptureProfile::DualSeries => "dual_series",
        }
    }

    pub fn default_config_file(self) -> String {
        format!("{}.conf", self.name())
    }
}

impl fmt::Display for CaptureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw key/value pairs read from a config file, checked against the key set
/// of one profile. Never mutated after loading.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigRecord {
    profile: CaptureProfile,
    values: BTreeMap<String, String>,
}

impl ConfigRecord {
    pub fn load(profile: CaptureProfile, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(profile, &text)
    }

    pub fn parse(profile: CaptureProfile, text: &str) -> Result<Self> {
        let values = parse_pairs(text)?;
        check_keys(profile, &values)?;
        Ok(Self { profile, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| CaptureError::ConfigKeys {
            profile: self.profile.to_string(),
            missing: vec![key.to_string()],
            unexpected: vec![],
        })
    }

    /// Parses the values into the typed settings of the record's profile.
    pub fn settings(&self) -> Result<ProfileSettings> {
        let subject = self.require("subject")?.to_string();
        Ok(match self.profile {
            CaptureProfile::Single => ProfileSettings::Single(SingleSettings {
                subject,
                lights: self.lights()?,
                shot: self.shot("shutterspeed", "aperture", "iso")?,
            }),
            CaptureProfile::Series => ProfileSettings::Series(SeriesSettings {
                subject,
                lights: self.lights()?,
                shot: self.shot("shutterspeed", "aperture", "iso")?,
                interval: self.interval()?,
                duration: self.duration()?,
            }),
            CaptureProfile::DualSeries => ProfileSettings::DualSeries(DualSeriesSettings {
                subject,
                dark: self.shot("shutterspeed_dark", "aperture_dark", "iso_dark")?,
                light: self.shot("shutterspeed_light", "aperture_light", "iso_light")?,
                interval: self.interval()?,
                duration: self.duration()?,
            }),
        })
    }

    fn shot(&self, shutter_key: &str, aperture_key: &str, iso_key: &str) -> Result<ShotSettings> {
        let shutter = self.require(shutter_key)?;
        Ok(ShotSettings {
            shutter: ShutterSpeed::parse(shutter).map_err(|reason| CaptureError::ConfigValue {
                key: shutter_key.to_string(),
                value: shutter.to_string(),
                reason,
            })?,
            aperture: self.require(aperture_key)?.to_string(),
            iso: self.require(iso_key)?.to_string(),
        })
    }

    fn lights(&self) -> Result<bool> {
        match self.require("lights")? {
            "on" => Ok(true),
            "off" => Ok(false),
            other => Err(invalid("lights", other, "expected on or off")),
        }
    }

    /// `interval` is given in minutes.
    fn interval(&self) -> Result<Duration> {
        let minutes = self.number("interval")?;
        if minutes <= 0.0 {
            return Err(invalid("interval", self.require("interval")?, "must be positive"));
        }
        seconds("interval", self.require("interval")?, minutes * 60.0)
    }

    /// `duration` is given in hours.
    fn duration(&self) -> Result<Duration> {
        let hours = self.number("duration")?;
        if hours < 0.0 {
            return Err(invalid("duration", self.require("duration")?, "must not be negative"));
        }
        seconds("duration", self.require("duration")?, hours * 3600.0)
    }

    fn number(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(invalid(key, value, "not a number")),
        }
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> CaptureError {
    CaptureError::ConfigValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn seconds(key: &str, value: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(key, value, &e.to_string()))
}

fn parse_pairs(text: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let content = match line.find('#') {
            Some(start) => &line[..start],
            None => line,
        }
        .trim();
        if content.is_empty() {
            continue;
        }
        let mut parts = content.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(key), Some(value)) if !key.trim().is_empty() => {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                return Err(CaptureError::ConfigSyntax {
                    line: index + 1,
                    content: line.to_string(),
                })
            }
        }
    }
    Ok(values)
}

fn check_keys(profile: CaptureProfile, values: &BTreeMap<String, String>) -> Result<()> {
    let required: BTreeSet<&str> = profile.required_keys().iter().copied().collect();
    let present: BTreeSet<&str> = values.keys().map(String::as_str).collect();
    if required == present {
        return Ok(());
    }
    Err(CaptureError::ConfigKeys {
        profile: profile.to_string(),
        missing: required.difference(&present).map(|k| k.to_string()).collect(),
        unexpected: present.difference(&required).map(|k| k.to_string()).collect(),
    })
}

/// Exposure parameters for one shot.
#[derive(Clone, Debug, PartialEq)]
pub struct ShotSettings {
    pub shutter: ShutterSpeed,
    pub aperture: String,
    pub iso: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SingleSettings {
    pub subject: String,
    pub lights: bool,
    pub shot: ShotSettings,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeriesSettings {
    pub subject: String,
    pub lights: bool,
    pub shot: ShotSettings,
    pub interval: Duration,
    pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DualSeriesSettings {
    pub subject: String,
    pub dark: ShotSettings,
    pub light: ShotSettings,
    pub interval: Duration,
    pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProfileSettings {
    Single(SingleSettings),
    Series(SeriesSettings),
    DualSeries(DualSeriesSettings),
}
