use crate::camera_api::CameraDriver;
use crate::error::{CaptureError, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const APERTURE_TABLE_FILE: &str = "80D_aperture_dict";
pub const ISO_TABLE_FILE: &str = "80D_iso_dict";

/// Index to value tables listing what the camera accepts for each
/// programmable parameter. They are camera specific and the ones shipped are
/// for the 80D.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterTables {
    aperture: BTreeMap<String, String>,
    iso: BTreeMap<String, String>,
}

impl ParameterTables {
    pub fn new(aperture: BTreeMap<String, String>, iso: BTreeMap<String, String>) -> Self {
        Self { aperture, iso }
    }

    /// Loads both tables from their default file names in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            aperture: load_table(&dir.join(APERTURE_TABLE_FILE))?,
            iso: load_table(&dir.join(ISO_TABLE_FILE))?,
        })
    }

    /// Allow-list for `parameter`, `None` if it is not programmable.
    pub fn allowed(&self, parameter: &str) -> Option<&BTreeMap<String, String>> {
        match parameter {
            "aperture" => Some(&self.aperture),
            "iso" => Some(&self.iso),
            _ => None,
        }
    }
}

pub fn load_table(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)?;
    parse_table(path, &text)
}

/// Rows are `index<TAB>value`; the header row carries the `INDEX` token.
pub fn parse_table(path: &Path, text: &str) -> Result<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();
    for (index, row) in text.lines().enumerate() {
        if row.trim().is_empty() || row.contains("INDEX") {
            continue;
        }
        let mut columns = row.splitn(2, '\t');
        match (columns.next(), columns.next()) {
            (Some(key), Some(value)) => {
                table.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                return Err(CaptureError::Table {
                    path: path.to_path_buf(),
                    line: index + 1,
                    content: row.to_string(),
                })
            }
        }
    }
    Ok(table)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Programming {
    /// The camera reports the requested value.
    Verified,
    /// The parameter is not one this tool can program.
    NotApplicable,
    /// The value is not allowed, or the camera refused or ignored it.
    Rejected,
}

/// Sets `parameter` to `value` and reads it back.
///
/// Firmware can silently refuse values that are out of range or do not fit
/// the current mode, so a write only counts once the camera reports it.
/// Nothing is written when the camera already holds the value.
pub fn set_parameter<D: CameraDriver>(
    driver: &mut D,
    tables: &ParameterTables,
    parameter: &str,
    value: &str,
) -> Result<Programming> {
    let allowed = match tables.allowed(parameter) {
        Some(allowed) => allowed,
        None => {
            warn!("{:?} is not a configurable parameter", parameter);
            return Ok(Programming::NotApplicable);
        }
    };
    if !allowed.values().any(|v| v == value) {
        warn!("{:?} is not an accepted value for {}", value, parameter);
        return Ok(Programming::Rejected);
    }

    debug!("Setting {} to {}...", parameter, value);
    let current = driver.get_config(parameter)?.current;
    if current.as_deref() == Some(value) {
        debug!("{} is already set to {}", parameter, value);
        return Ok(Programming::Verified);
    }

    let reply = driver.set_config_value(parameter, value)?;
    if !reply.success {
        warn!("Failed to set {} to {}, driver said:", parameter, value);
        for line in reply.raw_output.lines() {
            warn!("    {}", line);
        }
        return Ok(Programming::Rejected);
    }

    let readback = driver.get_config(parameter)?.current;
    if readback.as_deref() == Some(value) {
        debug!("{} successfully set to {}", parameter, value);
        Ok(Programming::Verified)
    } else {
        warn!(
            "{} not applied: expected {}, camera reports {:?}",
            parameter, value, readback
        );
        Ok(Programming::Rejected)
    }
}
