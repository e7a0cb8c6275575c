//! OGN device database (ddb) lookup
//!
//! Maps a FLARM/OGN device id to the aircraft registration and competition number so
//! start list entries can show something readable.
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const DDB_URL: &str = "http://ddb.glidernet.org/download/?j=1";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeviceType {
    Flarm,
    Ogn,
    Icao,
    #[default]
    Unknown,
}

impl Serialize for DeviceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = match self {
            DeviceType::Flarm => "F",
            DeviceType::Ogn => "O",
            DeviceType::Icao => "I",
            DeviceType::Unknown => "",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "F" => DeviceType::Flarm,
            "O" => DeviceType::Ogn,
            "I" => DeviceType::Icao,
            _ => DeviceType::Unknown,
        })
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_type: DeviceType,
    pub device_id: String,
    pub aircraft_model: String,
    pub registration: String,
    #[serde(rename = "cn")]
    pub competition_number: String,
    pub tracked: String,
    pub identified: String,
}

impl Device {
    /// Start list display name: registration right-aligned to 7, competition number to 2
    pub fn callsign(&self) -> String {
        format!(
            "{:>7} ({:>2})",
            self.registration.trim(),
            self.competition_number.trim()
        )
    }
}

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    devices: Vec<Device>,
}

#[derive(Debug, Default)]
pub struct DeviceDatabase {
    devices: HashMap<String, Device>,
}

impl DeviceDatabase {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    /// Parse the ddb JSON document (`{"devices": [...]}`)
    pub fn from_json(json: &str) -> Result<Self> {
        let response: DeviceResponse =
            serde_json::from_str(json).context("Failed to parse ddb JSON")?;
        let mut db = Self::new();
        db.replace_devices(response.devices);
        Ok(db)
    }

    /// Load a previously downloaded ddb JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let db = Self::from_json(&contents)?;
        info!("Loaded {} devices from {:?}", db.device_count(), path);
        Ok(db)
    }

    /// Download the current ddb from glidernet
    pub async fn fetch(&mut self) -> Result<()> {
        let response = reqwest::get(DDB_URL)
            .await
            .context("Failed to download ddb")?
            .error_for_status()?;
        let device_response: DeviceResponse = response
            .json()
            .await
            .context("Failed to decode ddb response")?;

        self.replace_devices(device_response.devices);
        info!("Downloaded {} devices from ddb", self.device_count());
        Ok(())
    }

    fn replace_devices(&mut self, devices: Vec<Device>) {
        // Clear existing devices and populate with new data
        self.devices.clear();
        for device in devices {
            self.devices.insert(device.device_id.clone(), device);
        }
    }

    pub fn get_device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    /// Display callsign for a device, None when it isn't registered
    pub fn callsign_for(&self, device_id: &str) -> Option<String> {
        self.get_device(device_id).map(Device::callsign)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}
