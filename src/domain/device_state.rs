use backbone_core::ApiMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a device has been heard from recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Presence {
    Present,
    #[default]
    Missing,
}

/// Last known state of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_token: String,
    pub presence: Presence,
    pub last_interaction_ms: Option<u64>,
    /// Latest value per measurement name.
    pub measurements: BTreeMap<String, f64>,
}

impl DeviceState {
    /// State of a device nothing has been recorded for yet.
    pub fn unknown(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            presence: Presence::Missing,
            last_interaction_ms: None,
            measurements: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDeviceState {
    pub device_token: String,
}

/// Payload for recording one measurement against a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeasurement {
    pub device_token: String,
    pub name: String,
    pub value: f64,
    pub timestamp_ms: u64,
}

/// Streams the current state of the listed devices, or of every device the
/// tenant has when the list is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchDeviceStates {
    pub device_tokens: Vec<String>,
}

pub struct GetDeviceStateMethod;

impl ApiMethod for GetDeviceStateMethod {
    const NAME: &'static str = "getDeviceState";
    type Request = GetDeviceState;
    type Response = DeviceState;
}

pub struct RecordMeasurementMethod;

impl ApiMethod for RecordMeasurementMethod {
    const NAME: &'static str = "recordMeasurement";
    type Request = RecordMeasurement;
    type Response = DeviceState;
}

pub struct WatchDeviceStatesMethod;

impl ApiMethod for WatchDeviceStatesMethod {
    const NAME: &'static str = "watchDeviceStates";
    type Request = WatchDeviceStates;
    type Response = DeviceState;
}
