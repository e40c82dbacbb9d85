use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DecodeError;

/// Server-wide settings, as returned by `v2/settings/read`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    pub ui_port: u16,
    pub config_path: String,
    pub log_path: String,
    pub plugins_path: String,
    pub userdata_path: String,
    pub debugging: bool,
    pub library_path: String,
    pub enable_library_scanner: bool,
    pub schedule_full_scan_minutes: u32,
    pub follow_symlinks: bool,
    pub concurrent_file_testers: u32,
    pub run_full_scan_on_start: bool,
    pub enable_inotify: bool,
    pub clear_pending_tasks_on_restart: bool,
    pub number_of_workers: u32,
    pub cache_path: String,
    pub installation_name: String,
    pub distributed_worker_count_target: u32,
}

impl Settings {
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        decode("settings", value)
    }
}

/// A partial settings write. Only fields that are `Some` are sent.
///
/// ```
/// use unmanic::SettingsUpdate;
///
/// let update = SettingsUpdate {
///     debugging: Some(true),
///     ..Default::default()
/// };
/// assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"debugging":true}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userdata_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debugging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_library_scanner: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_full_scan_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent_file_testers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_full_scan_on_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_inotify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_pending_tasks_on_restart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_workers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributed_worker_count_target: Option<u32>,
}

/// One processing slot on the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Worker {
    /// e.g. "W0".
    pub id: String,
    pub name: String,
    pub idle: bool,
    pub paused: bool,
    /// `None` until the worker has picked up its first task.
    #[serde(deserialize_with = "nullable_epoch_seconds")]
    pub start_time: Option<DateTime<Utc>>,
    pub current_file: String,
    #[serde(deserialize_with = "nullable")]
    pub current_task: Option<i64>,
}

impl Worker {
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        decode("worker", value)
    }

    /// Decode a `workers_status` array. One bad entry fails the whole list.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, DecodeError> {
        decode("workers_status", value)
    }
}

/// A file waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PendingTask {
    pub id: i64,
    pub abspath: String,
    pub priority: i64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: String,
}

/// A page of pending tasks, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskQueue {
    #[serde(rename = "recordsTotal")]
    pub records_total: u64,
    #[serde(rename = "recordsFiltered")]
    pub records_filtered: u64,
    pub results: Vec<PendingTask>,
}

impl TaskQueue {
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        decode("task queue", value)
    }
}

/// A file whose processing has finished, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletedTask {
    pub id: i64,
    #[serde(rename = "task_label")]
    pub label: String,
    #[serde(rename = "task_success")]
    pub success: bool,
    #[serde(deserialize_with = "epoch_seconds")]
    pub finish_time: DateTime<Utc>,
}

/// A page of completed tasks, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskHistory {
    #[serde(rename = "recordsTotal")]
    pub records_total: u64,
    #[serde(rename = "recordsFiltered")]
    pub records_filtered: u64,
    pub results: Vec<CompletedTask>,
}

impl TaskHistory {
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        decode("task history", value)
    }
}

/// Host details reported under `devices.cpu_info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemConfiguration {
    pub python_version: String,
    pub arch: String,
    pub bits: u32,
    /// Logical cores.
    pub count: u32,
    #[serde(rename = "vendor_id_raw")]
    pub cpu_vendor: String,
    #[serde(rename = "brand_raw")]
    pub cpu_brand: String,
    #[serde(rename = "hz_advertised_friendly")]
    pub hz_advertised: String,
    #[serde(rename = "hz_actual_friendly")]
    pub hz_actual: String,
    pub model: u32,
    pub family: u32,
    pub flags: Vec<String>,
}

impl SystemConfiguration {
    /// Decode the `configuration` object of `v2/settings/configuration`.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let configuration = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let cpu_info = required(configuration, "devices")?
            .as_object()
            .and_then(|devices| required(devices, "cpu_info").ok())
            .ok_or(DecodeError::MissingKey {
                key: "devices.cpu_info",
            })?;
        decode("cpu info", cpu_info)
    }
}

/// Cached point-in-time view of an installation.
///
/// Refreshed by [`Client::update`](crate::Client::update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub settings: Settings,
    pub workers: Vec<Worker>,
    pub version: String,
}

impl Application {
    /// Decode `{"settings": {..}, "workers": [..], "version": ".."}`.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let data = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let settings = Settings::from_value(required(data, "settings")?)?;
        let workers = Worker::list_from_value(required(data, "workers")?)?;
        let version = decode("version", required(data, "version")?)?;
        Ok(Self {
            settings,
            workers,
            version,
        })
    }
}

/// Paging and ordering for the task tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskQuery {
    pub start: u64,
    pub length: u64,
    pub search_value: String,
    pub order_by: String,
    pub order_direction: OrderDirection,
}

impl TaskQuery {
    /// Defaults for `get_pending_tasks`: first 10, highest priority first.
    pub fn pending() -> Self {
        Self::ordered_by("priority")
    }

    /// Defaults for `get_task_history`: first 10, most recent first.
    pub fn history() -> Self {
        Self::ordered_by("finish_time")
    }

    fn ordered_by(column: &str) -> Self {
        Self {
            start: 0,
            length: 10,
            search_value: String::new(),
            order_by: column.to_string(),
            order_direction: OrderDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

/// Look up a key that must be present and non-null.
pub(crate) fn required<'a>(
    map: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Value, DecodeError> {
    match map.get(key) {
        Some(Value::Null) | None => Err(DecodeError::MissingKey { key }),
        Some(value) => Ok(value),
    }
}

pub(crate) fn decode<'a, T: Deserialize<'a>>(
    model: &'static str,
    value: &'a Value,
) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(|source| DecodeError::Invalid { model, source })
}

/// Epoch seconds sent either as a number or a numeric string ("1650998185.708").
/// The fractional part is dropped.
struct EpochSeconds(DateTime<Utc>);

impl<'de> Deserialize<'de> for EpochSeconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let seconds = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n,
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid epoch timestamp {s:?}")))?,
        };

        if !seconds.is_finite() {
            return Err(de::Error::custom("epoch timestamp is not finite"));
        }
        DateTime::from_timestamp(seconds.trunc() as i64, 0)
            .map(EpochSeconds)
            .ok_or_else(|| de::Error::custom(format!("epoch timestamp {seconds} out of range")))
    }
}

fn epoch_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    EpochSeconds::deserialize(deserializer).map(|t| t.0)
}

fn nullable_epoch_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Option::<EpochSeconds>::deserialize(deserializer).map(|t| t.map(|t| t.0))
}

/// Key must be present; `null` is allowed.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}
