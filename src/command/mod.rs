// Inbound commands: parsing, validation and execution

mod dispatcher;
mod tesla_api;
mod wake;

pub use dispatcher::CommandDispatcher;
pub use tesla_api::TeslaApiExecutor;
pub use wake::{wake_channel, TeslaMateWaker, WakeHandle};


use crate::discovery::{CHARGE_LIMIT_MAX, CHARGE_LIMIT_MIN};
use crate::error::SyncError;
use crate::mqtt::Topics;
use crate::vehicle::VehicleIdentity;
use async_trait::async_trait;
use std::fmt;

/// Action requested by Home Assistant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SetChargeLimit(u8),
    StartCharging,
    StopCharging,
}

impl Command {
    /// Entity the command targets; later commands for the same entity
    /// supersede earlier ones.
    pub fn object_id(&self) -> &'static str {
        match self {
            Command::SetChargeLimit(_) => "charge_limit_soc",
            Command::StartCharging | Command::StopCharging => "charging",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetChargeLimit(percent) => write!(f, "set charge limit to {}%", percent),
            Command::StartCharging => f.write_str("start charging"),
            Command::StopCharging => f.write_str("stop charging"),
        }
    }
}

/// Parse and validate a message received on a command topic.
///
/// Only `<base>/<vin>/<object_id>/set` of the resolved vehicle is accepted;
/// everything else is a `Validation` error.
pub fn parse_command(topics: &Topics, topic: &str, payload: &[u8]) -> Result<Command, SyncError> {
    let object_id = topics.command_object_id(topic).ok_or_else(|| {
        SyncError::Validation(format!(
            "{} is not a command topic of vehicle {}",
            topic,
            topics.vin()
        ))
    })?;

    let payload = std::str::from_utf8(payload)
        .map_err(|_| SyncError::Validation(format!("{}: payload is not UTF-8", topic)))?
        .trim();

    match object_id {
        "charge_limit_soc" => parse_charge_limit(payload).map(Command::SetChargeLimit),
        "charging" => {
            if payload.eq_ignore_ascii_case("ON") {
                Ok(Command::StartCharging)
            } else if payload.eq_ignore_ascii_case("OFF") {
                Ok(Command::StopCharging)
            } else {
                Err(SyncError::Validation(format!(
                    "charging expects ON or OFF, got '{}'",
                    payload
                )))
            }
        }
        other => Err(SyncError::Validation(format!("{} is not writable", other))),
    }
}

/// Whole number in the accepted range. Plain digits only; a zero fraction
/// ("80.0") is tolerated since Home Assistant number entities send floats.
fn parse_charge_limit(payload: &str) -> Result<u8, SyncError> {
    let digits = match payload.split_once('.') {
        None => payload,
        Some((whole, fraction)) if !fraction.is_empty() && fraction.bytes().all(|b| b == b'0') => {
            whole
        }
        Some(_) => {
            return Err(SyncError::Validation(format!(
                "charge limit '{}' is not a whole number",
                payload
            )))
        }
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SyncError::Validation(format!(
            "charge limit '{}' is not an integer",
            payload
        )));
    }

    // Only digits are left, so a failed parse means the value is too large
    match digits.parse::<u8>() {
        Ok(percent) if (CHARGE_LIMIT_MIN..=CHARGE_LIMIT_MAX).contains(&percent) => Ok(percent),
        _ => Err(SyncError::Validation(format!(
            "charge limit {} outside {}..={}",
            digits, CHARGE_LIMIT_MIN, CHARGE_LIMIT_MAX
        ))),
    }
}

/// Performs a validated command against the vehicle.
///
/// TeslaMate's database is read-only for this process, so commands always go
/// to an upstream control API.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, vehicle: &VehicleIdentity, command: Command) -> Result<(), SyncError>;
}
