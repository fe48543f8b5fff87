use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// A pending approval ask, as written to `<id>.request.json` by the hook.
///
/// Only `id` and `pid` carry meaning for the queue itself; the remaining
/// fields are rendered by the client. Keys this struct does not know about
/// are kept in `extra` and handed back to the client untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_pattern: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings_file: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Hooks written in dynamic languages emit `null` for unset values; treat
/// it the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Owner pid of a raw request record, read without the rest of its shape
/// so that odd display fields never keep a dead requester's record alive.
pub fn record_owner_pid(record: &serde_json::Value) -> Option<u32> {
    let pid = record.get("pid")?;
    let pid = pid
        .as_i64()
        .or_else(|| pid.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?;
    positive_pid(pid)
}

fn positive_pid(pid: i64) -> Option<u32> {
    Some(pid).filter(|p| *p > 0).and_then(|p| u32::try_from(p).ok())
}

impl ApprovalRequest {
    /// The pid worth checking, if any. Zero and negative values address
    /// process groups under signal semantics and are never checked.
    pub fn owner_pid(&self) -> Option<u32> {
        self.pid.and_then(positive_pid)
    }

    /// Whether an "always" decision has anything to persist.
    pub fn has_allow_rule(&self) -> bool {
        !self.allow_pattern.is_empty() && !self.settings_file.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Always,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Always => "always",
            Decision::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown decision '{0}' (expected allow, always or deny)")]
pub struct UnknownDecision(pub String);

impl FromStr for Decision {
    type Err = UnknownDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Decision::Allow),
            "always" => Ok(Decision::Always),
            "deny" => Ok(Decision::Deny),
            other => Err(UnknownDecision(other.to_string())),
        }
    }
}

/// Contents of `<id>.response.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalResponse {
    pub decision: Decision,
}
