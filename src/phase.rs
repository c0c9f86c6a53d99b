//! Transfer lifecycle phases and the phase-change event payload.
//!
//! This module provides:
//! - `Phase`: the closed set of lifecycle states a transfer moves through
//! - `PhaseChangeEvent`: the payload emitted on every phase transition
//! - `DeleteUpload`: the post-run cleanup policy for the uploaded file
//!
//! Two *streams* share the `Phase` vocabulary and are intentionally
//! decoupled: the orchestrator's persisted stream (written through the
//! settings store under the `phase` key) and a notifier's locally tracked
//! notification stream. Nothing keeps them in lockstep; see
//! `notifier::PublishingNotifier` for the narrower notification mapping.

use serde::{Deserialize, Serialize};

/// A named stage in the lifecycle of a transfer run.
///
/// Exactly one phase is "current" in the persistent settings store at any
/// time. The persisted sequence for a run is
/// `Inactive → PreConnect → Transfer → (CompleteOK | CompleteFail) → Inactive`;
/// the final return to `Inactive` is emitted unconditionally from run
/// cleanup so an interrupted run never leaves the system stuck.
/// `Upload` and `Connect` belong to the host/UI vocabulary and
/// `PostTransfer` to the notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Inactive,
    Upload,
    PreConnect,
    Connect,
    Transfer,
    PostTransfer,
    CompleteOK,
    CompleteFail,
}

impl Phase {
    /// Returns all phases.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Inactive,
            Phase::Upload,
            Phase::PreConnect,
            Phase::Connect,
            Phase::Transfer,
            Phase::PostTransfer,
            Phase::CompleteOK,
            Phase::CompleteFail,
        ]
    }

    /// Returns the phase name as persisted in settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Inactive => "Inactive",
            Phase::Upload => "Upload",
            Phase::PreConnect => "PreConnect",
            Phase::Connect => "Connect",
            Phase::Transfer => "Transfer",
            Phase::PostTransfer => "PostTransfer",
            Phase::CompleteOK => "CompleteOK",
            Phase::CompleteFail => "CompleteFail",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::all()
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid phase '{}'. Valid values: Inactive, Upload, PreConnect, Connect, \
                     Transfer, PostTransfer, CompleteOK, CompleteFail",
                    s
                )
            })
    }
}

/// Payload emitted on every phase transition, before the new phase is
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChangeEvent {
    /// The phase that was current when the transition was emitted
    pub prev: Phase,
    /// The phase being entered
    pub curr: Phase,
    /// Optional message payload; terminal phases carry the local path of
    /// the transferred file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl PhaseChangeEvent {
    pub fn new(prev: Phase, curr: Phase, msg: Option<String>) -> Self {
        Self { prev, curr, msg }
    }
}

/// Post-run cleanup policy for the uploaded local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeleteUpload {
    #[default]
    Never,
    OnlyOnSuccess,
    OnlyOnFail,
    Always,
}

impl DeleteUpload {
    /// Returns the policy name as persisted in settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteUpload::Never => "Never",
            DeleteUpload::OnlyOnSuccess => "OnlyOnSuccess",
            DeleteUpload::OnlyOnFail => "OnlyOnFail",
            DeleteUpload::Always => "Always",
        }
    }

    /// Whether the uploaded file should be removed given the run outcome.
    pub fn should_delete(&self, succeeded: bool) -> bool {
        match self {
            DeleteUpload::Never => false,
            DeleteUpload::OnlyOnSuccess => succeeded,
            DeleteUpload::OnlyOnFail => !succeeded,
            DeleteUpload::Always => true,
        }
    }
}

impl std::fmt::Display for DeleteUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeleteUpload {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Never" => Ok(DeleteUpload::Never),
            "OnlyOnSuccess" => Ok(DeleteUpload::OnlyOnSuccess),
            "OnlyOnFail" => Ok(DeleteUpload::OnlyOnFail),
            "Always" => Ok(DeleteUpload::Always),
            _ => anyhow::bail!(
                "Invalid delete policy '{}'. Valid values: Never, OnlyOnSuccess, OnlyOnFail, Always",
                s
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_as_str_roundtrip() {
        for phase in Phase::all() {
            let parsed: Phase = phase.as_str().parse().unwrap();
            assert_eq!(parsed, *phase);
        }
    }

    #[test]
    fn test_phase_from_str_invalid() {
        assert!("Uploading".parse::<Phase>().is_err());
        assert!("inactive".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_serde_uses_persisted_names() {
        let json = serde_json::to_string(&Phase::CompleteOK).unwrap();
        assert_eq!(json, "\"CompleteOK\"");
        let parsed: Phase = serde_json::from_str("\"PreConnect\"").unwrap();
        assert_eq!(parsed, Phase::PreConnect);
    }

    #[test]
    fn test_phase_change_event_serialization() {
        let event = PhaseChangeEvent::new(
            Phase::Transfer,
            Phase::CompleteOK,
            Some("firmware/update.bin".to_string()),
        );
        let json = serde_json::to_string(&event).unwrap();
        let parsed: PhaseChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_phase_change_event_msg_is_optional() {
        let parsed: PhaseChangeEvent =
            serde_json::from_str(r#"{"prev":"Inactive","curr":"PreConnect"}"#).unwrap();
        assert_eq!(parsed.prev, Phase::Inactive);
        assert_eq!(parsed.curr, Phase::PreConnect);
        assert!(parsed.msg.is_none());
    }

    #[test]
    fn test_delete_upload_matrix() {
        assert!(!DeleteUpload::Never.should_delete(true));
        assert!(!DeleteUpload::Never.should_delete(false));
        assert!(DeleteUpload::OnlyOnSuccess.should_delete(true));
        assert!(!DeleteUpload::OnlyOnSuccess.should_delete(false));
        assert!(!DeleteUpload::OnlyOnFail.should_delete(true));
        assert!(DeleteUpload::OnlyOnFail.should_delete(false));
        assert!(DeleteUpload::Always.should_delete(true));
        assert!(DeleteUpload::Always.should_delete(false));
    }

    #[test]
    fn test_delete_upload_from_str() {
        assert_eq!(
            "OnlyOnFail".parse::<DeleteUpload>().unwrap(),
            DeleteUpload::OnlyOnFail
        );
        assert!("onlyonfail".parse::<DeleteUpload>().is_err());
    }

    #[test]
    fn test_delete_upload_default_is_never() {
        assert_eq!(DeleteUpload::default(), DeleteUpload::Never);
    }
}
