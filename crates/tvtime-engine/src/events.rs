//! Actions the engine accepts and events it emits, in their JSON-lines form.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tvtime_common::{
    AntiCheatReason, ApprovalStatus, Error, ExerciseKind, Landmark, LedgerEntry, RowId,
};
use uuid::Uuid;

use crate::exercise::Stage;
use crate::ledger::LedgerStats;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppAction {
    Frame {
        landmarks: Vec<Landmark>,
    },
    Transcript {
        text: String,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    SelectMode {
        exercise: ExerciseKind,
    },
    BackToMenu,
    QueryEarned,
    Stats,
    Ask {
        question: String,
    },
    FinishAndReport,
    CancelReport,
    ResetDay,
    ConfirmResetDay,
    CancelResetDay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    ModeSelected {
        exercise: ExerciseKind,
        session: Uuid,
        rate: u32,
    },
    ModeCleared,
    Rep {
        exercise: ExerciseKind,
        count: u32,
        stage: Option<Stage>,
    },
    /// Form cue to display; `None` clears it.
    Feedback {
        text: Option<String>,
    },
    AntiCheat {
        reason: AntiCheatReason,
        message: String,
    },
    AntiCheatCleared,
    MinuteEarned {
        gain: f64,
        earned: f64,
        entry: LedgerEntry,
    },
    DailyLimitReached {
        earned: f64,
        cap: f64,
    },
    Speak {
        text: String,
    },
    Stats {
        date: NaiveDate,
        stats: LedgerStats,
        insight: String,
        stale: bool,
    },
    Answer {
        text: String,
    },
    ConfirmationRequired {
        action: String,
        message: String,
    },
    DayReset {
        date: NaiveDate,
    },
    /// The report was accepted and is being delivered in the background.
    ApprovalSubmitting {
        earned: f64,
    },
    ApprovalSubmitted {
        row_id: RowId,
        earned: f64,
    },
    ApprovalDecided {
        row_id: RowId,
        status: ApprovalStatus,
        earned: f64,
    },
    ApprovalCancelled {
        row_id: RowId,
    },
    VoiceListening {
        active: bool,
    },
    ResetRecognizer,
    Error {
        kind: String,
        message: String,
        /// Repeating the same action may succeed.
        retryable: bool,
    },
}

impl AppEvent {
    pub fn speak(text: impl Into<String>) -> Self {
        AppEvent::Speak { text: text.into() }
    }

    pub fn error(err: &Error) -> Self {
        AppEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_format() {
        let action: AppAction = serde_json::from_str(
            r#"{"type":"frame","landmarks":[{"x":0.5,"y":0.2,"visibility":0.9}]}"#,
        )
        .unwrap();
        assert!(matches!(action, AppAction::Frame { ref landmarks } if landmarks.len() == 1));

        let action: AppAction =
            serde_json::from_str(r#"{"type":"transcript","text":"buddy stop","final":true}"#)
                .unwrap();
        assert_eq!(action, AppAction::Transcript { text: "buddy stop".into(), is_final: true });

        let action: AppAction =
            serde_json::from_str(r#"{"type":"select_mode","exercise":"jumpingjacks"}"#).unwrap();
        assert_eq!(action, AppAction::SelectMode { exercise: ExerciseKind::JumpingJacks });
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_string(&AppEvent::speak("Stopped.")).unwrap();
        assert_eq!(json, r#"{"event":"speak","text":"Stopped."}"#);

        let json = serde_json::to_string(&AppEvent::Feedback { text: None }).unwrap();
        assert_eq!(json, r#"{"event":"feedback","text":null}"#);

        let err = Error::WorkflowSubmitFailure("timeout".into());
        let json = serde_json::to_value(AppEvent::error(&err)).unwrap();
        assert_eq!(json["kind"], "workflow_submit_failure");
        assert_eq!(json["retryable"], true);
    }
}
