use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Pose landmarks (MediaPipe Pose layout, 33 points)
// ============================================================================

pub const LANDMARK_COUNT: usize = 33;

/// Named body points read by the engine, keyed by their index in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseLandmark {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        match self {
            PoseLandmark::Nose => 0,
            PoseLandmark::LeftShoulder => 11,
            PoseLandmark::RightShoulder => 12,
            PoseLandmark::LeftElbow => 13,
            PoseLandmark::RightElbow => 14,
            PoseLandmark::LeftWrist => 15,
            PoseLandmark::RightWrist => 16,
            PoseLandmark::LeftHip => 23,
            PoseLandmark::RightHip => 24,
            PoseLandmark::LeftKnee => 25,
            PoseLandmark::RightKnee => 26,
            PoseLandmark::LeftAnkle => 27,
            PoseLandmark::RightAnkle => 28,
        }
    }
}

/// A single 2D keypoint in normalized image coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    pub fn distance_to(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One frame of pose output. Frames with fewer points than a joint index are
/// treated as missing that joint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, point: PoseLandmark) -> Option<&Landmark> {
        self.landmarks.get(point.index())
    }

    /// Returns the point only if present and at least `min_visibility` confident.
    pub fn visible(&self, point: PoseLandmark, min_visibility: f32) -> Option<&Landmark> {
        self.get(point).filter(|lm| lm.visibility >= min_visibility)
    }
}

// ============================================================================
// Exercises
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Pushups,
    Squats,
    JumpingJacks,
    BodySawPlank,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 4] = [
        ExerciseKind::Pushups,
        ExerciseKind::Squats,
        ExerciseKind::JumpingJacks,
        ExerciseKind::BodySawPlank,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ExerciseKind::Pushups => "Pushups",
            ExerciseKind::Squats => "Squats",
            ExerciseKind::JumpingJacks => "Jumping Jacks",
            ExerciseKind::BodySawPlank => "Body Saw Plank",
        }
    }

    /// Reps needed for one earned minute unless overridden in configuration.
    pub fn default_rate(self) -> u32 {
        match self {
            ExerciseKind::Pushups => 5,
            ExerciseKind::Squats => 10,
            ExerciseKind::JumpingJacks => 20,
            ExerciseKind::BodySawPlank => 20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseKind::Pushups => "pushups",
            ExerciseKind::Squats => "squats",
            ExerciseKind::JumpingJacks => "jumpingjacks",
            ExerciseKind::BodySawPlank => "bodysawplank",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExerciseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExerciseKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown exercise: {}", s))
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// One accrual event in the day's audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub description: String,
    pub reps: u32,
    pub minutes: f64,
    pub exercise: ExerciseKind,
    pub recorded_at: DateTime<Utc>,
}

/// Copy of a ledger as submitted for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub date: NaiveDate,
    pub child_name: String,
    pub earned_minutes: f64,
    pub total_reps: u32,
    pub history: Vec<LedgerEntry>,
    pub submitted_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    /// Human readable activity summary, one line per history entry.
    pub fn history_summary(&self) -> String {
        let mut lines: Vec<String> = self
            .history
            .iter()
            .map(|entry| format!("- {} (+{}m)", entry.description, entry.minutes))
            .collect();
        lines.push(format!("TOTAL REPS: {}", self.total_reps));
        lines.join("\n")
    }
}

// ============================================================================
// Anti-cheat
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AntiCheatReason {
    FaceNotVisible,
    StaticImageSuspected,
}

impl AntiCheatReason {
    pub fn code(self) -> &'static str {
        match self {
            AntiCheatReason::FaceNotVisible => "FACE_NOT_VISIBLE",
            AntiCheatReason::StaticImageSuspected => "STATIC_IMAGE_SUSPECTED",
        }
    }

    /// Text shown to the child while the violation persists.
    pub fn feedback(self) -> &'static str {
        match self {
            AntiCheatReason::FaceNotVisible => "Face Not Visible!",
            AntiCheatReason::StaticImageSuspected => "Move a little! (Anti-Cheat)",
        }
    }
}

// ============================================================================
// Approval
// ============================================================================

/// Row identifier assigned by the approval collaborator.
pub type RowId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::None => "NONE",
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NONE" | "" => Ok(ApprovalStatus::None),
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("Unknown approval status: {}", other)),
        }
    }
}

/// A parent's verdict on a submitted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn action(self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Reject => "REJECT",
        }
    }

    pub fn status(self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Ok(Decision::Approve),
            "REJECT" => Ok(Decision::Reject),
            other => Err(format!("Unknown decision action: {}", other)),
        }
    }
}

/// Notification payload sent to the approver once a row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNotice {
    pub row_id: RowId,
    pub approve_url: String,
    pub reject_url: String,
    pub snapshot: LedgerSnapshot,
}

impl ApprovalNotice {
    pub fn subject(&self) -> String {
        format!("TV Time Request: {:.1} mins", self.snapshot.earned_minutes)
    }

    pub fn body(&self) -> String {
        format!(
            "Total Earned: {:.1} minutes\nTotal Reps: {}\nActivities:\n{}\n\nApprove: {}\nReject: {}",
            self.snapshot.earned_minutes,
            self.snapshot.total_reps,
            self.snapshot.history_summary(),
            self.approve_url,
            self.reject_url
        )
    }
}
