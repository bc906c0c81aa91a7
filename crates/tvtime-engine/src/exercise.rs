//! Repetition state machines, one rule per exercise kind, driven through an
//! [`ExerciseSession`] that owns the stage, the rep count and the form cue.

use serde::Serialize;
use tracing::{debug, info};
use tvtime_common::{Error, ExerciseKind, Landmark, LandmarkFrame, PoseLandmark, Result};
use uuid::Uuid;

use crate::geometry::joint_angle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Up,
    Down,
    Out,
    In,
    Forward,
    Backward,
}

/// Result of applying one frame to a motion rule.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Step {
    stage: Option<Stage>,
    counted: bool,
    feedback: Option<&'static str>,
}

fn point(frame: &LandmarkFrame, p: PoseLandmark) -> Option<&Landmark> {
    frame.get(p)
}

fn pushups(stage: Option<Stage>, frame: &LandmarkFrame) -> Option<Step> {
    let angle = joint_angle(
        point(frame, PoseLandmark::LeftShoulder)?,
        point(frame, PoseLandmark::LeftElbow)?,
        point(frame, PoseLandmark::LeftWrist)?,
    );
    Some(angle_step(stage, angle, 160.0, "Go Lower!"))
}

fn squats(stage: Option<Stage>, frame: &LandmarkFrame) -> Option<Step> {
    let angle = joint_angle(
        point(frame, PoseLandmark::LeftHip)?,
        point(frame, PoseLandmark::LeftKnee)?,
        point(frame, PoseLandmark::LeftAnkle)?,
    );
    Some(angle_step(stage, angle, 170.0, "Deeper!"))
}

/// Shared UP/DOWN rule for joint-angle exercises: extended above `extended`
/// arms the rep, bending below 90 while armed counts it.
fn angle_step(stage: Option<Stage>, angle: f32, extended: f32, cue: &'static str) -> Step {
    let mut stage = stage;
    if angle > extended {
        stage = Some(Stage::Up);
    }

    if angle < 90.0 && stage == Some(Stage::Up) {
        return Step { stage: Some(Stage::Down), counted: true, feedback: None };
    }

    let feedback = (angle > 100.0 && angle < 140.0 && stage == Some(Stage::Up)).then_some(cue);
    Step { stage, counted: false, feedback }
}

fn jumping_jacks(stage: Option<Stage>, frame: &LandmarkFrame) -> Option<Step> {
    let nose = point(frame, PoseLandmark::Nose)?;
    let left_shoulder = point(frame, PoseLandmark::LeftShoulder)?;
    let right_shoulder = point(frame, PoseLandmark::RightShoulder)?;
    let left_wrist = point(frame, PoseLandmark::LeftWrist)?;
    let right_wrist = point(frame, PoseLandmark::RightWrist)?;
    let left_ankle = point(frame, PoseLandmark::LeftAnkle)?;
    let right_ankle = point(frame, PoseLandmark::RightAnkle)?;

    let hand_y = (left_wrist.y + right_wrist.y) / 2.0;
    let shoulder_y = (left_shoulder.y + right_shoulder.y) / 2.0;
    let ankle_spread = (left_ankle.x - right_ankle.x).abs();
    let shoulder_width = (left_shoulder.x - right_shoulder.x).abs();

    let hands_up = hand_y < nose.y;
    let hands_down = hand_y > shoulder_y;
    let legs_out = ankle_spread > shoulder_width * 1.5;
    let legs_in = ankle_spread < shoulder_width;

    let mut stage = stage;
    if hands_up && legs_out {
        stage = Some(Stage::Out);
    }

    if hands_down && legs_in && stage == Some(Stage::Out) {
        return Some(Step { stage: Some(Stage::In), counted: true, feedback: None });
    }

    Some(Step { stage, counted: false, feedback: None })
}

fn body_saw_plank(stage: Option<Stage>, frame: &LandmarkFrame) -> Option<Step> {
    let shoulder = point(frame, PoseLandmark::LeftShoulder)?;
    let elbow = point(frame, PoseLandmark::LeftElbow)?;
    let hip = point(frame, PoseLandmark::LeftHip)?;

    let offset = (shoulder.x - elbow.x).abs();
    let arm_len = shoulder.distance_to(elbow);

    let mut stage = stage;
    let mut counted = false;
    if offset < 0.2 * arm_len {
        stage = Some(Stage::Forward);
    }
    if offset > 0.5 * arm_len && stage == Some(Stage::Forward) {
        stage = Some(Stage::Backward);
        counted = true;
    }

    let feedback = if hip.y > shoulder.y + 0.2 {
        Some("Don't sag your hips!")
    } else if hip.y < shoulder.y - 0.1 {
        Some("Lower your hips!")
    } else {
        None
    };

    Some(Step { stage, counted, feedback })
}

/// Change to the form cue displayed next to the camera view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackUpdate {
    Show(&'static str),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepEvent {
    pub count: u32,
    /// The count crossed a multiple of the exercise rate.
    pub minute_earned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    pub rep: Option<RepEvent>,
    pub feedback: Option<FeedbackUpdate>,
}

/// One active exercise mode.
#[derive(Debug)]
pub struct ExerciseSession {
    id: Uuid,
    kind: ExerciseKind,
    rate: u32,
    min_core_visibility: f32,
    stage: Option<Stage>,
    rep_count: u32,
    last_feedback: Option<&'static str>,
    displayed: Option<&'static str>,
}

impl ExerciseSession {
    pub fn new(kind: ExerciseKind, rate: u32, min_core_visibility: f32) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, "Started {} session ({} reps per minute)", kind, rate);

        Self {
            id,
            kind,
            rate: rate.max(1),
            min_core_visibility,
            stage: None,
            rep_count: 0,
            last_feedback: None,
            displayed: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ExerciseKind {
        self.kind
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn last_feedback(&self) -> Option<&'static str> {
        self.last_feedback
    }

    /// Feed one gate-admitted frame. A frame with the core joints hidden or a
    /// required joint missing is `FrameUnusable` and changes nothing.
    pub fn observe(&mut self, frame: &LandmarkFrame) -> Result<FrameOutcome> {
        let min = self.min_core_visibility;
        if frame.visible(PoseLandmark::LeftShoulder, min).is_none()
            || frame.visible(PoseLandmark::LeftHip, min).is_none()
        {
            return Err(Error::FrameUnusable("core joints not visible".to_string()));
        }

        let step = match self.kind {
            ExerciseKind::Pushups => pushups(self.stage, frame),
            ExerciseKind::Squats => squats(self.stage, frame),
            ExerciseKind::JumpingJacks => jumping_jacks(self.stage, frame),
            ExerciseKind::BodySawPlank => body_saw_plank(self.stage, frame),
        }
        .ok_or_else(|| Error::FrameUnusable(format!("{} joints missing", self.kind.label())))?;

        if step.stage != self.stage {
            debug!(session = %self.id, "Stage {:?} -> {:?}", self.stage, step.stage);
            self.stage = step.stage;
        }

        let rep = step.counted.then(|| {
            self.rep_count += 1;
            RepEvent { count: self.rep_count, minute_earned: self.rep_count % self.rate == 0 }
        });

        Ok(FrameOutcome { rep, feedback: self.update_feedback(step.feedback) })
    }

    fn update_feedback(&mut self, feedback: Option<&'static str>) -> Option<FeedbackUpdate> {
        match feedback {
            Some(cue) if self.last_feedback != Some(cue) => {
                self.last_feedback = Some(cue);
                self.displayed = Some(cue);
                Some(FeedbackUpdate::Show(cue))
            }
            Some(_) => None,
            None if self.displayed.is_some() => {
                self.displayed = None;
                Some(FeedbackUpdate::Clear)
            }
            None => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tvtime_common::LANDMARK_COUNT;

    /// Upright body with every point visible; callers move the joints they need.
    pub(crate) fn base_frame() -> Vec<Landmark> {
        let mut lm = vec![Landmark::new(0.5, 0.5, 0.99); LANDMARK_COUNT];
        lm[PoseLandmark::Nose.index()] = Landmark::new(0.5, 0.1, 0.99);
        lm[PoseLandmark::LeftShoulder.index()] = Landmark::new(0.45, 0.2, 0.99);
        lm[PoseLandmark::RightShoulder.index()] = Landmark::new(0.55, 0.2, 0.99);
        lm[PoseLandmark::LeftHip.index()] = Landmark::new(0.46, 0.5, 0.99);
        lm[PoseLandmark::RightHip.index()] = Landmark::new(0.54, 0.5, 0.99);
        lm
    }

    fn set(lm: &mut [Landmark], p: PoseLandmark, x: f32, y: f32) {
        lm[p.index()] = Landmark::new(x, y, 0.99);
    }

    /// Left arm with the given elbow angle: upper arm horizontal, forearm rotated.
    pub(crate) fn pushup_frame(angle_deg: f32) -> LandmarkFrame {
        let mut lm = base_frame();
        let (sx, sy) = (0.3, 0.4);
        let (ex, ey) = (0.4, 0.4);
        let theta = (180.0 - angle_deg).to_radians();
        set(&mut lm, PoseLandmark::LeftShoulder, sx, sy);
        set(&mut lm, PoseLandmark::LeftElbow, ex, ey);
        set(&mut lm, PoseLandmark::LeftWrist, ex + 0.1 * theta.cos(), ey + 0.1 * theta.sin());
        LandmarkFrame::new(lm)
    }

    fn squat_frame(angle_deg: f32) -> LandmarkFrame {
        let mut lm = base_frame();
        let theta = (180.0 - angle_deg).to_radians();
        set(&mut lm, PoseLandmark::LeftHip, 0.5, 0.5);
        set(&mut lm, PoseLandmark::LeftKnee, 0.5, 0.7);
        set(&mut lm, PoseLandmark::LeftAnkle, 0.5 + 0.2 * theta.sin(), 0.7 + 0.2 * theta.cos());
        LandmarkFrame::new(lm)
    }

    fn jack_frame(out: bool) -> LandmarkFrame {
        let mut lm = base_frame();
        if out {
            set(&mut lm, PoseLandmark::LeftWrist, 0.35, 0.05);
            set(&mut lm, PoseLandmark::RightWrist, 0.65, 0.05);
            set(&mut lm, PoseLandmark::LeftAnkle, 0.3, 0.9);
            set(&mut lm, PoseLandmark::RightAnkle, 0.7, 0.9);
        } else {
            set(&mut lm, PoseLandmark::LeftWrist, 0.44, 0.45);
            set(&mut lm, PoseLandmark::RightWrist, 0.56, 0.45);
            set(&mut lm, PoseLandmark::LeftAnkle, 0.48, 0.9);
            set(&mut lm, PoseLandmark::RightAnkle, 0.52, 0.9);
        }
        LandmarkFrame::new(lm)
    }

    fn plank_frame(elbow_dx: f32, hip_dy: f32) -> LandmarkFrame {
        let mut lm = base_frame();
        set(&mut lm, PoseLandmark::LeftShoulder, 0.5, 0.5);
        set(&mut lm, PoseLandmark::LeftElbow, 0.5 + elbow_dx, 0.6);
        set(&mut lm, PoseLandmark::LeftHip, 0.8, 0.5 + hip_dy);
        LandmarkFrame::new(lm)
    }

    #[test]
    fn test_fixture_angles() {
        let f = pushup_frame(170.0);
        let angle = joint_angle(
            f.get(PoseLandmark::LeftShoulder).unwrap(),
            f.get(PoseLandmark::LeftElbow).unwrap(),
            f.get(PoseLandmark::LeftWrist).unwrap(),
        );
        assert!((angle - 170.0).abs() < 0.1);

        let f = squat_frame(80.0);
        let angle = joint_angle(
            f.get(PoseLandmark::LeftHip).unwrap(),
            f.get(PoseLandmark::LeftKnee).unwrap(),
            f.get(PoseLandmark::LeftAnkle).unwrap(),
        );
        assert!((angle - 80.0).abs() < 0.1);
    }

    #[test]
    fn test_pushup_counts_once_per_cycle() {
        let mut session = ExerciseSession::new(ExerciseKind::Pushups, 5, 0.5);

        // Bent before ever extending: no rep.
        session.observe(&pushup_frame(80.0)).unwrap();
        assert_eq!(session.rep_count(), 0);
        assert_eq!(session.stage(), None);

        session.observe(&pushup_frame(170.0)).unwrap();
        assert_eq!(session.stage(), Some(Stage::Up));

        let outcome = session.observe(&pushup_frame(80.0)).unwrap();
        assert_eq!(outcome.rep, Some(RepEvent { count: 1, minute_earned: false }));
        assert_eq!(session.stage(), Some(Stage::Down));

        // Staying down does not count again.
        let outcome = session.observe(&pushup_frame(80.0)).unwrap();
        assert!(outcome.rep.is_none());
        assert_eq!(session.rep_count(), 1);
    }

    #[test]
    fn test_fifth_pushup_earns_a_minute() {
        let mut session = ExerciseSession::new(ExerciseKind::Pushups, 5, 0.5);
        let mut last = None;
        for _ in 0..5 {
            session.observe(&pushup_frame(170.0)).unwrap();
            last = session.observe(&pushup_frame(80.0)).unwrap().rep;
        }
        assert_eq!(last, Some(RepEvent { count: 5, minute_earned: true }));
    }

    #[test]
    fn test_pushup_go_lower_cue_surfaces_once() {
        let mut session = ExerciseSession::new(ExerciseKind::Pushups, 5, 0.5);
        session.observe(&pushup_frame(170.0)).unwrap();

        let outcome = session.observe(&pushup_frame(120.0)).unwrap();
        assert_eq!(outcome.feedback, Some(FeedbackUpdate::Show("Go Lower!")));

        let outcome = session.observe(&pushup_frame(125.0)).unwrap();
        assert_eq!(outcome.feedback, None);

        let outcome = session.observe(&pushup_frame(165.0)).unwrap();
        assert_eq!(outcome.feedback, Some(FeedbackUpdate::Clear));
        assert_eq!(session.last_feedback(), Some("Go Lower!"));

        // Same cue again is not re-surfaced.
        let outcome = session.observe(&pushup_frame(120.0)).unwrap();
        assert_eq!(outcome.feedback, None);
    }

    #[test]
    fn test_squat_cycle_and_cue() {
        let mut session = ExerciseSession::new(ExerciseKind::Squats, 10, 0.5);
        session.observe(&squat_frame(175.0)).unwrap();
        assert_eq!(session.stage(), Some(Stage::Up));

        let outcome = session.observe(&squat_frame(120.0)).unwrap();
        assert_eq!(outcome.feedback, Some(FeedbackUpdate::Show("Deeper!")));

        let outcome = session.observe(&squat_frame(80.0)).unwrap();
        assert_eq!(outcome.rep.map(|r| r.count), Some(1));

        // 165 is not above the 170 threshold, so the rep is not re-armed.
        session.observe(&squat_frame(165.0)).unwrap();
        assert!(session.observe(&squat_frame(80.0)).unwrap().rep.is_none());
    }

    #[test]
    fn test_jumping_jack_out_then_in() {
        let mut session = ExerciseSession::new(ExerciseKind::JumpingJacks, 20, 0.5);

        assert!(session.observe(&jack_frame(false)).unwrap().rep.is_none());
        session.observe(&jack_frame(true)).unwrap();
        assert_eq!(session.stage(), Some(Stage::Out));

        let outcome = session.observe(&jack_frame(false)).unwrap();
        assert_eq!(outcome.rep.map(|r| r.count), Some(1));
        assert_eq!(session.stage(), Some(Stage::In));
    }

    #[test]
    fn test_plank_forward_backward_and_hip_cues() {
        let mut session = ExerciseSession::new(ExerciseKind::BodySawPlank, 20, 0.5);

        session.observe(&plank_frame(0.0, 0.0)).unwrap();
        assert_eq!(session.stage(), Some(Stage::Forward));

        let outcome = session.observe(&plank_frame(0.1, 0.0)).unwrap();
        assert_eq!(outcome.rep.map(|r| r.count), Some(1));
        assert_eq!(session.stage(), Some(Stage::Backward));

        let outcome = session.observe(&plank_frame(0.0, 0.25)).unwrap();
        assert_eq!(outcome.feedback, Some(FeedbackUpdate::Show("Don't sag your hips!")));

        let outcome = session.observe(&plank_frame(0.0, -0.15)).unwrap();
        assert_eq!(outcome.feedback, Some(FeedbackUpdate::Show("Lower your hips!")));
    }

    #[test]
    fn test_hidden_core_joints_ignore_frame() {
        let mut session = ExerciseSession::new(ExerciseKind::Pushups, 5, 0.5);
        session.observe(&pushup_frame(170.0)).unwrap();

        let mut frame = pushup_frame(80.0);
        frame.landmarks[PoseLandmark::LeftHip.index()].visibility = 0.2;
        assert!(matches!(session.observe(&frame), Err(Error::FrameUnusable(_))));
        assert_eq!(session.rep_count(), 0);
        assert_eq!(session.stage(), Some(Stage::Up));
    }

    #[test]
    fn test_truncated_frame_is_ignored() {
        let mut session = ExerciseSession::new(ExerciseKind::Squats, 10, 0.5);
        let mut frame = squat_frame(175.0);
        frame.landmarks.truncate(26);
        assert!(matches!(session.observe(&frame), Err(Error::FrameUnusable(_))));
        assert_eq!(session.stage(), None);
    }
}
