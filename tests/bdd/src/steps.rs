// Step definitions for the engine scenarios

use cucumber::{given, then, when};
use tokio::time::Instant;
use tvtime_common::{ApprovalStatus, Decision, ExerciseKind, Landmark, PoseLandmark};
use tvtime_db::queries::ApprovalRowQueries;
use tvtime_engine::approval::WorkflowState;
use tvtime_engine::{AppAction, AppEvent};

use crate::EngineWorld;

#[given(expr = "a fresh day with a daily cap of {float} minutes")]
async fn fresh_day(world: &mut EngineWorld, cap: f64) {
    world.start(cap).await;
}

#[given(expr = "the child selects {word}")]
async fn selects(world: &mut EngineWorld, exercise: String) {
    let kind: ExerciseKind = exercise.parse().expect("known exercise");
    let events = world.app().select_mode(kind, Instant::now());
    world.events.extend(events);
}

#[when(expr = "the child does {int} pushups")]
async fn does_pushups(world: &mut EngineWorld, reps: usize) {
    for _ in 0..reps {
        let up = world.pushup_pose(170.0, true);
        world.frame(up);
        let down = world.pushup_pose(80.0, true);
        world.frame(down);
    }
}

#[when(expr = "the camera sees {int} identical frames")]
async fn identical_frames(world: &mut EngineWorld, count: usize) {
    for _ in 0..count {
        let frame = world.pushup_pose(170.0, false);
        world.frame(frame);
    }
}

#[when("the camera loses the face")]
async fn face_lost(world: &mut EngineWorld) {
    let mut frame = world.pushup_pose(170.0, true);
    frame.landmarks[PoseLandmark::Nose.index()] = Landmark::new(0.5, 0.1, 0.2);
    world.frame(frame);
}

#[when(expr = "the child says {string}")]
async fn says(world: &mut EngineWorld, text: String) {
    let action = AppAction::Transcript { text, is_final: true };
    let events = world.app().handle(action, Instant::now(), EngineWorld::wall());
    world.record(events).await;
}

#[when("the child finishes and reports")]
async fn finish_and_report(world: &mut EngineWorld) {
    let events = world.app().handle(AppAction::FinishAndReport, Instant::now(), EngineWorld::wall());
    world.record(events).await;
}

#[when(expr = "the parent {word} the request")]
async fn parent_decides(world: &mut EngineWorld, verb: String) {
    let decision = match verb.as_str() {
        "approves" => Decision::Approve,
        "rejects" => Decision::Reject,
        other => panic!("unknown decision verb: {}", other),
    };
    let row_id = world.app().workflow_state().row_id().expect("a submitted row");
    let sheet = world.sheet.as_ref().expect("sheet open");
    ApprovalRowQueries::apply_decision(sheet, row_id, decision).await.expect("decision recorded");
}

#[then(expr = "the ledger shows {float} earned minutes")]
async fn ledger_shows(world: &mut EngineWorld, minutes: f64) {
    assert_eq!(world.app().ledger().earned(), minutes);
}

#[then(expr = "the history has {int} entry/entries named {string}")]
async fn history_entries(world: &mut EngineWorld, count: usize, name: String) {
    let history = world.app().ledger().history();
    assert_eq!(history.len(), count);
    assert!(history.iter().all(|entry| entry.description == name));
}

#[then(expr = "the coach says {string}")]
async fn coach_says(world: &mut EngineWorld, text: String) {
    let spoken = world.spoken();
    assert!(spoken.contains(&text.as_str()), "coach said {:?}", spoken);
}

#[then(expr = "{int} reps were counted")]
async fn reps_counted(world: &mut EngineWorld, count: usize) {
    let reps = world.events.iter().filter(|e| matches!(e, AppEvent::Rep { .. })).count();
    assert_eq!(reps, count);
}

#[then("no exercise is active")]
async fn no_exercise(world: &mut EngineWorld) {
    assert!(world.app().session().is_none());
}

#[then(expr = "{word} is the active exercise")]
async fn active_exercise(world: &mut EngineWorld, exercise: String) {
    let kind: ExerciseKind = exercise.parse().expect("known exercise");
    assert_eq!(world.app().session().map(|s| s.kind()), Some(kind));
}

#[then(expr = "the anti-cheat reason {word} is raised")]
async fn anti_cheat_raised(world: &mut EngineWorld, code: String) {
    let raised = world
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::AntiCheat { reason, .. } if reason.code() == code));
    assert!(raised, "no {} event in {:?}", code, world.events);
}

#[then("an approval request is pending")]
async fn request_pending(world: &mut EngineWorld) {
    assert!(matches!(world.app().workflow_state(), WorkflowState::Pending { .. }));
    assert!(world.events.iter().any(|e| matches!(e, AppEvent::ApprovalSubmitted { .. })));
}

#[then(expr = "the engine learns the request was {word}")]
async fn engine_learns(world: &mut EngineWorld, status: String) {
    let expected: ApprovalStatus = status.parse().expect("known status");
    let event = world.next_approval_event().await;
    let events = world.app().handle_approval_event(event);
    assert!(
        events.iter().any(|e| matches!(e, AppEvent::ApprovalDecided { status, .. } if *status == expected)),
        "unexpected events: {:?}",
        events
    );
    assert_eq!(world.app().workflow_state().status(), expected);
    world.events.extend(events);
}

#[then(expr = "the report fails with {word}")]
async fn report_fails(world: &mut EngineWorld, kind: String) {
    let failed = world.events.iter().any(|e| matches!(e, AppEvent::Error { kind: k, .. } if *k == kind));
    assert!(failed, "no {} error in {:?}", kind, world.events);
}
