use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use cucumber::World;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tvtime_common::{Landmark, LandmarkFrame, PoseLandmark, LANDMARK_COUNT};
use tvtime_db::{Database, DatabaseConfig};
use tvtime_engine::approval::{ApprovalWorkflow, ApprovalEvent, SheetBackend};
use tvtime_engine::ledger::TimeLedger;
use tvtime_engine::{App, AppEvent, EngineConfig};
use url::Url;

/// BDD world holding one engine context backed by a throwaway approval sheet.
#[derive(World)]
#[world(init = Self::new)]
pub struct EngineWorld {
    pub dir: Option<TempDir>,
    pub sheet: Option<Database>,
    pub app: Option<App>,
    pub approval_rx: Option<mpsc::UnboundedReceiver<ApprovalEvent>>,

    /// Every event emitted during the scenario, in order
    pub events: Vec<AppEvent>,

    /// Frame counter used to keep the head moving between frames
    pub tick: usize,
}

impl fmt::Debug for EngineWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineWorld")
            .field("started", &self.app.is_some())
            .field("events", &self.events.len())
            .field("tick", &self.tick)
            .finish()
    }
}

impl EngineWorld {
    pub fn new() -> Self {
        Self { dir: None, sheet: None, app: None, approval_rx: None, events: Vec::new(), tick: 0 }
    }

    /// Start a fresh engine with an empty ledger for today.
    pub async fn start(&mut self, daily_cap: f64) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sheet.db").to_string_lossy().to_string();
        let sheet = Database::open(DatabaseConfig { path }).await.expect("sheet database");

        let mut config = EngineConfig::default();
        config.general.child_name = "Sam".to_string();
        config.ledger.daily_cap_minutes = daily_cap;

        let (tx, rx) = mpsc::unbounded_channel();
        let workflow = ApprovalWorkflow::new(
            Arc::new(SheetBackend::new(sheet.clone())),
            Url::parse("http://127.0.0.1:8787/").expect("decision url"),
            Duration::from_millis(20),
            tx,
        );
        let ledger = TimeLedger::new(Local::now().date_naive(), daily_cap, config.credit_policy.clone());

        self.app = Some(App::new(&config, ledger, workflow, None));
        self.sheet = Some(sheet);
        self.approval_rx = Some(rx);
        self.dir = Some(dir);
        self.events.clear();
    }

    pub fn app(&mut self) -> &mut App {
        self.app.as_mut().expect("engine not started")
    }

    pub fn wall() -> DateTime<Local> {
        Local::now()
    }

    /// Feed one frame and record what came out.
    pub fn frame(&mut self, frame: LandmarkFrame) {
        let events = self.app().process_frame(&frame, Instant::now(), Self::wall());
        self.events.extend(events);
    }

    /// Left-arm pushup pose at `elbow_angle` degrees. `moving` jitters the head.
    pub fn pushup_pose(&mut self, elbow_angle: f32, moving: bool) -> LandmarkFrame {
        self.tick += 1;
        let mut lm = vec![Landmark::new(0.5, 0.5, 0.99); LANDMARK_COUNT];
        let nose_y = if moving { 0.1 + 0.01 * (self.tick % 3) as f32 } else { 0.1 };
        lm[PoseLandmark::Nose.index()] = Landmark::new(0.5, nose_y, 0.99);
        lm[PoseLandmark::LeftShoulder.index()] = Landmark::new(0.3, 0.4, 0.99);
        lm[PoseLandmark::LeftElbow.index()] = Landmark::new(0.4, 0.4, 0.99);
        let theta = (180.0 - elbow_angle).to_radians();
        lm[PoseLandmark::LeftWrist.index()] =
            Landmark::new(0.4 + 0.1 * theta.cos(), 0.4 + 0.1 * theta.sin(), 0.99);
        lm[PoseLandmark::LeftHip.index()] = Landmark::new(0.46, 0.5, 0.99);
        LandmarkFrame::new(lm)
    }

    /// Record `events`; when they start a report, wait for its delivery too.
    pub async fn record(&mut self, events: Vec<AppEvent>) {
        let submitting = events.iter().any(|e| matches!(e, AppEvent::ApprovalSubmitting { .. }));
        self.events.extend(events);
        if submitting {
            let event = self.next_approval_event().await;
            let events = self.app().handle_approval_event(event);
            self.events.extend(events);
        }
    }

    pub async fn next_approval_event(&mut self) -> ApprovalEvent {
        let rx = self.approval_rx.as_mut().expect("approval channel");
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("approval task reported in time")
            .expect("approval channel open")
    }

    pub fn spoken(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Speak { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Default for EngineWorld {
    fn default() -> Self {
        Self::new()
    }
}
