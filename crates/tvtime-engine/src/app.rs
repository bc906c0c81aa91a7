//! The engine context: owns every component and turns actions into events.
//!
//! All mutation happens through `&mut App` on the event loop task, so frames,
//! transcripts, manual actions and approval results never interleave. Nothing
//! here waits on the network; approval work runs in spawned tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};
use tvtime_common::{ApprovalStatus, Error, ExerciseKind, LandmarkFrame};
use url::Url;

use crate::anti_cheat::{AntiCheatGate, GateSignal};
use crate::approval::{
    ApprovalBackend, ApprovalEvent, ApprovalWorkflow, WorkflowChange, WorkflowState,
};
use crate::coach::{earned_cue, rep_cue, Coach, KnowledgeBase};
use crate::config::{AntiCheatConfig, EngineConfig, RatesConfig};
use crate::events::{AppAction, AppEvent};
use crate::exercise::{ExerciseSession, FeedbackUpdate};
use crate::ledger::TimeLedger;
use crate::store::LedgerStore;
use crate::voice::{VoiceCommand, VoiceDispatcher};

const RESET_PROMPT: &str = "Start a new day? This will clear your current time and history.";

pub struct App {
    child_name: String,
    anti_cheat: AntiCheatConfig,
    rates: RatesConfig,
    gate: AntiCheatGate,
    session: Option<ExerciseSession>,
    ledger: TimeLedger,
    workflow: ApprovalWorkflow,
    voice: VoiceDispatcher,
    coach: Coach,
    store: Option<LedgerStore>,
    reset_requested: bool,
}

impl App {
    pub fn new(
        config: &EngineConfig,
        ledger: TimeLedger,
        workflow: ApprovalWorkflow,
        store: Option<LedgerStore>,
    ) -> Self {
        Self {
            child_name: config.general.child_name.clone(),
            anti_cheat: config.anti_cheat.clone(),
            rates: config.rates.clone(),
            gate: AntiCheatGate::new(config.anti_cheat.clone()),
            session: None,
            ledger,
            workflow,
            voice: VoiceDispatcher::new(
                &config.voice.wake_word,
                Duration::from_secs(config.voice.command_timeout_secs),
            ),
            coach: Coach::new(Duration::from_secs(config.coach.cooldown_secs)),
            store,
            reset_requested: false,
        }
    }

    /// Restore the last ledger and approval state and resume polling if a
    /// request was pending when the engine stopped.
    pub async fn bootstrap(
        config: &EngineConfig,
        store: LedgerStore,
        backend: Arc<dyn ApprovalBackend>,
        approval_tx: mpsc::UnboundedSender<ApprovalEvent>,
        today: NaiveDate,
    ) -> Result<Self> {
        let decision_base = Url::parse(&config.approval.decision_base_url)
            .with_context(|| format!("Invalid decision_base_url: {}", config.approval.decision_base_url))?;
        let mut workflow = ApprovalWorkflow::new(
            backend,
            decision_base,
            config.approval.poll_interval(),
            approval_tx,
        );

        let cap = config.ledger.daily_cap_minutes;
        let policy = config.credit_policy.clone();
        let ledger = match store.load_latest_ledger().await? {
            Some(stored) => TimeLedger::restore(stored, cap, policy),
            None => TimeLedger::new(today, cap, policy),
        };
        if ledger.is_stale(today) {
            info!("Ledger from {} is kept until the day is reset", ledger.date());
        }

        let sync = store.load_sync_state().await?;
        workflow.resume(sync.pending_row_id, sync.status()?);

        Ok(Self::new(config, ledger, workflow, Some(store)))
    }

    pub fn ledger(&self) -> &TimeLedger {
        &self.ledger
    }

    pub fn session(&self) -> Option<&ExerciseSession> {
        self.session.as_ref()
    }

    pub fn workflow_state(&self) -> WorkflowState {
        self.workflow.state()
    }

    pub fn voice_deadline(&self) -> Option<Instant> {
        self.voice.deadline()
    }

    pub fn handle(
        &mut self,
        action: AppAction,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Vec<AppEvent> {
        match action {
            AppAction::Frame { landmarks } => {
                self.process_frame(&LandmarkFrame::new(landmarks), now, wall)
            }
            AppAction::Transcript { text, .. } => self.handle_transcript(&text, now, wall),
            AppAction::SelectMode { exercise } => self.select_mode(exercise, now),
            AppAction::BackToMenu => self.back_to_menu(now),
            AppAction::QueryEarned => self.query_earned(now),
            AppAction::Stats => vec![self.stats(wall)],
            AppAction::Ask { question } => vec![self.answer(&question)],
            AppAction::FinishAndReport => self.finish_and_report(),
            AppAction::CancelReport => self.cancel_report(),
            AppAction::ResetDay => self.request_reset_day(),
            AppAction::ConfirmResetDay => self.confirm_reset_day(wall),
            AppAction::CancelResetDay => {
                self.reset_requested = false;
                Vec::new()
            }
        }
    }

    /// Run one pose frame through the gate and the active exercise.
    pub fn process_frame(
        &mut self,
        frame: &LandmarkFrame,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Vec<AppEvent> {
        let mut events = Vec::new();
        let Some(session) = self.session.as_mut() else {
            return events;
        };

        let verdict = self.gate.admit(frame);
        match verdict.signal {
            Some(GateSignal::Violation(reason)) => events.push(AppEvent::AntiCheat {
                reason,
                message: reason.feedback().to_string(),
            }),
            Some(GateSignal::Cleared) => events.push(AppEvent::AntiCheatCleared),
            None => {}
        }
        if let Err(e) = verdict.into_result() {
            debug!("Frame rejected: {}", e);
            return events;
        }

        let outcome = match session.observe(frame) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Frame skipped: {}", e);
                return events;
            }
        };
        let kind = session.kind();
        let rate = session.rate();
        let stage = session.stage();

        match outcome.feedback {
            Some(FeedbackUpdate::Show(cue)) => {
                events.push(AppEvent::Feedback { text: Some(cue.to_string()) });
                if let Some(text) = self.coach.correction(cue, now) {
                    events.push(AppEvent::speak(text));
                }
            }
            Some(FeedbackUpdate::Clear) => events.push(AppEvent::Feedback { text: None }),
            None => {}
        }

        if let Some(rep) = outcome.rep {
            events.push(AppEvent::Rep { exercise: kind, count: rep.count, stage });
            events.push(AppEvent::speak(self.coach.priority(rep_cue(rep.count), now)));

            if rep.minute_earned {
                events.extend(self.accrue(kind, rate, now, wall));
            }
        }

        events
    }

    fn accrue(
        &mut self,
        kind: ExerciseKind,
        reps: u32,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Vec<AppEvent> {
        match self.ledger.accrue(1.0, kind, reps, wall) {
            Ok(accrual) => {
                if let Some(store) = &self.store {
                    store.save_ledger(&self.ledger);
                }
                vec![
                    AppEvent::MinuteEarned {
                        gain: accrual.gain,
                        earned: accrual.earned,
                        entry: accrual.entry,
                    },
                    AppEvent::speak(self.coach.priority("One minute earned!", now)),
                ]
            }
            Err(Error::LedgerCapExceeded { earned, cap, .. }) => vec![
                AppEvent::DailyLimitReached { earned, cap },
                AppEvent::speak(self.coach.priority("Daily limit reached.", now)),
            ],
            Err(e) => vec![AppEvent::error(&e)],
        }
    }

    pub fn select_mode(&mut self, kind: ExerciseKind, now: Instant) -> Vec<AppEvent> {
        let rate = self.rates.rate_for(kind);
        let session = ExerciseSession::new(kind, rate, self.anti_cheat.min_core_visibility);
        let id = session.id();

        self.gate.reset();
        self.session = Some(session);

        vec![
            AppEvent::ModeSelected { exercise: kind, session: id, rate },
            AppEvent::speak(
                self.coach.priority(format!("Selected {}. Let's go.", kind.label()), now),
            ),
        ]
    }

    fn end_session(&mut self) -> Option<AppEvent> {
        self.gate.reset();
        self.session.take().map(|session| {
            debug!(session = %session.id(), "Session ended at {} reps", session.rep_count());
            AppEvent::ModeCleared
        })
    }

    pub fn back_to_menu(&mut self, now: Instant) -> Vec<AppEvent> {
        let mut events: Vec<AppEvent> = self.end_session().into_iter().collect();
        events.push(AppEvent::speak(self.coach.priority("Stopped.", now)));
        events
    }

    pub fn query_earned(&mut self, now: Instant) -> Vec<AppEvent> {
        vec![AppEvent::speak(self.coach.priority(earned_cue(self.ledger.earned()), now))]
    }

    pub fn stats(&self, wall: DateTime<Local>) -> AppEvent {
        AppEvent::Stats {
            date: self.ledger.date(),
            stats: self.ledger.stats(),
            insight: self.ledger.insight(wall),
            stale: self.ledger.is_stale(wall.date_naive()),
        }
    }

    pub fn answer(&self, question: &str) -> AppEvent {
        let kb = KnowledgeBase {
            rates: &self.rates,
            policy: self.ledger.policy(),
            daily_cap: self.ledger.cap(),
        };
        AppEvent::Answer { text: kb.answer(question) }
    }

    /// Hand today's ledger to the approval workflow. The outcome arrives later
    /// through `handle_approval_event`.
    pub fn finish_and_report(&mut self) -> Vec<AppEvent> {
        let snapshot = self.ledger.snapshot(&self.child_name, Utc::now());
        let earned = snapshot.earned_minutes;

        match self.workflow.submit(snapshot) {
            Ok(()) => {
                let mut events: Vec<AppEvent> = self.end_session().into_iter().collect();
                events.push(AppEvent::ApprovalSubmitting { earned });
                events
            }
            Err(e) => vec![AppEvent::error(&e)],
        }
    }

    pub fn cancel_report(&mut self) -> Vec<AppEvent> {
        match self.workflow.cancel() {
            Ok(row_id) => {
                self.save_sync_state();
                vec![AppEvent::ApprovalCancelled { row_id }]
            }
            Err(e) => vec![AppEvent::error(&e)],
        }
    }

    fn save_sync_state(&self) {
        if let Some(store) = &self.store {
            let state = self.workflow.state();
            store.save_sync_state(self.ledger.earned(), state.row_id(), state.status());
        }
    }

    pub fn handle_approval_event(&mut self, event: ApprovalEvent) -> Vec<AppEvent> {
        match self.workflow.handle_event(event) {
            Some(WorkflowChange::Submitted { row_id, earned }) => {
                if let Some(store) = &self.store {
                    store.save_sync_state(earned, Some(row_id), ApprovalStatus::Pending);
                }
                vec![AppEvent::ApprovalSubmitted { row_id, earned }]
            }
            Some(WorkflowChange::SubmitFailed(failure)) => vec![AppEvent::error(&failure.into_error())],
            Some(WorkflowChange::Decided { row_id, status }) => {
                self.save_sync_state();
                vec![AppEvent::ApprovalDecided { row_id, status, earned: self.ledger.earned() }]
            }
            Some(WorkflowChange::AuthorizationLost { reason, .. }) => {
                self.save_sync_state();
                vec![AppEvent::error(&Error::AuthorizationFailure(reason))]
            }
            None => Vec::new(),
        }
    }

    pub fn request_reset_day(&mut self) -> Vec<AppEvent> {
        self.reset_requested = true;
        vec![AppEvent::ConfirmationRequired {
            action: "reset_day".to_string(),
            message: RESET_PROMPT.to_string(),
        }]
    }

    /// Start a fresh ledger for today. Only valid after `request_reset_day`.
    pub fn confirm_reset_day(&mut self, wall: DateTime<Local>) -> Vec<AppEvent> {
        if !self.reset_requested {
            let err = Error::ConfirmationRequired("Ask to reset the day before confirming".into());
            return vec![AppEvent::error(&err)];
        }
        self.reset_requested = false;

        let today = wall.date_naive();
        let mut events: Vec<AppEvent> = self.end_session().into_iter().collect();
        self.ledger.reset(today);
        self.workflow.reset();

        if let Some(store) = &self.store {
            store.save_ledger(&self.ledger);
            store.clear_sync_state();
        }

        events.push(AppEvent::DayReset { date: today });
        events.push(self.stats(wall));
        events
    }

    /// Close the voice window once its deadline has passed.
    pub fn expire_voice(&mut self, now: Instant) -> Vec<AppEvent> {
        if self.voice.expire(now) {
            vec![AppEvent::VoiceListening { active: false }]
        } else {
            Vec::new()
        }
    }

    pub fn handle_transcript(
        &mut self,
        text: &str,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Vec<AppEvent> {
        let was_listening = self.voice.is_listening();
        let result = self.voice.handle(text, now);
        let mut events = Vec::new();

        let lapsed = was_listening && !self.voice.is_listening() && result.command.is_none();
        if lapsed && !result.activated {
            events.push(AppEvent::VoiceListening { active: false });
        }

        if result.activated {
            events.push(AppEvent::VoiceListening { active: true });
            events.push(AppEvent::speak(self.coach.priority("Yes?", now)));
        }
        if result.reset_recognizer {
            events.push(AppEvent::ResetRecognizer);
        }

        if let Some(command) = result.command {
            events.push(AppEvent::VoiceListening { active: false });
            events.extend(self.run_voice_command(command, now, wall));
        }

        events
    }

    fn run_voice_command(
        &mut self,
        command: VoiceCommand,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Vec<AppEvent> {
        match command {
            VoiceCommand::Select(kind) => self.select_mode(kind, now),
            VoiceCommand::BackToMenu => self.back_to_menu(now),
            VoiceCommand::QueryEarned => self.query_earned(now),
            VoiceCommand::FinishAndReport => self.finish_and_report(),
            VoiceCommand::ResetDay => {
                debug!("Voice reset at {} needs confirmation", wall);
                self.request_reset_day()
            }
        }
    }
}
