//! Trainer event loop.
//!
//! One task owns the [`PositionStore`] and is the only issuer of engine
//! requests. Human commands, engine replies, advice replies and session state
//! changes all arrive as [`Message`]s and are handled in order. After each
//! message the loop decides what the engine should do next, in priority
//! order: the engine's own move, a manual analysis, then queued coaching.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trainer_core::{
    from_engine_notation, parse_human_move, translate_line, Color, GameStatus, Move, Position,
    PositionStore, Revision, Side,
};
use uci_session::{EngineSession, Pending, RequestId, SearchOutcome, SessionError, SessionState};

use crate::advice::{AdviceGenerator, AdviceRequest};
use crate::autoplay::AutoPlay;
use crate::coaching::{centipawns, mover_relative, CoachingEvaluation, CoachingJob, CoachingRun, Evaluator};
use crate::config::TrainerConfig;
use crate::error::{AdviceError, CoachError};
use crate::events::{Fault, FaultSource, Mover, TrainerEvent};

/// Read-only view of the game, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub revision: Revision,
    pub fen: String,
    pub status: GameStatus,
    pub winner: Option<Side>,
    pub move_text: String,
    pub auto_play: bool,
    pub engine_side: Side,
}

enum Message {
    HumanMove {
        text: String,
        reply: oneshot::Sender<Result<Move, CoachError>>,
    },
    Reset,
    SetAutoPlay(bool),
    Analyze,
    Stop,
    Snapshot(oneshot::Sender<GameSnapshot>),
    Shutdown,
    EngineState(SessionState),
    EngineReply {
        id: RequestId,
        result: Result<SearchOutcome, SessionError>,
    },
    AdviceReady {
        revision: Revision,
        mv: String,
        result: Result<String, AdviceError>,
    },
}

/// Engine work the loop is waiting on.
enum Work {
    AutoPlay(Revision),
    Coaching,
    Analysis(Position),
}

struct InFlight {
    id: RequestId,
    work: Work,
}

/// Cloneable handle for sending commands to a running trainer.
#[derive(Clone)]
pub struct TrainerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl TrainerHandle {
    fn send(&self, message: Message) -> Result<(), CoachError> {
        self.tx.send(message).map_err(|_| CoachError::TrainerStopped)
    }

    /// Play a human move given in coordinates or SAN.
    pub async fn play_move(&self, text: &str) -> Result<Move, CoachError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::HumanMove {
            text: text.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| CoachError::TrainerStopped)?
    }

    pub fn reset(&self) -> Result<(), CoachError> {
        self.send(Message::Reset)
    }

    pub fn set_auto_play(&self, enabled: bool) -> Result<(), CoachError> {
        self.send(Message::SetAutoPlay(enabled))
    }

    /// Analyse the current position once the engine is free.
    pub fn analyze(&self) -> Result<(), CoachError> {
        self.send(Message::Analyze)
    }

    pub fn stop(&self) -> Result<(), CoachError> {
        self.send(Message::Stop)
    }

    pub async fn snapshot(&self) -> Result<GameSnapshot, CoachError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Snapshot(reply))?;
        rx.await.map_err(|_| CoachError::TrainerStopped)
    }

    /// Shut the engine session down and end the loop.
    pub fn shutdown(&self) -> Result<(), CoachError> {
        self.send(Message::Shutdown)
    }
}

/// Receiving ends of a spawned trainer.
pub struct TrainerOutputs {
    pub events: mpsc::UnboundedReceiver<TrainerEvent>,
    pub faults: mpsc::UnboundedReceiver<Fault>,
    pub task: JoinHandle<()>,
}

/// Configures and starts the trainer loop.
pub struct Trainer {
    session: EngineSession,
    store: PositionStore,
    config: TrainerConfig,
    advice: Option<Arc<dyn AdviceGenerator>>,
}

impl Trainer {
    pub fn new(session: EngineSession, config: TrainerConfig) -> Self {
        Self {
            session,
            store: PositionStore::new(),
            config,
            advice: None,
        }
    }

    /// Start from an existing store instead of the standard position.
    pub fn with_store(mut self, store: PositionStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_advice(mut self, advice: Arc<dyn AdviceGenerator>) -> Self {
        self.advice = Some(advice);
        self
    }

    pub fn spawn(self) -> (TrainerHandle, TrainerOutputs) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (faults, faults_rx) = mpsc::unbounded_channel();

        forward_session_state(&self.session, tx.clone());

        let event_loop = EventLoop {
            autoplay: AutoPlay::new(&self.config.play),
            evaluator: Evaluator::new(&self.config.coaching),
            coaching_enabled: self.config.coaching.enabled,
            session: self.session,
            store: self.store,
            advice: self.advice,
            coaching_queue: VecDeque::new(),
            coaching: None,
            busy_rejections: 0,
            analysis_requested: false,
            new_game_pending: false,
            in_flight: None,
            tx: tx.clone(),
            events,
            faults,
        };
        let task = tokio::spawn(event_loop.run(rx));

        (
            TrainerHandle { tx },
            TrainerOutputs {
                events: events_rx,
                faults: faults_rx,
                task,
            },
        )
    }
}

fn forward_session_state(session: &EngineSession, tx: mpsc::UnboundedSender<Message>) {
    let mut state = session.subscribe();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            if tx.send(Message::EngineState(current)).is_err() {
                break;
            }
        }
    });
}

struct EventLoop {
    session: EngineSession,
    store: PositionStore,
    autoplay: AutoPlay,
    evaluator: Evaluator,
    coaching_enabled: bool,
    coaching_queue: VecDeque<CoachingJob>,
    coaching: Option<CoachingRun>,
    busy_rejections: u32,
    analysis_requested: bool,
    /// A reset happened while the engine was busy; tell it on the next `Ready`.
    new_game_pending: bool,
    advice: Option<Arc<dyn AdviceGenerator>>,
    in_flight: Option<InFlight>,
    tx: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedSender<TrainerEvent>,
    faults: mpsc::UnboundedSender<Fault>,
}

impl EventLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        info!(
            engine_side = %self.autoplay.engine_side(),
            auto_play = self.autoplay.is_enabled(),
            "Trainer started"
        );
        self.schedule();
        while let Some(message) = rx.recv().await {
            if !self.handle(message) {
                break;
            }
            self.schedule();
        }
        info!("Trainer stopped");
    }

    /// Returns `false` when the loop should end.
    fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::HumanMove { text, reply } => {
                let result = self.human_move(&text);
                let _ = reply.send(result);
            }
            Message::Reset => self.reset(),
            Message::SetAutoPlay(enabled) => {
                self.autoplay.set_enabled(enabled);
                self.emit(TrainerEvent::AutoPlay { enabled });
            }
            Message::Analyze => self.analysis_requested = true,
            Message::Stop => {
                if let Err(e) = self.session.stop() {
                    debug!(error = %e, "Nothing to stop");
                }
            }
            Message::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Message::Shutdown => {
                self.session.shutdown();
                return false;
            }
            Message::EngineState(state) => {
                debug!(%state, "Engine session state changed");
                if state == SessionState::Closed {
                    error!("Engine session closed; engine features unavailable");
                }
            }
            Message::EngineReply { id, result } => self.engine_reply(id, result),
            Message::AdviceReady { revision, mv, result } => {
                if revision.game != self.store.revision().game {
                    debug!(%revision, "Advice for a previous game dropped");
                    return true;
                }
                match result {
                    Ok(text) => self.emit(TrainerEvent::Advice { revision, mv, text }),
                    Err(e) => self.fault(FaultSource::Advice, e.into()),
                }
            }
        }
        true
    }

    fn human_move(&mut self, text: &str) -> Result<Move, CoachError> {
        if self.autoplay.engine_to_move(&self.store) {
            return Err(CoachError::NotYourTurn);
        }
        let mv = parse_human_move(text, self.store.current_position())?;
        self.store.apply_move(&mv)?;
        let applied = self.store.record().last_move().cloned().unwrap_or(mv);
        self.after_move(&applied, Mover::Human);

        if self.coaching_enabled {
            if let Some(job) = CoachingJob::capture(&self.store) {
                self.coaching_queue.push_back(job);
            }
        }
        Ok(applied)
    }

    fn after_move(&mut self, mv: &Move, by: Mover) {
        self.emit(TrainerEvent::MoveApplied {
            revision: self.store.revision(),
            mv: mv.clone(),
            by,
            fen: self.store.current_position().fen().to_string(),
        });
        let record = self.store.record();
        if record.status().is_over() {
            let event = TrainerEvent::GameOver {
                status: record.status(),
                winner: record.winner().map(Side::from),
            };
            self.emit(event);
        }
    }

    fn reset(&mut self) {
        self.store.reset();
        self.coaching_queue.clear();
        self.coaching = None;
        self.busy_rejections = 0;
        self.analysis_requested = false;

        if self.in_flight.is_some() {
            // The reply still arrives and is dropped by revision.
            let _ = self.session.stop();
            self.new_game_pending = true;
        } else {
            self.announce_new_game();
        }
        self.emit(TrainerEvent::Reset {
            revision: self.store.revision(),
        });
    }

    fn announce_new_game(&mut self) {
        self.new_game_pending = false;
        if let Err(e) = self.session.new_game() {
            debug!(error = %e, "Engine not told about the new game");
        }
    }

    fn snapshot(&self) -> GameSnapshot {
        let record = self.store.record();
        GameSnapshot {
            revision: self.store.revision(),
            fen: self.store.current_position().fen().to_string(),
            status: record.status(),
            winner: record.winner().map(Side::from),
            move_text: record.move_text(self.store.positions()[0].ply_count()),
            auto_play: self.autoplay.is_enabled(),
            engine_side: self.autoplay.engine_side(),
        }
    }

    /// Start the next piece of engine work if the engine is free.
    fn schedule(&mut self) {
        if self.in_flight.is_some() || self.session.state() != SessionState::Ready {
            return;
        }
        if self.new_game_pending {
            self.announce_new_game();
        }

        match self.autoplay.trigger(&self.session, &self.store) {
            Ok(Some((revision, pending))) => {
                self.emit(TrainerEvent::EngineThinking { revision });
                self.await_reply(pending, Work::AutoPlay(revision));
                return;
            }
            Ok(None) => {}
            Err(e) => {
                self.fault(FaultSource::AutoPlay, e);
                return;
            }
        }

        if std::mem::take(&mut self.analysis_requested) {
            let position = self.store.current_position().clone();
            match self.session.analyze(&position, self.evaluator.depth()) {
                Ok(pending) => {
                    self.await_reply(pending, Work::Analysis(position));
                    return;
                }
                Err(e) => self.fault(FaultSource::Analysis, e.into()),
            }
        }

        if self.coaching.is_none() {
            self.coaching = self.coaching_queue.pop_front().map(CoachingRun::new);
        }
        let Some(run) = &self.coaching else {
            return;
        };
        match self.session.analyze(run.pending_position(), self.evaluator.depth()) {
            Ok(pending) => {
                self.busy_rejections = 0;
                self.await_reply(pending, Work::Coaching);
            }
            Err(SessionError::EngineBusy) if self.busy_rejections < self.evaluator.busy_retries() => {
                self.busy_rejections += 1;
            }
            Err(e) => {
                self.coaching = None;
                self.busy_rejections = 0;
                self.fault(FaultSource::Coaching, e.into());
            }
        }
    }

    fn await_reply(&mut self, pending: Pending, work: Work) {
        let id = pending.id();
        self.in_flight = Some(InFlight { id, work });
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = tx.send(Message::EngineReply { id, result });
        });
    }

    fn engine_reply(&mut self, id: RequestId, result: Result<SearchOutcome, SessionError>) {
        let work = match self.in_flight.take() {
            Some(flight) if flight.id == id => flight.work,
            other => {
                warn!(request_id = id, "Reply for unknown request dropped");
                self.in_flight = other;
                return;
            }
        };

        match work {
            Work::AutoPlay(revision) => match self.autoplay.complete(&mut self.store, revision, result) {
                Ok(Some(mv)) => self.after_move(&mv, Mover::Engine),
                Ok(None) => {}
                Err(e) => self.fault(FaultSource::AutoPlay, e),
            },
            Work::Coaching => self.coaching_reply(result),
            Work::Analysis(position) => match self.analysis_event(&position, result) {
                Ok(event) => self.emit(event),
                Err(e) => self.fault(FaultSource::Analysis, e),
            },
        }
    }

    fn coaching_reply(&mut self, result: Result<SearchOutcome, SessionError>) {
        let Some(mut run) = self.coaching.take() else {
            debug!("Analysis for an abandoned coaching job dropped");
            return;
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return self.fault(FaultSource::Coaching, e.into()),
        };
        match run.advance(&self.evaluator, outcome) {
            None => self.coaching = Some(run),
            Some(Ok(evaluation)) => self.deliver(evaluation),
            Some(Err(e)) => self.fault(FaultSource::Coaching, e),
        }
    }

    /// Emit a finished evaluation as a record of the move it belongs to.
    fn deliver(&mut self, evaluation: CoachingEvaluation) {
        if evaluation.revision.game != self.store.revision().game {
            debug!(revision = %evaluation.revision, "Evaluation for a previous game dropped");
            return;
        }
        if let Some(advice) = &self.advice {
            let advice = Arc::clone(advice);
            let request = AdviceRequest::from(&evaluation);
            let revision = evaluation.revision;
            let mv = evaluation.mv.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result = advice.advise(&request).await;
                let _ = tx.send(Message::AdviceReady { revision, mv, result });
            });
        }
        self.emit(TrainerEvent::Evaluation(evaluation));
    }

    fn analysis_event(
        &self,
        position: &Position,
        result: Result<SearchOutcome, SessionError>,
    ) -> Result<TrainerEvent, CoachError> {
        let outcome = result?;
        let best = from_engine_notation(&outcome.best_move, position)?;
        let info = outcome.info.unwrap_or_default();
        let pv = translate_line(&info.pv, position)?;
        Ok(TrainerEvent::Analysis {
            fen: position.fen().to_string(),
            best_move: best.to_string(),
            score: info.score.map(|score| {
                mover_relative(centipawns(score), position, Color::White, self.evaluator.convention())
            }),
            depth: info.depth,
            pv: pv.iter().map(Move::to_string).collect(),
        })
    }

    fn emit(&self, event: TrainerEvent) {
        let _ = self.events.send(event);
    }

    fn fault(&self, source: FaultSource, error: CoachError) {
        warn!(%source, %error, "Trainer fault");
        let _ = self.faults.send(Fault { source, error });
    }
}
