//! Coaching evaluator.
//!
//! For each human move the engine analyses the position before and after it.
//! Both scores are turned into centipawns from the mover's point of view, so
//! `eval_before - eval_after` is what the move cost regardless of which side
//! the engine reports relative to.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use trainer_core::{
    from_engine_notation, rules, translate_line, Color, GameStatus, Move, Position, PositionStore,
    Revision, Side,
};
use uci_session::{EngineSession, Score, SearchOutcome, SessionError, SessionState};

use crate::config::CoachingSettings;
use crate::error::CoachError;

/// Centipawn value of mate delivered on the board.
pub const MATE_SCORE: i32 = 10_000;

/// Whose point of view the engine's raw scores are given from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreConvention {
    /// UCI default: positive is good for the side to move.
    #[default]
    SideToMove,
    /// Positive is good for White.
    White,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveQuality {
    Best,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveQuality {
    pub fn from_loss(loss: i32) -> Self {
        match loss {
            i32::MIN..=10 => MoveQuality::Best,
            11..=50 => MoveQuality::Good,
            51..=100 => MoveQuality::Inaccuracy,
            101..=300 => MoveQuality::Mistake,
            _ => MoveQuality::Blunder,
        }
    }
}

/// Mate scores saturate near [`MATE_SCORE`]; a quicker mate is worth more.
pub fn centipawns(score: Score) -> i32 {
    match score {
        Score::Centipawns(cp) => cp,
        Score::Mate(0) => -MATE_SCORE,
        Score::Mate(m) => {
            let magnitude = MATE_SCORE - 10 * m.abs().min(999);
            if m > 0 {
                magnitude
            } else {
                -magnitude
            }
        }
    }
}

/// Re-express a raw engine score for `scored` from `mover`'s point of view.
pub fn mover_relative(raw: i32, scored: &Position, mover: Color, convention: ScoreConvention) -> i32 {
    let for_white = match convention {
        ScoreConvention::White => raw,
        ScoreConvention::SideToMove if scored.turn() == Color::White => raw,
        ScoreConvention::SideToMove => -raw,
    };
    if mover == Color::White {
        for_white
    } else {
        -for_white
    }
}

/// The before/after pair for one move, captured when the move was made.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachingJob {
    /// Store revision right after the move.
    pub revision: Revision,
    pub mv: Move,
    pub before: Position,
    pub after: Position,
}

impl CoachingJob {
    /// Capture the job for the store's most recent move.
    pub fn capture(store: &PositionStore) -> Option<Self> {
        let positions = store.positions();
        let mv = store.record().last_move()?.clone();
        let [.., before, after] = positions else {
            return None;
        };
        Some(Self {
            revision: store.revision(),
            mv,
            before: before.clone(),
            after: after.clone(),
        })
    }

    pub fn mover(&self) -> Color {
        self.before.turn()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoachingEvaluation {
    pub revision: Revision,
    /// SAN of the evaluated move.
    pub mv: String,
    pub mover: Side,
    pub eval_before: i32,
    pub eval_after: i32,
    /// Engine's choice in the position before the move, as SAN.
    pub best_move: String,
    /// Engine's principal variation from the position before the move, as SAN.
    pub pv: Vec<String>,
    pub quality: MoveQuality,
}

impl CoachingEvaluation {
    /// Centipawns the move gave away.
    pub fn loss(&self) -> i32 {
        self.eval_before - self.eval_after
    }
}

/// Turns analysis results into evaluations.
#[derive(Debug, Clone)]
pub struct Evaluator {
    depth: u32,
    convention: ScoreConvention,
    busy_retries: u32,
}

impl Evaluator {
    pub fn new(settings: &CoachingSettings) -> Self {
        Self {
            depth: settings.depth,
            convention: settings.convention,
            busy_retries: settings.busy_retries,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn busy_retries(&self) -> u32 {
        self.busy_retries
    }

    pub fn convention(&self) -> ScoreConvention {
        self.convention
    }

    /// Run both analyses for `job` on `session`, one after the other.
    #[instrument(skip_all, fields(revision = %job.revision, mv = %job.mv))]
    pub async fn evaluate(
        &self,
        session: &EngineSession,
        job: CoachingJob,
    ) -> Result<CoachingEvaluation, CoachError> {
        let mut run = CoachingRun::new(job);
        loop {
            let position = run.pending_position().clone();
            let outcome = self.analyze(session, &position).await?;
            if let Some(done) = run.advance(self, outcome) {
                return done;
            }
        }
    }

    async fn analyze(
        &self,
        session: &EngineSession,
        position: &Position,
    ) -> Result<SearchOutcome, CoachError> {
        let mut rejections = 0;
        loop {
            match session.analyze(position, self.depth) {
                Ok(pending) => return Ok(pending.await?),
                Err(SessionError::EngineBusy) if rejections < self.busy_retries => {
                    rejections += 1;
                    debug!(rejections, "Engine busy; waiting for it to be ready");
                    let mut state = session.subscribe();
                    state
                        .wait_for(|s| matches!(s, SessionState::Ready | SessionState::Closed))
                        .await
                        .map_err(|_| SessionError::SessionClosed)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Build the evaluation from the `before` analysis and either the `after`
    /// analysis or, when the move ended the game, the final score.
    pub fn assess(
        &self,
        job: &CoachingJob,
        before: &SearchOutcome,
        after: AfterScore<'_>,
    ) -> Result<CoachingEvaluation, CoachError> {
        let mover = job.mover();
        let eval_before = mover_relative(raw_score(before, &job.before)?, &job.before, mover, self.convention);
        let eval_after = match after {
            AfterScore::Analysed(outcome) => {
                mover_relative(raw_score(outcome, &job.after)?, &job.after, mover, self.convention)
            }
            AfterScore::Final(score) => score,
        };

        let best = from_engine_notation(&before.best_move, &job.before)?;
        let pv = before
            .info
            .as_ref()
            .map(|info| translate_line(&info.pv, &job.before))
            .transpose()?
            .unwrap_or_default();

        let loss = eval_before - eval_after;
        let quality = if best.same_squares(&job.mv) {
            MoveQuality::Best
        } else {
            MoveQuality::from_loss(loss)
        };

        Ok(CoachingEvaluation {
            revision: job.revision,
            mv: job.mv.to_string(),
            mover: mover.into(),
            eval_before,
            eval_after,
            best_move: best.to_string(),
            pv: pv.iter().map(Move::to_string).collect(),
            quality,
        })
    }
}

/// Where the `after` half of an evaluation comes from.
#[derive(Debug, Clone, Copy)]
pub enum AfterScore<'a> {
    Analysed(&'a SearchOutcome),
    /// The move ended the game; mover-relative score of the final position.
    Final(i32),
}

fn raw_score(outcome: &SearchOutcome, position: &Position) -> Result<i32, CoachError> {
    outcome
        .info
        .as_ref()
        .and_then(|info| info.score)
        .map(centipawns)
        .ok_or_else(|| {
            warn!(request_id = outcome.request_id, fen = position.fen(), "Analysis carried no score");
            CoachError::NoScore {
                fen: position.fen().to_string(),
            }
        })
}

/// Mover-relative score when the position after the move has no legal replies.
fn final_score(after: &Position) -> Option<i32> {
    match rules::status(after, &[]) {
        GameStatus::Checkmate => Some(MATE_SCORE),
        GameStatus::Stalemate => Some(0),
        _ => None,
    }
}

/// An evaluation in progress: which position still needs analysing.
#[derive(Debug, Clone)]
pub struct CoachingRun {
    job: CoachingJob,
    before: Option<SearchOutcome>,
}

impl CoachingRun {
    pub fn new(job: CoachingJob) -> Self {
        Self { job, before: None }
    }

    pub fn job(&self) -> &CoachingJob {
        &self.job
    }

    /// Position the engine should analyse next.
    pub fn pending_position(&self) -> &Position {
        match self.before {
            None => &self.job.before,
            Some(_) => &self.job.after,
        }
    }

    /// Feed the result for [`Self::pending_position`]. Returns the finished
    /// evaluation once nothing more is needed from the engine.
    pub fn advance(
        &mut self,
        evaluator: &Evaluator,
        outcome: SearchOutcome,
    ) -> Option<Result<CoachingEvaluation, CoachError>> {
        match self.before.take() {
            None => {
                if let Some(score) = final_score(&self.job.after) {
                    return Some(evaluator.assess(&self.job, &outcome, AfterScore::Final(score)));
                }
                self.before = Some(outcome);
                None
            }
            Some(before) => Some(evaluator.assess(&self.job, &before, AfterScore::Analysed(&outcome))),
        }
    }
}

#[cfg(test)]
#[path = "coaching_tests.rs"]
mod coaching_tests;
