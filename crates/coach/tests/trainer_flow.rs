//! End-to-end trainer behaviour against a scripted engine.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use coach::{
    AdviceError, AdviceGenerator, AdviceRequest, CoachError, CoachingSettings, FaultSource,
    MoveQuality, Mover, PlaySettings, Trainer, TrainerConfig, TrainerEvent,
};
use common::{connect, next_event, next_fault, AFTER_E4, START_FEN};
use trainer_core::{Side, TranslateError};

fn config(auto_play: bool, coaching: bool) -> TrainerConfig {
    TrainerConfig {
        play: PlaySettings {
            auto_play,
            engine_side: Side::Black,
            skill: Some(10),
            movetime_ms: 1000,
        },
        coaching: CoachingSettings {
            enabled: coaching,
            depth: 12,
            ..CoachingSettings::default()
        },
        ..TrainerConfig::default()
    }
}

#[tokio::test]
async fn test_engine_answers_human_move() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(true, false)).spawn();

    let e4 = handle.play_move("e2e4").await.unwrap();
    assert_eq!(e4.san(), Some("e4"));
    assert!(matches!(
        next_event(&mut out).await,
        TrainerEvent::MoveApplied { by: Mover::Human, .. }
    ));
    assert!(matches!(next_event(&mut out).await, TrainerEvent::EngineThinking { .. }));

    engine.expect("setoption name Skill Level value 10").await;
    engine.expect(&format!("position fen {AFTER_E4}")).await;
    engine.expect("go movetime 1000").await;

    // The human may not move while the engine is thinking.
    assert_eq!(handle.play_move("d4").await.unwrap_err(), CoachError::NotYourTurn);

    engine.send(&["info depth 10 score cp -20 pv c7c5", "bestmove c7c5"]);
    match next_event(&mut out).await {
        TrainerEvent::MoveApplied { mv, by, revision, .. } => {
            assert_eq!(mv.san(), Some("c5"));
            assert_eq!(by, Mover::Engine);
            assert_eq!(revision.ply, 2);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.move_text, "1. e4 c5");
    handle.shutdown().unwrap();
    engine.expect("quit").await;
    out.task.await.unwrap();
}

#[tokio::test]
async fn test_engine_moves_first_when_playing_white() {
    let (session, mut engine) = connect().await;
    let mut config = config(true, false);
    config.play.engine_side = Side::White;
    config.play.skill = None;
    let (handle, mut out) = Trainer::new(session, config).spawn();

    engine.expect(&format!("position fen {START_FEN}")).await;
    engine.expect("go movetime 1000").await;
    assert!(matches!(next_event(&mut out).await, TrainerEvent::EngineThinking { .. }));
    engine.send(&["bestmove g1f3"]);

    match next_event(&mut out).await {
        TrainerEvent::MoveApplied { mv, .. } => assert_eq!(mv.san(), Some("Nf3")),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(handle.play_move("d5").await.unwrap().san(), Some("d5"));
}

#[tokio::test]
async fn test_disabled_auto_play_never_asks_engine() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(false, false)).spawn();

    handle.play_move("e4").await.unwrap();
    handle.play_move("e5").await.unwrap();
    handle.snapshot().await.unwrap();
    engine.assert_idle();

    // Switching it on while it is the engine's side to move does nothing
    // until black is to move.
    handle.set_auto_play(true).unwrap();
    handle.snapshot().await.unwrap();
    engine.assert_idle();

    handle.play_move("Nf3").await.unwrap();
    engine.expect("setoption name Skill Level value 10").await;
    let _ = next_event(&mut out).await;
}

#[tokio::test]
async fn test_coaching_evaluates_human_move() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(false, true)).spawn();

    handle.play_move("e4").await.unwrap();
    engine.expect(&format!("position fen {START_FEN}")).await;
    engine.expect("go depth 12").await;
    engine.send(&["info depth 12 score cp 30 pv e2e4 e7e5 g1f3", "bestmove e2e4 ponder e7e5"]);

    engine.expect(&format!("position fen {AFTER_E4}")).await;
    engine.expect("go depth 12").await;
    engine.send(&["info depth 12 score cp -25 pv e7e5", "bestmove e7e5"]);

    let _moved = next_event(&mut out).await;
    match next_event(&mut out).await {
        TrainerEvent::Evaluation(eval) => {
            assert_eq!(eval.mv, "e4");
            assert_eq!(eval.mover, Side::White);
            assert_eq!((eval.eval_before, eval.eval_after), (30, 25));
            assert_eq!(eval.best_move, "e4");
            assert_eq!(eval.pv, vec!["e4", "e5", "Nf3"]);
            assert_eq!(eval.quality, MoveQuality::Best);
            assert_eq!(eval.revision.ply, 1);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_engine_reply_goes_before_coaching() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(true, true)).spawn();

    handle.play_move("e4").await.unwrap();
    engine.expect("setoption name Skill Level value 10").await;
    engine.expect(&format!("position fen {AFTER_E4}")).await;
    engine.expect("go movetime 1000").await;
    engine.send(&["bestmove e7e5"]);

    // Only now is the human move analysed.
    engine.expect(&format!("position fen {START_FEN}")).await;
    engine.expect("go depth 12").await;

    let mut seen_engine_move = false;
    for _ in 0..3 {
        if let TrainerEvent::MoveApplied { by: Mover::Engine, .. } = next_event(&mut out).await {
            seen_engine_move = true;
        }
    }
    assert!(seen_engine_move);
}

#[tokio::test]
async fn test_reset_discards_inflight_evaluation() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(false, true)).spawn();

    handle.play_move("e4").await.unwrap();
    engine.expect(&format!("position fen {START_FEN}")).await;
    engine.expect("go depth 12").await;

    handle.reset().unwrap();
    engine.expect("stop").await;
    engine.send(&["info depth 8 score cp 30 pv e2e4", "bestmove e2e4"]);

    // The engine hears about the new game once the old search has drained.
    engine.expect("ucinewgame").await;
    engine.expect("isready").await;
    engine.send(&["readyok"]);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.revision.game, 1);
    assert_eq!(snapshot.revision.ply, 0);

    // The coaching job for the abandoned game never asks for its second half.
    handle.play_move("d4").await.unwrap();
    engine.expect(&format!("position fen {START_FEN}")).await;
    engine.expect("go depth 12").await;

    let mut events = Vec::new();
    while let Ok(event) = out.events.try_recv() {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(e, TrainerEvent::Reset { .. })));
    assert!(!events.iter().any(|e| matches!(e, TrainerEvent::Evaluation(_))));
}

struct CannedAdvice;

#[async_trait]
impl AdviceGenerator for CannedAdvice {
    async fn advise(&self, request: &AdviceRequest) -> Result<String, AdviceError> {
        Ok(format!("{} was fine; {} was the engine's pick", request.last_move, request.best_move))
    }
}

#[tokio::test]
async fn test_advice_follows_evaluation() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(false, true))
        .with_advice(Arc::new(CannedAdvice))
        .spawn();

    handle.play_move("e4").await.unwrap();
    engine.expect(&format!("position fen {START_FEN}")).await;
    engine.expect("go depth 12").await;
    engine.send(&["info depth 12 score cp 30 pv d2d4", "bestmove d2d4"]);
    engine.expect(&format!("position fen {AFTER_E4}")).await;
    engine.expect("go depth 12").await;
    engine.send(&["info depth 12 score cp -20", "bestmove c7c5"]);

    let mut advice = None;
    for _ in 0..3 {
        if let TrainerEvent::Advice { text, mv, .. } = next_event(&mut out).await {
            assert_eq!(mv, "e4");
            advice = Some(text);
        }
    }
    assert_eq!(advice.as_deref(), Some("e4 was fine; d4 was the engine's pick"));
}

#[tokio::test]
async fn test_failures_arrive_on_fault_channel() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(true, false)).spawn();

    handle.play_move("e4").await.unwrap();
    engine.expect("setoption name Skill Level value 10").await;
    engine.expect(&format!("position fen {AFTER_E4}")).await;
    engine.expect("go movetime 1000").await;
    // White's move while black is to move cannot be resolved.
    engine.send(&["bestmove e2e4"]);

    let fault = next_fault(&mut out).await;
    assert_eq!(fault.source, FaultSource::AutoPlay);
    assert!(matches!(
        fault.error,
        CoachError::Translate(TranslateError::Unresolved { .. })
    ));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.revision.ply, 1);
    // The stuck side is surfaced, not retried.
    engine.assert_idle();
}

#[tokio::test]
async fn test_manual_analysis_reports_white_relative_score() {
    let (session, mut engine) = connect().await;
    let (handle, mut out) = Trainer::new(session, config(false, false)).spawn();

    handle.play_move("e4").await.unwrap();
    let _moved = next_event(&mut out).await;
    handle.analyze().unwrap();
    engine.expect(&format!("position fen {AFTER_E4}")).await;
    engine.expect("go depth 12").await;
    engine.send(&["info depth 12 score cp -35 pv c7c5 g1f3", "bestmove c7c5"]);

    match next_event(&mut out).await {
        TrainerEvent::Analysis { best_move, score, pv, fen, depth } => {
            assert_eq!(fen, AFTER_E4);
            assert_eq!(best_move, "c5");
            assert_eq!(score, Some(35));
            assert_eq!(depth, Some(12));
            assert_eq!(pv, vec!["c5", "Nf3"]);
        }
        other => panic!("unexpected event {other:?}"),
    }
}
