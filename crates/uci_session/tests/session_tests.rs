//! Session behaviour against a scripted engine on the far end of a line channel.

use std::time::Duration;

use trainer_core::Position;
use uci_session::{
    EngineSession, LineChannel, Score, SessionConfig, SessionError, SessionState,
};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn quiet_config() -> SessionConfig {
    SessionConfig {
        options: Vec::new(),
        ..SessionConfig::default()
    }
}

async fn expect(engine: &mut LineChannel, line: &str) {
    assert_eq!(engine.rx.recv().await.as_deref(), Some(line));
}

fn reply(engine: &LineChannel, lines: &[&str]) {
    for line in lines {
        engine.tx.send(line.to_string()).unwrap();
    }
}

async fn connect_with(config: SessionConfig) -> (EngineSession, LineChannel) {
    let (client, mut engine) = LineChannel::pair();
    let connecting = tokio::spawn(EngineSession::connect(client, config.clone()));

    expect(&mut engine, "uci").await;
    reply(&engine, &["id name Scripted", "id author Tests", "uciok"]);
    for (name, value) in &config.options {
        expect(&mut engine, &format!("setoption name {name} value {value}")).await;
    }
    expect(&mut engine, "isready").await;
    reply(&engine, &["readyok"]);

    let session = connecting.await.unwrap().unwrap();
    (session, engine)
}

async fn connect() -> (EngineSession, LineChannel) {
    connect_with(quiet_config()).await
}

async fn wait_for_state(session: &EngineSession, state: SessionState) {
    let mut rx = session.subscribe();
    rx.wait_for(|s| *s == state).await.unwrap();
}

#[tokio::test]
async fn test_handshake_sends_configured_options() {
    let (session, _engine) = connect_with(SessionConfig::default()).await;
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let (client, mut engine) = LineChannel::pair();
    let connecting = tokio::spawn(EngineSession::connect(client, quiet_config()));
    expect(&mut engine, "uci").await;

    let result = connecting.await.unwrap();
    assert_eq!(
        result.unwrap_err(),
        SessionError::HandshakeTimeout(Duration::from_secs(5))
    );
    expect(&mut engine, "quit").await;
}

#[tokio::test]
async fn test_analyze_keeps_last_scored_info() {
    let (session, mut engine) = connect().await;
    let position = Position::startpos();

    let pending = session.analyze(&position, 12).unwrap();
    assert_eq!(session.state(), SessionState::Busy);
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 12").await;

    reply(
        &engine,
        &[
            "info depth 11 score cp 20 pv e2e4 e7e5",
            "info depth 12 score cp 31 nodes 4000 pv d2d4 d7d5 c2c4",
            "info depth 12 currmove g1f3 currmovenumber 3",
            "bestmove d2d4 ponder d7d5",
        ],
    );

    let outcome = pending.await.unwrap();
    assert_eq!(outcome.best_move, "d2d4");
    assert_eq!(outcome.ponder.as_deref(), Some("d7d5"));
    let info = outcome.info.unwrap();
    assert_eq!(info.score, Some(Score::Centipawns(31)));
    assert_eq!(info.pv, vec!["d2d4", "d7d5", "c2c4"]);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_play_sends_skill_and_movetime() {
    let (session, mut engine) = connect().await;
    let position = Position::startpos();

    let pending = session
        .play(&position, Some(7), Duration::from_millis(750))
        .unwrap();
    expect(&mut engine, "setoption name Skill Level value 7").await;
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go movetime 750").await;

    reply(&engine, &["bestmove g1f3"]);
    let outcome = pending.await.unwrap();
    assert_eq!(outcome.best_move, "g1f3");
    assert_eq!(outcome.info, None);
}

#[tokio::test]
async fn test_oversized_movetime_saturates() {
    let (session, mut engine) = connect().await;

    let pending = session
        .play(&Position::startpos(), None, Duration::from_secs(u64::MAX))
        .unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, &format!("go movetime {}", u64::MAX)).await;

    reply(&engine, &["bestmove e2e4"]);
    assert_eq!(pending.await.unwrap().best_move, "e2e4");
}

#[tokio::test]
async fn test_second_request_rejected_while_busy() {
    let (session, mut engine) = connect().await;
    let position = Position::startpos();

    let first = session.analyze(&position, 8).unwrap();
    let first_id = first.id();
    assert_eq!(
        session.play(&position, None, Duration::from_millis(100)).unwrap_err(),
        SessionError::EngineBusy
    );
    assert_eq!(session.new_game().unwrap_err(), SessionError::EngineBusy);

    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 8").await;
    reply(&engine, &["bestmove e2e4"]);

    let outcome = first.await.unwrap();
    assert_eq!(outcome.request_id, first_id);
    assert_eq!(outcome.best_move, "e2e4");

    // Nothing from the rejected request reached the engine.
    let second = session.analyze(&position, 2).unwrap();
    assert!(second.id() > outcome.request_id);
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 2").await;
}

#[tokio::test]
async fn test_stop_settles_with_partial_result() {
    let (session, mut engine) = connect().await;
    let position = Position::startpos();

    assert_eq!(session.stop().unwrap_err(), SessionError::NotBusy);

    let pending = session.analyze(&position, 30).unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 30").await;
    reply(&engine, &["info depth 9 score cp 15 pv e2e4"]);

    session.stop().unwrap();
    // A second stop is accepted but not resent.
    session.stop().unwrap();
    expect(&mut engine, "stop").await;
    reply(&engine, &["bestmove e2e4"]);

    let outcome = pending.await.unwrap();
    assert_eq!(outcome.best_move, "e2e4");
    assert_eq!(outcome.info.unwrap().depth, Some(9));
}

#[tokio::test]
async fn test_stop_without_move_is_cancelled() {
    let (session, mut engine) = connect().await;
    let pending = session.analyze(&Position::startpos(), 30).unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 30").await;

    session.stop().unwrap();
    expect(&mut engine, "stop").await;
    reply(&engine, &["bestmove (none)"]);
    assert_eq!(pending.await.unwrap_err(), SessionError::Cancelled);
}

#[tokio::test]
async fn test_no_legal_move_reported() {
    let (session, mut engine) = connect().await;
    let mated = Position::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3").unwrap();
    let pending = session.analyze(&mated, 5).unwrap();
    expect(&mut engine, &format!("position fen {}", mated.fen())).await;
    expect(&mut engine, "go depth 5").await;

    reply(&engine, &["info depth 0 score mate 0", "bestmove (none)"]);
    assert_eq!(pending.await.unwrap_err(), SessionError::NoBestMove);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_malformed_and_stray_lines_are_dropped() {
    let (session, mut engine) = connect().await;

    // Nothing in flight: stray output is ignored.
    reply(&engine, &["bestmove e2e4", "info depth 3 score cp 1"]);

    let pending = session.analyze(&Position::startpos(), 4).unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 4").await;
    reply(
        &engine,
        &[
            "Stockfish 16 by the Stockfish developers",
            "info depth four",
            "bestmove",
            "",
            "info depth 4 score cp -12 pv g1f3",
            "bestmove g1f3",
        ],
    );

    let outcome = pending.await.unwrap();
    assert_eq!(outcome.best_move, "g1f3");
    assert_eq!(outcome.info.unwrap().score, Some(Score::Centipawns(-12)));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_response_is_discarded() {
    let (session, mut engine) = connect().await;
    let position = Position::startpos();

    let pending = session.analyze(&position, 40).unwrap();
    let timed_out_id = pending.id();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 40").await;

    assert_eq!(
        pending.await.unwrap_err(),
        SessionError::EngineTimeout {
            request_id: timed_out_id,
            after: Duration::from_secs(10),
        }
    );
    expect(&mut engine, "stop").await;

    // Still draining the late answer.
    assert_eq!(session.state(), SessionState::Busy);
    assert_eq!(
        session.analyze(&position, 1).unwrap_err(),
        SessionError::EngineBusy
    );

    reply(&engine, &["info depth 40 score cp 99", "bestmove a2a3"]);
    wait_for_state(&session, SessionState::Ready).await;

    let second = session.analyze(&position, 2).unwrap();
    assert_ne!(second.id(), timed_out_id);
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 2").await;
    reply(&engine, &["bestmove e2e4"]);

    let outcome = second.await.unwrap();
    assert_eq!(outcome.best_move, "e2e4");
    assert_eq!(outcome.info, None);
}

#[tokio::test(start_paused = true)]
async fn test_engine_ignoring_stop_is_resynced() {
    let (session, mut engine) = connect().await;
    let pending = session
        .play(&Position::startpos(), None, Duration::from_millis(200))
        .unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go movetime 200").await;

    assert!(matches!(
        pending.await,
        Err(SessionError::EngineTimeout { after, .. }) if after == Duration::from_secs(15)
    ));
    expect(&mut engine, "stop").await;
    expect(&mut engine, "isready").await;
    assert_eq!(session.state(), SessionState::Busy);

    reply(&engine, &["readyok"]);
    wait_for_state(&session, SessionState::Ready).await;
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_engine_closes_session() {
    let (session, mut engine) = connect().await;
    let pending = session.analyze(&Position::startpos(), 10).unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 10").await;

    assert!(matches!(pending.await, Err(SessionError::EngineTimeout { .. })));
    expect(&mut engine, "stop").await;
    expect(&mut engine, "isready").await;
    expect(&mut engine, "quit").await;

    wait_for_state(&session, SessionState::Closed).await;
    assert_eq!(
        session.analyze(&Position::startpos(), 1).unwrap_err(),
        SessionError::SessionClosed
    );
}

#[tokio::test]
async fn test_shutdown_fails_pending_request() {
    let (session, mut engine) = connect().await;
    let pending = session.analyze(&Position::startpos(), 20).unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 20").await;

    session.shutdown();
    expect(&mut engine, "quit").await;
    assert_eq!(engine.rx.recv().await, None);

    assert_eq!(pending.await.unwrap_err(), SessionError::SessionClosed);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.stop().unwrap_err(), SessionError::SessionClosed);
    assert_eq!(
        session
            .play(&Position::startpos(), None, Duration::from_millis(10))
            .unwrap_err(),
        SessionError::SessionClosed
    );
}

#[tokio::test]
async fn test_engine_exit_closes_session() {
    let (session, mut engine) = connect().await;
    let pending = session.analyze(&Position::startpos(), 20).unwrap();
    expect(&mut engine, &format!("position fen {START_FEN}")).await;
    expect(&mut engine, "go depth 20").await;

    drop(engine);
    assert_eq!(pending.await.unwrap_err(), SessionError::SessionClosed);
    wait_for_state(&session, SessionState::Closed).await;
}

#[tokio::test]
async fn test_new_game_resets_engine() {
    let (session, mut engine) = connect().await;
    session.new_game().unwrap();
    expect(&mut engine, "ucinewgame").await;
    expect(&mut engine, "isready").await;
    reply(&engine, &["readyok"]);
    assert_eq!(session.state(), SessionState::Ready);
}

async fn connect_relay() -> (EngineSession, LineChannel) {
    let (json_near, server) = LineChannel::pair();
    let connecting = tokio::spawn(EngineSession::connect(
        uci_session::envelope::relay(json_near),
        SessionConfig::default(),
    ));
    reply(
        &server,
        &[r#"{"type":"connect","data":{"message":"Connected to Chess Engine","engineStatus":{"ready":true,"analyzing":false}}}"#],
    );
    let session = connecting.await.unwrap().unwrap();
    (session, server)
}

async fn next_envelope(server: &mut LineChannel) -> serde_json::Value {
    serde_json::from_str(&server.rx.recv().await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_session_over_envelope_relay() {
    let (session, mut server) = connect_relay().await;

    let pending = session
        .play(&Position::startpos(), Some(10), Duration::from_millis(1000))
        .unwrap();
    assert_eq!(
        next_envelope(&mut server).await,
        serde_json::json!({
            "type": "play",
            "data": { "fen": START_FEN, "skill": 10, "movetime": 1000 }
        })
    );

    reply(
        &server,
        &[
            r#"{"type":"info","data":{"message":"Engine thinking...","skill":10,"movetime":1000}}"#,
            r#"{"type":"bestmove","data":{"bestmove":"e2e4"}}"#,
        ],
    );
    assert_eq!(pending.await.unwrap().best_move, "e2e4");
}

#[tokio::test(start_paused = true)]
async fn test_relay_timeout_holds_slot_until_late_reply() {
    let (session, mut server) = connect_relay().await;
    let after_e4 = Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap();

    let pending = session
        .play(&Position::startpos(), Some(10), Duration::from_millis(1000))
        .unwrap();
    let timed_out_id = pending.id();
    assert_eq!(next_envelope(&mut server).await["type"], "play");

    assert!(matches!(pending.await, Err(SessionError::EngineTimeout { .. })));
    assert_eq!(next_envelope(&mut server).await, serde_json::json!({ "type": "stop" }));

    // Past the first drain window: the resync must not be answered while the
    // play request is still unanswered on the far side.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.state(), SessionState::Busy);

    reply(&server, &[r#"{"type":"bestmove","data":{"bestmove":"e2e4"}}"#]);
    wait_for_state(&session, SessionState::Ready).await;

    let second = session.analyze(&after_e4, 12).unwrap();
    let second_id = second.id();
    assert_ne!(second_id, timed_out_id);
    assert_eq!(next_envelope(&mut server).await["type"], "analyze");
    reply(&server, &[r#"{"type":"bestmove","data":{"bestmove":"e7e5"}}"#]);

    let outcome = second.await.unwrap();
    assert_eq!(outcome.request_id, second_id);
    assert_eq!(outcome.best_move, "e7e5");
}

#[tokio::test(start_paused = true)]
async fn test_relay_silent_after_timeout_closes_session() {
    let (session, mut server) = connect_relay().await;

    let pending = session.analyze(&Position::startpos(), 30).unwrap();
    assert_eq!(next_envelope(&mut server).await["type"], "analyze");
    assert!(matches!(pending.await, Err(SessionError::EngineTimeout { .. })));
    assert_eq!(next_envelope(&mut server).await, serde_json::json!({ "type": "stop" }));

    wait_for_state(&session, SessionState::Closed).await;
    assert_eq!(server.rx.recv().await, None);
    assert_eq!(
        session.analyze(&Position::startpos(), 1).unwrap_err(),
        SessionError::SessionClosed
    );
}
