//! Scripted engine on the far end of an in-memory line channel.

#![allow(dead_code)]

use std::time::Duration;

use coach::{Fault, TrainerEvent, TrainerOutputs};
use uci_session::{EngineSession, LineChannel, SessionConfig};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

const WAIT: Duration = Duration::from_secs(5);

pub struct Engine {
    pub channel: LineChannel,
}

impl Engine {
    pub async fn expect(&mut self, line: &str) {
        let got = tokio::time::timeout(WAIT, self.channel.rx.recv())
            .await
            .expect("engine waited too long for a command");
        assert_eq!(got.as_deref(), Some(line));
    }

    pub fn send(&self, lines: &[&str]) {
        for line in lines {
            self.channel.tx.send(line.to_string()).unwrap();
        }
    }

    pub fn assert_idle(&mut self) {
        assert!(
            self.channel.rx.try_recv().is_err(),
            "engine received an unexpected command"
        );
    }
}

pub async fn connect() -> (EngineSession, Engine) {
    let (client, channel) = LineChannel::pair();
    let config = SessionConfig {
        options: Vec::new(),
        ..SessionConfig::default()
    };
    let connecting = tokio::spawn(EngineSession::connect(client, config));
    let mut engine = Engine { channel };

    engine.expect("uci").await;
    engine.send(&["id name Scripted", "uciok"]);
    engine.expect("isready").await;
    engine.send(&["readyok"]);

    (connecting.await.unwrap().unwrap(), engine)
}

pub async fn next_event(outputs: &mut TrainerOutputs) -> TrainerEvent {
    tokio::time::timeout(WAIT, outputs.events.recv())
        .await
        .expect("no trainer event")
        .expect("event channel closed")
}

pub async fn next_fault(outputs: &mut TrainerOutputs) -> Fault {
    tokio::time::timeout(WAIT, outputs.faults.recv())
        .await
        .expect("no trainer fault")
        .expect("fault channel closed")
}
