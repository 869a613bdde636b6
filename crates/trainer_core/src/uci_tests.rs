use super::*;

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
const PROMOTION: &str = "8/P7/8/8/8/7k/8/7K w - - 0 1";

#[test]
fn test_engine_move_e2e4_resolves_to_pawn_push() {
    let pos = Position::startpos();
    let mv = from_engine_notation("e2e4", &pos).unwrap();
    assert_eq!(mv.from.to_string(), "e2");
    assert_eq!(mv.to.to_string(), "e4");
    assert_eq!(mv.promotion, None);
    assert_eq!(mv.san(), Some("e4"));
}

#[test]
fn test_round_trip_every_legal_move() {
    for fen in [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        KIWIPETE,
        PROMOTION,
        "4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1",
    ] {
        let pos = Position::from_fen(fen).unwrap();
        for mv in rules::legal_moves(&pos) {
            let text = to_engine_notation(&mv, &pos).unwrap();
            let back = from_engine_notation(&text, &pos).unwrap();
            assert_eq!(back, mv, "round trip failed for {text} in {fen}");
        }
    }
}

#[test]
fn test_castling_uses_king_destination() {
    let pos = Position::from_fen(KIWIPETE).unwrap();
    let mv = from_engine_notation("e1g1", &pos).unwrap();
    assert_eq!(mv.san(), Some("O-O"));
    assert_eq!(to_engine_notation(&mv, &pos).unwrap(), "e1g1");

    // The rules library's internal king-takes-rook form is not engine notation.
    assert!(matches!(
        from_engine_notation("e1h1", &pos),
        Err(TranslateError::Unresolved { .. })
    ));
}

#[test]
fn test_promotion_requires_exact_piece() {
    let pos = Position::from_fen(PROMOTION).unwrap();

    let under = from_engine_notation("a7a8n", &pos).unwrap();
    assert_eq!(under.promotion, Some(Piece::Knight));
    assert_eq!(to_engine_notation(&under, &pos).unwrap(), "a7a8n");

    // A bare coordinate pair is never upgraded to a queen promotion.
    assert!(matches!(
        from_engine_notation("a7a8", &pos),
        Err(TranslateError::Unresolved { .. })
    ));
}

#[test]
fn test_unresolved_move_is_reported() {
    let pos = Position::startpos();
    let err = from_engine_notation("e2e5", &pos).unwrap_err();
    assert_eq!(
        err,
        TranslateError::Unresolved {
            notation: "e2e5".to_string(),
            fen: pos.fen().to_string(),
        }
    );
}

#[test]
fn test_syntax_errors() {
    let pos = Position::startpos();
    for bad in ["", "e2", "e2e4e", "e9e4", "(none)", "é2e4"] {
        assert!(
            matches!(from_engine_notation(bad, &pos), Err(TranslateError::Syntax(_))),
            "expected syntax error for {bad:?}"
        );
    }
}

#[test]
fn test_to_engine_notation_rejects_stale_move() {
    let pos = Position::startpos();
    let mv = from_engine_notation("e2e4", &pos).unwrap();
    let (after, _) = rules::play(&pos, &mv).unwrap();
    assert!(to_engine_notation(&mv, &after).is_err());
}

#[test]
fn test_parse_human_move_accepts_san_and_coordinates() {
    let pos = Position::startpos();
    let a = parse_human_move("Nf3", &pos).unwrap();
    let b = parse_human_move("g1f3", &pos).unwrap();
    assert_eq!(a, b);
    assert!(matches!(
        parse_human_move("Qh5", &pos),
        Err(TranslateError::Unresolved { .. })
    ));
}

#[test]
fn test_translate_line() {
    let pos = Position::startpos();
    let line: Vec<String> = ["e2e4", "e7e5", "g1f3"].iter().map(|s| s.to_string()).collect();
    let moves = translate_line(&line, &pos).unwrap();
    let sans: Vec<_> = moves.iter().map(|m| m.san().unwrap()).collect();
    assert_eq!(sans, vec!["e4", "e5", "Nf3"]);

    let broken: Vec<String> = ["e2e4", "e2e4"].iter().map(|s| s.to_string()).collect();
    assert!(translate_line(&broken, &pos).is_err());
}
