use std::cell::RefCell;
use std::rc::Rc;

use gamebook::Square::*;
use gamebook::{Game, GameEvent, Move, PositionChange, TraverseEvent, START_FEN};

use testresult::TestResult;

/// 1. e4 e5 (1... c5 2. Nf3 d6) 2. Nf3 Nc6, cursor left at the end.
fn build_sample() -> Game {
    let mut game = Game::new();
    game.play(Move::new(E2, E4)).unwrap();
    game.play(Move::new(E7, E5)).unwrap();
    game.go_back();
    game.play(Move::new(C7, C5)).unwrap();
    game.play(Move::new(G1, F3)).unwrap();
    game.play(Move::new(D7, D6)).unwrap();
    game.goto_start();
    game.go_forward();
    game.go_forward();
    game.play(Move::new(G1, F3)).unwrap();
    game.play(Move::new(B8, C6)).unwrap();
    game
}

#[test]
fn test_sample_position_reflects_cursor_path() {
    let game = build_sample();
    assert_eq!(
        game.position().to_fen(6),
        "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3"
    );
}

#[test]
fn test_goto_node_replays_into_variation() {
    let mut game = build_sample();

    // Walk into the Sicilian branch: 1... c5 2. Nf3 d6.
    let e4 = game.tree().go_forward(gamebook::ROOT, 0);
    let c5 = game.tree().go_forward(e4, 1);
    let nf3 = game.tree().go_forward(c5, 0);
    let d6 = game.tree().go_forward(nf3, 0);

    game.goto_node(d6);
    assert_eq!(
        game.position().to_fen(6),
        "rnbqkbnr/pp2pppp/3p4/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 3"
    );

    // And back out to the main line.
    let nc6 = {
        let e5 = game.tree().go_forward(e4, 0);
        let m_nf3 = game.tree().go_forward(e5, 0);
        game.tree().go_forward(m_nf3, 0)
    };
    game.goto_node(nc6);
    assert_eq!(
        game.position().to_fen(6),
        "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3"
    );
}

#[test]
fn test_traverse_visits_main_line_then_variations() {
    let game = build_sample();
    let mut moves = Vec::new();
    let mut depths = Vec::new();
    game.traverse(&mut |event| match event {
        TraverseEvent::Move { mve, .. } => moves.push(mve.to_string()),
        TraverseEvent::LineStart { depth } => depths.push(depth),
        _ => (),
    });

    assert_eq!(
        moves,
        vec!["e2e4", "e7e5", "c7c5", "g1f3", "d7d6", "g1f3", "b8c6"]
    );
    assert_eq!(depths, vec![1]);
}

#[test]
fn test_traverse_never_yields_deleted_branch() {
    let mut game = build_sample();

    // Delete the Sicilian variation.
    let e4 = game.tree().go_forward(gamebook::ROOT, 0);
    let c5 = game.tree().go_forward(e4, 1);
    game.goto_node(c5);
    game.delete_variation();

    let mut moves = Vec::new();
    game.traverse(&mut |event| {
        if let TraverseEvent::Move { mve, .. } = event {
            moves.push(mve.to_string());
        }
    });
    assert_eq!(moves, vec!["e2e4", "e7e5", "g1f3", "b8c6"]);
    assert!(moves.iter().all(|m| m != "c7c5" && m != "d7d6"));

    // Compaction does not bring it back.
    game.pack();
    let mut packed_moves = Vec::new();
    game.traverse(&mut |event| {
        if let TraverseEvent::Move { mve, .. } = event {
            packed_moves.push(mve.to_string());
        }
    });
    assert_eq!(packed_moves, moves);
}

#[test]
fn test_contains_self_copy_with_everything() {
    let mut game = build_sample();
    game.update_header(|h| {
        h.white = Some("Morphy, Paul".into());
        h.black = Some("Anderssen, Adolf".into());
        h.white_elo = Some(2690);
        h.set_tag("ECO", "C65");
    });
    game.set_comment("a developing move");
    game.add_glyph(1);

    let copy = game.clone();
    assert!(game.contains(&copy));
    assert!(copy.contains(&game));
}

#[test]
fn test_contains_branch_against_main() -> TestResult {
    // The contained game plays the sample's variation as its main line.
    let big = build_sample();

    let mut small = Game::new();
    small.play(Move::new(E2, E4))?;
    small.play(Move::new(C7, C5))?;
    small.play(Move::new(G1, F3))?;

    assert!(big.contains(&small));
    assert!(!small.contains(&big));
    Ok(())
}

#[test]
fn test_contains_rejects_extra_branch() -> TestResult {
    let big = build_sample();

    let mut small = Game::new();
    small.play(Move::new(E2, E4))?;
    small.play(Move::new(E7, E6))?; // the sample has no French

    assert!(!big.contains(&small));
    Ok(())
}

#[test]
fn test_contains_requires_same_start() -> TestResult {
    let mut fragment = Game::from_start_fen("4k3/8/8/8/8/8/8/4K2R w K - 0 40")?;
    let standard = Game::new();
    assert!(!standard.contains(&fragment));
    assert!(!fragment.contains(&standard));
    fragment.play(Move::new(H1, H8))?;
    assert!(fragment.contains(&fragment.clone()));
    Ok(())
}

#[test]
fn test_listener_sees_tree_and_position_changes() -> TestResult {
    let mut game = Game::new();
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    game.add_listener(Box::new(move |event| {
        let entry = match event {
            GameEvent::HeaderChanged => "header".to_string(),
            GameEvent::MoveTreeChanged => "tree".to_string(),
            GameEvent::PositionChanged { change, fen, .. } => {
                format!("position {:?} {}", change, fen.split(' ').nth(1).unwrap())
            }
        };
        sink.borrow_mut().push(entry);
    }));

    game.play(Move::new(E2, E4))?;
    assert_eq!(
        log.borrow().as_slice(),
        ["tree", "position MoveDone b"],
        "fresh move extends the tree and the position"
    );

    log.borrow_mut().clear();
    game.go_back();
    assert_eq!(
        log.borrow().as_slice(),
        ["position MoveUndone w"],
        "navigation alone leaves the tree untouched"
    );

    log.borrow_mut().clear();
    game.go_forward();
    assert_eq!(log.borrow().as_slice(), ["position MoveDone b"]);
    Ok(())
}

#[test]
fn test_start_position_change_notifies_once() {
    let mut game = Game::new();
    let count = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&count);
    game.add_listener(Box::new(move |event| {
        if matches!(
            event,
            GameEvent::PositionChanged {
                change: PositionChange::StartPositionChanged,
                ..
            }
        ) {
            *seen.borrow_mut() += 1;
        }
    }));

    game.set_start_position("4k3/8/8/8/8/8/8/4K2R w K - 0 40")
        .unwrap();
    assert_eq!(*count.borrow(), 1);
    assert_ne!(game.start_fen(), START_FEN);
}

#[test]
fn test_goto_ply_round_trip() -> TestResult {
    let mut game = Game::new();
    for mve in [
        Move::new(D2, D4),
        Move::new(D7, D5),
        Move::new(C2, C4),
        Move::new(E7, E6),
    ] {
        game.play(mve)?;
    }

    game.goto_ply(1);
    assert_eq!(game.current_move(), Some(Move::new(D2, D4)));
    game.goto_ply(4);
    assert_eq!(game.current_move(), Some(Move::new(E7, E6)));
    game.goto_ply(0);
    assert_eq!(game.current_move(), None);
    assert_eq!(game.position().to_fen(6), START_FEN);
    Ok(())
}

#[test]
fn test_delete_remaining_keeps_cursor_and_variations() -> TestResult {
    let mut game = build_sample();
    game.goto_start();
    game.go_forward(); // 1. e4

    game.delete_remaining();

    let mut moves = Vec::new();
    game.traverse(&mut |event| {
        if let TraverseEvent::Move { mve, .. } = event {
            moves.push(mve.to_string());
        }
    });
    // e4 keeps its variation-free status: everything after it went, but the
    // 1... c5 alternative hangs off e5 which was deleted with the rest.
    assert_eq!(moves, vec!["e2e4"]);
    assert_eq!(game.current_move(), Some(Move::new(E2, E4)));
    assert_eq!(game.position().ply(), 1);
    Ok(())
}
