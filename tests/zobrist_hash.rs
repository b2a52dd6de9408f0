use gamebook::Square::*;
use gamebook::{Move, Position};

use test_case::test_case;
use testresult::TestResult;

#[test_case(Position::start(), 3)]
#[test_case(Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap(), 2)]
#[test_case(Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap(), 3)]
fn test_zobrist_hash_walk(mut position: Position, max_depth: usize) {
    zobrist_hash_walk_helper(&mut position, 0, max_depth);
}

#[test_case(Position::start(), 4)]
#[test_case(Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap(), 3)]
#[ignore]
fn test_zobrist_hash_walk_long(mut position: Position, max_depth: usize) {
    zobrist_hash_walk_helper(&mut position, 0, max_depth);
}

/// Every reachable position up to the bound: the incremental hash matches a
/// from-scratch recalculation (via validate), and undo restores the hash and
/// the full state bit-exactly.
fn zobrist_hash_walk_helper(position: &mut Position, curr_depth: usize, max_depth: usize) {
    if curr_depth == max_depth {
        return;
    }

    for mve in position.legal_moves() {
        let before_hash = position.hash();
        let before = position.clone();

        position
            .do_move(mve)
            .unwrap_or_else(|err| panic!("{:?} at `{}`: {}", mve, before.to_fen(6), err));
        position.validate().unwrap_or_else(|err| {
            panic!("after {:?} at `{}`: {}", mve, before.to_fen(6), err)
        });

        zobrist_hash_walk_helper(position, curr_depth + 1, max_depth);

        assert!(position.undo_move());
        assert_eq!(
            position.hash(),
            before_hash,
            "couldn't reverse hash for {:?}, fen=`{}`",
            mve,
            position.to_fen(6)
        );
        assert_eq!(position, &before);
    }
}

#[test]
fn test_transposition_hashes_equal() -> TestResult {
    // Knights out and back: the clocks differ, the hash must not.
    let mut shuffled = Position::start();
    for mve in [
        Move::new(G1, F3),
        Move::new(G8, F6),
        Move::new(F3, G1),
        Move::new(F6, G8),
    ] {
        shuffled.do_move(mve)?;
    }
    assert_eq!(shuffled.hash(), Position::start().hash());
    assert_ne!(shuffled.half_move_clock(), 0);
    Ok(())
}

#[test]
fn test_side_to_move_changes_hash() -> TestResult {
    let white = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1")?;
    let black = Position::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 1")?;
    assert_ne!(white.hash(), black.hash());
    // Bit 0 is reserved for the side to play.
    assert_eq!(white.hash() | 1, black.hash() | 1);
    Ok(())
}

#[test]
fn test_castling_rights_change_hash() -> TestResult {
    let all = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1")?;
    let none = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w - - 0 1")?;
    let some = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w Kq - 0 1")?;
    assert_ne!(all.hash(), none.hash());
    assert_ne!(all.hash(), some.hash());
    assert_ne!(none.hash(), some.hash());
    Ok(())
}

#[test]
fn test_uncapturable_en_passant_hashes_as_none() -> TestResult {
    // After 1. e4 no black pawn can take on e3: the stored target must not
    // perturb the hash.
    let with_ep =
        Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")?;
    let without_ep =
        Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")?;
    assert_eq!(with_ep.hash(), without_ep.hash());
    Ok(())
}

#[test]
fn test_capturable_en_passant_perturbs_hash() -> TestResult {
    // A black pawn on d4 really can take on e3.
    let with_ep =
        Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")?;
    let without_ep =
        Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")?;
    assert_ne!(with_ep.hash(), without_ep.hash());
    Ok(())
}

#[test]
fn test_do_move_tracks_capturable_en_passant() -> TestResult {
    // Walking into the double push keeps the incremental hash aligned with
    // the from-scratch value in both the capturable and uncapturable case.
    let mut uncapturable = Position::start();
    uncapturable.do_move(Move::new(E2, E4))?;
    uncapturable.validate()?;
    let plain = Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")?;
    assert_eq!(uncapturable.hash(), plain.hash());

    let mut capturable =
        Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3p4/8/PPPPPPPP/RNBQKBNR w KQkq - 0 3")?;
    capturable.do_move(Move::new(E2, E4))?;
    capturable.validate()?;
    let plain =
        Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 3")?;
    assert_ne!(capturable.hash(), plain.hash());
    Ok(())
}
