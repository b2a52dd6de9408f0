use gamebook::Square::*;
use gamebook::{perft, Move, Position};

use test_case::test_case;
use testresult::TestResult;

#[test_case(Position::start(), 1, 20 ; "starting 1")]
#[test_case(Position::start(), 2, 400 ; "starting 2")]
#[test_case(Position::start(), 3, 8_902 ; "starting 3")]
#[test_case(Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap(), 1, 48 ; "kiwipete 1")]
#[test_case(Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap(), 2, 2_039 ; "kiwipete 2")]
#[test_case(Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap(), 3, 2_812 ; "position3 3")]
#[test_case(Position::from_fen("r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1").unwrap(), 2, 264 ; "position4 2")]
fn test_perft(starting_position: Position, depth: usize, want: u64) {
    let res = perft(&starting_position, depth);
    assert_eq!(res.depth_results.len(), depth);
    assert_eq!(res.depth_results[depth - 1].total(), want);
}

#[test_case(Position::start(), 4, 197_281 ; "starting 4")]
#[test_case(Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap(), 3, 97_862 ; "kiwipete 3")]
#[test_case(Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap(), 5, 674_624 ; "position3 5")]
#[ignore]
fn test_perft_long(starting_position: Position, depth: usize, want: u64) {
    let res = perft(&starting_position, depth);
    println!("{}", res);
    assert_eq!(res.depth_results[depth - 1].total(), want);
}

#[test]
fn test_black_has_twenty_replies_after_e4() -> TestResult {
    let mut pos = Position::start();
    pos.do_move(Move::new(E2, E4))?;
    let res = perft(&pos, 1);
    assert_eq!(res.depth_results[0].total(), 20);
    Ok(())
}
