use arrayvec::ArrayVec;

use crate::bitboard::{BitBoard, Direction, Square};
use crate::movecode::{Move, Piece, Side, Wing};
use crate::position::{attacks, Position};

pub(crate) fn castle_king_dest(side: Side, wing: Wing) -> Square {
    use Square::*;
    match (side, wing) {
        (Side::White, Wing::King) => G1,
        (Side::White, Wing::Queen) => C1,
        (Side::Black, Wing::King) => G8,
        (Side::Black, Wing::Queen) => C8,
    }
}

pub(crate) fn castle_rook_dest(side: Side, wing: Wing) -> Square {
    use Square::*;
    match (side, wing) {
        (Side::White, Wing::King) => F1,
        (Side::White, Wing::Queen) => D1,
        (Side::Black, Wing::King) => F8,
        (Side::Black, Wing::Queen) => D8,
    }
}

/// Pieces of `by` attacking `square`, with attack rays computed over the
/// given occupancy.
pub(crate) fn attackers_to(
    position: &Position,
    square: Square,
    by: Side,
    occupancy: BitBoard,
) -> BitBoard {
    let board = &position.board;
    let by_pieces = board.side(by);

    let mut attackers = attacks::knight_attacks(square) & board.pieces(Piece::Knight, by);
    attackers |= attacks::king_attacks(square) & board.pieces(Piece::King, by);
    // Squares a pawn of `by` would attack `square` from are the squares
    // reached by the opposite side's pawn attacks out of `square`.
    attackers |=
        attacks::pawn_attacks(square, by.opposite_side()) & board.pieces(Piece::Pawn, by);
    attackers |=
        attacks::sliding_attacks(Piece::Rook, square, occupancy) & board.rook_queen & by_pieces;
    attackers |= attacks::sliding_attacks(Piece::Bishop, square, occupancy)
        & board.bishop_queen
        & by_pieces;
    attackers
}

/// Pieces giving check to the side to move.
pub(crate) fn checkers(position: &Position) -> BitBoard {
    let side = position.state.to_move;
    attackers_to(
        position,
        position.board.king_square(side),
        side.opposite_side(),
        position.board.occupied(),
    )
}

/// Every square attacked by `by` over the given occupancy.
fn attacked_squares(position: &Position, by: Side, occupancy: BitBoard) -> BitBoard {
    let board = &position.board;
    let mut attacked = BitBoard::empty();

    for src in board.pieces(Piece::Pawn, by).to_squares() {
        attacked |= attacks::pawn_attacks(src, by);
    }
    for src in board.pieces(Piece::Knight, by).to_squares() {
        attacked |= attacks::knight_attacks(src);
    }
    attacked |= attacks::king_attacks(board.king_square(by));
    for piece in [Piece::Bishop, Piece::Rook, Piece::Queen] {
        for src in board.pieces(piece, by).to_squares() {
            attacked |= attacks::sliding_attacks(piece, src, occupancy);
        }
    }
    attacked
}

/// Whether castling on `wing` is currently available, with the failing
/// prerequisite spelled out. Covers Chess960: king and rook origins come
/// from the rights record, destinations are the canonical g/c and f/d files.
pub(crate) fn castle_available(
    position: &Position,
    side: Side,
    wing: Wing,
) -> Result<(), &'static str> {
    let board = &position.board;
    let Some(rook_src) = position.state.castling_rights.rook_square(side, wing) else {
        return Err("right is gone");
    };

    let king_src = board.king_square(side);
    let king_dest = castle_king_dest(side, wing);
    let rook_dest = castle_rook_dest(side, wing);

    let king_bb = BitBoard::from_square(king_src);
    let rook_bb = BitBoard::from_square(rook_src);
    let occupancy = board.occupied();

    // The moving king and rook never block their own castle.
    let cleared = occupancy & !king_bb & !rook_bb;
    let needed = (attacks::between(king_src, king_dest) | BitBoard::from_square(king_dest))
        | (attacks::between(rook_src, rook_dest) | BitBoard::from_square(rook_dest));
    if !(needed & cleared).is_empty() {
        return Err("squares between are occupied");
    }

    let opp = side.opposite_side();
    let danger = attacked_squares(position, opp, occupancy & !king_bb);
    if danger.is_square_set(king_src) {
        return Err("king is in check");
    }
    let king_path = attacks::between(king_src, king_dest) | BitBoard::from_square(king_dest);
    if !(king_path & danger).is_empty() {
        return Err("king crosses an attacked square");
    }

    Ok(())
}

/// An en-passant candidate is verified on a scratch copy: both pawns leave
/// the rank at once, so only re-deriving the king's safety is sound.
fn en_passant_is_safe(position: &Position, mve: Move) -> bool {
    let side = position.state.to_move;
    let mut scratch = position.clone();
    if scratch.do_move(mve).is_err() {
        return false;
    }
    attackers_to(
        &scratch,
        scratch.board.king_square(side),
        side.opposite_side(),
        scratch.board.occupied(),
    )
    .is_empty()
}

fn push_pawn_moves(
    moves: &mut ArrayVec<Move, 218>,
    src: Square,
    dest: Square,
    capture: bool,
    last_rank: u8,
) {
    if dest.rank() == last_rank {
        for promotion in [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen] {
            moves.push(if capture {
                Move::with_promotion_capture(src, dest, promotion)
            } else {
                Move::with_promotion(src, dest, promotion)
            });
        }
    } else {
        moves.push(if capture {
            Move::new_capture(src, dest)
        } else {
            Move::new(src, dest)
        });
    }
}

pub(crate) fn legal_moves(position: &Position) -> ArrayVec<Move, 218> {
    let mut moves = ArrayVec::new();
    let board = &position.board;
    let side = position.state.to_move;
    let opp = side.opposite_side();
    let friendly = board.side(side);
    let enemy = board.side(opp);
    let occupancy = board.occupied();
    let king_sq = board.king_square(side);

    let checkers_bb = checkers(position);
    let num_checkers = checkers_bb.num_squares_set();

    // Occupancy without the king: a king stepping along a checking ray must
    // still count the ray as attacked.
    let danger = attacked_squares(position, opp, occupancy & !BitBoard::from_square(king_sq));

    for dest in (attacks::king_attacks(king_sq) & !friendly & !danger).to_squares() {
        moves.push(if enemy.is_square_set(dest) {
            Move::new_capture(king_sq, dest)
        } else {
            Move::new(king_sq, dest)
        });
    }

    // Double check: only the king may move.
    if num_checkers > 1 {
        return moves;
    }

    let allowed = if num_checkers == 1 {
        let checker_sq = checkers_bb.get_lsb();
        let (checker_piece, _) = board.piece_at(checker_sq).expect("checker occupies its square");
        let block = if checker_piece.is_slider() {
            attacks::between(checker_sq, king_sq)
        } else {
            BitBoard::empty()
        };
        checkers_bb | block
    } else {
        BitBoard::full()
    };

    // Pins: cast each ray from the king; one friendly piece followed by an
    // aligned enemy slider pins that piece to the ray.
    let mut pins: ArrayVec<(Square, BitBoard), 8> = ArrayVec::new();
    for dir in Direction::ALL {
        let nearest = attacks::ray_attacks(king_sq, dir, occupancy) & occupancy;
        if nearest.is_empty() {
            continue;
        }
        let blocker_sq = nearest.get_lsb();
        if !friendly.is_square_set(blocker_sq) {
            continue;
        }
        let beyond = attacks::ray_attacks(blocker_sq, dir, occupancy) & occupancy;
        if beyond.is_empty() {
            continue;
        }
        let pinner_sq = beyond.get_lsb();
        let sliders = if dir.is_orthogonal() {
            board.rook_queen
        } else {
            board.bishop_queen
        };
        if (sliders & enemy).is_square_set(pinner_sq) {
            let ray = attacks::between(king_sq, pinner_sq) | BitBoard::from_square(pinner_sq);
            pins.push((blocker_sq, ray));
        }
    }
    let pin_mask = |sq: Square| {
        pins.iter()
            .find(|(pinned, _)| *pinned == sq)
            .map(|(_, ray)| *ray)
            .unwrap_or(BitBoard::full())
    };

    for src in board.pieces(Piece::Knight, side).to_squares() {
        let dests = attacks::knight_attacks(src) & !friendly & allowed & pin_mask(src);
        for dest in dests.to_squares() {
            moves.push(if enemy.is_square_set(dest) {
                Move::new_capture(src, dest)
            } else {
                Move::new(src, dest)
            });
        }
    }

    for piece in [Piece::Bishop, Piece::Rook, Piece::Queen] {
        for src in board.pieces(piece, side).to_squares() {
            let dests =
                attacks::sliding_attacks(piece, src, occupancy) & !friendly & allowed & pin_mask(src);
            for dest in dests.to_squares() {
                moves.push(if enemy.is_square_set(dest) {
                    Move::new_capture(src, dest)
                } else {
                    Move::new(src, dest)
                });
            }
        }
    }

    let (push_dir, home_rank, last_rank): (Direction, u8, u8) = match side {
        Side::White => (Direction::North, 1, 7),
        Side::Black => (Direction::South, 6, 0),
    };
    for src in board.pieces(Piece::Pawn, side).to_squares() {
        let pin = pin_mask(src);
        let src_bb = BitBoard::from_square(src);

        let single = src_bb.shift(push_dir) & !occupancy;
        let single_ok = single & allowed & pin;
        if !single_ok.is_empty() {
            push_pawn_moves(&mut moves, src, single_ok.get_lsb(), false, last_rank);
        }
        if src.rank() == home_rank && !single.is_empty() {
            let double = single.shift(push_dir) & !occupancy & allowed & pin;
            if !double.is_empty() {
                moves.push(Move::new(src, double.get_lsb()));
            }
        }

        let caps = attacks::pawn_attacks(src, side) & enemy & allowed & pin;
        for dest in caps.to_squares() {
            push_pawn_moves(&mut moves, src, dest, true, last_rank);
        }

        if let Some(ep_target) = position.state.en_passant_target {
            if attacks::pawn_attacks(src, side).is_square_set(ep_target) {
                let mve = Move::en_passant(src, ep_target);
                if en_passant_is_safe(position, mve) {
                    moves.push(mve);
                }
            }
        }
    }

    if num_checkers == 0 {
        for wing in [Wing::King, Wing::Queen] {
            if castle_available(position, side, wing).is_ok() {
                moves.push(Move::castle(wing, king_sq, castle_king_dest(side, wing)));
            }
        }
    }

    moves
}
