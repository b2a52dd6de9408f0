use std::fmt;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::bitboard::{BitBoard, Square};
use crate::movecode::{Move, Piece, Side, Wing};

pub(crate) mod attacks;
mod fen;
mod movegen;
mod zobrist;

pub use fen::{FenParseError, START_FEN};

#[derive(thiserror::Error, Debug)]
pub enum IllegalMoveError {
    #[error("no piece on {0}")]
    NoPiece(String),

    #[error("side to move is {0}, move {1} picks up the other side's piece")]
    NotToMove(Side, Move),

    #[error("{0} can't reach {1} from {2}")]
    Unreachable(Piece, String, String),

    #[error("path is blocked for {0}")]
    PathBlocked(Move),

    #[error("capture flag disagrees with target content: {0}")]
    CaptureFlag(Move),

    #[error("en passant flag disagrees with stored target: {0}")]
    EnPassantFlag(Move),

    #[error("promotion flag disagrees with pawn placement: {0}")]
    PromotionFlag(Move),

    #[error("{0} can't castle {1}: {2}")]
    Castling(Side, Wing, &'static str),

    #[error("destination {0} holds a friendly piece")]
    FriendlyCapture(String),
}

#[derive(thiserror::Error, Debug)]
pub enum IllegalPositionError {
    #[error("{0} has {1} kings")]
    KingCount(Side, u8),

    #[error("half-move clock {0} exceeds ply {1}")]
    ClockExceedsPly(u16, u16),

    #[error("en passant square {0} lacks the pawn behind it")]
    EnPassantUnbacked(String),

    #[error("{0} is to move but the {1} king is already capturable")]
    OpponentKingAttacked(Side, Side),

    #[error("pawn on back rank at {0}")]
    PawnOnBackRank(String),

    #[error("incremental hash {0:#018x} != recalculated {1:#018x}")]
    HashMismatch(u64, u64),
}

/// Per side/wing rook origin squares. `None` means the right is gone. Also
/// covers Chess960, where the recorded rooks may start on any file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CastlingRights {
    rooks: [[Option<Square>; 2]; 2],
}

impl CastlingRights {
    pub fn none() -> Self {
        Self {
            rooks: [[None; 2]; 2],
        }
    }

    pub fn standard() -> Self {
        use Square::*;
        Self {
            rooks: [[Some(H1), Some(A1)], [Some(H8), Some(A8)]],
        }
    }

    pub fn has(&self, side: Side, wing: Wing) -> bool {
        self.rook_square(side, wing).is_some()
    }

    pub fn rook_square(&self, side: Side, wing: Wing) -> Option<Square> {
        self.rooks[side as usize][wing as usize]
    }

    pub fn grant(&mut self, side: Side, wing: Wing, rook_square: Square) {
        self.rooks[side as usize][wing as usize] = Some(rook_square);
    }

    pub fn revoke(&mut self, side: Side, wing: Wing) {
        self.rooks[side as usize][wing as usize] = None;
    }

    pub fn revoke_side(&mut self, side: Side) {
        self.rooks[side as usize] = [None; 2];
    }

    pub fn is_empty(&self) -> bool {
        self.mask() == 0
    }

    /// 4-bit mask: white king-side is bit 0, white queen-side bit 1, black
    /// king-side bit 2, black queen-side bit 3.
    pub(crate) fn mask(&self) -> u8 {
        let mut mask = 0;
        for side in Side::iter() {
            for wing in Wing::iter() {
                if self.has(side, wing) {
                    mask |= 1 << (side as u8 * 2 + wing as u8);
                }
            }
        }
        mask
    }

    /// True when every remaining right uses the classical rook files.
    pub(crate) fn is_classical(&self) -> bool {
        use Square::*;
        let expected = [[H1, A1], [H8, A8]];
        Side::iter().all(|side| {
            Wing::iter().all(|wing| {
                match self.rook_square(side, wing) {
                    Some(sq) => sq == expected[side as usize][wing as usize],
                    None => true,
                }
            })
        })
    }
}

/// Piece placement: six shared occupancy words plus explicit king squares.
/// Queens live on both slider boards; bishops and rooks on one each; kings
/// only in their side's occupancy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct Board {
    pub(crate) white: BitBoard,
    pub(crate) black: BitBoard,
    pub(crate) pawns: BitBoard,
    pub(crate) knights: BitBoard,
    pub(crate) bishop_queen: BitBoard,
    pub(crate) rook_queen: BitBoard,
    pub(crate) white_king: Square,
    pub(crate) black_king: Square,
}

impl Board {
    fn start() -> Self {
        use Square::*;
        Self {
            white: BitBoard::from_val(0x0000_0000_0000_FFFF),
            black: BitBoard::from_val(0xFFFF_0000_0000_0000),
            pawns: BitBoard::from_val(0x00FF_0000_0000_FF00),
            knights: BitBoard::from_squares(&[B1, G1, B8, G8]),
            bishop_queen: BitBoard::from_squares(&[C1, F1, D1, C8, F8, D8]),
            rook_queen: BitBoard::from_squares(&[A1, H1, D1, A8, H8, D8]),
            white_king: E1,
            black_king: E8,
        }
    }

    fn empty() -> Self {
        // King squares are placeholders until put_stone sets them; an empty
        // board never passes validation anyway.
        Self {
            white: BitBoard::empty(),
            black: BitBoard::empty(),
            pawns: BitBoard::empty(),
            knights: BitBoard::empty(),
            bishop_queen: BitBoard::empty(),
            rook_queen: BitBoard::empty(),
            white_king: Square::E1,
            black_king: Square::E8,
        }
    }

    pub(crate) fn occupied(&self) -> BitBoard {
        self.white | self.black
    }

    pub(crate) fn side(&self, side: Side) -> BitBoard {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BitBoard {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }

    pub(crate) fn king_square(&self, side: Side) -> Square {
        match side {
            Side::White => self.white_king,
            Side::Black => self.black_king,
        }
    }

    pub(crate) fn pieces(&self, piece: Piece, side: Side) -> BitBoard {
        let own = self.side(side);
        match piece {
            Piece::Pawn => self.pawns & own,
            Piece::Knight => self.knights & own,
            Piece::Bishop => self.bishop_queen & !self.rook_queen & own,
            Piece::Rook => self.rook_queen & !self.bishop_queen & own,
            Piece::Queen => self.bishop_queen & self.rook_queen & own,
            Piece::King => BitBoard::from_square(self.king_square(side)) & own,
        }
    }

    pub(crate) fn piece_at(&self, square: Square) -> Option<(Piece, Side)> {
        let side = if self.white.is_square_set(square) {
            Side::White
        } else if self.black.is_square_set(square) {
            Side::Black
        } else {
            return None;
        };

        let piece = if square == self.king_square(side) {
            Piece::King
        } else if self.pawns.is_square_set(square) {
            Piece::Pawn
        } else if self.knights.is_square_set(square) {
            Piece::Knight
        } else {
            match (
                self.bishop_queen.is_square_set(square),
                self.rook_queen.is_square_set(square),
            ) {
                (true, true) => Piece::Queen,
                (true, false) => Piece::Bishop,
                (false, true) => Piece::Rook,
                (false, false) => return None,
            }
        };
        Some((piece, side))
    }

    fn put_stone(&mut self, piece: Piece, side: Side, square: Square) {
        self.side_mut(side).set_square(square);
        match piece {
            Piece::Pawn => self.pawns.set_square(square),
            Piece::Knight => self.knights.set_square(square),
            Piece::Bishop => self.bishop_queen.set_square(square),
            Piece::Rook => self.rook_queen.set_square(square),
            Piece::Queen => {
                self.bishop_queen.set_square(square);
                self.rook_queen.set_square(square);
            }
            Piece::King => match side {
                Side::White => self.white_king = square,
                Side::Black => self.black_king = square,
            },
        }
    }

    fn remove_stone(&mut self, piece: Piece, side: Side, square: Square) {
        self.side_mut(side).clear_square(square);
        match piece {
            Piece::Pawn => self.pawns.clear_square(square),
            Piece::Knight => self.knights.clear_square(square),
            Piece::Bishop => self.bishop_queen.clear_square(square),
            Piece::Rook => self.rook_queen.clear_square(square),
            Piece::Queen => {
                self.bishop_queen.clear_square(square);
                self.rook_queen.clear_square(square);
            }
            Piece::King => (),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct State {
    pub to_move: Side,
    pub castling_rights: CastlingRights,
    pub en_passant_target: Option<Square>,
    pub half_move_clock: u16,
    /// Game ply, counting from 0 at the standard start position. Fragment
    /// games parsed from a later FEN start with the matching offset.
    pub ply: u16,
}

impl State {
    fn start() -> Self {
        Self {
            to_move: Side::White,
            castling_rights: CastlingRights::standard(),
            en_passant_target: None,
            half_move_clock: 0,
            ply: 0,
        }
    }

    pub fn full_move_number(&self) -> u16 {
        self.ply / 2 + 1
    }
}

const WORD_WHITE: u8 = 1 << 0;
const WORD_BLACK: u8 = 1 << 1;
const WORD_PAWNS: u8 = 1 << 2;
const WORD_KNIGHTS: u8 = 1 << 3;
const WORD_BISHOP_QUEEN: u8 = 1 << 4;
const WORD_ROOK_QUEEN: u8 = 1 << 5;

/// One undo-log record: the occupancy words a move changed (tagged by
/// bitmask), plus the cheap scalar state. Three to six words per move
/// instead of a full board snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
struct UndoEntry {
    mve: Move,
    changed: u8,
    words: ArrayVec<u64, 6>,
    white_king: Square,
    black_king: Square,
    state: State,
    hash: u64,
}

enum CheckedMove {
    Null,
    Standard {
        piece: Piece,
        captured: Option<(Piece, Square)>,
    },
}

#[derive(Clone, Eq, Deserialize, Serialize)]
pub struct Position {
    pub(crate) board: Board,
    pub(crate) state: State,
    hash: u64,
    undo_log: Vec<UndoEntry>,
    redo_log: Vec<Move>,
}

impl Position {
    pub fn start() -> Self {
        let board = Board::start();
        let state = State::start();
        let hash = Self::calculate_hash(&board, &state);
        Self {
            board,
            state,
            hash,
            undo_log: Vec::new(),
            redo_log: Vec::new(),
        }
    }

    fn from_parts(board: Board, state: State) -> Self {
        let hash = Self::calculate_hash(&board, &state);
        Self {
            board,
            state,
            hash,
            undo_log: Vec::new(),
            redo_log: Vec::new(),
        }
    }

    pub fn piece_at(&self, square: Square) -> Option<(Piece, Side)> {
        self.board.piece_at(square)
    }

    pub fn to_move(&self) -> Side {
        self.state.to_move
    }

    pub fn castling_rights(&self) -> &CastlingRights {
        &self.state.castling_rights
    }

    pub fn en_passant_target(&self) -> Option<Square> {
        self.state.en_passant_target
    }

    pub fn half_move_clock(&self) -> u16 {
        self.state.half_move_clock
    }

    pub fn ply(&self) -> u16 {
        self.state.ply
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn legal_moves(&self) -> ArrayVec<Move, 218> {
        movegen::legal_moves(self)
    }

    pub fn is_check(&self) -> bool {
        !movegen::checkers(self).is_empty()
    }

    pub fn is_mate(&self) -> bool {
        self.is_check() && self.legal_moves().is_empty()
    }

    pub fn is_stalemate(&self) -> bool {
        !self.is_check() && self.legal_moves().is_empty()
    }

    pub fn is_insufficient_material(&self) -> bool {
        const LIGHT_SQUARES: BitBoard = BitBoard::from_val(0x55AA_55AA_55AA_55AA);

        if !self.board.pawns.is_empty() || !self.board.rook_queen.is_empty() {
            return false;
        }
        let bishops = self.board.bishop_queen;
        let minors = self.board.knights | bishops;
        match minors.num_squares_set() {
            0 | 1 => true,
            // Any number of same-colored bishops (and no knights) can't
            // deliver mate.
            _ => {
                self.board.knights.is_empty()
                    && ((bishops & LIGHT_SQUARES) == bishops
                        || (bishops & !LIGHT_SQUARES) == bishops)
            }
        }
    }

    /// Applies a move after checking pseudo-legality and flag consistency.
    /// Own-king exposure is not checked here; [`Position::legal_moves`] is
    /// the full-legality surface.
    pub fn do_move(&mut self, mve: Move) -> Result<(), IllegalMoveError> {
        let checked = self.check_move(mve)?;
        self.redo_log.clear();
        self.apply_move(mve, checked);
        Ok(())
    }

    /// Rolls back one move; false when there is nothing to undo.
    pub fn undo_move(&mut self) -> bool {
        let Some(entry) = self.undo_log.pop() else {
            return false;
        };

        let mut word_idx = 0;
        let mut restore = |flag: u8, target: &mut BitBoard| {
            if entry.changed & flag != 0 {
                *target = BitBoard::from_val(entry.words[word_idx]);
                word_idx += 1;
            }
        };
        restore(WORD_WHITE, &mut self.board.white);
        restore(WORD_BLACK, &mut self.board.black);
        restore(WORD_PAWNS, &mut self.board.pawns);
        restore(WORD_KNIGHTS, &mut self.board.knights);
        restore(WORD_BISHOP_QUEEN, &mut self.board.bishop_queen);
        restore(WORD_ROOK_QUEEN, &mut self.board.rook_queen);

        self.board.white_king = entry.white_king;
        self.board.black_king = entry.black_king;
        self.state = entry.state;
        self.hash = entry.hash;
        self.redo_log.push(entry.mve);
        true
    }

    /// Replays the most recently undone move; false when there is none.
    pub fn redo_move(&mut self) -> bool {
        let Some(mve) = self.redo_log.pop() else {
            return false;
        };
        match self.check_move(mve) {
            Ok(checked) => {
                self.apply_move(mve, checked);
                true
            }
            Err(err) => {
                debug_assert!(false, "redo of {} no longer applies: {}", mve, err);
                self.redo_log.push(mve);
                false
            }
        }
    }

    /// Places a piece, replacing whatever held the square. Editor surface:
    /// clears undo and redo history, since the diff log only describes
    /// move-shaped mutations.
    pub fn put_piece(&mut self, piece: Piece, side: Side, square: Square) {
        self.clear_history();
        if let Some((old_piece, old_side)) = self.board.piece_at(square) {
            self.board.remove_stone(old_piece, old_side, square);
            self.hash ^= zobrist::piece_modifier(old_piece, old_side, square);
        }
        if piece == Piece::King {
            // Keep the one-king invariant: a king put elsewhere moves.
            let old_king = self.board.king_square(side);
            if self.board.side(side).is_square_set(old_king)
                && self.board.piece_at(old_king) == Some((Piece::King, side))
            {
                self.board.remove_stone(Piece::King, side, old_king);
                self.hash ^= zobrist::piece_modifier(Piece::King, side, old_king);
            }
        }
        self.board.put_stone(piece, side, square);
        self.hash ^= zobrist::piece_modifier(piece, side, square);
    }

    pub fn remove_piece(&mut self, square: Square) -> Result<(), IllegalMoveError> {
        let Some((piece, side)) = self.board.piece_at(square) else {
            return Err(IllegalMoveError::NoPiece(square.notation()));
        };
        self.clear_history();
        self.board.remove_stone(piece, side, square);
        self.hash ^= zobrist::piece_modifier(piece, side, square);
        Ok(())
    }

    pub fn set_to_move(&mut self, side: Side) {
        if side == self.state.to_move {
            return;
        }
        self.clear_history();
        self.unhash_en_passant();
        self.state.to_move = side;
        self.hash ^= zobrist::SIDE_TO_PLAY;
        self.rehash_en_passant();
    }

    pub fn set_castling_rights(&mut self, rights: CastlingRights) {
        self.clear_history();
        let old_mask = self.state.castling_rights.mask();
        self.state.castling_rights = rights;
        self.hash ^=
            zobrist::castling_modifier(old_mask) ^ zobrist::castling_modifier(rights.mask());
    }

    pub fn set_en_passant_target(&mut self, target: Option<Square>) {
        self.clear_history();
        self.unhash_en_passant();
        self.state.en_passant_target = target;
        self.rehash_en_passant();
    }

    fn clear_history(&mut self) {
        self.undo_log.clear();
        self.redo_log.clear();
    }

    /// Consistency checks for debug paths. Failures are programmer errors;
    /// normal play can't produce them.
    pub fn validate(&self) -> Result<(), IllegalPositionError> {
        for side in Side::iter() {
            let king_sq = self.board.king_square(side);
            let own = self.board.side(side);
            if !own.is_square_set(king_sq) {
                return Err(IllegalPositionError::KingCount(side, 0));
            }
            // A side bit belonging to no piece type would be a second,
            // untyped king.
            let typed = self.board.pawns
                | self.board.knights
                | self.board.bishop_queen
                | self.board.rook_queen
                | BitBoard::from_square(king_sq);
            let stray = own & !typed;
            if !stray.is_empty() {
                return Err(IllegalPositionError::KingCount(
                    side,
                    1 + stray.num_squares_set(),
                ));
            }
        }

        if self.state.half_move_clock > self.state.ply {
            return Err(IllegalPositionError::ClockExceedsPly(
                self.state.half_move_clock,
                self.state.ply,
            ));
        }

        if let Some(target) = self.state.en_passant_target {
            let mover = self.state.to_move.opposite_side();
            let pawn_sq = match mover {
                Side::White => Square::from_u8(target as u8 + 8),
                Side::Black => Square::from_u8(target as u8 - 8),
            };
            if !self.board.pieces(Piece::Pawn, mover).is_square_set(pawn_sq) {
                return Err(IllegalPositionError::EnPassantUnbacked(target.notation()));
            }
        }

        let opp = self.state.to_move.opposite_side();
        if !movegen::attackers_to(
            self,
            self.board.king_square(opp),
            self.state.to_move,
            self.board.occupied(),
        )
        .is_empty()
        {
            return Err(IllegalPositionError::OpponentKingAttacked(
                self.state.to_move,
                opp,
            ));
        }

        const BACK_RANKS: BitBoard = BitBoard::from_val(0xFF00_0000_0000_00FF);
        let bad_pawns = self.board.pawns & BACK_RANKS;
        if !bad_pawns.is_empty() {
            return Err(IllegalPositionError::PawnOnBackRank(
                bad_pawns.get_lsb().notation(),
            ));
        }

        let recalculated = Self::calculate_hash(&self.board, &self.state);
        if recalculated != self.hash {
            return Err(IllegalPositionError::HashMismatch(self.hash, recalculated));
        }

        Ok(())
    }

    fn calculate_hash(board: &Board, state: &State) -> u64 {
        let mut hash = 0;
        for side in Side::iter() {
            for piece in Piece::iter() {
                for sq in board.pieces(piece, side).to_squares() {
                    hash ^= zobrist::piece_modifier(piece, side, sq);
                }
            }
        }
        hash ^= zobrist::castling_modifier(state.castling_rights.mask());
        if let Some(target) = state.en_passant_target {
            if Self::en_passant_capturable(board, target, state.to_move) {
                hash ^= zobrist::en_passant_modifier(target);
            }
        }
        if state.to_move == Side::Black {
            hash ^= zobrist::SIDE_TO_PLAY;
        }
        hash
    }

    /// A stored en-passant square only perturbs the hash while some pawn of
    /// the side to move stands where it could play the capture.
    fn en_passant_capturable(board: &Board, target: Square, to_move: Side) -> bool {
        let capturer_sources = attacks::pawn_attacks(target, to_move.opposite_side());
        !(capturer_sources & board.pieces(Piece::Pawn, to_move)).is_empty()
    }

    fn unhash_en_passant(&mut self) {
        if let Some(target) = self.state.en_passant_target {
            if Self::en_passant_capturable(&self.board, target, self.state.to_move) {
                self.hash ^= zobrist::en_passant_modifier(target);
            }
        }
    }

    fn rehash_en_passant(&mut self) {
        // Same toggle; split for call-site readability.
        self.unhash_en_passant();
    }

    fn check_move(&self, mve: Move) -> Result<CheckedMove, IllegalMoveError> {
        if mve.is_null() {
            return Ok(CheckedMove::Null);
        }

        let src = mve.src();
        let dest = mve.dest();

        let Some((piece, side)) = self.board.piece_at(src) else {
            return Err(IllegalMoveError::NoPiece(src.notation()));
        };
        if side != self.state.to_move {
            return Err(IllegalMoveError::NotToMove(side, mve));
        }

        if let Some(wing) = mve.castle_wing() {
            if piece != Piece::King || src != self.board.king_square(side) {
                return Err(IllegalMoveError::Castling(side, wing, "king not on origin"));
            }
            if dest != movegen::castle_king_dest(side, wing) {
                return Err(IllegalMoveError::Castling(side, wing, "bad destination"));
            }
            movegen::castle_available(self, side, wing)
                .map_err(|reason| IllegalMoveError::Castling(side, wing, reason))?;
            return Ok(CheckedMove::Standard {
                piece,
                captured: None,
            });
        }

        if mve.is_en_passant() {
            if piece != Piece::Pawn || self.state.en_passant_target != Some(dest) {
                return Err(IllegalMoveError::EnPassantFlag(mve));
            }
            if !attacks::pawn_attacks(src, side).is_square_set(dest) {
                return Err(IllegalMoveError::Unreachable(
                    piece,
                    dest.notation(),
                    src.notation(),
                ));
            }
            let captured_sq = match side {
                Side::White => Square::from_u8(dest as u8 - 8),
                Side::Black => Square::from_u8(dest as u8 + 8),
            };
            return Ok(CheckedMove::Standard {
                piece,
                captured: Some((Piece::Pawn, captured_sq)),
            });
        }

        let captured = match self.board.piece_at(dest) {
            Some((_, dest_side)) if dest_side == side => {
                return Err(IllegalMoveError::FriendlyCapture(dest.notation()));
            }
            Some((dest_piece, _)) => Some((dest_piece, dest)),
            None => None,
        };
        // Flag and content must agree in both directions.
        if captured.is_some() != mve.is_capture() {
            return Err(IllegalMoveError::CaptureFlag(mve));
        }

        let last_rank = match side {
            Side::White => 7,
            Side::Black => 0,
        };
        if mve.promotion().is_some() != (piece == Piece::Pawn && dest.rank() == last_rank) {
            return Err(IllegalMoveError::PromotionFlag(mve));
        }

        let reachable = match piece {
            Piece::Knight => attacks::knight_attacks(src).is_square_set(dest),
            Piece::King => attacks::king_attacks(src).is_square_set(dest),
            Piece::Bishop | Piece::Rook | Piece::Queen => {
                if !attacks::sliding_attacks(piece, src, BitBoard::empty()).is_square_set(dest) {
                    false
                } else if !attacks::sliding_attacks(piece, src, self.board.occupied())
                    .is_square_set(dest)
                {
                    return Err(IllegalMoveError::PathBlocked(mve));
                } else {
                    true
                }
            }
            Piece::Pawn => {
                if mve.is_capture() {
                    attacks::pawn_attacks(src, side).is_square_set(dest)
                } else {
                    self.pawn_push_clear(src, dest, side)?
                }
            }
        };
        if !reachable {
            return Err(IllegalMoveError::Unreachable(
                piece,
                dest.notation(),
                src.notation(),
            ));
        }

        Ok(CheckedMove::Standard { piece, captured })
    }

    fn pawn_push_clear(
        &self,
        src: Square,
        dest: Square,
        side: Side,
    ) -> Result<bool, IllegalMoveError> {
        let (step, home_rank): (i8, u8) = match side {
            Side::White => (8, 1),
            Side::Black => (-8, 6),
        };
        let single = src as i8 + step;
        if dest as i8 == single {
            return Ok(true);
        }
        if dest as i8 == single + step && src.rank() == home_rank {
            if self.board.occupied().is_square_set(Square::from_u8(single as u8)) {
                return Err(IllegalMoveError::PathBlocked(Move::new(src, dest)));
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn apply_move(&mut self, mve: Move, checked: CheckedMove) {
        let pre_board = self.board.clone();
        let pre_state = self.state.clone();
        let pre_hash = self.hash;

        self.unhash_en_passant();

        let side = self.state.to_move;
        let mut reset_clock = false;

        if let CheckedMove::Standard { piece, captured } = checked {
            if let Some((captured_piece, captured_sq)) = captured {
                let opp = side.opposite_side();
                self.board.remove_stone(captured_piece, opp, captured_sq);
                self.hash ^= zobrist::piece_modifier(captured_piece, opp, captured_sq);
                reset_clock = true;

                // A captured rook on its recorded origin square takes the
                // right with it.
                for wing in Wing::iter() {
                    if self.state.castling_rights.rook_square(opp, wing) == Some(captured_sq) {
                        self.state.castling_rights.revoke(opp, wing);
                    }
                }
            }

            if let Some(wing) = mve.castle_wing() {
                let rook_src = self
                    .state
                    .castling_rights
                    .rook_square(side, wing)
                    .expect("castle passed check_move");
                let rook_dest = movegen::castle_rook_dest(side, wing);
                // Remove both before placing both: with arbitrary Chess960
                // files the four squares may overlap.
                self.board.remove_stone(Piece::King, side, mve.src());
                self.board.remove_stone(Piece::Rook, side, rook_src);
                self.board.put_stone(Piece::King, side, mve.dest());
                self.board.put_stone(Piece::Rook, side, rook_dest);

                self.hash ^= zobrist::piece_modifier(Piece::King, side, mve.src());
                self.hash ^= zobrist::piece_modifier(Piece::King, side, mve.dest());
                self.hash ^= zobrist::piece_modifier(Piece::Rook, side, rook_src);
                self.hash ^= zobrist::piece_modifier(Piece::Rook, side, rook_dest);
            } else if let Some(promotion) = mve.promotion() {
                self.board.remove_stone(Piece::Pawn, side, mve.src());
                self.board.put_stone(promotion, side, mve.dest());
                self.hash ^= zobrist::piece_modifier(Piece::Pawn, side, mve.src());
                self.hash ^= zobrist::piece_modifier(promotion, side, mve.dest());
            } else {
                self.board.remove_stone(piece, side, mve.src());
                self.board.put_stone(piece, side, mve.dest());
                self.hash ^= zobrist::piece_modifier(piece, side, mve.src());
                self.hash ^= zobrist::piece_modifier(piece, side, mve.dest());
            }

            if piece == Piece::King {
                self.state.castling_rights.revoke_side(side);
            }
            if piece == Piece::Rook {
                for wing in Wing::iter() {
                    if self.state.castling_rights.rook_square(side, wing) == Some(mve.src()) {
                        self.state.castling_rights.revoke(side, wing);
                    }
                }
            }
            if piece == Piece::Pawn {
                reset_clock = true;
            }

            self.state.en_passant_target =
                if piece == Piece::Pawn && mve.src().abs_diff(mve.dest()) == 16 {
                    Some(Square::from_u8((mve.src() as u8 + mve.dest() as u8) / 2))
                } else {
                    None
                };
        } else {
            self.state.en_passant_target = None;
        }

        let old_mask = pre_state.castling_rights.mask();
        let new_mask = self.state.castling_rights.mask();
        if old_mask != new_mask {
            self.hash ^=
                zobrist::castling_modifier(old_mask) ^ zobrist::castling_modifier(new_mask);
        }

        self.state.half_move_clock = if reset_clock {
            0
        } else {
            self.state.half_move_clock + 1
        };
        self.state.to_move = side.opposite_side();
        self.state.ply += 1;
        self.hash ^= zobrist::SIDE_TO_PLAY;

        self.rehash_en_passant();

        let mut changed = 0;
        let mut words = ArrayVec::new();
        let mut diff = |flag: u8, old: BitBoard, new: BitBoard| {
            if old != new {
                changed |= flag;
                words.push(old.to_val());
            }
        };
        diff(WORD_WHITE, pre_board.white, self.board.white);
        diff(WORD_BLACK, pre_board.black, self.board.black);
        diff(WORD_PAWNS, pre_board.pawns, self.board.pawns);
        diff(WORD_KNIGHTS, pre_board.knights, self.board.knights);
        diff(
            WORD_BISHOP_QUEEN,
            pre_board.bishop_queen,
            self.board.bishop_queen,
        );
        diff(WORD_ROOK_QUEEN, pre_board.rook_queen, self.board.rook_queen);

        self.undo_log.push(UndoEntry {
            mve,
            changed,
            words,
            white_king: pre_board.white_king,
            black_king: pre_board.black_king,
            state: pre_state,
            hash: pre_hash,
        });

        debug_assert_eq!(
            self.hash,
            Self::calculate_hash(&self.board, &self.state),
            "incremental hash diverged applying {:?}",
            mve
        );
    }
}

// Logs and the derived hash don't take part in equality.
impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.board == other.board && self.state == other.state
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut board_str = String::with_capacity(64 + 7);
        Square::list_white_perspective()
            .into_iter()
            .enumerate()
            .for_each(|(idx, square)| {
                let ch = match self.piece_at(square) {
                    Some((p, Side::White)) => <Piece as Into<char>>::into(p).to_ascii_uppercase(),
                    Some((p, Side::Black)) => p.into(),
                    None => '.',
                };
                board_str.push(ch);
                if (idx + 1) % 8 == 0 && idx != 63 {
                    board_str.push('\n');
                }
            });
        write!(f, "{}", board_str)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
