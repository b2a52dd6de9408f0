use std::str::FromStr;

use crate::bitboard::Square::*;
use crate::bitboard::Square;
use crate::movecode::{Piece, Side, Wing};
use crate::position::{Board, CastlingRights, Position, State};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(thiserror::Error, Debug)]
pub enum FenParseError {
    #[error("num fields: want 1..=6 got {0}")]
    NumFields(usize),

    #[error("piece placement: got {0}, err at {1}")]
    PiecePlacement(String, usize),

    #[error("piece placement: want exactly one {0} king")]
    KingCount(Side),

    #[error("side to move: want 'w'|'b' got {0}")]
    SideToMove(String),

    #[error("castling rights: got {0}, err at idx {1}")]
    CastlingRights(String, usize),

    #[error("en passant target: got {0}")]
    EnPassantTarget(String),

    #[error("halfmove clock: got {0}")]
    HalfmoveClock(String),

    #[error("full move number: want >= 1 got {0}")]
    FullMoveNumber(String),
}

const FEN_SQUARE_ORDER: [Square; 64] = [
    A8, B8, C8, D8, E8, F8, G8, H8, A7, B7, C7, D7, E7, F7, G7, H7, A6, B6, C6, D6, E6, F6, G6, H6,
    A5, B5, C5, D5, E5, F5, G5, H5, A4, B4, C4, D4, E4, F4, G4, H4, A3, B3, C3, D3, E3, F3, G3, H3,
    A2, B2, C2, D2, E2, F2, G2, H2, A1, B1, C1, D1, E1, F1, G1, H1,
];

impl Position {
    /// Parses one to six space-separated FEN fields. Missing trailing fields
    /// default: White to move, castling rights only where king and rook
    /// still stand on their classical home squares, no en-passant target,
    /// clocks zero.
    pub fn from_fen(fen: &str) -> Result<Self, FenParseError> {
        let fields = fen.split_whitespace().collect::<Vec<&str>>();

        if fields.is_empty() || fields.len() > 6 {
            Err(FenParseError::NumFields(fields.len()))?
        }

        let board = board_from_fen(fields[0])?;

        let to_move = match fields.get(1) {
            None | Some(&"w") => Side::White,
            Some(&"b") => Side::Black,
            Some(other) => Err(FenParseError::SideToMove(other.to_string()))?,
        };

        let castling_rights = match fields.get(2) {
            Some(text) => castling_rights_from_fen(text, &board)?,
            None => default_castling_rights(&board),
        };

        let en_passant_target = match fields.get(3) {
            Some(text) => en_passant_target_from_fen(text)?,
            None => None,
        };

        let half_move_clock = match fields.get(4) {
            Some(text) => text
                .parse::<u16>()
                .map_err(|_| FenParseError::HalfmoveClock(text.to_string()))?,
            None => 0,
        };

        let full_move_number = match fields.get(5) {
            Some(text) => {
                let number = text
                    .parse::<u16>()
                    .map_err(|_| FenParseError::FullMoveNumber(text.to_string()))?;
                if number == 0 {
                    Err(FenParseError::FullMoveNumber(text.to_string()))?
                }
                number
            }
            None => 1,
        };

        let ply = (full_move_number - 1) * 2 + (to_move == Side::Black) as u16;

        let state = State {
            to_move,
            castling_rights,
            en_passant_target,
            half_move_clock,
            ply,
        };

        Ok(Position::from_parts(board, state))
    }

    /// The canonical FEN text truncated to the first `field_count` fields.
    /// `field_count` outside 1..=6 is a programmer error.
    pub fn to_fen(&self, field_count: usize) -> String {
        assert!(
            (1..=6).contains(&field_count),
            "field count: want 1..=6, got {}",
            field_count
        );

        let mut fields = Vec::with_capacity(6);
        fields.push(self.placement_field());

        fields.push(match self.state.to_move {
            Side::White => "w".to_string(),
            Side::Black => "b".to_string(),
        });

        fields.push(castling_rights_to_fen(&self.state.castling_rights));

        fields.push(match self.state.en_passant_target {
            Some(target) => target.notation(),
            None => "-".to_string(),
        });

        fields.push(self.state.half_move_clock.to_string());
        fields.push(self.state.full_move_number().to_string());

        fields[..field_count].join(" ")
    }

    fn placement_field(&self) -> String {
        let mut placement = String::with_capacity(64 + 7);
        let mut empty_run = 0;

        for (idx, &sq) in FEN_SQUARE_ORDER.iter().enumerate() {
            if let Some((piece, side)) = self.piece_at(sq) {
                if empty_run != 0 {
                    placement += &empty_run.to_string();
                    empty_run = 0;
                }
                let piece_char: char = piece.into();
                if side == Side::White {
                    placement.push(piece_char.to_ascii_uppercase());
                } else {
                    placement.push(piece_char);
                }
            } else {
                empty_run += 1;
            }
            if (idx + 1) % 8 == 0 {
                if empty_run != 0 {
                    placement += &empty_run.to_string();
                    empty_run = 0;
                }
                if idx != 63 {
                    placement.push('/');
                }
            }
        }
        placement
    }
}

fn board_from_fen(placement: &str) -> Result<Board, FenParseError> {
    let mut board = Board::empty();
    let mut kings = [0u8; 2];
    let mut sq_idx = 0;

    for (ch_idx, ch) in placement.chars().enumerate() {
        if let Some(digit) = ch.to_digit(10) {
            sq_idx += digit as usize;
        } else if ch == '/' {
            // Rank separators carry no position information of their own.
        } else if let Ok(piece) = Piece::try_from(ch.to_ascii_lowercase()) {
            if sq_idx >= 64 {
                Err(FenParseError::PiecePlacement(placement.to_string(), ch_idx))?
            }
            let square = FEN_SQUARE_ORDER[sq_idx];
            let side = if ch.is_uppercase() {
                Side::White
            } else {
                Side::Black
            };
            if piece == Piece::King {
                kings[side as usize] += 1;
            }
            board.put_stone(piece, side, square);
            sq_idx += 1;
        } else {
            Err(FenParseError::PiecePlacement(placement.to_string(), ch_idx))?
        }
    }

    if sq_idx != 64 {
        Err(FenParseError::PiecePlacement(
            placement.to_string(),
            placement.len(),
        ))?
    }
    for side in [Side::White, Side::Black] {
        if kings[side as usize] != 1 {
            Err(FenParseError::KingCount(side))?
        }
    }

    Ok(board)
}

/// Accepts `-`, the standard `KQkq` letters, and Chess960 per-file letters
/// (`A`..`H` / `a`..`h`). `K`/`Q` resolve to the outermost rook on that
/// wing, which also covers X-FEN input for Chess960 setups.
fn castling_rights_from_fen(text: &str, board: &Board) -> Result<CastlingRights, FenParseError> {
    let mut rights = CastlingRights::none();
    if text.is_empty() || text == "-" {
        return Ok(rights);
    }

    for (idx, ch) in text.chars().enumerate() {
        let side = if ch.is_ascii_uppercase() {
            Side::White
        } else {
            Side::Black
        };
        let back_rank = match side {
            Side::White => 0,
            Side::Black => 7,
        };
        let king_sq = board.king_square(side);
        if king_sq.rank() != back_rank || !board.side(side).is_square_set(king_sq) {
            Err(FenParseError::CastlingRights(text.to_string(), idx))?
        }
        let rooks = board.pieces(Piece::Rook, side);

        let (wing, rook_sq) = match ch.to_ascii_lowercase() {
            'k' => {
                let found = (king_sq.file() + 1..8)
                    .rev()
                    .map(|file| Square::from_rank_file(back_rank, file))
                    .find(|&sq| rooks.is_square_set(sq));
                (Wing::King, found)
            }
            'q' => {
                let found = (0..king_sq.file())
                    .map(|file| Square::from_rank_file(back_rank, file))
                    .find(|&sq| rooks.is_square_set(sq));
                (Wing::Queen, found)
            }
            file_ch @ 'a'..='h' => {
                let file = file_ch as u8 - b'a';
                let sq = Square::from_rank_file(back_rank, file);
                let wing = if file > king_sq.file() {
                    Wing::King
                } else {
                    Wing::Queen
                };
                (wing, rooks.is_square_set(sq).then_some(sq))
            }
            _ => Err(FenParseError::CastlingRights(text.to_string(), idx))?,
        };

        let Some(rook_sq) = rook_sq else {
            Err(FenParseError::CastlingRights(text.to_string(), idx))?
        };
        if rights.has(side, wing) {
            Err(FenParseError::CastlingRights(text.to_string(), idx))?
        }
        rights.grant(side, wing, rook_sq);
    }

    Ok(rights)
}

/// Rights granted only where both king and rook still stand on their
/// classical home squares. Used when the FEN omits the castling field.
fn default_castling_rights(board: &Board) -> CastlingRights {
    let mut rights = CastlingRights::none();
    let homes = [
        (Side::White, E1, [(Wing::King, H1), (Wing::Queen, A1)]),
        (Side::Black, E8, [(Wing::King, H8), (Wing::Queen, A8)]),
    ];
    for (side, king_home, wings) in homes {
        if board.king_square(side) != king_home || !board.side(side).is_square_set(king_home) {
            continue;
        }
        for (wing, rook_home) in wings {
            if board.pieces(Piece::Rook, side).is_square_set(rook_home) {
                rights.grant(side, wing, rook_home);
            }
        }
    }
    rights
}

fn castling_rights_to_fen(rights: &CastlingRights) -> String {
    if rights.is_empty() {
        return "-".to_string();
    }

    let mut text = String::with_capacity(4);
    let order = [
        (Side::White, Wing::King, 'K'),
        (Side::White, Wing::Queen, 'Q'),
        (Side::Black, Wing::King, 'k'),
        (Side::Black, Wing::Queen, 'q'),
    ];
    let classical = rights.is_classical();
    for (side, wing, classical_ch) in order {
        let Some(rook_sq) = rights.rook_square(side, wing) else {
            continue;
        };
        if classical {
            text.push(classical_ch);
        } else {
            let file_ch = (b'a' + rook_sq.file()) as char;
            text.push(match side {
                Side::White => file_ch.to_ascii_uppercase(),
                Side::Black => file_ch,
            });
        }
    }
    text
}

fn en_passant_target_from_fen(text: &str) -> Result<Option<Square>, FenParseError> {
    if text == "-" {
        return Ok(None);
    }

    // FEN uses lowercase square names, Square uses uppercase.
    Square::from_str(&text.to_uppercase())
        .map_err(|_| FenParseError::EnPassantTarget(text.to_string()))
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movecode::Move;
    use test_case::test_case;
    use testresult::TestResult;

    #[test_case("-", 0b0000 ; "empty")]
    #[test_case("KQkq", 0b1111 ; "all")]
    #[test_case("Qk", 0b0110 ; "Qk")]
    #[test_case("K", 0b0001 ; "K")]
    fn test_castling_rights_from_fen(inp: &str, want_mask: u8) -> TestResult {
        let board = board_from_fen("r3k2r/8/8/8/8/8/8/R3K2R")?;
        let got = castling_rights_from_fen(inp, &board)?;
        assert_eq!(got.mask(), want_mask);
        Ok(())
    }

    #[test_case("abc" ; "garbage")]
    #[test_case("KK" ; "duplicate")]
    fn test_castling_rights_from_fen_invalid(inp: &str) -> TestResult {
        let board = board_from_fen("r3k2r/8/8/8/8/8/8/R3K2R")?;
        let got = castling_rights_from_fen(inp, &board);
        assert!(matches!(got, Err(FenParseError::CastlingRights(_, _))));
        Ok(())
    }

    #[test]
    fn test_castling_rights_no_rook_on_wing() -> TestResult {
        let board = board_from_fen("4k3/8/8/8/8/8/8/4K2R")?;
        assert!(castling_rights_from_fen("K", &board).is_ok());
        assert!(castling_rights_from_fen("Q", &board).is_err());
        Ok(())
    }

    #[test]
    fn test_castling_rights_chess960_letters() -> TestResult {
        // King on c1, rooks on b1 and g1.
        let board = board_from_fen("4k3/8/8/8/8/8/8/1RK3R1")?;
        let rights = castling_rights_from_fen("GB", &board)?;
        assert_eq!(rights.rook_square(Side::White, Wing::King), Some(G1));
        assert_eq!(rights.rook_square(Side::White, Wing::Queen), Some(B1));
        Ok(())
    }

    #[test_case("-", None      ; "empty")]
    #[test_case("e3", Some(E3) ; "e3")]
    #[test_case("c6", Some(C6) ; "c6")]
    fn test_en_passant_target_from_fen(inp: &str, want: Option<Square>) -> TestResult {
        let got = en_passant_target_from_fen(inp)?;
        assert_eq!(got, want);
        Ok(())
    }

    #[test_case("abc")]
    fn test_en_passant_target_from_fen_invalid(inp: &str) {
        let got = en_passant_target_from_fen(inp);
        assert!(matches!(got, Err(FenParseError::EnPassantTarget(_))));
    }

    #[test_case("1R2k3/2Q5/8/8/7p/8/5P1P/6K1" ; "fragment")]
    #[test_case("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R" ; "kiwipete placement")]
    fn test_placement_roundtrip(placement: &str) -> TestResult {
        let pos = Position::from_fen(placement)?;
        assert_eq!(pos.to_fen(1), placement);
        Ok(())
    }

    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1" ; "start")]
    #[test_case("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1" ; "kiwipete")]
    #[test_case("8/8/8/4k3/8/3P4/5K2/r7 w - - 1 1" ; "random")]
    #[test_case("4k3/8/8/8/8/8/8/4K3 b - - 7 31" ; "bare kings")]
    fn test_full_roundtrip(fen: &str) -> TestResult {
        let pos = Position::from_fen(fen)?;
        assert_eq!(pos.to_fen(6), fen);
        Ok(())
    }

    #[test]
    fn test_start_fen_parses_to_start() -> TestResult {
        assert_eq!(Position::from_fen(START_FEN)?, Position::start());
        Ok(())
    }

    #[test]
    fn test_missing_fields_default() -> TestResult {
        let pos = Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR")?;
        assert_eq!(pos.to_move(), Side::White);
        // Kings and rooks are home, so the default grants everything.
        assert_eq!(pos.castling_rights().mask(), 0b1111);
        assert_eq!(pos.en_passant_target(), None);
        assert_eq!(pos.half_move_clock(), 0);
        assert_eq!(pos.state.full_move_number(), 1);
        assert_eq!(pos, Position::start());
        Ok(())
    }

    #[test]
    fn test_missing_castling_field_respects_board() -> TestResult {
        // The h1 rook is gone: no white king-side right by default.
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K3 w")?;
        assert!(!pos.castling_rights().has(Side::White, Wing::King));
        assert!(pos.castling_rights().has(Side::White, Wing::Queen));
        assert!(pos.castling_rights().has(Side::Black, Wing::King));
        assert!(pos.castling_rights().has(Side::Black, Wing::Queen));
        Ok(())
    }

    #[test]
    fn test_to_fen_truncates() -> TestResult {
        let pos = Position::from_fen("8/8/8/4k3/8/3P4/5K2/r7 w - - 1 4")?;
        assert_eq!(pos.to_fen(1), "8/8/8/4k3/8/3P4/5K2/r7");
        assert_eq!(pos.to_fen(2), "8/8/8/4k3/8/3P4/5K2/r7 w");
        assert_eq!(pos.to_fen(4), "8/8/8/4k3/8/3P4/5K2/r7 w - -");
        assert_eq!(pos.to_fen(6), "8/8/8/4k3/8/3P4/5K2/r7 w - - 1 4");
        Ok(())
    }

    #[test_case("" ; "empty string")]
    #[test_case("8/8/8/4k3/8/3P4/5K2/r7 w - - 1 4 extra" ; "seven fields")]
    fn test_num_fields_err(fen: &str) {
        assert!(matches!(
            Position::from_fen(fen),
            Err(FenParseError::NumFields(_))
        ));
    }

    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX w KQkq - 0 1" ; "bad piece char")]
    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP w KQkq - 0 1" ; "short placement")]
    fn test_piece_placement_err(fen: &str) {
        assert!(matches!(
            Position::from_fen(fen),
            Err(FenParseError::PiecePlacement(_, _))
        ));
    }

    #[test]
    fn test_missing_king_err() {
        assert!(matches!(
            Position::from_fen("8/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenParseError::KingCount(Side::Black))
        ));
    }

    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1" ; "side")]
    fn test_side_to_move_err(fen: &str) {
        assert!(matches!(
            Position::from_fen(fen),
            Err(FenParseError::SideToMove(_))
        ));
    }

    #[test_case("4k3/8/8/8/8/8/8/4K3 w - - zz 1", FenParseError::HalfmoveClock(String::new()) ; "halfmove")]
    #[test_case("4k3/8/8/8/8/8/8/4K3 w - - 0 0", FenParseError::FullMoveNumber(String::new()) ; "fullmove zero")]
    fn test_clock_errs(fen: &str, want: FenParseError) {
        let got = Position::from_fen(fen);
        match want {
            FenParseError::HalfmoveClock(_) => {
                assert!(matches!(got, Err(FenParseError::HalfmoveClock(_))))
            }
            FenParseError::FullMoveNumber(_) => {
                assert!(matches!(got, Err(FenParseError::FullMoveNumber(_))))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_ply_offset_from_fragment() -> TestResult {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 31")?;
        assert_eq!(pos.ply(), 61);
        assert_eq!(pos.state.full_move_number(), 31);
        Ok(())
    }

    #[test]
    fn test_chess960_roundtrip_uses_file_letters() -> TestResult {
        let fen = "1rk3r1/pppppppp/8/8/8/8/PPPPPPPP/1RK3R1 w GBgb - 0 1";
        let pos = Position::from_fen(fen)?;
        assert_eq!(pos.to_fen(6), fen);
        Ok(())
    }

    #[test]
    fn test_fields_after_first_move() -> TestResult {
        let mut pos =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")?;
        pos.do_move(Move::new(E2, E4))?;
        assert_eq!(pos.to_fen(1), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR");
        assert_eq!(pos.to_move(), Side::Black);
        assert_eq!(pos.castling_rights().mask(), 0b1111);
        assert_eq!(pos.half_move_clock(), 0);
        assert_eq!(pos.state.full_move_number(), 1);
        Ok(())
    }
}
