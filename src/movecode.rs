use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, FromRepr};

use crate::bitboard::Square;

#[derive(Debug, PartialEq, Eq, EnumIter, Clone, Copy, Display, Hash, Deserialize, Serialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub(crate) fn opposite_side(self) -> Side {
        if self == Side::White {
            Side::Black
        } else {
            Side::White
        }
    }
}

#[repr(u8)]
#[derive(
    Debug, PartialEq, Eq, EnumIter, FromRepr, Clone, Copy, Display, Hash, Deserialize, Serialize,
)]
pub enum Piece {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl Piece {
    pub(crate) fn is_slider(self) -> bool {
        matches!(self, Piece::Bishop | Piece::Rook | Piece::Queen)
    }
}

impl From<Piece> for char {
    fn from(piece: Piece) -> char {
        match piece {
            Piece::Pawn => 'p',
            Piece::Knight => 'n',
            Piece::Bishop => 'b',
            Piece::Rook => 'r',
            Piece::Queen => 'q',
            Piece::King => 'k',
        }
    }
}

impl TryFrom<char> for Piece {
    type Error = char;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'p' => Ok(Piece::Pawn),
            'n' => Ok(Piece::Knight),
            'b' => Ok(Piece::Bishop),
            'r' => Ok(Piece::Rook),
            'q' => Ok(Piece::Queen),
            'k' => Ok(Piece::King),
            _ => Err(value),
        }
    }
}

/// Castling wing. The short wing is the king side.
#[derive(Debug, PartialEq, Eq, EnumIter, Clone, Copy, Display, Hash, Deserialize, Serialize)]
pub enum Wing {
    King,
    Queen,
}

const SRC_SHIFT: u32 = 0;
const DEST_SHIFT: u32 = 6;
const PROMOTION_SHIFT: u32 = 12;
const SQUARE_MASK: u32 = 0x3F;
const PROMOTION_MASK: u32 = 0x7;

const FLAG_CAPTURE: u32 = 1 << 15;
const FLAG_EN_PASSANT: u32 = 1 << 16;
const FLAG_CASTLE_KING: u32 = 1 << 17;
const FLAG_CASTLE_QUEEN: u32 = 1 << 18;
const FLAG_NULL: u32 = 1 << 19;

/// A move packed into one word: origin and destination squares, promotion
/// piece, and capture / en-passant / castling / null flags.
///
/// Castling stores the king's origin and its canonical destination (the g or
/// c file). Chess960 rook origins are not part of the move; they live in the
/// position's castling-rights record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Move(u32);

impl Move {
    pub fn new(src: Square, dest: Square) -> Move {
        Move(pack_squares(src, dest))
    }

    pub fn new_capture(src: Square, dest: Square) -> Move {
        Move(pack_squares(src, dest) | FLAG_CAPTURE)
    }

    pub fn with_promotion(src: Square, dest: Square, promotion: Piece) -> Move {
        debug_assert!(
            matches!(
                promotion,
                Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen
            ),
            "promotion piece: want [N, B, R, Q], got {}",
            promotion
        );
        Move(pack_squares(src, dest) | (promotion as u32) << PROMOTION_SHIFT)
    }

    pub fn with_promotion_capture(src: Square, dest: Square, promotion: Piece) -> Move {
        Move(Move::with_promotion(src, dest, promotion).0 | FLAG_CAPTURE)
    }

    pub fn en_passant(src: Square, dest: Square) -> Move {
        Move(pack_squares(src, dest) | FLAG_CAPTURE | FLAG_EN_PASSANT)
    }

    pub fn castle(wing: Wing, king_src: Square, king_dest: Square) -> Move {
        let flag = match wing {
            Wing::King => FLAG_CASTLE_KING,
            Wing::Queen => FLAG_CASTLE_QUEEN,
        };
        Move(pack_squares(king_src, king_dest) | flag)
    }

    pub fn null() -> Move {
        Move(FLAG_NULL)
    }

    pub fn src(self) -> Square {
        Square::from_u8((self.0 >> SRC_SHIFT & SQUARE_MASK) as u8)
    }

    pub fn dest(self) -> Square {
        Square::from_u8((self.0 >> DEST_SHIFT & SQUARE_MASK) as u8)
    }

    pub fn promotion(self) -> Option<Piece> {
        match self.0 >> PROMOTION_SHIFT & PROMOTION_MASK {
            0 => None,
            repr => Some(Piece::from_repr(repr as u8).expect("promotion bits hold a piece")),
        }
    }

    pub fn is_capture(self) -> bool {
        self.0 & FLAG_CAPTURE != 0
    }

    pub fn is_en_passant(self) -> bool {
        self.0 & FLAG_EN_PASSANT != 0
    }

    pub fn castle_wing(self) -> Option<Wing> {
        if self.0 & FLAG_CASTLE_KING != 0 {
            Some(Wing::King)
        } else if self.0 & FLAG_CASTLE_QUEEN != 0 {
            Some(Wing::Queen)
        } else {
            None
        }
    }

    pub fn is_castle(self) -> bool {
        self.castle_wing().is_some()
    }

    pub fn is_null(self) -> bool {
        self.0 & FLAG_NULL != 0
    }

    pub(crate) fn bits(self) -> u32 {
        self.0
    }

    pub(crate) fn from_bits(bits: u32) -> Move {
        Move(bits)
    }
}

fn pack_squares(src: Square, dest: Square) -> u32 {
    (src as u32) << SRC_SHIFT | (dest as u32) << DEST_SHIFT
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "0000");
        }
        write!(f, "{}{}", self.src().notation(), self.dest().notation())?;
        if let Some(promotion) = self.promotion() {
            write!(f, "{}", <Piece as Into<char>>::into(promotion))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src(), self.dest())?;
        if let Some(promotion) = self.promotion() {
            write!(f, " ({})", promotion)?;
        }
        if let Some(wing) = self.castle_wing() {
            write!(f, " (castle {})", wing)?;
        }
        if self.is_en_passant() {
            write!(f, " (ep)")?;
        }
        Ok(())
    }
}

const TAG_SHIFT: u32 = 28;
const PAYLOAD_MASK: u32 = (1 << TAG_SHIFT) - 1;

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromRepr, Display)]
pub enum TokenKind {
    Move = 0x0,
    LineStart = 0x1,
    LineEnd = 0x2,
    CommentStart = 0x3,
    CommentEnd = 0x4,
    Char = 0x5,
    Glyph = 0x6,
    Empty = 0xF,
}

/// One slot of the flat game-tree sequence: either a packed [`Move`] or a
/// structural sentinel sharing the same numeric space. The tag lives in the
/// top four bits, payloads in the rest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Token(u32);

impl Token {
    pub const LINE_START: Token = Token((TokenKind::LineStart as u32) << TAG_SHIFT);
    pub const LINE_END: Token = Token((TokenKind::LineEnd as u32) << TAG_SHIFT);
    pub const COMMENT_START: Token = Token((TokenKind::CommentStart as u32) << TAG_SHIFT);
    pub const COMMENT_END: Token = Token((TokenKind::CommentEnd as u32) << TAG_SHIFT);
    /// The tombstone value deleted and not-yet-used slots hold.
    pub const EMPTY: Token = Token((TokenKind::Empty as u32) << TAG_SHIFT);

    pub fn from_move(mve: Move) -> Token {
        debug_assert!(mve.bits() & !PAYLOAD_MASK == 0);
        Token(mve.bits())
    }

    pub fn character(ch: char) -> Token {
        Token((TokenKind::Char as u32) << TAG_SHIFT | ch as u32)
    }

    pub fn glyph(nag: u8) -> Token {
        Token((TokenKind::Glyph as u32) << TAG_SHIFT | nag as u32)
    }

    pub fn kind(self) -> TokenKind {
        TokenKind::from_repr((self.0 >> TAG_SHIFT) as u8)
            .unwrap_or_else(|| panic!("token tag out of range: {:#x}", self.0))
    }

    pub fn is_move(self) -> bool {
        self.kind() == TokenKind::Move
    }

    pub fn as_move(self) -> Move {
        assert!(self.is_move(), "token is {}, want Move", self.kind());
        Move::from_bits(self.0)
    }

    pub fn as_char(self) -> char {
        assert!(
            self.kind() == TokenKind::Char,
            "token is {}, want Char",
            self.kind()
        );
        char::from_u32(self.0 & PAYLOAD_MASK).expect("char token holds a scalar value")
    }

    pub fn as_glyph(self) -> u8 {
        assert!(
            self.kind() == TokenKind::Glyph,
            "token is {}, want Glyph",
            self.kind()
        );
        (self.0 & PAYLOAD_MASK) as u8
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TokenKind::Move => write!(f, "Move({})", self.as_move()),
            TokenKind::Char => write!(f, "Char({:?})", self.as_char()),
            TokenKind::Glyph => write!(f, "Glyph({})", self.as_glyph()),
            kind => write!(f, "{}", kind),
        }
    }
}
