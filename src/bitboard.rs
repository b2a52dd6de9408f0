use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, FromRepr};

#[rustfmt::skip]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumString, FromRepr, Display, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Square {
    A1, B1, C1, D1, E1, F1, G1, H1,
    A2, B2, C2, D2, E2, F2, G2, H2,
    A3, B3, C3, D3, E3, F3, G3, H3,
    A4, B4, C4, D4, E4, F4, G4, H4,
    A5, B5, C5, D5, E5, F5, G5, H5,
    A6, B6, C6, D6, E6, F6, G6, H6,
    A7, B7, C7, D7, E7, F7, G7, H7,
    A8, B8, C8, D8, E8, F8, G8, H8,
}

impl Square {
    pub(crate) const fn rank(self) -> u8 {
        self as u8 / 8
    }

    pub(crate) const fn file(self) -> u8 {
        self as u8 % 8
    }

    pub(crate) const fn abs_diff(self, other: Square) -> u8 {
        (self as u8).abs_diff(other as u8)
    }

    pub(crate) const fn from_u8(idx: u8) -> Square {
        match Square::from_repr(idx) {
            Some(sq) => sq,
            None => panic!("square out of bounds"),
        }
    }

    pub(crate) const fn from_rank_file(rank: u8, file: u8) -> Square {
        Square::from_u8(rank * 8 + file)
    }

    /// Lowercase algebraic name, e.g. `e4`.
    pub fn notation(self) -> String {
        self.to_string().to_ascii_lowercase()
    }

    #[rustfmt::skip]
    pub const fn list_white_perspective() -> [Square; 64] {
        [
            Square::A8, Square::B8, Square::C8, Square::D8, Square::E8, Square::F8, Square::G8, Square::H8,
            Square::A7, Square::B7, Square::C7, Square::D7, Square::E7, Square::F7, Square::G7, Square::H7,
            Square::A6, Square::B6, Square::C6, Square::D6, Square::E6, Square::F6, Square::G6, Square::H6,
            Square::A5, Square::B5, Square::C5, Square::D5, Square::E5, Square::F5, Square::G5, Square::H5,
            Square::A4, Square::B4, Square::C4, Square::D4, Square::E4, Square::F4, Square::G4, Square::H4,
            Square::A3, Square::B3, Square::C3, Square::D3, Square::E3, Square::F3, Square::G3, Square::H3,
            Square::A2, Square::B2, Square::C2, Square::D2, Square::E2, Square::F2, Square::G2, Square::H2,
            Square::A1, Square::B1, Square::C1, Square::D1, Square::E1, Square::F1, Square::G1, Square::H1,
        ]
    }
}

/// Compass directions over the A1 = 0, H8 = 63 square layout.
#[repr(isize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    North = 8,
    South = -8,
    East = 1,
    West = -1,
    NorthEast = 9,
    NorthWest = 7,
    SouthEast = -7,
    SouthWest = -9,
}

impl Direction {
    pub(crate) const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    pub(crate) const ORTHOGONAL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub(crate) const DIAGONAL: [Direction; 4] = [
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    /// Positive directions scan for blockers from the low end, negative from
    /// the high end.
    pub(crate) const fn is_positive(self) -> bool {
        (self as isize) > 0
    }

    /// Index into tables laid out in [`Direction::ALL`] order.
    pub(crate) const fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
            Direction::NorthEast => 4,
            Direction::NorthWest => 5,
            Direction::SouthEast => 6,
            Direction::SouthWest => 7,
        }
    }

    pub(crate) const fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::NorthEast => Direction::SouthWest,
            Direction::NorthWest => Direction::SouthEast,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    pub(crate) const fn is_orthogonal(self) -> bool {
        matches!(
            self,
            Direction::North | Direction::South | Direction::East | Direction::West
        )
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Hash, Deserialize, Serialize)]
pub struct BitBoard(u64);

impl BitBoard {
    pub(crate) const fn empty() -> Self {
        BitBoard(0)
    }

    pub(crate) const fn full() -> Self {
        BitBoard(u64::MAX)
    }

    pub(crate) const fn from_square(square: Square) -> Self {
        BitBoard(1 << (square as u8))
    }

    pub(crate) fn from_squares(squares: &[Square]) -> Self {
        BitBoard(squares.iter().fold(0, |board, sq| board | 1 << (*sq as u8)))
    }

    pub(crate) const fn from_val(val: u64) -> Self {
        BitBoard(val)
    }

    pub(crate) const fn to_val(self) -> u64 {
        self.0
    }

    pub(crate) fn to_squares(mut self) -> Vec<Square> {
        let mut sqs = Vec::with_capacity(self.0.count_ones() as usize);
        while self.0 != 0 {
            sqs.push(self.pop_lsb());
        }
        sqs
    }

    pub(crate) fn set_square(&mut self, square: Square) {
        self.0 |= 1 << square as u64
    }

    pub(crate) fn clear_square(&mut self, square: Square) {
        self.0 &= !(1 << square as u64)
    }

    pub(crate) const fn is_square_set(&self, square: Square) -> bool {
        self.0 & 1 << (square as u64) != 0
    }

    pub(crate) const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) const fn num_squares_set(self) -> u8 {
        self.0.count_ones() as u8
    }

    /// Single-step shift with edge wrapping masked off.
    pub(crate) const fn shift(self, dir: Direction) -> BitBoard {
        const NOT_FILE_A: u64 = 0xFEFEFEFEFEFEFEFE;
        const NOT_FILE_H: u64 = 0x7F7F7F7F7F7F7F7F;

        let masked = match dir {
            Direction::East | Direction::NorthEast | Direction::SouthEast => self.0 & NOT_FILE_H,
            Direction::West | Direction::NorthWest | Direction::SouthWest => self.0 & NOT_FILE_A,
            _ => self.0,
        };
        let shift_amt = dir as isize;
        if shift_amt >= 0 {
            BitBoard(masked << shift_amt)
        } else {
            BitBoard(masked >> -shift_amt)
        }
    }

    pub(crate) const fn get_lsb(&self) -> Square {
        debug_assert!(self.0 != 0, "want != 0, got 0");
        Square::from_u8(self.0.trailing_zeros() as u8)
    }

    pub(crate) const fn get_msb(&self) -> Square {
        debug_assert!(self.0 != 0, "want != 0, got 0");
        Square::from_u8(63 - self.0.leading_zeros() as u8)
    }

    pub(crate) fn pop_lsb(&mut self) -> Square {
        let lsb = self.get_lsb();
        self.0 &= self.0 - 1;
        lsb
    }

    pub(crate) const fn const_bit_or(self, other: BitBoard) -> BitBoard {
        BitBoard(self.0 | other.0)
    }
}

impl BitOr for BitBoard {
    type Output = BitBoard;

    fn bitor(self, other: BitBoard) -> BitBoard {
        BitBoard(self.0 | other.0)
    }
}

impl BitOrAssign for BitBoard {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

impl BitAnd for BitBoard {
    type Output = BitBoard;

    fn bitand(self, other: BitBoard) -> BitBoard {
        BitBoard(self.0 & other.0)
    }
}

impl BitAndAssign for BitBoard {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0
    }
}

impl BitXor for BitBoard {
    type Output = BitBoard;

    fn bitxor(self, other: BitBoard) -> BitBoard {
        BitBoard(self.0 ^ other.0)
    }
}

impl BitXorAssign for BitBoard {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0
    }
}

impl Not for BitBoard {
    type Output = BitBoard;

    fn not(self) -> Self::Output {
        BitBoard(!self.0)
    }
}

impl fmt::Debug for BitBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut board_str = String::with_capacity(64 + 7);

        for rank in (0..8).rev() {
            for file in 0..8 {
                let square = Square::from_rank_file(rank, file);
                let ch = if self.is_square_set(square) { 'X' } else { '.' };
                board_str.push(ch);
            }
            if rank != 0 {
                board_str.push('\n');
            }
        }

        write!(f, "{}", board_str)
    }
}
