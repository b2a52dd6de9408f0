pub mod bitboard;
pub mod movecode;
pub mod movetree;
pub mod perft;
pub mod position;
pub mod session;

pub use bitboard::{BitBoard, Square};
pub use movecode::{Move, Piece, Side, Token, TokenKind, Wing};
pub use movetree::{MoveTree, ROOT};
pub use perft::{perft, PerftDepthResult, PerftResult};
pub use position::{
    CastlingRights, FenParseError, IllegalMoveError, IllegalPositionError, Position, START_FEN,
};
pub use session::{
    Game, GameEvent, GameHeader, GameResult, PositionChange, TraverseEvent,
};
