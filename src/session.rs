//! One annotated game: header record, move tree, live position, cursor.
//!
//! The invariant the session maintains: the live [`Position`] always equals
//! the start position plus the moves from the tree root to the cursor.
//! Every navigation or edit runs inside a reentrant batch scope, so
//! listeners observe at most one notification per user-level operation even
//! when many moves replay internally.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::movecode::Move;
use crate::movetree::{MoveTree, ROOT};
use crate::position::{FenParseError, IllegalMoveError, Position, START_FEN};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    #[default]
    Unknown,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::Unknown => "*",
        };
        write!(f, "{}", text)
    }
}

/// The header record: the seven-tag-roster style fields plus free-form tags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GameHeader {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub round: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub white_elo: Option<u16>,
    pub black_elo: Option<u16>,
    pub result: GameResult,
    tags: BTreeMap<String, String>,
}

impl GameHeader {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn set_tag(&mut self, name: &str, value: &str) {
        self.tags.insert(name.to_string(), value.to_string());
    }

    pub fn remove_tag(&mut self, name: &str) -> bool {
        self.tags.remove(name).is_some()
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every field and tag this header defines is present, with the same
    /// value, in `other`. An `Unknown` result counts as undefined.
    pub fn is_subset_of(&self, other: &GameHeader) -> bool {
        fn covered<T: PartialEq>(ours: &Option<T>, theirs: &Option<T>) -> bool {
            match ours {
                None => true,
                Some(value) => theirs.as_ref() == Some(value),
            }
        }

        covered(&self.event, &other.event)
            && covered(&self.site, &other.site)
            && covered(&self.date, &other.date)
            && covered(&self.round, &other.round)
            && covered(&self.white, &other.white)
            && covered(&self.black, &other.black)
            && covered(&self.white_elo, &other.white_elo)
            && covered(&self.black_elo, &other.black_elo)
            && (self.result == GameResult::Unknown || self.result == other.result)
            && self
                .tags
                .iter()
                .all(|(name, value)| other.tag(name) == Some(value.as_str()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionChange {
    MoveDone,
    MoveUndone,
    StartPositionChanged,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GameEvent {
    HeaderChanged,
    MoveTreeChanged,
    PositionChanged {
        change: PositionChange,
        mve: Option<Move>,
        fen: String,
    },
}

/// Depth-first traversal events: the main line first, then at each branch
/// point every variation in original order.
#[derive(Debug, PartialEq, Eq)]
pub enum TraverseEvent {
    LineStart { depth: usize },
    LineEnd { depth: usize },
    Move { node: usize, mve: Move, ply: u16 },
    Glyph { node: usize, nag: u8 },
    Comment { node: usize, text: String },
}

type Listener = Box<dyn FnMut(&GameEvent)>;

#[derive(Default)]
struct PendingEvents {
    header: bool,
    tree: bool,
    position: Option<(PositionChange, Option<Move>)>,
}

impl PendingEvents {
    fn is_empty(&self) -> bool {
        !self.header && !self.tree && self.position.is_none()
    }
}

pub struct Game {
    header: GameHeader,
    tree: MoveTree,
    position: Position,
    /// Canonical start FEN for fragment games; `None` is the standard
    /// start position.
    start_fen: Option<String>,
    start_ply: u16,
    cursor: usize,
    listeners: Vec<Listener>,
    batch_depth: u32,
    pending: PendingEvents,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Self {
        Self::with_position(Position::start(), None)
    }

    /// A fragment game starting from the given FEN.
    pub fn from_start_fen(fen: &str) -> Result<Self, FenParseError> {
        let position = Position::from_fen(fen)?;
        let canonical = position.to_fen(6);
        Ok(Self::with_position(position, Some(canonical)))
    }

    fn with_position(position: Position, start_fen: Option<String>) -> Self {
        let start_ply = position.ply();
        Self {
            header: GameHeader::default(),
            tree: MoveTree::new(),
            position,
            start_fen,
            start_ply,
            cursor: ROOT,
            listeners: Vec::new(),
            batch_depth: 0,
            pending: PendingEvents::default(),
        }
    }

    pub fn header(&self) -> &GameHeader {
        &self.header
    }

    /// Edits the header inside a notification scope.
    pub fn update_header(&mut self, edit: impl FnOnce(&mut GameHeader)) {
        self.with_batch(|game| {
            edit(&mut game.header);
            game.pending.header = true;
        });
    }

    pub fn tree(&self) -> &MoveTree {
        &self.tree
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The move the cursor stands on; `None` at the start of the game.
    pub fn current_move(&self) -> Option<Move> {
        (self.cursor != ROOT).then(|| self.tree.move_at(self.cursor))
    }

    pub fn start_fen(&self) -> &str {
        self.start_fen.as_deref().unwrap_or(START_FEN)
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Replaces the start position. The move tree no longer applies and is
    /// cleared.
    pub fn set_start_position(&mut self, fen: &str) -> Result<(), FenParseError> {
        let position = Position::from_fen(fen)?;
        self.with_batch(|game| {
            game.start_fen = Some(position.to_fen(6));
            game.start_ply = position.ply();
            game.position = position;
            game.tree = MoveTree::new();
            game.cursor = ROOT;
            game.pending.tree = true;
            game.pending.position = Some((PositionChange::StartPositionChanged, None));
        });
        Ok(())
    }

    /// Like [`Game::set_start_position`], but a corrupt FEN falls back to
    /// the standard start position instead of failing. The documented
    /// lenient path for header tags parsed from external input.
    pub fn set_start_position_or_default(&mut self, fen: &str) {
        if let Err(err) = self.set_start_position(fen) {
            warn!("corrupt start FEN ({}), falling back to standard: {}", err, fen);
            self.set_start_position(START_FEN)
                .expect("standard start FEN parses");
        }
    }

    fn with_batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let out = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.flush_events();
        }
        out
    }

    fn flush_events(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);

        let mut events = Vec::with_capacity(3);
        if pending.header {
            events.push(GameEvent::HeaderChanged);
        }
        if pending.tree {
            events.push(GameEvent::MoveTreeChanged);
        }
        if let Some((change, mve)) = pending.position {
            events.push(GameEvent::PositionChanged {
                change,
                mve,
                fen: self.position.to_fen(6),
            });
        }

        // Listeners may subscribe more listeners; keep both sets.
        let mut active = std::mem::take(&mut self.listeners);
        for listener in active.iter_mut() {
            for event in &events {
                listener(event);
            }
        }
        let added = std::mem::replace(&mut self.listeners, active);
        self.listeners.extend(added);
    }

    /// Steps one move forward along the existing continuation. False at the
    /// end of the line.
    pub fn go_forward(&mut self) -> bool {
        self.go_forward_into(0)
    }

    /// Steps forward along the chosen alternative: 0 is the continuation,
    /// `k >= 1` its k-th variation.
    pub fn go_forward_into(&mut self, which_line: usize) -> bool {
        let next = self.tree.go_forward(self.cursor, which_line);
        if self.tree.is_line_end(next) {
            return false;
        }
        let mve = self.tree.move_at(next);
        self.with_batch(|game| {
            game.position
                .do_move(mve)
                .expect("tree moves replay cleanly");
            game.cursor = next;
            game.pending.position = Some((PositionChange::MoveDone, Some(mve)));
        });
        true
    }

    /// Steps one move back, out of a variation where necessary. False at
    /// the start of the game.
    pub fn go_back(&mut self) -> bool {
        if self.cursor == ROOT {
            return false;
        }
        let undone = self.current_move();
        self.with_batch(|game| {
            let took_back = game.position.undo_move();
            debug_assert!(took_back, "cursor moves always have history");
            game.cursor = game.tree.go_back(game.cursor, true).unwrap_or(ROOT);
            game.pending.position = Some((PositionChange::MoveUndone, undone));
        });
        true
    }

    pub fn goto_start(&mut self) {
        self.goto_node(ROOT);
    }

    /// Follows the continuation to the end of the current line.
    pub fn goto_end(&mut self) {
        self.with_batch(|game| while game.go_forward() {});
    }

    /// Moves the cursor to the given node, undoing and replaying the
    /// minimal move suffix.
    pub fn goto_node(&mut self, node: usize) {
        if node == self.cursor {
            return;
        }
        let current_path = self.tree.path_to(self.cursor);
        let target_path = self.tree.path_to(node);
        let common = current_path
            .iter()
            .zip(&target_path)
            .take_while(|(a, b)| a == b)
            .count();
        debug!(
            "goto_node {}: {} back, {} forward",
            node,
            current_path.len() - common,
            target_path.len() - common
        );

        self.with_batch(|game| {
            for _ in common..current_path.len() {
                let took_back = game.position.undo_move();
                debug_assert!(took_back);
            }
            for &mve in &target_path[common..] {
                game.position
                    .do_move(mve)
                    .expect("tree moves replay cleanly");
            }
            game.cursor = node;
            let change = if target_path.len() >= current_path.len() {
                PositionChange::MoveDone
            } else {
                PositionChange::MoveUndone
            };
            game.pending.position = Some((change, game.current_move()));
        });
    }

    /// Walks along the current line to the given game ply.
    pub fn goto_ply(&mut self, ply: u16) {
        self.with_batch(|game| {
            while game.position.ply() > ply && game.go_back() {}
            while game.position.ply() < ply && game.go_forward() {}
        });
    }

    /// Plays a move at the cursor, capturing freeform play into the tree:
    /// an existing alternative carrying the same move is followed, anything
    /// else is appended as a new right-most line.
    pub fn play(&mut self, mve: Move) -> Result<(), IllegalMoveError> {
        self.with_batch(|game| {
            game.position.do_move(mve)?;

            let continuation = game.tree.go_forward(game.cursor, 0);
            let mut found = None;
            if !game.tree.is_line_end(continuation) {
                if game.tree.move_at(continuation) == mve {
                    found = Some(continuation);
                } else {
                    let variations = game.tree.variations(continuation).len();
                    for which in 1..=variations {
                        let alt = game.tree.go_forward(game.cursor, which);
                        if !game.tree.is_line_end(alt) && game.tree.move_at(alt) == mve {
                            found = Some(alt);
                            break;
                        }
                    }
                }
            }

            game.cursor = match found {
                Some(node) => node,
                None => {
                    let node = game.tree.append_as_right_most_line(game.cursor, mve);
                    game.pending.tree = true;
                    node
                }
            };
            game.pending.position = Some((PositionChange::MoveDone, Some(mve)));
            Ok(())
        })
    }

    pub fn comment(&self) -> Option<String> {
        self.tree.comment(self.cursor)
    }

    pub fn set_comment(&mut self, text: &str) {
        self.with_batch(|game| {
            game.tree.set_comment(game.cursor, text);
            game.pending.tree = true;
        });
    }

    pub fn glyphs(&self) -> Vec<u8> {
        self.tree.glyphs(self.cursor)
    }

    pub fn add_glyph(&mut self, nag: u8) {
        self.with_batch(|game| {
            game.tree.add_glyph(game.cursor, nag);
            game.pending.tree = true;
        });
    }

    /// Promotes the variation holding the cursor. The replayed move path is
    /// unchanged, so only the tree shape notifies.
    pub fn promote_variation(&mut self) {
        self.with_batch(|game| {
            game.cursor = game.tree.promote_variation(game.cursor);
            game.pending.tree = true;
        });
    }

    /// Deletes the variation holding the cursor and retreats to the branch
    /// point. On the main line the whole game's moves go.
    pub fn delete_variation(&mut self) {
        self.with_batch(|game| {
            match game.tree.enclosing_variation(game.cursor) {
                Some((start, end)) => {
                    let doomed = game.cursor;
                    let mut undos = 0;
                    while (start..=end).contains(&game.cursor) {
                        if game.current_move().is_some() {
                            undos += 1;
                        }
                        game.cursor = game.tree.go_back(game.cursor, true).unwrap_or(ROOT);
                        if game.cursor == ROOT {
                            break;
                        }
                    }
                    for _ in 0..undos {
                        let took_back = game.position.undo_move();
                        debug_assert!(took_back);
                    }
                    game.tree.delete_current_line(doomed);
                }
                None => {
                    game.goto_start();
                    game.tree.delete_all_lines();
                }
            }
            game.pending.tree = true;
            game.pending.position =
                Some((PositionChange::MoveUndone, game.current_move()));
        });
    }

    /// Truncates the current line after the cursor.
    pub fn delete_remaining(&mut self) {
        self.with_batch(|game| {
            game.tree.delete_remaining_moves(game.cursor);
            game.pending.tree = true;
        });
    }

    /// Compacts the tree's tombstones; the cursor is remapped in place.
    pub fn pack(&mut self) {
        self.with_batch(|game| {
            game.cursor = game.tree.pack(game.cursor);
            game.pending.tree = true;
        });
    }

    /// Depth-first traversal of the whole game.
    pub fn traverse(&self, visitor: &mut impl FnMut(TraverseEvent)) {
        if let Some(text) = self.tree.comment(ROOT) {
            visitor(TraverseEvent::Comment { node: ROOT, text });
        }
        self.walk_line(ROOT, self.start_ply, 0, visitor);
    }

    fn walk_line(
        &self,
        anchor: usize,
        ply: u16,
        depth: usize,
        visitor: &mut impl FnMut(TraverseEvent),
    ) {
        let mut anchor = anchor;
        let mut ply = ply;
        while let Some(node) = self.tree.continuation(anchor) {
            visitor(TraverseEvent::Move {
                node,
                mve: self.tree.move_at(node),
                ply,
            });
            for nag in self.tree.glyphs(node) {
                visitor(TraverseEvent::Glyph { node, nag });
            }
            if let Some(text) = self.tree.comment(node) {
                visitor(TraverseEvent::Comment { node, text });
            }
            for var_start in self.tree.variations(node) {
                visitor(TraverseEvent::LineStart { depth: depth + 1 });
                // A variation alternates with `node`, so it restarts at the
                // same ply.
                self.walk_line(var_start, ply, depth + 1, visitor);
                visitor(TraverseEvent::LineEnd { depth: depth + 1 });
            }
            ply += 1;
            anchor = node;
        }
    }

    /// Structural move equality, comments and glyphs ignored.
    pub fn same_moves(&self, other: &Game) -> bool {
        self.start_fen() == other.start_fen() && self.tree.same_moves(&other.tree)
    }

    /// Recursive containment: true when `other`'s header is a subset of
    /// this one's, the start positions agree, and every branch of `other`'s
    /// moves matches some branch here, with `other`'s comments matching as
    /// substrings. A game always contains a copy of itself; the relation is
    /// not symmetric.
    pub fn contains(&self, other: &Game) -> bool {
        other.header.is_subset_of(&self.header)
            && self.start_fen() == other.start_fen()
            && self.contains_lines(ROOT, other, ROOT)
    }

    fn contains_lines(&self, a_anchor: usize, other: &Game, b_anchor: usize) -> bool {
        for b_node in other.alternatives(b_anchor) {
            let b_move = other.tree.move_at(b_node);
            let matched = self.alternatives(a_anchor).into_iter().any(|a_node| {
                self.tree.move_at(a_node) == b_move
                    && comment_covers(self.tree.comment(a_node), other.tree.comment(b_node))
                    && self.contains_lines(a_node, other, b_node)
            });
            if !matched {
                return false;
            }
        }
        true
    }

    /// All moves reachable from the position after `anchor`: the
    /// continuation plus each variation's first move.
    fn alternatives(&self, anchor: usize) -> Vec<usize> {
        let mut nodes = Vec::new();
        let continuation = self.tree.go_forward(anchor, 0);
        if self.tree.is_line_end(continuation) {
            return nodes;
        }
        nodes.push(continuation);
        for which in 1..=self.tree.variations(continuation).len() {
            let alt = self.tree.go_forward(anchor, which);
            if !self.tree.is_line_end(alt) {
                nodes.push(alt);
            }
        }
        nodes
    }
}

fn comment_covers(ours: Option<String>, theirs: Option<String>) -> bool {
    match theirs {
        None => true,
        Some(needle) => ours.map_or(false, |hay| hay.contains(&needle)),
    }
}

impl Clone for Game {
    /// A full-structure deep copy. Listeners do not follow the clone.
    fn clone(&self) -> Self {
        Self {
            header: self.header.clone(),
            tree: self.tree.clone(),
            position: self.position.clone(),
            start_fen: self.start_fen.clone(),
            start_ply: self.start_ply,
            cursor: self.cursor,
            listeners: Vec::new(),
            batch_depth: 0,
            pending: PendingEvents::default(),
        }
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("header", &self.header)
            .field("cursor", &self.cursor)
            .field("fen", &self.position.to_fen(6))
            .finish()
    }
}
