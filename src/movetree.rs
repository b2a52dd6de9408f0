//! The annotated game tree as one flat token sequence.
//!
//! Grammar over [`Token`]s:
//!
//! ```text
//! Game := LineStart Line LineEnd
//! Line := Comment? (Move Glyph* Comment? (LineStart Line LineEnd)*)*
//! ```
//!
//! The outermost bracket pair is the main line; every nested pair is a
//! variation attached after the move it alternates with. A node is just a
//! sequence index of a move token (the root index 0, the outer line-start,
//! stands for the position before the first move). Deleting never shifts
//! surviving tokens: the affected run is overwritten with tombstones that
//! stay in place until [`MoveTree::pack`]. Passing an index that is neither
//! a move nor a line start is a programmer error and panics.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::movecode::{Move, Token, TokenKind};

/// Node index of the outer line start.
pub const ROOT: usize = 0;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MoveTree {
    tokens: Vec<Token>,
}

impl Default for MoveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveTree {
    pub fn new() -> Self {
        Self {
            tokens: vec![Token::LINE_START, Token::LINE_END],
        }
    }

    pub fn is_line_end(&self, idx: usize) -> bool {
        self.tokens[idx].kind() == TokenKind::LineEnd
    }

    pub fn move_at(&self, node: usize) -> Move {
        self.tokens[node].as_move()
    }

    pub fn is_empty(&self) -> bool {
        self.continuation(ROOT).is_none()
    }

    fn assert_anchor(&self, node: usize) {
        let kind = self.tokens[node].kind();
        assert!(
            kind == TokenKind::Move || kind == TokenKind::LineStart,
            "node {}: want a move or line start, got {}",
            node,
            kind
        );
    }

    fn next_idx(&self, mut idx: usize) -> usize {
        loop {
            idx += 1;
            if self.tokens[idx] != Token::EMPTY {
                return idx;
            }
        }
    }

    fn prev_idx(&self, mut idx: usize) -> Option<usize> {
        while idx > 0 {
            idx -= 1;
            if self.tokens[idx] != Token::EMPTY {
                return Some(idx);
            }
        }
        None
    }

    fn matching_line_end(&self, start: usize) -> usize {
        debug_assert_eq!(self.tokens[start].kind(), TokenKind::LineStart);
        let mut depth = 0;
        let mut idx = start;
        loop {
            match self.tokens[idx].kind() {
                TokenKind::LineStart => depth += 1,
                TokenKind::LineEnd => {
                    depth -= 1;
                    if depth == 0 {
                        return idx;
                    }
                }
                _ => (),
            }
            idx = self.next_idx(idx);
        }
    }

    fn matching_line_start(&self, end: usize) -> usize {
        debug_assert_eq!(self.tokens[end].kind(), TokenKind::LineEnd);
        let mut depth = 0;
        let mut idx = end;
        loop {
            match self.tokens[idx].kind() {
                TokenKind::LineEnd => depth += 1,
                TokenKind::LineStart => {
                    depth -= 1;
                    if depth == 0 {
                        return idx;
                    }
                }
                _ => (),
            }
            idx = self.prev_idx(idx).expect("brackets are balanced");
        }
    }

    fn matching_comment_end(&self, start: usize) -> usize {
        debug_assert_eq!(self.tokens[start].kind(), TokenKind::CommentStart);
        let mut idx = self.next_idx(start);
        while self.tokens[idx].kind() != TokenKind::CommentEnd {
            debug_assert_eq!(self.tokens[idx].kind(), TokenKind::Char);
            idx = self.next_idx(idx);
        }
        idx
    }

    /// First token after `node`'s own glyphs and comment: a variation start,
    /// the continuation move, or the enclosing line end.
    fn after_annotations(&self, node: usize) -> usize {
        let mut idx = self.next_idx(node);
        loop {
            match self.tokens[idx].kind() {
                TokenKind::Glyph => idx = self.next_idx(idx),
                TokenKind::CommentStart => idx = self.next_idx(self.matching_comment_end(idx)),
                _ => return idx,
            }
        }
    }

    /// The stopping token of `node`'s continuation scan: the next move in
    /// the same line, or the enclosing line end.
    fn continuation_stop(&self, node: usize) -> usize {
        let mut idx = self.after_annotations(node);
        while self.tokens[idx].kind() == TokenKind::LineStart {
            idx = self.next_idx(self.matching_line_end(idx));
        }
        debug_assert!(matches!(
            self.tokens[idx].kind(),
            TokenKind::Move | TokenKind::LineEnd
        ));
        idx
    }

    /// The next move of `node`'s line, if any.
    pub(crate) fn continuation(&self, node: usize) -> Option<usize> {
        self.assert_anchor(node);
        let stop = self.continuation_stop(node);
        self.tokens[stop].is_move().then_some(stop)
    }

    /// Line-start indices of the variations attached to the move at `node`.
    pub(crate) fn variations(&self, node: usize) -> Vec<usize> {
        debug_assert!(self.tokens[node].is_move());
        let mut starts = Vec::new();
        let mut idx = self.after_annotations(node);
        while self.tokens[idx].kind() == TokenKind::LineStart {
            starts.push(idx);
            idx = self.next_idx(self.matching_line_end(idx));
        }
        starts
    }

    /// First move inside a line, skipping a leading comment; the line's end
    /// sentinel if the line holds no move.
    fn first_move_of_line(&self, line_start: usize) -> usize {
        let stop = self.after_annotations(line_start);
        debug_assert!(matches!(
            self.tokens[stop].kind(),
            TokenKind::Move | TokenKind::LineEnd
        ));
        stop
    }

    /// Steps to the next move along the chosen alternative: `which_line` 0
    /// follows the existing continuation, `k >= 1` enters its k-th
    /// variation. Returns the index of the reached move, or of the
    /// enclosing line-end sentinel when the line is exhausted. A
    /// `which_line` pointing past the variation list is a programmer error.
    pub fn go_forward(&self, node: usize, which_line: usize) -> usize {
        self.assert_anchor(node);
        let stop = self.continuation_stop(node);
        if !self.tokens[stop].is_move() || which_line == 0 {
            return stop;
        }

        let starts = self.variations(stop);
        assert!(
            which_line <= starts.len(),
            "variation {} of {} at node {}",
            which_line,
            starts.len(),
            node
        );
        self.first_move_of_line(starts[which_line - 1])
    }

    /// Steps to the previous move. At a variation's first move,
    /// `to_main_line` continues into the parent line (skipping the move the
    /// variation alternates with); otherwise, and at the start of the game,
    /// the answer is `None`.
    pub fn go_back(&self, node: usize, to_main_line: bool) -> Option<usize> {
        self.assert_anchor(node);
        if node == ROOT {
            return None;
        }

        let mut skip_moves = 0;
        let mut idx = node;
        loop {
            idx = self.prev_idx(idx)?;
            match self.tokens[idx].kind() {
                TokenKind::Move => {
                    if skip_moves == 0 {
                        return Some(idx);
                    }
                    skip_moves -= 1;
                }
                TokenKind::LineEnd => idx = self.matching_line_start(idx),
                TokenKind::CommentEnd => idx = self.matching_comment_end_rev(idx),
                TokenKind::LineStart => {
                    if idx == ROOT || !to_main_line {
                        return None;
                    }
                    // Stepping out of a variation: the position before its
                    // first move is the position before the move it
                    // alternates with, so that move is skipped as well.
                    skip_moves += 1;
                }
                TokenKind::Glyph | TokenKind::Char | TokenKind::CommentStart => (),
                TokenKind::Empty => unreachable!("prev_idx skips tombstones"),
            }
        }
    }

    fn matching_comment_end_rev(&self, end: usize) -> usize {
        debug_assert_eq!(self.tokens[end].kind(), TokenKind::CommentEnd);
        let mut idx = end;
        loop {
            idx = self.prev_idx(idx).expect("comment brackets are balanced");
            if self.tokens[idx].kind() == TokenKind::CommentStart {
                return idx;
            }
            debug_assert_eq!(self.tokens[idx].kind(), TokenKind::Char);
        }
    }

    /// Nesting depth 1 is the main line.
    pub fn is_main_line(&self, node: usize) -> bool {
        self.assert_anchor(node);
        let mut depth = 0;
        let mut idx = 0;
        loop {
            match self.tokens[idx].kind() {
                TokenKind::LineStart => depth += 1,
                TokenKind::LineEnd => depth -= 1,
                _ => (),
            }
            if idx >= node {
                return depth == 1;
            }
            idx = self.next_idx(idx);
        }
    }

    /// Writes `new_tokens` logically in front of the non-tombstone token at
    /// `before`. An adjacent tombstone run is consumed first; only when it
    /// is too small does the buffer grow, by the needed amount plus
    /// geometric slack, with the slack tombstone-filled for later edits.
    fn insert_tokens(&mut self, before: usize, new_tokens: &[Token]) -> usize {
        debug_assert!(self.tokens[before] != Token::EMPTY);

        let mut gap_start = before;
        while gap_start > 0 && self.tokens[gap_start - 1] == Token::EMPTY {
            gap_start -= 1;
        }
        let gap = before - gap_start;

        if gap < new_tokens.len() {
            let needed = new_tokens.len() - gap;
            let slack = (self.tokens.len() / 8).max(8);
            trace!(
                "movetree grow: {} tokens, gap {} at {}, inserting {}",
                self.tokens.len(),
                gap,
                gap_start,
                needed + slack
            );
            self.tokens.splice(
                gap_start..gap_start,
                std::iter::repeat(Token::EMPTY).take(needed + slack),
            );
        }

        self.tokens[gap_start..gap_start + new_tokens.len()].copy_from_slice(new_tokens);
        gap_start
    }

    /// Appends `mve` after `node`: extends the line in place when `node`
    /// has no continuation, otherwise opens a new right-most (trailing)
    /// variation of the continuation. Returns the new move's node.
    pub fn append_as_right_most_line(&mut self, node: usize, mve: Move) -> usize {
        self.assert_anchor(node);
        let stop = self.continuation_stop(node);

        if !self.tokens[stop].is_move() {
            return self.insert_tokens(stop, &[Token::from_move(mve)]);
        }

        // Skip the continuation's annotations and existing variations; the
        // new line lands behind them all.
        let mut idx = self.after_annotations(stop);
        while self.tokens[idx].kind() == TokenKind::LineStart {
            idx = self.next_idx(self.matching_line_end(idx));
        }
        let start =
            self.insert_tokens(idx, &[Token::LINE_START, Token::from_move(mve), Token::LINE_END]);
        start + 1
    }

    /// The innermost variation span containing `node`, or `None` on the
    /// main line.
    pub(crate) fn enclosing_variation(&self, node: usize) -> Option<(usize, usize)> {
        let mut depth = 0;
        let mut idx = node;
        // Walk backwards; the first unmatched line start is ours.
        loop {
            match self.tokens[idx].kind() {
                TokenKind::LineEnd if idx != node => depth += 1,
                TokenKind::LineStart => {
                    if depth == 0 {
                        if idx == ROOT {
                            return None;
                        }
                        return Some((idx, self.matching_line_end(idx)));
                    }
                    depth -= 1;
                }
                _ => (),
            }
            idx = self.prev_idx(idx)?;
        }
    }

    /// Swaps the variation containing `node` with its parent continuation.
    /// The former continuation and the rest of its line demote into a new
    /// trailing variation; the other siblings keep their order. On the main
    /// line this is a no-op reporting success. Returns the same move's node
    /// after the splice.
    pub fn promote_variation(&mut self, node: usize) -> usize {
        self.assert_anchor(node);
        let Some((v_start, v_end)) = self.enclosing_variation(node) else {
            return node;
        };

        // The move this variation alternates with: scan back over the
        // sibling group to the parent's move.
        let mut idx = v_start;
        let parent_move = loop {
            idx = self.prev_idx(idx).expect("variation attaches after a move");
            match self.tokens[idx].kind() {
                TokenKind::Move => break idx,
                TokenKind::LineEnd => idx = self.matching_line_start(idx),
                TokenKind::CommentEnd => idx = self.matching_comment_end_rev(idx),
                TokenKind::Glyph | TokenKind::Char | TokenKind::CommentStart => (),
                kind => unreachable!("{} before a variation start", kind),
            }
        };

        // The sibling group and the tail of the parent line.
        let siblings = self.variations(parent_move);
        let own = siblings
            .iter()
            .position(|&s| s == v_start)
            .expect("own span is among the siblings");
        let last_sibling_end =
            self.matching_line_end(*siblings.last().expect("sibling group is nonempty"));
        let parent_block_end = self.after_annotations(parent_move);
        let parent_line_end = {
            let mut idx = self.next_idx(last_sibling_end);
            loop {
                match self.tokens[idx].kind() {
                    TokenKind::LineEnd => break idx,
                    TokenKind::LineStart => idx = self.next_idx(self.matching_line_end(idx)),
                    TokenKind::CommentStart => {
                        idx = self.next_idx(self.matching_comment_end(idx))
                    }
                    _ => idx = self.next_idx(idx),
                }
            }
        };

        // Decompose the promoted line's content. A variation holding no
        // move has nothing to swap in.
        let p_first = self.first_move_of_line(v_start);
        if !self.tokens[p_first].is_move() {
            return node;
        }
        let p_block_end = self.after_annotations(p_first);
        let mut p_vars_end = p_block_end;
        while self.tokens[p_vars_end].kind() == TokenKind::LineStart {
            p_vars_end = self.next_idx(self.matching_line_end(p_vars_end));
        }

        let region_start = parent_move;
        let region_end = parent_line_end;
        trace!(
            "movetree promote: node {} in [{}, {}], parent move {}",
            node,
            v_start,
            v_end,
            parent_move
        );

        // Reassemble the region. Length is conserved: the promoted line
        // loses its brackets, the demoted line gains a pair.
        let mut rebuilt: Vec<Token> = Vec::with_capacity(region_end - region_start);
        let mut new_node = node;
        let mut copy = |tree: &MoveTree, range: std::ops::Range<usize>, out: &mut Vec<Token>| {
            if range.contains(&node) {
                new_node = region_start + out.len() + (node - range.start);
            }
            out.extend_from_slice(&tree.tokens[range]);
        };

        // Leading comment and first block of the promoted line.
        copy(self, v_start + 1..p_first, &mut rebuilt);
        copy(self, p_first..p_block_end, &mut rebuilt);
        // Alternatives already attached to the promoted first move.
        copy(self, p_block_end..p_vars_end, &mut rebuilt);
        // The other siblings, order preserved.
        for (i, &s) in siblings.iter().enumerate() {
            if i == own {
                continue;
            }
            copy(self, s..self.matching_line_end(s) + 1, &mut rebuilt);
        }
        // The demoted former continuation, as the new trailing variation.
        rebuilt.push(Token::LINE_START);
        copy(self, parent_move..parent_block_end, &mut rebuilt);
        copy(self, last_sibling_end + 1..parent_line_end, &mut rebuilt);
        rebuilt.push(Token::LINE_END);
        // The rest of the promoted line.
        copy(self, p_vars_end..v_end, &mut rebuilt);

        debug_assert!(rebuilt.len() <= region_end - region_start);
        rebuilt.resize(region_end - region_start, Token::EMPTY);
        self.tokens[region_start..region_end].copy_from_slice(&rebuilt);

        debug_assert!(self.tokens[new_node].is_move());
        debug_assert_eq!(self.tokens[new_node].as_move(), self.tokens[node].as_move());
        new_node
    }

    /// Tombstones the innermost variation containing `node`, brackets
    /// included. On the main line the whole game's moves are cleared.
    pub fn delete_current_line(&mut self, node: usize) {
        self.assert_anchor(node);
        match self.enclosing_variation(node) {
            Some((start, end)) => self.tombstone(start, end + 1),
            None => self.delete_all_lines(),
        }
    }

    /// Tombstones everything between the outer brackets.
    pub fn delete_all_lines(&mut self) {
        let end = self.matching_line_end(ROOT);
        self.tombstone(ROOT + 1, end);
    }

    /// Tombstones the continuation of `node` and everything after it in the
    /// line. `node` itself, its annotations and its variations survive.
    pub fn delete_remaining_moves(&mut self, node: usize) {
        self.assert_anchor(node);
        let Some(cont) = self.continuation(node) else {
            return;
        };
        let line_end = {
            let mut idx = cont;
            loop {
                match self.tokens[idx].kind() {
                    TokenKind::LineEnd => break idx,
                    TokenKind::LineStart => idx = self.next_idx(self.matching_line_end(idx)),
                    TokenKind::CommentStart => {
                        idx = self.next_idx(self.matching_comment_end(idx))
                    }
                    _ => idx = self.next_idx(idx),
                }
            }
        };
        self.tombstone(cont, line_end);
    }

    fn tombstone(&mut self, from: usize, to: usize) {
        trace!("movetree tombstone: [{}, {})", from, to);
        self.tokens[from..to].fill(Token::EMPTY);
    }

    /// Drops every tombstone and returns the remapped index of `node`.
    /// Idempotent; traversal order and count are untouched.
    pub fn pack(&mut self, node: usize) -> usize {
        let mut live = node;
        while live > 0 && self.tokens[live] == Token::EMPTY {
            live -= 1;
        }
        let new_node = self.tokens[..live]
            .iter()
            .filter(|&&t| t != Token::EMPTY)
            .count();
        let before = self.tokens.len();
        self.tokens.retain(|&t| t != Token::EMPTY);
        trace!("movetree pack: {} -> {} tokens", before, self.tokens.len());
        new_node
    }

    /// The comment attached to `node` (for [`ROOT`], the comment before the
    /// first move).
    pub fn comment(&self, node: usize) -> Option<String> {
        self.assert_anchor(node);
        let (start, end) = self.comment_span(node)?;
        let mut text = String::new();
        let mut idx = self.next_idx(start);
        while idx < end {
            text.push(self.tokens[idx].as_char());
            idx = self.next_idx(idx);
        }
        Some(text)
    }

    fn comment_span(&self, node: usize) -> Option<(usize, usize)> {
        let mut idx = self.next_idx(node);
        loop {
            match self.tokens[idx].kind() {
                TokenKind::Glyph => idx = self.next_idx(idx),
                TokenKind::CommentStart => return Some((idx, self.matching_comment_end(idx))),
                _ => return None,
            }
        }
    }

    /// Sets, replaces, or (for an empty string) removes `node`'s comment.
    pub fn set_comment(&mut self, node: usize, text: &str) {
        self.assert_anchor(node);
        if let Some((start, end)) = self.comment_span(node) {
            self.tombstone(start, end + 1);
        }
        if text.is_empty() {
            return;
        }
        let mut new_tokens = Vec::with_capacity(text.chars().count() + 2);
        new_tokens.push(Token::COMMENT_START);
        new_tokens.extend(text.chars().map(Token::character));
        new_tokens.push(Token::COMMENT_END);
        self.insert_tokens(self.after_annotations(node), &new_tokens);
    }

    /// Annotation glyphs attached to `node`, in order.
    pub fn glyphs(&self, node: usize) -> Vec<u8> {
        self.assert_anchor(node);
        let mut glyphs = Vec::new();
        let mut idx = self.next_idx(node);
        while self.tokens[idx].kind() == TokenKind::Glyph {
            glyphs.push(self.tokens[idx].as_glyph());
            idx = self.next_idx(idx);
        }
        glyphs
    }

    pub fn add_glyph(&mut self, node: usize, nag: u8) {
        self.assert_anchor(node);
        let mut idx = self.next_idx(node);
        while self.tokens[idx].kind() == TokenKind::Glyph {
            idx = self.next_idx(idx);
        }
        self.insert_tokens(idx, &[Token::glyph(nag)]);
    }

    pub fn clear_glyphs(&mut self, node: usize) {
        self.assert_anchor(node);
        let mut idx = self.next_idx(node);
        while self.tokens[idx].kind() == TokenKind::Glyph {
            self.tokens[idx] = Token::EMPTY;
            idx = self.next_idx(idx);
        }
    }

    /// Structural equality of the move streams, comments and glyphs
    /// ignored, via parallel walks.
    pub fn same_moves(&self, other: &MoveTree) -> bool {
        self.same_lines(other, ROOT, ROOT)
    }

    fn same_lines(&self, other: &MoveTree, a_anchor: usize, b_anchor: usize) -> bool {
        let mut a = a_anchor;
        let mut b = b_anchor;
        loop {
            let a_stop = self.continuation_stop(a);
            let b_stop = other.continuation_stop(b);
            match (self.tokens[a_stop].is_move(), other.tokens[b_stop].is_move()) {
                (false, false) => return true,
                (true, true) => (),
                _ => return false,
            }
            if self.tokens[a_stop].as_move() != other.tokens[b_stop].as_move() {
                return false;
            }
            let a_vars = self.variations(a_stop);
            let b_vars = other.variations(b_stop);
            if a_vars.len() != b_vars.len() {
                return false;
            }
            // A line start is itself an anchor whose continuation is the
            // line's first move.
            for (&av, &bv) in a_vars.iter().zip(&b_vars) {
                if !self.same_lines(other, av, bv) {
                    return false;
                }
            }
            a = a_stop;
            b = b_stop;
        }
    }

    /// Moves from the root to `node`, in game order. The moves a variation
    /// alternates with are not part of its own path.
    pub(crate) fn path_to(&self, node: usize) -> Vec<Move> {
        self.assert_anchor(node);
        let mut path = Vec::new();
        let mut cursor = Some(node);
        while let Some(idx) = cursor {
            if self.tokens[idx].is_move() {
                path.push(self.tokens[idx].as_move());
            }
            cursor = if idx == ROOT {
                None
            } else {
                self.go_back(idx, true)
            };
        }
        path.reverse();
        path
    }
}
