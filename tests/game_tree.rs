use gamebook::Square::*;
use gamebook::{Move, MoveTree, Piece, ROOT};

fn append(tree: &mut MoveTree, node: usize, mve: Move) -> usize {
    tree.append_as_right_most_line(node, mve)
}

/// A small annotated Ruy Lopez skeleton:
///
/// ```text
/// 1. e4 e5 (1... c5 2. Nf3) 2. Nf3 Nc6 (2... d6)
/// ```
fn build_sample() -> (MoveTree, Vec<usize>) {
    let mut tree = MoveTree::new();
    let e4 = append(&mut tree, ROOT, Move::new(E2, E4));
    let e5 = append(&mut tree, e4, Move::new(E7, E5));
    let c5 = append(&mut tree, e4, Move::new(C7, C5));
    let c5_nf3 = append(&mut tree, c5, Move::new(G1, F3));
    let nf3 = append(&mut tree, e5, Move::new(G1, F3));
    let nc6 = append(&mut tree, nf3, Move::new(B8, C6));
    let d6 = append(&mut tree, nf3, Move::new(D7, D6));
    (tree, vec![e4, e5, c5, c5_nf3, nf3, nc6, d6])
}

#[test]
fn test_navigation_through_sample() {
    let (tree, nodes) = build_sample();
    let [e4, e5, c5, c5_nf3, nf3, nc6, d6] = nodes[..] else {
        unreachable!()
    };

    assert_eq!(tree.go_forward(ROOT, 0), e4);
    assert_eq!(tree.go_forward(e4, 0), e5);
    assert_eq!(tree.go_forward(e4, 1), c5);
    assert_eq!(tree.go_forward(c5, 0), c5_nf3);
    assert_eq!(tree.go_forward(e5, 0), nf3);
    assert_eq!(tree.go_forward(nf3, 0), nc6);
    assert_eq!(tree.go_forward(nf3, 1), d6);
    assert!(tree.is_line_end(tree.go_forward(nc6, 0)));

    assert_eq!(tree.go_back(nc6, false), Some(nf3));
    assert_eq!(tree.go_back(d6, true), Some(nf3));
    // At a variation's first move only a main-line step escapes.
    assert_eq!(tree.go_back(c5, false), None);
    assert_eq!(tree.go_back(c5, true), Some(e4));
    assert_eq!(tree.go_back(c5_nf3, false), Some(c5));

    assert!(tree.is_main_line(nc6));
    assert!(!tree.is_main_line(c5_nf3));
    assert!(!tree.is_main_line(d6));
}

#[test]
fn test_deep_promotion_keeps_node_move() {
    let (mut tree, nodes) = build_sample();
    let d6 = nodes[6];

    // Promote the nested 2... d6 line: its sibling set is inside the main
    // line after 2... Nc6.
    let promoted = tree.promote_variation(d6);
    assert_eq!(tree.move_at(promoted), Move::new(D7, D6));
    assert!(tree.is_main_line(promoted));

    // The former main reply is now the variation.
    let nf3 = {
        // Re-walk from the root: indices may have been rearranged.
        let e4 = tree.go_forward(ROOT, 0);
        let e5 = tree.go_forward(e4, 0);
        tree.go_forward(e5, 0)
    };
    assert_eq!(tree.go_forward(nf3, 0), promoted);
    let demoted = tree.go_forward(nf3, 1);
    assert_eq!(tree.move_at(demoted), Move::new(B8, C6));
}

#[test]
fn test_delete_then_pack_preserves_traversal() {
    let (mut tree, nodes) = build_sample();
    let [_, _, c5, _, _, nc6, _] = nodes[..] else {
        unreachable!()
    };

    tree.delete_current_line(c5);

    // Expected shape: 1. e4 e5 2. Nf3 Nc6 (2... d6)
    let mut want = MoveTree::new();
    let w_e4 = append(&mut want, ROOT, Move::new(E2, E4));
    let w_e5 = append(&mut want, w_e4, Move::new(E7, E5));
    let w_nf3 = append(&mut want, w_e5, Move::new(G1, F3));
    let _w_nc6 = append(&mut want, w_nf3, Move::new(B8, C6));
    let _w_d6 = append(&mut want, w_nf3, Move::new(D7, D6));
    assert!(tree.same_moves(&want));

    let nc6_packed = tree.pack(nc6);
    assert!(tree.same_moves(&want), "pack changed the tree shape");
    assert_eq!(tree.move_at(nc6_packed), Move::new(B8, C6));

    // Idempotent.
    assert_eq!(tree.pack(nc6_packed), nc6_packed);
    assert!(tree.same_moves(&want));
}

#[test]
fn test_annotations_survive_pack() {
    let (mut tree, nodes) = build_sample();
    let [e4, _, c5, _, _, _, _] = nodes[..] else {
        unreachable!()
    };

    tree.set_comment(e4, "king's pawn");
    tree.add_glyph(e4, 1);
    tree.delete_current_line(c5);

    let e4_packed = tree.pack(e4);
    assert_eq!(tree.comment(e4_packed).as_deref(), Some("king's pawn"));
    assert_eq!(tree.glyphs(e4_packed), vec![1]);
}

#[test]
fn test_tokens_share_codec_space() {
    // Promotion moves survive storage and round-trip through the tree.
    let mut tree = MoveTree::new();
    let m = Move::with_promotion_capture(B7, A8, Piece::Knight);
    let node = append(&mut tree, ROOT, m);
    assert_eq!(tree.move_at(node), m);
    assert_eq!(tree.move_at(node).promotion(), Some(Piece::Knight));
    assert!(tree.move_at(node).is_capture());
}

#[test]
fn test_repeated_growth_keeps_structure() {
    // Push enough moves through one line to force several regrowths.
    let mut tree = MoveTree::new();
    let mut node = ROOT;
    let squares = [E2, E4, E7, E5, G1, F3, B8, C6, F1, B5];
    for i in 0..100 {
        let mve = Move::new(squares[i % 10], squares[(i + 1) % 10]);
        node = append(&mut tree, node, mve);
    }

    // Walk back down the whole line.
    let mut walked = 0;
    let mut idx = tree.go_forward(ROOT, 0);
    while !tree.is_line_end(idx) {
        walked += 1;
        idx = tree.go_forward(idx, 0);
    }
    assert_eq!(walked, 100);

    let last_move = tree.move_at(node);
    let packed = tree.pack(node);
    assert_eq!(tree.move_at(packed), last_move);
    let mut walked = 0;
    let mut idx = tree.go_forward(ROOT, 0);
    while !tree.is_line_end(idx) {
        walked += 1;
        idx = tree.go_forward(idx, 0);
    }
    assert_eq!(walked, 100);
}
