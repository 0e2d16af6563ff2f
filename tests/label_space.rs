use castellan::labels;
use pretty_assertions::assert_eq;
use std::collections::HashSet;

#[test]
fn every_label_is_a_well_formed_encoding() {
    for label in labels::all() {
        let bytes = label.as_bytes();
        assert!(
            bytes.len() == 4 || bytes.len() == 5,
            "bad label {label:?}"
        );
        assert!((b'a'..=b'h').contains(&bytes[0]), "bad label {label:?}");
        assert!((b'1'..=b'8').contains(&bytes[1]), "bad label {label:?}");
        assert!((b'a'..=b'h').contains(&bytes[2]), "bad label {label:?}");
        assert!((b'1'..=b'8').contains(&bytes[3]), "bad label {label:?}");
        if bytes.len() == 5 {
            assert!(matches!(bytes[4], b'q' | b'r' | b'b' | b'n'), "bad label {label:?}");
        }
    }
}

#[test]
fn suffixed_and_unsuffixed_phases_never_collide() {
    let four: HashSet<&str> = labels::all()
        .iter()
        .filter(|l| l.len() == 4)
        .map(|l| l.as_str())
        .collect();
    for label in labels::all().iter().filter(|l| l.len() == 5) {
        assert!(!four.contains(label.as_str()));
    }
    assert_eq!(
        labels::all().iter().filter(|l| l.len() == 5).count(),
        176
    );
}

#[test]
fn every_legal_move_of_a_midgame_position_is_representable() {
    // Kiwipete: a busy position with castling, promotions nearby, pins.
    let board = cozy_chess::Board::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        false,
    )
    .unwrap();
    board.generate_moves(|ml| {
        for mv in ml {
            assert!(
                labels::index_of(&mv.to_string()).is_some(),
                "move {} missing from the action space",
                mv
            );
        }
        false
    });
}
