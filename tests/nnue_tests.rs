//! Network codec, fallback behaviour and accumulator maintenance.

use osprey::board::Board;
use osprey::defs::{Color, PieceType};
use osprey::movegen::MoveGen;
use osprey::nnue::{
    feature_index, Accumulator, Evaluator, Network, FEATURE_COUNT, MAX_EVAL_MAG,
};

/// Deterministic non-trivial network used to exercise the multi-neuron
/// paths; the values themselves are arbitrary.
fn patterned_network(hidden_size: usize) -> Network {
    let mut net = Network::zeroed(hidden_size);
    for neuron in 0..hidden_size {
        net.set_hidden_bias(neuron, (neuron as i32 * 13) % 29 - 14);
        net.set_output_weight(neuron, 0.25 + neuron as f32 * 0.125);
        for feature in 0..FEATURE_COUNT {
            let value = ((feature * 31 + neuron * 17) % 41) as i32 - 20;
            net.set_input_weight(feature, neuron, value);
        }
    }
    net.set_bias(7);
    net.set_scale(0.5);
    net
}

#[test]
fn feature_index_layout() {
    assert_eq!(FEATURE_COUNT, 768);
    assert_eq!(feature_index(Color::White, PieceType::Pawn, 0), 0);
    assert_eq!(feature_index(Color::White, PieceType::Knight, 0), 64);
    assert_eq!(
        feature_index(Color::Black, PieceType::Pawn, 0),
        6 * 64
    );
    assert_eq!(feature_index(Color::Black, PieceType::King, 63), 767);
}

#[test]
fn v2_file_round_trips() {
    let net = patterned_network(8);
    let dir = std::env::temp_dir();
    let path = dir.join("osprey_nnue_roundtrip.bin");
    net.save(&path).unwrap();

    let loaded = Network::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    // Same evaluation on a few positions means the same parameters made it
    // through the i16 quantization (all patterned values fit in i16).
    let before = Evaluator::from_network(net);
    let after = Evaluator::from_network(loaded);
    for fen in [
        osprey::board::START_FEN,
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1",
    ] {
        let board = Board::from_fen(fen).unwrap();
        assert_eq!(before.evaluate_board(&board), after.evaluate_board(&board));
    }
}

#[test]
fn bad_magic_is_a_format_error() {
    let mut bytes = patterned_network(4).to_bytes();
    bytes[0] = b'X';
    assert!(Network::from_bytes(&bytes).is_err());
}

#[test]
fn truncated_file_is_an_error() {
    let bytes = patterned_network(4).to_bytes();
    assert!(Network::from_bytes(&bytes[..bytes.len() / 2]).is_err());
}

#[test]
fn unsupported_version_is_an_error() {
    let mut bytes = patterned_network(4).to_bytes();
    bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
    assert!(Network::from_bytes(&bytes).is_err());
}

#[test]
fn missing_file_falls_back_to_piece_values() {
    let evaluator = Evaluator::with_path("/nonexistent/osprey-weights.bin");
    let board = Board::start_position();
    // The fallback must load and evaluate the start position as balanced.
    assert_eq!(evaluator.evaluate_board(&board), 0);
}

#[test]
fn incremental_update_matches_rebuild_along_a_game() {
    let evaluator = Evaluator::from_network(patterned_network(6));
    let mut board = Board::start_position();

    let hidden = 6;
    let mut stack = vec![Accumulator::new(hidden); 2];
    evaluator.build_accumulator(&board, &mut stack[0]);

    for uci in [
        "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "g8f6", "e1g1", "f6e4", "d2d4", "e4d6",
        "b5c6", "d7c6", "d4e5", "d6f5",
    ] {
        let mv = MoveGen::generate_legal(&mut board)
            .into_iter()
            .find(|m| m.to_uci() == uci)
            .unwrap_or_else(|| panic!("{} should be legal in {}", uci, board.fen()));

        let (base, rest) = stack.split_at_mut(1);
        evaluator.update_accumulator(&board, mv, &base[0], &mut rest[0]);
        board.make_move(mv).unwrap();

        let mut rebuilt = Accumulator::new(hidden);
        evaluator.build_accumulator(&board, &mut rebuilt);
        assert_eq!(rest[0], rebuilt, "divergence after {}", uci);

        let carried = rest[0].clone();
        stack[0] = carried;
    }
}

#[test]
fn incremental_update_covers_castling_and_en_passant() {
    let evaluator = Evaluator::from_network(patterned_network(4));

    // Castling both wings.
    for castle in ["e1g1", "e1c1"] {
        let mut board = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let mv = MoveGen::generate_legal(&mut board)
            .into_iter()
            .find(|m| m.to_uci() == castle)
            .unwrap();
        let mut base = Accumulator::new(4);
        evaluator.build_accumulator(&board, &mut base);
        let mut updated = Accumulator::new(4);
        evaluator.update_accumulator(&board, mv, &base, &mut updated);
        board.make_move(mv).unwrap();
        let mut rebuilt = Accumulator::new(4);
        evaluator.build_accumulator(&board, &mut rebuilt);
        assert_eq!(updated, rebuilt, "divergence after {}", castle);
    }

    // En passant.
    let mut board =
        Board::from_fen("rnbqkbnr/1ppppppp/8/pP6/8/8/P1PPPPPP/RNBQKBNR w KQkq a6 0 3").unwrap();
    let mv = MoveGen::generate_legal(&mut board)
        .into_iter()
        .find(|m| m.is_en_passant())
        .unwrap();
    let mut base = Accumulator::new(4);
    evaluator.build_accumulator(&board, &mut base);
    let mut updated = Accumulator::new(4);
    evaluator.update_accumulator(&board, mv, &base, &mut updated);
    board.make_move(mv).unwrap();
    let mut rebuilt = Accumulator::new(4);
    evaluator.build_accumulator(&board, &mut rebuilt);
    assert_eq!(updated, rebuilt);
}

#[test]
fn evaluation_stays_bounded() {
    let evaluator = Evaluator::from_network(patterned_network(6));
    for fen in [
        "QQQQQQ1k/8/8/8/8/8/8/QQQQQ2K w - - 0 1",
        "qqqqqq1K/8/8/8/8/8/8/qqqqq2k b - - 0 1",
        osprey::board::START_FEN,
    ] {
        let board = Board::from_fen(fen).unwrap();
        assert!(evaluator.evaluate_board(&board).abs() <= MAX_EVAL_MAG);
    }
}

#[test]
fn evaluation_is_oriented_to_side_to_move() {
    let evaluator = Evaluator::new();
    let white_up = Board::from_fen("7k/8/8/8/8/8/Q7/1K6 w - - 0 1").unwrap();
    let white_up_black_to_move = Board::from_fen("7k/8/8/8/8/8/Q7/1K6 b - - 0 1").unwrap();
    let from_white = evaluator.evaluate_board(&white_up);
    let from_black = evaluator.evaluate_board(&white_up_black_to_move);
    assert!(from_white > 0);
    assert_eq!(from_white, -from_black);
}
