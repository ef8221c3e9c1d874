//! End-to-end search behaviour.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use osprey::board::Board;
use osprey::movegen::MoveGen;
use osprey::nnue::Evaluator;
use osprey::search::{Search, SearchLimits, SearchResult, MATE_THRESHOLD};

fn new_search() -> Search {
    Search::new(1 << 16, Arc::new(Evaluator::new()))
}

fn depth_limits(depth: i32) -> SearchLimits {
    SearchLimits {
        max_depth: depth,
        infinite: true,
        ..SearchLimits::default()
    }
}

#[test]
fn start_position_returns_a_legal_move() {
    let mut board = Board::start_position();
    let mut search = new_search();

    let result = search.search(&mut board, &depth_limits(2));

    let legal = MoveGen::generate_legal(&mut board);
    assert_eq!(legal.len(), 20);
    assert!(legal.contains(&result.best_move));
    assert!(result.depth >= 2);
    assert!(!result.pv.is_empty());
    assert!(result.nodes > 0);
}

#[test]
fn finds_back_rank_mate_in_one() {
    let mut board = Board::from_fen("6k1/5ppp/8/8/8/8/8/4R1K1 w - - 0 1").unwrap();
    let mut search = new_search();

    let result = search.search(&mut board, &depth_limits(4));

    assert_eq!(result.best_move.to_uci(), "e1e8");
    assert!(result.score > MATE_THRESHOLD);
}

#[test]
fn stalemate_yields_null_move_and_zero_score() {
    let mut board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
    assert!(MoveGen::generate_legal(&mut board).is_empty());
    assert!(!board.in_check(board.side_to_move()));

    let mut search = new_search();
    let result = search.search(&mut board, &depth_limits(3));

    assert!(result.best_move.is_null());
    assert_eq!(result.score, 0);
}

#[test]
fn checkmated_side_reports_null_move() {
    // Fool's mate final position, black has delivered mate.
    let mut board =
        Board::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();
    assert!(MoveGen::generate_legal(&mut board).is_empty());
    assert!(board.in_check(board.side_to_move()));

    let mut search = new_search();
    let result = search.search(&mut board, &depth_limits(3));
    assert!(result.best_move.is_null());
}

#[test]
fn search_restores_the_board() {
    let mut board = Board::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    let fen = board.fen();
    let hash = board.hash();

    let mut search = new_search();
    search.search(&mut board, &depth_limits(3));

    assert_eq!(board.fen(), fen);
    assert_eq!(board.hash(), hash);
}

#[test]
fn single_threaded_search_is_deterministic() {
    let limits = depth_limits(4);

    let run = || {
        let mut board = Board::from_fen(
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
        )
        .unwrap();
        let mut search = new_search();
        let result = search.search(&mut board, &limits);
        (result.best_move, result.score, result.depth)
    };

    assert_eq!(run(), run());
}

#[test]
fn multi_threaded_search_returns_a_legal_move() {
    let mut board = Board::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    let mut search = new_search();
    search.set_threads(4);

    let result = search.search(&mut board, &depth_limits(4));

    let legal = MoveGen::generate_legal(&mut board);
    assert!(legal.contains(&result.best_move));
}

#[test]
fn node_limit_stops_the_search() {
    let mut board = Board::start_position();
    let mut search = new_search();
    let limits = SearchLimits {
        max_depth: 64,
        node_limit: 2_000,
        infinite: false,
        ..SearchLimits::default()
    };

    let result = search.search(&mut board, &limits);
    // The limit is polled per node, so a small overshoot from the final
    // nodes in flight is fine; runaway growth is not.
    assert!(result.nodes <= 20_000);
}

#[test]
fn preset_stop_flag_still_reports_some_state() {
    let mut board = Board::start_position();
    let mut search = new_search();
    let stop = Arc::new(AtomicBool::new(true));

    let result = search.search_with(&mut board, &depth_limits(6), stop, None);
    // Nothing completed, so there is nothing to report beyond a null move.
    assert_eq!(result.depth, 0);
}

#[test]
fn info_callback_fires_per_iteration() {
    use std::sync::Mutex;

    let mut board = Board::start_position();
    let mut search = new_search();
    let depths: Mutex<Vec<i32>> = Mutex::new(Vec::new());

    let callback = |result: &SearchResult| {
        depths.lock().unwrap().push(result.depth);
    };
    let stop = Arc::new(AtomicBool::new(false));
    search.search_with(&mut board, &depth_limits(3), stop, Some(&callback));

    let depths = depths.into_inner().unwrap();
    assert_eq!(depths, vec![1, 2, 3]);
}

#[test]
fn avoids_stalemating_when_winning() {
    // White to move, Qc7 would stalemate; any reasonable search keeps the
    // win on the board by preferring a non-drawing move.
    let mut board = Board::from_fen("7k/2Q5/5K2/8/8/8/8/8 w - - 0 1").unwrap();
    let mut search = new_search();
    let result = search.search(&mut board, &depth_limits(4));

    let mv = result.best_move;
    let undo = board.make_move(mv).unwrap();
    let opponent_stuck = MoveGen::generate_legal(&mut board).is_empty();
    let opponent_in_check = board.in_check(board.side_to_move());
    board.undo_move(mv, &undo);
    assert!(
        !opponent_stuck || opponent_in_check,
        "search chose a stalemating move {}",
        mv.to_uci()
    );
}

#[test]
fn mate_score_stops_deepening() {
    // Once a mate score is returned the deepening loop halts on it rather
    // than burning the remaining depth budget.
    let mut board = Board::from_fen("6k1/5ppp/8/8/8/8/8/4R1K1 w - - 0 1").unwrap();
    let mut search = new_search();
    let result = search.search(&mut board, &depth_limits(6));
    assert!(result.score > MATE_THRESHOLD);
    assert_eq!(result.best_move.to_uci(), "e1e8");
}
