//! Search: parallel iterative-deepening negamax with alpha-beta pruning.
//!
//! Each iteration runs an aspiration window around the previous score. The
//! root splits its move list across worker threads that pull indices from a
//! shared counter; every deeper node is searched single-threaded within its
//! worker. Workers share the transposition table and the atomic node/stop
//! state, and own everything else (board clone, accumulator stack, killers,
//! history, repetition stack).

pub mod time;
pub mod tt;

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::board::Board;
use crate::defs::{Color, PieceType, BOARD_SIZE, N_COLORS, PIECE_VALUES};
use crate::movegen::MoveGen;
use crate::mv::Move;
use crate::nnue::{Accumulator, Evaluator};

use self::time::{TimeConfig, TimeManager};
use self::tt::{TTFlag, TranspositionTable};

pub const INFINITY: i32 = 32_000;
pub const MATE: i32 = 32_000;
pub const MATE_THRESHOLD: i32 = MATE - 512;

const NULL_MOVE_REDUCTION: i32 = 2;
const ASPIRATION_DELTA: i32 = 18;
const HISTORY_CLAMP: i32 = 4000;
const MAX_PV_LENGTH: usize = 64;
/// Hard ceiling on tree depth; quiescence can run past the nominal depth.
const MAX_PLY: usize = 192;

/// Search parameters derived from a UCI `go` command or self-play settings.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub max_depth: i32,
    /// 0 = unlimited.
    pub node_limit: u64,
    /// Fixed time for the move; -1 = unused.
    pub move_time_ms: i64,
    pub time_left_ms: [i64; N_COLORS],
    pub increment_ms: [i64; N_COLORS],
    pub moves_to_go: i32,
    pub infinite: bool,
    pub ponder: bool,
}

impl Default for SearchLimits {
    fn default() -> SearchLimits {
        SearchLimits {
            max_depth: 64,
            node_limit: 0,
            move_time_ms: -1,
            time_left_ms: [0; N_COLORS],
            increment_ms: [0; N_COLORS],
            moves_to_go: 0,
            infinite: false,
            ponder: false,
        }
    }
}

/// Snapshot of a completed iteration, also the final search product.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub best_move: Move,
    /// Centipawns from the root side to move; mate scores are `MATE - ply`.
    pub score: i32,
    pub depth: i32,
    pub seldepth: i32,
    pub nodes: u64,
    pub pv: Vec<Move>,
    pub elapsed: Duration,
}

/// Per-thread mutable search state; never shared between workers.
struct ThreadContext {
    accumulators: Vec<Accumulator>,
    killers: Vec<[Move; 2]>,
    history: [[[i32; BOARD_SIZE]; BOARD_SIZE]; N_COLORS],
    repetition: Vec<u64>,
}

impl ThreadContext {
    fn new() -> ThreadContext {
        ThreadContext {
            accumulators: vec![Accumulator::default(); MAX_PLY + 1],
            killers: vec![[Move::NULL; 2]; MAX_PLY + 1],
            history: [[[0; BOARD_SIZE]; BOARD_SIZE]; N_COLORS],
            repetition: Vec::with_capacity(512),
        }
    }

    fn reset(&mut self) {
        for killers in &mut self.killers {
            *killers = [Move::NULL; 2];
        }
        self.history = [[[0; BOARD_SIZE]; BOARD_SIZE]; N_COLORS];
        self.repetition.clear();
    }

    /// Rebases the repetition stack to the game history plus the root key.
    fn reset_repetition(&mut self, game_history: &[u64], root_key: u64) {
        self.repetition.clear();
        self.repetition.extend_from_slice(game_history);
        self.repetition.push(root_key);
    }

    fn history_score(&self, mv: Move, mover: Color) -> i32 {
        if mv.is_capture() || mv.is_promotion() {
            return 0;
        }
        self.history[mover.index()][mv.from as usize][mv.to as usize]
    }

    fn update_history(&mut self, mv: Move, depth: i32, mover: Color) {
        if mv.is_capture() || mv.is_promotion() {
            return;
        }
        let bonus = depth * depth;
        let entry = &mut self.history[mover.index()][mv.from as usize][mv.to as usize];
        *entry = (*entry + bonus).clamp(-HISTORY_CLAMP, HISTORY_CLAMP);
    }

    fn update_killers(&mut self, ply: i32, mv: Move) {
        let slot = &mut self.killers[ply as usize];
        if slot[0] == mv {
            return;
        }
        slot[1] = slot[0];
        slot[0] = mv;
    }
}

/// Most-valuable-victim / least-valuable-attacker capture score.
fn mvv_lva(mv: Move, board: &Board) -> i32 {
    if !mv.is_capture() {
        return 0;
    }
    let victim = if mv.is_en_passant() {
        PieceType::Pawn
    } else {
        board.piece_type_at(mv.to).unwrap_or(PieceType::Pawn)
    };
    let attacker = board.piece_type_at(mv.from).unwrap_or(PieceType::Pawn);
    PIECE_VALUES[victim.index()] * 16 - PIECE_VALUES[attacker.index()]
}

pub struct Search {
    tt: TranspositionTable,
    evaluator: Arc<Evaluator>,
    time_manager: TimeManager,
    contexts: Vec<ThreadContext>,
    thread_count: usize,
    generation: u8,
    game_history: Vec<u64>,
    stop: Arc<AtomicBool>,
    node_limit: u64,
    start_time: Instant,
    time_limit: Option<Duration>,
    nodes_total: AtomicU64,
    seldepth_total: AtomicI32,
}

impl Search {
    pub fn new(table_entries: usize, evaluator: Arc<Evaluator>) -> Search {
        Search {
            tt: TranspositionTable::new(table_entries),
            evaluator,
            time_manager: TimeManager::default(),
            contexts: vec![ThreadContext::new()],
            thread_count: 1,
            generation: 0,
            game_history: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            node_limit: 0,
            start_time: Instant::now(),
            time_limit: None,
            nodes_total: AtomicU64::new(0),
            seldepth_total: AtomicI32::new(0),
        }
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<Evaluator>) {
        self.evaluator = evaluator;
    }

    pub fn set_time_config(&mut self, config: TimeConfig) {
        self.time_manager = TimeManager::new(config);
    }

    pub fn set_table_size(&mut self, entries: usize) {
        self.tt.resize(entries);
        self.generation = 0;
    }

    pub fn set_table_size_mb(&mut self, megabytes: usize) {
        self.tt.resize_mb(megabytes);
        self.generation = 0;
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.thread_count = threads.max(1);
        self.contexts
            .resize_with(self.thread_count, ThreadContext::new);
        for ctx in &mut self.contexts {
            ctx.reset();
        }
    }

    /// Zobrist keys of the positions played before the root, used to detect
    /// repetitions that span the game/search boundary.
    pub fn set_game_history(&mut self, history: Vec<u64>) {
        self.game_history = history;
    }

    /// Clears the transposition table and all per-thread heuristics.
    pub fn clear(&mut self) {
        self.tt.clear();
        self.generation = 0;
        self.game_history.clear();
        for ctx in &mut self.contexts {
            ctx.reset();
        }
    }

    pub fn search(&mut self, board: &mut Board, limits: &SearchLimits) -> SearchResult {
        let stop = Arc::new(AtomicBool::new(false));
        self.search_with(board, limits, stop, None)
    }

    /// Full search entry point with external stop control and per-iteration
    /// info reporting. The board is mutated during the search and restored
    /// before returning.
    pub fn search_with(
        &mut self,
        board: &mut Board,
        limits: &SearchLimits,
        stop: Arc<AtomicBool>,
        info: Option<&dyn Fn(&SearchResult)>,
    ) -> SearchResult {
        self.stop = stop;
        self.node_limit = limits.node_limit;
        self.start_time = Instant::now();
        self.time_limit = self.compute_time_budget(board, limits);
        self.nodes_total.store(0, Ordering::Relaxed);
        self.seldepth_total.store(0, Ordering::Relaxed);
        self.generation = self.generation.wrapping_add(1);

        let max_depth = limits.max_depth.clamp(1, 128);

        for ctx in &mut self.contexts {
            for killers in &mut ctx.killers {
                *killers = [Move::NULL; 2];
            }
            ctx.history = [[[0; BOARD_SIZE]; BOARD_SIZE]; N_COLORS];
        }

        // Build the root accumulator once and mirror it into every context.
        let evaluator = Arc::clone(&self.evaluator);
        {
            let (first, rest) = self.contexts.split_at_mut(1);
            evaluator.build_accumulator(board, &mut first[0].accumulators[0]);
            for ctx in rest {
                ctx.accumulators[0].copy_from(&first[0].accumulators[0]);
            }
        }

        let mut contexts = std::mem::take(&mut self.contexts);
        let result = self.run_iterations(board, max_depth, &mut contexts, info);
        self.contexts = contexts;
        result
    }

    fn run_iterations(
        &self,
        board: &mut Board,
        max_depth: i32,
        contexts: &mut Vec<ThreadContext>,
        info: Option<&dyn Fn(&SearchResult)>,
    ) -> SearchResult {
        let mut best = SearchResult::default();
        let mut last_best = Move::NULL;
        let mut aspiration = ASPIRATION_DELTA;
        let mut previous_score = 0;
        let root_key = board.hash();

        for depth in 1..=max_depth {
            if self.should_stop() {
                break;
            }

            for ctx in contexts.iter_mut() {
                ctx.reset_repetition(&self.game_history, root_key);
            }
            {
                let (first, rest) = contexts.split_at_mut(1);
                for ctx in rest.iter_mut() {
                    ctx.accumulators[0].copy_from(&first[0].accumulators[0]);
                }
            }

            let mut alpha = (-INFINITY).max(previous_score - aspiration);
            let mut beta = INFINITY.min(previous_score + aspiration);
            let mut score;
            let mut completed_window = false;
            let mut iteration_best = Move::NULL;

            loop {
                score = self.search_root(contexts, board, depth, alpha, beta, &mut iteration_best);
                if self.stop.load(Ordering::Acquire) {
                    break;
                }

                if score <= alpha {
                    if alpha <= -INFINITY {
                        completed_window = true;
                        break;
                    }
                    alpha = (-INFINITY).max(alpha - aspiration);
                } else if score >= beta {
                    if beta >= INFINITY {
                        completed_window = true;
                        break;
                    }
                    beta = INFINITY.min(beta + aspiration);
                } else {
                    completed_window = true;
                    break;
                }

                aspiration = aspiration.saturating_mul(2).min(INFINITY);
                if aspiration > INFINITY / 2 {
                    alpha = -INFINITY;
                    beta = INFINITY;
                }

                if self.should_stop() {
                    break;
                }
            }

            if self.stop.load(Ordering::Acquire) {
                break;
            }
            if !completed_window {
                break;
            }

            previous_score = score;
            aspiration = ASPIRATION_DELTA;

            best.depth = depth;
            best.score = score;
            best.nodes = self.nodes_total.load(Ordering::Relaxed);
            best.seldepth = self.seldepth_total.load(Ordering::Relaxed);
            best.elapsed = self.start_time.elapsed();
            best.pv = self.extract_pv(board);
            if let Some(&first) = best.pv.first() {
                best.best_move = first;
                last_best = first;
            } else if !iteration_best.is_null() {
                best.best_move = iteration_best;
                last_best = iteration_best;
            } else if !last_best.is_null() {
                best.best_move = last_best;
            }

            if let Some(callback) = info {
                callback(&best);
            }

            if score.abs() > MATE_THRESHOLD {
                break;
            }
            if self.node_limit > 0 && best.nodes >= self.node_limit {
                break;
            }
        }

        if best.best_move.is_null() && !last_best.is_null() {
            best.best_move = last_best;
        }
        if best.elapsed.is_zero() {
            best.elapsed = self.start_time.elapsed();
        }
        best.nodes = self.nodes_total.load(Ordering::Relaxed);
        best
    }

    /// Searches all root moves at `depth`. The first move runs on the
    /// calling thread to seed alpha; the rest are pulled from a shared index
    /// by the worker pool.
    fn search_root(
        &self,
        contexts: &mut [ThreadContext],
        board: &mut Board,
        depth: i32,
        alpha: i32,
        beta: i32,
        best_move_out: &mut Move,
    ) -> i32 {
        let root_key = board.hash();
        let hash_move = self
            .tt
            .probe(root_key, 0)
            .map(|entry| entry.mv)
            .unwrap_or(Move::NULL);

        let mut moves = MoveGen::generate_legal(board);
        if moves.is_empty() {
            *best_move_out = Move::NULL;
            if board.in_check(board.side_to_move()) {
                return -MATE + 1;
            }
            return 0;
        }

        {
            let ctx = &contexts[0];
            let mover = board.side_to_move();
            let board_ref = &*board;
            moves.sort_by(|a, b| {
                let a_hash = *a == hash_move;
                let b_hash = *b == hash_move;
                if a_hash != b_hash {
                    return b_hash.cmp(&a_hash);
                }
                let (a_score, b_score) = if a.is_capture() || b.is_capture() {
                    (mvv_lva(*a, board_ref), mvv_lva(*b, board_ref))
                } else {
                    (ctx.history_score(*a, mover), ctx.history_score(*b, mover))
                };
                b_score.cmp(&a_score)
            });
        }

        let alpha_original = alpha;
        let mut alpha = alpha;

        let (main_ctx, rest) = contexts.split_at_mut(1);
        let main_ctx = &mut main_ctx[0];

        let first = moves[0];
        let first_score = self.search_root_move(main_ctx, board, first, depth, alpha, beta);
        alpha = alpha.max(first_score);
        if first_score >= beta {
            self.tt.store(
                root_key,
                depth,
                first_score,
                first,
                TTFlag::LowerBound,
                0,
                self.generation,
            );
            *best_move_out = first;
            return first_score;
        }

        let next_index = AtomicUsize::new(1);
        let shared_alpha = AtomicI32::new(alpha);
        let cutoff = AtomicBool::new(false);
        let fold = Mutex::new((first_score, first));

        let worker = |ctx: &mut ThreadContext, root: &Board| {
            let mut local = root.clone();
            loop {
                if cutoff.load(Ordering::Relaxed) || self.should_stop() {
                    break;
                }
                let idx = next_index.fetch_add(1, Ordering::Relaxed);
                if idx >= moves.len() {
                    break;
                }
                // Stale reads of shared_alpha only cost extra work: a move
                // searched with too small an alpha is re-folded below under
                // the lock, never lost.
                let local_alpha = shared_alpha.load(Ordering::Relaxed);
                let value =
                    self.search_root_move(ctx, &mut local, moves[idx], depth, local_alpha, beta);
                if self.stop.load(Ordering::Relaxed) {
                    break;
                }
                let mut guard = fold.lock();
                if value > guard.0 {
                    guard.0 = value;
                    guard.1 = moves[idx];
                }
                if value > shared_alpha.load(Ordering::Relaxed) {
                    shared_alpha.store(value, Ordering::Relaxed);
                }
                if value >= beta {
                    cutoff.store(true, Ordering::Relaxed);
                }
            }
        };

        let helper_count = self.thread_count.saturating_sub(1).min(rest.len());
        if helper_count == 0 {
            worker(main_ctx, board);
        } else {
            let root_board = board.clone();
            std::thread::scope(|scope| {
                let worker_ref = &worker;
                let root_ref = &root_board;
                for ctx in rest.iter_mut().take(helper_count) {
                    scope.spawn(move || worker_ref(ctx, root_ref));
                }
                worker_ref(main_ctx, root_ref);
            });
        }

        let (best_score, best_move) = fold.into_inner();

        let flag = if best_score <= alpha_original {
            TTFlag::UpperBound
        } else if best_score >= beta {
            TTFlag::LowerBound
        } else {
            TTFlag::Exact
        };
        self.tt
            .store(root_key, depth, best_score, best_move, flag, 0, self.generation);
        *best_move_out = best_move;
        best_score
    }

    fn search_root_move(
        &self,
        ctx: &mut ThreadContext,
        board: &mut Board,
        mv: Move,
        depth: i32,
        alpha: i32,
        beta: i32,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }

        ctx.reset_repetition(&self.game_history, board.hash());

        {
            let (base, rest) = ctx.accumulators.split_at_mut(1);
            self.evaluator
                .update_accumulator(board, mv, &base[0], &mut rest[0]);
        }

        let Ok(undo) = board.make_move(mv) else {
            return 0;
        };
        ctx.repetition.push(board.hash());
        let value = -self.negamax(ctx, board, depth - 1, -beta, -alpha, true, 1);
        ctx.repetition.pop();
        board.undo_move(mv, &undo);
        value
    }

    fn negamax(
        &self,
        ctx: &mut ThreadContext,
        board: &mut Board,
        depth: i32,
        mut alpha: i32,
        beta: i32,
        allow_null: bool,
        ply: i32,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }

        self.update_seldepth(ply);
        self.nodes_total.fetch_add(1, Ordering::Relaxed);

        let us = board.side_to_move();
        let in_check = board.in_check(us);

        if ply as usize >= MAX_PLY {
            return self.evaluator.evaluate(board, &ctx.accumulators[ply as usize]);
        }

        if depth <= 0 {
            return self.quiescence(ctx, board, alpha, beta, ply);
        }

        if board.halfmove_clock() >= 100 {
            return 0;
        }
        let key = board.hash();
        if ctx.repetition.iter().filter(|&&h| h == key).count() >= 3 {
            return 0;
        }

        let mut tt_move = Move::NULL;
        if let Some(entry) = self.tt.probe(key, ply) {
            tt_move = entry.mv;
            if entry.depth as i32 >= depth {
                let score = entry.score as i32;
                match entry.flag {
                    TTFlag::Exact => return score,
                    TTFlag::UpperBound if score <= alpha => return score,
                    TTFlag::LowerBound if score >= beta => return score,
                    _ => {}
                }
            }
        }

        let static_eval = self
            .evaluator
            .evaluate(board, &ctx.accumulators[ply as usize]);
        let alpha_original = alpha;

        if !in_check && allow_null && depth >= 3 && static_eval >= beta {
            {
                // A null move leaves every piece in place; the child ply
                // evaluates the same accumulator.
                let split = ply as usize + 1;
                let (left, right) = ctx.accumulators.split_at_mut(split);
                right[0].copy_from(&left[split - 1]);
            }
            let undo = board.make_null_move();
            ctx.repetition.push(board.hash());
            let null_score = -self.negamax(
                ctx,
                board,
                depth - 1 - NULL_MOVE_REDUCTION,
                -beta,
                -beta + 1,
                false,
                ply + 1,
            );
            ctx.repetition.pop();
            board.undo_null_move(&undo);
            if null_score >= beta {
                return beta;
            }
        }

        let mut moves = MoveGen::generate_legal(board);
        if moves.is_empty() {
            return if in_check { -MATE + ply } else { 0 };
        }

        {
            let ctx_ref = &*ctx;
            let board_ref = &*board;
            moves.sort_by_key(|&mv| {
                Reverse(if mv == tt_move {
                    (3, 0, 0)
                } else if mv.is_capture() {
                    (2, mvv_lva(mv, board_ref), 0)
                } else {
                    let killers = ctx_ref.killers[ply as usize];
                    let history = ctx_ref.history_score(mv, us);
                    if mv == killers[0] {
                        (1, 2, history)
                    } else if mv == killers[1] {
                        (1, 1, history)
                    } else {
                        (0, 0, history)
                    }
                })
            });
        }

        let mut best_move = Move::NULL;
        let mut best_score = -INFINITY;

        for (move_index, &mv) in moves.iter().enumerate() {
            {
                let split = ply as usize + 1;
                let (left, right) = ctx.accumulators.split_at_mut(split);
                self.evaluator
                    .update_accumulator(board, mv, &left[split - 1], &mut right[0]);
            }

            let Ok(undo) = board.make_move(mv) else {
                continue;
            };
            ctx.repetition.push(board.hash());

            let gives_check = board.in_check(board.side_to_move());
            let can_reduce = !mv.is_capture()
                && !mv.is_promotion()
                && !gives_check
                && !in_check
                && depth >= 3
                && move_index >= 3;

            let mut score;
            if can_reduce {
                let reduction = 1 + i32::from(move_index > 6);
                let reduced_depth = (depth - 1 - reduction).max(1);
                score = -self.negamax(ctx, board, reduced_depth, -alpha - 1, -alpha, true, ply + 1);
                if score > alpha {
                    score = -self.negamax(ctx, board, depth - 1, -beta, -alpha, true, ply + 1);
                }
            } else {
                score = -self.negamax(ctx, board, depth - 1, -beta, -alpha, true, ply + 1);
            }

            if score > best_score {
                best_score = score;
                best_move = mv;
            }
            if score > alpha {
                alpha = score;
            }

            ctx.repetition.pop();
            board.undo_move(mv, &undo);

            if alpha >= beta {
                if !mv.is_capture() && !mv.is_promotion() {
                    ctx.update_killers(ply, mv);
                    ctx.update_history(mv, depth, us);
                }
                break;
            }

            if !mv.is_capture() && !mv.is_promotion() && alpha > static_eval {
                ctx.update_history(mv, depth, us);
            }
        }

        if best_move.is_null() {
            best_move = moves[0];
        }

        let flag = if best_score <= alpha_original {
            TTFlag::UpperBound
        } else if best_score >= beta {
            TTFlag::LowerBound
        } else {
            TTFlag::Exact
        };
        self.tt
            .store(key, depth, best_score, best_move, flag, ply, self.generation);
        best_score
    }

    fn quiescence(
        &self,
        ctx: &mut ThreadContext,
        board: &mut Board,
        mut alpha: i32,
        beta: i32,
        ply: i32,
    ) -> i32 {
        if self.should_stop() {
            return 0;
        }

        self.nodes_total.fetch_add(1, Ordering::Relaxed);

        if ply as usize >= MAX_PLY {
            return self.evaluator.evaluate(board, &ctx.accumulators[ply as usize]);
        }

        // When in check, resolve evasions at full width instead of standing
        // pat on an illegal-to-keep position.
        if board.in_check(board.side_to_move()) {
            return self.negamax(ctx, board, 1, alpha, beta, false, ply);
        }

        let stand_pat = self
            .evaluator
            .evaluate(board, &ctx.accumulators[ply as usize]);
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let mut captures: Vec<Move> = MoveGen::generate_legal(board)
            .into_iter()
            .filter(|mv| mv.is_capture() || mv.is_promotion())
            .collect();
        {
            let board_ref = &*board;
            captures.sort_by_key(|&mv| Reverse(mvv_lva(mv, board_ref)));
        }

        for mv in captures {
            {
                let split = ply as usize + 1;
                let (left, right) = ctx.accumulators.split_at_mut(split);
                self.evaluator
                    .update_accumulator(board, mv, &left[split - 1], &mut right[0]);
            }

            let Ok(undo) = board.make_move(mv) else {
                continue;
            };
            ctx.repetition.push(board.hash());
            let score = -self.quiescence(ctx, board, -beta, -alpha, ply + 1);
            ctx.repetition.pop();
            board.undo_move(mv, &undo);

            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }

    /// Follows best moves through the table, verifying each against the
    /// legal move list, up to `MAX_PV_LENGTH` plies.
    fn extract_pv(&self, board: &Board) -> Vec<Move> {
        let mut pv = Vec::new();
        let mut copy = board.clone();
        for _ in 0..MAX_PV_LENGTH {
            let Some(entry) = self.tt.probe(copy.hash(), 0) else {
                break;
            };
            let mv = entry.mv;
            if mv.is_null() {
                break;
            }
            if !MoveGen::generate_legal(&mut copy).contains(&mv) {
                break;
            }
            if copy.make_move(mv).is_err() {
                break;
            }
            pv.push(mv);
        }
        pv
    }

    fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return true;
        }
        if self.node_limit > 0 && self.nodes_total.load(Ordering::Relaxed) >= self.node_limit {
            return true;
        }
        if let Some(limit) = self.time_limit {
            if self.start_time.elapsed() >= limit {
                return true;
            }
        }
        false
    }

    fn compute_time_budget(&self, board: &Board, limits: &SearchLimits) -> Option<Duration> {
        if limits.move_time_ms >= 0 {
            return Some(Duration::from_millis(limits.move_time_ms as u64));
        }
        if limits.infinite {
            return None;
        }
        let us = board.side_to_move();
        let time_left = limits.time_left_ms[us.index()];
        let increment = limits.increment_ms[us.index()];
        if time_left <= 0 && increment <= 0 {
            return None;
        }
        let allocation = self.time_manager.allocate_ms(
            time_left,
            increment,
            board.fullmove_number(),
            limits.moves_to_go,
        );
        Some(Duration::from_millis(allocation.max(0) as u64))
    }

    fn update_seldepth(&self, ply: i32) {
        let mut current = self.seldepth_total.load(Ordering::Relaxed);
        while current < ply {
            match self.seldepth_total.compare_exchange_weak(
                current,
                ply,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs `negamax` directly on the root position with a seeded
    /// repetition history, the way the root worker would.
    fn negamax_at_root(
        search: &mut Search,
        board: &mut Board,
        depth: i32,
        alpha: i32,
        beta: i32,
        history: &[u64],
    ) -> i32 {
        let evaluator = Arc::clone(&search.evaluator);
        let mut contexts = std::mem::take(&mut search.contexts);
        evaluator.build_accumulator(board, &mut contexts[0].accumulators[0]);
        contexts[0].reset_repetition(history, board.hash());
        let score = search.negamax(&mut contexts[0], board, depth, alpha, beta, true, 0);
        search.contexts = contexts;
        score
    }

    fn new_search() -> Search {
        Search::new(1 << 16, Arc::new(Evaluator::new()))
    }

    #[test]
    fn fifty_move_rule_scores_zero() {
        let mut search = new_search();
        let mut board =
            Board::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 100 80")
                .unwrap();
        for depth in 1..=4 {
            assert_eq!(
                negamax_at_root(&mut search, &mut board, depth, -INFINITY, INFINITY, &[]),
                0
            );
        }
    }

    #[test]
    fn threefold_repetition_scores_zero() {
        let mut board = Board::start_position();
        let mut history = Vec::new();
        for token in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"] {
            history.push(board.hash());
            let mv = MoveGen::generate_legal(&mut board)
                .into_iter()
                .find(|m| m.to_uci() == token)
                .expect("knight shuffle move should be legal");
            board.make_move(mv).unwrap();
        }

        // The root position now stands for the third time.
        assert_eq!(history.iter().filter(|&&h| h == board.hash()).count(), 2);

        let mut search = new_search();
        assert_eq!(
            negamax_at_root(&mut search, &mut board, 3, -INFINITY, INFINITY, &history),
            0
        );
    }

    #[test]
    fn null_move_pruning_fails_high_on_quiet_material_edge() {
        let mut search = new_search();
        let mut board = Board::from_fen("8/8/8/8/8/8/PPP5/K6k w - - 0 1").unwrap();
        let score = negamax_at_root(&mut search, &mut board, 3, 0, 50, &[]);
        assert!(score >= 50);
    }

    #[test]
    fn mvv_lva_prefers_valuable_victims() {
        let d4 = crate::defs::parse_square("d4").unwrap();
        let c5 = crate::defs::parse_square("c5").unwrap();
        let capture = Move::new(d4, c5, crate::mv::flag::CAPTURE);

        let pawn_victim = Board::from_fen("7k/3q4/8/2p5/3P4/8/8/K7 w - - 0 1").unwrap();
        let queen_victim = Board::from_fen("7k/3q4/8/2q5/3P4/8/8/K7 w - - 0 1").unwrap();
        assert!(mvv_lva(capture, &queen_victim) > mvv_lva(capture, &pawn_victim));
    }
}
