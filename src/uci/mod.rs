//! UCI protocol front-end.
//!
//! Line-oriented stdin/stdout. `go` launches the search on a background
//! thread that prints `info` lines per completed iteration and `bestmove`
//! when it finishes; `stop` flips the shared flag and joins. Input errors
//! are surfaced as `info string` diagnostics and never terminate the loop.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::board::Board;
use crate::defs::Color;
use crate::movegen::MoveGen;
use crate::mv::Move;
use crate::nnue::Evaluator;
use crate::search::time::TimeConfig;
use crate::search::{Search, SearchLimits, SearchResult, MATE, MATE_THRESHOLD};

const ENGINE_NAME: &str = "Osprey 0.5";
const ENGINE_AUTHOR: &str = "the Osprey developers";
const DEFAULT_HASH_MB: usize = 16;

pub struct UciHandler {
    board: Board,
    search: Arc<Mutex<Search>>,
    stop_flag: Arc<AtomicBool>,
    search_thread: Option<JoinHandle<()>>,
    /// Zobrist keys of every position reached while replaying `position`
    /// moves, handed to the search for cross-boundary repetition detection.
    position_history: Vec<u64>,
    time_config: TimeConfig,
    move_overhead_ms: i64,
    ponder_enabled: bool,
}

impl Default for UciHandler {
    fn default() -> UciHandler {
        UciHandler::new()
    }
}

impl UciHandler {
    pub fn new() -> UciHandler {
        let mut search = Search::new(1, Arc::new(Evaluator::new()));
        search.set_table_size_mb(DEFAULT_HASH_MB);
        UciHandler {
            board: Board::start_position(),
            search: Arc::new(Mutex::new(search)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            search_thread: None,
            position_history: Vec::new(),
            time_config: TimeConfig::default(),
            move_overhead_ms: 30,
            ponder_enabled: false,
        }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !self.handle_command(line) {
                break;
            }
        }
        self.stop_search();
    }

    /// Handles one command line; returns false on `quit`.
    pub fn handle_command(&mut self, line: &str) -> bool {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.first().copied() {
            Some("uci") => {
                println!("id name {}", ENGINE_NAME);
                println!("id author {}", ENGINE_AUTHOR);
                println!("option name Hash type spin default {} min 1 max 4096", DEFAULT_HASH_MB);
                println!("option name Threads type spin default 1 min 1 max 128");
                println!(
                    "option name Move Overhead type spin default {} min 0 max 5000",
                    self.move_overhead_ms
                );
                println!(
                    "option name Base Time Percent type spin default {} min 1 max 100",
                    (self.time_config.base_fraction * 100.0) as i64
                );
                println!(
                    "option name Increment Percent type spin default {} min 0 max 500",
                    (self.time_config.increment_fraction * 100.0) as i64
                );
                println!(
                    "option name Minimum Think Time type spin default {} min 1 max 10000",
                    self.time_config.min_time_ms
                );
                println!(
                    "option name Maximum Think Time type spin default {} min 10 max 120000",
                    self.time_config.max_time_ms
                );
                println!("option name EvalNetwork type string default ");
                println!("option name Ponder type check default false");
                println!("uciok");
            }
            Some("isready") => println!("readyok"),
            Some("ucinewgame") => {
                self.stop_search();
                self.board.set_start_position();
                self.position_history.clear();
                self.search.lock().clear();
            }
            Some("position") => {
                self.stop_search();
                self.handle_position(&parts[1..]);
            }
            Some("go") => self.handle_go(&parts[1..]),
            Some("stop") => self.stop_search(),
            Some("setoption") => self.handle_setoption(&parts[1..]),
            Some("quit") => {
                self.stop_search();
                return false;
            }
            _ => {}
        }
        true
    }

    fn handle_position(&mut self, parts: &[&str]) {
        let mut index = 0;
        match parts.first().copied() {
            Some("startpos") => {
                self.board.set_start_position();
                index = 1;
            }
            Some("fen") => {
                let mut fen_parts = Vec::new();
                index = 1;
                while index < parts.len() && parts[index] != "moves" {
                    fen_parts.push(parts[index]);
                    index += 1;
                }
                let fen = fen_parts.join(" ");
                if let Err(err) = self.board.set_from_fen(&fen) {
                    println!("info string {}", err);
                    self.board.set_start_position();
                }
            }
            _ => return,
        }

        self.position_history.clear();
        if parts.get(index) == Some(&"moves") {
            for token in &parts[index + 1..] {
                match self.parse_move(token) {
                    Ok(mv) => {
                        self.position_history.push(self.board.hash());
                        if let Err(err) = self.board.make_move(mv) {
                            println!("info string {}", err);
                            self.position_history.pop();
                            break;
                        }
                    }
                    Err(err) => {
                        println!("info string {}", err);
                        break;
                    }
                }
            }
        }
    }

    fn parse_move(&mut self, token: &str) -> Result<Move, crate::errors::EngineError> {
        let moves = MoveGen::generate_legal(&mut self.board);
        moves
            .into_iter()
            .find(|mv| mv.to_uci() == token)
            .ok_or_else(|| crate::errors::EngineError::IllegalMove(token.to_string()))
    }

    fn handle_go(&mut self, parts: &[&str]) {
        let mut limits = SearchLimits::default();
        let mut i = 0;
        while i < parts.len() {
            let next_i64 = |i: &mut usize| -> Option<i64> {
                if *i + 1 < parts.len() {
                    *i += 1;
                    parts[*i].parse().ok()
                } else {
                    None
                }
            };
            match parts[i] {
                "wtime" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.time_left_ms[Color::White.index()] = v;
                    }
                }
                "btime" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.time_left_ms[Color::Black.index()] = v;
                    }
                }
                "winc" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.increment_ms[Color::White.index()] = v;
                    }
                }
                "binc" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.increment_ms[Color::Black.index()] = v;
                    }
                }
                "movestogo" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.moves_to_go = v as i32;
                    }
                }
                "depth" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.max_depth = v as i32;
                    }
                }
                "nodes" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.node_limit = v.max(0) as u64;
                    }
                }
                "movetime" => {
                    if let Some(v) = next_i64(&mut i) {
                        limits.move_time_ms = v;
                    }
                }
                "mate" => {
                    if let Some(v) = next_i64(&mut i) {
                        if v > 0 {
                            limits.max_depth = (v * 2) as i32;
                        }
                    }
                }
                "infinite" => limits.infinite = true,
                "ponder" => limits.ponder = true,
                _ => {}
            }
            i += 1;
        }

        if limits.max_depth <= 0 {
            limits.max_depth = 64;
        }

        for color in 0..2 {
            if limits.time_left_ms[color] > 0 {
                limits.time_left_ms[color] =
                    (limits.time_left_ms[color] - self.move_overhead_ms).max(0);
            }
        }
        if limits.move_time_ms > 0 {
            limits.move_time_ms = (limits.move_time_ms - self.move_overhead_ms).max(0);
        }

        self.start_search(limits);
    }

    fn handle_setoption(&mut self, parts: &[&str]) {
        let Some(value_pos) = parts.iter().position(|&p| p == "value") else {
            return;
        };
        if parts.first() != Some(&"name") {
            return;
        }
        let name = parts[1..value_pos].join(" ");
        let value = parts[value_pos + 1..].join(" ");

        match name.as_str() {
            "Hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.stop_search();
                    self.search.lock().set_table_size_mb(mb.max(1));
                }
            }
            "Threads" => {
                if let Ok(threads) = value.parse::<usize>() {
                    self.stop_search();
                    self.search.lock().set_threads(threads.max(1));
                }
            }
            "Move Overhead" => {
                if let Ok(overhead) = value.parse::<i64>() {
                    self.move_overhead_ms = overhead.max(0);
                }
            }
            "Base Time Percent" => {
                if let Ok(percent) = value.parse::<f64>() {
                    self.time_config.base_fraction = percent.clamp(0.0, 100.0) / 100.0;
                    self.apply_time_config();
                }
            }
            "Increment Percent" => {
                if let Ok(percent) = value.parse::<f64>() {
                    self.time_config.increment_fraction = percent.clamp(0.0, 500.0) / 100.0;
                    self.apply_time_config();
                }
            }
            "Minimum Think Time" => {
                if let Ok(ms) = value.parse::<i64>() {
                    self.time_config.min_time_ms = ms.max(1);
                    self.apply_time_config();
                }
            }
            "Maximum Think Time" => {
                if let Ok(ms) = value.parse::<i64>() {
                    self.time_config.max_time_ms = ms.max(self.time_config.min_time_ms);
                    self.apply_time_config();
                }
            }
            "EvalNetwork" => {
                if !value.is_empty() {
                    self.stop_search();
                    self.search
                        .lock()
                        .set_evaluator(Arc::new(Evaluator::with_path(value.clone())));
                    println!("info string eval network set to {}", value);
                }
            }
            "Ponder" => {
                self.ponder_enabled = value == "true";
            }
            _ => {
                println!("info string unknown option {}", name);
            }
        }
    }

    fn apply_time_config(&mut self) {
        self.search.lock().set_time_config(self.time_config);
    }

    fn start_search(&mut self, limits: SearchLimits) {
        self.stop_search();
        self.stop_flag.store(false, Ordering::SeqCst);

        let search = Arc::clone(&self.search);
        let stop = Arc::clone(&self.stop_flag);
        let mut board = self.board.clone();
        let history = self.position_history.clone();
        let time_config = self.time_config;
        let report_ponder = limits.ponder || self.ponder_enabled;

        self.search_thread = Some(std::thread::spawn(move || {
            let result = {
                let mut guard = search.lock();
                guard.set_time_config(time_config);
                guard.set_game_history(history);
                let info = |result: &SearchResult| print_info(result);
                guard.search_with(&mut board, &limits, stop, Some(&info))
            };
            print_bestmove(&result, report_ponder);
        }));
    }

    fn stop_search(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.search_thread.take() {
            let _ = handle.join();
        }
        self.stop_flag.store(false, Ordering::SeqCst);
    }
}

fn print_info(result: &SearchResult) {
    let mut line = format!("info depth {}", result.depth);
    if result.seldepth > 0 {
        line.push_str(&format!(" seldepth {}", result.seldepth));
    }

    if result.score.abs() >= MATE_THRESHOLD {
        let mut mate_moves = (MATE - result.score.abs() + 1) / 2;
        if result.score < 0 {
            mate_moves = -mate_moves;
        }
        line.push_str(&format!(" score mate {}", mate_moves));
    } else {
        line.push_str(&format!(" score cp {}", result.score));
    }

    let elapsed_ms = result.elapsed.as_millis() as u64;
    line.push_str(&format!(" time {} nodes {}", elapsed_ms, result.nodes));
    if elapsed_ms > 0 {
        line.push_str(&format!(" nps {}", result.nodes * 1000 / elapsed_ms));
    }

    if !result.pv.is_empty() {
        line.push_str(" pv");
        for mv in &result.pv {
            line.push(' ');
            line.push_str(&mv.to_uci());
        }
    }

    println!("{}", line);
}

fn print_bestmove(result: &SearchResult, report_ponder: bool) {
    if result.best_move.is_null() {
        println!("bestmove 0000");
        return;
    }
    if report_ponder && result.pv.len() >= 2 {
        println!(
            "bestmove {} ponder {}",
            result.best_move.to_uci(),
            result.pv[1].to_uci()
        );
    } else {
        println!("bestmove {}", result.best_move.to_uci());
    }
}
