use std::time::Instant;

use anyhow::{Context, Result};

use osprey::board::{Board, START_FEN};
use osprey::perft::perft;
use osprey::uci::UciHandler;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("perft") {
        return run_perft(&args[1..]);
    }

    let mut handler = UciHandler::new();
    handler.run();
    Ok(())
}

fn run_perft(args: &[String]) -> Result<()> {
    let depth: u32 = args
        .first()
        .context("usage: osprey perft <depth> [fen]")?
        .parse()
        .context("perft depth must be an integer")?;
    let fen = if args.len() > 1 {
        args[1..].join(" ")
    } else {
        START_FEN.to_string()
    };

    let mut board = Board::from_fen(&fen)?;
    for d in 1..=depth {
        let start = Instant::now();
        let nodes = perft(&mut board, d);
        let elapsed = start.elapsed();
        println!(
            "perft({}) = {} ({} ms)",
            d,
            nodes,
            elapsed.as_millis()
        );
    }
    Ok(())
}
