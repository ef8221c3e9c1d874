//! Accumulator-network evaluation.
//!
//! Architecture: 768 binary features (colour x piece x square) feed a hidden
//! layer of `hidden_size` neurons held as per-colour integer accumulators; a
//! tanh-style activation on scaled integers and a float output projection
//! produce a centipawn score oriented to the side to move.
//!
//! Weights load from a little-endian binary file (magic `NNUE`). Any load
//! failure falls back to plain piece values so the engine always has a
//! working evaluation.

pub mod accumulator;

pub use accumulator::Accumulator;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::board::Board;
use crate::defs::{
    pop_lsb, Color, PieceType, BOARD_SIZE, N_COLORS, N_PIECES, PIECE_VALUES,
};
use crate::errors::EngineError;
use crate::mv::Move;

pub const FEATURE_COUNT: usize = N_COLORS * N_PIECES * BOARD_SIZE;

/// Divisor applied before the tanh activation and multiplier after it, so
/// the hidden layer saturates smoothly on integer accumulator sums.
pub const ACTIVATION_SCALE: f64 = 512.0;

/// Static evaluations are clamped to this magnitude, keeping them clear of
/// the mate-score range.
pub const MAX_EVAL_MAG: i32 = 30_000;

const MAGIC: [u8; 4] = *b"NNUE";
const VERSION_V1: u32 = 1;
const VERSION_V2: u32 = 2;

/// Index into the flattened feature array for a piece of `color` on `sq`.
#[inline]
pub fn feature_index(color: Color, piece: PieceType, sq: u8) -> usize {
    color.index() * N_PIECES * BOARD_SIZE + piece.index() * BOARD_SIZE + sq as usize
}

/// Network parameters. Input weights are stored neuron-major:
/// `input_weights[neuron * FEATURE_COUNT + feature]`.
pub struct Network {
    hidden_size: usize,
    input_weights: Vec<i32>,
    hidden_biases: Vec<i32>,
    output_weights: Vec<f32>,
    bias: i32,
    scale: f32,
}

impl Network {
    fn with_storage(hidden_size: usize) -> Network {
        let hidden_size = hidden_size.max(1);
        Network {
            hidden_size,
            input_weights: vec![0; hidden_size * FEATURE_COUNT],
            hidden_biases: vec![0; hidden_size],
            output_weights: vec![0.0; hidden_size],
            bias: 0,
            scale: 1.0,
        }
    }

    /// Piece-value fallback: every square of a piece type carries that
    /// piece's material value, one hidden neuron, unit output.
    pub fn fallback() -> Network {
        let mut net = Network::with_storage(1);
        net.output_weights[0] = 1.0;
        for color_idx in 0..N_COLORS {
            let color = Color::from_index(color_idx);
            for piece_idx in 0..N_PIECES {
                let piece = PieceType::from_index(piece_idx);
                for sq in 0..BOARD_SIZE as u8 {
                    let feature = feature_index(color, piece, sq);
                    net.input_weights[feature] = PIECE_VALUES[piece_idx];
                }
            }
        }
        net
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Network, EngineError> {
        let data = std::fs::read(path.as_ref())?;
        Network::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Network, EngineError> {
        let mut cursor = std::io::Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(EngineError::Format("magic mismatch".into()));
        }

        let version = read_u32(&mut cursor)?;
        let feature_count = read_u32(&mut cursor)? as usize;
        if feature_count != FEATURE_COUNT {
            return Err(EngineError::Format(format!(
                "unexpected feature count {}",
                feature_count
            )));
        }

        match version {
            VERSION_V1 => {
                // Degenerate single-neuron layout retained for compatibility.
                let bias = read_i32(&mut cursor)?;
                let scale = read_f32(&mut cursor)?;
                let weights = read_i16_vec(&mut cursor, FEATURE_COUNT)?;

                let mut net = Network::with_storage(1);
                for (slot, value) in net.input_weights.iter_mut().zip(weights) {
                    *slot = value as i32;
                }
                net.output_weights[0] = 1.0;
                net.bias = bias;
                net.scale = scale;
                Ok(net)
            }
            VERSION_V2 => {
                let hidden_size = read_u32(&mut cursor)? as usize;
                let bias = read_i32(&mut cursor)?;
                let scale = read_f32(&mut cursor)?;

                let mut net = Network::with_storage(hidden_size);
                let hidden_biases = read_i16_vec(&mut cursor, net.hidden_size)?;
                for (slot, value) in net.hidden_biases.iter_mut().zip(hidden_biases) {
                    *slot = value as i32;
                }
                net.output_weights = read_f32_vec(&mut cursor, net.hidden_size)?;
                let weights = read_i16_vec(&mut cursor, net.hidden_size * FEATURE_COUNT)?;
                for (slot, value) in net.input_weights.iter_mut().zip(weights) {
                    *slot = value as i32;
                }
                net.bias = bias;
                net.scale = scale;
                Ok(net)
            }
            other => Err(EngineError::Format(format!(
                "unsupported network version {}",
                other
            ))),
        }
    }

    /// Serializes in the current (v2) layout. Weights and biases saturate to
    /// the on-disk i16 range.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            16 + self.hidden_size * 2 + self.hidden_size * 4 + self.input_weights.len() * 2,
        );
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&VERSION_V2.to_le_bytes());
        buf.extend_from_slice(&(FEATURE_COUNT as u32).to_le_bytes());
        buf.extend_from_slice(&(self.hidden_size as u32).to_le_bytes());
        buf.extend_from_slice(&self.bias.to_le_bytes());
        buf.extend_from_slice(&self.scale.to_le_bytes());
        for &b in &self.hidden_biases {
            buf.extend_from_slice(&(b.clamp(i16::MIN as i32, i16::MAX as i32) as i16).to_le_bytes());
        }
        for &w in &self.output_weights {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        for &w in &self.input_weights {
            buf.extend_from_slice(&(w.clamp(i16::MIN as i32, i16::MAX as i32) as i16).to_le_bytes());
        }
        buf
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        std::fs::write(path.as_ref(), self.to_bytes())?;
        Ok(())
    }

    #[inline]
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    #[inline]
    fn input_weight(&self, feature: usize, neuron: usize) -> i32 {
        self.input_weights[neuron * FEATURE_COUNT + feature]
    }

    pub fn set_input_weight(&mut self, feature: usize, neuron: usize, value: i32) {
        self.input_weights[neuron * FEATURE_COUNT + feature] = value;
    }

    pub fn set_hidden_bias(&mut self, neuron: usize, value: i32) {
        self.hidden_biases[neuron] = value;
    }

    pub fn set_output_weight(&mut self, neuron: usize, value: f32) {
        self.output_weights[neuron] = value;
    }

    pub fn set_bias(&mut self, bias: i32) {
        self.bias = bias;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// A fresh all-zero network of the given width, for tuning and tests.
    pub fn zeroed(hidden_size: usize) -> Network {
        Network::with_storage(hidden_size)
    }
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, EngineError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, EngineError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32, EngineError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_i16_vec<R: Read>(r: &mut R, count: usize) -> Result<Vec<i16>, EngineError> {
    let mut bytes = vec![0u8; count * 2];
    r.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

fn read_f32_vec<R: Read>(r: &mut R, count: usize) -> Result<Vec<f32>, EngineError> {
    let mut bytes = vec![0u8; count * 4];
    r.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Owns the network and drives accumulator maintenance. The network loads
/// once, lazily; configuration (the weights path) flows in at construction.
pub struct Evaluator {
    network_path: Option<PathBuf>,
    network: OnceLock<Network>,
}

impl Default for Evaluator {
    fn default() -> Evaluator {
        Evaluator::new()
    }
}

impl Evaluator {
    pub fn new() -> Evaluator {
        Evaluator {
            network_path: None,
            network: OnceLock::new(),
        }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Evaluator {
        Evaluator {
            network_path: Some(path.into()),
            network: OnceLock::new(),
        }
    }

    /// Wraps an already-built network, mainly for tests and tuning.
    pub fn from_network(network: Network) -> Evaluator {
        let cell = OnceLock::new();
        let _ = cell.set(network);
        Evaluator {
            network_path: None,
            network: cell,
        }
    }

    /// Loads the network on first use. A failed load is reported once on
    /// stderr and replaced by the piece-value fallback; it never fails the
    /// engine.
    pub fn network(&self) -> &Network {
        self.network.get_or_init(|| match &self.network_path {
            Some(path) => match Network::load(path) {
                Ok(net) => net,
                Err(err) => {
                    eprintln!("info string network fallback: {}", err);
                    Network::fallback()
                }
            },
            None => Network::fallback(),
        })
    }

    fn apply_feature(
        &self,
        net: &Network,
        accum: &mut Accumulator,
        color: Color,
        piece: PieceType,
        sq: u8,
        sign: i32,
    ) {
        let feature = feature_index(color, piece, sq);
        let values = match color {
            Color::White => &mut accum.white,
            Color::Black => &mut accum.black,
        };
        for (neuron, value) in values.iter_mut().enumerate() {
            *value += sign * net.input_weight(feature, neuron);
        }
    }

    /// Rebuilds `accum` from scratch for the given position.
    pub fn build_accumulator(&self, board: &Board, accum: &mut Accumulator) {
        let net = self.network();
        accum.reset(net.hidden_size());
        for color_idx in 0..N_COLORS {
            let color = Color::from_index(color_idx);
            for piece_idx in 0..N_PIECES {
                let piece = PieceType::from_index(piece_idx);
                let mut bb = board.pieces(color, piece);
                while bb != 0 {
                    let sq = pop_lsb(&mut bb);
                    self.apply_feature(net, accum, color, piece, sq, 1);
                }
            }
        }
    }

    /// Applies the feature deltas of `mv` to `base`, writing into `dest`.
    /// `board` must be the position *before* the move is made.
    pub fn update_accumulator(
        &self,
        board: &Board,
        mv: Move,
        base: &Accumulator,
        dest: &mut Accumulator,
    ) {
        let net = self.network();
        dest.copy_from(base);

        let us = board.side_to_move();
        let moving_piece = match board.piece_type_at(mv.from) {
            Some(piece) => piece,
            None => return,
        };

        self.apply_feature(net, dest, us, moving_piece, mv.from, -1);

        let placed = if mv.is_promotion() {
            mv.promotion.unwrap_or(moving_piece)
        } else {
            moving_piece
        };
        self.apply_feature(net, dest, us, placed, mv.to, 1);

        if mv.is_capture() {
            let them = us.opposite();
            let (captured, capture_sq) = if mv.is_en_passant() {
                let sq = if us == Color::White { mv.to - 8 } else { mv.to + 8 };
                (PieceType::Pawn, sq)
            } else {
                (
                    board.piece_type_at(mv.to).unwrap_or(PieceType::Pawn),
                    mv.to,
                )
            };
            self.apply_feature(net, dest, them, captured, capture_sq, -1);
        }

        if mv.is_castle() {
            let (rook_from, rook_to) = if mv.is_king_castle() {
                if us == Color::White {
                    (crate::defs::H1, crate::defs::F1)
                } else {
                    (crate::defs::H8, crate::defs::F8)
                }
            } else if us == Color::White {
                (crate::defs::A1, crate::defs::D1)
            } else {
                (crate::defs::A8, crate::defs::D8)
            };
            self.apply_feature(net, dest, us, PieceType::Rook, rook_from, -1);
            self.apply_feature(net, dest, us, PieceType::Rook, rook_to, 1);
        }
    }

    /// Forward pass: hidden activations from the accumulator difference,
    /// output projection, scale, clamp, orient to the side to move.
    pub fn evaluate(&self, board: &Board, accum: &Accumulator) -> i32 {
        let net = self.network();
        let mut raw = net.bias as f64;
        for neuron in 0..net.hidden_size() {
            let pre = (accum.white[neuron] - accum.black[neuron] + net.hidden_biases[neuron]) as f64;
            let act = (pre / ACTIVATION_SCALE).tanh() * ACTIVATION_SCALE;
            raw += act * net.output_weights[neuron] as f64;
        }
        let mut score = (raw * net.scale as f64).round() as i32;
        score = score.clamp(-MAX_EVAL_MAG, MAX_EVAL_MAG);
        if board.side_to_move() == Color::White {
            score
        } else {
            -score
        }
    }

    /// Convenience scratch evaluation of a bare position.
    pub fn evaluate_board(&self, board: &Board) -> i32 {
        let mut accum = Accumulator::new(self.network().hidden_size());
        self.build_accumulator(board, &mut accum);
        self.evaluate(board, &accum)
    }
}
