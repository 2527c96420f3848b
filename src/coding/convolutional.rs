//! Feedforward (k/n) convolutional encoder and hard-decision Viterbi decoder
//! with puncturing.
//!
//! The coder is configured with the textual forms used by scene files: a
//! code-rate string ("1/2"), a constraint-length list ("7"), a
//! transfer-function matrix in octal ("133 171") and a puncturing matrix
//! ("1 1; 1 0"). The default parameters are the industry-standard K=7 code
//! with generator polynomials 133 and 171 octal; higher rates are reached by
//! puncturing.
//!
//! All trellis tables are computed at construction and immutable afterwards:
//!
//! ```text
//! state_transitions[state][input_symbol] -> next state
//! output_symbols[state][input_symbol]    -> n coded bits
//! input_symbols[state][output_symbol]    -> input symbol, or -1 if impossible
//! ```
//!
//! The decoder runs the Viterbi algorithm over the full trellis with a
//! Hamming metric that ignores punctured positions. Two traceback modes
//! exist: "truncated" ends at the state with the best metric, "terminated"
//! ends in the all-zeros state and drops the flush bits.

use serde::Deserialize;

use crate::common::bitvector::{BitVector, ShortBitVector};
use crate::error::{Error, Result};

/// Textual coder parameters, usually deserialized from a scene file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvolutionalCoderConfig {
    /// Effective code rate after puncturing, as "k/n".
    pub code_rate: String,
    /// Constraint length of each of the k input streams, space separated.
    pub constraint_lengths: String,
    /// Generator polynomial matrix in octal; rows (one per input stream)
    /// separated by ';', entries by whitespace.
    pub transfer_function_matrix: String,
    /// Puncturing matrix; one row per output stream, entries 0 or 1.
    /// An empty string means no puncturing.
    pub puncturing_matrix: String,
    /// Viterbi traceback mode, "truncated" or "terminated".
    pub decoding_mode: String,
}

impl Default for ConvolutionalCoderConfig {
    fn default() -> Self {
        Self {
            code_rate: "1/2".into(),
            constraint_lengths: "7".into(),
            transfer_function_matrix: "133 171".into(),
            puncturing_matrix: "1; 1".into(),
            decoding_mode: "truncated".into(),
        }
    }
}

/// Traceback termination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingMode {
    /// The survivor path ends at the state with the minimum metric.
    Truncated,
    /// The survivor path ends in the all-zeros state; the trailing flush
    /// bits are dropped from the output.
    Terminated,
}

/// One node of the per-depth best-path table.
#[derive(Debug, Clone, Copy)]
struct TrellisNode {
    distance: u32,
    prev_state: usize,
    input_symbol: i32,
    reachable: bool,
}

const UNREACHED: TrellisNode = TrellisNode {
    distance: u32::MAX,
    prev_state: 0,
    input_symbol: -1,
    reachable: false,
};

/// A (k/n) feedforward convolutional encoder/decoder.
#[derive(Debug, Clone)]
pub struct ConvolutionalCoder {
    code_rate_k: usize,
    code_rate_n: usize,
    constraint_lengths: Vec<usize>,
    memory_sizes: Vec<usize>,
    memory_size_sum: usize,
    state_count: usize,
    input_symbol_count: usize,
    output_symbol_count: usize,
    transfer_function: Vec<Vec<ShortBitVector>>,
    /// n rows of `period` keep/drop flags.
    puncturing: Vec<Vec<bool>>,
    state_transitions: Vec<Vec<usize>>,
    output_symbols: Vec<Vec<ShortBitVector>>,
    input_symbols: Vec<Vec<i32>>,
    decoding_mode: DecodingMode,
}

impl ConvolutionalCoder {
    pub fn new(config: &ConvolutionalCoderConfig) -> Result<Self> {
        let decoding_mode = match config.decoding_mode.as_str() {
            "truncated" => DecodingMode::Truncated,
            "terminated" => DecodingMode::Terminated,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown decoding mode '{other}'"
                )))
            }
        };

        let transfer = parse_octal_matrix(&config.transfer_function_matrix)?;
        let code_rate_k = transfer.len();
        let code_rate_n = transfer[0].len();
        if code_rate_k > 8 || code_rate_n > 16 {
            return Err(Error::InvalidConfiguration(format!(
                "unsupported code rate {code_rate_k}/{code_rate_n}"
            )));
        }

        let constraint_lengths = parse_lengths(&config.constraint_lengths)?;
        if constraint_lengths.len() != code_rate_k {
            return Err(Error::InvalidConfiguration(format!(
                "{} constraint lengths given for {} input streams",
                constraint_lengths.len(),
                code_rate_k
            )));
        }
        let max_constraint = *constraint_lengths.iter().max().unwrap();
        for (i, row) in transfer.iter().enumerate() {
            for &generator in row {
                if generator >= 1u32 << constraint_lengths[i] {
                    return Err(Error::InvalidConfiguration(format!(
                        "generator {generator:o} (octal) does not fit constraint length {}",
                        constraint_lengths[i]
                    )));
                }
            }
        }
        let transfer_function: Vec<Vec<ShortBitVector>> = transfer
            .iter()
            .map(|row| row.iter().map(|&g| ShortBitVector::new(g, max_constraint)).collect())
            .collect();

        let memory_sizes: Vec<usize> = constraint_lengths.iter().map(|l| l - 1).collect();
        let memory_size_sum: usize = memory_sizes.iter().sum();
        if memory_size_sum > 24 {
            return Err(Error::InvalidConfiguration(format!(
                "total memory {memory_size_sum} is too large for a full trellis"
            )));
        }
        let state_count = 1 << memory_size_sum;
        let input_symbol_count = 1 << code_rate_k;
        let output_symbol_count = 1 << code_rate_n;

        let puncturing = parse_puncturing_matrix(&config.puncturing_matrix, code_rate_n)?;
        check_code_rate(&config.code_rate, code_rate_k, &puncturing)?;

        let mut coder = Self {
            code_rate_k,
            code_rate_n,
            constraint_lengths,
            memory_sizes,
            memory_size_sum,
            state_count,
            input_symbol_count,
            output_symbol_count,
            transfer_function,
            puncturing,
            state_transitions: Vec::new(),
            output_symbols: Vec::new(),
            input_symbols: Vec::new(),
            decoding_mode,
        };
        coder.compute_trellis_tables();
        Ok(coder)
    }

    /// Sum of the per-stream memory sizes; the number of flush bits.
    pub fn memory_size_sum(&self) -> usize {
        self.memory_size_sum
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn decoding_mode(&self) -> DecodingMode {
        self.decoding_mode
    }

    pub fn state_transition(&self, state: usize, input_symbol: usize) -> usize {
        self.state_transitions[state][input_symbol]
    }

    pub fn output_symbol(&self, state: usize, input_symbol: usize) -> ShortBitVector {
        self.output_symbols[state][input_symbol]
    }

    /// The input symbol producing `output_symbol` from `state`, or -1.
    pub fn input_symbol(&self, state: usize, output_symbol: usize) -> i32 {
        self.input_symbols[state][output_symbol]
    }

    fn compute_trellis_tables(&mut self) {
        self.state_transitions = vec![vec![0; self.input_symbol_count]; self.state_count];
        self.output_symbols =
            vec![vec![ShortBitVector::default(); self.input_symbol_count]; self.state_count];
        self.input_symbols = vec![vec![-1; self.output_symbol_count]; self.state_count];
        for state in 0..self.state_count {
            for symbol in 0..self.input_symbol_count {
                let (next, output) = self.step(state, symbol);
                self.state_transitions[state][symbol] = next;
                self.output_symbols[state][symbol] = ShortBitVector::new(output, self.code_rate_n);
                self.input_symbols[state][output as usize] = symbol as i32;
            }
        }
    }

    /// One shift-register step: feeds the input symbol into the k registers
    /// and produces (next state, output symbol). Output bit j sits at bit
    /// position n-1-j of the returned value.
    fn step(&self, state: usize, input_symbol: usize) -> (usize, u32) {
        let k = self.code_rate_k;
        let mut next_state = 0usize;
        let mut registers = Vec::with_capacity(k);
        let mut offset = 0;
        for (i, &memory) in self.memory_sizes.iter().enumerate() {
            let stream_state = (state >> offset) & ((1 << memory) - 1);
            let input_bit = (input_symbol >> (k - 1 - i)) & 1;
            let register = (input_bit << memory) | stream_state;
            registers.push(register as u32);
            next_state |= (register >> 1) << offset;
            offset += memory;
        }
        let mut output = 0u32;
        for j in 0..self.code_rate_n {
            let mut bit = false;
            for (i, &register) in registers.iter().enumerate() {
                let masked = register & self.transfer_function[i][j].value();
                bit ^= masked.count_ones() & 1 == 1;
            }
            output = (output << 1) | bit as u32;
        }
        (next_state, output)
    }

    /// Encodes `information_bits`, starting in the all-zeros state.
    ///
    /// A trailing partial input symbol is zero padded. With `end_in_all_zeros`
    /// the memory-size-sum flush zeros are appended first, so the encoder
    /// ends in state 0 and "terminated" decoding applies. Puncturing is
    /// applied last.
    pub fn encode(&self, information_bits: &BitVector, end_in_all_zeros: bool) -> BitVector {
        let mut bits: Vec<bool> = information_bits.as_bits().to_vec();
        if end_in_all_zeros {
            bits.extend(std::iter::repeat(false).take(self.memory_size_sum));
        }
        while bits.len() % self.code_rate_k != 0 {
            bits.push(false);
        }
        let mut state = 0usize;
        let mut encoded = BitVector::new();
        for chunk in bits.chunks(self.code_rate_k) {
            let mut symbol = 0usize;
            for &bit in chunk {
                symbol = (symbol << 1) | bit as usize;
            }
            let output = self.output_symbols[state][symbol];
            for j in 0..self.code_rate_n {
                encoded.append(output.get_bit(self.code_rate_n - 1 - j));
            }
            state = self.state_transitions[state][symbol];
        }
        self.puncture(&encoded)
    }

    /// Decodes a (possibly punctured) codeword with the configured traceback
    /// mode. Fails with `InvalidInput` when the depunctured length is not a
    /// multiple of n, or when "terminated" finds no path into state 0.
    pub fn decode(&self, encoded_bits: &BitVector) -> Result<BitVector> {
        let (bits, punctured) = self.depuncture(encoded_bits)?;
        let n = self.code_rate_n;
        let depth = bits.len() / n;

        let mut best = vec![vec![UNREACHED; self.state_count]; depth + 1];
        best[0][0] = TrellisNode {
            distance: 0,
            prev_state: 0,
            input_symbol: -1,
            reachable: true,
        };

        let n_mask = (1u32 << n) - 1;
        for t in 0..depth {
            let mut observed = 0u32;
            let mut excluded = 0u32;
            for j in 0..n {
                observed = (observed << 1) | bits.get(t * n + j) as u32;
                excluded = (excluded << 1) | punctured[t * n + j] as u32;
            }
            for state in 0..self.state_count {
                let node = best[t][state];
                if !node.reachable {
                    continue;
                }
                for symbol in 0..self.input_symbol_count {
                    let next = self.state_transitions[state][symbol];
                    let branch = ((self.output_symbols[state][symbol].value() ^ observed)
                        & !excluded
                        & n_mask)
                        .count_ones();
                    let candidate = node.distance + branch;
                    let cell = &mut best[t + 1][next];
                    // States are visited in increasing order, so a strict
                    // comparison breaks ties toward the lower predecessor.
                    if !cell.reachable || candidate < cell.distance {
                        *cell = TrellisNode {
                            distance: candidate,
                            prev_state: state,
                            input_symbol: symbol as i32,
                            reachable: true,
                        };
                    }
                }
            }
        }

        let end_state = match self.decoding_mode {
            DecodingMode::Truncated => {
                let mut end = 0usize;
                let mut end_distance = u32::MAX;
                for (state, node) in best[depth].iter().enumerate() {
                    if node.reachable && node.distance < end_distance {
                        end = state;
                        end_distance = node.distance;
                    }
                }
                end
            }
            DecodingMode::Terminated => {
                if !best[depth][0].reachable {
                    return Err(Error::InvalidInput(
                        "terminated decoding found no path into the all-zeros state".into(),
                    ));
                }
                0
            }
        };

        let mut symbols = Vec::with_capacity(depth);
        let mut state = end_state;
        for t in (1..=depth).rev() {
            let node = best[t][state];
            symbols.push(node.input_symbol as usize);
            state = node.prev_state;
        }
        symbols.reverse();

        let mut decoded = BitVector::new();
        for symbol in symbols {
            for b in 0..self.code_rate_k {
                decoded.append((symbol >> (self.code_rate_k - 1 - b)) & 1 == 1);
            }
        }
        if self.decoding_mode == DecodingMode::Terminated {
            let len = decoded.len().saturating_sub(self.memory_size_sum);
            decoded.truncate(len);
        }
        Ok(decoded)
    }

    /// Walks the coded stream and drops every bit whose position is marked 0
    /// in the puncturing matrix.
    fn puncture(&self, bits: &BitVector) -> BitVector {
        let n = self.code_rate_n;
        let period = self.puncturing[0].len();
        let mut out = BitVector::new();
        for j in 0..bits.len() {
            if self.puncturing[j % n][(j / n) % period] {
                out.append(bits.get(j));
            }
        }
        out
    }

    /// Reinserts placeholder bits at the punctured positions and returns the
    /// full-length stream together with its punctured mask. The result must
    /// cover whole output symbols.
    fn depuncture(&self, bits: &BitVector) -> Result<(BitVector, Vec<bool>)> {
        let n = self.code_rate_n;
        let period = self.puncturing[0].len();
        let mut full = BitVector::new();
        let mut mask = Vec::new();
        let mut source = 0usize;
        let mut j = 0usize;
        while source < bits.len() {
            if self.puncturing[j % n][(j / n) % period] {
                full.append(bits.get(source));
                mask.push(false);
                source += 1;
            } else {
                full.append(false);
                mask.push(true);
            }
            j += 1;
        }
        while full.len() % n != 0 && !self.puncturing[j % n][(j / n) % period] {
            full.append(false);
            mask.push(true);
            j += 1;
        }
        if full.len() % n != 0 {
            return Err(Error::InvalidInput(format!(
                "depunctured length {} is not a multiple of n = {}",
                full.len(),
                n
            )));
        }
        Ok((full, mask))
    }
}

fn parse_lengths(text: &str) -> Result<Vec<usize>> {
    let lengths: Vec<usize> = text
        .split_whitespace()
        .map(|entry| {
            entry.parse::<usize>().map_err(|_| {
                Error::InvalidConfiguration(format!("bad constraint length '{entry}'"))
            })
        })
        .collect::<Result<_>>()?;
    if lengths.is_empty() {
        return Err(Error::InvalidConfiguration(
            "empty constraint length list".into(),
        ));
    }
    for &length in &lengths {
        if !(2..=ShortBitVector::MAX_BITS).contains(&length) {
            return Err(Error::InvalidConfiguration(format!(
                "constraint length {length} out of range"
            )));
        }
    }
    Ok(lengths)
}

fn parse_octal_matrix(text: &str) -> Result<Vec<Vec<u32>>> {
    let mut matrix = Vec::new();
    for row_text in text.split(';') {
        let row: Vec<u32> = row_text
            .split_whitespace()
            .map(|entry| {
                u32::from_str_radix(entry, 8).map_err(|_| {
                    Error::InvalidConfiguration(format!("bad octal generator '{entry}'"))
                })
            })
            .collect::<Result<_>>()?;
        if !row.is_empty() {
            matrix.push(row);
        }
    }
    if matrix.is_empty() {
        return Err(Error::InvalidConfiguration(
            "empty transfer function matrix".into(),
        ));
    }
    let width = matrix[0].len();
    if matrix.iter().any(|row| row.len() != width) {
        return Err(Error::InvalidConfiguration(
            "ragged transfer function matrix".into(),
        ));
    }
    Ok(matrix)
}

fn parse_puncturing_matrix(text: &str, n: usize) -> Result<Vec<Vec<bool>>> {
    if text.trim().is_empty() {
        return Ok(vec![vec![true]; n]);
    }
    let mut matrix = Vec::new();
    for row_text in text.split(';') {
        let row: Vec<bool> = row_text
            .split_whitespace()
            .map(|entry| match entry {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(Error::InvalidConfiguration(format!(
                    "bad puncturing entry '{other}'"
                ))),
            })
            .collect::<Result<_>>()?;
        if !row.is_empty() {
            matrix.push(row);
        }
    }
    if matrix.len() != n {
        return Err(Error::InvalidConfiguration(format!(
            "puncturing matrix has {} rows for n = {n}",
            matrix.len()
        )));
    }
    let period = matrix[0].len();
    if period == 0 || matrix.iter().any(|row| row.len() != period) {
        return Err(Error::InvalidConfiguration(
            "ragged puncturing matrix".into(),
        ));
    }
    Ok(matrix)
}

/// Checks that the configured "k/n" rate matches the punctured rate of the
/// transfer function and puncturing matrix.
fn check_code_rate(text: &str, k: usize, puncturing: &[Vec<bool>]) -> Result<()> {
    let (rate_k, rate_n) = text
        .split_once('/')
        .and_then(|(a, b)| Some((a.trim().parse::<usize>().ok()?, b.trim().parse::<usize>().ok()?)))
        .ok_or_else(|| Error::InvalidConfiguration(format!("bad code rate '{text}'")))?;
    if rate_k == 0 || rate_n == 0 || rate_k > rate_n {
        return Err(Error::InvalidConfiguration(format!("bad code rate '{text}'")));
    }
    let period = puncturing[0].len();
    let kept: usize = puncturing
        .iter()
        .map(|row| row.iter().filter(|&&keep| keep).count())
        .sum();
    if kept == 0 {
        return Err(Error::InvalidConfiguration(
            "puncturing matrix drops every bit".into(),
        ));
    }
    if k * period * rate_n != kept * rate_k {
        return Err(Error::InvalidConfiguration(format!(
            "code rate '{text}' does not match the puncturing matrix"
        )));
    }
    Ok(())
}
