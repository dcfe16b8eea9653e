//! BPE training: learning a merge table from a corpus.
//!
//! Training pre-tokenizes the corpus, glyph-encodes each chunk, and collapses
//! identical chunks into a weighted frequency table. Each iteration counts
//! every adjacent symbol pair across the weighted sequences (in parallel),
//! merges the globally most frequent pair, and records it as the next merge
//! rank and vocabulary id. Pair selection breaks count ties by
//! first-discovered order, so training is deterministic regardless of thread
//! count.
//!
//! Stopping below the frequency floor or running out of pairs is a reported
//! outcome, not an error; the caller reads it from [`TrainReport`].

use std::path::Path;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::bpe::merge_pair;
use super::glyph::glyph_encode;
use super::segment::Segmenter;
use super::tokenizer::TokenizerError;
use super::vocab::{MergeTable, Vocabulary};

/// Configuration for a training run.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Target vocabulary size, counting the 256 base glyph tokens.
    pub vocab_size: u32,
    /// Minimum weighted occurrence count for a pair to be merged.
    pub min_frequency: u64,
    /// Cap on corpus bytes read by [`Trainer::train_from_file`]; the corpus
    /// is cut at the nearest char boundary below the cap and the effective
    /// size is reported. `None` reads the whole file.
    pub max_corpus_bytes: Option<usize>,
    /// Log progress every N merges; 0 disables progress logging.
    pub log_interval: u32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            vocab_size: 1024,
            min_frequency: 2,
            max_corpus_bytes: None,
            log_interval: 500,
        }
    }
}

/// Why a training run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The vocabulary reached the configured size.
    TargetReached,
    /// The best remaining pair fell below `min_frequency`.
    BelowMinFrequency,
    /// No adjacent pairs remain in the corpus.
    NoPairsLeft,
}

/// Summary of a completed training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    /// Number of merges learned.
    pub merges_learned: u32,
    /// Effective corpus size in bytes after any cap was applied.
    pub corpus_bytes: usize,
    /// Whether the corpus was cut to `max_corpus_bytes`.
    pub truncated: bool,
    /// Why training stopped.
    pub stop: StopReason,
}

/// Result of a training run: the stores plus the run summary.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub vocabulary: Vocabulary,
    pub merges: MergeTable,
    pub report: TrainReport,
}

/// One deduplicated pre-tokenization chunk and its corpus weight.
#[derive(Debug)]
struct Word {
    symbols: Vec<String>,
    count: u64,
}

#[derive(Debug, Clone, Copy)]
struct PairStat {
    count: u64,
    /// (word index, position) of the earliest occurrence; the tie-breaker.
    first_seen: (usize, usize),
}

/// BPE trainer: learns merge rules by greedy frequency maximization.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
    segmenter: Segmenter,
}

impl Trainer {
    /// Create a trainer with the given configuration.
    pub fn new(config: TrainerConfig) -> Result<Self, TokenizerError> {
        Ok(Self {
            config,
            segmenter: Segmenter::new()?,
        })
    }

    /// The trainer's configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train on an in-memory corpus.
    pub fn train_from_text(&self, corpus: &str) -> TrainedModel {
        let mut vocab = Vocabulary::byte_level();
        let mut merges = MergeTable::new();
        let mut words = self.build_word_table(corpus);

        let stop = loop {
            if vocab.len() as u32 >= self.config.vocab_size {
                break StopReason::TargetReached;
            }

            let stats = count_pairs(&words);
            let Some(((left, right), stat)) = select_best(&stats) else {
                break StopReason::NoPairsLeft;
            };
            if stat.count < self.config.min_frequency {
                break StopReason::BelowMinFrequency;
            }

            let merged = format!("{left}{right}");
            vocab.insert(merged.clone());
            merges.push(left.clone(), right.clone());

            words.par_iter_mut().for_each(|word| {
                if word.symbols.len() > 1 {
                    merge_pair(&mut word.symbols, &left, &right, &merged);
                }
            });

            if self.config.log_interval > 0 && merges.len() as u32 % self.config.log_interval == 0
            {
                log::info!(
                    "learned {} merges, latest ({left:?}, {right:?}) x{}",
                    merges.len(),
                    stat.count
                );
            }
        };

        let report = TrainReport {
            merges_learned: merges.len() as u32,
            corpus_bytes: corpus.len(),
            truncated: false,
            stop,
        };
        log::info!(
            "training stopped after {} merges ({:?})",
            report.merges_learned,
            report.stop
        );

        TrainedModel {
            vocabulary: vocab,
            merges,
            report,
        }
    }

    /// Train on a corpus file, honoring `max_corpus_bytes`.
    pub fn train_from_file<P: AsRef<Path>>(&self, path: P) -> Result<TrainedModel, TokenizerError> {
        let data = std::fs::read_to_string(path)?;

        let (corpus, truncated) = match self.config.max_corpus_bytes {
            Some(cap) if data.len() > cap => {
                let mut end = cap;
                while !data.is_char_boundary(end) {
                    end -= 1;
                }
                log::warn!(
                    "corpus capped at {end} of {} bytes for bounded training",
                    data.len()
                );
                (&data[..end], true)
            }
            _ => (&data[..], false),
        };

        let mut model = self.train_from_text(corpus);
        model.report.truncated = truncated;
        Ok(model)
    }

    /// Deduplicate pre-tokenization chunks into a weighted symbol table,
    /// preserving first-seen order.
    fn build_word_table(&self, corpus: &str) -> Vec<Word> {
        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        let mut words: Vec<Word> = Vec::new();

        for chunk in self.segmenter.segment(corpus) {
            let glyphs = glyph_encode(chunk.as_bytes());
            match index.get(&glyphs) {
                Some(&i) => words[i].count += 1,
                None => {
                    index.insert(glyphs.clone(), words.len());
                    words.push(Word {
                        symbols: glyphs.chars().map(String::from).collect(),
                        count: 1,
                    });
                }
            }
        }

        words
    }
}

/// Count every adjacent pair across the weighted sequences.
///
/// Parallel fold/reduce; the per-pair minimum (word index, position) survives
/// the reduction, so the result is independent of work splitting.
fn count_pairs(words: &[Word]) -> FxHashMap<(String, String), PairStat> {
    words
        .par_iter()
        .enumerate()
        .fold(
            FxHashMap::<(String, String), PairStat>::default,
            |mut acc, (wi, word)| {
                for (pos, pair) in word.symbols.windows(2).enumerate() {
                    let key = (pair[0].clone(), pair[1].clone());
                    let stat = acc.entry(key).or_insert(PairStat {
                        count: 0,
                        first_seen: (wi, pos),
                    });
                    stat.count += word.count;
                    if (wi, pos) < stat.first_seen {
                        stat.first_seen = (wi, pos);
                    }
                }
                acc
            },
        )
        .reduce(FxHashMap::default, |mut left, right| {
            for (key, stat) in right {
                left.entry(key)
                    .and_modify(|existing| {
                        existing.count += stat.count;
                        if stat.first_seen < existing.first_seen {
                            existing.first_seen = stat.first_seen;
                        }
                    })
                    .or_insert(stat);
            }
            left
        })
}

/// Highest-count pair, ties broken by earliest first occurrence.
///
/// Each (word, position) slot holds exactly one pair, so `first_seen` values
/// are distinct and the selection is a total order.
fn select_best(
    stats: &FxHashMap<(String, String), PairStat>,
) -> Option<((String, String), PairStat)> {
    let mut best: Option<(&(String, String), &PairStat)> = None;
    for (pair, stat) in stats {
        let better = match best {
            None => true,
            Some((_, b)) => {
                stat.count > b.count || (stat.count == b.count && stat.first_seen < b.first_seen)
            }
        };
        if better {
            best = Some((pair, stat));
        }
    }
    best.map(|(pair, stat)| (pair.clone(), *stat))
}
