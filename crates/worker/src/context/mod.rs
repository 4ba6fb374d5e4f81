//! Prompt fitting pipeline.
//!
//! | Step | Module |
//! |------|--------|
//! | Size the payload | `token` |
//! | Fix head and tail anchors | `history` |
//! | Score what may be summarized | `scoring` |
//! | Summarize until it fits | `compression` |
//! | Repair turn order | `alternation` |

pub mod alternation;
pub mod compression;
pub mod history;
pub mod scoring;
pub mod token;
pub mod working;

pub use alternation::{TurnNormalizer, is_alternating};
pub use compression::{CompressionOutcome, CompressionRun, Compressor};
pub use history::HistoryWindow;
pub use scoring::{CompressionStrategy, ScoringRequest, SimilarityStrategy};
pub use token::CharEstimateCounter;
pub use working::WorkingPrompt;
