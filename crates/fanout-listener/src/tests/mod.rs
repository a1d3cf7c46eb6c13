//! Integration tests for the fan-out listener.
//!
//! - `harness.rs`    - Recording queue with failure injection
//! - `fanout.rs`     - Decrement-and-requeue behavior of a single claim
//! - `dedup.rs`      - Per-node idempotence and the quiescence pause
//! - `end_to_end.rs` - Several nodes draining one fan-out round
//! - `errors.rs`     - Transport failures and what they leave behind

mod errors;
