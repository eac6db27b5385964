//! Verdict evaluation: decides `passed` for a submission.
//!
//! The verdict never fails a request. A missing, blank, malformed or
//! ill-typed predicate simply yields `false`.

pub mod predicate;

pub use predicate::{Predicate, PredicateError, MAX_NESTING_DEPTH, MAX_PREDICATE_LEN};

/// Evaluate `predicate` against `code`, folding every error into `false`.
pub fn evaluate(predicate: Option<&str>, code: &str) -> bool {
    let source = match predicate.map(str::trim) {
        Some(source) if !source.is_empty() => source,
        _ => return false,
    };

    match Predicate::parse(source).and_then(|p| p.evaluate(code)) {
        Ok(passed) => passed,
        Err(e) => {
            log::warn!("Verdict predicate could not be evaluated: {}", e);
            false
        }
    }
}
