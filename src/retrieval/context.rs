//! Context block assembly for the answer prompt.

use crate::types::Candidate;

/// Renders fused candidates into the numbered context block fed to the
/// generation model. Each entry is `[n] text\n`; entries are taken in fused
/// order and the block never exceeds `max_chars`, so a candidate that would
/// overflow the budget is dropped along with everything after it. Numbering
/// stays contiguous because entries are only ever dropped from the tail.
pub fn build_context(candidates: &[Candidate], max_chars: usize) -> String {
    let mut block = String::new();
    for (position, candidate) in candidates.iter().enumerate() {
        let entry = format!("[{}] {}\n", position + 1, candidate.content);
        if block.len() + entry.len() > max_chars {
            break;
        }
        block.push_str(&entry);
    }
    block
}
