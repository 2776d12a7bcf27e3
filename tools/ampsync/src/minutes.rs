//! Minute-of-hour spreading for replicated backup triggers
//!
//! N targets copying the same hourly backup would all fire on the template's
//! minute. Each target instead gets an evenly spaced minute derived from its
//! position in the sorted target list. Pure functions of their inputs.

/// Evenly spaced minute for target `index` of `total`
pub fn distributed_minute(index: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((index * 60 / total) % 60) as u32
}

/// Evenly spaced minute for target `index` of `total`, never `blocked`
///
/// The 59 minutes other than `blocked` are treated as slots; target `index`
/// takes slot `index * slots / total`, clamped to the last slot.
pub fn distributed_minute_avoiding(index: usize, total: usize, blocked: u32) -> u32 {
    let allowed: Vec<u32> = (0..60).filter(|m| *m != blocked).collect();
    let Some(&first) = allowed.first() else {
        return blocked;
    };
    if total == 0 {
        return first;
    }
    let pos = (index * allowed.len() / total).min(allowed.len() - 1);
    allowed[pos]
}
