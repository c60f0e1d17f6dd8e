/// Tax usage code applied when the branch is unknown or has no dedicated code.
pub const DEFAULT_USAGE: i32 = 40;

/// Usage code the ERP expects for documents issued against the given
/// business place.
pub fn compute_usage(bpl_id: Option<i32>) -> i32 {
    match bpl_id {
        Some(2) => 90,
        Some(1) => 40,
        _ => DEFAULT_USAGE,
    }
}
