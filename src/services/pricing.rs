//! Fixed-point pricing primitives.
//!
//! All prices are integers in micro-sats per token. YES and NO prices are
//! complementary: `yes + no = PRICE_SCALE`. The only rounding on this path
//! is the half-to-even midpoint.

/// Micro-sats per whole token of collateral.
pub const PRICE_SCALE: i64 = 1_000_000;

/// Maximum bid/ask spread for which the midpoint is trusted as the mark
/// price; wider books fall back to the last trade.
pub const SPREAD_THRESHOLD: i64 = 100_000;

/// Price-sum tolerance for classifying a crossing pair as MINT/MERGE.
pub const MINT_MERGE_EPSILON: i64 = 10_000;

/// Complement price on the other outcome token.
pub fn complement(price: i64) -> i64 {
    PRICE_SCALE - price
}

/// Integer midpoint of two prices, rounded half-to-even.
pub fn midpoint(a: i64, b: i64) -> i64 {
    let sum = a + b;
    let half = sum / 2;
    if sum % 2 == 0 {
        half
    } else if half % 2 == 0 {
        // .5 remainder: round toward the even neighbour
        half
    } else {
        half + 1
    }
}

/// Derive `(yes_price, no_price)` for a market after trading activity.
///
/// Inputs are all in YES terms. A tight book prices at the bid/ask midpoint;
/// otherwise the last trade governs; otherwise the current price is kept.
pub fn derive_prices(
    best_bid: Option<i64>,
    best_ask: Option<i64>,
    last_trade: Option<i64>,
    current_yes: i64,
) -> (i64, i64) {
    let yes = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) if ask - bid <= SPREAD_THRESHOLD => midpoint(bid, ask),
        _ => last_trade.unwrap_or(current_yes),
    };
    let yes = yes.clamp(0, PRICE_SCALE);
    (yes, PRICE_SCALE - yes)
}
