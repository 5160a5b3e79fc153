//! Smart router: market-order execution planning.
//!
//! A pure planner over the aggregated book snapshot. It never writes;
//! calling it twice against the same book yields identical plans.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::order::{OrderSide, OrderType};
use crate::store::snapshot::OrderbookSnapshot;

pub const REASON_INSUFFICIENT_LIQUIDITY: &str = "insufficient liquidity";
pub const REASON_SLIPPAGE: &str = "slippage exceeds max";

/// One consumed price level of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLevel {
    pub price: i64,
    pub size: i64,
    pub cumulative_size: i64,
    /// size × price, in micro-sats
    pub cost: i64,
}

/// The feasible (or explained-infeasible) execution of a requested size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub order_type: OrderType,
    pub total_size: i64,
    pub levels: Vec<PlanLevel>,
    /// Volume-weighted price rounded half-to-even, micro-sats
    pub average_price: i64,
    pub total_cost: i64,
    /// |average − best| / best as a percentage, 4 decimal places
    pub slippage: Decimal,
    pub worst_price: i64,
    pub best_price: i64,
    pub feasible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A planning request against one outcome token's book.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: i64,
    pub limit_price: Option<i64>,
    /// Maximum tolerated slippage, in percent
    pub max_slippage: Option<Decimal>,
}

/// Plan how a requested size would sweep the book.
pub fn plan_execution(book: &OrderbookSnapshot, request: &PlanRequest) -> ExecutionPlan {
    // the counterparty side, already sorted best-first by the snapshot
    let counterparty = match request.side {
        OrderSide::Buy => &book.asks,
        OrderSide::Sell => &book.bids,
    };

    let mut levels: Vec<PlanLevel> = Vec::new();
    let mut remaining = request.size;
    let mut cumulative = 0i64;
    let mut total_cost = 0i64;

    for level in counterparty {
        if remaining == 0 {
            break;
        }
        if request.order_type == OrderType::Limit {
            let beyond_limit = match (request.side, request.limit_price) {
                (OrderSide::Buy, Some(limit)) => level.price > limit,
                (OrderSide::Sell, Some(limit)) => level.price < limit,
                _ => false,
            };
            if beyond_limit {
                break;
            }
        }

        let fill = remaining.min(level.size);
        cumulative += fill;
        let cost = fill * level.price;
        total_cost += cost;
        levels.push(PlanLevel {
            price: level.price,
            size: fill,
            cumulative_size: cumulative,
            cost,
        });
        remaining -= fill;
    }

    let best_price = levels.first().map(|l| l.price).unwrap_or(0);
    let worst_price = levels.last().map(|l| l.price).unwrap_or(0);
    let average_price = if cumulative > 0 {
        div_half_even(total_cost as i128, cumulative as i128)
    } else {
        0
    };
    let slippage = slippage_percent(average_price, best_price);

    let mut feasible = true;
    let mut reason = None;
    if remaining > 0 {
        feasible = false;
        reason = Some(REASON_INSUFFICIENT_LIQUIDITY.to_string());
    } else if request.order_type == OrderType::Market {
        if let Some(max) = request.max_slippage {
            if slippage > max {
                feasible = false;
                reason = Some(REASON_SLIPPAGE.to_string());
            }
        }
    }

    ExecutionPlan {
        order_type: request.order_type,
        total_size: request.size,
        levels,
        average_price,
        total_cost,
        slippage,
        worst_price,
        best_price,
        feasible,
        reason,
    }
}

/// Integer division rounded half-to-even.
fn div_half_even(numerator: i128, denominator: i128) -> i64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let doubled = remainder.abs() * 2;
    let rounded = if doubled > denominator.abs() || (doubled == denominator.abs() && quotient % 2 != 0)
    {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    };
    rounded as i64
}

/// |average − best| / best, as a percentage with four decimal places.
fn slippage_percent(average_price: i64, best_price: i64) -> Decimal {
    if best_price == 0 {
        return Decimal::ZERO;
    }
    let delta = Decimal::from((average_price - best_price).abs());
    (delta / Decimal::from(best_price) * Decimal::from(100))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot::OrderbookLevel;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn book_with_asks(asks: Vec<(i64, i64)>) -> OrderbookSnapshot {
        OrderbookSnapshot::new(
            Uuid::new_v4(),
            "yes",
            vec![],
            asks.into_iter()
                .map(|(price, size)| OrderbookLevel { price, size, order_count: 1 })
                .collect(),
        )
    }

    fn book_with_bids(bids: Vec<(i64, i64)>) -> OrderbookSnapshot {
        OrderbookSnapshot::new(
            Uuid::new_v4(),
            "yes",
            bids.into_iter()
                .map(|(price, size)| OrderbookLevel { price, size, order_count: 1 })
                .collect(),
            vec![],
        )
    }

    fn market_buy(size: i64, max_slippage: Option<Decimal>) -> PlanRequest {
        PlanRequest {
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            size,
            limit_price: None,
            max_slippage,
        }
    }

    #[test]
    fn test_market_buy_sweeps_levels_with_slippage() {
        let book = book_with_asks(vec![(650_000, 200), (660_000, 150), (680_000, 300)]);
        let plan = plan_execution(&book, &market_buy(500, Some(dec!(5))));

        assert!(plan.feasible);
        assert_eq!(plan.levels.len(), 3);
        assert_eq!(plan.levels[0], PlanLevel { price: 650_000, size: 200, cumulative_size: 200, cost: 130_000_000 });
        assert_eq!(plan.levels[1].size, 150);
        assert_eq!(plan.levels[2].size, 150);
        assert_eq!(plan.levels[2].cumulative_size, 500);
        // (200·650k + 150·660k + 150·680k) / 500
        assert_eq!(plan.average_price, 662_000);
        assert_eq!(plan.best_price, 650_000);
        assert_eq!(plan.worst_price, 680_000);
        assert_eq!(plan.slippage, dec!(1.8462));
        assert_eq!(plan.total_cost, 331_000_000);
    }

    #[test]
    fn test_market_buy_rejected_on_slippage() {
        let book = book_with_asks(vec![(650_000, 200), (660_000, 150), (680_000, 300)]);
        let plan = plan_execution(&book, &market_buy(500, Some(dec!(1))));

        assert!(!plan.feasible);
        assert_eq!(plan.reason.as_deref(), Some(REASON_SLIPPAGE));
        // the plan itself is still fully populated
        assert_eq!(plan.levels.len(), 3);
        assert_eq!(plan.average_price, 662_000);
    }

    #[test]
    fn test_insufficient_liquidity() {
        let book = book_with_asks(vec![(650_000, 100)]);
        let plan = plan_execution(&book, &market_buy(500, None));

        assert!(!plan.feasible);
        assert_eq!(plan.reason.as_deref(), Some(REASON_INSUFFICIENT_LIQUIDITY));
        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.levels[0].size, 100);
    }

    #[test]
    fn test_limit_buy_stops_at_limit_price() {
        let book = book_with_asks(vec![(650_000, 100), (660_000, 100), (700_000, 100)]);
        let plan = plan_execution(
            &book,
            &PlanRequest {
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                size: 300,
                limit_price: Some(660_000),
                max_slippage: None,
            },
        );

        // the 700k level is beyond the limit; only 200 can sweep
        assert!(!plan.feasible);
        assert_eq!(plan.reason.as_deref(), Some(REASON_INSUFFICIENT_LIQUIDITY));
        assert_eq!(plan.levels.len(), 2);
        assert_eq!(plan.levels.last().unwrap().cumulative_size, 200);
    }

    #[test]
    fn test_sell_walks_bids_downward() {
        let book = book_with_bids(vec![(660_000, 100), (650_000, 100)]);
        let plan = plan_execution(
            &book,
            &PlanRequest {
                side: OrderSide::Sell,
                order_type: OrderType::Market,
                size: 150,
                limit_price: None,
                max_slippage: None,
            },
        );

        assert!(plan.feasible);
        assert_eq!(plan.best_price, 660_000);
        assert_eq!(plan.worst_price, 650_000);
        assert_eq!(plan.levels[0].size, 100);
        assert_eq!(plan.levels[1].size, 50);
    }

    #[test]
    fn test_limit_sell_stops_below_limit() {
        let book = book_with_bids(vec![(660_000, 100), (600_000, 100)]);
        let plan = plan_execution(
            &book,
            &PlanRequest {
                side: OrderSide::Sell,
                order_type: OrderType::Limit,
                size: 200,
                limit_price: Some(650_000),
                max_slippage: None,
            },
        );

        assert_eq!(plan.levels.len(), 1);
        assert!(!plan.feasible);
    }

    #[test]
    fn test_plan_is_pure() {
        let book = book_with_asks(vec![(650_000, 200), (660_000, 150)]);
        let request = market_buy(300, Some(dec!(5)));
        let first = plan_execution(&book, &request);
        let second = plan_execution(&book, &request);
        assert_eq!(first.levels, second.levels);
        assert_eq!(first.average_price, second.average_price);
        assert_eq!(first.slippage, second.slippage);
        assert_eq!(first.feasible, second.feasible);
    }

    #[test]
    fn test_empty_book() {
        let book = book_with_asks(vec![]);
        let plan = plan_execution(&book, &market_buy(10, None));
        assert!(!plan.feasible);
        assert!(plan.levels.is_empty());
        assert_eq!(plan.average_price, 0);
    }

    #[test]
    fn test_div_half_even() {
        assert_eq!(div_half_even(331_000_000, 500), 662_000);
        assert_eq!(div_half_even(5, 2), 2); // 2.5 → 2
        assert_eq!(div_half_even(7, 2), 4); // 3.5 → 4
        assert_eq!(div_half_even(9, 3), 3);
    }
}
