//! Position sizing algorithms: proportional, fixed dollar, fixed shares, risk-based, multiplier.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::models::{CopyRelationship, SizingMethod, TradeAction};

/// Allocation used by proportional sizing when none (or an invalid one) is configured.
const DEFAULT_ALLOCATION_PERCENT: Decimal = dec!(10);

/// Stop-loss distance assumed by risk-based sizing when none is configured.
const DEFAULT_STOP_LOSS_PERCENT: Decimal = dec!(5);

/// Outcome of a sizing calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizeResult {
    /// Whole shares to trade
    pub quantity: Decimal,

    /// quantity * price
    pub estimated_cost: Decimal,

    /// `None` when the relationship is misconfigured
    pub method_used: Option<SizingMethod>,

    /// Whether `max_position_size` reduced the result
    pub capped: bool,

    /// Configuration problem that forced a zero result
    pub error: Option<String>,
}

impl PositionSizeResult {
    fn error(message: impl Into<String>) -> Self {
        Self {
            quantity: Decimal::ZERO,
            estimated_cost: Decimal::ZERO,
            method_used: None,
            capped: false,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.method_used.is_none()
    }

    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl fmt::Display for PositionSizeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.method_used.map(|m| m.as_str()).unwrap_or("error");
        write!(
            f,
            "{} shares (${:.2}) via {}{}",
            self.quantity,
            self.estimated_cost,
            method,
            if self.capped { ", capped" } else { "" }
        )
    }
}

/// Stateless calculator for follower position sizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    pub fn new() -> Self {
        Self
    }

    /// Calculate the follower's position for copying a leader trade.
    ///
    /// # Arguments
    /// * `relationship` - Supplies the sizing method, its parameter and the position cap
    /// * `leader_quantity` - Shares the leader traded
    /// * `leader_price` - Leader's fill price, if known
    /// * `follower_balance` - Follower's cash balance
    /// * `current_price` - Live price, used when the leader price is unknown
    ///
    /// Never fails: a missing parameter yields a zero quantity with `method_used = None`.
    pub fn calculate_position_size(
        &self,
        relationship: &CopyRelationship,
        leader_quantity: Decimal,
        leader_price: Option<Decimal>,
        follower_balance: Decimal,
        current_price: Decimal,
    ) -> PositionSizeResult {
        let sizing = &relationship.sizing;
        let price = leader_price
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(current_price);

        if price <= Decimal::ZERO {
            warn!(relationship_id = %relationship.id, "Cannot size position without a positive price");
            return PositionSizeResult::error("No valid price available for sizing");
        }

        let result = match sizing.method {
            SizingMethod::Proportional => {
                let pct = sizing
                    .allocation_percent
                    .filter(|p| *p > Decimal::ZERO && *p <= dec!(100))
                    .unwrap_or(DEFAULT_ALLOCATION_PERCENT);
                let dollars = follower_balance * pct / dec!(100);
                Self::size_from_dollars(SizingMethod::Proportional, dollars, price, sizing.max_position_size)
            }
            SizingMethod::FixedDollar => match sizing.fixed_dollar_amount.filter(|a| *a > Decimal::ZERO) {
                Some(amount) => {
                    Self::size_from_dollars(SizingMethod::FixedDollar, amount, price, sizing.max_position_size)
                }
                None => PositionSizeResult::error("fixed_dollar sizing requires a positive fixed_dollar_amount"),
            },
            SizingMethod::FixedShares => match sizing.fixed_shares_amount.filter(|a| *a > Decimal::ZERO) {
                Some(shares) => Self::size_from_shares(
                    SizingMethod::FixedShares,
                    shares.floor(),
                    price,
                    sizing.max_position_size,
                ),
                None => PositionSizeResult::error("fixed_shares sizing requires a positive fixed_shares_amount"),
            },
            SizingMethod::RiskBased => match sizing.risk_percent.filter(|r| *r > Decimal::ZERO) {
                Some(risk_pct) => {
                    let stop_pct = relationship
                        .protective
                        .stop_loss_percent
                        .filter(|s| *s > Decimal::ZERO)
                        .unwrap_or(DEFAULT_STOP_LOSS_PERCENT);
                    let risk_dollars = follower_balance * risk_pct / dec!(100);
                    let dollars = risk_dollars / stop_pct * dec!(100);
                    Self::size_from_dollars(SizingMethod::RiskBased, dollars, price, sizing.max_position_size)
                }
                None => PositionSizeResult::error("risk_based sizing requires a positive risk_percent"),
            },
            SizingMethod::Multiplier => match sizing.multiplier.filter(|m| *m > Decimal::ZERO) {
                Some(multiplier) => {
                    let shares = (leader_quantity * multiplier).floor().max(Decimal::ONE);
                    Self::size_from_shares(SizingMethod::Multiplier, shares, price, sizing.max_position_size)
                }
                None => PositionSizeResult::error("multiplier sizing requires a positive multiplier"),
            },
        };

        match &result.error {
            Some(err) => warn!(
                relationship_id = %relationship.id,
                method = %sizing.method,
                error = %err,
                "Position sizing misconfigured"
            ),
            None => debug!(relationship_id = %relationship.id, result = %result, "Position sized"),
        }

        result
    }

    /// Dollar-target methods: cap the dollars, then convert to whole shares.
    fn size_from_dollars(
        method: SizingMethod,
        dollars: Decimal,
        price: Decimal,
        cap: Option<Decimal>,
    ) -> PositionSizeResult {
        let cap = cap.filter(|c| *c > Decimal::ZERO);

        let (quantity, capped) = match cap {
            Some(cap) if dollars > cap => ((cap / price).floor(), true),
            _ => {
                let mut quantity = (dollars / price).floor();
                if quantity.is_zero() && dollars >= price {
                    quantity = Decimal::ONE;
                }
                (quantity, false)
            }
        };

        PositionSizeResult {
            quantity,
            estimated_cost: quantity * price,
            method_used: Some(method),
            capped,
            error: None,
        }
    }

    /// Share-target methods: quantity is fixed first, the cap reduces shares.
    fn size_from_shares(
        method: SizingMethod,
        shares: Decimal,
        price: Decimal,
        cap: Option<Decimal>,
    ) -> PositionSizeResult {
        let cap = cap.filter(|c| *c > Decimal::ZERO);

        let (quantity, capped) = match cap {
            Some(cap) if shares * price > cap => ((cap / price).floor(), true),
            _ => (shares, false),
        };

        PositionSizeResult {
            quantity,
            estimated_cost: quantity * price,
            method_used: Some(method),
            capped,
            error: None,
        }
    }
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Stop-loss price: below entry for buys, above entry for sells.
pub fn stop_loss_price(entry_price: Decimal, percent: Decimal, action: TradeAction) -> Decimal {
    let offset = percent / dec!(100);
    match action {
        TradeAction::Buy => round_cents(entry_price * (Decimal::ONE - offset)),
        TradeAction::Sell => round_cents(entry_price * (Decimal::ONE + offset)),
    }
}

/// Take-profit price: above entry for buys, below entry for sells.
pub fn take_profit_price(entry_price: Decimal, percent: Decimal, action: TradeAction) -> Decimal {
    let offset = percent / dec!(100);
    match action {
        TradeAction::Buy => round_cents(entry_price * (Decimal::ONE + offset)),
        TradeAction::Sell => round_cents(entry_price * (Decimal::ONE - offset)),
    }
}
