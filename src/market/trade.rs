//! Settlement of trades at a given price.
use crate::agent::{AgentMap, MarketState};
use crate::id::AgentID;
use crate::units::{Price, Quantity};

/// The result of settling trades at a single price
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    /// The simulation step at which the trade was settled
    pub step: u32,
    /// The clearing price
    pub price: Price,
    /// The settled quantity
    pub quantity: Quantity,
    /// Total quantity of all buyers willing to trade at this price
    pub willing_demand: Quantity,
    /// Total quantity of all sellers willing to trade at this price
    pub willing_supply: Quantity,
    /// IDs of buyers willing to trade (empty unless details were requested)
    pub buyer_ids: Vec<AgentID>,
    /// IDs of sellers willing to trade (empty unless details were requested)
    pub seller_ids: Vec<AgentID>,
}

impl TradeRecord {
    /// Settle the smaller of the two sides' willing quantities, capped by `capacity` if present
    pub fn settle(
        step: u32,
        price: Price,
        buyers: (Quantity, Vec<AgentID>),
        sellers: (Quantity, Vec<AgentID>),
        capacity: Option<Quantity>,
    ) -> Self {
        let (willing_demand, buyer_ids) = buyers;
        let (willing_supply, seller_ids) = sellers;

        let mut quantity = willing_demand.min(willing_supply);
        if let Some(capacity) = capacity {
            quantity = quantity.min(capacity);
        }

        Self {
            step,
            price,
            quantity,
            willing_demand,
            willing_supply,
            buyer_ids,
            seller_ids,
        }
    }
}

/// Find the agents on one side willing to trade at `price`.
///
/// An agent either trades its whole quantity or nothing.
///
/// # Returns
///
/// The total quantity of willing agents and, if `log_details` is set, their IDs
pub fn willing_side(
    agents: &AgentMap,
    price: Price,
    state: &MarketState,
    log_details: bool,
) -> (Quantity, Vec<AgentID>) {
    let mut total = Quantity(0.0);
    let mut ids = Vec::new();
    for (id, agent) in agents {
        if agent.willing_to_trade(price, state) {
            total += agent.quantity();
            if log_details {
                ids.push(id.clone());
            }
        }
    }

    (total, ids)
}
