//! Markets aggregate the responses of their agents into demand and supply.
//!
//! Aggregation comes in two forms which must agree with one another: a scalar path, which
//! evaluates a single price, and a vectorised path, which evaluates a whole grid of prices at once.
use crate::agent::{AgentMap, AgentResponse, MarketState, Side};
use crate::id::try_insert_unique;
use crate::simulation::MarketObservation;
use crate::units::{Price, Quantity};
use anyhow::{Result, ensure};

pub mod curve;
pub use curve::{CurveData, linspace, sample_curves};
pub mod trade;
pub use trade::TradeRecord;
use trade::willing_side;

/// The capabilities a simulation requires of a market
pub trait Market {
    /// The buyers in this market, in registration order
    fn buyers(&self) -> &AgentMap;

    /// The total quantity demanded at `price`
    fn aggregate_demand(&self, price: Price, state: &MarketState) -> Quantity {
        sum_quantities(self.buyers(), price, state)
    }

    /// The total quantity supplied at `price`
    fn aggregate_supply(&self, price: Price, state: &MarketState) -> Quantity;

    /// The total quantity demanded at each of `prices`
    fn demand_curve(&self, prices: &[Price], state: &MarketState) -> Result<Vec<Quantity>> {
        sum_curves(self.buyers(), prices, state)
    }

    /// The total quantity supplied at each of `prices`
    fn supply_curve(&self, prices: &[Price], state: &MarketState) -> Result<Vec<Quantity>>;

    /// Settle trades between all agents willing to trade at `price`.
    ///
    /// # Arguments
    ///
    /// * `step` - The current simulation step
    /// * `price` - The price at which trades are settled
    /// * `state` - The market state for this evaluation
    /// * `log_details` - Whether to record the IDs of participating agents
    fn execute_trades(
        &self,
        step: u32,
        price: Price,
        state: &MarketState,
        log_details: bool,
    ) -> TradeRecord;

    /// Aggregate demand minus aggregate supply at `price`
    fn excess_demand(&self, price: Price, state: &MarketState) -> Quantity {
        self.aggregate_demand(price, state) - self.aggregate_supply(price, state)
    }

    /// Observe demand and supply at `price` for the given step
    fn observe(&self, step: u32, price: Price) -> MarketObservation {
        let state = MarketState::at_price(Some(step), &price);
        MarketObservation::new(
            step,
            price,
            self.aggregate_demand(price, &state),
            self.aggregate_supply(price, &state),
        )
    }
}

/// Sum the quantities agents are willing to trade at `price`
fn sum_quantities(agents: &AgentMap, price: Price, state: &MarketState) -> Quantity {
    agents
        .values()
        .map(|agent| agent.quantity_at_price(price, state))
        .sum()
}

/// Sum the quantities agents are willing to trade at each of `prices`.
///
/// Contributions are added in the same order as for [`sum_quantities`], so each element matches
/// the scalar result for that price.
fn sum_curves(agents: &AgentMap, prices: &[Price], state: &MarketState) -> Result<Vec<Quantity>> {
    let mut total = vec![Quantity(0.0); prices.len()];
    for (id, agent) in agents {
        let contribution = agent.quantities_at_prices(prices, state);
        ensure!(
            contribution.len() == prices.len(),
            "Contribution from agent {id} has {} values but {} prices were evaluated",
            contribution.len(),
            prices.len()
        );

        for (sum, quantity) in total.iter_mut().zip(contribution) {
            *sum += quantity;
        }
    }

    Ok(total)
}

/// Add an agent to `buyers` or `sellers`, according to its side.
///
/// Agent IDs must be unique across both maps.
fn insert_by_side(
    buyers: &mut AgentMap,
    sellers: &mut AgentMap,
    agent: Box<dyn AgentResponse>,
) -> Result<()> {
    let id = agent.get_id();
    ensure!(
        !buyers.contains_key(id) && !sellers.contains_key(id),
        "Duplicate agent ID found: {id}"
    );

    match agent.side() {
        Side::Buy => try_insert_unique(buyers, agent),
        Side::Sell => try_insert_unique(sellers, agent),
    }
}

/// A market in which supply comes from seller agents
#[derive(Debug, Default)]
pub struct VariableSupplyMarket {
    buyers: AgentMap,
    sellers: AgentMap,
}

impl VariableSupplyMarket {
    /// Create an empty market
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a market from the given agents, which are sorted into buyers and sellers
    pub fn from_agents<I>(agents: I) -> Result<Self>
    where
        I: IntoIterator<Item = Box<dyn AgentResponse>>,
    {
        let mut market = Self::new();
        for agent in agents {
            market.add_agent(agent)?;
        }

        Ok(market)
    }

    /// Add an agent to the buyers or sellers, according to its side.
    ///
    /// Agent IDs must be unique across both sides of the market.
    pub fn add_agent(&mut self, agent: Box<dyn AgentResponse>) -> Result<()> {
        insert_by_side(&mut self.buyers, &mut self.sellers, agent)
    }

    /// The sellers in this market, in registration order
    pub fn sellers(&self) -> &AgentMap {
        &self.sellers
    }
}

impl Market for VariableSupplyMarket {
    fn buyers(&self) -> &AgentMap {
        &self.buyers
    }

    fn aggregate_supply(&self, price: Price, state: &MarketState) -> Quantity {
        sum_quantities(&self.sellers, price, state)
    }

    fn supply_curve(&self, prices: &[Price], state: &MarketState) -> Result<Vec<Quantity>> {
        sum_curves(&self.sellers, prices, state)
    }

    fn execute_trades(
        &self,
        step: u32,
        price: Price,
        state: &MarketState,
        log_details: bool,
    ) -> TradeRecord {
        let (willing_demand, buyer_ids) = willing_side(&self.buyers, price, state, log_details);
        let (willing_supply, seller_ids) = willing_side(&self.sellers, price, state, log_details);

        TradeRecord::settle(
            step,
            price,
            (willing_demand, buyer_ids),
            (willing_supply, seller_ids),
            None,
        )
    }
}

/// A market in which supply is a fixed capacity, independent of price.
///
/// Seller agents do not contribute to aggregate supply, but they still take part in settlement,
/// where the traded quantity is capped by the capacity.
#[derive(Debug)]
pub struct FixedSupplyMarket {
    buyers: AgentMap,
    sellers: AgentMap,
    capacity: Quantity,
}

/// Check that a supply capacity is valid
fn check_capacity(capacity: Quantity) -> Result<()> {
    ensure!(
        capacity.is_finite() && capacity >= Quantity(0.0),
        "supply_capacity must be a finite number greater than or equal to zero (got {capacity})"
    );

    Ok(())
}

impl FixedSupplyMarket {
    /// Create an empty market with the given supply capacity
    pub fn new(capacity: Quantity) -> Result<Self> {
        check_capacity(capacity)?;

        Ok(Self {
            buyers: AgentMap::new(),
            sellers: AgentMap::new(),
            capacity,
        })
    }

    /// Add an agent to the buyers or sellers, according to its side.
    ///
    /// Agent IDs must be unique across both sides of the market.
    pub fn add_agent(&mut self, agent: Box<dyn AgentResponse>) -> Result<()> {
        insert_by_side(&mut self.buyers, &mut self.sellers, agent)
    }

    /// The sellers in this market, in registration order
    pub fn sellers(&self) -> &AgentMap {
        &self.sellers
    }

    /// The exogenous supply capacity
    pub fn capacity(&self) -> Quantity {
        self.capacity
    }
}

impl Market for FixedSupplyMarket {
    fn buyers(&self) -> &AgentMap {
        &self.buyers
    }

    fn aggregate_supply(&self, _price: Price, _state: &MarketState) -> Quantity {
        self.capacity
    }

    fn supply_curve(&self, prices: &[Price], _state: &MarketState) -> Result<Vec<Quantity>> {
        Ok(vec![self.capacity; prices.len()])
    }

    fn execute_trades(
        &self,
        step: u32,
        price: Price,
        state: &MarketState,
        log_details: bool,
    ) -> TradeRecord {
        let buyer_side = willing_side(&self.buyers, price, state, log_details);
        let seller_side = willing_side(&self.sellers, price, state, log_details);

        TradeRecord::settle(step, price, buyer_side, seller_side, Some(self.capacity))
    }
}
