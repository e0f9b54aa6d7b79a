//! Agents are the buyers and sellers which make up a market.
//!
//! The market only ever interacts with agents through the [`AgentResponse`] trait: it asks how
//! much an agent is willing to trade at a price (for a single price or a whole grid of prices) and
//! whether the agent would trade at all.
use crate::id::{AgentID, HasID};
use crate::units::{Price, Quantity};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

pub mod preference;
use preference::{LinearPreferenceModel, PreferenceModel};

/// A map of agents, keyed by agent ID, in insertion order
pub type AgentMap = IndexMap<AgentID, Box<dyn AgentResponse>>;

/// Which side of the market an agent trades on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum Side {
    /// The agent wants to buy
    #[string = "buy"]
    Buy,
    /// The agent wants to sell
    #[string = "sell"]
    Sell,
}

impl Side {
    /// Whether an agent on this side trades at `price`, given its reservation price.
    ///
    /// At exactly the reservation price the agent is indifferent and does not trade.
    pub fn accepts(self, price: Price, reservation: Price) -> bool {
        match self {
            Self::Buy => price < reservation,
            Self::Sell => price > reservation,
        }
    }
}

/// Context passed to agents when they are asked for a response.
///
/// A new state is built for every evaluation and is never stored.
#[derive(Debug, Clone, Copy)]
pub struct MarketState<'a> {
    /// The current step of the simulation (`None` for evaluations made outside the main loop)
    pub step: Option<u32>,
    /// The price(s) being evaluated
    pub prices: &'a [Price],
}

impl<'a> MarketState<'a> {
    /// Create a state for evaluating a grid of prices
    pub fn new(step: Option<u32>, prices: &'a [Price]) -> Self {
        Self { step, prices }
    }

    /// Create a state for evaluating a single price
    pub fn at_price(step: Option<u32>, price: &'a Price) -> Self {
        Self {
            step,
            prices: std::slice::from_ref(price),
        }
    }
}

/// The capabilities the market requires of an agent
pub trait AgentResponse: HasID + std::fmt::Debug {
    /// Which side of the market the agent trades on
    fn side(&self) -> Side;

    /// The unit size the agent offers or demands
    fn quantity(&self) -> Quantity;

    /// The quantity the agent is willing to trade at `price`
    fn quantity_at_price(&self, price: Price, state: &MarketState) -> Quantity;

    /// The quantity the agent is willing to trade at each of `prices`.
    ///
    /// Must return one value per price, each equal to what [`AgentResponse::quantity_at_price`]
    /// returns for that price.
    fn quantities_at_prices(&self, prices: &[Price], state: &MarketState) -> Vec<Quantity> {
        prices
            .iter()
            .map(|&price| self.quantity_at_price(price, state))
            .collect()
    }

    /// Whether the agent would trade a nonzero amount at `price`
    fn willing_to_trade(&self, price: Price, state: &MarketState) -> bool {
        self.quantity_at_price(price, state) > Quantity(0.0)
    }
}

/// An agent whose reservation price is given by a preference model
#[derive(Debug)]
pub struct Agent {
    /// A unique identifier for the agent
    pub id: AgentID,
    /// Which side of the market the agent trades on
    pub side: Side,
    /// The unit size offered or demanded
    pub quantity: Quantity,
    features: Option<Vec<f64>>,
    preference: Box<dyn PreferenceModel>,
}

impl HasID for Agent {
    fn get_id(&self) -> &AgentID {
        &self.id
    }
}

/// Check that an agent's quantity is valid
fn check_quantity(quantity: Quantity) -> Result<()> {
    ensure!(
        quantity.is_finite() && quantity > Quantity(0.0),
        "Agent quantity must be a finite number greater than zero"
    );

    Ok(())
}

impl Agent {
    /// Create a new [`Agent`].
    ///
    /// # Arguments
    ///
    /// * `id` - A unique identifier for the agent
    /// * `side` - Whether the agent buys or sells
    /// * `quantity` - The unit size offered or demanded
    /// * `features` - Features fed to the preference model, if any
    /// * `preference` - The model used to score the agent's reservation price
    pub fn new(
        id: AgentID,
        side: Side,
        quantity: Quantity,
        features: Option<Vec<f64>>,
        preference: Box<dyn PreferenceModel>,
    ) -> Result<Self> {
        check_quantity(quantity).map_err(|err| err.context(format!("Invalid agent {id}")))?;
        preference
            .check_features(features.as_deref())
            .map_err(|err| err.context(format!("Invalid features for agent {id}")))?;

        Ok(Self {
            id,
            side,
            quantity,
            features,
            preference,
        })
    }

    /// Create an agent with a fixed reservation price
    pub fn with_reservation_price(
        id: &str,
        side: Side,
        quantity: Quantity,
        reservation_price: Price,
    ) -> Result<Self> {
        Self::new(
            id.into(),
            side,
            quantity,
            None,
            Box::new(LinearPreferenceModel::constant(reservation_price)),
        )
    }

    /// The agent's features
    pub fn features(&self) -> Option<&[f64]> {
        self.features.as_deref()
    }

    /// Replace the agent's features.
    ///
    /// This must only be done between simulation runs.
    pub fn set_features(&mut self, features: Vec<f64>) -> Result<()> {
        self.preference.check_features(Some(&features))?;
        self.features = Some(features);

        Ok(())
    }

    /// The agent's reservation price in the given market state
    pub fn reservation_price(&self, state: &MarketState) -> Price {
        self.preference
            .reservation_price(self.features.as_deref(), state)
    }

    /// The quantity traded at `price` for an already-scored reservation price
    fn directional_quantity(&self, price: Price, reservation: Price) -> Quantity {
        if self.side.accepts(price, reservation) {
            self.quantity
        } else {
            Quantity(0.0)
        }
    }
}

impl AgentResponse for Agent {
    fn side(&self) -> Side {
        self.side
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn quantity_at_price(&self, price: Price, state: &MarketState) -> Quantity {
        let reservation = self.reservation_price(state);
        self.directional_quantity(price, reservation)
    }

    fn quantities_at_prices(&self, prices: &[Price], state: &MarketState) -> Vec<Quantity> {
        // Score once for the whole grid
        let reservation = self.reservation_price(state);
        prices
            .iter()
            .map(|&price| self.directional_quantity(price, reservation))
            .collect()
    }
}
