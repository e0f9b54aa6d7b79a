//! Fixtures for tests

use crate::agent::{Agent, Side};
use crate::market::{FixedSupplyMarket, VariableSupplyMarket};
use crate::units::{Price, Quantity};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn buyer() -> Agent {
    Agent::with_reservation_price("buyer", Side::Buy, Quantity(1.0), Price(3.0)).unwrap()
}

#[fixture]
pub fn seller() -> Agent {
    Agent::with_reservation_price("seller", Side::Sell, Quantity(1.0), Price(1.0)).unwrap()
}

/// One buyer and one seller whose reservation prices overlap between 1 and 3
#[fixture]
pub fn simple_market(buyer: Agent, seller: Agent) -> VariableSupplyMarket {
    let mut market = VariableSupplyMarket::new();
    market.add_agent(Box::new(buyer)).unwrap();
    market.add_agent(Box::new(seller)).unwrap();
    market
}

/// Ten buyers with reservation prices 1, 2, ..., 10
#[fixture]
pub fn stepped_buyers() -> Vec<Agent> {
    (1..=10)
        .map(|i| {
            Agent::with_reservation_price(
                &format!("b{i}"),
                Side::Buy,
                Quantity(1.0),
                Price(f64::from(i)),
            )
            .unwrap()
        })
        .collect()
}

/// The stepped buyers with a supply capacity of 4
#[fixture]
pub fn fixed_supply_market(stepped_buyers: Vec<Agent>) -> FixedSupplyMarket {
    let mut market = FixedSupplyMarket::new(Quantity(4.0)).unwrap();
    for agent in stepped_buyers {
        market.add_agent(Box::new(agent)).unwrap();
    }
    market
}
