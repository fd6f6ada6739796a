//! Paper trading gateway with simulated fills.
//!
//! Market orders fill immediately at the current price. Stop, take-profit,
//! limit and OCO orders rest until a price update crosses their trigger.
//! The account behaves like a margin account: selling more base than held
//! leaves a negative balance, which is how shorts are simulated.

use super::{
    ExchangeError, ExchangeGateway, OcoRequest, OrderAck, OrderRequest, OrderUpdate, Result,
};
use crate::config::ExchangeConfig;
use crate::domain::{Fees, OrderSide, OrderStatus, OrderType, base_asset, quote_asset};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
enum RestingOrder {
    Single(OrderRequest),
    Oco(OcoRequest),
}

impl RestingOrder {
    fn symbol(&self) -> &str {
        match self {
            RestingOrder::Single(r) => &r.symbol,
            RestingOrder::Oco(r) => &r.symbol,
        }
    }

    /// Returns the fill price and leg if `price` crosses this order.
    fn trigger(&self, price: Decimal) -> Option<(Decimal, OrderType)> {
        match self {
            RestingOrder::Single(r) => {
                let level = match r.order_type {
                    OrderType::StopLoss => r.stop_price?,
                    OrderType::TakeProfit | OrderType::Limit => r.price?,
                    _ => return None,
                };
                let crossed = match (r.order_type, r.side) {
                    (OrderType::StopLoss, OrderSide::Sell) => price <= level,
                    (OrderType::StopLoss, OrderSide::Buy) => price >= level,
                    (_, OrderSide::Sell) => price >= level,
                    (_, OrderSide::Buy) => price <= level,
                };
                crossed.then_some((level, r.order_type))
            }
            RestingOrder::Oco(r) => {
                let (stop_crossed, tp_crossed) = match r.side {
                    OrderSide::Sell => (price <= r.stop_price, price >= r.take_profit),
                    OrderSide::Buy => (price >= r.stop_price, price <= r.take_profit),
                };
                if stop_crossed {
                    Some((r.stop_price, OrderType::StopLoss))
                } else if tp_crossed {
                    Some((r.take_profit, OrderType::TakeProfit))
                } else {
                    None
                }
            }
        }
    }

    fn side_and_quantity(&self) -> (OrderSide, Decimal) {
        match self {
            RestingOrder::Single(r) => (r.side, r.quantity),
            RestingOrder::Oco(r) => (r.side, r.quantity),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    order: RestingOrder,
    status: OrderStatus,
    fill_price: Option<Decimal>,
    filled_leg: Option<OrderType>,
}

#[derive(Debug, Default)]
struct PaperState {
    prices: HashMap<String, Decimal>,
    balances: HashMap<String, Decimal>,
    orders: HashMap<String, PaperOrder>,
    next_id: u64,
    passing_placements: u32,
    failing_placements: u32,
    passing_cancels: u32,
    failing_cancels: u32,
    unreachable: bool,
}

impl PaperState {
    fn next_order_id(&mut self) -> String {
        self.next_id += 1;
        format!("paper-{}", self.next_id)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(ExchangeError::Connection("paper exchange unreachable".into()));
        }
        Ok(())
    }

    fn check_placement(&mut self) -> Result<()> {
        self.check_reachable()?;
        if self.passing_placements > 0 {
            self.passing_placements -= 1;
            return Ok(());
        }
        if self.failing_placements > 0 {
            self.failing_placements -= 1;
            return Err(ExchangeError::Connection("simulated placement failure".into()));
        }
        Ok(())
    }

    fn check_cancel(&mut self) -> Result<()> {
        self.check_reachable()?;
        if self.passing_cancels > 0 {
            self.passing_cancels -= 1;
            return Ok(());
        }
        if self.failing_cancels > 0 {
            self.failing_cancels -= 1;
            return Err(ExchangeError::Connection("simulated cancel failure".into()));
        }
        Ok(())
    }

    fn settle(&mut self, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal, fee: Decimal) {
        let notional = quantity * price;
        let fee_paid = notional * fee;
        let base = base_asset(symbol).to_string();
        let quote = quote_asset(symbol).to_string();

        let (base_delta, quote_delta) = match side {
            OrderSide::Buy => (quantity, -(notional + fee_paid)),
            OrderSide::Sell => (-quantity, notional - fee_paid),
        };
        *self.balances.entry(base).or_default() += base_delta;
        *self.balances.entry(quote).or_default() += quote_delta;
    }
}

/// PaperExchange simulates an exchange in memory.
pub struct PaperExchange {
    fees: Fees,
    supports_oco: bool,
    state: RwLock<PaperState>,
}

impl PaperExchange {
    pub fn new(fees: Fees, supports_oco: bool) -> Self {
        Self {
            fees,
            supports_oco,
            state: RwLock::new(PaperState::default()),
        }
    }

    pub fn from_config(config: &ExchangeConfig) -> Self {
        let fees = Fees::new(config.fee_maker.unwrap_or(config.fee_taker), config.fee_taker);
        let state = PaperState {
            prices: config.paper.prices.clone(),
            balances: config.paper.balances.clone(),
            ..Default::default()
        };
        Self {
            fees,
            supports_oco: config.supports_oco,
            state: RwLock::new(state),
        }
    }

    /// Updates the last price of a symbol and fills any resting orders it crosses.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), price);

        let triggered: Vec<(String, Decimal, OrderType)> = state
            .orders
            .iter()
            .filter(|(_, o)| o.status == OrderStatus::Open && o.order.symbol() == symbol)
            .filter_map(|(id, o)| o.order.trigger(price).map(|(p, leg)| (id.clone(), p, leg)))
            .collect();

        for (id, fill_price, leg) in triggered {
            let Some(order) = state.orders.get_mut(&id) else {
                continue;
            };
            order.status = OrderStatus::Filled;
            order.fill_price = Some(fill_price);
            order.filled_leg = Some(leg);
            let (side, quantity) = order.order.side_and_quantity();
            let fee = self.fees.taker;
            state.settle(symbol, side, quantity, fill_price, fee);
            info!(order_id = %id, symbol, leg = %leg, price = %fill_price, "Paper order triggered");
        }
    }

    pub async fn set_balance(&self, asset: &str, amount: Decimal) {
        self.state.write().await.balances.insert(asset.to_string(), amount);
    }

    /// Makes the next `count` order placements fail with a connection error.
    pub async fn fail_next_placements(&self, count: u32) {
        self.fail_placements_after(0, count).await;
    }

    /// Lets `skip` placements through, then fails the following `count`.
    pub async fn fail_placements_after(&self, skip: u32, count: u32) {
        let mut state = self.state.write().await;
        state.passing_placements = skip;
        state.failing_placements = count;
    }

    /// Lets `skip` cancels through, then fails the following `count`.
    pub async fn fail_cancels_after(&self, skip: u32, count: u32) {
        let mut state = self.state.write().await;
        state.passing_cancels = skip;
        state.failing_cancels = count;
    }

    /// Makes every call fail with a connection error until cleared.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// Number of orders currently resting on the book.
    pub async fn open_order_count(&self) -> usize {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .count()
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        state.check_reachable()?;
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolNotSupported(symbol.to_string()))
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck> {
        let mut state = self.state.write().await;
        state.check_placement()?;

        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Api(format!(
                "invalid quantity {}",
                request.quantity
            )));
        }

        match request.order_type {
            OrderType::Market => {
                let price = state
                    .prices
                    .get(&request.symbol)
                    .copied()
                    .ok_or_else(|| ExchangeError::SymbolNotSupported(request.symbol.clone()))?;

                if request.side == OrderSide::Buy {
                    let quote = quote_asset(&request.symbol);
                    let available = state.balances.get(quote).copied().unwrap_or_default();
                    let cost = request.quantity * price * (Decimal::ONE + self.fees.taker);
                    if available < cost {
                        return Err(ExchangeError::InsufficientFunds);
                    }
                }

                let id = state.next_order_id();
                state.settle(&request.symbol, request.side, request.quantity, price, self.fees.taker);
                state.orders.insert(
                    id.clone(),
                    PaperOrder {
                        order: RestingOrder::Single(request.clone()),
                        status: OrderStatus::Filled,
                        fill_price: Some(price),
                        filled_leg: None,
                    },
                );
                debug!(order_id = %id, symbol = %request.symbol, side = %request.side, price = %price, "Paper market order filled");

                Ok(OrderAck {
                    order_id: id,
                    status: OrderStatus::Filled,
                    fill_price: Some(price),
                    filled_quantity: request.quantity,
                })
            }
            OrderType::StopLoss if request.stop_price.is_none() => Err(ExchangeError::Api(
                "stop order without stop price".into(),
            )),
            OrderType::TakeProfit | OrderType::Limit if request.price.is_none() => Err(
                ExchangeError::Api("limit order without price".into()),
            ),
            OrderType::Oco => Err(ExchangeError::Api(
                "OCO orders must be placed with place_oco_order".into(),
            )),
            _ => {
                let id = state.next_order_id();
                state.orders.insert(
                    id.clone(),
                    PaperOrder {
                        order: RestingOrder::Single(request.clone()),
                        status: OrderStatus::Open,
                        fill_price: None,
                        filled_leg: None,
                    },
                );
                debug!(order_id = %id, symbol = %request.symbol, order_type = %request.order_type, "Paper order resting");

                Ok(OrderAck {
                    order_id: id,
                    status: OrderStatus::Open,
                    fill_price: None,
                    filled_quantity: Decimal::ZERO,
                })
            }
        }
    }

    fn supports_oco(&self) -> bool {
        self.supports_oco
    }

    async fn place_oco_order(&self, request: OcoRequest) -> Result<OrderAck> {
        if !self.supports_oco {
            return Err(ExchangeError::Unsupported(format!(
                "OCO orders on paper for {}",
                request.symbol
            )));
        }

        let mut state = self.state.write().await;
        state.check_placement()?;

        let id = state.next_order_id();
        state.orders.insert(
            id.clone(),
            PaperOrder {
                order: RestingOrder::Oco(request),
                status: OrderStatus::Open,
                fill_price: None,
                filled_leg: None,
            },
        );

        Ok(OrderAck {
            order_id: id,
            status: OrderStatus::Open,
            fill_price: None,
            filled_quantity: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_cancel()?;

        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;

        match order.status {
            OrderStatus::Open => {
                order.status = OrderStatus::Cancelled;
                Ok(())
            }
            OrderStatus::Cancelled => Ok(()),
            status => Err(ExchangeError::Api(format!(
                "order {} is already {}",
                order_id, status
            ))),
        }
    }

    async fn get_order_status(&self, _symbol: &str, order_id: &str) -> Result<OrderUpdate> {
        let state = self.state.read().await;
        state.check_reachable()?;

        let order = state
            .orders
            .get(order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;

        Ok(OrderUpdate {
            order_id: order_id.to_string(),
            status: order.status,
            fill_price: order.fill_price,
            filled_leg: order.filled_leg,
        })
    }

    async fn get_balance(&self, asset: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        state.check_reachable()?;
        Ok(state.balances.get(asset).copied().unwrap_or_default())
    }

    fn get_fees(&self, _symbol: &str) -> Fees {
        self.fees
    }
}
