//! OrderManager places and maintains the orders behind a position.

use super::{
    Fill, OrderError, PlacedProtection, ProtectionChange, ProtectionFill, ProtectionStatus, Result,
};
use crate::domain::{ExitReason, Order, OrderSide, OrderStatus, OrderType, Position, Protection};
use crate::exchanges::{ExchangeError, ExchangeGateway, OcoRequest, OrderAck, OrderRequest};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// OrderManager is stateless apart from the gateway; the engine persists
/// every order record it returns.
pub struct OrderManager {
    gateway: Arc<dyn ExchangeGateway>,
}

impl OrderManager {
    pub fn new(gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn ExchangeGateway> {
        &self.gateway
    }

    /// Opens the position with a market order.
    pub async fn open_entry(&self, position: &Position) -> Result<Fill> {
        let side = position.side.entry_order_side();
        let ack = self
            .gateway
            .place_order(OrderRequest::market(&position.symbol, side, position.quantity))
            .await?;
        self.market_fill(position, side, ack).await
    }

    /// Flattens the position with a market order.
    pub async fn close_at_market(&self, position: &Position) -> Result<Fill> {
        let side = position.side.exit_order_side();
        let ack = self
            .gateway
            .place_order(OrderRequest::market(&position.symbol, side, position.quantity))
            .await?;
        self.market_fill(position, side, ack).await
    }

    async fn market_fill(&self, position: &Position, side: OrderSide, ack: OrderAck) -> Result<Fill> {
        match ack.status {
            OrderStatus::Filled => {
                let price = match ack.fill_price {
                    Some(price) => price,
                    None => self.gateway.get_current_price(&position.symbol).await?,
                };
                let quantity = if ack.filled_quantity > Decimal::ZERO {
                    ack.filled_quantity
                } else {
                    position.quantity
                };
                let order = Order::new(
                    ack.order_id,
                    &position.id,
                    &position.symbol,
                    side,
                    OrderType::Market,
                    OrderStatus::Filled,
                    quantity,
                    Some(price),
                    None,
                );
                Ok(Fill {
                    order,
                    price,
                    quantity,
                })
            }
            OrderStatus::Rejected => Err(OrderError::Rejected(ack.order_id)),
            _ => {
                if let Err(e) = self.gateway.cancel_order(&position.symbol, &ack.order_id).await {
                    warn!(order_id = %ack.order_id, error = %e, "Failed to cancel unfilled market order");
                }
                Err(OrderError::NotFilled(ack.order_id))
            }
        }
    }

    /// Places stop-loss and take-profit at the position's current levels,
    /// as one OCO order when supported and as two orders otherwise.
    pub async fn place_protection(&self, position: &Position) -> Result<PlacedProtection> {
        if self.gateway.supports_oco() {
            let request = OcoRequest {
                symbol: position.symbol.clone(),
                side: position.side.exit_order_side(),
                quantity: position.quantity,
                take_profit: position.take_profit,
                stop_price: position.stop_loss,
            };
            match self.gateway.place_oco_order(request).await {
                Ok(ack) => {
                    info!(
                        position_id = %position.id,
                        order_id = %ack.order_id,
                        stop_loss = %position.stop_loss,
                        take_profit = %position.take_profit,
                        "OCO protection placed"
                    );
                    let order = self.oco_record(position, &ack.order_id, ack.status);
                    return Ok(PlacedProtection {
                        protection: Protection::Oco {
                            order_id: ack.order_id,
                        },
                        orders: vec![order],
                    });
                }
                Err(ExchangeError::Unsupported(reason)) => {
                    warn!(
                        position_id = %position.id,
                        reason = %reason,
                        "OCO rejected as unsupported, falling back to separate orders"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.place_separate(position).await
    }

    async fn place_separate(&self, position: &Position) -> Result<PlacedProtection> {
        let exit_side = position.side.exit_order_side();

        let stop = self
            .gateway
            .place_order(OrderRequest::stop_loss(
                &position.symbol,
                exit_side,
                position.quantity,
                position.stop_loss,
            ))
            .await?;

        let take = match self
            .gateway
            .place_order(OrderRequest::take_profit(
                &position.symbol,
                exit_side,
                position.quantity,
                position.take_profit,
            ))
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                // Half a pair is not a valid protection state.
                if let Err(cancel_err) = self.gateway.cancel_order(&position.symbol, &stop.order_id).await {
                    warn!(order_id = %stop.order_id, error = %cancel_err, "Failed to cancel orphaned stop-loss");
                }
                return Err(e.into());
            }
        };

        info!(
            position_id = %position.id,
            stop_order_id = %stop.order_id,
            take_profit_order_id = %take.order_id,
            "Separate protection placed"
        );

        let orders = vec![
            self.stop_record(position, &stop.order_id, stop.status),
            self.take_profit_record(position, &take.order_id, take.status),
        ];
        Ok(PlacedProtection {
            protection: Protection::Separate {
                stop_order_id: stop.order_id,
                take_profit_order_id: take.order_id,
            },
            orders,
        })
    }

    /// Polls the exchange for the state of the position's protection. When
    /// one of two separate legs has filled the sibling is cancelled here.
    pub async fn check_protection(&self, position: &Position) -> Result<ProtectionStatus> {
        match &position.protection {
            Protection::None => Ok(ProtectionStatus::Missing(Vec::new())),
            Protection::Oco { order_id } => {
                let update = self.gateway.get_order_status(&position.symbol, order_id).await?;
                match update.status {
                    OrderStatus::Open => Ok(ProtectionStatus::Active),
                    OrderStatus::Filled => {
                        let leg = update.filled_leg.unwrap_or_else(|| {
                            infer_leg(position, update.fill_price.unwrap_or(position.stop_loss))
                        });
                        let exit_price = update.fill_price.unwrap_or(match leg {
                            OrderType::TakeProfit => position.take_profit,
                            _ => position.stop_loss,
                        });
                        Ok(ProtectionStatus::Filled(ProtectionFill {
                            reason: leg_reason(leg),
                            exit_price,
                            orders: vec![self.oco_record(position, order_id, OrderStatus::Filled)],
                        }))
                    }
                    status => Ok(ProtectionStatus::Missing(vec![self.oco_record(
                        position, order_id, status,
                    )])),
                }
            }
            Protection::Separate {
                stop_order_id,
                take_profit_order_id,
            } => {
                let stop = self
                    .gateway
                    .get_order_status(&position.symbol, stop_order_id)
                    .await?;
                let take = self
                    .gateway
                    .get_order_status(&position.symbol, take_profit_order_id)
                    .await?;

                match (stop.status, take.status) {
                    (OrderStatus::Open, OrderStatus::Open) => Ok(ProtectionStatus::Active),
                    (OrderStatus::Filled, _) => {
                        let sibling = self
                            .cancel_leg(position, take_profit_order_id, OrderType::TakeProfit)
                            .await;
                        Ok(ProtectionStatus::Filled(ProtectionFill {
                            reason: ExitReason::StopLoss,
                            exit_price: stop.fill_price.unwrap_or(position.stop_loss),
                            orders: vec![
                                self.stop_record(position, stop_order_id, OrderStatus::Filled),
                                sibling,
                            ],
                        }))
                    }
                    (_, OrderStatus::Filled) => {
                        let sibling = self
                            .cancel_leg(position, stop_order_id, OrderType::StopLoss)
                            .await;
                        Ok(ProtectionStatus::Filled(ProtectionFill {
                            reason: ExitReason::TakeProfit,
                            exit_price: take.fill_price.unwrap_or(position.take_profit),
                            orders: vec![
                                self.take_profit_record(
                                    position,
                                    take_profit_order_id,
                                    OrderStatus::Filled,
                                ),
                                sibling,
                            ],
                        }))
                    }
                    _ => {
                        let mut orders = Vec::new();
                        for (id, order_type, status) in [
                            (stop_order_id, OrderType::StopLoss, stop.status),
                            (take_profit_order_id, OrderType::TakeProfit, take.status),
                        ] {
                            if status == OrderStatus::Open {
                                orders.push(self.cancel_leg(position, id, order_type).await);
                            } else {
                                orders.push(self.leg_record(position, id, order_type, status));
                            }
                        }
                        Ok(ProtectionStatus::Missing(orders))
                    }
                }
            }
        }
    }

    /// Cancels every protective leg. If a leg turns out to have filled
    /// already, the fill is reported instead.
    ///
    /// Separate legs are cancelled take-profit first, so a failure part way
    /// leaves the stop-loss resting. A failed cancel is retried once.
    pub async fn cancel_protection(&self, position: &Position) -> Result<ProtectionChange> {
        let legs: Vec<(&str, OrderType)> = match &position.protection {
            Protection::None => Vec::new(),
            Protection::Oco { order_id } => vec![(order_id.as_str(), OrderType::Oco)],
            Protection::Separate {
                stop_order_id,
                take_profit_order_id,
            } => vec![
                (take_profit_order_id.as_str(), OrderType::TakeProfit),
                (stop_order_id.as_str(), OrderType::StopLoss),
            ],
        };

        let mut cancelled = Vec::with_capacity(legs.len());
        for (order_id, order_type) in legs {
            if let Err(e) = self.cancel_with_retry(&position.symbol, order_id).await {
                let update = self.gateway.get_order_status(&position.symbol, order_id).await?;
                if update.status == OrderStatus::Filled {
                    info!(position_id = %position.id, order_id, "Protective order filled before cancel");
                    return match self.check_protection(position).await? {
                        ProtectionStatus::Filled(fill) => Ok(ProtectionChange::AlreadyFilled(fill)),
                        _ => Err(e.into()),
                    };
                }
                if update.status == OrderStatus::Open {
                    if cancelled.is_empty() {
                        return Err(e.into());
                    }
                    return Err(OrderError::PartiallyCancelled {
                        position_id: position.id.clone(),
                        cancelled,
                        source: e,
                    });
                }
                debug!(order_id, status = %update.status, "Protective order already inactive");
                cancelled.push(self.leg_record(position, order_id, order_type, update.status));
                continue;
            }
            cancelled.push(self.leg_record(position, order_id, order_type, OrderStatus::Cancelled));
        }

        Ok(ProtectionChange::Applied(PlacedProtection {
            protection: Protection::None,
            orders: cancelled,
        }))
    }

    async fn cancel_with_retry(&self, symbol: &str, order_id: &str) -> std::result::Result<(), ExchangeError> {
        match self.gateway.cancel_order(symbol, order_id).await {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!(order_id, error = %first, "Cancel failed, retrying");
                self.gateway.cancel_order(symbol, order_id).await
            }
        }
    }

    /// Atomically swaps the protection for one at the new levels.
    ///
    /// On failure to place the replacement, every remaining leg is already
    /// cancelled and `OrderError::Unprotected` is returned; the caller must
    /// re-protect or close the position immediately. A cancel that stops
    /// half way returns `OrderError::PartiallyCancelled`.
    pub async fn replace_protection(
        &self,
        position: &Position,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<ProtectionChange> {
        let cancelled = match self.cancel_protection(position).await? {
            ProtectionChange::Applied(removed) => removed.orders,
            filled @ ProtectionChange::AlreadyFilled(_) => return Ok(filled),
        };

        let mut target = position.clone();
        target.stop_loss = stop_loss;
        target.take_profit = take_profit;
        target.protection = Protection::None;

        match self.place_protection(&target).await {
            Ok(placed) => {
                let mut orders = cancelled;
                orders.extend(placed.orders);
                Ok(ProtectionChange::Applied(PlacedProtection {
                    protection: placed.protection,
                    orders,
                }))
            }
            Err(OrderError::Exchange(source)) => Err(OrderError::Unprotected {
                position_id: position.id.clone(),
                cancelled,
                source,
            }),
            Err(other) => Err(other),
        }
    }

    async fn cancel_leg(&self, position: &Position, order_id: &str, order_type: OrderType) -> Order {
        let status = match self.gateway.cancel_order(&position.symbol, order_id).await {
            Ok(()) => OrderStatus::Cancelled,
            Err(e) => {
                warn!(
                    position_id = %position.id,
                    order_id,
                    error = %e,
                    "Failed to cancel sibling protective order"
                );
                OrderStatus::Open
            }
        };
        self.leg_record(position, order_id, order_type, status)
    }

    fn leg_record(
        &self,
        position: &Position,
        order_id: &str,
        order_type: OrderType,
        status: OrderStatus,
    ) -> Order {
        match order_type {
            OrderType::StopLoss => self.stop_record(position, order_id, status),
            OrderType::TakeProfit => self.take_profit_record(position, order_id, status),
            _ => self.oco_record(position, order_id, status),
        }
    }

    fn oco_record(&self, position: &Position, order_id: &str, status: OrderStatus) -> Order {
        Order::new(
            order_id,
            &position.id,
            &position.symbol,
            position.side.exit_order_side(),
            OrderType::Oco,
            status,
            position.quantity,
            Some(position.take_profit),
            Some(position.stop_loss),
        )
    }

    fn stop_record(&self, position: &Position, order_id: &str, status: OrderStatus) -> Order {
        Order::new(
            order_id,
            &position.id,
            &position.symbol,
            position.side.exit_order_side(),
            OrderType::StopLoss,
            status,
            position.quantity,
            None,
            Some(position.stop_loss),
        )
    }

    fn take_profit_record(&self, position: &Position, order_id: &str, status: OrderStatus) -> Order {
        Order::new(
            order_id,
            &position.id,
            &position.symbol,
            position.side.exit_order_side(),
            OrderType::TakeProfit,
            status,
            position.quantity,
            Some(position.take_profit),
            None,
        )
    }
}

fn leg_reason(leg: OrderType) -> ExitReason {
    match leg {
        OrderType::TakeProfit => ExitReason::TakeProfit,
        _ => ExitReason::StopLoss,
    }
}

/// Picks the leg whose level is closest to the fill price.
fn infer_leg(position: &Position, fill_price: Decimal) -> OrderType {
    if (fill_price - position.take_profit).abs() < (fill_price - position.stop_loss).abs() {
        OrderType::TakeProfit
    } else {
        OrderType::StopLoss
    }
}
