//! Settlement service.
//!
//! A queue worker drains matched trades and submits one contract call per
//! `(trade, fill)`. Broadcast failures leave the trade recorded without a
//! transaction id; the admin force-settle endpoint is the recovery path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::chain::clarity::{c32_address_encode, ClarityValue};
use crate::chain::client::StacksClient;
use crate::chain::transaction::{build_contract_call, ContractCall, Network, Signer};
use crate::chain::ChainError;
use crate::models::order::Order;
use crate::models::trade::TradeType;
use crate::store::trades::TradeLog;

use super::types::{SettlementError, SettlementRequest};

const BROADCAST_TIMEOUT: Duration = Duration::from_secs(30);
/// Flat operator fee per settlement transaction, in micro-STX.
const TX_FEE: u64 = 10_000;

pub struct SettlementService {
    client: StacksClient,
    trades: Arc<TradeLog>,
    contract_id: String,
    network: Network,
    signer: Signer,
    operator_principal: String,
}

impl SettlementService {
    pub fn new(
        client: StacksClient,
        trades: Arc<TradeLog>,
        contract_id: &str,
        network: Network,
        operator_key: &str,
    ) -> Result<Self, SettlementError> {
        if !contract_id.contains('.') {
            return Err(SettlementError::Precondition(format!(
                "contract id must be address.name, got {}",
                contract_id
            )));
        }
        let signer = Signer::from_hex(operator_key)?;
        let operator_principal =
            c32_address_encode(network.address_version(), &signer.signer_hash());
        Ok(Self {
            client,
            trades,
            contract_id: contract_id.to_string(),
            network,
            signer,
            operator_principal,
        })
    }

    pub fn operator_principal(&self) -> &str {
        &self.operator_principal
    }

    /// Settle a matched trade on-chain and record the transaction id.
    /// Refuses to re-broadcast a trade that already carries one.
    pub async fn settle_and_record(
        &self,
        request: &SettlementRequest,
    ) -> Result<String, SettlementError> {
        let trade_id = request.trade.trade_id;
        match self.trades.get(trade_id) {
            None => return Err(SettlementError::TradeNotFound(trade_id)),
            Some(trade) if trade.tx_hash.is_some() => {
                return Err(SettlementError::AlreadySettled(trade_id))
            }
            Some(_) => {}
        }

        let call = build_call(&self.contract_id, request)?;
        let nonce = self.client.account_nonce(&self.operator_principal).await?;
        let tx = build_contract_call(self.network, &self.signer, nonce, TX_FEE, &call)?;

        let txid = tokio::time::timeout(
            BROADCAST_TIMEOUT,
            self.client.broadcast_transaction(&tx.bytes),
        )
        .await
        .map_err(|_| SettlementError::Timeout)?
        .map_err(|err| match err {
            ChainError::Rejected(body) => SettlementError::Rejected(body),
            other => SettlementError::Chain(other),
        })?;

        self.trades.set_tx_hash(trade_id, &txid);
        info!(
            "trade {} settled via {} as tx {}",
            trade_id, call.function_name, txid
        );
        Ok(txid)
    }
}

/// Drain the settlement queue. Errors are logged and never fatal.
pub fn spawn_worker(
    service: Arc<SettlementService>,
    mut queue: mpsc::Receiver<SettlementRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "settlement worker started (operator {})",
            service.operator_principal()
        );
        while let Some(request) = queue.recv().await {
            if let Err(err) = service.settle_and_record(&request).await {
                error!(
                    "failed to settle trade {}: {}",
                    request.trade.trade_id, err
                );
            }
        }
        warn!("settlement worker stopped");
    })
}

/// Shape the contract call for a matched trade. Pure; every broadcast
/// precondition is enforced here.
pub fn build_call(
    contract_id: &str,
    request: &SettlementRequest,
) -> Result<ContractCall, SettlementError> {
    if request.fill_amount <= 0 {
        return Err(SettlementError::Precondition(
            "fill amount must be positive".into(),
        ));
    }

    let maker = &request.maker_order;
    let taker = &request.taker_order;
    let maker_sig = required_signature(maker, "maker")?;

    let (function, args) = match request.trade.trade_type {
        TradeType::Normal => {
            let args = vec![
                ClarityValue::principal(&maker.maker)?,
                ClarityValue::Buffer(decode_position(&maker.maker_position_id)?),
                ClarityValue::UInt(amount_u128(maker.size)?),
                ClarityValue::Buffer(maker_sig),
                ClarityValue::principal(&taker.maker)?,
                ClarityValue::Buffer(decode_position(&maker.taker_position_id)?),
                ClarityValue::UInt(taker_amount(maker)?),
                ClarityValue::UInt(parse_salt(maker)?),
                ClarityValue::UInt(maker.expiration as u128),
                ClarityValue::UInt(amount_u128(request.fill_amount)?),
            ];
            ("fill-order", args)
        }
        TradeType::Mint => {
            let taker_sig = required_signature(taker, "taker")?;
            // both sides are buyers; each is bound to the position it mints
            let args = pair_args(
                maker,
                taker,
                maker_sig,
                taker_sig,
                |order| &order.taker_position_id,
                request,
            )?;
            ("fill-order-mint", args)
        }
        TradeType::Merge => {
            let taker_sig = required_signature(taker, "taker")?;
            // both sides are sellers; each burns the position it holds
            let args = pair_args(
                maker,
                taker,
                maker_sig,
                taker_sig,
                |order| &order.maker_position_id,
                request,
            )?;
            ("fill-order-merge", args)
        }
    };

    Ok(ContractCall::new(contract_id, function, args)?)
}

fn pair_args(
    maker: &Order,
    taker: &Order,
    maker_sig: Vec<u8>,
    taker_sig: Vec<u8>,
    position_of: impl Fn(&Order) -> &String,
    request: &SettlementRequest,
) -> Result<Vec<ClarityValue>, SettlementError> {
    let condition_id = hex::decode(&request.trade.condition_id)
        .map_err(|_| SettlementError::Precondition("condition id is not hex".into()))?;
    if condition_id.len() != 32 {
        return Err(SettlementError::Precondition(
            "condition id must be 32 bytes".into(),
        ));
    }
    Ok(vec![
        ClarityValue::principal(&maker.maker)?,
        ClarityValue::Buffer(decode_position(position_of(maker))?),
        ClarityValue::UInt(amount_u128(maker.size)?),
        ClarityValue::Buffer(maker_sig),
        ClarityValue::principal(&taker.maker)?,
        ClarityValue::Buffer(decode_position(position_of(taker))?),
        ClarityValue::UInt(amount_u128(taker.size)?),
        ClarityValue::Buffer(taker_sig),
        ClarityValue::Buffer(condition_id),
        ClarityValue::UInt(parse_salt(maker)?),
        ClarityValue::UInt(maker.expiration as u128),
        ClarityValue::UInt(amount_u128(request.fill_amount)?),
    ])
}

fn required_signature(order: &Order, label: &str) -> Result<Vec<u8>, SettlementError> {
    let signature = order.signature.as_deref().ok_or_else(|| {
        SettlementError::Precondition(format!("{} signature is required", label))
    })?;
    if signature.len() != 130 {
        return Err(SettlementError::Precondition(format!(
            "{} signature must be 130 hex chars, got {}",
            label,
            signature.len()
        )));
    }
    hex::decode(signature)
        .map_err(|_| SettlementError::Precondition(format!("{} signature is not hex", label)))
}

fn decode_position(position_hex: &str) -> Result<Vec<u8>, SettlementError> {
    let bytes = hex::decode(position_hex)
        .map_err(|_| SettlementError::Precondition("position id is not hex".into()))?;
    if bytes.len() != 32 {
        return Err(SettlementError::Precondition(format!(
            "position id must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn amount_u128(value: i64) -> Result<u128, SettlementError> {
    if value < 0 {
        return Err(SettlementError::Precondition(format!(
            "amount must be non-negative, got {}",
            value
        )));
    }
    Ok(value as u128)
}

/// What the maker receives for their full size: `floor(price × size)`.
fn taker_amount(order: &Order) -> Result<u128, SettlementError> {
    let product = (order.price as i128) * (order.size as i128);
    if product < 0 {
        return Err(SettlementError::Precondition(
            "taker amount must be non-negative".into(),
        ));
    }
    Ok(product as u128)
}

fn parse_salt(order: &Order) -> Result<u128, SettlementError> {
    order.salt.parse().map_err(|_| {
        SettlementError::Precondition(format!("salt is not numeric: {}", order.salt))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::clarity::c32_address_encode;
    use crate::models::market::Market;
    use crate::models::order::{NewOrder, OrderSide};
    use crate::models::trade::Trade;
    use chrono::Utc;
    use uuid::Uuid;

    fn contract_id() -> String {
        format!("{}.ctf-exchange", c32_address_encode(26, &[1u8; 20]))
    }

    fn signed_order(market: &Market, side: OrderSide, price: i64, size: i64) -> Order {
        let (maker_pos, taker_pos) = match side {
            OrderSide::Buy => (market.no_position_id.clone(), market.yes_position_id.clone()),
            OrderSide::Sell => (market.yes_position_id.clone(), market.no_position_id.clone()),
        };
        Order::accept(NewOrder {
            maker: c32_address_encode(26, &[7u8; 20]),
            market_id: market.market_id,
            condition_id: market.condition_id.clone(),
            maker_position_id: maker_pos,
            taker_position_id: taker_pos,
            side,
            price,
            size,
            salt: "555".into(),
            expiration: 0,
            signature: Some("ab".repeat(65)),
            public_key: Some("02".repeat(33)),
        })
    }

    fn trade_for(market: &Market, maker: &Order, taker: &Order, trade_type: TradeType) -> Trade {
        Trade {
            trade_id: Uuid::new_v4(),
            market_id: market.market_id,
            condition_id: market.condition_id.clone(),
            outcome_position_id: market.yes_position_id.clone(),
            maker_position_id: maker.maker_position_id.clone(),
            taker_position_id: maker.taker_position_id.clone(),
            maker: maker.maker.clone(),
            taker: taker.maker.clone(),
            price: maker.price,
            size: 50,
            side: taker.side,
            maker_order_id: maker.order_id,
            taker_order_id: taker.order_id,
            trade_type,
            timestamp: Utc::now().timestamp_millis(),
            tx_hash: None,
        }
    }

    fn request(trade_type: TradeType) -> SettlementRequest {
        let market = Market::new(&hex::encode([9u8; 32]), "q", "SP000").unwrap();
        let (maker_side, taker_side) = match trade_type {
            TradeType::Normal => (OrderSide::Sell, OrderSide::Buy),
            TradeType::Mint => (OrderSide::Buy, OrderSide::Buy),
            TradeType::Merge => (OrderSide::Sell, OrderSide::Sell),
        };
        let maker = signed_order(&market, maker_side, 660_000, 100);
        let taker = signed_order(&market, taker_side, 340_000, 100);
        let trade = trade_for(&market, &maker, &taker, trade_type);
        SettlementRequest {
            trade,
            maker_order: maker,
            taker_order: taker,
            fill_amount: 50,
        }
    }

    #[test]
    fn test_normal_dispatches_fill_order() {
        let call = build_call(&contract_id(), &request(TradeType::Normal)).unwrap();
        assert_eq!(call.function_name, "fill-order");
        assert_eq!(call.args.len(), 10);
        // maker amount is the full order size, fill is the matched slice
        assert_eq!(call.args[2], ClarityValue::UInt(100));
        assert_eq!(call.args[9], ClarityValue::UInt(50));
        // taker amount = price × size
        assert_eq!(call.args[6], ClarityValue::UInt(66_000_000));
    }

    #[test]
    fn test_mint_dispatches_fill_order_mint() {
        let call = build_call(&contract_id(), &request(TradeType::Mint)).unwrap();
        assert_eq!(call.function_name, "fill-order-mint");
        assert_eq!(call.args.len(), 12);
    }

    #[test]
    fn test_merge_dispatches_fill_order_merge() {
        let call = build_call(&contract_id(), &request(TradeType::Merge)).unwrap();
        assert_eq!(call.function_name, "fill-order-merge");
        assert_eq!(call.args.len(), 12);
    }

    #[test]
    fn test_maker_signature_required() {
        let mut req = request(TradeType::Normal);
        req.maker_order.signature = None;
        assert!(matches!(
            build_call(&contract_id(), &req),
            Err(SettlementError::Precondition(_))
        ));
    }

    #[test]
    fn test_taker_signature_optional_for_normal_only() {
        let mut req = request(TradeType::Normal);
        req.taker_order.signature = None;
        assert!(build_call(&contract_id(), &req).is_ok());

        let mut req = request(TradeType::Mint);
        req.taker_order.signature = None;
        assert!(matches!(
            build_call(&contract_id(), &req),
            Err(SettlementError::Precondition(_))
        ));

        let mut req = request(TradeType::Merge);
        req.taker_order.signature = None;
        assert!(build_call(&contract_id(), &req).is_err());
    }

    #[test]
    fn test_signature_length_enforced() {
        let mut req = request(TradeType::Normal);
        req.maker_order.signature = Some("ab".repeat(64));
        assert!(build_call(&contract_id(), &req).is_err());
    }

    #[test]
    fn test_position_id_length_enforced() {
        let mut req = request(TradeType::Normal);
        req.maker_order.maker_position_id = "abcd".into();
        assert!(build_call(&contract_id(), &req).is_err());
    }

    #[test]
    fn test_fill_must_be_positive() {
        let mut req = request(TradeType::Normal);
        req.fill_amount = 0;
        assert!(build_call(&contract_id(), &req).is_err());
    }
}
