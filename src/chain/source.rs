//! Mainchain bridge reader

use super::contracts::{decode_output, encode_call, BRIDGE_ABI, CROSS_EVENT};
use super::{ChainProvider, SourceChain};
use crate::error::{FederatorError, FederatorResult};
use crate::events::TransferEvent;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Filter, Log, H256};
use std::sync::Arc;
use tracing::debug;

/// `SourceChain` backed by the mainchain bridge contract
pub struct EthSourceChain {
    provider: Arc<ChainProvider>,
    bridge: Address,
}

impl EthSourceChain {
    pub fn new(provider: Arc<ChainProvider>, bridge: Address) -> Self {
        Self { provider, bridge }
    }
}

/// `Cross` logs emitted by `bridge` for `token` in `from_block..=to_block`
fn cross_filter(bridge: Address, token: Address, from_block: u64, to_block: u64) -> Filter {
    Filter::new()
        .address(bridge)
        .topic0(CROSS_EVENT.signature())
        .topic1(H256::from(token))
        .from_block(from_block)
        .to_block(to_block)
}

/// Parse a batch of logs into events in (block, log index) order.
///
/// One unparsable log fails the whole batch.
fn cross_events_from_logs(logs: &[Log]) -> FederatorResult<Vec<TransferEvent>> {
    let mut events = logs
        .iter()
        .map(TransferEvent::from_log)
        .collect::<FederatorResult<Vec<_>>>()?;

    // Nodes return logs in order, but the checkpoint depends on it.
    events.sort_by_key(|e| (e.block_number, e.log_index));
    Ok(events)
}

#[async_trait]
impl SourceChain for EthSourceChain {
    async fn head_height(&self) -> FederatorResult<u64> {
        let head = self.provider.get_block_number().await?;
        crate::metrics::record_source_head(head);
        Ok(head)
    }

    async fn cross_events(
        &self,
        from_block: u64,
        to_block: u64,
        token: Address,
    ) -> FederatorResult<Vec<TransferEvent>> {
        let filter = cross_filter(self.bridge, token, from_block, to_block);
        let logs = self.provider.get_logs(&filter).await?;
        debug!(
            "{}: {} Cross logs in blocks {}..={}",
            self.provider.name(),
            logs.len(),
            from_block,
            to_block
        );

        cross_events_from_logs(&logs)
    }

    async fn mapped_address(&self, account: Address) -> FederatorResult<Address> {
        let data = encode_call(&BRIDGE_ABI, "getMappedAddress", &[Token::Address(account)])?;
        let output = self.provider.call(self.bridge, data).await?;

        decode_output(&BRIDGE_ABI, "getMappedAddress", &output)?
            .into_iter()
            .next()
            .and_then(Token::into_address)
            .ok_or_else(|| {
                FederatorError::Contract("getMappedAddress returned no address".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::cross_log;
    use ethers::types::{ValueOrArray, U64};

    fn token() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn receiver() -> Address {
        Address::repeat_byte(0xbb)
    }

    #[test]
    fn test_events_sorted_by_block_then_log_index() {
        let logs = vec![
            cross_log(60, 0, token(), receiver(), 3, "X"),
            cross_log(50, 2, token(), receiver(), 2, "X"),
            cross_log(50, 1, token(), receiver(), 1, "X"),
        ];

        let order: Vec<_> = cross_events_from_logs(&logs)
            .unwrap()
            .iter()
            .map(|e| (e.block_number, e.log_index))
            .collect();
        assert_eq!(order, vec![(50, 1), (50, 2), (60, 0)]);
    }

    #[test]
    fn test_bad_log_fails_whole_batch() {
        let mut removed = cross_log(55, 0, token(), receiver(), 1, "X");
        removed.removed = Some(true);
        let logs = vec![
            cross_log(50, 0, token(), receiver(), 1, "X"),
            removed,
            cross_log(60, 0, token(), receiver(), 1, "X"),
        ];

        assert!(matches!(
            cross_events_from_logs(&logs),
            Err(FederatorError::EventParsing(_))
        ));
    }

    #[test]
    fn test_empty_batch() {
        assert!(cross_events_from_logs(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_filter_selects_bridge_token_and_range() {
        let bridge = Address::repeat_byte(0x10);
        let filter = cross_filter(bridge, token(), 50, 90);

        assert_eq!(filter.address, Some(ValueOrArray::Value(bridge)));
        assert_eq!(
            filter.topics[0],
            Some(ValueOrArray::Value(Some(CROSS_EVENT.signature())))
        );
        assert_eq!(filter.topics[1], Some(ValueOrArray::Value(Some(H256::from(token())))));
        assert_eq!(filter.topics[2], None);
        assert_eq!(filter.get_from_block(), Some(U64::from(50)));
        assert_eq!(filter.get_to_block(), Some(U64::from(90)));
    }
}
