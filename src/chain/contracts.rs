//! ABI definitions and call encoding for the bridge and multisig contracts

use crate::error::{FederatorError, FederatorResult};
use crate::events::ResolvedTransfer;

use ethers::abi::{parse_abi, Abi, Event, Token};
use ethers::types::{Address, Bytes, U256};
use lazy_static::lazy_static;

lazy_static! {
    /// Bridge contract, deployed on both chains
    pub static ref BRIDGE_ABI: Abi = parse_abi(&[
        "event Cross(address indexed _tokenAddress, address indexed _to, uint256 _amount, string _symbol)",
        "function getMappedAddress(address account) external view returns (address)",
        "function transactionWasProcessed(uint256 _blockNumber, bytes32 _blockHash, bytes32 _transactionHash, address _receiver, uint256 _amount, uint32 _logIndex) external view returns (bool)",
        "function acceptTransfer(address tokenAddress, address receiver, uint256 amount, string symbol, uint256 blockNumber, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) external returns (bool)",
    ])
    .expect("bridge ABI");

    /// Multisig wallet guarding the sidechain bridge
    pub static ref MULTISIG_ABI: Abi = parse_abi(&[
        "function transactionCount() external view returns (uint256)",
        "function getTransactionIds(uint256 from, uint256 to, bool pending, bool executed) external view returns (uint256[])",
        "function confirmations(uint256 transactionId, address owner) external view returns (bool)",
        "function confirmTransaction(uint256 transactionId) external",
        "function submitTransaction(address destination, uint256 value, bytes data) external returns (uint256)",
    ])
    .expect("multisig ABI");

    pub static ref CROSS_EVENT: Event = BRIDGE_ABI.event("Cross").expect("Cross event").clone();
}

/// Encode a call to `name` on `abi`
pub fn encode_call(abi: &Abi, name: &str, args: &[Token]) -> FederatorResult<Bytes> {
    let function = abi.function(name)?;
    Ok(Bytes::from(function.encode_input(args)?))
}

/// Decode the return values of `name` on `abi`
pub fn decode_output(abi: &Abi, name: &str, data: &[u8]) -> FederatorResult<Vec<Token>> {
    let function = abi.function(name)?;
    Ok(function.decode_output(data)?)
}

/// Decode the arguments of a call previously produced by [`encode_call`]
pub fn decode_call(abi: &Abi, name: &str, data: &[u8]) -> FederatorResult<Vec<Token>> {
    let function = abi.function(name)?;
    if data.len() < 4 || data[..4] != function.short_signature() {
        return Err(FederatorError::Contract(format!("calldata is not a {} call", name)));
    }
    Ok(function.decode_input(&data[4..])?)
}

/// `confirmTransaction(id)` on the multisig
pub fn encode_confirm(transaction_id: U256) -> FederatorResult<Bytes> {
    encode_call(&MULTISIG_ABI, "confirmTransaction", &[Token::Uint(transaction_id)])
}

/// `acceptTransfer(...)` on the sidechain bridge, carrying the full identity tuple
pub fn encode_accept_transfer(
    side_token: Address,
    transfer: &ResolvedTransfer,
) -> FederatorResult<Bytes> {
    let event = &transfer.event;
    encode_call(
        &BRIDGE_ABI,
        "acceptTransfer",
        &[
            Token::Address(side_token),
            Token::Address(transfer.mapped_receiver),
            Token::Uint(event.amount),
            Token::String(event.symbol.clone()),
            Token::Uint(U256::from(event.block_number)),
            Token::FixedBytes(event.block_hash.as_bytes().to_vec()),
            Token::FixedBytes(event.tx_hash.as_bytes().to_vec()),
            Token::Uint(U256::from(event.log_index)),
        ],
    )
}

/// `submitTransaction(destination, value, data)` on the multisig
pub fn encode_submit_proposal(
    destination: Address,
    value: U256,
    data: &Bytes,
) -> FederatorResult<Bytes> {
    encode_call(
        &MULTISIG_ABI,
        "submitTransaction",
        &[
            Token::Address(destination),
            Token::Uint(value),
            Token::Bytes(data.to_vec()),
        ],
    )
}

/// Narrow a uint return value to `u64`
pub fn token_to_u64(token: Token, what: &str) -> FederatorResult<u64> {
    let value = token
        .into_uint()
        .ok_or_else(|| FederatorError::Contract(format!("{} is not a uint", what)))?;
    if value > U256::from(u64::MAX) {
        return Err(FederatorError::Contract(format!("{} {} overflows u64", what, value)));
    }
    Ok(value.as_u64())
}
