//! Router calldata for local swaps

use crate::config::DexConfig;
use crate::error::{MonitorError, MonitorResult};

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use std::fmt;
use std::str::FromStr;

pub const EXACT_INPUT_SINGLE_SIGNATURE: &str =
    "exactInputSingle((address,address,uint24,address,uint256,uint256,uint160))";
pub const SWAP_EXACT_TOKENS_SIGNATURE: &str =
    "swapExactTokensForTokens(uint256,uint256,(address,address,bool,address)[],address,uint256)";

/// Router interfaces the orchestrator can encode for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterType {
    /// SwapRouter02 single-pool exact-input swap
    UniswapV3,
    /// Route-based router with one hop
    VelodromeV2,
}

impl FromStr for RouterType {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniswap-v3" => Ok(RouterType::UniswapV3),
            "velodrome-v2" => Ok(RouterType::VelodromeV2),
            other => Err(MonitorError::Configuration(format!(
                "Unsupported router type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RouterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterType::UniswapV3 => write!(f, "uniswap-v3"),
            RouterType::VelodromeV2 => write!(f, "velodrome-v2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub recipient: Address,
}

/// Router address and calldata for `request` on the chain configured by `dex`
pub fn encode_swap(
    dex: &DexConfig,
    request: &SwapRequest,
    deadline: u64,
) -> MonitorResult<(Address, Bytes)> {
    let router_type: RouterType = dex.router_type.parse()?;
    let router = parse_address(&dex.router_address, "router")?;

    let data = match router_type {
        RouterType::UniswapV3 => encode_exact_input_single(request, dex.fee_tier),
        RouterType::VelodromeV2 => {
            let factory = match &dex.factory_address {
                Some(factory) => parse_address(factory, "factory")?,
                // Router falls back to its default factory
                None => Address::zero(),
            };
            encode_swap_exact_tokens(request, dex.stable, factory, deadline)
        }
    };

    Ok((router, data))
}

fn encode_exact_input_single(request: &SwapRequest, fee_tier: u32) -> Bytes {
    let params = Token::Tuple(vec![
        Token::Address(request.token_in),
        Token::Address(request.token_out),
        Token::Uint(U256::from(fee_tier)),
        Token::Address(request.recipient),
        Token::Uint(request.amount_in),
        Token::Uint(request.min_amount_out),
        Token::Uint(U256::zero()),
    ]);

    with_selector(EXACT_INPUT_SINGLE_SIGNATURE, &[params])
}

fn encode_swap_exact_tokens(
    request: &SwapRequest,
    stable: bool,
    factory: Address,
    deadline: u64,
) -> Bytes {
    let route = Token::Tuple(vec![
        Token::Address(request.token_in),
        Token::Address(request.token_out),
        Token::Bool(stable),
        Token::Address(factory),
    ]);

    with_selector(
        SWAP_EXACT_TOKENS_SIGNATURE,
        &[
            Token::Uint(request.amount_in),
            Token::Uint(request.min_amount_out),
            Token::Array(vec![route]),
            Token::Address(request.recipient),
            Token::Uint(U256::from(deadline)),
        ],
    )
}

fn with_selector(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(tokens));
    Bytes::from(data)
}

fn parse_address(value: &str, field: &str) -> MonitorResult<Address> {
    value.parse().map_err(|e| {
        MonitorError::Configuration(format!("Invalid {} address {:?}: {}", field, value, e))
    })
}
