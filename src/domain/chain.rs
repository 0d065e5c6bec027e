use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Numeric identifier of an EVM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const ETHEREUM: ChainId = ChainId(1);
pub const SEPOLIA: ChainId = ChainId(11155111);
pub const BASE: ChainId = ChainId(8453);
pub const BASE_SEPOLIA: ChainId = ChainId(84532);
pub const CELO: ChainId = ChainId(42220);
pub const CELO_ALFAJORES: ChainId = ChainId(44787);
pub const FLARE: ChainId = ChainId(14);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSymbol {
    Eth,
    Flr,
    Usdc,
    Usdt,
    Oft,
}

impl TokenSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSymbol::Eth => "ETH",
            TokenSymbol::Flr => "FLR",
            TokenSymbol::Usdc => "USDC",
            TokenSymbol::Usdt => "USDT",
            TokenSymbol::Oft => "OFT",
        }
    }

    /// Native gas assets are transferred by value, not through a contract.
    pub fn is_native(&self) -> bool {
        matches!(self, TokenSymbol::Eth | TokenSymbol::Flr)
    }

    /// Fixed per symbol; not read from on-chain metadata.
    pub fn decimals(&self) -> u32 {
        if self.is_native() { 18 } else { 6 }
    }

    /// Decimal places used when presenting amounts of this token.
    pub fn display_precision(&self) -> u32 {
        if self.decimals() == 18 { 4 } else { 2 }
    }

    /// Asset id understood by the crypto price feed. `None` means the token
    /// is treated as pegged to one US dollar.
    pub fn price_feed_id(&self) -> Option<&'static str> {
        match self {
            TokenSymbol::Eth => Some("ethereum"),
            TokenSymbol::Flr => Some("flare-networks"),
            TokenSymbol::Usdc | TokenSymbol::Usdt | TokenSymbol::Oft => None,
        }
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenSymbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ETH" => Ok(TokenSymbol::Eth),
            "FLR" => Ok(TokenSymbol::Flr),
            "USDC" => Ok(TokenSymbol::Usdc),
            "USDT" => Ok(TokenSymbol::Usdt),
            "OFT" => Ok(TokenSymbol::Oft),
            other => Err(format!("unknown token symbol: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub symbol: TokenSymbol,
    /// Contract address; absent for native assets.
    pub address: Option<String>,
    pub decimals: u32,
}

impl TokenDescriptor {
    pub fn native(symbol: TokenSymbol) -> Self {
        Self {
            symbol,
            address: None,
            decimals: symbol.decimals(),
        }
    }

    pub fn contract(symbol: TokenSymbol, address: &str) -> Self {
        Self {
            symbol,
            address: Some(address.to_string()),
            decimals: symbol.decimals(),
        }
    }
}

/// Immutable catalogue of the tokens usable on each chain.
///
/// Order matters: the first entry of a chain is the selection a flow falls
/// back to when its current token is not available after a chain switch.
#[derive(Debug, Clone, Default)]
pub struct ChainTokenRegistry {
    chains: BTreeMap<ChainId, Vec<TokenDescriptor>>,
}

impl ChainTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain_id: ChainId, tokens: Vec<TokenDescriptor>) -> Self {
        self.chains.insert(chain_id, tokens);
        self
    }

    /// Networks the ramp is deployed against.
    pub fn builtin() -> Self {
        use TokenDescriptor as T;
        use TokenSymbol::*;

        Self::new()
            .with_chain(
                ETHEREUM,
                vec![
                    T::contract(Usdc, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                    T::contract(Usdt, "0xdAC17F958D2ee523a2206206994597C13D831ec7"),
                    T::native(Eth),
                ],
            )
            .with_chain(
                SEPOLIA,
                vec![
                    T::contract(Usdc, "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
                    T::contract(Usdt, "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06"),
                    T::native(Eth),
                ],
            )
            .with_chain(
                BASE,
                vec![
                    T::contract(Usdc, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                    T::contract(Usdt, "0xfde4C96c8593536E31F229EA8f37b2ADa2699bb2"),
                    T::native(Eth),
                ],
            )
            .with_chain(
                BASE_SEPOLIA,
                vec![
                    T::contract(Usdc, "0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
                    T::contract(Usdt, "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06"),
                    T::native(Eth),
                ],
            )
            .with_chain(
                CELO,
                vec![
                    T::contract(Usdc, "0xcebA9300f2b948710d2653dD7B07f33A8B32118C"),
                    T::contract(Usdt, "0x617f3112bf5397D0467D315cC709EF968D9ba546"),
                    T::native(Eth),
                ],
            )
            .with_chain(
                CELO_ALFAJORES,
                vec![
                    T::contract(Usdc, "0x2F25deB3848C207fc8E0c34035B3Ba7fC157602B"),
                    T::contract(Usdt, "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06"),
                    T::native(Eth),
                ],
            )
            .with_chain(
                FLARE,
                vec![
                    T::contract(Oft, "0xe7cd86e13AC4309349F30B3435a9d337750fC82D"),
                    T::native(Flr),
                ],
            )
    }

    /// Unknown chains yield an empty slice; callers disable the flow.
    pub fn supported_tokens(&self, chain_id: ChainId) -> &[TokenDescriptor] {
        self.chains
            .get(&chain_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn descriptor(&self, chain_id: ChainId, symbol: TokenSymbol) -> Option<&TokenDescriptor> {
        self.supported_tokens(chain_id)
            .iter()
            .find(|token| token.symbol == symbol)
    }

    pub fn is_supported(&self, chain_id: ChainId, symbol: TokenSymbol) -> bool {
        self.descriptor(chain_id, symbol).is_some()
    }

    /// Contract address of `symbol` on `chain_id`; `None` for native assets
    /// and for tokens the chain does not carry.
    pub fn token_address(&self, chain_id: ChainId, symbol: TokenSymbol) -> Option<&str> {
        self.descriptor(chain_id, symbol)
            .and_then(|token| token.address.as_deref())
    }

    pub fn decimals_for(&self, symbol: TokenSymbol) -> u32 {
        symbol.decimals()
    }

    /// Gas asset of the chain, if the registry lists one.
    pub fn native_token(&self, chain_id: ChainId) -> Option<TokenSymbol> {
        self.supported_tokens(chain_id)
            .iter()
            .find(|token| token.address.is_none())
            .map(|token| token.symbol)
    }

    /// Re-validates a token selection after the active chain changed.
    ///
    /// Keeps `current` when the new chain carries it, otherwise resets to the
    /// chain's first token. Returns `None` when the chain is unknown.
    pub fn reconcile_selection(
        &self,
        chain_id: ChainId,
        current: Option<TokenSymbol>,
    ) -> Option<TokenSymbol> {
        let tokens = self.supported_tokens(chain_id);
        match current {
            Some(symbol) if tokens.iter().any(|token| token.symbol == symbol) => Some(symbol),
            _ => tokens.first().map(|token| token.symbol),
        }
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chains.keys().copied()
    }

    pub fn network_name(chain_id: ChainId) -> String {
        match chain_id {
            ETHEREUM => "Ethereum Mainnet".to_string(),
            SEPOLIA => "Sepolia Testnet".to_string(),
            BASE => "Base Mainnet".to_string(),
            BASE_SEPOLIA => "Base Sepolia".to_string(),
            CELO => "Celo Mainnet".to_string(),
            CELO_ALFAJORES => "Celo Alfajores".to_string(),
            FLARE => "Flare".to_string(),
            ChainId(id) => format!("Network ({id})"),
        }
    }
}
