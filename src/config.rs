use crate::application::calculator::{ConversionCalculator, NetworkFeeParams};
use crate::application::orchestrator::{DEFAULT_TREASURY_ADDRESS, FlowSettings};
use crate::domain::chain::ChainId;
use crate::domain::corridor::PayoutCorridorRegistry;
use crate::domain::fee::FeeModel;
use crate::error::{RampError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://afriramp-backend2.onrender.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FeedsConfig {
    pub fiat_rate_url: String,
    pub crypto_price_url: String,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            fiat_rate_url: "https://open.er-api.com/v6/latest/USD".to_string(),
            crypto_price_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProofUploadConfig {
    pub url: String,
    pub upload_preset: String,
    pub max_image_bytes: usize,
}

impl Default for ProofUploadConfig {
    fn default() -> Self {
        Self {
            url: "https://api.cloudinary.com/v1_1/dagn33ye3/image/upload".to_string(),
            upload_preset: "devpost-hackathons".to_string(),
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    /// Treasury wallet off-ramp transfers are sent to.
    pub recipient_address: String,
    pub poll_interval_secs: u64,
    pub reset_delay_secs: u64,
    pub default_corridor: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            recipient_address: DEFAULT_TREASURY_ADDRESS.to_string(),
            poll_interval_secs: 5,
            reset_delay_secs: 10,
            default_corridor: "UGX".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FeesConfig {
    pub volatility_buffer: Decimal,
    pub margin: Decimal,
    pub processing_fee: Decimal,
    pub network_fee_surcharge_usd: Decimal,
    pub payout_gas_limit: u64,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            volatility_buffer: dec!(0.02),
            margin: dec!(0.02),
            processing_fee: dec!(0.02),
            network_fee_surcharge_usd: dec!(0.01),
            payout_gas_limit: 65_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_rpc() -> BTreeMap<String, String> {
    [
        ("1", "https://eth.llamarpc.com"),
        ("8453", "https://mainnet.base.org"),
        ("84532", "https://sepolia.base.org"),
        ("42220", "https://forno.celo.org"),
        ("14", "https://flare-api.flare.network/ext/C/rpc"),
    ]
    .into_iter()
    .map(|(chain, url)| (chain.to_string(), url.to_string()))
    .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub feeds: FeedsConfig,
    pub proof_upload: ProofUploadConfig,
    pub flow: FlowConfig,
    pub fees: FeesConfig,
    /// Chain id to JSON-RPC endpoint, used to read gas prices.
    pub rpc: BTreeMap<String, String>,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            feeds: FeedsConfig::default(),
            proof_upload: ProofUploadConfig::default(),
            flow: FlowConfig::default(),
            fees: FeesConfig::default(),
            rpc: default_rpc(),
            logging: LoggingConfig::default(),
        }
    }
}

fn check_rate(name: &str, rate: Decimal) -> Result<()> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(RampError::Config(format!("fees.{name} must be in [0, 1), got {rate}")));
    }
    Ok(())
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.request_timeout_secs == 0 {
            return Err(RampError::Config("backend.request_timeout_secs must be positive".into()));
        }
        if self.flow.poll_interval_secs == 0 || self.flow.reset_delay_secs == 0 {
            return Err(RampError::Config("flow intervals must be positive".into()));
        }
        if self.flow.recipient_address.trim().is_empty() {
            return Err(RampError::Config("flow.recipient_address is empty".into()));
        }
        if PayoutCorridorRegistry::builtin()
            .get(&self.flow.default_corridor)
            .is_none()
        {
            return Err(RampError::Config(format!(
                "unknown flow.default_corridor {}",
                self.flow.default_corridor
            )));
        }
        check_rate("volatility_buffer", self.fees.volatility_buffer)?;
        check_rate("margin", self.fees.margin)?;
        check_rate("processing_fee", self.fees.processing_fee)?;
        if self.fees.network_fee_surcharge_usd < Decimal::ZERO || self.fees.payout_gas_limit == 0 {
            return Err(RampError::Config("network fee parameters out of range".into()));
        }
        if self.proof_upload.max_image_bytes == 0 {
            return Err(RampError::Config("proof_upload.max_image_bytes must be positive".into()));
        }
        self.rpc_urls()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn rpc_urls(&self) -> Result<HashMap<ChainId, String>> {
        self.rpc
            .iter()
            .map(|(chain, url)| -> Result<(ChainId, String)> {
                let id = chain
                    .parse()
                    .map_err(|_| RampError::Config(format!("rpc key {chain} is not a chain id")))?;
                Ok((ChainId(id), url.clone()))
            })
            .collect()
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            poll_interval: Duration::from_secs(self.flow.poll_interval_secs),
            reset_delay: Duration::from_secs(self.flow.reset_delay_secs),
            treasury_address: self.flow.recipient_address.clone(),
            default_corridor: self.flow.default_corridor.clone(),
        }
    }

    pub fn calculator(&self) -> ConversionCalculator {
        ConversionCalculator::new(
            FeeModel::off_ramp_with(self.fees.volatility_buffer, self.fees.margin),
            FeeModel::on_ramp_with(self.fees.processing_fee),
            NetworkFeeParams {
                gas_limit: self.fees.payout_gas_limit,
                surcharge_usd: self.fees.network_fee_surcharge_usd,
            },
        )
    }
}
