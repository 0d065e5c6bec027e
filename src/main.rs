use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use rampflow::application::calculator::Conversion;
use rampflow::application::orchestrator::{FlowDeps, FlowState, RampFlowOrchestrator};
use rampflow::application::poller::TransactionStatusPoller;
use rampflow::application::rates::RateOracleClient;
use rampflow::config::Config;
use rampflow::domain::chain::{ChainId, ChainTokenRegistry, TokenSymbol};
use rampflow::domain::corridor::PayoutCorridorRegistry;
use rampflow::domain::ports::{
    ProofUploader, RateFeedRef, TransactionBackend, TransactionBackendRef, WalletProviderRef,
};
use rampflow::domain::transaction::{Direction, TransactionId};
use rampflow::infrastructure::http::{HttpProofUploader, HttpRateFeed, HttpTransactionBackend};
use rampflow::infrastructure::in_memory::StaticRateFeed;
use rampflow::infrastructure::wallet::PresignedTransferWallet;
use rampflow::interfaces::csv::history_writer::HistoryWriter;
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the tokens supported on a network
    Tokens {
        #[arg(long)]
        chain_id: u64,
    },
    /// List fiat corridors and their payout methods
    Corridors,
    /// Price a ramp without submitting it
    Quote {
        #[arg(value_enum)]
        direction: DirectionArg,
        #[command(flatten)]
        pricing: PricingArgs,
    },
    /// Buy tokens with mobile money
    Onramp {
        #[command(flatten)]
        pricing: PricingArgs,
        #[command(flatten)]
        payout: PayoutArgs,
        /// Wallet that receives the tokens
        #[arg(long)]
        wallet: String,
        /// URL of an already uploaded proof-of-payment image
        #[arg(long, conflicts_with = "proof_image", required_unless_present = "proof_image")]
        proof_url: Option<String>,
        /// Proof-of-payment image to upload
        #[arg(long)]
        proof_image: Option<PathBuf>,
        /// Keep polling until the transaction is final
        #[arg(long)]
        wait: bool,
    },
    /// Sell tokens for mobile money
    Offramp {
        #[command(flatten)]
        pricing: PricingArgs,
        #[command(flatten)]
        payout: PayoutArgs,
        /// Wallet the tokens are sent from
        #[arg(long)]
        wallet: String,
        /// Hash of the transfer to the treasury, signed beforehand
        #[arg(long)]
        tx_hash: String,
        /// Wallet balance of the token; defaults to the amount
        #[arg(long)]
        balance: Option<Decimal>,
        #[arg(long)]
        wait: bool,
    },
    /// Show the status of a submitted transaction
    Status {
        #[arg(value_enum)]
        direction: DirectionArg,
        id: String,
        /// Poll until the status is final
        #[arg(long)]
        watch: bool,
    },
    /// Export a wallet's transactions as CSV
    History {
        #[arg(value_enum)]
        direction: DirectionArg,
        address: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Onramp,
    Offramp,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Onramp => Direction::OnRamp,
            DirectionArg::Offramp => Direction::OffRamp,
        }
    }
}

#[derive(Args)]
struct PricingArgs {
    /// Token amount for off-ramps, fiat amount for on-ramps
    #[arg(long)]
    amount: Decimal,
    #[arg(long, default_value = "USDC")]
    token: TokenSymbol,
    #[arg(long, default_value_t = 8453)]
    chain_id: u64,
    #[arg(long)]
    corridor: Option<String>,
    /// Fiat per US dollar, instead of asking the rate feed
    #[arg(long)]
    rate: Option<Decimal>,
    /// US dollar price of the token, instead of asking the price feed
    #[arg(long)]
    token_usd: Option<Decimal>,
    /// US dollar price of the network's gas token
    #[arg(long)]
    native_usd: Option<Decimal>,
    /// Gas price in wei, instead of asking the network
    #[arg(long)]
    gas_price_wei: Option<u128>,
}

#[derive(Args)]
struct PayoutArgs {
    #[arg(long)]
    method: Option<String>,
    #[arg(long)]
    mobile: String,
    #[arg(long)]
    email: String,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn rate_feed(
    config: &Config,
    pricing: &PricingArgs,
    corridors: &PayoutCorridorRegistry,
) -> Result<RateFeedRef> {
    let live = HttpRateFeed::new(
        &config.feeds.fiat_rate_url,
        &config.feeds.crypto_price_url,
        config.rpc_urls().into_diagnostic()?,
        config.request_timeout(),
    )
    .into_diagnostic()?;

    let chain_id = ChainId(pricing.chain_id);
    let mut feed = StaticRateFeed::new().with_fallback(Arc::new(live));
    if let Some(rate) = pricing.rate {
        let corridor = pricing
            .corridor
            .as_deref()
            .unwrap_or(&config.flow.default_corridor);
        feed = feed.with_rate(&corridors.api_code_for(corridor), rate);
    }
    if let (Some(price), Some(asset)) = (pricing.token_usd, pricing.token.price_feed_id()) {
        feed = feed.with_usd_price(asset, price);
    }
    let native_asset = ChainTokenRegistry::builtin()
        .native_token(chain_id)
        .and_then(|token| token.price_feed_id());
    if let (Some(price), Some(asset)) = (pricing.native_usd, native_asset) {
        feed = feed.with_usd_price(asset, price);
    }
    if let Some(wei) = pricing.gas_price_wei {
        feed = feed.with_gas_price(chain_id, wei);
    }
    Ok(Arc::new(feed))
}

fn backend(config: &Config) -> Result<TransactionBackendRef> {
    let backend = HttpTransactionBackend::new(&config.backend.base_url, config.request_timeout())
        .into_diagnostic()?;
    Ok(Arc::new(backend))
}

/// Builds a flow with every pricing input applied.
fn build_flow(
    config: &Config,
    direction: Direction,
    pricing: &PricingArgs,
    wallet: Option<WalletProviderRef>,
) -> Result<RampFlowOrchestrator> {
    let tokens = Arc::new(ChainTokenRegistry::builtin());
    let corridors = Arc::new(PayoutCorridorRegistry::builtin());
    let feed = rate_feed(config, pricing, &corridors)?;

    let mut settings = config.flow_settings();
    if let Some(corridor) = &pricing.corridor {
        if corridors.get(corridor).is_none() {
            miette::bail!("unknown corridor {corridor}");
        }
        settings.default_corridor = corridor.clone();
    }

    let deps = FlowDeps {
        rates: Arc::new(RateOracleClient::new(feed, Arc::clone(&corridors))),
        tokens,
        corridors,
        calculator: config.calculator(),
        backend: backend(config)?,
        wallet,
    };
    let flow = RampFlowOrchestrator::new(direction, deps, settings);
    flow.set_chain(ChainId(pricing.chain_id));
    flow.select_token(pricing.token).into_diagnostic()?;
    flow.set_amount(pricing.amount);
    Ok(flow)
}

fn apply_payout(flow: &RampFlowOrchestrator, payout: &PayoutArgs, wallet: &str) -> Result<()> {
    if let Some(method) = &payout.method {
        flow.select_payout_method(method).into_diagnostic()?;
    }
    flow.set_mobile_number(&payout.mobile);
    flow.set_email(&payout.email);
    flow.set_wallet_address(wallet);
    Ok(())
}

fn print_conversion(conversion: &Conversion, unit: &str, fiat: bool) {
    let show = |value: Decimal| {
        if fiat {
            format!("{value:.2}")
        } else {
            value.normalize().to_string()
        }
    };
    println!("Gross: {} {unit}", show(conversion.gross));
    for item in &conversion.line_items {
        println!("{}: -{}", item.name, show(item.amount));
    }
    println!("You receive: {} {unit}", show(conversion.net));
}

async fn submit_and_report(flow: &RampFlowOrchestrator, wait: bool) -> Result<()> {
    let id = flow.submit().await.map_err(|err| miette::miette!("{}", err.user_message()))?;
    println!("Submitted transaction {id}");
    if !wait {
        return Ok(());
    }
    loop {
        match flow.state() {
            FlowState::Terminal(outcome) => {
                println!("Transaction {id}: {outcome:?}");
                return Ok(());
            }
            FlowState::Idle => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(500)).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_file(path).into_diagnostic()?,
        None => Config::default(),
    };
    init_tracing(&config);

    match cli.command {
        Command::Tokens { chain_id } => {
            let chain_id = ChainId(chain_id);
            let registry = ChainTokenRegistry::builtin();
            println!("{}", ChainTokenRegistry::network_name(chain_id));
            for token in registry.supported_tokens(chain_id) {
                let address = token.address.as_deref().unwrap_or("native");
                println!("{},{},{address}", token.symbol, token.decimals);
            }
        }
        Command::Corridors => {
            for corridor in PayoutCorridorRegistry::builtin().corridors() {
                let methods: Vec<String> = corridor
                    .methods
                    .iter()
                    .map(|method| format!("{} ({})", method.id, method.name))
                    .collect();
                println!(
                    "{} {} [{}]: {}",
                    corridor.code,
                    corridor.name,
                    corridor.symbol,
                    methods.join(", ")
                );
            }
        }
        Command::Quote { direction, pricing } => {
            let direction = Direction::from(direction);
            let flow = build_flow(&config, direction, &pricing, None)?;
            let conversion = flow.quote().await.into_diagnostic()?;
            match direction {
                Direction::OffRamp => print_conversion(&conversion, &flow.corridor(), true),
                Direction::OnRamp => {
                    print_conversion(&conversion, pricing.token.as_str(), false)
                }
            }
        }
        Command::Onramp {
            pricing,
            payout,
            wallet,
            proof_url,
            proof_image,
            wait,
        } => {
            let flow = build_flow(&config, Direction::OnRamp, &pricing, None)?;
            apply_payout(&flow, &payout, &wallet)?;
            let url = match (proof_url, proof_image) {
                (Some(url), _) => url,
                (None, Some(path)) => {
                    let image = std::fs::read(&path).into_diagnostic()?;
                    let file_name = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .unwrap_or("proof");
                    let uploader = HttpProofUploader::new(
                        &config.proof_upload.url,
                        &config.proof_upload.upload_preset,
                        config.proof_upload.max_image_bytes,
                        config.request_timeout(),
                    )
                    .into_diagnostic()?;
                    uploader.upload(image, file_name).await.into_diagnostic()?
                }
                (None, None) => miette::bail!("a proof of payment is required"),
            };
            flow.set_proof_url(&url);
            submit_and_report(&flow, wait).await?;
        }
        Command::Offramp {
            pricing,
            payout,
            wallet,
            tx_hash,
            balance,
            wait,
        } => {
            let signer = PresignedTransferWallet::new(&tx_hash).into_diagnostic()?;
            let flow = build_flow(&config, Direction::OffRamp, &pricing, Some(Arc::new(signer)))?;
            apply_payout(&flow, &payout, &wallet)?;
            flow.set_available_balance(balance.unwrap_or(pricing.amount));
            submit_and_report(&flow, wait).await?;
        }
        Command::Status {
            direction,
            id,
            watch,
        } => {
            let direction = Direction::from(direction);
            let id = TransactionId::new(id);
            let poller = TransactionStatusPoller::new(
                backend(&config)?,
                config.flow_settings().poll_interval,
            );
            let status = poller.poll_once(direction, &id).await.into_diagnostic()?;
            println!("{id}: {status}");
            if watch && !status.is_terminal() {
                poller
                    .poll_until_terminal(direction, &id, |status| println!("{id}: {status}"))
                    .await
                    .into_diagnostic()?;
            }
        }
        Command::History { direction, address } => {
            let direction = Direction::from(direction);
            let entries = backend(&config)?
                .history(direction, &address)
                .await
                .into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = HistoryWriter::new(stdout.lock());
            writer.write_entries(direction, &entries).into_diagnostic()?;
            writer.finish().into_diagnostic()?;
        }
    }

    Ok(())
}
