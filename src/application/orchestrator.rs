use super::calculator::{Conversion, ConversionCalculator, is_within_balance, quick_amount};
use super::poller::{FlowTasks, TransactionStatusPoller};
use super::rates::RateOracleClient;
use super::submitter::TransactionSubmitter;
use crate::domain::chain::{ChainId, ChainTokenRegistry, TokenSymbol};
use crate::domain::corridor::PayoutCorridorRegistry;
use crate::domain::money::{Amount, is_valid_email};
use crate::domain::ports::{TransactionBackendRef, WalletProviderRef};
use crate::domain::rate::RateQuote;
use crate::domain::transaction::{
    Direction, TransactionDraft, TransactionId, TransactionRecord, TransactionStatus,
};
use crate::error::{Field, RampError, Result};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wallet that receives off-ramp transfers unless configured otherwise.
pub const DEFAULT_TREASURY_ADDRESS: &str = "0xDD463C81cb2fA0e95b55c5d7696d8a9755cb1Af2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSettings {
    pub poll_interval: Duration,
    /// How long a terminal flow stays visible before it resets to idle.
    pub reset_delay: Duration,
    pub treasury_address: String,
    pub default_corridor: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reset_delay: Duration::from_secs(10),
            treasury_address: DEFAULT_TREASURY_ADDRESS.to_string(),
            default_corridor: "UGX".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// `Idle -> Validating -> Submitting -> Polling -> Terminal -> Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Validating,
    Submitting,
    Polling(TransactionId),
    Terminal(Outcome),
}

/// Collaborators a flow is built from.
pub struct FlowDeps {
    pub tokens: Arc<ChainTokenRegistry>,
    pub corridors: Arc<PayoutCorridorRegistry>,
    pub rates: Arc<RateOracleClient>,
    pub calculator: ConversionCalculator,
    pub backend: TransactionBackendRef,
    /// Required for off-ramps only.
    pub wallet: Option<WalletProviderRef>,
}

#[derive(Debug, Clone, Default)]
struct Inputs {
    chain_id: Option<ChainId>,
    token: Option<TokenSymbol>,
    corridor: String,
    payout_method: Option<String>,
    mobile_number: String,
    email: String,
    amount: Option<Decimal>,
    balance: Option<Decimal>,
    proof_url: Option<String>,
    wallet_address: Option<String>,
}

struct FlowInner {
    state: FlowState,
    inputs: Inputs,
    record: Option<TransactionRecord>,
    last_error: Option<String>,
    /// Bumped on every reset; scheduled work carrying an older epoch is
    /// ignored.
    epoch: u64,
    tasks: FlowTasks,
    rate_task: Option<JoinHandle<()>>,
}

impl FlowInner {
    fn clear(&mut self) {
        self.state = FlowState::Idle;
        self.record = None;
        self.last_error = None;
        self.inputs.amount = None;
        self.inputs.mobile_number.clear();
        self.inputs.email.clear();
        self.inputs.proof_url = None;
        self.epoch += 1;
    }
}

struct FlowShared {
    direction: Direction,
    settings: FlowSettings,
    tokens: Arc<ChainTokenRegistry>,
    corridors: Arc<PayoutCorridorRegistry>,
    rates: Arc<RateOracleClient>,
    calculator: ConversionCalculator,
    submitter: TransactionSubmitter,
    poller: TransactionStatusPoller,
    inner: Mutex<FlowInner>,
}

impl FlowShared {
    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn default_method(&self, corridor: &str) -> Option<String> {
        self.corridors
            .get(corridor)
            .and_then(|corridor| corridor.default_method())
            .map(|method| method.id.clone())
    }

    /// Clears the entries and puts the corridor, its payout method and the
    /// token back to their defaults. The chain and wallet stay, they belong
    /// to the connected wallet.
    fn restore_defaults(&self, inner: &mut FlowInner) {
        inner.clear();
        let corridor = self.settings.default_corridor.clone();
        inner.inputs.payout_method = self.default_method(&corridor);
        inner.inputs.corridor = corridor;
        inner.inputs.token = inner
            .inputs
            .chain_id
            .and_then(|chain_id| self.tokens.reconcile_selection(chain_id, None));
    }

    /// Refreshes the rate of `corridor` in the background, aborting a
    /// refresh still running for a previous corridor.
    fn spawn_rate_refresh(&self, inner: &mut FlowInner, corridor: String) {
        if let Some(previous) = inner.rate_task.take() {
            previous.abort();
        }
        let rates = Arc::clone(&self.rates);
        inner.rate_task = Some(tokio::spawn(async move {
            if let Err(err) = rates.refresh(&corridor).await {
                warn!(%corridor, error = %err, "Rate refresh failed");
            }
        }));
    }

    fn selected_token(&self, inputs: &Inputs) -> Result<(ChainId, TokenSymbol)> {
        let (Some(chain_id), Some(token)) = (inputs.chain_id, inputs.token) else {
            return Err(RampError::Validation(Field::Token));
        };
        if !self.tokens.is_supported(chain_id, token) {
            return Err(RampError::UnsupportedTokenOnChain { token, chain_id });
        }
        Ok((chain_id, token))
    }

    fn validate(&self, inputs: &Inputs) -> Result<()> {
        self.selected_token(inputs)?;

        let amount = inputs.amount.unwrap_or_default();
        let amount_ok = match self.direction {
            Direction::OffRamp => is_within_balance(amount, inputs.balance.unwrap_or_default()),
            Direction::OnRamp => amount > Decimal::ZERO,
        };
        if !amount_ok {
            return Err(RampError::Validation(Field::Amount));
        }

        let corridor = self
            .corridors
            .get(&inputs.corridor)
            .ok_or(RampError::Validation(Field::Corridor))?;
        let method = inputs.payout_method.as_deref().unwrap_or_default();
        if corridor.method(method).is_none() {
            return Err(RampError::Validation(Field::PayoutMethod));
        }
        if !self
            .corridors
            .validate_number(&inputs.corridor, &inputs.mobile_number)
        {
            return Err(RampError::Validation(Field::MobileNumber));
        }
        if !is_valid_email(&inputs.email) {
            return Err(RampError::Validation(Field::Email));
        }

        let has_wallet = inputs
            .wallet_address
            .as_deref()
            .is_some_and(|address| !address.trim().is_empty());
        match self.direction {
            Direction::OffRamp if !has_wallet => Err(RampError::Validation(Field::SenderAddress)),
            Direction::OnRamp if !has_wallet => Err(RampError::Validation(Field::RecipientAddress)),
            Direction::OnRamp if inputs.proof_url.as_deref().is_none_or(str::is_empty) => {
                Err(RampError::Validation(Field::ProofOfPayment))
            }
            _ => Ok(()),
        }
    }

    async fn quote(&self, inputs: &Inputs) -> Result<Conversion> {
        let (chain_id, token) = self.selected_token(inputs)?;
        let amount = Amount::new(inputs.amount.unwrap_or_default())?;
        let quote = self.rates.quote_for(&inputs.corridor).await?;
        let token_usd = self.rates.crypto_usd_price(token).await?;

        match self.direction {
            Direction::OffRamp => self.calculator.off_ramp_quote(amount, token_usd, &quote),
            Direction::OnRamp => {
                let native = self
                    .tokens
                    .native_token(chain_id)
                    .ok_or_else(|| RampError::RateUnavailable(format!("gas on chain {chain_id}")))?;
                let gas_price = self.rates.gas_price_wei(chain_id).await?;
                let native_usd = self.rates.crypto_usd_price(native).await?;
                let network_fee = self
                    .calculator
                    .network_fee(gas_price, native_usd, token_usd, token)?;
                self.calculator
                    .on_ramp_quote(amount, &quote, token, token_usd, network_fee)
            }
        }
    }

    fn draft(&self, inputs: Inputs, conversion: &Conversion) -> Result<TransactionDraft> {
        let (chain_id, token) = self.selected_token(&inputs)?;
        let amount = inputs.amount.unwrap_or_default();
        let (token_amount, fiat_amount, sender_address, recipient_address, image_url) =
            match self.direction {
                Direction::OffRamp => (amount, conversion.net, inputs.wallet_address, None, None),
                Direction::OnRamp => (
                    conversion.net,
                    amount,
                    None,
                    inputs.wallet_address,
                    inputs.proof_url,
                ),
            };
        Ok(TransactionDraft {
            direction: self.direction,
            chain_id,
            token,
            token_amount,
            fiat_amount,
            corridor: inputs.corridor,
            payout_method: inputs.payout_method.unwrap_or_default(),
            mobile_number: inputs.mobile_number,
            email: inputs.email,
            sender_address,
            recipient_address,
            image_url,
        })
    }

    /// Moves a validating flow on to `Submitting`; fails if the flow was
    /// reset in the meantime.
    fn begin_submitting(&self, epoch: u64) -> Result<()> {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return Err(RampError::FlowBusy);
        }
        inner.state = FlowState::Submitting;
        Ok(())
    }

    fn apply_status(self: &Arc<Self>, epoch: u64, status: TransactionStatus) {
        let mut inner = self.lock();
        self.apply_status_locked(&mut inner, epoch, status);
    }

    fn apply_status_locked(
        self: &Arc<Self>,
        inner: &mut FlowInner,
        epoch: u64,
        status: TransactionStatus,
    ) {
        if inner.epoch != epoch {
            return;
        }
        let current = {
            let Some(record) = inner.record.as_mut() else {
                return;
            };
            if record.apply_status(status) {
                debug!(status = %record.status, "Flow record updated");
            }
            record.status
        };

        if current.is_terminal() && matches!(inner.state, FlowState::Polling(_)) {
            let outcome = match current {
                TransactionStatus::Confirmed => Outcome::Succeeded,
                _ => Outcome::Failed,
            };
            info!(direction = %self.direction, ?outcome, "Flow reached terminal state");
            inner.state = FlowState::Terminal(outcome);
            self.schedule_reset(inner, epoch);
        }
    }

    fn schedule_reset(self: &Arc<Self>, inner: &mut FlowInner, epoch: u64) {
        if inner.tasks.has_reset() {
            return;
        }
        let shared = Arc::downgrade(self);
        let delay = self.settings.reset_delay;
        inner.tasks.set_reset(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.auto_reset(epoch);
            }
        }));
    }

    fn auto_reset(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.tasks.release_reset();
        inner.tasks.cancel();
        self.restore_defaults(&mut inner);
        self.spawn_rate_refresh(&mut inner, self.settings.default_corridor.clone());
        info!(direction = %self.direction, "Flow reset to idle");
    }

    fn start_polling(self: &Arc<Self>, inner: &mut FlowInner, id: TransactionId) {
        let claim = match self.poller.claim(&id) {
            Ok(claim) => claim,
            Err(err) => {
                warn!(%id, error = %err, "Not starting a second poll loop");
                return;
            }
        };
        let epoch = inner.epoch;
        let direction = self.direction;
        let poller = self.poller.clone();
        let shared = Arc::downgrade(self);
        inner.tasks.set_poll(tokio::spawn(async move {
            poller
                .watch(claim, direction, move |status| {
                    if let Some(shared) = shared.upgrade() {
                        shared.apply_status(epoch, status);
                    }
                })
                .await;
        }));
    }
}

/// Drives one on-ramp or off-ramp from user input to a terminal status.
///
/// Background work (the corridor rate refresh, the status poll loop and the
/// auto-reset timer) runs on spawned tokio tasks owned by the flow; all of
/// it is aborted on [`RampFlowOrchestrator::teardown`] and on drop. Methods
/// that spawn must be called from within a tokio runtime.
pub struct RampFlowOrchestrator {
    shared: Arc<FlowShared>,
}

impl RampFlowOrchestrator {
    pub fn new(direction: Direction, deps: FlowDeps, settings: FlowSettings) -> Self {
        let mut submitter = TransactionSubmitter::new(
            Arc::clone(&deps.backend),
            Arc::clone(&deps.tokens),
            Arc::clone(&deps.corridors),
            settings.treasury_address.clone(),
        );
        if let Some(wallet) = deps.wallet {
            submitter = submitter.with_wallet(wallet);
        }
        let poller = TransactionStatusPoller::new(deps.backend, settings.poll_interval);

        let inputs = Inputs {
            corridor: settings.default_corridor.clone(),
            ..Inputs::default()
        };

        let shared = FlowShared {
            direction,
            settings,
            tokens: deps.tokens,
            corridors: deps.corridors,
            rates: deps.rates,
            calculator: deps.calculator,
            submitter,
            poller,
            inner: Mutex::new(FlowInner {
                state: FlowState::Idle,
                inputs,
                record: None,
                last_error: None,
                epoch: 0,
                tasks: FlowTasks::new(),
                rate_task: None,
            }),
        };
        let method = shared.default_method(&shared.settings.default_corridor);
        shared.lock().inputs.payout_method = method;
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn on_ramp(deps: FlowDeps, settings: FlowSettings) -> Self {
        Self::new(Direction::OnRamp, deps, settings)
    }

    pub fn off_ramp(deps: FlowDeps, settings: FlowSettings) -> Self {
        Self::new(Direction::OffRamp, deps, settings)
    }

    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    /// Switches network and re-validates the token selection; returns the
    /// token that is selected afterwards, `None` if the chain is unknown.
    pub fn set_chain(&self, chain_id: ChainId) -> Option<TokenSymbol> {
        let mut inner = self.shared.lock();
        let token = self
            .shared
            .tokens
            .reconcile_selection(chain_id, inner.inputs.token);
        if token != inner.inputs.token {
            debug!(%chain_id, ?token, "Token selection reset after chain switch");
        }
        inner.inputs.chain_id = Some(chain_id);
        inner.inputs.token = token;
        token
    }

    pub fn select_token(&self, token: TokenSymbol) -> Result<()> {
        let mut inner = self.shared.lock();
        let chain_id = inner
            .inputs
            .chain_id
            .ok_or(RampError::Validation(Field::Token))?;
        if !self.shared.tokens.is_supported(chain_id, token) {
            return Err(RampError::UnsupportedTokenOnChain { token, chain_id });
        }
        inner.inputs.token = Some(token);
        Ok(())
    }

    /// Activates `code`: resets the payout method to the corridor's first,
    /// clears the mobile number and refreshes the rate in the background,
    /// aborting a refresh still running for the previous corridor.
    pub fn select_corridor(&self, code: &str) -> Result<()> {
        let corridor = self
            .shared
            .corridors
            .get(code)
            .ok_or(RampError::Validation(Field::Corridor))?;

        let mut inner = self.shared.lock();
        inner.inputs.corridor = corridor.code.clone();
        inner.inputs.payout_method = corridor.default_method().map(|method| method.id.clone());
        inner.inputs.mobile_number.clear();

        self.shared.spawn_rate_refresh(&mut inner, corridor.code.clone());
        Ok(())
    }

    pub fn select_payout_method(&self, id: &str) -> Result<()> {
        let mut inner = self.shared.lock();
        let known = self
            .shared
            .corridors
            .get(&inner.inputs.corridor)
            .is_some_and(|corridor| corridor.method(id).is_some());
        if !known {
            return Err(RampError::Validation(Field::PayoutMethod));
        }
        inner.inputs.payout_method = Some(id.to_string());
        Ok(())
    }

    pub fn set_mobile_number(&self, raw: &str) {
        self.shared.lock().inputs.mobile_number = raw.to_string();
    }

    pub fn set_email(&self, email: &str) {
        self.shared.lock().inputs.email = email.trim().to_string();
    }

    pub fn set_amount(&self, amount: Decimal) {
        self.shared.lock().inputs.amount = Some(amount);
    }

    pub fn set_available_balance(&self, balance: Decimal) {
        self.shared.lock().inputs.balance = Some(balance);
    }

    pub fn set_proof_url(&self, url: &str) {
        self.shared.lock().inputs.proof_url = Some(url.to_string());
    }

    pub fn set_wallet_address(&self, address: &str) {
        self.shared.lock().inputs.wallet_address = Some(address.to_string());
    }

    /// Fills the amount with `percentage` of the available balance and
    /// returns it as displayed.
    pub fn apply_percentage(&self, percentage: Decimal) -> Option<String> {
        let mut inner = self.shared.lock();
        let token = inner.inputs.token?;
        let display = quick_amount(inner.inputs.balance.unwrap_or_default(), percentage, token)?;
        inner.inputs.amount = display.parse().ok();
        Some(display)
    }

    /// Refreshes the rate of the active corridor in the foreground.
    pub async fn refresh_rate(&self) -> Result<Option<RateQuote>> {
        let corridor = self.shared.lock().inputs.corridor.clone();
        self.shared.rates.refresh(&corridor).await
    }

    /// Itemized conversion of the entered amount at the current rate.
    pub async fn quote(&self) -> Result<Conversion> {
        let inputs = self.shared.lock().inputs.clone();
        self.shared.quote(&inputs).await
    }

    pub fn validate(&self) -> Result<()> {
        let inner = self.shared.lock();
        self.shared.validate(&inner.inputs)
    }

    /// Whether `submit` would get past local validation right now.
    pub fn can_submit(&self) -> bool {
        let inner = self.shared.lock();
        inner.state == FlowState::Idle && self.shared.validate(&inner.inputs).is_ok()
    }

    /// Validates, prices and submits the flow, then starts polling.
    ///
    /// Any failure returns the flow to `Idle` with the inputs intact so the
    /// user can resubmit.
    pub async fn submit(&self) -> Result<TransactionId> {
        let shared = &self.shared;
        let (epoch, inputs) = {
            let mut inner = shared.lock();
            if inner.state != FlowState::Idle {
                return Err(RampError::FlowBusy);
            }
            inner.state = FlowState::Validating;
            inner.last_error = None;
            if let Err(err) = shared.validate(&inner.inputs) {
                inner.state = FlowState::Idle;
                return Err(err);
            }
            (inner.epoch, inner.inputs.clone())
        };

        let submitted = async {
            let conversion = shared.quote(&inputs).await?;
            let draft = shared.draft(inputs, &conversion)?;
            shared.begin_submitting(epoch)?;
            let record = shared.submitter.submit(draft).await?;
            let id = record.id.clone().ok_or_else(|| {
                RampError::Network("backend response carried no transaction id".to_string())
            })?;
            Ok::<_, RampError>((id, record))
        }
        .await;

        let mut inner = shared.lock();
        let (id, record) = match submitted {
            Ok(submitted) => submitted,
            Err(err) => {
                if inner.epoch == epoch {
                    inner.state = FlowState::Idle;
                    inner.last_error = Some(err.user_message());
                }
                warn!(direction = %shared.direction, error = %err, "Submission failed");
                return Err(err);
            }
        };
        if inner.epoch != epoch {
            info!(%id, "Flow was reset while submitting; not polling");
            return Ok(id);
        }

        let status = record.status;
        inner.record = Some(record);
        inner.state = FlowState::Polling(id.clone());
        if status.is_terminal() {
            shared.apply_status_locked(&mut inner, epoch, status);
        } else {
            shared.start_polling(&mut inner, id.clone());
        }
        Ok(id)
    }

    /// Fetches the status once, outside the schedule; `None` when nothing
    /// has been submitted. Repeating this after a terminal status changes
    /// nothing.
    pub async fn poll_now(&self) -> Result<Option<TransactionStatus>> {
        let (epoch, id) = {
            let inner = self.shared.lock();
            let id = inner.record.as_ref().and_then(|record| record.id.clone());
            (inner.epoch, id)
        };
        let Some(id) = id else {
            return Ok(None);
        };
        let status = self.shared.poller.poll_once(self.shared.direction, &id).await?;
        self.shared.apply_status(epoch, status);
        Ok(Some(self.record().map_or(status, |record| record.status)))
    }

    /// Restarts the flow: cancels polling and the reset timer, clears the
    /// user's entries and restores the default corridor, payout method and
    /// token.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        inner.tasks.cancel();
        self.shared.restore_defaults(&mut inner);
        self.shared
            .spawn_rate_refresh(&mut inner, self.shared.settings.default_corridor.clone());
    }

    /// Cancels every task the flow owns, including a pending rate refresh.
    pub fn teardown(&self) {
        let mut inner = self.shared.lock();
        inner.tasks.cancel();
        if let Some(rate_task) = inner.rate_task.take() {
            rate_task.abort();
        }
        self.shared.restore_defaults(&mut inner);
    }

    pub fn state(&self) -> FlowState {
        self.shared.lock().state.clone()
    }

    pub fn record(&self) -> Option<TransactionRecord> {
        self.shared.lock().record.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.shared.lock().inputs.chain_id
    }

    pub fn token(&self) -> Option<TokenSymbol> {
        self.shared.lock().inputs.token
    }

    pub fn corridor(&self) -> String {
        self.shared.lock().inputs.corridor.clone()
    }

    pub fn payout_method(&self) -> Option<String> {
        self.shared.lock().inputs.payout_method.clone()
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.shared.lock().inputs.amount
    }

    pub fn mobile_number(&self) -> String {
        self.shared.lock().inputs.mobile_number.clone()
    }

    /// The entered number grouped for display in the active corridor.
    pub fn formatted_mobile_number(&self) -> String {
        let inner = self.shared.lock();
        self.shared
            .corridors
            .format_number(&inner.inputs.corridor, &inner.inputs.mobile_number)
    }

    pub fn email(&self) -> String {
        self.shared.lock().inputs.email.clone()
    }

    pub fn proof_url(&self) -> Option<String> {
        self.shared.lock().inputs.proof_url.clone()
    }

    /// Whether a poll loop or reset timer is still scheduled.
    pub fn has_scheduled_tasks(&self) -> bool {
        !self.shared.lock().tasks.is_empty()
    }
}

impl Drop for RampFlowOrchestrator {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.tasks.cancel();
        if let Some(rate_task) = inner.rate_task.take() {
            rate_task.abort();
        }
    }
}
