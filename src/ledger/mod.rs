use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use rand::{rngs::OsRng, RngCore};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{
    address::Address,
    amount::Amount,
    card::{CardRecord, CardRequest, CardType},
    config::{GrantPolicy, PricingConfig},
    error::LedgerError,
    permit::Permit,
};

mod call;

pub use call::{CallOutcome, CardReceipt, LedgerCall, MintReceipt};

/// Identity of one ledger instance, fixed at `initialize`. Permits are signed
/// over it so they only redeem on the ledger they were issued for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerId([u8; 32]);

impl LedgerId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// `sha256(tag || deployer || salt)`.
    pub fn derive(deployer: &Address, salt: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"business-card/ledger/v1");
        hasher.update(deployer.as_bytes());
        hasher.update(salt);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for LedgerId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for LedgerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LedgerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

// Externally tagged: serde buffers internally tagged enums in a form that cannot hold u128.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    Initialized {
        deployer: Address,
        ledger_id: LedgerId,
        pricing: PricingConfig,
    },
    AuthorityGranted {
        grantor: Address,
        holder: Address,
        credits: u64,
        payment: Amount,
        first_mint: bool,
    },
    CardCreated {
        minter: Address,
        recipient: Address,
        name: String,
        phone: String,
        card_type: CardType,
        index: usize,
    },
    Staked {
        account: Address,
        amount: Amount,
        total: Amount,
    },
    PermitRedeemed {
        relayer: Address,
        grantor: Address,
        holder: Address,
        credits: u64,
        nonce: u64,
        payment: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub height: u64,
    pub events: usize,
    pub state_root: [u8; 32],
}

/// The business card ledger.
///
/// Every state-changing call checks all of its preconditions before touching
/// any field, so an `Err` always leaves the ledger exactly as it was. Each
/// accepted call appends one event and advances `height` by one.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ledger {
    height: u64,
    ledger_id: LedgerId,
    pricing: Option<PricingConfig>,
    grants: GrantPolicy,
    first_minted: BTreeSet<Address>,
    /// grantor -> holder -> credits; zero balances are not stored.
    authorities: BTreeMap<Address, BTreeMap<Address, u64>>,
    cards: BTreeMap<Address, Vec<CardRecord>>,
    stakes: BTreeMap<Address, Amount>,
    permit_nonces: BTreeMap<Address, u64>,
    treasury: Amount,
    events: Vec<LedgerEvent>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grants(grants: GrantPolicy) -> Result<Self, LedgerError> {
        grants.validate()?;
        Ok(Self {
            grants,
            ..Self::default()
        })
    }

    //==================== state-changing calls ====================//

    /// Initializes with a fresh random ledger id.
    pub fn initialize(
        &mut self,
        deployer: &Address,
        pricing: PricingConfig,
    ) -> Result<(), LedgerError> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        self.initialize_with_id(deployer, pricing, LedgerId::derive(deployer, &salt))
    }

    pub fn initialize_with_id(
        &mut self,
        deployer: &Address,
        pricing: PricingConfig,
        ledger_id: LedgerId,
    ) -> Result<(), LedgerError> {
        if self.pricing.is_some() {
            debug!(%deployer, "initialize rejected: already initialized");
            return Err(LedgerError::AlreadyInitialized);
        }
        pricing.validate()?;
        self.pricing = Some(pricing);
        self.ledger_id = ledger_id;
        info!(
            %deployer,
            %ledger_id,
            first_mint_price = pricing.first_mint_price,
            mint_price = pricing.mint_price,
            stake_price = pricing.stake_price,
            "ledger initialized"
        );
        self.commit(LedgerEvent::Initialized {
            deployer: *deployer,
            ledger_id,
            pricing,
        });
        Ok(())
    }

    /// Buys authority credits. The first accepted mint of an account is priced
    /// at the first-mint tier and always credits the caller itself, so a
    /// beneficiary other than the caller is rejected there. Later mints may
    /// credit `beneficiary` as a delegation from the caller.
    pub fn mint(
        &mut self,
        caller: &Address,
        payment: Amount,
        beneficiary: Option<&Address>,
    ) -> Result<MintReceipt, LedgerError> {
        let pricing = self.require_pricing()?;
        ensure_caller(caller)?;
        if beneficiary.is_some_and(Address::is_zero) {
            return Err(LedgerError::InvalidInput("beneficiary"));
        }

        let first_mint = !self.first_minted.contains(caller);
        if first_mint && beneficiary.is_some_and(|b| b != caller) {
            debug!(%caller, "mint rejected: beneficiary on first mint");
            return Err(LedgerError::InvalidInput("beneficiary"));
        }
        let (required, credits, holder) = if first_mint {
            (pricing.first_mint_price, self.grants.first_mint_credits, *caller)
        } else {
            (
                pricing.mint_price,
                self.grants.mint_credits,
                beneficiary.copied().unwrap_or(*caller),
            )
        };
        if payment < required {
            debug!(%caller, payment, required, first_mint, "mint rejected: payment below tier");
            return Err(LedgerError::InvalidPaymentAmount {
                required,
                paid: payment,
            });
        }
        let treasury = self
            .treasury
            .checked_add(payment)
            .ok_or(LedgerError::Overflow("treasury"))?;
        let balance = self
            .mintable_authorities(caller, &holder)
            .checked_add(credits)
            .ok_or(LedgerError::Overflow("authority balance"))?;

        self.treasury = treasury;
        if first_mint {
            self.first_minted.insert(*caller);
        }
        self.set_authority(caller, &holder, balance);
        info!(grantor = %caller, %holder, credits, balance, first_mint, "authority granted");
        self.commit(LedgerEvent::AuthorityGranted {
            grantor: *caller,
            holder,
            credits,
            payment,
            first_mint,
        });
        Ok(MintReceipt {
            grantor: *caller,
            holder,
            credits,
            balance,
            first_mint,
        })
    }

    /// Spends one authority credit and stores a card under its recipient.
    pub fn create_card(
        &mut self,
        caller: &Address,
        request: CardRequest,
    ) -> Result<CardReceipt, LedgerError> {
        self.require_pricing()?;
        ensure_caller(caller)?;
        request.validate()?;
        let grantor = self.resolve_grantor(caller, request.grantor.as_ref())?;

        let remaining = self.mintable_authorities(&grantor, caller) - 1;
        let card_type = CardType::resolve(&grantor, caller);
        let recipient = request.recipient;
        let record = CardRecord::from_request(request, *caller, card_type);
        let (name, phone) = (record.name.clone(), record.phone.clone());

        self.set_authority(&grantor, caller, remaining);
        let cards = self.cards.entry(recipient).or_default();
        let index = cards.len();
        cards.push(record);
        info!(minter = %caller, %recipient, %grantor, index, company = card_type.is_company(), "card created");
        self.commit(LedgerEvent::CardCreated {
            minter: *caller,
            recipient,
            name,
            phone,
            card_type,
            index,
        });
        Ok(CardReceipt {
            owner: recipient,
            index,
            card_type,
            remaining,
        })
    }

    /// Posts collateral; returns the caller's new stake balance.
    pub fn stake(&mut self, caller: &Address, payment: Amount) -> Result<Amount, LedgerError> {
        let pricing = self.require_pricing()?;
        ensure_caller(caller)?;
        if payment < pricing.stake_price {
            debug!(%caller, payment, required = pricing.stake_price, "stake rejected: payment below price");
            return Err(LedgerError::InvalidPaymentAmount {
                required: pricing.stake_price,
                paid: payment,
            });
        }
        let total = self
            .stake_balance(caller)
            .checked_add(payment)
            .ok_or(LedgerError::Overflow("stake balance"))?;

        self.stakes.insert(*caller, total);
        info!(account = %caller, amount = payment, total, "stake posted");
        self.commit(LedgerEvent::Staked {
            account: *caller,
            amount: payment,
            total,
        });
        Ok(total)
    }

    /// Redeems a grantor-signed permit. The relayer pays the mint price and the
    /// grant lands on `(permit.grantor, permit.holder)`.
    pub fn mint_with_permit(
        &mut self,
        relayer: &Address,
        payment: Amount,
        permit: &Permit,
    ) -> Result<MintReceipt, LedgerError> {
        let pricing = self.require_pricing()?;
        ensure_caller(relayer)?;
        let grantor = permit.grantor();
        let holder = permit.holder();
        if holder.is_zero() || holder == grantor {
            return Err(LedgerError::InvalidInput("holder"));
        }
        if permit.ledger_id() != self.ledger_id {
            debug!(%relayer, %grantor, "permit rejected: signed for another ledger");
            return Err(LedgerError::InvalidPermit("permit was signed for another ledger"));
        }
        permit.verify().map_err(|reason| {
            debug!(%relayer, %grantor, reason, "permit rejected");
            LedgerError::InvalidPermit(reason)
        })?;
        let nonce = self.permit_nonce(&grantor);
        if permit.nonce() != nonce {
            debug!(%grantor, expected = nonce, got = permit.nonce(), "permit rejected: nonce");
            return Err(LedgerError::InvalidPermit("nonce does not match grantor's next nonce"));
        }
        if !self.first_minted(&grantor) {
            return Err(LedgerError::InvalidPermit(
                "grantor has not completed a first mint",
            ));
        }
        if payment < pricing.mint_price {
            return Err(LedgerError::InvalidPaymentAmount {
                required: pricing.mint_price,
                paid: payment,
            });
        }
        let credits = self.grants.mint_credits;
        let treasury = self
            .treasury
            .checked_add(payment)
            .ok_or(LedgerError::Overflow("treasury"))?;
        let balance = self
            .mintable_authorities(&grantor, &holder)
            .checked_add(credits)
            .ok_or(LedgerError::Overflow("authority balance"))?;
        let next_nonce = nonce
            .checked_add(1)
            .ok_or(LedgerError::Overflow("permit nonce"))?;

        self.treasury = treasury;
        self.set_authority(&grantor, &holder, balance);
        self.permit_nonces.insert(grantor, next_nonce);
        info!(%relayer, %grantor, %holder, credits, balance, nonce, "permit redeemed");
        self.commit(LedgerEvent::PermitRedeemed {
            relayer: *relayer,
            grantor,
            holder,
            credits,
            nonce,
            payment,
        });
        Ok(MintReceipt {
            grantor,
            holder,
            credits,
            balance,
            first_mint: false,
        })
    }

    /// Applies one call from the serial log.
    pub fn execute(
        &mut self,
        caller: &Address,
        call: LedgerCall,
    ) -> Result<CallOutcome, LedgerError> {
        debug!(%caller, call = call.name(), height = self.height, "executing call");
        match call {
            LedgerCall::Mint {
                payment,
                beneficiary,
            } => self
                .mint(caller, payment, beneficiary.as_ref())
                .map(CallOutcome::Minted),
            LedgerCall::CreateCard(request) => self
                .create_card(caller, request)
                .map(CallOutcome::CardCreated),
            LedgerCall::Stake { payment } => self
                .stake(caller, payment)
                .map(|total| CallOutcome::Staked { total }),
            LedgerCall::MintWithPermit { payment, permit } => self
                .mint_with_permit(caller, payment, &permit)
                .map(CallOutcome::Minted),
        }
    }

    //==================== queries ====================//

    pub fn is_initialized(&self) -> bool {
        self.pricing.is_some()
    }

    /// Zero until `initialize`.
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn pricing(&self) -> Option<&PricingConfig> {
        self.pricing.as_ref()
    }

    pub fn grants(&self) -> &GrantPolicy {
        &self.grants
    }

    /// Zero until the ledger is initialized.
    pub fn first_mint_price(&self) -> Amount {
        self.pricing.map_or(0, |p| p.first_mint_price)
    }

    pub fn mint_price(&self) -> Amount {
        self.pricing.map_or(0, |p| p.mint_price)
    }

    pub fn stake_price(&self) -> Amount {
        self.pricing.map_or(0, |p| p.stake_price)
    }

    pub fn first_minted(&self, account: &Address) -> bool {
        self.first_minted.contains(account)
    }

    pub fn mintable_authorities(&self, grantor: &Address, holder: &Address) -> u64 {
        self.authorities
            .get(grantor)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Grantors other than `holder` with a positive delegated balance to it.
    pub fn delegated_grantors(&self, holder: &Address) -> Vec<Address> {
        self.authorities
            .iter()
            .filter(|(grantor, holders)| {
                *grantor != holder && holders.get(holder).is_some_and(|c| *c > 0)
            })
            .map(|(grantor, _)| *grantor)
            .collect()
    }

    pub fn card_by_owner(&self, owner: &Address, index: usize) -> Result<&CardRecord, LedgerError> {
        let cards = self.cards_by_owner(owner);
        cards.get(index).ok_or(LedgerError::IndexOutOfRange {
            owner: *owner,
            index,
            len: cards.len(),
        })
    }

    pub fn cards_by_owner(&self, owner: &Address) -> &[CardRecord] {
        self.cards.get(owner).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn card_count(&self, owner: &Address) -> usize {
        self.cards_by_owner(owner).len()
    }

    pub fn stake_balance(&self, account: &Address) -> Amount {
        self.stakes.get(account).copied().unwrap_or(0)
    }

    pub fn permit_nonce(&self, grantor: &Address) -> u64 {
        self.permit_nonces.get(grantor).copied().unwrap_or(0)
    }

    /// Total mint payments retained, overpayment included.
    pub fn treasury(&self) -> Amount {
        self.treasury
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            height: self.height,
            events: self.events.len(),
            state_root: self.state_root(),
        }
    }

    //==================== internals ====================//

    fn require_pricing(&self) -> Result<PricingConfig, LedgerError> {
        self.pricing.ok_or(LedgerError::NotInitialized)
    }

    fn resolve_grantor(
        &self,
        caller: &Address,
        explicit: Option<&Address>,
    ) -> Result<Address, LedgerError> {
        let not_mintable = || {
            debug!(%caller, "create_card rejected: no usable authority");
            LedgerError::NotMintable { caller: *caller }
        };
        if let Some(grantor) = explicit {
            return if self.mintable_authorities(grantor, caller) > 0 {
                Ok(*grantor)
            } else {
                Err(not_mintable())
            };
        }
        if self.mintable_authorities(caller, caller) > 0 {
            return Ok(*caller);
        }
        match self.delegated_grantors(caller).as_slice() {
            [] => Err(not_mintable()),
            [only] => Ok(*only),
            many => Err(LedgerError::AmbiguousGrantor {
                caller: *caller,
                candidates: many.len(),
            }),
        }
    }

    fn set_authority(&mut self, grantor: &Address, holder: &Address, credits: u64) {
        if credits > 0 {
            self.authorities
                .entry(*grantor)
                .or_default()
                .insert(*holder, credits);
            return;
        }
        if let Some(holders) = self.authorities.get_mut(grantor) {
            holders.remove(holder);
            if holders.is_empty() {
                self.authorities.remove(grantor);
            }
        }
    }

    fn commit(&mut self, event: LedgerEvent) {
        self.events.push(event);
        self.height += 1;
    }

    fn state_root(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::new();
        for account in &self.first_minted {
            let mut hasher = Sha256::new();
            hasher.update(b"first");
            hasher.update(account.as_bytes());
            leaves.push(hasher.finalize().into());
        }
        for (grantor, holders) in &self.authorities {
            for (holder, credits) in holders {
                let mut hasher = Sha256::new();
                hasher.update(b"auth");
                hasher.update(grantor.as_bytes());
                hasher.update(holder.as_bytes());
                hasher.update(credits.to_le_bytes());
                leaves.push(hasher.finalize().into());
            }
        }
        for (owner, cards) in &self.cards {
            for (index, card) in cards.iter().enumerate() {
                let mut hasher = Sha256::new();
                hasher.update(b"card");
                hasher.update(owner.as_bytes());
                hasher.update((index as u64).to_le_bytes());
                hasher.update(serde_json::to_vec(card).expect("card encode"));
                leaves.push(hasher.finalize().into());
            }
        }
        for (account, amount) in &self.stakes {
            let mut hasher = Sha256::new();
            hasher.update(b"stake");
            hasher.update(account.as_bytes());
            hasher.update(amount.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        for (grantor, nonce) in &self.permit_nonces {
            let mut hasher = Sha256::new();
            hasher.update(b"nonce");
            hasher.update(grantor.as_bytes());
            hasher.update(nonce.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        build_merkle(leaves)
    }
}

fn ensure_caller(caller: &Address) -> Result<(), LedgerError> {
    if caller.is_zero() {
        return Err(LedgerError::InvalidInput("caller"));
    }
    Ok(())
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"business-card-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
