//! Token shop: catalog, affordability and the purchase flow.
//!
//! Purchases are fire-and-report. The shop asks the ledger to approve the
//! spend, then mints the weapon or buys the skin, then refreshes the cached
//! balance. Whatever happens is turned into a [`Notice`] for the player;
//! nothing is retried and a second purchase is refused while one is still
//! in flight.

use log::{error, info, warn};
use shared::Weapon;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Ledger amounts are whole tokens scaled by 10^18.
pub const TOKEN_DECIMALS: u32 = 18;

/// Every skin costs the same.
pub const SKIN_PRICE: u64 = 20;

pub fn to_base_units(tokens: u64) -> u128 {
    u128::from(tokens) * 10u128.pow(TOKEN_DECIMALS)
}

/// Whole tokens, rounded down.
pub fn to_tokens(base_units: u128) -> u64 {
    (base_units / 10u128.pow(TOKEN_DECIMALS)).min(u128::from(u64::MAX)) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    Skin,
    Weapon,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Skin => f.write_str("Skin"),
            ItemKind::Weapon => f.write_str("Weapon"),
        }
    }
}

/// What a purchase unlocks for the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unlock {
    Color(String),
    Weapon(Weapon),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub kind: ItemKind,
    /// One-based id as listed in the shop.
    pub id: u32,
    pub name: String,
    /// Whole tokens.
    pub price: u64,
    pub unlock: Unlock,
    pub damage: Option<u32>,
    /// Shots per second, for display.
    pub fire_rate: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    /// The default skins followed by every weapon model.
    pub fn standard() -> Self {
        const SKINS: [(&str, &str); 6] = [
            ("Azure", "#4287f5"),
            ("Crimson", "#e63946"),
            ("Emerald", "#2a9d8f"),
            ("Amber", "#f4a261"),
            ("Violet", "#7b2cbf"),
            ("Onyx", "#2b2d42"),
        ];

        let skins = SKINS.iter().enumerate().map(|(index, (name, color))| CatalogItem {
            kind: ItemKind::Skin,
            id: index as u32 + 1,
            name: name.to_string(),
            price: SKIN_PRICE,
            unlock: Unlock::Color(color.to_string()),
            damage: None,
            fire_rate: None,
        });

        let weapons = Weapon::ALL.iter().enumerate().map(|(index, weapon)| {
            let (price, damage, fire_rate) = weapon_listing(*weapon);
            CatalogItem {
                kind: ItemKind::Weapon,
                id: index as u32 + 1,
                name: weapon.to_string(),
                price,
                unlock: Unlock::Weapon(*weapon),
                damage: Some(damage),
                fire_rate: Some(fire_rate),
            }
        });

        Self {
            items: skins.chain(weapons).collect(),
        }
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn get(&self, kind: ItemKind, id: u32) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.kind == kind && item.id == id)
    }

    pub fn of_kind(&self, kind: ItemKind) -> impl Iterator<Item = &CatalogItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Price (tokens), damage and shots per second of a weapon listing.
fn weapon_listing(weapon: Weapon) -> (u64, u32, f32) {
    match weapon {
        Weapon::Knife1 => (10, 50, 1.5),
        Weapon::Knife2 => (15, 55, 1.5),
        Weapon::Shovel => (15, 60, 1.0),
        Weapon::Pistol => (25, 10, 2.6),
        Weapon::RevolverSmall => (35, 20, 2.0),
        Weapon::Revolver => (45, 30, 1.5),
        Weapon::Smg => (60, 8, 8.0),
        Weapon::Shotgun => (70, 45, 1.0),
        Weapon::Ak => (90, 15, 6.0),
        Weapon::Sniper => (110, 70, 0.6),
        Weapon::Sniper2 => (130, 80, 0.5),
        Weapon::ShortCannon => (150, 60, 0.8),
        Weapon::GrenadeLauncher => (180, 75, 0.5),
        Weapon::RocketLauncher => (220, 90, 0.4),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("allowance {allowed} is below {needed}")]
    InsufficientAllowance { needed: u128, allowed: u128 },
    #[error("balance {available} is below {needed}")]
    InsufficientFunds { needed: u128, available: u128 },
    #[error("item {0} already owned")]
    AlreadyOwned(u32),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Items the player holds on the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    /// Zero-based skin indices.
    pub skins: BTreeSet<u32>,
    /// Minted count per weapon id.
    pub weapons: BTreeMap<u32, u32>,
}

impl Ownership {
    /// How many of `item` the player holds; skins are 0 or 1.
    pub fn count(&self, item: &CatalogItem) -> u32 {
        match item.kind {
            ItemKind::Skin => u32::from(item.id > 0 && self.skins.contains(&(item.id - 1))),
            ItemKind::Weapon => self.weapons.get(&item.id).copied().unwrap_or(0),
        }
    }
}

/// External token ledger. Amounts are in base units.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    async fn approve(&self, spender: &str, amount: u128) -> Result<(), LedgerError>;
    async fn mint_item(&self, id: u32, amount: u128) -> Result<(), LedgerError>;
    /// `index` is zero-based.
    async fn buy_item(&self, index: u32) -> Result<(), LedgerError>;
    async fn balance(&self) -> Result<u128, LedgerError>;
    async fn owned(&self) -> Result<Ownership, LedgerError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShopError {
    #[error("another purchase is in progress")]
    Busy,
    #[error("no {0} with id {1}")]
    UnknownItem(ItemKind, u32),
    #[error("cannot afford {name} ({price} tokens)")]
    CannotAfford { name: String, price: u64 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Message shown to the player after a shop action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

impl Notice {
    pub fn for_purchase(result: &Result<CatalogItem, ShopError>) -> Self {
        match result {
            Ok(item) => Notice::Success(format!("{} purchased successfully!", item.kind)),
            Err(ShopError::Busy) => Notice::Error("Another purchase is still processing.".to_string()),
            Err(ShopError::CannotAfford { .. }) => Notice::Error("Insufficient funds.".to_string()),
            Err(ShopError::UnknownItem(..)) => Notice::Error("That item is not for sale.".to_string()),
            Err(ShopError::Ledger(_)) => Notice::Error("Transaction failed. Please try again.".to_string()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Notice::Success(text) | Notice::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

/// Clears the in-flight flag however the purchase ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Shop<L: Ledger> {
    ledger: L,
    spender: String,
    catalog: Catalog,
    balance: Mutex<u128>,
    owned: Mutex<Ownership>,
    in_flight: AtomicBool,
}

impl<L: Ledger> Shop<L> {
    /// `spender` is the platform account the ledger approves spends for.
    pub fn new(ledger: L, spender: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            ledger,
            spender: spender.into(),
            catalog,
            balance: Mutex::new(0),
            owned: Mutex::new(Ownership::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Last balance read from the ledger, in base units.
    pub fn balance(&self) -> u128 {
        *self.balance.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn can_afford(&self, price: u64) -> bool {
        self.balance() >= to_base_units(price)
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn refresh_balance(&self) -> Result<u128, LedgerError> {
        let balance = self.ledger.balance().await?;
        *self.balance.lock().unwrap_or_else(|e| e.into_inner()) = balance;
        Ok(balance)
    }

    /// Last ownership read from the ledger.
    pub fn owned(&self) -> Ownership {
        self.owned.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn refresh_owned(&self) -> Result<Ownership, LedgerError> {
        let owned = self.ledger.owned().await?;
        *self.owned.lock().unwrap_or_else(|e| e.into_inner()) = owned.clone();
        Ok(owned)
    }

    /// Buys one catalog item.
    pub async fn purchase(&self, kind: ItemKind, id: u32) -> Result<CatalogItem, ShopError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(ShopError::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        let item = self
            .catalog
            .get(kind, id)
            .cloned()
            .ok_or(ShopError::UnknownItem(kind, id))?;
        if !self.can_afford(item.price) {
            return Err(ShopError::CannotAfford {
                name: item.name,
                price: item.price,
            });
        }

        info!("Processing purchase of {} '{}' for {} tokens", kind, item.name, item.price);
        let amount = to_base_units(item.price);

        if let Err(e) = self.execute(&item, amount).await {
            error!("Purchase of {} '{}' failed: {}", kind, item.name, e);
            return Err(e.into());
        }

        if let Err(e) = self.refresh_balance().await {
            warn!("Could not refresh balance after purchase: {}", e);
        }
        if let Err(e) = self.refresh_owned().await {
            warn!("Could not refresh owned items after purchase: {}", e);
        }
        Ok(item)
    }

    async fn execute(&self, item: &CatalogItem, amount: u128) -> Result<(), LedgerError> {
        self.ledger.approve(&self.spender, amount).await?;
        match item.kind {
            ItemKind::Weapon => self.ledger.mint_item(item.id, amount).await,
            ItemKind::Skin => self.ledger.buy_item(item.id - 1).await,
        }
    }
}

#[derive(Debug, Default)]
struct Wallet {
    balance: u128,
    allowance: u128,
    weapons: BTreeMap<u32, u32>,
    skins: BTreeSet<u32>,
}

/// Ledger kept in memory, for offline play and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    wallet: Mutex<Wallet>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    pub fn with_balance(tokens: u64) -> Self {
        Self {
            wallet: Mutex::new(Wallet {
                balance: to_base_units(tokens),
                ..Wallet::default()
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// While offline every call fails with [`LedgerError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn weapon_count(&self, id: u32) -> u32 {
        self.wallet().weapons.get(&id).copied().unwrap_or(0)
    }

    pub fn owns_skin(&self, index: u32) -> bool {
        self.wallet().skins.contains(&index)
    }

    fn wallet(&self) -> std::sync::MutexGuard<'_, Wallet> {
        self.wallet.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::Acquire) {
            Err(LedgerError::Unavailable("ledger offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn spend(wallet: &mut Wallet, amount: u128) -> Result<(), LedgerError> {
        if wallet.allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                needed: amount,
                allowed: wallet.allowance,
            });
        }
        if wallet.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available: wallet.balance,
            });
        }
        wallet.allowance -= amount;
        wallet.balance -= amount;
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    async fn approve(&self, _spender: &str, amount: u128) -> Result<(), LedgerError> {
        self.check_online()?;
        self.wallet().allowance = amount;
        Ok(())
    }

    async fn mint_item(&self, id: u32, amount: u128) -> Result<(), LedgerError> {
        self.check_online()?;
        let mut wallet = self.wallet();
        Self::spend(&mut wallet, amount)?;
        *wallet.weapons.entry(id).or_insert(0) += 1;
        Ok(())
    }

    async fn buy_item(&self, index: u32) -> Result<(), LedgerError> {
        self.check_online()?;
        let mut wallet = self.wallet();
        if wallet.skins.contains(&index) {
            return Err(LedgerError::AlreadyOwned(index));
        }
        Self::spend(&mut wallet, to_base_units(SKIN_PRICE))?;
        wallet.skins.insert(index);
        Ok(())
    }

    async fn balance(&self) -> Result<u128, LedgerError> {
        self.check_online()?;
        Ok(self.wallet().balance)
    }

    async fn owned(&self) -> Result<Ownership, LedgerError> {
        self.check_online()?;
        let wallet = self.wallet();
        Ok(Ownership {
            skins: wallet.skins.clone(),
            weapons: wallet.weapons.clone(),
        })
    }
}
