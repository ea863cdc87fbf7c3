//! Authoritative gold balances and their one-way replication
//!
//! The server's [`ResourceLedger`] is the single source of truth. Each
//! account sits behind its own mutex so a check-and-debit, or a whole
//! placement pipeline run through [`ResourceLedger::with_account`], is one
//! critical section per connection while other connections proceed in
//! parallel.
//!
//! Every change mints a [`BalanceUpdate`] for the owning client. Only this
//! module can construct one, and a [`BalanceReplica`] can only be written by
//! applying one, which keeps client code from editing its copy of the value.

use crate::error::{AuthorityError, Result};
use crate::events::{Listeners, SubscriptionId};
use crate::ConnectionId;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Server,
    Client,
}

/// Replicated balance value pushed from the server to the owning client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    gold: u32,
}

impl BalanceUpdate {
    fn new(gold: u32) -> Self {
        Self { gold }
    }

    pub fn gold(&self) -> u32 {
        self.gold
    }
}

/// Delivery channel for balance pushes, addressed to one connection
pub trait BalanceSink: Send + Sync {
    fn push_balance(&self, owner: ConnectionId, update: BalanceUpdate);
}

/// Exclusive access to one account for the duration of a
/// [`ResourceLedger::with_account`] call
#[derive(Debug)]
pub struct Account<'a> {
    connection: ConnectionId,
    gold: &'a mut u32,
}

impl Account<'_> {
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn balance(&self) -> u32 {
        *self.gold
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        *self.gold >= cost
    }

    /// Subtracts `cost`, or fails leaving the balance untouched
    pub fn debit(&mut self, cost: u32) -> Result<u32> {
        let remaining = self
            .gold
            .checked_sub(cost)
            .ok_or(AuthorityError::InsufficientFunds {
                needed: cost,
                available: *self.gold,
            })?;
        *self.gold = remaining;
        Ok(remaining)
    }

    pub fn credit(&mut self, amount: u32) -> u32 {
        *self.gold = self.gold.saturating_add(amount);
        *self.gold
    }

    pub fn set(&mut self, gold: u32) {
        *self.gold = gold;
    }
}

pub struct ResourceLedger {
    authority: Authority,
    accounts: RwLock<HashMap<ConnectionId, Arc<Mutex<u32>>>>,
    sink: Arc<dyn BalanceSink>,
}

impl ResourceLedger {
    pub fn new(authority: Authority, sink: Arc<dyn BalanceSink>) -> Self {
        Self {
            authority,
            accounts: RwLock::new(HashMap::new()),
            sink,
        }
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Creates the account of a joining connection and pushes its opening balance
    pub fn open_account(&self, connection: ConnectionId, gold: u32) -> Result<()> {
        self.require_server("open_account")?;
        let account = Arc::new(Mutex::new(gold));
        {
            let held = account.lock().unwrap_or_else(PoisonError::into_inner);
            self.accounts
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(connection, Arc::clone(&account));
            self.sink.push_balance(connection, BalanceUpdate::new(*held));
        }
        debug!("Opened account for connection {} with {} gold", connection, gold);
        Ok(())
    }

    /// Removes a leaving connection's account, returning its final balance
    pub fn close_account(&self, connection: ConnectionId) -> Option<u32> {
        let account = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection)?;
        let gold = *account.lock().unwrap_or_else(PoisonError::into_inner);
        Some(gold)
    }

    pub fn has_account(&self, connection: ConnectionId) -> bool {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&connection)
    }

    pub fn balance(&self, connection: ConnectionId) -> Result<u32> {
        let account = self.account(connection)?;
        let gold = *account.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(gold)
    }

    pub fn can_afford(&self, connection: ConnectionId, cost: u32) -> Result<bool> {
        Ok(self.balance(connection)? >= cost)
    }

    pub fn set_balance(&self, connection: ConnectionId, gold: u32) -> Result<()> {
        self.require_server("set_balance")?;
        self.with_account(connection, |account| {
            account.set(gold);
            Ok(())
        })
    }

    pub fn debit(&self, connection: ConnectionId, cost: u32) -> Result<u32> {
        self.require_server("debit")?;
        self.with_account(connection, |account| account.debit(cost))
    }

    pub fn credit(&self, connection: ConnectionId, amount: u32) -> Result<u32> {
        self.require_server("credit")?;
        self.with_account(connection, |account| Ok(account.credit(amount)))
    }

    /// Pushes the current balance again without changing it.
    ///
    /// For a client whose replica was reset after earlier pushes went out.
    pub fn republish(&self, connection: ConnectionId) -> Result<u32> {
        self.require_server("republish")?;
        let account = self.account(connection)?;
        let gold = account.lock().unwrap_or_else(PoisonError::into_inner);
        self.sink.push_balance(connection, BalanceUpdate::new(*gold));
        Ok(*gold)
    }

    /// Runs `f` with exclusive access to one account.
    ///
    /// Concurrent calls for the same connection are serialized; calls for
    /// other connections are not blocked. If the closure changed the
    /// balance, the new value is pushed to the owning client before the
    /// account is released, so pushes arrive in commit order.
    pub fn with_account<T, F>(&self, connection: ConnectionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Account<'_>) -> Result<T>,
    {
        self.require_server("with_account")?;
        let account = self.account(connection)?;
        let mut gold = account.lock().unwrap_or_else(PoisonError::into_inner);
        let before = *gold;

        let result = {
            let mut handle = Account {
                connection,
                gold: &mut *gold,
            };
            f(&mut handle)
        };

        if *gold != before {
            trace!(
                "Connection {} balance {} -> {}",
                connection,
                before,
                *gold
            );
            self.sink.push_balance(connection, BalanceUpdate::new(*gold));
        }
        result
    }

    fn account(&self, connection: ConnectionId) -> Result<Arc<Mutex<u32>>> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection)
            .cloned()
            .ok_or(AuthorityError::StaleConnection(connection))
    }

    fn require_server(&self, operation: &'static str) -> Result<()> {
        match self.authority {
            Authority::Server => Ok(()),
            Authority::Client => Err(AuthorityError::PermissionDenied { operation }),
        }
    }
}

/// Local notification raised when a replicated balance changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChanged {
    pub old: u32,
    pub new: u32,
}

/// Client-side, read-only copy of the owning connection's balance
#[derive(Debug, Default)]
pub struct BalanceReplica {
    gold: u32,
    listeners: Listeners<BalanceChanged>,
}

impl BalanceReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gold(&self) -> u32 {
        self.gold
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.gold >= cost
    }

    /// Applies a pushed update, notifying subscribers if the value changed
    pub fn apply(&mut self, update: BalanceUpdate) -> Option<BalanceChanged> {
        if update.gold == self.gold {
            return None;
        }
        let change = BalanceChanged {
            old: self.gold,
            new: update.gold,
        };
        self.gold = update.gold;
        self.listeners.emit(&change);
        Some(change)
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&BalanceChanged) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn clear_subscribers(&mut self) {
        self.listeners.clear();
    }
}

/// Collects pushed balance updates in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    pushed: Mutex<Vec<(ConnectionId, BalanceUpdate)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(ConnectionId, BalanceUpdate)> {
        std::mem::take(&mut *self.pushed.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl BalanceSink for RecordingSink {
    fn push_balance(&self, owner: ConnectionId, update: BalanceUpdate) {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((owner, update));
    }
}
