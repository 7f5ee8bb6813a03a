//! Per-account nonce and block-context bookkeeping.
//!
//! One manager exists per host context (not per call site). It reserves
//! strictly increasing, gap-free nonce runs for transaction batches,
//! coalesces concurrent chain refreshes into a single shared fetch, and
//! reconciles with the chain after broadcast. Two guards protect commits:
//! a monotonic fetch id (a later forced fetch can never be overwritten by an
//! earlier slow one) and a user-identity counter (fetches started before an
//! account switch are dropped on arrival).

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::config::{
    now_ms, BLOCK_TTL_MS, NONCE_TTL_MS, PREFETCH_DEBOUNCE_MS, STALE_WARNING_MS,
};
use crate::errors::{WalletError, WalletResult};
use crate::rpc::{AccessKeyQueryError, NearRpcProvider};

/// Chain context handed to confirmation flows and the signer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub near_public_key_str: String,
    /// On-chain access key nonce at the last refresh
    pub access_key_nonce: String,
    pub next_nonce: String,
    pub tx_block_height: String,
    pub tx_block_hash: String,
    pub last_nonce_update_ms: f64,
    pub last_block_height_update_ms: f64,
}

/// What one chain refresh observed; committed under the two guards.
#[derive(Debug, Clone)]
struct FetchedChainContext {
    fetch_id: u64,
    identity: u64,
    access_key_nonce: u64,
    block_height: u64,
    block_hash: String,
}

type SharedFetch = Shared<LocalBoxFuture<'static, Result<FetchedChainContext, WalletError>>>;

pub struct NonceManager {
    account_id: Option<String>,
    near_public_key: Option<String>,
    /// Bumped by initialize_user; in-flight fetches carry the value they
    /// started under and are discarded on mismatch.
    identity: u64,
    chain_nonce: Option<u64>,
    next_nonce: u64,
    last_reserved: Option<u64>,
    reservations: BTreeSet<u64>,
    block_height: Option<u64>,
    block_hash: Option<String>,
    last_nonce_update_ms: f64,
    last_block_update_ms: f64,
    last_prefetch_ms: f64,
    next_fetch_id: u64,
    last_committed_fetch_id: u64,
    inflight: Option<(u64, SharedFetch)>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self {
            account_id: None,
            near_public_key: None,
            identity: 0,
            chain_nonce: None,
            next_nonce: 1,
            last_reserved: None,
            reservations: BTreeSet::new(),
            block_height: None,
            block_hash: None,
            last_nonce_update_ms: 0.0,
            last_block_update_ms: 0.0,
            last_prefetch_ms: 0.0,
            next_fetch_id: 0,
            last_committed_fetch_id: 0,
            inflight: None,
        }
    }

    /// Bind the manager to a user, clearing all prior context. Fetches begun
    /// under the previous user are discarded when they complete.
    pub fn initialize_user(&mut self, account_id: &str, near_public_key: &str) {
        debug!("NonceManager: initializing for {}", account_id);
        self.account_id = Some(account_id.to_string());
        self.near_public_key = Some(near_public_key.to_string());
        self.identity += 1;
        self.chain_nonce = None;
        self.next_nonce = 1;
        self.last_reserved = None;
        self.reservations.clear();
        self.block_height = None;
        self.block_hash = None;
        self.last_nonce_update_ms = 0.0;
        self.last_block_update_ms = 0.0;
        self.inflight = None;
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn identity(&self) -> u64 {
        self.identity
    }

    pub fn reserved_nonces(&self) -> Vec<u64> {
        self.reservations.iter().copied().collect()
    }

    fn is_nonce_fresh(&self, now: f64) -> bool {
        self.chain_nonce.is_some() && now - self.last_nonce_update_ms < NONCE_TTL_MS
    }

    fn is_block_fresh(&self, now: f64) -> bool {
        self.block_hash.is_some() && now - self.last_block_update_ms < BLOCK_TTL_MS
    }

    fn context_from_state(&self, now: f64) -> WalletResult<TransactionContext> {
        let near_public_key = self
            .near_public_key
            .clone()
            .ok_or_else(|| WalletError::invalid_input("nonce manager not initialized"))?;
        let chain_nonce = self
            .chain_nonce
            .ok_or_else(|| WalletError::internal("no chain nonce available"))?;
        let block_hash = self
            .block_hash
            .clone()
            .ok_or_else(|| WalletError::internal("no block hash available"))?;
        let block_height = self
            .block_height
            .ok_or_else(|| WalletError::internal("no block height available"))?;

        if now - self.last_block_update_ms > STALE_WARNING_MS {
            warn!(
                "NonceManager: serving block context older than {}ms",
                STALE_WARNING_MS
            );
        }

        Ok(TransactionContext {
            near_public_key_str: near_public_key,
            access_key_nonce: chain_nonce.to_string(),
            next_nonce: self.next_nonce.to_string(),
            tx_block_height: block_height.to_string(),
            tx_block_hash: block_hash,
            last_nonce_update_ms: self.last_nonce_update_ms,
            last_block_height_update_ms: self.last_block_update_ms,
        })
    }

    /// Commit one fetch under both guards. Returns false when the fetch was
    /// discarded (stale id or identity change).
    fn commit_fetch(&mut self, fetched: &FetchedChainContext, now: f64) -> bool {
        if fetched.identity != self.identity {
            debug!("NonceManager: dropping fetch from a previous user");
            return false;
        }
        if fetched.fetch_id <= self.last_committed_fetch_id {
            debug!(
                "NonceManager: skipping commit of stale fetch {} (last {})",
                fetched.fetch_id, self.last_committed_fetch_id
            );
            return false;
        }

        self.last_committed_fetch_id = fetched.fetch_id;
        self.chain_nonce = Some(fetched.access_key_nonce);
        self.next_nonce = self
            .next_nonce
            .max(fetched.access_key_nonce + 1)
            .max(self.last_reserved.map(|r| r + 1).unwrap_or(0));
        self.block_height = Some(fetched.block_height);
        self.block_hash = Some(fetched.block_hash.clone());
        self.last_nonce_update_ms = now;
        self.last_block_update_ms = now;
        true
    }

    /// Plan and commit a contiguous nonce run as a unit.
    /// start = max(onchain_nonce + 1, last_reserved + 1, next_nonce); never 0.
    pub fn reserve_nonces(&mut self, n: usize) -> WalletResult<Vec<String>> {
        if self.account_id.is_none() {
            return Err(WalletError::invalid_input("nonce manager not initialized"));
        }
        if n == 0 {
            return Ok(vec![]);
        }

        let start = self
            .chain_nonce
            .map(|c| c + 1)
            .unwrap_or(1)
            .max(self.last_reserved.map(|r| r + 1).unwrap_or(1))
            .max(self.next_nonce)
            .max(1);

        let end = start + (n as u64) - 1;
        let nonces: Vec<u64> = (start..=end).collect();

        // Commit as a unit
        self.reservations.extend(nonces.iter().copied());
        self.last_reserved = Some(end);
        self.next_nonce = end + 1;

        debug!("NonceManager: reserved nonces {}..={}", start, end);
        Ok(nonces.iter().map(|x| x.to_string()).collect())
    }

    /// Idempotent release of one reservation.
    pub fn release_nonce(&mut self, nonce: &str) {
        if let Ok(value) = nonce.parse::<u64>() {
            if self.reservations.remove(&value) {
                debug!("NonceManager: released nonce {}", value);
            }
            self.recompute_after_release();
        }
    }

    pub fn release_all_nonces(&mut self) {
        self.reservations.clear();
        self.recompute_after_release();
    }

    fn recompute_after_release(&mut self) {
        // Reuse the tail when the highest reservations were released
        let highest = self.reservations.iter().next_back().copied();
        self.last_reserved = highest;
        let floor = self.chain_nonce.map(|c| c + 1).unwrap_or(1);
        self.next_nonce = highest.map(|h| h + 1).unwrap_or(floor).max(floor);
    }

    /// Reconcile with the chain after a broadcast. `actual_nonce` is the
    /// nonce the broadcast transaction used; the view may lag behind it
    /// (pre-final) or the key may not exist yet right after creation.
    pub async fn update_nonce_from_blockchain(
        manager: &Rc<RefCell<NonceManager>>,
        provider: &Rc<dyn NearRpcProvider>,
        actual_nonce: u64,
    ) -> WalletResult<()> {
        let (account_id, public_key, identity) = {
            let mgr = manager.borrow();
            (
                mgr.account_id
                    .clone()
                    .ok_or_else(|| WalletError::invalid_input("nonce manager not initialized"))?,
                mgr.near_public_key.clone().unwrap_or_default(),
                mgr.identity,
            )
        };

        let observed = match provider.view_access_key(&account_id, &public_key).await {
            Ok(view) => view.nonce.max(actual_nonce),
            Err(AccessKeyQueryError::DoesNotExist) => {
                // Just-created key: advance optimistically from the broadcast
                debug!("NonceManager: access key not on chain yet; advancing optimistically");
                actual_nonce
            }
            Err(AccessKeyQueryError::Rpc(msg)) => return Err(WalletError::Unavailable(msg)),
        };

        let mut mgr = manager.borrow_mut();
        if mgr.identity != identity {
            return Ok(()); // user switched mid-flight; nothing to reconcile
        }
        mgr.chain_nonce = Some(observed);
        mgr.next_nonce = mgr.next_nonce.max(observed + 1);
        mgr.last_nonce_update_ms = now_ms();
        // Prune reservations the chain has already consumed
        mgr.reservations = mgr.reservations.split_off(&(observed + 1));
        mgr.recompute_after_release();
        Ok(())
    }

    /// Debounced background refresh of block context. Returns whether a
    /// refresh actually ran.
    pub async fn prefetch_block_height(
        manager: &Rc<RefCell<NonceManager>>,
        provider: &Rc<dyn NearRpcProvider>,
    ) -> WalletResult<bool> {
        let now = now_ms();
        let identity = {
            let mut mgr = manager.borrow_mut();
            if now - mgr.last_prefetch_ms < PREFETCH_DEBOUNCE_MS {
                return Ok(false);
            }
            if mgr.is_block_fresh(now) && mgr.is_nonce_fresh(now) {
                return Ok(false);
            }
            mgr.last_prefetch_ms = now;
            mgr.identity
        };

        let block = provider.view_final_block().await?;

        let mut mgr = manager.borrow_mut();
        if mgr.identity != identity {
            return Ok(false);
        }
        mgr.block_height = Some(block.height);
        mgr.block_hash = Some(block.hash);
        mgr.last_block_update_ms = now_ms();
        Ok(true)
    }

    /// Fetch (or serve cached) transaction context. Concurrent callers share
    /// one in-flight fetch unless `force` is set; forced fetches still commit
    /// through the monotonic fetch-id guard.
    pub async fn get_nonce_block_hash_and_height(
        manager: &Rc<RefCell<NonceManager>>,
        provider: &Rc<dyn NearRpcProvider>,
        force: bool,
    ) -> WalletResult<TransactionContext> {
        let now = now_ms();

        // Serve cached context when everything is fresh
        let (account_id, public_key) = {
            let mgr = manager.borrow();
            if !force && mgr.is_nonce_fresh(now) && mgr.is_block_fresh(now) {
                return mgr.context_from_state(now);
            }
            (
                mgr.account_id
                    .clone()
                    .ok_or_else(|| WalletError::invalid_input("nonce manager not initialized"))?,
                mgr.near_public_key
                    .clone()
                    .ok_or_else(|| WalletError::invalid_input("nonce manager not initialized"))?,
            )
        };

        let shared = {
            let mut mgr = manager.borrow_mut();
            let reusable = if force {
                None
            } else {
                mgr.inflight.as_ref().map(|(_, shared)| shared.clone())
            };
            match reusable {
                Some(shared) => shared,
                None => {
                    mgr.next_fetch_id += 1;
                    let fetch_id = mgr.next_fetch_id;
                    let identity = mgr.identity;
                    let provider = provider.clone();
                    let future: LocalBoxFuture<'static, Result<FetchedChainContext, WalletError>> =
                        Box::pin(async move {
                            let view = provider
                                .view_access_key(&account_id, &public_key)
                                .await
                                .map_err(WalletError::from)?;
                            let block = provider.view_final_block().await?;
                            Ok(FetchedChainContext {
                                fetch_id,
                                identity,
                                access_key_nonce: view.nonce,
                                block_height: block.height,
                                block_hash: block.hash,
                            })
                        });
                    let shared = future.shared();
                    if !force {
                        mgr.inflight = Some((fetch_id, shared.clone()));
                    }
                    shared
                }
            }
        };

        let fetched = shared.await;

        let mut mgr = manager.borrow_mut();
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                mgr.inflight = None;
                return Err(e);
            }
        };
        if matches!(&mgr.inflight, Some((id, _)) if *id == fetched.fetch_id) {
            mgr.inflight = None;
        }

        if fetched.identity != mgr.identity {
            return Err(WalletError::unavailable(
                "chain context fetch superseded by account switch",
            ));
        }

        let now = now_ms();
        mgr.commit_fetch(&fetched, now);
        mgr.context_from_state(now)
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}
