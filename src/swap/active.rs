use super::Role;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Sessions currently claiming the right to run.
///
/// Claims are checked and taken under one lock, so two concurrent buys cannot
/// both see an empty table. A buyer claim is refused while any session of any
/// role holds one; the maker only excludes a second maker.
#[derive(Debug, Default)]
pub struct ActiveSessions {
    claims: Mutex<BTreeMap<String, Role>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim_buyer(&self, swap_id: &str) -> Result<()> {
        let mut claims = self.claims.lock();
        if let Some(running) = claims.keys().next() {
            return Err(Error::Busy(running.clone()));
        }
        claims.insert(swap_id.to_string(), Role::Buyer);
        Ok(())
    }

    pub fn claim_maker(&self, owner: &str) -> Result<()> {
        let mut claims = self.claims.lock();
        if claims.values().any(|role| *role == Role::Maker) {
            return Err(Error::MakerAlreadyRunning);
        }
        claims.insert(owner.to_string(), Role::Maker);
        Ok(())
    }

    /// Returns false if `id` held no claim.
    pub fn release(&self, id: &str) -> bool {
        self.claims.lock().remove(id).is_some()
    }

    pub fn running(&self) -> Vec<(String, Role)> {
        self.claims
            .lock()
            .iter()
            .map(|(id, role)| (id.clone(), *role))
            .collect()
    }

    pub fn running_buyer(&self) -> Option<String> {
        self.claims
            .lock()
            .iter()
            .find(|(_, role)| **role == Role::Buyer)
            .map(|(id, _)| id.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.claims.lock().is_empty()
    }
}
