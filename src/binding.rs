//! Client bindings keyed by DUID and IAID.
//!
//! A [`ClientBindingRegistry`] maps each client DUID to the identity
//! associations it holds, and counts the bindings holding each address so
//! the pool can skip leased addresses without walking all clients.
//!
//! # Thread Safety
//!
//! Every registry method takes the registry's single [`Mutex`], so each call
//! is atomic. Sequences of calls (look up, decide, then add) are not; use
//! [`ClientBindingRegistry::add_if_vacant`] where two requests for the same
//! IA may race.

use std::collections::HashMap;
use std::net::Ipv6Addr;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::options::Duid;

/// An address bound to one identity association of a client.
///
/// Two bindings are equal when their IAIDs are equal; the address does not
/// take part in identity.
#[derive(Debug, Clone)]
pub struct ClientBinding {
    /// Identity association id chosen by the client.
    pub ia_id: u32,

    /// The bound address.
    pub ip: Ipv6Addr,

    /// When the binding was first created (UTC).
    pub bound_at: DateTime<Utc>,

    /// When the client last renewed or rebound (UTC).
    pub last_renewed: DateTime<Utc>,
}

impl ClientBinding {
    pub fn new(ia_id: u32, ip: Ipv6Addr) -> Self {
        let now = Utc::now();
        Self {
            ia_id,
            ip,
            bound_at: now,
            last_renewed: now,
        }
    }
}

impl PartialEq for ClientBinding {
    fn eq(&self, other: &Self) -> bool {
        self.ia_id == other.ia_id
    }
}

impl Eq for ClientBinding {}

#[derive(Debug, Default)]
struct RegistryState {
    bindings: HashMap<Duid, HashMap<u32, ClientBinding>>,
    // Number of bindings holding each address.
    addresses: HashMap<Ipv6Addr, usize>,
}

impl RegistryState {
    fn insert(&mut self, duid: &Duid, binding: ClientBinding) {
        self.hold(binding.ip);
        let previous = self
            .bindings
            .entry(duid.clone())
            .or_default()
            .insert(binding.ia_id, binding);

        if let Some(previous) = previous {
            self.drop_hold(previous.ip);
        }
    }

    fn hold(&mut self, ip: Ipv6Addr) {
        *self.addresses.entry(ip).or_default() += 1;
    }

    fn drop_hold(&mut self, ip: Ipv6Addr) {
        if let Some(count) = self.addresses.get_mut(&ip) {
            *count -= 1;
            if *count == 0 {
                self.addresses.remove(&ip);
            }
        }
    }
}

/// Bindings for one IA kind (IA_NA or IA_TA).
#[derive(Debug, Default)]
pub struct ClientBindingRegistry {
    state: Mutex<RegistryState>,
}

impl ClientBindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `binding` for `duid`, replacing any binding with the same IAID.
    pub async fn add(&self, duid: &Duid, binding: ClientBinding) {
        let mut state = self.state.lock().await;
        state.insert(duid, binding);
    }

    /// Stores `binding` only if the client holds nothing for its IAID.
    ///
    /// Returns the binding that is in the registry afterwards: `binding`
    /// itself, or the one that was already there.
    pub async fn add_if_vacant(&self, duid: &Duid, binding: ClientBinding) -> ClientBinding {
        let mut state = self.state.lock().await;
        let existing = state
            .bindings
            .get(duid)
            .and_then(|ias| ias.get(&binding.ia_id))
            .cloned();

        match existing {
            Some(existing) => existing,
            None => {
                state.insert(duid, binding.clone());
                binding
            }
        }
    }

    /// Removes and returns the binding for `(duid, ia_id)`.
    pub async fn remove(&self, duid: &Duid, ia_id: u32) -> Option<ClientBinding> {
        let mut state = self.state.lock().await;
        let ias = state.bindings.get_mut(duid)?;
        let removed = ias.remove(&ia_id)?;
        if ias.is_empty() {
            state.bindings.remove(duid);
        }
        state.drop_hold(removed.ip);
        Some(removed)
    }

    /// Returns true if `duid` holds a binding equal to `binding` (same IAID).
    pub async fn contains(&self, duid: &Duid, binding: &ClientBinding) -> bool {
        self.contains_ia(duid, binding.ia_id).await
    }

    pub async fn contains_ia(&self, duid: &Duid, ia_id: u32) -> bool {
        let state = self.state.lock().await;
        state
            .bindings
            .get(duid)
            .is_some_and(|ias| ias.contains_key(&ia_id))
    }

    pub async fn get(&self, duid: &Duid, ia_id: u32) -> Option<ClientBinding> {
        let state = self.state.lock().await;
        state.bindings.get(duid)?.get(&ia_id).cloned()
    }

    /// Returns true if any client holds `ip`.
    pub async fn contains_ip(&self, ip: Ipv6Addr) -> bool {
        self.state.lock().await.addresses.contains_key(&ip)
    }

    /// Records a renewal and returns the updated binding.
    pub async fn touch(&self, duid: &Duid, ia_id: u32) -> Option<ClientBinding> {
        let mut state = self.state.lock().await;
        let binding = state.bindings.get_mut(duid)?.get_mut(&ia_id)?;
        binding.last_renewed = Utc::now();
        Some(binding.clone())
    }

    /// Number of bound addresses.
    pub async fn len(&self) -> usize {
        self.state.lock().await.addresses.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn duid(tag: u8) -> Duid {
        Duid::new(vec![0, 3, 0, 1, tag])
    }

    fn addr(last: u16) -> Ipv6Addr {
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, last)
    }

    #[test]
    fn test_binding_equality_ignores_address() {
        let a = ClientBinding::new(7, addr(1));
        let b = ClientBinding::new(7, addr(2));
        let c = ClientBinding::new(8, addr(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let registry = ClientBindingRegistry::new();
        let client = duid(1);

        registry.add(&client, ClientBinding::new(123, addr(10))).await;
        assert!(registry.contains_ia(&client, 123).await);
        assert!(registry.contains(&client, &ClientBinding::new(123, addr(99))).await);
        assert!(registry.contains_ip(addr(10)).await);
        assert_eq!(registry.get(&client, 123).await.unwrap().ip, addr(10));

        let removed = registry.remove(&client, 123).await.unwrap();
        assert_eq!(removed.ip, addr(10));
        assert!(!registry.contains_ia(&client, 123).await);
        assert!(!registry.contains_ip(addr(10)).await);
        assert!(registry.is_empty().await);
        assert!(registry.remove(&client, 123).await.is_none());
    }

    #[tokio::test]
    async fn test_replacing_binding_updates_reverse_index() {
        let registry = ClientBindingRegistry::new();
        let client = duid(1);

        registry.add(&client, ClientBinding::new(1, addr(10))).await;
        registry.add(&client, ClientBinding::new(1, addr(11))).await;

        assert!(!registry.contains_ip(addr(10)).await);
        assert!(registry.contains_ip(addr(11)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_shared_address_survives_one_removal() {
        let registry = ClientBindingRegistry::new();
        registry.add(&duid(1), ClientBinding::new(1, addr(10))).await;
        registry.add(&duid(2), ClientBinding::new(1, addr(10))).await;

        registry.remove(&duid(1), 1).await;
        assert!(registry.contains_ip(addr(10)).await);

        registry.add(&duid(2), ClientBinding::new(1, addr(11))).await;
        assert!(!registry.contains_ip(addr(10)).await);
        assert!(registry.contains_ip(addr(11)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let registry = ClientBindingRegistry::new();
        registry.add(&duid(1), ClientBinding::new(1, addr(10))).await;
        registry.add(&duid(2), ClientBinding::new(1, addr(11))).await;

        registry.remove(&duid(1), 1).await;
        assert!(registry.contains_ia(&duid(2), 1).await);
        assert!(!registry.contains_ia(&duid(1), 1).await);
    }

    #[tokio::test]
    async fn test_add_if_vacant_keeps_first() {
        let registry = ClientBindingRegistry::new();
        let client = duid(1);

        let first = registry
            .add_if_vacant(&client, ClientBinding::new(5, addr(20)))
            .await;
        let second = registry
            .add_if_vacant(&client, ClientBinding::new(5, addr(21)))
            .await;

        assert_eq!(first.ip, addr(20));
        assert_eq!(second.ip, addr(20));
        assert!(!registry.contains_ip(addr(21)).await);
    }

    #[tokio::test]
    async fn test_touch_updates_last_renewed() {
        let registry = ClientBindingRegistry::new();
        let client = duid(1);
        registry.add(&client, ClientBinding::new(1, addr(1))).await;

        let before = registry.get(&client, 1).await.unwrap();
        let after = registry.touch(&client, 1).await.unwrap();
        assert!(after.last_renewed >= before.last_renewed);
        assert_eq!(after.bound_at, before.bound_at);
        assert!(registry.touch(&client, 2).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_adds_for_distinct_ias() {
        let registry = Arc::new(ClientBindingRegistry::new());
        let client = duid(9);

        let mut handles = vec![];
        for i in 0..10u16 {
            let registry = registry.clone();
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .add(&client, ClientBinding::new(i as u32, addr(100 + i)))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 10);
        for i in 0..10u16 {
            assert!(registry.contains_ia(&client, i as u32).await);
        }
    }
}
