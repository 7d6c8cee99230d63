//! Address leasing for IA_NA and IA_TA identity associations.
//!
//! This module implements the server-side lease operations of RFC 3315 §18.2:
//!
//! - Address assignment for SOLICIT and REQUEST
//! - Renewal (RENEW) and rebinding (REBIND) of existing bindings
//! - RELEASE and DECLINE of bindings
//! - CONFIRM of on-link addresses
//! - Configuration options for INFORMATION-REQUEST and friends
//!
//! Each operation walks every IA_NA and IA_TA option in the request and adds
//! one outgoing IA option per inbound IA to the reply. Problems with a single
//! IA (no address, no binding) are reported as a Status Code inside that IA,
//! so sibling IAs in the same message still succeed.
//!
//! Address choice and on-link checks are delegated to a [`LeasePolicy`].
//! [`LinearPool`] is the policy shipped with the server.

use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::binding::{ClientBinding, ClientBindingRegistry};
use crate::codec::OptionRegistry;
use crate::engine::RequestContext;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::options::{
    DnsServersOption, DomainListOption, Duid, IaAddressOption, IaNaOption, IaTaOption,
    OptionContainer, OptionKind, StatusCode, StatusCodeOption,
};

/// Default T1 (renew) time in seconds.
pub const DEFAULT_T1: u32 = 1800;

/// Default T2 (rebind) time in seconds.
pub const DEFAULT_T2: u32 = 2880;

/// Default preferred lifetime in seconds.
pub const DEFAULT_PREFERRED_LIFETIME: u32 = 3600;

/// Default valid lifetime in seconds.
pub const DEFAULT_VALID_LIFETIME: u32 = 7200;

/// Timers and lifetimes handed out with every address.
///
/// Construction enforces `t1 < t2 < preferred < valid`, which also gives
/// `t1 < preferred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    t1: u32,
    t2: u32,
    preferred_lifetime: u32,
    valid_lifetime: u32,
}

impl Lifetimes {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the values are out of order.
    pub fn new(t1: u32, t2: u32, preferred_lifetime: u32, valid_lifetime: u32) -> Result<Self> {
        if t1 >= t2 {
            return Err(Error::InvalidConfig(format!(
                "T1 ({}) must be less than T2 ({})",
                t1, t2
            )));
        }
        if t1 >= preferred_lifetime || t2 >= preferred_lifetime {
            return Err(Error::InvalidConfig(format!(
                "T1 ({}) and T2 ({}) must be less than the preferred lifetime ({})",
                t1, t2, preferred_lifetime
            )));
        }
        if preferred_lifetime >= valid_lifetime {
            return Err(Error::InvalidConfig(format!(
                "Preferred lifetime ({}) must be less than valid lifetime ({})",
                preferred_lifetime, valid_lifetime
            )));
        }

        Ok(Self {
            t1,
            t2,
            preferred_lifetime,
            valid_lifetime,
        })
    }

    pub fn t1(&self) -> u32 {
        self.t1
    }

    pub fn t2(&self) -> u32 {
        self.t2
    }

    pub fn preferred_lifetime(&self) -> u32 {
        self.preferred_lifetime
    }

    pub fn valid_lifetime(&self) -> u32 {
        self.valid_lifetime
    }
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            t1: DEFAULT_T1,
            t2: DEFAULT_T2,
            preferred_lifetime: DEFAULT_PREFERRED_LIFETIME,
            valid_lifetime: DEFAULT_VALID_LIFETIME,
        }
    }
}

/// Which kind of identity association a binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IaKind {
    NonTemporary,
    Temporary,
}

/// Common shape of IA_NA and IA_TA options.
pub trait IdentityAssociation: OptionKind + Send + Sync {
    const KIND: IaKind;

    fn ia_id(&self) -> u32;

    /// T1 and T2, for IA kinds that carry them.
    fn timers(&self) -> Option<(u32, u32)>;

    fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer>;

    fn set_options(&mut self, options: &OptionContainer) -> Result<()>;

    /// Builds an empty outgoing IA with timers taken from `lifetimes`.
    fn for_reply(ia_id: u32, lifetimes: &Lifetimes) -> Self;
}

impl IdentityAssociation for IaNaOption {
    const KIND: IaKind = IaKind::NonTemporary;

    fn ia_id(&self) -> u32 {
        IaNaOption::ia_id(self)
    }

    fn timers(&self) -> Option<(u32, u32)> {
        Some((self.t1(), self.t2()))
    }

    fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer> {
        IaNaOption::options(self, registry)
    }

    fn set_options(&mut self, options: &OptionContainer) -> Result<()> {
        IaNaOption::set_options(self, options)
    }

    fn for_reply(ia_id: u32, lifetimes: &Lifetimes) -> Self {
        IaNaOption::new(ia_id, lifetimes.t1(), lifetimes.t2())
    }
}

impl IdentityAssociation for IaTaOption {
    const KIND: IaKind = IaKind::Temporary;

    fn ia_id(&self) -> u32 {
        IaTaOption::ia_id(self)
    }

    fn timers(&self) -> Option<(u32, u32)> {
        None
    }

    fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer> {
        IaTaOption::options(self, registry)
    }

    fn set_options(&mut self, options: &OptionContainer) -> Result<()> {
        IaTaOption::set_options(self, options)
    }

    fn for_reply(ia_id: u32, _lifetimes: &Lifetimes) -> Self {
        IaTaOption::new(ia_id)
    }
}

/// The two binding registries of a lease manager.
#[derive(Debug, Default)]
pub struct Bindings {
    pub non_temporary: ClientBindingRegistry,
    pub temporary: ClientBindingRegistry,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self, kind: IaKind) -> &ClientBindingRegistry {
        match kind {
            IaKind::NonTemporary => &self.non_temporary,
            IaKind::Temporary => &self.temporary,
        }
    }

    /// Returns true if either registry holds `ip`.
    pub async fn contains_ip(&self, ip: Ipv6Addr) -> bool {
        self.non_temporary.contains_ip(ip).await || self.temporary.contains_ip(ip).await
    }
}

/// Deployment hooks for address choice and on-link checks.
#[async_trait]
pub trait LeasePolicy: Send + Sync {
    /// Picks an address for a new binding.
    ///
    /// Addresses in `offered` were already handed to other IAs of the same
    /// message and must not be picked again.
    ///
    /// Returns [`Error::PoolExhausted`] when nothing is free; the IA then gets
    /// a `NoAddrsAvail` status.
    async fn new_ip(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        ia_id: u32,
        kind: IaKind,
        bindings: &Bindings,
        offered: &HashSet<Ipv6Addr>,
    ) -> Result<Ipv6Addr>;

    /// Returns false if the client should stop using `ip`.
    async fn is_appropriate(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        ia_id: u32,
        ip: Ipv6Addr,
    ) -> bool;
}

/// Hands out addresses from an inclusive range, lowest free address first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearPool {
    start: Ipv6Addr,
    end: Ipv6Addr,
}

impl LinearPool {
    pub fn new(start: Ipv6Addr, end: Ipv6Addr) -> Result<Self> {
        if u128::from(start) > u128::from(end) {
            return Err(Error::InvalidConfig(format!(
                "Pool start {} is after pool end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        let value = u128::from(ip);
        value >= u128::from(self.start) && value <= u128::from(self.end)
    }
}

#[async_trait]
impl LeasePolicy for LinearPool {
    async fn new_ip(
        &self,
        _ctx: &RequestContext,
        _duid: &Duid,
        _ia_id: u32,
        _kind: IaKind,
        bindings: &Bindings,
        offered: &HashSet<Ipv6Addr>,
    ) -> Result<Ipv6Addr> {
        let end = u128::from(self.end);
        let mut candidate = u128::from(self.start);

        loop {
            let ip = Ipv6Addr::from(candidate);
            if !offered.contains(&ip) && !bindings.contains_ip(ip).await {
                return Ok(ip);
            }
            if candidate >= end {
                return Err(Error::PoolExhausted);
            }
            candidate += 1;
        }
    }

    async fn is_appropriate(
        &self,
        _ctx: &RequestContext,
        _duid: &Duid,
        _ia_id: u32,
        ip: Ipv6Addr,
    ) -> bool {
        self.contains(ip)
    }
}

/// Runs lease operations against the binding registries.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dhcp6lease::{LeaseManager, Lifetimes, LinearPool, OptionRegistry};
///
/// # fn example() -> dhcp6lease::Result<()> {
/// let pool = LinearPool::new("2001:db8::100".parse().unwrap(), "2001:db8::1ff".parse().unwrap())?;
/// let manager = LeaseManager::new(pool, Lifetimes::default(), Arc::new(OptionRegistry::new()));
/// # Ok(())
/// # }
/// ```
pub struct LeaseManager<P> {
    policy: P,
    lifetimes: Lifetimes,
    registry: Arc<OptionRegistry>,
    bindings: Bindings,
    dns_servers: Option<DnsServersOption>,
    domain_list: Option<DomainListOption>,
}

impl<P: LeasePolicy> LeaseManager<P> {
    pub fn new(policy: P, lifetimes: Lifetimes, registry: Arc<OptionRegistry>) -> Self {
        Self {
            policy,
            lifetimes,
            registry,
            bindings: Bindings::new(),
            dns_servers: None,
            domain_list: None,
        }
    }

    /// Sets the configuration options returned by [`request_information`](Self::request_information).
    ///
    /// Empty lists disable the corresponding option.
    pub fn with_information(mut self, dns_servers: &[Ipv6Addr], domains: &[String]) -> Result<Self> {
        self.dns_servers = (!dns_servers.is_empty()).then(|| DnsServersOption::new(dns_servers));
        self.domain_list = if domains.is_empty() {
            None
        } else {
            Some(DomainListOption::new(domains)?)
        };
        Ok(self)
    }

    pub fn lifetimes(&self) -> &Lifetimes {
        &self.lifetimes
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Assigns addresses to every IA in `request`.
    ///
    /// Existing bindings are reused; otherwise the policy picks a new
    /// address. With `commit` set the binding is stored in the registry.
    pub async fn lease(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
        commit: bool,
    ) -> Result<()> {
        let mut offered = HashSet::new();
        self.lease_kind::<IaNaOption>(ctx, duid, request, reply, commit, &mut offered)
            .await?;
        self.lease_kind::<IaTaOption>(ctx, duid, request, reply, commit, &mut offered)
            .await
    }

    /// Extends the lifetimes of existing bindings.
    ///
    /// IAs without a binding get a `NoBinding` status.
    pub async fn renew(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
    ) -> Result<()> {
        self.refresh_kind::<IaNaOption>(ctx, duid, request, reply, false)
            .await?;
        self.refresh_kind::<IaTaOption>(ctx, duid, request, reply, false)
            .await?;
        self.request_information(reply);
        Ok(())
    }

    /// Like [`renew`](Self::renew), sent to any server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnableToAnswer`] if any IA has no binding here; the
    /// client is then left to another server.
    pub async fn rebind(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
    ) -> Result<()> {
        self.refresh_kind::<IaNaOption>(ctx, duid, request, reply, true)
            .await?;
        self.refresh_kind::<IaTaOption>(ctx, duid, request, reply, true)
            .await?;
        self.request_information(reply);
        Ok(())
    }

    /// Removes the bindings for every IA in `request` and returns them.
    pub async fn release(
        &self,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
    ) -> Result<Vec<ClientBinding>> {
        let mut removed = self.release_kind::<IaNaOption>(duid, request, reply).await?;
        removed.extend(self.release_kind::<IaTaOption>(duid, request, reply).await?);
        reply
            .options
            .add(StatusCodeOption::new(StatusCode::Success, "Release received"));
        Ok(removed)
    }

    /// Handles addresses the client found to be in use elsewhere.
    ///
    /// The bindings are dropped like in [`release`](Self::release).
    pub async fn decline(
        &self,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
    ) -> Result<Vec<ClientBinding>> {
        let removed = self.release(duid, request, reply).await?;
        for binding in &removed {
            warn!("Client {} declined {}", duid, binding.ip);
        }
        self.request_information(reply);
        Ok(removed)
    }

    /// Checks whether the client's addresses are still on link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnableToAnswer`] if the request carries no IA, or an
    /// IA without addresses.
    pub async fn confirm(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
    ) -> Result<()> {
        let mut addresses = self.confirm_addresses::<IaNaOption>(request)?;
        addresses.extend(self.confirm_addresses::<IaTaOption>(request)?);

        if addresses.is_empty() {
            return Err(Error::UnableToAnswer(
                "CONFIRM without identity associations".to_string(),
            ));
        }

        let mut on_link = true;
        for (ia_id, ip) in addresses {
            if !self.policy.is_appropriate(ctx, duid, ia_id, ip).await {
                debug!("Address {} of client {} is not on link", ip, duid);
                on_link = false;
            }
        }

        let status = if on_link {
            StatusCodeOption::new(StatusCode::Success, "All addresses on link")
        } else {
            StatusCodeOption::new(StatusCode::NotOnLink, "Some addresses are not on link")
        };
        reply.options.add(status);
        Ok(())
    }

    /// Adds the configured DNS servers and domain search list to `reply`.
    pub fn request_information(&self, reply: &mut Message) {
        if let Some(dns) = &self.dns_servers {
            reply.options.add(dns.clone());
        }
        if let Some(domains) = &self.domain_list {
            reply.options.add(domains.clone());
        }
    }

    async fn lease_kind<I: IdentityAssociation>(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
        commit: bool,
        offered: &mut HashSet<Ipv6Addr>,
    ) -> Result<()> {
        let registry = self.bindings.registry(I::KIND);

        for ia in request.options.get_all::<I>() {
            let ia_id = ia.ia_id();
            let mut inner = OptionContainer::new();
            if let Some((t1, t2)) = ia.timers() {
                debug!("Client {} IA {} hints T1={} T2={}", duid, ia_id, t1, t2);
            }

            let ip = match registry.get(duid, ia_id).await {
                Some(binding) => Ok(binding.ip),
                None => {
                    self.policy
                        .new_ip(ctx, duid, ia_id, I::KIND, &self.bindings, offered)
                        .await
                }
            };

            match ip {
                Ok(ip) => {
                    let ip = if commit {
                        registry
                            .add_if_vacant(duid, ClientBinding::new(ia_id, ip))
                            .await
                            .ip
                    } else {
                        ip
                    };
                    offered.insert(ip);
                    info!("Leased {} to client {} (IA {:?} {})", ip, duid, I::KIND, ia_id);
                    inner.add(IaAddressOption::new(
                        ip,
                        self.lifetimes.preferred_lifetime(),
                        self.lifetimes.valid_lifetime(),
                    ));
                }
                Err(Error::PoolExhausted) => {
                    warn!("No addresses available for client {} IA {}", duid, ia_id);
                    inner.add(StatusCodeOption::new(
                        StatusCode::NoAddrsAvail,
                        "No addresses available",
                    ));
                }
                Err(error) => return Err(error),
            }

            let mut outgoing = I::for_reply(ia_id, &self.lifetimes);
            outgoing.set_options(&inner)?;
            reply.options.add(outgoing.into_option());
        }

        Ok(())
    }

    async fn refresh_kind<I: IdentityAssociation>(
        &self,
        ctx: &RequestContext,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
        rebinding: bool,
    ) -> Result<()> {
        let registry = self.bindings.registry(I::KIND);

        for ia in request.options.get_all::<I>() {
            let ia_id = ia.ia_id();
            let mut inner = OptionContainer::new();

            match registry.touch(duid, ia_id).await {
                None if rebinding => {
                    return Err(Error::UnableToAnswer(format!(
                        "No binding for client {} IA {}",
                        duid, ia_id
                    )));
                }
                None => {
                    debug!("Client {} has no binding for IA {}", duid, ia_id);
                    inner.add(StatusCodeOption::new(
                        StatusCode::NoBinding,
                        "No binding for this IA",
                    ));
                }
                Some(binding) => {
                    let requested = ia.options(&self.registry)?;
                    let mismatch = requested
                        .get_all::<IaAddressOption>()
                        .find(|address| address.ip() != binding.ip);
                    if let Some(address) = mismatch {
                        warn!(
                            "Client {} IA {} asked for {} but is bound to {}",
                            duid,
                            ia_id,
                            address.ip(),
                            binding.ip
                        );
                    }

                    let (preferred, valid) =
                        if self.policy.is_appropriate(ctx, duid, ia_id, binding.ip).await {
                            (
                                self.lifetimes.preferred_lifetime(),
                                self.lifetimes.valid_lifetime(),
                            )
                        } else {
                            (0, 0)
                        };
                    inner.add(IaAddressOption::new(binding.ip, preferred, valid));
                }
            }

            let mut outgoing = I::for_reply(ia_id, &self.lifetimes);
            outgoing.set_options(&inner)?;
            reply.options.add(outgoing.into_option());
        }

        Ok(())
    }

    async fn release_kind<I: IdentityAssociation>(
        &self,
        duid: &Duid,
        request: &Message,
        reply: &mut Message,
    ) -> Result<Vec<ClientBinding>> {
        let registry = self.bindings.registry(I::KIND);
        let mut removed = Vec::new();

        for ia in request.options.get_all::<I>() {
            let ia_id = ia.ia_id();
            match registry.remove(duid, ia_id).await {
                Some(binding) => {
                    info!("Released {} from client {} IA {}", binding.ip, duid, ia_id);
                    removed.push(binding);
                }
                None => {
                    let mut inner = OptionContainer::new();
                    inner.add(StatusCodeOption::new(
                        StatusCode::NoBinding,
                        "No binding for this IA",
                    ));
                    let mut outgoing = I::for_reply(ia_id, &self.lifetimes);
                    outgoing.set_options(&inner)?;
                    reply.options.add(outgoing.into_option());
                }
            }
        }

        Ok(removed)
    }

    fn confirm_addresses<I: IdentityAssociation>(
        &self,
        request: &Message,
    ) -> Result<Vec<(u32, Ipv6Addr)>> {
        let mut addresses = Vec::new();
        for ia in request.options.get_all::<I>() {
            let inner = ia.options(&self.registry)?;
            let before = addresses.len();
            addresses.extend(
                inner
                    .get_all::<IaAddressOption>()
                    .map(|address| (ia.ia_id(), address.ip())),
            );
            if addresses.len() == before {
                return Err(Error::UnableToAnswer(format!(
                    "CONFIRM IA {} carries no addresses",
                    ia.ia_id()
                )));
            }
        }
        Ok(addresses)
    }
}
