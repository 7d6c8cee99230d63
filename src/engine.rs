//! DHCPv6 server protocol engine.
//!
//! The engine turns one decoded client message into at most one reply
//! (RFC 3315 §15 and §18.2). It validates the message shape for its type,
//! runs the matching [`LeaseManager`] operation and shapes the reply:
//!
//! | Request | Reply |
//! |---|---|
//! | SOLICIT | ADVERTISE (REPLY with Rapid Commit) |
//! | REQUEST, RENEW, REBIND, RELEASE, DECLINE, CONFIRM, INFORMATION-REQUEST | REPLY |
//! | RELAY-FORW | RELAY-REPL wrapping the reply to the relayed message |
//!
//! The engine holds no locks of its own and can be shared between tasks.
//! Messages that must not be answered produce `Ok(None)`; messages that
//! violate the protocol produce an error the transport logs and drops.

use std::future::Future;
use std::net::Ipv6Addr;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::codec::OptionRegistry;
use crate::error::{Error, Result};
use crate::lease::{LeaseManager, LeasePolicy};
use crate::message::{Framing, Message, MessageType};
use crate::options::{
    ClientIdOption, Duid, IaNaOption, IaTaOption, InterfaceIdOption, OptionCode,
    OptionRequestOption, PreferenceOption, RapidCommitOption, RelayMessageOption, ServerIdOption,
    ServerUnicastOption, StatusCode, StatusCodeOption,
};

/// Options with codes up to this value are always sent; higher codes only
/// when the client lists them in its Option Request option.
pub const MAX_UNSOLICITED_CODE: u16 = OptionCode::ReconfigureAccept as u16;

/// Maximum nesting of RELAY-FORW messages (RFC 3315 §5.1 HOP_COUNT_LIMIT).
pub const MAX_RELAY_DEPTH: usize = 32;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// Source address of the datagram.
    pub client_address: Ipv6Addr,

    /// Link-address of the innermost relay, for relayed messages.
    pub link_address: Option<Ipv6Addr>,
}

impl RequestContext {
    pub fn new(client_address: Ipv6Addr) -> Self {
        Self {
            client_address,
            link_address: None,
        }
    }

    /// Returns a copy for a message relayed from `link_address`.
    pub fn relayed(&self, link_address: Ipv6Addr) -> Self {
        Self {
            client_address: self.client_address,
            link_address: Some(link_address),
        }
    }

    pub fn is_relayed(&self) -> bool {
        self.link_address.is_some()
    }
}

/// Hook for message types the engine does not implement.
#[async_trait]
pub trait UnknownMessageHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, message: &Message) -> Result<Option<Message>>;
}

/// Rejects every unknown message type with [`Error::UnknownMessage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectUnknown;

#[async_trait]
impl UnknownMessageHandler for RejectUnknown {
    async fn handle(&self, _ctx: &RequestContext, message: &Message) -> Result<Option<Message>> {
        Err(Error::UnknownMessage(message.message_type.code()))
    }
}

/// The DHCPv6 server engine.
pub struct Dhcp6Engine<P> {
    server_duid: Duid,
    server_unicast: Option<Ipv6Addr>,
    preference: Option<u8>,
    commit_on_solicit: bool,
    registry: Arc<OptionRegistry>,
    leases: LeaseManager<P>,
    unknown: Box<dyn UnknownMessageHandler>,
}

impl<P: LeasePolicy> Dhcp6Engine<P> {
    /// Creates an engine answering as `server_duid`.
    ///
    /// SOLICIT commits bindings and unknown message types are rejected
    /// until configured otherwise.
    pub fn new(server_duid: Duid, leases: LeaseManager<P>, registry: Arc<OptionRegistry>) -> Self {
        Self {
            server_duid,
            server_unicast: None,
            preference: None,
            commit_on_solicit: true,
            registry,
            leases,
            unknown: Box::new(RejectUnknown),
        }
    }

    /// Lets clients send REQUEST, RENEW, RELEASE and DECLINE to `address`.
    pub fn with_server_unicast(mut self, address: Option<Ipv6Addr>) -> Self {
        self.server_unicast = address;
        self
    }

    /// Preference value advertised in ADVERTISE messages.
    pub fn with_preference(mut self, preference: Option<u8>) -> Self {
        self.preference = preference;
        self
    }

    /// Whether SOLICIT stores the advertised bindings.
    pub fn with_commit_on_solicit(mut self, commit: bool) -> Self {
        self.commit_on_solicit = commit;
        self
    }

    pub fn with_unknown_handler(mut self, handler: impl UnknownMessageHandler + 'static) -> Self {
        self.unknown = Box::new(handler);
        self
    }

    pub fn server_duid(&self) -> &Duid {
        &self.server_duid
    }

    pub fn leases(&self) -> &LeaseManager<P> {
        &self.leases
    }

    pub fn registry(&self) -> &OptionRegistry {
        &self.registry
    }

    /// Decodes a datagram, handles it and encodes the reply.
    #[instrument(skip_all, fields(source = %ctx.client_address, len = data.len()))]
    pub async fn handle_datagram(&self, ctx: RequestContext, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let message = Message::parse(data, &self.registry)?;
        match self.handle(ctx, &message).await? {
            Some(reply) => Ok(Some(reply.encode()?)),
            None => Ok(None),
        }
    }

    /// Handles one message.
    ///
    /// Returns `Ok(None)` when RFC 3315 says not to reply.
    pub async fn handle(&self, ctx: RequestContext, message: &Message) -> Result<Option<Message>> {
        self.dispatch(ctx, message, 0).await
    }

    fn dispatch<'a>(
        &'a self,
        ctx: RequestContext,
        message: &'a Message,
        depth: usize,
    ) -> BoxFuture<'a, Result<Option<Message>>> {
        Box::pin(async move {
            match self.process(ctx, message, depth).await {
                Err(error) if error.is_no_reply() => {
                    debug!("Not answering {}: {}", message.message_type, error);
                    Ok(None)
                }
                other => other,
            }
        })
    }

    async fn process(
        &self,
        ctx: RequestContext,
        message: &Message,
        depth: usize,
    ) -> Result<Option<Message>> {
        info!("{} from {}", message.message_type, ctx.client_address);

        let reply = match message.message_type {
            MessageType::Solicit => self.handle_solicit(&ctx, message).await?,
            MessageType::Request => self.handle_request(&ctx, message).await?,
            MessageType::Renew => self.handle_renew(&ctx, message).await?,
            MessageType::Rebind => self.handle_rebind(&ctx, message).await?,
            MessageType::Release => self.handle_release(&ctx, message).await?,
            MessageType::Decline => self.handle_decline(&ctx, message).await?,
            MessageType::Confirm => self.handle_confirm(&ctx, message).await?,
            MessageType::InformationRequest => self.handle_information_request(message)?,
            MessageType::RelayForward => return self.handle_relay_forward(ctx, message, depth).await,
            MessageType::Advertise
            | MessageType::Reply
            | MessageType::Reconfigure
            | MessageType::RelayReply => {
                return Err(Error::InvalidMessage(format!(
                    "{} is only sent by servers",
                    message.message_type
                )));
            }
            MessageType::Unknown(_) => match self.unknown.handle(&ctx, message).await? {
                Some(reply) => reply,
                None => return Ok(None),
            },
        };

        Ok(Some(Self::filter_requested(message, reply)?))
    }

    async fn handle_solicit(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        Self::forbid_server_id(message)?;

        let rapid_commit = message.options.contains::<RapidCommitOption>();
        let mut reply = if rapid_commit {
            let mut reply = self.reply_to(message, MessageType::Reply)?;
            reply.options.add(RapidCommitOption::new());
            reply
        } else {
            let mut reply = self.reply_to(message, MessageType::Advertise)?;
            if let Some(preference) = self.preference {
                reply.options.add(PreferenceOption::new(preference));
            }
            reply
        };

        self.leases
            .lease(ctx, &duid, message, &mut reply, rapid_commit || self.commit_on_solicit)
            .await?;
        info!("{} to {}", reply.message_type, duid);
        Ok(reply)
    }

    async fn handle_request(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        self.require_our_server_id(message)?;

        if self.must_use_multicast(ctx) {
            return self.use_multicast(message);
        }

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        self.leases.lease(ctx, &duid, message, &mut reply, true).await?;
        info!("REPLY to REQUEST from {}", duid);
        Ok(reply)
    }

    async fn handle_renew(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        self.require_our_server_id(message)?;

        if self.must_use_multicast(ctx) {
            return self.use_multicast(message);
        }

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        self.leases.renew(ctx, &duid, message, &mut reply).await?;
        info!("REPLY to RENEW from {}", duid);
        Ok(reply)
    }

    async fn handle_rebind(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        Self::forbid_server_id(message)?;

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        self.leases.rebind(ctx, &duid, message, &mut reply).await?;
        info!("REPLY to REBIND from {}", duid);
        Ok(reply)
    }

    async fn handle_release(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        self.require_our_server_id(message)?;

        if self.must_use_multicast(ctx) {
            return self.use_multicast(message);
        }

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        let released = self.leases.release(&duid, message, &mut reply).await?;
        info!("RELEASE from {}: {} binding(s) removed", duid, released.len());
        Ok(reply)
    }

    async fn handle_decline(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        self.require_our_server_id(message)?;

        if self.must_use_multicast(ctx) {
            return self.use_multicast(message);
        }

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        let declined = self.leases.decline(&duid, message, &mut reply).await?;
        info!("DECLINE from {}: {} binding(s) removed", duid, declined.len());
        Ok(reply)
    }

    async fn handle_confirm(&self, ctx: &RequestContext, message: &Message) -> Result<Message> {
        let duid = Self::require_client_id(message)?;
        Self::forbid_server_id(message)?;

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        self.leases.confirm(ctx, &duid, message, &mut reply).await?;
        Ok(reply)
    }

    fn handle_information_request(&self, message: &Message) -> Result<Message> {
        if let Some(server_id) = message.server_id()? {
            if server_id != self.server_duid {
                return Err(Error::InvalidMessage(format!(
                    "INFORMATION-REQUEST for server {}",
                    server_id
                )));
            }
        }
        if message.options.contains::<IaNaOption>() || message.options.contains::<IaTaOption>() {
            return Err(Error::InvalidMessage(
                "INFORMATION-REQUEST must not carry identity associations".to_string(),
            ));
        }

        let mut reply = self.reply_to(message, MessageType::Reply)?;
        self.leases.request_information(&mut reply);
        Ok(reply)
    }

    async fn handle_relay_forward(
        &self,
        ctx: RequestContext,
        message: &Message,
        depth: usize,
    ) -> Result<Option<Message>> {
        let Framing::Relay {
            hop_count,
            link_address,
            peer_address,
        } = message.framing
        else {
            return Err(Error::InvalidMessage(
                "RELAY-FORW without relay header".to_string(),
            ));
        };

        if depth >= MAX_RELAY_DEPTH {
            return Err(Error::InvalidMessage(format!(
                "Relay nesting deeper than {}",
                MAX_RELAY_DEPTH
            )));
        }

        let relayed = message.options.get::<RelayMessageOption>()?.ok_or_else(|| {
            Error::InvalidMessage("RELAY-FORW without Relay Message option".to_string())
        })?;
        let inner = relayed.message(&self.registry)?;
        debug!("Relayed {} via link {}", inner.message_type, link_address);

        let Some(inner_reply) = self
            .dispatch(ctx.relayed(link_address), &inner, depth + 1)
            .await?
        else {
            return Ok(None);
        };

        let mut reply = Message::new_relay(
            MessageType::RelayReply,
            hop_count,
            link_address,
            peer_address,
        );
        reply
            .options
            .add(RelayMessageOption::from_message(&inner_reply)?);
        if let Some(interface_id) = message.options.get::<InterfaceIdOption>()? {
            reply.options.add(interface_id.clone());
        }

        Ok(Some(reply))
    }

    /// Starts a reply with Server Identifier, echoed Client Identifier and,
    /// when configured, Server Unicast.
    fn reply_to(&self, message: &Message, message_type: MessageType) -> Result<Message> {
        let mut reply = message.create_reply(message_type, &self.server_duid)?;
        if let Some(client_id) = message.options.get::<ClientIdOption>()? {
            reply.options.add(client_id.clone());
        }
        if let Some(address) = self.server_unicast {
            reply.options.add(ServerUnicastOption::new(address));
        }
        Ok(reply)
    }

    /// REQUEST, RENEW, RELEASE and DECLINE sent straight to a global
    /// address are refused unless the server advertised Server Unicast.
    fn must_use_multicast(&self, ctx: &RequestContext) -> bool {
        self.server_unicast.is_none()
            && !ctx.is_relayed()
            && !ctx.client_address.is_unicast_link_local()
    }

    fn use_multicast(&self, message: &Message) -> Result<Message> {
        let client = message
            .client_id()?
            .map(|duid| duid.to_string())
            .unwrap_or_default();
        warn!(
            "{} from {} was unicast, asking client to use multicast",
            message.message_type, client
        );
        let mut reply = self.reply_to(message, MessageType::Reply)?;
        reply.options.add(StatusCodeOption::new(
            StatusCode::UseMulticast,
            "Use multicast",
        ));
        Ok(reply)
    }

    fn require_client_id(message: &Message) -> Result<Duid> {
        message.client_id()?.ok_or_else(|| {
            Error::InvalidMessage(format!(
                "{} without Client Identifier",
                message.message_type
            ))
        })
    }

    fn forbid_server_id(message: &Message) -> Result<()> {
        if message.options.contains::<ServerIdOption>() {
            return Err(Error::InvalidMessage(format!(
                "{} must not carry a Server Identifier",
                message.message_type
            )));
        }
        Ok(())
    }

    fn require_our_server_id(&self, message: &Message) -> Result<()> {
        match message.server_id()? {
            Some(server_id) if server_id == self.server_duid => Ok(()),
            Some(server_id) => Err(Error::InvalidMessage(format!(
                "{} is for server {}",
                message.message_type, server_id
            ))),
            None => Err(Error::InvalidMessage(format!(
                "{} without Server Identifier",
                message.message_type
            ))),
        }
    }

    /// Drops options the client did not ask for.
    ///
    /// Only applies when the request carries an Option Request option.
    fn filter_requested(request: &Message, mut reply: Message) -> Result<Message> {
        if let Some(requested) = request.options.get::<OptionRequestOption>()? {
            reply
                .options
                .retain(|option| option.code() <= MAX_UNSOLICITED_CODE || requested.contains(option.code()));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::{Lifetimes, LinearPool};
    use crate::options::{DnsServersOption, DomainListOption};

    fn server_duid() -> Duid {
        Duid::new(vec![0, 1, 0, 1, 0xaa, 0xbb])
    }

    fn client_duid() -> Duid {
        Duid::new(b"clientid-deb100000001".to_vec())
    }

    fn engine() -> Dhcp6Engine<LinearPool> {
        let registry = Arc::new(OptionRegistry::new());
        let pool = LinearPool::new(
            "2001:db8::100".parse().unwrap(),
            "2001:db8::1ff".parse().unwrap(),
        )
        .unwrap();
        let leases = LeaseManager::new(pool, Lifetimes::default(), registry.clone())
            .with_information(
                &["2001:db8::53".parse().unwrap()],
                &["example.com".to_string()],
            )
            .unwrap();
        Dhcp6Engine::new(server_duid(), leases, registry)
    }

    fn link_local() -> RequestContext {
        RequestContext::new("fe80::1".parse().unwrap())
    }

    fn global() -> RequestContext {
        RequestContext::new("2001:db8::77".parse().unwrap())
    }

    fn message(message_type: MessageType, with_server_id: bool) -> Message {
        let mut message = Message::new(message_type, 0x28da00);
        message.options.add(ClientIdOption::new(&client_duid()));
        if with_server_id {
            message.options.add(ServerIdOption::new(&server_duid()));
        }
        message.options.add(IaNaOption::new(1, 0, 0));
        message
    }

    fn top_status(reply: &Message) -> Option<StatusCode> {
        reply.options.get::<StatusCodeOption>().ok()??.status()
    }

    #[tokio::test]
    async fn test_solicit_advertises() {
        let engine = engine().with_preference(Some(200));
        let reply = engine
            .handle(link_local(), &message(MessageType::Solicit, false))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.message_type, MessageType::Advertise);
        assert_eq!(reply.transaction_id().unwrap(), 0x28da00);
        assert_eq!(reply.server_id().unwrap(), Some(server_duid()));
        assert_eq!(reply.client_id().unwrap(), Some(client_duid()));
        assert_eq!(
            reply.options.get::<PreferenceOption>().unwrap().unwrap().value(),
            200
        );
        assert_eq!(reply.options.count::<IaNaOption>(), 1);
    }

    #[tokio::test]
    async fn test_solicit_with_rapid_commit_replies() {
        let engine = engine().with_commit_on_solicit(false);
        let mut solicit = message(MessageType::Solicit, false);
        solicit.options.add(RapidCommitOption::new());

        let reply = engine.handle(link_local(), &solicit).await.unwrap().unwrap();
        assert_eq!(reply.message_type, MessageType::Reply);
        assert!(reply.options.contains::<RapidCommitOption>());
        assert!(
            engine
                .leases()
                .bindings()
                .non_temporary
                .contains_ia(&client_duid(), 1)
                .await
        );
    }

    #[tokio::test]
    async fn test_solicit_without_commit() {
        let engine = engine().with_commit_on_solicit(false);
        engine
            .handle(link_local(), &message(MessageType::Solicit, false))
            .await
            .unwrap();
        assert!(engine.leases().bindings().non_temporary.is_empty().await);
    }

    #[tokio::test]
    async fn test_solicit_validation() {
        let engine = engine();

        let result = engine
            .handle(link_local(), &message(MessageType::Solicit, true))
            .await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));

        let bare = Message::new(MessageType::Solicit, 1);
        let result = engine.handle(link_local(), &bare).await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_request_for_other_server() {
        let engine = engine();
        let mut request = Message::new(MessageType::Request, 1);
        request.options.add(ClientIdOption::new(&client_duid()));
        request
            .options
            .add(ServerIdOption::new(&Duid::new(vec![9, 9, 9])));

        let result = engine.handle(link_local(), &request).await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_unicast_request_gets_use_multicast() {
        let engine = engine();
        let reply = engine
            .handle(global(), &message(MessageType::Request, true))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.message_type, MessageType::Reply);
        assert_eq!(top_status(&reply), Some(StatusCode::UseMulticast));
        assert!(!reply.options.contains::<IaNaOption>());
        assert!(engine.leases().bindings().non_temporary.is_empty().await);
    }

    #[tokio::test]
    async fn test_unicast_allowed_with_server_unicast() {
        let unicast: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let engine = engine().with_server_unicast(Some(unicast));
        let reply = engine
            .handle(global(), &message(MessageType::Request, true))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(top_status(&reply), None);
        assert_eq!(
            reply
                .options
                .get::<ServerUnicastOption>()
                .unwrap()
                .unwrap()
                .address(),
            unicast
        );
        assert_eq!(reply.options.count::<IaNaOption>(), 1);
    }

    #[tokio::test]
    async fn test_rebind_unbound_is_not_answered() {
        let engine = engine();
        let reply = engine
            .handle(link_local(), &message(MessageType::Rebind, false))
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_confirm_without_addresses_is_not_answered() {
        let engine = engine();
        let reply = engine
            .handle(link_local(), &message(MessageType::Confirm, false))
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_server_messages_are_invalid() {
        let engine = engine();
        for message_type in [
            MessageType::Advertise,
            MessageType::Reply,
            MessageType::Reconfigure,
        ] {
            let result = engine.handle(link_local(), &message(message_type, true)).await;
            assert!(matches!(result, Err(Error::InvalidMessage(_))));
        }

        let relay_reply = Message::new_relay(
            MessageType::RelayReply,
            0,
            Ipv6Addr::UNSPECIFIED,
            Ipv6Addr::UNSPECIFIED,
        );
        let result = engine.handle(link_local(), &relay_reply).await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_unknown_message_type() {
        let engine = engine();
        let result = engine
            .handle(link_local(), &Message::new(MessageType::Unknown(99), 1))
            .await;
        assert!(matches!(result, Err(Error::UnknownMessage(99))));
    }

    struct EchoUnknown;

    #[async_trait]
    impl UnknownMessageHandler for EchoUnknown {
        async fn handle(&self, _ctx: &RequestContext, message: &Message) -> Result<Option<Message>> {
            Ok(Some(message.clone()))
        }
    }

    #[tokio::test]
    async fn test_custom_unknown_handler() {
        let engine = engine().with_unknown_handler(EchoUnknown);
        let unknown = Message::new(MessageType::Unknown(42), 7);
        let reply = engine.handle(link_local(), &unknown).await.unwrap();
        assert_eq!(reply, Some(unknown));
    }

    struct DnsUnknown;

    #[async_trait]
    impl UnknownMessageHandler for DnsUnknown {
        async fn handle(&self, _ctx: &RequestContext, message: &Message) -> Result<Option<Message>> {
            let mut reply = message.create_reply(MessageType::Reply, &server_duid())?;
            reply
                .options
                .add(DnsServersOption::new(&["2001:db8::53".parse().unwrap()]));
            Ok(Some(reply))
        }
    }

    #[tokio::test]
    async fn test_unknown_handler_reply_is_filtered_by_oro() {
        let engine = engine().with_unknown_handler(DnsUnknown);

        let mut unknown = Message::new(MessageType::Unknown(42), 7);
        unknown.options.add(OptionRequestOption::new(&[24]));
        let reply = engine.handle(link_local(), &unknown).await.unwrap().unwrap();
        assert!(!reply.options.contains::<DnsServersOption>());
        assert!(reply.options.contains::<ServerIdOption>());

        let unknown = Message::new(MessageType::Unknown(42), 8);
        let reply = engine.handle(link_local(), &unknown).await.unwrap().unwrap();
        assert!(reply.options.contains::<DnsServersOption>());
    }

    #[tokio::test]
    async fn test_unicast_release_and_decline_get_use_multicast() {
        let engine = engine();
        engine
            .handle(link_local(), &message(MessageType::Request, true))
            .await
            .unwrap();

        for message_type in [MessageType::Release, MessageType::Decline] {
            let reply = engine
                .handle(global(), &message(message_type, true))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(top_status(&reply), Some(StatusCode::UseMulticast));
            assert!(!reply.options.contains::<IaNaOption>());
        }

        assert!(
            engine
                .leases()
                .bindings()
                .non_temporary
                .contains_ia(&client_duid(), 1)
                .await
        );
    }

    #[tokio::test]
    async fn test_information_request_filters_by_oro() {
        let engine = engine();

        let mut request = Message::new(MessageType::InformationRequest, 5);
        request.options.add(OptionRequestOption::new(&[23]));
        let reply = engine.handle(global(), &request).await.unwrap().unwrap();
        assert!(reply.options.contains::<DnsServersOption>());
        assert!(!reply.options.contains::<DomainListOption>());
        assert!(reply.options.contains::<ServerIdOption>());

        let request = Message::new(MessageType::InformationRequest, 6);
        let reply = engine.handle(global(), &request).await.unwrap().unwrap();
        assert!(reply.options.contains::<DnsServersOption>());
        assert!(reply.options.contains::<DomainListOption>());
    }

    #[tokio::test]
    async fn test_information_request_with_ia_is_invalid() {
        let engine = engine();
        let result = engine
            .handle(link_local(), &message(MessageType::InformationRequest, false))
            .await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_relay_forward_wraps_reply() {
        let engine = engine();
        let link: Ipv6Addr = "2001:db8:1::1".parse().unwrap();
        let peer: Ipv6Addr = "fe80::abcd".parse().unwrap();

        let inner = message(MessageType::Request, true);
        let mut relay = Message::new_relay(MessageType::RelayForward, 1, link, peer);
        relay.options.add(RelayMessageOption::from_message(&inner).unwrap());
        relay.options.add(InterfaceIdOption::new(b"port-7"));

        // Relayed traffic bypasses the unicast gate.
        let reply = engine.handle(global(), &relay).await.unwrap().unwrap();
        assert_eq!(reply.message_type, MessageType::RelayReply);
        assert_eq!(
            reply.framing,
            Framing::Relay {
                hop_count: 1,
                link_address: link,
                peer_address: peer,
            }
        );
        assert_eq!(
            reply.options.get::<InterfaceIdOption>().unwrap().unwrap().id(),
            b"port-7"
        );

        let inner_reply = reply
            .options
            .get::<RelayMessageOption>()
            .unwrap()
            .unwrap()
            .message(engine.registry())
            .unwrap();
        assert_eq!(inner_reply.message_type, MessageType::Reply);
        assert_eq!(inner_reply.transaction_id().unwrap(), 0x28da00);
        assert_eq!(top_status(&inner_reply), None);
        assert_eq!(inner_reply.options.count::<IaNaOption>(), 1);
    }

    #[tokio::test]
    async fn test_relay_forward_without_inner_reply() {
        let engine = engine();
        let inner = message(MessageType::Rebind, false);
        let mut relay = Message::new_relay(
            MessageType::RelayForward,
            0,
            "2001:db8:1::1".parse().unwrap(),
            "fe80::2".parse().unwrap(),
        );
        relay.options.add(RelayMessageOption::from_message(&inner).unwrap());

        assert!(engine.handle(link_local(), &relay).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relay_forward_requires_relay_message() {
        let engine = engine();
        let relay = Message::new_relay(
            MessageType::RelayForward,
            0,
            Ipv6Addr::UNSPECIFIED,
            Ipv6Addr::UNSPECIFIED,
        );
        let result = engine.handle(link_local(), &relay).await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    fn relay(inner: &Message, hop_count: u8, link_address: Ipv6Addr) -> Message {
        let mut relay = Message::new_relay(
            MessageType::RelayForward,
            hop_count,
            link_address,
            "fe80::2".parse().unwrap(),
        );
        relay.options.add(RelayMessageOption::from_message(inner).unwrap());
        relay
    }

    fn unwrap_relay(reply: &Message, registry: &OptionRegistry) -> Message {
        reply
            .options
            .get::<RelayMessageOption>()
            .unwrap()
            .unwrap()
            .message(registry)
            .unwrap()
    }

    struct RecordContext(Arc<tokio::sync::Mutex<Option<RequestContext>>>);

    #[async_trait]
    impl UnknownMessageHandler for RecordContext {
        async fn handle(&self, ctx: &RequestContext, message: &Message) -> Result<Option<Message>> {
            *self.0.lock().await = Some(*ctx);
            Ok(Some(message.create_reply(MessageType::Reply, &server_duid())?))
        }
    }

    #[tokio::test]
    async fn test_nested_relay_forward() {
        let seen = Arc::new(tokio::sync::Mutex::new(None));
        let engine = engine().with_unknown_handler(RecordContext(seen.clone()));
        let outer_link: Ipv6Addr = "2001:db8:1::1".parse().unwrap();
        let inner_link: Ipv6Addr = "2001:db8:2::1".parse().unwrap();

        let request = Message::new(MessageType::Unknown(42), 0x010203);
        let nested = relay(&relay(&request, 0, inner_link), 1, outer_link);

        let reply = engine.handle(global(), &nested).await.unwrap().unwrap();
        let recorded = *seen.lock().await;
        assert_eq!(recorded.unwrap().link_address, Some(inner_link));

        assert_eq!(reply.message_type, MessageType::RelayReply);
        assert!(matches!(
            reply.framing,
            Framing::Relay { hop_count: 1, link_address, .. } if link_address == outer_link
        ));

        let middle = unwrap_relay(&reply, engine.registry());
        assert_eq!(middle.message_type, MessageType::RelayReply);
        assert!(matches!(
            middle.framing,
            Framing::Relay { hop_count: 0, link_address, .. } if link_address == inner_link
        ));

        let innermost = unwrap_relay(&middle, engine.registry());
        assert_eq!(innermost.message_type, MessageType::Reply);
        assert_eq!(innermost.transaction_id().unwrap(), 0x010203);
    }

    #[tokio::test]
    async fn test_relay_nesting_limit() {
        let engine = engine();
        let link: Ipv6Addr = "2001:db8:1::1".parse().unwrap();
        let mut nested = Message::new(MessageType::InformationRequest, 9);
        for hop in 0..MAX_RELAY_DEPTH {
            nested = relay(&nested, hop as u8, link);
        }

        let reply = engine.handle(link_local(), &nested).await.unwrap();
        assert!(reply.is_some());

        let too_deep = relay(&nested, MAX_RELAY_DEPTH as u8, link);
        let result = engine.handle(link_local(), &too_deep).await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_request_context() {
        let ctx = link_local();
        assert!(!ctx.is_relayed());
        let relayed = ctx.relayed("2001:db8::1".parse().unwrap());
        assert!(relayed.is_relayed());
        assert_eq!(relayed.client_address, ctx.client_address);
    }
}
