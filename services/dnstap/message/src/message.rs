//! The dnstap event model.
//!
//! A [`DnstapMessage`] is an immutable, fully formed event. It is built once
//! with [`DnstapMessageBuilder`], validated there, and then handed off to a
//! writer which only needs to serialize it.

use crate::envelope::{
    Dnstap, DnstapType, HttpProtocol, Message, MessageType, Policy, SocketFamily, SocketProtocol,
};
use crate::name::{build_query, decode_name, encode_name};
use crate::time::Timestamp;
use crate::EncodingError;
use prost::Message as _;
use std::fmt;
use std::net::IpAddr;

/// An immutable dnstap event
#[derive(Debug, Clone, PartialEq)]
pub struct DnstapMessage {
    envelope: Dnstap,
}

impl DnstapMessage {
    /// Start building an event observed at `kind`
    pub fn builder(kind: MessageType) -> DnstapMessageBuilder {
        DnstapMessageBuilder::new(kind)
    }

    /// A TOOL_QUERY event carrying `text` verbatim as the query message,
    /// timestamped now. This is how log lines are exported.
    pub fn tool_query(text: &str) -> Self {
        Self::builder(MessageType::ToolQuery)
            .query_text(text)
            .query_time(Timestamp::now())
            .finish()
    }

    /// Protobuf envelope
    pub fn envelope(&self) -> &Dnstap {
        &self.envelope
    }

    /// The inner DNS message record
    pub fn message(&self) -> Option<&Message> {
        self.envelope.message.as_ref()
    }

    /// Observation point
    pub fn kind(&self) -> MessageType {
        self.message()
            .map(|m| m.r#type())
            .unwrap_or(MessageType::ToolQuery)
    }

    /// Serialize the envelope.
    ///
    /// The required `type` fields are always present, so the result is never
    /// empty.
    pub fn encode(&self) -> Vec<u8> {
        self.envelope.encode_to_vec()
    }

    /// Size of [`encode`](Self::encode)'s output
    pub fn encoded_len(&self) -> usize {
        self.envelope.encoded_len()
    }

    /// Parse a serialized envelope
    pub fn decode(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Ok(Self {
            envelope: Dnstap::decode(bytes)?,
        })
    }
}

impl From<DnstapMessage> for Dnstap {
    fn from(message: DnstapMessage) -> Self {
        message.envelope
    }
}

impl fmt::Display for DnstapMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(message) = self.message() else {
            return f.write_str("-");
        };

        match message.query_address.as_deref().and_then(ip_from_bytes) {
            Some(addr) => write!(f, "{addr}")?,
            None => f.write_str("-")?,
        }
        if let Some(port) = message.query_port {
            write!(f, ":{port}")?;
        }
        write!(f, "\t{}", message.r#type().name())?;

        let zone = message.query_zone.as_deref().and_then(decode_name);
        match (zone, &message.query_message) {
            (Some(zone), _) => write!(f, "\t{zone}"),
            (None, Some(query)) => write!(f, "\t{} bytes", query.len()),
            (None, None) => Ok(()),
        }
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Builder for [`DnstapMessage`]. Every field is optional; unset fields are
/// left out of the encoding.
#[derive(Debug, Clone)]
pub struct DnstapMessageBuilder {
    identity: Option<Vec<u8>>,
    version: Option<Vec<u8>>,
    extra: Option<Vec<u8>>,
    message: Message,
}

impl DnstapMessageBuilder {
    /// Create a builder for an event observed at `kind`
    pub fn new(kind: MessageType) -> Self {
        Self {
            identity: None,
            version: None,
            extra: None,
            message: Message {
                r#type: kind as i32,
                ..Default::default()
            },
        }
    }

    /// Server identity
    pub fn identity(mut self, identity: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Server version
    pub fn version(mut self, version: impl Into<Vec<u8>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Free-form extra data
    pub fn extra(mut self, extra: impl Into<Vec<u8>>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Address family; inferred from the first address when not set
    pub fn socket_family(mut self, family: SocketFamily) -> Self {
        self.message.socket_family = Some(family as i32);
        self
    }

    /// Transport protocol
    pub fn socket_protocol(mut self, protocol: SocketProtocol) -> Self {
        self.message.socket_protocol = Some(protocol as i32);
        self
    }

    /// Initiator address
    pub fn query_address(mut self, addr: IpAddr) -> Self {
        self.infer_family(addr);
        self.message.query_address = Some(ip_bytes(addr));
        self
    }

    /// Responder address
    pub fn response_address(mut self, addr: IpAddr) -> Self {
        self.infer_family(addr);
        self.message.response_address = Some(ip_bytes(addr));
        self
    }

    /// Initiator port
    pub fn query_port(mut self, port: u16) -> Self {
        self.message.query_port = Some(port.into());
        self
    }

    /// Responder port
    pub fn response_port(mut self, port: u16) -> Self {
        self.message.response_port = Some(port.into());
        self
    }

    /// Query timestamp
    pub fn query_time(mut self, time: Timestamp) -> Self {
        self.message.query_time_sec = Some(time.secs);
        self.message.query_time_nsec = Some(time.nanos);
        self
    }

    /// Response timestamp
    pub fn response_time(mut self, time: Timestamp) -> Self {
        self.message.response_time_sec = Some(time.secs);
        self.message.response_time_nsec = Some(time.nanos);
        self
    }

    /// Raw query in DNS wire format
    pub fn query_message(mut self, wire: impl Into<Vec<u8>>) -> Self {
        self.message.query_message = Some(wire.into());
        self
    }

    /// Store `text` as UTF-8 in the query message field. Meant for synthetic
    /// traffic and log lines, not real DNS payloads.
    pub fn query_text(self, text: &str) -> Self {
        self.query_message(text.as_bytes())
    }

    /// Build a minimal A/IN query for `name` and store it as the query
    /// message
    pub fn query_for(self, name: &str) -> Result<Self, EncodingError> {
        let wire = build_query(name)?;
        Ok(self.query_message(wire.to_vec()))
    }

    /// Raw response in DNS wire format
    pub fn response_message(mut self, wire: impl Into<Vec<u8>>) -> Self {
        self.message.response_message = Some(wire.into());
        self
    }

    /// Zone name, encoded to DNS wire format
    pub fn query_zone(mut self, zone: &str) -> Result<Self, EncodingError> {
        self.message.query_zone = Some(encode_name(zone)?.to_vec());
        Ok(self)
    }

    /// Operator policy
    pub fn policy(mut self, policy: Policy) -> Self {
        self.message.policy = Some(policy);
        self
    }

    /// HTTP version; requires [`SocketProtocol::Doh`]
    pub fn http_protocol(mut self, protocol: HttpProtocol) -> Self {
        self.message.http_protocol = Some(protocol as i32);
        self
    }

    /// Validate and build the event
    pub fn build(self) -> Result<DnstapMessage, EncodingError> {
        if self.message.http_protocol.is_some()
            && self.message.socket_protocol != Some(SocketProtocol::Doh as i32)
        {
            return Err(EncodingError::HttpProtocolWithoutDoh);
        }
        Ok(self.finish())
    }

    fn finish(self) -> DnstapMessage {
        DnstapMessage {
            envelope: Dnstap {
                identity: self.identity,
                version: self.version,
                extra: self.extra,
                message: Some(self.message),
                r#type: DnstapType::Message as i32,
            },
        }
    }

    fn infer_family(&mut self, addr: IpAddr) {
        if self.message.socket_family.is_none() {
            let family = match addr {
                IpAddr::V4(_) => SocketFamily::Inet,
                IpAddr::V6(_) => SocketFamily::Inet6,
            };
            self.message.socket_family = Some(family as i32);
        }
    }
}

fn ip_bytes(addr: IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}
