//! Protobuf envelope for dnstap events.
//!
//! Field numbers follow the published `dnstap.proto` schema so that any
//! dnstap collector can decode the payloads. Every field except the two
//! `type` fields is optional and omitted from the encoding when unset.

/// Top-level dnstap record
#[derive(Clone, PartialEq, prost::Message)]
pub struct Dnstap {
    /// Server identity, e.g. hostname
    #[prost(bytes = "vec", optional, tag = "1")]
    pub identity: Option<Vec<u8>>,
    /// Server version string
    #[prost(bytes = "vec", optional, tag = "2")]
    pub version: Option<Vec<u8>>,
    /// Free-form extra data
    #[prost(bytes = "vec", optional, tag = "3")]
    pub extra: Option<Vec<u8>>,
    /// The DNS event
    #[prost(message, optional, tag = "14")]
    pub message: Option<Message>,
    /// Record type, always [`DnstapType::Message`]
    #[prost(enumeration = "DnstapType", required, tag = "15")]
    pub r#type: i32,
}

/// Kind of payload carried by a [`Dnstap`] record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DnstapType {
    /// A [`Message`]
    Message = 1,
}

/// One DNS transaction observed at a point in the resolution path
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    /// Observation point
    #[prost(enumeration = "MessageType", required, tag = "1")]
    pub r#type: i32,
    /// Address family of the addresses below
    #[prost(enumeration = "SocketFamily", optional, tag = "2")]
    pub socket_family: Option<i32>,
    /// Transport protocol
    #[prost(enumeration = "SocketProtocol", optional, tag = "3")]
    pub socket_protocol: Option<i32>,
    /// Raw initiator address (4 or 16 bytes)
    #[prost(bytes = "vec", optional, tag = "4")]
    pub query_address: Option<Vec<u8>>,
    /// Raw responder address (4 or 16 bytes)
    #[prost(bytes = "vec", optional, tag = "5")]
    pub response_address: Option<Vec<u8>>,
    /// Initiator port
    #[prost(uint32, optional, tag = "6")]
    pub query_port: Option<u32>,
    /// Responder port
    #[prost(uint32, optional, tag = "7")]
    pub response_port: Option<u32>,
    /// Query time, seconds since the epoch
    #[prost(uint64, optional, tag = "8")]
    pub query_time_sec: Option<u64>,
    /// Query time, nanosecond part
    #[prost(fixed32, optional, tag = "9")]
    pub query_time_nsec: Option<u32>,
    /// Query in DNS wire format
    #[prost(bytes = "vec", optional, tag = "10")]
    pub query_message: Option<Vec<u8>>,
    /// Zone (bailiwick) in DNS wire format
    #[prost(bytes = "vec", optional, tag = "11")]
    pub query_zone: Option<Vec<u8>>,
    /// Response time, seconds since the epoch
    #[prost(uint64, optional, tag = "12")]
    pub response_time_sec: Option<u64>,
    /// Response time, nanosecond part
    #[prost(fixed32, optional, tag = "13")]
    pub response_time_nsec: Option<u32>,
    /// Response in DNS wire format
    #[prost(bytes = "vec", optional, tag = "14")]
    pub response_message: Option<Vec<u8>>,
    /// Operator policy applied to the transaction
    #[prost(message, optional, tag = "15")]
    pub policy: Option<Policy>,
    /// HTTP version, only for DoH
    #[prost(enumeration = "HttpProtocol", optional, tag = "16")]
    pub http_protocol: Option<i32>,
}

/// Observation points
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    /// Query received by an authoritative server
    AuthQuery = 1,
    /// Response sent by an authoritative server
    AuthResponse = 2,
    /// Query sent by a resolver
    ResolverQuery = 3,
    /// Response received by a resolver
    ResolverResponse = 4,
    /// Query received from a client
    ClientQuery = 5,
    /// Response sent to a client
    ClientResponse = 6,
    /// Query sent by a forwarder
    ForwarderQuery = 7,
    /// Response received by a forwarder
    ForwarderResponse = 8,
    /// Query sent by a stub resolver
    StubQuery = 9,
    /// Response received by a stub resolver
    StubResponse = 10,
    /// Query sent by a tool
    ToolQuery = 11,
    /// Response received by a tool
    ToolResponse = 12,
    /// Dynamic update received
    UpdateQuery = 13,
    /// Dynamic update response sent
    UpdateResponse = 14,
}

impl MessageType {
    /// Upper-case name as used in dnstap text output
    pub fn name(self) -> &'static str {
        match self {
            MessageType::AuthQuery => "AUTH_QUERY",
            MessageType::AuthResponse => "AUTH_RESPONSE",
            MessageType::ResolverQuery => "RESOLVER_QUERY",
            MessageType::ResolverResponse => "RESOLVER_RESPONSE",
            MessageType::ClientQuery => "CLIENT_QUERY",
            MessageType::ClientResponse => "CLIENT_RESPONSE",
            MessageType::ForwarderQuery => "FORWARDER_QUERY",
            MessageType::ForwarderResponse => "FORWARDER_RESPONSE",
            MessageType::StubQuery => "STUB_QUERY",
            MessageType::StubResponse => "STUB_RESPONSE",
            MessageType::ToolQuery => "TOOL_QUERY",
            MessageType::ToolResponse => "TOOL_RESPONSE",
            MessageType::UpdateQuery => "UPDATE_QUERY",
            MessageType::UpdateResponse => "UPDATE_RESPONSE",
        }
    }
}

/// Address family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SocketFamily {
    /// IPv4
    Inet = 1,
    /// IPv6
    Inet6 = 2,
}

/// Transport protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SocketProtocol {
    /// Plain UDP
    Udp = 1,
    /// Plain TCP
    Tcp = 2,
    /// DNS over TLS
    Dot = 3,
    /// DNS over HTTPS
    Doh = 4,
    /// DNSCrypt over UDP
    DnsCryptUdp = 5,
    /// DNSCrypt over TCP
    DnsCryptTcp = 6,
    /// DNS over QUIC
    Doq = 7,
}

/// HTTP version of a DoH transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum HttpProtocol {
    /// HTTP/1.1
    Http1 = 1,
    /// HTTP/2
    Http2 = 2,
    /// HTTP/3
    Http3 = 3,
}

/// Operator policy (e.g. RPZ) applied to a transaction
#[derive(Clone, PartialEq, prost::Message)]
pub struct Policy {
    /// Policy mechanism, e.g. "RPZ"
    #[prost(string, optional, tag = "1")]
    pub r#type: Option<String>,
    /// Rule that matched
    #[prost(bytes = "vec", optional, tag = "2")]
    pub rule: Option<Vec<u8>>,
    /// Action taken
    #[prost(enumeration = "PolicyAction", optional, tag = "3")]
    pub action: Option<i32>,
    /// What triggered the rule
    #[prost(enumeration = "PolicyMatch", optional, tag = "4")]
    pub r#match: Option<i32>,
    /// Value that matched
    #[prost(bytes = "vec", optional, tag = "5")]
    pub value: Option<Vec<u8>>,
}

/// Policy action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PolicyAction {
    /// Answer NXDOMAIN
    NxDomain = 1,
    /// Answer NODATA
    NoData = 2,
    /// Pass through
    Pass = 3,
    /// Drop the query
    Drop = 4,
    /// Truncate the response
    Truncate = 5,
    /// Answer with local data
    LocalData = 6,
}

/// Policy trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PolicyMatch {
    /// Query name
    Qname = 1,
    /// Client address
    ClientIp = 2,
    /// Address in the response
    ResponseIp = 3,
    /// Name server name
    NsName = 4,
    /// Name server address
    NsIp = 5,
}
