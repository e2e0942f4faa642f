//! # Linux rtnetlink adapter
//!
//! Implements [`RouteLookup`] and [`AddressTable`] over a raw
//! `NETLINK_ROUTE` socket. Every request opens its own socket, so the
//! adapter holds no state and is freely shared across threads. Replies are
//! bounded by a 5 second receive timeout.
//!
//! Wire layout (native endian):
//!
//! ```text
//! nlmsghdr   len:u32 type:u16 flags:u16 seq:u32 pid:u32        16 bytes
//! ifaddrmsg  family:u8 prefixlen:u8 flags:u8 scope:u8 index:u32  8 bytes
//! rtmsg      family dst_len src_len tos table proto scope type:u8 flags:u32  12 bytes
//! ifinfomsg  family:u8 pad:u8 type:u16 index:i32 flags:u32 change:u32  16 bytes
//! rtattr     len:u16 type:u16 payload, padded to 4
//! ```

use std::io;
use std::net::Ipv6Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use tracing::trace;

use crate::domain::{
    AddressFlags, AddressSpec, InterfaceAddress, InterfaceIndex, KernelError, RouteEntry,
};
use crate::ports::outbound::{AddressTable, RouteLookup};

// =============================================================================
// PROTOCOL CONSTANTS
// =============================================================================

const NLMSG_HDR_LEN: usize = 16;
const IFADDRMSG_LEN: usize = 8;
const RTMSG_LEN: usize = 12;
const IFINFOMSG_LEN: usize = 16;
const RTATTR_HDR_LEN: usize = 4;

const NLMSG_NOOP: u16 = 1;
const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;

const RTM_NEWLINK: u16 = 16;
const RTM_GETLINK: u16 = 18;
const RTM_NEWADDR: u16 = 20;
const RTM_DELADDR: u16 = 21;
const RTM_GETADDR: u16 = 22;
const RTM_NEWROUTE: u16 = 24;
const RTM_GETROUTE: u16 = 26;

const NLM_F_REQUEST: u16 = 0x001;
const NLM_F_ACK: u16 = 0x004;
const NLM_F_REPLACE: u16 = 0x100;
const NLM_F_EXCL: u16 = 0x200;
const NLM_F_CREATE: u16 = 0x400;
const NLM_F_DUMP: u16 = 0x300;

const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;
const IFA_CACHEINFO: u16 = 6;
const IFA_FLAGS: u16 = 8;

const RTA_DST: u16 = 1;
const RTA_OIF: u16 = 4;

const IFLA_IFNAME: u16 = 3;

const AF_INET6: u8 = libc::AF_INET6 as u8;
const RT_SCOPE_UNIVERSE: u8 = 0;

const RECV_BUFFER: usize = 64 * 1024;
const RECV_TIMEOUT_SECS: libc::time_t = 5;

// =============================================================================
// ADAPTER
// =============================================================================

/// Kernel ports backed by rtnetlink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetlinkKernel;

impl NetlinkKernel {
    pub fn new() -> Self {
        Self
    }

    fn address_request(
        &self,
        operation: &'static str,
        kind: u16,
        flags: u16,
        spec: &AddressSpec,
    ) -> Result<(), KernelError> {
        trace!(%spec, operation, "netlink address request");
        let request = address_message(kind, flags, spec);
        RouteSocket::open()
            .and_then(|mut socket| socket.transact(request))
            .map(|_| ())
            .map_err(|e| match e.raw_os_error() {
                Some(libc::EEXIST) => KernelError::AddressExists(spec.address),
                Some(libc::EADDRNOTAVAIL) => KernelError::AddressNotFound(spec.address),
                Some(libc::ENODEV) => KernelError::NoSuchInterface(spec.interface),
                _ => netlink_error(operation, e),
            })
    }
}

impl RouteLookup for NetlinkKernel {
    fn routes_to(&self, destination: Ipv6Addr) -> Result<Vec<RouteEntry>, KernelError> {
        let replies = match RouteSocket::open().and_then(|mut s| s.transact(route_message(destination))) {
            Ok(replies) => replies,
            Err(e) if matches!(e.raw_os_error(), Some(libc::ENETUNREACH | libc::EHOSTUNREACH)) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(netlink_error("route get", e)),
        };

        Ok(replies
            .iter()
            .filter(|reply| reply.kind == RTM_NEWROUTE)
            .filter_map(|reply| parse_route(&reply.payload))
            .collect())
    }
}

impl AddressTable for NetlinkKernel {
    fn link_name(&self, interface: InterfaceIndex) -> Result<String, KernelError> {
        let replies = RouteSocket::open()
            .and_then(|mut s| s.transact(link_message(interface)))
            .map_err(|e| match e.raw_os_error() {
                Some(libc::ENODEV) => KernelError::NoSuchInterface(interface),
                _ => netlink_error("link get", e),
            })?;

        replies
            .iter()
            .filter(|reply| reply.kind == RTM_NEWLINK)
            .find_map(|reply| parse_link_name(&reply.payload))
            .ok_or(KernelError::Malformed("link reply without IFLA_IFNAME"))
    }

    fn list_ipv6(&self, interface: InterfaceIndex) -> Result<Vec<InterfaceAddress>, KernelError> {
        let replies = RouteSocket::open()
            .and_then(|mut s| s.transact(address_dump_message(interface)))
            .map_err(|e| netlink_error("address dump", e))?;

        Ok(replies
            .iter()
            .filter(|reply| reply.kind == RTM_NEWADDR)
            .filter_map(|reply| parse_address(&reply.payload, interface))
            .collect())
    }

    fn add(&self, spec: &AddressSpec) -> Result<(), KernelError> {
        self.address_request(
            "address add",
            RTM_NEWADDR,
            NLM_F_CREATE | NLM_F_EXCL | NLM_F_ACK,
            spec,
        )
    }

    fn replace(&self, spec: &AddressSpec) -> Result<(), KernelError> {
        self.address_request(
            "address replace",
            RTM_NEWADDR,
            NLM_F_CREATE | NLM_F_REPLACE | NLM_F_ACK,
            spec,
        )
    }

    fn delete(&self, spec: &AddressSpec) -> Result<(), KernelError> {
        self.address_request("address delete", RTM_DELADDR, NLM_F_ACK, spec)
    }
}

fn netlink_error(operation: &'static str, source: io::Error) -> KernelError {
    KernelError::Netlink { operation, source }
}

// =============================================================================
// SOCKET
// =============================================================================

/// One non-control message from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    kind: u16,
    payload: Vec<u8>,
}

struct RouteSocket {
    fd: OwnedFd,
    pid: u32,
    seq: u32,
}

impl RouteSocket {
    fn open() -> io::Result<Self> {
        // SAFETY: plain syscall, the result is checked before use.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_ROUTE,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain data; zeroed means "kernel assigns pid".
        let mut local: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        local.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let addr_len = std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;

        // SAFETY: pointer and length describe `local`.
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &local as *const libc::sockaddr_nl as *const libc::sockaddr,
                addr_len,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut bound_len = addr_len;
        // SAFETY: pointer and length describe `local`, which outlives the call.
        let ret = unsafe {
            libc::getsockname(
                fd.as_raw_fd(),
                &mut local as *mut libc::sockaddr_nl as *mut libc::sockaddr,
                &mut bound_len,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let timeout = libc::timeval {
            tv_sec: RECV_TIMEOUT_SECS,
            tv_usec: 0,
        };
        // SAFETY: pointer and length describe `timeout`.
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd,
            pid: local.nl_pid,
            seq: 1,
        })
    }

    /// Send one request and collect replies until DONE or an ACK/error.
    fn transact(&mut self, request: Request) -> io::Result<Vec<Reply>> {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        let message = request.finish(seq, self.pid);

        // SAFETY: pointer and length describe `message`.
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                message.as_ptr() as *const libc::c_void,
                message.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut replies = Vec::new();
        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            // SAFETY: pointer and length describe `buf`.
            let received = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if received < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "netlink reply timed out",
                    ));
                }
                return Err(err);
            }
            if received == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "netlink socket closed",
                ));
            }

            if collect_replies(&buf[..received as usize], &mut replies)? {
                return Ok(replies);
            }
        }
    }
}

/// Append the data messages in `datagram` to `replies`.
///
/// Returns `true` once the exchange is complete (DONE, or an ERROR frame
/// carrying errno 0, the ACK).
fn collect_replies(datagram: &[u8], replies: &mut Vec<Reply>) -> io::Result<bool> {
    let mut offset = 0;
    while offset + NLMSG_HDR_LEN <= datagram.len() {
        let len = read_u32(datagram, offset).unwrap_or(0) as usize;
        let kind = read_u16(datagram, offset + 4).unwrap_or(0);
        if len < NLMSG_HDR_LEN || offset + len > datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "truncated netlink message",
            ));
        }
        let payload = &datagram[offset + NLMSG_HDR_LEN..offset + len];

        match kind {
            NLMSG_DONE => return Ok(true),
            NLMSG_ERROR => {
                let errno = read_i32(payload, 0).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "short netlink error message")
                })?;
                if errno < 0 {
                    return Err(io::Error::from_raw_os_error(-errno));
                }
                return Ok(true);
            }
            NLMSG_NOOP => {}
            _ => replies.push(Reply {
                kind,
                payload: payload.to_vec(),
            }),
        }
        offset += align4(len);
    }
    Ok(false)
}

// =============================================================================
// REQUEST BUILDING
// =============================================================================

/// Netlink request under construction. Length, sequence and port id are
/// filled in by [`Request::finish`].
#[derive(Debug, Clone)]
struct Request {
    buf: Vec<u8>,
}

impl Request {
    fn new(kind: u16, flags: u16) -> Self {
        let mut buf = vec![0u8; NLMSG_HDR_LEN];
        buf[4..6].copy_from_slice(&kind.to_ne_bytes());
        buf[6..8].copy_from_slice(&(NLM_F_REQUEST | flags).to_ne_bytes());
        Self { buf }
    }

    /// Append the family header (ifaddrmsg, rtmsg, ...).
    fn header(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self.pad();
        self
    }

    fn attr(mut self, kind: u16, payload: &[u8]) -> Self {
        let len = (RTATTR_HDR_LEN + payload.len()) as u16;
        self.buf.extend_from_slice(&len.to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(payload);
        self.pad();
        self
    }

    fn pad(&mut self) {
        let aligned = align4(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    fn finish(mut self, seq: u32, pid: u32) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
        self.buf
    }
}

fn ifaddrmsg(prefix_len: u8, flags: u8, interface: InterfaceIndex) -> [u8; IFADDRMSG_LEN] {
    let mut msg = [0u8; IFADDRMSG_LEN];
    msg[0] = AF_INET6;
    msg[1] = prefix_len;
    msg[2] = flags;
    msg[3] = RT_SCOPE_UNIVERSE;
    msg[4..8].copy_from_slice(&interface.get().to_ne_bytes());
    msg
}

fn lifetime_secs(duration: std::time::Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}

/// RTM_NEWADDR / RTM_DELADDR for one managed address.
fn address_message(kind: u16, flags: u16, spec: &AddressSpec) -> Request {
    let addr_flags = if spec.no_dad { AddressFlags::NODAD } else { 0 };
    let octets = spec.address.octets();
    let request = Request::new(kind, flags)
        .header(&ifaddrmsg(spec.prefix_len, addr_flags as u8, spec.interface))
        .attr(IFA_LOCAL, &octets)
        .attr(IFA_ADDRESS, &octets);

    if kind == RTM_DELADDR {
        return request;
    }

    // ifa_cacheinfo: preferred, valid, cstamp, tstamp
    let mut cache_info = [0u8; 16];
    cache_info[0..4].copy_from_slice(&lifetime_secs(spec.lifetimes.preferred).to_ne_bytes());
    cache_info[4..8].copy_from_slice(&lifetime_secs(spec.lifetimes.valid).to_ne_bytes());

    request
        .attr(IFA_CACHEINFO, &cache_info)
        .attr(IFA_FLAGS, &addr_flags.to_ne_bytes())
}

fn address_dump_message(interface: InterfaceIndex) -> Request {
    Request::new(RTM_GETADDR, NLM_F_DUMP).header(&ifaddrmsg(0, 0, interface))
}

fn route_message(destination: Ipv6Addr) -> Request {
    let mut rtmsg = [0u8; RTMSG_LEN];
    rtmsg[0] = AF_INET6;
    rtmsg[1] = 128;
    Request::new(RTM_GETROUTE, NLM_F_ACK)
        .header(&rtmsg)
        .attr(RTA_DST, &destination.octets())
}

fn link_message(interface: InterfaceIndex) -> Request {
    let mut ifinfo = [0u8; IFINFOMSG_LEN];
    ifinfo[4..8].copy_from_slice(&(interface.get() as i32).to_ne_bytes());
    Request::new(RTM_GETLINK, NLM_F_ACK).header(&ifinfo)
}

// =============================================================================
// REPLY PARSING
// =============================================================================

/// Iterator over the rtattr TLVs of a message body.
struct Attrs<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Attrs<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = read_u16(self.data, 0)? as usize;
        let kind = read_u16(self.data, 2)?;
        if len < RTATTR_HDR_LEN || len > self.data.len() {
            return None;
        }
        let payload = &self.data[RTATTR_HDR_LEN..len];
        self.data = self.data.get(align4(len)..).unwrap_or(&[]);
        // Strip NLA_F_NESTED / NLA_F_NET_BYTEORDER.
        Some((kind & 0x3fff, payload))
    }
}

fn attrs(data: &[u8]) -> Attrs<'_> {
    Attrs { data }
}

fn ipv6_payload(payload: &[u8]) -> Option<Ipv6Addr> {
    let octets: [u8; 16] = payload.get(..16)?.try_into().ok()?;
    Some(Ipv6Addr::from(octets))
}

/// One RTM_NEWADDR body, if it is IPv6 and on `interface`.
fn parse_address(payload: &[u8], interface: InterfaceIndex) -> Option<InterfaceAddress> {
    let header = payload.get(..IFADDRMSG_LEN)?;
    if header[0] != AF_INET6 || read_u32(header, 4)? != interface.get() {
        return None;
    }
    let prefix_len = header[1];
    let mut flags = u32::from(header[2]);
    let mut address = None;
    let mut local = None;

    for (kind, value) in attrs(&payload[IFADDRMSG_LEN..]) {
        match kind {
            IFA_ADDRESS => address = ipv6_payload(value),
            IFA_LOCAL => local = ipv6_payload(value),
            IFA_FLAGS => flags = read_u32(value, 0).unwrap_or(flags),
            _ => {}
        }
    }

    let address = address.or(local)?;
    Some(InterfaceAddress::new(address, prefix_len).with_flags(AddressFlags::from_bits(flags)))
}

/// One RTM_NEWROUTE body.
fn parse_route(payload: &[u8]) -> Option<RouteEntry> {
    let header = payload.get(..RTMSG_LEN)?;
    if header[0] != AF_INET6 {
        return None;
    }
    let interface = attrs(&payload[RTMSG_LEN..])
        .find(|(kind, _)| *kind == RTA_OIF)
        .and_then(|(_, value)| read_u32(value, 0))
        .map(InterfaceIndex::new);
    Some(RouteEntry { interface })
}

/// IFLA_IFNAME of one RTM_NEWLINK body.
fn parse_link_name(payload: &[u8]) -> Option<String> {
    let body = payload.get(IFINFOMSG_LEN..)?;
    attrs(body)
        .find(|(kind, _)| *kind == IFLA_IFNAME)
        .and_then(|(_, value)| std::str::from_utf8(value).ok())
        .map(|name| name.trim_end_matches('\0').to_string())
}

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_ne_bytes(buf.get(at..at + 2)?.try_into().ok()?))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_ne_bytes(buf.get(at..at + 4)?.try_into().ok()?))
}

fn read_i32(buf: &[u8], at: usize) -> Option<i32> {
    Some(i32::from_ne_bytes(buf.get(at..at + 4)?.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Lifetimes;
    use std::time::Duration;

    const ETH0: InterfaceIndex = InterfaceIndex::new(2);

    fn managed_spec() -> AddressSpec {
        AddressSpec {
            interface: ETH0,
            address: "2001:db8::1111".parse().unwrap(),
            prefix_len: 64,
            lifetimes: Lifetimes {
                valid: Duration::from_secs(90),
                preferred: Duration::ZERO,
            },
            no_dad: true,
        }
    }

    fn frame(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut request = Request::new(kind, 0);
        request.buf.extend_from_slice(body);
        request.pad();
        request.finish(1, 0)
    }

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(21), 24);
    }

    #[test]
    fn test_attr_padding() {
        let request = Request::new(RTM_GETLINK, 0).attr(IFLA_IFNAME, b"eth0\0");
        // 16 header + 4 rtattr header + 5 payload, padded to 28
        assert_eq!(request.buf.len(), 28);
        assert_eq!(read_u16(&request.buf, 16), Some(9));
        assert_eq!(read_u16(&request.buf, 18), Some(IFLA_IFNAME));
    }

    #[test]
    fn test_add_request_layout() {
        let message = address_message(
            RTM_NEWADDR,
            NLM_F_CREATE | NLM_F_EXCL | NLM_F_ACK,
            &managed_spec(),
        )
        .finish(7, 42);

        // header + ifaddrmsg + 2 * (4 + 16) + (4 + 16) + (4 + 4)
        assert_eq!(message.len(), 16 + 8 + 40 + 20 + 8);
        assert_eq!(read_u32(&message, 0), Some(message.len() as u32));
        assert_eq!(read_u16(&message, 4), Some(RTM_NEWADDR));
        assert_eq!(
            read_u16(&message, 6),
            Some(NLM_F_REQUEST | NLM_F_CREATE | NLM_F_EXCL | NLM_F_ACK)
        );
        assert_eq!(read_u32(&message, 8), Some(7));
        assert_eq!(read_u32(&message, 12), Some(42));

        let ifa = &message[NLMSG_HDR_LEN..NLMSG_HDR_LEN + IFADDRMSG_LEN];
        assert_eq!(ifa[0], AF_INET6);
        assert_eq!(ifa[1], 64);
        assert_eq!(u32::from(ifa[2]), AddressFlags::NODAD);
        assert_eq!(read_u32(ifa, 4), Some(2));

        let found: Vec<_> = attrs(&message[NLMSG_HDR_LEN + IFADDRMSG_LEN..]).collect();
        let kinds: Vec<u16> = found.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![IFA_LOCAL, IFA_ADDRESS, IFA_CACHEINFO, IFA_FLAGS]);

        let cache = found[2].1;
        assert_eq!(read_u32(cache, 0), Some(0));
        assert_eq!(read_u32(cache, 4), Some(90));
        assert_eq!(read_u32(found[3].1, 0), Some(AddressFlags::NODAD));
    }

    #[test]
    fn test_delete_request_has_no_lifetimes() {
        let message = address_message(RTM_DELADDR, NLM_F_ACK, &managed_spec()).finish(1, 0);
        let kinds: Vec<u16> = attrs(&message[NLMSG_HDR_LEN + IFADDRMSG_LEN..])
            .map(|(k, _)| k)
            .collect();
        assert_eq!(kinds, vec![IFA_LOCAL, IFA_ADDRESS]);
    }

    #[test]
    fn test_route_request_layout() {
        let destination: Ipv6Addr = "2001:db8::99".parse().unwrap();
        let message = route_message(destination).finish(1, 0);
        let rtm = &message[NLMSG_HDR_LEN..NLMSG_HDR_LEN + RTMSG_LEN];
        assert_eq!(rtm[0], AF_INET6);
        assert_eq!(rtm[1], 128);
        let (kind, value) = attrs(&message[NLMSG_HDR_LEN + RTMSG_LEN..]).next().unwrap();
        assert_eq!(kind, RTA_DST);
        assert_eq!(ipv6_payload(value), Some(destination));
    }

    #[test]
    fn test_parse_address_reply() {
        let address: Ipv6Addr = "2001:db8::10".parse().unwrap();
        let body = Request::new(0, 0)
            .header(&ifaddrmsg(64, 0, ETH0))
            .attr(IFA_ADDRESS, &address.octets())
            .attr(IFA_FLAGS, &(AddressFlags::TENTATIVE | AddressFlags::PERMANENT).to_ne_bytes())
            .buf[NLMSG_HDR_LEN..]
            .to_vec();

        let parsed = parse_address(&body, ETH0).unwrap();
        assert_eq!(parsed.address, address);
        assert_eq!(parsed.prefix_len, 64);
        assert!(parsed.flags.is_unusable());

        assert!(parse_address(&body, InterfaceIndex::new(3)).is_none());
    }

    #[test]
    fn test_parse_route_reply() {
        let mut rtmsg = [0u8; RTMSG_LEN];
        rtmsg[0] = AF_INET6;
        let body = Request::new(0, 0)
            .header(&rtmsg)
            .attr(RTA_OIF, &5u32.to_ne_bytes())
            .buf[NLMSG_HDR_LEN..]
            .to_vec();

        let route = parse_route(&body).unwrap();
        assert_eq!(route.interface, Some(InterfaceIndex::new(5)));
    }

    #[test]
    fn test_parse_link_name() {
        let body = Request::new(0, 0)
            .header(&[0u8; IFINFOMSG_LEN])
            .attr(IFLA_IFNAME, b"eth0\0")
            .buf[NLMSG_HDR_LEN..]
            .to_vec();
        assert_eq!(parse_link_name(&body).as_deref(), Some("eth0"));
    }

    #[test]
    fn test_collect_replies_until_ack() {
        let mut datagram = frame(RTM_NEWROUTE, &[AF_INET6; 4]);
        datagram.extend(frame(NLMSG_ERROR, &0i32.to_ne_bytes()));

        let mut replies = Vec::new();
        assert!(collect_replies(&datagram, &mut replies).unwrap());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, RTM_NEWROUTE);
    }

    #[test]
    fn test_collect_replies_maps_errno() {
        let datagram = frame(NLMSG_ERROR, &(-libc::EEXIST).to_ne_bytes());
        let err = collect_replies(&datagram, &mut Vec::new()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
    }

    #[test]
    fn test_collect_replies_waits_for_done() {
        let datagram = frame(RTM_NEWADDR, &[0u8; IFADDRMSG_LEN]);
        let mut replies = Vec::new();
        assert!(!collect_replies(&datagram, &mut replies).unwrap());
        assert!(collect_replies(&frame(NLMSG_DONE, &0i32.to_ne_bytes()), &mut replies).unwrap());
        assert_eq!(replies.len(), 1);
    }
}
