//! DNS probe implementation using raw UDP packets.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

use super::{Check, ProbeError, ProbeTarget};

const DEFAULT_SERVER: &str = "127.0.0.1:53";
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Question types the probe can ask for.
const QUESTION_TYPES: &[(&str, u16)] = &[
    ("A", 1),
    ("NS", 2),
    ("CNAME", 5),
    ("MX", 15),
    ("TXT", 16),
    ("AAAA", 28),
];

/// Resolves the monitor target and expects at least one answer of the
/// configured question type.
#[derive(Debug, Default)]
pub struct DnsProbe {
    /// Server to ask, `host[:port]`.
    pub server: Option<String>,
    pub question: String,
    qtype: u16,
}

impl DnsProbe {
    pub fn new(server: Option<String>, question: Option<String>) -> Self {
        Self {
            server: server.filter(|s| !s.is_empty()),
            question: question.unwrap_or_default(),
            qtype: 0,
        }
    }

    async fn server_addr(&self) -> Result<SocketAddr, ProbeError> {
        let server = self.server.as_deref().unwrap_or(DEFAULT_SERVER);

        if let Ok(addr) = server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = server.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, 53));
        }

        let host = if server.contains(':') {
            server.to_string()
        } else {
            format!("{}:53", server)
        };
        let mut addrs = tokio::net::lookup_host(host.as_str())
            .await
            .map_err(|e| ProbeError::Network(format!("cannot resolve DNS server {}: {}", host, e)))?;
        let addr = addrs
            .next()
            .ok_or_else(|| ProbeError::Network(format!("no address for DNS server {}", host)))?;
        Ok(addr)
    }

    /// Resolve the server, send the question and collect the answers.
    async fn query(&self, address: &str) -> Result<String, ProbeError> {
        let qtype = if self.qtype == 0 { 1 } else { self.qtype };
        let server = self.server_addr().await?;

        let packet = build_dns_query(address, qtype)?;
        let tx_id = u16::from_be_bytes([packet[0], packet[1]]);

        let bind_addr: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to bind socket: {}", e)))?;
        socket
            .connect(server)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;
        socket
            .send(&packet)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

        let mut response = [0u8; 512];
        let n = socket
            .recv(&mut response)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to recv: {}", e)))?;

        let answers = parse_dns_response(&response[..n], tx_id, qtype)?;
        if answers.is_empty() {
            return Err(ProbeError::Dns(format!(
                "no {} record for {}",
                self.question, address
            )));
        }

        Ok(answers.join(","))
    }
}

/// First `nameserver` of the system resolver configuration.
fn system_nameserver() -> Option<String> {
    let conf = std::fs::read_to_string(RESOLV_CONF).ok()?;
    parse_nameserver(&conf)
}

fn parse_nameserver(conf: &str) -> Option<String> {
    conf.lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| l.strip_prefix("nameserver"))
        .map(|rest| rest.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Check for DnsProbe {
    fn validate(&mut self) -> Vec<String> {
        let mut errs = Vec::new();

        self.question = self.question.to_uppercase();
        if self.question.is_empty() {
            self.question = "A".to_string();
        }
        match QUESTION_TYPES.iter().find(|(name, _)| *name == self.question) {
            Some((_, code)) => self.qtype = *code,
            None => errs.push(format!("Unsupported DNS question type: {}", self.question)),
        }

        if self.server.is_none() {
            self.server = system_nameserver();
        }

        errs
    }

    fn describe(&self) -> Vec<String> {
        vec![
            format!("DNS server: {}", self.server.as_deref().unwrap_or(DEFAULT_SERVER)),
            format!("Question: {}", self.question),
        ]
    }

    async fn test(&mut self, target: ProbeTarget<'_>) -> Result<String, ProbeError> {
        tokio::time::timeout(target.timeout, self.query(target.address))
            .await
            .map_err(|_| ProbeError::Timeout(target.timeout))?
    }
}

/// Build a DNS query packet for `name`, recursion desired.
pub fn build_dns_query(name: &str, qtype: u16) -> Result<Vec<u8>, ProbeError> {
    let tx_id: u16 = rand::random();
    let flags: u16 = 0x0100;

    // Header (12 bytes): id, flags, qdcount=1, ancount, nscount, arcount
    let mut packet = Vec::with_capacity(64);
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ProbeError::Dns(format!("invalid domain name: {}", name)));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    packet.extend_from_slice(&qtype.to_be_bytes());
    // QCLASS: IN
    packet.extend_from_slice(&1u16.to_be_bytes());

    Ok(packet)
}

/// Validate a response and render the answers of type `qtype`.
pub fn parse_dns_response(msg: &[u8], tx_id: u16, qtype: u16) -> Result<Vec<String>, ProbeError> {
    if msg.len() < 12 {
        return Err(ProbeError::Dns(format!("response too short: {} bytes", msg.len())));
    }

    let resp_tx_id = u16::from_be_bytes([msg[0], msg[1]]);
    if resp_tx_id != tx_id {
        return Err(ProbeError::Dns(format!(
            "transaction ID mismatch: got {}, expected {}",
            resp_tx_id, tx_id
        )));
    }

    // RCODE is the lower 4 bits of byte 3
    let rcode = msg[3] & 0x0F;
    if rcode != 0 {
        return Err(ProbeError::Dns(format!("server returned RCODE {}", rcode)));
    }

    let qd_count = u16::from_be_bytes([msg[4], msg[5]]);
    let an_count = u16::from_be_bytes([msg[6], msg[7]]);

    let mut offset = 12;
    for _ in 0..qd_count {
        let (_, next) = read_name(msg, offset)?;
        offset = next + 4;
    }

    let mut answers = Vec::new();
    for _ in 0..an_count {
        let (_, next) = read_name(msg, offset)?;
        let fixed = msg
            .get(next..next + 10)
            .ok_or_else(|| truncated(next))?;
        let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
        let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        let rdata_start = next + 10;
        let rdata = msg
            .get(rdata_start..rdata_start + rdlength)
            .ok_or_else(|| truncated(rdata_start))?;

        if rtype == qtype {
            answers.push(render_rdata(msg, rtype, rdata, rdata_start)?);
        }
        offset = rdata_start + rdlength;
    }

    Ok(answers)
}

fn render_rdata(msg: &[u8], rtype: u16, rdata: &[u8], rdata_start: usize) -> Result<String, ProbeError> {
    let rendered = match rtype {
        1 if rdata.len() == 4 => Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string(),
        28 if rdata.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Ipv6Addr::from(octets).to_string()
        }
        2 | 5 => read_name(msg, rdata_start)?.0,
        15 if rdata.len() > 2 => {
            let preference = u16::from_be_bytes([rdata[0], rdata[1]]);
            format!("{} {}", preference, read_name(msg, rdata_start + 2)?.0)
        }
        16 => {
            let mut text = String::new();
            let mut i = 0;
            while i < rdata.len() {
                let len = rdata[i] as usize;
                let chunk = rdata.get(i + 1..i + 1 + len).ok_or_else(|| truncated(rdata_start + i))?;
                text.push_str(&String::from_utf8_lossy(chunk));
                i += 1 + len;
            }
            text
        }
        _ => return Err(ProbeError::Dns(format!("malformed record of type {}", rtype))),
    };
    Ok(rendered)
}

/// Read a possibly compressed domain name, returning it and the offset just
/// past it where it started (compression pointers are not followed for the offset).
fn read_name(msg: &[u8], start: usize) -> Result<(String, usize), ProbeError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut end = None;
    let mut jumps = 0;

    loop {
        let len = *msg.get(pos).ok_or_else(|| truncated(pos))? as usize;
        if len == 0 {
            if end.is_none() {
                end = Some(pos + 1);
            }
            break;
        }
        if len & 0xC0 == 0xC0 {
            let low = *msg.get(pos + 1).ok_or_else(|| truncated(pos + 1))? as usize;
            if end.is_none() {
                end = Some(pos + 2);
            }
            jumps += 1;
            if jumps > 16 {
                return Err(ProbeError::Dns("compression loop in response".to_string()));
            }
            pos = ((len & 0x3F) << 8) | low;
            continue;
        }
        let label = msg.get(pos + 1..pos + 1 + len).ok_or_else(|| truncated(pos))?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += 1 + len;
    }

    Ok((labels.join("."), end.unwrap_or(pos + 1)))
}

fn truncated(offset: usize) -> ProbeError {
    ProbeError::Dns(format!("response truncated at byte {}", offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A response to `query` carrying one A record per address.
    fn answer(query: &[u8], rcode: u8, addrs: &[[u8; 4]]) -> Vec<u8> {
        let mut resp = query.to_vec();
        resp[2] = 0x81;
        resp[3] = 0x80 | rcode;
        resp[6..8].copy_from_slice(&(addrs.len() as u16).to_be_bytes());
        for addr in addrs {
            // pointer to the question name at offset 12
            resp.extend_from_slice(&[0xC0, 0x0C]);
            resp.extend_from_slice(&1u16.to_be_bytes());
            resp.extend_from_slice(&1u16.to_be_bytes());
            resp.extend_from_slice(&300u32.to_be_bytes());
            resp.extend_from_slice(&4u16.to_be_bytes());
            resp.extend_from_slice(addr);
        }
        resp
    }

    #[test]
    fn test_build_dns_query() {
        let packet = build_dns_query("example.com", 1).unwrap();
        // 12 (header) + 13 (question name) + 4 (type/class)
        assert_eq!(packet.len(), 29);
        assert_eq!(&packet[12..25], b"\x07example\x03com\x00");
        assert_eq!(&packet[25..27], &[0, 1]);

        assert!(build_dns_query("bad..name", 1).is_err());
        assert_eq!(build_dns_query("example.com.", 28).unwrap().len(), 29);
    }

    #[test]
    fn test_parse_a_records() {
        let query = build_dns_query("example.com", 1).unwrap();
        let tx_id = u16::from_be_bytes([query[0], query[1]]);
        let resp = answer(&query, 0, &[[93, 184, 216, 34], [10, 0, 0, 1]]);

        let answers = parse_dns_response(&resp, tx_id, 1).unwrap();
        assert_eq!(answers, vec!["93.184.216.34", "10.0.0.1"]);

        // asked for AAAA, only A present
        assert!(parse_dns_response(&resp, tx_id, 28).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_responses() {
        let query = build_dns_query("example.com", 1).unwrap();
        let tx_id = u16::from_be_bytes([query[0], query[1]]);

        let nxdomain = answer(&query, 3, &[]);
        let err = parse_dns_response(&nxdomain, tx_id, 1).unwrap_err();
        assert_eq!(err.to_string(), "DNS error: server returned RCODE 3");

        let ok = answer(&query, 0, &[[1, 2, 3, 4]]);
        assert!(parse_dns_response(&ok, tx_id.wrapping_add(1), 1).is_err());
        assert!(parse_dns_response(&ok[..ok.len() - 2], tx_id, 1).is_err());
        assert!(parse_dns_response(&ok[..8], tx_id, 1).is_err());
    }

    #[test]
    fn test_parse_nameserver() {
        let conf = "# generated\nsearch lan\nnameserver 192.168.1.1\nnameserver 8.8.8.8\n";
        assert_eq!(parse_nameserver(conf), Some("192.168.1.1".to_string()));
        assert_eq!(parse_nameserver("search lan\n"), None);
    }

    #[test]
    fn test_validate_question() {
        let mut probe = DnsProbe::new(Some("127.0.0.1".into()), Some("aaaa".into()));
        assert!(probe.validate().is_empty());
        assert_eq!(probe.question, "AAAA");
        assert_eq!(probe.qtype, 28);

        let mut probe = DnsProbe::new(Some("127.0.0.1".into()), Some("SRV".into()));
        assert_eq!(probe.validate(), vec!["Unsupported DNS question type: SRV"]);

        let mut probe = DnsProbe::new(Some("127.0.0.1".into()), None);
        assert!(probe.validate().is_empty());
        assert_eq!(probe.question, "A");
    }

    async fn responder(addrs: Vec<[u8; 4]>) -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
            let resp = answer(&buf[..n], 0, &addrs);
            socket.send_to(&resp, peer).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_probe_against_local_server() {
        let server = responder(vec![[127, 0, 0, 1]]).await;
        let mut probe = DnsProbe::new(Some(server), None);
        assert!(probe.validate().is_empty());

        let data = probe
            .test(ProbeTarget {
                address: "service.internal",
                timeout: Duration::from_secs(2),
            })
            .await
            .unwrap();
        assert_eq!(data, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_probe_without_answers_fails() {
        let server = responder(vec![]).await;
        let mut probe = DnsProbe::new(Some(server), None);
        probe.validate();

        let err = probe
            .test(ProbeTarget {
                address: "missing.internal",
                timeout: Duration::from_secs(2),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "DNS error: no A record for missing.internal");
    }

    #[tokio::test]
    async fn test_probe_times_out() {
        // bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut probe = DnsProbe::new(Some(silent.local_addr().unwrap().to_string()), None);
        probe.validate();

        let err = probe
            .test(ProbeTarget {
                address: "example.com",
                timeout: Duration::from_millis(50),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_server_host_name_is_resolved() {
        let probe = DnsProbe::new(Some("localhost".into()), None);
        let addr = probe.server_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 53);
    }

    #[tokio::test]
    async fn test_timeout_bounds_the_whole_query() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = format!("localhost:{}", silent.local_addr().unwrap().port());
        let mut probe = DnsProbe::new(Some(server), None);
        probe.validate();

        let started = std::time::Instant::now();
        let result = probe
            .test(ProbeTarget {
                address: "example.com",
                timeout: Duration::from_millis(100),
            })
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
