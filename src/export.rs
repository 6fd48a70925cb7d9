use crate::error::{Error, Result};
use crate::structs::*;
use pcap_file::pcap::{PcapPacket, PcapReader, PcapWriter};
use pnet::util::MacAddr;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet_packet::tcp::{self, MutableTcpPacket, TcpPacket};
use pnet_packet::Packet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

const INITIAL_TTL: u8 = 64;
const WINDOW_SIZE: u16 = 65535;

fn header_error(layer: &str) -> Error {
    Error::InvalidArgument(format!("buffer too small for the {layer} header"))
}

/// Configures the Ethernet frame by setting the source, destination MAC addresses,
/// and setting the EtherType to IPv4.
fn setup_ethernet_frame(packet: &mut [u8], src_mac: MacAddr, dst_mac: MacAddr) -> Result<()> {
    let mut eth_packet = MutableEthernetPacket::new(packet).ok_or_else(|| header_error("Ethernet"))?;
    eth_packet.set_ethertype(EtherTypes::Ipv4);
    eth_packet.set_source(src_mac);
    eth_packet.set_destination(dst_mac);
    Ok(())
}

/// Sets up the IPv4 header: generic fields, addresses and identification of the descriptor,
/// then the header checksum.
fn setup_ip_packet(packet: &mut [u8], p: &PacketDescriptor) -> Result<()> {
    let len = packet.len();
    let mut ipv4_packet = MutableIpv4Packet::new(packet).ok_or_else(|| header_error("IPv4"))?;

    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length(5);
    ipv4_packet.set_total_length(len as u16);
    ipv4_packet.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
    ipv4_packet.set_identification(p.ip_id);
    ipv4_packet.set_ttl(INITIAL_TTL);
    ipv4_packet.set_source(p.src_ip);
    ipv4_packet.set_destination(p.dst_ip);

    ipv4_packet.set_checksum(ipv4::checksum(&ipv4_packet.to_immutable()));
    Ok(())
}

/// Configures the TCP header and payload, then computes the checksum over the IPv4
/// pseudo-header.
fn setup_tcp_packet(packet: &mut [u8], p: &PacketDescriptor) -> Result<()> {
    let mut tcp_packet = MutableTcpPacket::new(packet).ok_or_else(|| header_error("TCP"))?;

    tcp_packet.set_source(p.src_port);
    tcp_packet.set_destination(p.dst_port);
    tcp_packet.set_sequence(p.seq);
    tcp_packet.set_acknowledgement(p.ack);
    tcp_packet.set_data_offset(5);
    tcp_packet.set_flags(p.flags.to_bits());
    tcp_packet.set_window(WINDOW_SIZE);
    if let Some(payload) = &p.payload {
        tcp_packet.set_payload(payload);
    }

    tcp_packet.set_checksum(tcp::ipv4_checksum(
        &tcp_packet.to_immutable(),
        &p.src_ip,
        &p.dst_ip,
    ));
    Ok(())
}

/// Build the Ethernet/IPv4/TCP frame of a packet descriptor
pub fn encode_frame(p: &PacketDescriptor) -> Result<Vec<u8>> {
    let ip_start = MutableEthernetPacket::minimum_packet_size();
    let tcp_start = ip_start + MutableIpv4Packet::minimum_packet_size();
    let packet_size = tcp_start + MutableTcpPacket::minimum_packet_size() + p.payload_len();
    if packet_size - ip_start > u16::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "payload of {} bytes does not fit in an IPv4 packet",
            p.payload_len()
        )));
    }

    let mut packet = vec![0; packet_size];
    setup_ethernet_frame(&mut packet, p.src_mac, p.dst_mac)?;
    setup_ip_packet(&mut packet[ip_start..], p)?;
    setup_tcp_packet(&mut packet[tcp_start..], p)?;
    Ok(packet)
}

/// Read a packet descriptor back from a frame. Returns None if the frame is not TCP over IPv4
/// over Ethernet.
pub fn decode_frame(timestamp: Duration, data: &[u8]) -> Option<PacketDescriptor> {
    let eth_packet = EthernetPacket::new(data)?;
    if eth_packet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ip_packet = Ipv4Packet::new(eth_packet.payload())?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    let tcp_packet = TcpPacket::new(ip_packet.payload())?;
    let payload = tcp_packet.payload();
    Some(PacketDescriptor {
        src_mac: eth_packet.get_source(),
        dst_mac: eth_packet.get_destination(),
        src_ip: ip_packet.get_source(),
        dst_ip: ip_packet.get_destination(),
        ip_id: ip_packet.get_identification(),
        src_port: tcp_packet.get_source(),
        dst_port: tcp_packet.get_destination(),
        flags: TcpFlagSet::from_bits(tcp_packet.get_flags()),
        seq: tcp_packet.get_sequence(),
        ack: tcp_packet.get_acknowledgement(),
        payload: (!payload.is_empty()).then(|| payload.to_vec()),
        timestamp,
    })
}

/// Convert packet descriptors into the bytes of a pcap file, keeping their order
pub fn to_pcap_vec(packets: &[PacketDescriptor]) -> Result<Vec<u8>> {
    let mut pcap_writer = PcapWriter::new(Vec::new())?;
    for p in packets {
        let data = encode_frame(p)?;
        pcap_writer.write_packet(&PcapPacket::new(p.timestamp, data.len() as u32, &data))?;
    }
    Ok(pcap_writer.into_writer())
}

/// Export the packets into a pcap file, in the given order.
///
/// The whole file is built in memory, written into a temporary file next to the destination,
/// then renamed. On failure, the destination is left as it was.
pub fn write_pcap(path: &Path, packets: &[PacketDescriptor]) -> Result<usize> {
    let data = to_pcap_vec(packets)?;
    log::trace!("Saving into {}", path.display());
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&data)?;
    file.persist(path).map_err(|e| e.error)?;
    log::info!(
        "{} packets ({} bytes) written into {}",
        packets.len(),
        data.len(),
        path.display()
    );
    Ok(packets.len())
}

/// Read the TCP packets of a pcap file. Other frames are skipped.
pub fn read_pcap(path: &Path) -> Result<Vec<PacketDescriptor>> {
    let file_in = BufReader::new(File::open(path)?);
    let mut pcap_reader = PcapReader::new(file_in)?;
    let mut packets = vec![];
    let mut skipped = 0;
    while let Some(packet) = pcap_reader.next_packet() {
        let packet = packet?;
        match decode_frame(packet.timestamp, &packet.data) {
            Some(p) => packets.push(p),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("{skipped} frames of {} are not TCP/IPv4", path.display());
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RandomFlowConfig, TransferConfig};
    use crate::random_flow::synthesize_random_flows;
    use crate::transfer::{synthesize_scripted_transfer, FileTransferPlan};
    use rand_core::SeedableRng;
    use rand_pcg::Pcg32;
    use tempfile::tempdir;

    fn sample_packet() -> PacketDescriptor {
        let endpoints = TransferConfig::default().endpoints;
        PacketDescriptor {
            src_mac: endpoints.server.mac,
            dst_mac: endpoints.client.mac,
            src_ip: endpoints.server.ip,
            dst_ip: endpoints.client.ip,
            ip_id: 12,
            src_port: endpoints.server.port,
            dst_port: endpoints.client.port,
            flags: TcpFlagSet::PSH_ACK,
            seq: 2001,
            ack: 1001,
            payload: Some(b"C0644 4 a\n".to_vec()),
            timestamp: Duration::from_micros(1_700_000_000_123_456),
        }
    }

    #[test]
    fn test_frame_layout() {
        let p = sample_packet();
        let frame = encode_frame(&p).unwrap();
        assert_eq!(frame.len(), 14 + 20 + 20 + 10);

        let ip_packet = Ipv4Packet::new(&frame[14..]).unwrap();
        assert_eq!(ip_packet.get_total_length(), 50);
        assert_eq!(ip_packet.get_ttl(), 64);
        assert_eq!(ip_packet.get_checksum(), ipv4::checksum(&ip_packet));

        let tcp_packet = TcpPacket::new(ip_packet.payload()).unwrap();
        assert_eq!(
            tcp_packet.get_checksum(),
            tcp::ipv4_checksum(&tcp_packet, &p.src_ip, &p.dst_ip)
        );
        assert_eq!(tcp_packet.payload(), b"C0644 4 a\n");
    }

    #[test]
    fn test_decode_frame() {
        let p = sample_packet();
        let frame = encode_frame(&p).unwrap();
        assert_eq!(decode_frame(p.timestamp, &frame), Some(p.clone()));

        let mut ack = p.clone();
        ack.payload = None;
        ack.flags = TcpFlagSet::ACK;
        let frame = encode_frame(&ack).unwrap();
        assert_eq!(decode_frame(ack.timestamp, &frame), Some(ack));

        // truncated frame
        assert_eq!(decode_frame(p.timestamp, &frame[..20]), None);
    }

    #[test]
    fn test_oversized_payload() {
        let mut p = sample_packet();
        p.payload = Some(vec![0; 70_000]);
        assert!(matches!(encode_frame(&p), Err(Error::InvalidArgument(_))));
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.pcap");
        assert!(write_pcap(&path, &[p]).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_pcap_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.pcap");

        let background = synthesize_random_flows(
            &RandomFlowConfig::default(),
            50,
            Duration::from_secs(1_700_000_000),
            4,
        )
        .unwrap();
        let plan = FileTransferPlan::new("id_rsa", vec![b'k'; 1300], 512).unwrap();
        let transfer = synthesize_scripted_transfer(
            &TransferConfig::default(),
            &plan,
            background.next_time,
            &mut Pcg32::seed_from_u64(4),
        )
        .unwrap();
        let mut packets = background.packets;
        packets.extend(transfer.packets);

        assert_eq!(write_pcap(&path, &packets).unwrap(), packets.len());
        let read = read_pcap(&path).unwrap();
        // pcap timestamps have a microsecond resolution
        for p in packets.iter_mut() {
            p.timestamp = Duration::from_micros(p.timestamp.as_micros() as u64);
        }
        assert_eq!(read, packets);
    }

    #[test]
    fn test_failed_export_keeps_destination() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("previous.pcap");
        std::fs::write(&path, b"previous content").unwrap();

        // the encoding fails
        let mut p = sample_packet();
        p.payload = Some(vec![0; 70_000]);
        assert!(write_pcap(&path, &[p]).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous content");

        // the destination is a directory: the rename fails
        let target = dir.path().join("taken");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep.txt"), b"keep").unwrap();
        assert!(matches!(
            write_pcap(&target, &[sample_packet()]),
            Err(Error::Io(_))
        ));
        assert_eq!(std::fs::read(target.join("keep.txt")).unwrap(), b"keep");
        // no temporary file is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        // a successful export replaces the previous file
        assert_eq!(write_pcap(&path, &[sample_packet()]).unwrap(), 1);
        assert_eq!(read_pcap(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pcap");
        assert!(matches!(
            write_pcap(&path, &[sample_packet()]),
            Err(Error::Io(_))
        ));
    }
}
