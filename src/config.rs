use pnet::util::MacAddr;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::error::{check_range, Error, Result};
use crate::structs::*;

/// Candidate endpoints for random flows
#[derive(Debug, Clone, PartialEq)]
pub struct AddressPoolConfig {
    pub mac_pool: Vec<MacAddr>,
    pub ip_pool: Vec<Ipv4Addr>,
    /// Inclusive range of client (source) ports
    pub client_ports: (u16, u16),
    /// Well-known ports a server may listen on
    pub server_ports: Vec<u16>,
}

impl Default for AddressPoolConfig {
    fn default() -> Self {
        AddressPoolConfig {
            mac_pool: (1..=4)
                .map(|i| MacAddr::new(0x02, 0, 0, 0, 0xaa, i))
                .collect(),
            ip_pool: vec![
                Ipv4Addr::new(10, 0, 0, 10),
                Ipv4Addr::new(10, 0, 0, 20),
                Ipv4Addr::new(10, 0, 1, 30),
                Ipv4Addr::new(10, 0, 1, 40),
                Ipv4Addr::new(192, 168, 1, 5),
                Ipv4Addr::new(192, 168, 1, 25),
            ],
            client_ports: (1024, 65535),
            server_ports: vec![22, 53, 80, 123, 389, 443, 445, 8000, 8080, 3389],
        }
    }
}

impl AddressPoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mac_pool.is_empty() {
            return Err(Error::InvalidArgument("the MAC address pool is empty".into()));
        }
        if self.ip_pool.is_empty() {
            return Err(Error::InvalidArgument("the IP address pool is empty".into()));
        }
        if self.server_ports.is_empty() {
            return Err(Error::InvalidArgument("the server port pool is empty".into()));
        }
        check_range("client ports", self.client_ports)
    }
}

/// Parameters of the random background flow synthesizer
#[derive(Debug, Clone, PartialEq)]
pub struct RandomFlowConfig {
    pub pool: AddressPoolConfig,
    /// Inclusive range of the payload size of a burst, in bytes
    pub payload_size: (usize, usize),
    /// Inclusive range of the gap between two consecutive packets
    pub jitter: (Duration, Duration),
    /// Emit the teardown of a flow interrupted by the packet target
    pub finish_flows: bool,
}

impl Default for RandomFlowConfig {
    fn default() -> Self {
        RandomFlowConfig {
            pool: AddressPoolConfig::default(),
            payload_size: (20, 600),
            jitter: (Duration::from_micros(100), Duration::from_millis(3)),
            finish_flows: false,
        }
    }
}

impl RandomFlowConfig {
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        check_range("payload size", self.payload_size)?;
        if self.payload_size.1 > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidArgument(format!(
                "payload size {} is larger than {MAX_PAYLOAD_LEN} bytes",
                self.payload_size.1
            )));
        }
        check_range("jitter", self.jitter)
    }
}

/// Parameters of the scripted file transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    pub endpoints: FlowEndpoints,
    pub initial_seq_client: u32,
    pub initial_seq_server: u32,
    /// IPv4 identification of the first packet, incremented for each packet
    pub initial_ip_id: u16,
    /// Permission bits announced in the control header
    pub file_mode: u32,
    /// Inclusive range of the gap between two consecutive packets. Equal bounds give a fixed gap.
    pub jitter: (Duration, Duration),
    /// Random packets synthesized before the transfer
    pub pre_noise: u64,
    /// Random packets synthesized after the transfer
    pub post_noise: u64,
    pub noise: RandomFlowConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            endpoints: FlowEndpoints {
                client: Endpoint {
                    mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x01),
                    ip: Ipv4Addr::new(10, 0, 9, 88),
                    port: 34567,
                },
                server: Endpoint {
                    mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x02),
                    ip: Ipv4Addr::new(10, 0, 1, 50),
                    port: 22,
                },
            },
            initial_seq_client: 1000,
            initial_seq_server: 2000,
            initial_ip_id: 1,
            file_mode: 0o644,
            jitter: (Duration::from_millis(1), Duration::from_millis(1)),
            pre_noise: 0,
            post_noise: 0,
            noise: RandomFlowConfig::default(),
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("jitter", self.jitter)?;
        if self.file_mode > 0o7777 {
            return Err(Error::InvalidArgument(format!(
                "file mode {:o} is not a permission mode",
                self.file_mode
            )));
        }
        if self.pre_noise > 0 || self.post_noise > 0 {
            self.noise.validate()?;
        }
        Ok(())
    }
}

/// The whole configuration, as loaded from a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub random: RandomFlowConfig,
    pub transfer: TransferConfig,
}

/// Format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Guess the format from the file extension. TOML is assumed by default.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

// The file structures only contain optional fields. Missing values are taken from the defaults.

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ConfigurationFile {
    random: Option<RandomFile>,
    transfer: Option<TransferFile>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct RandomFile {
    mac_pool: Option<Vec<String>>,
    ip_pool: Option<Vec<String>>,
    client_ports: Option<(u16, u16)>,
    server_ports: Option<Vec<u16>>,
    payload_size: Option<(usize, usize)>,
    /// in seconds
    jitter: Option<(f64, f64)>,
    finish_flows: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct TransferFile {
    client_mac: Option<String>,
    client_ip: Option<String>,
    client_port: Option<u16>,
    server_mac: Option<String>,
    server_ip: Option<String>,
    server_port: Option<u16>,
    initial_seq_client: Option<u32>,
    initial_seq_server: Option<u32>,
    initial_ip_id: Option<u16>,
    /// octal string, such as "0644"
    file_mode: Option<String>,
    /// in seconds
    jitter: Option<(f64, f64)>,
    pre_noise: Option<u64>,
    post_noise: Option<u64>,
}

pub fn parse_mac(s: &str) -> Result<MacAddr> {
    s.trim()
        .parse()
        .map_err(|_| Error::Config(format!("cannot parse MAC address \"{s}\"")))
}

pub fn parse_ip(s: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse()
        .map_err(|_| Error::Config(format!("cannot parse IPv4 address \"{s}\"")))
}

pub fn parse_mode(s: &str) -> Result<u32> {
    u32::from_str_radix(s.trim(), 8)
        .map_err(|_| Error::Config(format!("cannot parse file mode \"{s}\"")))
}

fn parse_jitter((min, max): (f64, f64)) -> Result<(Duration, Duration)> {
    let to_duration = |s: f64| {
        Duration::try_from_secs_f64(s)
            .map_err(|_| Error::Config(format!("invalid jitter value {s}")))
    };
    Ok((to_duration(min)?, to_duration(max)?))
}

impl RandomFile {
    fn merge(self, mut config: RandomFlowConfig) -> Result<RandomFlowConfig> {
        if let Some(macs) = self.mac_pool {
            config.pool.mac_pool = macs.iter().map(|m| parse_mac(m)).collect::<Result<_>>()?;
        }
        if let Some(ips) = self.ip_pool {
            config.pool.ip_pool = ips.iter().map(|i| parse_ip(i)).collect::<Result<_>>()?;
        }
        if let Some(ports) = self.client_ports {
            config.pool.client_ports = ports;
        }
        if let Some(ports) = self.server_ports {
            config.pool.server_ports = ports;
        }
        if let Some(size) = self.payload_size {
            config.payload_size = size;
        }
        if let Some(jitter) = self.jitter {
            config.jitter = parse_jitter(jitter)?;
        }
        if let Some(finish) = self.finish_flows {
            config.finish_flows = finish;
        }
        Ok(config)
    }
}

impl TransferFile {
    fn merge(self, mut config: TransferConfig) -> Result<TransferConfig> {
        let (client, server) = (&mut config.endpoints.client, &mut config.endpoints.server);
        if let Some(mac) = self.client_mac {
            client.mac = parse_mac(&mac)?;
        }
        if let Some(ip) = self.client_ip {
            client.ip = parse_ip(&ip)?;
        }
        if let Some(port) = self.client_port {
            client.port = port;
        }
        if let Some(mac) = self.server_mac {
            server.mac = parse_mac(&mac)?;
        }
        if let Some(ip) = self.server_ip {
            server.ip = parse_ip(&ip)?;
        }
        if let Some(port) = self.server_port {
            server.port = port;
        }
        if let Some(seq) = self.initial_seq_client {
            config.initial_seq_client = seq;
        }
        if let Some(seq) = self.initial_seq_server {
            config.initial_seq_server = seq;
        }
        if let Some(id) = self.initial_ip_id {
            config.initial_ip_id = id;
        }
        if let Some(mode) = self.file_mode {
            config.file_mode = parse_mode(&mode)?;
        }
        if let Some(jitter) = self.jitter {
            config.jitter = parse_jitter(jitter)?;
        }
        if let Some(n) = self.pre_noise {
            config.pre_noise = n;
        }
        if let Some(n) = self.post_noise {
            config.post_noise = n;
        }
        Ok(config)
    }
}

/// Import a configuration from a string. Every missing field keeps its default value, and the
/// noise of the scripted transfer uses the "random" section.
pub fn import_config(config_string: &str, format: ConfigFormat) -> Result<Configuration> {
    let file: ConfigurationFile = match format {
        ConfigFormat::Toml => {
            toml::from_str(config_string).map_err(|e| Error::Config(e.to_string()))?
        }
        ConfigFormat::Json => {
            serde_json::from_str(config_string).map_err(|e| Error::Config(e.to_string()))?
        }
    };
    let random = file
        .random
        .unwrap_or_default()
        .merge(RandomFlowConfig::default())?;
    let mut transfer = file
        .transfer
        .unwrap_or_default()
        .merge(TransferConfig::default())?;
    transfer.noise = random.clone();
    log::trace!("Configuration: {random:?} {transfer:?}");
    Ok(Configuration { random, transfer })
}

/// Load a configuration file. The format depends on the extension.
pub fn load_config(path: &Path) -> Result<Configuration> {
    let content = std::fs::read_to_string(path)?;
    let config = import_config(&content, ConfigFormat::from_path(path))?;
    log::info!("Configuration {} successfully loaded", path.display());
    Ok(config)
}
