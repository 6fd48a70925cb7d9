use crate::config::AddressPoolConfig;
use crate::error::Result;
use crate::structs::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_core::RngCore;

/// Draws the endpoints of random flows
#[derive(Debug, Clone)]
pub struct AddressPool {
    config: AddressPoolConfig,
}

/// Pick a server value different from the client one, unless the pool has a single value
fn pick_distinct<T: PartialEq + Copy>(rng: &mut impl RngCore, pool: &[T], client: T) -> T {
    let candidates: Vec<T> = pool.iter().copied().filter(|v| *v != client).collect();
    candidates.choose(rng).copied().unwrap_or(client)
}

impl AddressPool {
    pub fn new(config: AddressPoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(AddressPool { config })
    }

    /// Draw a client and a server. MAC and IP addresses are chosen independently, and the server
    /// only shares the client's values when the corresponding pool is a singleton.
    pub fn draw_endpoints(&self, rng: &mut impl RngCore) -> FlowEndpoints {
        let pool = &self.config;
        // the pools cannot be empty: they are checked in "new"
        let client_mac = pool.mac_pool[rng.gen_range(0..pool.mac_pool.len())];
        let server_mac = pick_distinct(rng, &pool.mac_pool, client_mac);
        let client_ip = pool.ip_pool[rng.gen_range(0..pool.ip_pool.len())];
        let server_ip = pick_distinct(rng, &pool.ip_pool, client_ip);
        let (port_min, port_max) = pool.client_ports;
        let client_port = rng.gen_range(port_min..=port_max);
        let server_port = pool.server_ports[rng.gen_range(0..pool.server_ports.len())];

        if client_ip == server_ip {
            log::trace!("Single-address pool: self-flow on {client_ip}");
        }

        FlowEndpoints {
            client: Endpoint {
                mac: client_mac,
                ip: client_ip,
                port: client_port,
            },
            server: Endpoint {
                mac: server_mac,
                ip: server_ip,
                port: server_port,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pnet::util::MacAddr;
    use rand_core::SeedableRng;
    use rand_pcg::Pcg32;
    use std::net::Ipv4Addr;

    #[test]
    fn test_distinct_endpoints() {
        let pool = AddressPool::new(AddressPoolConfig::default()).unwrap();
        let mut rng = Pcg32::seed_from_u64(0);
        for _ in 0..500 {
            let e = pool.draw_endpoints(&mut rng);
            assert_ne!(e.client.mac, e.server.mac);
            assert_ne!(e.client.ip, e.server.ip);
            assert!(e.client.port >= 1024);
            assert!(AddressPoolConfig::default()
                .server_ports
                .contains(&e.server.port));
        }
    }

    #[test]
    fn test_singleton_pool() {
        let config = AddressPoolConfig {
            mac_pool: vec![MacAddr::new(2, 0, 0, 0, 0, 1)],
            ip_pool: vec![Ipv4Addr::new(10, 0, 0, 1)],
            client_ports: (5000, 5000),
            server_ports: vec![80],
        };
        let pool = AddressPool::new(config).unwrap();
        let mut rng = Pcg32::seed_from_u64(1);
        let e = pool.draw_endpoints(&mut rng);
        assert_eq!(e.client.ip, e.server.ip);
        assert_eq!(e.client.mac, e.server.mac);
        assert_eq!(e.client.port, 5000);
        assert_eq!(e.server.port, 80);
    }

    #[test]
    fn test_empty_pool() {
        let config = AddressPoolConfig {
            server_ports: vec![],
            ..Default::default()
        };
        assert!(matches!(
            AddressPool::new(config),
            Err(Error::InvalidArgument(_))
        ));
    }
}
