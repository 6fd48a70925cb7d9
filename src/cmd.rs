use clap::{Parser, Subcommand, ValueEnum};
use pcapforge::assembler::OrderPolicy;

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OrderArg {
    /// Keep the segments in generation order
    #[default]
    Concatenate,
    /// Fail if the timestamps ever go backward
    Strict,
    /// Sort the whole capture by timestamp
    Sort,
}

impl From<OrderArg> for OrderPolicy {
    fn from(o: OrderArg) -> OrderPolicy {
        match o {
            OrderArg::Concatenate => OrderPolicy::Concatenate,
            OrderArg::Strict => OrderPolicy::Strict,
            OrderArg::Sort => OrderPolicy::Sort,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Generate random background TCP flows into a pcap file
    Random {
        #[arg(
            short,
            long,
            default_value = "output.pcap",
            help = "Output pcap file for synthetic network packets"
        )]
        outfile: String,
        #[arg(
            short = 'n',
            long = "packets",
            default_value_t = 100,
            help = "Minimum number of packets to generate. The last flow is never cut in the middle of a phase."
        )]
        packets_count: u64,
        #[arg(short, long, help = "Seed for random number generation")]
        seed: Option<u64>,
        #[arg(short = 't', long, default_value = None, help = "Beginning time of the pcap in RFC3339 style (\"2025-05-01 10:28:07\") or a Unix timestamp. By default, use current time")]
        start_time: Option<String>,
        #[arg(
            short,
            long,
            default_value = None,
            help = "Path to the configuration file (TOML or JSON)"
        )]
        config: Option<String>,
        #[arg(
            long,
            default_value_t = false,
            help = "Always close the last flow, even when the packet target is already reached"
        )]
        finish_flows: bool,
    },
    /// Generate a file transfer, optionally surrounded by background traffic
    #[clap(group(
    clap::ArgGroup::new("source")
        .required(true)
        .args(&["file", "content"]),
    ))]
    Transfer {
        #[arg(
            short,
            long,
            default_value = "transfer.pcap",
            help = "Output pcap file for synthetic network packets"
        )]
        outfile: String,
        #[arg(short, long, help = "File whose content is transferred")]
        file: Option<String>,
        #[arg(long, help = "Text transferred as the file content")]
        content: Option<String>,
        #[arg(
            long,
            help = "File name announced to the client. By default, the name of the input file"
        )]
        name: Option<String>,
        #[arg(long, default_value_t = 512, help = "Maximum payload size of a data segment")]
        chunk_size: usize,
        #[arg(long, help = "Client MAC address")]
        client_mac: Option<String>,
        #[arg(long, help = "Client IPv4 address")]
        client_ip: Option<String>,
        #[arg(long, help = "Client port")]
        client_port: Option<u16>,
        #[arg(long, help = "Server MAC address")]
        server_mac: Option<String>,
        #[arg(long, help = "Server IPv4 address")]
        server_ip: Option<String>,
        #[arg(long, help = "Server port")]
        server_port: Option<u16>,
        #[arg(long, help = "Initial sequence number of the client (default: 1000)")]
        initial_seq_client: Option<u32>,
        #[arg(long, help = "Initial sequence number of the server (default: 2000)")]
        initial_seq_server: Option<u32>,
        #[arg(long, help = "IPv4 identification of the first packet (default: 1)")]
        initial_ip_id: Option<u16>,
        #[arg(long, help = "Octal file mode in the control header (default: 0644)")]
        file_mode: Option<String>,
        #[arg(long, help = "Fixed gap between two packets of the transfer, such as \"1ms\"")]
        gap: Option<String>,
        #[arg(long, help = "Random packets generated just before the transfer")]
        pre_noise: Option<u64>,
        #[arg(long, help = "Random packets generated just after the transfer")]
        post_noise: Option<u64>,
        #[arg(
            long,
            default_value_t = 0,
            help = "Background packets generated before the transfer segment"
        )]
        background_before: u64,
        #[arg(
            long,
            default_value_t = 0,
            help = "Background packets generated after the transfer segment"
        )]
        background_after: u64,
        #[arg(
            long,
            value_enum,
            default_value_t = OrderArg::Concatenate,
            help = "How the segments of the capture are put together"
        )]
        order: OrderArg,
        #[arg(short, long, help = "Seed for random number generation")]
        seed: Option<u64>,
        #[arg(short = 't', long, default_value = None, help = "Beginning time of the pcap in RFC3339 style (\"2025-05-01 10:28:07\") or a Unix timestamp. By default, use current time")]
        start_time: Option<String>,
        #[arg(
            short,
            long,
            default_value = None,
            help = "Path to the configuration file (TOML or JSON)"
        )]
        config: Option<String>,
    },
    /// Print statistics about a pcap file
    Inspect {
        #[arg(short, long, required = true, help = "Pcap file to inspect")]
        input_pcap: String,
    },
}
