use pcapforge::assembler::CaptureAssembler;
use pcapforge::config::{self, Configuration};
use pcapforge::error::{Error, Result};
use pcapforge::export;
use pcapforge::random_flow::RandomFlowSynthesizer;
use pcapforge::stats::CaptureSummary;
use pcapforge::transfer::{FileTransferPlan, ScriptedTransferSynthesizer};
mod cmd;

use std::path::Path;
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use rand_core::SeedableRng;
use rand_pcg::Pcg32;

/// The entry point of the application.
///
/// This function prepares the parameters of each command according to the command line
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    let result = match args.command {
        cmd::Command::Random {
            outfile,
            packets_count,
            seed,
            start_time,
            config,
            finish_flows,
        } => run_random(
            &outfile,
            packets_count,
            seed,
            start_time,
            config,
            finish_flows,
        ),
        cmd::Command::Transfer {
            outfile,
            file,
            content,
            name,
            chunk_size,
            client_mac,
            client_ip,
            client_port,
            server_mac,
            server_ip,
            server_port,
            initial_seq_client,
            initial_seq_server,
            initial_ip_id,
            file_mode,
            gap,
            pre_noise,
            post_noise,
            background_before,
            background_after,
            order,
            seed,
            start_time,
            config,
        } => load_configuration(config).and_then(|mut configuration| {
            let transfer = &mut configuration.transfer;
            let (client, server) = (
                &mut transfer.endpoints.client,
                &mut transfer.endpoints.server,
            );
            if let Some(mac) = client_mac {
                client.mac = config::parse_mac(&mac)?;
            }
            if let Some(ip) = client_ip {
                client.ip = config::parse_ip(&ip)?;
            }
            if let Some(port) = client_port {
                client.port = port;
            }
            if let Some(mac) = server_mac {
                server.mac = config::parse_mac(&mac)?;
            }
            if let Some(ip) = server_ip {
                server.ip = config::parse_ip(&ip)?;
            }
            if let Some(port) = server_port {
                server.port = port;
            }
            if let Some(seq) = initial_seq_client {
                transfer.initial_seq_client = seq;
            }
            if let Some(seq) = initial_seq_server {
                transfer.initial_seq_server = seq;
            }
            if let Some(id) = initial_ip_id {
                transfer.initial_ip_id = id;
            }
            if let Some(mode) = file_mode {
                transfer.file_mode = config::parse_mode(&mode)?;
            }
            if let Some(gap) = gap {
                let gap = humantime::parse_duration(&gap)
                    .map_err(|e| Error::InvalidArgument(format!("gap: {e}")))?;
                transfer.jitter = (gap, gap);
            }
            if let Some(n) = pre_noise {
                transfer.pre_noise = n;
            }
            if let Some(n) = post_noise {
                transfer.post_noise = n;
            }

            // clap requires either a file or some content
            let plan = match file {
                Some(file) => {
                    let path = Path::new(&file);
                    let name = name.unwrap_or_else(|| {
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or(file.clone())
                    });
                    FileTransferPlan::new(name, std::fs::read(path)?, chunk_size)?
                }
                None => FileTransferPlan::new(
                    name.unwrap_or("file.txt".to_string()),
                    content.unwrap_or_default().into_bytes(),
                    chunk_size,
                )?,
            };

            run_transfer(
                &outfile,
                configuration,
                &plan,
                Segments {
                    background_before,
                    background_after,
                },
                order.into(),
                seed,
                start_time,
            )
        }),
        cmd::Command::Inspect { input_pcap } => run_inspect(&input_pcap),
    };

    if let Err(e) = result {
        log::error!("{e}");
        process::exit(1);
    }
}

/// Load the configuration file, if any
fn load_configuration(path: Option<String>) -> Result<Configuration> {
    match path {
        Some(path) => config::load_config(Path::new(&path)),
        None => Ok(Configuration::default()),
    }
}

/// Parse the start time: a RFC3339 date (assumed UTC), a Unix timestamp in seconds, or the
/// current time if there is none
fn parse_start_time(start_time: Option<String>) -> Result<Duration> {
    let ts = match start_time {
        Some(start_time) => {
            if let Ok(d) = humantime::parse_rfc3339_weak(&start_time) {
                d.duration_since(UNIX_EPOCH)
                    .map_err(|_| Error::InvalidArgument("start time before 1970".into()))?
            } else if let Ok(secs) = start_time.trim().parse::<f64>() {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    Error::InvalidArgument(format!("invalid Unix timestamp {start_time}"))
                })?
            } else {
                return Err(Error::InvalidArgument(format!(
                    "could not parse start time \"{start_time}\""
                )));
            }
        }
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::InvalidArgument("system clock before 1970".into()))?,
    };
    // pcap timestamps are 32-bit seconds
    if ts.as_secs() > u32::MAX as u64 {
        return Err(Error::InvalidArgument(format!(
            "start time {}s cannot be stored in a pcap file",
            ts.as_secs()
        )));
    }
    log::info!("Capture starts at {}", humantime::format_rfc3339_micros(UNIX_EPOCH + ts));
    Ok(ts)
}

/// Use the seed given by the user or draw one, and log it so the generation can be replayed
fn make_rng(seed: Option<u64>) -> Pcg32 {
    let seed = seed.unwrap_or_else(rand::random);
    log::info!("Generating with seed {seed}");
    Pcg32::seed_from_u64(seed)
}

fn export_capture(outfile: &str, capture: &[pcapforge::PacketDescriptor]) -> Result<()> {
    let summary = CaptureSummary::from_packets(capture);
    if summary.inversions_count > 0 {
        log::warn!(
            "{} packets are older than their predecessor",
            summary.inversions_count
        );
    }
    log::debug!("Capture summary:\n{summary}");
    export::write_pcap(Path::new(outfile), capture)?;
    Ok(())
}

fn run_random(
    outfile: &str,
    packets_count: u64,
    seed: Option<u64>,
    start_time: Option<String>,
    config: Option<String>,
    finish_flows: bool,
) -> Result<()> {
    let mut configuration = load_configuration(config)?;
    configuration.random.finish_flows |= finish_flows;
    let synthesizer = RandomFlowSynthesizer::new(configuration.random)?;
    let start = parse_start_time(start_time)?;
    let mut rng = make_rng(seed);

    log::info!("Generating at least {packets_count} packets");
    let timeline = synthesizer.synthesize(&mut rng, packets_count, start)?;
    export_capture(outfile, &timeline.packets)
}

/// Background traffic around the transfer
struct Segments {
    background_before: u64,
    background_after: u64,
}

fn run_transfer(
    outfile: &str,
    configuration: Configuration,
    plan: &FileTransferPlan,
    segments: Segments,
    order: pcapforge::assembler::OrderPolicy,
    seed: Option<u64>,
    start_time: Option<String>,
) -> Result<()> {
    let background = RandomFlowSynthesizer::new(configuration.random)?;
    let synthesizer = ScriptedTransferSynthesizer::new(configuration.transfer)?;
    let start = parse_start_time(start_time)?;
    let mut rng = make_rng(seed);
    let mut assembler = CaptureAssembler::new(order);

    // each segment starts when the previous one ends
    let mut next_time = start;
    if segments.background_before > 0 {
        let timeline = background.synthesize(&mut rng, segments.background_before, next_time)?;
        next_time = timeline.next_time;
        assembler.push(timeline.packets);
    }

    let transfer = synthesizer.synthesize(&mut rng, plan, next_time)?;
    log::info!(
        "Transfer of \"{}\" starts at {:.6}s (packets {} to {})",
        plan.file_name,
        transfer.flow_start.as_secs_f64(),
        assembler.len() + transfer.flow_range.start,
        assembler.len() + transfer.flow_range.end - 1
    );
    next_time = transfer.next_time;
    assembler.push(transfer.packets);

    if segments.background_after > 0 {
        let timeline = background.synthesize(&mut rng, segments.background_after, next_time)?;
        assembler.push(timeline.packets);
    }

    let capture = assembler.assemble()?;
    export_capture(outfile, &capture)
}

fn run_inspect(input_pcap: &str) -> Result<()> {
    let packets = export::read_pcap(Path::new(input_pcap))?;
    println!("{}", CaptureSummary::from_packets(&packets));
    Ok(())
}
