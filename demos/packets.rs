use clap::Parser;
use log::info;

use crave_rs::config::GeneratorConfig;
use crave_rs::distribution::Distribution;
use crave_rs::object::RandObject;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of packets to generate.
    #[arg(value_name = "INT", default_value = "10")]
    count: usize,

    /// Random seed (entropy when omitted).
    #[clap(long, value_name = "INT")]
    seed: Option<u64>,

    /// Solve partitions on worker threads.
    #[clap(long)]
    threads: bool,

    /// Hit every cover constraint before plain solving.
    #[clap(long)]
    coverage: bool,

    /// Skip contradiction and soft-constraint analysis.
    #[clap(long)]
    bypass: bool,

    /// Write the partition graph to this file (Graphviz DOT).
    #[clap(long, value_name = "FILE")]
    dot: Option<std::path::PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let mut config = GeneratorConfig::default()
        .with_multithreading(args.threads)
        .with_bypass_constraint_analysis(args.bypass);
    config.seed = args.seed;

    // Packet layout:
    // - kind: 0 = control, 1 = data, 2 = ack
    // - len: payload length in bytes
    // - payload: `len` printable bytes
    // - checksum: xor of the header fields
    let mut packet = RandObject::with_config("packet", config);
    let kind = packet.var::<u8>();
    let len = packet.var::<u8>();
    let checksum = packet.var::<u8>();
    let payload = packet.vector::<u8>();

    packet.add_named("kind", kind.le(2))?;
    packet.add_named("len", len.le(16))?;
    packet.add_named("ack_empty", kind.equal(2).implies(len.equal(0)))?;
    packet.add_named("data_nonempty", kind.equal(1).implies(len.ge(4)))?;
    packet.add_named("size", payload.size().equal(&len))?;
    packet.add_named("checksum", checksum.equal(&kind ^ &len))?;
    packet.soft_named("short", len.le(8))?;
    packet.cover_named("cover_ack", kind.equal(2))?;
    packet.cover_named("cover_max", len.equal(16))?;
    packet.context().dist(
        &kind,
        Distribution::new().weighted_value(0, 1)?.weighted_value(1, 8)?.weighted_value(2, 1)?,
    );

    let ascii = packet.context().foreach(&payload, |i| payload.at(i).ge(0x20).and(payload.at(i).lt(0x7f)));
    packet.add_named("ascii", ascii)?;

    // The routing header is its own object in the same tree.
    let mut route = packet.child("route");
    let hops = route.var::<u8>();
    route.add_named("hops", hops.ge(1).and(hops.le(8)))?;
    route.add_named("ack_direct", kind.equal(2).implies(hops.equal(1)))?;
    packet.add_child(route);

    for i in 0..args.count {
        if !packet.next()? {
            let generator = packet.generator();
            let contradictions = generator.map(|g| g.analyse_contradiction()).unwrap_or_default();
            println!("packet {}: unsatisfiable, contradictions = {:?}", i, contradictions);
            break;
        }
        println!(
            "packet {}: kind={} len={} hops={} checksum={:#04x} payload={:?}",
            i,
            kind.get(),
            len.get(),
            hops.get(),
            checksum.get(),
            String::from_utf8_lossy(&payload.to_vec())
        );
    }

    if args.coverage {
        packet.reset_coverage()?;
        while !packet.is_covered() {
            if !packet.next_cov()? {
                break;
            }
            if !packet.is_covered() {
                println!("cover: kind={} len={} hops={}", kind.get(), len.get(), hops.get());
            }
        }
        info!("coverage done");

        // One more packet with the maximum length, without keeping the constraint.
        if packet.next_with(&[len.equal(16), kind.equal(1)])? {
            println!("max data packet: payload={:?}", String::from_utf8_lossy(&payload.to_vec()));
        }
    }

    if let Some(path) = &args.dot {
        if let Some(generator) = packet.generator() {
            std::fs::write(path, generator.to_dot()?)?;
            println!("Wrote partition graph to {}", path.display());
        }
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
