use hspi_orchestrator::{OrchestratorConfig, create_testbench};
use hspi_runtime::engine::CycleEngine;

fn usage() -> ! {
    eprintln!(
        "Usage: hspi_loopback <config.toml> [frames] [words]\n\
         \n\
         Examples:\n\
           cargo run -p hspi_orchestrator --bin hspi_loopback -- config/hspi_loopback.toml 4 128\n\
           RUST_LOG=debug cargo run -p hspi_orchestrator --bin hspi_loopback -- config/hspi_sink.toml\n\
         \n\
         Sends <frames> packets of <words> sequential words from the host and\n\
         runs until the device has answered them or max_cycles is reached."
    );
    std::process::exit(2)
}

fn parse_usize(s: &str, name: &str) -> usize {
    s.parse::<usize>().unwrap_or_else(|_| {
        eprintln!("Invalid {name}: {s}");
        usage()
    })
}

/// Packet `index`: `words` consecutive values, continuing from the previous
/// packet and wrapping at `u32::MAX`.
fn payload(index: usize, words: usize) -> Vec<u32> {
    let start = index.wrapping_mul(words) as u32;
    (0..words).map(|i| start.wrapping_add(i as u32)).collect()
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| usage());
    let frames = args.next().map(|s| parse_usize(&s, "frames")).unwrap_or(4);
    let words = args.next().map(|s| parse_usize(&s, "words")).unwrap_or(128);
    if words == 0 {
        eprintln!("words must be at least 1");
        usage()
    }

    let config = OrchestratorConfig::from_file(&config_path).unwrap_or_else(|e| {
        eprintln!("failed to load config: {e}");
        std::process::exit(1)
    });
    let bench = create_testbench(&config).unwrap_or_else(|e| {
        eprintln!("failed to build testbench: {e}");
        std::process::exit(1)
    });

    let mut engine = CycleEngine::new(bench);
    for index in 0..frames {
        engine.system.host.submit(&payload(index, words));
    }

    let echo = engine.system.device.port().as_loopback().is_some();
    let result = engine.run_until(config.runtime.max_cycles, |bench| {
        let delivered = bench.device.reports().len() >= frames;
        let echoed = !echo || bench.host.reports().len() >= frames;
        delivered && echoed && bench.is_idle()
    });

    let bench = &engine.system;
    let crc_errors = bench
        .device
        .reports()
        .iter()
        .chain(bench.host.reports())
        .filter(|r| r.crc_error)
        .count();
    log::info!(
        "{} cycles: device got {} frames, host got {} echoes, {} acks, {} CRC errors",
        engine.cycle_count,
        bench.device.reports().len(),
        bench.host.reports().len(),
        bench.host.acks_received(),
        crc_errors
    );

    if let Err(e) = result {
        eprintln!("run failed: {e}");
        std::process::exit(1);
    }
    if crc_errors > 0 {
        std::process::exit(1);
    }
}
