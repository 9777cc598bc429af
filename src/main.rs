//! uartsim - a bit-accurate UART model on a discrete-event scheduler.
//!
//! The binary wires the model into a small self-contained simulation:
//! an optional chip-side transmitter serializes `--send` text onto the
//! chip TX line for the model to decode, `--stdin` attaches the console
//! bridge so typed bytes are encoded onto the chip RX line, and
//! `--loopback` mirrors TX edges back to RX.

mod sim;
mod uart;

use clap::Parser;
use sim::{EdgeProbe, FrameDriver, Scheduler};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use uart::bridge::InputBridge;
use uart::{UartConfig, UartModel};

#[derive(Parser, Debug)]
#[command(name = "uartsim")]
#[command(about = "A bit-accurate UART model for discrete-event simulation")]
struct Args {
    /// Baud rate in bits per second
    #[arg(short, long, default_value = "115200")]
    baudrate: u32,

    /// Mirror chip TX edges straight onto the chip RX line
    #[arg(long)]
    loopback: bool,

    /// Echo decoded TX bytes to stdout
    #[arg(long)]
    stdout: bool,

    /// Read bytes from stdin and encode them onto the chip RX line
    #[arg(long)]
    stdin: bool,

    /// Log decoded TX bytes to this file as raw binary
    #[arg(long)]
    tx_file: Option<PathBuf>,

    /// Text to serialize onto the chip TX line as UART frames
    #[arg(long)]
    send: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = UartConfig {
        baudrate: args.baudrate,
        loopback: args.loopback,
        stdout: args.stdout,
        stdin: args.stdin,
        tx_file: args.tx_file.clone(),
    };

    let mut sched = Scheduler::new();
    let chip_tx = sched.add_wire(1);
    let chip_rx = sched.add_wire(1);

    let model = UartModel::new(&config, chip_rx)?;
    let period = model.clock().period();
    let rx_path = model.rx_path();
    let uart_id = sched.add_component(Box::new(model));
    sched.listen(chip_tx, uart_id);

    // Observe whatever the model drives back toward the chip.
    let rx_edges = if config.loopback || config.stdin {
        let (probe, edges) = EdgeProbe::new();
        let probe_id = sched.add_component(Box::new(probe));
        sched.listen(chip_rx, probe_id);
        Some(edges)
    } else {
        None
    };

    if let Some(text) = &args.send {
        let mut driver = FrameDriver::new(chip_tx, period, 1);
        driver.push_bytes(text.as_bytes());
        let driver_id = sched.add_component(Box::new(driver));
        // One bit of idle before the first start edge.
        sched.schedule_at(period, driver_id);
    }

    if config.stdin {
        InputBridge::spawn(io::stdin(), rx_path, uart_id, sched.wake_sender())?;
        eprintln!("[sim] reading bytes from stdin (EOF ends the simulation)");
    }

    let end = sched.run();

    eprintln!("[sim] simulation finished at {end} ps");
    if let Some(edges) = rx_edges {
        eprintln!(
            "[sim] {} edges driven on the chip-side RX line",
            edges.lock().len()
        );
    }

    Ok(())
}
