//! midimatrix
//!
//! Shows which MIDI ports are connected on a small OLED, and lets the two
//! buttons connect and disconnect them.

use midimatrix::grid::ConnectionMatrix;
use midimatrix::input::{gpio::GpioButton, Button, Debouncer, DEFAULT_BOUNCE};
use midimatrix::pipeline::{Event, Pipeline};
use midimatrix::topology::{alsa::AlsaTopology, PortTopologySource, TopologySnapshot};
use midimatrix::view::{ssd1306::Ssd1306Display, DisplaySink};
use midimatrix_tools::{status_line, MatrixOpts};

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

macro_rules! log{
    ($tf:expr, $msg:expr)=>{
    {
        println!("{}{}", chrono::Local::now().format(&$tf), $msg);
    }
    };
    ($tf:expr, $f:expr,$($a:tt)*)=>{
    {
        log!($tf, format!($f, $($a)*));
    }
    };
}

fn enumerate(source: &AlsaTopology) -> Result<(), midimatrix::topology::TopologyError> {
    let ports = source.ports()?;
    if ports.is_empty() {
        println!("No MIDI ports found");
        return Ok(());
    }
    let snapshot = TopologySnapshot::capture(source)?;
    let matrix = ConnectionMatrix::build(&snapshot);
    println!("MIDI ports:");
    for port in &ports {
        let kind = match (port.capability.source, port.capability.sink) {
            (true, true) => "in/out",
            (true, false) => "out",
            (false, true) => "in",
            (false, false) => "-",
        };
        let shown = (0..matrix.len()).any(|i| matrix.port_id(i) == Some(port.id));
        println!(
            " {} {:>7} {:<6} {}",
            if shown { "*" } else { " " },
            port.id.to_string(),
            kind,
            port.label
        );
    }
    let mut any = false;
    for (sender, dests) in &snapshot.subscribers {
        for dest in dests {
            if !any {
                println!("Connections:");
                any = true;
            }
            println!(" * {} -> {}", sender, dest);
        }
    }
    if !any {
        println!("No connections");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    macro_rules! die{
        ($f:expr,$($a:tt)*)=>{
        {
            die!(format!($f, $($a)*));
        }
        };
        ($msg:expr)=>{
        {
            eprintln!("ERROR: {}", $msg);
            return ExitCode::FAILURE;
        }
        };
    }
    macro_rules! die_usage{
        ($f:expr,$($a:tt)*)=>{
        {
            die_usage!(format!($f, $($a)*));
        }
        };
        ($msg:expr)=>{
        {
            let usage = format!("Usage: {} [-a addr] [-c contrast] [-b] [-v] [-d] [-t fmt]  or {} --enum", &args[0], &args[0]);
            die!("{}\n{}", $msg, MatrixOpts::options().usage(&usage));
        }
        };
    }

    let opts = match MatrixOpts::from_env(&args[1..]) {
        Ok(opts) => opts,
        Err(err) => die_usage!("{}", err),
    };
    if opts.help {
        let usage = format!("Usage: {} [options]", &args[0]);
        print!("{}", MatrixOpts::options().usage(&usage));
        return ExitCode::SUCCESS;
    }
    let tf = opts.time_format.clone();

    let source = match AlsaTopology::open("midimatrix") {
        Ok(source) => Arc::new(source),
        Err(err) => die!("Cannot open the MIDI sequencer: {:?}", err),
    };

    if opts.enumerate {
        if let Err(err) = enumerate(&source) {
            die!("Failed to enumerate ports: {:?}", err);
        }
        return ExitCode::SUCCESS;
    }

    let mut display = match Ssd1306Display::open(&opts.i2c_bus, opts.address, opts.contrast) {
        Ok(display) => display,
        Err(err) => die!("Cannot open the display: {:?}", err),
    };
    if opts.verbose {
        log!(
            tf,
            "Display at {:#04x} on {}, contrast {}",
            opts.address,
            opts.i2c_bus,
            opts.contrast
        );
    }

    let (status_send, status) = crossbeam::channel::bounded::<Event>(64);
    let pipeline = Pipeline::new(
        source.clone(),
        opts.layout(display.size()),
        Some(status_send),
    );

    if opts.buttons {
        for (button, line) in [
            (Button::Previous, opts.prev_line),
            (Button::Select, opts.select_line),
        ] {
            let debouncer = Debouncer::new(DEFAULT_BOUNCE, opts.hold);
            let input = match GpioButton::open(&opts.gpio_chip, line, button, debouncer) {
                Ok(input) => input,
                Err(err) => die!("Cannot open {:?} button: {:?}", button, err),
            };
            if let Err(err) = pipeline.attach_input(input) {
                die!("Failed to start input thread: {:?}", err);
            }
            if opts.verbose {
                log!(tf, "{:?} button on {} line {}", button, opts.gpio_chip, line);
            }
        }
    }

    let (shutdown_send, shutdown) = crossbeam::channel::bounded::<()>(1);
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = shutdown_send.try_send(());
    }) {
        die!("Failed to install signal handler: {:?}", err);
    }

    let logger = {
        let tf = tf.clone();
        let verbose = opts.verbose;
        let debugging = opts.debugging;
        std::thread::Builder::new()
            .name("status".to_string())
            .spawn(move || {
                for evt in status.iter() {
                    if let Some(line) = status_line(&evt, verbose, debugging) {
                        log!(tf, line);
                    }
                }
            })
    };
    if let Err(err) = logger {
        die!("Failed to start status thread: {:?}", err);
    }

    match pipeline.run(&mut display, &shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => die!("{:?}", err),
    }
}
