use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::select;

use netscope::cli::Cli;
use netscope::collector::Collector;
use netscope::error::SnapError;
use netscope::output;
use netscope::state::Store;

/// Global shutdown flag, set by signal handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

fn exit_code(err: &SnapError) -> i32 {
    match err {
        SnapError::Serialization(_) => 3,
        SnapError::Unsupported(_) => 2,
        _ => 4,
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(cli)));

    match result {
        Ok(Ok(())) => std::process::exit(0),
        Ok(Err(e)) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
        Err(_) => {
            let e = SnapError::Fatal("unexpected panic".to_string());
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
    }
}

fn run(cli: Cli) -> Result<(), SnapError> {
    install_signal_handlers();

    let config = cli.engine_config();
    let mut collector = Collector::host(&config)?;
    let store = Store::new();

    log::info!(
        "polling every {:?}, count {}, dns {}",
        cli.interval(),
        cli.count,
        if config.dns.enabled { "on" } else { "off" }
    );

    let ticker = crossbeam_channel::tick(cli.interval());
    let stdout = io::stdout();
    let mut polls = 0u64;

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
            log::info!("shutdown requested after {polls} polls");
            break;
        }

        store.update(collector.collect());
        polls += 1;

        let snap = store.snapshot();
        let dns = collector.dns();
        let mut out = stdout.lock();
        output::write_snapshot(&snap, cli.format, &|addr: &str| dns.lookup(addr), &mut out)?;
        out.flush().map_err(SnapError::Serialization)?;
        drop(out);

        if cli.count != 0 && polls >= cli.count {
            break;
        }

        // Wake periodically so a signal between ticks is noticed.
        loop {
            select! {
                recv(ticker) -> _ => break,
                default(Duration::from_millis(200)) => {
                    if SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }
    }

    log::info!("exiting after {polls} polls");
    Ok(())
}
