use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;

use dfu_harness::config::Config;
use dfu_harness::console::{Console, ConsoleConfig, ConsoleRead};
use dfu_harness::mcumgr::Mcumgr;
use dfu_harness::scenario::DfuScenario;
use dfu_harness::{builder, nrfutil};

/// Hardware-in-the-loop DFU harness
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Control verbosity level (use -v, -vv, -vvv, or -vvvv for more verbose output)
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// List connected devices and their UART ports
    List,
    /// Reset a board
    Reset {
        /// Device serial number (all devices when omitted)
        #[arg(long)]
        serial_number: Option<String>,
    },
    /// Erase a board's flash
    Erase {
        /// Device serial number (all devices when omitted)
        #[arg(long)]
        serial_number: Option<String>,
    },
    /// Print the UART ports of one device
    Ports {
        /// Device serial number
        #[arg(long)]
        serial_number: String,
    },
    /// List firmware image slots on a device
    Images {
        /// Serial port of the device's SMP console
        #[arg(long)]
        port: String,
        /// Baud rate
        #[arg(long, default_value_t = 115200)]
        baud: u32,
    },
    /// Upload a firmware image to a device
    Upload {
        /// Serial port of the device's SMP console
        #[arg(long)]
        port: String,
        /// Baud rate
        #[arg(long, default_value_t = 115200)]
        baud: u32,
        /// Signed image file to upload
        image: PathBuf,
    },
    /// Build a firmware image with west
    Build {
        /// Application source directory
        source_dir: PathBuf,
        /// Build output directory
        #[arg(long)]
        build_dir: PathBuf,
        /// Board name
        #[arg(long)]
        board: String,
        /// Testsuite configuration to build against
        #[arg(long)]
        testsuite: Option<String>,
        /// Build timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// Read the device console until a pattern appears
    Watch {
        /// Serial port of the device console
        #[arg(long)]
        port: String,
        /// Baud rate
        #[arg(long, default_value_t = 115200)]
        baud: u32,
        /// Regex to wait for
        pattern: String,
        /// Timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Upload an image, reset the board and wait for its boot banner
    Dfu {
        /// Signed image file to upload
        image: PathBuf,
        /// Regex expected on the console after reset
        #[arg(long, default_value = "Booting main application")]
        expect: String,
        /// Config file path (defaults to ~/.config/dfu-harness/config.yaml)
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity flags
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    debug!("*** Debug logging enabled ***");

    // Handle subcommands
    match cli.command {
        Commands::List => {
            let list = nrfutil::list_devices()?;
            if list.devices.is_empty() {
                println!("No devices found");
            }
            for device in &list.devices {
                println!("{}", device.serial_number);
                for port in &device.serial_ports {
                    println!("  {}", port.path);
                }
            }
        }
        Commands::Reset { serial_number } => {
            nrfutil::reset_board(serial_number.as_deref())?;
        }
        Commands::Erase { serial_number } => {
            nrfutil::erase_board(serial_number.as_deref())?;
        }
        Commands::Ports { serial_number } => {
            let list = nrfutil::list_devices()?;
            for port in list.ports_for_serial(&serial_number)? {
                println!("{}", port);
            }
        }
        Commands::Images { port, baud } => {
            let mcumgr = Mcumgr::create_for_serial_with_baud(&port, baud);
            for slot in mcumgr.image_list()? {
                println!(
                    "image={} slot={} version={} hash={} bootable={} active={} confirmed={} pending={}",
                    slot.image,
                    slot.slot,
                    slot.version,
                    slot.hash,
                    slot.bootable,
                    slot.active,
                    slot.confirmed,
                    slot.pending
                );
            }
        }
        Commands::Upload { port, baud, image } => {
            let mcumgr = Mcumgr::create_for_serial_with_baud(&port, baud);
            mcumgr.image_upload(&image)?;
            info!("Upload complete");
        }
        Commands::Build {
            source_dir,
            build_dir,
            board,
            testsuite,
            timeout,
        } => {
            let mut west = builder::WestBuilder::new(&source_dir, &build_dir, &board)
                .with_timeout(Duration::from_secs(timeout));
            if let Some(ref testsuite) = testsuite {
                west = west.with_testsuite(testsuite);
            }
            west.build()?;
        }
        Commands::Watch {
            port,
            baud,
            pattern,
            timeout,
        } => {
            let mut console = Console::open(ConsoleConfig::new(&port).with_baud_rate(baud))?;
            let lines = console.read_lines_until(&pattern, Duration::from_secs(timeout))?;
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Dfu {
            image,
            expect,
            config,
        } => {
            let config = Config::load(&config)?;
            let devices = nrfutil::list_devices()?;
            let ports = devices.ports_for_serial(&config.serial_number)?;
            let port = ports
                .first()
                .ok_or_else(|| anyhow::anyhow!("Device exposes no UART ports"))?;

            let mut console =
                Console::open(ConsoleConfig::new(port).with_baud_rate(config.baud_rate))?;
            let mcumgr = Mcumgr::create_for_serial_with_baud(port, config.baud_rate);

            let scenario = DfuScenario::new()
                .clear_buffer()
                .upload(image)
                .reset()
                .expect_console(&expect, config.read_timeout());
            scenario.run(&mut console, &mcumgr, Some(&config.serial_number))?;
            info!("DFU sequence complete");
        }
    }

    Ok(())
}
