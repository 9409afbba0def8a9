use anyhow::Context;
use castchain::config::{TranscodeParams, VideoSize, app_name, app_version, default_chain};
use castchain::output::OutputTarget;
use castchain::pipeline::{Backends, ChainBuilder, Executor, FilterRegistry};
use castchain::utils::sos::SignalOfStop;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{info, warn};
use tracing_subscriber::filter::LevelFilter;

fn cli() -> Command {
    Command::new(app_name())
        .version(app_version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("bitrate")
                .short('b')
                .long("bitrate")
                .value_name("KBPS")
                .help("Target bitrate in kbps (0 keeps the encoder default).")
                .value_parser(value_parser!(u32))
                .default_value("0"),
        )
        .arg(
            Arg::new("crf")
                .short('c')
                .long("crf")
                .value_name("CRF")
                .help("Constant rate factor, 0 - 53 (0 keeps the encoder default).")
                .value_parser(value_parser!(u32))
                .default_value("0"),
        )
        .arg(
            Arg::new("video-size")
                .short('s')
                .long("video-size")
                .value_name("WxH")
                .help("Capture size; the display resolution when omitted.")
                .value_parser(|s: &str| s.parse::<VideoSize>()),
        )
        .arg(
            Arg::new("framerate")
                .short('r')
                .long("framerate")
                .value_name("FPS")
                .help("Frames per second delivered to the chain.")
                .value_parser(value_parser!(u32))
                .default_value("15"),
        )
        .arg(
            Arg::new("top")
                .short('t')
                .long("top")
                .value_name("ROWS")
                .help("Rows cropped from the top of the display.")
                .value_parser(value_parser!(u32))
                .default_value("0"),
        )
        .arg(
            Arg::new("bottom")
                .short('B')
                .long("bottom")
                .value_name("ROWS")
                .help("Rows cropped from the bottom of the display.")
                .value_parser(value_parser!(u32))
                .default_value("0"),
        )
        .arg(
            Arg::new("packetize")
                .short('p')
                .long("packetize")
                .help("Prefix every record with its 4-byte little-endian length.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("filters")
                .short('f')
                .long("filters")
                .value_name("CHAIN")
                .help("Stage list, e.g. cap:repeat:av:stat:file."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .help("Debug logging and a periodic stat line.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("file://<path>, pipe://<fd> or tcp://<host>:<port>")
                .required(true),
        )
}

fn params_from(matches: &ArgMatches) -> TranscodeParams {
    let number = |id: &str| matches.get_one::<u32>(id).copied().unwrap_or_default();
    let size = matches.get_one::<VideoSize>("video-size").copied();

    TranscodeParams {
        width: size.map_or(0, |s| s.width),
        height: size.map_or(0, |s| s.height),
        top: number("top"),
        bottom: number("bottom"),
        crf: number("crf"),
        bitrate: number("bitrate"),
        framerate: number("framerate"),
        packetize: matches.get_flag("packetize"),
        ..Default::default()
    }
}

fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    // stdout may be the output itself (pipe://1)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO })
        .init();

    let output = matches
        .get_one::<String>("output")
        .context("missing output")?;
    let target = OutputTarget::parse(output).context("invalid output")?;
    let params = params_from(&matches);
    let spec = matches
        .get_one::<String>("filters")
        .cloned()
        .unwrap_or_else(|| default_chain(target.scheme(), verbose));

    let stop = SignalOfStop::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupted, stopping");
            stop.cancel();
        })
        .context("Error setting Ctrl-C handler")?;
    }

    let chain = ChainBuilder::new(FilterRegistry::builtin(), Backends::platform(), &stop)
        .build(&spec, Some(target), &params)
        .with_context(|| format!("unable to build chain '{spec}'"))?;

    let handle = Executor::new(output.as_str())
        .spawn(chain, stop)
        .context("unable to start stream")?;
    let report = handle.join().context("stream failed")?;
    info!("{report}");

    Ok(())
}
