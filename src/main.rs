//! vcu-encode: raw video to H.264/H.265 with a frame-synchronized dynamic feature

use std::path::PathBuf;

use clap::{builder::BoolishValueParser, ArgAction, Parser};
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vcu_dynamic::pipeline::EncodePipeline;
use vcu_dynamic::{Codec, Config, ControlRate};

const DYNAMIC_PATTERNS: &str = "\
Dynamic-string patterns:
  BR:frame_num:new_value_in_kbps              Dynamic bitrate
  BFrm:frame_num:new_value                    Dynamic B-frames
  GL:frame_num:new_value                      Dynamic GOP length
  KF:frame_num                                Key frame insertion
  ROI:frame_num:XPOSxYPOS:WIDTHxHEIGHT:type   Region of interest
  SC:frame_num:look_ahead                     Scene change hint
  IL:frame_num                                Mark long-term reference picture
  UL:frame_num                                Use long-term reference picture

Example:
  vcu-encode -w 3840 -h 2160 -e avc -f 30 -c 2 -g 30 -o /run/op.h264 -i /run/input.yuv -d BR:100:1000";

#[derive(Parser, Debug)]
#[command(name = "vcu-encode", version)]
#[command(about = "Encode raw video and change encoder behavior at a given frame")]
#[command(disable_help_flag = true, after_help = DYNAMIC_PATTERNS)]
struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Width of the video frame
    #[arg(short, long)]
    width: Option<u32>,

    /// Height of the video frame
    #[arg(short, long)]
    height: Option<u32>,

    /// Video framerate
    #[arg(short, long)]
    framerate: Option<u32>,

    /// Rate control mode of the encoder, 1/vbr or 2/cbr
    #[arg(short, long, value_enum)]
    control_rate: Option<ControlRate>,

    /// Number of B-frames between consecutive P-frames
    #[arg(short, long)]
    b_frames: Option<u32>,

    /// Target bitrate in kbps
    #[arg(short = 'r', long)]
    target_bitrate: Option<u32>,

    /// Max bitrate in kbps, used with VBR
    #[arg(short, long)]
    max_bitrate: Option<u32>,

    /// GOP length of the encoder
    #[arg(short, long)]
    gop_length: Option<u32>,

    /// Output filename
    #[arg(short, long = "output-filename")]
    output: Option<PathBuf>,

    /// Input filename
    #[arg(short, long = "input-filename")]
    input: Option<PathBuf>,

    /// Encoder codec, avc for H.264 and hevc for H.265
    #[arg(short = 'e', long = "encoder-type", value_enum)]
    codec: Option<Codec>,

    /// Dynamic feature string, 'Dynamic_feature_str:Frame_number:Value'
    #[arg(short = 'd', long = "dynamic-str")]
    dynamic: Option<String>,

    /// Enable long-term reference pictures
    #[arg(short = 'l', long, value_parser = BoolishValueParser::new())]
    long_term_ref: Option<bool>,

    /// Periodicity of long-term reference pictures
    #[arg(short = 'u', long)]
    long_term_freq: Option<u32>,
}

impl Cli {
    /// Flags given on the command line win over file and environment
    fn apply(self, config: &mut Config) {
        let stream = &mut config.stream;
        let enc = &mut config.encoder;

        if let Some(v) = self.width {
            stream.width = v;
        }
        if let Some(v) = self.height {
            stream.height = v;
        }
        if let Some(v) = self.framerate {
            stream.framerate = v;
        }
        if let Some(v) = self.input {
            stream.input = Some(v);
        }
        if let Some(v) = self.output {
            stream.output = Some(v);
        }
        if let Some(v) = self.control_rate {
            enc.control_rate = v;
        }
        if let Some(v) = self.b_frames {
            enc.b_frames = v;
        }
        if let Some(v) = self.target_bitrate {
            enc.target_bitrate = v;
            // max-bitrate follows the target unless set explicitly
            enc.max_bitrate = v;
        }
        if let Some(v) = self.max_bitrate {
            enc.max_bitrate = v;
        }
        if let Some(v) = self.gop_length {
            enc.gop_length = v;
        }
        if let Some(v) = self.codec {
            enc.codec = v;
        }
        if let Some(v) = self.dynamic {
            enc.dynamic = Some(v);
        }
        if let Some(v) = self.long_term_ref {
            enc.long_term_ref = v;
        }
        if let Some(v) = self.long_term_freq {
            enc.long_term_freq = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    config.validate()?;

    // A bad descriptor aborts before anything is built
    let directive = config.directive()?;

    let stream = &config.stream;
    let enc = &config.encoder;
    info!(
        "Using width = {} height = {} framerate = {} codec = {:?} target-bitrate = {} control-rate = {:?} b-frames = {} output-location = {:?}",
        stream.width,
        stream.height,
        stream.framerate,
        enc.codec,
        enc.target_bitrate,
        enc.control_rate,
        enc.b_frames,
        stream.output
    );
    if enc.control_rate == ControlRate::Vbr {
        info!("max-bitrate = {}", enc.max_bitrate);
    }

    let mut pipeline = EncodePipeline::new(&config)?;
    if let Some(directive) = directive {
        pipeline.install_directive(directive)?;
    }

    let interrupt = pipeline.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing stream");
            interrupt.send_eos();
        }
    });

    info!("Running...");
    let (pipeline, result) = tokio::task::spawn_blocking(move || {
        let result = pipeline.run();
        (pipeline, result)
    })
    .await?;
    result?;

    match pipeline.outcome() {
        Some(outcome) => info!("Encode finished, dynamic feature {:?}", outcome),
        None => info!("Encode finished"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags_override_config() {
        let cli = Cli::try_parse_from([
            "vcu-encode", "-w", "1920", "-h", "1080", "-f", "60", "-c", "1", "-e", "hevc", "-b",
            "4", "-r", "8000", "-g", "60", "-i", "/run/input.yuv", "-o", "/run/op.h265", "-d",
            "BFrm:10:2", "-l", "1", "-u", "15",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!((config.stream.width, config.stream.height), (1920, 1080));
        assert_eq!(config.stream.framerate, 60);
        assert_eq!(config.encoder.control_rate, ControlRate::Vbr);
        assert_eq!(config.encoder.codec, Codec::Hevc);
        assert_eq!(config.encoder.b_frames, 4);
        assert_eq!(config.encoder.target_bitrate, 8000);
        assert_eq!(config.encoder.max_bitrate, 8000);
        assert_eq!(config.encoder.gop_length, 60);
        assert!(config.encoder.long_term_ref);
        assert_eq!(config.encoder.long_term_freq, 15);
        assert_eq!(config.encoder.dynamic.as_deref(), Some("BFrm:10:2"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_max_bitrate_wins() {
        let cli = Cli::try_parse_from(["vcu-encode", "-r", "8000", "-m", "12000"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.encoder.max_bitrate, 12000);
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::try_parse_from(["vcu-encode", "--control-rate", "cbr"]).unwrap();
        let mut config = Config::default();
        config.encoder.gop_length = 120;
        cli.apply(&mut config);
        assert_eq!(config.encoder.gop_length, 120);
        assert_eq!(config.encoder.control_rate, ControlRate::Cbr);
    }

    #[test]
    fn unknown_control_rate_is_rejected() {
        assert!(Cli::try_parse_from(["vcu-encode", "-c", "3"]).is_err());
    }
}
