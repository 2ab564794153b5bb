pub mod dynamic;

#[cfg(feature = "gstreamer-pipeline")]
pub mod pipeline;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dynamic::{Directive, ParseError};

/// Prefix for environment overrides, e.g. `VCU__ENCODER__TARGET_BITRATE=8000`
pub const ENV_PREFIX: &str = "VCU";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid dynamic feature string: {0}")]
    Descriptor(#[from] ParseError),

    #[error("please provide {0} argument, use --help option for more details")]
    MissingArgument(&'static str),
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub stream: StreamConfig,
    pub encoder: EncoderConfig,
    pub logging: LoggingConfig,
}

/// Raw input stream description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub format: PixelFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub codec: Codec,
    pub control_rate: ControlRate,
    pub target_bitrate: u32, // kbps
    pub max_bitrate: u32,    // kbps, VBR only
    pub gop_length: u32,
    pub b_frames: u32,
    pub long_term_ref: bool,
    pub long_term_freq: u32,
    /// Dynamic feature descriptor, e.g. `BR:100:1000`
    pub dynamic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
}

/// Raw pixel layouts accepted by the parser stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Nv12,
    Nv16,
    I420,
}

impl PixelFormat {
    /// `GstVideoFormat` nick
    pub fn nick(self) -> &'static str {
        match self {
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Nv16 => "nv16",
            PixelFormat::I420 => "i420",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264
    Avc,
    /// H.265
    Hevc,
}

impl Codec {
    pub fn element(self) -> &'static str {
        match self {
            Codec::Avc => "omxh264enc",
            Codec::Hevc => "omxh265enc",
        }
    }

    /// Output caps pinning the encoded profile
    pub fn caps(self) -> &'static str {
        match self {
            Codec::Avc => "video/x-h264,profile=high",
            Codec::Hevc => "video/x-h265,profile=main",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ControlRate {
    #[value(alias = "1")]
    Vbr,
    #[value(alias = "2")]
    Cbr,
}

impl ControlRate {
    /// `control-rate` enum nick on the OMX encoders
    pub fn nick(self) -> &'static str {
        match self {
            ControlRate::Vbr => "variable",
            ControlRate::Cbr => "constant",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream: StreamConfig {
                input: None,
                output: None,
                width: 3840,
                height: 2160,
                framerate: 30,
                format: PixelFormat::Nv12,
            },
            encoder: EncoderConfig {
                codec: Codec::Avc,
                control_rate: ControlRate::Cbr,
                target_bitrate: 5000,
                max_bitrate: 5000,
                gop_length: 30,
                b_frames: 0,
                long_term_ref: false,
                long_term_freq: 0,
                dynamic: None,
            },
            logging: LoggingConfig {
                filter: "vcu_dynamic=info,vcu_encode=info".into(),
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `VCU__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check that everything needed to run a pipeline is present
    pub fn validate(&self) -> Result<()> {
        if self.stream.input.is_none() {
            return Err(Error::MissingArgument("input-filename"));
        }
        if self.stream.output.is_none() {
            return Err(Error::MissingArgument("output-filename"));
        }
        Ok(())
    }

    /// Parse the configured dynamic feature, if any
    pub fn directive(&self) -> Result<Option<Directive>> {
        match self.encoder.dynamic.as_deref() {
            Some(descriptor) => Ok(Some(dynamic::parse(descriptor)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that read or write `VCU__*` variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env_overrides() {
        let prefix = format!("{}__", ENV_PREFIX);
        for (key, _) in std::env::vars_os() {
            if key.to_str().is_some_and(|k| k.starts_with(&prefix)) {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_match_encoder_reference_settings() {
        let config = Config::default();
        assert_eq!((config.stream.width, config.stream.height), (3840, 2160));
        assert_eq!(config.stream.framerate, 30);
        assert_eq!(config.encoder.codec, Codec::Avc);
        assert_eq!(config.encoder.control_rate, ControlRate::Cbr);
        assert_eq!(config.encoder.target_bitrate, 5000);
        assert_eq!(config.encoder.gop_length, 30);
        assert_eq!(config.encoder.b_frames, 0);
        assert!(config.encoder.dynamic.is_none());
    }

    #[test]
    fn load_layers_file_over_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_overrides();

        let path = std::env::temp_dir().join(format!("vcu-dynamic-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
[stream]
input = "/run/input.yuv"
width = 1920

[encoder]
codec = "hevc"
control_rate = "vbr"
target_bitrate = 8000
dynamic = "BFrm:10:2"
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.stream.input, Some(PathBuf::from("/run/input.yuv")));
        assert_eq!(config.stream.width, 1920);
        assert_eq!(config.stream.height, 2160);
        assert_eq!(config.encoder.codec, Codec::Hevc);
        assert_eq!(config.encoder.control_rate, ControlRate::Vbr);
        assert_eq!(config.encoder.target_bitrate, 8000);
        assert_eq!(config.encoder.max_bitrate, 5000);
        assert_eq!(config.directive().unwrap().unwrap().to_string(), "BFrm:10:2");
    }

    #[test]
    fn environment_overrides_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env_overrides();

        std::env::set_var("VCU__ENCODER__TARGET_BITRATE", "8000");
        std::env::set_var("VCU__ENCODER__DYNAMIC", "KF:3");
        std::env::set_var("VCU__STREAM__WIDTH", "1280");
        let loaded = Config::load(None);
        clear_env_overrides();

        let config = loaded.unwrap();
        assert_eq!(config.encoder.target_bitrate, 8000);
        assert_eq!(config.encoder.dynamic.as_deref(), Some("KF:3"));
        assert_eq!(config.stream.width, 1280);
        assert_eq!(config.stream.height, 2160);
        assert_eq!(config.directive().unwrap().unwrap().to_string(), "KF:3");
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("vcu-dynamic-does-not-exist.toml");
        assert!(matches!(Config::load(Some(path.as_path())), Err(Error::Config(_))));
    }

    #[test]
    fn validate_requires_input_and_output() {
        let mut config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(Error::MissingArgument("input-filename"))
        ));

        config.stream.input = Some("/run/input.yuv".into());
        assert!(matches!(
            config.validate(),
            Err(Error::MissingArgument("output-filename"))
        ));

        config.stream.output = Some("/run/op.h264".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_descriptor_surfaces_as_error() {
        let mut config = Config::default();
        config.encoder.dynamic = Some("XX:5:1".into());
        assert!(matches!(
            config.directive(),
            Err(Error::Descriptor(ParseError::UnknownKind(_)))
        ));
    }

    #[test]
    fn codec_and_rate_names() {
        assert_eq!(Codec::Hevc.element(), "omxh265enc");
        assert_eq!(Codec::Avc.caps(), "video/x-h264,profile=high");
        assert_eq!(ControlRate::Vbr.nick(), "variable");
        assert_eq!(PixelFormat::Nv12.nick(), "nv12");
    }
}
