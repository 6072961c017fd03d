use getopts::Options;
use midimatrix::grid::Rejection;
use midimatrix::pipeline::Event;
use midimatrix::view::Layout;

use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_ADDRESS: u8 = 0x3C;
pub const DEFAULT_CONTRAST: u8 = 128;
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";
pub const DEFAULT_PREV_LINE: u32 = 16;
pub const DEFAULT_SELECT_LINE: u32 = 26;
pub const DEFAULT_HOLD_MS: u64 = 1000;
pub const DEFAULT_TIME_FORMAT: &str = "%T%.3f ";

/// Service configuration. Every setting can come from the environment;
/// a command line option overrides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixOpts {
    pub i2c_bus: String,
    /// 7-bit I2C address of the display.
    pub address: u8,
    pub contrast: u8,
    pub buttons: bool,
    pub gpio_chip: String,
    pub prev_line: u32,
    pub select_line: u32,
    pub hold: Duration,
    pub right_align: bool,
    pub verbose: bool,
    pub debugging: bool,
    pub time_format: String,
    pub enumerate: bool,
    pub help: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Options(getopts::Fail),
    BadAddress(String),
    BadContrast(String),
    BadNumber { setting: &'static str, value: String },
    BadFlag { setting: &'static str, value: String },
    UnexpectedArgument(String),
}

impl From<getopts::Fail> for ConfigError {
    fn from(f: getopts::Fail) -> Self {
        ConfigError::Options(f)
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Options(fail) => write!(f, "{}", fail),
            ConfigError::BadAddress(v) => {
                write!(f, "Invalid display address '{}' (expected 0x00-0x7F)", v)
            }
            ConfigError::BadContrast(v) => write!(f, "Invalid contrast '{}' (expected 0-255)", v),
            ConfigError::BadNumber { setting, value } => {
                write!(f, "Invalid {} '{}'", setting, value)
            }
            ConfigError::BadFlag { setting, value } => {
                write!(f, "Invalid {} '{}' (expected on/off)", setting, value)
            }
            ConfigError::UnexpectedArgument(arg) => write!(f, "Unexpected argument '{}'", arg),
        }
    }
}

/// Accepts `0x3C`, `0X3c` or `60`.
pub fn parse_address(value: &str) -> Result<u8, ConfigError> {
    let v = value.trim();
    let parsed = if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16)
    } else {
        v.parse::<u8>()
    };
    match parsed {
        Ok(addr) if addr <= 0x7F => Ok(addr),
        _ => Err(ConfigError::BadAddress(value.to_string())),
    }
}

fn parse_flag(setting: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::BadFlag {
            setting,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(setting: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::BadNumber {
        setting,
        value: value.to_string(),
    })
}

impl MatrixOpts {
    pub fn options() -> Options {
        let mut opts = Options::new();
        opts.optopt(
            "a",
            "",
            "Display I2C address (default 0x3C) [MIDIMATRIX_I2C_ADDRESS]",
            "addr",
        );
        opts.optopt(
            "c",
            "",
            "Display contrast 0-255 (default 128) [MIDIMATRIX_CONTRAST]",
            "level",
        );
        opts.optflag("b", "", "Enable the two buttons [MIDIMATRIX_BUTTONS]");
        opts.optopt(
            "",
            "prev-line",
            "GPIO line of the previous button (default 16) [MIDIMATRIX_PREV_LINE]",
            "n",
        );
        opts.optopt(
            "",
            "select-line",
            "GPIO line of the select button (default 26) [MIDIMATRIX_SELECT_LINE]",
            "n",
        );
        opts.optopt(
            "",
            "i2c-bus",
            "I2C bus device (default /dev/i2c-1) [MIDIMATRIX_I2C_BUS]",
            "path",
        );
        opts.optopt(
            "",
            "gpio-chip",
            "GPIO chip device (default /dev/gpiochip0) [MIDIMATRIX_GPIO_CHIP]",
            "path",
        );
        opts.optopt(
            "",
            "hold",
            "Press length that counts as a hold (default 1000) [MIDIMATRIX_HOLD_MS]",
            "ms",
        );
        opts.optflag("", "left", "Place the grid at the left instead of the right edge");
        opts.optflag("v", "", "Verbose output");
        opts.optflag("d", "", "Debugging output");
        opts.optopt("t", "", "Timestamp format (default '%T%.3f ')", "fmt");
        opts.optflag("", "enum", "Print MIDI ports and connections, then quit");
        opts.optflag("h", "help", "Print this help");
        opts
    }

    /// Builds the configuration from `args` (without the program name) and
    /// the environment lookup `env`.
    pub fn parse<E>(args: &[String], env: E) -> Result<MatrixOpts, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let matches = Self::options().parse(args)?;
        if let Some(extra) = matches.free.first() {
            return Err(ConfigError::UnexpectedArgument(extra.clone()));
        }
        let setting = |opt: &str, var: &str| matches.opt_str(opt).or_else(|| env(var));

        let address = match setting("a", "MIDIMATRIX_I2C_ADDRESS") {
            Some(v) => parse_address(&v)?,
            None => DEFAULT_ADDRESS,
        };
        let contrast = match setting("c", "MIDIMATRIX_CONTRAST") {
            Some(v) => v
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::BadContrast(v.clone()))?,
            None => DEFAULT_CONTRAST,
        };
        let buttons = if matches.opt_present("b") {
            true
        } else {
            match env("MIDIMATRIX_BUTTONS") {
                Some(v) => parse_flag("MIDIMATRIX_BUTTONS", &v)?,
                None => false,
            }
        };
        let prev_line = match setting("prev-line", "MIDIMATRIX_PREV_LINE") {
            Some(v) => parse_number("previous button line", &v)?,
            None => DEFAULT_PREV_LINE,
        };
        let select_line = match setting("select-line", "MIDIMATRIX_SELECT_LINE") {
            Some(v) => parse_number("select button line", &v)?,
            None => DEFAULT_SELECT_LINE,
        };
        let hold_ms = match setting("hold", "MIDIMATRIX_HOLD_MS") {
            Some(v) => parse_number("hold time", &v)?,
            None => DEFAULT_HOLD_MS,
        };

        Ok(MatrixOpts {
            i2c_bus: setting("i2c-bus", "MIDIMATRIX_I2C_BUS")
                .unwrap_or(DEFAULT_I2C_BUS.to_string()),
            address,
            contrast,
            buttons,
            gpio_chip: setting("gpio-chip", "MIDIMATRIX_GPIO_CHIP")
                .unwrap_or(DEFAULT_GPIO_CHIP.to_string()),
            prev_line,
            select_line,
            hold: Duration::from_millis(hold_ms),
            right_align: !matches.opt_present("left"),
            verbose: matches.opt_present("v"),
            debugging: matches.opt_present("d"),
            time_format: matches
                .opt_str("t")
                .unwrap_or(DEFAULT_TIME_FORMAT.to_string()),
            enumerate: matches.opt_present("enum"),
            help: matches.opt_present("h"),
        })
    }

    /// `parse` against the process environment.
    pub fn from_env(args: &[String]) -> Result<MatrixOpts, ConfigError> {
        Self::parse(args, |var| std::env::var(var).ok())
    }

    pub fn layout(&self, display: midimatrix::view::Size) -> Layout {
        let mut layout = Layout::new(display);
        layout.right_align = self.right_align;
        layout
    }
}

/// Log line for a pipeline status event, if it should be shown at the
/// given verbosity. Failures always are; routine paints only with
/// debugging on.
pub fn status_line(event: &Event, verbose: bool, debugging: bool) -> Option<String> {
    let line = match event {
        Event::FatalError(msg) => return Some(format!("Fatal error: {}", msg)),
        Event::SourceClosed => return Some("Sequencer stopped delivering events".to_string()),
        Event::ShuttingDown => "Shutting down".to_string(),
        Event::SubscribeRequested { sender, dest } => format!("Connecting {} -> {}", sender, dest),
        Event::UnsubscribeRequested { sender, dest } => {
            format!("Disconnecting {} -> {}", sender, dest)
        }
        Event::Refreshed { ports } => format!("Matrix rebuilt, {} ports", ports),
        Event::SelectRejected(Rejection::SelfConnection) => {
            "Nothing to toggle: a port cannot feed itself".to_string()
        }
        Event::SelectRejected(Rejection::NoTarget) => {
            "Nothing to toggle: no port under the cursor".to_string()
        }
        other => {
            return if debugging {
                Some(format!("{:?}", other))
            } else {
                None
            };
        }
    };
    if verbose || debugging {
        Some(line)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|a| a.to_string()).collect()
    }

    fn with_env(
        args: &[String],
        vars: &[(&str, &str)],
    ) -> Result<MatrixOpts, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MatrixOpts::parse(args, |k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let o = with_env(&[], &[]).unwrap();
        assert_eq!(o.address, 0x3C);
        assert_eq!(o.contrast, 128);
        assert!(!o.buttons);
        assert_eq!((o.prev_line, o.select_line), (16, 26));
        assert_eq!(o.i2c_bus, "/dev/i2c-1");
        assert_eq!(o.hold, Duration::from_millis(1000));
        assert!(o.right_align);
        assert!(!o.enumerate);
    }

    #[test]
    fn environment_overrides_defaults() {
        let o = with_env(
            &[],
            &[
                ("MIDIMATRIX_I2C_ADDRESS", "0x3d"),
                ("MIDIMATRIX_CONTRAST", "255"),
                ("MIDIMATRIX_BUTTONS", "yes"),
                ("MIDIMATRIX_PREV_LINE", "5"),
                ("MIDIMATRIX_SELECT_LINE", "6"),
            ],
        )
        .unwrap();
        assert_eq!(o.address, 0x3D);
        assert_eq!(o.contrast, 255);
        assert!(o.buttons);
        assert_eq!((o.prev_line, o.select_line), (5, 6));
    }

    #[test]
    fn command_line_wins() {
        let o = with_env(
            &args(&["-a", "61", "-c", "10", "--select-line", "4"]),
            &[
                ("MIDIMATRIX_I2C_ADDRESS", "0x3D"),
                ("MIDIMATRIX_CONTRAST", "200"),
                ("MIDIMATRIX_SELECT_LINE", "6"),
            ],
        )
        .unwrap();
        assert_eq!(o.address, 61);
        assert_eq!(o.contrast, 10);
        assert_eq!(o.select_line, 4);
    }

    #[test]
    fn button_flag_beats_disabled_env() {
        let o = with_env(&args(&["-b"]), &[("MIDIMATRIX_BUTTONS", "off")]).unwrap();
        assert!(o.buttons);
    }

    #[test]
    fn malformed_settings_are_errors() {
        assert!(matches!(
            with_env(&args(&["-a", "0x80"]), &[]),
            Err(ConfigError::BadAddress(_))
        ));
        assert!(matches!(
            with_env(&[], &[("MIDIMATRIX_I2C_ADDRESS", "zz")]),
            Err(ConfigError::BadAddress(_))
        ));
        assert!(matches!(
            with_env(&args(&["-c", "256"]), &[]),
            Err(ConfigError::BadContrast(_))
        ));
        assert!(matches!(
            with_env(&[], &[("MIDIMATRIX_CONTRAST", "-1")]),
            Err(ConfigError::BadContrast(_))
        ));
        assert!(matches!(
            with_env(&[], &[("MIDIMATRIX_BUTTONS", "maybe")]),
            Err(ConfigError::BadFlag { .. })
        ));
        assert!(matches!(
            with_env(&args(&["--hold", "long"]), &[]),
            Err(ConfigError::BadNumber { .. })
        ));
        assert!(matches!(
            with_env(&args(&["extra"]), &[]),
            Err(ConfigError::UnexpectedArgument(_))
        ));
        assert!(matches!(
            with_env(&args(&["--bogus"]), &[]),
            Err(ConfigError::Options(_))
        ));
    }

    #[test]
    fn address_forms() {
        assert_eq!(parse_address("0x3C").unwrap(), 0x3C);
        assert_eq!(parse_address("0X3c").unwrap(), 0x3C);
        assert_eq!(parse_address(" 60 ").unwrap(), 60);
        assert!(parse_address("0x").is_err());
    }

    #[test]
    fn left_aligned_layout() {
        let o = with_env(&args(&["--left"]), &[]).unwrap();
        let layout = o.layout(midimatrix::view::Size::new(128, 64));
        assert!(!layout.right_align);
    }

    #[test]
    fn rejected_selects_are_logged_when_verbose() {
        let diagonal = Event::SelectRejected(Rejection::SelfConnection);
        let stale = Event::SelectRejected(Rejection::NoTarget);
        assert_eq!(status_line(&diagonal, false, false), None);
        assert!(status_line(&diagonal, true, false)
            .unwrap()
            .contains("cannot feed itself"));
        assert!(status_line(&stale, true, false)
            .unwrap()
            .contains("no port under the cursor"));
    }

    #[test]
    fn status_verbosity() {
        let fatal = Event::FatalError("boom".to_string());
        assert_eq!(
            status_line(&fatal, false, false).as_deref(),
            Some("Fatal error: boom")
        );
        let painted = Event::Painted { generation: 3 };
        assert_eq!(status_line(&painted, true, false), None);
        assert!(status_line(&painted, false, true).is_some());
        assert!(status_line(&Event::Refreshed { ports: 2 }, true, false).is_some());
        assert_eq!(status_line(&Event::GestureSwallowed, true, false), None);
    }
}
