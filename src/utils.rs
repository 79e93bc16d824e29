use std::error::Error;
use std::time::Duration;
use std::{fmt, io};

use crate::GpioTestError;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

impl GpioTestError {
    /// Process exit status for this error.  Failing to open the GPIO session
    /// is a fatal abort and is kept distinct from ordinary failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            GpioTestError::Open(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Debug for GpioTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &*self {
            GpioTestError::MissingPin => write!(f, "fatal: missing required pin argument"),
            GpioTestError::Usage(msg) => write!(f, "{}", msg),
            GpioTestError::Privilege => {
                write!(f, "fatal: this program needs to run as root (sudo)")
            }
            GpioTestError::Open(msg) => write!(f, "fatal: unable to open gpio: {}", msg),
            GpioTestError::Signal(msg) => {
                write!(f, "fatal: unable to install interrupt handler: {}", msg)
            }
            GpioTestError::NoPin(operation) => write!(
                f,
                "No pin has been set to output mode before calling {}.",
                operation
            ),
            GpioTestError::Hardware { operation, message } => {
                write!(f, "Hardware call {} failed: {}", operation, message)
            }
            GpioTestError::Io(error) => write!(f, "I/O error: {}", error),
        }
    }
}

impl fmt::Display for GpioTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for GpioTestError {}

impl From<io::Error> for GpioTestError {
    fn from(error: io::Error) -> Self {
        GpioTestError::Io(error)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum ParseDurationError {
    Empty,
    NoDigits(String),
    Units(String),
    Overflow(String),
}

impl fmt::Display for ParseDurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseDurationError::Empty => write!(f, "empty duration"),
            ParseDurationError::NoDigits(s) => write!(f, "'{}' is missing a number", s),
            ParseDurationError::Units(s) => write!(
                f,
                "'{}' unknown units - use 'h', 'm', 's', 'ms', 'us' or 'ns'",
                s
            ),
            ParseDurationError::Overflow(s) => write!(f, "'{}' is too large", s),
        }
    }
}

impl Error for ParseDurationError {}

/// Parses durations such as `500ms`, `1.5s` or `1m30s`.  A bare number is
/// taken as milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration, ParseDurationError> {
    if s.is_empty() {
        return Err(ParseDurationError::Empty);
    }
    if s.bytes().all(|c| c.is_ascii_digit()) {
        let millis = s
            .parse::<u64>()
            .map_err(|_| ParseDurationError::Overflow(s.into()))?;
        return Ok(Duration::from_millis(millis));
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let split = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let split = tail.find(is_number).unwrap_or(tail.len());
        let (units, tail) = tail.split_at(split);
        rest = tail;

        let unit_nanos = match units {
            "ns" => 1,
            "us" | "µs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => NANOS_PER_MIN,
            "h" => NANOS_PER_HOUR,
            _ => return Err(ParseDurationError::Units(s.into())),
        };

        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (number, ""),
        };
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(ParseDurationError::NoDigits(s.into()));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| ParseDurationError::Overflow(s.into()))?
        };
        // Digits beyond nanosecond resolution carry no information.
        let fraction = &fraction[..fraction.len().min(18)];
        let fraction_nanos = if fraction.is_empty() {
            0
        } else {
            let value: u128 = fraction
                .parse()
                .map_err(|_| ParseDurationError::Overflow(s.into()))?;
            value * unit_nanos / 10u128.pow(fraction.len() as u32)
        };

        total = whole
            .checked_mul(unit_nanos)
            .and_then(|nanos| nanos.checked_add(fraction_nanos))
            .and_then(|nanos| nanos.checked_add(total))
            .ok_or_else(|| ParseDurationError::Overflow(s.into()))?;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| ParseDurationError::Overflow(s.into()))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// Renders a duration the way it is echoed back to the user, e.g. `500ms`,
/// `1.5s` or `1m30s`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos == 0 {
        return "0s".to_owned();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{}ns", nanos);
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}µs", decimal(nanos, NANOS_PER_MICRO, 3));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos, NANOS_PER_MILLI, 6));
    }
    if nanos < NANOS_PER_MIN {
        return format!("{}s", decimal(nanos, NANOS_PER_SEC, 9));
    }

    let seconds = decimal(nanos % NANOS_PER_MIN, NANOS_PER_SEC, 9);
    let minutes = (nanos / NANOS_PER_MIN) % 60;
    let hours = nanos / NANOS_PER_HOUR;
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else {
        format!("{}m{}s", minutes, seconds)
    }
}

fn decimal(value: u128, unit: u128, digits: usize) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }

    let fraction = format!("{:0width$}", fraction, width = digits);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[cfg(test)]
mod tests {
    use super::{format_duration, parse_duration, ParseDurationError};
    use crate::GpioTestError;
    use std::time::Duration;

    #[test]
    fn parse() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
        assert_eq!(parse_duration("3us").unwrap(), Duration::from_micros(3));
        assert_eq!(parse_duration("3µs").unwrap(), Duration::from_micros(3));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_invalid() {
        assert_eq!(parse_duration(""), Err(ParseDurationError::Empty));
        assert_eq!(
            parse_duration("5d"),
            Err(ParseDurationError::Units("5d".to_owned()))
        );
        assert_eq!(
            parse_duration("bad"),
            Err(ParseDurationError::Units("bad".to_owned()))
        );
        assert_eq!(
            parse_duration("ms"),
            Err(ParseDurationError::NoDigits("ms".to_owned()))
        );
        assert_eq!(
            parse_duration("1.2.3s"),
            Err(ParseDurationError::NoDigits("1.2.3s".to_owned()))
        );
        assert_eq!(
            parse_duration("10s5"),
            Err(ParseDurationError::Units("10s5".to_owned()))
        );
    }

    #[test]
    fn format() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(20)), "20ns");
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_millis(10)), "10ms");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(GpioTestError::MissingPin.exit_code(), 1);
        assert_eq!(GpioTestError::Privilege.exit_code(), 1);
        assert_eq!(GpioTestError::Open("no /dev/gpiomem".to_owned()).exit_code(), 2);
    }
}
