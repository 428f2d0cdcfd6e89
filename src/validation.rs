/// Line decoding and per-sensor frame validation
use log::warn;

use crate::error::FrameError;
use crate::models::{
    DecodePolicy, ParticulateReading, Reading, SensorKind, VocReading, WindReading,
};

const WIND_MIN_FIELDS: usize = 4;
const PARTICULATE_MIN_FIELDS: usize = 36;
const MAC_GROUPS: usize = 6;

/// Decode raw device bytes into text
///
/// Never fails: lossy decoding replaces invalid sequences, strict decoding
/// returns an empty line. Either way the noise is logged.
///
/// # Arguments
/// * `raw` - Bytes of one line as read from the device
/// * `policy` - Decode policy of the sensor that produced the line
pub fn decode_line(raw: &[u8], policy: DecodePolicy) -> String {
    match std::str::from_utf8(raw) {
        Ok(line) => line.to_string(),
        Err(e) => {
            let lossy = String::from_utf8_lossy(raw);
            match policy {
                DecodePolicy::Lossy => {
                    warn!("Decode noise ({}), replaced invalid bytes in: {:?}", e, lossy);
                    lossy.into_owned()
                }
                DecodePolicy::Strict => {
                    warn!("Failed to convert line to UTF-8 because {}. Line: {:?}", e, lossy);
                    String::new()
                }
            }
        }
    }
}

/// Validate a decoded line and parse it into a reading for the given sensor
///
/// # Returns
/// The structured reading, or the reason the line was rejected. A rejected
/// line never yields partially parsed data.
pub fn validate(kind: SensorKind, line: &str) -> Result<Reading, FrameError> {
    match kind {
        SensorKind::Wind => validate_wind(line).map(Reading::Wind),
        SensorKind::Voc => validate_voc(line).map(Reading::Voc),
        SensorKind::Particulate => validate_particulate(line).map(Reading::Particulate),
    }
}

/// Wind frames look like `deviceId,u,windDirection,v`
pub fn validate_wind(line: &str) -> Result<WindReading, FrameError> {
    let compact: String = line.split_whitespace().collect();
    check_leading_digit(&compact)?;

    let parts: Vec<&str> = compact.split(',').collect();
    if parts.len() < WIND_MIN_FIELDS {
        return Err(FrameError::TooFewFields {
            expected: WIND_MIN_FIELDS,
            found: parts.len(),
        });
    }

    let number = |index: usize| -> Result<f64, FrameError> {
        parts[index].parse::<f64>().map_err(|_| FrameError::BadNumber {
            index,
            value: parts[index].to_string(),
        })
    };

    Ok(WindReading {
        device_id: parts[0].to_string(),
        u: number(1)?,
        wind_direction: number(2)?,
        v: number(3)?,
    })
}

/// VOC frames are passed through; only the leading digit is checked
pub fn validate_voc(line: &str) -> Result<VocReading, FrameError> {
    let line = line.trim_end_matches(['\r', '\n']);
    check_leading_digit(line)?;

    let device_id = line.split(',').next().unwrap_or_default().to_string();
    Ok(VocReading {
        device_id,
        line: line.to_string(),
    })
}

/// Particulate minute-data frames
///
/// The device rewrites its status on the same physical line using carriage
/// returns, so only the text after the last `\r` is meaningful.
pub fn validate_particulate(line: &str) -> Result<ParticulateReading, FrameError> {
    let fragment = last_fragment(line);
    if fragment.is_empty() {
        return Err(FrameError::Empty);
    }

    let fields = split_csv(fragment);
    if fields.len() < PARTICULATE_MIN_FIELDS {
        return Err(FrameError::TooFewFields {
            expected: PARTICULATE_MIN_FIELDS,
            found: fields.len(),
        });
    }
    if !looks_like_mac(&fields[1]) {
        return Err(FrameError::BadMacAddress(fields[1].clone()));
    }

    Ok(ParticulateReading {
        mac_address: fields[1].clone(),
        line: fragment.to_string(),
        fields,
    })
}

/// Keep the text after the last carriage return, ignoring a bare trailing `\n`
pub fn last_fragment(line: &str) -> &str {
    let mut parts: Vec<&str> = line.split('\r').collect();
    if parts.len() > 1 && parts.last() == Some(&"\n") {
        parts.pop();
    }
    parts
        .last()
        .map(|part| part.trim_end_matches('\n'))
        .unwrap_or_default()
}

/// Split one CSV record, honouring double-quoted fields and `""` escapes
pub fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    if line.is_empty() {
        return fields;
    }

    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' if at_field_start => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut field));
                    at_field_start = true;
                    continue;
                }
                _ => field.push(c),
            }
        }
        at_field_start = false;
    }
    fields.push(field);

    fields
}

/// Six colon separated groups of up to two hex digits at the start of the field
///
/// Empty groups are accepted since the device drops leading zeros. Only the
/// prefix is checked: the sixth group and anything after it are not.
pub fn looks_like_mac(field: &str) -> bool {
    let mut rest = field.as_bytes();
    for _ in 1..MAC_GROUPS {
        let digits = rest
            .iter()
            .take(2)
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        match rest[digits..].split_first() {
            Some((b':', tail)) => rest = tail,
            _ => return false,
        }
    }
    true
}

fn check_leading_digit(line: &str) -> Result<(), FrameError> {
    match line.chars().next() {
        None => Err(FrameError::Empty),
        Some(c) if c.is_ascii_digit() => Ok(()),
        Some(_) => Err(FrameError::NotDataLine),
    }
}
