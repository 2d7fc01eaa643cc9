//! Reply decoding for the AT protocol.
//!
//! Replies from the Audio Gateway are either result codes that close the
//! command in flight or information lines with a fixed-format argument:
//! - Result codes: `OK`, `ERROR`, `+CME ERROR: <n>`, `BUSY`, ...
//! - Indicator events: `+CIEV: <index>,<value>`
//! - Call information: `+CLIP`, `+CCWA`, `+CLCC`
//! - Capability lists: `+CIND: (...)`, `+CHLD: (...)`, `+BIND: (...)`

use crate::codec::{AtFrame, ReplyPrefix};
use crate::constants::*;
use crate::error::{AtError, AtResult};

/// Result code closing the command in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Error,
    CmeError(u16),
    Busy,
    NoCarrier,
    NoAnswer,
    Blocklisted,
    Delayed,
}

impl ResultCode {
    /// Extract the result code from a frame, if the frame is one.
    pub fn from_frame(frame: &AtFrame) -> Option<ResultCode> {
        match frame.prefix {
            ReplyPrefix::Ok => Some(ResultCode::Ok),
            ReplyPrefix::Error => Some(ResultCode::Error),
            ReplyPrefix::CmeError => {
                // An unparseable code still closes the command.
                let code = frame.argument.trim().parse().unwrap_or(0);
                Some(ResultCode::CmeError(code))
            }
            ReplyPrefix::Busy => Some(ResultCode::Busy),
            ReplyPrefix::NoCarrier => Some(ResultCode::NoCarrier),
            ReplyPrefix::NoAnswer => Some(ResultCode::NoAnswer),
            ReplyPrefix::Blocklisted => Some(ResultCode::Blocklisted),
            ReplyPrefix::Delayed => Some(ResultCode::Delayed),
            _ => None,
        }
    }
}

/// Indicator name and range announced by `+CIND: (...)` in reply to `AT+CIND=?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSpec {
    /// Indicator name, e.g. `callsetup`.
    pub name: String,
    /// Lowest value.
    pub min: i32,
    /// Highest value.
    pub max: i32,
}

/// Calling line identity from `+CLIP` or `+CCWA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId {
    /// Phone number, may be empty if withheld.
    pub number: String,
    /// Type of address (129 national, 145 international).
    pub number_type: u16,
}

/// A single `+CLCC` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClccEntry {
    /// Call index, 1-based and stable for the lifetime of the call.
    pub index: u16,
    /// Whether the call was initiated by the AG user (0 in the direction field).
    pub outgoing: bool,
    /// Call status code (0 active .. 6 response and hold).
    pub status: u8,
    /// Bearer mode (0 voice).
    pub mode: u8,
    /// Whether the call is part of a multiparty call.
    pub multiparty: bool,
    /// Phone number, if given.
    pub number: Option<String>,
    /// Type of address, if given.
    pub number_type: Option<u16>,
}

/// Network operator from `+COPS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    /// Selection mode.
    pub mode: u8,
    /// Name format (0 long alphanumeric).
    pub format: Option<u8>,
    /// Operator name.
    pub name: String,
}

/// Subscriber number from `+CNUM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberInfo {
    /// Phone number.
    pub number: String,
    /// Type of address.
    pub number_type: u16,
    /// Service (4 voice, 5 fax).
    pub service: Option<u8>,
}

/// Parse a single integer argument (`+BSIR: 1`, `+VGS: 9`, `+BCS: 2`, ...).
pub fn parse_single_int(prefix: ReplyPrefix, argument: &str) -> AtResult<i32> {
    argument
        .trim()
        .parse()
        .map_err(|_| AtError::malformed(prefix.as_str(), format!("expected integer, got '{}'", argument)))
}

/// Parse `+CIEV: <index>,<value>`.
pub fn parse_ciev(argument: &str) -> AtResult<(u8, i32)> {
    let (index, value) = argument
        .split_once(',')
        .ok_or_else(|| AtError::malformed("+CIEV:", format!("missing value in '{}'", argument)))?;
    let index = index
        .trim()
        .parse()
        .map_err(|_| AtError::malformed("+CIEV:", format!("invalid index '{}'", index)))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| AtError::malformed("+CIEV:", format!("invalid value '{}'", value)))?;
    Ok((index, value))
}

/// Parse `+CLIP: "<number>",<type>[,...]` or the same shape for `+CCWA`.
pub fn parse_caller_id(prefix: ReplyPrefix, argument: &str) -> AtResult<CallerId> {
    let fields = split_fields(argument);
    let number = fields
        .first()
        .map(|f| unquote(f))
        .ok_or_else(|| AtError::malformed(prefix.as_str(), "missing number"))?;
    let number_type = match fields.get(1) {
        Some(field) if !field.is_empty() => field
            .parse()
            .map_err(|_| AtError::malformed(prefix.as_str(), format!("invalid type '{}'", field)))?,
        _ => 129,
    };
    Ok(CallerId { number, number_type })
}

/// Parse `+CLCC: <idx>,<dir>,<status>,<mode>,<mpty>[,"<number>",<type>]`.
pub fn parse_clcc(argument: &str) -> AtResult<ClccEntry> {
    let fields = split_fields(argument);
    if fields.len() < 5 {
        return Err(AtError::malformed(
            "+CLCC:",
            format!("expected at least 5 fields, got {}", fields.len()),
        ));
    }

    let int = |i: usize| -> AtResult<u16> {
        fields[i]
            .parse()
            .map_err(|_| AtError::malformed("+CLCC:", format!("invalid field {}: '{}'", i, fields[i])))
    };

    let index = int(0)?;
    let direction = int(1)?;
    let status = int(2)?;
    let mode = u8::try_from(int(3)?).map_err(|_| AtError::malformed("+CLCC:", format!("invalid mode '{}'", fields[3])))?;
    let multiparty = int(4)?;
    let status = u8::try_from(status)
        .ok()
        .filter(|s| *s <= 6)
        .ok_or_else(|| AtError::malformed("+CLCC:", format!("unknown status {}", status)))?;

    let number = fields.get(5).map(|f| unquote(f)).filter(|n| !n.is_empty());
    let number_type = fields.get(6).and_then(|f| f.parse().ok());

    Ok(ClccEntry {
        index,
        outgoing: direction == 0,
        status,
        mode,
        multiparty: multiparty == 1,
        number,
        number_type,
    })
}

/// Parse `+COPS: <mode>[,<format>,"<operator>"]`.
pub fn parse_cops(argument: &str) -> AtResult<OperatorInfo> {
    let fields = split_fields(argument);
    let mode = fields
        .first()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| AtError::malformed("+COPS:", format!("invalid mode in '{}'", argument)))?;
    let format = fields.get(1).and_then(|f| f.parse().ok());
    let name = fields.get(2).map(|f| unquote(f)).unwrap_or_default();
    Ok(OperatorInfo { mode, format, name })
}

/// Parse `+CNUM: [<alpha>],"<number>",<type>[,<speed>,<service>]`.
pub fn parse_cnum(argument: &str) -> AtResult<SubscriberInfo> {
    let fields = split_fields(argument);
    let number = fields
        .get(1)
        .map(|f| unquote(f))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AtError::malformed("+CNUM:", format!("missing number in '{}'", argument)))?;
    let number_type = fields.get(2).and_then(|f| f.parse().ok()).unwrap_or(129);
    let service = fields.get(4).and_then(|f| f.parse().ok());
    Ok(SubscriberInfo {
        number,
        number_type,
        service,
    })
}

/// Parse the `AT+CIND=?` reply: `("service",(0,1)),("callsetup",(0-3)),...`.
///
/// Entries are returned in announce order; the position of an entry is the
/// ordinal later used by `+CIEV`.
pub fn parse_cind_test(argument: &str) -> AtResult<Vec<IndicatorSpec>> {
    let mut specs = Vec::new();
    let mut rest = argument.trim();

    while let Some(open) = rest.find('"') {
        let after_name = &rest[open + 1..];
        let close = after_name
            .find('"')
            .ok_or_else(|| AtError::malformed("+CIND:", "unterminated indicator name"))?;
        let name = after_name[..close].to_string();

        let after = &after_name[close + 1..];
        let range_open = after
            .find('(')
            .ok_or_else(|| AtError::malformed("+CIND:", format!("missing range for '{}'", name)))?;
        let range_close = after[range_open..]
            .find(')')
            .map(|i| i + range_open)
            .ok_or_else(|| AtError::malformed("+CIND:", format!("unterminated range for '{}'", name)))?;
        let (min, max) = parse_range(&after[range_open + 1..range_close])
            .ok_or_else(|| AtError::malformed("+CIND:", format!("invalid range for '{}'", name)))?;

        specs.push(IndicatorSpec { name, min, max });
        rest = &after[range_close + 1..];
    }

    if specs.is_empty() {
        return Err(AtError::malformed("+CIND:", "no indicators announced"));
    }
    Ok(specs)
}

/// Parse a comma separated list of integers, e.g. the `AT+CIND?` reply.
pub fn parse_int_list(prefix: ReplyPrefix, argument: &str) -> AtResult<Vec<i32>> {
    argument
        .trim_matches(|c: char| c == '(' || c == ')')
        .split(',')
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| AtError::malformed(prefix.as_str(), format!("invalid value '{}'", v)))
        })
        .collect()
}

/// Parse the `AT+CHLD=?` reply `(0,1,1x,2,2x,3,4)` into a feature mask.
///
/// Unknown entries are ignored.
pub fn parse_chld_test(argument: &str) -> u32 {
    argument
        .trim_matches(|c: char| c == '(' || c == ')')
        .split(',')
        .map(|v| match v.trim() {
            "0" => CHLD_RELEASE_HELD,
            "1" => CHLD_RELEASE_ACTIVE_ACCEPT_OTHER,
            "1x" => CHLD_RELEASE_SPECIFIED,
            "2" => CHLD_HOLD_ACTIVE_ACCEPT_OTHER,
            "2x" => CHLD_PRIVATE_CONSULTATION,
            "3" => CHLD_MERGE,
            "4" => CHLD_MERGE_DETACH,
            other => {
                log::debug!("ignoring unknown +CHLD capability '{}'", other);
                0
            }
        })
        .fold(0, |mask, bit| mask | bit)
}

/// Parse the `AT+BIND=?` reply `(1,2)` into assigned numbers.
pub fn parse_bind_list(argument: &str) -> AtResult<Vec<u16>> {
    parse_int_list(ReplyPrefix::Bind, argument)?
        .into_iter()
        .map(|v| u16::try_from(v).map_err(|_| AtError::malformed("+BIND:", format!("invalid indicator {}", v))))
        .collect()
}

/// Parse `+BIND: <anum>,<state>` from `AT+BIND?` or an unsolicited update.
pub fn parse_bind_status(argument: &str) -> AtResult<(u16, bool)> {
    let values = parse_int_list(ReplyPrefix::Bind, argument)?;
    match values.as_slice() {
        [anum, state] => {
            let anum = u16::try_from(*anum)
                .map_err(|_| AtError::malformed("+BIND:", format!("invalid indicator {}", anum)))?;
            Ok((anum, *state == 1))
        }
        _ => Err(AtError::malformed("+BIND:", format!("expected <anum>,<state>, got '{}'", argument))),
    }
}

/// Parse `0-5` or `0,1` or `0,1,2` into `(min, max)`.
fn parse_range(range: &str) -> Option<(i32, i32)> {
    let values: Vec<i32> = range
        .split(|c: char| c == ',' || c == '-')
        .map(|v| v.trim().parse().ok())
        .collect::<Option<Vec<_>>>()?;
    let min = *values.iter().min()?;
    let max = *values.iter().max()?;
    Some((min, max))
}

/// Split on commas that are not inside double quotes.
fn split_fields(argument: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in argument.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn unquote(field: &str) -> String {
    field.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(ResultCode::from_frame(&AtFrame::new(ReplyPrefix::Ok, "")), Some(ResultCode::Ok));
        assert_eq!(
            ResultCode::from_frame(&AtFrame::new(ReplyPrefix::CmeError, "30")),
            Some(ResultCode::CmeError(30))
        );
        assert_eq!(ResultCode::from_frame(&AtFrame::new(ReplyPrefix::Ring, "")), None);
    }

    #[test]
    fn test_parse_ciev() {
        assert_eq!(parse_ciev("3,1"), Ok((3, 1)));
        assert_eq!(parse_ciev(" 7 , 5 "), Ok((7, 5)));
        assert!(parse_ciev("3").is_err());
        assert!(parse_ciev("x,1").is_err());
    }

    #[test]
    fn test_parse_clip() {
        let id = parse_caller_id(ReplyPrefix::Clip, "\"+15551234\",145,,,\"Alice\"").unwrap();
        assert_eq!(id.number, "+15551234");
        assert_eq!(id.number_type, 145);

        let withheld = parse_caller_id(ReplyPrefix::Clip, "\"\",128").unwrap();
        assert_eq!(withheld.number, "");
    }

    #[test]
    fn test_parse_clcc() {
        let entry = parse_clcc("1,1,4,0,0,\"5551234\",129").unwrap();
        assert_eq!(entry.index, 1);
        assert!(!entry.outgoing);
        assert_eq!(entry.status, 4);
        assert!(!entry.multiparty);
        assert_eq!(entry.number.as_deref(), Some("5551234"));
        assert_eq!(entry.number_type, Some(129));

        let bare = parse_clcc("2,0,0,0,1").unwrap();
        assert!(bare.outgoing);
        assert!(bare.multiparty);
        assert_eq!(bare.number, None);

        assert!(parse_clcc("1,1,9,0,0").is_err());
        assert!(parse_clcc("1,1").is_err());
        // Out of range values are rejected rather than truncated.
        assert!(parse_clcc("1,1,4,256,0").is_err());
        assert!(parse_clcc("1,1,262,0,0").is_err());
    }

    #[test]
    fn test_parse_cops_and_cnum() {
        let op = parse_cops("0,0,\"Carrier, Inc\"").unwrap();
        assert_eq!(op.mode, 0);
        assert_eq!(op.format, Some(0));
        assert_eq!(op.name, "Carrier, Inc");

        let num = parse_cnum(",\"+15550000\",145,,4").unwrap();
        assert_eq!(num.number, "+15550000");
        assert_eq!(num.number_type, 145);
        assert_eq!(num.service, Some(4));
    }

    #[test]
    fn test_parse_cind_test() {
        let specs = parse_cind_test(
            "(\"service\",(0,1)),(\"call\",(0,1)),(\"callsetup\",(0-3)),(\"callheld\",(0-2)),(\"signal\",(0-5)),(\"roam\",(0,1)),(\"battchg\",(0-5))",
        )
        .unwrap();
        assert_eq!(specs.len(), 7);
        assert_eq!(specs[2], IndicatorSpec { name: "callsetup".into(), min: 0, max: 3 });
        assert_eq!(specs[6].name, "battchg");
        assert_eq!(specs[6].max, 5);
    }

    #[test]
    fn test_parse_cind_test_rejects_garbage() {
        assert!(parse_cind_test("").is_err());
        assert!(parse_cind_test("(\"service\",(x))").is_err());
    }

    #[test]
    fn test_parse_chld_test() {
        let mask = parse_chld_test("(0,1,1x,2,2x,3,4)");
        assert_eq!(mask, 0x7f);
        assert_eq!(parse_chld_test("(0,1,2)"), CHLD_RELEASE_HELD | CHLD_RELEASE_ACTIVE_ACCEPT_OTHER | CHLD_HOLD_ACTIVE_ACCEPT_OTHER);
    }

    #[test]
    fn test_parse_bind() {
        assert_eq!(parse_bind_list("(1,2)"), Ok(vec![1, 2]));
        assert_eq!(parse_bind_status("2,1"), Ok((2, true)));
        assert_eq!(parse_bind_status("1, 0"), Ok((1, false)));
        assert!(parse_bind_status("1").is_err());
        assert!(parse_bind_status("65538,1").is_err());
        assert!(parse_bind_status("-1,1").is_err());
    }

    #[test]
    fn test_parse_int_list() {
        assert_eq!(parse_int_list(ReplyPrefix::Cind, "1,0,0,0,5,0,5"), Ok(vec![1, 0, 0, 0, 5, 0, 5]));
        assert!(parse_int_list(ReplyPrefix::Cind, "1,a").is_err());
    }
}
