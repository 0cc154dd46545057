//! Memcache ASCII response parsing (client side).
//!
//! Response types:
//! - `VALUE <key> <flags> <bytes> [<cas>]\r\n<data>\r\n... END\r\n` - retrieval response
//! - `CONFIG <type> <flags> <bytes>\r\n<data>\r\nEND\r\n` - config get response
//! - `STAT <name> <value>\r\n` - one stats line (the block ends with `END`)
//! - `STORED`, `NOT_STORED`, `EXISTS`, `NOT_FOUND`, `DELETED`, `TOUCHED`, `OK`
//! - `<number>\r\n` - INCR/DECR result
//! - `VERSION <version>\r\n`
//! - `ERROR\r\n`, `CLIENT_ERROR <msg>\r\n`, `SERVER_ERROR <msg>\r\n`

use crate::error::ParseError;

/// A single value from a retrieval response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub key: Vec<u8>,
    pub flags: u32,
    pub data: Vec<u8>,
    /// CAS unique token, present when the response is from `gets`, `gat` or `getl`.
    pub cas: Option<u64>,
}

/// A parsed Memcache response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Values from a retrieval command; empty for a bare `END`.
    Values(Vec<Value>),
    /// Configuration blob from `config get`.
    Config {
        config_type: Vec<u8>,
        flags: u32,
        data: Vec<u8>,
    },
    /// One `STAT <name> <value>` line.
    Stat { name: Vec<u8>, value: Vec<u8> },
    /// STORED response from a storage command
    Stored,
    /// NOT_STORED response from a storage command
    NotStored,
    /// DELETED response from DELETE
    Deleted,
    /// NOT_FOUND response
    NotFound,
    /// EXISTS response from CAS
    Exists,
    /// TOUCHED response from TOUCH
    Touched,
    /// OK response (flush_all, refresh_certs)
    Ok,
    /// Numeric response from INCR/DECR (the new value after the operation).
    Numeric(u64),
    /// VERSION response
    Version(Vec<u8>),
    /// Generic error
    Error,
    /// Client error with message
    ClientError(Vec<u8>),
    /// Server error with message
    ServerError(Vec<u8>),
}

impl Response {
    /// Returns true if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Response::Error | Response::ClientError(_) | Response::ServerError(_)
        )
    }

    /// Returns true if this represents a cache miss.
    #[inline]
    pub fn is_miss(&self) -> bool {
        match self {
            Response::Values(values) => values.is_empty(),
            Response::NotFound => true,
            _ => false,
        }
    }

    /// Parse a response from a byte buffer.
    ///
    /// Returns the parsed response and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        let line_end = find_crlf(data).ok_or(ParseError::Incomplete)?;
        let line = &data[..line_end];
        let consumed = line_end + 2;

        let simple = match line {
            b"STORED" => Some(Response::Stored),
            b"NOT_STORED" => Some(Response::NotStored),
            b"DELETED" => Some(Response::Deleted),
            b"NOT_FOUND" => Some(Response::NotFound),
            b"EXISTS" => Some(Response::Exists),
            b"TOUCHED" => Some(Response::Touched),
            b"END" => Some(Response::Values(vec![])),
            b"OK" => Some(Response::Ok),
            b"ERROR" => Some(Response::Error),
            _ => None,
        };
        if let Some(response) = simple {
            return Ok((response, consumed));
        }

        if let Some(msg) = line.strip_prefix(b"CLIENT_ERROR ") {
            return Ok((Response::ClientError(msg.to_vec()), consumed));
        }
        if let Some(msg) = line.strip_prefix(b"SERVER_ERROR ") {
            return Ok((Response::ServerError(msg.to_vec()), consumed));
        }
        if let Some(version) = line.strip_prefix(b"VERSION ") {
            return Ok((Response::Version(version.to_vec()), consumed));
        }
        if let Some(stat) = line.strip_prefix(b"STAT ") {
            let (name, value) = match memchr::memchr(b' ', stat) {
                Some(pos) => (&stat[..pos], &stat[pos + 1..]),
                None => (stat, &b""[..]),
            };
            return Ok((
                Response::Stat {
                    name: name.to_vec(),
                    value: value.to_vec(),
                },
                consumed,
            ));
        }
        if line.starts_with(b"VALUE ") {
            return parse_value_response(data);
        }
        if line.starts_with(b"CONFIG ") {
            return parse_config_response(data);
        }

        // INCR/DECR returns `<number>\r\n`
        if !line.is_empty() && line.iter().all(|b| b.is_ascii_digit()) {
            let value = parse_u64(line)?;
            return Ok((Response::Numeric(value), consumed));
        }

        Err(ParseError::Protocol("unknown response"))
    }
}

/// Find \r\n in data, return position of \r
fn find_crlf(data: &[u8]) -> Option<usize> {
    memchr::memchr(b'\r', data).and_then(|pos| {
        if pos + 1 < data.len() && data[pos + 1] == b'\n' {
            Some(pos)
        } else {
            None
        }
    })
}

/// Parse a VALUE response (potentially with multiple values).
fn parse_value_response(data: &[u8]) -> Result<(Response, usize), ParseError> {
    let mut values = Vec::new();
    let mut pos = 0;

    loop {
        let remaining = &data[pos..];
        let line_end = find_crlf(remaining).ok_or(ParseError::Incomplete)?;
        let line = &remaining[..line_end];

        if line == b"END" {
            pos += line_end + 2;
            break;
        }

        // VALUE <key> <flags> <bytes> [<cas unique>]
        let fields = line
            .strip_prefix(b"VALUE ")
            .ok_or(ParseError::Protocol("expected VALUE or END"))?;
        let parts: Vec<&[u8]> = fields.split(|&b| b == b' ').collect();
        if parts.len() < 3 {
            return Err(ParseError::Protocol("invalid VALUE line"));
        }

        let key = parts[0].to_vec();
        let flags = parse_u32(parts[1])?;
        let bytes = parse_usize(parts[2])?;
        let cas = match parts.get(3) {
            Some(raw) => Some(parse_u64(raw)?),
            None => None,
        };

        pos += line_end + 2;
        let value_data = read_block(data, pos, bytes)?;
        pos += bytes + 2;

        values.push(Value {
            key,
            flags,
            data: value_data,
            cas,
        });
    }

    Ok((Response::Values(values), pos))
}

/// Parse `CONFIG <type> <flags> <bytes>\r\n<data>\r\nEND\r\n`.
fn parse_config_response(data: &[u8]) -> Result<(Response, usize), ParseError> {
    let line_end = find_crlf(data).ok_or(ParseError::Incomplete)?;
    let parts: Vec<&[u8]> = data[7..line_end].split(|&b| b == b' ').collect();
    if parts.len() < 3 {
        return Err(ParseError::Protocol("invalid CONFIG line"));
    }
    let config_type = parts[0].to_vec();
    let flags = parse_u32(parts[1])?;
    let bytes = parse_usize(parts[2])?;

    let mut pos = line_end + 2;
    let config = read_block(data, pos, bytes)?;
    pos += bytes + 2;

    let tail = &data[pos..];
    let end = find_crlf(tail).ok_or(ParseError::Incomplete)?;
    if &tail[..end] != b"END" {
        return Err(ParseError::Protocol("expected END after CONFIG"));
    }

    Ok((
        Response::Config {
            config_type,
            flags,
            data: config,
        },
        pos + end + 2,
    ))
}

/// Read `len` bytes at `pos` followed by CRLF.
fn read_block(data: &[u8], pos: usize, len: usize) -> Result<Vec<u8>, ParseError> {
    let data_end = pos + len;
    if data.len() < data_end + 2 {
        return Err(ParseError::Incomplete);
    }
    if data[data_end] != b'\r' || data[data_end + 1] != b'\n' {
        return Err(ParseError::Protocol("missing data terminator"));
    }
    Ok(data[pos..data_end].to_vec())
}

/// Parse a u32 from ASCII decimal.
fn parse_u32(data: &[u8]) -> Result<u32, ParseError> {
    std::str::from_utf8(data)
        .map_err(|_| ParseError::InvalidNumber)?
        .parse()
        .map_err(|_| ParseError::InvalidNumber)
}

/// Parse a u64 from ASCII decimal.
fn parse_u64(data: &[u8]) -> Result<u64, ParseError> {
    std::str::from_utf8(data)
        .map_err(|_| ParseError::InvalidNumber)?
        .parse()
        .map_err(|_| ParseError::InvalidNumber)
}

/// Maximum value data size (1MB, the default memcached item size limit).
const MAX_VALUE_DATA_LEN: usize = 1024 * 1024;

/// Parse a usize from ASCII decimal, with a maximum limit.
fn parse_usize(data: &[u8]) -> Result<usize, ParseError> {
    let value: usize = std::str::from_utf8(data)
        .map_err(|_| ParseError::InvalidNumber)?
        .parse()
        .map_err(|_| ParseError::InvalidNumber)?;

    if value > MAX_VALUE_DATA_LEN {
        return Err(ParseError::Protocol("value data too large"));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_lines() {
        let cases: &[(&[u8], Response)] = &[
            (b"STORED\r\n", Response::Stored),
            (b"NOT_STORED\r\n", Response::NotStored),
            (b"DELETED\r\n", Response::Deleted),
            (b"NOT_FOUND\r\n", Response::NotFound),
            (b"EXISTS\r\n", Response::Exists),
            (b"TOUCHED\r\n", Response::Touched),
            (b"OK\r\n", Response::Ok),
            (b"ERROR\r\n", Response::Error),
        ];
        for (input, expected) in cases {
            let (resp, consumed) = Response::parse(input).unwrap();
            assert_eq!(&resp, expected);
            assert_eq!(consumed, input.len());
        }
    }

    #[test]
    fn test_parse_end_is_miss() {
        let (resp, consumed) = Response::parse(b"END\r\n").unwrap();
        assert!(resp.is_miss());
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_values_with_and_without_cas() {
        let data = b"VALUE a 1 3\r\none\r\nVALUE b 2 3 77\r\ntwo\r\nEND\r\n";
        let (resp, consumed) = Response::parse(data).unwrap();
        assert_eq!(consumed, data.len());

        let Response::Values(values) = resp else {
            panic!("expected values");
        };
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].key, b"a");
        assert_eq!(values[0].flags, 1);
        assert_eq!(values[0].data, b"one");
        assert_eq!(values[0].cas, None);
        assert_eq!(values[1].cas, Some(77));
    }

    #[test]
    fn test_parse_values_incomplete() {
        assert_eq!(
            Response::parse(b"VALUE a 0 5\r\nhel"),
            Err(ParseError::Incomplete)
        );
        assert_eq!(
            Response::parse(b"VALUE a 0 5\r\nhello\r\n"),
            Err(ParseError::Incomplete)
        );
        assert_eq!(Response::parse(b"STOR"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_parse_value_bad_terminator() {
        assert_eq!(
            Response::parse(b"VALUE a 0 2\r\nhiXXEND\r\n"),
            Err(ParseError::Protocol("missing data terminator"))
        );
    }

    #[test]
    fn test_parse_config() {
        let data = b"CONFIG cluster 0 10\r\n1\nhost|1|2\r\nEND\r\n";
        let (resp, consumed) = Response::parse(data).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(
            resp,
            Response::Config {
                config_type: b"cluster".to_vec(),
                flags: 0,
                data: b"1\nhost|1|2".to_vec(),
            }
        );
    }

    #[test]
    fn test_parse_stat_line() {
        let (resp, consumed) = Response::parse(b"STAT pid 1234\r\nSTAT").unwrap();
        assert_eq!(consumed, 15);
        assert_eq!(
            resp,
            Response::Stat {
                name: b"pid".to_vec(),
                value: b"1234".to_vec()
            }
        );
    }

    #[test]
    fn test_parse_numeric_and_version() {
        assert_eq!(
            Response::parse(b"42\r\n").unwrap(),
            (Response::Numeric(42), 4)
        );
        assert_eq!(
            Response::parse(b"VERSION 1.6.21\r\n").unwrap().0,
            Response::Version(b"1.6.21".to_vec())
        );
    }

    #[test]
    fn test_parse_errors() {
        let (resp, _) = Response::parse(b"CLIENT_ERROR bad data chunk\r\n").unwrap();
        assert_eq!(resp, Response::ClientError(b"bad data chunk".to_vec()));
        assert!(resp.is_error());

        let (resp, _) = Response::parse(b"SERVER_ERROR out of memory\r\n").unwrap();
        assert!(resp.is_error());

        assert_eq!(
            Response::parse(b"WHAT\r\n"),
            Err(ParseError::Protocol("unknown response"))
        );
    }

    #[test]
    fn test_parse_value_too_large() {
        assert_eq!(
            Response::parse(b"VALUE a 0 99999999\r\n"),
            Err(ParseError::Protocol("value data too large"))
        );
    }
}
