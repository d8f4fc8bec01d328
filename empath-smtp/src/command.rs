use core::fmt::{self, Display, Formatter};

use ahash::AHashMap;
use empath_common::address::{Address, AddressList};
use mailparse::MailAddr;

#[derive(PartialEq, PartialOrd, Eq, Hash, Debug)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

/// ESMTP parameters trailing a `MAIL FROM` argument (RFC 1870's `SIZE`, RFC 6152's `BODY`,
/// RFC 4954's `AUTH`, and any others a filter chooses to look at).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailParameters(AHashMap<String, String>);

impl MailParameters {
    /// Parses `SIZE=<n> BODY=<type> ...` off the tail of a `MAIL FROM` command.
    ///
    /// Rejects a duplicated `SIZE=` (the only parameter SPEC_FULL calls out as
    /// duplicate-sensitive); a malformed or zero `SIZE=` is dropped rather than rejected,
    /// matching RFC 1870's "value zero indicates no fixed maximum" leniency.
    fn parse(rest: &str) -> Result<Self, String> {
        let mut params = AHashMap::default();
        let mut seen_size = false;

        for param in rest.split_whitespace() {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let key_upper = key.to_ascii_uppercase();

            if key_upper == "SIZE" {
                if seen_size {
                    return Err("Duplicate SIZE parameter not allowed".to_string());
                }
                seen_size = true;

                match value.parse::<usize>() {
                    Ok(0) | Err(_) => continue,
                    Ok(_) => {}
                }
            }

            params.insert(key_upper, value.to_string());
        }

        Ok(Self(params))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The declared message size from `SIZE=`, if present and non-zero.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE").and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Consumes this parameter set, yielding the raw key/value map for storage on the
    /// envelope (logging, `Received:` trace header).
    #[must_use]
    pub fn into_map(self) -> AHashMap<String, String> {
        self.0
    }
}

#[derive(Eq, PartialEq, Debug)]
pub enum Command {
    Helo(HeloVariant),
    Help,
    /// `MAIL FROM:<addr> [params]`. `None` sender is the null reverse-path `<>`.
    MailFrom(Option<Address>, MailParameters),
    RcptTo(AddressList),
    Rset,
    /// `AUTH <mechanism> [initial-response]` (RFC 4954). The initial response, if present,
    /// is still Base64-encoded; the SASL sub-state machine decodes it.
    Auth(String, Option<String>),
    Data,
    Quit,
    StartTLS,
    /// `NOOP` (RFC 5321 §4.1.1.9). Legal in every phase; never resets or advances progress.
    Noop,
    Invalid(String),
}

impl Command {
    #[must_use]
    pub fn inner(&self) -> String {
        match self {
            Self::MailFrom(from, _) => from.as_ref().map_or_else(String::new, |f| match &**f {
                MailAddr::Group(_) => String::new(),
                MailAddr::Single(s) => s.to_string(),
            }),
            Self::RcptTo(to) => to.to_string(),
            Self::Invalid(command) => command.clone(),
            Self::Helo(HeloVariant::Ehlo(id) | HeloVariant::Helo(id)) => id.clone(),
            _ => String::new(),
        }
    }

    /// Extract the SIZE parameter from a MAIL FROM command, if present.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::MailFrom(_, params) => params.size(),
            _ => None,
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(v) => fmt.write_fmt(format_args!("{} {}", v, self.inner())),
            Self::MailFrom(s, params) => {
                let addr = s.as_ref().map_or_else(String::new, |f| match &**f {
                    MailAddr::Group(_) => String::new(),
                    MailAddr::Single(s) => s.to_string(),
                });
                if let Some(size_val) = params.size() {
                    fmt.write_fmt(format_args!("MAIL FROM:{addr} SIZE={size_val}"))
                } else {
                    fmt.write_fmt(format_args!("MAIL FROM:{addr}"))
                }
            }
            Self::RcptTo(rcpt) => fmt.write_fmt(format_args!("RCPT TO:{rcpt}")),
            Self::Data => fmt.write_str("DATA"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::StartTLS => fmt.write_str("STARTTLS"),
            Self::Invalid(s) => fmt.write_str(s),
            Self::Help => fmt.write_str("HELP"),
            Self::Rset => fmt.write_str("Rset"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Auth(mechanism, _) => fmt.write_fmt(format_args!("AUTH {mechanism}")),
        }
    }
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let comm = command.to_ascii_uppercase();
        let comm = comm.trim();

        if comm.starts_with("MAIL FROM:") {
            if comm.len() < 11 {
                return Err(Self::Invalid(command.to_owned()));
            }

            // Format: MAIL FROM:<addr> [SIZE=<size>] [other ESMTP params...]
            let rest = command[10..].trim();
            let mut parts = rest.splitn(2, char::is_whitespace);
            let addr = parts.next().unwrap_or_default();

            let params = match parts.next() {
                Some(tail) => {
                    MailParameters::parse(tail).map_err(|e| Self::Invalid(e.to_string()))?
                }
                None => MailParameters::default(),
            };

            // Handle NULL sender explicitly, as mailparse doesn't tend to like this
            if addr == "<>" {
                return Ok(Self::MailFrom(None, params));
            }

            mailparse::addrparse(addr).map_or_else(
                |err| Err(Self::Invalid(err.to_string())),
                |from| {
                    Ok(Self::MailFrom(
                        if from.is_empty() {
                            None
                        } else {
                            Some(from[0].clone().into())
                        },
                        params,
                    ))
                },
            )
        } else if comm.starts_with("RCPT TO:") {
            if comm.len() < 9 {
                return Err(Self::Invalid(command.to_owned()));
            }

            mailparse::addrparse(command[8..].trim()).map_or_else(
                |e| Err(Self::Invalid(e.to_string())),
                |to| Ok(Self::RcptTo(to.into())),
            )
        } else if comm.starts_with("EHLO") || comm.starts_with("HELO") {
            match command.split_once(' ') {
                None => Err(Self::Invalid(format!("Expected hostname in {comm}"))),
                Some((_, host)) if comm.starts_with('H') => {
                    Ok(Self::Helo(HeloVariant::Helo(host.trim().to_string())))
                }
                Some((_, host)) => Ok(Self::Helo(HeloVariant::Ehlo(host.trim().to_string()))),
            }
        } else if comm.starts_with("AUTH") {
            match command.split_once(' ') {
                None => Err(Self::Invalid(format!("Expected mechanism in {comm}"))),
                Some((_, rest)) => {
                    let mut parts = rest.trim().splitn(2, char::is_whitespace);
                    let mechanism = parts.next().unwrap_or_default().to_ascii_uppercase();
                    let initial_response = parts.next().map(str::to_string);
                    Ok(Self::Auth(mechanism, initial_response))
                }
            }
        } else {
            match comm {
                "DATA" => Ok(Self::Data),
                "QUIT" => Ok(Self::Quit),
                "STARTTLS" => Ok(Self::StartTLS),
                "HELP" => Ok(Self::Help),
                "RSET" => Ok(Self::Rset),
                "NOOP" => Ok(Self::Noop),
                _ => Err(Self::Invalid(command.to_owned())),
            }
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or_else(
            |_| Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

impl TryFrom<String> for Command {
    type Error = Self;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}
