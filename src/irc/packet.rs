//! IRC line parser.
//!
//! Recognizes exactly the subset of the protocol this engine needs: PING,
//! the four numeric replies used for registration/join/whois correlation,
//! and a PRIVMSG carrying a CTCP DCC SEND offer. Everything else parses to
//! [`Packet::Unknown`] by design — this is not a general IRC client.

use std::net::Ipv4Addr;

/// A parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// `PING :<token>`
    Ping { token: String },
    /// `001` — nick the server welcomed.
    Welcome { nick: String },
    /// `433` — nick the server rejected as already in use.
    NicknameInUse { nick: String },
    /// `366` — channel whose NAMES listing just ended (no leading `#`).
    EndOfNames { channel: String },
    /// `319` — WHOIS channel listing for a nick.
    WhoisChannels { nick: String, channels: Vec<String> },
    /// PRIVMSG carrying a CTCP DCC SEND offer.
    DccSend(DccOffer),
    /// Anything not matching the recognized grammar.
    Unknown,
}

/// A DCC SEND offer extracted from a PRIVMSG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccOffer {
    pub file_name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub file_length: u64,
}

const DCC_SEND_PREFIX: &str = "DCC SEND ";

/// Parse a single IRC line (CRLF/LF already stripped) into a [`Packet`].
pub fn parse(line: &str) -> Packet {
    if let Some(token) = line.strip_prefix("PING :") {
        return Packet::Ping {
            token: token.to_string(),
        };
    }

    let Some(without_colon) = line.strip_prefix(':') else {
        return Packet::Unknown;
    };

    let Some((_prefix, rest)) = without_colon.split_once(' ') else {
        return Packet::Unknown;
    };
    let Some((cmd, rest)) = rest.split_once(' ') else {
        return Packet::Unknown;
    };
    let (target, trailing) = match rest.split_once(' ') {
        Some((target, trailing)) => (target, trailing.strip_prefix(':').unwrap_or(trailing)),
        None => (rest, ""),
    };

    match cmd {
        "001" => Packet::Welcome {
            nick: target.to_string(),
        },
        "433" => Packet::NicknameInUse {
            nick: first_token(trailing).to_string(),
        },
        "366" => Packet::EndOfNames {
            channel: strip_channel_prefix(first_token(trailing)).to_string(),
        },
        "319" => parse_whois_channels(trailing),
        "PRIVMSG" => parse_privmsg(trailing),
        _ => Packet::Unknown,
    }
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or("")
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

/// Strips a leading `%#`, `@#`, or bare `#` from a channel name. The first
/// channel in a WHOIS reply also carries the IRC trailing-parameter marker
/// (e.g. `:%#HorribleSubs`), so an optional leading `:` is stripped first.
fn strip_channel_prefix(channel: &str) -> &str {
    let channel = channel.strip_prefix(':').unwrap_or(channel);
    channel
        .strip_prefix("%#")
        .or_else(|| channel.strip_prefix("@#"))
        .or_else(|| channel.strip_prefix('#'))
        .unwrap_or(channel)
}

fn parse_whois_channels(trailing: &str) -> Packet {
    let mut parts = trailing.split_whitespace();
    let Some(nick) = parts.next() else {
        return Packet::Unknown;
    };
    let channels = parts.map(strip_channel_prefix).map(str::to_string).collect();
    Packet::WhoisChannels {
        nick: nick.to_string(),
        channels,
    }
}

fn parse_privmsg(trailing: &str) -> Packet {
    let stripped = trailing.trim_start_matches('\x01');
    let Some(rest) = stripped.strip_prefix(DCC_SEND_PREFIX) else {
        return Packet::Unknown;
    };

    let (file_name, after_name) = if let Some(quoted) = rest.strip_prefix('"') {
        let Some(end) = quoted.find('"') else {
            return Packet::Unknown;
        };
        (quoted[..end].to_string(), quoted[end + 1..].trim_start())
    } else {
        let Some(sp) = rest.find(' ') else {
            return Packet::Unknown;
        };
        (rest[..sp].to_string(), rest[sp + 1..].trim_start())
    };

    let mut fields = after_name.splitn(4, ' ');
    let (Some(ip_raw), Some(port_raw), Some(len_raw)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Packet::Unknown;
    };

    // ip and port must be pure digit tokens, but the length field is the
    // last capture group and so may carry a trailing CTCP terminator or
    // other junk (e.g. "339260|") that simply isn't part of the match.
    let (Ok(ip_num), Ok(port), Ok(file_length)) = (
        ip_raw.parse::<u32>(),
        port_raw.parse::<u16>(),
        leading_digits(len_raw).parse::<u64>(),
    ) else {
        return Packet::Unknown;
    };

    Packet::DccSend(DccOffer {
        file_name,
        ip: Ipv4Addr::from(ip_num),
        port,
        file_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        ":irc.infernet.org 001 foobar :Welcome to the Rizon Internet Relay Chat Network gcrrvjzfGr",
        Packet::Welcome { nick: "foobar".to_string() }
    )]
    #[test_case(
        ":magnet.rizon.net 319 foo Ginpachi-Sensei :%#HorribleSubs %#NIBL %#news",
        Packet::WhoisChannels {
            nick: "Ginpachi-Sensei".to_string(),
            channels: vec!["HorribleSubs".to_string(), "NIBL".to_string(), "news".to_string()],
        }
    )]
    #[test_case(
        ":irc.rizon.club 366 gharibol #footest :End of /NAMES list.",
        Packet::EndOfNames { channel: "footest".to_string() }
    )]
    #[test_case(
        ":magnet.rizon.net 433 * gourangaharibol :Nickname is already in use.",
        Packet::NicknameInUse { nick: "gourangaharibol".to_string() }
    )]
    #[test_case("FOO BAR BAZ", Packet::Unknown)]
    #[test_case(
        ":solenoid.rizon.net 002 a1bcwy :Your host is solenoid.rizon.net, running version plexus-4(hybrid-8.1.20)",
        Packet::Unknown
    )]
    #[test_case(
        ":[C-W]Archive!~sakura@distro.cartoon-world.org PRIVMSG av1vfca :Hello!",
        Packet::Unknown
    )]
    fn recognizes_corpus_lines(line: &str, expected: Packet) {
        assert_eq!(parse(line), expected);
    }

    #[test]
    fn pong_reflex_token() {
        assert_eq!(
            parse("PING :foo"),
            Packet::Ping {
                token: "foo".to_string()
            }
        );
    }

    #[test]
    fn privmsg_dcc_send() {
        let res = parse(
            ":Gintoki!~Gin@oshiete.ginpachi.sensei PRIVMSG ownadi :\x01DCC SEND Gin.txt 2130706433 39095 339260|",
        );
        assert_eq!(
            res,
            Packet::DccSend(DccOffer {
                file_name: "Gin.txt".to_string(),
                ip: Ipv4Addr::new(127, 0, 0, 1),
                port: 39095,
                file_length: 339260,
            })
        );
    }

    #[test]
    fn privmsg_dcc_send_quoted_filename_with_spaces() {
        let res = parse(
            ":[C-W]Archive!~sakura@distro.cartoon-world.org PRIVMSG av1vfca :\x01DCC SEND \"Great Teacher Onizuka - 25 [x264-AC3-DVD][Sakura][C-W][B9F96CF8].mkv\" 2130706433 48467 541715509|",
        );
        assert_eq!(
            res,
            Packet::DccSend(DccOffer {
                file_name: "Great Teacher Onizuka - 25 [x264-AC3-DVD][Sakura][C-W][B9F96CF8].mkv"
                    .to_string(),
                ip: Ipv4Addr::new(127, 0, 0, 1),
                port: 48467,
                file_length: 541715509,
            })
        );
    }

    #[test]
    fn privmsg_dcc_send_broken_numbers_is_unknown() {
        let res = parse(
            ":[C-W]Archive!~sakura@distro.cartoon-world.org PRIVMSG av1vfca :\x01DCC SEND \"Great Teacher Onizuka - 25 [x264-AC3-DVD][Sakura][C-W][B9F96CF8].mkv\" 213070foo bar baz|",
        );
        assert_eq!(res, Packet::Unknown);
    }
}
