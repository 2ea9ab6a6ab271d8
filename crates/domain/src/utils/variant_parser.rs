//! Extracts the requested server variant from an event description.
//!
//! Calendar users request a specific server size by adding a line such as
//! `server_type: cx31` anywhere in the event's free-text description.

use crate::constants::VARIANT_DESCRIPTION_KEY;

/// Return the variant named by the first `server_type:` line.
///
/// The key is matched case-insensitively. Only the first matching line is
/// considered; if its value is empty the result is empty as well, even when a
/// later line would have matched. Anything after the first whitespace-delimited
/// token is ignored.
pub fn parse_variant(description: &str) -> String {
    for line in description.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case(VARIANT_DESCRIPTION_KEY) {
            continue;
        }

        return value.split_whitespace().next().map(str::to_string).unwrap_or_default();
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_value_after_key() {
        assert_eq!(parse_variant("server_type: cx31"), "cx31");
        assert_eq!(parse_variant("Weekly build\nserver_type:ccx23\nbring coffee"), "ccx23");
    }

    #[test]
    fn key_is_case_insensitive() {
        assert_eq!(parse_variant("Server_Type: cpx41"), "cpx41");
        assert_eq!(parse_variant("  SERVER_TYPE :cx21 "), "cx21");
    }

    #[test]
    fn first_matching_line_wins() {
        assert_eq!(parse_variant("server_type: cx21\nserver_type: cx31"), "cx21");
    }

    #[test]
    fn malformed_first_match_yields_empty() {
        assert_eq!(parse_variant("server_type:\nserver_type: cx31"), "");
    }

    #[test]
    fn trailing_words_are_ignored() {
        assert_eq!(parse_variant("server_type: cx41 please"), "cx41");
    }

    #[test]
    fn absent_key_yields_empty() {
        assert_eq!(parse_variant(""), "");
        assert_eq!(parse_variant("type: cx31\nserver: big"), "");
    }
}
