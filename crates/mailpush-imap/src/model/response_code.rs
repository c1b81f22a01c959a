//! Response code extraction.

use crate::parser::Response;

/// Returns the response code of the last response, e.g. `AUTHENTICATIONFAILED`.
#[must_use]
pub fn extract(responses: &[Response]) -> Option<&str> {
    let last = responses.last()?;
    if last.len() < 2 {
        return None;
    }
    last.get_list(1)?.get_str(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::responses;

    #[test]
    fn extracts_code_of_last_response() {
        let list = responses(&["* OK [ALERT] hi", "A1 NO [AUTHENTICATIONFAILED] Bad login"]);
        assert_eq!(extract(&list), Some("AUTHENTICATIONFAILED"));
    }

    #[test]
    fn missing_code() {
        assert_eq!(extract(&responses(&["A1 NO Bad login"])), None);
        assert_eq!(extract(&responses(&["A1 NO [] Bad login"])), None);
        assert_eq!(extract(&[]), None);
    }
}
