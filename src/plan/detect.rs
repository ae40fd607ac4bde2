use regex::Regex;
use std::sync::OnceLock;

static PLAN_REQUEST_RE: OnceLock<Regex> = OnceLock::new();

/// Whether the user's latest message is asking for a project plan.
///
/// Deliberately coarse: a case-insensitive match of the literal phrase
/// anywhere in the text, with no word-boundary requirement. A false positive
/// only costs one extra system hint on the outgoing call; the extractor is
/// the authoritative gate on what actually renders.
pub fn is_plan_request(text: &str) -> bool {
    let re = PLAN_REQUEST_RE.get_or_init(|| Regex::new(r"(?i)project plan").unwrap());
    re.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        assert!(is_plan_request("Can you draft a project plan for the launch?"));
        assert!(is_plan_request("PROJECT PLAN please"));
        assert!(is_plan_request("make me a Project Plan"));
    }

    #[test]
    fn matches_inside_longer_words() {
        // Token match, not word-boundary match.
        assert!(is_plan_request("help with project planning"));
    }

    #[test]
    fn ignores_unrelated_messages() {
        assert!(!is_plan_request("what's the weather like"));
        assert!(!is_plan_request("plan the project"));
        assert!(!is_plan_request(""));
    }
}
