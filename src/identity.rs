//! Expected-name check against the certificate's identities.

use crate::report::Severity;

/// Outcome of comparing the expected name with the candidate names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameCheck {
    /// No expected name configured
    Skipped,
    Matched {
        host: String,
        expected: String,
    },
    Mismatch {
        host: String,
        expected: String,
        candidates: Vec<String>,
    },
}

impl NameCheck {
    /// Passes when any candidate equals `expected`, ignoring ASCII case.
    pub fn validate(expected: &str, candidates: &[String], host: &str) -> Self {
        if expected.is_empty() {
            return NameCheck::Skipped;
        }
        if candidates
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(expected))
        {
            NameCheck::Matched {
                host: host.to_string(),
                expected: expected.to_string(),
            }
        } else {
            NameCheck::Mismatch {
                host: host.to_string(),
                expected: expected.to_string(),
                candidates: candidates.to_vec(),
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            NameCheck::Skipped | NameCheck::Matched { .. } => Severity::Ok,
            NameCheck::Mismatch { .. } => Severity::Critical,
        }
    }

    pub fn fragment(&self) -> Option<String> {
        match self {
            NameCheck::Skipped => None,
            NameCheck::Matched { host, expected } => {
                Some(format!(" - CN OK in Host {}({})", host, expected))
            }
            NameCheck::Mismatch {
                host,
                expected,
                candidates,
            } => {
                let got = if candidates.is_empty() {
                    "no names".to_string()
                } else {
                    candidates.join(", ")
                };
                Some(format!(
                    " - CN mismatch, expected {}, got {} for Host {}",
                    expected, got, host
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_match_on_common_name() {
        let check = NameCheck::validate("example.com", &names(&["example.com"]), "example.com");
        assert_eq!(check.severity(), Severity::Ok);
        assert_eq!(
            check.fragment().unwrap(),
            " - CN OK in Host example.com(example.com)"
        );
    }

    #[test]
    fn test_match_later_in_candidates() {
        let candidates = names(&["other.com", "example.com"]);
        let check = NameCheck::validate("example.com", &candidates, "example.com");
        assert!(matches!(check, NameCheck::Matched { .. }));

        let mut reversed = candidates.clone();
        reversed.reverse();
        assert_eq!(check, NameCheck::validate("example.com", &reversed, "example.com"));
    }

    #[test]
    fn test_match_ignores_case() {
        let check = NameCheck::validate("WWW.Example.COM", &names(&["www.example.com"]), "h");
        assert_eq!(check.severity(), Severity::Ok);
        assert_eq!(check.fragment().unwrap(), " - CN OK in Host h(WWW.Example.COM)");
    }

    #[test]
    fn test_mismatch() {
        let check = NameCheck::validate(
            "example.com",
            &names(&["other.com", "www.other.com"]),
            "10.0.0.1",
        );
        assert_eq!(check.severity(), Severity::Critical);
        assert_eq!(
            check.fragment().unwrap(),
            " - CN mismatch, expected example.com, got other.com, www.other.com for Host 10.0.0.1"
        );
    }

    #[test]
    fn test_mismatch_without_candidates() {
        let check = NameCheck::validate("example.com", &[], "example.com");
        assert_eq!(check.severity(), Severity::Critical);
        assert!(check.fragment().unwrap().contains("got no names"));
    }

    #[test]
    fn test_empty_expected_skips() {
        let check = NameCheck::validate("", &names(&["other.com"]), "example.com");
        assert_eq!(check, NameCheck::Skipped);
        assert_eq!(check.severity(), Severity::Ok);
        assert_eq!(check.fragment(), None);
    }
}
