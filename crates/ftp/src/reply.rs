//! FTP reply representation and mapping of reply codes to errors.

use dumpdeploy_protocol::RemoteError;

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Text of the final line without the reply code.
    pub fn message(&self) -> &str {
        self.lines
            .last()
            .map(|line| line.get(4..).unwrap_or_default())
            .unwrap_or_default()
    }

    /// 1xx: the server will send another reply.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx: more input expected (e.g. password after USER).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Maps a negative reply to the matching error.
    pub fn into_error(self) -> RemoteError {
        classify(self.code, self.message())
    }
}

/// Maps an FTP reply code to a [`RemoteError`].
pub fn classify(code: u16, message: &str) -> RemoteError {
    let message = message.trim().to_string();
    match code {
        421 => RemoteError::Lost(format!("{code} {message}")),
        425 | 426 | 451 | 452 | 552 => RemoteError::Transfer(format!("{code} {message}")),
        430 | 530 => RemoteError::Auth(format!("{code} {message}")),
        _ => RemoteError::Rejected { code, message },
    }
}

/// True for "file unavailable" replies (missing path or no permission).
pub fn is_unavailable_code(code: u16) -> bool {
    matches!(code, 450 | 550 | 553)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_reply_codes() {
        assert!(classify(421, "Service not available").is_session_fault());
        assert!(matches!(classify(426, "aborted"), RemoteError::Transfer(_)));
        assert!(matches!(classify(552, "quota"), RemoteError::Transfer(_)));
        assert!(matches!(classify(530, "Login incorrect"), RemoteError::Auth(_)));
        assert!(matches!(
            classify(550, "Permission denied"),
            RemoteError::Rejected { code: 550, .. }
        ));
    }

    #[test]
    fn message_strips_code() {
        let reply = Reply {
            code: 220,
            lines: vec!["220-Welcome".into(), "220 Ready".into()],
        };
        assert_eq!(reply.message(), "Ready");
        assert!(reply.is_success());
        assert!(!reply.is_preliminary());
    }

    #[test]
    fn unavailable_codes() {
        assert!(is_unavailable_code(550));
        assert!(is_unavailable_code(450));
        assert!(!is_unavailable_code(530));
    }
}
