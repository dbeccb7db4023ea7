use woothee::parser::Parser;

use crate::storage::models::DeviceKind;

/// Longest user agent kept on an access event, in chars
pub const MAX_USER_AGENT_LEN: usize = 255;

/// Classify a User-Agent string into a coarse device kind
pub fn classify_user_agent(user_agent: &str) -> DeviceKind {
    let parser = Parser::new();

    match parser.parse(user_agent) {
        Some(result) => match result.category {
            "pc" => DeviceKind::Desktop,
            "smartphone" | "mobilephone" => DeviceKind::Mobile,
            "tablet" => DeviceKind::Tablet,
            "crawler" => DeviceKind::Bot,
            _ => DeviceKind::Unknown,
        },
        None => DeviceKind::Unknown,
    }
}

/// Cut a user agent to [`MAX_USER_AGENT_LEN`] chars without splitting a char
pub fn truncate_user_agent(user_agent: &str) -> String {
    match user_agent.char_indices().nth(MAX_USER_AGENT_LEN) {
        Some((idx, _)) => user_agent[..idx].to_string(),
        None => user_agent.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_chrome_windows() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        assert_eq!(classify_user_agent(ua), DeviceKind::Desktop);
    }

    #[test]
    fn test_classify_bot() {
        let ua = "Googlebot/2.1 (+http://www.google.com/bot.html)";
        assert_eq!(classify_user_agent(ua), DeviceKind::Bot);
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify_user_agent(""), DeviceKind::Unknown);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let ua = "ü".repeat(300);
        let cut = truncate_user_agent(&ua);
        assert_eq!(cut.chars().count(), MAX_USER_AGENT_LEN);

        assert_eq!(truncate_user_agent("curl/8.0"), "curl/8.0");
    }
}
